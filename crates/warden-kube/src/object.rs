//! Typed view over dynamic custom objects
//!
//! Custom resource schemas are not reproduced field by field. A
//! [`CustomObject`] pairs the raw object with its [`ResourceKind`] and exposes
//! the capabilities the rules need through JSON-Pointer accessors.

use kube::api::DynamicObject;
use serde_json::Value;
use std::collections::BTreeMap;
use warden_core::{Annotated, Labelled, Zoned};

use crate::error::Result;
use crate::kinds::ResourceKind;

/// Path of the availability-zone list for each kind that has one
fn zones_path(kind: ResourceKind) -> Option<&'static str> {
    match kind {
        ResourceKind::AwsControlPlane => Some("/spec/availabilityZones"),
        ResourceKind::AwsMachineDeployment => Some("/spec/provider/availabilityZones"),
        _ => None,
    }
}

/// A custom resource of a known kind
#[derive(Debug, Clone)]
pub struct CustomObject {
    kind: ResourceKind,
    inner: DynamicObject,
    /// Full JSON document, metadata included, for pointer lookups
    document: Value,
}

impl CustomObject {
    pub fn new(kind: ResourceKind, inner: DynamicObject) -> Result<Self> {
        let document = serde_json::to_value(&inner)?;
        Ok(Self {
            kind,
            inner,
            document,
        })
    }

    /// Decode from the JSON representation sent by the API server
    pub fn from_value(kind: ResourceKind, value: Value) -> Result<Self> {
        let inner = serde_json::from_value(value.clone())?;
        Ok(Self {
            kind,
            inner,
            document: value,
        })
    }

    /// Full JSON document of the object
    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.metadata.name.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.inner.metadata.namespace.as_deref()
    }

    /// Look up a value by JSON Pointer, e.g. `/spec/replicas`
    pub fn pointer(&self, path: &str) -> Option<&Value> {
        self.document.pointer(path)
    }

    /// Non-empty string at `path`
    pub fn str_at(&self, path: &str) -> Option<&str> {
        self.pointer(path)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn i64_at(&self, path: &str) -> Option<i64> {
        self.pointer(path).and_then(Value::as_i64)
    }

    pub fn f64_at(&self, path: &str) -> Option<f64> {
        self.pointer(path).and_then(Value::as_f64)
    }

    /// String list at `path`; non-string entries are skipped
    pub fn strings_at(&self, path: &str) -> Option<Vec<String>> {
        let list = self.pointer(path)?.as_array()?;
        Some(
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        )
    }

    /// Whether `path` holds a value other than `null`
    pub fn has(&self, path: &str) -> bool {
        self.pointer(path).is_some_and(|v| !v.is_null())
    }
}

impl Labelled for CustomObject {
    fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.inner.metadata.labels.as_ref()
    }
}

impl Annotated for CustomObject {
    fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.inner.metadata.annotations.as_ref()
    }
}

impl Zoned for CustomObject {
    fn availability_zones(&self) -> Option<Vec<String>> {
        self.strings_at(zones_path(self.kind)?)
    }
}
