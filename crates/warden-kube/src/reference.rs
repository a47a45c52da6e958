//! References to related resources
//!
//! Cluster resources find each other through labels: every resource carries
//! the cluster ID (and node pools the control-plane ID), and sibling
//! resources of the same cluster share the cluster ID as their name.

use warden_core::labels;
use warden_core::{Labelled, ReleaseVersion};

use crate::kinds::ResourceKind;
use crate::object::CustomObject;

/// Kind, namespace and name of a resource to look up
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceReference {
    pub kind: ResourceKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceReference {
    pub fn namespaced(
        kind: ResourceKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn cluster_scoped(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.into(),
        }
    }

    /// The `Release` resource describing a release version
    pub fn release(version: &ReleaseVersion) -> Self {
        Self::cluster_scoped(ResourceKind::Release, version.release_name())
    }

    /// Resource of `kind` named after the value of `label` on `obj`
    ///
    /// Returns `None` when the label is missing or empty.
    pub fn from_label(kind: ResourceKind, obj: &CustomObject, label: &str) -> Option<Self> {
        let name = obj.label(label).filter(|v| !v.is_empty())?;
        Some(Self {
            kind,
            namespace: obj.namespace().map(str::to_string),
            name: name.to_string(),
        })
    }

    /// Resource of `kind` belonging to the same cluster as `obj`
    pub fn for_cluster(kind: ResourceKind, obj: &CustomObject) -> Option<Self> {
        Self::from_label(kind, obj, labels::CLUSTER)
    }

    /// Resource of `kind` that shares its name with `obj`
    pub fn sibling(kind: ResourceKind, obj: &CustomObject) -> Option<Self> {
        Some(Self {
            kind,
            namespace: obj.namespace().map(str::to_string),
            name: obj.name()?.to_string(),
        })
    }
}

impl std::fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}
