//! JSON Patch model
//!
//! Mutation rules never modify objects in place. They emit [`PatchOperation`]s
//! which are collected into a single [`Patch`] and returned to the API server.
//! Paths are RFC 6901 JSON Pointers; use [`pointer`] to build them from raw
//! segments so that `~` and `/` inside label keys are escaped correctly.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

use crate::error::Result;

/// Supported patch operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Replace,
}

impl std::fmt::Display for PatchOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

/// A single JSON Patch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    pub value: Value,
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn replace(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: value.into(),
        }
    }
}

/// Escape a single JSON-Pointer reference token
///
/// `~` must be escaped before `/`, otherwise `/` -> `~1` -> `~01`.
pub fn escape_token(token: &str) -> Cow<'_, str> {
    if !token.contains(['~', '/']) {
        return Cow::Borrowed(token);
    }
    Cow::Owned(token.replace('~', "~0").replace('/', "~1"))
}

/// Build a JSON Pointer from unescaped segments
///
/// ```
/// use warden_core::pointer;
///
/// assert_eq!(
///     pointer(["metadata", "labels", "release.warden.io/version"]),
///     "/metadata/labels/release.warden.io~1version"
/// );
/// ```
pub fn pointer<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    segments.into_iter().fold(String::new(), |mut acc, segment| {
        acc.push('/');
        acc.push_str(&escape_token(segment.as_ref()));
        acc
    })
}

/// Ordered list of patch operations produced by one mutation chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(Vec<PatchOperation>);

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, operation: PatchOperation) {
        self.0.push(operation);
    }

    pub fn extend(&mut self, operations: impl IntoIterator<Item = PatchOperation>) {
        self.0.extend(operations);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PatchOperation> {
        self.0.iter()
    }

    pub fn operations(&self) -> &[PatchOperation] {
        &self.0
    }

    pub fn into_operations(self) -> Vec<PatchOperation> {
        self.0
    }

    /// Value this patch will write at `path`, if any
    ///
    /// Later operations win. An operation that writes a parent object (for
    /// example `add /metadata/labels {...}`) also answers for its children.
    pub fn pending(&self, path: &str) -> Option<&Value> {
        self.0.iter().rev().find_map(|op| {
            if op.path == path {
                return Some(&op.value);
            }
            let rest = path.strip_prefix(op.path.as_str())?;
            if rest.starts_with('/') {
                op.value.pointer(rest)
            } else {
                None
            }
        })
    }

    /// Whether any operation already targets `path` or one of its parents
    pub fn touches(&self, path: &str) -> bool {
        self.pending(path).is_some()
    }

    /// Serialize to the JSON Patch wire format
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }
}

impl From<Vec<PatchOperation>> for Patch {
    fn from(operations: Vec<PatchOperation>) -> Self {
        Self(operations)
    }
}

impl IntoIterator for Patch {
    type Item = PatchOperation;
    type IntoIter = std::vec::IntoIter<PatchOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Patch {
    type Item = &'a PatchOperation;
    type IntoIter = std::slice::Iter<'a, PatchOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
