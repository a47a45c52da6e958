//! Mock resolver for testing
//!
//! Stores resources in memory, useful for unit tests without requiring a
//! Kubernetes cluster. Failures can be injected to exercise retry paths.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use super::{Lookup, Resolver, RetryPolicy};
use crate::error::{AdmissionError, Result};
use crate::object::CustomObject;
use crate::reference::ResourceReference;

/// In-memory resolver for testing
#[derive(Clone)]
pub struct MockResolver {
    store: Arc<RwLock<HashMap<ResourceReference, CustomObject>>>,
    operations: Arc<RwLock<OperationCounts>>,
    /// Number of upcoming calls that fail
    failures: Arc<RwLock<usize>>,
    retry: RetryPolicy,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub merge_patches: usize,
}

impl MockResolver {
    /// Create a new empty mock resolver
    ///
    /// Retries three times without delay.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
            operations: Arc::new(RwLock::new(OperationCounts::default())),
            failures: Arc::new(RwLock::new(0)),
            retry: RetryPolicy::new(3, Duration::ZERO),
        }
    }

    /// Create with pre-populated resources
    pub fn with_objects(objects: impl IntoIterator<Item = CustomObject>) -> Self {
        let resolver = Self::new();
        for obj in objects {
            resolver.insert(obj);
        }
        resolver
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Add or replace a resource
    ///
    /// Objects without a name are ignored.
    pub fn insert(&self, obj: CustomObject) {
        let Some(reference) = Self::reference_of(&obj) else {
            return;
        };
        self.store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(reference, obj);
    }

    /// Current state of a resource, bypassing counters and failures
    pub fn object(&self, reference: &ResourceReference) -> Option<CustomObject> {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(reference)
            .cloned()
    }

    /// Make the next `count` calls fail with an internal error
    pub fn fail_next(&self, count: usize) {
        *self.failures.write().unwrap_or_else(PoisonError::into_inner) = count;
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        *self.operations.write().unwrap_or_else(PoisonError::into_inner) =
            OperationCounts::default();
    }

    fn reference_of(obj: &CustomObject) -> Option<ResourceReference> {
        let kind = obj.kind();
        let name = obj.name()?.to_string();
        Some(ResourceReference {
            kind,
            namespace: obj
                .namespace()
                .filter(|_| kind.is_namespaced())
                .map(str::to_string),
            name,
        })
    }

    fn injected_failure(&self) -> Result<()> {
        let mut failures = self.failures.write().unwrap_or_else(PoisonError::into_inner);
        if *failures > 0 {
            *failures -= 1;
            return Err(AdmissionError::execution_failed("injected failure"));
        }
        Ok(())
    }

    fn fetch(&self, reference: &ResourceReference) -> Result<Option<CustomObject>> {
        self.operations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .gets += 1;
        self.injected_failure()?;

        Ok(self
            .store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(reference)
            .cloned())
    }

    fn apply_merge(&self, reference: &ResourceReference, patch: &Value) -> Result<()> {
        self.operations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .merge_patches += 1;
        self.injected_failure()?;

        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        let current = store
            .get(reference)
            .ok_or_else(|| AdmissionError::execution_failed(format!("{reference} not found")))?;

        let mut doc = current.document().clone();
        json_patch::merge(&mut doc, patch);
        store.insert(reference.clone(), CustomObject::from_value(reference.kind, doc)?);
        Ok(())
    }
}

impl Default for MockResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolver for MockResolver {
    async fn get(&self, reference: &ResourceReference) -> Result<Lookup> {
        self.retry
            .lookup(reference, move || async move { self.fetch(reference) })
            .await
    }

    async fn merge_patch(&self, reference: &ResourceReference, patch: &Value) -> Result<()> {
        self.retry
            .run(reference, move || async move { self.apply_merge(reference, patch) })
            .await
    }
}
