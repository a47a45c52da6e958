//! Resource resolvers
//!
//! A resolver fetches resources related to the one being admitted. Related
//! resources are created by independent actors in no guaranteed order, so a
//! lookup has three outcomes:
//! - **Found**: the resource exists
//! - **NotYetCreated**: it does not exist (yet), callers usually skip
//! - **Error**: anything else, propagated as a hard failure

mod api;
mod mock;
mod retry;

pub use api::KubeResolver;
pub use mock::{MockResolver, OperationCounts};
pub use retry::{DEFAULT_ATTEMPTS, DEFAULT_DELAY, RetryPolicy};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AdmissionError, Result};
use crate::object::CustomObject;
use crate::reference::ResourceReference;

/// Outcome of a successful lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T = CustomObject> {
    Found(T),
    NotYetCreated,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotYetCreated => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn try_map<U>(self, f: impl FnOnce(T) -> Result<U>) -> Result<Lookup<U>> {
        Ok(match self {
            Lookup::Found(value) => Lookup::Found(f(value)?),
            Lookup::NotYetCreated => Lookup::NotYetCreated,
        })
    }

    /// Treat a missing resource as a rejection
    ///
    /// For peers without which the request cannot be admitted, e.g. the
    /// parent cluster of a node pool.
    pub fn require(self, reference: &ResourceReference) -> Result<T> {
        match self {
            Lookup::Found(value) => Ok(value),
            Lookup::NotYetCreated => Err(AdmissionError::not_allowed(format!(
                "{reference} does not exist"
            ))),
        }
    }
}

/// Fetches and updates related resources
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Look up a resource
    async fn get(&self, reference: &ResourceReference) -> Result<Lookup>;

    /// Apply a JSON merge patch to a resource
    ///
    /// Used for idempotent backfills on sibling resources.
    async fn merge_patch(&self, reference: &ResourceReference, patch: &Value) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::ResourceKind;

    #[test]
    fn test_require() {
        let reference = ResourceReference::namespaced(ResourceKind::Cluster, "org-acme", "a1b2c");

        let err = Lookup::<()>::NotYetCreated.require(&reference).unwrap_err();
        assert!(matches!(err, AdmissionError::NotAllowed(_)));
        assert_eq!(err.to_string(), "Cluster org-acme/a1b2c does not exist");

        assert_eq!(Lookup::Found(1).require(&reference).unwrap(), 1);
    }

    #[test]
    fn test_try_map_and_found() {
        let double = |n: i32| Ok(n * 2);
        assert_eq!(Lookup::Found(2).try_map(double).unwrap().found(), Some(4));
        assert_eq!(Lookup::<i32>::NotYetCreated.try_map(double).unwrap().found(), None);

        let failed = Lookup::Found(2).try_map(|_| -> Result<i32> {
            Err(AdmissionError::execution_failed("boom"))
        });
        assert!(failed.is_err());
    }
}
