//! Warden Kube - Kubernetes integration for the Warden admission webhooks
//!
//! This crate provides:
//! - **Resource kinds**: The closed set of custom resource kinds the webhooks know
//! - **Custom objects**: Capability access over dynamic objects
//! - **References**: Label-derived keys to related resources
//! - **Resolvers**: Retrying lookup of related resources with an explicit
//!   "not yet created" outcome, backed by the API server or by memory

pub mod error;
pub mod kinds;
pub mod object;
pub mod reference;
pub mod resolver;

pub use error::{AdmissionError, INTERNAL_ERROR_MESSAGE, Result};
pub use kinds::ResourceKind;
pub use object::CustomObject;
pub use reference::ResourceReference;
pub use resolver::{KubeResolver, Lookup, MockResolver, OperationCounts, Resolver, RetryPolicy};
