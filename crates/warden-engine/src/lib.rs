//! Warden Engine - admission rule engine
//!
//! This crate provides:
//! - **Pipelines**: Ordered mutation and validation rule chains
//! - **Rules**: The rule sets of every supported resource kind
//! - **Registry**: Binding of resource kinds to handlers
//! - **Gateway**: The webhook endpoints, with the review codec
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use warden_core::{EngineConfig, ZoneSet};
//! use warden_engine::{Env, Gateway, ReviewCodec, default_registry, router};
//! use warden_kube::{KubeResolver, RetryPolicy};
//!
//! let config = EngineConfig::new(ZoneSet::parse("eu-west-1a,eu-west-1b")?);
//! let resolver = KubeResolver::try_default(RetryPolicy::default()).await?;
//! let gateway = Gateway::new(default_registry(), ReviewCodec::new(), Env::new(config, Arc::new(resolver)));
//! let app = router(Arc::new(gateway));
//! ```

pub mod codec;
pub mod decision;
pub mod env;
pub mod gateway;
pub mod pipeline;
pub mod registry;
pub mod request;
pub mod rules;

pub use codec::{CodecError, ReviewCodec};
pub use decision::Decision;
pub use env::Env;
pub use gateway::{Gateway, router};
pub use pipeline::{
    MutationChain, MutationContext, MutationRule, Mutator, ValidationChain, ValidationContext,
    ValidationRule, Validator, restricted, since,
};
pub use registry::Registry;
pub use request::{Operation, ReviewRequest};
pub use rules::default_registry;
