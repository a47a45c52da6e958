//! Warden Core - Core primitives for the Warden admission webhooks
//!
//! This crate provides the building blocks every admission rule depends on:
//! - `Patch`: JSON Patch operations with JSON-Pointer escaping
//! - `ReleaseVersion`: Release label parsing and version-gated features
//! - `ZoneSet`: Availability-zone allocation
//! - `LabelPolicy`: Protected label immutability
//! - `annotations`: Annotation format validation
//! - `EngineConfig`: Static, validated engine configuration

pub mod annotations;
pub mod config;
pub mod error;
pub mod identity;
pub mod labels;
pub mod object;
pub mod patch;
pub mod version;
pub mod zones;

pub use annotations::{AnnotationFormat, AnnotationViolation, validate_annotations};
pub use config::{EngineConfig, RngSource, SecretReference};
pub use error::{CoreError, Result};
pub use identity::{AccessPolicy, Identity};
pub use labels::{LabelPolicy, LabelViolation};
pub use object::{Annotated, Labelled, Released, Zoned};
pub use patch::{Patch, PatchOp, PatchOperation, escape_token, pointer};
pub use version::{Feature, ReleaseState, ReleaseVersion, UpgradeViolation, check_upgrade};
pub use zones::{ZoneSet, allocate, allocate_pinned, has_max_distinct};
