//! Validation pipeline
//!
//! Checks run in order and the first rejection wins. A check rejects by
//! returning [`AdmissionError::NotAllowed`]; any other error aborts the chain
//! and is handled by the gateway.

use async_trait::async_trait;
use warden_core::{EngineConfig, Feature, Identity, ReleaseVersion, Released};
use warden_kube::{AdmissionError, CustomObject, Resolver, Result};

use super::{Validator, release_supports};
use crate::decision::Decision;
use crate::env::Env;
use crate::request::{Operation, ReviewRequest};

/// Request-scoped view for validation rules
pub struct ValidationContext<'a> {
    request: &'a ReviewRequest,
    object: &'a CustomObject,
    env: &'a Env,
}

impl<'a> ValidationContext<'a> {
    pub fn new(request: &'a ReviewRequest, env: &'a Env) -> Result<Self> {
        Ok(Self {
            request,
            object: request.object()?,
            env,
        })
    }

    pub fn request(&self) -> &'a ReviewRequest {
        self.request
    }

    pub fn operation(&self) -> Operation {
        self.request.operation
    }

    pub fn object(&self) -> &'a CustomObject {
        self.object
    }

    /// Previous state; `None` on create
    pub fn old_object(&self) -> Option<&'a CustomObject> {
        self.request.old_object.as_ref()
    }

    pub fn config(&self) -> &'a EngineConfig {
        &self.env.config
    }

    pub fn resolver(&self) -> &'a dyn Resolver {
        self.env.resolver.as_ref()
    }

    pub fn user(&self) -> &'a Identity {
        &self.request.user
    }

    /// Whether the caller is subject to restricted checks
    pub fn is_restricted(&self) -> bool {
        self.env.config.access.is_restricted(&self.request.user)
    }

    pub fn release_version(&self) -> Result<Option<ReleaseVersion>> {
        Ok(self.object.release_version()?)
    }
}

/// A single check
#[async_trait]
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()>;
}

/// Rule that only applies to restricted callers
#[derive(Clone)]
pub struct Restricted<R>(R);

/// Apply `rule` only to callers in the admin or restricted-group set
///
/// Controllers and automation are exempt.
pub fn restricted<R: ValidationRule>(rule: R) -> Restricted<R> {
    Restricted(rule)
}

#[async_trait]
impl<R: ValidationRule> ValidationRule for Restricted<R> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        if !ctx.is_restricted() {
            return Ok(());
        }
        self.0.validate(ctx).await
    }
}

/// Ordered validation rules for one resource kind
#[derive(Default)]
pub struct ValidationChain {
    create: Vec<Box<dyn ValidationRule>>,
    update: Vec<Box<dyn ValidationRule>>,
    skip_feature: Option<Feature>,
}

impl ValidationChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_create(mut self, rule: impl ValidationRule + 'static) -> Self {
        self.create.push(Box::new(rule));
        self
    }

    pub fn on_update(mut self, rule: impl ValidationRule + 'static) -> Self {
        self.update.push(Box::new(rule));
        self
    }

    /// Add a rule to both the create and the update chain
    pub fn always(self, rule: impl ValidationRule + Clone + 'static) -> Self {
        self.on_create(rule.clone()).on_update(rule)
    }

    /// Allow objects on releases with `feature` without checks
    pub fn skip_releases_with(mut self, feature: Feature) -> Self {
        self.skip_feature = Some(feature);
        self
    }

    pub fn rule_names(&self, operation: Operation) -> Vec<&'static str> {
        self.rules(operation).iter().map(|r| r.name()).collect()
    }

    fn rules(&self, operation: Operation) -> &[Box<dyn ValidationRule>] {
        match operation {
            Operation::Create => &self.create,
            Operation::Update => &self.update,
            _ => &[],
        }
    }
}

#[async_trait]
impl Validator for ValidationChain {
    async fn validate(&self, request: &ReviewRequest, env: &Env) -> Result<Decision> {
        let rules = self.rules(request.operation);
        if rules.is_empty() {
            return Ok(Decision::allow());
        }

        if let Some(feature) = self.skip_feature {
            if release_supports(request, feature)? {
                tracing::debug!(uid = %request.uid, %feature, "release handled elsewhere, skipping validation");
                return Ok(Decision::allow());
            }
        }

        let ctx = ValidationContext::new(request, env)?;
        for rule in rules {
            match rule.validate(&ctx).await {
                Ok(()) => {}
                Err(AdmissionError::NotAllowed(reason)) => {
                    tracing::info!(uid = %request.uid, rule = rule.name(), %reason, "request denied");
                    return Ok(Decision::deny(reason));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Decision::allow())
    }
}
