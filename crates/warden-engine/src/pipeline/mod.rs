//! Rule pipelines
//!
//! A handler is bound to one resource kind and runs an ordered chain of rules
//! per operation:
//! - **Mutation** collects patch operations from every rule into one patch
//! - **Validation** stops at the first rejection
//!
//! Both chains can be switched off for releases reconciled by a newer
//! controller family, and single rules can be gated on a release feature with
//! [`since`].

pub mod mutation;
pub mod validation;

pub use mutation::{MutationChain, MutationContext, MutationRule};
pub use validation::{Restricted, ValidationChain, ValidationContext, ValidationRule, restricted};

use async_trait::async_trait;
use warden_core::{Feature, Patch, Released};
use warden_kube::Result;

use crate::decision::Decision;
use crate::env::Env;
use crate::request::ReviewRequest;

/// Computes the patch for a request
#[async_trait]
pub trait Mutator: Send + Sync {
    async fn mutate(&self, request: &ReviewRequest, env: &Env) -> Result<Patch>;
}

/// Decides whether a request is allowed
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, request: &ReviewRequest, env: &Env) -> Result<Decision>;
}

/// Whether the request's object is on a release that has `feature`
///
/// Objects without a release label never match.
pub(crate) fn release_supports(request: &ReviewRequest, feature: Feature) -> Result<bool> {
    let Some(object) = request.object.as_ref() else {
        return Ok(false);
    };
    Ok(object
        .release_version()?
        .is_some_and(|v| v.supports(feature)))
}

/// Rule that only runs for releases with a given feature
#[derive(Clone)]
pub struct Since<R> {
    feature: Feature,
    rule: R,
}

/// Run `rule` only for releases that have `feature`
///
/// Used for checks and defaults introduced with a newer schema generation,
/// which legacy resources must skip.
pub fn since<R>(feature: Feature, rule: R) -> Since<R> {
    Since { feature, rule }
}

#[async_trait]
impl<R: MutationRule> MutationRule for Since<R> {
    fn name(&self) -> &'static str {
        self.rule.name()
    }

    async fn mutate(&self, ctx: &mut MutationContext<'_>) -> Result<()> {
        let supported = ctx
            .release_version()?
            .is_some_and(|v| v.supports(self.feature));
        if !supported {
            return Ok(());
        }
        self.rule.mutate(ctx).await
    }
}

#[async_trait]
impl<R: ValidationRule> ValidationRule for Since<R> {
    fn name(&self) -> &'static str {
        self.rule.name()
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        let supported = ctx
            .release_version()?
            .is_some_and(|v| v.supports(self.feature));
        if !supported {
            return Ok(());
        }
        self.rule.validate(ctx).await
    }
}
