//! `ControlPlane` rules
//!
//! The control plane and its `AWSControlPlane` sibling describe the same
//! set of master nodes: the replica count here must match the number of
//! availability zones there. Whichever of the two is created first is
//! defaulted from the release, the second one from its sibling.

use async_trait::async_trait;
use serde_json::{Value, json};
use warden_core::labels::AWS_OPERATOR_VERSION;
use warden_core::{Feature, Zoned};
use warden_kube::{AdmissionError, ResourceKind, ResourceReference, Result};

use super::common::{
    AWS_OPERATOR, DefaultOperatorLabel, DefaultReleaseLabel, ProtectLabels, ValidateAnnotations,
};
use crate::pipeline::{
    MutationChain, MutationContext, MutationRule, ValidationChain, ValidationContext,
    ValidationRule, restricted,
};
use crate::request::Operation;

pub const REPLICAS: &str = "/spec/replicas";
pub const INFRASTRUCTURE_REF: &str = "/spec/infrastructureRef";

pub fn mutator() -> MutationChain {
    MutationChain::new()
        .on_create(DefaultReleaseLabel)
        .on_create(DefaultOperatorLabel::new(AWS_OPERATOR_VERSION, AWS_OPERATOR))
        .always(DefaultReplicas)
        .on_create(DefaultInfrastructureRef)
        .skip_releases_with(Feature::CapiControllers)
}

pub fn validator() -> ValidationChain {
    ValidationChain::new()
        .always(ValidReplicas)
        .always(ReplicasMatchZones)
        .on_update(NoScaleDown)
        .always(ValidateAnnotations)
        .on_update(restricted(ProtectLabels))
        .skip_releases_with(Feature::CapiControllers)
}

/// `infrastructureRef` value pointing at an `AWSControlPlane`
pub(crate) fn infrastructure_ref(name: &str, namespace: Option<&str>) -> Value {
    let kind = ResourceKind::AwsControlPlane;
    json!({
        "apiVersion": format!("{}/{}", kind.group(), kind.version()),
        "kind": kind.kind(),
        "name": name,
        "namespace": namespace,
    })
}

/// Replica count, taken from the sibling's zones or from the release
///
/// A replica count of zero is treated as unset.
#[derive(Debug, Clone, Copy)]
pub struct DefaultReplicas;

#[async_trait]
impl MutationRule for DefaultReplicas {
    fn name(&self) -> &'static str {
        "default-replicas"
    }

    async fn mutate(&self, ctx: &mut MutationContext<'_>) -> Result<()> {
        let current = ctx.value(REPLICAS).and_then(Value::as_i64);
        if current.is_some_and(|r| r > 0) {
            return Ok(());
        }

        let zones = ctx
            .sibling(ResourceKind::AwsControlPlane)
            .await?
            .map_or(0, |peer| peer.zone_count());
        let replicas = if zones > 0 {
            zones
        } else if ctx.supports(Feature::HaMasters)? {
            3
        } else {
            1
        };

        tracing::debug!(uid = %ctx.request().uid, replicas, from_sibling = zones > 0, "defaulting replicas");
        ctx.set(REPLICAS, replicas);
        Ok(())
    }
}

/// Point at the sibling `AWSControlPlane` once it exists
#[derive(Debug, Clone, Copy)]
pub struct DefaultInfrastructureRef;

#[async_trait]
impl MutationRule for DefaultInfrastructureRef {
    fn name(&self) -> &'static str {
        "default-infrastructure-ref"
    }

    async fn mutate(&self, ctx: &mut MutationContext<'_>) -> Result<()> {
        if ctx.is_set(INFRASTRUCTURE_REF) {
            return Ok(());
        }
        let Some(peer) = ctx.sibling(ResourceKind::AwsControlPlane).await? else {
            return Ok(());
        };
        if let Some(name) = peer.name() {
            let value = infrastructure_ref(name, peer.namespace());
            ctx.set(INFRASTRUCTURE_REF, value);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ValidReplicas;

#[async_trait]
impl ValidationRule for ValidReplicas {
    fn name(&self) -> &'static str {
        "valid-replicas"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        let Some(replicas) = ctx.object().i64_at(REPLICAS) else {
            return Ok(());
        };
        match replicas {
            1 => Ok(()),
            3 => {
                let ha = ctx
                    .release_version()?
                    .is_some_and(|v| v.supports(Feature::HaMasters));
                if ha {
                    Ok(())
                } else {
                    Err(AdmissionError::not_allowed(format!(
                        "3 control plane replicas require release {} or newer",
                        Feature::HaMasters.threshold()
                    )))
                }
            }
            other => Err(AdmissionError::not_allowed(format!(
                "control plane replicas must be 1 or 3, got {other}"
            ))),
        }
    }
}

/// Replicas must equal the zone count of the sibling, when it exists
///
/// Going from 1 to 3 replicas is allowed while the sibling still has a
/// single zone: the `AWSControlPlane` grows its zones on its next update.
#[derive(Debug, Clone, Copy)]
pub struct ReplicasMatchZones;

#[async_trait]
impl ValidationRule for ReplicasMatchZones {
    fn name(&self) -> &'static str {
        "replicas-match-zones"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        let Some(replicas) = ctx.object().i64_at(REPLICAS) else {
            return Ok(());
        };
        let Some(reference) = ResourceReference::sibling(ResourceKind::AwsControlPlane, ctx.object())
        else {
            return Ok(());
        };
        let Some(peer) = ctx.resolver().get(&reference).await?.found() else {
            return Ok(());
        };

        let zones = peer.zone_count();
        if zones == 1 && replicas == 3 && scaling_up(ctx)? {
            return Ok(());
        }
        if zones > 0 && zones as i64 != replicas {
            return Err(AdmissionError::not_allowed(format!(
                "control plane replicas ({replicas}) must match the number of availability zones ({zones}) of {reference}"
            )));
        }
        Ok(())
    }
}

/// Update moving from a single master to three, or already in that move
fn scaling_up(ctx: &ValidationContext<'_>) -> Result<bool> {
    if ctx.request().operation != Operation::Update {
        return Ok(false);
    }
    let old = ctx.request().old_object()?.i64_at(REPLICAS);
    Ok(matches!(old, Some(1) | Some(3)))
}

#[derive(Debug, Clone, Copy)]
pub struct NoScaleDown;

#[async_trait]
impl ValidationRule for NoScaleDown {
    fn name(&self) -> &'static str {
        "no-scale-down"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        let old = ctx.request().old_object()?.i64_at(REPLICAS);
        let new = ctx.object().i64_at(REPLICAS);
        if let (Some(old), Some(new)) = (old, new) {
            if new < old {
                return Err(AdmissionError::not_allowed(format!(
                    "control plane replicas must not be reduced from {old} to {new}"
                )));
            }
        }
        Ok(())
    }
}
