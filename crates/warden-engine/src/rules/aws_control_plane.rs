//! `AWSControlPlane` rules

use async_trait::async_trait;
use serde_json::{Value, json};
use warden_core::labels::AWS_OPERATOR_VERSION;
use warden_core::{Feature, Zoned, allocate, allocate_pinned, has_max_distinct};
use warden_kube::{AdmissionError, ResourceKind, ResourceReference, Result};

use super::common::{
    AWS_OPERATOR, DefaultOperatorLabel, DefaultReleaseLabel, ProtectLabels, ValidateAnnotations,
};
use super::control_plane::{self, infrastructure_ref};
use crate::pipeline::{
    MutationChain, MutationContext, MutationRule, ValidationChain, ValidationContext,
    ValidationRule, restricted, since,
};

pub const ZONES: &str = "/spec/availabilityZones";
pub const INSTANCE_TYPE: &str = "/spec/instanceType";

pub fn mutator() -> MutationChain {
    MutationChain::new()
        .on_create(DefaultReleaseLabel)
        .on_create(DefaultOperatorLabel::new(AWS_OPERATOR_VERSION, AWS_OPERATOR))
        .on_create(DefaultZones)
        .on_create(DefaultInstanceType)
        .on_create(BackfillInfrastructureRef)
        .on_update(ScaleUpZones)
        .skip_releases_with(Feature::CapiControllers)
}

pub fn validator() -> ValidationChain {
    ValidationChain::new()
        .always(ValidZoneCount)
        .always(KnownZones)
        .always(since(Feature::NewSchema, DistinctZones))
        .always(AllowedInstanceType)
        .always(ZonesMatchReplicas)
        .on_update(ZoneChanges)
        .always(ValidateAnnotations)
        .on_update(restricted(ProtectLabels))
        .skip_releases_with(Feature::CapiControllers)
}

/// Replica count of the sibling `ControlPlane`, when set
fn replicas_of(peer: &warden_kube::CustomObject) -> Option<usize> {
    peer.i64_at(control_plane::REPLICAS)
        .filter(|r| *r > 0)
        .and_then(|r| usize::try_from(r).ok())
}

/// Zones allocated for the number of masters
///
/// The count follows the sibling `ControlPlane` when it exists, else the
/// release.
#[derive(Debug, Clone, Copy)]
pub struct DefaultZones;

#[async_trait]
impl MutationRule for DefaultZones {
    fn name(&self) -> &'static str {
        "default-zones"
    }

    async fn mutate(&self, ctx: &mut MutationContext<'_>) -> Result<()> {
        if ctx.is_set(ZONES) {
            return Ok(());
        }

        let replicas = ctx
            .sibling(ResourceKind::ControlPlane)
            .await?
            .as_ref()
            .and_then(replicas_of);
        let count = match replicas {
            Some(count) => count,
            None if ctx.supports(Feature::HaMasters)? => 3,
            None => 1,
        };

        let config = ctx.config();
        let zones = allocate(count, &config.zones, ctx.rng());
        tracing::debug!(uid = %ctx.request().uid, ?zones, "defaulting availability zones");
        ctx.set(ZONES, zones);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DefaultInstanceType;

#[async_trait]
impl MutationRule for DefaultInstanceType {
    fn name(&self) -> &'static str {
        "default-instance-type"
    }

    async fn mutate(&self, ctx: &mut MutationContext<'_>) -> Result<()> {
        if !ctx.is_set(INSTANCE_TYPE) {
            let instance_type = ctx.config().default_master_instance_type.clone();
            ctx.set(INSTANCE_TYPE, instance_type);
        }
        Ok(())
    }
}

/// Set `spec.infrastructureRef` on a sibling `ControlPlane` created first
///
/// Writes to the sibling, not to the admitted object.
#[derive(Debug, Clone, Copy)]
pub struct BackfillInfrastructureRef;

#[async_trait]
impl MutationRule for BackfillInfrastructureRef {
    fn name(&self) -> &'static str {
        "backfill-infrastructure-ref"
    }

    async fn mutate(&self, ctx: &mut MutationContext<'_>) -> Result<()> {
        let object = ctx.object();
        let (Some(name), Some(reference)) = (
            object.name(),
            ResourceReference::sibling(ResourceKind::ControlPlane, object),
        ) else {
            return Ok(());
        };
        let Some(peer) = ctx.sibling(ResourceKind::ControlPlane).await? else {
            return Ok(());
        };
        if peer.has(control_plane::INFRASTRUCTURE_REF) {
            return Ok(());
        }

        let patch = json!({"spec": {"infrastructureRef": infrastructure_ref(name, object.namespace())}});
        ctx.resolver().merge_patch(&reference, &patch).await?;
        tracing::info!(uid = %ctx.request().uid, %reference, "backfilled infrastructure reference");
        Ok(())
    }
}

/// Grow a single zone to three when the control plane went HA
///
/// The existing zone is kept.
#[derive(Debug, Clone, Copy)]
pub struct ScaleUpZones;

#[async_trait]
impl MutationRule for ScaleUpZones {
    fn name(&self) -> &'static str {
        "scale-up-zones"
    }

    async fn mutate(&self, ctx: &mut MutationContext<'_>) -> Result<()> {
        let current: Vec<String> = match ctx.value(ZONES) {
            Some(Value::Array(zones)) => zones
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => return Ok(()),
        };
        let [zone] = current.as_slice() else {
            return Ok(());
        };

        let replicas = ctx
            .sibling(ResourceKind::ControlPlane)
            .await?
            .as_ref()
            .and_then(replicas_of);
        if replicas != Some(3) {
            return Ok(());
        }

        let config = ctx.config();
        let zones = allocate_pinned(zone, 3, &config.zones, ctx.rng());
        tracing::info!(uid = %ctx.request().uid, ?zones, "scaling availability zones to 3");
        ctx.set(ZONES, zones);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ValidZoneCount;

#[async_trait]
impl ValidationRule for ValidZoneCount {
    fn name(&self) -> &'static str {
        "valid-zone-count"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        let Some(zones) = ctx.object().availability_zones() else {
            return Ok(());
        };
        match zones.len() {
            1 | 3 => Ok(()),
            n => Err(AdmissionError::not_allowed(format!(
                "number of availability zones must be 1 or 3, got {n}"
            ))),
        }
    }
}

/// Every zone must be in the configured set
#[derive(Debug, Clone, Copy)]
pub struct KnownZones;

#[async_trait]
impl ValidationRule for KnownZones {
    fn name(&self) -> &'static str {
        "known-zones"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        check_known_zones(ctx)
    }
}

pub(crate) fn check_known_zones(ctx: &ValidationContext<'_>) -> Result<()> {
    let Some(zones) = ctx.object().availability_zones() else {
        return Ok(());
    };
    let valid = &ctx.config().zones;
    let unknown = valid.unknown(&zones);
    if !unknown.is_empty() {
        return Err(AdmissionError::not_allowed(format!(
            "unknown availability zones {unknown:?}, valid zones are {:?}",
            valid.as_slice()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct DistinctZones;

#[async_trait]
impl ValidationRule for DistinctZones {
    fn name(&self) -> &'static str {
        "distinct-zones"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        let Some(zones) = ctx.object().availability_zones() else {
            return Ok(());
        };
        if !has_max_distinct(&zones, &ctx.config().zones) {
            return Err(AdmissionError::not_allowed(format!(
                "availability zones {zones:?} must be spread over as many distinct zones as possible"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AllowedInstanceType;

#[async_trait]
impl ValidationRule for AllowedInstanceType {
    fn name(&self) -> &'static str {
        "allowed-instance-type"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        let Some(instance_type) = ctx.object().str_at(INSTANCE_TYPE) else {
            return Ok(());
        };
        let config = ctx.config();
        if !config.is_master_instance_type(instance_type) {
            return Err(AdmissionError::not_allowed(format!(
                "instance type {instance_type} is not allowed for control plane nodes, allowed types are {:?}",
                config.master_instance_types
            )));
        }
        Ok(())
    }
}

/// Zone count must equal the replicas of the sibling, when it exists
#[derive(Debug, Clone, Copy)]
pub struct ZonesMatchReplicas;

#[async_trait]
impl ValidationRule for ZonesMatchReplicas {
    fn name(&self) -> &'static str {
        "zones-match-replicas"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        let zones = ctx.object().zone_count();
        if zones == 0 {
            return Ok(());
        }
        let Some(reference) = ResourceReference::sibling(ResourceKind::ControlPlane, ctx.object())
        else {
            return Ok(());
        };
        let replicas = ctx
            .resolver()
            .get(&reference)
            .await?
            .found()
            .as_ref()
            .and_then(replicas_of);

        match replicas {
            Some(replicas) if replicas != zones => Err(AdmissionError::not_allowed(format!(
                "number of availability zones ({zones}) must match the replicas ({replicas}) of {reference}"
            ))),
            _ => Ok(()),
        }
    }
}

/// Zones may only grow from one to three, keeping the original zone
#[derive(Debug, Clone, Copy)]
pub struct ZoneChanges;

#[async_trait]
impl ValidationRule for ZoneChanges {
    fn name(&self) -> &'static str {
        "zone-changes"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        let old = ctx.request().old_object()?.availability_zones().unwrap_or_default();
        let new = ctx.object().availability_zones().unwrap_or_default();
        if old.is_empty() || old == new {
            return Ok(());
        }

        match (old.len(), new.len()) {
            (before, after) if before == after => {
                let (mut old_sorted, mut new_sorted) = (old.clone(), new.clone());
                old_sorted.sort();
                new_sorted.sort();
                if old_sorted == new_sorted {
                    Err(AdmissionError::not_allowed(format!(
                        "availability zones order has changed from {old:?} to {new:?}"
                    )))
                } else {
                    Err(AdmissionError::not_allowed(format!(
                        "availability zones must not be changed from {old:?} to {new:?}"
                    )))
                }
            }
            (1, 3) if new.contains(&old[0]) => Ok(()),
            (1, 3) => Err(AdmissionError::not_allowed(format!(
                "scaling availability zones from {old:?} to {new:?} must keep zone {}",
                old[0]
            ))),
            (before, after) => Err(AdmissionError::not_allowed(format!(
                "availability zones can only grow from 1 to 3, not from {before} to {after}"
            ))),
        }
    }
}
