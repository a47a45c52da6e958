//! `AWSMachineDeployment` rules

use async_trait::async_trait;
use serde_json::Value;
use warden_core::labels::{AWS_OPERATOR_VERSION, CLUSTER};
use warden_core::{Feature, Zoned, allocate};
use warden_kube::{AdmissionError, ResourceKind, ResourceReference, Result};

use super::aws_control_plane::KnownZones;
use super::common::{
    AWS_OPERATOR, DefaultOperatorLabel, DefaultReleaseLabel, ProtectLabels, ValidateAnnotations,
};
use crate::pipeline::{
    MutationChain, MutationContext, MutationRule, ValidationChain, ValidationContext,
    ValidationRule, restricted, since,
};

pub const ZONES: &str = "/spec/provider/availabilityZones";
pub const INSTANCE_TYPE: &str = "/spec/provider/worker/instanceType";
pub const ON_DEMAND_BASE_CAPACITY: &str =
    "/spec/provider/instanceDistribution/onDemandBaseCapacity";
pub const ON_DEMAND_PERCENTAGE: &str =
    "/spec/provider/instanceDistribution/onDemandPercentageAboveBaseCapacity";
pub const SCALING_MIN: &str = "/spec/nodePool/scaling/min";
pub const SCALING_MAX: &str = "/spec/nodePool/scaling/max";

pub const DEFAULT_SCALING_MIN: i64 = 3;
pub const DEFAULT_SCALING_MAX: i64 = 10;
pub const MAX_NODE_POOL_ZONES: usize = 3;

pub fn mutator() -> MutationChain {
    MutationChain::new()
        .on_create(DefaultReleaseLabel)
        .on_create(DefaultOperatorLabel::new(AWS_OPERATOR_VERSION, AWS_OPERATOR))
        .on_create(DefaultZones)
        .on_create(since(Feature::NewSchema, DefaultInstanceDistribution))
        .always(DefaultScaling)
        .skip_releases_with(Feature::CapiControllers)
}

pub fn validator() -> ValidationChain {
    ValidationChain::new()
        .on_create(ParentClusterExists)
        .always(KnownZones)
        .always(AllowedInstanceType)
        .always(ScalingBounds)
        .always(since(Feature::NewSchema, InstanceDistributionBounds))
        .on_update(ZonesUnchanged)
        .always(ValidateAnnotations)
        .on_update(restricted(ProtectLabels))
        .skip_releases_with(Feature::CapiControllers)
}

/// Spread new node pools over up to three zones
#[derive(Debug, Clone, Copy)]
pub struct DefaultZones;

#[async_trait]
impl MutationRule for DefaultZones {
    fn name(&self) -> &'static str {
        "default-node-pool-zones"
    }

    async fn mutate(&self, ctx: &mut MutationContext<'_>) -> Result<()> {
        if ctx.is_set(ZONES) {
            return Ok(());
        }
        let config = ctx.config();
        let count = MAX_NODE_POOL_ZONES.min(config.zones.len());
        let zones = allocate(count, &config.zones, ctx.rng());
        ctx.set(ZONES, zones);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DefaultInstanceDistribution;

#[async_trait]
impl MutationRule for DefaultInstanceDistribution {
    fn name(&self) -> &'static str {
        "default-instance-distribution"
    }

    async fn mutate(&self, ctx: &mut MutationContext<'_>) -> Result<()> {
        if ctx.value(ON_DEMAND_BASE_CAPACITY).is_none() {
            ctx.set(ON_DEMAND_BASE_CAPACITY, 0);
        }
        if ctx.value(ON_DEMAND_PERCENTAGE).is_none() {
            ctx.set(ON_DEMAND_PERCENTAGE, 100);
        }
        Ok(())
    }
}

/// Scaling bounds, keeping `min <= max` when only one side is given
#[derive(Debug, Clone, Copy)]
pub struct DefaultScaling;

#[async_trait]
impl MutationRule for DefaultScaling {
    fn name(&self) -> &'static str {
        "default-scaling"
    }

    async fn mutate(&self, ctx: &mut MutationContext<'_>) -> Result<()> {
        let min = ctx.value(SCALING_MIN).and_then(Value::as_i64);
        let max = ctx.value(SCALING_MAX).and_then(Value::as_i64);
        match (min, max) {
            (None, None) => {
                ctx.set(SCALING_MIN, DEFAULT_SCALING_MIN);
                ctx.set(SCALING_MAX, DEFAULT_SCALING_MAX);
            }
            (None, Some(max)) => ctx.set(SCALING_MIN, DEFAULT_SCALING_MIN.min(max)),
            (Some(min), None) => ctx.set(SCALING_MAX, DEFAULT_SCALING_MAX.max(min)),
            (Some(_), Some(_)) => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParentClusterExists;

#[async_trait]
impl ValidationRule for ParentClusterExists {
    fn name(&self) -> &'static str {
        "parent-cluster-exists"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        let reference = ResourceReference::for_cluster(ResourceKind::Cluster, ctx.object())
            .ok_or_else(|| AdmissionError::not_allowed(format!("node pool must carry the {CLUSTER} label")))?;
        ctx.resolver().get(&reference).await?.require(&reference)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AllowedInstanceType;

#[async_trait]
impl ValidationRule for AllowedInstanceType {
    fn name(&self) -> &'static str {
        "allowed-worker-instance-type"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        let Some(instance_type) = ctx.object().str_at(INSTANCE_TYPE) else {
            return Ok(());
        };
        let config = ctx.config();
        if !config.is_worker_instance_type(instance_type) {
            return Err(AdmissionError::not_allowed(format!(
                "instance type {instance_type} is not allowed for worker nodes, allowed types are {:?}",
                config.worker_instance_types
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScalingBounds;

#[async_trait]
impl ValidationRule for ScalingBounds {
    fn name(&self) -> &'static str {
        "scaling-bounds"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        let min = ctx.object().i64_at(SCALING_MIN);
        let max = ctx.object().i64_at(SCALING_MAX);
        if let Some(min) = min.filter(|m| *m < 0) {
            return Err(AdmissionError::not_allowed(format!(
                "node pool minimum size must not be negative, got {min}"
            )));
        }
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(AdmissionError::not_allowed(format!(
                    "node pool minimum size {min} must not exceed maximum size {max}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InstanceDistributionBounds;

#[async_trait]
impl ValidationRule for InstanceDistributionBounds {
    fn name(&self) -> &'static str {
        "instance-distribution-bounds"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        if let Some(base) = ctx.object().i64_at(ON_DEMAND_BASE_CAPACITY) {
            if base < 0 {
                return Err(AdmissionError::not_allowed(format!(
                    "on-demand base capacity must not be negative, got {base}"
                )));
            }
        }
        if let Some(percentage) = ctx.object().i64_at(ON_DEMAND_PERCENTAGE) {
            if !(0..=100).contains(&percentage) {
                return Err(AdmissionError::not_allowed(format!(
                    "on-demand percentage above base capacity must be between 0 and 100, got {percentage}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ZonesUnchanged;

#[async_trait]
impl ValidationRule for ZonesUnchanged {
    fn name(&self) -> &'static str {
        "zones-unchanged"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        let old = ctx.request().old_object()?.availability_zones().unwrap_or_default();
        let new = ctx.object().availability_zones().unwrap_or_default();
        if !old.is_empty() && old != new {
            return Err(AdmissionError::not_allowed(format!(
                "availability zones of a node pool must not be changed from {old:?} to {new:?}"
            )));
        }
        Ok(())
    }
}
