//! Rules shared by every resource kind

use async_trait::async_trait;
use serde_json::Value;
use warden_core::labels::RELEASE_VERSION;
use warden_core::{
    Annotated, Labelled, ReleaseState, ReleaseVersion, Released, check_upgrade,
    validate_annotations,
};
use warden_kube::{
    AdmissionError, CustomObject, Lookup, ResourceKind, ResourceReference, Result,
};

use crate::pipeline::{MutationContext, MutationRule, ValidationContext, ValidationRule};

/// Component name of the aws-operator in a `Release`
pub const AWS_OPERATOR: &str = "aws-operator";

/// Component name of the cluster-operator in a `Release`
pub const CLUSTER_OPERATOR: &str = "cluster-operator";

/// Version of `component` shipped by a `Release` resource
pub fn component_version<'a>(release: &'a CustomObject, component: &str) -> Option<&'a str> {
    release
        .pointer("/spec/components")?
        .as_array()?
        .iter()
        .find(|c| c.get("name").and_then(Value::as_str) == Some(component))?
        .get("version")?
        .as_str()
        .filter(|v| !v.is_empty())
}

/// Copy the release label from the parent `Cluster`
///
/// Left alone when the object already has one or the cluster is not created
/// yet.
#[derive(Debug, Clone, Copy)]
pub struct DefaultReleaseLabel;

#[async_trait]
impl MutationRule for DefaultReleaseLabel {
    fn name(&self) -> &'static str {
        "default-release-label"
    }

    async fn mutate(&self, ctx: &mut MutationContext<'_>) -> Result<()> {
        if ctx.label(RELEASE_VERSION).is_some() {
            return Ok(());
        }
        let Some(reference) = ResourceReference::for_cluster(ResourceKind::Cluster, ctx.object())
        else {
            return Ok(());
        };

        let Lookup::Found(cluster) = ctx.resolver().get(&reference).await? else {
            tracing::debug!(%reference, "parent cluster not created yet, release label left unset");
            return Ok(());
        };
        if let Some(release) = cluster.release_label() {
            let release = release.to_string();
            ctx.set_label(RELEASE_VERSION, release);
        }
        Ok(())
    }
}

/// Default an operator version label from the object's `Release`
#[derive(Debug, Clone, Copy)]
pub struct DefaultOperatorLabel {
    label: &'static str,
    component: &'static str,
}

impl DefaultOperatorLabel {
    pub fn new(label: &'static str, component: &'static str) -> Self {
        Self { label, component }
    }
}

#[async_trait]
impl MutationRule for DefaultOperatorLabel {
    fn name(&self) -> &'static str {
        "default-operator-label"
    }

    async fn mutate(&self, ctx: &mut MutationContext<'_>) -> Result<()> {
        if ctx.label(self.label).is_some() {
            return Ok(());
        }
        let Some(release) = ctx.release_version()? else {
            return Ok(());
        };

        let reference = ResourceReference::release(&release);
        let Lookup::Found(release) = ctx.resolver().get(&reference).await? else {
            tracing::debug!(%reference, label = self.label, "release not found, operator label left unset");
            return Ok(());
        };
        if let Some(version) = component_version(&release, self.component) {
            let version = version.to_string();
            ctx.set_label(self.label, version);
        }
        Ok(())
    }
}

/// Reject malformed values of known annotations
#[derive(Debug, Clone, Copy)]
pub struct ValidateAnnotations;

#[async_trait]
impl ValidationRule for ValidateAnnotations {
    fn name(&self) -> &'static str {
        "validate-annotations"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        validate_annotations(&ctx.object().annotation_map())
            .map_err(|violation| AdmissionError::not_allowed(violation.to_string()))
    }
}

/// Reject removal and modification of protected labels
#[derive(Debug, Clone, Copy)]
pub struct ProtectLabels;

#[async_trait]
impl ValidationRule for ProtectLabels {
    fn name(&self) -> &'static str {
        "protect-labels"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        let old = ctx.request().old_object()?;
        ctx.config()
            .labels
            .check_update(&old.label_map(), &ctx.object().label_map())
            .map_err(|violation| AdmissionError::not_allowed(violation.to_string()))
    }
}

/// Reject release upgrades that skip or revert major versions or target a
/// deprecated release
#[derive(Debug, Clone, Copy)]
pub struct ValidateUpgrade;

#[async_trait]
impl ValidationRule for ValidateUpgrade {
    fn name(&self) -> &'static str {
        "validate-upgrade"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        let old = ctx.request().old_object()?;
        let (Some(current), Some(target)) = (old.release_version()?, ctx.release_version()?) else {
            return Ok(());
        };
        if current == target {
            return Ok(());
        }

        let state = release_state(ctx, &target).await?;
        check_upgrade(&current, &target, state)
            .map_err(|violation| AdmissionError::not_allowed(violation.to_string()))?;

        tracing::info!(
            uid = %ctx.request().uid,
            from = %current,
            to = %target,
            "release upgrade accepted"
        );
        Ok(())
    }
}

/// Lifecycle state of the target release, which must exist
async fn release_state(ctx: &ValidationContext<'_>, target: &ReleaseVersion) -> Result<ReleaseState> {
    let reference = ResourceReference::release(target);
    let release = ctx.resolver().get(&reference).await?.require(&reference)?;
    Ok(ReleaseState::from_spec(release.str_at("/spec/state")))
}
