//! `AWSCluster` rules

use async_trait::async_trait;
use serde_json::json;
use warden_core::annotations::CILIUM_POD_CIDR;
use warden_core::config::validate_ipv4_cidr;
use warden_core::labels::AWS_OPERATOR_VERSION;
use warden_core::{Feature, Released};
use warden_kube::{AdmissionError, Result};

use super::common::{
    AWS_OPERATOR, DefaultOperatorLabel, DefaultReleaseLabel, ProtectLabels, ValidateAnnotations,
};
use crate::pipeline::{
    MutationChain, MutationContext, MutationRule, ValidationChain, ValidationContext,
    ValidationRule, restricted,
};
use crate::request::Operation;

pub const POD_CIDR: &str = "/spec/provider/pods/cidrBlock";
pub const CREDENTIAL_SECRET: &str = "/spec/provider/credentialSecret";

pub fn mutator() -> MutationChain {
    MutationChain::new()
        .on_create(DefaultReleaseLabel)
        .on_create(DefaultOperatorLabel::new(AWS_OPERATOR_VERSION, AWS_OPERATOR))
        .on_create(DefaultPodCidr)
        .on_create(DefaultCredentialSecret)
        .always(DefaultCiliumPodCidr)
        .skip_releases_with(Feature::CapiControllers)
}

pub fn validator() -> ValidationChain {
    ValidationChain::new()
        .always(ValidateAnnotations)
        .always(ValidPodCidr)
        .on_update(PodCidrUnchanged)
        .on_update(restricted(ProtectLabels))
        .skip_releases_with(Feature::CapiControllers)
}

#[derive(Debug, Clone, Copy)]
pub struct DefaultPodCidr;

#[async_trait]
impl MutationRule for DefaultPodCidr {
    fn name(&self) -> &'static str {
        "default-pod-cidr"
    }

    async fn mutate(&self, ctx: &mut MutationContext<'_>) -> Result<()> {
        if !ctx.is_set(POD_CIDR) {
            let cidr = ctx.config().pod_cidr.clone();
            ctx.set(POD_CIDR, cidr);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DefaultCredentialSecret;

#[async_trait]
impl MutationRule for DefaultCredentialSecret {
    fn name(&self) -> &'static str {
        "default-credential-secret"
    }

    async fn mutate(&self, ctx: &mut MutationContext<'_>) -> Result<()> {
        if !ctx.is_set(CREDENTIAL_SECRET) {
            let secret = &ctx.config().credential_secret;
            let value = json!({"name": secret.name, "namespace": secret.namespace});
            ctx.set(CREDENTIAL_SECRET, value);
        }
        Ok(())
    }
}

/// Hand the Cilium pod CIDR to clusters on a Cilium release
///
/// On update only an upgrade from a pre-Cilium release triggers it.
#[derive(Debug, Clone, Copy)]
pub struct DefaultCiliumPodCidr;

#[async_trait]
impl MutationRule for DefaultCiliumPodCidr {
    fn name(&self) -> &'static str {
        "default-cilium-pod-cidr"
    }

    async fn mutate(&self, ctx: &mut MutationContext<'_>) -> Result<()> {
        if ctx.annotation(CILIUM_POD_CIDR).is_some() || !ctx.supports(Feature::Cilium)? {
            return Ok(());
        }
        if ctx.request().operation == Operation::Update {
            let upgraded = match ctx.old_object() {
                Some(old) => !old
                    .release_version()?
                    .is_some_and(|v| v.supports(Feature::Cilium)),
                None => false,
            };
            if !upgraded {
                return Ok(());
            }
        }

        let cidr = ctx.config().cilium_pod_cidr.clone();
        ctx.set_annotation(CILIUM_POD_CIDR, cidr);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ValidPodCidr;

#[async_trait]
impl ValidationRule for ValidPodCidr {
    fn name(&self) -> &'static str {
        "valid-pod-cidr"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        let Some(cidr) = ctx.object().str_at(POD_CIDR) else {
            return Ok(());
        };
        validate_ipv4_cidr(cidr)
            .map_err(|_| AdmissionError::not_allowed(format!("pod CIDR {cidr} is not a valid IPv4 CIDR")))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PodCidrUnchanged;

#[async_trait]
impl ValidationRule for PodCidrUnchanged {
    fn name(&self) -> &'static str {
        "pod-cidr-unchanged"
    }

    async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<()> {
        let old = ctx.request().old_object()?;
        let Some(previous) = old.str_at(POD_CIDR) else {
            return Ok(());
        };
        let current = ctx.object().str_at(POD_CIDR).unwrap_or_default();
        if previous != current {
            return Err(AdmissionError::not_allowed(format!(
                "pod CIDR must not be changed from {previous} to {current}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::Arc;
    use warden_core::{EngineConfig, ZoneSet};
    use warden_kube::{CustomObject, MockResolver, ResourceKind};

    use crate::env::Env;
    use crate::pipeline::{Mutator, Validator};
    use crate::request::ReviewRequest;

    fn env() -> Env {
        Env::new(
            EngineConfig::new(ZoneSet::parse("eu-west-1a").unwrap()),
            Arc::new(MockResolver::new()),
        )
    }

    fn aws_cluster(release: &str, spec: Value) -> CustomObject {
        CustomObject::from_value(
            ResourceKind::AwsCluster,
            json!({
                "metadata": {
                    "name": "a1b2c",
                    "namespace": "org-acme",
                    "labels": {
                        "release.warden.io/version": release,
                        "aws-operator.warden.io/version": "9.0.0",
                    },
                },
                "spec": spec,
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_defaults() {
        let request = ReviewRequest::new(
            ResourceKind::AwsCluster,
            Operation::Create,
            aws_cluster("16.0.0", json!({"provider": {"region": "eu-west-1"}})),
        );

        let patch = mutator().mutate(&request, &env()).await.unwrap();
        assert_eq!(patch.pending(POD_CIDR), Some(&json!("10.2.0.0/16")));
        assert_eq!(
            patch.pending(CREDENTIAL_SECRET),
            Some(&json!({"name": "credential-default", "namespace": "warden"}))
        );
        assert!(!patch.touches("/metadata/annotations"));
    }

    #[tokio::test]
    async fn test_cilium_annotation_on_create() {
        let request = ReviewRequest::new(
            ResourceKind::AwsCluster,
            Operation::Create,
            aws_cluster("18.0.0", json!({"provider": {"pods": {"cidrBlock": "10.5.0.0/16"}}})),
        );

        let patch = mutator().mutate(&request, &env()).await.unwrap();
        assert_eq!(
            patch.pending("/metadata/annotations/cilium.warden.io~1pod-cidr"),
            Some(&json!("100.64.0.0/12"))
        );
        assert!(!patch.touches(POD_CIDR));
    }

    #[tokio::test]
    async fn test_cilium_annotation_on_upgrade_only() {
        let spec = json!({"provider": {"pods": {"cidrBlock": "10.5.0.0/16"}}});
        let env = env();

        let upgrade = ReviewRequest::new(
            ResourceKind::AwsCluster,
            Operation::Update,
            aws_cluster("18.0.0", spec.clone()),
        )
        .with_old_object(aws_cluster("17.1.0", spec.clone()));
        assert_eq!(mutator().mutate(&upgrade, &env).await.unwrap().len(), 2);

        let unchanged = ReviewRequest::new(
            ResourceKind::AwsCluster,
            Operation::Update,
            aws_cluster("18.1.0", spec.clone()),
        )
        .with_old_object(aws_cluster("18.0.0", spec));
        assert!(mutator().mutate(&unchanged, &env).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pod_cidr_is_immutable() {
        let request = ReviewRequest::new(
            ResourceKind::AwsCluster,
            Operation::Update,
            aws_cluster("16.0.0", json!({"provider": {"pods": {"cidrBlock": "10.3.0.0/16"}}})),
        )
        .with_old_object(aws_cluster(
            "16.0.0",
            json!({"provider": {"pods": {"cidrBlock": "10.2.0.0/16"}}}),
        ));

        let decision = validator().validate(&request, &env()).await.unwrap();
        assert_eq!(
            decision.reason.as_deref(),
            Some("pod CIDR must not be changed from 10.2.0.0/16 to 10.3.0.0/16")
        );
    }

    #[tokio::test]
    async fn test_pod_cidr_format() {
        let request = ReviewRequest::new(
            ResourceKind::AwsCluster,
            Operation::Create,
            aws_cluster("16.0.0", json!({"provider": {"pods": {"cidrBlock": "10.2.0.0/33"}}})),
        );
        let decision = validator().validate(&request, &env()).await.unwrap();
        assert!(!decision.is_allowed());
    }
}
