//! Rule sets of the supported resource kinds
//!
//! Each submodule exposes a `mutator()` and a `validator()` chain. Rules that
//! apply to every kind live in [`common`].

pub mod aws_cluster;
pub mod aws_control_plane;
pub mod cluster;
pub mod common;
pub mod control_plane;
pub mod node_pool;

use warden_kube::ResourceKind;

use crate::registry::Registry;

/// Registry with the rule sets of every admitted kind
pub fn default_registry() -> Registry {
    Registry::new()
        .with_mutator(ResourceKind::Cluster, cluster::mutator())
        .with_validator(ResourceKind::Cluster, cluster::validator())
        .with_mutator(ResourceKind::AwsCluster, aws_cluster::mutator())
        .with_validator(ResourceKind::AwsCluster, aws_cluster::validator())
        .with_mutator(ResourceKind::ControlPlane, control_plane::mutator())
        .with_validator(ResourceKind::ControlPlane, control_plane::validator())
        .with_mutator(ResourceKind::AwsControlPlane, aws_control_plane::mutator())
        .with_validator(ResourceKind::AwsControlPlane, aws_control_plane::validator())
        .with_mutator(ResourceKind::AwsMachineDeployment, node_pool::mutator())
        .with_validator(ResourceKind::AwsMachineDeployment, node_pool::validator())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_admitted_kind_is_registered() {
        let registry = default_registry();
        for kind in ResourceKind::ALL.into_iter().filter(ResourceKind::is_admitted) {
            assert!(registry.mutator(kind).is_some(), "{kind} has no mutator");
            assert!(registry.validator(kind).is_some(), "{kind} has no validator");
        }
        assert!(registry.validator(ResourceKind::Release).is_none());
    }
}
