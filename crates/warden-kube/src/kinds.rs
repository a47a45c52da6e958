//! Supported resource kinds
//!
//! The set of kinds is closed. Each kind is bound to a handler at registration
//! time, so routing never happens on free-form strings.

use kube::core::{ApiResource, GroupVersionKind};

pub const CLUSTER_API_GROUP: &str = "cluster.x-k8s.io";
pub const INFRASTRUCTURE_GROUP: &str = "infrastructure.warden.io";
pub const RELEASE_GROUP: &str = "release.warden.io";

/// A resource kind known to the webhooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Cluster,
    AwsCluster,
    ControlPlane,
    AwsControlPlane,
    AwsMachineDeployment,
    /// Looked up for upgrade checks, never admitted
    Release,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        Self::Cluster,
        Self::AwsCluster,
        Self::ControlPlane,
        Self::AwsControlPlane,
        Self::AwsMachineDeployment,
        Self::Release,
    ];

    pub fn group(&self) -> &'static str {
        match self {
            Self::Cluster => CLUSTER_API_GROUP,
            Self::Release => RELEASE_GROUP,
            _ => INFRASTRUCTURE_GROUP,
        }
    }

    pub fn version(&self) -> &'static str {
        match self {
            Self::Release => "v1alpha1",
            _ => "v1alpha3",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cluster => "Cluster",
            Self::AwsCluster => "AWSCluster",
            Self::ControlPlane => "ControlPlane",
            Self::AwsControlPlane => "AWSControlPlane",
            Self::AwsMachineDeployment => "AWSMachineDeployment",
            Self::Release => "Release",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            Self::Cluster => "clusters",
            Self::AwsCluster => "awsclusters",
            Self::ControlPlane => "controlplanes",
            Self::AwsControlPlane => "awscontrolplanes",
            Self::AwsMachineDeployment => "awsmachinedeployments",
            Self::Release => "releases",
        }
    }

    pub fn is_namespaced(&self) -> bool {
        !matches!(self, Self::Release)
    }

    /// Whether requests for this kind are admitted by the webhooks
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Self::Release)
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(self.group(), self.version(), self.kind())
    }

    pub fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk_with_plural(&self.gvk(), self.plural())
    }

    /// Resolve a kind from group and kind name, ignoring the version
    ///
    /// Several schema versions of the same kind are served at once, so the
    /// version is not part of the match.
    pub fn from_group_kind(group: &str, kind: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.group() == group && k.kind() == kind)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_group_kind() {
        assert_eq!(
            ResourceKind::from_group_kind("infrastructure.warden.io", "AWSControlPlane"),
            Some(ResourceKind::AwsControlPlane)
        );
        assert_eq!(
            ResourceKind::from_group_kind("cluster.x-k8s.io", "Cluster"),
            Some(ResourceKind::Cluster)
        );
        // right kind, wrong group
        assert_eq!(ResourceKind::from_group_kind("infrastructure.warden.io", "Cluster"), None);
        assert_eq!(ResourceKind::from_group_kind("apps", "Deployment"), None);
    }

    #[test]
    fn test_api_resource() {
        let ar = ResourceKind::AwsMachineDeployment.api_resource();
        assert_eq!(ar.api_version, "infrastructure.warden.io/v1alpha3");
        assert_eq!(ar.plural, "awsmachinedeployments");
        assert_eq!(ar.kind, "AWSMachineDeployment");
    }

    #[test]
    fn test_release_is_lookup_only() {
        assert!(!ResourceKind::Release.is_admitted());
        assert!(!ResourceKind::Release.is_namespaced());
        assert_eq!(ResourceKind::ALL.iter().filter(|k| k.is_admitted()).count(), 5);
    }
}
