//! Label keys and protected label policy
//!
//! Labels under the reserved `warden.io` domain describe ownership and
//! lineage of the cluster resources. Once set, they must survive every update
//! unchanged. Version labels are the exception: they move on every upgrade.

use std::collections::BTreeMap;

/// Reserved label domain
pub const PROTECTED_DOMAIN: &str = "warden.io";

/// Release version of a cluster-family resource
pub const RELEASE_VERSION: &str = "release.warden.io/version";
/// Version of the AWS operator reconciling the resource
pub const AWS_OPERATOR_VERSION: &str = "aws-operator.warden.io/version";
/// Version of the cluster operator reconciling the resource
pub const CLUSTER_OPERATOR_VERSION: &str = "cluster-operator.warden.io/version";
/// Cluster ID
pub const CLUSTER: &str = "warden.io/cluster";
/// Control plane ID
pub const CONTROL_PLANE: &str = "warden.io/control-plane";
/// Node pool ID
pub const MACHINE_DEPLOYMENT: &str = "warden.io/machine-deployment";
/// Owning organization
pub const ORGANIZATION: &str = "warden.io/organization";

/// Labels expected to change on upgrade
pub const VERSION_LABELS: &[&str] = &[RELEASE_VERSION, AWS_OPERATOR_VERSION, CLUSTER_OPERATOR_VERSION];

/// Prefixes under the reserved domain that carry no ownership information
pub const MUTABLE_PREFIXES: &[&str] = &["tag.provider.warden.io/", "priority.warden.io/"];

/// A protected label change that is not allowed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabelViolation {
    #[error("label {key} must not be removed")]
    Removed { key: String },

    #[error("label {key} must not be changed from {old} to {new}")]
    Changed { key: String, old: String, new: String },
}

/// Immutability policy for protected labels
#[derive(Debug, Clone)]
pub struct LabelPolicy {
    domain: String,
    version_labels: Vec<String>,
    mutable_prefixes: Vec<String>,
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            domain: PROTECTED_DOMAIN.to_string(),
            version_labels: VERSION_LABELS.iter().map(|s| s.to_string()).collect(),
            mutable_prefixes: MUTABLE_PREFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl LabelPolicy {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            version_labels: Vec::new(),
            mutable_prefixes: Vec::new(),
        }
    }

    pub fn with_version_label(mut self, key: impl Into<String>) -> Self {
        self.version_labels.push(key.into());
        self
    }

    pub fn with_mutable_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.mutable_prefixes.push(prefix.into());
        self
    }

    /// Key prefix is the reserved domain or one of its sub-domains
    pub fn is_protected(&self, key: &str) -> bool {
        let Some((prefix, _)) = key.split_once('/') else {
            return false;
        };
        prefix == self.domain
            || prefix
                .strip_suffix(self.domain.as_str())
                .is_some_and(|sub| sub.ends_with('.'))
    }

    pub fn is_version_label(&self, key: &str) -> bool {
        self.version_labels.iter().any(|k| k == key)
    }

    pub fn is_mutable(&self, key: &str) -> bool {
        self.mutable_prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }

    /// Check a label update
    ///
    /// Returns the first violation in key order so the message is stable.
    pub fn check_update(
        &self,
        old: &BTreeMap<String, String>,
        new: &BTreeMap<String, String>,
    ) -> Result<(), LabelViolation> {
        for (key, old_value) in old {
            if !self.is_protected(key) || self.is_mutable(key) {
                continue;
            }
            match new.get(key) {
                None => return Err(LabelViolation::Removed { key: key.clone() }),
                Some(new_value) if new_value != old_value && !self.is_version_label(key) => {
                    return Err(LabelViolation::Changed {
                        key: key.clone(),
                        old: old_value.clone(),
                        new: new_value.clone(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
