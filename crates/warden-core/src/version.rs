//! Release versions and version-gated features
//!
//! Every cluster-family resource carries a release label. Which defaults and
//! which checks apply depends on that release, so every gate in the rule
//! chains goes through [`ReleaseVersion::supports`].
//!
//! Thresholds are compared against the `major.minor.patch` core of a release,
//! which means `16.0.0-beta1` already belongs to the `16.0.0` generation.

use semver::{BuildMetadata, Prerelease, Version};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Feature introduced at a fixed release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Control planes with more than one replica
    HaMasters,
    /// Newer schema generation of the infrastructure resources
    NewSchema,
    /// Release is reconciled by the cluster-API controller family
    CapiControllers,
    /// Release ships Cilium as CNI
    Cilium,
}

impl Feature {
    /// First release carrying the feature
    pub const fn threshold(&self) -> Version {
        match self {
            Self::HaMasters => Version::new(11, 4, 0),
            Self::NewSchema => Version::new(16, 0, 0),
            Self::CapiControllers => Version::new(20, 0, 0),
            Self::Cilium => Version::new(18, 0, 0),
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HaMasters => write!(f, "high-availability control planes"),
            Self::NewSchema => write!(f, "new infrastructure schema"),
            Self::CapiControllers => write!(f, "cluster-API controllers"),
            Self::Cilium => write!(f, "Cilium CNI"),
        }
    }
}

/// Parsed release version
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseVersion(Version);

impl ReleaseVersion {
    /// Parse a release label value, accepting an optional `v` prefix
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let raw = trimmed.strip_prefix('v').unwrap_or(trimmed);
        Version::parse(raw)
            .map(Self)
            .map_err(|source| CoreError::ParsingFailed {
                value: value.to_string(),
                source,
            })
    }

    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(Version::new(major, minor, patch))
    }

    pub fn version(&self) -> &Version {
        &self.0
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    /// Version without pre-release or build metadata
    pub fn core(&self) -> Version {
        Version {
            major: self.0.major,
            minor: self.0.minor,
            patch: self.0.patch,
            pre: Prerelease::EMPTY,
            build: BuildMetadata::EMPTY,
        }
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.core() >= feature.threshold()
    }

    /// Name of the `Release` resource describing this version
    pub fn release_name(&self) -> String {
        format!("v{}", self.0)
    }
}

impl std::fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ReleaseVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Parse a label value and check for HA support in one step
pub fn is_ha_version(value: &str) -> Result<bool> {
    Ok(ReleaseVersion::parse(value)?.supports(Feature::HaMasters))
}

/// Lifecycle state of a `Release` resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseState {
    #[default]
    Active,
    Deprecated,
    Wip,
    Preview,
}

impl ReleaseState {
    /// Unknown states are treated as active
    pub fn from_spec(value: Option<&str>) -> Self {
        match value.map(|v| v.to_lowercase()).as_deref() {
            Some("deprecated") => Self::Deprecated,
            Some("wip") => Self::Wip,
            Some("preview") => Self::Preview,
            _ => Self::Active,
        }
    }
}

impl std::fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Deprecated => write!(f, "deprecated"),
            Self::Wip => write!(f, "wip"),
            Self::Preview => write!(f, "preview"),
        }
    }
}

/// Reasons an upgrade from one release to another is refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpgradeViolation {
    #[error("downgrading the major release version from {from} to {to} is not allowed")]
    MajorDowngrade { from: ReleaseVersion, to: ReleaseVersion },

    #[error("upgrading from {from} to {to} skips a major release version, upgrade one major version at a time")]
    MajorSkip { from: ReleaseVersion, to: ReleaseVersion },

    #[error("release {to} is deprecated and cannot be used as an upgrade target")]
    Deprecated { to: ReleaseVersion },
}

/// Check a release upgrade
///
/// Same-version updates are no-ops. Minor and patch movement is unrestricted
/// within the allowed major range.
pub fn check_upgrade(
    current: &ReleaseVersion,
    target: &ReleaseVersion,
    target_state: ReleaseState,
) -> std::result::Result<(), UpgradeViolation> {
    if current == target {
        return Ok(());
    }
    if target.major() < current.major() {
        return Err(UpgradeViolation::MajorDowngrade {
            from: current.clone(),
            to: target.clone(),
        });
    }
    if target.major() > current.major().saturating_add(1) {
        return Err(UpgradeViolation::MajorSkip {
            from: current.clone(),
            to: target.clone(),
        });
    }
    if target_state == ReleaseState::Deprecated {
        return Err(UpgradeViolation::Deprecated { to: target.clone() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> ReleaseVersion {
        ReleaseVersion::parse(s).unwrap()
    }

    #[test]
    fn test_parse_accepts_v_prefix() {
        assert_eq!(v("v16.1.0"), v("16.1.0"));
        assert_eq!(v("16.1.0").release_name(), "v16.1.0");
    }

    #[test]
    fn test_parse_failure_is_error() {
        for input in ["", "v", "16", "16.1", "sixteen", "16.1.0.1", "1.2.3-"] {
            let err = ReleaseVersion::parse(input).unwrap_err();
            assert!(matches!(err, CoreError::ParsingFailed { .. }), "{input}");
        }
    }

    #[test]
    fn test_ha_gate_monotonic() {
        assert!(!v("11.3.9").supports(Feature::HaMasters));
        assert!(!v("10.99.0").supports(Feature::HaMasters));
        assert!(v("11.4.0").supports(Feature::HaMasters));
        assert!(v("11.4.1").supports(Feature::HaMasters));
        assert!(v("12.0.0").supports(Feature::HaMasters));
        assert!(v("11.4.0-beta1").supports(Feature::HaMasters));
    }

    #[test]
    fn test_is_ha_version_parsing_failed() {
        assert!(is_ha_version("11.4.0").unwrap());
        assert!(!is_ha_version("9.0.0").unwrap());
        assert!(matches!(
            is_ha_version("not-a-version"),
            Err(CoreError::ParsingFailed { .. })
        ));
    }

    #[test]
    fn test_other_features() {
        assert!(!v("15.2.1").supports(Feature::NewSchema));
        assert!(v("16.0.0").supports(Feature::NewSchema));
        assert!(!v("17.9.9").supports(Feature::Cilium));
        assert!(v("18.0.0-alpha1").supports(Feature::Cilium));
        assert!(!v("19.3.0").supports(Feature::CapiControllers));
        assert!(v("20.0.0-alpha1").supports(Feature::CapiControllers));
    }

    #[test]
    fn test_release_state_from_spec() {
        assert_eq!(ReleaseState::from_spec(Some("deprecated")), ReleaseState::Deprecated);
        assert_eq!(ReleaseState::from_spec(Some("Active")), ReleaseState::Active);
        assert_eq!(ReleaseState::from_spec(None), ReleaseState::Active);
    }

    #[test]
    fn test_upgrade_same_version_is_noop() {
        assert!(check_upgrade(&v("3.0.0"), &v("3.0.0"), ReleaseState::Deprecated).is_ok());
    }

    #[test]
    fn test_upgrade_rules() {
        let active = ReleaseState::Active;
        assert!(check_upgrade(&v("3.0.0"), &v("3.2.0"), active).is_ok());
        assert!(check_upgrade(&v("3.2.0"), &v("3.0.1"), active).is_ok());
        assert!(check_upgrade(&v("3.0.0"), &v("4.0.0"), active).is_ok());

        assert!(matches!(
            check_upgrade(&v("4.0.0"), &v("3.9.0"), active),
            Err(UpgradeViolation::MajorDowngrade { .. })
        ));
        assert!(matches!(
            check_upgrade(&v("3.0.0"), &v("5.0.0"), active),
            Err(UpgradeViolation::MajorSkip { .. })
        ));
        assert!(matches!(
            check_upgrade(&v("3.0.0"), &v("3.2.0"), ReleaseState::Deprecated),
            Err(UpgradeViolation::Deprecated { .. })
        ));
    }

    #[test]
    fn test_upgrade_at_largest_major() {
        let max = u64::MAX;
        let current = v(&format!("{max}.0.0"));
        assert!(check_upgrade(&current, &v(&format!("{max}.1.0")), ReleaseState::Active).is_ok());
        assert!(matches!(
            check_upgrade(&current, &v("1.0.0"), ReleaseState::Active),
            Err(UpgradeViolation::MajorDowngrade { .. })
        ));
    }
}
