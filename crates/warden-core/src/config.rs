//! Static engine configuration
//!
//! Built once at startup and shared read-only by every request. All checks
//! happen in [`EngineConfig::validate`]; a config that passed validation never
//! fails at request time.

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::net::Ipv4Addr;

use crate::error::{CoreError, Result};
use crate::identity::AccessPolicy;
use crate::labels::LabelPolicy;
use crate::zones::ZoneSet;

pub const DEFAULT_MASTER_INSTANCE_TYPE: &str = "m5.xlarge";
pub const DEFAULT_POD_CIDR: &str = "10.2.0.0/16";
pub const DEFAULT_CILIUM_POD_CIDR: &str = "100.64.0.0/12";
pub const DEFAULT_CREDENTIAL_SECRET: &str = "credential-default";
pub const DEFAULT_CREDENTIAL_NAMESPACE: &str = "warden";

/// Source of randomness for zone allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RngSource {
    /// Fresh generator seeded from OS entropy for every request
    #[default]
    Entropy,
    /// Same fixed seed for every request
    Seeded(u64),
}

impl RngSource {
    /// Generator for a single request
    pub fn rng(&self) -> StdRng {
        match self {
            Self::Entropy => StdRng::from_rng(&mut rand::rng()),
            Self::Seeded(seed) => StdRng::seed_from_u64(*seed),
        }
    }
}

/// Secret holding the cloud credentials a cluster is provisioned with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretReference {
    pub name: String,
    pub namespace: String,
}

impl Default for SecretReference {
    fn default() -> Self {
        Self {
            name: DEFAULT_CREDENTIAL_SECRET.to_string(),
            namespace: DEFAULT_CREDENTIAL_NAMESPACE.to_string(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Valid availability zones
    pub zones: ZoneSet,

    /// Instance types allowed for control-plane nodes
    pub master_instance_types: Vec<String>,

    /// Instance types allowed for worker nodes
    pub worker_instance_types: Vec<String>,

    /// Instance type used when a control plane does not name one
    pub default_master_instance_type: String,

    /// Default cluster pod CIDR
    pub pod_cidr: String,

    /// Pod CIDR handed to Cilium on releases that ship it
    pub cilium_pod_cidr: String,

    /// Default credential secret for new clusters
    pub credential_secret: SecretReference,

    /// Callers subject to restricted checks
    pub access: AccessPolicy,

    /// Protected label policy
    pub labels: LabelPolicy,

    /// Randomness for zone allocation
    pub rng: RngSource,
}

impl EngineConfig {
    pub fn new(zones: ZoneSet) -> Self {
        let defaults = vec![
            DEFAULT_MASTER_INSTANCE_TYPE.to_string(),
            "m5.2xlarge".to_string(),
            "m5.4xlarge".to_string(),
        ];
        Self {
            zones,
            master_instance_types: defaults.clone(),
            worker_instance_types: defaults,
            default_master_instance_type: DEFAULT_MASTER_INSTANCE_TYPE.to_string(),
            pod_cidr: DEFAULT_POD_CIDR.to_string(),
            cilium_pod_cidr: DEFAULT_CILIUM_POD_CIDR.to_string(),
            credential_secret: SecretReference::default(),
            access: AccessPolicy::default(),
            labels: LabelPolicy::default(),
            rng: RngSource::default(),
        }
    }

    pub fn with_master_instance_types(mut self, types: Vec<String>) -> Self {
        self.master_instance_types = types;
        self
    }

    pub fn with_worker_instance_types(mut self, types: Vec<String>) -> Self {
        self.worker_instance_types = types;
        self
    }

    pub fn with_default_master_instance_type(mut self, instance_type: impl Into<String>) -> Self {
        self.default_master_instance_type = instance_type.into();
        self
    }

    pub fn with_pod_cidr(mut self, cidr: impl Into<String>) -> Self {
        self.pod_cidr = cidr.into();
        self
    }

    pub fn with_cilium_pod_cidr(mut self, cidr: impl Into<String>) -> Self {
        self.cilium_pod_cidr = cidr.into();
        self
    }

    pub fn with_credential_secret(mut self, secret: SecretReference) -> Self {
        self.credential_secret = secret;
        self
    }

    pub fn with_access(mut self, access: AccessPolicy) -> Self {
        self.access = access;
        self
    }

    pub fn with_rng(mut self, rng: RngSource) -> Self {
        self.rng = rng;
        self
    }

    pub fn is_master_instance_type(&self, instance_type: &str) -> bool {
        self.master_instance_types.iter().any(|t| t == instance_type)
    }

    pub fn is_worker_instance_type(&self, instance_type: &str) -> bool {
        self.worker_instance_types.iter().any(|t| t == instance_type)
    }

    /// Check the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.master_instance_types.is_empty() {
            return Err(CoreError::invalid_config(
                "at least one master instance type must be configured",
            ));
        }
        if self.worker_instance_types.is_empty() {
            return Err(CoreError::invalid_config(
                "at least one worker instance type must be configured",
            ));
        }
        if !self.is_master_instance_type(&self.default_master_instance_type) {
            return Err(CoreError::invalid_config(format!(
                "default master instance type '{}' is not in the allowed list {:?}",
                self.default_master_instance_type, self.master_instance_types
            )));
        }
        validate_ipv4_cidr(&self.pod_cidr)?;
        validate_ipv4_cidr(&self.cilium_pod_cidr)?;
        if self.credential_secret.name.is_empty() || self.credential_secret.namespace.is_empty() {
            return Err(CoreError::invalid_config(
                "credential secret name and namespace must not be empty",
            ));
        }
        Ok(())
    }
}

/// Validate an IPv4 CIDR such as `10.2.0.0/16`
pub fn validate_ipv4_cidr(value: &str) -> Result<()> {
    let invalid = || CoreError::invalid_config(format!("'{value}' is not a valid IPv4 CIDR"));

    let (address, prefix) = value.split_once('/').ok_or_else(invalid)?;
    address.parse::<Ipv4Addr>().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    if prefix > 32 {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn config() -> EngineConfig {
        EngineConfig::new(ZoneSet::parse("eu-west-1a,eu-west-1b,eu-west-1c").unwrap())
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_default_master_must_be_allowed() {
        let cfg = config().with_default_master_instance_type("t2.micro");
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
        assert!(err.to_string().contains("t2.micro"));
    }

    #[test]
    fn test_empty_instance_types_rejected() {
        assert!(config().with_worker_instance_types(vec![]).validate().is_err());
        assert!(config().with_master_instance_types(vec![]).validate().is_err());
    }

    #[test]
    fn test_validate_ipv4_cidr() {
        assert!(validate_ipv4_cidr("10.2.0.0/16").is_ok());
        assert!(validate_ipv4_cidr("0.0.0.0/0").is_ok());
        assert!(validate_ipv4_cidr("10.2.0.0").is_err());
        assert!(validate_ipv4_cidr("10.2.0.0/33").is_err());
        assert!(validate_ipv4_cidr("10.2.0/16").is_err());
        assert!(validate_ipv4_cidr("fd00::/64").is_err());
        assert!(config().with_pod_cidr("nope").validate().is_err());
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let source = RngSource::Seeded(9);
        let a: u64 = source.rng().random();
        let b: u64 = source.rng().random();
        assert_eq!(a, b);
    }
}
