//! Command-line and environment configuration

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use warden_core::{AccessPolicy, EngineConfig, SecretReference, ZoneSet};
use warden_engine::codec::DEFAULT_MAX_BODY_BYTES;
use warden_kube::RetryPolicy;

use crate::error::{CliError, Result};

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author = "Warden Contributors")]
#[command(version)]
#[command(about = "Admission webhooks for AWS workload clusters", long_about = None)]
pub struct Args {
    /// Listen address
    #[arg(long, env = "WARDEN_ADDRESS", default_value = "0.0.0.0:8443")]
    pub address: SocketAddr,

    /// PEM certificate chain served to the API server
    #[arg(long, env = "WARDEN_TLS_CERT_FILE")]
    pub tls_cert_file: PathBuf,

    /// PEM private key of the certificate
    #[arg(long, env = "WARDEN_TLS_KEY_FILE")]
    pub tls_key_file: PathBuf,

    /// Valid availability zones (comma-separated)
    #[arg(long, env = "WARDEN_AVAILABILITY_ZONES", value_delimiter = ',', required = true)]
    pub availability_zones: Vec<String>,

    /// Instance types allowed for control-plane nodes (comma-separated)
    #[arg(long, env = "WARDEN_MASTER_INSTANCE_TYPES", value_delimiter = ',')]
    pub master_instance_types: Vec<String>,

    /// Instance types allowed for worker nodes (comma-separated)
    #[arg(long, env = "WARDEN_WORKER_INSTANCE_TYPES", value_delimiter = ',')]
    pub worker_instance_types: Vec<String>,

    /// Instance type given to control planes that do not name one
    #[arg(long, env = "WARDEN_DEFAULT_MASTER_INSTANCE_TYPE")]
    pub default_master_instance_type: Option<String>,

    /// Default cluster pod CIDR
    #[arg(long, env = "WARDEN_POD_CIDR")]
    pub pod_cidr: Option<String>,

    /// Pod CIDR annotated on clusters whose release ships Cilium
    #[arg(long, env = "WARDEN_CILIUM_POD_CIDR")]
    pub cilium_pod_cidr: Option<String>,

    /// Name of the default credential secret
    #[arg(long, env = "WARDEN_CREDENTIAL_SECRET_NAME")]
    pub credential_secret_name: Option<String>,

    /// Namespace of the default credential secret
    #[arg(long, env = "WARDEN_CREDENTIAL_SECRET_NAMESPACE")]
    pub credential_secret_namespace: Option<String>,

    /// Users subject to restricted checks (comma-separated)
    #[arg(long, env = "WARDEN_ADMIN_USERS", value_delimiter = ',')]
    pub admin_users: Vec<String>,

    /// Groups subject to restricted checks (comma-separated)
    #[arg(long, env = "WARDEN_RESTRICTED_GROUPS", value_delimiter = ',')]
    pub restricted_groups: Vec<String>,

    /// Attempts per resource lookup
    #[arg(long, env = "WARDEN_RETRY_ATTEMPTS", default_value_t = warden_kube::resolver::DEFAULT_ATTEMPTS)]
    pub retry_attempts: u32,

    /// Delay between lookup attempts in milliseconds
    #[arg(long, env = "WARDEN_RETRY_DELAY_MS", default_value_t = 1000)]
    pub retry_delay_ms: u64,

    /// Largest accepted admission review body in bytes
    #[arg(long, env = "WARDEN_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Emit logs as JSON
    #[arg(long, env = "WARDEN_LOG_JSON")]
    pub log_json: bool,
}

impl Args {
    /// Build and validate the engine configuration
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let zones = ZoneSet::new(self.availability_zones.iter().cloned())?;
        let mut config = EngineConfig::new(zones).with_access(AccessPolicy::new(
            non_empty(&self.admin_users),
            non_empty(&self.restricted_groups),
        ));

        if !self.master_instance_types.is_empty() {
            config = config.with_master_instance_types(non_empty(&self.master_instance_types));
        }
        if !self.worker_instance_types.is_empty() {
            config = config.with_worker_instance_types(non_empty(&self.worker_instance_types));
        }
        if let Some(instance_type) = &self.default_master_instance_type {
            config = config.with_default_master_instance_type(instance_type.trim());
        }
        if let Some(cidr) = &self.pod_cidr {
            config = config.with_pod_cidr(cidr.trim());
        }
        if let Some(cidr) = &self.cilium_pod_cidr {
            config = config.with_cilium_pod_cidr(cidr.trim());
        }
        if self.credential_secret_name.is_some() || self.credential_secret_namespace.is_some() {
            let mut secret = SecretReference::default();
            if let Some(name) = &self.credential_secret_name {
                secret.name = name.trim().to_string();
            }
            if let Some(namespace) = &self.credential_secret_namespace {
                secret.namespace = namespace.trim().to_string();
            }
            config = config.with_credential_secret(secret);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        if self.retry_attempts == 0 {
            return Err(CliError::config_with_help(
                "retry attempts must be at least 1",
                "use --retry-attempts 1 to disable retries",
            ));
        }
        Ok(RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_delay_ms),
        ))
    }
}

/// Trimmed, non-empty entries of a comma-separated list
fn non_empty(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
