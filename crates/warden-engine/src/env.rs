//! Shared, read-only dependencies of the rule chains

use std::sync::Arc;
use warden_core::EngineConfig;
use warden_kube::Resolver;

/// Static configuration plus the resolver, shared by every request
#[derive(Clone)]
pub struct Env {
    pub config: Arc<EngineConfig>,
    pub resolver: Arc<dyn Resolver>,
}

impl Env {
    pub fn new(config: EngineConfig, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            config: Arc::new(config),
            resolver,
        }
    }
}
