//! Handler registry
//!
//! Binds each admitted [`ResourceKind`] to at most one mutator and one
//! validator. Requests for kinds without a handler are denied by the gateway.

use std::collections::BTreeMap;
use std::sync::Arc;
use warden_kube::ResourceKind;

use crate::pipeline::{Mutator, Validator};

/// Kind to handler bindings
#[derive(Default, Clone)]
pub struct Registry {
    mutators: BTreeMap<ResourceKind, Arc<dyn Mutator>>,
    validators: BTreeMap<ResourceKind, Arc<dyn Validator>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a mutator, replacing any earlier binding for `kind`
    pub fn with_mutator(mut self, kind: ResourceKind, mutator: impl Mutator + 'static) -> Self {
        self.mutators.insert(kind, Arc::new(mutator));
        self
    }

    /// Bind a validator, replacing any earlier binding for `kind`
    pub fn with_validator(
        mut self,
        kind: ResourceKind,
        validator: impl Validator + 'static,
    ) -> Self {
        self.validators.insert(kind, Arc::new(validator));
        self
    }

    pub fn mutator(&self, kind: ResourceKind) -> Option<&dyn Mutator> {
        self.mutators.get(&kind).map(|m| m.as_ref())
    }

    pub fn validator(&self, kind: ResourceKind) -> Option<&dyn Validator> {
        self.validators.get(&kind).map(|v| v.as_ref())
    }

    pub fn mutated_kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.mutators.keys().copied()
    }

    pub fn validated_kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.validators.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{MutationChain, ValidationChain};

    #[test]
    fn test_bindings() {
        let registry = Registry::new()
            .with_mutator(ResourceKind::ControlPlane, MutationChain::new())
            .with_validator(ResourceKind::ControlPlane, ValidationChain::new())
            .with_validator(ResourceKind::Cluster, ValidationChain::new());

        assert!(registry.mutator(ResourceKind::ControlPlane).is_some());
        assert!(registry.mutator(ResourceKind::Cluster).is_none());
        assert_eq!(
            registry.validated_kinds().collect::<Vec<_>>(),
            vec![ResourceKind::Cluster, ResourceKind::ControlPlane]
        );
    }
}
