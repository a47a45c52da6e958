//! Resolver backed by the Kubernetes API

use async_trait::async_trait;
use kube::Client;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use serde_json::Value;

use super::{Lookup, Resolver, RetryPolicy};
use crate::error::{AdmissionError, Result};
use crate::object::CustomObject;
use crate::reference::ResourceReference;

/// Field manager used for sibling backfills
pub const FIELD_MANAGER: &str = "warden-admission";

/// Resolves resources through the API server
#[derive(Clone)]
pub struct KubeResolver {
    client: Client,
    retry: RetryPolicy,
}

impl KubeResolver {
    pub fn new(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Create a resolver using the default kubeconfig or in-cluster config
    pub async fn try_default(retry: RetryPolicy) -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client, retry))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn api(&self, reference: &ResourceReference) -> Api<DynamicObject> {
        let ar = reference.kind.api_resource();
        match &reference.namespace {
            Some(ns) if reference.kind.is_namespaced() => {
                Api::namespaced_with(self.client.clone(), ns, &ar)
            }
            _ => Api::all_with(self.client.clone(), &ar),
        }
    }
}

#[async_trait]
impl Resolver for KubeResolver {
    async fn get(&self, reference: &ResourceReference) -> Result<Lookup> {
        let api = &self.api(reference);
        let name = reference.name.as_str();

        let lookup = self
            .retry
            .lookup(reference, move || async move {
                api.get_opt(name).await.map_err(AdmissionError::Api)
            })
            .await?;

        lookup.try_map(|obj| CustomObject::new(reference.kind, obj))
    }

    async fn merge_patch(&self, reference: &ResourceReference, patch: &Value) -> Result<()> {
        let api = &self.api(reference);
        let name = reference.name.as_str();
        let params = &PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PatchParams::default()
        };

        self.retry
            .run(reference, move || async move {
                api.patch(name, params, &Patch::Merge(patch))
                    .await
                    .map(|_| ())
                    .map_err(AdmissionError::Api)
            })
            .await?;

        tracing::debug!(resource = %reference, "merge patch applied");
        Ok(())
    }
}
