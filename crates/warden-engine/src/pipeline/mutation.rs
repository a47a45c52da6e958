//! Mutation pipeline
//!
//! Rules never see each other's output applied: every precondition is checked
//! against the original object. A value defaulted by an earlier rule is read
//! back from the pending patch through [`MutationContext::value`], so later
//! rules stay consistent with earlier ones within the same response.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::rngs::StdRng;
use serde_json::{Map, Value};
use warden_core::labels::RELEASE_VERSION;
use warden_core::{EngineConfig, Feature, Patch, PatchOperation, ReleaseVersion, pointer};
use warden_kube::{CustomObject, Resolver, ResourceKind, ResourceReference, Result};

use super::{Mutator, release_supports};
use crate::env::Env;
use crate::request::{Operation, ReviewRequest};

/// Request-scoped state shared by the rules of one mutation chain
pub struct MutationContext<'a> {
    request: &'a ReviewRequest,
    object: &'a CustomObject,
    env: &'a Env,
    rng: StdRng,
    patch: Patch,
    siblings: HashMap<ResourceKind, Option<CustomObject>>,
}

impl<'a> MutationContext<'a> {
    pub fn new(request: &'a ReviewRequest, env: &'a Env) -> Result<Self> {
        Ok(Self {
            request,
            object: request.object()?,
            env,
            rng: env.config.rng.rng(),
            patch: Patch::new(),
            siblings: HashMap::new(),
        })
    }

    pub fn request(&self) -> &'a ReviewRequest {
        self.request
    }

    /// The object as sent by the API server, without pending changes
    pub fn object(&self) -> &'a CustomObject {
        self.object
    }

    pub fn old_object(&self) -> Option<&'a CustomObject> {
        self.request.old_object.as_ref()
    }

    pub fn config(&self) -> &'a EngineConfig {
        &self.env.config
    }

    pub fn resolver(&self) -> &'a dyn Resolver {
        self.env.resolver.as_ref()
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Resource of `kind` sharing the object's name, if created yet
    ///
    /// Looked up once per chain; later rules see the same answer.
    pub async fn sibling(&mut self, kind: ResourceKind) -> Result<Option<CustomObject>> {
        if let Some(cached) = self.siblings.get(&kind) {
            return Ok(cached.clone());
        }
        let found = match ResourceReference::sibling(kind, self.object) {
            Some(reference) => self.resolver().get(&reference).await?.found(),
            None => None,
        };
        self.siblings.insert(kind, found.clone());
        Ok(found)
    }

    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    pub fn into_patch(self) -> Patch {
        self.patch
    }

    /// Value an earlier rule of this chain wrote at `path`
    pub fn pending(&self, path: &str) -> Option<&Value> {
        self.patch.pending(path)
    }

    /// Effective value at `path`: pending first, then the original object
    pub fn value(&self, path: &str) -> Option<&Value> {
        self.pending(path)
            .or_else(|| self.object.pointer(path))
            .filter(|v| !v.is_null())
    }

    /// Whether `path` holds a meaningful value
    ///
    /// Empty strings, lists and maps count as unset.
    pub fn is_set(&self, path: &str) -> bool {
        self.value(path).is_some_and(|v| !is_blank(v))
    }

    pub fn str_value(&self, path: &str) -> Option<&str> {
        self.value(path)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.str_value(&pointer(["metadata", "labels", key]))
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.str_value(&pointer(["metadata", "annotations", key]))
    }

    /// Release of the object, including a release label defaulted earlier
    pub fn release_version(&self) -> Result<Option<ReleaseVersion>> {
        Ok(self
            .label(RELEASE_VERSION)
            .map(ReleaseVersion::parse)
            .transpose()?)
    }

    /// Whether the (possibly defaulted) release has `feature`
    pub fn supports(&self, feature: Feature) -> Result<bool> {
        Ok(self.release_version()?.is_some_and(|v| v.supports(feature)))
    }

    /// Write `value` at `path`
    ///
    /// Missing parent objects are created first. Existing values are
    /// replaced, missing ones added.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        let tokens: Vec<&str> = path.split('/').skip(1).collect();
        for depth in 1..tokens.len() {
            let parent = format!("/{}", tokens[..depth].join("/"));
            if self.value(&parent).is_none() {
                self.patch
                    .push(PatchOperation::add(parent, Value::Object(Map::new())));
            }
        }

        let operation = if self.value(path).is_some() {
            PatchOperation::replace(path, value)
        } else {
            PatchOperation::add(path, value)
        };
        self.patch.push(operation);
    }

    pub fn set_label(&mut self, key: &str, value: impl Into<Value>) {
        self.set(&pointer(["metadata", "labels", key]), value);
    }

    pub fn set_annotation(&mut self, key: &str, value: impl Into<Value>) {
        self.set(&pointer(["metadata", "annotations", key]), value);
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// A single defaulting step
#[async_trait]
pub trait MutationRule: Send + Sync {
    fn name(&self) -> &'static str;

    async fn mutate(&self, ctx: &mut MutationContext<'_>) -> Result<()>;
}

/// Ordered mutation rules for one resource kind
#[derive(Default)]
pub struct MutationChain {
    create: Vec<Box<dyn MutationRule>>,
    update: Vec<Box<dyn MutationRule>>,
    skip_feature: Option<Feature>,
}

impl MutationChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_create(mut self, rule: impl MutationRule + 'static) -> Self {
        self.create.push(Box::new(rule));
        self
    }

    pub fn on_update(mut self, rule: impl MutationRule + 'static) -> Self {
        self.update.push(Box::new(rule));
        self
    }

    /// Add a rule to both the create and the update chain
    pub fn always(self, rule: impl MutationRule + Clone + 'static) -> Self {
        self.on_create(rule.clone()).on_update(rule)
    }

    /// Leave objects on releases with `feature` untouched
    pub fn skip_releases_with(mut self, feature: Feature) -> Self {
        self.skip_feature = Some(feature);
        self
    }

    pub fn rule_names(&self, operation: Operation) -> Vec<&'static str> {
        self.rules(operation).iter().map(|r| r.name()).collect()
    }

    fn rules(&self, operation: Operation) -> &[Box<dyn MutationRule>] {
        match operation {
            Operation::Create => &self.create,
            Operation::Update => &self.update,
            _ => &[],
        }
    }
}

#[async_trait]
impl Mutator for MutationChain {
    async fn mutate(&self, request: &ReviewRequest, env: &Env) -> Result<Patch> {
        if request.dry_run {
            tracing::debug!(uid = %request.uid, "dry run, skipping mutation");
            return Ok(Patch::new());
        }

        let rules = self.rules(request.operation);
        if rules.is_empty() {
            return Ok(Patch::new());
        }

        if let Some(feature) = self.skip_feature {
            if release_supports(request, feature)? {
                tracing::debug!(uid = %request.uid, %feature, "release handled elsewhere, skipping mutation");
                return Ok(Patch::new());
            }
        }

        let mut ctx = MutationContext::new(request, env)?;
        for rule in rules {
            let before = ctx.patch().len();
            rule.mutate(&mut ctx).await?;
            tracing::trace!(
                uid = %request.uid,
                rule = rule.name(),
                operations = ctx.patch().len() - before,
                "mutation rule applied"
            );
        }
        Ok(ctx.into_patch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warden_core::{PatchOp, ZoneSet};
    use warden_kube::{MockResolver, ResourceKind};

    fn env() -> Env {
        Env::new(
            EngineConfig::new(ZoneSet::parse("eu-west-1a,eu-west-1b,eu-west-1c").unwrap()),
            Arc::new(MockResolver::new()),
        )
    }

    fn request(operation: Operation, object: serde_json::Value) -> ReviewRequest {
        let object = CustomObject::from_value(ResourceKind::ControlPlane, object).unwrap();
        ReviewRequest::new(ResourceKind::ControlPlane, operation, object)
    }

    #[derive(Clone)]
    struct SetReplicas;

    #[async_trait]
    impl MutationRule for SetReplicas {
        fn name(&self) -> &'static str {
            "set-replicas"
        }

        async fn mutate(&self, ctx: &mut MutationContext<'_>) -> Result<()> {
            if !ctx.is_set("/spec/replicas") {
                ctx.set("/spec/replicas", 3);
            }
            Ok(())
        }
    }

    #[derive(Clone)]
    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl MutationRule for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn mutate(&self, _ctx: &mut MutationContext<'_>) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_set_creates_parents() {
        let env = env();
        let req = request(Operation::Create, json!({"metadata": {"name": "a"}}));
        let mut ctx = MutationContext::new(&req, &env).unwrap();

        ctx.set_label("release.warden.io/version", "16.0.0");
        ctx.set_label("warden.io/cluster", "a1b2c");

        let ops = ctx.patch().operations();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0], PatchOperation::add("/metadata/labels", json!({})));
        assert_eq!(ops[1].path, "/metadata/labels/release.warden.io~1version");
        assert_eq!(ops[2].op, PatchOp::Add);
        assert_eq!(ctx.release_version().unwrap(), Some(ReleaseVersion::new(16, 0, 0)));
    }

    #[test]
    fn test_set_replaces_existing() {
        let env = env();
        let req = request(
            Operation::Update,
            json!({"metadata": {"name": "a"}, "spec": {"replicas": 0}}),
        );
        let mut ctx = MutationContext::new(&req, &env).unwrap();
        ctx.set("/spec/replicas", 3);

        assert_eq!(
            ctx.patch().operations(),
            &[PatchOperation::replace("/spec/replicas", 3)]
        );
        assert_eq!(ctx.value("/spec/replicas"), Some(&json!(3)));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let env = env();
        let req = request(
            Operation::Create,
            json!({"metadata": {"name": "a"}, "spec": {"instanceType": "", "zones": [], "ref": {}}}),
        );
        let ctx = MutationContext::new(&req, &env).unwrap();
        assert!(!ctx.is_set("/spec/instanceType"));
        assert!(!ctx.is_set("/spec/zones"));
        assert!(!ctx.is_set("/spec/ref"));
        assert!(ctx.value("/spec/ref").is_some());
    }

    #[tokio::test]
    async fn test_sibling_is_resolved_once() {
        let resolver = MockResolver::new();
        let env = Env::new(
            EngineConfig::new(ZoneSet::parse("eu-west-1a").unwrap()),
            Arc::new(resolver.clone()),
        );
        let req = request(
            Operation::Create,
            json!({"metadata": {"name": "a1b2c", "namespace": "org-acme"}}),
        );
        let mut ctx = MutationContext::new(&req, &env).unwrap();

        assert!(ctx.sibling(ResourceKind::AwsControlPlane).await.unwrap().is_none());
        let absent = resolver.operation_counts().gets;
        assert_eq!(absent, 3);

        assert!(ctx.sibling(ResourceKind::AwsControlPlane).await.unwrap().is_none());
        assert_eq!(resolver.operation_counts().gets, absent);
    }

    #[tokio::test]
    async fn test_dry_run_invokes_no_rule() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = MutationChain::new().always(Counting(calls.clone()));
        let req = request(Operation::Create, json!({"metadata": {"name": "a"}})).with_dry_run(true);

        let patch = chain.mutate(&req, &env()).await.unwrap();
        assert!(patch.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_operation_selects_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = MutationChain::new()
            .on_create(SetReplicas)
            .on_update(Counting(calls.clone()));
        let env = env();

        let create = chain
            .mutate(&request(Operation::Create, json!({"metadata": {"name": "a"}})), &env)
            .await
            .unwrap();
        assert_eq!(create.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let delete = chain
            .mutate(&request(Operation::Delete, json!({"metadata": {"name": "a"}})), &env)
            .await
            .unwrap();
        assert!(delete.is_empty());

        chain
            .mutate(&request(Operation::Update, json!({"metadata": {"name": "a"}})), &env)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skipped_release() {
        let chain = MutationChain::new()
            .on_create(SetReplicas)
            .skip_releases_with(Feature::CapiControllers);
        let req = request(
            Operation::Create,
            json!({"metadata": {"name": "a", "labels": {"release.warden.io/version": "20.0.0"}}}),
        );
        assert!(chain.mutate(&req, &env()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_release_is_parsing_failure() {
        let chain = MutationChain::new()
            .on_create(SetReplicas)
            .skip_releases_with(Feature::CapiControllers);
        let req = request(
            Operation::Create,
            json!({"metadata": {"name": "a", "labels": {"release.warden.io/version": "next"}}}),
        );
        let err = chain.mutate(&req, &env()).await.unwrap_err();
        assert!(matches!(err, warden_kube::AdmissionError::ParsingFailed(_)));
    }
}
