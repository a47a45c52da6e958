//! End-to-end admission scenarios over the default rule sets

use serde_json::{Value, json};
use std::sync::Arc;
use warden_core::{AccessPolicy, EngineConfig, Identity, RngSource, ZoneSet};
use warden_engine::{Env, Mutator, Operation, ReviewCodec, ReviewRequest, Validator, rules};
use warden_kube::{CustomObject, MockResolver, ResourceKind};

const ZONES: &str = "eu-west-1a,eu-west-1b,eu-west-1c";

/// Engine environment with a fixed seed and an admin identity
fn env(resolver: MockResolver) -> Env {
    let config = EngineConfig::new(ZoneSet::parse(ZONES).unwrap())
        .with_rng(RngSource::Seeded(42))
        .with_access(AccessPolicy::new(["admin"], ["customers"]));
    Env::new(config, Arc::new(resolver))
}

fn object(kind: ResourceKind, name: &str, labels: Value, spec: Value) -> CustomObject {
    CustomObject::from_value(
        kind,
        json!({
            "apiVersion": format!("{}/{}", kind.group(), kind.version()),
            "kind": kind.kind(),
            "metadata": {"name": name, "namespace": "org-acme", "labels": labels},
            "spec": spec,
        }),
    )
    .unwrap()
}

fn release(version: &str, state: &str) -> CustomObject {
    CustomObject::from_value(
        ResourceKind::Release,
        json!({
            "apiVersion": "release.warden.io/v1alpha1",
            "kind": "Release",
            "metadata": {"name": format!("v{version}")},
            "spec": {
                "state": state,
                "components": [
                    {"name": "aws-operator", "version": "10.1.0"},
                    {"name": "cluster-operator", "version": "3.12.0"},
                ],
            },
        }),
    )
    .unwrap()
}

mod control_plane_defaults {
    use super::*;

    #[tokio::test]
    async fn test_zero_replicas_without_peer_become_three() {
        let cp = object(
            ResourceKind::ControlPlane,
            "a1b2c",
            json!({"release.warden.io/version": "14.0.0", "aws-operator.warden.io/version": "10.1.0"}),
            json!({"replicas": 0}),
        );
        let request = ReviewRequest::new(ResourceKind::ControlPlane, Operation::Create, cp);

        let patch = rules::control_plane::mutator()
            .mutate(&request, &env(MockResolver::new()))
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!([{"op": "replace", "path": "/spec/replicas", "value": 3}])
        );
    }

    #[tokio::test]
    async fn test_aws_control_plane_without_peer_gets_three_zones() {
        let acp = object(
            ResourceKind::AwsControlPlane,
            "a1b2c",
            json!({"release.warden.io/version": "14.0.0", "aws-operator.warden.io/version": "10.1.0"}),
            json!({}),
        );
        let request = ReviewRequest::new(ResourceKind::AwsControlPlane, Operation::Create, acp);

        let patch = rules::aws_control_plane::mutator()
            .mutate(&request, &env(MockResolver::new()))
            .await
            .unwrap();
        assert_eq!(
            patch.pending("/spec/availabilityZones"),
            Some(&json!(["eu-west-1a", "eu-west-1b", "eu-west-1c"]))
        );
    }
}

mod annotations {
    use super::*;

    async fn validate_batch_size(value: &str) -> bool {
        let mut document = object(
            ResourceKind::Cluster,
            "a1b2c",
            json!({"release.warden.io/version": "14.0.0"}),
            json!({}),
        )
        .document()
        .clone();
        document["metadata"]["annotations"] =
            json!({"alpha.aws.warden.io/update-max-batch-size": value});
        let request = ReviewRequest::new(
            ResourceKind::Cluster,
            Operation::Create,
            CustomObject::from_value(ResourceKind::Cluster, document).unwrap(),
        );

        rules::cluster::validator()
            .validate(&request, &env(MockResolver::new()))
            .await
            .unwrap()
            .is_allowed()
    }

    #[tokio::test]
    async fn test_batch_size() {
        assert!(!validate_batch_size("0").await);
        assert!(validate_batch_size("0.5").await);
        assert!(validate_batch_size("4").await);
        assert!(!validate_batch_size("1.5").await);
    }

    fn annotated_cluster(batch_size: &str) -> CustomObject {
        let mut document = object(
            ResourceKind::Cluster,
            "a1b2c",
            json!({"release.warden.io/version": "14.0.0"}),
            json!({}),
        )
        .document()
        .clone();
        document["metadata"]["annotations"] =
            json!({"alpha.aws.warden.io/update-max-batch-size": batch_size});
        CustomObject::from_value(ResourceKind::Cluster, document).unwrap()
    }

    #[tokio::test]
    async fn test_batch_size_update() {
        let update = |value: &str| {
            ReviewRequest::new(ResourceKind::Cluster, Operation::Update, annotated_cluster(value))
                .with_old_object(annotated_cluster("1"))
        };
        let env = env(MockResolver::new());

        let denied = rules::cluster::validator()
            .validate(&update("0"), &env)
            .await
            .unwrap();
        assert!(!denied.is_allowed());
        assert!(denied.reason.unwrap().contains("update-max-batch-size"));

        assert!(rules::cluster::validator()
            .validate(&update("0.5"), &env)
            .await
            .unwrap()
            .is_allowed());
    }
}

mod ha_scale_up {
    use super::*;

    const RELEASE: &str = "14.0.0";

    fn labels() -> Value {
        json!({"release.warden.io/version": RELEASE, "aws-operator.warden.io/version": "10.1.0"})
    }

    fn control_plane(replicas: i64) -> CustomObject {
        object(ResourceKind::ControlPlane, "a1b2c", labels(), json!({"replicas": replicas}))
    }

    fn aws_control_plane(zones: Value) -> CustomObject {
        object(
            ResourceKind::AwsControlPlane,
            "a1b2c",
            labels(),
            json!({"availabilityZones": zones}),
        )
    }

    #[tokio::test]
    async fn test_single_master_grows_to_three_zones() {
        let resolver = MockResolver::with_objects([
            control_plane(1),
            aws_control_plane(json!(["eu-west-1b"])),
        ]);
        let env = env(resolver.clone());

        // Replicas go first, while the zones still lag behind
        let request = ReviewRequest::new(ResourceKind::ControlPlane, Operation::Update, control_plane(3))
            .with_old_object(control_plane(1));
        let decision = rules::control_plane::validator()
            .validate(&request, &env)
            .await
            .unwrap();
        assert!(decision.is_allowed(), "{:?}", decision.reason);
        resolver.insert(control_plane(3));

        // The next AWSControlPlane update picks up the new replica count
        let current = aws_control_plane(json!(["eu-west-1b"]));
        let request = ReviewRequest::new(ResourceKind::AwsControlPlane, Operation::Update, current.clone())
            .with_old_object(current.clone());
        let patch = rules::aws_control_plane::mutator()
            .mutate(&request, &env)
            .await
            .unwrap();
        assert_eq!(
            patch.pending("/spec/availabilityZones"),
            Some(&json!(["eu-west-1a", "eu-west-1b", "eu-west-1c"]))
        );

        let mut document = current.document().clone();
        let wire = ReviewCodec::new().patch(&patch).unwrap();
        json_patch::patch(&mut document, &wire.0).unwrap();
        let grown = CustomObject::from_value(ResourceKind::AwsControlPlane, document).unwrap();

        let request = ReviewRequest::new(ResourceKind::AwsControlPlane, Operation::Update, grown)
            .with_old_object(current);
        let decision = rules::aws_control_plane::validator()
            .validate(&request, &env)
            .await
            .unwrap();
        assert!(decision.is_allowed(), "{:?}", decision.reason);
    }

    #[tokio::test]
    async fn test_zones_cannot_lead_replicas() {
        let resolver = MockResolver::with_objects([
            control_plane(1),
            aws_control_plane(json!(["eu-west-1b"])),
        ]);
        let request = ReviewRequest::new(
            ResourceKind::AwsControlPlane,
            Operation::Update,
            aws_control_plane(json!(["eu-west-1a", "eu-west-1b", "eu-west-1c"])),
        )
        .with_old_object(aws_control_plane(json!(["eu-west-1b"])));

        let decision = rules::aws_control_plane::validator()
            .validate(&request, &env(resolver))
            .await
            .unwrap();
        assert!(!decision.is_allowed());
    }
}

mod upgrades {
    use super::*;

    fn cluster(version: &str) -> CustomObject {
        object(
            ResourceKind::Cluster,
            "a1b2c",
            json!({"release.warden.io/version": version}),
            json!({}),
        )
    }

    async fn upgrade(from: &str, to: &str, user: Identity) -> warden_engine::Decision {
        let resolver = MockResolver::with_objects([
            release("3.0.0", "active"),
            release("3.2.0", "deprecated"),
            release("4.0.0", "active"),
        ]);
        let request = ReviewRequest::new(ResourceKind::Cluster, Operation::Update, cluster(to))
            .with_old_object(cluster(from))
            .with_user(user);

        rules::cluster::validator()
            .validate(&request, &env(resolver))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_deprecated_target_is_denied() {
        let decision = upgrade("3.0.0", "3.2.0", Identity::new("admin")).await;
        assert_eq!(
            decision.reason.as_deref(),
            Some("release 3.2.0 is deprecated and cannot be used as an upgrade target")
        );
    }

    #[tokio::test]
    async fn test_next_major_is_allowed() {
        assert!(upgrade("3.0.0", "4.0.0", Identity::new("admin")).await.is_allowed());
    }

    #[tokio::test]
    async fn test_controllers_are_not_restricted() {
        let controller = Identity::new("system:serviceaccount:warden:cluster-operator");
        assert!(upgrade("3.0.0", "3.2.0", controller).await.is_allowed());
    }

    #[tokio::test]
    async fn test_restricted_group_member_is_checked() {
        let customer = Identity::new("bob").with_group("customers");
        assert!(!upgrade("3.0.0", "3.2.0", customer).await.is_allowed());
    }
}

mod idempotence {
    use super::*;

    /// Mutate, apply the patch, mutate again: the second patch must be empty
    async fn assert_idempotent(mutator: &dyn Mutator, object: CustomObject) {
        let resolver = MockResolver::with_objects([
            release("16.0.0", "active"),
            object_of_cluster(),
        ]);
        let env = env(resolver);
        let kind = object.kind();

        let first = mutator
            .mutate(&ReviewRequest::new(kind, Operation::Create, object.clone()), &env)
            .await
            .unwrap();
        assert!(!first.is_empty(), "{kind} was not defaulted");

        let mut document = object.document().clone();
        let wire = ReviewCodec::new().patch(&first).unwrap();
        json_patch::patch(&mut document, &wire.0).unwrap();

        let patched = CustomObject::from_value(kind, document).unwrap();
        let second = mutator
            .mutate(&ReviewRequest::new(kind, Operation::Create, patched), &env)
            .await
            .unwrap();
        assert!(second.is_empty(), "{kind} second patch: {second:?}");
    }

    fn object_of_cluster() -> CustomObject {
        object(
            ResourceKind::Cluster,
            "a1b2c",
            json!({"release.warden.io/version": "16.0.0"}),
            json!({}),
        )
    }

    fn bare(kind: ResourceKind, name: &str) -> CustomObject {
        object(kind, name, json!({"warden.io/cluster": "a1b2c"}), json!({}))
    }

    #[tokio::test]
    async fn test_control_plane() {
        assert_idempotent(
            &rules::control_plane::mutator(),
            bare(ResourceKind::ControlPlane, "a1b2c"),
        )
        .await;
    }

    #[tokio::test]
    async fn test_aws_control_plane() {
        assert_idempotent(
            &rules::aws_control_plane::mutator(),
            bare(ResourceKind::AwsControlPlane, "a1b2c"),
        )
        .await;
    }

    #[tokio::test]
    async fn test_aws_cluster() {
        assert_idempotent(
            &rules::aws_cluster::mutator(),
            bare(ResourceKind::AwsCluster, "a1b2c"),
        )
        .await;
    }

    #[tokio::test]
    async fn test_node_pool() {
        assert_idempotent(
            &rules::node_pool::mutator(),
            bare(ResourceKind::AwsMachineDeployment, "np001"),
        )
        .await;
    }
}
