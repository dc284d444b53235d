//! Tests for the entity graph, registration protocol and diagnostics

use super::*;
use crate::error::KubeModelError;
use chrono::{Duration, TimeZone, Utc};

fn window_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn new_set() -> KubeModelSet {
    let start = window_start();
    KubeModelSet::new(start, start + Duration::hours(1))
}

fn set_with_namespace() -> KubeModelSet {
    let mut kms = new_set();
    kms.register_cluster("cluster-uid").unwrap();
    kms.register_namespace("ns-uid", "default").unwrap();
    kms
}

#[test]
fn test_new_set_defaults() {
    let kms = new_set();
    assert!(kms.is_empty());
    assert_eq!(kms.metadata.object_count, 0);
    assert_eq!(kms.metadata.diagnostic_level, DiagnosticLevel::Info);
    assert!(kms.metadata.completed_at.is_none());
    assert!(kms.window.start < kms.window.end);
}

#[test]
fn test_register_cluster() {
    let mut kms = new_set();
    kms.register_cluster("cluster-uid").unwrap();
    assert_eq!(kms.cluster.as_ref().unwrap().uid, "cluster-uid");
    assert_eq!(kms.metadata.object_count, 0);

    // Same UID is a silent no-op
    kms.register_cluster("cluster-uid").unwrap();
    assert!(kms.get_warnings().is_empty());
}

#[test]
fn test_register_cluster_is_sticky() {
    let mut kms = new_set();
    kms.register_cluster("cluster-uid").unwrap();
    kms.register_cluster("another-uid").unwrap();

    assert_eq!(kms.cluster.as_ref().unwrap().uid, "cluster-uid");
    let warnings = kms.get_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].message,
        "RegisterCluster(another-uid): attempting to change cluster UID from cluster-uid to another-uid"
    );
}

#[test]
fn test_register_cluster_empty_uid() {
    let mut kms = new_set();
    let err = kms.register_cluster("").unwrap_err();
    assert_eq!(err, KubeModelError::InvalidClusterUid);
    assert!(kms.cluster.is_none());

    let errors = kms.get_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "RegisterCluster: uid is nil");
}

#[test]
fn test_register_namespace() {
    let kms = set_with_namespace();
    let ns = &kms.namespaces["ns-uid"];
    assert_eq!(ns.name, "default");
    assert_eq!(ns.cluster_uid, "cluster-uid");
    assert!(ns.labels.is_empty());
    assert_eq!(kms.namespace_by_name("default").unwrap().uid, "ns-uid");
    assert_eq!(kms.metadata.object_count, 1);
    assert!(kms.metadata.diagnostics.is_empty());
}

#[test]
fn test_register_namespace_without_cluster() {
    let mut kms = new_set();
    kms.register_namespace("ns-uid", "default").unwrap();

    assert_eq!(kms.namespaces["ns-uid"].cluster_uid, "");
    let warnings = kms.get_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].message, "RegisterNamespace(ns-uid, default): Cluster is nil");
}

#[test]
fn test_register_namespace_empty_uid() {
    let mut kms = new_set();
    let err = kms.register_namespace("", "").unwrap_err();
    assert_eq!(err.to_string(), "UID is nil for Namespace ''");
    assert_eq!(kms.metadata.object_count, 0);
    assert_eq!(kms.get_errors()[0].message, "UID is nil for Namespace ''");
}

#[test]
fn test_register_resource_quota() {
    let mut kms = set_with_namespace();
    kms.register_resource_quota("rq-uid", "test", "default").unwrap();

    let rq = &kms.resource_quotas["rq-uid"];
    assert_eq!(rq.name, "test");
    assert_eq!(rq.namespace_uid, "ns-uid");
    assert!(rq.spec.hard.requests.is_empty());
    assert!(rq.status.used.limits.is_empty());
    assert_eq!(kms.metadata.object_count, 2);
}

#[test]
fn test_register_resource_quota_missing_namespace() {
    let mut kms = new_set();
    kms.register_cluster("cluster-uid").unwrap();
    kms.register_resource_quota("rq-uid", "test", "missing").unwrap();

    assert_eq!(kms.resource_quotas["rq-uid"].namespace_uid, "");
    let warnings = kms.get_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].message,
        "RegisterResourceQuota(rq-uid, test, missing): missing namespace"
    );
}

#[test]
fn test_register_resource_quota_empty_uid() {
    let mut kms = set_with_namespace();
    let err = kms.register_resource_quota("", "test", "default").unwrap_err();
    assert_eq!(err.to_string(), "UID is nil for ResourceQuota 'test'");
    assert_eq!(kms.metadata.object_count, 1);
    assert_eq!(kms.get_errors().len(), 1);
}

#[test]
fn test_registration_is_idempotent_for_all_entities() {
    let mut kms = set_with_namespace();

    for _ in 0..2 {
        kms.register_namespace("ns-uid", "default").unwrap();
        kms.register_resource_quota("rq-uid", "quota", "default").unwrap();
        kms.register_node("node-uid", "node-1").unwrap();
        kms.register_owner("owner-uid", "web", "default", OwnerKind::Deployment, true)
            .unwrap();
        kms.register_pod("pod-uid", "web-abc", "default").unwrap();
        kms.register_container("container-uid", "app", "pod-uid").unwrap();
        kms.register_service("svc-uid", "web", "default").unwrap();
    }

    assert_eq!(kms.namespaces.len(), 1);
    assert_eq!(kms.resource_quotas.len(), 1);
    assert_eq!(kms.nodes.len(), 1);
    assert_eq!(kms.owners.len(), 1);
    assert_eq!(kms.pods.len(), 1);
    assert_eq!(kms.containers.len(), 1);
    assert_eq!(kms.services.len(), 1);
    assert_eq!(kms.metadata.object_count, 7);
    assert_eq!(kms.metadata.object_count as usize, kms.entity_count());
    assert!(kms.metadata.diagnostics.is_empty());
}

#[test]
fn test_empty_uid_rejected_for_all_entities() {
    let mut kms = set_with_namespace();
    let before = kms.metadata.object_count;

    assert!(kms.register_node("", "node").is_err());
    assert!(kms.register_owner("", "web", "default", OwnerKind::Job, false).is_err());
    assert!(kms.register_pod("", "pod", "default").is_err());
    assert!(kms.register_container("", "app", "pod").is_err());
    assert!(kms.register_service("", "svc", "default").is_err());

    assert_eq!(kms.metadata.object_count, before);
    assert_eq!(kms.get_errors().len(), 5);
}

#[test]
fn test_pod_with_missing_namespace() {
    let mut kms = new_set();
    kms.register_cluster("cluster-uid").unwrap();
    kms.register_pod("pod-uid", "web-abc", "not-yet").unwrap();

    assert_eq!(kms.pods["pod-uid"].namespace_uid, "");
    assert_eq!(kms.get_warnings().len(), 1);
    assert_eq!(kms.metadata.object_count, 1);
}

#[test]
fn test_container_keeps_first_name() {
    let mut kms = new_set();
    kms.register_container("container-uid", "first", "").unwrap();
    kms.register_container("container-uid", "second", "").unwrap();

    assert_eq!(kms.containers["container-uid"].name, "first");
    assert_eq!(kms.metadata.object_count, 1);
}

#[test]
fn test_container_resolves_pod() {
    let mut kms = set_with_namespace();
    kms.register_pod("pod-uid", "web", "default").unwrap();
    kms.register_container("container-uid", "app", "pod-uid").unwrap();
    assert_eq!(kms.containers["container-uid"].pod_uid, "pod-uid");

    kms.register_container("orphan-uid", "app", "missing-pod").unwrap();
    assert_eq!(kms.containers["orphan-uid"].pod_uid, "");
    assert_eq!(kms.get_warnings().len(), 1);
}

#[test]
fn test_owner_references_namespace() {
    let mut kms = set_with_namespace();
    kms.register_owner("owner-uid", "web", "default", OwnerKind::StatefulSet, true)
        .unwrap();

    let owner = &kms.owners["owner-uid"];
    assert_eq!(owner.owner_uid, "ns-uid");
    assert_eq!(owner.kind, OwnerKind::StatefulSet);
    assert!(owner.controller);
}

#[test]
fn test_service_and_node_reference_cluster() {
    let mut kms = set_with_namespace();
    kms.register_service("svc-uid", "web", "default").unwrap();
    kms.register_node("node-uid", "node-1").unwrap();

    assert_eq!(kms.services["svc-uid"].cluster_uid, "cluster-uid");
    assert_eq!(kms.services["svc-uid"].namespace_uid, "ns-uid");
    assert_eq!(kms.nodes["node-uid"].cluster_uid, "cluster-uid");
}

#[test]
fn test_link_pod_node_and_owner() {
    let mut kms = set_with_namespace();
    kms.register_node("node-uid", "node-1").unwrap();
    kms.register_owner("owner-uid", "web", "default", OwnerKind::ReplicaSet, true)
        .unwrap();
    kms.register_pod("pod-uid", "web-abc", "default").unwrap();

    kms.link_pod_node("pod-uid", "node-uid").unwrap();
    kms.link_pod_owner("pod-uid", "owner-uid").unwrap();
    // Linked values are never contradicted
    kms.link_pod_node("pod-uid", "other-node").unwrap();

    let pod = &kms.pods["pod-uid"];
    assert_eq!(pod.node_uid, "node-uid");
    assert_eq!(pod.owner_uid, "owner-uid");
    assert!(kms.get_warnings().is_empty());
}

#[test]
fn test_link_pod_missing_node_warns() {
    let mut kms = set_with_namespace();
    kms.register_pod("pod-uid", "web-abc", "default").unwrap();
    kms.link_pod_node("pod-uid", "ghost").unwrap();

    assert_eq!(kms.pods["pod-uid"].node_uid, "");
    assert_eq!(kms.get_warnings().len(), 1);
}

#[test]
fn test_labels_merge_without_overwrite() {
    let mut kms = set_with_namespace();
    let ns = kms.namespaces.get_mut("ns-uid").unwrap();

    ns.merge_labels(&BTreeMap::from([("app".to_string(), "x".to_string())]));
    ns.merge_labels(&BTreeMap::from([
        ("app".to_string(), "y".to_string()),
        ("team".to_string(), "core".to_string()),
    ]));

    assert_eq!(ns.labels["app"], "x");
    assert_eq!(ns.labels["team"], "core");
}

#[test]
fn test_set_request_stats() {
    let mut rq = ResourceQuota::default();
    rq.spec
        .hard
        .set_request(Resource::Cpu, Unit::Millicore, StatType::Avg, 250.0);
    rq.spec
        .hard
        .set_request(Resource::Cpu, Unit::Millicore, StatType::Max, 750.0);
    rq.status
        .used
        .set_limit(Resource::Memory, Unit::Byte, StatType::Max, 1024.0);

    let quantity = rq.spec.hard.requests.get(Resource::Cpu).unwrap();
    assert_eq!(quantity.resource, Resource::Cpu);
    assert_eq!(quantity.unit, Unit::Millicore);
    assert_eq!(quantity.values.len(), 2);
    assert_eq!(quantity.values.get(StatType::Avg), Some(250.0));
    assert_eq!(quantity.values.get(StatType::Max), Some(750.0));
    assert!(rq.spec.hard.limits.is_empty());
    assert_eq!(
        rq.status.used.limits.value(Resource::Memory, StatType::Max),
        Some(1024.0)
    );
}

#[test]
fn test_stats_ordering_violations() {
    let ok: Stats = [(StatType::Avg, 1.0), (StatType::Max, 2.0), (StatType::P85, 1.5), (StatType::P95, 1.8)]
        .into_iter()
        .collect();
    assert!(ok.ordering_violations().is_empty());

    let bad: Stats = [(StatType::Avg, 5.0), (StatType::Max, 2.0)].into_iter().collect();
    assert_eq!(bad.ordering_violations().len(), 1);

    let partial: Stats = [(StatType::P95, 1.0)].into_iter().collect();
    assert!(partial.ordering_violations().is_empty());
}

#[test]
fn test_diagnostic_gating() {
    let mut kms = new_set();
    kms.metadata.diagnostic_level = DiagnosticLevel::Warning;

    kms.info("dropped");
    kms.debug("dropped");
    kms.warn("kept");
    kms.error("always kept");

    assert_eq!(kms.metadata.diagnostics.len(), 2);
    assert!(kms.get_infos().is_empty());
    assert_eq!(kms.get_warnings()[0].message, "kept");
    assert_eq!(kms.get_errors()[0].message, "always kept");

    kms.metadata.diagnostic_level = DiagnosticLevel::Error;
    kms.warn("dropped");
    kms.error("kept again");
    assert_eq!(kms.get_errors().len(), 2);
    assert_eq!(kms.get_warnings().len(), 1);
}

#[test]
fn test_diagnostic_with_details() {
    let mut kms = new_set();
    kms.metadata.diagnostic_level = DiagnosticLevel::Trace;
    kms.trace("trace");
    kms.diagnostic_with_details(
        DiagnosticLevel::Debug,
        "query slow",
        BTreeMap::from([("query".to_string(), "namespace_uptime".to_string())]),
    );

    assert_eq!(kms.get_traces().len(), 1);
    let debugs = kms.get_debugs();
    assert_eq!(debugs[0].details.as_ref().unwrap()["query"], "namespace_uptime");
}

#[test]
fn test_complete_freezes_set() {
    let mut kms = set_with_namespace();
    kms.complete();
    assert!(kms.is_frozen());

    let err = kms.register_namespace("other", "other").unwrap_err();
    assert!(matches!(err, KubeModelError::Frozen { .. }));
    assert_eq!(kms.namespaces.len(), 1);
}

#[test]
fn test_complete_records_soft_invariant_warnings() {
    let mut kms = set_with_namespace();
    kms.register_resource_quota("rq-uid", "quota", "default").unwrap();
    let rq = kms.resource_quotas.get_mut("rq-uid").unwrap();
    rq.status
        .used
        .requests
        .set(Resource::Memory, Unit::Byte, StatType::Avg, 100.0);
    rq.status
        .used
        .requests
        .set(Resource::Memory, Unit::Byte, StatType::Max, 50.0);

    let outside = kms.window.end + Duration::hours(2);
    kms.namespaces
        .get_mut("ns-uid")
        .unwrap()
        .set_bounds(kms.window.start, outside);

    kms.complete();

    let warnings = kms.get_warnings();
    assert_eq!(warnings.len(), 2);
    assert!(warnings.iter().any(|w| w.message.contains("status.used.requests.memory")));
    assert!(warnings.iter().any(|w| w.message.contains("Namespace ns-uid")));
    assert!(kms.metadata.completed_at.is_some());
}

#[test]
fn test_rebuild_indexes() {
    let mut kms = set_with_namespace();
    let mut copy = KubeModelSet::new(kms.window.start, kms.window.end);
    copy.namespaces = std::mem::take(&mut kms.namespaces);
    assert!(copy.namespace_by_name("default").is_none());

    copy.rebuild_indexes();
    assert_eq!(copy.namespace_by_name("default").unwrap().uid, "ns-uid");
}

#[test]
fn test_rebuild_indexes_with_duplicate_names_is_stable() {
    let mut kms = new_set();
    kms.register_cluster("cluster-uid").unwrap();
    for uid in ["ns-a", "ns-b", "ns-c"] {
        kms.register_namespace(uid, "shared").unwrap();
    }
    assert_eq!(kms.namespace_by_name("shared").unwrap().uid, "ns-a");

    for _ in 0..8 {
        let mut copy = KubeModelSet::new(kms.window.start, kms.window.end);
        // Fresh maps get a fresh hasher seed
        copy.namespaces = kms.namespaces.clone().into_iter().collect();
        copy.rebuild_indexes();
        assert_eq!(copy.namespace_by_name("shared").unwrap().uid, "ns-a");
    }
}

#[test]
fn test_enum_labels() {
    assert_eq!(Unit::MillicoreSecond.as_str(), "m-s");
    assert_eq!("B-s".parse::<Unit>().unwrap(), Unit::ByteSecond);
    assert_eq!("".parse::<Provider>().unwrap(), Provider::Empty);
    assert_eq!("on_premises".parse::<Provider>().unwrap(), Provider::OnPremises);
    assert!("nope".parse::<Resource>().is_err());
    assert_eq!(OwnerKind::parse_kind("StatefulSet"), Some(OwnerKind::StatefulSet));
    assert_eq!(ServiceType::LoadBalancer.to_string(), "LoadBalancer");
    assert!(DiagnosticLevel::Error > DiagnosticLevel::Warning);
}
