//! The KubeModelSet snapshot and its registration protocol

use super::{
    Bounded, Cluster, Container, Metadata, Namespace, Node, Owner, OwnerKind, Pod,
    ResourceQuota, Service, Window,
};
use crate::error::KubeModelError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lookup tables derived from the entity maps.
#[derive(Debug, Clone, Default, PartialEq)]
struct Indexes {
    namespace_by_name: HashMap<String, String>,
}

/// Single-cluster, single-window inventory snapshot.
///
/// Entity maps are public so producers can enrich entities after
/// registration; new entities must go through the `register_*` methods to
/// keep `metadata.object_count` and the name index consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeModelSet {
    pub metadata: Metadata,
    pub window: Window,
    pub cluster: Option<Cluster>,
    #[serde(default)]
    pub namespaces: HashMap<String, Namespace>,
    #[serde(default)]
    pub resource_quotas: HashMap<String, ResourceQuota>,
    #[serde(default)]
    pub nodes: HashMap<String, Node>,
    #[serde(default)]
    pub owners: HashMap<String, Owner>,
    #[serde(default)]
    pub pods: HashMap<String, Pod>,
    #[serde(default)]
    pub containers: HashMap<String, Container>,
    #[serde(default)]
    pub services: HashMap<String, Service>,
    #[serde(skip)]
    idx: Indexes,
}

impl KubeModelSet {
    /// Create an empty set for `[start, end)` stamped with the current time.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::with_created_at(start, end, Utc::now())
    }

    pub fn with_created_at(start: DateTime<Utc>, end: DateTime<Utc>, created_at: DateTime<Utc>) -> Self {
        Self {
            metadata: Metadata::new(created_at),
            window: Window::new(start, end),
            cluster: None,
            namespaces: HashMap::new(),
            resource_quotas: HashMap::new(),
            nodes: HashMap::new(),
            owners: HashMap::new(),
            pods: HashMap::new(),
            containers: HashMap::new(),
            services: HashMap::new(),
            idx: Indexes::default(),
        }
    }

    /// True when no cluster and no entities have been registered.
    pub fn is_empty(&self) -> bool {
        self.cluster.is_none() && self.entity_count() == 0
    }

    /// Number of entities across all maps, excluding the cluster.
    pub fn entity_count(&self) -> usize {
        self.namespaces.len()
            + self.resource_quotas.len()
            + self.nodes.len()
            + self.owners.len()
            + self.pods.len()
            + self.containers.len()
            + self.services.len()
    }

    pub fn is_frozen(&self) -> bool {
        self.metadata.completed_at.is_some()
    }

    /// Namespace registered under `name`, if any.
    pub fn namespace_by_name(&self, name: &str) -> Option<&Namespace> {
        self.idx
            .namespace_by_name
            .get(name)
            .and_then(|uid| self.namespaces.get(uid))
    }

    /// Rebuild derived lookup tables after the maps were filled directly,
    /// e.g. by a decoder.
    ///
    /// When several namespaces share a name the smallest UID wins, so the
    /// result does not depend on map iteration order.
    pub fn rebuild_indexes(&mut self) {
        let mut namespaces: Vec<&Namespace> = self
            .namespaces
            .values()
            .filter(|ns| !ns.name.is_empty())
            .collect();
        namespaces.sort_by(|a, b| a.uid.cmp(&b.uid));

        let mut by_name = HashMap::with_capacity(namespaces.len());
        for ns in namespaces {
            by_name
                .entry(ns.name.clone())
                .or_insert_with(|| ns.uid.clone());
        }
        self.idx.namespace_by_name = by_name;
    }

    /// Register the cluster. Cluster identity is sticky: a later call with a
    /// different UID records a warning and is ignored.
    pub fn register_cluster(&mut self, uid: &str) -> Result<(), KubeModelError> {
        self.ensure_mutable()?;

        if uid.is_empty() {
            return Err(self.reject(KubeModelError::InvalidClusterUid));
        }

        match &self.cluster {
            Some(existing) if existing.uid == uid => {}
            Some(existing) => {
                let message = format!(
                    "RegisterCluster({uid}): attempting to change cluster UID from {} to {uid}",
                    existing.uid
                );
                self.warn(message);
            }
            None => {
                self.cluster = Some(Cluster {
                    uid: uid.to_string(),
                    ..Default::default()
                });
            }
        }

        Ok(())
    }

    pub fn register_namespace(&mut self, uid: &str, name: &str) -> Result<(), KubeModelError> {
        self.ensure_mutable()?;
        self.check_uid(uid, "Namespace", name)?;
        if self.namespaces.contains_key(uid) {
            return Ok(());
        }

        let cluster_uid = self.cluster_uid_or_warn(|| format!("RegisterNamespace({uid}, {name})"));

        self.namespaces.insert(
            uid.to_string(),
            Namespace {
                uid: uid.to_string(),
                cluster_uid,
                name: name.to_string(),
                ..Default::default()
            },
        );
        if !name.is_empty() {
            self.idx
                .namespace_by_name
                .entry(name.to_string())
                .or_insert_with(|| uid.to_string());
        }
        self.metadata.object_count += 1;

        Ok(())
    }

    pub fn register_resource_quota(
        &mut self,
        uid: &str,
        name: &str,
        namespace: &str,
    ) -> Result<(), KubeModelError> {
        self.ensure_mutable()?;
        self.check_uid(uid, "ResourceQuota", name)?;
        if self.resource_quotas.contains_key(uid) {
            return Ok(());
        }

        let namespace_uid = self.namespace_uid_or_warn(namespace, || {
            format!("RegisterResourceQuota({uid}, {name}, {namespace})")
        });

        self.resource_quotas.insert(
            uid.to_string(),
            ResourceQuota {
                uid: uid.to_string(),
                namespace_uid,
                name: name.to_string(),
                ..Default::default()
            },
        );
        self.metadata.object_count += 1;

        Ok(())
    }

    pub fn register_node(&mut self, uid: &str, name: &str) -> Result<(), KubeModelError> {
        self.ensure_mutable()?;
        self.check_uid(uid, "Node", name)?;
        if self.nodes.contains_key(uid) {
            return Ok(());
        }

        let cluster_uid = self.cluster_uid_or_warn(|| format!("RegisterNode({uid}, {name})"));

        self.nodes.insert(
            uid.to_string(),
            Node {
                uid: uid.to_string(),
                cluster_uid,
                name: name.to_string(),
                ..Default::default()
            },
        );
        self.metadata.object_count += 1;

        Ok(())
    }

    pub fn register_owner(
        &mut self,
        uid: &str,
        name: &str,
        namespace: &str,
        kind: OwnerKind,
        controller: bool,
    ) -> Result<(), KubeModelError> {
        self.ensure_mutable()?;
        self.check_uid(uid, "Owner", name)?;
        if self.owners.contains_key(uid) {
            return Ok(());
        }

        let owner_uid = self.namespace_uid_or_warn(namespace, || {
            format!("RegisterOwner({uid}, {name}, {namespace})")
        });

        self.owners.insert(
            uid.to_string(),
            Owner {
                uid: uid.to_string(),
                owner_uid,
                name: name.to_string(),
                kind,
                controller,
                labels: Default::default(),
                annotations: Default::default(),
                start: None,
                end: None,
            },
        );
        self.metadata.object_count += 1;

        Ok(())
    }

    /// Register a pod. Node and owner references are attached afterwards
    /// with [`link_pod_node`](Self::link_pod_node) and
    /// [`link_pod_owner`](Self::link_pod_owner).
    pub fn register_pod(&mut self, uid: &str, name: &str, namespace: &str) -> Result<(), KubeModelError> {
        self.ensure_mutable()?;
        self.check_uid(uid, "Pod", name)?;
        if self.pods.contains_key(uid) {
            return Ok(());
        }

        let namespace_uid = self.namespace_uid_or_warn(namespace, || {
            format!("RegisterPod({uid}, {name}, {namespace})")
        });

        self.pods.insert(
            uid.to_string(),
            Pod {
                uid: uid.to_string(),
                namespace_uid,
                name: name.to_string(),
                ..Default::default()
            },
        );
        self.metadata.object_count += 1;

        Ok(())
    }

    pub fn register_container(&mut self, uid: &str, name: &str, pod_uid: &str) -> Result<(), KubeModelError> {
        self.ensure_mutable()?;
        self.check_uid(uid, "Container", name)?;
        if self.containers.contains_key(uid) {
            return Ok(());
        }

        let pod_uid = if self.pods.contains_key(pod_uid) {
            pod_uid.to_string()
        } else {
            self.warn(format!("RegisterContainer({uid}, {name}, {pod_uid}): missing pod"));
            String::new()
        };

        self.containers.insert(
            uid.to_string(),
            Container {
                uid: uid.to_string(),
                pod_uid,
                name: name.to_string(),
                ..Default::default()
            },
        );
        self.metadata.object_count += 1;

        Ok(())
    }

    pub fn register_service(&mut self, uid: &str, name: &str, namespace: &str) -> Result<(), KubeModelError> {
        self.ensure_mutable()?;
        self.check_uid(uid, "Service", name)?;
        if self.services.contains_key(uid) {
            return Ok(());
        }

        let cluster_uid = self.cluster_uid_or_warn(|| format!("RegisterService({uid}, {name}, {namespace})"));
        let namespace_uid = self.namespace_uid_or_warn(namespace, || {
            format!("RegisterService({uid}, {name}, {namespace})")
        });

        self.services.insert(
            uid.to_string(),
            Service {
                uid: uid.to_string(),
                cluster_uid,
                namespace_uid,
                name: name.to_string(),
                ..Default::default()
            },
        );
        self.metadata.object_count += 1;

        Ok(())
    }

    /// Attach a pod to its node. An already linked pod is left untouched.
    pub fn link_pod_node(&mut self, pod_uid: &str, node_uid: &str) -> Result<(), KubeModelError> {
        self.ensure_mutable()?;
        let node_known = self.nodes.contains_key(node_uid);

        let Some(pod) = self.pods.get_mut(pod_uid) else {
            self.warn(format!("LinkPodNode({pod_uid}, {node_uid}): missing pod"));
            return Ok(());
        };
        if !pod.node_uid.is_empty() {
            return Ok(());
        }
        if node_known {
            pod.node_uid = node_uid.to_string();
        } else {
            self.warn(format!("LinkPodNode({pod_uid}, {node_uid}): missing node"));
        }

        Ok(())
    }

    /// Attach a pod to its controlling owner. An already linked pod is left
    /// untouched.
    pub fn link_pod_owner(&mut self, pod_uid: &str, owner_uid: &str) -> Result<(), KubeModelError> {
        self.ensure_mutable()?;
        let owner_known = self.owners.contains_key(owner_uid);

        let Some(pod) = self.pods.get_mut(pod_uid) else {
            self.warn(format!("LinkPodOwner({pod_uid}, {owner_uid}): missing pod"));
            return Ok(());
        };
        if !pod.owner_uid.is_empty() {
            return Ok(());
        }
        if owner_known {
            pod.owner_uid = owner_uid.to_string();
        } else {
            self.warn(format!("LinkPodOwner({pod_uid}, {owner_uid}): missing owner"));
        }

        Ok(())
    }

    /// Check soft invariants, then stamp `completed_at` and freeze the set.
    ///
    /// Statistic ordering violations and bounds outside the window are
    /// recorded as warnings.
    pub fn complete(&mut self) {
        if self.is_frozen() {
            return;
        }

        let mut warnings = Vec::new();

        for rq in self.resource_quotas.values() {
            for (section, quantities) in rq.quantities() {
                for quantity in quantities.iter() {
                    for violation in quantity.values.ordering_violations() {
                        warnings.push(format!(
                            "ResourceQuota {} {section}.{}: {violation}",
                            rq.uid, quantity.resource
                        ));
                    }
                }
            }
        }

        let window = self.window;
        let mut check = |kind: &str, uid: &str, entity: &dyn Bounded| {
            let outside = [entity.start(), entity.end()]
                .into_iter()
                .flatten()
                .any(|t| !window.contains_inclusive(t));
            if outside {
                warnings.push(format!("{kind} {uid} has bounds outside the window"));
            }
        };
        if let Some(cluster) = &self.cluster {
            check("Cluster", &cluster.uid, cluster);
        }
        self.namespaces.iter().for_each(|(uid, e)| check("Namespace", uid, e));
        self.resource_quotas.iter().for_each(|(uid, e)| check("ResourceQuota", uid, e));
        self.nodes.iter().for_each(|(uid, e)| check("Node", uid, e));
        self.owners.iter().for_each(|(uid, e)| check("Owner", uid, e));
        self.pods.iter().for_each(|(uid, e)| check("Pod", uid, e));
        self.containers.iter().for_each(|(uid, e)| check("Container", uid, e));
        self.services.iter().for_each(|(uid, e)| check("Service", uid, e));

        warnings.sort();
        for warning in warnings {
            self.warn(warning);
        }

        self.metadata.completed_at = Some(Utc::now());
    }

    fn ensure_mutable(&self) -> Result<(), KubeModelError> {
        match self.metadata.completed_at {
            Some(completed_at) => Err(KubeModelError::Frozen { completed_at }),
            None => Ok(()),
        }
    }

    fn check_uid(&mut self, uid: &str, kind: &'static str, name: &str) -> Result<(), KubeModelError> {
        if uid.is_empty() {
            return Err(self.reject(KubeModelError::InvalidUid {
                kind,
                name: name.to_string(),
            }));
        }
        Ok(())
    }

    /// Record `err` as an error diagnostic and hand it back to the caller.
    fn reject(&mut self, err: KubeModelError) -> KubeModelError {
        self.error(err.to_string());
        err
    }

    fn cluster_uid_or_warn(&mut self, context: impl FnOnce() -> String) -> String {
        match &self.cluster {
            Some(cluster) => cluster.uid.clone(),
            None => {
                let message = format!("{}: Cluster is nil", context());
                self.warn(message);
                String::new()
            }
        }
    }

    fn namespace_uid_or_warn(&mut self, namespace: &str, context: impl FnOnce() -> String) -> String {
        match self.idx.namespace_by_name.get(namespace) {
            Some(uid) => uid.clone(),
            None => {
                let message = format!("{}: missing namespace", context());
                self.warn(message);
                String::new()
            }
        }
    }
}
