//! KubeModelSet computation
//!
//! [`KubeModel`] drives one compute run per window. Each phase fans its
//! queries out on a [`QueryGroup`] and folds the results into the set on the
//! calling task, so the set itself is never shared. Phases run in parent
//! order: cluster, namespaces, resource quotas, nodes, owners, pods,
//! containers, services.
//!
//! A failed query costs one warning diagnostic and contributes no data.
//! Cancellation discards the partial set.

mod phases;

#[cfg(test)]
mod tests;

use crate::error::{ComputeError, SourceError};
use crate::model::{Bounded, DiagnosticLevel, KubeModelSet, Provider};
use crate::source::{MetricsSource, QueryFuture, QueryGroup, QueryResponse, QueryResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Identity of the cluster a model describes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterIdentity {
    /// Stable cluster UID; required.
    pub uid: String,
    pub name: String,
    pub provider: Provider,
    pub account: String,
}

/// Computes [`KubeModelSet`]s from a metrics source.
pub struct KubeModel {
    source: Arc<dyn MetricsSource>,
    cluster: ClusterIdentity,
    diagnostic_level: DiagnosticLevel,
}

impl std::fmt::Debug for KubeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeModel")
            .field("cluster", &self.cluster)
            .field("diagnostic_level", &self.diagnostic_level)
            .finish()
    }
}

impl KubeModel {
    pub fn new(cluster: ClusterIdentity, source: Arc<dyn MetricsSource>) -> Result<Self, ComputeError> {
        if cluster.uid.trim().is_empty() {
            return Err(ComputeError::Config("cluster UID cannot be empty".to_string()));
        }

        debug!(cluster_uid = %cluster.uid, "Created KubeModel");

        Ok(Self {
            source,
            cluster,
            diagnostic_level: DiagnosticLevel::default(),
        })
    }

    /// Lowest diagnostic level kept in computed sets.
    pub fn with_diagnostic_level(mut self, level: DiagnosticLevel) -> Self {
        self.diagnostic_level = level;
        self
    }

    pub fn cluster(&self) -> &ClusterIdentity {
        &self.cluster
    }

    /// Resolution of the underlying metrics source.
    pub fn resolution(&self) -> Duration {
        self.source.resolution()
    }

    /// Compute the set for `[start, end)`.
    ///
    /// Query failures are absorbed into the diagnostics log; only
    /// cancellation and an invalid window fail the run.
    pub async fn compute_kube_model_set(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<KubeModelSet, ComputeError> {
        if start >= end {
            return Err(ComputeError::InvalidWindow { start, end });
        }

        let started = Instant::now();
        let mut set = KubeModelSet::new(start, end);
        set.metadata.diagnostic_level = self.diagnostic_level;

        let mut run = Run {
            source: Arc::clone(&self.source),
            cluster: &self.cluster,
            set,
            start,
            end,
            resolution: self.source.resolution(),
            cancel,
        };

        run.compute_cluster().await?;
        run.compute_namespaces().await?;
        run.compute_resource_quotas().await?;
        run.compute_nodes().await?;
        run.compute_owners().await?;
        run.compute_pods().await?;
        run.compute_containers().await?;
        run.compute_services().await?;

        let mut set = run.set;
        set.complete();

        info!(
            cluster_uid = %self.cluster.uid,
            window_start = %start,
            window_end = %end,
            objects = set.metadata.object_count,
            diagnostics = set.metadata.diagnostics.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Computed KubeModelSet"
        );

        Ok(set)
    }
}

/// State of one compute run.
struct Run<'a> {
    source: Arc<dyn MetricsSource>,
    cluster: &'a ClusterIdentity,
    set: KubeModelSet,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    resolution: Duration,
    cancel: &'a CancellationToken,
}

impl Run<'_> {
    fn group(&self) -> Result<QueryGroup, ComputeError> {
        if self.cancel.is_cancelled() {
            return Err(ComputeError::Cancelled);
        }
        Ok(QueryGroup::new(self.cancel))
    }

    /// Spawn a query against the source on `group`.
    fn spawn<F, Fut>(&self, group: &QueryGroup, label: impl Into<String>, query: F) -> QueryFuture
    where
        F: FnOnce(Arc<dyn MetricsSource>, DateTime<Utc>, DateTime<Utc>) -> Fut,
        Fut: Future<Output = QueryResponse> + Send + 'static,
    {
        group.spawn(label, query(Arc::clone(&self.source), self.start, self.end))
    }

    /// Wait for a query. Failures become a warning and an empty result.
    async fn collect(&mut self, future: QueryFuture) -> Result<Vec<QueryResult>, ComputeError> {
        let label = future.label().to_string();
        match future.await_result().await {
            Ok(results) => Ok(results),
            Err(SourceError::Cancelled) => Err(ComputeError::Cancelled),
            Err(err) => {
                warn!(query = %label, error = %err, "Query failed");
                self.set.warn(format!("query {label} failed: {err}"));
                Ok(Vec::new())
            }
        }
    }

    /// Lifetimes keyed by UID; `None` for series without samples.
    fn uptimes(&self, results: &[QueryResult]) -> HashMap<String, Option<(DateTime<Utc>, DateTime<Utc>)>> {
        results
            .iter()
            .filter(|r| !r.uid.is_empty())
            .map(|r| (r.uid.clone(), r.get_start_end(self.start, self.end, self.resolution)))
            .collect()
    }

    /// Apply uptimes to every registered entity of one kind. Entities
    /// without a usable uptime keep empty bounds and get a warning.
    fn assign_bounds<E, F>(&mut self, kind: &str, results: &[QueryResult], entities: F)
    where
        E: Bounded,
        F: Fn(&mut KubeModelSet) -> &mut HashMap<String, E>,
    {
        let uptimes = self.uptimes(results);
        let mut warnings = Vec::new();

        let map = entities(&mut self.set);
        let mut uids: Vec<&String> = map.keys().collect();
        uids.sort();
        let uids: Vec<String> = uids.into_iter().cloned().collect();

        for uid in uids {
            match (uptimes.get(&uid), map.get_mut(&uid)) {
                (Some(Some((start, end))), Some(entity)) => entity.set_bounds(*start, *end),
                (Some(None), _) => warnings.push(format!("{kind} {uid} uptime has no data points")),
                (None, _) => warnings.push(format!("{kind} {uid} has no uptime")),
                _ => {}
            }
        }

        for uid in uptimes.keys() {
            if !map.contains_key(uid) {
                debug!(kind, uid = %uid, "Uptime for unregistered entity");
            }
        }

        for warning in warnings {
            self.set.warn(warning);
        }
    }
}

/// Scale a source value into a non-negative integer counter.
pub(crate) fn to_counter(value: f64, scale: f64) -> u64 {
    let scaled = (value * scale).round();
    if scaled.is_finite() && scaled > 0.0 {
        scaled as u64
    } else {
        0
    }
}
