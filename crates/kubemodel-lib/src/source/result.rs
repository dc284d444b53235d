//! Query results returned by a metrics source

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A single sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl DataPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// One series of a query result, identified by the entity it describes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub resource_quota: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Remaining series labels, such as `pod_uid`, `node_uid` or `kind`.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub data: Vec<DataPoint>,
}

impl QueryResult {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            ..Default::default()
        }
    }

    /// Leading datum of the series.
    pub fn value(&self) -> Option<f64> {
        self.data.first().map(|d| d.value)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Effective `[start, end)` of the entity inside the window.
    ///
    /// A sample at `window_start` extends the start to the window edge, and a
    /// sample at `window_end - resolution` extends the end to the window
    /// edge; otherwise the first sample and the last sample plus one
    /// resolution are used. Both bounds are clamped into the window.
    /// Returns `None` when the series has no samples.
    pub fn get_start_end(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        resolution: Duration,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.data.iter().map(|d| d.timestamp).min()?;
        let last = self.data.iter().map(|d| d.timestamp).max()?;
        let resolution = chrono::Duration::from_std(resolution).unwrap_or_else(|_| chrono::Duration::zero());

        let has_sample_at = |t: DateTime<Utc>| self.data.iter().any(|d| d.timestamp == t);

        let start = if has_sample_at(window_start) {
            window_start
        } else {
            first
        };
        let end = if has_sample_at(window_end - resolution) {
            window_end
        } else {
            last + resolution
        };

        let start = start.clamp(window_start, window_end);
        let end = end.clamp(start, window_end);
        Some((start, end))
    }
}
