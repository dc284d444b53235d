use super::{Diagnostic, DiagnosticLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bookkeeping for a KubeModelSet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub created_at: DateTime<Utc>,
    /// Set when the compute run finishes; the set is frozen afterwards.
    pub completed_at: Option<DateTime<Utc>>,
    pub object_count: u64,
    pub diagnostic_level: DiagnosticLevel,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl Metadata {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            completed_at: None,
            object_count: 0,
            diagnostic_level: DiagnosticLevel::default(),
            diagnostics: Vec::new(),
        }
    }
}

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Whether `t` lies in the closed range `[start, end]`.
    pub fn contains_inclusive(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }
}
