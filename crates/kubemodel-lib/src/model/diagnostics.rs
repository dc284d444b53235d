//! Diagnostics recorded while a set is computed
//!
//! Diagnostics are appended in emission order and gated by the set's
//! `diagnostic_level`. Errors bypass the gate and are also forwarded to the
//! process logger.

use super::KubeModelSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

string_enum! {
    /// Severity of a diagnostic, ordered from least to most severe.
    pub enum DiagnosticLevel: "diagnostic level" {
        Trace => "trace",
        Debug => "debug",
        Info => "info",
        Warning => "warning",
        Error => "error",
    }
}

impl Default for DiagnosticLevel {
    fn default() -> Self {
        DiagnosticLevel::Info
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub timestamp: DateTime<Utc>,
    pub level: DiagnosticLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, String>>,
}

impl KubeModelSet {
    /// Record an error. Always kept regardless of the configured level.
    pub fn error(&mut self, message: impl Into<String>) {
        self.push_diagnostic(DiagnosticLevel::Error, message.into(), None);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push_diagnostic(DiagnosticLevel::Warning, message.into(), None);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push_diagnostic(DiagnosticLevel::Info, message.into(), None);
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.push_diagnostic(DiagnosticLevel::Debug, message.into(), None);
    }

    pub fn trace(&mut self, message: impl Into<String>) {
        self.push_diagnostic(DiagnosticLevel::Trace, message.into(), None);
    }

    /// Record a diagnostic carrying structured details.
    pub fn diagnostic_with_details(
        &mut self,
        level: DiagnosticLevel,
        message: impl Into<String>,
        details: BTreeMap<String, String>,
    ) {
        self.push_diagnostic(level, message.into(), Some(details));
    }

    pub fn get_errors(&self) -> Vec<Diagnostic> {
        self.diagnostics_at(DiagnosticLevel::Error)
    }

    pub fn get_warnings(&self) -> Vec<Diagnostic> {
        self.diagnostics_at(DiagnosticLevel::Warning)
    }

    pub fn get_infos(&self) -> Vec<Diagnostic> {
        self.diagnostics_at(DiagnosticLevel::Info)
    }

    pub fn get_debugs(&self) -> Vec<Diagnostic> {
        self.diagnostics_at(DiagnosticLevel::Debug)
    }

    pub fn get_traces(&self) -> Vec<Diagnostic> {
        self.diagnostics_at(DiagnosticLevel::Trace)
    }

    fn diagnostics_at(&self, level: DiagnosticLevel) -> Vec<Diagnostic> {
        self.metadata
            .diagnostics
            .iter()
            .filter(|d| d.level == level)
            .cloned()
            .collect()
    }

    fn push_diagnostic(
        &mut self,
        level: DiagnosticLevel,
        message: String,
        details: Option<BTreeMap<String, String>>,
    ) {
        if level == DiagnosticLevel::Error {
            tracing::error!(
                window_start = %self.window.start,
                window_end = %self.window.end,
                "{}",
                message
            );
        } else if level < self.metadata.diagnostic_level {
            return;
        }

        if self.is_frozen() {
            tracing::debug!(level = %level, message = %message, "Dropping diagnostic on completed set");
            return;
        }

        self.metadata.diagnostics.push(Diagnostic {
            timestamp: Utc::now(),
            level,
            message,
            details,
        });
    }
}
