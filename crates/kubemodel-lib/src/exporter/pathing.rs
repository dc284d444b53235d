//! Deterministic artifact paths
//!
//! Artifacts live at
//! `[<root>/]<clusterKey>/<sourceName>/<resolution>/<windowStart>.<ext>`
//! where the window start is formatted as RFC 3339 in UTC.

use crate::error::ExportError;
use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

/// Short label for a duration: `1h`, `24h`, `30m`, `90s`.
pub fn duration_string(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs > 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs > 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// Parse a label such as `1h`, `30m`, `90s` or `7d`.
pub fn parse_duration_label(label: &str) -> Option<Duration> {
    let label = label.trim();
    let split = label.find(|c: char| !c.is_ascii_digit())?;
    let (value, unit) = label.split_at(split);
    let value: u64 = value.parse().ok()?;
    let secs = match unit {
        "s" => value,
        "m" => value.checked_mul(60)?,
        "h" => value.checked_mul(3600)?,
        "d" => value.checked_mul(86_400)?,
        _ => return None,
    };
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Builds storage paths for one controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePathFormatter {
    dir: String,
}

impl StoragePathFormatter {
    pub fn new(
        root_dir: &str,
        cluster_key: &str,
        source_name: &str,
        resolution: &str,
    ) -> Result<Self, ExportError> {
        if cluster_key.trim().is_empty() {
            return Err(ExportError::Config("cluster id cannot be empty".to_string()));
        }
        if source_name.is_empty() || resolution.is_empty() {
            return Err(ExportError::Config(
                "source name and resolution are required".to_string(),
            ));
        }

        let dir = [root_dir, cluster_key, source_name, resolution]
            .iter()
            .map(|segment| segment.trim_matches('/'))
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");

        Ok(Self { dir })
    }

    /// Directory holding every artifact of this controller.
    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn to_full_path(&self, window_start: DateTime<Utc>, file_ext: &str) -> String {
        let name = window_start.to_rfc3339_opts(SecondsFormat::Secs, true);
        if file_ext.is_empty() {
            format!("{}/{name}", self.dir)
        } else {
            format!("{}/{name}.{file_ext}", self.dir)
        }
    }
}
