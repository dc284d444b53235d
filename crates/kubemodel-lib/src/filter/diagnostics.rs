//! Fields diagnostics and diagnostic summaries can be filtered on

use super::fieldstrings as fs;
use super::{Field, FieldRegistry};
use std::sync::OnceLock;

pub const FIELD_CLUSTER_ID: &str = fs::FIELD_CLUSTER_ID;

pub const FIELD_SUMMARY_CLUSTER_ID: &str = fs::FIELD_CLUSTER_ID;
pub const FIELD_SUMMARY_PROVIDER: &str = fs::FIELD_PROVIDER;
pub const FIELD_SUMMARY_REGION: &str = fs::FIELD_REGION;
pub const FIELD_SUMMARY_VERSION: &str = fs::FIELD_VERSION;

static FIELDS: &[Field] = &[Field::new(FIELD_CLUSTER_ID)];

static SUMMARY_FIELDS: &[Field] = &[
    Field::new(FIELD_SUMMARY_CLUSTER_ID),
    Field::new(FIELD_SUMMARY_PROVIDER),
    Field::new(FIELD_SUMMARY_REGION),
    Field::new(FIELD_SUMMARY_VERSION),
];

fn registry() -> &'static FieldRegistry {
    static REGISTRY: OnceLock<FieldRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| FieldRegistry::new(FIELDS))
}

fn summary_registry() -> &'static FieldRegistry {
    static REGISTRY: OnceLock<FieldRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| FieldRegistry::new(SUMMARY_FIELDS))
}

/// Default diagnostics field registered under `name`.
pub fn default_field_by_name(name: &str) -> Option<Field> {
    registry().get(name)
}

/// Default diagnostic summary field registered under `name`.
pub fn default_summary_field_by_name(name: &str) -> Option<Field> {
    summary_registry().get(name)
}
