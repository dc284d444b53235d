//! Fields a resource quota can be filtered on

use super::fieldstrings as fs;
use super::{Field, FieldRegistry};
use std::sync::OnceLock;

pub const FIELD_CLUSTER_ID: &str = fs::FIELD_CLUSTER_ID;
pub const FIELD_RESOURCE_QUOTA: &str = fs::FIELD_RESOURCE_QUOTA;
pub const FIELD_NAMESPACE: &str = fs::FIELD_NAMESPACE;
pub const FIELD_NAMESPACE_LABEL: &str = fs::FIELD_NAMESPACE_LABEL;
pub const FIELD_UID: &str = fs::FIELD_UID;

static FIELDS: &[Field] = &[
    Field::new(FIELD_CLUSTER_ID),
    Field::new(FIELD_RESOURCE_QUOTA),
    Field::new(FIELD_NAMESPACE),
    Field::map(FIELD_NAMESPACE_LABEL),
    Field::new(FIELD_UID),
];

fn registry() -> &'static FieldRegistry {
    static REGISTRY: OnceLock<FieldRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| FieldRegistry::new(FIELDS))
}

/// Default resource quota field registered under `name`.
pub fn default_field_by_name(name: &str) -> Option<Field> {
    registry().get(name)
}

pub fn fields() -> &'static [Field] {
    registry().fields()
}
