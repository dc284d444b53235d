//! Filter field registries
//!
//! Field names are defined once in [`fieldstrings`] and shared by every
//! filterable type. Each type keeps a static table of the fields it
//! accepts and hands out copies by name.

pub mod diagnostics;
pub mod fieldstrings;
pub mod resourcequota;

use std::collections::HashMap;

/// Shape of the value a field filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Scalar,
    /// A string map addressed by key, e.g. `namespaceLabel[team]`.
    Map,
}

/// A filterable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Scalar,
        }
    }

    pub const fn map(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Map,
        }
    }

    pub fn is_map(&self) -> bool {
        self.kind == FieldKind::Map
    }
}

/// Name lookup over a static field table.
#[derive(Debug)]
pub struct FieldRegistry {
    fields: &'static [Field],
    by_name: HashMap<&'static str, Field>,
}

impl FieldRegistry {
    pub fn new(fields: &'static [Field]) -> Self {
        Self {
            fields,
            by_name: fields.iter().map(|f| (f.name, *f)).collect(),
        }
    }

    /// A copy of the registered field, if any.
    pub fn get(&self, name: &str) -> Option<Field> {
        self.by_name.get(name).copied()
    }

    /// Every field in declaration order.
    pub fn fields(&self) -> &'static [Field] {
        self.fields
    }
}
