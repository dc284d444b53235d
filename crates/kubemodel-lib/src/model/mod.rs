//! KubeModel entity graph
//!
//! A [`KubeModelSet`] is a single-cluster, single-window snapshot of the
//! Kubernetes inventory. It owns every entity in UID-keyed maps; references
//! between entities are weak UID strings resolved by lookup.
//!
//! Entities are created through the `register_*` operations on the set,
//! which are idempotent and tolerate parents arriving out of order. Callers
//! enrich an entity by fetching it from its map after registration.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Declares a closed string-labelled enum with `as_str`, `Display` and
/// `FromStr` implementations sharing one label table.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        $vis enum $name {
            $( $(#[$vmeta])* #[serde(rename = $label)] $variant ),+
        }

        impl $name {
            /// Every variant in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire label of the variant.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $label ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::CodecError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $label => Ok($name::$variant), )+
                    other => Err(crate::error::CodecError::InvalidValue {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

mod cluster;
mod container;
mod diagnostics;
mod metadata;
mod namespace;
mod node;
mod owner;
mod pod;
mod resource;
mod resource_quota;
mod service;
mod set;

#[cfg(test)]
mod tests;

pub use cluster::{Cluster, Provider};
pub use container::Container;
pub use diagnostics::{Diagnostic, DiagnosticLevel};
pub use metadata::{Metadata, Window};
pub use namespace::Namespace;
pub use node::Node;
pub use owner::{Owner, OwnerKind};
pub use pod::Pod;
pub use resource::{Resource, ResourceQuantities, ResourceQuantity, StatType, Stats, Unit};
pub use resource_quota::{RequestsLimits, ResourceQuota, ResourceQuotaSpec, ResourceQuotaStatus};
pub use service::{Service, ServicePort, ServiceType};
pub use set::KubeModelSet;

/// Entities with an observed lifetime inside the set's window.
pub trait Bounded {
    /// First instant the entity was observed.
    fn start(&self) -> Option<DateTime<Utc>>;

    /// Instant after the last observation.
    fn end(&self) -> Option<DateTime<Utc>>;

    /// Overwrite both bounds.
    fn set_bounds(&mut self, start: DateTime<Utc>, end: DateTime<Utc>);
}

/// Entities carrying Kubernetes labels and annotations.
pub trait Labeled {
    fn labels_mut(&mut self) -> &mut BTreeMap<String, String>;

    fn annotations_mut(&mut self) -> &mut BTreeMap<String, String>;

    /// Merge labels without overwriting keys already present.
    fn merge_labels(&mut self, labels: &BTreeMap<String, String>) {
        merge_missing(self.labels_mut(), labels);
    }

    /// Merge annotations without overwriting keys already present.
    fn merge_annotations(&mut self, annotations: &BTreeMap<String, String>) {
        merge_missing(self.annotations_mut(), annotations);
    }
}

fn merge_missing(target: &mut BTreeMap<String, String>, incoming: &BTreeMap<String, String>) {
    for (key, value) in incoming {
        target.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

macro_rules! impl_bounded {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Bounded for $ty {
                fn start(&self) -> Option<DateTime<Utc>> {
                    self.start
                }

                fn end(&self) -> Option<DateTime<Utc>> {
                    self.end
                }

                fn set_bounds(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
                    self.start = Some(start);
                    self.end = Some(end);
                }
            }
        )+
    };
}

macro_rules! impl_labeled {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Labeled for $ty {
                fn labels_mut(&mut self) -> &mut BTreeMap<String, String> {
                    &mut self.labels
                }

                fn annotations_mut(&mut self) -> &mut BTreeMap<String, String> {
                    &mut self.annotations
                }
            }
        )+
    };
}

impl_bounded!(Cluster, Namespace, Node, Owner, Pod, Container, Service, ResourceQuota);
impl_labeled!(Namespace, Node, Owner, Pod, Service);
