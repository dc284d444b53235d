//! Resource quantities and summary statistics

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

string_enum! {
    /// Kubernetes resource dimension.
    pub enum Resource: "resource" {
        Cpu => "cpu",
        Memory => "memory",
        Gpu => "gpu",
        Storage => "storage",
    }
}

string_enum! {
    /// Unit a quantity is expressed in.
    pub enum Unit: "unit" {
        Millicore => "m",
        Byte => "B",
        Second => "s",
        MillicoreSecond => "m-s",
        ByteSecond => "B-s",
    }
}

string_enum! {
    /// Summary statistic kind.
    pub enum StatType: "stat type" {
        Avg => "avg",
        Max => "max",
        Min => "min",
        P95 => "p95",
        P85 => "p85",
    }
}

/// Summary statistics keyed by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stats(BTreeMap<StatType, f64>);

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stat: StatType) -> Option<f64> {
        self.0.get(&stat).copied()
    }

    pub fn set(&mut self, stat: StatType, value: f64) {
        self.0.insert(stat, value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StatType, f64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// Describe ordering violations among the present statistics.
    ///
    /// Expected orderings are `max >= avg` and `p95 >= p85 >= avg`; pairs
    /// with a missing side are not checked.
    pub fn ordering_violations(&self) -> Vec<String> {
        const ORDER: [(StatType, StatType); 3] = [
            (StatType::Max, StatType::Avg),
            (StatType::P95, StatType::P85),
            (StatType::P85, StatType::Avg),
        ];

        ORDER
            .iter()
            .filter_map(|&(hi, lo)| match (self.get(hi), self.get(lo)) {
                (Some(h), Some(l)) if h < l => Some(format!("{hi} ({h}) < {lo} ({l})")),
                _ => None,
            })
            .collect()
    }
}

impl FromIterator<(StatType, f64)> for Stats {
    fn from_iter<I: IntoIterator<Item = (StatType, f64)>>(iter: I) -> Self {
        Stats(iter.into_iter().collect())
    }
}

/// A resource measured in a unit with its statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuantity {
    pub resource: Resource,
    pub unit: Unit,
    pub values: Stats,
}

/// Quantities keyed by resource, as used by quota requests and limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceQuantities(BTreeMap<Resource, ResourceQuantity>);

impl ResourceQuantities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one statistic, creating the quantity with `unit` when absent.
    ///
    /// An existing quantity keeps the unit it was created with.
    pub fn set(&mut self, resource: Resource, unit: Unit, stat: StatType, value: f64) {
        self.0
            .entry(resource)
            .or_insert_with(|| ResourceQuantity {
                resource,
                unit,
                values: Stats::new(),
            })
            .values
            .set(stat, value);
    }

    pub fn get(&self, resource: Resource) -> Option<&ResourceQuantity> {
        self.0.get(&resource)
    }

    /// Shorthand for reading a single statistic.
    pub fn value(&self, resource: Resource, stat: StatType) -> Option<f64> {
        self.get(resource).and_then(|q| q.values.get(stat))
    }

    pub fn insert(&mut self, quantity: ResourceQuantity) {
        self.0.insert(quantity.resource, quantity);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceQuantity> + '_ {
        self.0.values()
    }
}
