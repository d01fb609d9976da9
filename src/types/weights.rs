use std::collections::BTreeMap;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use super::unit_id::UnitId;

/// Population weight of a single fine unit: either one number, or a record of named
/// sub-fields (e.g. `{"TOT": 12, "TOT18": 9, ...}`) from which fields are selected by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Weight {
    Scalar(f64),
    Fields(BTreeMap<String, f64>),
}

impl Weight {
    /// Value of the named sub-field; scalars answer for every field name.
    /// Missing sub-fields, negative and non-finite values read as zero.
    pub fn field(&self, name: &str) -> f64 {
        let value = match self {
            Weight::Scalar(value) => *value,
            Weight::Fields(fields) => fields.get(name).copied().unwrap_or(0.0),
        };
        if value.is_finite() && value > 0.0 { value } else { 0.0 }
    }
}

/// Fine unit id -> population weight.
#[derive(Debug, Clone, Default)]
pub struct PopulationWeightMap {
    weights: AHashMap<UnitId, Weight>,
}

impl PopulationWeightMap {
    pub fn new() -> Self { Self::default() }

    #[inline] pub fn len(&self) -> usize { self.weights.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.weights.is_empty() }

    #[inline] pub fn insert(&mut self, id: UnitId, weight: Weight) { self.weights.insert(id, weight); }

    #[inline] pub fn get(&self, id: &str) -> Option<&Weight> { self.weights.get(id) }

    #[inline] pub fn contains(&self, id: &str) -> bool { self.weights.contains_key(id) }

    /// Whether any unit's weight answers for `field`: scalars always do, records only
    /// when they carry that sub-field.
    pub fn has_field(&self, field: &str) -> bool {
        self.weights.values().any(|weight| match weight {
            Weight::Scalar(_) => true,
            Weight::Fields(fields) => fields.contains_key(field),
        })
    }
}

impl FromIterator<(UnitId, Weight)> for PopulationWeightMap {
    fn from_iter<I: IntoIterator<Item = (UnitId, Weight)>>(iter: I) -> Self {
        Self { weights: iter.into_iter().collect() }
    }
}
