use std::collections::{btree_map::Entry, BTreeMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of attribute data: field name -> value, ordered by field name.
pub type Record = BTreeMap<String, FieldValue>;

/// A single attribute value.
/// `Group` is a composite "dataset" field bundling named sub-fields (e.g. a demographic
/// breakdown), which are apportioned and summed leaf by leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Group(Record),
}

/// A parsed numeric value, keeping integers exact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    #[inline]
    pub fn to_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    /// Integral value, if this number has no fractional part.
    pub fn to_integer(self) -> Option<i64> {
        match self {
            Number::Int(i) => Some(i),
            // Beyond 2^53 floats no longer represent every integer.
            Number::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => Some(f as i64),
            Number::Float(_) => None,
        }
    }

    #[inline] pub fn is_nan(self) -> bool { matches!(self, Number::Float(f) if f.is_nan()) }

    /// Sum of two numbers; integer overflow and mixed operands fall back to floats.
    pub fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => match a.checked_add(b) {
                Some(sum) => Number::Int(sum),
                None => Number::Float(a as f64 + b as f64),
            },
            (a, b) => Number::Float(a.to_f64() + b.to_f64()),
        }
    }
}

impl From<Number> for FieldValue {
    fn from(number: Number) -> Self {
        match number {
            Number::Int(i) => FieldValue::Int(i),
            Number::Float(f) => FieldValue::Float(f),
        }
    }
}

impl FieldValue {
    /// Parse this value as a number. Text is trimmed and parsed; booleans, nulls and groups
    /// are not numbers. NaN is returned as `Number::Float(NaN)` so callers can decide how to
    /// treat it.
    pub fn number(&self) -> Option<Number> {
        match self {
            FieldValue::Int(i) => Some(Number::Int(*i)),
            FieldValue::Float(f) => Some(Number::Float(*f)),
            FieldValue::Text(s) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() { return Some(Number::Int(i)) }
                s.parse::<f64>().ok().filter(|f| !f.is_infinite()).map(Number::Float)
            }
            FieldValue::Null | FieldValue::Bool(_) | FieldValue::Group(_) => None,
        }
    }

    /// Parse this value as an integer (integral floats and numeric text included).
    #[inline]
    pub fn as_integer(&self) -> Option<i64> {
        self.number().and_then(Number::to_integer)
    }

    #[inline] pub fn is_group(&self) -> bool { matches!(self, FieldValue::Group(_)) }

    /// Render this value as a unit id, if it is an id-like scalar.
    /// Integral floats are printed without a fractional part ("12.0" -> "12").
    pub fn as_key(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s.trim().to_string()),
            FieldValue::Int(i) => Some(i.to_string()),
            FieldValue::Float(f) => match Number::Float(*f).to_integer() {
                Some(i) => Some(i.to_string()),
                None if f.is_finite() => Some(f.to_string()),
                None => None,
            },
            FieldValue::Null | FieldValue::Bool(_) | FieldValue::Group(_) => None,
        }
    }
}

/// Add `value` into `record[name]`: numbers sum (`Int + Int` stays exact), groups merge
/// sub-field by sub-field, anything else replaces what was there.
pub fn accumulate(record: &mut Record, name: String, value: FieldValue) {
    match record.entry(name) {
        Entry::Vacant(slot) => { slot.insert(value); }
        Entry::Occupied(mut slot) => {
            let current = slot.get_mut();
            match (current, value) {
                (FieldValue::Group(mine), FieldValue::Group(theirs)) => {
                    theirs.into_iter().for_each(|(sub, value)| accumulate(mine, sub, value));
                }
                (current, value) => *current = match (current.number(), value.number()) {
                    (Some(a), Some(b)) => a.add(b).into(),
                    _ => value,
                },
            }
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::Text(s),
            // Arrays have no numeric meaning here; keep them as opaque metadata.
            Value::Array(_) => FieldValue::Text(value.to_string()),
            Value::Object(map) => FieldValue::Group(
                map.into_iter().map(|(k, v)| (k, FieldValue::from(v))).collect()
            ),
        }
    }
}

impl From<&FieldValue> for Value {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::from(*i),
            // Non-finite floats have no JSON representation.
            FieldValue::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Group(record) => Value::Object(
                record.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect()
            ),
        }
    }
}
