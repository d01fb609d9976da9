use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::types::{Record, UnitId};

/// How a unit's stable id is obtained from a row of a layer or table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySelector {
    /// The row position (0-based) is the id.
    Index,
    /// The value of the named property is the id.
    Field(String),
}

impl KeySelector {
    pub fn field(name: &str) -> Self { KeySelector::Field(name.to_string()) }

    /// Produce the id of the row at `index` with properties `record`.
    pub fn key(&self, index: usize, record: &Record) -> Result<UnitId> {
        match self {
            KeySelector::Index => Ok(UnitId::from(index.to_string())),
            KeySelector::Field(name) => record.get(name)
                .ok_or_else(|| anyhow!("row {index} has no key field {name:?}"))?
                .as_key()
                .map(UnitId::from)
                .ok_or_else(|| anyhow!("row {index} has a non-scalar value in key field {name:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::KeySelector;
    use crate::types::{FieldValue, Record};

    #[test]
    fn index_and_field_keys() {
        let record = Record::from([
            ("GEOID10".to_string(), FieldValue::Text("130010001001".into())),
            ("VTD".to_string(), FieldValue::Float(42.0)),
        ]);
        assert_eq!(KeySelector::Index.key(5, &record).unwrap().as_str(), "5");
        assert_eq!(KeySelector::field("GEOID10").key(0, &record).unwrap().as_str(), "130010001001");
        assert_eq!(KeySelector::field("VTD").key(0, &record).unwrap().as_str(), "42");
        assert!(KeySelector::field("MISSING").key(0, &record).is_err());
    }

    #[test]
    fn selected_by_configuration() {
        let key: KeySelector = serde_json::from_str(r#"{"field": "GEOID"}"#).unwrap();
        assert_eq!(key, KeySelector::field("GEOID"));
        let key: KeySelector = serde_json::from_str(r#""index""#).unwrap();
        assert_eq!(key, KeySelector::Index);
    }
}
