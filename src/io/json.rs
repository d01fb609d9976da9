//! Plain JSON forms of the persisted maps, weights and attribute tables.

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Map, Value};
use smallvec::SmallVec;

use super::atomic::write_json;
use crate::{
    map::{AssignmentMap, ContainmentMap, Overlap, OverlapKind, Overlaps},
    types::{FieldValue, PopulationWeightMap, PropertyTable, Record, UnitId, Weight},
};

/// Read a JSON document from `path`.
pub(crate) fn read_json(path: &Path) -> Result<Value> {
    let file = File::open(path)
        .with_context(|| format!("[io::json] Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("[io::json] Failed to parse {}", path.display()))
}

/// Top-level JSON object of a document, or an error naming `what` it should have held.
fn as_object(value: Value, what: &str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => bail!("[io::json] {what} must be a JSON object, found {}", kind(&other)),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Write a containment map as `{"coarse": [id, ...], "entries": {fine: [[coarse, fraction, kind], ...]}}`.
/// The coarse list holds every coarse unit of the mapping, including those no fine unit overlaps.
pub fn write_containment_map(path: &Path, map: &ContainmentMap) -> Result<()> {
    let entries = map.iter()
        .map(|(fine, overlaps)| {
            let overlaps = overlaps.iter()
                .map(|o| json!([o.coarse.as_str(), o.fraction, o.kind]))
                .collect();
            (fine.to_string(), Value::Array(overlaps))
        })
        .collect::<Map<_, _>>();
    let coarse = map.coarse_ids().iter().map(|id| Value::String(id.to_string())).collect();

    write_json(path, &json!({ "coarse": Value::Array(coarse), "entries": Value::Object(entries) }), false)
}

/// Read a containment map written by [`write_containment_map`].
pub fn read_containment_map(path: &Path) -> Result<ContainmentMap> {
    let mut document = as_object(read_json(path)?, "containment map")?;

    let coarse = match document.remove("coarse") {
        Some(Value::Array(ids)) => ids.into_iter()
            .map(|id| match id {
                Value::String(id) => Ok(UnitId::from(id)),
                other => bail!("[io::json] coarse ids must be strings, found {}", kind(&other)),
            })
            .collect::<Result<Vec<_>>>()?,
        Some(other) => bail!("[io::json] \"coarse\" must be an array, found {}", kind(&other)),
        None => bail!("[io::json] containment map {} has no \"coarse\" list", path.display()),
    };
    let entries = match document.remove("entries") {
        Some(value) => as_object(value, "containment entries")?,
        None => bail!("[io::json] containment map {} has no \"entries\" object", path.display()),
    };

    let mut map = ContainmentMap::new(coarse);
    for (fine, value) in entries {
        let Value::Array(items) = value else {
            bail!("[io::json] containment entry for {fine} must be an array");
        };
        let overlaps = items.into_iter()
            .map(|item| {
                let (id, fraction, kind): (String, f64, OverlapKind) = serde_json::from_value(item)
                    .with_context(|| format!("[io::json] bad containment entry for {fine}"))?;
                Ok(Overlap::new(UnitId::from(id), fraction, kind))
            })
            .collect::<Result<Overlaps>>()?;
        if let Some(unknown) = overlaps.iter().find(|o| map.coarse_id(o.coarse.as_str()).is_none()) {
            bail!("[io::json] containment entry for {fine} names unknown coarse unit {}", unknown.coarse);
        }
        map.insert(UnitId::from(fine), overlaps);
    }
    Ok(map)
}

/// Write an assignment as `{fine: "coarse"}`, with `""` for unmatched units and an array
/// for units with several parents.
pub fn write_assignment(path: &Path, assignment: &AssignmentMap) -> Result<()> {
    let entries = assignment.iter()
        .map(|(fine, parents)| {
            let value = match parents {
                [] => Value::String(String::new()),
                [parent] => Value::String(parent.to_string()),
                several => Value::Array(several.iter().map(|p| Value::String(p.to_string())).collect()),
            };
            (fine.to_string(), value)
        })
        .collect::<Map<_, _>>();
    write_json(path, &Value::Object(entries), false)
}

/// Read an assignment written by [`write_assignment`].
pub fn read_assignment(path: &Path) -> Result<AssignmentMap> {
    let entries = as_object(read_json(path)?, "assignment")?;

    entries.into_iter()
        .map(|(fine, value)| {
            let parents: SmallVec<[UnitId; 1]> = match value {
                Value::String(parent) if parent.is_empty() => SmallVec::new(),
                Value::String(parent) => SmallVec::from_elem(UnitId::from(parent), 1),
                Value::Array(items) => items.iter()
                    .filter_map(Value::as_str)
                    .filter(|parent| !parent.is_empty())
                    .map(UnitId::from)
                    .collect(),
                Value::Null => SmallVec::new(),
                other => bail!("[io::json] assignment of {fine} must be a string or array, found {}", kind(&other)),
            };
            Ok((UnitId::from(fine), parents))
        })
        .collect()
}

/// Read population weights as `{id: number | {field: number, ...}}`.
/// Non-numeric sub-fields are ignored.
pub fn read_weights_json(path: &Path) -> Result<PopulationWeightMap> {
    let entries = as_object(read_json(path)?, "population weights")?;

    entries.into_iter()
        .map(|(id, value)| {
            let weight = match value {
                Value::Number(n) => Weight::Scalar(n.as_f64().unwrap_or(0.0)),
                Value::Object(fields) => Weight::Fields(
                    fields.into_iter()
                        .filter_map(|(name, v)| FieldValue::from(v).number().map(|n| (name, n.to_f64())))
                        .collect()
                ),
                other => FieldValue::from(other).number()
                    .map(|n| Weight::Scalar(n.to_f64()))
                    .ok_or_else(|| anyhow!("[io::json] weight of {id} is not a number"))?,
            };
            Ok((UnitId::from(id), weight))
        })
        .collect()
}

/// Read an attribute table as `{id: {field: value, ...}}`.
pub fn read_table_json(path: &Path) -> Result<PropertyTable> {
    table_from_object(as_object(read_json(path)?, "attribute table")?)
}

pub(crate) fn table_from_object(entries: Map<String, Value>) -> Result<PropertyTable> {
    entries.into_iter()
        .map(|(id, value)| match FieldValue::from(value) {
            FieldValue::Group(record) => Ok((UnitId::from(id), record)),
            FieldValue::Null => Ok((UnitId::from(id), Record::new())),
            _ => bail!("[io::json] row {id} must be an object"),
        })
        .collect()
}

/// JSON object of one record.
pub(crate) fn record_to_json(record: &Record) -> Map<String, Value> {
    record.iter().map(|(name, value)| (name.clone(), Value::from(value))).collect()
}

/// Write an attribute table as `{id: {field: value, ...}}`.
pub fn write_table_json(path: &Path, table: &PropertyTable) -> Result<()> {
    let entries = table.iter()
        .map(|(id, record)| (id.to_string(), Value::Object(record_to_json(record))))
        .collect::<Map<_, _>>();
    write_json(path, &Value::Object(entries), false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use smallvec::smallvec;

    use super::*;
    use crate::map::{derive_final_assignment, PrefixFallback};

    #[test]
    fn containment_map_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");

        let mut map = ContainmentMap::new(vec!["P2".into(), "P1".into(), "P3".into()]);
        map.insert("b2".into(), smallvec![Overlap::new("P2".into(), 0.75, OverlapKind::Area), Overlap::new("P1".into(), -1.0, OverlapKind::BoundingBoxOnly)]);
        map.insert("b1".into(), smallvec![]);
        write_containment_map(&path, &map).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(r#"{"coarse":["P2","P1","P3"],"entries":{"b2":[["P2",0.75,"area"],["P1",-1.0,"bounding_box_only"]]"#), "{text}");

        let loaded = read_containment_map(&path).unwrap();
        assert_eq!(loaded, map);
        // P3 overlaps nothing but is still a known coarse unit.
        assert!(loaded.coarse_id("P3").is_some());
    }

    #[test]
    fn cached_map_assigns_like_a_fresh_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");

        let mut map = ContainmentMap::new(vec!["A".into(), "120010001001".into()]);
        map.insert("b1".into(), smallvec![Overlap::new("A".into(), 1.0, OverlapKind::SingleCandidate)]);
        map.insert("120010001001000".into(), smallvec![]);
        write_containment_map(&path, &map).unwrap();
        let cached = read_containment_map(&path).unwrap();

        let policy = PrefixFallback { len: 12 };
        let fresh = derive_final_assignment(&map, Some(&policy));
        let reloaded = derive_final_assignment(&cached, Some(&policy));
        assert_eq!(reloaded.map.get("120010001001000"), Some(&[UnitId::new("120010001001")][..]));
        assert_eq!(fresh.map, reloaded.map);
        assert_eq!(fresh.stats, reloaded.stats);
    }

    #[test]
    fn containment_map_needs_its_coarse_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");

        fs::write(&path, r#"{"b1": [["P1", 1.0, "area"]]}"#).unwrap();
        assert!(read_containment_map(&path).is_err());

        fs::write(&path, r#"{"coarse": ["P1"], "entries": {"b1": [["P9", 1.0, "area"]]}}"#).unwrap();
        assert!(read_containment_map(&path).is_err());
    }

    #[test]
    fn assignment_forms() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assign.json");
        fs::write(&path, r#"{"z": "P1", "a": "", "m": ["P1", "P2"], "n": null}"#).unwrap();

        let assignment = read_assignment(&path).unwrap();
        let order: Vec<_> = assignment.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, ["z", "a", "m", "n"]);
        assert_eq!(assignment.get("a"), Some(&[][..]));
        assert_eq!(assignment.get("m").unwrap().len(), 2);

        let out = dir.path().join("out.json");
        write_assignment(&out, &assignment).unwrap();
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            r#"{"z":"P1","a":"","m":["P1","P2"],"n":""}"#,
        );
    }

    #[test]
    fn weights_accept_scalars_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");
        fs::write(&path, r#"{"A": 3, "B": {"TOT": 10, "TOT18": "7", "NAME": "x"}, "C": "2.5"}"#).unwrap();

        let weights = read_weights_json(&path).unwrap();
        assert_eq!(weights.get("A"), Some(&Weight::Scalar(3.0)));
        assert_eq!(weights.get("B").unwrap().field("TOT18"), 7.0);
        assert_eq!(weights.get("B").unwrap().field("NAME"), 0.0);
        assert_eq!(weights.get("C"), Some(&Weight::Scalar(2.5)));

        fs::write(&path, r#"[1, 2]"#).unwrap();
        assert!(read_weights_json(&path).is_err());
    }

    #[test]
    fn tables_keep_row_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.json");
        fs::write(&path, r#"{"P2": {"TOT": 7}, "P1": {"TOT": 10, "D10F": {"Tot": 10}}}"#).unwrap();

        let table = read_table_json(&path).unwrap();
        assert_eq!(table.ids(), &[UnitId::new("P2"), UnitId::new("P1")]);
        assert_eq!(table.get("P1").unwrap()["TOT"], FieldValue::Int(10));
        assert!(table.get("P1").unwrap()["D10F"].is_group());

        let out = dir.path().join("out.json");
        write_table_json(&out, &table).unwrap();
        assert_eq!(read_table_json(&out).unwrap().ids(), table.ids());
    }
}
