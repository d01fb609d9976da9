//! Reading and writing layers, tables, weights and the persisted maps.
//!
//! Formats are chosen by file extension:
//!
//! - `.shp` - polygon layer with its dBase attribute table
//! - `.geojson` - FeatureCollection layer or table
//! - `.json` - FeatureCollection, or a flat `{id: {field: value}}` table
//! - `.csv` - population weights

mod atomic;
mod cache;
mod csv;
mod geojson;
mod json;
mod shp;

use std::path::Path;

use anyhow::{bail, Result};
use serde_json::Value;

use crate::{
    geom::Layer,
    policy::KeySelector,
    types::{PopulationWeightMap, PropertyTable},
};

pub use cache::{cached_containment, is_stale};
pub use csv::read_weights_csv;
pub use geojson::{read_geojson, write_feature_collection};
pub use json::{
    read_assignment, read_containment_map, read_table_json, read_weights_json,
    write_assignment, write_containment_map, write_table_json,
};
pub use shp::read_shapefile;

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Read a polygon layer and its attribute table.
pub fn read_layer(path: &Path, key: &KeySelector) -> Result<(Layer, PropertyTable)> {
    match extension(path).as_str() {
        "shp" => read_shapefile(path, key),
        "geojson" | "json" => read_geojson(path, key),
        other => bail!("[io] unsupported layer format {other:?}: {}", path.display()),
    }
}

/// Read an attribute table, ignoring any geometry.
pub fn read_table(path: &Path, key: &KeySelector) -> Result<PropertyTable> {
    match extension(path).as_str() {
        "shp" => read_shapefile(path, key).map(|(_, table)| table),
        "geojson" | "json" => {
            let value = json::read_json(path)?;
            let is_collection = value.get("type").and_then(Value::as_str) == Some("FeatureCollection");
            match value {
                value if is_collection => geojson::read_geojson_table(value, key),
                Value::Object(entries) => json::table_from_object(entries),
                _ => bail!("[io] {} is neither a FeatureCollection nor a table object", path.display()),
            }
        }
        other => bail!("[io] unsupported table format {other:?}: {}", path.display()),
    }
}

/// Read population weights; CSV files need the name of their id column and are checked
/// for a `weight_field` column.
pub fn read_weights(path: &Path, id_column: &str, weight_field: &str) -> Result<PopulationWeightMap> {
    match extension(path).as_str() {
        "csv" => read_weights_csv(path, id_column, weight_field),
        _ => read_weights_json(path),
    }
}

/// Write an attribute table: a null-geometry FeatureCollection for `.geojson`, a flat
/// table object otherwise.
pub fn write_table(path: &Path, table: &PropertyTable, id_property: &str) -> Result<()> {
    match extension(path).as_str() {
        "geojson" => write_feature_collection(path, table, id_property),
        _ => write_table_json(path, table),
    }
}
