use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::{json, Map, Value};

use super::{atomic::write_json, json::{read_json, record_to_json}};
use crate::{
    geom::{GeoUnit, Layer},
    policy::KeySelector,
    types::{FieldValue, PropertyTable, Record},
};

/// Read a GeoJSON FeatureCollection into a polygon layer and its attribute table.
/// Unit ids come from `key`; features without geometry get an empty shape.
pub fn read_geojson(path: &Path, key: &KeySelector) -> Result<(Layer, PropertyTable)> {
    let (features, epsg) = parse_feature_collection(read_json(path)?)
        .with_context(|| format!("[io::geojson] Invalid FeatureCollection in {}", path.display()))?;

    let mut units = Vec::with_capacity(features.len());
    let mut table = PropertyTable::with_capacity(features.len());
    for (index, (shape, record)) in features.into_iter().enumerate() {
        let id = key.key(index, &record)
            .with_context(|| format!("[io::geojson] feature {index} in {}", path.display()))?;
        units.push(GeoUnit::new(id.clone(), shape));
        table.insert(id, record);
    }

    let layer = Layer::new(units, epsg)
        .with_context(|| format!("[io::geojson] Failed to build layer from {}", path.display()))?;
    Ok((layer, table))
}

/// Read only the attribute table of a GeoJSON FeatureCollection.
pub(crate) fn read_geojson_table(value: Value, key: &KeySelector) -> Result<PropertyTable> {
    let (features, _) = parse_feature_collection(value)?;
    features.into_iter().enumerate()
        .map(|(index, (_, record))| Ok((key.key(index, &record)?, record)))
        .collect()
}

/// Write `table` as a FeatureCollection with null geometries and each unit's id stored
/// under `id_property`.
pub fn write_feature_collection(path: &Path, table: &PropertyTable, id_property: &str) -> Result<()> {
    let features = table.iter()
        .map(|(id, record)| {
            let mut properties = record_to_json(record);
            properties.insert(id_property.to_string(), Value::String(id.to_string()));
            json!({
                "type": "Feature",
                "geometry": null,
                "properties": properties,
            })
        })
        .collect::<Vec<_>>();

    write_json(path, &json!({ "type": "FeatureCollection", "features": features }), false)
}

/// Split a FeatureCollection into (shape, properties) pairs and its legacy `crs` EPSG tag.
fn parse_feature_collection(value: Value) -> Result<(Vec<(MultiPolygon<f64>, Record)>, Option<u32>)> {
    let Value::Object(mut collection) = value else { bail!("expected a JSON object") };
    if collection.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        bail!("expected \"type\": \"FeatureCollection\"");
    }
    let epsg = collection.get("crs").and_then(crs_epsg);

    let Some(Value::Array(features)) = collection.remove("features") else {
        bail!("missing \"features\" array");
    };

    let features = features.into_iter().enumerate()
        .map(|(index, feature)| {
            let Value::Object(mut feature) = feature else { bail!("feature {index} is not an object") };
            let shape = match feature.get("geometry") {
                None | Some(Value::Null) => MultiPolygon(vec![]),
                Some(geometry) => parse_geometry(geometry).with_context(|| format!("feature {index}"))?,
            };
            let record = match feature.remove("properties") {
                Some(Value::Object(properties)) => properties_to_record(properties),
                _ => Record::new(),
            };
            Ok((shape, record))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((features, epsg))
}

fn properties_to_record(properties: Map<String, Value>) -> Record {
    properties.into_iter().map(|(name, value)| (name, FieldValue::from(value))).collect()
}

/// EPSG code named by a legacy `"crs": {"type": "name", "properties": {"name": ...}}` member,
/// e.g. `EPSG:4269` or `urn:ogc:def:crs:EPSG::26915`.
fn crs_epsg(crs: &Value) -> Option<u32> {
    let name = crs.get("properties")?.get("name")?.as_str()?;
    if name.ends_with("CRS84") { return Some(4326) }
    name.rsplit(':').next()?.trim().parse().ok()
}

/// Parse a Polygon or MultiPolygon geometry.
fn parse_geometry(geometry: &Value) -> Result<MultiPolygon<f64>> {
    let coordinates = geometry.get("coordinates")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("geometry has no coordinates array"))?;

    match geometry.get("type").and_then(Value::as_str) {
        Some("Polygon") => Ok(MultiPolygon(vec![parse_polygon(coordinates)?])),
        Some("MultiPolygon") => Ok(MultiPolygon(
            coordinates.iter()
                .map(|polygon| parse_polygon(polygon.as_array().ok_or_else(|| anyhow!("polygon must be an array"))?))
                .collect::<Result<Vec<_>>>()?
        )),
        Some(other) => bail!("unsupported geometry type {other}; expected Polygon or MultiPolygon"),
        None => bail!("geometry has no type"),
    }
}

/// Parse polygon coordinates: `[exterior, hole, hole, ...]`.
fn parse_polygon(rings: &[Value]) -> Result<Polygon<f64>> {
    let mut rings = rings.iter()
        .map(|ring| parse_ring(ring.as_array().ok_or_else(|| anyhow!("ring must be an array"))?));
    let exterior = rings.next().ok_or_else(|| anyhow!("polygon has no exterior ring"))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

/// Parse a ring `[[x, y], ...]`, closing it if needed. Extra ordinates are ignored.
fn parse_ring(coords: &[Value]) -> Result<LineString<f64>> {
    let mut points = coords.iter()
        .map(|position| {
            let x = position.get(0).and_then(Value::as_f64);
            let y = position.get(1).and_then(Value::as_f64);
            match (x, y) {
                (Some(x), Some(y)) => Ok(Coord { x, y }),
                _ => bail!("invalid position {position}"),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    if let (Some(&first), Some(&last)) = (points.first(), points.last()) {
        if first != last { points.push(first) }
    }
    Ok(LineString(points))
}
