use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use log::{debug, warn};
use regex::Regex;
use shapefile::{dbase, PolygonRing, Reader, Shape};

use crate::{
    geom::{GeoUnit, Layer},
    policy::KeySelector,
    types::{FieldValue, PropertyTable, Record},
};

/// Read a polygon shapefile (`.shp` + `.dbf`) into a layer and its attribute table.
/// The coordinate system is taken from the sibling `.prj` file when it can be recognised.
pub fn read_shapefile(path: &Path, key: &KeySelector) -> Result<(Layer, PropertyTable)> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("[io::shp] Failed to open shapefile: {}", path.display()))?;

    let mut units = Vec::new();
    let mut table = PropertyTable::new();
    for (index, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = result
            .with_context(|| format!("[io::shp] Error reading shape {index} of {}", path.display()))?;
        let shape = shape_to_multipolygon(shape)
            .with_context(|| format!("[io::shp] shape {index} of {}", path.display()))?;
        let record = dbase_to_record(record);
        let id = key.key(index, &record)
            .with_context(|| format!("[io::shp] shape {index} of {}", path.display()))?;

        units.push(GeoUnit::new(id.clone(), shape));
        table.insert(id, record);
    }

    let layer = Layer::new(units, epsg_from_prj(path))
        .with_context(|| format!("[io::shp] Failed to build layer from {}", path.display()))?;
    Ok((layer, table))
}

/// Coerce a shape into a multipolygon; null shapes become empty.
fn shape_to_multipolygon(shape: Shape) -> Result<MultiPolygon<f64>> {
    match shape {
        Shape::Polygon(polygon) => Ok(shp_to_geo(&polygon)),
        Shape::NullShape => Ok(MultiPolygon(vec![])),
        other => bail!("found non-Polygon shape in layer: {:?}", other.shapetype()),
    }
}

/// Convert a shapefile polygon into a multipolygon: each outer ring starts a polygon and
/// collects the inner rings that follow it.
fn shp_to_geo(polygon: &shapefile::Polygon) -> MultiPolygon<f64> {
    fn ring(points: &[shapefile::Point]) -> LineString<f64> {
        let mut coords = points.iter().map(|pt| Coord { x: pt.x, y: pt.y }).collect::<Vec<_>>();
        if let (Some(&first), Some(&last)) = (coords.first(), coords.last()) {
            if first != last { coords.push(first) }
        }
        LineString(coords)
    }

    let mut polygons = Vec::new();
    let mut exterior: Option<LineString<f64>> = None;
    let mut holes = Vec::new();
    for r in polygon.rings() {
        match r {
            PolygonRing::Outer(points) => {
                if let Some(previous) = exterior.replace(ring(points)) {
                    polygons.push(Polygon::new(previous, std::mem::take(&mut holes)));
                }
            }
            // A hole before any outer ring has nothing to belong to.
            PolygonRing::Inner(points) if exterior.is_some() => holes.push(ring(points)),
            PolygonRing::Inner(_) => debug!("[io::shp] dropping inner ring with no outer ring"),
        }
    }
    if let Some(last) = exterior {
        polygons.push(Polygon::new(last, holes));
    }

    MultiPolygon(polygons)
}

/// Convert a dBase record into an attribute record. Character fields are trimmed and
/// integral numerics become integers.
fn dbase_to_record(record: dbase::Record) -> Record {
    record.into_iter()
        .map(|(name, value)| {
            let value = match value {
                dbase::FieldValue::Character(Some(s)) => FieldValue::Text(s.trim().to_string()),
                dbase::FieldValue::Numeric(Some(n)) if n.fract() == 0.0 && n.abs() < 9.0e15 => FieldValue::Int(n as i64),
                dbase::FieldValue::Numeric(Some(n)) => FieldValue::Float(n),
                dbase::FieldValue::Float(Some(f)) => FieldValue::Float(f as f64),
                dbase::FieldValue::Integer(i) => FieldValue::Int(i as i64),
                dbase::FieldValue::Double(d) => FieldValue::Float(d),
                dbase::FieldValue::Currency(c) => FieldValue::Float(c),
                dbase::FieldValue::Logical(Some(b)) => FieldValue::Bool(b),
                dbase::FieldValue::Memo(s) => FieldValue::Text(s),
                dbase::FieldValue::Character(None)
                | dbase::FieldValue::Numeric(None)
                | dbase::FieldValue::Float(None)
                | dbase::FieldValue::Logical(None) => FieldValue::Null,
                other => FieldValue::Text(format!("{other:?}")),
            };
            (name, value)
        })
        .collect()
}

/// EPSG code of the shapefile's `.prj`, if present and recognised.
pub(crate) fn epsg_from_prj(path: &Path) -> Option<u32> {
    let prj = path.with_extension("prj");
    let wkt = fs::read_to_string(&prj).ok()?;
    let epsg = epsg_from_wkt(&wkt);
    if epsg.is_none() {
        warn!("[io::shp] could not recognise the coordinate system in {}", prj.display());
    }
    epsg
}

/// Recognise the common census coordinate systems from ESRI/OGC WKT.
pub(crate) fn epsg_from_wkt(wkt: &str) -> Option<u32> {
    // The outermost AUTHORITY comes last.
    let authority = Regex::new(r#"AUTHORITY\s*\[\s*"EPSG"\s*,\s*"?(\d+)"?\s*\]"#).ok()?;
    if let Some(code) = authority.captures_iter(wkt).last().and_then(|c| c[1].parse().ok()) {
        return Some(code);
    }

    let nad83 = wkt.contains("North_American_1983") || wkt.contains("NAD83") || wkt.contains("NAD_1983");
    let wgs84 = wkt.contains("WGS_1984") || wkt.contains("WGS 84") || wkt.contains("WGS84");

    let utm = Regex::new(r"(?i)UTM[_ ]zone[_ ](\d{1,2})([NS])").ok()?;
    if let Some(caps) = utm.captures(wkt) {
        let zone: u32 = caps[1].parse().ok()?;
        let south = caps[2].eq_ignore_ascii_case("S");
        return match (nad83, wgs84, south) {
            (true, _, false) => Some(26900 + zone),
            (false, true, false) => Some(32600 + zone),
            (false, true, true) => Some(32700 + zone),
            _ => None,
        };
    }

    if wkt.trim_start().starts_with("PROJCS") {
        if wkt.contains("Albers") && nad83 { return Some(5070) }
        if wkt.contains("Mercator_Auxiliary_Sphere") || wkt.contains("Pseudo-Mercator") { return Some(3857) }
        return None;
    }

    if wkt.trim_start().starts_with("GEOGCS") {
        if nad83 { return Some(4269) }
        if wgs84 { return Some(4326) }
        if wkt.contains("North_American_1927") { return Some(4267) }
    }
    None
}
