use std::borrow::Cow;

use anyhow::{anyhow, Context, Result};
use geo::{Coord, MapCoords};
use log::{info, warn};
use proj4rs::{proj::Proj as Proj4, transform::transform};

use super::layer::Layer;

/// Outcome of reconciling the coordinate reference systems of two layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrsStatus {
    /// Both layers already share a CRS.
    Same,
    /// The coarser layer was reprojected into the finer layer's CRS.
    Reprojected { from: u32, to: u32 },
    /// At least one layer has no CRS tag; no reprojection was done.
    Unknown,
    /// The CRS codes differ but this code has no known definition; no reprojection was done.
    Unsupported(u32),
}

/// PROJ.4 definition of a supported EPSG code, and whether it is geographic (lon/lat degrees).
pub fn proj4_definition(epsg: u32) -> Option<(String, bool)> {
    let def = match epsg {
        4269 | 4937 => ("+proj=longlat +datum=NAD83 +no_defs +type=crs".to_string(), true),
        4326 | 4979 => ("+proj=longlat +datum=WGS84 +no_defs +type=crs".to_string(), true),
        4267 => ("+proj=longlat +datum=NAD27 +no_defs +type=crs".to_string(), true),
        3857 | 900913 => (
            "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs +type=crs".to_string(),
            false,
        ),
        5070 => (
            "+proj=aea +lat_0=23 +lon_0=-96 +lat_1=29.5 +lat_2=45.5 +x_0=0 +y_0=0 +datum=NAD83 +units=m +no_defs +type=crs".to_string(),
            false,
        ),
        // NAD83 / UTM zones 1N-23N
        26901..=26923 => (format!("+proj=utm +zone={} +datum=NAD83 +units=m +no_defs +type=crs", epsg - 26900), false),
        // WGS84 / UTM zones 1N-60N and 1S-60S
        32601..=32660 => (format!("+proj=utm +zone={} +datum=WGS84 +units=m +no_defs +type=crs", epsg - 32600), false),
        32701..=32760 => (format!("+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs +type=crs", epsg - 32700), false),
        _ => return None,
    };
    Some(def)
}

impl Layer {
    /// Reproject every unit into the CRS with EPSG code `to`.
    pub fn reproject(&self, to: u32) -> Result<Layer> {
        let from_epsg = self.epsg().ok_or_else(|| anyhow!("cannot reproject a layer with unknown CRS"))?;

        let build = |epsg: u32| -> Result<(Proj4, bool)> {
            let (proj_string, geographic) = proj4_definition(epsg)
                .ok_or_else(|| anyhow!("unsupported EPSG code: {epsg}"))?;
            let proj = Proj4::from_proj_string(&proj_string)
                .with_context(|| anyhow!("failed to build PROJ.4: {proj_string}"))?;
            Ok((proj, geographic))
        };
        let (from, from_geographic) = build(from_epsg)?;
        let (to_proj, to_geographic) = build(to)?;

        // proj4rs works in radians for geographic systems.
        let shapes = self.units().iter()
            .map(|unit| unit.shape.try_map_coords(|coord: Coord<f64>| -> Result<Coord<f64>> {
                let mut point = if from_geographic {
                    (coord.x.to_radians(), coord.y.to_radians(), 0.0)
                } else {
                    (coord.x, coord.y, 0.0)
                };
                transform(&from, &to_proj, &mut point)
                    .map_err(|e| anyhow!("CRS transform EPSG:{from_epsg} -> EPSG:{to} failed: {e}"))?;
                Ok(if to_geographic {
                    Coord { x: point.0.to_degrees(), y: point.1.to_degrees() }
                } else {
                    Coord { x: point.0, y: point.1 }
                })
            }))
            .collect::<Result<Vec<_>>>()?;

        self.with_shapes(shapes, Some(to))
    }
}

/// Bring the coarser layer into the finer layer's CRS when both are known and differ.
/// Returns the (possibly reprojected) coarser layer and what was done.
pub fn reconcile<'a>(coarser: &'a Layer, finer: &Layer) -> Result<(Cow<'a, Layer>, CrsStatus)> {
    match (coarser.epsg(), finer.epsg()) {
        (Some(from), Some(to)) if from == to => Ok((Cow::Borrowed(coarser), CrsStatus::Same)),
        (Some(from), Some(to)) => {
            for code in [from, to] {
                if proj4_definition(code).is_none() {
                    warn!("[crs] EPSG:{code} is not supported; comparing layers without reprojection");
                    return Ok((Cow::Borrowed(coarser), CrsStatus::Unsupported(code)));
                }
            }
            info!("[crs] reprojecting coarser layer EPSG:{from} -> EPSG:{to}");
            Ok((Cow::Owned(coarser.reproject(to)?), CrsStatus::Reprojected { from, to }))
        }
        (coarse, fine) => {
            if coarse.is_none() { warn!("[crs] coarser layer CRS unknown"); }
            if fine.is_none() { warn!("[crs] finer layer CRS unknown"); }
            Ok((Cow::Borrowed(coarser), CrsStatus::Unknown))
        }
    }
}
