use ahash::AHashMap;
use anyhow::{bail, Result};
use geo::{BoundingRect, MultiPolygon, Rect};
use rstar::{primitives::{GeomWithData, Rectangle}, RTree, AABB};

use crate::types::UnitId;

/// Bounding rectangle of a unit, tagged with the unit's position in its layer.
type IndexedBox = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// A single areal unit: a stable id and its boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoUnit {
    pub id: UnitId,
    pub shape: MultiPolygon<f64>,
}

impl GeoUnit {
    pub fn new(id: impl Into<UnitId>, shape: MultiPolygon<f64>) -> Self {
        Self { id: id.into(), shape }
    }
}

/// An ordered collection of units sharing one coordinate reference system,
/// with an R-tree over their bounding boxes for candidate lookup.
#[derive(Debug, Clone)]
pub struct Layer {
    units: Vec<GeoUnit>,
    index: AHashMap<UnitId, usize>, // Map between unit ids and positions in `units`
    rtree: RTree<IndexedBox>,
    epsg: Option<u32>, // EPSG code, if known
}

impl Layer {
    /// Construct a layer from its units. Units with empty geometry are kept but not indexed.
    /// Fails if two units share an id.
    pub fn new(units: Vec<GeoUnit>, epsg: Option<u32>) -> Result<Self> {
        let mut index = AHashMap::with_capacity(units.len());
        for (i, unit) in units.iter().enumerate() {
            if let Some(previous) = index.insert(unit.id.clone(), i) {
                bail!("duplicate unit id {:?} at positions {previous} and {i}", unit.id.as_str());
            }
        }

        let rtree = RTree::bulk_load(
            units.iter().enumerate()
                .filter_map(|(i, unit)| {
                    let rect = unit.shape.bounding_rect()?;
                    Some(IndexedBox::new(Rectangle::from_corners(rect.min().into(), rect.max().into()), i))
                })
                .collect()
        );

        Ok(Self { units, index, rtree, epsg })
    }

    /// Get the number of units.
    #[inline] pub fn len(&self) -> usize { self.units.len() }

    /// Check if there are no units.
    #[inline] pub fn is_empty(&self) -> bool { self.units.is_empty() }

    /// Get the EPSG code of the layer's coordinate reference system, if known.
    #[inline] pub fn epsg(&self) -> Option<u32> { self.epsg }

    /// Units in layer order.
    #[inline] pub fn units(&self) -> &[GeoUnit] { &self.units }

    /// Unit at position `idx`.
    #[inline] pub fn unit(&self, idx: usize) -> &GeoUnit { &self.units[idx] }

    /// Position of the unit with the given id.
    #[inline] pub fn position(&self, id: &str) -> Option<usize> { self.index.get(id).copied() }

    /// Unit with the given id.
    #[inline]
    pub fn get(&self, id: &str) -> Option<&GeoUnit> {
        self.position(id).map(|i| &self.units[i])
    }

    /// Positions of units whose bounding box intersects `rect`, in layer order.
    pub fn candidates(&self, rect: &Rect<f64>) -> Vec<usize> {
        let query = AABB::from_corners(rect.min().into(), rect.max().into());
        let mut found = self.rtree.locate_in_envelope_intersecting(&query)
            .map(|indexed| indexed.data)
            .collect::<Vec<_>>();
        found.sort_unstable();
        found
    }

    /// Extent of every indexed unit, read off the R-tree's root; `None` if nothing is indexed.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        if self.rtree.size() == 0 { return None }
        let extent = self.rtree.root().envelope();
        Some(Rect::new(extent.lower(), extent.upper()))
    }

    /// Replace every unit's shape, keeping ids and order, and rebuild the index.
    pub(crate) fn with_shapes(&self, shapes: Vec<MultiPolygon<f64>>, epsg: Option<u32>) -> Result<Self> {
        if shapes.len() != self.units.len() {
            bail!("expected {} shapes, got {}", self.units.len(), shapes.len());
        }
        let units = self.units.iter().zip(shapes)
            .map(|(unit, shape)| GeoUnit { id: unit.id.clone(), shape })
            .collect();
        Self::new(units, epsg)
    }
}
