use std::panic::{catch_unwind, AssertUnwindSafe};

use ahash::{AHashMap, AHashSet};
use anyhow::Result;
use geo::{Area, BooleanOps, BoundingRect, Intersects, MultiPolygon, Relate};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{config::RunConfig, geom::{reconcile, CrsStatus, Layer}, types::UnitId};

/// Overlap fraction recorded when a candidate was found only through its bounding box and
/// no real fraction could be established. Never used as an apportionment weight.
pub const BBOX_ONLY: f64 = -1.0;

/// How an overlap fraction was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapKind {
    /// The only bounding-box candidate; assumed to fully contain the fine unit.
    SingleCandidate,
    /// Measured from the area of the intersection.
    Area,
    /// Measured, but at or below the small-overlap threshold.
    VerySmall,
    /// Intersection unusable; the coarse unit contains the fine unit.
    Contains,
    /// Intersection unusable; the two units overlap.
    Overlaps,
    /// Intersection unusable and no relation found; bounding boxes only.
    BoundingBoxOnly,
}

/// One coarse unit overlapping a fine unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlap {
    pub coarse: UnitId,
    pub fraction: f64, // In [0, 1], or BBOX_ONLY
    pub kind: OverlapKind,
}

impl Overlap {
    pub fn new(coarse: UnitId, fraction: f64, kind: OverlapKind) -> Self {
        Self { coarse, fraction, kind }
    }
}

pub type Overlaps = SmallVec<[Overlap; 2]>;

/// Fine unit id -> coarse units it overlaps, in fine-layer order.
/// Every fine unit of the mapped layer has an entry; an empty entry means unmatched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainmentMap {
    fine: Vec<UnitId>,
    entries: Vec<Overlaps>,
    index: AHashMap<UnitId, usize>,
    coarse: Vec<UnitId>, // Coarse units that took part, in coarse-layer order
    coarse_set: AHashSet<UnitId>,
}

impl ContainmentMap {
    /// Empty map over the given coarse unit ids.
    pub fn new(coarse: Vec<UnitId>) -> Self {
        Self {
            coarse_set: coarse.iter().cloned().collect(),
            coarse,
            ..Default::default()
        }
    }

    /// Set the entry of a fine unit, replacing any previous entry in place.
    pub fn insert(&mut self, fine: UnitId, overlaps: Overlaps) {
        match self.index.get(&fine) {
            Some(&i) => self.entries[i] = overlaps,
            None => {
                self.index.insert(fine.clone(), self.fine.len());
                self.fine.push(fine);
                self.entries.push(overlaps);
            }
        }
    }

    #[inline] pub fn len(&self) -> usize { self.fine.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.fine.is_empty() }

    #[inline]
    pub fn get(&self, fine: &str) -> Option<&[Overlap]> {
        self.index.get(fine).map(|&i| self.entries[i].as_slice())
    }

    /// Iterate over (fine id, overlaps) in fine-layer order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&UnitId, &[Overlap])> + '_ {
        self.fine.iter().zip(self.entries.iter().map(|e| e.as_slice()))
    }

    /// Coarse unit ids that took part in the mapping.
    #[inline] pub fn coarse_ids(&self) -> &[UnitId] { &self.coarse }

    /// Look up a coarse unit id.
    #[inline] pub fn coarse_id(&self, id: &str) -> Option<&UnitId> { self.coarse_set.get(id) }
}

/// Counters describing one containment computation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainmentStats {
    pub finer_units: usize,
    pub coarser_units: usize,
    pub unmatched: usize,
    pub single_candidate: usize,
    /// Fine/coarse pairs whose overlap was measured (fine units with 2+ candidates).
    pub candidate_pairs: usize,
    pub very_small: usize,
    pub intersection_failures: usize,
    /// Pairs where the fallback relation test failed as well.
    pub relation_failures: usize,
    pub bbox_only: usize,
    /// The two layers' extents do not meet, which usually means mismatched coordinates.
    pub extents_disjoint: bool,
    pub crs: Option<CrsStatus>,
}

/// Result of [`compute_containment`].
#[derive(Debug, Clone)]
pub struct Containment {
    pub map: ContainmentMap,
    pub stats: ContainmentStats,
}

/// Fraction of `fine`'s area lying inside `coarse`, or `None` if it cannot be computed.
fn overlap_fraction(fine: &MultiPolygon<f64>, coarse: &MultiPolygon<f64>) -> Option<f64> {
    let fine_area = fine.unsigned_area();
    if !(fine_area.is_finite() && fine_area > 0.0) { return None }

    // Boolean operations may panic on degenerate input; treat that as a failed intersection.
    let shared = catch_unwind(AssertUnwindSafe(|| fine.intersection(coarse).unsigned_area())).ok()?;
    shared.is_finite().then(|| (shared / fine_area).clamp(0.0, 1.0))
}

/// Fallback when the intersection is empty or unusable: (coarse contains fine, they overlap).
fn relation(fine: &MultiPolygon<f64>, coarse: &MultiPolygon<f64>) -> Option<(bool, bool)> {
    catch_unwind(AssertUnwindSafe(|| {
        let im = coarse.relate(fine);
        (im.is_contains(), im.is_overlaps())
    })).ok()
}

/// Turn a measured fraction into an overlap. `relation` is consulted only when the fraction
/// is zero or could not be measured (`None`).
fn classify(fraction: Option<f64>, relation: impl FnOnce() -> Option<(bool, bool)>, id: &UnitId, threshold: f64, stats: &mut ContainmentStats) -> Overlap {
    match fraction {
        Some(fraction) if fraction > threshold => return Overlap::new(id.clone(), fraction, OverlapKind::Area),
        Some(fraction) if fraction > 0.0 => {
            stats.very_small += 1;
            return Overlap::new(id.clone(), fraction, OverlapKind::VerySmall);
        }
        Some(_) => {}
        None => stats.intersection_failures += 1,
    }

    match relation() {
        Some((true, _)) => Overlap::new(id.clone(), 1.0, OverlapKind::Contains),
        Some((false, true)) => Overlap::new(id.clone(), 0.5, OverlapKind::Overlaps),
        Some((false, false)) => {
            stats.bbox_only += 1;
            Overlap::new(id.clone(), BBOX_ONLY, OverlapKind::BoundingBoxOnly)
        }
        None => {
            stats.relation_failures += 1;
            stats.bbox_only += 1;
            Overlap::new(id.clone(), BBOX_ONLY, OverlapKind::BoundingBoxOnly)
        }
    }
}

/// Measure how one fine unit overlaps one of several coarse candidates.
fn measure(fine: &MultiPolygon<f64>, coarse: &MultiPolygon<f64>, id: &UnitId, threshold: f64, stats: &mut ContainmentStats) -> Overlap {
    stats.candidate_pairs += 1;
    classify(overlap_fraction(fine, coarse), || relation(fine, coarse), id, threshold, stats)
}

/// For every unit of `finer`, find the units of `coarser` it overlaps and by what fraction
/// of its own area.
///
/// Candidates come from the coarser layer's bounding-box index. A single candidate is taken
/// as full containment without measuring; with several, each intersection is measured and,
/// when that fails or comes out empty, replaced by a contains/overlaps test. Failures are
/// counted in the returned stats and never abort the run.
///
/// If both layers have known, different coordinate systems the coarser layer is reprojected
/// into the finer layer's system first.
pub fn compute_containment(coarser: &Layer, finer: &Layer, config: &RunConfig) -> Result<Containment> {
    let (coarser, crs) = reconcile(coarser, finer)?;

    let mut stats = ContainmentStats {
        finer_units: finer.len(),
        coarser_units: coarser.len(),
        crs: Some(crs),
        ..Default::default()
    };
    match (coarser.bounds(), finer.bounds()) {
        (Some(outer), Some(inner)) if !outer.intersects(&inner) => {
            stats.extents_disjoint = true;
            warn!("[containment] coarser extent {outer:?} and finer extent {inner:?} do not meet; check the coordinate systems");
        }
        (Some(outer), Some(inner)) => debug!("[containment] coarser extent {outer:?}, finer extent {inner:?}"),
        _ => {}
    }

    let mut map = ContainmentMap::new(coarser.units().iter().map(|unit| unit.id.clone()).collect());

    for unit in finer.units() {
        let candidates = match unit.shape.bounding_rect() {
            Some(rect) => coarser.candidates(&rect),
            None => Vec::new(),
        };

        let overlaps: Overlaps = match candidates.as_slice() {
            [] => {
                stats.unmatched += 1;
                SmallVec::new()
            }
            [only] => {
                stats.single_candidate += 1;
                SmallVec::from_elem(
                    Overlap::new(coarser.unit(*only).id.clone(), 1.0, OverlapKind::SingleCandidate), 1,
                )
            }
            several => several.iter()
                .map(|&j| {
                    let candidate = coarser.unit(j);
                    measure(&unit.shape, &candidate.shape, &candidate.id, config.small_overlap, &mut stats)
                })
                .collect(),
        };

        if config.traces(unit.id.as_str()) {
            debug!("[containment] {} -> {:?}", unit.id, overlaps.as_slice());
        }
        map.insert(unit.id.clone(), overlaps);
    }

    info!(
        "[containment] {} finer units vs {} coarser units: {} unmatched, {} single-candidate, {} measured pairs",
        stats.finer_units, stats.coarser_units, stats.unmatched, stats.single_candidate, stats.candidate_pairs,
    );
    info!("[containment] {} very small overlaps, {} bounding-box-only", stats.very_small, stats.bbox_only);
    if stats.intersection_failures > 0 || stats.relation_failures > 0 {
        warn!(
            "[containment] {} intersections failed, {} of them also failed the relation fallback",
            stats.intersection_failures, stats.relation_failures,
        );
    }

    Ok(Containment { map, stats })
}
