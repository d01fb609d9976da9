use ahash::{AHashMap, AHashSet};
use log::{debug, info, warn};
use smallvec::SmallVec;

use super::containment::{ContainmentMap, Overlap, BBOX_ONLY};
use crate::types::UnitId;

pub type Parents = SmallVec<[UnitId; 1]>;

/// Fine unit id -> the coarse unit(s) it belongs to, in insertion order.
/// An empty parent list marks an unmatched fine unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentMap {
    fine: Vec<UnitId>,
    parents: Vec<Parents>,
    index: AHashMap<UnitId, usize>,
}

impl AssignmentMap {
    pub fn new() -> Self { Self::default() }

    /// Set the parents of a fine unit, replacing any previous assignment in place.
    pub fn insert(&mut self, fine: UnitId, parents: Parents) {
        match self.index.get(&fine) {
            Some(&i) => self.parents[i] = parents,
            None => {
                self.index.insert(fine.clone(), self.fine.len());
                self.fine.push(fine);
                self.parents.push(parents);
            }
        }
    }

    #[inline] pub fn len(&self) -> usize { self.fine.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.fine.is_empty() }

    #[inline]
    pub fn get(&self, fine: &str) -> Option<&[UnitId]> {
        self.index.get(fine).map(|&i| self.parents[i].as_slice())
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&UnitId, &[UnitId])> + '_ {
        self.fine.iter().zip(self.parents.iter().map(|p| p.as_slice()))
    }

    /// Coarse unit -> fine units assigned to it, coarse units in order of first appearance.
    /// A fine unit with several parents is listed under each.
    pub fn invert(&self) -> Vec<(UnitId, Vec<UnitId>)> {
        let mut order: AHashMap<&UnitId, usize> = AHashMap::new();
        let mut groups: Vec<(UnitId, Vec<UnitId>)> = Vec::new();
        for (fine, parents) in self.iter() {
            for parent in parents {
                let slot = *order.entry(parent).or_insert_with(|| {
                    groups.push((parent.clone(), Vec::new()));
                    groups.len() - 1
                });
                groups[slot].1.push(fine.clone());
            }
        }
        groups
    }
}

impl FromIterator<(UnitId, Parents)> for AssignmentMap {
    fn from_iter<I: IntoIterator<Item = (UnitId, Parents)>>(iter: I) -> Self {
        let mut map = Self::new();
        iter.into_iter().for_each(|(fine, parents)| map.insert(fine, parents));
        map
    }
}

/// Chooses a coarse unit for a fine unit that overlaps none.
pub trait UnmatchedPolicy {
    fn assign(&self, fine: &UnitId, map: &ContainmentMap) -> Option<UnitId>;
}

/// Assign to the coarse unit whose id equals the first `len` characters of the fine id,
/// e.g. a census block to its block group (`len = 12`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixFallback {
    pub len: usize,
}

impl UnmatchedPolicy for PrefixFallback {
    fn assign(&self, fine: &UnitId, map: &ContainmentMap) -> Option<UnitId> {
        map.coarse_id(fine.prefix(self.len)).cloned()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssignmentStats {
    pub fine_units: usize,
    pub assigned: usize,
    /// Fine units overlapping more than one coarse unit.
    pub split: usize,
    pub unmatched: usize,
    /// Unmatched units rescued by the fallback policy.
    pub fallback: usize,
    /// Assignments resting on a bounding-box-only overlap.
    pub bbox_only: usize,
    /// Coarse units that received no fine unit.
    pub coarse_unassigned: usize,
}

/// Result of [`derive_final_assignment`].
#[derive(Debug, Clone)]
pub struct FinalAssignment {
    pub map: AssignmentMap,
    pub stats: AssignmentStats,
}

/// Pick the overlap with the greatest fraction; ties keep the earliest entry.
fn best_overlap(overlaps: &[Overlap]) -> Option<&Overlap> {
    let (first, rest) = overlaps.split_first()?;
    Some(rest.iter().fold(first, |best, o| if o.fraction > best.fraction { o } else { best }))
}

/// Reduce a containment map to one parent per fine unit.
///
/// Each fine unit goes to its highest-fraction coarse unit. Units with no overlaps are
/// handed to `fallback` if one is given and left unmatched otherwise.
pub fn derive_final_assignment(map: &ContainmentMap, fallback: Option<&dyn UnmatchedPolicy>) -> FinalAssignment {
    let mut stats = AssignmentStats { fine_units: map.len(), ..Default::default() };
    let mut assignment = AssignmentMap::new();

    for (fine, overlaps) in map.iter() {
        if overlaps.len() > 1 { stats.split += 1 }
        let parent = match best_overlap(overlaps) {
            Some(best) => {
                if best.fraction == BBOX_ONLY { stats.bbox_only += 1 }
                Some(best.coarse.clone())
            }
            None => {
                let rescued = fallback.and_then(|policy| policy.assign(fine, map));
                match &rescued {
                    Some(coarse) => {
                        stats.fallback += 1;
                        debug!("[assignment] {fine} unmatched, falling back to {coarse}");
                    }
                    None => debug!("[assignment] {fine} is not contained in any coarse unit"),
                }
                rescued
            }
        };

        match parent {
            Some(coarse) => {
                stats.assigned += 1;
                assignment.insert(fine.clone(), SmallVec::from_elem(coarse, 1));
            }
            None => {
                stats.unmatched += 1;
                assignment.insert(fine.clone(), SmallVec::new());
            }
        }
    }

    let assigned: AHashSet<&UnitId> = assignment.iter().flat_map(|(_, parents)| parents).collect();
    stats.coarse_unassigned = map.coarse_ids().iter().filter(|id| !assigned.contains(id)).count();

    info!(
        "[assignment] {} of {} fine units assigned ({} by fallback, {} split), {} unmatched, {} bounding-box-only",
        stats.assigned, stats.fine_units, stats.fallback, stats.split, stats.unmatched, stats.bbox_only,
    );
    if stats.coarse_unassigned > 0 {
        warn!("[assignment] {} coarse units received no fine unit", stats.coarse_unassigned);
    }

    FinalAssignment { map: assignment, stats }
}
