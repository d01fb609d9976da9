mod assignment;
mod containment;

pub use assignment::{derive_final_assignment, AssignmentMap, AssignmentStats, FinalAssignment, Parents, PrefixFallback, UnmatchedPolicy};
pub use containment::{compute_containment, Containment, ContainmentMap, ContainmentStats, Overlap, OverlapKind, Overlaps, BBOX_ONLY};
