#![doc = "Crosswalk: redistribute attribute data between non-congruent boundary layers"]
mod aggregate;
mod apportion;
mod config;
mod disaggregate;
mod geom;
mod map;
mod policy;
mod types;
mod verify;

pub mod io;

#[doc(inline)]
pub use aggregate::{Aggregation, AggregationReport, Aggregator};

#[doc(inline)]
pub use apportion::{apportion, apportion_signed, split_proportional};

#[doc(inline)]
pub use config::RunConfig;

#[doc(inline)]
pub use disaggregate::{Disaggregation, DisaggregationReport, Disaggregator};

#[doc(inline)]
pub use geom::{proj4_definition, reconcile, CrsStatus, GeoUnit, Layer};

#[doc(inline)]
pub use map::{
    compute_containment, derive_final_assignment, AssignmentMap, AssignmentStats, Containment,
    ContainmentMap, ContainmentStats, FinalAssignment, Overlap, OverlapKind, Overlaps, Parents,
    PrefixFallback, UnmatchedPolicy, BBOX_ONLY,
};

#[doc(inline)]
pub use policy::{DefaultFieldFilter, FieldFilter, FieldRenamer, FilterConfig, KeySelector, RenameRule, RenameTable};

#[doc(inline)]
pub use types::{accumulate, FieldValue, Number, PopulationWeightMap, PropertyTable, Record, UnitId, Weight};

#[doc(inline)]
pub use verify::{Verification, Verifier};
