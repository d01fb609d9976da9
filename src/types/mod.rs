mod table;
mod unit_id;
mod value;
mod weights;

pub use table::PropertyTable;
pub use unit_id::UnitId;
pub use value::{accumulate, FieldValue, Number, Record};
pub use weights::{PopulationWeightMap, Weight};
