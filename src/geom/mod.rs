mod layer;
mod proj;

pub use layer::{GeoUnit, Layer};
pub use proj::{proj4_definition, reconcile, CrsStatus};
