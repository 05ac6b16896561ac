//! Work unit source.

mod work_units;

pub use work_units::{coordinate_bounds, load_work_units, WorkUnit};
