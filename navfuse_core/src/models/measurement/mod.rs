// navfuse_core/src/models/measurement/mod.rs

mod gps;
mod road;

pub use gps::{GpsPoseModel, GpsPositionModel};
pub use road::RoadConstraintModel;
