// navfuse_core/src/models/mod.rs

//! Concrete vehicle models plugged into the generic prediction and update
//! equations.

pub mod dynamics;
pub mod measurement;
