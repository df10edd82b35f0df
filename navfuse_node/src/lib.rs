// navfuse_node/src/lib.rs

//! The runtime around `navfuse_core`: configuration, the sensor merge point,
//! the map service, the fusion thread and a synthetic drive to feed them.

pub mod cli;
pub mod config;
pub mod error;
pub mod runtime;
pub mod simulation;

pub use config::NodeConfig;
pub use error::NodeError;
pub use runtime::{FusionNode, RunOptions, RunSummary};
