// navfuse_core/src/fusion/mod.rs

//! The positioning state machine: classifies incoming samples and drives the
//! estimation engine and the map matcher accordingly.

use crate::estimation::FilterError;
use crate::mapping::MapRequest;
use crate::messages::{Estimate, EstimateRequest};
use crate::types::{FusionState, SensorSource, Timestamp};
use thiserror::Error;

mod bootstrap;
mod machine;

pub use machine::PositioningStateMachine;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FusionError {
    /// The sample is older than the last one processed from the same source.
    #[error("stale {sensor:?} sample at t={timestamp:.3}s (last processed t={last:.3}s)")]
    StaleSample {
        sensor: SensorSource,
        timestamp: Timestamp,
        last: Timestamp,
    },
    #[error(transparent)]
    Filter(#[from] FilterError),
}

/// What one processed sample produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// The state after the sample was processed.
    pub state: FusionState,
    /// The estimate written to the board, if any.
    pub published: Option<Estimate>,
    /// Raised after every complete GPS cycle while tracking.
    pub internal_query: Option<EstimateRequest>,
    /// The vehicle left the cached map area.
    pub map_request: Option<MapRequest>,
}

impl StepOutcome {
    pub(crate) fn quiet(state: FusionState) -> Self {
        Self {
            state,
            published: None,
            internal_query: None,
            map_request: None,
        }
    }
}
