// navfuse_core/src/prelude.rs

// --- Core Data Structures ---
pub use crate::messages::{
    AbsReading, Estimate, EstimateRequest, GpsFix, GyroReading, SensorSample,
};
pub use crate::types::{FusionState, SensorSource, StateVariable, Timestamp};

// --- Configuration ---
pub use crate::config::{FusionConfig, MatcherConfig, RenormalizationCadence};

// --- Estimation Engine ---
pub use crate::estimation::{
    FilterError, GaussianHypothesis, HypothesisSet, MeasurementModel, PredictionModel,
};

// --- Map ---
pub use crate::mapping::{
    MapCache, MapError, MapMatch, MapMatcher, MapProvider, MapRequest, Road, SegmentHandle,
    SharedMapCache,
};

// --- Positioning and Serving ---
pub use crate::fusion::{FusionError, PositioningStateMachine, StepOutcome};
pub use crate::server::{
    ArbiterClient, ArbiterError, EstimateBoard, PendingReply, Reply, RequestArbiter,
    ShutdownSignal,
};
