// navfuse_core/src/types.rs

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

// --- Core Type Aliases ---
pub type State = DVector<f64>;
pub type Covariance = DMatrix<f64>;
pub type Control = DVector<f64>;

/// Seconds on the sensor clock shared by every source.
pub type Timestamp = f64;

// --- Vehicle State Layout ---

/// Every variable that exists in the vehicle state vector `X`.
/// Positions are metres in the local ENU plane, heading is radians
/// counter-clockwise from the +x (east) axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateVariable {
    Px,
    Py,
    Heading,
}

impl StateVariable {
    /// Index of this variable inside the state vector.
    pub const fn index(self) -> usize {
        match self {
            StateVariable::Px => 0,
            StateVariable::Py => 1,
            StateVariable::Heading => 2,
        }
    }
}

// --- Identifiers ---

/// The independent producers feeding the state machine. Ordering guarantees
/// (non-decreasing timestamps) hold per source only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorSource {
    Gps,
    Abs,
    Gyro,
}

impl SensorSource {
    pub const ALL: [SensorSource; 3] = [SensorSource::Gps, SensorSource::Abs, SensorSource::Gyro];

    pub(crate) const fn slot(self) -> usize {
        match self {
            SensorSource::Gps => 0,
            SensorSource::Abs => 1,
            SensorSource::Gyro => 2,
        }
    }
}

/// The operating mode of the positioning state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FusionState {
    /// No usable GPS fix since the last reset.
    #[default]
    ColdStart,
    /// A GPS fix exists, but the heading is not observable yet.
    Initializing,
    /// Normal operation, an estimate is published every cycle.
    Tracking,
}

impl FusionState {
    pub fn is_tracking(self) -> bool {
        matches!(self, FusionState::Tracking)
    }
}
