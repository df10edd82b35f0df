// navfuse_core/src/messages.rs

use crate::mapping::MapMatch;
use crate::types::{FusionState, SensorSource, Timestamp};
use nalgebra::{Matrix2, Matrix3};
use serde::{Deserialize, Serialize};

// =========================================================================
// == Decoded Sensor Samples ==
// =========================================================================

/// A decoded GPS fix in the local ENU plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub x: f64,
    pub y: f64,
    /// Course over ground, radians counter-clockwise from +x. May be NaN when
    /// the receiver has no course.
    pub heading: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
    /// Position cross-covariance, m².
    pub sigma_xy: f64,
    pub sigma_heading: f64,
    /// Receiver quality index; higher is better, negative means invalid.
    pub integrity: i32,
    pub timestamp: Timestamp,
}

impl GpsFix {
    /// The 2x2 position covariance of the fix.
    pub fn position_covariance(&self) -> Matrix2<f64> {
        Matrix2::new(
            self.sigma_x * self.sigma_x,
            self.sigma_xy,
            self.sigma_xy,
            self.sigma_y * self.sigma_y,
        )
    }

    pub fn has_heading(&self) -> bool {
        self.heading.is_finite() && self.sigma_heading.is_finite() && self.sigma_heading > 0.0
    }
}

/// Left/right wheel angular rates from the ABS controller, rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbsReading {
    pub left: f64,
    pub right: f64,
    pub timestamp: Timestamp,
}

impl AbsReading {
    /// Longitudinal vehicle speed for the given wheel radius.
    pub fn speed(&self, wheel_radius: f64) -> f64 {
        wheel_radius * 0.5 * (self.left + self.right)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GyroReading {
    /// Yaw rate, rad/s, counter-clockwise positive.
    pub yaw_rate: f64,
    pub timestamp: Timestamp,
}

/// A self-describing container for every sensor the core consumes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SensorSample {
    Gps(GpsFix),
    Abs(AbsReading),
    Gyro(GyroReading),
}

impl SensorSample {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            SensorSample::Gps(fix) => fix.timestamp,
            SensorSample::Abs(reading) => reading.timestamp,
            SensorSample::Gyro(reading) => reading.timestamp,
        }
    }

    pub fn source(&self) -> SensorSource {
        match self {
            SensorSample::Gps(_) => SensorSource::Gps,
            SensorSample::Abs(_) => SensorSource::Abs,
            SensorSample::Gyro(_) => SensorSource::Gyro,
        }
    }
}

// =========================================================================
// == Requests and Published Estimates ==
// =========================================================================

/// A request handled by the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EstimateRequest {
    /// Stop the server once pending work has been drained.
    Shutdown,
    /// A consumer outside the core wants the latest estimate.
    ExternalQuery,
    /// Raised by the state machine after a GPS cycle.
    InternalQuery,
}

impl EstimateRequest {
    pub fn is_query(self) -> bool {
        !matches!(self, EstimateRequest::Shutdown)
    }
}

/// The published, integrity-qualified vehicle estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub timestamp: Timestamp,
    pub x: f64,
    pub y: f64,
    /// Wrapped to (-π, π].
    pub heading: f64,
    /// Mixture covariance over `[x, y, heading]`.
    pub covariance: Matrix3<f64>,
    /// Number of hypotheses in the Gaussian sum.
    pub hypotheses: usize,
    pub state: FusionState,
    /// The road segment the estimate was matched to, when one was found.
    pub matched: Option<MapMatch>,
}
