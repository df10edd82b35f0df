// navfuse_core/src/models/dynamics/mod.rs

mod constant_position;
mod odometric;

pub use constant_position::ConstantPositionModel;
pub use odometric::OdometricModel;

use crate::messages::{AbsReading, GyroReading};

/// The latest driving inputs, held between samples.
///
/// ABS and gyro arrive on their own schedules; a prediction step always uses
/// the last known value of each.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlInputs {
    /// Longitudinal speed derived from the wheel rates, m/s.
    pub speed: f64,
    /// Yaw rate, rad/s.
    pub yaw_rate: f64,
}

impl ControlInputs {
    pub fn apply_abs(&mut self, reading: &AbsReading, wheel_radius: f64) {
        self.speed = reading.speed(wheel_radius);
    }

    pub fn apply_gyro(&mut self, reading: &GyroReading) {
        self.yaw_rate = reading.yaw_rate;
    }
}
