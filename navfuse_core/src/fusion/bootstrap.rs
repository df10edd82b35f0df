// navfuse_core/src/fusion/bootstrap.rs

use crate::config::FusionConfig;
use crate::estimation::{FilterError, GaussianHypothesis, HypothesisSet};
use crate::messages::GpsFix;
use crate::types::{State, StateVariable};
use crate::utils::angles::wrap_angle;
use nalgebra::{DMatrix, Rotation2, Vector2};

/// Where the initial heading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeadingSource {
    /// Bearing between the first and the latest fix.
    GpsBaseline,
    /// Course reported by the receiver.
    GpsCourse,
    /// Gyro integration from the bootstrap heading.
    Gyro,
}

/// Dead reckoning accumulated while the heading is still unknown.
///
/// Motion is integrated in a local "yaw frame" whose x axis is the vehicle
/// heading at the moment `Initializing` was entered. Once the rotation
/// between that frame and the world is known, the accumulated displacement
/// can be carried over into every heading hypothesis.
#[derive(Debug, Clone)]
pub(crate) struct Bootstrap {
    first_fix: GpsFix,
    latest_fix: GpsFix,
    /// Heading assumed when the single bootstrap hypothesis was created.
    initial_heading: f64,
    /// Integrated gyro yaw since entry.
    yaw: f64,
    /// Net displacement in the yaw frame.
    displacement: Vector2<f64>,
    /// Path length travelled since entry.
    travelled: f64,
    yaw_at_fix: f64,
    displacement_at_fix: Vector2<f64>,
    travelled_at_fix: f64,
}

impl Bootstrap {
    pub fn new(fix: GpsFix, initial_heading: f64) -> Self {
        Self {
            first_fix: fix,
            latest_fix: fix,
            initial_heading,
            yaw: 0.0,
            displacement: Vector2::zeros(),
            travelled: 0.0,
            yaw_at_fix: 0.0,
            displacement_at_fix: Vector2::zeros(),
            travelled_at_fix: 0.0,
        }
    }

    pub fn travelled(&self) -> f64 {
        self.travelled
    }

    /// Straight-line distance between the entry pose and the current one.
    /// Driving forward and back again cancels out.
    pub fn net_displacement(&self) -> f64 {
        self.displacement.norm()
    }

    pub fn travelled_since_fix(&self) -> f64 {
        self.travelled - self.travelled_at_fix
    }

    pub fn integrate(&mut self, speed: f64, yaw_rate: f64, dt: f64) {
        let mid = self.yaw + 0.5 * yaw_rate * dt;
        self.displacement += Vector2::new(mid.cos(), mid.sin()) * (speed * dt);
        self.travelled += speed.abs() * dt;
        self.yaw += yaw_rate * dt;
    }

    pub fn record_fix(&mut self, fix: GpsFix) {
        self.latest_fix = fix;
        self.yaw_at_fix = self.yaw;
        self.displacement_at_fix = self.displacement;
        self.travelled_at_fix = self.travelled;
    }

    /// Rotation from the yaw frame into the world frame, i.e. the world
    /// heading the vehicle had when `Initializing` was entered.
    pub fn frame_rotation(&self, config: &FusionConfig) -> (f64, HeadingSource) {
        let baseline = Vector2::new(
            self.latest_fix.x - self.first_fix.x,
            self.latest_fix.y - self.first_fix.y,
        );
        let baseline_sigma = (self.first_fix.sigma_x.powi(2)
            + self.first_fix.sigma_y.powi(2)
            + self.latest_fix.sigma_x.powi(2)
            + self.latest_fix.sigma_y.powi(2))
        .sqrt();
        let length = baseline.norm();
        if length >= config.heading_init_distance_m && length >= 3.0 * baseline_sigma {
            let bearing = baseline.y.atan2(baseline.x);
            // Direction of the same chord as seen by dead reckoning.
            let chord = self.displacement_at_fix;
            let chord_yaw = if chord.norm() >= 0.5 * config.heading_init_distance_m {
                chord.y.atan2(chord.x)
            } else {
                self.yaw_at_fix
            };
            return (wrap_angle(bearing - chord_yaw), HeadingSource::GpsBaseline);
        }

        let fix = &self.latest_fix;
        if fix.has_heading() && fix.sigma_heading <= config.max_gps_heading_std {
            return (wrap_angle(fix.heading - self.yaw_at_fix), HeadingSource::GpsCourse);
        }

        (self.initial_heading, HeadingSource::Gyro)
    }

    /// Splits the bootstrap hypothesis into a Gaussian sum over heading.
    ///
    /// Component `k` sits at heading offset `0, +δ, -δ, +2δ, …` and its
    /// position is the bootstrap position plus the displacement driven since
    /// the latest fix, rotated by that component's heading.
    pub fn split(
        &self,
        bootstrap: &GaussianHypothesis,
        config: &FusionConfig,
    ) -> Result<(HypothesisSet, HeadingSource), FilterError> {
        let (rotation, source) = self.frame_rotation(config);
        let count = config.max_hypotheses.max(1);
        let delta = config.heading_spread_rad;
        let sigma = config.initial_heading_std;
        let heading_var = if count == 1 {
            sigma * sigma
        } else {
            (0.5 * delta).powi(2)
        };

        let since_fix = self.displacement - self.displacement_at_fix;
        let (px, py, th) = (
            StateVariable::Px.index(),
            StateVariable::Py.index(),
            StateVariable::Heading.index(),
        );

        let mut covariance = DMatrix::zeros(3, 3);
        covariance
            .view_mut((0, 0), (2, 2))
            .copy_from(&bootstrap.covariance.view((0, 0), (2, 2)));
        covariance[(th, th)] = heading_var;

        let mut set = HypothesisSet::allocate(count);
        for k in 0..count {
            let step = ((k + 1) / 2) as f64;
            let offset = if k % 2 == 1 { step * delta } else { -step * delta };
            let frame = rotation + offset;
            let moved = Rotation2::new(frame) * since_fix;

            let mut mean = State::zeros(3);
            mean[px] = bootstrap.mean[px] + moved.x;
            mean[py] = bootstrap.mean[py] + moved.y;
            mean[th] = wrap_angle(frame + self.yaw);

            let weight = (-0.5 * (offset / sigma).powi(2)).exp();
            set.push(GaussianHypothesis::new(mean, covariance.clone(), weight))?;
        }
        set.normalize()?;
        Ok((set, source))
    }
}
