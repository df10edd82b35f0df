// navfuse_core/src/models/dynamics/odometric.rs

use crate::estimation::{GaussianHypothesis, PredictionModel, TransitionParameters};
use crate::types::StateVariable;
use crate::utils::angles::wrap_angle;
use nalgebra::{DMatrix, DVector};

/// Dead reckoning from wheel speed and yaw rate over `X = [x, y, heading]`.
///
/// The position is advanced along the mid-step heading:
///
/// ```text
/// θm = θ + ω·dt/2
/// x' = x + v·dt·cos(θm)
/// y' = y + v·dt·sin(θm)
/// θ' = θ + ω·dt
/// ```
///
/// Speed and yaw-rate noise enter through the input Jacobian `G`.
#[derive(Debug, Clone)]
pub struct OdometricModel {
    pub dt: f64,
    pub speed: f64,
    pub yaw_rate: f64,
    pub speed_noise_std: f64,
    pub yaw_rate_noise_std: f64,
}

impl PredictionModel for OdometricModel {
    fn evaluate_parameters(&self, hypothesis: &GaussianHypothesis) -> TransitionParameters {
        let (px, py, th) = (
            StateVariable::Px.index(),
            StateVariable::Py.index(),
            StateVariable::Heading.index(),
        );
        let x = &hypothesis.mean;
        let dt = self.dt;
        let v = self.speed;
        let mid = x[th] + 0.5 * self.yaw_rate * dt;
        let (sin_m, cos_m) = mid.sin_cos();

        let mut f = x.clone();
        f[px] += v * dt * cos_m;
        f[py] += v * dt * sin_m;
        f[th] = wrap_angle(x[th] + self.yaw_rate * dt);

        let mut jacobian = DMatrix::identity(3, 3);
        jacobian[(px, th)] = -v * dt * sin_m;
        jacobian[(py, th)] = v * dt * cos_m;

        // Columns: [speed, yaw rate].
        let mut g = DMatrix::zeros(3, 2);
        g[(px, 0)] = dt * cos_m;
        g[(py, 0)] = dt * sin_m;
        g[(px, 1)] = -0.5 * v * dt * dt * sin_m;
        g[(py, 1)] = 0.5 * v * dt * dt * cos_m;
        g[(th, 1)] = dt;

        let q = DMatrix::from_diagonal(&DVector::from_vec(vec![
            self.speed_noise_std.powi(2),
            self.yaw_rate_noise_std.powi(2),
        ]));

        TransitionParameters::Nonlinear { f, jacobian, g, q }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::{predict_in_place, HypothesisSet};
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    fn set_at(heading: f64) -> HypothesisSet {
        HypothesisSet::single(
            DVector::from_vec(vec![0.0, 0.0, heading]),
            DMatrix::identity(3, 3) * 0.01,
            1,
        )
    }

    fn model(dt: f64, speed: f64, yaw_rate: f64) -> OdometricModel {
        OdometricModel {
            dt,
            speed,
            yaw_rate,
            speed_noise_std: 0.1,
            yaw_rate_noise_std: 0.02,
        }
    }

    #[test]
    fn straight_drive_follows_heading() {
        let mut set = set_at(FRAC_PI_2);
        predict_in_place(&model(2.0, 3.0, 0.0), &mut set).unwrap();
        let h = set.get(0).unwrap();
        assert_abs_diff_eq!(h.mean[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(h.mean[1], 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(h.mean[2], FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn turning_wraps_heading_and_grows_uncertainty() {
        let mut set = set_at(3.0);
        predict_in_place(&model(1.0, 5.0, 0.5), &mut set).unwrap();
        let h = set.get(0).unwrap();
        assert!(h.mean[2] < 0.0);
        assert_abs_diff_eq!(h.mean[2], wrap_angle(3.5), epsilon = 1e-12);
        assert!(h.covariance[(2, 2)] > 0.01);
        // Heading uncertainty leaks into the lateral position.
        assert!(h.covariance[(1, 1)] > 0.01 + 1e-6);
    }

    #[test]
    fn standing_still_changes_nothing() {
        let mut set = set_at(1.0);
        let before = set.clone();
        predict_in_place(&model(0.0, 4.0, 0.3), &mut set).unwrap();
        let (h, b) = (set.get(0).unwrap(), before.get(0).unwrap());
        assert_abs_diff_eq!(h.mean, b.mean, epsilon = 1e-12);
        assert_eq!(h.covariance, b.covariance);
    }
}
