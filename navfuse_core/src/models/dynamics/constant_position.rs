// navfuse_core/src/models/dynamics/constant_position.rs

use crate::estimation::{GaussianHypothesis, PredictionModel, TransitionParameters};
use crate::types::StateVariable;
use nalgebra::{DMatrix, DVector};

/// Ages a hypothesis whose heading is not trusted yet.
///
/// `A = I`, `B = I`, and `U` only integrates the gyro into the heading. The
/// position does not move, instead its variance grows by a random walk plus
/// the square of the distance driven since the last fix, since the direction
/// of travel is unknown. Each step adds `(d₀ + |v|·dt)² − d₀²`, so the sum
/// over a drive does not depend on the ABS rate.
#[derive(Debug, Clone)]
pub struct ConstantPositionModel {
    pub dt: f64,
    pub speed: f64,
    pub yaw_rate: f64,
    /// Path length driven since the last fix, before this step.
    pub travelled_before: f64,
    pub position_random_walk: f64,
    pub yaw_rate_noise_std: f64,
}

impl PredictionModel for ConstantPositionModel {
    fn evaluate_parameters(&self, _hypothesis: &GaussianHypothesis) -> TransitionParameters {
        let before = self.travelled_before.max(0.0);
        let after = before + self.speed.abs() * self.dt;
        let position_var = self.position_random_walk * self.dt + after * after - before * before;
        let heading_var = (self.yaw_rate_noise_std * self.dt).powi(2);

        let mut u = DVector::zeros(3);
        u[StateVariable::Heading.index()] = self.yaw_rate * self.dt;

        TransitionParameters::Linear {
            a: DMatrix::identity(3, 3),
            b: DMatrix::identity(3, 3),
            u,
            q: DMatrix::from_diagonal(&DVector::from_vec(vec![
                position_var,
                position_var,
                heading_var,
            ])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::{predict_in_place, HypothesisSet};
    use approx::assert_abs_diff_eq;

    #[test]
    fn position_stays_but_uncertainty_grows() {
        let mut set = HypothesisSet::single(
            DVector::from_vec(vec![10.0, -2.0, 0.3]),
            DMatrix::identity(3, 3),
            1,
        );
        let model = ConstantPositionModel {
            dt: 0.5,
            speed: 2.0,
            yaw_rate: 0.2,
            travelled_before: 0.0,
            position_random_walk: 0.1,
            yaw_rate_noise_std: 0.0,
        };
        predict_in_place(&model, &mut set).unwrap();
        let h = set.get(0).unwrap();
        assert_abs_diff_eq!(h.mean[0], 10.0);
        assert_abs_diff_eq!(h.mean[1], -2.0);
        assert_abs_diff_eq!(h.mean[2], 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(h.covariance[(0, 0)], 1.0 + 0.05 + 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(h.covariance[(2, 2)], 1.0, epsilon = 1e-12);
    }

    fn position_variance_after(steps: usize, distance: f64) -> f64 {
        let mut set = HypothesisSet::single(DVector::zeros(3), DMatrix::zeros(3, 3), 1);
        let dt = 1.0 / steps as f64;
        let mut travelled = 0.0;
        for _ in 0..steps {
            let model = ConstantPositionModel {
                dt,
                speed: distance,
                yaw_rate: 0.0,
                travelled_before: travelled,
                position_random_walk: 0.0,
                yaw_rate_noise_std: 0.0,
            };
            predict_in_place(&model, &mut set).unwrap();
            travelled += distance * dt;
        }
        set.get(0).unwrap().covariance[(0, 0)]
    }

    #[test]
    fn inflation_is_the_square_of_the_distance_at_any_rate() {
        assert_abs_diff_eq!(position_variance_after(10, 1.0), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(position_variance_after(100, 1.0), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(position_variance_after(50, 10.0), 100.0, epsilon = 1e-6);
    }
}
