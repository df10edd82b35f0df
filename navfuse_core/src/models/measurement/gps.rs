// navfuse_core/src/models/measurement/gps.rs

use crate::estimation::{GaussianHypothesis, MeasurementModel, ObservationKind, ObservationParameters};
use crate::messages::GpsFix;
use crate::types::StateVariable;
use crate::utils::angles::angle_diff;
use crate::utils::linalg::mahalanobis_squared;
use nalgebra::{DMatrix, DVector};

/// Whether an innovation lies inside the `gate_sigma` Mahalanobis gate.
fn within_gate(params: &ObservationParameters, hypothesis: &GaussianHypothesis, gate_sigma: f64) -> bool {
    let h = params.observation_matrix();
    let s = h * &hypothesis.covariance * h.transpose() + &params.r;
    mahalanobis_squared(&params.innovation(&hypothesis.mean), &s)
        .is_some_and(|m| m <= gate_sigma * gate_sigma)
}

fn position_noise(fix: &GpsFix) -> DMatrix<f64> {
    let cov = fix.position_covariance();
    DMatrix::from_iterator(2, 2, cov.iter().copied())
}

// --- Position only ---

/// Linear GPS model observing `(x, y)`.
#[derive(Debug, Clone)]
pub struct GpsPositionModel {
    pub fix: GpsFix,
    pub gate_sigma: f64,
}

impl MeasurementModel for GpsPositionModel {
    fn evaluate_parameters(&self, hypothesis: &GaussianHypothesis) -> ObservationParameters {
        let mut h = DMatrix::zeros(2, hypothesis.dim());
        h[(0, StateVariable::Px.index())] = 1.0;
        h[(1, StateVariable::Py.index())] = 1.0;

        let mut params = ObservationParameters {
            kind: ObservationKind::Linear { h },
            r: position_noise(&self.fix),
            z: DVector::from_vec(vec![self.fix.x, self.fix.y]),
            coherent: false,
        };
        params.coherent = within_gate(&params, hypothesis, self.gate_sigma);
        params
    }
}

// --- Position and course ---

/// Nonlinear GPS model observing `(x, y, heading)`.
///
/// The heading residual is taken the short way round, so a fix at 179° and a
/// hypothesis at -179° disagree by 2°, not 358°.
#[derive(Debug, Clone)]
pub struct GpsPoseModel {
    pub fix: GpsFix,
    pub gate_sigma: f64,
}

impl MeasurementModel for GpsPoseModel {
    fn evaluate_parameters(&self, hypothesis: &GaussianHypothesis) -> ObservationParameters {
        let n = hypothesis.dim();
        let x = &hypothesis.mean;
        let (px, py, th) = (
            StateVariable::Px.index(),
            StateVariable::Py.index(),
            StateVariable::Heading.index(),
        );

        let mut jacobian = DMatrix::zeros(3, n);
        jacobian[(0, px)] = 1.0;
        jacobian[(1, py)] = 1.0;
        jacobian[(2, th)] = 1.0;

        let z_heading = self.fix.heading;
        let predicted = DVector::from_vec(vec![
            x[px],
            x[py],
            z_heading - angle_diff(z_heading, x[th]),
        ]);

        let mut r = DMatrix::zeros(3, 3);
        r.view_mut((0, 0), (2, 2)).copy_from(&position_noise(&self.fix));
        r[(2, 2)] = self.fix.sigma_heading.powi(2);

        let mut params = ObservationParameters {
            kind: ObservationKind::Nonlinear { jacobian, predicted },
            r,
            z: DVector::from_vec(vec![self.fix.x, self.fix.y, z_heading]),
            coherent: false,
        };
        params.coherent = within_gate(&params, hypothesis, self.gate_sigma);
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::{update_in_place, HypothesisSet};
    use approx::assert_abs_diff_eq;

    fn fix(x: f64, y: f64, heading: f64) -> GpsFix {
        GpsFix {
            x,
            y,
            heading,
            sigma_x: 1.0,
            sigma_y: 1.0,
            sigma_xy: 0.0,
            sigma_heading: 0.1,
            integrity: 5,
            timestamp: 0.0,
        }
    }

    fn hypothesis(x: f64, y: f64, heading: f64) -> GaussianHypothesis {
        GaussianHypothesis::new(
            DVector::from_vec(vec![x, y, heading]),
            DMatrix::identity(3, 3),
            1.0,
        )
    }

    #[test]
    fn position_update_averages_equal_uncertainties() {
        let mut set = HypothesisSet::single(
            DVector::from_vec(vec![0.0, 0.0, 0.0]),
            DMatrix::identity(3, 3),
            1,
        );
        let model = GpsPositionModel {
            fix: fix(2.0, -2.0, f64::NAN),
            gate_sigma: 4.0,
        };
        let report = update_in_place(&model, &mut set).unwrap();
        assert_eq!(report.coherent, 1);
        let h = set.get(0).unwrap();
        assert_abs_diff_eq!(h.mean[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(h.mean[1], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(h.covariance[(0, 0)], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn far_hypotheses_fall_outside_the_gate() {
        let model = GpsPositionModel {
            fix: fix(50.0, 0.0, f64::NAN),
            gate_sigma: 4.0,
        };
        assert!(!model.evaluate_parameters(&hypothesis(0.0, 0.0, 0.0)).coherent);
        assert!(model.evaluate_parameters(&hypothesis(48.0, 1.0, 0.0)).coherent);
    }

    #[test]
    fn heading_residual_takes_the_short_way() {
        let model = GpsPoseModel {
            fix: fix(0.0, 0.0, 179f64.to_radians()),
            gate_sigma: 4.0,
        };
        let params = model.evaluate_parameters(&hypothesis(0.0, 0.0, (-179f64).to_radians()));
        let innovation = params.innovation(&hypothesis(0.0, 0.0, 0.0).mean);
        assert_abs_diff_eq!(innovation[2], -(2f64.to_radians()), epsilon = 1e-9);
        assert!(params.coherent);
    }
}
