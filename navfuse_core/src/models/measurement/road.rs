// navfuse_core/src/models/measurement/road.rs

use crate::estimation::{GaussianHypothesis, MeasurementModel, ObservationKind, ObservationParameters};
use crate::mapping::RoadSegment;
use crate::types::StateVariable;
use nalgebra::{DMatrix, DVector, Point2};

/// Pseudo-measurement "the vehicle drives on the centre line of `segment`".
///
/// `h(X)` is the signed lateral offset of the position from the segment's
/// supporting line and the measurement is zero. The road half-width serves
/// as the standard deviation of that offset.
#[derive(Debug, Clone)]
pub struct RoadConstraintModel {
    pub segment: RoadSegment,
    pub half_width: f64,
    pub gate_sigma: f64,
}

impl MeasurementModel for RoadConstraintModel {
    fn evaluate_parameters(&self, hypothesis: &GaussianHypothesis) -> ObservationParameters {
        let (px, py) = (StateVariable::Px.index(), StateVariable::Py.index());
        let position = Point2::new(hypothesis.mean[px], hypothesis.mean[py]);
        let offset = self.segment.lateral_offset(&position);
        let (sin_t, cos_t) = self.segment.theta.sin_cos();

        let mut jacobian = DMatrix::zeros(1, hypothesis.dim());
        jacobian[(0, px)] = -sin_t;
        jacobian[(0, py)] = cos_t;

        let variance = self.half_width * self.half_width;
        let s = (&jacobian * &hypothesis.covariance * jacobian.transpose())[(0, 0)] + variance;

        ObservationParameters {
            kind: ObservationKind::Nonlinear {
                jacobian,
                predicted: DVector::from_element(1, offset),
            },
            r: DMatrix::from_element(1, 1, variance),
            z: DVector::zeros(1),
            coherent: offset * offset <= self.gate_sigma * self.gate_sigma * s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::{update_in_place, HypothesisSet};
    use approx::assert_abs_diff_eq;

    fn east_road() -> RoadSegment {
        RoadSegment::new(0, Point2::new(0.0, 0.0), Point2::new(100.0, 0.0))
    }

    #[test]
    fn pulls_position_towards_the_centre_line_only() {
        let mut set = HypothesisSet::single(
            DVector::from_vec(vec![20.0, 3.0, 0.1]),
            DMatrix::identity(3, 3) * 9.0,
            1,
        );
        let model = RoadConstraintModel {
            segment: east_road(),
            half_width: 3.0,
            gate_sigma: 4.0,
        };
        update_in_place(&model, &mut set).unwrap();
        let h = set.get(0).unwrap();
        assert_abs_diff_eq!(h.mean[0], 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(h.mean[1], 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(h.covariance[(1, 1)], 4.5, epsilon = 1e-12);
    }

    #[test]
    fn off_road_hypotheses_are_not_corrected() {
        let model = RoadConstraintModel {
            segment: east_road(),
            half_width: 1.0,
            gate_sigma: 3.0,
        };
        let far = GaussianHypothesis::new(
            DVector::from_vec(vec![0.0, 40.0, 0.0]),
            DMatrix::identity(3, 3),
            1.0,
        );
        assert!(!model.evaluate_parameters(&far).coherent);
    }
}
