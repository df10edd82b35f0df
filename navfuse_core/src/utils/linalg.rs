// navfuse_core/src/utils/linalg.rs

//! Small linear-algebra helpers for the Gaussian-sum equations.

use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;

/// Relative size below which a diagonal entry of `R` counts as zero.
const RANK_TOLERANCE: f64 = 1e-12;

/// Inverts a square matrix through its QR decomposition.
/// Returns `None` for non-square or (numerically) singular input.
pub fn qr_inverse(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if !m.is_square() || m.is_empty() {
        return None;
    }
    let qr = m.clone().qr();
    let diagonal = qr.r().diagonal();
    let scale = diagonal.amax();
    if scale == 0.0 || diagonal.iter().any(|d| d.abs() <= scale * RANK_TOLERANCE) {
        return None;
    }
    qr.try_inverse()
}

/// Squared Mahalanobis distance `νᵗ·S⁻¹·ν` given an already inverted `S`.
pub fn mahalanobis_squared_with_inverse(innovation: &DVector<f64>, s_inv: &DMatrix<f64>) -> f64 {
    innovation.dot(&(s_inv * innovation))
}

/// Squared Mahalanobis distance of `innovation` under covariance `s`.
/// `None` if `s` cannot be inverted.
pub fn mahalanobis_squared(innovation: &DVector<f64>, s: &DMatrix<f64>) -> Option<f64> {
    qr_inverse(s).map(|s_inv| mahalanobis_squared_with_inverse(innovation, &s_inv))
}

/// Multivariate Gaussian density of a zero-mean innovation:
/// `exp(-½·νᵗ·S⁻¹·ν) / sqrt((2π)^k·|S|)`.
///
/// `s_inv` must be the inverse of `s`. Returns `None` when `|S|` is zero.
pub fn innovation_density(
    innovation: &DVector<f64>,
    s: &DMatrix<f64>,
    s_inv: &DMatrix<f64>,
) -> Option<f64> {
    let k = innovation.len() as i32;
    let det = s.determinant().abs();
    let normalizer = ((2.0 * PI).powi(k) * det).sqrt();
    if normalizer == 0.0 || !normalizer.is_finite() {
        return None;
    }
    let mahalanobis = mahalanobis_squared_with_inverse(innovation, s_inv);
    Some((-0.5 * mahalanobis).exp() / normalizer)
}

/// Forces exact symmetry on a covariance matrix.
/// Tiny numerical errors make `P - K·H·P` drift away from symmetric.
pub fn symmetrize(p: &DMatrix<f64>) -> DMatrix<f64> {
    (p + p.transpose()) * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn qr_inverse_matches_identity() {
        let m = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.5, 1.0, 3.0, 0.2, 0.5, 0.2, 2.0]);
        let inv = qr_inverse(&m).unwrap();
        assert_relative_eq!(&m * inv, DMatrix::identity(3, 3), epsilon = 1e-10);
    }

    #[test]
    fn qr_inverse_rejects_singular_and_rectangular() {
        let singular = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert!(qr_inverse(&singular).is_none());
        assert!(qr_inverse(&DMatrix::zeros(2, 3)).is_none());
    }

    #[test]
    fn density_of_standard_normal_at_origin() {
        let s = DMatrix::identity(2, 2);
        let density = innovation_density(&DVector::zeros(2), &s, &s).unwrap();
        assert_relative_eq!(density, 1.0 / (2.0 * PI), epsilon = 1e-12);
    }

    #[test]
    fn density_decreases_with_innovation() {
        let s = DMatrix::identity(1, 1) * 4.0;
        let s_inv = qr_inverse(&s).unwrap();
        let near = innovation_density(&DVector::from_element(1, 0.5), &s, &s_inv).unwrap();
        let far = innovation_density(&DVector::from_element(1, 3.0), &s, &s_inv).unwrap();
        assert!(near > far);
    }
}
