// navfuse_core/src/estimation/mod.rs

//! The generic Gaussian-sum estimation engine.
//!
//! A belief is a [`HypothesisSet`]: a mixture of weighted Gaussians. The
//! prediction and update equations are written once against the
//! [`PredictionModel`] / [`MeasurementModel`] strategy traits, each of which
//! has a linear and a nonlinear flavour.

use thiserror::Error;

mod gaussian;
mod prediction;
mod update;

pub use gaussian::{GaussianHypothesis, HypothesisSet};
pub use prediction::{predict, predict_in_place, PredictionModel, TransitionParameters};
pub use update::{
    observation_likelihood, update, update_in_place, MeasurementModel, ObservationKind,
    ObservationParameters, UpdateReport,
};

/// Errors raised by the filter primitives and the prediction/update equations.
///
/// `DegenerateWeights` is a runtime condition the caller must recover from.
/// The remaining variants are contract violations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("hypothesis weights sum to zero: every hypothesis rejected the observation")]
    DegenerateWeights,
    #[error("hypothesis set is empty")]
    EmptySet,
    #[error("input and output hypothesis sets differ in size ({input} vs {output})")]
    SizeMismatch { input: usize, output: usize },
    #[error("hypothesis set is full (capacity {capacity})")]
    CapacityExceeded { capacity: usize },
    #[error("dimension mismatch for {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("singular matrix: {context}")]
    SingularMatrix { context: &'static str },
}

/// Checks that a matrix has the expected shape, naming the offender on failure.
pub(crate) fn expect_shape(
    context: &'static str,
    matrix: &nalgebra::DMatrix<f64>,
    rows: usize,
    cols: usize,
) -> Result<(), FilterError> {
    if matrix.nrows() != rows {
        return Err(FilterError::DimensionMismatch {
            context,
            expected: rows,
            actual: matrix.nrows(),
        });
    }
    if matrix.ncols() != cols {
        return Err(FilterError::DimensionMismatch {
            context,
            expected: cols,
            actual: matrix.ncols(),
        });
    }
    Ok(())
}
