// navfuse_core/src/estimation/prediction.rs

use super::{expect_shape, FilterError, GaussianHypothesis, HypothesisSet};
use crate::types::{Control, Covariance, State};
use nalgebra::DMatrix;
use std::fmt::Debug;

/// The transition parameters of one hypothesis for one prediction step.
#[derive(Debug, Clone)]
pub enum TransitionParameters {
    /// `X' = A·X + B·U`, `P' = A·P·Aᵗ + B·Q·Bᵗ`.
    Linear {
        a: DMatrix<f64>,
        b: DMatrix<f64>,
        u: Control,
        q: Covariance,
    },
    /// `X' = f(X)`, `P' = F·P·Fᵗ + G·Q·Gᵗ` where `F` is the state Jacobian and
    /// `G` maps the process noise into the state.
    Nonlinear {
        f: State,
        jacobian: DMatrix<f64>,
        g: DMatrix<f64>,
        q: Covariance,
    },
}

/// A prediction strategy. Implementors carry whatever the step needs
/// (time step, control inputs) and evaluate the transition per hypothesis,
/// since the linearization point differs for each one.
pub trait PredictionModel: Debug + Send + Sync {
    fn evaluate_parameters(&self, hypothesis: &GaussianHypothesis) -> TransitionParameters;
}

/// Propagates every hypothesis of `input` into the same slot of `output`.
///
/// Hypotheses are processed in index order and each weight is carried over
/// unchanged, so the total weight of the set is preserved.
pub fn predict<M: PredictionModel + ?Sized>(
    model: &M,
    input: &HypothesisSet,
    output: &mut HypothesisSet,
) -> Result<(), FilterError> {
    if input.len() != output.len() {
        return Err(FilterError::SizeMismatch {
            input: input.len(),
            output: output.len(),
        });
    }

    for (prior, posterior) in input.iter().zip(output.iter_mut()) {
        let (mean, covariance) = propagate(model, prior)?;
        posterior.mean = mean;
        posterior.covariance = covariance;
        posterior.weight = prior.weight;
    }
    Ok(())
}

/// Predicts a set onto itself.
pub fn predict_in_place<M: PredictionModel + ?Sized>(
    model: &M,
    set: &mut HypothesisSet,
) -> Result<(), FilterError> {
    for hypothesis in set.iter_mut() {
        let (mean, covariance) = propagate(model, hypothesis)?;
        hypothesis.mean = mean;
        hypothesis.covariance = covariance;
    }
    Ok(())
}

fn propagate<M: PredictionModel + ?Sized>(
    model: &M,
    hypothesis: &GaussianHypothesis,
) -> Result<(State, Covariance), FilterError> {
    let n = hypothesis.dim();
    match model.evaluate_parameters(hypothesis) {
        TransitionParameters::Linear { a, b, u, q } => {
            expect_shape("transition matrix A", &a, n, n)?;
            expect_shape("control matrix B", &b, n, u.len())?;
            expect_shape("process noise Q", &q, b.ncols(), b.ncols())?;
            let mean = &a * &hypothesis.mean + &b * &u;
            let covariance = &a * &hypothesis.covariance * a.transpose() + &b * &q * b.transpose();
            Ok((mean, covariance))
        }
        TransitionParameters::Nonlinear { f, jacobian, g, q } => {
            if f.len() != n {
                return Err(FilterError::DimensionMismatch {
                    context: "predicted state f(X)",
                    expected: n,
                    actual: f.len(),
                });
            }
            expect_shape("state Jacobian F", &jacobian, n, n)?;
            expect_shape("noise Jacobian G", &g, n, q.nrows())?;
            expect_shape("process noise Q", &q, g.ncols(), g.ncols())?;
            let covariance =
                &jacobian * &hypothesis.covariance * jacobian.transpose() + &g * &q * g.transpose();
            Ok((f, covariance))
        }
    }
}
