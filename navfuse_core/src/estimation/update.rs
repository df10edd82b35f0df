// navfuse_core/src/estimation/update.rs

use super::{expect_shape, FilterError, GaussianHypothesis, HypothesisSet};
use crate::types::{Covariance, State};
use crate::utils::linalg::{innovation_density, qr_inverse, symmetrize};
use nalgebra::{DMatrix, DVector};
use std::fmt::Debug;

/// How the measurement relates to the state for one hypothesis.
#[derive(Debug, Clone)]
pub enum ObservationKind {
    /// `Z ≈ H·X`.
    Linear { h: DMatrix<f64> },
    /// `Z ≈ h(X)`, linearized by `jacobian` around the hypothesis mean.
    ///
    /// `predicted` is `h(X)`. For angular components it should be expressed
    /// on the branch closest to `Z` so that `Z - h(X)` is the short residual.
    Nonlinear {
        jacobian: DMatrix<f64>,
        predicted: DVector<f64>,
    },
}

/// Everything the update equations need for one hypothesis.
#[derive(Debug, Clone)]
pub struct ObservationParameters {
    pub kind: ObservationKind,
    /// Measurement noise covariance `R`.
    pub r: Covariance,
    /// The measurement `Z`.
    pub z: DVector<f64>,
    /// Whether the measurement is consistent enough with this hypothesis to
    /// correct it. Incoherent hypotheses are only re-weighted.
    pub coherent: bool,
}

impl ObservationParameters {
    /// The observation matrix (`H` or its Jacobian).
    pub fn observation_matrix(&self) -> &DMatrix<f64> {
        match &self.kind {
            ObservationKind::Linear { h } => h,
            ObservationKind::Nonlinear { jacobian, .. } => jacobian,
        }
    }

    /// The residual `Z - H·X` (linear) or `Z - h(X)` (nonlinear).
    pub fn innovation(&self, mean: &State) -> DVector<f64> {
        match &self.kind {
            ObservationKind::Linear { h } => &self.z - h * mean,
            ObservationKind::Nonlinear { predicted, .. } => &self.z - predicted,
        }
    }
}

/// A measurement strategy, evaluated once per hypothesis.
pub trait MeasurementModel: Debug + Send + Sync {
    fn evaluate_parameters(&self, hypothesis: &GaussianHypothesis) -> ObservationParameters;
}

/// Summary of one update pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    /// How many hypotheses were corrected.
    pub coherent: usize,
    /// The `ZPDF` factor of every hypothesis, in set order.
    pub likelihoods: Vec<f64>,
}

impl UpdateReport {
    pub fn max_likelihood(&self) -> f64 {
        self.likelihoods.iter().copied().fold(0.0, f64::max)
    }
}

// --- Core equations ---

struct Correction {
    mean: State,
    covariance: Covariance,
    likelihood: f64,
}

fn correct(
    params: &ObservationParameters,
    hypothesis: &GaussianHypothesis,
) -> Result<Correction, FilterError> {
    let n = hypothesis.dim();
    let m = params.z.len();
    let h = params.observation_matrix();
    expect_shape("observation matrix H", h, m, n)?;
    expect_shape("measurement noise R", &params.r, m, m)?;
    if let ObservationKind::Nonlinear { predicted, .. } = &params.kind {
        if predicted.len() != m {
            return Err(FilterError::DimensionMismatch {
                context: "predicted measurement h(X)",
                expected: m,
                actual: predicted.len(),
            });
        }
    }

    let p = &hypothesis.covariance;
    let innovation = params.innovation(&hypothesis.mean);
    let s = h * p * h.transpose() + &params.r;
    let s_inv = qr_inverse(&s).ok_or(FilterError::SingularMatrix {
        context: "innovation covariance S",
    })?;
    let likelihood = innovation_density(&innovation, &s, &s_inv).ok_or(
        FilterError::SingularMatrix {
            context: "innovation covariance S",
        },
    )?;

    if !params.coherent {
        return Ok(Correction {
            mean: hypothesis.mean.clone(),
            covariance: p.clone(),
            likelihood,
        });
    }

    let gain = p * h.transpose() * &s_inv;
    let mean = &hypothesis.mean + &gain * &innovation;
    let covariance = symmetrize(&(p - &gain * h * p));
    Ok(Correction {
        mean,
        covariance,
        likelihood,
    })
}

/// The `ZPDF` factor of one hypothesis, without touching it.
pub fn observation_likelihood<M: MeasurementModel + ?Sized>(
    model: &M,
    hypothesis: &GaussianHypothesis,
) -> Result<f64, FilterError> {
    let params = model.evaluate_parameters(hypothesis);
    let n = hypothesis.dim();
    let m = params.z.len();
    expect_shape("observation matrix H", params.observation_matrix(), m, n)?;
    expect_shape("measurement noise R", &params.r, m, m)?;
    let h = params.observation_matrix();
    let s = h * &hypothesis.covariance * h.transpose() + &params.r;
    let s_inv = qr_inverse(&s).ok_or(FilterError::SingularMatrix {
        context: "innovation covariance S",
    })?;
    innovation_density(&params.innovation(&hypothesis.mean), &s, &s_inv).ok_or(
        FilterError::SingularMatrix {
            context: "innovation covariance S",
        },
    )
}

/// Applies one measurement to every hypothesis of `input`, writing the
/// posterior into the same slot of `output`.
///
/// Each weight becomes `ZPDF × prior_weight`. The set is not renormalized;
/// that is the caller's decision.
pub fn update<M: MeasurementModel + ?Sized>(
    model: &M,
    input: &HypothesisSet,
    output: &mut HypothesisSet,
) -> Result<UpdateReport, FilterError> {
    if input.len() != output.len() {
        return Err(FilterError::SizeMismatch {
            input: input.len(),
            output: output.len(),
        });
    }

    let mut report = UpdateReport {
        coherent: 0,
        likelihoods: Vec::with_capacity(input.len()),
    };
    for (prior, posterior) in input.iter().zip(output.iter_mut()) {
        let params = model.evaluate_parameters(prior);
        let correction = correct(&params, prior)?;
        if params.coherent {
            report.coherent += 1;
        }
        report.likelihoods.push(correction.likelihood);
        posterior.mean = correction.mean;
        posterior.covariance = correction.covariance;
        posterior.weight = correction.likelihood * prior.weight;
    }
    Ok(report)
}

/// Updates a set onto itself.
pub fn update_in_place<M: MeasurementModel + ?Sized>(
    model: &M,
    set: &mut HypothesisSet,
) -> Result<UpdateReport, FilterError> {
    let mut report = UpdateReport {
        coherent: 0,
        likelihoods: Vec::with_capacity(set.len()),
    };
    for hypothesis in set.iter_mut() {
        let params = model.evaluate_parameters(hypothesis);
        let correction = correct(&params, hypothesis)?;
        if params.coherent {
            report.coherent += 1;
        }
        report.likelihoods.push(correction.likelihood);
        hypothesis.mean = correction.mean;
        hypothesis.covariance = correction.covariance;
        hypothesis.weight *= correction.likelihood;
    }
    Ok(report)
}
