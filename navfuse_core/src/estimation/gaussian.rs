// navfuse_core/src/estimation/gaussian.rs

use crate::estimation::FilterError;
use crate::types::{Covariance, State};
use nalgebra::DMatrix;

/// One weighted Gaussian belief over the vehicle state.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianHypothesis {
    /// The mean state vector `X`.
    pub mean: State,
    /// The covariance matrix `P`.
    pub covariance: Covariance,
    /// Relative belief mass, never negative.
    pub weight: f64,
}

impl GaussianHypothesis {
    pub fn new(mean: State, covariance: Covariance, weight: f64) -> Self {
        debug_assert_eq!(mean.len(), covariance.nrows());
        Self {
            mean,
            covariance,
            weight: weight.max(0.0),
        }
    }

    /// Returns the dimension of the state vector.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }
}

/// An ordered, fixed-capacity Gaussian sum.
///
/// Hypotheses are created by [`HypothesisSet::push`] after the set has been
/// allocated, mutated in place by the prediction/update equations and dropped
/// with the set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HypothesisSet {
    hypotheses: Vec<GaussianHypothesis>,
    capacity: usize,
}

impl HypothesisSet {
    /// Reserves room for `n` hypotheses without creating any of them.
    pub fn allocate(n: usize) -> Self {
        Self {
            hypotheses: Vec::with_capacity(n),
            capacity: n,
        }
    }

    /// Builds a set holding exactly one hypothesis with weight 1.
    pub fn single(mean: State, covariance: Covariance, capacity: usize) -> Self {
        let mut set = Self::allocate(capacity.max(1));
        set.hypotheses
            .push(GaussianHypothesis::new(mean, covariance, 1.0));
        set
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GaussianHypothesis> {
        self.hypotheses.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, GaussianHypothesis> {
        self.hypotheses.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&GaussianHypothesis> {
        self.hypotheses.get(index)
    }

    pub fn as_slice(&self) -> &[GaussianHypothesis] {
        &self.hypotheses
    }

    /// Appends a hypothesis. Fails once the allocated capacity is reached.
    pub fn push(&mut self, hypothesis: GaussianHypothesis) -> Result<(), FilterError> {
        if self.hypotheses.len() >= self.capacity {
            return Err(FilterError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.hypotheses.push(hypothesis);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.hypotheses.clear();
    }

    pub fn total_weight(&self) -> f64 {
        self.hypotheses.iter().map(|h| h.weight).sum()
    }

    /// Divides every weight by the sum of all weights.
    ///
    /// Fails with [`FilterError::DegenerateWeights`] when the sum is exactly
    /// zero, in which case the set is left untouched.
    pub fn normalize(&mut self) -> Result<(), FilterError> {
        let sum = self.total_weight();
        if sum == 0.0 {
            return Err(FilterError::DegenerateWeights);
        }
        for hypothesis in &mut self.hypotheses {
            hypothesis.weight /= sum;
        }
        Ok(())
    }

    /// The point estimate `Σ wᵢ·Xᵢ`.
    pub fn estimate(&self) -> Result<State, FilterError> {
        let first = self.hypotheses.first().ok_or(FilterError::EmptySet)?;
        let mut estimate = State::zeros(first.dim());
        for hypothesis in &self.hypotheses {
            estimate += &hypothesis.mean * hypothesis.weight;
        }
        Ok(estimate)
    }

    /// Covariance of the whole mixture, `Σ wᵢ·(Pᵢ + (Xᵢ-X̄)(Xᵢ-X̄)ᵗ)`.
    /// Meaningful on a normalized set.
    pub fn mixture_covariance(&self) -> Result<Covariance, FilterError> {
        let mean = self.estimate()?;
        let n = mean.len();
        let mut covariance = DMatrix::zeros(n, n);
        for hypothesis in &self.hypotheses {
            let spread = &hypothesis.mean - &mean;
            covariance += (&hypothesis.covariance + &spread * spread.transpose()) * hypothesis.weight;
        }
        Ok(covariance)
    }

    /// The hypothesis carrying the largest weight.
    pub fn most_likely(&self) -> Option<&GaussianHypothesis> {
        self.hypotheses
            .iter()
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
    }

    /// Drops hypotheses whose weight is below `min_weight`. The heaviest one
    /// always survives so the set never becomes empty through pruning.
    /// Returns the number of dropped hypotheses.
    pub fn prune(&mut self, min_weight: f64) -> usize {
        let Some(best) = self
            .hypotheses
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.weight.total_cmp(&b.weight))
            .map(|(i, _)| i)
        else {
            return 0;
        };
        let before = self.hypotheses.len();
        let mut index = 0;
        self.hypotheses.retain(|h| {
            let keep = index == best || h.weight >= min_weight;
            index += 1;
            keep
        });
        before - self.hypotheses.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::DVector;

    fn hypothesis(x: f64, weight: f64) -> GaussianHypothesis {
        GaussianHypothesis::new(
            DVector::from_vec(vec![x, 2.0 * x]),
            DMatrix::identity(2, 2),
            weight,
        )
    }

    fn set_of(weights: &[f64]) -> HypothesisSet {
        let mut set = HypothesisSet::allocate(weights.len());
        for (i, w) in weights.iter().enumerate() {
            set.push(hypothesis(i as f64, *w)).unwrap();
        }
        set
    }

    #[test]
    fn allocate_reserves_without_creating() {
        let set = HypothesisSet::allocate(4);
        assert!(set.is_empty());
        assert_eq!(set.capacity(), 4);
    }

    #[test]
    fn push_beyond_capacity_fails() {
        let mut set = set_of(&[1.0, 1.0]);
        let err = set.push(hypothesis(9.0, 1.0)).unwrap_err();
        assert_eq!(err, FilterError::CapacityExceeded { capacity: 2 });
    }

    #[test]
    fn normalize_sums_to_one() {
        for weights in [&[0.2, 0.3, 5.0][..], &[1e-300, 0.0, 3e-300], &[7.0]] {
            let mut set = set_of(weights);
            set.normalize().unwrap();
            assert_abs_diff_eq!(set.total_weight(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn normalize_all_zero_is_degenerate_and_untouched() {
        let mut set = set_of(&[0.0, 0.0, 0.0]);
        let before = set.clone();
        assert_eq!(set.normalize(), Err(FilterError::DegenerateWeights));
        assert_eq!(set, before);
    }

    #[test]
    fn estimate_of_empty_set_fails() {
        assert_eq!(
            HypothesisSet::allocate(3).estimate(),
            Err(FilterError::EmptySet)
        );
    }

    #[test]
    fn estimate_is_weighted_mean() {
        let mut set = set_of(&[1.0, 3.0]);
        set.normalize().unwrap();
        let estimate = set.estimate().unwrap();
        assert_abs_diff_eq!(estimate[0], 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(estimate[1], 1.5, epsilon = 1e-12);
    }

    #[test]
    fn mixture_covariance_includes_spread_of_means() {
        let mut set = set_of(&[1.0, 1.0]);
        set.normalize().unwrap();
        let cov = set.mixture_covariance().unwrap();
        // Component variance 1 plus the spread term 0.25 on the first axis.
        assert_abs_diff_eq!(cov[(0, 0)], 1.25, epsilon = 1e-12);
    }

    #[test]
    fn prune_keeps_the_heaviest() {
        let mut set = set_of(&[0.001, 0.002, 0.0005]);
        let dropped = set.prune(0.01);
        assert_eq!(dropped, 2);
        assert_eq!(set.len(), 1);
        assert_abs_diff_eq!(set.get(0).unwrap().weight, 0.002);
    }
}
