//! Online weight learning.
//!
//! [`TrainerState`] is the value threaded through one iteration's training
//! documents: each search takes the state by reference and hands back an
//! updated copy. [`WeightTrainer`] owns the run-level history (per-iteration
//! weights, rates and implied deltas) and turns it into the averaged weight
//! that validation and testing decode with.
//!
//! # Iteration protocol
//!
//! ```text
//! (state, η_i) = trainer.begin_iteration(η_i)   // seeded from w_i
//! for doc in train { state = search.run_training(doc, &state, η_i)?.state }
//! avg_i = trainer.finish_iteration(state)?      // records w_{i+1}, δ_i
//! ```

mod averaging;

pub use averaging::{implied_delta, recursive_average, simple_average};

use serde::{Deserialize, Serialize};

use meld_core::WeightVector;

use crate::config::{Accumulate, AveragingScheme};
use crate::error::{Error, Result};

// =============================================================================
// TrainerState
// =============================================================================

/// Live weight plus the accumulators averaging reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerState {
    /// Instantaneous weight.
    pub weight: WeightVector,
    /// Sum of weight snapshots, one per violation.
    pub total_weight: WeightVector,
    /// Violations so far in the run.
    pub violations: usize,
}

impl TrainerState {
    /// Zero weight and accumulators of dimension `dim`.
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            weight: WeightVector::zeros(dim),
            total_weight: WeightVector::zeros(dim),
            violations: 0,
        }
    }

    /// Perceptron update for one violation.
    ///
    /// `direction` is `φ(oracle) − φ(chosen)`. The snapshot added to
    /// `total_weight` is the weight before or after the update, per
    /// `accumulate`.
    pub fn apply_violation(
        &mut self,
        direction: &WeightVector,
        learning_rate: f64,
        accumulate: Accumulate,
    ) -> Result<()> {
        match accumulate {
            Accumulate::BeforeUpdate => {
                self.total_weight.add_scaled(&self.weight, 1.0)?;
                self.weight.add_scaled(direction, learning_rate)?;
            }
            Accumulate::AfterUpdate => {
                self.weight.add_scaled(direction, learning_rate)?;
                self.total_weight.add_scaled(&self.weight, 1.0)?;
            }
        }
        self.violations += 1;
        if let Some(value) = self.weight.first_non_finite() {
            return Err(Error::numeric_anomaly("weight after update", value));
        }
        Ok(())
    }
}

// =============================================================================
// WeightTrainer
// =============================================================================

/// Run-level weight history and averaging.
#[derive(Debug, Clone)]
pub struct WeightTrainer {
    scheme: AveragingScheme,
    /// `w_0..w_i`; the last entry is the weight the next iteration starts from.
    weights: Vec<WeightVector>,
    deltas: Vec<WeightVector>,
    rates: Vec<f64>,
    total_weight: WeightVector,
    violations: usize,
    pending_rate: Option<f64>,
}

impl WeightTrainer {
    /// A fresh run: `w_0` is the zero vector of dimension `dim`.
    #[must_use]
    pub fn new(dim: usize, scheme: AveragingScheme) -> Self {
        Self {
            scheme,
            weights: vec![WeightVector::zeros(dim)],
            deltas: Vec::new(),
            rates: Vec::new(),
            total_weight: WeightVector::zeros(dim),
            violations: 0,
            pending_rate: None,
        }
    }

    /// The averaging scheme in use.
    #[must_use]
    pub fn scheme(&self) -> AveragingScheme {
        self.scheme
    }

    /// The state an iteration with rate `learning_rate` starts from.
    pub fn begin_iteration(&mut self, learning_rate: f64) -> Result<TrainerState> {
        if !learning_rate.is_finite() || learning_rate <= 0.0 {
            return Err(Error::config(format!(
                "learning rate must be positive and finite, got {}",
                learning_rate
            )));
        }
        self.pending_rate = Some(learning_rate);
        Ok(TrainerState {
            weight: self.weight().clone(),
            total_weight: self.total_weight.clone(),
            violations: self.violations,
        })
    }

    /// Record the iteration's final state and return the averaged weight.
    pub fn finish_iteration(&mut self, state: TrainerState) -> Result<WeightVector> {
        let rate = self
            .pending_rate
            .take()
            .ok_or_else(|| Error::config("finish_iteration called without begin_iteration"))?;
        let dim = self.weight().dim();
        for v in [&state.weight, &state.total_weight] {
            if v.dim() != dim {
                return Err(meld_core::Error::dimension_mismatch(dim, v.dim()).into());
            }
        }
        if state.violations < self.violations {
            return Err(Error::config(format!(
                "violation count went backwards: {} after {}",
                state.violations, self.violations
            )));
        }

        let delta = implied_delta(&state.weight, self.weight(), rate)?;
        self.deltas.push(delta);
        self.rates.push(rate);
        self.total_weight = state.total_weight;
        self.violations = state.violations;

        let average = match self.scheme {
            AveragingScheme::Simple => simple_average(&self.total_weight, self.violations),
            AveragingScheme::Recursive => {
                recursive_average(&self.weights, &self.deltas, &self.rates, self.violations)?
            }
        };
        self.weights.push(state.weight);

        if let Some(value) = average.first_non_finite() {
            return Err(Error::numeric_anomaly("averaged weight", value));
        }
        log::debug!(
            "iteration {} ({:?}): {} violations so far, average [{}]",
            self.rates.len() - 1,
            self.scheme,
            self.violations,
            average
        );
        Ok(average)
    }

    /// The latest instantaneous weight.
    #[must_use]
    pub fn weight(&self) -> &WeightVector {
        // `weights` always holds `w_0`.
        &self.weights[self.weights.len() - 1]
    }

    /// Running sum of violation snapshots.
    #[must_use]
    pub fn total_weight(&self) -> &WeightVector {
        &self.total_weight
    }

    /// Violations over the whole run.
    #[must_use]
    pub fn violations(&self) -> usize {
        self.violations
    }

    /// Completed iterations.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.rates.len()
    }

    /// Weights `w_0..w_n`, one more than completed iterations.
    #[must_use]
    pub fn weight_history(&self) -> &[WeightVector] {
        &self.weights
    }

    /// Implied deltas, one per completed iteration.
    #[must_use]
    pub fn deltas(&self) -> &[WeightVector] {
        &self.deltas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wv(v: &[f64]) -> WeightVector {
        WeightVector::from(v.to_vec())
    }

    #[test]
    fn violation_update_scales_direction() {
        let mut state = TrainerState::new(2);
        state
            .apply_violation(&wv(&[1.0, 0.0]), 0.5, Accumulate::AfterUpdate)
            .unwrap();
        assert_eq!(state.weight.as_slice(), &[0.5, 0.0]);
        assert_eq!(state.total_weight.as_slice(), &[0.5, 0.0]);
        assert_eq!(state.violations, 1);
    }

    #[test]
    fn before_update_snapshots_old_weight() {
        let mut state = TrainerState::new(2);
        state
            .apply_violation(&wv(&[1.0, 1.0]), 1.0, Accumulate::BeforeUpdate)
            .unwrap();
        state
            .apply_violation(&wv(&[1.0, 0.0]), 1.0, Accumulate::BeforeUpdate)
            .unwrap();
        assert_eq!(state.weight.as_slice(), &[2.0, 1.0]);
        assert_eq!(state.total_weight.as_slice(), &[1.0, 1.0]);
    }

    #[test]
    fn infinite_update_is_an_anomaly() {
        let mut state = TrainerState::new(1);
        let err = state
            .apply_violation(&wv(&[f64::INFINITY]), 1.0, Accumulate::AfterUpdate)
            .unwrap_err();
        assert!(matches!(err, Error::NumericAnomaly { .. }));
    }

    #[test]
    fn overflowing_average_reports_infinity() {
        let mut trainer = WeightTrainer::new(1, AveragingScheme::Recursive);
        let mut state = trainer.begin_iteration(0.5).unwrap();
        state.weight = wv(&[f64::MAX]);
        state.violations = 1;
        // δ = MAX / 0.5 overflows.
        let err = trainer.finish_iteration(state).unwrap_err();
        match err {
            Error::NumericAnomaly { value, .. } => assert_eq!(value, f64::INFINITY),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn simple_trainer_averages_snapshots() {
        let mut trainer = WeightTrainer::new(2, AveragingScheme::Simple);
        let mut state = trainer.begin_iteration(1.0).unwrap();
        state
            .apply_violation(&wv(&[1.0, 0.0]), 1.0, Accumulate::AfterUpdate)
            .unwrap();
        state
            .apply_violation(&wv(&[0.0, 2.0]), 1.0, Accumulate::AfterUpdate)
            .unwrap();
        let avg = trainer.finish_iteration(state).unwrap();
        // snapshots [1, 0] and [1, 2]
        assert_eq!(avg.as_slice(), &[1.0, 1.0]);
        assert_eq!(trainer.weight().as_slice(), &[1.0, 2.0]);
        assert_eq!(trainer.weight_history().len(), 2);
    }

    #[test]
    fn state_carries_across_iterations() {
        let mut trainer = WeightTrainer::new(1, AveragingScheme::Simple);
        let mut state = trainer.begin_iteration(1.0).unwrap();
        state
            .apply_violation(&wv(&[2.0]), 1.0, Accumulate::AfterUpdate)
            .unwrap();
        trainer.finish_iteration(state).unwrap();

        let next = trainer.begin_iteration(0.5).unwrap();
        assert_eq!(next.weight.as_slice(), &[2.0]);
        assert_eq!(next.violations, 1);
    }

    #[test]
    fn recursive_trainer_without_violations_stays_zero() {
        let mut trainer = WeightTrainer::new(3, AveragingScheme::Recursive);
        for rate in [1.0, 0.5] {
            let state = trainer.begin_iteration(rate).unwrap();
            let avg = trainer.finish_iteration(state).unwrap();
            assert!(avg.is_finite());
            assert!(avg.is_zero());
        }
        assert_eq!(trainer.iterations(), 2);
        assert_eq!(trainer.deltas().len(), 2);
    }

    #[test]
    fn recursive_trainer_uses_history_before_push() {
        let mut trainer = WeightTrainer::new(1, AveragingScheme::Recursive);
        let mut state = trainer.begin_iteration(1.0).unwrap();
        state
            .apply_violation(&wv(&[2.0]), 1.0, Accumulate::AfterUpdate)
            .unwrap();
        let avg = trainer.finish_iteration(state).unwrap();
        // w_0 = 0, η_0 = 1, δ_0 = 2, V = 1: former 0, latter 2.
        assert!((avg[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn finish_requires_begin() {
        let mut trainer = WeightTrainer::new(1, AveragingScheme::Simple);
        assert!(trainer.finish_iteration(TrainerState::new(1)).is_err());
    }
}
