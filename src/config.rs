//! Run configuration.
//!
//! Every knob the engine consumes lives in [`ExperimentConfig`]. Values are
//! loaded from TOML, defaulted field by field, and checked once by
//! [`ExperimentConfig::validate`] before any search runs; configuration
//! mistakes are fatal at startup, never mid-run.
//!
//! ```toml
//! iterations = 10
//! beam_width = 1
//! search_step = 300
//! averaging = "recursive"
//! feature_names = ["head_match", "overlap"]
//!
//! [learning_rate]
//! kind = "descending"
//! start = 1.0
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use meld_core::FeatureSchema;

use crate::error::{Error, Result};
use crate::search::{BoundedTrainingSearch, GreedyThresholdSearch, MergeSearch};

// =============================================================================
// Enumerated settings
// =============================================================================

/// Per-iteration learning rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LearningRateSchedule {
    /// The same rate every iteration.
    Constant {
        /// Learning rate.
        rate: f64,
    },
    /// `start, start - start/T, ...` rounded to two decimals.
    Descending {
        /// First-iteration rate.
        start: f64,
    },
    /// Rates given explicitly, one per iteration.
    Explicit {
        /// Learning rates in iteration order.
        rates: Vec<f64>,
    },
}

impl Default for LearningRateSchedule {
    fn default() -> Self {
        LearningRateSchedule::Descending { start: 1.0 }
    }
}

impl LearningRateSchedule {
    /// Materialize the rates for `iterations` iterations.
    ///
    /// Explicit schedules are returned as given; a schedule shorter than
    /// `iterations` is rejected by [`ExperimentConfig::validate`].
    #[must_use]
    pub fn rates(&self, iterations: usize) -> Vec<f64> {
        match self {
            LearningRateSchedule::Constant { rate } => vec![*rate; iterations],
            LearningRateSchedule::Descending { start } => descending_rates(*start, iterations),
            LearningRateSchedule::Explicit { rates } => rates.clone(),
        }
    }
}

/// `[start, start - gap, ...]` with `gap = start / n`, each rounded to two decimals.
///
/// `descending_rates(1.0, 10)` is `[1.0, 0.9, ..., 0.1]`. Exact ties round
/// half to even, so `descending_rates(1.0, 8)` has `0.62` and `0.12`.
#[must_use]
pub fn descending_rates(start: f64, n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let gap = start / n as f64;
    (0..n)
        .map(|i| round_two_decimals(start - i as f64 * gap))
        .collect()
}

/// Round to two decimals, half to even on exact ties.
fn round_two_decimals(value: f64) -> f64 {
    // A binary value sits exactly on `x.xx5` only if it is an odd multiple
    // of 1/8; scaling those by 100 is exact.
    let eighths = value * 8.0;
    if eighths.fract() == 0.0 && eighths % 2.0 != 0.0 {
        let lower = (value * 100.0).floor();
        let even = if lower % 2.0 == 0.0 { lower } else { lower + 1.0 };
        return even / 100.0;
    }
    // Not a tie: formatting rounds the exact binary value to nearest.
    format!("{:.2}", value).parse().unwrap_or(value)
}

/// How the averaged weight is formed from the training history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AveragingScheme {
    /// `totalWeight / violations`.
    #[default]
    Simple,
    /// Learning-rate-weighted combination of per-iteration weights and deltas.
    Recursive,
}

/// When the `totalWeight += weight` snapshot is taken at a violation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accumulate {
    /// Snapshot the weight after the perceptron update.
    #[default]
    AfterUpdate,
    /// Snapshot the weight before the perceptron update.
    BeforeUpdate,
}

/// Which strategy decodes validation and test documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    /// Bounded beam search with the averaged weight held fixed.
    #[default]
    Bounded,
    /// Greedy best-first merging while the best score clears the threshold.
    Greedy,
}

impl std::str::FromStr for SearchKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bounded" | "beam" => Ok(SearchKind::Bounded),
            "greedy" => Ok(SearchKind::Greedy),
            other => Err(Error::config(format!("unknown search strategy '{}'", other))),
        }
    }
}

// =============================================================================
// ExperimentConfig
// =============================================================================

/// Configuration for one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Number of training iterations (epochs over the training documents).
    pub iterations: usize,
    /// Number of partitions kept between rounds of the bounded search.
    pub beam_width: usize,
    /// Maximum merge rounds per document per search.
    pub search_step: usize,
    /// Weight averaging scheme.
    pub averaging: AveragingScheme,
    /// Snapshot timing for `totalWeight`.
    pub accumulate: Accumulate,
    /// A merge is gold-consistent when its quality exceeds this.
    pub merge_quality_threshold: f64,
    /// Greedy decoding stops once the best score is at or below this.
    pub decode_threshold: f64,
    /// Strategy for the validation and testing phases.
    pub decoder: SearchKind,
    /// Ordered feature names; weight slot `i + 1` belongs to name `i`.
    pub feature_names: Vec<String>,
    /// Learning-rate schedule, one rate per iteration. Kept last so it
    /// renders as a trailing TOML table.
    pub learning_rate: LearningRateSchedule,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            beam_width: 1,
            search_step: 300,
            averaging: AveragingScheme::default(),
            accumulate: Accumulate::default(),
            merge_quality_threshold: 0.5,
            decode_threshold: 0.5,
            decoder: SearchKind::default(),
            feature_names: Vec::new(),
            learning_rate: LearningRateSchedule::default(),
        }
    }
}

impl ExperimentConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::config(format!("cannot serialize config: {}", e)))
    }

    /// Set the feature names.
    #[must_use]
    pub fn with_features<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.feature_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Check every field. Called before any search runs.
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(Error::config("iterations must be at least 1"));
        }
        if self.beam_width == 0 {
            return Err(Error::config("beam_width must be at least 1"));
        }
        if self.search_step == 0 {
            return Err(Error::config("search_step must be at least 1"));
        }
        for (name, value) in [
            ("merge_quality_threshold", self.merge_quality_threshold),
            ("decode_threshold", self.decode_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::config(format!("{} must be in [0, 1], got {}", name, value)));
            }
        }
        self.schema()?;
        self.learning_rates()?;
        Ok(())
    }

    /// The feature schema named by `feature_names`.
    pub fn schema(&self) -> Result<FeatureSchema> {
        FeatureSchema::new(self.feature_names.iter().cloned())
            .map_err(|e| Error::config(e.to_string()))
    }

    /// The checked learning-rate sequence, exactly `iterations` long.
    pub fn learning_rates(&self) -> Result<Vec<f64>> {
        let rates = self.learning_rate.rates(self.iterations);
        if rates.len() < self.iterations {
            return Err(Error::config(format!(
                "learning-rate schedule has {} rates for {} iterations",
                rates.len(),
                self.iterations
            )));
        }
        for (i, &rate) in rates.iter().enumerate() {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(Error::config(format!(
                    "learning rate {} at iteration {} must be positive and finite",
                    rate, i
                )));
            }
            if self.averaging == AveragingScheme::Recursive && rate > 1.0 {
                return Err(Error::config(format!(
                    "recursive averaging needs rates in (0, 1], got {} at iteration {}",
                    rate, i
                )));
            }
        }
        Ok(rates.into_iter().take(self.iterations).collect())
    }

    /// The bounded search used for training.
    pub fn training_search(&self) -> Result<BoundedTrainingSearch> {
        Ok(BoundedTrainingSearch::new(self.schema()?)
            .with_beam_width(self.beam_width)
            .with_search_step(self.search_step)
            .with_quality_threshold(self.merge_quality_threshold)
            .with_accumulate(self.accumulate))
    }

    /// The strategy used for validation and testing.
    pub fn decoding_search(&self) -> Result<MergeSearch> {
        Ok(match self.decoder {
            SearchKind::Bounded => MergeSearch::Bounded(self.training_search()?),
            SearchKind::Greedy => MergeSearch::Greedy(
                GreedyThresholdSearch::new(self.schema()?).with_threshold(self.decode_threshold),
            ),
        })
    }
}
