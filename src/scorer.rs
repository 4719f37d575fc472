//! Linear scoring of merge candidates.
//!
//! `score(w, f) = w[0] + Σ_i w[i+1] * f[name_i]` over the schema's fixed
//! name order. Features missing from `f` contribute nothing; NaN or infinite
//! inputs are errors, never silently zeroed.

use meld_core::{FeatureSchema, FeatureVector, WeightVector};

use crate::error::{Error, Result};

/// Scores feature vectors against a weight laid out by a [`FeatureSchema`].
#[derive(Debug, Clone, Copy)]
pub struct Scorer<'a> {
    schema: &'a FeatureSchema,
}

impl<'a> Scorer<'a> {
    /// Create a scorer over `schema`.
    #[must_use]
    pub fn new(schema: &'a FeatureSchema) -> Self {
        Self { schema }
    }

    /// The schema this scorer reads names from.
    #[must_use]
    pub fn schema(&self) -> &'a FeatureSchema {
        self.schema
    }

    /// Linear score of `features` under `weight`.
    pub fn score(&self, weight: &WeightVector, features: &FeatureVector) -> Result<f64> {
        if weight.dim() != self.schema.dim() {
            return Err(meld_core::Error::dimension_mismatch(self.schema.dim(), weight.dim()).into());
        }
        if let Some((name, value)) = features.first_non_finite() {
            return Err(Error::numeric_anomaly(format!("feature '{}'", name), value));
        }
        let slots = weight.as_slice();
        let mut sum = slots[0];
        for (i, name) in self.schema.names().iter().enumerate() {
            sum += slots[i + 1] * features.get(name);
        }
        if !sum.is_finite() {
            return Err(Error::numeric_anomaly("score", sum));
        }
        Ok(sum)
    }

    /// Dense `[1, f_1, ..., f_F]` form of `features`, checked for finiteness.
    ///
    /// This is the vector perceptron updates add and subtract.
    pub fn phi(&self, features: &FeatureVector) -> Result<WeightVector> {
        if let Some((name, value)) = features.first_non_finite() {
            return Err(Error::numeric_anomaly(format!("feature '{}'", name), value));
        }
        Ok(self.schema.project(features))
    }
}
