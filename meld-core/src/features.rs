//! Named feature vectors, the global feature schema, and the extractor seam.
//!
//! Feature extraction itself is a collaborator: the engine only needs
//! something implementing [`FeatureExtractor`] that maps a cluster pair to a
//! [`FeatureVector`]. [`AverageLinkage`] is the one extractor shipped here; it
//! aggregates precomputed mention-pair features stored in the [`Document`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::cluster::Cluster;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::weight::WeightVector;

// =============================================================================
// FeatureVector
// =============================================================================

/// Sparse mapping from feature name to value for one cluster pair.
///
/// Absent features read as `0.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(BTreeMap<String, f64>);

impl FeatureVector {
    /// Create an empty vector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a feature value, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    /// Value of a feature, `0.0` if absent.
    #[must_use]
    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    /// Add `scale * other` into this vector.
    pub fn add_scaled(&mut self, other: &FeatureVector, scale: f64) {
        for (name, value) in &other.0 {
            *self.0.entry(name.clone()).or_insert(0.0) += scale * value;
        }
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of stored features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no features are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First NaN or infinite value, if any.
    #[must_use]
    pub fn first_non_finite(&self) -> Option<(&str, f64)> {
        self.iter().find(|(_, v)| !v.is_finite())
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

// =============================================================================
// FeatureSchema
// =============================================================================

/// The fixed, ordered list of feature names a weight vector is laid out over.
///
/// Weight index 0 is the bias; index `i + 1` belongs to `names()[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// Create a schema. Names must be non-empty and unique.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Result<Self> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(Error::invalid_input("feature schema has no features"));
        }
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(Error::invalid_input(format!(
                    "duplicate feature name '{}'",
                    name
                )));
            }
        }
        Ok(Self { names })
    }

    /// Feature names in weight order (bias excluded).
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Weight dimension: one slot per feature plus the bias.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.names.len() + 1
    }

    /// Dense representation `[1.0, f_1, ..., f_F]` of a feature vector.
    ///
    /// Names outside the schema are ignored.
    #[must_use]
    pub fn project(&self, features: &FeatureVector) -> WeightVector {
        std::iter::once(1.0)
            .chain(self.names.iter().map(|name| features.get(name)))
            .collect()
    }

    /// A zero weight vector of this schema's dimension.
    #[must_use]
    pub fn zero_weight(&self) -> WeightVector {
        WeightVector::zeros(self.dim())
    }
}

impl TryFrom<Vec<String>> for FeatureSchema {
    type Error = Error;

    fn try_from(names: Vec<String>) -> Result<Self> {
        Self::new(names)
    }
}

impl From<FeatureSchema> for Vec<String> {
    fn from(schema: FeatureSchema) -> Self {
        schema.names
    }
}

// =============================================================================
// Extractors
// =============================================================================

/// Computes the feature vector of a candidate cluster pair.
///
/// Implementations must be pure: the same document and clusters always give
/// the same vector.
pub trait FeatureExtractor {
    /// Features for merging `a` and `b`.
    fn features(&self, document: &Document, a: &Cluster, b: &Cluster) -> FeatureVector;
}

impl<F> FeatureExtractor for F
where
    F: Fn(&Document, &Cluster, &Cluster) -> FeatureVector,
{
    fn features(&self, document: &Document, a: &Cluster, b: &Cluster) -> FeatureVector {
        self(document, a, b)
    }
}

/// Averages mention-pair features over every cross-cluster mention pair.
///
/// A mention pair with no stored features contributes zeros, so the result
/// for clusters of size `m` and `n` is `sum / (m * n)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AverageLinkage;

impl FeatureExtractor for AverageLinkage {
    fn features(&self, document: &Document, a: &Cluster, b: &Cluster) -> FeatureVector {
        let total = a.len() * b.len();
        let mut sum = FeatureVector::new();
        if total == 0 {
            return sum;
        }
        for &x in a.mentions() {
            for &y in b.mentions() {
                if let Some(pair) = document.pair_features(x, y) {
                    sum.add_scaled(pair, 1.0);
                }
            }
        }
        let mut mean = FeatureVector::new();
        mean.add_scaled(&sum, 1.0 / total as f64);
        mean
    }
}
