//! Dense weight vectors.
//!
//! All arithmetic returns a new vector except [`WeightVector::add_scaled`],
//! which is used for the in-place perceptron update of the live weight.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A dense vector of `F + 1` weights; index 0 is the bias.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector(Vec<f64>);

impl WeightVector {
    /// The zero vector of dimension `dim`.
    #[must_use]
    pub fn zeros(dim: usize) -> Self {
        Self(vec![0.0; dim])
    }

    /// Dimension (number of slots, bias included).
    #[must_use]
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Borrow the raw values.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    fn check(&self, other: &WeightVector) -> Result<()> {
        if self.dim() == other.dim() {
            Ok(())
        } else {
            Err(Error::dimension_mismatch(self.dim(), other.dim()))
        }
    }

    /// `self + other`.
    pub fn add(&self, other: &WeightVector) -> Result<WeightVector> {
        self.check(other)?;
        Ok(self.0.iter().zip(&other.0).map(|(a, b)| a + b).collect())
    }

    /// `self - other`.
    pub fn sub(&self, other: &WeightVector) -> Result<WeightVector> {
        self.check(other)?;
        Ok(self.0.iter().zip(&other.0).map(|(a, b)| a - b).collect())
    }

    /// `self * factor`.
    #[must_use]
    pub fn scale(&self, factor: f64) -> WeightVector {
        self.0.iter().map(|a| a * factor).collect()
    }

    /// In place: `self += factor * other`.
    pub fn add_scaled(&mut self, other: &WeightVector, factor: f64) -> Result<()> {
        self.check(other)?;
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a += factor * b;
        }
        Ok(())
    }

    /// Euclidean distance to `other`.
    pub fn l2_distance(&self, other: &WeightVector) -> Result<f64> {
        let diff = self.sub(other)?;
        Ok(diff.0.iter().map(|d| d * d).sum::<f64>().sqrt())
    }

    /// True if every component is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// The first NaN or infinite component, if any.
    #[must_use]
    pub fn first_non_finite(&self) -> Option<f64> {
        self.0.iter().copied().find(|v| !v.is_finite())
    }

    /// True if every component is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }
}

impl From<Vec<f64>> for WeightVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl FromIterator<f64> for WeightVector {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::ops::Index<usize> for WeightVector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

impl std::fmt::Display for WeightVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        Ok(())
    }
}
