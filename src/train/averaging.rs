//! Weight averaging.
//!
//! Both schemes are pure: they read the history and return a fresh vector.
//!
//! # Simple
//!
//! ```text
//! avg = totalWeight / V
//! ```
//!
//! # Recursive
//!
//! With per-iteration weights `w_0..w_i`, rates `η_0..η_i` and implied
//! deltas `δ_k = (w_{k+1} − (1 − η_k)·w_k) / η_k`:
//!
//! ```text
//! avg_i = Σ_k (1 − η_k)·w_k / (i + 1)  +  Σ_k η_k·δ_k / V
//! ```
//!
//! The whole history is re-read every iteration because the first
//! denominator changes with `i`.
//!
//! With `V = 0` neither scheme divides: simple returns `totalWeight` as is
//! (which is zero, since snapshots are only taken at violations) and
//! recursive returns the first term alone.

use meld_core::WeightVector;

use crate::error::{Error, Result};

/// `total / violations`, or `total` unchanged when there were none.
#[must_use]
pub fn simple_average(total: &WeightVector, violations: usize) -> WeightVector {
    if violations == 0 {
        return total.clone();
    }
    total.scale(1.0 / violations as f64)
}

/// `(next − (1 − rate)·current) / rate`.
pub fn implied_delta(next: &WeightVector, current: &WeightVector, rate: f64) -> Result<WeightVector> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(Error::config(format!(
            "implied delta needs a positive learning rate, got {}",
            rate
        )));
    }
    Ok(next.sub(&current.scale(1.0 - rate))?.scale(1.0 / rate))
}

/// Learning-rate-weighted average over the full history.
///
/// `weights`, `deltas` and `rates` are indexed by iteration and must have
/// equal, non-zero length.
pub fn recursive_average(
    weights: &[WeightVector],
    deltas: &[WeightVector],
    rates: &[f64],
    violations: usize,
) -> Result<WeightVector> {
    if weights.is_empty() || weights.len() != deltas.len() || weights.len() != rates.len() {
        return Err(meld_core::Error::invalid_input(format!(
            "recursive average needs aligned history, got {} weights, {} deltas, {} rates",
            weights.len(),
            deltas.len(),
            rates.len()
        ))
        .into());
    }
    let dim = weights[0].dim();
    let mut former = WeightVector::zeros(dim);
    let mut latter = WeightVector::zeros(dim);
    for ((w, d), &rate) in weights.iter().zip(deltas).zip(rates) {
        former.add_scaled(w, 1.0 - rate)?;
        latter.add_scaled(d, rate)?;
    }
    let average = former.scale(1.0 / weights.len() as f64);
    if violations == 0 {
        return Ok(average);
    }
    Ok(average.add(&latter.scale(1.0 / violations as f64))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wv(v: &[f64]) -> WeightVector {
        WeightVector::from(v.to_vec())
    }

    fn close(a: &WeightVector, b: &[f64]) -> bool {
        a.dim() == b.len() && a.as_slice().iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-9)
    }

    #[test]
    fn simple_divides_by_violations() {
        let avg = simple_average(&wv(&[3.0, -6.0]), 3);
        assert!(close(&avg, &[1.0, -2.0]));
    }

    #[test]
    fn simple_without_violations_is_undivided() {
        let avg = simple_average(&wv(&[0.0, 0.0]), 0);
        assert!(avg.is_zero());
    }

    #[test]
    fn delta_reconstructs_next_weight() {
        let current = wv(&[1.0, 2.0]);
        let next = wv(&[1.5, 1.0]);
        let rate = 0.4;
        let delta = implied_delta(&next, &current, rate).unwrap();
        // next = (1 - η)·current + η·δ
        let mut back = current.scale(1.0 - rate);
        back.add_scaled(&delta, rate).unwrap();
        assert!(close(&back, next.as_slice()));
    }

    #[test]
    fn delta_rejects_zero_rate() {
        assert!(implied_delta(&wv(&[1.0]), &wv(&[0.0]), 0.0).is_err());
    }

    #[test]
    fn recursive_matches_hand_computation() {
        // Two iterations, rates 1.0 then 0.5.
        let weights = [wv(&[0.0, 0.0]), wv(&[2.0, 4.0])];
        let deltas = [wv(&[2.0, 4.0]), wv(&[1.0, 1.0])];
        let rates = [1.0, 0.5];
        let avg = recursive_average(&weights, &deltas, &rates, 4).unwrap();
        // former: (0·w0 + 0.5·w1) / 2 = [0.5, 1.0]
        // latter: (1.0·δ0 + 0.5·δ1) / 4 = [2.5, 4.5] / 4
        assert!(close(&avg, &[0.5 + 0.625, 1.0 + 1.125]));
    }

    #[test]
    fn recursive_without_violations_keeps_former_term() {
        let weights = [wv(&[0.0, 0.0]), wv(&[2.0, 4.0])];
        let deltas = [wv(&[9.0, 9.0]), wv(&[9.0, 9.0])];
        let avg = recursive_average(&weights, &deltas, &[0.5, 0.5], 0).unwrap();
        assert!(avg.is_finite());
        assert!(close(&avg, &[0.5, 1.0]));
    }

    #[test]
    fn recursive_rejects_misaligned_history() {
        let weights = [wv(&[0.0])];
        assert!(recursive_average(&weights, &[], &[1.0], 1).is_err());
        assert!(recursive_average(&[], &[], &[], 1).is_err());
    }
}
