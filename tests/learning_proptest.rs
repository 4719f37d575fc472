//! Property-based tests for scoring and weight averaging.

use meld::train::{recursive_average, simple_average};
use meld::{Accumulate, FeatureSchema, FeatureVector, Scorer, TrainerState, WeightVector};
use proptest::prelude::*;

const NAMES: [&str; 3] = ["head_match", "overlap", "distance"];

fn weight(dim: usize) -> impl Strategy<Value = WeightVector> {
    prop::collection::vec(-10.0f64..10.0, dim).prop_map(WeightVector::from)
}

fn features() -> impl Strategy<Value = FeatureVector> {
    prop::collection::vec(prop::option::of(-5.0f64..5.0), NAMES.len()).prop_map(|values| {
        NAMES
            .iter()
            .zip(values)
            .filter_map(|(name, v)| v.map(|v| (name.to_string(), v)))
            .collect()
    })
}

proptest! {
    #[test]
    fn scoring_is_pure(w in weight(4), f in features()) {
        let schema = FeatureSchema::new(NAMES).unwrap();
        let scorer = Scorer::new(&schema);
        let a = scorer.score(&w, &f).unwrap();
        let b = scorer.score(&w, &f).unwrap();
        prop_assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn zero_feature_weights_score_the_bias(bias in -10.0f64..10.0, f in features()) {
        let schema = FeatureSchema::new(NAMES).unwrap();
        let scorer = Scorer::new(&schema);
        let w = WeightVector::from(vec![bias, 0.0, 0.0, 0.0]);
        prop_assert_eq!(scorer.score(&w, &f).unwrap(), bias);
        prop_assert_eq!(scorer.score(&schema.zero_weight(), &f).unwrap(), 0.0);
    }

    #[test]
    fn simple_average_is_the_mean_snapshot(
        directions in prop::collection::vec(weight(3), 1..20),
        rate in 0.01f64..1.0,
    ) {
        let mut state = TrainerState::new(3);
        let mut snapshots = Vec::new();
        for d in &directions {
            state.apply_violation(d, rate, Accumulate::AfterUpdate).unwrap();
            snapshots.push(state.weight.clone());
        }
        let k = snapshots.len();
        prop_assert_eq!(state.violations, k);

        let avg = simple_average(&state.total_weight, state.violations);
        for slot in 0..3 {
            let mean = snapshots.iter().map(|w| w[slot]).sum::<f64>() / k as f64;
            prop_assert!((avg[slot] - mean).abs() < 1e-9, "{} vs {}", avg[slot], mean);
        }
    }

    #[test]
    fn recursive_average_without_violations_is_finite(
        history in prop::collection::vec((weight(3), weight(3), 0.01f64..=1.0), 1..10),
    ) {
        let weights: Vec<WeightVector> = history.iter().map(|(w, _, _)| w.clone()).collect();
        let deltas: Vec<WeightVector> = history.iter().map(|(_, d, _)| d.clone()).collect();
        let rates: Vec<f64> = history.iter().map(|(_, _, r)| *r).collect();

        let avg = recursive_average(&weights, &deltas, &rates, 0).unwrap();
        prop_assert!(avg.is_finite());

        let n = weights.len() as f64;
        for slot in 0..3 {
            let former = weights
                .iter()
                .zip(&rates)
                .map(|(w, r)| (1.0 - r) * w[slot])
                .sum::<f64>()
                / n;
            prop_assert!((avg[slot] - former).abs() < 1e-9);
        }
    }
}
