//! Property tests for the postprocessing functions.

use std::collections::BTreeMap;

use hal_jobs::postprocess::{
    distribute_counts, distribution, format_data, normalize_batch_bit_lengths, normalize_data,
};
use hal_jobs::{CountsData, Distribution, StateKey};
use proptest::prelude::*;

fn bitstring_counts() -> impl Strategy<Value = Distribution<u64>> {
    prop::collection::vec(("[01]{1,6}", 0u64..500), 1..12).prop_map(distribution)
}

fn probabilities() -> impl Strategy<Value = BTreeMap<u64, f64>> {
    prop::collection::vec(1u32..1000, 1..16).prop_map(|weights| {
        let total: u32 = weights.iter().sum();
        weights
            .into_iter()
            .enumerate()
            .map(|(i, w)| (i as u64, f64::from(w) / f64::from(total)))
            .collect()
    })
}

fn label_widths(d: &Distribution<u64>) -> Vec<usize> {
    d.keys()
        .filter_map(|k| match k {
            StateKey::Label(s) => Some(s.len()),
            StateKey::Index(_) => None,
        })
        .collect()
}

proptest! {
    #[test]
    fn format_data_is_idempotent(
        counts in bitstring_counts(),
        include_zero_values in any::<bool>(),
        decimal in any::<bool>(),
    ) {
        let once = format_data(&counts, include_zero_values, decimal).unwrap();
        let twice = format_data(&once, include_zero_values, decimal).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn format_data_preserves_total(counts in bitstring_counts(), decimal in any::<bool>()) {
        let total: u64 = counts.values().sum();
        let formatted = format_data(&counts, true, decimal).unwrap();
        prop_assert_eq!(formatted.values().sum::<u64>(), total);
    }

    #[test]
    fn batch_widths_are_uniform(batch in prop::collection::vec(bitstring_counts(), 1..5)) {
        let normalized = normalize_batch_bit_lengths(&batch);
        let widths: Vec<usize> = normalized.iter().flat_map(label_widths).collect();
        let max = batch.iter().flat_map(label_widths).max().unwrap_or(0);
        prop_assert!(widths.iter().all(|&w| w == max));

        if let CountsData::Batch(formatted) = normalize_data(&CountsData::Batch(batch), false, false).unwrap() {
            let widths: Vec<usize> = formatted.iter().flat_map(label_widths).collect();
            prop_assert!(widths.windows(2).all(|w| w[0] == w[1]));
        } else {
            prop_assert!(false, "batch input must stay a batch");
        }
    }

    #[test]
    fn distributed_counts_sum_to_shots(probs in probabilities(), shots in 0i64..100_000) {
        let counts = distribute_counts(&probs, shots).unwrap();
        prop_assert_eq!(counts.values().sum::<u64>(), shots as u64);
        prop_assert!(counts.keys().all(|k| probs.contains_key(k)));
    }

    #[test]
    fn distributed_counts_track_probabilities(probs in probabilities(), shots in 1i64..10_000) {
        let counts = distribute_counts(&probs, shots).unwrap();
        let n = probs.len() as f64;
        for (state, p) in &probs {
            let expected = p * shots as f64;
            let got = counts.get(state).copied().unwrap_or(0) as f64;
            prop_assert!((got - expected).abs() <= n + 1.0, "state {state}: {got} vs {expected}");
        }
    }
}
