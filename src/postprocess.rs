//! Postprocessing of measurement counts.
//!
//! Pure functions over bitstring-keyed distributions: bit-width
//! normalization, radix conversion, zero filling, probability conversion
//! and shot apportionment.
//!
//! Bitstring keys are fixed-width, left-zero-padded, most-significant-bit
//! first. Keys that are neither binary (after stripping whitespace and an
//! optional `0b` prefix) nor decimal pass through untouched: they are
//! sorted but never zero-filled or radix-converted.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{HalError, HalResult};

/// Widest register that [`format_data`] will densely zero-fill.
///
/// Asking for zero values on a wider register fails with `InvalidValue`.
pub const MAX_ZERO_FILL_BITS: usize = 24;

/// Relative tolerance for a probability distribution summing to one.
const PROBABILITY_SUM_TOLERANCE: f64 = 1e-7;

/// A measured state: a bitstring label or a decimal index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateKey {
    /// Integer-encoded state.
    Index(u64),
    /// String-encoded state, usually a bitstring.
    Label(String),
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKey::Index(i) => write!(f, "{i}"),
            StateKey::Label(s) => f.write_str(s),
        }
    }
}

impl From<u64> for StateKey {
    fn from(i: u64) -> Self {
        StateKey::Index(i)
    }
}

impl From<String> for StateKey {
    fn from(s: String) -> Self {
        StateKey::Label(s)
    }
}

impl From<&str> for StateKey {
    fn from(s: &str) -> Self {
        StateKey::Label(s.to_string())
    }
}

/// Value type of a distribution: integer counts or float probabilities.
pub trait Tally: Copy + Default + PartialEq + AddAssign + fmt::Debug + Send + Sync + 'static {}

impl<T> Tally for T where T: Copy + Default + PartialEq + AddAssign + fmt::Debug + Send + Sync + 'static
{}

/// A key-sorted distribution over measured states.
pub type Distribution<V> = BTreeMap<StateKey, V>;

/// Measurement counts for one program or a batch of programs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CountsData<V> {
    /// Counts of a single program.
    Single(Distribution<V>),
    /// Counts of each program in a batch, in submission order.
    Batch(Vec<Distribution<V>>),
}

impl<V: Tally> CountsData<V> {
    /// The distributions held, one per program.
    pub fn distributions(&self) -> &[Distribution<V>] {
        match self {
            CountsData::Single(d) => std::slice::from_ref(d),
            CountsData::Batch(batch) => batch,
        }
    }

    /// Check if this holds a batch.
    pub fn is_batch(&self) -> bool {
        matches!(self, CountsData::Batch(_))
    }
}

impl<V> From<Distribution<V>> for CountsData<V> {
    fn from(d: Distribution<V>) -> Self {
        CountsData::Single(d)
    }
}

impl<V> From<Vec<Distribution<V>>> for CountsData<V> {
    fn from(batch: Vec<Distribution<V>>) -> Self {
        CountsData::Batch(batch)
    }
}

/// Build a distribution from `(key, value)` pairs, summing duplicates.
pub fn distribution<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Distribution<V>
where
    K: Into<StateKey>,
    V: Tally,
{
    let mut out = Distribution::new();
    for (k, v) in pairs {
        *out.entry(k.into()).or_default() += v;
    }
    out
}

fn label_width(key: &StateKey) -> Option<usize> {
    match key {
        StateKey::Label(s) => Some(s.chars().count()),
        StateKey::Index(_) => None,
    }
}

/// Left-pad every label across the batch to the widest label found.
///
/// Returns the input unchanged when all labels already share one width.
pub fn normalize_batch_bit_lengths<V: Tally>(batch: &[Distribution<V>]) -> Vec<Distribution<V>> {
    let mut widths = batch.iter().flat_map(|d| d.keys()).filter_map(label_width);
    let Some(first) = widths.next() else {
        return batch.to_vec();
    };
    let (min, max) = widths.fold((first, first), |(lo, hi), w| (lo.min(w), hi.max(w)));
    if min == max {
        return batch.to_vec();
    }

    batch
        .iter()
        .map(|d| {
            distribution(d.iter().map(|(key, &v)| {
                let key = match key {
                    StateKey::Label(s) => StateKey::Label(format!("{s:0>max$}")),
                    StateKey::Index(i) => StateKey::Index(*i),
                };
                (key, v)
            }))
        })
        .collect()
}

/// Single-distribution form of [`normalize_batch_bit_lengths`].
pub fn normalize_bit_lengths<V: Tally>(counts: &Distribution<V>) -> Distribution<V> {
    normalize_batch_bit_lengths(std::slice::from_ref(counts))
        .pop()
        .unwrap_or_default()
}

/// Strip whitespace and an optional `0b` prefix; `None` if not binary.
fn binary_label(label: &str) -> Option<String> {
    let compact: String = label.chars().filter(|c| !c.is_whitespace()).collect();
    let bits = compact.strip_prefix("0b").unwrap_or(&compact);
    let is_binary = !bits.is_empty() && bits.bytes().all(|b| b == b'0' || b == b'1');
    is_binary.then(|| bits.to_string())
}

fn as_binary<V: Tally>(data: &Distribution<V>) -> Option<Distribution<V>> {
    let mut out = Distribution::new();
    for (key, &v) in data {
        let StateKey::Label(label) = key else {
            return None;
        };
        *out.entry(StateKey::Label(binary_label(label)?)).or_default() += v;
    }
    Some(out)
}

fn as_decimal<V: Tally>(data: &Distribution<V>) -> Option<Distribution<V>> {
    let mut out = Distribution::new();
    for (key, &v) in data {
        let index = match key {
            StateKey::Index(i) => *i,
            StateKey::Label(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
                s.parse().ok()?
            }
            StateKey::Label(_) => return None,
        };
        *out.entry(StateKey::Index(index)).or_default() += v;
    }
    Some(out)
}

fn zero_fill_binary<V: Tally>(data: &mut Distribution<V>) -> HalResult<()> {
    let Some(width) = data.keys().next().and_then(label_width) else {
        return Ok(());
    };
    if width > MAX_ZERO_FILL_BITS {
        return Err(HalError::InvalidValue(format!(
            "cannot zero-fill a {width}-bit register (limit {MAX_ZERO_FILL_BITS} bits)"
        )));
    }
    for state in 0..(1u64 << width) {
        data.entry(StateKey::Label(format!("{state:0width$b}")))
            .or_default();
    }
    Ok(())
}

fn binary_to_decimal<V: Tally>(data: Distribution<V>) -> Distribution<V> {
    distribution(data.into_iter().map(|(key, v)| {
        let key = match key {
            StateKey::Label(bits) => match u64::from_str_radix(&bits, 2) {
                Ok(i) => StateKey::Index(i),
                Err(_) => StateKey::Label(bits),
            },
            index => index,
        };
        (key, v)
    }))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Radix {
    Binary,
    Decimal,
    Unrecognized,
}

/// Format a distribution into canonical sorted form.
///
/// Binary keys are stripped, padded to one width and, when
/// `include_zero_values` is set, filled with every missing state of the
/// register. Decimal keys are converted back to binary unless `decimal` is
/// set. Zero entries are dropped unless `include_zero_values`.
///
/// # Errors
///
/// `InvalidValue` if zero values are requested for a register wider than
/// [`MAX_ZERO_FILL_BITS`].
pub fn format_data<V: Tally>(
    data: &Distribution<V>,
    include_zero_values: bool,
    decimal: bool,
) -> HalResult<Distribution<V>> {
    if data.is_empty() {
        return Ok(data.clone());
    }

    let (mut formatted, radix) = if let Some(binary) = as_binary(data) {
        let mut normalized = normalize_bit_lengths(&binary);
        // A decimal view without zero values would drop the filled states again.
        if include_zero_values {
            zero_fill_binary(&mut normalized)?;
        }
        (normalized, Radix::Binary)
    } else if let Some(decimal_keys) = as_decimal(data) {
        (decimal_keys, Radix::Decimal)
    } else {
        (data.clone(), Radix::Unrecognized)
    };

    if decimal {
        if radix == Radix::Binary {
            formatted = binary_to_decimal(formatted);
        }
    } else if radix == Radix::Decimal {
        let binary = distribution(formatted.into_iter().map(|(key, v)| {
            let label = match key {
                StateKey::Index(i) => format!("{i:b}"),
                StateKey::Label(s) => s,
            };
            (label, v)
        }));
        return format_data(&binary, include_zero_values, false);
    }

    if !include_zero_values {
        formatted.retain(|_, v| *v != V::default());
    }
    Ok(formatted)
}

/// Format one distribution or every distribution of a batch.
///
/// Binary batches are re-padded afterwards so every element shares one
/// key width.
///
/// # Errors
///
/// Fails like [`format_data`] on any element.
pub fn normalize_data<V: Tally>(
    data: &CountsData<V>,
    include_zero_values: bool,
    decimal: bool,
) -> HalResult<CountsData<V>> {
    Ok(match data {
        CountsData::Single(d) => CountsData::Single(format_data(d, include_zero_values, decimal)?),
        CountsData::Batch(batch) => {
            let formatted = batch
                .iter()
                .map(|d| format_data(d, include_zero_values, decimal))
                .collect::<HalResult<Vec<_>>>()?;
            if decimal {
                CountsData::Batch(formatted)
            } else {
                CountsData::Batch(normalize_batch_bit_lengths(&formatted))
            }
        }
    })
}

#[allow(clippy::cast_precision_loss)]
fn single_to_probabilities(counts: &Distribution<u64>) -> Distribution<f64> {
    let total = counts.values().sum::<u64>() as f64;
    if total == 0.0 {
        return Distribution::new();
    }
    counts
        .iter()
        .map(|(k, &v)| (k.clone(), v as f64 / total))
        .collect()
}

/// Divide every count by its distribution's total.
///
/// A distribution with zero total shots converts to an empty one.
pub fn counts_to_probabilities(counts: &CountsData<u64>) -> CountsData<f64> {
    match counts {
        CountsData::Single(d) => CountsData::Single(single_to_probabilities(d)),
        CountsData::Batch(batch) => {
            CountsData::Batch(batch.iter().map(single_to_probabilities).collect())
        }
    }
}

fn is_close(a: f64, b: f64, rel_tol: f64) -> bool {
    (a - b).abs() <= rel_tol * a.abs().max(b.abs())
}

/// Apportion `shots` over a probability distribution.
///
/// Each state first receives `round(p * shots)` (ties to even). The
/// remainder is then handed out one shot at a time, visiting states by
/// descending probability (ties by ascending key), until the counts sum to
/// exactly `shots`.
///
/// # Errors
///
/// `InvalidValue` if a probability lies outside `[0, 1]`, if `shots` is
/// negative, or if shots must be placed on an empty distribution. A
/// distribution that does not sum to one only logs a warning.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn distribute_counts<K>(probs: &BTreeMap<K, f64>, shots: i64) -> HalResult<BTreeMap<K, u64>>
where
    K: Ord + Clone + fmt::Debug,
{
    let total: f64 = probs.values().sum();
    if !is_close(total, 1.0, PROBABILITY_SUM_TOLERANCE) {
        warn!("probabilities sum to {total}, expected 1.0");
    }
    if let Some((state, p)) = probs.iter().find(|(_, p)| !(0.0..=1.0).contains(*p)) {
        return Err(HalError::InvalidValue(format!(
            "probability {p} for state {state:?} is outside [0, 1]"
        )));
    }
    if shots < 0 {
        return Err(HalError::InvalidValue(format!(
            "shots must be non-negative, got {shots}"
        )));
    }
    if probs.is_empty() {
        return if shots == 0 {
            Ok(BTreeMap::new())
        } else {
            Err(HalError::InvalidValue(format!(
                "cannot distribute {shots} shots over an empty distribution"
            )))
        };
    }

    let mut allocation: Vec<(K, f64, i64)> = probs
        .iter()
        .map(|(k, &p)| (k.clone(), p, (p * shots as f64).round_ties_even() as i64))
        .collect();
    let mut diff = shots - allocation.iter().map(|(_, _, c)| c).sum::<i64>();

    allocation.sort_by(|a, b| b.1.total_cmp(&a.1));
    while diff != 0 {
        for (_, _, count) in &mut allocation {
            if diff > 0 {
                *count += 1;
                diff -= 1;
            } else if diff < 0 && *count > 0 {
                *count -= 1;
                diff += 1;
            } else if diff == 0 {
                break;
            }
        }
    }

    Ok(allocation
        .into_iter()
        .map(|(k, _, c)| (k, u64::try_from(c).unwrap_or_default()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels<V: Tally>(pairs: &[(&str, V)]) -> Distribution<V> {
        distribution(pairs.iter().map(|&(k, v)| (k, v)))
    }

    #[test]
    fn test_format_strips_spaces() {
        let data = labels(&[(" 1", 474u64), ("0", 550)]);
        assert_eq!(
            format_data(&data, false, false).unwrap(),
            labels(&[("0", 550), ("1", 474)])
        );
    }

    #[test]
    fn test_format_pads_and_zero_fills() {
        let data = labels(&[("10", 479u64), ("1 1", 13), ("0 0 ", 496)]);
        assert_eq!(
            format_data(&data, true, false).unwrap(),
            labels(&[("00", 496), ("01", 0), ("10", 479), ("11", 13)])
        );
    }

    #[test]
    fn test_format_drops_zero_counts() {
        let data = labels(&[("00", 10u64), ("01", 0), ("11", 5)]);
        assert_eq!(
            format_data(&data, false, false).unwrap(),
            labels(&[("00", 10), ("11", 5)])
        );
    }

    #[test]
    fn test_format_prefixed_binary() {
        let data = labels(&[("0b1", 3u64), ("0b100", 4)]);
        assert_eq!(
            format_data(&data, false, false).unwrap(),
            labels(&[("001", 3), ("100", 4)])
        );
    }

    #[test]
    fn test_format_binary_to_decimal() {
        let data = labels(&[("01", 7u64), ("11", 3)]);
        let expected = distribution([(1u64, 7u64), (3, 3)]);
        assert_eq!(format_data(&data, false, true).unwrap(), expected);

        let filled = format_data(&data, true, true).unwrap();
        assert_eq!(filled, distribution([(0u64, 0u64), (1, 7), (2, 0), (3, 3)]));
    }

    #[test]
    fn test_format_decimal_to_binary() {
        let data = distribution([(1u64, 5u64), (2, 3)]);
        assert_eq!(
            format_data(&data, false, false).unwrap(),
            labels(&[("01", 5), ("10", 3)])
        );

        let digit_labels = labels(&[("4", 1u64), ("0", 2)]);
        assert_eq!(
            format_data(&digit_labels, true, false).unwrap(),
            labels(&[
                ("000", 2),
                ("001", 0),
                ("010", 0),
                ("011", 0),
                ("100", 1),
                ("101", 0),
                ("110", 0),
                ("111", 0),
            ])
        );
    }

    #[test]
    fn test_format_decimal_passthrough() {
        let data = distribution([(5u64, 2u64), (9, 0)]);
        assert_eq!(format_data(&data, true, true).unwrap(), data);
        assert_eq!(format_data(&data, false, true).unwrap(), distribution([(5u64, 2u64)]));
    }

    #[test]
    fn test_format_unrecognized_keys_pass_through() {
        let data = labels(&[("up", 2u64), ("down", 1), ("side", 0)]);
        assert_eq!(
            format_data(&data, false, false).unwrap(),
            labels(&[("down", 1), ("up", 2)])
        );
        assert_eq!(format_data(&data, true, true).unwrap(), data);
    }

    #[test]
    fn test_zero_fill_limit() {
        let wide = "1".repeat(MAX_ZERO_FILL_BITS + 1);
        let data = labels(&[(wide.as_str(), 5u64)]);
        assert!(matches!(
            format_data(&data, true, false),
            Err(HalError::InvalidValue(_))
        ));
        assert!(matches!(
            format_data(&data, true, true),
            Err(HalError::InvalidValue(_))
        ));

        // Without zero values a wide register still formats.
        assert_eq!(format_data(&data, false, false).unwrap(), data);
        assert_eq!(
            format_data(&data, false, true).unwrap(),
            distribution([((1u64 << (MAX_ZERO_FILL_BITS + 1)) - 1, 5u64)])
        );

        let batch = CountsData::Batch(vec![labels(&[("0", 1u64)]), data]);
        assert!(matches!(
            normalize_data(&batch, true, false),
            Err(HalError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_format_empty() {
        let data: Distribution<u64> = Distribution::new();
        assert!(format_data(&data, true, true).unwrap().is_empty());
    }

    #[test]
    fn test_normalize_batch_bit_lengths() {
        let batch = vec![labels(&[("1", 1u64), ("10", 2)]), labels(&[("0111", 3u64)])];
        let normalized = normalize_batch_bit_lengths(&batch);
        assert_eq!(normalized[0], labels(&[("0001", 1), ("0010", 2)]));
        assert_eq!(normalized[1], labels(&[("0111", 3)]));

        let uniform = vec![labels(&[("01", 1u64)]), labels(&[("10", 1u64)])];
        assert_eq!(normalize_batch_bit_lengths(&uniform), uniform);
    }

    #[test]
    fn test_normalize_data_batch_shares_width() {
        let data = CountsData::Batch(vec![
            labels(&[("1", 4u64), ("0", 6)]),
            labels(&[("101", 10u64)]),
        ]);
        let normalized = normalize_data(&data, false, false).unwrap();
        let CountsData::Batch(batch) = normalized else {
            panic!("expected batch");
        };
        assert_eq!(batch[0], labels(&[("000", 6), ("001", 4)]));
        assert_eq!(batch[1], labels(&[("101", 10)]));
    }

    #[test]
    fn test_normalize_data_batch_decimal() {
        let data = CountsData::Batch(vec![labels(&[("1", 4u64)]), labels(&[("101", 10u64)])]);
        let normalized = normalize_data(&data, false, true).unwrap();
        assert_eq!(
            normalized,
            CountsData::Batch(vec![
                distribution([(1u64, 4u64)]),
                distribution([(5u64, 10u64)]),
            ])
        );
    }

    #[test]
    fn test_counts_to_probabilities() {
        let counts = CountsData::Single(labels(&[("0", 550u64), ("1", 474)]));
        let CountsData::Single(probs) = counts_to_probabilities(&counts) else {
            panic!("expected single");
        };
        let total: f64 = probs.values().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!((probs[&StateKey::from("0")] - 550.0 / 1024.0).abs() < 1e-12);
    }

    #[test]
    fn test_counts_to_probabilities_batch() {
        let counts = CountsData::Batch(vec![labels(&[("0", 1u64)]), labels(&[("1", 2u64), ("0", 2)])]);
        let CountsData::Batch(probs) = counts_to_probabilities(&counts) else {
            panic!("expected batch");
        };
        assert_eq!(probs[0][&StateKey::from("0")], 1.0);
        assert_eq!(probs[1][&StateKey::from("1")], 0.5);
    }

    #[test]
    fn test_distribute_counts_example() {
        let probs = BTreeMap::from([(0u64, 0.86), (1, 0.14)]);
        let counts = distribute_counts(&probs, 10).unwrap();
        assert_eq!(counts, BTreeMap::from([(0, 9), (1, 1)]));
    }

    #[test]
    fn test_distribute_counts_fixes_rounding_surplus() {
        // 0.5 * 3 rounds to 2 for both states; the surplus is removed from
        // the first-visited state.
        let probs = BTreeMap::from([("a", 0.5), ("b", 0.5)]);
        let counts = distribute_counts(&probs, 3).unwrap();
        assert_eq!(counts.values().sum::<u64>(), 3);

        let probs = BTreeMap::from([("a", 1.0 / 3.0), ("b", 1.0 / 3.0), ("c", 1.0 / 3.0)]);
        let counts = distribute_counts(&probs, 100).unwrap();
        assert_eq!(counts.values().sum::<u64>(), 100);
        assert_eq!(counts["a"], 34);
    }

    #[test]
    fn test_distribute_counts_rejects_bad_input() {
        let probs = BTreeMap::from([(0u64, 0.5), (1, 0.5)]);
        assert!(matches!(
            distribute_counts(&probs, -1),
            Err(HalError::InvalidValue(_))
        ));

        let probs = BTreeMap::from([(0u64, 1.2), (1, -0.2)]);
        assert!(matches!(
            distribute_counts(&probs, 10),
            Err(HalError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_distribute_counts_warns_on_unnormalized() {
        let probs = BTreeMap::from([(0u64, 0.6), (1, 0.3)]);
        let counts = distribute_counts(&probs, 10).unwrap();
        assert_eq!(counts.values().sum::<u64>(), 10);
        assert_eq!(counts[&0], 7);
    }

    #[test]
    fn test_distribute_counts_empty() {
        let probs: BTreeMap<u64, f64> = BTreeMap::new();
        assert!(distribute_counts(&probs, 0).unwrap().is_empty());
        assert!(distribute_counts(&probs, 5).is_err());
    }
}
