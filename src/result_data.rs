//! Experiment result data.
//!
//! [`ResultData`] is a tagged union over the three experiment families a
//! device can run. Vendor payloads are converted with
//! [`ResultData::from_payload`], which maps an [`ExperimentType`] to the
//! matching variant.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{HalError, HalResult};
use crate::postprocess::{
    CountsData, Distribution, StateKey, counts_to_probabilities, distribution, normalize_data,
};

/// Experiment family of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentType {
    /// Gate-model circuits.
    GateModel,
    /// Quantum annealing problems.
    Annealing,
    /// Analog Hamiltonian simulation.
    Ahs,
}

impl std::fmt::Display for ExperimentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExperimentType::GateModel => write!(f, "gate_model"),
            ExperimentType::Annealing => write!(f, "annealing"),
            ExperimentType::Ahs => write!(f, "ahs"),
        }
    }
}

/// Result data of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "experiment_type", rename_all = "snake_case")]
pub enum ResultData {
    /// Gate-model measurement data.
    GateModel(GateModelResultData),
    /// Annealing solutions.
    Annealing(AnnealingResultData),
    /// Analog Hamiltonian simulation shots.
    Ahs(AhsResultData),
}

impl ResultData {
    /// Convert a vendor payload into result data of the given family.
    ///
    /// Gate-model payloads that carry only raw measurements get their
    /// counts derived from the shot array.
    pub fn from_payload(
        experiment_type: ExperimentType,
        payload: serde_json::Value,
    ) -> HalResult<Self> {
        Ok(match experiment_type {
            ExperimentType::GateModel => {
                let data: GateModelResultData = serde_json::from_value(payload)?;
                if data.measurement_counts.is_none() && data.measurements.is_some() {
                    ResultData::GateModel(data.with_counts_from_measurements())
                } else {
                    ResultData::GateModel(data)
                }
            }
            ExperimentType::Annealing => ResultData::Annealing(serde_json::from_value(payload)?),
            ExperimentType::Ahs => ResultData::Ahs(serde_json::from_value(payload)?),
        })
    }

    /// The experiment family of this data.
    pub fn experiment_type(&self) -> ExperimentType {
        match self {
            ResultData::GateModel(_) => ExperimentType::GateModel,
            ResultData::Annealing(_) => ExperimentType::Annealing,
            ResultData::Ahs(_) => ExperimentType::Ahs,
        }
    }

    /// The gate-model data, if this is a gate-model result.
    pub fn as_gate_model(&self) -> Option<&GateModelResultData> {
        match self {
            ResultData::GateModel(data) => Some(data),
            _ => None,
        }
    }
}

impl From<GateModelResultData> for ResultData {
    fn from(data: GateModelResultData) -> Self {
        ResultData::GateModel(data)
    }
}

impl From<AnnealingResultData> for ResultData {
    fn from(data: AnnealingResultData) -> Self {
        ResultData::Annealing(data)
    }
}

impl From<AhsResultData> for ResultData {
    fn from(data: AhsResultData) -> Self {
        ResultData::Ahs(data)
    }
}

// ───────────────────────── Gate model ──────────────────────────────

/// Raw per-shot measurements: `[shot][bit]`, or `[program][shot][bit]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Measurements {
    /// Shots of a single program.
    Shots(Vec<Vec<u8>>),
    /// Shots of each program in a batch.
    Batch(Vec<Vec<Vec<u8>>>),
}

fn shots_to_counts(shots: &[Vec<u8>]) -> Distribution<u64> {
    distribution(shots.iter().map(|shot| {
        let bits: String = shot
            .iter()
            .map(|&b| if b == 0 { '0' } else { '1' })
            .collect();
        (bits, 1u64)
    }))
}

/// Lazily computed views, one slot per `(decimal, include_zero_values)`.
#[derive(Debug, Clone)]
struct FormatCache<T> {
    slots: [[OnceLock<T>; 2]; 2],
}

impl<T> Default for FormatCache<T> {
    fn default() -> Self {
        Self {
            slots: Default::default(),
        }
    }
}

impl<T> FormatCache<T> {
    fn get_or_try_init(
        &self,
        decimal: bool,
        include_zero_values: bool,
        init: impl FnOnce() -> HalResult<T>,
    ) -> HalResult<&T> {
        let slot = &self.slots[usize::from(decimal)][usize::from(include_zero_values)];
        if let Some(value) = slot.get() {
            return Ok(value);
        }
        let value = init()?;
        Ok(slot.get_or_init(|| value))
    }
}

/// Serialized summary of gate-model data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateModelSummary {
    /// Total number of shots.
    pub shots: u64,
    /// Width of the measured register.
    pub num_measured_qubits: usize,
    /// Formatted counts.
    pub measurement_counts: Option<CountsData<u64>>,
    /// Formatted probabilities.
    pub measurement_probabilities: Option<CountsData<f64>>,
    /// Raw measurements.
    pub measurements: Option<Measurements>,
}

/// Gate-model result data.
///
/// Formatted counts and probabilities are computed on first request and
/// memoized per `(decimal, include_zero_values)` combination.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateModelResultData {
    #[serde(
        default,
        alias = "measurement_counts",
        skip_serializing_if = "Option::is_none"
    )]
    measurement_counts: Option<CountsData<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    measurements: Option<Measurements>,
    #[serde(
        default,
        alias = "measurement_probabilities",
        skip_serializing_if = "Option::is_none"
    )]
    measurement_probabilities: Option<CountsData<f64>>,
    #[serde(skip)]
    counts_cache: FormatCache<CountsData<u64>>,
    #[serde(skip)]
    probabilities_cache: FormatCache<CountsData<f64>>,
    #[serde(skip)]
    summary: OnceLock<GateModelSummary>,
}

impl PartialEq for GateModelResultData {
    fn eq(&self, other: &Self) -> bool {
        self.measurement_counts == other.measurement_counts
            && self.measurements == other.measurements
            && self.measurement_probabilities == other.measurement_probabilities
    }
}

impl GateModelResultData {
    /// Create empty result data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the measurement counts.
    pub fn with_counts(mut self, counts: impl Into<CountsData<u64>>) -> Self {
        self.measurement_counts = Some(counts.into());
        self.reset_caches();
        self
    }

    /// Set the raw measurements.
    pub fn with_measurements(mut self, measurements: Measurements) -> Self {
        self.measurements = Some(measurements);
        self.reset_caches();
        self
    }

    /// Set explicit measurement probabilities.
    pub fn with_probabilities(mut self, probabilities: impl Into<CountsData<f64>>) -> Self {
        self.measurement_probabilities = Some(probabilities.into());
        self.reset_caches();
        self
    }

    /// Build result data from raw measurements, deriving counts.
    pub fn from_measurements(measurements: Measurements) -> Self {
        Self::new()
            .with_measurements(measurements)
            .with_counts_from_measurements()
    }

    fn with_counts_from_measurements(self) -> Self {
        let counts = match &self.measurements {
            Some(Measurements::Shots(shots)) => CountsData::Single(shots_to_counts(shots)),
            Some(Measurements::Batch(batch)) => {
                CountsData::Batch(batch.iter().map(|shots| shots_to_counts(shots)).collect())
            }
            None => return self,
        };
        self.with_counts(counts)
    }

    fn reset_caches(&mut self) {
        self.counts_cache = FormatCache::default();
        self.probabilities_cache = FormatCache::default();
        self.summary = OnceLock::new();
    }

    /// The raw measurements, if supplied.
    pub fn measurements(&self) -> Option<&Measurements> {
        self.measurements.as_ref()
    }

    /// The measurement counts as supplied, before formatting.
    pub fn raw_counts(&self) -> Option<&CountsData<u64>> {
        self.measurement_counts.as_ref()
    }

    /// Formatted measurement counts.
    ///
    /// # Errors
    ///
    /// `InvalidValue` if no counts were supplied, or if zero values are
    /// requested for a register too wide to fill.
    pub fn get_counts(&self, include_zero_values: bool, decimal: bool) -> HalResult<&CountsData<u64>> {
        let counts = self
            .measurement_counts
            .as_ref()
            .ok_or_else(|| HalError::InvalidValue("measurement counts are not available".into()))?;
        self.counts_cache
            .get_or_try_init(decimal, include_zero_values, || {
                normalize_data(counts, include_zero_values, decimal)
            })
    }

    /// Formatted measurement probabilities.
    ///
    /// Explicit probabilities are formatted as given; otherwise they are
    /// derived from the formatted counts.
    ///
    /// # Errors
    ///
    /// `InvalidValue` if explicit probabilities are not a single mapping, or
    /// if neither probabilities nor counts were supplied.
    pub fn get_probabilities(
        &self,
        include_zero_values: bool,
        decimal: bool,
    ) -> HalResult<&CountsData<f64>> {
        self.probabilities_cache
            .get_or_try_init(decimal, include_zero_values, || {
                match &self.measurement_probabilities {
                    Some(probs @ CountsData::Single(_)) => {
                        normalize_data(probs, include_zero_values, decimal)
                    }
                    Some(CountsData::Batch(_)) => Err(HalError::InvalidValue(
                        "measurement probabilities must be a mapping".into(),
                    )),
                    None => {
                        let counts = self.get_counts(include_zero_values, decimal)?;
                        Ok(counts_to_probabilities(counts))
                    }
                }
            })
    }

    /// Serializable summary of this data, computed once.
    ///
    /// Counts and probabilities are `None` only when the data carries
    /// neither.
    ///
    /// # Errors
    ///
    /// Propagates formatting errors, e.g. batch-shaped explicit
    /// probabilities.
    pub fn to_dict(&self) -> HalResult<&GateModelSummary> {
        if let Some(summary) = self.summary.get() {
            return Ok(summary);
        }

        let counts = match &self.measurement_counts {
            Some(_) => Some(self.get_counts(false, false)?.clone()),
            None => None,
        };
        let probabilities =
            if self.measurement_probabilities.is_some() || self.measurement_counts.is_some() {
                Some(self.get_probabilities(false, false)?.clone())
            } else {
                None
            };

        let (shots, num_measured_qubits) = match (&counts, &self.measurements) {
            (Some(counts), _) => {
                let distributions = counts.distributions();
                let shots = distributions.iter().flat_map(|d| d.values()).sum::<u64>();
                let width = distributions
                    .iter()
                    .flat_map(|d| d.keys())
                    .next()
                    .map_or(0, |key| match key {
                        StateKey::Label(s) => s.chars().count(),
                        StateKey::Index(i) => format!("{i:b}").len(),
                    });
                (shots, width)
            }
            (None, Some(Measurements::Shots(shots))) => {
                (shots.len() as u64, shots.first().map_or(0, Vec::len))
            }
            (None, Some(Measurements::Batch(batch))) => (
                batch.iter().map(|shots| shots.len() as u64).sum(),
                batch
                    .iter()
                    .flat_map(|shots| shots.first())
                    .next()
                    .map_or(0, Vec::len),
            ),
            (None, None) => (0, 0),
        };

        let summary = GateModelSummary {
            shots,
            num_measured_qubits,
            measurement_counts: counts,
            measurement_probabilities: probabilities,
            measurements: self.measurements.clone(),
        };
        Ok(self.summary.get_or_init(|| summary))
    }
}

// ───────────────────────── Annealing ───────────────────────────────

/// One annealing solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnealingSolution {
    /// Spin or binary assignment per variable.
    pub solution: BTreeMap<String, i8>,
    /// Energy of the assignment.
    pub energy: f64,
    /// How many reads produced this solution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_occurrences: Option<u64>,
}

/// Annealing result data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnnealingResultData {
    /// Solutions returned by the annealer.
    #[serde(default)]
    pub solutions: Vec<AnnealingSolution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    num_solutions: Option<usize>,
}

impl AnnealingResultData {
    /// Create result data from a list of solutions.
    pub fn new(solutions: Vec<AnnealingSolution>) -> Self {
        Self {
            solutions,
            num_solutions: None,
        }
    }

    /// Override the reported number of solutions.
    pub fn with_num_solutions(mut self, num_solutions: usize) -> Self {
        self.num_solutions = Some(num_solutions);
        self
    }

    /// Number of solutions; the length of `solutions` unless reported.
    pub fn num_solutions(&self) -> usize {
        self.num_solutions.unwrap_or(self.solutions.len())
    }

    /// The solution with the lowest energy.
    pub fn lowest_energy(&self) -> Option<&AnnealingSolution> {
        self.solutions
            .iter()
            .min_by(|a, b| a.energy.total_cmp(&b.energy))
    }
}

// ─────────────────── Analog Hamiltonian simulation ─────────────────

/// One AHS shot.
///
/// Two shots are equal when `success` matches and each sequence is either
/// absent on both or equal element-wise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AhsShotResult {
    /// Whether the shot succeeded.
    pub success: bool,
    /// Site occupancy before the sequence (1 = atom present).
    #[serde(default, alias = "pre_sequence", skip_serializing_if = "Option::is_none")]
    pub pre_sequence: Option<Vec<u8>>,
    /// Site occupancy after the sequence.
    #[serde(default, alias = "post_sequence", skip_serializing_if = "Option::is_none")]
    pub post_sequence: Option<Vec<u8>>,
}

impl AhsShotResult {
    /// Create a shot result.
    pub fn new(success: bool, pre_sequence: Option<Vec<u8>>, post_sequence: Option<Vec<u8>>) -> Self {
        Self {
            success,
            pre_sequence,
            post_sequence,
        }
    }

    /// Per-site state string: `e` empty, `r` Rydberg, `g` ground.
    fn state(&self) -> HalResult<Option<String>> {
        let (Some(pre), Some(post)) = (&self.pre_sequence, &self.post_sequence) else {
            return Ok(None);
        };
        if pre.len() != post.len() {
            return Err(HalError::InvalidValue(format!(
                "pre-sequence has {} sites but post-sequence has {}",
                pre.len(),
                post.len()
            )));
        }
        Ok(Some(
            pre.iter()
                .zip(post)
                .map(|(&before, &after)| match (before, after) {
                    (0, _) => 'e',
                    (_, 0) => 'r',
                    _ => 'g',
                })
                .collect(),
        ))
    }
}

/// Analog Hamiltonian simulation result data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AhsResultData {
    /// Counts per site-state string, if reported by the vendor.
    #[serde(default, alias = "measurement_counts", skip_serializing_if = "Option::is_none")]
    pub measurement_counts: Option<Distribution<u64>>,
    /// Shot results.
    #[serde(default)]
    pub measurements: Vec<AhsShotResult>,
}

impl AhsResultData {
    /// Create result data from shot results.
    pub fn new(measurements: Vec<AhsShotResult>) -> Self {
        Self {
            measurement_counts: None,
            measurements,
        }
    }

    /// Counts per site-state string.
    ///
    /// Uses the reported counts when present, else tallies successful shots
    /// that carry both sequences.
    pub fn get_counts(&self) -> HalResult<Distribution<u64>> {
        if let Some(counts) = &self.measurement_counts {
            return Ok(counts.clone());
        }
        if self.measurements.is_empty() {
            return Err(HalError::InvalidValue(
                "no measurement counts or shot results available".into(),
            ));
        }
        let mut counts = Distribution::new();
        for shot in self.measurements.iter().filter(|shot| shot.success) {
            if let Some(state) = shot.state()? {
                *counts.entry(StateKey::Label(state)).or_default() += 1;
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn counts(pairs: &[(&str, u64)]) -> Distribution<u64> {
        distribution(pairs.iter().map(|&(k, v)| (k, v)))
    }

    #[test]
    fn test_get_counts_requires_counts() {
        let data = GateModelResultData::new();
        assert!(matches!(
            data.get_counts(false, false),
            Err(HalError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_get_counts_memoized_per_view() {
        let data = GateModelResultData::new().with_counts(counts(&[("1", 3), ("10", 1)]));

        let binary = data.get_counts(false, false).unwrap();
        assert_eq!(binary, &CountsData::Single(counts(&[("01", 3), ("10", 1)])));
        assert!(std::ptr::eq(binary, data.get_counts(false, false).unwrap()));

        let decimal = data.get_counts(true, true).unwrap();
        assert_eq!(
            decimal,
            &CountsData::Single(distribution([(0u64, 0u64), (1, 3), (2, 1), (3, 0)]))
        );
    }

    #[test]
    fn test_probabilities_derived_from_counts() {
        let data = GateModelResultData::new().with_counts(counts(&[("0", 550), ("1", 474)]));
        let CountsData::Single(probs) = data.get_probabilities(false, false).unwrap() else {
            panic!("expected single");
        };
        let total: f64 = probs.values().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_explicit_probabilities() {
        let probs = distribution([("0 1", 0.25), ("11", 0.75)]);
        let data = GateModelResultData::new().with_probabilities(probs);
        assert_eq!(
            data.get_probabilities(false, false).unwrap(),
            &CountsData::Single(distribution([("01", 0.25), ("11", 0.75)]))
        );

        let batch = GateModelResultData::new().with_probabilities(vec![distribution([("0", 1.0)])]);
        assert!(matches!(
            batch.get_probabilities(false, false),
            Err(HalError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_to_dict() {
        let data = GateModelResultData::new().with_counts(counts(&[("00", 500), ("11", 524)]));
        let summary = data.to_dict().unwrap();
        assert_eq!(summary.shots, 1024);
        assert_eq!(summary.num_measured_qubits, 2);
        assert!(summary.measurement_probabilities.is_some());
        assert!(std::ptr::eq(summary, data.to_dict().unwrap()));
    }

    #[test]
    fn test_to_dict_propagates_probability_errors() {
        let data = GateModelResultData::new()
            .with_counts(counts(&[("0", 1)]))
            .with_probabilities(vec![distribution([("0", 1.0)])]);
        assert!(matches!(data.to_dict(), Err(HalError::InvalidValue(_))));

        let empty = GateModelResultData::new();
        let summary = empty.to_dict().unwrap();
        assert_eq!(summary.shots, 0);
        assert!(summary.measurement_counts.is_none());
        assert!(summary.measurement_probabilities.is_none());
    }

    #[test]
    fn test_from_measurements() {
        let data = GateModelResultData::from_measurements(Measurements::Shots(vec![
            vec![0, 1],
            vec![0, 1],
            vec![1, 1],
        ]));
        assert_eq!(
            data.get_counts(false, false).unwrap(),
            &CountsData::Single(counts(&[("01", 2), ("11", 1)]))
        );
        assert_eq!(data.to_dict().unwrap().shots, 3);
    }

    #[test]
    fn test_from_payload_gate_model() {
        let payload = json!({
            "measurementCounts": {"00": 10, "11": 6},
            "measurements": [[0, 0], [1, 1]],
        });
        let data = ResultData::from_payload(ExperimentType::GateModel, payload).unwrap();
        assert_eq!(data.experiment_type(), ExperimentType::GateModel);
        let gate = data.as_gate_model().unwrap();
        assert_eq!(
            gate.get_counts(false, true).unwrap(),
            &CountsData::Single(distribution([(0u64, 10u64), (3, 6)]))
        );
    }

    #[test]
    fn test_from_payload_measurements_only() {
        let payload = json!({"measurements": [[1, 0], [1, 0]]});
        let data = ResultData::from_payload(ExperimentType::GateModel, payload).unwrap();
        let gate = data.as_gate_model().unwrap();
        assert_eq!(
            gate.raw_counts(),
            Some(&CountsData::Single(counts(&[("10", 2)])))
        );
    }

    #[test]
    fn test_from_payload_annealing() {
        let payload = json!({
            "solutions": [
                {"solution": {"x0": 1, "x1": -1}, "energy": -1.5},
                {"solution": {"x0": -1, "x1": -1}, "energy": 0.5, "num_occurrences": 4},
            ]
        });
        let ResultData::Annealing(data) =
            ResultData::from_payload(ExperimentType::Annealing, payload).unwrap()
        else {
            panic!("expected annealing data");
        };
        assert_eq!(data.num_solutions(), 2);
        assert_eq!(data.lowest_energy().unwrap().energy, -1.5);
        assert_eq!(data.clone().with_num_solutions(7).num_solutions(), 7);
    }

    #[test]
    fn test_ahs_shot_equality() {
        let a = AhsShotResult::new(true, None, None);
        let b = AhsShotResult::new(true, None, None);
        assert_eq!(a, b);
        assert_ne!(a, AhsShotResult::new(false, None, None));
        assert_ne!(a, AhsShotResult::new(true, Some(vec![1]), None));
        assert_eq!(
            AhsShotResult::new(true, Some(vec![1, 0]), Some(vec![0, 0])),
            AhsShotResult::new(true, Some(vec![1, 0]), Some(vec![0, 0]))
        );
    }

    #[test]
    fn test_ahs_counts_from_shots() {
        let data = AhsResultData::new(vec![
            AhsShotResult::new(true, Some(vec![1, 1, 0]), Some(vec![0, 1, 0])),
            AhsShotResult::new(true, Some(vec![1, 1, 0]), Some(vec![0, 1, 0])),
            AhsShotResult::new(false, Some(vec![1, 1, 1]), Some(vec![1, 1, 1])),
            AhsShotResult::new(true, None, None),
        ]);
        assert_eq!(data.get_counts().unwrap(), counts(&[("rge", 2)]));

        let mismatched = AhsResultData::new(vec![AhsShotResult::new(
            true,
            Some(vec![1, 1]),
            Some(vec![1]),
        )]);
        assert!(mismatched.get_counts().is_err());
        assert!(AhsResultData::default().get_counts().is_err());
    }

    #[test]
    fn test_result_data_serde_tag() {
        let data = ResultData::from(AhsResultData::new(vec![AhsShotResult::new(true, None, None)]));
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["experiment_type"], "ahs");
        let back: ResultData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);
    }
}
