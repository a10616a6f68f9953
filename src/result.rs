//! Execution result envelope.
//!
//! An [`ExecutionResult`] is immutable once built: it carries the device
//! and job it came from, a success flag, the typed [`ResultData`] and any
//! vendor metadata the device attached.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::job::JobId;
use crate::result_data::{ExperimentType, ResultData};

/// Result of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    device_id: String,
    job_id: JobId,
    success: bool,
    data: ResultData,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    details: Map<String, Value>,
}

impl ExecutionResult {
    /// Create a new execution result.
    pub fn new(
        device_id: impl Into<String>,
        job_id: impl Into<JobId>,
        success: bool,
        data: ResultData,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            job_id: job_id.into(),
            success,
            data,
            details: Map::new(),
        }
    }

    /// Attach vendor details.
    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = details;
        self
    }

    /// Device that produced this result.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Job that produced this result.
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Whether the device reported success.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Typed result data.
    pub fn data(&self) -> &ResultData {
        &self.data
    }

    /// Experiment family of the data.
    pub fn experiment_type(&self) -> ExperimentType {
        self.data.experiment_type()
    }

    /// Vendor details.
    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }

    /// Consume the envelope, keeping the data.
    pub fn into_data(self) -> ResultData {
        self.data
    }
}
