//! Job status model.
//!
//! ```text
//!   Initializing ──→ Queued ──→ Validating ──→ Running ──→ Completed
//!                      │                          │
//!                      │                          ├──→ Failed
//!                      │                          │
//!                      └──→ Cancelling ───────────┴──→ Cancelled
//! ```
//!
//! **Invariants:**
//! - Terminal states (`Completed`, `Cancelled`, `Failed`) are permanent.
//! - Terminal-ness depends only on the variant, never on a status message.
//! - Transitions are driven by the backend and only observed here.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HalError;

/// Status of a job or batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Job is being set up by the backend.
    Initializing,
    /// Job is waiting in queue.
    Queued,
    /// Job is being validated.
    Validating,
    /// Job is currently running.
    Running,
    /// Cancellation has been requested.
    Cancelling,
    /// Job was cancelled.
    Cancelled,
    /// Job completed successfully.
    Completed,
    /// Job failed.
    Failed,
    /// The backend reported a status that could not be interpreted.
    Unknown,
}

/// Batches share the job status vocabulary.
pub type BatchJobStatus = JobStatus;

impl JobStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [JobStatus; 9] = [
        JobStatus::Initializing,
        JobStatus::Queued,
        JobStatus::Validating,
        JobStatus::Running,
        JobStatus::Cancelling,
        JobStatus::Cancelled,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Unknown,
    ];

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Failed
        )
    }

    /// Check if the job completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }

    /// Canonical upper-case name, as used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            JobStatus::Initializing => "INITIALIZING",
            JobStatus::Queued => "QUEUED",
            JobStatus::Validating => "VALIDATING",
            JobStatus::Running => "RUNNING",
            JobStatus::Cancelling => "CANCELLING",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Unknown => "UNKNOWN",
        }
    }

    /// Default human-readable message.
    pub fn default_message(&self) -> &'static str {
        match self {
            JobStatus::Initializing => "job is being initialized",
            JobStatus::Queued => "job is queued",
            JobStatus::Validating => "job is being validated",
            JobStatus::Running => "job is actively running",
            JobStatus::Cancelling => "job is being cancelled",
            JobStatus::Cancelled => "job has been cancelled",
            JobStatus::Completed => "job has successfully run",
            JobStatus::Failed => "job failed / incurred error",
            JobStatus::Unknown => "job status is not known",
        }
    }

    /// Map a vendor status string, falling back to `Unknown`.
    ///
    /// Case-insensitive; accepts the canonical names plus the common
    /// vendor spellings (`CANCELED`, `DONE`, `ERROR`, `PENDING`, ...).
    pub fn from_vendor(raw: &str) -> JobStatus {
        let normalized = raw.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "INITIALIZING" | "INITIALIZED" | "CREATED" => JobStatus::Initializing,
            "QUEUED" | "PENDING" | "SUBMITTED" | "WAITING" => JobStatus::Queued,
            "VALIDATING" => JobStatus::Validating,
            "RUNNING" | "ONGOING" | "EXECUTING" | "IN_PROGRESS" => JobStatus::Running,
            "CANCELLING" | "CANCELING" => JobStatus::Cancelling,
            "CANCELLED" | "CANCELED" => JobStatus::Cancelled,
            "COMPLETED" | "DONE" | "FINISHED" | "SUCCEEDED" => JobStatus::Completed,
            "FAILED" | "ERROR" | "TIMED_OUT" => JobStatus::Failed,
            _ => {
                tracing::debug!("unrecognized vendor status {raw:?}, mapping to UNKNOWN");
                JobStatus::Unknown
            }
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JobStatus {
    type Err = HalError;

    /// Strict mapping: only the canonical names (any case) are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| HalError::InvalidStatusValue(s.to_string()))
    }
}

/// An observed status together with an optional runtime message.
///
/// The override message comes from vendor status text. It never affects
/// [`StatusInfo::is_terminal`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    /// The observed status.
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl StatusInfo {
    /// Create a status with its default message.
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            message: None,
        }
    }

    /// Attach an override message.
    pub fn set_status_message(&mut self, text: impl Into<String>) {
        self.message = Some(text.into());
    }

    /// Builder form of [`StatusInfo::set_status_message`].
    pub fn with_message(mut self, text: impl Into<String>) -> Self {
        self.set_status_message(text);
        self
    }

    /// The override message if one was set, else the default message.
    pub fn message(&self) -> &str {
        self.message
            .as_deref()
            .unwrap_or_else(|| self.status.default_message())
    }

    /// The override message, if any.
    pub fn override_message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Check if the status is terminal.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl From<JobStatus> for StatusInfo {
    fn from(status: JobStatus) -> Self {
        Self::new(status)
    }
}
