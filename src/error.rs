//! HAL job error types.
//!
//! Errors are categorized by where they arise:
//!
//! | Category | Variants | Recovery |
//! |----------|----------|----------|
//! | **Transient** | `BackendUnavailable`, `Timeout` | Retry the wait or the call |
//! | **Lifecycle** | `ResourceNotFound`, `JobState`, `BatchJob` | Fix call order or inspect the backend |
//! | **Job-level** | `JobFailed`, `JobCancelled`, `JobNotFound`, `SubmissionFailed` | Resubmit or abort |
//! | **Input** | `InvalidStatusValue`, `InvalidValue`, `Serialization`, `Unsupported` | Fix input |
//! | **Config** | `Configuration`, `Backend` | Fix configuration |

use thiserror::Error;

/// Errors that can occur while orchestrating jobs and normalizing results.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HalError {
    // ── Transient errors ─────────────────────────────────────────────
    /// Backend is not available (transient, retry with backoff).
    #[error("Backend not available: {0}")]
    BackendUnavailable(String),

    /// A client-side wait exceeded its deadline. The job keeps running.
    #[error("Timeout waiting for job {0}")]
    Timeout(String),

    // ── Lifecycle errors ─────────────────────────────────────────────
    /// A job or batch lacks a precondition (not active, no jobs, no device).
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Invalid state transition, e.g. cancelling a terminal job.
    #[error("Invalid job state: {0}")]
    JobState(String),

    /// Batch-level backend failure (activate, close, status, cancel).
    #[error("Batch job error: {message}")]
    BatchJob {
        /// What the batch was doing when it failed.
        message: String,
        /// The underlying backend error.
        #[source]
        source: Option<Box<HalError>>,
    },

    // ── Job-level errors ─────────────────────────────────────────────
    /// Job submission failed.
    #[error("Job submission failed: {0}")]
    SubmissionFailed(String),

    /// Job execution failed (terminal, resubmit if needed).
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// Job was cancelled (terminal).
    #[error("Job cancelled")]
    JobCancelled,

    /// Job not found.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    // ── Input errors ─────────────────────────────────────────────────
    /// A vendor status string could not be mapped to a `JobStatus`.
    #[error("Invalid status value: {0}")]
    InvalidStatusValue(String),

    /// Malformed numeric input to postprocessing.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// A vendor payload could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unsupported feature (choose another device).
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    // ── Config errors ────────────────────────────────────────────────
    /// Configuration error (fix configuration).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic backend error.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl HalError {
    /// Returns `true` if this error is transient and the operation may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_) | Self::Timeout(_))
    }

    /// Wrap a backend failure as a batch-level error.
    pub fn batch(message: impl Into<String>, source: HalError) -> Self {
        Self::BatchJob {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for HAL job operations.
pub type HalResult<T> = Result<T, HalError>;
