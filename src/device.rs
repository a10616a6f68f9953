//! Device trait: the backend collaborator jobs and batches talk to.
//!
//! ```text
//!   submit() ──→ get_job_status() ──→ get_raw_result()
//!                      │
//!                      └──→ cancel_job()
//!
//!   create_batch() ──→ activate_batch() ──→ get_batch_jobs() ──→ close_batch()
//! ```
//!
//! ## Method table
//!
//! | Method | Kind | Required | Returns |
//! |--------|------|----------|---------|
//! | `id()` | sync | yes | `&str` |
//! | `get_job_status()` | async | yes | `HalResult<String>` |
//! | `get_raw_result()` | async | yes | `HalResult<serde_json::Value>` |
//! | `cancel_job()` | async | yes | `HalResult<()>` |
//! | `create_batch()` | async | provided (unsupported) | `HalResult<BatchId>` |
//! | `activate_batch()` / `close_batch()` | async | provided (unsupported) | `HalResult<()>` |
//! | `get_batch_status()` | async | provided (unsupported) | `HalResult<String>` |
//! | `get_batch_jobs()` | async | provided (unsupported) | `HalResult<Vec<JobDescriptor>>` |
//! | `cancel_batch()` | async | provided (unsupported) | `HalResult<()>` |
//!
//! Status strings are vendor text. Raw results are opaque vendor payloads
//! converted by [`ResultData::from_payload`](crate::ResultData::from_payload).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::batch::BatchId;
use crate::error::{HalError, HalResult};
use crate::job::JobId;

/// A job entry reported by a batch listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Backend job id.
    pub job_id: JobId,
    /// Vendor status text, if the listing includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl JobDescriptor {
    /// Create a descriptor without status.
    pub fn new(job_id: impl Into<JobId>) -> Self {
        Self {
            job_id: job_id.into(),
            status: None,
        }
    }

    /// Attach vendor status text.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// Trait for devices that execute jobs.
///
/// Batch operations default to `Unsupported` so that devices without
/// backend-side batching only implement the single-job methods.
#[async_trait]
pub trait Device: Send + Sync {
    /// Identifier of this device.
    fn id(&self) -> &str;

    /// Vendor status text of a job.
    async fn get_job_status(&self, job_id: &JobId) -> HalResult<String>;

    /// Raw vendor result payload of a job.
    async fn get_raw_result(&self, job_id: &JobId) -> HalResult<serde_json::Value>;

    /// Request cancellation of a job.
    async fn cancel_job(&self, job_id: &JobId) -> HalResult<()>;

    /// Open a batch that stays alive for at most `max_timeout_secs`.
    async fn create_batch(&self, _max_timeout_secs: u64) -> HalResult<BatchId> {
        Err(self.batching_unsupported())
    }

    /// Start accepting jobs into a batch.
    async fn activate_batch(&self, _batch_id: &BatchId) -> HalResult<()> {
        Err(self.batching_unsupported())
    }

    /// Stop accepting jobs into a batch.
    async fn close_batch(&self, _batch_id: &BatchId) -> HalResult<()> {
        Err(self.batching_unsupported())
    }

    /// Vendor status text of a batch.
    async fn get_batch_status(&self, _batch_id: &BatchId) -> HalResult<String> {
        Err(self.batching_unsupported())
    }

    /// Jobs contained in a batch, in submission order.
    async fn get_batch_jobs(&self, _batch_id: &BatchId) -> HalResult<Vec<JobDescriptor>> {
        Err(self.batching_unsupported())
    }

    /// Request cancellation of every job in a batch.
    async fn cancel_batch(&self, _batch_id: &BatchId) -> HalResult<()> {
        Err(self.batching_unsupported())
    }

    #[doc(hidden)]
    fn batching_unsupported(&self) -> HalError {
        HalError::Unsupported(format!("device {} does not support batches", self.id()))
    }
}

/// Devices that accept programs of type `C`.
///
/// The trait is generic over the program type, independent of any
/// circuit representation.
#[async_trait]
pub trait SubmitProgram<C>: Device {
    /// Submit a program; the returned job starts out queued.
    async fn submit(&self, program: &C, shots: u32) -> HalResult<JobId>;
}
