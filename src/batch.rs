//! Batch lifecycle.
//!
//! A batch groups jobs under one backend-side handle:
//!
//! ```text
//!   create() ──→ begin() ──→ (submit jobs) ──→ fetch_jobs() ──→ result() / cancel()
//!                  │                                               │
//!                  └──────────────── close() ←─────────────────────┘
//! ```
//!
//! **Invariants:**
//! - `max_timeout` lies in `(0, 86400]` seconds.
//! - `begin()` and `close()` are idempotent.
//! - `result()` and `cancel()` require an active batch with at least one job.
//! - `cancel()` issues one batch-level request and does not touch local
//!   job state.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{HalError, HalResult};
use crate::job::{QuantumJob, observed};
use crate::poll::{
    DEFAULT_MAX_TIMEOUT_SECS, MAX_BATCH_TIMEOUT_SECS, PollClock, PollConfig, blocking_runtime,
};
use crate::result::ExecutionResult;
use crate::status::{BatchJobStatus, JobStatus, StatusInfo};

/// Unique identifier for a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub String);

impl BatchId {
    /// Create a new batch ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for BatchId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BatchId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Batch creation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Backend-side lifetime of the batch, in seconds.
    #[serde(default = "default_max_timeout_secs")]
    pub max_timeout_secs: u64,
}

fn default_max_timeout_secs() -> u64 {
    DEFAULT_MAX_TIMEOUT_SECS
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_timeout_secs: DEFAULT_MAX_TIMEOUT_SECS,
        }
    }
}

impl BatchConfig {
    /// Set the batch lifetime.
    pub fn with_max_timeout_secs(mut self, secs: u64) -> Self {
        self.max_timeout_secs = secs;
        self
    }

    /// Check that the lifetime lies in `(0, 86400]` seconds.
    pub fn validate(&self) -> HalResult<()> {
        validate_max_timeout(self.max_timeout_secs).map(|_| ())
    }
}

fn validate_max_timeout(secs: u64) -> HalResult<u64> {
    if secs == 0 || secs > MAX_BATCH_TIMEOUT_SECS {
        return Err(HalError::InvalidValue(format!(
            "max_timeout must be between 1 and {MAX_BATCH_TIMEOUT_SECS} seconds, got {secs}"
        )));
    }
    Ok(secs)
}

/// State shared by every [`BatchQuantumJob`] implementation.
pub struct BatchCore<J> {
    id: BatchId,
    device: Arc<dyn Device>,
    jobs: Vec<J>,
    max_timeout_secs: u64,
    active: bool,
    status: Option<StatusInfo>,
}

impl<J> std::fmt::Debug for BatchCore<J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCore")
            .field("id", &self.id)
            .field("device", &self.device.id())
            .field("jobs", &self.jobs.len())
            .field("max_timeout_secs", &self.max_timeout_secs)
            .field("active", &self.active)
            .field("status", &self.status)
            .finish()
    }
}

impl<J> BatchCore<J> {
    /// Validate `config` and open a batch on `device`.
    ///
    /// # Errors
    ///
    /// `InvalidValue` for an out-of-range timeout (before any backend
    /// call); `BatchJob` if the device fails to create the batch.
    pub async fn create(device: Arc<dyn Device>, config: BatchConfig) -> HalResult<Self> {
        let max_timeout_secs = validate_max_timeout(config.max_timeout_secs)?;
        let id = device
            .create_batch(max_timeout_secs)
            .await
            .map_err(|e| {
                warn!(device = device.id(), "failed to create batch: {e}");
                HalError::batch(format!("failed to create batch on {}", device.id()), e)
            })?;
        info!(batch_id = %id, device = device.id(), "batch created");
        Ok(Self {
            id,
            device,
            jobs: Vec::new(),
            max_timeout_secs,
            active: false,
            status: None,
        })
    }

    /// The batch identifier.
    pub fn id(&self) -> &BatchId {
        &self.id
    }

    /// The device this batch lives on.
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Jobs fetched so far, in submission order.
    pub fn jobs(&self) -> &[J] {
        &self.jobs
    }

    /// Jobs fetched so far, mutably.
    pub fn jobs_mut(&mut self) -> &mut [J] {
        &mut self.jobs
    }

    /// Replace the local job list.
    pub fn set_jobs(&mut self, jobs: Vec<J>) {
        self.jobs = jobs;
    }

    /// Backend-side lifetime of the batch.
    pub fn max_timeout(&self) -> Duration {
        Duration::from_secs(self.max_timeout_secs)
    }

    /// Change the lifetime setting; validated like at creation.
    pub fn set_max_timeout(&mut self, secs: u64) -> HalResult<()> {
        self.max_timeout_secs = validate_max_timeout(secs)?;
        Ok(())
    }

    /// Whether the batch is accepting jobs.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The last observed batch status.
    pub fn cached_status(&self) -> Option<&StatusInfo> {
        self.status.as_ref()
    }

    fn record_status(&mut self, info: StatusInfo) {
        if self.status.as_ref().is_some_and(StatusInfo::is_terminal) {
            return;
        }
        debug!(batch_id = %self.id, status = %info.status, "batch status observed");
        self.status = Some(info);
    }

    fn ensure_ready(&self) -> HalResult<()> {
        if !self.active {
            return Err(HalError::ResourceNotFound(format!(
                "batch {} is not active",
                self.id
            )));
        }
        if self.jobs.is_empty() {
            return Err(HalError::ResourceNotFound(format!(
                "batch {} has no jobs",
                self.id
            )));
        }
        Ok(())
    }
}

/// A managed collection of jobs sharing one backend batch.
///
/// Implementations hold a [`BatchCore`] and provide `fetch_jobs()` and
/// `aggregate()`; the lifecycle, polling and result collection are
/// provided.
#[async_trait]
pub trait BatchQuantumJob: Send + Sync {
    /// Provider job type constructed by `fetch_jobs()`.
    type Job: QuantumJob;

    /// Provider-specific reduction of the batch results.
    type Aggregate: Send;

    /// Shared batch state.
    fn core(&self) -> &BatchCore<Self::Job>;

    /// Shared batch state, mutably.
    fn core_mut(&mut self) -> &mut BatchCore<Self::Job>;

    /// Refresh the local job list from the device's batch listing.
    async fn fetch_jobs(&mut self) -> HalResult<()>;

    /// Reduce the per-job results into one logical batch result.
    async fn aggregate(&mut self) -> HalResult<Self::Aggregate>;

    /// Map vendor batch status text to a status.
    fn parse_status(&self, raw: &str) -> HalResult<BatchJobStatus> {
        Ok(JobStatus::from_vendor(raw))
    }

    /// The batch identifier.
    fn id(&self) -> &BatchId {
        self.core().id()
    }

    /// Jobs fetched so far.
    fn jobs(&self) -> &[Self::Job] {
        self.core().jobs()
    }

    /// Activate the batch. No-op if already active.
    ///
    /// # Errors
    ///
    /// `BatchJob` if the device refuses; the batch stays inactive.
    async fn begin(&mut self) -> HalResult<()> {
        if self.core().is_active() {
            info!(batch_id = %self.id(), "batch is already active");
            return Ok(());
        }
        let device = Arc::clone(self.core().device());
        device.activate_batch(self.id()).await.map_err(|e| {
            warn!(batch_id = %self.id(), "failed to activate batch: {e}");
            HalError::batch(format!("failed to activate batch {}", self.id()), e)
        })?;
        self.core_mut().active = true;
        info!(batch_id = %self.id(), "batch activated");
        Ok(())
    }

    /// Close the batch and refresh the job list. No-op if not active.
    ///
    /// # Errors
    ///
    /// `BatchJob` if the device refuses; the batch stays active.
    async fn close(&mut self) -> HalResult<()> {
        if !self.core().is_active() {
            info!(batch_id = %self.id(), "batch is not active");
            return Ok(());
        }
        let device = Arc::clone(self.core().device());
        device.close_batch(self.id()).await.map_err(|e| {
            warn!(batch_id = %self.id(), "failed to close batch: {e}");
            HalError::batch(format!("failed to close batch {}", self.id()), e)
        })?;
        self.core_mut().active = false;
        info!(batch_id = %self.id(), "batch closed");
        self.fetch_jobs().await
    }

    /// Current batch status; cached once terminal.
    async fn status(&mut self) -> HalResult<BatchJobStatus> {
        if let Some(info) = self.core().cached_status() {
            if info.is_terminal() {
                return Ok(info.status);
            }
        }
        let device = Arc::clone(self.core().device());
        let raw = device.get_batch_status(self.id()).await.map_err(|e| {
            warn!(batch_id = %self.id(), "failed to fetch batch status: {e}");
            HalError::batch(format!("failed to fetch status of batch {}", self.id()), e)
        })?;
        let status = self.parse_status(&raw)?;
        self.core_mut().record_status(observed(status, &raw));
        Ok(status)
    }

    /// Check whether the batch has reached a terminal state.
    async fn is_terminal_state(&mut self) -> HalResult<bool> {
        if self.core().cached_status().is_some_and(StatusInfo::is_terminal) {
            return Ok(true);
        }
        Ok(self.status().await?.is_terminal())
    }

    /// Results of every job, in order. Waits for each job in turn.
    ///
    /// # Errors
    ///
    /// `ResourceNotFound` if the batch is not active or has no jobs.
    async fn result(&mut self) -> HalResult<Vec<ExecutionResult>> {
        self.core().ensure_ready()?;
        let mut results = Vec::with_capacity(self.jobs().len());
        for job in self.core_mut().jobs_mut() {
            results.push(job.result().await?);
        }
        Ok(results)
    }

    /// Request cancellation of the whole batch with one device call.
    ///
    /// # Errors
    ///
    /// `ResourceNotFound` if the batch is not active or has no jobs;
    /// `BatchJob` if the device refuses.
    async fn cancel(&mut self) -> HalResult<()> {
        self.core().ensure_ready()?;
        let device = Arc::clone(self.core().device());
        device.cancel_batch(self.id()).await.map_err(|e| {
            warn!(batch_id = %self.id(), "failed to cancel batch: {e}");
            HalError::batch(format!("failed to cancel batch {}", self.id()), e)
        })?;
        info!(batch_id = %self.id(), "batch cancellation requested");
        Ok(())
    }

    /// Poll until the batch is terminal, suspending between polls.
    async fn wait_until_final(&mut self, config: PollConfig) -> HalResult<()> {
        let clock = PollClock::start(&config);
        while !self.is_terminal_state().await? {
            tokio::time::sleep(config.poll_interval).await;
            clock.check(format_args!("batch {}", self.id()))?;
        }
        Ok(())
    }

    /// Poll until the batch is terminal, blocking between polls.
    ///
    /// Must not be called from within an async runtime.
    fn wait_for_final_state(&mut self, config: PollConfig) -> HalResult<()> {
        let runtime = blocking_runtime()?;
        let clock = PollClock::start(&config);
        while !runtime.block_on(self.is_terminal_state())? {
            std::thread::sleep(config.poll_interval);
            clock.check(format_args!("batch {}", self.id()))?;
        }
        Ok(())
    }

    /// Wait cooperatively for a terminal batch, then collect the results.
    async fn async_result(&mut self, config: PollConfig) -> HalResult<Vec<ExecutionResult>> {
        self.wait_until_final(config).await?;
        self.result().await
    }
}

/// Run `body` inside an active batch.
///
/// Calls `begin()` first and `close()` on every exit path: success, error
/// and panic. An error from `body` takes precedence over a close error; a
/// panic is resumed after closing.
///
/// ```ignore
/// let results = with_active_batch(&mut batch, |b| Box::pin(async move {
///     b.fetch_jobs().await?;
///     b.result().await
/// }))
/// .await?;
/// ```
pub async fn with_active_batch<B, T, F>(batch: &mut B, body: F) -> HalResult<T>
where
    B: BatchQuantumJob,
    F: for<'a> FnOnce(&'a mut B) -> BoxFuture<'a, HalResult<T>>,
{
    batch.begin().await?;
    let outcome = AssertUnwindSafe(body(batch)).catch_unwind().await;
    let closed = batch.close().await;

    match outcome {
        Ok(Ok(value)) => closed.map(|()| value),
        Ok(Err(err)) => {
            if let Err(close_err) = closed {
                warn!(batch_id = %batch.id(), "failed to close batch after error: {close_err}");
            }
            Err(err)
        }
        Err(panic) => {
            if let Err(close_err) = closed {
                warn!(batch_id = %batch.id(), "failed to close batch after panic: {close_err}");
            }
            std::panic::resume_unwind(panic)
        }
    }
}
