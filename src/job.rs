//! Single-job lifecycle.
//!
//! A [`QuantumJob`] observes a remote computation. Status reads go to the
//! device until a terminal status has been cached; from then on the cached
//! value is returned without a network call.
//!
//! ```text
//!   status() ──→ is_terminal_state() ──→ wait_for_final_state() ──→ result()
//!    (async)         (async)              (blocking | async)         (async)
//! ```
//!
//! **Invariants:**
//! - Cached metadata always contains `job_id`.
//! - Only `status()` and `metadata()` mutate the cache.
//! - `cancel()` on a terminal job fails with `JobState` without contacting
//!   the device.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::{HalError, HalResult};
use crate::poll::{PollClock, PollConfig, blocking_runtime};
use crate::result::ExecutionResult;
use crate::status::{JobStatus, StatusInfo};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new job ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for JobId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// Cached job metadata.
pub type Metadata = FxHashMap<String, Value>;

/// State shared by every [`QuantumJob`] implementation.
#[derive(Clone)]
pub struct JobCore {
    id: JobId,
    device: Option<Arc<dyn Device>>,
    metadata: Metadata,
    status: Option<StatusInfo>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for JobCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobCore")
            .field("id", &self.id)
            .field("device", &self.device.as_ref().map(|d| d.id()))
            .field("status", &self.status)
            .field("created_at", &self.created_at)
            .field("finished_at", &self.finished_at)
            .finish_non_exhaustive()
    }
}

impl JobCore {
    /// Create the state of a freshly observed job.
    pub fn new(id: impl Into<JobId>, device: Option<Arc<dyn Device>>) -> Self {
        let id = id.into();
        let mut metadata = Metadata::default();
        metadata.insert("job_id".into(), Value::String(id.0.clone()));
        if let Some(device) = &device {
            metadata.insert("device_id".into(), Value::String(device.id().to_string()));
        }
        Self {
            id,
            device,
            metadata,
            status: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Add a metadata entry at construction time.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The job identifier.
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// The device this job runs on, if known.
    pub fn device(&self) -> Option<&Arc<dyn Device>> {
        self.device.as_ref()
    }

    /// The device this job runs on.
    ///
    /// # Errors
    ///
    /// `ResourceNotFound` if the job has no associated device.
    pub fn require_device(&self) -> HalResult<&Arc<dyn Device>> {
        self.device
            .as_ref()
            .ok_or_else(|| HalError::ResourceNotFound(format!("job {} has no device", self.id)))
    }

    /// The last observed status.
    pub fn cached_status(&self) -> Option<&StatusInfo> {
        self.status.as_ref()
    }

    /// The cached metadata.
    pub fn cached_metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Time this job was first observed.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time the first terminal status was observed.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Record a status observation.
    ///
    /// Terminal observations are final: later calls are ignored.
    pub fn record_status(&mut self, info: StatusInfo) {
        if self.status.as_ref().is_some_and(StatusInfo::is_terminal) {
            return;
        }
        if self.status.as_ref().map(|s| s.status) != Some(info.status) {
            debug!(job_id = %self.id, status = %info.status, "job status changed");
        }
        self.metadata
            .insert("status".into(), Value::String(info.status.name().into()));
        match info.override_message() {
            Some(message) => {
                self.metadata
                    .insert("status_message".into(), Value::String(message.into()));
            }
            None => {
                self.metadata.remove("status_message");
            }
        }
        if info.is_terminal() && self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
        self.status = Some(info);
    }
}

/// Build a status observation from vendor text.
///
/// The text becomes the override message unless it is the canonical name.
pub(crate) fn observed(status: JobStatus, raw: &str) -> StatusInfo {
    let info = StatusInfo::new(status);
    if raw.trim().eq_ignore_ascii_case(status.name()) {
        info
    } else {
        info.with_message(raw.trim())
    }
}

/// An asynchronously executing remote computation.
///
/// Implementations hold a [`JobCore`] and provide `result()` and
/// `cancel()`; status polling and waiting are provided.
#[async_trait]
pub trait QuantumJob: Send + Sync {
    /// Shared job state.
    fn core(&self) -> &JobCore;

    /// Shared job state, mutably.
    fn core_mut(&mut self) -> &mut JobCore;

    /// Map vendor status text to a status.
    ///
    /// The default mapping is lenient and falls back to `Unknown`.
    fn parse_status(&self, raw: &str) -> HalResult<JobStatus> {
        Ok(JobStatus::from_vendor(raw))
    }

    /// Fetch the result of this job.
    async fn result(&mut self) -> HalResult<ExecutionResult>;

    /// Request cancellation of this job.
    async fn cancel(&mut self) -> HalResult<()>;

    /// The job identifier.
    fn id(&self) -> &JobId {
        self.core().id()
    }

    /// Current status; cached once terminal.
    async fn status(&mut self) -> HalResult<JobStatus> {
        if let Some(info) = self.core().cached_status() {
            if info.is_terminal() {
                return Ok(info.status);
            }
        }

        let device = Arc::clone(self.core().require_device()?);
        let raw = device.get_job_status(self.id()).await.map_err(|e| {
            warn!(job_id = %self.id(), "failed to fetch job status: {e}");
            e
        })?;
        let status = self.parse_status(&raw)?;
        self.core_mut().record_status(observed(status, &raw));
        Ok(status)
    }

    /// Check whether the job has reached a terminal state.
    async fn is_terminal_state(&mut self) -> HalResult<bool> {
        if self.core().cached_status().is_some_and(StatusInfo::is_terminal) {
            return Ok(true);
        }
        Ok(self.status().await?.is_terminal())
    }

    /// Refresh the status and return the full metadata cache.
    async fn metadata(&mut self) -> HalResult<Metadata> {
        self.status().await?;
        Ok(self.core().cached_metadata().clone())
    }

    /// Poll until terminal, suspending between polls.
    ///
    /// # Errors
    ///
    /// `Timeout` once `config.timeout` has elapsed. The job is not cancelled.
    async fn wait_until_final(&mut self, config: PollConfig) -> HalResult<()> {
        let clock = PollClock::start(&config);
        while !self.is_terminal_state().await? {
            tokio::time::sleep(config.poll_interval).await;
            clock.check(self.id())?;
        }
        Ok(())
    }

    /// Poll until terminal, blocking the calling thread between polls.
    ///
    /// Must not be called from within an async runtime.
    ///
    /// # Errors
    ///
    /// `Timeout` once `config.timeout` has elapsed; `Configuration` when
    /// called from async context.
    fn wait_for_final_state(&mut self, config: PollConfig) -> HalResult<()> {
        let runtime = blocking_runtime()?;
        let clock = PollClock::start(&config);
        while !runtime.block_on(self.is_terminal_state())? {
            std::thread::sleep(config.poll_interval);
            clock.check(self.id())?;
        }
        Ok(())
    }

    /// Wait cooperatively for a terminal state, then fetch the result.
    async fn async_result(&mut self, config: PollConfig) -> HalResult<ExecutionResult> {
        self.wait_until_final(config).await?;
        self.result().await
    }
}
