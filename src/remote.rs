//! Device-backed job and batch implementations.
//!
//! [`RemoteJob`] and [`RemoteBatch`] implement the job traits directly on
//! top of the [`Device`] contract: results are fetched as raw payloads and
//! converted with [`ResultData::from_payload`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::batch::{BatchConfig, BatchCore, BatchQuantumJob};
use crate::device::{Device, SubmitProgram};
use crate::error::{HalError, HalResult};
use crate::job::{JobCore, JobId, QuantumJob, observed};
use crate::postprocess::{CountsData, normalize_batch_bit_lengths};
use crate::poll::PollConfig;
use crate::result::ExecutionResult;
use crate::result_data::{ExperimentType, GateModelResultData, ResultData};
use crate::status::JobStatus;

/// A job executing on a [`Device`].
#[derive(Debug, Clone)]
pub struct RemoteJob {
    core: JobCore,
    experiment_type: ExperimentType,
    poll: PollConfig,
}

impl RemoteJob {
    /// Wrap an existing job id.
    pub fn new(
        id: impl Into<JobId>,
        device: Option<Arc<dyn Device>>,
        experiment_type: ExperimentType,
    ) -> Self {
        Self {
            core: JobCore::new(id, device),
            experiment_type,
            poll: PollConfig::default(),
        }
    }

    /// Submit `program` to `device` and track the resulting job.
    pub async fn submit<C, D>(
        device: Arc<D>,
        program: &C,
        shots: u32,
        experiment_type: ExperimentType,
    ) -> HalResult<Self>
    where
        C: Sync,
        D: SubmitProgram<C> + 'static,
    {
        let id = device.submit(program, shots).await.map_err(|e| {
            warn!(device = device.id(), "job submission failed: {e}");
            e
        })?;
        info!(job_id = %id, device = device.id(), shots, "job submitted");
        let device: Arc<dyn Device> = device;
        Ok(Self::new(id, Some(device), experiment_type))
    }

    /// Polling used when `result()` waits for a terminal state.
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Experiment family used to decode the result payload.
    pub fn experiment_type(&self) -> ExperimentType {
        self.experiment_type
    }
}

fn payload_details(payload: &Value) -> Map<String, Value> {
    payload
        .get("details")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

#[async_trait]
impl QuantumJob for RemoteJob {
    fn core(&self) -> &JobCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut JobCore {
        &mut self.core
    }

    /// Waits for a terminal state, then decodes the device payload.
    #[instrument(skip(self))]
    async fn result(&mut self) -> HalResult<ExecutionResult> {
        let device = Arc::clone(self.core.require_device()?);
        self.wait_until_final(self.poll).await?;

        let info = self
            .core
            .cached_status()
            .cloned()
            .ok_or_else(|| HalError::JobState(format!("job {} has no status", self.id())))?;
        match info.status {
            JobStatus::Completed => {}
            JobStatus::Cancelled => return Err(HalError::JobCancelled),
            _ => return Err(HalError::JobFailed(info.message().to_string())),
        }

        let payload = device.get_raw_result(self.id()).await.map_err(|e| {
            warn!(job_id = %self.id(), "failed to fetch job result: {e}");
            e
        })?;
        let success = payload
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let details = payload_details(&payload);
        let data = ResultData::from_payload(self.experiment_type, payload)?;
        debug!(job_id = %self.id(), "job result decoded");

        Ok(ExecutionResult::new(device.id(), self.id().clone(), success, data).with_details(details))
    }

    /// Single best-effort request; local status is left to the next poll.
    ///
    /// A job that is not yet known to be terminal is polled once first, so
    /// the cancel endpoint is never contacted for a finished job.
    #[instrument(skip(self))]
    async fn cancel(&mut self) -> HalResult<()> {
        let device = Arc::clone(self.core.require_device()?);
        if self.is_terminal_state().await? {
            let status = self.core.cached_status().map(|info| info.status);
            return Err(HalError::JobState(format!(
                "cannot cancel job {} in terminal state {}",
                self.id(),
                status.unwrap_or(JobStatus::Unknown)
            )));
        }
        device.cancel_job(self.id()).await.map_err(|e| {
            warn!(job_id = %self.id(), "failed to cancel job: {e}");
            e
        })?;
        info!(job_id = %self.id(), "job cancellation requested");
        Ok(())
    }
}

/// A batch of [`RemoteJob`]s on one device.
#[derive(Debug)]
pub struct RemoteBatch {
    core: BatchCore<RemoteJob>,
    experiment_type: ExperimentType,
    poll: PollConfig,
}

impl RemoteBatch {
    /// Open a batch on `device`.
    pub async fn create(
        device: Arc<dyn Device>,
        config: BatchConfig,
        experiment_type: ExperimentType,
    ) -> HalResult<Self> {
        Ok(Self {
            core: BatchCore::create(device, config).await?,
            experiment_type,
            poll: PollConfig::default(),
        })
    }

    /// Polling handed to every fetched job.
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }
}

#[async_trait]
impl BatchQuantumJob for RemoteBatch {
    type Job = RemoteJob;
    type Aggregate = ExecutionResult;

    fn core(&self) -> &BatchCore<RemoteJob> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BatchCore<RemoteJob> {
        &mut self.core
    }

    #[instrument(skip(self))]
    async fn fetch_jobs(&mut self) -> HalResult<()> {
        let device = Arc::clone(self.core.device());
        let descriptors = device.get_batch_jobs(self.core.id()).await.map_err(|e| {
            warn!(batch_id = %self.core.id(), "failed to list batch jobs: {e}");
            HalError::batch(format!("failed to list jobs of batch {}", self.core.id()), e)
        })?;

        let jobs: Vec<RemoteJob> = descriptors
            .into_iter()
            .map(|desc| {
                let mut job =
                    RemoteJob::new(desc.job_id, Some(Arc::clone(&device)), self.experiment_type)
                        .with_poll_config(self.poll);
                if let Some(raw) = desc.status {
                    let status = JobStatus::from_vendor(&raw);
                    job.core.record_status(observed(status, &raw));
                }
                job
            })
            .collect();
        debug!(batch_id = %self.core.id(), jobs = jobs.len(), "batch jobs fetched");
        self.core.set_jobs(jobs);
        Ok(())
    }

    /// Merges every job's gate-model counts into one batch result.
    async fn aggregate(&mut self) -> HalResult<ExecutionResult> {
        let results = self.result().await?;

        let mut counts = Vec::with_capacity(results.len());
        for result in &results {
            let gate = result.data().as_gate_model().ok_or_else(|| {
                HalError::Unsupported(format!(
                    "cannot aggregate {} results of job {}",
                    result.experiment_type(),
                    result.job_id()
                ))
            })?;
            match gate.get_counts(false, false)? {
                CountsData::Single(d) => counts.push(d.clone()),
                CountsData::Batch(batch) => counts.extend(batch.iter().cloned()),
            }
        }

        let mut details = Map::new();
        details.insert(
            "job_ids".into(),
            results
                .iter()
                .map(|r| Value::String(r.job_id().0.clone()))
                .collect(),
        );
        let success = results.iter().all(ExecutionResult::success);
        let data = GateModelResultData::new()
            .with_counts(CountsData::Batch(normalize_batch_bit_lengths(&counts)));

        Ok(ExecutionResult::new(
            self.core.device().id(),
            JobId::new(self.core.id().0.clone()),
            success,
            data.into(),
        )
        .with_details(details))
    }
}
