//! Minimal in-memory device driving jobs and batches.
//!
//! Every job advances one step (`QUEUED` → `RUNNING` → `COMPLETED`) each
//! time its status is queried, so polling is visible in the logs. Run with
//! `RUST_LOG=debug` to see every observation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hal_jobs::{
    BatchConfig, BatchId, BatchQuantumJob, CountsData, Device, ExperimentType, HalError,
    HalResult, JobDescriptor, JobId, PollConfig, QuantumJob, RemoteBatch, RemoteJob,
    SubmitProgram, with_active_batch,
};
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

const STAGES: [&str; 3] = ["QUEUED", "RUNNING", "COMPLETED"];

/// A simple circuit type for demonstration.
struct SimpleCircuit {
    num_qubits: u32,
    gates: Vec<String>,
}

struct MockJob {
    stage: usize,
    payload: Value,
}

#[derive(Default)]
struct MockBatch {
    active: bool,
    jobs: Vec<JobId>,
}

/// In-memory mock device.
#[derive(Default)]
struct MockDevice {
    jobs: Mutex<HashMap<String, MockJob>>,
    batches: Mutex<HashMap<String, MockBatch>>,
    next_id: Mutex<u64>,
}

impl MockDevice {
    fn next_id(&self, prefix: &str) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("{prefix}-{}", *next)
    }

    fn with_batch<T>(&self, id: &BatchId, f: impl FnOnce(&mut MockBatch) -> T) -> HalResult<T> {
        self.batches
            .lock()
            .unwrap()
            .get_mut(&id.0)
            .map(f)
            .ok_or_else(|| HalError::ResourceNotFound(format!("batch {id}")))
    }
}

#[async_trait]
impl Device for MockDevice {
    fn id(&self) -> &str {
        "mock-simulator"
    }

    async fn get_job_status(&self, job_id: &JobId) -> HalResult<String> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id.0)
            .ok_or_else(|| HalError::JobNotFound(job_id.0.clone()))?;
        let status = STAGES[job.stage];
        job.stage = (job.stage + 1).min(STAGES.len() - 1);
        Ok(status.to_string())
    }

    async fn get_raw_result(&self, job_id: &JobId) -> HalResult<Value> {
        self.jobs
            .lock()
            .unwrap()
            .get(&job_id.0)
            .map(|job| job.payload.clone())
            .ok_or_else(|| HalError::JobNotFound(job_id.0.clone()))
    }

    async fn cancel_job(&self, job_id: &JobId) -> HalResult<()> {
        if self.jobs.lock().unwrap().contains_key(&job_id.0) {
            Ok(())
        } else {
            Err(HalError::JobNotFound(job_id.0.clone()))
        }
    }

    async fn create_batch(&self, _max_timeout_secs: u64) -> HalResult<BatchId> {
        let id = self.next_id("batch");
        self.batches
            .lock()
            .unwrap()
            .insert(id.clone(), MockBatch::default());
        Ok(BatchId::new(id))
    }

    async fn activate_batch(&self, batch_id: &BatchId) -> HalResult<()> {
        self.with_batch(batch_id, |batch| batch.active = true)
    }

    async fn close_batch(&self, batch_id: &BatchId) -> HalResult<()> {
        self.with_batch(batch_id, |batch| batch.active = false)
    }

    async fn get_batch_status(&self, batch_id: &BatchId) -> HalResult<String> {
        let jobs = self.with_batch(batch_id, |batch| batch.jobs.clone())?;
        // Batch polling drives its jobs forward as well
        let mut store = self.jobs.lock().unwrap();
        let mut all_done = true;
        for id in &jobs {
            if let Some(job) = store.get_mut(&id.0) {
                job.stage = (job.stage + 1).min(STAGES.len() - 1);
                all_done &= job.stage == STAGES.len() - 1;
            }
        }
        drop(store);
        Ok(if all_done { "COMPLETED" } else { "RUNNING" }.to_string())
    }

    async fn get_batch_jobs(&self, batch_id: &BatchId) -> HalResult<Vec<JobDescriptor>> {
        let jobs = self.with_batch(batch_id, |batch| batch.jobs.clone())?;
        let store = self.jobs.lock().unwrap();
        Ok(jobs
            .into_iter()
            .map(|id| {
                let stage = store.get(&id.0).map_or(0, |job| job.stage);
                JobDescriptor::new(id).with_status(STAGES[stage])
            })
            .collect())
    }

    async fn cancel_batch(&self, batch_id: &BatchId) -> HalResult<()> {
        self.with_batch(batch_id, |_| ())
    }
}

#[async_trait]
impl SubmitProgram<SimpleCircuit> for MockDevice {
    async fn submit(&self, circuit: &SimpleCircuit, shots: u32) -> HalResult<JobId> {
        if shots == 0 {
            return Err(HalError::SubmissionFailed("shots must be positive".into()));
        }
        let id = JobId::new(self.next_id("mock"));

        // Simulate execution: half all-zeros, half all-ones
        let width = circuit.num_qubits as usize;
        let payload = json!({
            "measurementCounts": {
                "0".repeat(width): shots / 2,
                "1".repeat(width): shots - shots / 2,
            },
            "details": { "gates": circuit.gates.len() },
        });
        self.jobs
            .lock()
            .unwrap()
            .insert(id.0.clone(), MockJob { stage: 0, payload });

        let mut batches = self.batches.lock().unwrap();
        if let Some(batch) = batches.values_mut().find(|batch| batch.active) {
            batch.jobs.push(id.clone());
        }
        Ok(id)
    }
}

fn print_counts(label: &str, counts: &CountsData<u64>) {
    println!("{label}:");
    for (i, dist) in counts.distributions().iter().enumerate() {
        for (state, count) in dist {
            println!("  [{i}] {state}: {count}");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let device = Arc::new(MockDevice::default());
    let poll = PollConfig::new()
        .with_timeout(Duration::from_secs(10))
        .with_poll_interval(Duration::from_millis(100));

    let bell = SimpleCircuit {
        num_qubits: 2,
        gates: vec!["h".into(), "cx".into()],
    };

    // Single job
    let mut job =
        RemoteJob::submit(Arc::clone(&device), &bell, 1000, ExperimentType::GateModel).await?;
    let result = job.async_result(poll).await?;
    let gate = result.data().as_gate_model().ok_or("expected gate-model data")?;
    print_counts("Bell counts", gate.get_counts(false, false)?);
    print_counts("Bell counts (decimal, zero-filled)", gate.get_counts(true, true)?);

    // Batch of three circuits of different width
    let dyn_device: Arc<dyn Device> = device.clone();
    let mut batch =
        RemoteBatch::create(dyn_device, BatchConfig::default(), ExperimentType::GateModel)
            .await?
            .with_poll_config(poll);
    let merged = with_active_batch(&mut batch, |b| {
        let device = Arc::clone(&device);
        Box::pin(async move {
            for width in 1..=3 {
                let circuit = SimpleCircuit {
                    num_qubits: width,
                    gates: vec!["x".into(); width as usize],
                };
                device.submit(&circuit, 100).await?;
            }
            b.fetch_jobs().await?;
            b.wait_until_final(poll).await?;
            b.aggregate().await
        })
    })
    .await?;

    info!(batch_id = %batch.id(), jobs = batch.jobs().len(), "batch finished");
    let gate = merged.data().as_gate_model().ok_or("expected gate-model data")?;
    if let Some(counts) = gate.raw_counts() {
        print_counts("Batch counts", counts);
    }

    Ok(())
}
