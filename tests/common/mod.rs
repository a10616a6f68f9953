//! Scripted in-memory device shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use hal_jobs::{BatchId, Device, HalError, HalResult, JobDescriptor, JobId, SubmitProgram};
use serde_json::Value;

/// Plays back scripted status sequences; the last entry repeats forever.
#[derive(Default)]
pub struct ScriptedDevice {
    job_statuses: Mutex<HashMap<String, VecDeque<String>>>,
    batch_statuses: Mutex<VecDeque<String>>,
    batch_jobs: Mutex<Vec<JobDescriptor>>,
    payloads: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<String>>,
    next_id: AtomicU64,
    pub fail_activate: AtomicBool,
    pub fail_close: AtomicBool,
}

fn advance(queue: &mut VecDeque<String>) -> Option<String> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_job(&self, job_id: &str, statuses: &[&str], payload: Value) {
        self.job_statuses.lock().unwrap().insert(
            job_id.to_string(),
            statuses.iter().map(|s| s.to_string()).collect(),
        );
        self.payloads
            .lock()
            .unwrap()
            .insert(job_id.to_string(), payload);
    }

    pub fn script_batch(&self, statuses: &[&str], jobs: Vec<JobDescriptor>) {
        *self.batch_statuses.lock().unwrap() = statuses.iter().map(|s| s.to_string()).collect();
        *self.batch_jobs.lock().unwrap() = jobs;
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.split(':').next() == Some(method))
            .count()
    }

    fn record(&self, method: &str, target: impl std::fmt::Display) {
        self.calls.lock().unwrap().push(format!("{method}:{target}"));
    }
}

#[async_trait]
impl Device for ScriptedDevice {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn get_job_status(&self, job_id: &JobId) -> HalResult<String> {
        self.record("get_job_status", job_id);
        let mut statuses = self.job_statuses.lock().unwrap();
        statuses
            .get_mut(&job_id.0)
            .and_then(advance)
            .ok_or_else(|| HalError::JobNotFound(job_id.0.clone()))
    }

    async fn get_raw_result(&self, job_id: &JobId) -> HalResult<Value> {
        self.record("get_raw_result", job_id);
        self.payloads
            .lock()
            .unwrap()
            .get(&job_id.0)
            .cloned()
            .ok_or_else(|| HalError::JobNotFound(job_id.0.clone()))
    }

    async fn cancel_job(&self, job_id: &JobId) -> HalResult<()> {
        self.record("cancel_job", job_id);
        Ok(())
    }

    async fn create_batch(&self, max_timeout_secs: u64) -> HalResult<BatchId> {
        self.record("create_batch", max_timeout_secs);
        Ok(BatchId::new("batch-1"))
    }

    async fn activate_batch(&self, batch_id: &BatchId) -> HalResult<()> {
        self.record("activate_batch", batch_id);
        if self.fail_activate.load(Ordering::SeqCst) {
            return Err(HalError::BackendUnavailable("maintenance".into()));
        }
        Ok(())
    }

    async fn close_batch(&self, batch_id: &BatchId) -> HalResult<()> {
        self.record("close_batch", batch_id);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(HalError::Backend("close rejected".into()));
        }
        Ok(())
    }

    async fn get_batch_status(&self, batch_id: &BatchId) -> HalResult<String> {
        self.record("get_batch_status", batch_id);
        advance(&mut self.batch_statuses.lock().unwrap())
            .ok_or_else(|| HalError::Backend("no batch status scripted".into()))
    }

    async fn get_batch_jobs(&self, batch_id: &BatchId) -> HalResult<Vec<JobDescriptor>> {
        self.record("get_batch_jobs", batch_id);
        Ok(self.batch_jobs.lock().unwrap().clone())
    }

    async fn cancel_batch(&self, batch_id: &BatchId) -> HalResult<()> {
        self.record("cancel_batch", batch_id);
        Ok(())
    }
}

#[async_trait]
impl SubmitProgram<String> for ScriptedDevice {
    async fn submit(&self, program: &String, _shots: u32) -> HalResult<JobId> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("job-{n}");
        self.record("submit", program);
        Ok(JobId::new(id))
    }
}
