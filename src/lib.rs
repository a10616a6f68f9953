//! HAL Jobs: remote job orchestration and result normalization
//!
//! This crate provides the runtime that sits between a caller and a quantum
//! device once a program has been submitted: tracking an asynchronously
//! executing remote job, waiting on it, batching many jobs under one
//! backend handle, and turning vendor measurement payloads into canonical,
//! queryable results.
//!
//! # Overview
//!
//! The crate defines:
//! - A [`Device`] trait: the narrow backend contract jobs and batches use
//! - [`JobStatus`] / [`StatusInfo`] for status observation
//! - A [`QuantumJob`] trait with provided polling and waiting
//! - A [`BatchQuantumJob`] trait with an idempotent begin/close lifecycle
//!   and [`with_active_batch`] for scoped use
//! - [`ResultData`] for gate-model, annealing and AHS data, wrapped in an
//!   immutable [`ExecutionResult`]
//! - [`postprocess`] functions for bit-width normalization, radix
//!   conversion and shot apportionment
//! - [`HalError`] with categorized error variants
//!
//! # Lifecycle
//!
//! ```text
//!   submit() ──→ status() ──→ wait_for_final_state() ──→ result()
//!   (device)      (async)      (blocking | async)         (async)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use hal_jobs::{ExperimentType, PollConfig, QuantumJob, RemoteJob};
//!
//! let mut job = RemoteJob::submit(device, &circuit, 1000, ExperimentType::GateModel).await?;
//! let config = PollConfig::new()
//!     .with_timeout(Duration::from_secs(60))
//!     .with_poll_interval(Duration::from_secs(1));
//! let result = job.async_result(config).await?;
//! let counts = result.data().as_gate_model().unwrap().get_counts(false, false)?;
//! ```

pub mod batch;
pub mod device;
pub mod error;
pub mod job;
pub mod poll;
pub mod postprocess;
pub mod remote;
pub mod result;
pub mod result_data;
pub mod status;

pub use batch::{BatchConfig, BatchCore, BatchId, BatchQuantumJob, with_active_batch};
pub use device::{Device, JobDescriptor, SubmitProgram};
pub use error::{HalError, HalResult};
pub use job::{JobCore, JobId, Metadata, QuantumJob};
pub use poll::PollConfig;
pub use postprocess::{CountsData, Distribution, StateKey};
pub use remote::{RemoteBatch, RemoteJob};
pub use result::ExecutionResult;
pub use result_data::{
    AhsResultData, AhsShotResult, AnnealingResultData, AnnealingSolution, ExperimentType,
    GateModelResultData, GateModelSummary, Measurements, ResultData,
};
pub use status::{BatchJobStatus, JobStatus, StatusInfo};
