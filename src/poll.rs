//! Polling configuration shared by job and batch waits.
//!
//! Both wait entry points (blocking and cooperative) read the same
//! terminal-state predicate and measure their deadline with the same
//! [`PollClock`]; they differ only in how they sleep between polls.

use std::fmt::Display;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{HalError, HalResult};

/// Default delay between two status reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default batch lifetime on the backend, in seconds.
pub const DEFAULT_MAX_TIMEOUT_SECS: u64 = 3600;

/// Hard ceiling for a batch lifetime, in seconds (24 hours).
pub const MAX_BATCH_TIMEOUT_SECS: u64 = 86_400;

/// How to wait for a job or batch to reach a terminal state.
///
/// Durations serialize as (fractional) seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Give up after this long. `None` waits forever.
    #[serde(default, with = "opt_secs", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Delay between two status reads.
    #[serde(default = "default_poll_interval", with = "secs")]
    pub poll_interval: Duration,
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollConfig {
    /// Create a config with the default interval and no timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Deadline tracking for one wait.
#[derive(Debug)]
pub(crate) struct PollClock {
    started: Instant,
    timeout: Option<Duration>,
}

impl PollClock {
    pub(crate) fn start(config: &PollConfig) -> Self {
        Self {
            started: Instant::now(),
            timeout: config.timeout,
        }
    }

    /// Fail with `Timeout` once the deadline has passed.
    pub(crate) fn check(&self, what: impl Display) -> HalResult<()> {
        let Some(timeout) = self.timeout else {
            return Ok(());
        };
        let elapsed = self.started.elapsed();
        if elapsed >= timeout {
            return Err(HalError::Timeout(format!(
                "{what} (gave up after {:.1}s)",
                elapsed.as_secs_f64()
            )));
        }
        Ok(())
    }
}

/// Runtime for driving async status reads from a blocking wait.
pub(crate) fn blocking_runtime() -> HalResult<tokio::runtime::Runtime> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(HalError::Configuration(
            "blocking wait called from within an async runtime; use the async variant".into(),
        ));
    }
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| HalError::Configuration(format!("failed to start polling runtime: {e}")))
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(D::Error::custom))
            .transpose()
    }
}
