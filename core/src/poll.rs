//! Deadline bookkeeping shared by the polling wrappers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::errors::{DeployError, Result};

/// Interval and hard timeout of one poll-until-terminal loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(with = "secs")]
    pub interval: Duration,
    #[serde(with = "secs")]
    pub timeout: Duration,
}

impl PollSettings {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Start the clock for `operation`.
    pub fn deadline(&self, operation: impl Into<String>) -> Deadline {
        Deadline::after(self.timeout, operation)
    }

    pub async fn pause(&self) {
        tokio::time::sleep(self.interval).await;
    }
}

/// Wall-clock limit of a polling loop; `check` fails once it has passed.
#[derive(Debug)]
pub struct Deadline {
    started: Instant,
    timeout: Duration,
    operation: String,
}

impl Deadline {
    pub fn after(timeout: Duration, operation: impl Into<String>) -> Self {
        Self {
            started: Instant::now(),
            timeout,
            operation: operation.into(),
        }
    }

    pub fn expired(&self) -> bool {
        self.started.elapsed() > self.timeout
    }

    pub fn check(&self) -> Result<()> {
        if self.expired() {
            return Err(DeployError::timeout(self.operation.clone(), self.timeout));
        }
        Ok(())
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
