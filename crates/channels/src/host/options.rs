use crate::factory::FailurePolicy;
use crate::registration::DEFAULT_RETRY_COUNT;

use std::time::Duration;

use serde::Deserialize;

/// Configuration of a [`MqHost`](super::MqHost).
///
/// Every field has a default, so a partial document deserializes.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct HostOptions {
    /// Retry count applied by `register_handler_to_channel`.
    pub retry_count: usize,
    /// Worker tasks spawned per registered handler.
    pub workers_per_handler: usize,
    /// How long a worker blocks on an empty queue before polling again.
    pub poll_interval_ms: u64,
    /// Send an error reply for requests that fail every attempt.
    pub reply_with_error: bool,
    /// Move requests that fail every attempt to the dead-letter queue.
    pub dead_letter_failures: bool,
}

impl HostOptions {
    /// The poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// The failure policy handed to every handler.
    #[must_use]
    pub const fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy {
            reply_with_error: self.reply_with_error,
            dead_letter_failures: self.dead_letter_failures,
        }
    }
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_RETRY_COUNT,
            workers_per_handler: 1,
            poll_interval_ms: 1000,
            reply_with_error: true,
            dead_letter_failures: true,
        }
    }
}
