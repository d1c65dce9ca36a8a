use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Retry and dead-letter-queue configuration for publish attempts.
///
/// A transiently failed publish is retried up to `max_retries` times with
/// exponential backoff before the event is routed to the dead letter queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial publish attempt.
    ///
    /// Zero means a single attempt with no retries.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap applied to the exponential backoff, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Whether exhausted events are published to a dead letter topic and kept
    /// in the failed-event buffer. When disabled, exhausted events are
    /// dropped and only counted.
    #[serde(default = "default_enable_dlq")]
    pub enable_dlq: bool,
    /// Topic exhausted events are published to. Required when `enable_dlq`.
    #[serde(default)]
    pub dlq_topic: Option<String>,
}

impl RetryConfig {
    /// Returns the backoff delay before retry number `attempt` (zero-based).
    ///
    /// The delay doubles with each attempt and is capped at `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.min(31);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Validates retry configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.base_delay_ms == 0 {
            return Err(ValidationError::RetryBaseDelayZero);
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err(ValidationError::RetryMaxDelayBelowBase);
        }

        if self.enable_dlq && self.dlq_topic.as_deref().unwrap_or("").is_empty() {
            return Err(ValidationError::MissingDlqTopic);
        }

        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            enable_dlq: default_enable_dlq(),
            dlq_topic: None,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_enable_dlq() -> bool {
    false
}

/// Configuration for reconnecting the source connector after a transient
/// connection failure.
///
/// The delay between attempts grows exponentially from `initial_delay_ms` up
/// to `max_delay_ms`. If no connection is established within `max_total_ms`
/// the pipeline fails.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Maximum delay between reconnection attempts, in milliseconds.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Maximum total duration to keep attempting reconnection, in
    /// milliseconds.
    #[serde(default = "default_max_total_ms")]
    pub max_total_ms: u64,
}

impl ReconnectConfig {
    /// Returns the initial reconnect delay as a [`Duration`].
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Returns the maximum reconnect delay as a [`Duration`].
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Returns the total reconnect budget as a [`Duration`].
    pub fn max_total(&self) -> Duration {
        Duration::from_millis(self.max_total_ms)
    }

    /// Validates reconnection configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.initial_delay_ms == 0 || self.max_delay_ms == 0 {
            return Err(ValidationError::ReconnectDelayZero);
        }

        Ok(())
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_reconnect_max_delay_ms(),
            max_total_ms: default_max_total_ms(),
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

fn default_max_total_ms() -> u64 {
    300_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let retry = RetryConfig {
            max_retries: 10,
            base_delay_ms: 100,
            max_delay_ms: 500,
            enable_dlq: false,
            dlq_topic: None,
        };

        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(500));
        assert_eq!(retry.delay_for_attempt(30), Duration::from_millis(500));
    }

    #[test]
    fn dlq_requires_topic() {
        let retry = RetryConfig {
            enable_dlq: true,
            dlq_topic: None,
            ..RetryConfig::default()
        };

        assert_eq!(retry.validate(), Err(ValidationError::MissingDlqTopic));

        let retry = RetryConfig {
            enable_dlq: true,
            dlq_topic: Some("orders.dlq".to_string()),
            ..RetryConfig::default()
        };

        assert!(retry.validate().is_ok());
    }
}
