use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a projection loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Maximum number of messages taken from the stream per poll
    /// Default: 100
    #[serde(default = "default_batch_max")]
    pub batch_max: usize,

    /// Sleep between polls when the stream is drained (milliseconds)
    /// Default: 100ms
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Retry policy for failed store writes
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_batch_max() -> usize {
    100
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            batch_max: default_batch_max(),
            poll_interval_ms: default_poll_interval_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_max(mut self, max: usize) -> Self {
        self.batch_max = max;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Bounded retry around downstream writes
///
/// A message that still fails after `max_retries` retries is handed to the
/// dead-letter sink instead of being retried forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first failed attempt
    /// Default: 5
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Delay between attempts
    #[serde(default)]
    pub backoff: BackoffStrategy,
}

fn default_max_retries() -> usize {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff: BackoffStrategy::default(),
        }
    }
}

impl RetryConfig {
    /// No retries, no delay. The first failure dead-letters the message.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: BackoffStrategy::Fixed { delay_ms: 0 },
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Backoff strategy for retry delays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed { delay_ms: u64 },

    /// Exponential: initial * 2^attempt (capped at max)
    Exponential { initial_ms: u64, max_ms: u64 },

    /// Fibonacci: initial * fib(attempt) (capped at max)
    Fibonacci { initial_ms: u64, max_ms: u64 },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Exponential {
            initial_ms: 100,
            max_ms: 10_000,
        }
    }
}

impl BackoffStrategy {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: usize) -> Duration {
        let ms = match self {
            BackoffStrategy::Fixed { delay_ms } => *delay_ms,
            BackoffStrategy::Exponential { initial_ms, max_ms } => {
                let multiplier = 2u64.saturating_pow(attempt.min(63) as u32);
                initial_ms.saturating_mul(multiplier).min(*max_ms)
            }
            BackoffStrategy::Fibonacci { initial_ms, max_ms } => {
                initial_ms.saturating_mul(fibonacci(attempt)).min(*max_ms)
            }
        };
        Duration::from_millis(ms)
    }
}

fn fibonacci(n: usize) -> u64 {
    let (mut a, mut b) = (1u64, 1u64);
    for _ in 1..n {
        let c = a.saturating_add(b);
        a = b;
        b = c;
    }
    b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_is_capped() {
        let backoff = BackoffStrategy::Exponential {
            initial_ms: 100,
            max_ms: 1_000,
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_millis(1_000));
        assert_eq!(backoff.delay(200), Duration::from_millis(1_000));
    }

    #[test]
    fn fibonacci_backoff() {
        let backoff = BackoffStrategy::Fibonacci {
            initial_ms: 10,
            max_ms: 1_000,
        };
        let delays: Vec<u64> = (0..6)
            .map(|n| backoff.delay(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![10, 10, 20, 30, 50, 80]);
    }

    #[test]
    fn runner_config_from_json_uses_defaults() {
        let cfg: RunnerConfig =
            serde_json::from_str(r#"{"retry": {"backoff": {"kind": "fixed", "delay_ms": 5}}}"#)
                .unwrap();
        assert_eq!(cfg.batch_max, 100);
        assert_eq!(cfg.retry.max_retries, 5);
        assert_eq!(cfg.retry.backoff.delay(7), Duration::from_millis(5));
    }
}
