//! Exponential backoff schedule for gossip retries.

use std::time::Duration;

/// Configuration for retry backoff.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Wait after the first failed attempt (default: 500ms)
    pub base: Duration,
    /// Multiplier applied after every failure (default: 2.0)
    pub factor: f64,
    /// Ceiling on the wait (default: None = grows without bound)
    pub max_delay: Option<Duration>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            factor: 2.0,
            max_delay: None,
        }
    }
}

/// Wait before the retry that follows failed attempt number `attempt` (1-based).
pub fn calculate_backoff(attempt: u32, config: &BackoffConfig) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let delay_secs = config.base.as_secs_f64() * config.factor.powi(exponent);

    let capped = match config.max_delay {
        Some(max) => delay_secs.min(max.as_secs_f64()),
        None => delay_secs,
    };

    // Past ~584 billion years from_secs_f64 would panic; saturate instead
    Duration::try_from_secs_f64(capped).unwrap_or(Duration::MAX)
}

/// Backoff state private to one delivery.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    /// Failed attempts so far
    attempts: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Number of failures recorded.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a failed attempt and return how long to wait before the next one.
    pub fn advance(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        calculate_backoff(self.attempts, &self.config)
    }

    /// Wait that the next `advance` will return.
    pub fn current(&self) -> Duration {
        calculate_backoff(self.attempts.saturating_add(1), &self.config)
    }
}
