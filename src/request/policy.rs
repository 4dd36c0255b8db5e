use std::time::Duration;

/// Backoff settings for transient failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Growth factor: each delay is the previous one times `1 + decay`.
    pub decay: f64,
    /// Delay before the first retry; also the lower bound of every delay.
    pub initial_retry_time: Duration,
    /// Upper bound of a single delay.
    pub max_retry_time: Duration,
    /// Retries allowed before the request turns fatal.
    pub max_retry_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            decay: 0.3,
            initial_retry_time: Duration::from_millis(500),
            max_retry_time: Duration::from_secs(10),
            max_retry_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// No retries; the first transient error is fatal.
    pub fn none() -> Self {
        Self {
            max_retry_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let initial = self.initial_retry_time.as_micros() as f64;
        let max = self.max_retry_time.as_micros() as f64;
        let grown = initial * (1.0 + self.decay).powi(exponent);
        let capped = Duration::from_micros(grown.min(max).round() as u64);
        capped.max(self.initial_retry_time.min(self.max_retry_time))
    }
}

/// Cadence of polling; the continuation predicate lives on the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub poll_time: Duration,
    pub max_poll_attempts: u32,
}

impl PollPolicy {
    pub fn new(poll_time: Duration, max_poll_attempts: u32) -> Self {
        Self {
            poll_time,
            max_poll_attempts,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), 200)
    }
}
