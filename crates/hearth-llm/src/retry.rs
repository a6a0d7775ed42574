use std::time::Duration;

/// Linear-growth retry schedule: the wait after failed attempt `n` is `base_delay * n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Wait before the attempt following failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Total wait spent after `failures` consecutive failed attempts.
    pub fn cumulative_delay(&self, failures: u32) -> Duration {
        (1..=failures).map(|attempt| self.delay_for(attempt)).sum()
    }

    pub fn exhausted_message(&self) -> String {
        format!(
            "\n\nError: Unable to reach the inference server after {} attempts. Please make sure it is running and try again.",
            self.max_attempts
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}
