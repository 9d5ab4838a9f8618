//! Bounded retry with exponential backoff
//!
//! Invitation negotiation and frame delivery have no per-call timeout
//! parameter, so every attempt loop is bounded by a [`RetryPolicy`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for rendezvous and transport attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (default: 5)
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds (default: 50ms)
    pub backoff_initial_ms: u64,
    /// Maximum backoff delay in milliseconds (default: 2000ms)
    pub backoff_max_ms: u64,
    /// Backoff multiplier (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_initial_ms: 50,
            backoff_max_ms: 2000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with aggressive retries (for in-process backends)
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 10,
            backoff_initial_ms: 5,
            backoff_max_ms: 200,
            backoff_multiplier: 1.5,
        }
    }

    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Validate policy parameters
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.max_attempts == 0 || self.max_attempts > 100 {
            return Err(Error::InvalidArgument(format!(
                "max_attempts must be in range 1-100, got {}",
                self.max_attempts
            )));
        }

        if self.backoff_initial_ms > self.backoff_max_ms {
            return Err(Error::InvalidArgument(format!(
                "backoff_initial_ms ({}) exceeds backoff_max_ms ({})",
                self.backoff_initial_ms, self.backoff_max_ms
            )));
        }

        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::InvalidArgument(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }

        Ok(())
    }

    /// Calculate backoff duration before the attempt after `attempt`
    ///
    /// # Arguments
    /// * `attempt` - Attempt that just failed (0-indexed)
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let backoff_ms =
            (self.backoff_initial_ms as f64) * self.backoff_multiplier.powi(attempt as i32);
        let backoff_ms = backoff_ms.min(self.backoff_max_ms as f64);
        Duration::from_millis(backoff_ms as u64)
    }

    /// Check if another attempt is allowed after `attempt` failed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}
