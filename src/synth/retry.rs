//! Centralized retry policy for synthesis calls.
//!
//! One policy object owns the attempt bound, the backoff schedule, and the
//! retryable-error predicate, so retry behavior is decided in exactly one
//! place and testable without any network I/O.

use std::time::Duration;

use crate::config::SynthesisConfig;
use crate::synth::client::BackendError;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per segment, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each attempt after.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.backoff_base_ms),
        }
    }

    /// Delay to wait after `completed_attempts` attempts have failed:
    /// base, 2×base, 4×base, ...
    pub fn backoff_delay(&self, completed_attempts: u32) -> Duration {
        let exponent = completed_attempts.saturating_sub(1).min(16);
        self.base_delay * 2u32.pow(exponent)
    }

    /// Whether another attempt should follow `error` after
    /// `completed_attempts` attempts.
    pub fn should_retry(&self, error: &BackendError, completed_attempts: u32) -> bool {
        completed_attempts < self.max_attempts && error.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(4));
    }

    #[test]
    fn fatal_errors_are_never_retried() {
        let policy = RetryPolicy::default();
        let fatal = BackendError::Fatal("HTTP 400: bad request".to_string());
        assert!(!policy.should_retry(&fatal, 1));
    }

    #[test]
    fn transient_errors_retry_until_attempts_exhausted() {
        let policy = RetryPolicy::default();
        let transient = BackendError::Transient("HTTP 503".to_string());
        assert!(policy.should_retry(&transient, 1));
        assert!(policy.should_retry(&transient, 2));
        assert!(!policy.should_retry(&transient, 3));
    }

    #[test]
    fn auth_expiry_is_retryable() {
        let policy = RetryPolicy::default();
        let expired = BackendError::AuthExpired("HTTP 401".to_string());
        assert!(policy.should_retry(&expired, 1));
    }

    #[test]
    fn from_config_picks_up_tunables() {
        let config = SynthesisConfig {
            max_attempts: 5,
            backoff_base_ms: 250,
            ..Default::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(250));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(1000));
    }
}
