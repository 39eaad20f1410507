//! Retry and backoff policy for the analysis job queue.
//!
//! The worker never runs its own retry loop: after a failed attempt it asks
//! [`FailureDisposition`] what the queue should do next and hands the job
//! back. Attempt counting is 1-based and incremented at claim time, so a
//! worker that dies mid-flight still burns the attempt.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default maximum delivery attempts before a job fails terminally.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Default job lease duration. A worker that holds a lease past this
/// without a heartbeat is considered stalled.
pub const DEFAULT_LEASE_SECS: u64 = 120;

/// Default maximum number of times a stalled job may be reclaimed and
/// redispatched before it is treated as poisoned and failed terminally.
pub const DEFAULT_MAX_RECLAIMS: i32 = 3;

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Tunable parameters for the queue's exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the second attempt (the first retry).
    pub initial_delay: Duration,
    /// Factor by which the delay grows with each further attempt.
    pub multiplier: f64,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_delay: Duration::from_secs(600),
        }
    }
}

impl BackoffPolicy {
    /// Delay to apply after the given failed attempt (1-based).
    ///
    /// Attempt 1 maps to `initial_delay`, each further attempt multiplies
    /// by `multiplier`, and the result is clamped to `max_delay`.
    pub fn delay_for_attempt(&self, attempt: i32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}

// ---------------------------------------------------------------------------
// Disposition
// ---------------------------------------------------------------------------

/// What the queue should do with a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Reschedule the job to become visible again after the delay.
    Reschedule(Duration),
    /// No further attempts: take the terminal-failure path.
    Terminal,
}

/// Decide the queue's next move after a failed attempt.
///
/// Only retryable failures with attempts remaining are rescheduled;
/// unrecoverable failures and attempt exhaustion both converge on
/// [`FailureDisposition::Terminal`].
pub fn disposition_after_failure(
    policy: &BackoffPolicy,
    attempt_count: i32,
    max_attempts: i32,
    retryable: bool,
) -> FailureDisposition {
    if retryable && attempt_count < max_attempts {
        FailureDisposition::Reschedule(policy.delay_for_attempt(attempt_count))
    } else {
        FailureDisposition::Terminal
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_backoff_sequence() {
        let policy = BackoffPolicy::default();
        let expected = [10, 20, 40, 80, 160, 320, 600, 600];

        for (i, &expected_secs) in expected.iter().enumerate() {
            let attempt = i as i32 + 1;
            assert_eq!(
                policy.delay_for_attempt(attempt),
                Duration::from_secs(expected_secs),
                "attempt {attempt}"
            );
        }
    }

    #[test]
    fn delay_clamps_at_max() {
        let policy = BackoffPolicy {
            initial_delay: Duration::from_secs(30),
            multiplier: 10.0,
            max_delay: Duration::from_secs(60),
        };
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(60));
    }

    #[test]
    fn attempt_below_one_is_treated_as_first() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), policy.delay_for_attempt(1));
    }

    #[test]
    fn retryable_with_attempts_left_reschedules() {
        let policy = BackoffPolicy::default();
        let d = disposition_after_failure(&policy, 1, DEFAULT_MAX_ATTEMPTS, true);
        assert_eq!(
            d,
            FailureDisposition::Reschedule(policy.delay_for_attempt(1))
        );
    }

    #[test]
    fn retryable_on_last_attempt_is_terminal() {
        let policy = BackoffPolicy::default();
        let d = disposition_after_failure(&policy, 3, 3, true);
        assert_eq!(d, FailureDisposition::Terminal);
    }

    #[test]
    fn unrecoverable_is_terminal_regardless_of_attempts() {
        let policy = BackoffPolicy::default();
        let d = disposition_after_failure(&policy, 1, 3, false);
        assert_eq!(d, FailureDisposition::Terminal);
    }

    #[test]
    fn attempt_count_never_exceeds_max_before_terminal() {
        // Walk a job through its lifetime: every attempt up to the bound
        // is rescheduled, and the bound itself is terminal.
        let policy = BackoffPolicy::default();
        let max = 5;
        for attempt in 1..max {
            assert!(matches!(
                disposition_after_failure(&policy, attempt, max, true),
                FailureDisposition::Reschedule(_)
            ));
        }
        assert_eq!(
            disposition_after_failure(&policy, max, max, true),
            FailureDisposition::Terminal
        );
    }
}
