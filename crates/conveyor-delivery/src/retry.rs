//! Fixed backoff schedule for delivery retries.
//!
//! The retry budget is deliberately small and deliberately boring: a bounded
//! number of attempts with fixed delays between them, no jitter, nothing
//! configurable beyond the numbers themselves. Job-level ordering depends on
//! delivery having a predictable worst case.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Attempt budget and the delays applied between attempts.
///
/// After failed attempt `n` (1-based) the engine waits `delays[n - 1]`
/// before the next try; no delay follows the final attempt. With the default
/// 3-attempt budget the exhaustion path therefore waits 2s + 4s in total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffSchedule {
    max_attempts: i64,
    delays: Vec<Duration>,
}

impl BackoffSchedule {
    /// Creates a schedule from an attempt budget and explicit delays.
    pub fn new(max_attempts: i64, delays: Vec<Duration>) -> Self {
        Self { max_attempts: max_attempts.max(1), delays }
    }

    /// Total number of attempts this schedule allows.
    pub fn max_attempts(&self) -> i64 {
        self.max_attempts
    }

    /// Delay to wait after the given failed attempt (1-based), or None when
    /// the budget is exhausted.
    pub fn delay_after(&self, attempt_number: i64) -> Option<Duration> {
        if attempt_number < 1 || attempt_number >= self.max_attempts {
            return None;
        }
        usize::try_from(attempt_number - 1).ok().and_then(|i| self.delays.get(i)).copied()
    }
}

impl Default for BackoffSchedule {
    /// The production schedule: 3 attempts, delays of 2s, 4s, 8s.
    fn default() -> Self {
        Self::new(
            3,
            vec![Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(8)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_waits_between_attempts_only() {
        let schedule = BackoffSchedule::default();

        assert_eq!(schedule.max_attempts(), 3);
        assert_eq!(schedule.delay_after(1), Some(Duration::from_secs(2)));
        assert_eq!(schedule.delay_after(2), Some(Duration::from_secs(4)));
        // No sleep after the final attempt.
        assert_eq!(schedule.delay_after(3), None);
        assert_eq!(schedule.delay_after(4), None);
    }

    #[test]
    fn single_attempt_schedule_never_sleeps() {
        let schedule = BackoffSchedule::new(1, vec![Duration::from_secs(2)]);
        assert_eq!(schedule.delay_after(1), None);
    }

    #[test]
    fn out_of_range_attempts_yield_no_delay() {
        let schedule = BackoffSchedule::default();
        assert_eq!(schedule.delay_after(0), None);
        assert_eq!(schedule.delay_after(-1), None);
    }

    #[test]
    fn attempt_budget_floor_is_one() {
        assert_eq!(BackoffSchedule::new(0, vec![]).max_attempts(), 1);
    }
}
