use std::time::Duration;

use serde::{Deserialize, Serialize};
use ytharvest_logging::{harvest_debug, harvest_warn};

use crate::clock::Clock;
use crate::outcome::{EntityKind, FailureClass, FetchOutcome, Fetched, GivenUp, RetryOutcome};

/// Staged waits between attempts: a run of short waits, then a run of long
/// ones, then give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSchedule {
    pub short_delay: Duration,
    pub short_attempts: u32,
    pub long_delay: Duration,
    pub long_attempts: u32,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            short_delay: Duration::from_secs(60),
            short_attempts: 5,
            long_delay: Duration::from_secs(600),
            long_attempts: 1,
        }
    }
}

impl BackoffSchedule {
    /// Wait before the next attempt, after `failures` (at least one) failed
    /// attempts. `None` once the schedule is exhausted.
    pub fn delay_after(&self, failures: u32) -> Option<Duration> {
        if failures <= self.short_attempts {
            Some(self.short_delay)
        } else if failures <= self.short_attempts.saturating_add(self.long_attempts) {
            Some(self.long_delay)
        } else {
            None
        }
    }

    /// Upper bound on calls for one fetch: the first attempt plus one per
    /// scheduled wait.
    pub fn max_calls(&self) -> u32 {
        self.short_attempts
            .saturating_add(self.long_attempts)
            .saturating_add(1)
    }
}

/// What to do when the service answers with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HardFailurePolicy {
    /// Retry on the same schedule as transport failures.
    #[default]
    Retry,
    /// Give up on the first protocol failure.
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub schedule: BackoffSchedule,
    pub hard_failures: HardFailurePolicy,
}

impl RetryPolicy {
    fn retries(&self, class: FailureClass) -> bool {
        match class {
            FailureClass::Soft => true,
            FailureClass::Hard => self.hard_failures == HardFailurePolicy::Retry,
        }
    }

    /// Call `op` until it succeeds, the schedule runs out, or the failure
    /// class is not retried. Waits block through `clock`.
    pub fn run<C, F>(&self, kind: EntityKind, id: &str, clock: &C, mut op: F) -> RetryOutcome
    where
        C: Clock + ?Sized,
        F: FnMut() -> Fetched,
    {
        let mut failures = 0u32;
        loop {
            let attempt = failures + 1;
            let Fetched { outcome, cost } = op();
            let (class, reason) = match outcome {
                FetchOutcome::Success(payload) => {
                    return RetryOutcome::Success {
                        payload,
                        cost,
                        attempts: attempt,
                    }
                }
                FetchOutcome::SoftFailure(reason) => (FailureClass::Soft, reason),
                FetchOutcome::HardFailure(reason) => (FailureClass::Hard, reason),
            };
            failures = attempt;
            harvest_warn!(
                "Request error for {} {} (attempt {} of {}, {}): {}",
                kind,
                id,
                attempt,
                self.schedule.max_calls(),
                class,
                reason
            );

            let delay = if self.retries(class) {
                self.schedule.delay_after(failures)
            } else {
                None
            };
            let Some(delay) = delay else {
                return RetryOutcome::GivenUp(GivenUp {
                    kind,
                    id: id.to_string(),
                    attempts: attempt,
                    class,
                    reason,
                });
            };
            harvest_debug!("Retrying {} {} in {:?}", kind, id, delay);
            clock.sleep(delay);
        }
    }
}
