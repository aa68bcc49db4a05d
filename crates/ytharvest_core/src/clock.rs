use std::cell::{Cell, RefCell};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};

/// Source of wall-clock time and of blocking waits.
///
/// Both retry backoff and the quota reset wait go through this trait, so a
/// harvest can be driven through days of simulated time in tests.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Local time and real, uninterruptible thread sleeps.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Simulated clock: `sleep` returns immediately, advances `now` and is
/// recorded.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<NaiveDateTime>,
    sleeps: RefCell<Vec<Duration>>,
}

impl ManualClock {
    /// Clock starting at 1970-01-01T00:00:00.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(now: NaiveDateTime) -> Self {
        Self {
            now: Cell::new(now),
            sleeps: RefCell::new(Vec::new()),
        }
    }

    /// Every requested sleep, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps.borrow().iter().sum()
    }

    pub fn advance(&self, duration: Duration) {
        let Ok(delta) = chrono::Duration::from_std(duration) else {
            return;
        };
        if let Some(next) = self.now.get().checked_add_signed(delta) {
            self.now.set(next);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.advance(duration);
    }
}
