use std::time::Duration;

use thiserror::Error;

use crate::outcome::EntityKind;

/// Daily allowance of the remote service and how to wait out its reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSettings {
    pub budget: u64,
    /// Headroom kept free below `budget`; must exceed the dearest request.
    pub safety_margin: u64,
    pub reset_window: Duration,
    /// Extra wait on top of `reset_window` so the service has surely reset.
    pub reset_grace: Duration,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            budget: 10_000,
            safety_margin: EntityKind::max_cost() + 1,
            reset_window: Duration::from_secs(24 * 60 * 60),
            reset_grace: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaConfigError {
    #[error("quota budget {budget} must be larger than the safety margin {safety_margin}")]
    BudgetBelowMargin { budget: u64, safety_margin: u64 },
    #[error("safety margin {safety_margin} must be larger than the most expensive request ({max_cost})")]
    MarginTooSmall { safety_margin: u64, max_cost: u64 },
}

/// Snapshot of the tracker for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    pub spent: u64,
    pub budget: u64,
    pub safety_margin: u64,
    pub reset_window: Duration,
}

/// Serialized spend counter against the shared daily budget.
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    spent: u64,
    settings: QuotaSettings,
}

impl QuotaTracker {
    pub fn new(settings: QuotaSettings) -> Result<Self, QuotaConfigError> {
        let max_cost = EntityKind::max_cost();
        if settings.safety_margin <= max_cost {
            return Err(QuotaConfigError::MarginTooSmall {
                safety_margin: settings.safety_margin,
                max_cost,
            });
        }
        if settings.budget <= settings.safety_margin {
            return Err(QuotaConfigError::BudgetBelowMargin {
                budget: settings.budget,
                safety_margin: settings.safety_margin,
            });
        }
        Ok(Self { spent: 0, settings })
    }

    pub fn charge(&mut self, cost: u64) {
        self.spent = self.spent.saturating_add(cost);
    }

    /// True when the next request could eat into the safety margin.
    /// Evaluate before every request.
    pub fn should_checkpoint(&self) -> bool {
        self.spent.saturating_add(self.settings.safety_margin) >= self.settings.budget
    }

    pub fn reset(&mut self) {
        self.spent = 0;
    }

    pub fn spent(&self) -> u64 {
        self.spent
    }

    /// Full wait for the service's budget to come back.
    pub fn reset_wait(&self) -> Duration {
        self.settings.reset_window + self.settings.reset_grace
    }

    pub fn state(&self) -> QuotaState {
        QuotaState {
            spent: self.spent,
            budget: self.settings.budget,
            safety_margin: self.settings.safety_margin,
            reset_window: self.settings.reset_window,
        }
    }
}
