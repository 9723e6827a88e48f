//! Per-keyword failure accounting for background refreshes.

use std::collections::HashMap;
use std::num::NonZeroU32;

use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
    /// Failures after which a keyword is dropped from the rotation.
    /// `None` retries forever.
    pub max_attempts: Option<NonZeroU32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::seconds(10),
            max: Duration::hours(1),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Wait before the next attempt after `failures` consecutive failures.
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = (failures - 1).min(30);
        self.base.saturating_mul(1_i32 << exponent).min(self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RetryState {
    failures: u32,
    retry_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Retry {
        attempt: u32,
        retry_at: OffsetDateTime,
    },
    DeadLetter {
        attempts: u32,
    },
}

#[derive(Debug, Default)]
pub struct RetryTracker {
    policy: RetryPolicy,
    states: HashMap<String, RetryState>,
}

impl RetryTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            states: HashMap::new(),
        }
    }

    /// The instant before which `keyword` must not be fetched again, if any.
    pub fn deferred_until(&self, keyword: &str, now: OffsetDateTime) -> Option<OffsetDateTime> {
        self.states
            .get(keyword)
            .map(|state| state.retry_at)
            .filter(|retry_at| *retry_at > now)
    }

    pub fn record_failure(&mut self, keyword: &str, now: OffsetDateTime) -> FailureOutcome {
        let failures = self
            .states
            .get(keyword)
            .map_or(1, |state| state.failures.saturating_add(1));

        if let Some(limit) = self.policy.max_attempts
            && failures >= limit.get()
        {
            self.states.remove(keyword);
            return FailureOutcome::DeadLetter { attempts: failures };
        }

        let retry_at = now + self.policy.delay_for(failures);
        self.states
            .insert(keyword.to_string(), RetryState { failures, retry_at });
        FailureOutcome::Retry {
            attempt: failures,
            retry_at,
        }
    }

    pub fn record_success(&mut self, keyword: &str) {
        self.states.remove(keyword);
    }

    pub fn forget(&mut self, keyword: &str) {
        self.states.remove(keyword);
    }

    pub fn failures(&self, keyword: &str) -> u32 {
        self.states.get(keyword).map_or(0, |state| state.failures)
    }
}
