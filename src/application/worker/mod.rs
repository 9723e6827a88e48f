//! Background refresh worker.
//!
//! A single consumer drains the refresh queue one keyword per tick and runs
//! two periodic sweeps: stale feeds are queued again, feeds nobody has read
//! recently are evicted. The worker owns its scheduler and retry bookkeeping,
//! so exactly one instance may run per queue.

mod retry;
mod scheduler;

use metrics::counter;
use time::{Duration, OffsetDateTime};
use tracing::{debug, error, info, warn};

use crate::application::engine::{EngineError, RefreshEngine};
use crate::config::WorkerSettings;

pub use retry::{FailureOutcome, RetryPolicy, RetryTracker};
pub use scheduler::{Cadences, Scheduler, Task, Timer};

const METRIC_RETRY: &str = "eksirss_retry_total";
const METRIC_DEAD_LETTER: &str = "eksirss_dead_letter_total";
const METRIC_STALE_ENQUEUED: &str = "eksirss_stale_enqueued_total";
const METRIC_EVICTED: &str = "eksirss_evicted_total";

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub cadences: Cadences,
    /// A feed whose last read is older than this is evicted.
    pub inactive_after: Duration,
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cadences: Cadences {
                drain: Duration::seconds(10),
                stale_sweep: Duration::hours(6),
                inactivity_sweep: Duration::hours(24),
            },
            inactive_after: Duration::hours(24),
            retry: RetryPolicy::default(),
        }
    }
}

impl TryFrom<&WorkerSettings> for WorkerConfig {
    type Error = time::error::ConversionRange;

    fn try_from(settings: &WorkerSettings) -> Result<Self, Self::Error> {
        Ok(Self {
            cadences: Cadences {
                drain: Duration::try_from(settings.task_interval)?,
                stale_sweep: Duration::try_from(settings.stale_sweep_interval)?,
                inactivity_sweep: Duration::try_from(settings.inactivity_sweep_interval)?,
            },
            inactive_after: Duration::try_from(settings.inactive_after)?,
            retry: RetryPolicy {
                base: Duration::try_from(settings.retry_base)?,
                max: Duration::try_from(settings.retry_max)?,
                max_attempts: settings.retry_max_attempts,
            },
        })
    }
}

/// Result of one drain step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Idle,
    Refreshed { keyword: String, entries: usize },
    Deferred { keyword: String },
    Retrying { keyword: String, attempt: u32 },
    DeadLettered { keyword: String },
}

/// What a call to [`RefreshWorker::run_due`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub drained: Option<DrainOutcome>,
    pub stale_enqueued: Option<usize>,
    pub evicted: Option<usize>,
}

pub struct RefreshWorker {
    engine: RefreshEngine,
    config: WorkerConfig,
    scheduler: Scheduler,
    retries: RetryTracker,
}

impl RefreshWorker {
    pub fn new(engine: RefreshEngine, config: WorkerConfig) -> Self {
        let start = engine.clock().now();
        Self {
            scheduler: Scheduler::new(config.cadences, start),
            retries: RetryTracker::new(config.retry),
            engine,
            config,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn retries(&self) -> &RetryTracker {
        &self.retries
    }

    /// Run forever, sleeping until the next timer is due.
    pub async fn run(mut self) {
        info!(
            drain_secs = self.config.cadences.drain.whole_seconds(),
            stale_sweep_secs = self.config.cadences.stale_sweep.whole_seconds(),
            inactivity_sweep_secs = self.config.cadences.inactivity_sweep.whole_seconds(),
            "refresh worker started"
        );

        loop {
            let now = self.engine.clock().now();
            self.run_due(now).await;

            let wait = self.scheduler.next_due() - self.engine.clock().now();
            if let Ok(wait) = std::time::Duration::try_from(wait) {
                tokio::time::sleep(wait).await;
            }
        }
    }

    /// Execute every task due at `now`. Errors are logged, never returned,
    /// and each executed task's watermark advances regardless of outcome.
    pub async fn run_due(&mut self, now: OffsetDateTime) -> CycleReport {
        let mut report = CycleReport::default();

        for task in self.scheduler.due(now) {
            match task {
                Task::Drain => {
                    report.drained = Some(self.drain_one(now).await);
                }
                Task::StaleSweep => match self.stale_sweep(now).await {
                    Ok(count) => report.stale_enqueued = Some(count),
                    Err(err) => error!(task = task.as_str(), error = %err, "sweep failed"),
                },
                Task::InactivitySweep => match self.inactivity_sweep(now).await {
                    Ok(count) => report.evicted = Some(count),
                    Err(err) => error!(task = task.as_str(), error = %err, "sweep failed"),
                },
            }
            self.scheduler.mark_ran(task, now);
        }

        report
    }

    /// Pop one keyword and refresh it.
    ///
    /// Keywords still backing off are set aside and the queue is popped
    /// again, so a failing topic never holds up the others. Everything set
    /// aside is pushed back before returning.
    ///
    /// A failed keyword goes back on the queue unless it has exhausted its
    /// attempts; the stored feed and rendered response are left as they were.
    pub async fn drain_one(&mut self, now: OffsetDateTime) -> DrainOutcome {
        let mut deferred = Vec::new();
        let next = self.pop_ready(now, &mut deferred).await;
        for keyword in &deferred {
            self.push_back(keyword).await;
        }

        let Some(keyword) = next else {
            return match deferred.into_iter().next() {
                Some(keyword) => DrainOutcome::Deferred { keyword },
                None => DrainOutcome::Idle,
            };
        };

        match self.engine.refresh(&keyword).await {
            Ok(feed) => {
                self.retries.record_success(&keyword);
                let entries = feed.content.len();
                info!(keyword = %keyword, entries, outcome = "refreshed", "refreshed feed");
                DrainOutcome::Refreshed { keyword, entries }
            }
            Err(err) => self.handle_failure(keyword, err, now).await,
        }
    }

    async fn handle_failure(
        &mut self,
        keyword: String,
        err: EngineError,
        now: OffsetDateTime,
    ) -> DrainOutcome {
        match self.retries.record_failure(&keyword, now) {
            FailureOutcome::Retry { attempt, retry_at } => {
                counter!(METRIC_RETRY).increment(1);
                warn!(
                    keyword = %keyword,
                    attempt,
                    retry_in_secs = (retry_at - now).whole_seconds(),
                    error = %err,
                    outcome = "retry",
                    "refresh failed; keyword re-queued"
                );
                self.push_back(&keyword).await;
                DrainOutcome::Retrying { keyword, attempt }
            }
            FailureOutcome::DeadLetter { attempts } => {
                counter!(METRIC_DEAD_LETTER).increment(1);
                error!(
                    keyword = %keyword,
                    attempt = attempts,
                    error = %err,
                    outcome = "dead_letter",
                    "refresh failed too often; keyword dropped from rotation"
                );
                DrainOutcome::DeadLettered { keyword }
            }
        }
    }

    /// Pop until a keyword outside its backoff window turns up. Popped
    /// keywords leave the queue, so this ends once the queue is empty.
    async fn pop_ready(
        &self,
        now: OffsetDateTime,
        deferred: &mut Vec<String>,
    ) -> Option<String> {
        let store = self.engine.store().clone();
        loop {
            let keyword = match store.queue_pop_any().await {
                Ok(Some(keyword)) => keyword,
                Ok(None) => return None,
                Err(err) => {
                    error!(error = %err, "failed to pop refresh queue");
                    return None;
                }
            };

            match self.retries.deferred_until(&keyword, now) {
                Some(retry_at) => {
                    debug!(keyword = %keyword, retry_at = %retry_at, "refresh deferred by backoff");
                    deferred.push(keyword);
                }
                None => return Some(keyword),
            }
        }
    }

    async fn push_back(&self, keyword: &str) {
        if let Err(err) = self.engine.store().queue_push(keyword).await {
            error!(keyword, error = %err, "failed to re-queue keyword");
        }
    }

    /// Queue every stored feed older than the staleness horizon.
    pub async fn stale_sweep(&mut self, now: OffsetDateTime) -> Result<usize, EngineError> {
        let store = self.engine.store().clone();
        let horizon = self.engine.policy().stale_after;
        let mut enqueued = 0;

        for keyword in store.all_keywords().await? {
            let Some(feed) = store.get_feed(&keyword).await? else {
                continue;
            };
            if feed.is_stale(now, horizon) {
                store.queue_push(&keyword).await?;
                enqueued += 1;
            }
        }

        counter!(METRIC_STALE_ENQUEUED).increment(enqueued as u64);
        info!(count = enqueued, task = "stale_sweep", "stale sweep finished");
        Ok(enqueued)
    }

    /// Evict every stored feed without a read inside the inactivity horizon.
    pub async fn inactivity_sweep(&mut self, now: OffsetDateTime) -> Result<usize, EngineError> {
        let store = self.engine.store().clone();
        let mut evicted = 0;

        for keyword in store.all_keywords().await? {
            let active = match store.get_last_hit(&keyword).await? {
                Some(hit) => now - hit <= self.config.inactive_after,
                None => false,
            };
            if active {
                continue;
            }

            store.delete_feed(&keyword).await?;
            self.engine.cache().invalidate(&keyword);
            self.retries.forget(&keyword);
            evicted += 1;
            debug!(keyword = %keyword, "evicted inactive feed");
        }

        counter!(METRIC_EVICTED).increment(evicted as u64);
        info!(count = evicted, task = "inactivity_sweep", "inactivity sweep finished");
        Ok(evicted)
    }
}
