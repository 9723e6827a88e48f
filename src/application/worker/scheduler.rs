//! Timers for the worker's three cadences.

use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Drain,
    StaleSweep,
    InactivitySweep,
}

impl Task {
    pub const ALL: [Task; 3] = [Task::Drain, Task::StaleSweep, Task::InactivitySweep];

    pub fn as_str(self) -> &'static str {
        match self {
            Task::Drain => "drain",
            Task::StaleSweep => "stale_sweep",
            Task::InactivitySweep => "inactivity_sweep",
        }
    }
}

/// A fixed cadence with a "last ran" watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    interval: Duration,
    last_ran: Option<OffsetDateTime>,
    next_due: OffsetDateTime,
}

impl Timer {
    /// Timer that fires at `start` and every `interval` after each run.
    pub fn immediate(interval: Duration, start: OffsetDateTime) -> Self {
        Self {
            interval,
            last_ran: None,
            next_due: start,
        }
    }

    /// Timer whose first run is one full interval after `start`.
    pub fn delayed(interval: Duration, start: OffsetDateTime) -> Self {
        Self {
            interval,
            last_ran: None,
            next_due: start + interval,
        }
    }

    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        now >= self.next_due
    }

    pub fn mark_ran(&mut self, now: OffsetDateTime) {
        self.last_ran = Some(now);
        self.next_due = now + self.interval;
    }

    pub fn last_ran(&self) -> Option<OffsetDateTime> {
        self.last_ran
    }

    pub fn next_due(&self) -> OffsetDateTime {
        self.next_due
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Cadences {
    pub drain: Duration,
    pub stale_sweep: Duration,
    pub inactivity_sweep: Duration,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    drain: Timer,
    stale_sweep: Timer,
    inactivity_sweep: Timer,
}

impl Scheduler {
    /// Draining starts right away; sweeps wait one interval.
    pub fn new(cadences: Cadences, start: OffsetDateTime) -> Self {
        Self {
            drain: Timer::immediate(cadences.drain, start),
            stale_sweep: Timer::delayed(cadences.stale_sweep, start),
            inactivity_sweep: Timer::delayed(cadences.inactivity_sweep, start),
        }
    }

    pub fn timer(&self, task: Task) -> &Timer {
        match task {
            Task::Drain => &self.drain,
            Task::StaleSweep => &self.stale_sweep,
            Task::InactivitySweep => &self.inactivity_sweep,
        }
    }

    fn timer_mut(&mut self, task: Task) -> &mut Timer {
        match task {
            Task::Drain => &mut self.drain,
            Task::StaleSweep => &mut self.stale_sweep,
            Task::InactivitySweep => &mut self.inactivity_sweep,
        }
    }

    /// Tasks due at `now`, in execution order.
    pub fn due(&self, now: OffsetDateTime) -> Vec<Task> {
        Task::ALL
            .into_iter()
            .filter(|task| self.timer(*task).is_due(now))
            .collect()
    }

    pub fn mark_ran(&mut self, task: Task, now: OffsetDateTime) {
        self.timer_mut(task).mark_ran(now);
    }

    /// Earliest instant at which any timer becomes due.
    pub fn next_due(&self) -> OffsetDateTime {
        Task::ALL
            .into_iter()
            .map(|task| self.timer(task).next_due())
            .min()
            .unwrap_or(self.drain.next_due)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    const START: OffsetDateTime = datetime!(2024-06-01 00:00 UTC);

    fn scheduler() -> Scheduler {
        Scheduler::new(
            Cadences {
                drain: Duration::seconds(10),
                stale_sweep: Duration::hours(6),
                inactivity_sweep: Duration::hours(24),
            },
            START,
        )
    }

    #[test]
    fn only_drain_is_due_at_start() {
        let scheduler = scheduler();
        assert_eq!(scheduler.due(START), vec![Task::Drain]);
        assert_eq!(scheduler.next_due(), START);
    }

    #[test]
    fn drain_waits_one_interval_after_running() {
        let mut scheduler = scheduler();
        scheduler.mark_ran(Task::Drain, START);

        assert!(scheduler.due(START + Duration::seconds(9)).is_empty());
        assert_eq!(scheduler.due(START + Duration::seconds(10)), vec![Task::Drain]);
        assert_eq!(scheduler.next_due(), START + Duration::seconds(10));
        assert_eq!(scheduler.timer(Task::Drain).last_ran(), Some(START));
    }

    #[test]
    fn sweeps_fire_on_their_own_cadence() {
        let mut scheduler = scheduler();
        let six_hours = START + Duration::hours(6);

        assert_eq!(
            scheduler.due(six_hours),
            vec![Task::Drain, Task::StaleSweep]
        );
        scheduler.mark_ran(Task::StaleSweep, six_hours);
        assert!(!scheduler.timer(Task::StaleSweep).is_due(START + Duration::hours(11)));

        let day = START + Duration::hours(24);
        assert_eq!(
            scheduler.due(day),
            vec![Task::Drain, Task::StaleSweep, Task::InactivitySweep]
        );
    }

    #[test]
    fn late_run_moves_the_watermark_forward() {
        let mut scheduler = scheduler();
        let late = START + Duration::hours(9);

        scheduler.mark_ran(Task::StaleSweep, late);

        assert_eq!(
            scheduler.timer(Task::StaleSweep).next_due(),
            late + Duration::hours(6)
        );
    }
}
