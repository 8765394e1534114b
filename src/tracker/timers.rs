use std::time::Duration;

use tokio::time::Instant;

use crate::utils::clock::Clock;

/// Identifies a schedule created by [Timers::schedule].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct Schedule {
    handle: TimerHandle,
    period: Duration,
    next: Instant,
}

/// Fixed period schedules multiplexed onto one event loop. Nothing runs on its own: the owner
/// waits with [Timers::sleep_until_next] and then drains [Timers::pop_due].
#[derive(Debug, Default)]
pub struct Timers {
    next_id: u64,
    schedules: Vec<Schedule>,
}

impl Timers {
    /// First firing happens one `period` after `now`.
    pub fn schedule(&mut self, now: Instant, period: Duration) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.schedules.push(Schedule {
            handle,
            period,
            next: now + period,
        });
        handle
    }

    /// Returns false if the handle was already cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.schedules.len();
        self.schedules.retain(|v| v.handle != handle);
        before != self.schedules.len()
    }

    pub fn is_scheduled(&self, handle: TimerHandle) -> bool {
        self.schedules.iter().any(|v| v.handle == handle)
    }

    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.schedules.iter().map(|v| v.next).min()
    }

    /// Resolves when the earliest schedule is due. Never resolves without schedules.
    pub async fn sleep_until_next(&self, clock: &dyn Clock) {
        match self.next_deadline() {
            Some(deadline) => clock.sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    /// Takes the earliest due schedule, ties going to the older one, and moves it to its next
    /// deadline. A schedule that fell more than a period behind fires once and realigns to `now`
    /// instead of replaying every missed deadline.
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerHandle> {
        let schedule = self
            .schedules
            .iter_mut()
            .filter(|v| v.next <= now)
            .min_by_key(|v| (v.next, v.handle))?;

        schedule.next += schedule.period;
        if schedule.next < now {
            schedule.next = now + schedule.period;
        }
        Some(schedule.handle)
    }
}
