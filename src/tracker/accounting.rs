use std::time::Duration;

use chrono::NaiveDate;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::utils::time::date_key;

use super::{
    activity::ActivityMonitor,
    context::ContextResolver,
    storage::stats_store::StatsStore,
    timers::{TimerHandle, Timers},
};

/// State of a running session. Project and day are fixed when the session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub project: String,
    pub date_key: String,
    pub timer: TimerHandle,
    /// Time accrued by this session alone.
    pub accrued: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClockState {
    #[default]
    Stopped,
    Running(ActiveSession),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { project: String, date_key: String },
    AlreadyRunning { project: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    NotRunning,
    /// The tick was consumed without adding time.
    Idle,
    /// `day_total_ms` is the session bucket after accrual.
    Accrued { day_total_ms: u64 },
}

/// Settings of [AccountingClock].
#[derive(Debug, Clone, Copy)]
pub struct AccountingSettings {
    pub tick_period: Duration,
    pub idle_threshold: Duration,
    /// Re-key a running session to the new day after midnight.
    pub roll_over_midnight: bool,
    /// Merge what other instances stored before every accrual.
    pub refresh_before_accrual: bool,
}

/// Tick driven state machine that turns non idle ticks into accrued time.
pub struct AccountingClock {
    settings: AccountingSettings,
    state: ClockState,
}

impl AccountingClock {
    pub fn new(settings: AccountingSettings) -> Self {
        Self {
            settings,
            state: ClockState::Stopped,
        }
    }

    pub fn state(&self) -> &ClockState {
        &self.state
    }

    pub fn session(&self) -> Option<&ActiveSession> {
        match &self.state {
            ClockState::Running(session) => Some(session),
            ClockState::Stopped => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.session().is_some()
    }

    pub fn owns(&self, handle: TimerHandle) -> bool {
        self.session().is_some_and(|v| v.timer == handle)
    }

    /// Starts a session unless one is already running, so repeated starts never stack timers.
    pub fn start(
        &mut self,
        context: &dyn ContextResolver,
        store: &mut StatsStore,
        timers: &mut Timers,
        now: Instant,
        today: NaiveDate,
    ) -> StartOutcome {
        if let ClockState::Running(session) = &self.state {
            debug!("Tracking is already running for {}", session.project);
            return StartOutcome::AlreadyRunning {
                project: session.project.clone(),
            };
        }

        let project = context.project_name();
        let date_key = date_key(today);
        store.ensure_bucket(&project, &date_key);
        store.persist();

        let timer = timers.schedule(now, self.settings.tick_period);
        info!("Started tracking {project} for {date_key}");
        self.state = ClockState::Running(ActiveSession {
            project: project.clone(),
            date_key: date_key.clone(),
            timer,
            accrued: Duration::ZERO,
        });
        StartOutcome::Started { project, date_key }
    }

    /// Adds one tick to the session unless the user is idle.
    pub async fn on_tick(
        &mut self,
        activity: &ActivityMonitor,
        context: &dyn ContextResolver,
        store: &mut StatsStore,
        now: Instant,
        today: NaiveDate,
    ) -> TickOutcome {
        let settings = self.settings;
        let ClockState::Running(session) = &mut self.state else {
            return TickOutcome::NotRunning;
        };

        if activity.is_idle(now, settings.idle_threshold) {
            trace!("User is idle, skipping tick");
            return TickOutcome::Idle;
        }

        if settings.roll_over_midnight {
            let today_key = date_key(today);
            if today_key != session.date_key {
                info!("Day changed, moving {} to {today_key}", session.project);
                store.ensure_bucket(&session.project, &today_key);
                session.date_key = today_key;
            }
        }

        if settings.refresh_before_accrual {
            store.refresh().await;
        }

        let tick_ms = settings.tick_period.as_millis() as u64;
        let extension = context.active_extension();
        let day_total_ms = store
            .accrue(
                &session.project,
                &session.date_key,
                tick_ms,
                extension.as_deref(),
            )
            .total_time;
        session.accrued += settings.tick_period;
        store.persist();

        trace!("Accrued {tick_ms}ms for {:?}", extension);
        TickOutcome::Accrued { day_total_ms }
    }

    /// Ends the session and returns it. Time since the last tick is dropped.
    pub fn stop(&mut self, timers: &mut Timers) -> Option<ActiveSession> {
        match std::mem::take(&mut self.state) {
            ClockState::Running(session) => {
                timers.cancel(session.timer);
                info!(
                    "Stopped tracking {} after {:?}",
                    session.project, session.accrued
                );
                Some(session)
            }
            ClockState::Stopped => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, sync::Arc, time::Duration};

    use chrono::NaiveDate;
    use tokio::time::Instant;

    use crate::{
        tracker::{
            activity::ActivityMonitor,
            context::{EditorContext, UNKNOWN_PROJECT},
            storage::{backend::MemoryBackend, entities::FileStats, stats_store::StatsStore},
            timers::Timers,
        },
        utils::time::date_key,
    };

    use super::{AccountingClock, AccountingSettings, StartOutcome, TickOutcome};

    const PERIOD: Duration = Duration::from_secs(1);

    fn settings() -> AccountingSettings {
        AccountingSettings {
            tick_period: PERIOD,
            idle_threshold: Duration::from_secs(30),
            roll_over_midnight: false,
            refresh_before_accrual: true,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 7, 4).unwrap()
    }

    fn typescript_context() -> EditorContext {
        let mut context = EditorContext::new(Some("proj".into()));
        context.set_active_file(Some(PathBuf::from("src/index.ts")));
        context
    }

    async fn empty_store() -> StatsStore {
        StatsStore::load(Arc::new(MemoryBackend::default())).await
    }

    #[tokio::test]
    async fn test_linear_accrual() {
        let start = Instant::now();
        let context = typescript_context();
        let mut store = empty_store().await;
        let mut timers = Timers::default();
        let mut activity = ActivityMonitor::new(start);
        let mut clock = AccountingClock::new(settings());

        clock.start(&context, &mut store, &mut timers, start, today());
        for tick in 1..=12u32 {
            let now = start + PERIOD * tick;
            activity.touch(now);
            clock
                .on_tick(&activity, &context, &mut store, now, today())
                .await;
        }

        let bucket = store.bucket("proj", &date_key(today())).unwrap();
        assert_eq!(bucket.total_time, 12_000);
        assert_eq!(bucket.file_stats, FileStats::from([(".ts", 12_000)]));
        assert_eq!(clock.session().unwrap().accrued, PERIOD * 12);
    }

    #[tokio::test]
    async fn test_idle_tick_changes_nothing() {
        let start = Instant::now();
        let context = typescript_context();
        let mut store = empty_store().await;
        let mut timers = Timers::default();
        let activity = ActivityMonitor::new(start);
        let mut clock = AccountingClock::new(settings());
        clock.start(&context, &mut store, &mut timers, start, today());

        let before = store.data().clone();
        let outcome = clock
            .on_tick(
                &activity,
                &context,
                &mut store,
                start + Duration::from_secs(31),
                today(),
            )
            .await;

        assert_eq!(outcome, TickOutcome::Idle);
        assert_eq!(store.data(), &before);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let start = Instant::now();
        let context = typescript_context();
        let mut store = empty_store().await;
        let mut timers = Timers::default();
        let mut clock = AccountingClock::new(settings());

        let first = clock.start(&context, &mut store, &mut timers, start, today());
        let second = clock.start(&context, &mut store, &mut timers, start, today());

        assert!(matches!(first, StartOutcome::Started { .. }));
        assert_eq!(
            second,
            StartOutcome::AlreadyRunning {
                project: "proj".into()
            }
        );
        assert_eq!(timers.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_cancels_and_ignores_late_ticks() {
        let start = Instant::now();
        let context = typescript_context();
        let mut store = empty_store().await;
        let mut timers = Timers::default();
        let activity = ActivityMonitor::new(start);
        let mut clock = AccountingClock::new(settings());

        clock.start(&context, &mut store, &mut timers, start, today());
        let session = clock.stop(&mut timers).unwrap();
        assert!(!timers.is_scheduled(session.timer));
        assert!(clock.stop(&mut timers).is_none());

        let outcome = clock
            .on_tick(&activity, &context, &mut store, start + PERIOD, today())
            .await;
        assert_eq!(outcome, TickOutcome::NotRunning);
        assert_eq!(store.bucket("proj", &date_key(today())).unwrap().total_time, 0);
    }

    #[tokio::test]
    async fn test_unknown_project_still_accrues() {
        let start = Instant::now();
        let context = EditorContext::default();
        let mut store = empty_store().await;
        let mut timers = Timers::default();
        let activity = ActivityMonitor::new(start);
        let mut clock = AccountingClock::new(settings());

        let outcome = clock.start(&context, &mut store, &mut timers, start, today());
        assert_eq!(
            outcome,
            StartOutcome::Started {
                project: UNKNOWN_PROJECT.into(),
                date_key: date_key(today()),
            }
        );
        // The bucket exists before any tick.
        assert!(store.bucket(UNKNOWN_PROJECT, &date_key(today())).is_some());

        clock
            .on_tick(&activity, &context, &mut store, start + PERIOD, today())
            .await;
        let bucket = store.bucket(UNKNOWN_PROJECT, &date_key(today())).unwrap();
        assert_eq!(bucket.total_time, 1000);
        assert!(bucket.file_stats.is_empty());
    }

    #[tokio::test]
    async fn test_day_is_fixed_unless_rolling_over() {
        let start = Instant::now();
        let tomorrow = today().succ_opt().unwrap();
        let context = typescript_context();
        let activity = ActivityMonitor::new(start);

        for roll_over_midnight in [false, true] {
            let mut store = empty_store().await;
            let mut timers = Timers::default();
            let mut clock = AccountingClock::new(AccountingSettings {
                roll_over_midnight,
                ..settings()
            });
            clock.start(&context, &mut store, &mut timers, start, today());
            clock
                .on_tick(&activity, &context, &mut store, start + PERIOD, tomorrow)
                .await;

            let expected_day = if roll_over_midnight { tomorrow } else { today() };
            assert_eq!(
                store.bucket("proj", &date_key(expected_day)).map(|v| v.total_time),
                Some(1000)
            );
            assert_eq!(clock.session().unwrap().date_key, date_key(expected_day));
        }
    }
}
