use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    host::{reader::HostReader, writer::HostWriter, HostEvent, HostMessage},
    utils::{
        clock::{Clock, DefaultClock},
        time::{date_key, format_minutes},
    },
};

use accounting::{AccountingClock, ClockState, StartOutcome, TickOutcome};
use activity::ActivityMonitor;
use args::{TrackerArgs, TrackerConfig};
use context::{ContextResolver, EditorContext};
use report::{heartbeat_text, status_text, ProjectReport, ReportKind, ReportScheduler};
use storage::{backend::JsonFileBackend, stats_store::StatsStore};
use timers::{TimerHandle, Timers};

pub mod accounting;
pub mod activity;
pub mod args;
pub mod context;
pub mod report;
pub mod shutdown;
pub mod storage;
pub mod timers;

pub const STATS_FILE: &str = "stats.json";

/// Runs `codeclock serve`: the host talks to us through stdin and stdout until it closes its
/// input or the process is interrupted.
pub async fn start_tracker(dir: PathBuf, args: TrackerArgs) -> Result<()> {
    let backend = Arc::new(JsonFileBackend::new(dir.join(STATS_FILE))?);
    let store = StatsStore::load(backend).await;

    let (output_sender, output_receiver) = mpsc::channel::<HostMessage>(64);
    let (event_sender, event_receiver) = mpsc::channel::<HostEvent>(64);
    let shutdown_token = CancellationToken::new();

    let persistence = store.persistence(Some(output_sender.clone()));
    let session = TrackerSession::new(
        TrackerConfig::from(&args),
        Box::new(DefaultClock),
        store,
        EditorContext::new(args.project.clone()),
        output_sender,
    );
    let reader = HostReader::new(tokio::io::stdin(), event_sender, shutdown_token.clone());
    let writer = HostWriter::new(output_receiver, tokio::io::stdout());

    let (_, reader_result, session_result, persistence_result, writer_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        reader.run(),
        session.run(event_receiver, shutdown_token.clone()),
        persistence.run(),
        writer.run(),
    );

    if let Err(e) = reader_result {
        error!("Host reader got an error {e:?}");
    }
    if let Err(e) = session_result {
        error!("Tracker got an error {e:?}");
    }
    if let Err(e) = persistence_result {
        error!("Persistence got an error {e:?}");
    }
    if let Err(e) = writer_result {
        error!("Host writer got an error {e:?}");
    }

    Ok(())
}

/// Everything one tracking session needs, owned in one place. All mutation happens on the loop
/// in [TrackerSession::run], so nothing here is shared or locked.
pub struct TrackerSession {
    config: TrackerConfig,
    clock: Box<dyn Clock>,
    activity: ActivityMonitor,
    accounting: AccountingClock,
    reports: ReportScheduler,
    store: StatsStore,
    context: EditorContext,
    timers: Timers,
    output: mpsc::Sender<HostMessage>,
}

impl TrackerSession {
    pub fn new(
        config: TrackerConfig,
        clock: Box<dyn Clock>,
        store: StatsStore,
        context: EditorContext,
        output: mpsc::Sender<HostMessage>,
    ) -> Self {
        Self {
            activity: ActivityMonitor::new(clock.instant()),
            accounting: AccountingClock::new(config.accounting()),
            reports: ReportScheduler::new(config.report_period, config.heartbeat_period),
            timers: Timers::default(),
            config,
            clock,
            store,
            context,
            output,
        }
    }

    pub fn state(&self) -> &ClockState {
        self.accounting.state()
    }

    pub fn store(&self) -> &StatsStore {
        &self.store
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    /// Executes the tracker event loop.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<HostEvent>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        if self.config.autostart {
            self.start();
        }

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                _ = self.timers.sleep_until_next(self.clock.as_ref()) => self.fire_due().await,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        info!("Host is gone");
                        break;
                    }
                },
            }
        }

        // The partial tick is dropped; accrued time is already queued for persistence.
        self.reports.stop(&mut self.timers);
        self.accounting.stop(&mut self.timers);
        shutdown.cancel();
        Ok(())
    }

    pub fn handle_event(&mut self, event: HostEvent) {
        if event.is_activity() {
            self.activity.touch(self.clock.instant());
        }

        match event {
            HostEvent::TextChanged | HostEvent::WindowFocused => {}
            HostEvent::EditorChanged { file } => self.context.set_active_file(file),
            HostEvent::WorkspaceChanged { name } => {
                self.context.set_workspace(name);
                if self.accounting.is_running() {
                    debug!("Workspace changed, the running session keeps its project");
                }
            }
            HostEvent::Start => self.start(),
            HostEvent::Stop => self.stop(),
            HostEvent::ShowSession => self.show_session(),
            HostEvent::ShowStats => self.show_stats(),
        }
    }

    pub fn start(&mut self) {
        let now = self.clock.instant();
        // Asking to start counts as being at the keyboard.
        self.activity.touch(now);

        let outcome = self.accounting.start(
            &self.context,
            &mut self.store,
            &mut self.timers,
            now,
            self.clock.local_date(),
        );
        match outcome {
            StartOutcome::Started { project, date_key } => {
                self.reports.start(&mut self.timers, now);
                let day_total_ms = self
                    .store
                    .bucket(&project, &date_key)
                    .map_or(0, |v| v.total_time);
                self.notify(HostMessage::info(format!("Started tracking {project}.")));
                self.notify(HostMessage::status(status_text(day_total_ms)));
            }
            StartOutcome::AlreadyRunning { project } => {
                self.notify(HostMessage::info(format!("Already tracking {project}.")));
            }
        }
    }

    pub fn stop(&mut self) {
        self.reports.stop(&mut self.timers);
        let message = match self.accounting.stop(&mut self.timers) {
            Some(session) => format!(
                "Stopped tracking {} after {} min.",
                session.project,
                format_minutes(session.accrued.as_millis() as u64)
            ),
            None => "Tracking is not running.".to_owned(),
        };
        self.notify(HostMessage::info(message));
    }

    fn show_session(&self) {
        let text = match self.accounting.session() {
            Some(session) => {
                let day_total_ms = self
                    .store
                    .bucket(&session.project, &session.date_key)
                    .map_or(0, |v| v.total_time);
                format!(
                    "Current session in {}: {} min ({} min today).",
                    session.project,
                    format_minutes(session.accrued.as_millis() as u64),
                    format_minutes(day_total_ms)
                )
            }
            None => "Tracking is not running.".to_owned(),
        };
        self.notify(HostMessage::info(text));
    }

    fn show_stats(&self) {
        let project = self.current_project();
        let stats = self.store.read(&project);
        let text = ProjectReport {
            project: &project,
            stats: &stats,
        }
        .to_string();
        self.notify(HostMessage::report(text));
    }

    /// Runs every timer that is due at the clock's current instant.
    pub async fn fire_due(&mut self) {
        let now = self.clock.instant();
        while let Some(handle) = self.timers.pop_due(now) {
            self.on_timer(handle).await;
        }
    }

    async fn on_timer(&mut self, handle: TimerHandle) {
        if self.accounting.owns(handle) {
            let outcome = self
                .accounting
                .on_tick(
                    &self.activity,
                    &self.context,
                    &mut self.store,
                    self.clock.instant(),
                    self.clock.local_date(),
                )
                .await;
            if let TickOutcome::Accrued { day_total_ms } = outcome {
                self.notify(HostMessage::status(status_text(day_total_ms)));
            }
            return;
        }

        match self.reports.kind_of(handle) {
            Some(ReportKind::Summary) => {
                let project = self.current_project();
                let today = date_key(self.clock.local_date());
                let report = ReportScheduler::summarize(&self.store, &project, &today);
                self.notify(HostMessage::report(report.to_string()));
            }
            Some(ReportKind::Heartbeat) => {
                let project = self.current_project();
                let today = date_key(self.clock.local_date());
                let day_total_ms = self.store.bucket(&project, &today).map_or(0, |v| v.total_time);
                self.notify(HostMessage::heartbeat(heartbeat_text(&project, day_total_ms)));
            }
            None => debug!("Ignoring {handle:?}, it no longer belongs to anyone"),
        }
    }

    fn current_project(&self) -> String {
        match self.accounting.session() {
            Some(session) => session.project.clone(),
            None => self.context.project_name(),
        }
    }

    /// Host output never holds up the loop. Status updates are superseded quickly anyway.
    fn notify(&self, message: HostMessage) {
        match self.output.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                debug!("Host output is backed up, dropping {message:?}")
            }
            Err(TrySendError::Closed(_)) => debug!("Host output is closed"),
        }
    }
}

#[cfg(test)]
mod tracker_tests {
    use std::{path::PathBuf, sync::Arc, time::Duration};

    use anyhow::{anyhow, Result};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        host::{HostEvent, HostMessage},
        tracker::{
            accounting::ClockState,
            args::TrackerConfig,
            context::EditorContext,
            storage::{
                backend::{MemoryBackend, MockStatsBackend, StatsBackend},
                entities::FileStats,
                stats_store::StatsStore,
            },
        },
        utils::{
            clock::{test_clock::TestClock, Clock},
            logging::TEST_LOGGING,
            time::date_key,
        },
    };

    use super::TrackerSession;

    const SECOND: Duration = Duration::from_secs(1);

    async fn test_session(
        config: TrackerConfig,
        backend: Arc<dyn StatsBackend>,
        clock: &TestClock,
    ) -> (TrackerSession, mpsc::Receiver<HostMessage>) {
        let store = StatsStore::load(backend).await;
        let (sender, receiver) = mpsc::channel(1024);
        let session = TrackerSession::new(
            config,
            Box::new(clock.clone()),
            store,
            EditorContext::new(Some("proj".into())),
            sender,
        );
        (session, receiver)
    }

    fn drain(receiver: &mut mpsc::Receiver<HostMessage>) -> Vec<HostMessage> {
        let mut messages = vec![];
        while let Ok(message) = receiver.try_recv() {
            messages.push(message);
        }
        messages
    }

    async fn tick(session: &mut TrackerSession) {
        tokio::time::advance(SECOND).await;
        session.fire_due().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_gap_scenario() {
        *TEST_LOGGING;
        let clock = TestClock::new();
        let (mut session, _output) = test_session(
            TrackerConfig::default(),
            Arc::new(MemoryBackend::default()),
            &clock,
        )
        .await;
        let today = date_key(clock.local_date());

        session
            .handle_event(HostEvent::EditorChanged {
                file: Some(PathBuf::from("/work/proj/src/index.ts")),
            });
        session.handle_event(HostEvent::Start);

        for _ in 0..5 {
            tick(&mut session).await;
            session.handle_event(HostEvent::TextChanged);
        }
        let bucket = session.store().bucket("proj", &today).unwrap().clone();
        assert_eq!(bucket.total_time, 5000);
        assert_eq!(bucket.file_stats, FileStats::from([(".ts", 5000)]));

        // 35 seconds without activity, two ticks land in the gap.
        tokio::time::advance(SECOND * 34).await;
        session.fire_due().await;
        tick(&mut session).await;
        let bucket = session.store().bucket("proj", &today).unwrap().clone();
        assert_eq!(bucket.total_time, 5000);
        assert_eq!(bucket.file_stats, FileStats::from([(".ts", 5000)]));

        session.handle_event(HostEvent::TextChanged);
        tick(&mut session).await;
        tick(&mut session).await;
        let bucket = session.store().bucket("proj", &today).unwrap().clone();
        assert_eq!(bucket.total_time, 7000);
        assert_eq!(bucket.file_stats, FileStats::from([(".ts", 7000)]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_ticks_once_per_period() -> Result<()> {
        let clock = TestClock::new();
        let backend = Arc::new(MemoryBackend::default());
        let config = TrackerConfig {
            heartbeat_period: None,
            ..TrackerConfig::default()
        };
        let (session, _output) = test_session(config, backend.clone(), &clock).await;
        let persistence = session.store().persistence(None);

        let (events, receiver) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let driver = async {
            events.send(HostEvent::Start).await?;
            events.send(HostEvent::Start).await?;
            for _ in 0..10 {
                tokio::time::sleep(SECOND).await;
                events.send(HostEvent::TextChanged).await?;
            }
            tokio::time::sleep(SECOND / 2).await;
            shutdown.cancel();
            anyhow::Ok(())
        };

        let (driver_result, session_result, persistence_result) = tokio::join!(
            driver,
            session.run(receiver, shutdown.clone()),
            persistence.run()
        );
        driver_result?;
        session_result?;
        persistence_result?;

        let stored = backend.load().await?.unwrap_or_default();
        let bucket = stored
            .project("proj")
            .and_then(|v| v.day(&date_key(clock.local_date())))
            .cloned()
            .unwrap_or_default();
        assert_eq!(bucket.total_time, 10_000);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_every_timer() {
        let clock = TestClock::new();
        let (mut session, mut output) = test_session(
            TrackerConfig::default(),
            Arc::new(MemoryBackend::default()),
            &clock,
        )
        .await;

        session.handle_event(HostEvent::Start);
        assert!(matches!(session.state(), ClockState::Running(_)));
        // accounting tick, summary and heartbeat
        assert_eq!(session.timers().len(), 3);

        tick(&mut session).await;
        tick(&mut session).await;
        session.handle_event(HostEvent::Stop);
        assert_eq!(session.state(), &ClockState::Stopped);
        assert!(session.timers().is_empty());

        let messages = drain(&mut output);
        assert_eq!(
            messages.last(),
            Some(&HostMessage::info("Stopped tracking proj after 0.0 min."))
        );

        session.handle_event(HostEvent::Stop);
        assert_eq!(
            drain(&mut output),
            vec![HostMessage::info("Tracking is not running.")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_and_periodic_report() {
        let clock = TestClock::new();
        let config = TrackerConfig {
            report_period: Duration::from_secs(60),
            heartbeat_period: None,
            ..TrackerConfig::default()
        };
        let (mut session, mut output) =
            test_session(config, Arc::new(MemoryBackend::default()), &clock).await;

        session
            .handle_event(HostEvent::EditorChanged {
                file: Some(PathBuf::from("main.rs")),
            });
        session.handle_event(HostEvent::Start);
        assert_eq!(
            drain(&mut output),
            vec![
                HostMessage::info("Started tracking proj."),
                HostMessage::status("⌛ 0 min today"),
            ]
        );

        for _ in 0..60 {
            tick(&mut session).await;
            session.handle_event(HostEvent::WindowFocused);
        }

        let messages = drain(&mut output);
        assert_eq!(
            messages
                .iter()
                .filter(|v| matches!(v, HostMessage::Status { .. }))
                .count(),
            60
        );
        let reports = messages
            .iter()
            .filter(|v| matches!(v, HostMessage::Report { .. }))
            .collect::<Vec<_>>();
        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports[0].text(),
            format!(
                "Time tracked for proj on {}\nTotal: 1.0 min\n.rs: 1.0 min",
                date_key(clock.local_date())
            )
        );
        assert_eq!(
            messages
                .iter()
                .filter(|v| matches!(v, HostMessage::Status { .. }))
                .last(),
            Some(&HostMessage::status("⌛ 1 min today"))
        );
        // the summary fires after the tick that shares its deadline
        assert!(matches!(messages.last(), Some(HostMessage::Report { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_and_stats_commands() {
        let clock = TestClock::new();
        let (mut session, mut output) = test_session(
            TrackerConfig::default(),
            Arc::new(MemoryBackend::default()),
            &clock,
        )
        .await;

        session.handle_event(HostEvent::ShowSession);
        session.handle_event(HostEvent::ShowStats);
        assert_eq!(
            drain(&mut output),
            vec![
                HostMessage::info("Tracking is not running."),
                HostMessage::report("No tracked time for proj."),
            ]
        );

        session.handle_event(HostEvent::Start);
        for _ in 0..30 {
            tick(&mut session).await;
        }
        drain(&mut output);

        session.handle_event(HostEvent::ShowSession);
        assert_eq!(
            drain(&mut output),
            vec![HostMessage::info(
                "Current session in proj: 0.5 min (0.5 min today)."
            )]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_workspace_applies_to_next_session() {
        let clock = TestClock::new();
        let (mut session, _output) = test_session(
            TrackerConfig::default(),
            Arc::new(MemoryBackend::default()),
            &clock,
        )
        .await;
        let today = date_key(clock.local_date());

        session.handle_event(HostEvent::Start);
        session
            .handle_event(HostEvent::WorkspaceChanged {
                name: Some("other".into()),
            });
        tick(&mut session).await;
        session.handle_event(HostEvent::Stop);
        session.handle_event(HostEvent::Start);
        tick(&mut session).await;

        assert_eq!(session.store().bucket("proj", &today).unwrap().total_time, 1000);
        assert_eq!(session.store().bucket("other", &today).unwrap().total_time, 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failures_do_not_stop_ticking() -> Result<()> {
        let clock = TestClock::new();
        let mut backend = MockStatsBackend::new();
        backend.expect_load().returning(|| Ok(None));
        backend
            .expect_save()
            .returning(|_| Err(anyhow!("read-only file system")));
        let config = TrackerConfig {
            heartbeat_period: None,
            autostart: true,
            ..TrackerConfig::default()
        };
        let (session, mut output) = test_session(config, Arc::new(backend), &clock).await;
        let persistence = session.store().persistence(Some(session.output.clone()));

        let (events, receiver) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let driver = async {
            for _ in 0..5 {
                tokio::time::sleep(SECOND).await;
                events.send(HostEvent::TextChanged).await?;
            }
            tokio::time::sleep(SECOND / 2).await;
            shutdown.cancel();
            anyhow::Ok(())
        };

        let (driver_result, session_result, persistence_result) = tokio::join!(
            driver,
            session.run(receiver, shutdown.clone()),
            persistence.run()
        );
        driver_result?;
        session_result?;
        persistence_result?;

        let messages = drain(&mut output);
        let warnings = messages
            .iter()
            .filter(|v| matches!(v, HostMessage::Warning { .. }))
            .count();
        assert_eq!(warnings, 1);
        assert_eq!(
            messages
                .iter()
                .filter(|v| matches!(v, HostMessage::Status { .. }))
                .last(),
            Some(&HostMessage::status("⌛ 0 min today"))
        );
        let statuses = messages
            .iter()
            .filter(|v| matches!(v, HostMessage::Status { .. }))
            .count();
        // one on start and one per tick
        assert_eq!(statuses, 6);
        Ok(())
    }
}
