use std::{fmt::Display, time::Duration};

use tokio::time::Instant;

use crate::utils::time::{format_minutes, whole_minutes};

use super::{
    storage::{
        entities::{DayBucket, ProjectStats},
        stats_store::StatsStore,
    },
    timers::{TimerHandle, Timers},
};

/// Which of the scheduler's timers fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Summary,
    Heartbeat,
}

/// Periodic read only reporting. The summary timer renders [DailyReport]; the optional heartbeat
/// is purely informational.
pub struct ReportScheduler {
    summary_period: Duration,
    heartbeat_period: Option<Duration>,
    summary_timer: Option<TimerHandle>,
    heartbeat_timer: Option<TimerHandle>,
}

impl ReportScheduler {
    pub fn new(summary_period: Duration, heartbeat_period: Option<Duration>) -> Self {
        Self {
            summary_period,
            heartbeat_period,
            summary_timer: None,
            heartbeat_timer: None,
        }
    }

    pub fn start(&mut self, timers: &mut Timers, now: Instant) {
        if self.summary_timer.is_none() {
            self.summary_timer = Some(timers.schedule(now, self.summary_period));
        }
        if let (None, Some(period)) = (self.heartbeat_timer, self.heartbeat_period) {
            self.heartbeat_timer = Some(timers.schedule(now, period));
        }
    }

    pub fn stop(&mut self, timers: &mut Timers) {
        for handle in [self.summary_timer.take(), self.heartbeat_timer.take()]
            .into_iter()
            .flatten()
        {
            timers.cancel(handle);
        }
    }

    pub fn kind_of(&self, handle: TimerHandle) -> Option<ReportKind> {
        if self.summary_timer == Some(handle) {
            Some(ReportKind::Summary)
        } else if self.heartbeat_timer == Some(handle) {
            Some(ReportKind::Heartbeat)
        } else {
            None
        }
    }

    pub fn summarize(store: &StatsStore, project: &str, date_key: &str) -> DailyReport {
        match store.bucket(project, date_key) {
            Some(bucket) => DailyReport::Summary {
                project: project.to_owned(),
                date_key: date_key.to_owned(),
                bucket: bucket.clone(),
            },
            None => DailyReport::NoTrackedTime {
                project: project.to_owned(),
                date_key: date_key.to_owned(),
            },
        }
    }
}

/// Summary of one project for one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DailyReport {
    NoTrackedTime {
        project: String,
        date_key: String,
    },
    Summary {
        project: String,
        date_key: String,
        bucket: DayBucket,
    },
}

impl Display for DailyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DailyReport::NoTrackedTime { project, date_key } => {
                write!(f, "No tracked time for {project} on {date_key}.")
            }
            DailyReport::Summary {
                project,
                date_key,
                bucket,
            } => {
                writeln!(f, "Time tracked for {project} on {date_key}")?;
                write!(f, "Total: {} min", format_minutes(bucket.total_time))?;
                for (extension, ms) in bucket.file_stats.iter() {
                    write!(f, "\n{extension}: {} min", format_minutes(ms))?;
                }
                Ok(())
            }
        }
    }
}

/// Every recorded day of a project, oldest first.
pub struct ProjectReport<'a> {
    pub project: &'a str,
    pub stats: &'a ProjectStats,
}

impl Display for ProjectReport<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.stats.is_empty() {
            return write!(f, "No tracked time for {}.", self.project);
        }
        writeln!(f, "Stats for {}", self.project)?;
        for (date_key, bucket) in self.stats.days() {
            write!(f, "{date_key}: {} min", format_minutes(bucket.total_time))?;
            if !bucket.file_stats.is_empty() {
                let files = bucket
                    .file_stats
                    .iter()
                    .map(|(extension, ms)| format!("{extension} {} min", format_minutes(ms)))
                    .collect::<Vec<_>>();
                write!(f, " ({})", files.join(", "))?;
            }
            writeln!(f)?;
        }
        write!(
            f,
            "All days: {} min",
            format_minutes(self.stats.total_time())
        )
    }
}

/// Status bar text.
pub fn status_text(day_total_ms: u64) -> String {
    format!("⌛ {} min today", whole_minutes(day_total_ms))
}

pub fn heartbeat_text(project: &str, day_total_ms: u64) -> String {
    format!(
        "Still tracking {project}: {} min today.",
        whole_minutes(day_total_ms)
    )
}
