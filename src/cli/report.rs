use std::{env, fmt::Display, path::Path, sync::Arc};

use ansi_term::{Colour, Style};
use anyhow::Result;
use chrono::{Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};

use crate::{
    tracker::{
        context::UNKNOWN_PROJECT,
        report::{ProjectReport, ReportScheduler},
        storage::{backend::JsonFileBackend, stats_store::StatsStore},
        STATS_FILE,
    },
    utils::time::{date_key, format_minutes},
};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct ReportCommand {
    #[arg(long, help = "Project name. Defaults to the current directory name")]
    project: Option<String>,
    #[arg(
        long,
        short,
        help = "Day to report. Examples are \"yesterday\", \"3 days ago\", \"15/03/2025\". Defaults to today"
    )]
    date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

/// Prints the same summary the tracker sends periodically, for any day.
pub async fn process_report_command(
    app_dir: &Path,
    ReportCommand {
        project,
        date,
        date_style,
    }: ReportCommand,
) -> Result<()> {
    let day = parse_day(date, date_style)?;
    let project = project.unwrap_or_else(project_from_current_dir);
    let store = open_store(app_dir).await?;

    let report = ReportScheduler::summarize(&store, &project, &date_key(day));
    println!("{}", heading(&report.to_string()));
    Ok(())
}

pub async fn process_stats_command(app_dir: &Path, project: Option<String>) -> Result<()> {
    let project = project.unwrap_or_else(project_from_current_dir);
    let store = open_store(app_dir).await?;
    let stats = store.read(&project);

    let text = ProjectReport {
        project: &project,
        stats: &stats,
    }
    .to_string();
    println!("{}", heading(&text));

    let totals = stats.file_totals();
    if !totals.is_empty() {
        println!();
        println!("{}", Style::new().bold().paint("By file type"));
        for (extension, ms) in totals.iter() {
            println!("{}\t{} min", Colour::Cyan.paint(extension), format_minutes(ms));
        }
    }
    Ok(())
}

pub async fn process_projects_command(app_dir: &Path) -> Result<()> {
    let store = open_store(app_dir).await?;
    if store.data().is_empty() {
        println!("Nothing tracked yet.");
        return Ok(());
    }
    for (project, stats) in store.data().projects() {
        println!(
            "{}\t{} min\t{} days",
            format_minutes(stats.total_time()),
            Colour::Green.paint(project),
            stats.days().count()
        );
    }
    Ok(())
}

async fn open_store(app_dir: &Path) -> Result<StatsStore> {
    let backend = JsonFileBackend::new(app_dir.join(STATS_FILE))?;
    Ok(StatsStore::load(Arc::new(backend)).await)
}

/// Makes the first line of a report stand out.
fn heading(text: &str) -> String {
    match text.split_once('\n') {
        Some((first, rest)) => format!("{}\n{rest}", Style::new().bold().paint(first)),
        None => Style::new().bold().paint(text).to_string(),
    }
}

/// Editors name a workspace after its folder, so the folder we're in is the best guess.
fn project_from_current_dir() -> String {
    env::current_dir()
        .ok()
        .as_deref()
        .and_then(Path::file_name)
        .map(|v| v.to_string_lossy().into_owned())
        .unwrap_or_else(|| UNKNOWN_PROJECT.to_owned())
}

fn parse_day(date: Option<String>, date_style: DateStyle) -> Result<NaiveDate> {
    let now = Local::now();
    match date.map(|s| parse_date_string(&s, now, date_style.into())) {
        Some(Ok(v)) => Ok(v.with_timezone(&Local).date_naive()),
        Some(Err(e)) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate date {e}"),
            )
            .into()),
        None => Ok(now.date_naive()),
    }
}
