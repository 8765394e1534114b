pub mod report;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use report::{process_projects_command, process_report_command, process_stats_command, ReportCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    tracker::{args::TrackerArgs, start_tracker},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX, SERVE_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "codeclock", version, long_about = None)]
#[command(about = "Tracks active coding time per project, day and file type", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default uses $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long = "log-filter", global = true)]
    log: Option<LevelFilter>,
    /// Mirror logs to stderr.
    #[arg(long = "log-console", global = true)]
    log_console: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Track time for an editor. Activity and commands are read as JSON lines from stdin, messages are written to stdout"
    )]
    Serve {
        #[command(flatten)]
        tracker: TrackerArgs,
    },
    #[command(about = "Show the time tracked for a project on one day")]
    Report {
        #[command(flatten)]
        command: ReportCommand,
    },
    #[command(about = "Show every tracked day of a project")]
    Stats {
        #[arg(long, help = "Project name. Defaults to the current directory name")]
        project: Option<String>,
    },
    #[command(about = "List tracked projects")]
    Projects {},
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();
    let app_dir = args.dir.map_or_else(create_application_default_path, Ok)?;

    let prefix = match args.commands {
        Commands::Serve { .. } => SERVE_PREFIX,
        _ => CLI_PREFIX,
    };
    enable_logging(prefix, &app_dir.join("logs"), args.log, args.log_console)?;

    match args.commands {
        Commands::Serve { tracker } => start_tracker(app_dir, tracker).await,
        Commands::Report { command } => process_report_command(&app_dir, command).await,
        Commands::Stats { project } => process_stats_command(&app_dir, project).await,
        Commands::Projects {} => process_projects_command(&app_dir).await,
    }
}
