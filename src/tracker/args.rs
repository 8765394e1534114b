use std::time::Duration;

use clap::Args;

use super::accounting::AccountingSettings;

/// One week. Longer periods are not useful and would overflow instant arithmetic.
const MAX_PERIOD_MINS: u64 = 7 * 24 * 60;

#[derive(Args, Debug, Clone)]
pub struct TrackerArgs {
    /// Project to attribute time to until the host reports a workspace.
    #[arg(long)]
    pub project: Option<String>,
    #[arg(long = "tick-ms", default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..=MAX_PERIOD_MINS * 60 * 1000))]
    pub tick_ms: u64,
    /// Seconds without activity after which ticks stop counting.
    #[arg(long = "idle-secs", default_value_t = 30, value_parser = clap::value_parser!(u64).range(0..=MAX_PERIOD_MINS * 60))]
    pub idle_secs: u64,
    #[arg(long = "report-mins", default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..=MAX_PERIOD_MINS))]
    pub report_mins: u64,
    /// Informational reminder period, 0 disables it.
    #[arg(long = "heartbeat-mins", default_value_t = 7, value_parser = clap::value_parser!(u64).range(0..=MAX_PERIOD_MINS))]
    pub heartbeat_mins: u64,
    /// Start tracking right away instead of waiting for a start command.
    #[arg(long)]
    pub autostart: bool,
    /// Move a running session to the new day after midnight.
    #[arg(long = "roll-over")]
    pub roll_over: bool,
    /// Don't merge data written by other instances before each tick.
    #[arg(long = "no-refresh")]
    pub no_refresh: bool,
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub tick_period: Duration,
    pub idle_threshold: Duration,
    pub report_period: Duration,
    pub heartbeat_period: Option<Duration>,
    pub autostart: bool,
    pub roll_over_midnight: bool,
    pub refresh_before_accrual: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(1),
            idle_threshold: Duration::from_secs(30),
            report_period: Duration::from_secs(15 * 60),
            heartbeat_period: Some(Duration::from_secs(7 * 60)),
            autostart: false,
            roll_over_midnight: false,
            refresh_before_accrual: true,
        }
    }
}

impl TrackerConfig {
    pub fn accounting(&self) -> AccountingSettings {
        AccountingSettings {
            tick_period: self.tick_period,
            idle_threshold: self.idle_threshold,
            roll_over_midnight: self.roll_over_midnight,
            refresh_before_accrual: self.refresh_before_accrual,
        }
    }
}

impl From<&TrackerArgs> for TrackerConfig {
    fn from(args: &TrackerArgs) -> Self {
        Self {
            tick_period: Duration::from_millis(args.tick_ms),
            idle_threshold: Duration::from_secs(args.idle_secs),
            report_period: Duration::from_secs(args.report_mins * 60),
            heartbeat_period: (args.heartbeat_mins > 0)
                .then(|| Duration::from_secs(args.heartbeat_mins * 60)),
            autostart: args.autostart,
            roll_over_midnight: args.roll_over,
            refresh_before_accrual: !args.no_refresh,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;

    use super::{TrackerArgs, TrackerConfig};

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        tracker: TrackerArgs,
    }

    #[test]
    fn test_defaults_match_config_defaults() {
        let args = Wrapper::parse_from(["codeclock"]).tracker;
        let config = TrackerConfig::from(&args);
        let defaults = TrackerConfig::default();

        assert_eq!(config.tick_period, defaults.tick_period);
        assert_eq!(config.idle_threshold, defaults.idle_threshold);
        assert_eq!(config.report_period, defaults.report_period);
        assert_eq!(config.heartbeat_period, defaults.heartbeat_period);
        assert!(config.refresh_before_accrual);
    }

    #[test]
    fn test_zero_heartbeat_disables_it() {
        let args = Wrapper::parse_from(["codeclock", "--heartbeat-mins", "0", "--tick-ms", "250"])
            .tracker;
        let config = TrackerConfig::from(&args);
        assert_eq!(config.heartbeat_period, None);
        assert_eq!(config.tick_period, Duration::from_millis(250));
    }

    #[test]
    fn test_zero_tick_is_rejected() {
        assert!(Wrapper::try_parse_from(["codeclock", "--tick-ms", "0"]).is_err());
    }

    #[test]
    fn test_periods_are_bounded() {
        let huge = u64::MAX.to_string();
        for flag in ["--report-mins", "--heartbeat-mins", "--tick-ms", "--idle-secs"] {
            assert!(Wrapper::try_parse_from(["codeclock", flag, huge.as_str()]).is_err());
        }

        let args = Wrapper::parse_from(["codeclock", "--report-mins", "10080"]).tracker;
        let config = TrackerConfig::from(&args);
        assert_eq!(config.report_period, Duration::from_secs(7 * 24 * 60 * 60));
    }
}
