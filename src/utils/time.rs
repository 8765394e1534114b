use chrono::NaiveDate;

const MS_PER_MINUTE: u64 = 60_000;

/// Key of a day bucket, for example `2018-07-04 (Wednesday)`.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d (%A)").to_string()
}

/// Minutes with one decimal place, used by every human readable report.
pub fn format_minutes(ms: u64) -> String {
    format!("{:.1}", ms as f64 / MS_PER_MINUTE as f64)
}

pub fn whole_minutes(ms: u64) -> u64 {
    ms / MS_PER_MINUTE
}
