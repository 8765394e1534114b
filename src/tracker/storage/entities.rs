use std::{
    collections::{btree_map, BTreeMap},
    fmt,
};

use anyhow::{bail, Result};
use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

/// Version written into every stats file.
pub const SCHEMA_VERSION: u32 = 1;

/// Whole accounting structure: project name -> day key -> bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsData(BTreeMap<String, ProjectStats>);

/// All the days recorded for one project. Day keys start with `YYYY-MM-DD`, so iteration is
/// chronological.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectStats(BTreeMap<String, DayBucket>);

/// Time spent in a project during a single day. All values are milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayBucket {
    #[serde(default)]
    pub total_time: u64,
    #[serde(default)]
    pub file_stats: FileStats,
}

/// Extension -> time map that remembers the order in which extensions were first recorded.
/// Serialized as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileStats(Vec<(String, u64)>);

impl StatsData {
    pub fn ensure_bucket(&mut self, project: &str, date_key: &str) -> &mut DayBucket {
        self.0
            .entry(project.to_owned())
            .or_default()
            .0
            .entry(date_key.to_owned())
            .or_default()
    }

    pub fn project(&self, project: &str) -> Option<&ProjectStats> {
        self.0.get(project)
    }

    pub fn projects(&self) -> impl Iterator<Item = (&str, &ProjectStats)> {
        self.0.iter().map(|(name, stats)| (name.as_str(), stats))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Folds `other` into `self` keeping the larger value of every counter. Counters only ever
    /// grow, so the larger one is the most recent.
    pub fn merge_max(&mut self, other: StatsData) {
        for (project, days) in other.0 {
            let target = self.0.entry(project).or_default();
            for (date_key, bucket) in days.0 {
                match target.0.entry(date_key) {
                    btree_map::Entry::Vacant(entry) => {
                        entry.insert(bucket);
                    }
                    btree_map::Entry::Occupied(mut entry) => entry.get_mut().merge_max(bucket),
                }
            }
        }
    }
}

impl ProjectStats {
    pub fn day(&self, date_key: &str) -> Option<&DayBucket> {
        self.0.get(date_key)
    }

    pub fn days(&self) -> impl Iterator<Item = (&str, &DayBucket)> {
        self.0.iter().map(|(key, bucket)| (key.as_str(), bucket))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total_time(&self) -> u64 {
        self.0.values().map(|v| v.total_time).sum()
    }

    /// Extension time summed over every day, in the order extensions first appear.
    pub fn file_totals(&self) -> FileStats {
        let mut totals = FileStats::default();
        for bucket in self.0.values() {
            for (extension, ms) in bucket.file_stats.iter() {
                totals.add(extension, ms);
            }
        }
        totals
    }
}

impl DayBucket {
    fn merge_max(&mut self, other: DayBucket) {
        self.total_time = self.total_time.max(other.total_time);
        self.file_stats.merge_max(other.file_stats);
    }
}

impl FileStats {
    /// Adds `ms` to `extension`, appending the entry at zero if it is new.
    pub fn add(&mut self, extension: &str, ms: u64) {
        match self.0.iter_mut().find(|(key, _)| key == extension) {
            Some((_, value)) => *value += ms,
            None => self.0.push((extension.to_owned(), ms)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(key, ms)| (key.as_str(), *ms))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn merge_max(&mut self, other: FileStats) {
        for (extension, ms) in other.0 {
            match self.0.iter_mut().find(|(key, _)| *key == extension) {
                Some((_, value)) => *value = (*value).max(ms),
                None => self.0.push((extension, ms)),
            }
        }
    }
}

impl<const N: usize> From<[(&str, u64); N]> for FileStats {
    fn from(entries: [(&str, u64); N]) -> Self {
        let mut stats = FileStats::default();
        for (extension, ms) in entries {
            stats.add(extension, ms);
        }
        stats
    }
}

impl Serialize for FileStats {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (extension, ms) in &self.0 {
            map.serialize_entry(extension, ms)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FileStats {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FileStatsVisitor;

        impl<'de> Visitor<'de> for FileStatsVisitor {
            type Value = FileStats;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of file extensions to milliseconds")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut stats = FileStats(Vec::with_capacity(access.size_hint().unwrap_or(0)));
                while let Some((extension, ms)) = access.next_entry::<String, u64>()? {
                    // A repeated key overrides the earlier one, like any JSON object would.
                    match stats.0.iter_mut().find(|(key, _)| *key == extension) {
                        Some((_, value)) => *value = ms,
                        None => stats.0.push((extension, ms)),
                    }
                }
                Ok(stats)
            }
        }

        deserializer.deserialize_map(FileStatsVisitor)
    }
}

#[derive(Serialize)]
struct VersionedStatsRef<'a> {
    version: u32,
    projects: &'a StatsData,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PersistedStats {
    Versioned { version: u32, projects: StatsData },
    /// Files written before the schema carried a version were just the project map.
    Legacy(StatsData),
}

pub fn encode(data: &StatsData) -> Result<String> {
    Ok(serde_json::to_string_pretty(&VersionedStatsRef {
        version: SCHEMA_VERSION,
        projects: data,
    })?)
}

pub fn decode(contents: &str) -> Result<StatsData> {
    match serde_json::from_str::<PersistedStats>(contents)? {
        PersistedStats::Versioned { version, projects } if version == SCHEMA_VERSION => Ok(projects),
        PersistedStats::Versioned { version, .. } => {
            bail!("Unsupported stats schema version {version}")
        }
        PersistedStats::Legacy(projects) => Ok(projects),
    }
}
