//! Platforms backed by JSON export files.
//!
//! The daemon has no native health or usage platform to talk to, so it
//! reads exports dropped on disk by whatever collects the data. Files are
//! re-read on every query so new exports are picked up without a restart.
//!
//! Health export:
//!
//! ```json
//! {
//!   "granted": ["health.read.steps"],
//!   "unsupported": ["MINDFULNESS"],
//!   "records": { "STEPS": [{ "start_time": "...", "end_time": "...",
//!                            "values": { "count": { "value": 812, "unit": "count" } } }] }
//! }
//! ```
//!
//! A missing `granted` list grants every category.
//!
//! Usage export:
//!
//! ```json
//! {
//!   "authorized": true,
//!   "labels": { "com.example.reader": "Reader" },
//!   "events": [{ "package": "com.example.reader", "kind": "foreground_enter",
//!                "timestamp": "..." }]
//! }
//! ```

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use lifeline_core::{storage::BoxFuture, Category};
use serde::{de::DeserializeOwned, Deserialize};

use crate::{
    error::Result,
    health::{Availability, HealthPlatform, TimeRange},
    record::RawRecord,
    usage::{UsageEvent, UsageEventSource},
};

#[derive(Debug, Default, Deserialize)]
struct HealthExport {
    #[serde(default)]
    granted: Option<BTreeSet<String>>,
    #[serde(default)]
    unsupported: BTreeSet<Category>,
    #[serde(default)]
    records: BTreeMap<Category, Vec<RawRecord>>,
}

async fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&text)?)
}

/// Health platform reading a JSON export.
#[derive(Debug, Clone)]
pub struct FileHealthPlatform {
    path: PathBuf,
    unsupported: BTreeSet<Category>,
}

impl FileHealthPlatform {
    /// Opens the export at `path`. A missing file makes the platform
    /// unavailable rather than failing here.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let unsupported = if tokio::fs::try_exists(&path).await? {
            load::<HealthExport>(&path).await?.unsupported
        } else {
            BTreeSet::new()
        };
        Ok(Self { path, unsupported })
    }
}

/// Times a raw record is matched against a read range.
fn record_span(record: &RawRecord) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let first_sample = record.samples.iter().map(|s| s.time).min();
    let last_sample = record.samples.iter().map(|s| s.time).max();
    let start = record.start_time.or(record.time).or(first_sample)?;
    let end = record.end_time.or(record.time).or(last_sample)?;
    Some((start, end))
}

impl HealthPlatform for FileHealthPlatform {
    fn availability(&self) -> BoxFuture<'_, Availability> {
        Box::pin(async move {
            match tokio::fs::try_exists(&self.path).await {
                Ok(true) => Availability::Available,
                Ok(false) => Availability::Unavailable {
                    reason: format!("health export not found at {}", self.path.display()),
                },
                Err(e) => Availability::Unavailable { reason: e.to_string() },
            }
        })
    }

    fn granted_capabilities(&self) -> BoxFuture<'_, Result<BTreeSet<String>>> {
        Box::pin(async move {
            let export: HealthExport = load(&self.path).await?;
            Ok(export
                .granted
                .unwrap_or_else(|| Category::HEALTH.iter().map(|c| c.capability()).collect()))
        })
    }

    fn read_records(
        &self,
        category: Category,
        range: TimeRange,
    ) -> BoxFuture<'_, Result<Vec<RawRecord>>> {
        Box::pin(async move {
            let mut export: HealthExport = load(&self.path).await?;
            let records = export.records.remove(&category).unwrap_or_default();
            Ok(records
                .into_iter()
                .filter(|r| {
                    record_span(r).is_some_and(|(start, end)| end >= range.start && start < range.end)
                })
                .collect())
        })
    }

    fn supports(&self, category: Category) -> bool {
        !self.unsupported.contains(&category)
    }
}

#[derive(Debug, Default, Deserialize)]
struct UsageExport {
    #[serde(default = "default_authorized")]
    authorized: bool,
    #[serde(default)]
    labels: HashMap<String, String>,
    #[serde(default)]
    events: Vec<UsageEvent>,
}

fn default_authorized() -> bool {
    true
}

/// Usage event source reading a JSON export.
///
/// App labels are loaded once when the source is opened.
#[derive(Debug, Clone)]
pub struct FileUsageSource {
    path: PathBuf,
    labels: HashMap<String, String>,
}

impl FileUsageSource {
    /// Opens the export at `path`. A missing file reads as "not authorized".
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let labels = if tokio::fs::try_exists(&path).await? {
            load::<UsageExport>(&path).await?.labels
        } else {
            HashMap::new()
        };
        Ok(Self { path, labels })
    }
}

impl UsageEventSource for FileUsageSource {
    fn has_usage_authorization(&self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            if !tokio::fs::try_exists(&self.path).await? {
                return Ok(false);
            }
            Ok(load::<UsageExport>(&self.path).await?.authorized)
        })
    }

    fn query_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<UsageEvent>>> {
        Box::pin(async move {
            let export: UsageExport = load(&self.path).await?;
            Ok(export
                .events
                .into_iter()
                .filter(|e| e.timestamp >= start && e.timestamp < end)
                .collect())
        })
    }

    fn app_label(&self, package: &str) -> Option<String> {
        self.labels.get(package).cloned()
    }
}
