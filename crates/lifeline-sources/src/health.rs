//! Health records adapter.
//!
//! [`HealthPlatform`] is the narrow interface to whatever stores health
//! records. [`HealthAdapter`] reads every requested category over the
//! lookback window, keeps records at or after the category watermark and
//! isolates per-category failures so one broken category never hides the
//! others.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use chrono::{DateTime, Duration, Utc};
use lifeline_core::{storage::BoxFuture, Category};
use tracing::{debug, warn};

use crate::{
    descriptor::Descriptor,
    error::{Result, SourceError},
    record::{HealthRecord, RawRecord},
};

/// How far back a category without a watermark is read.
pub const LOOKBACK_HOURS: i64 = 168;

/// Half-open time range `[start, end)` passed to platform reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Returns true when `at` lies inside the range.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Whether the platform can be queried at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// The platform is present and usable.
    Available,
    /// The platform is absent or unusable on this device.
    Unavailable {
        /// Reason reported by the platform.
        reason: String,
    },
}

/// Platform that stores health records.
pub trait HealthPlatform: Send + Sync + 'static {
    /// Reports whether the platform can be queried.
    fn availability(&self) -> BoxFuture<'_, Availability>;

    /// Returns the capability identifiers the user has granted.
    fn granted_capabilities(&self) -> BoxFuture<'_, Result<BTreeSet<String>>>;

    /// Reads the raw records of `category` overlapping `range`.
    fn read_records(
        &self,
        category: Category,
        range: TimeRange,
    ) -> BoxFuture<'_, Result<Vec<RawRecord>>>;

    /// Returns false when this platform version cannot serve `category`.
    fn supports(&self, _category: Category) -> bool {
        true
    }
}

/// New records per category from one read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthSnapshot {
    records: BTreeMap<Category, Vec<HealthRecord>>,
}

impl HealthSnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the records of one category.
    pub fn insert(&mut self, category: Category, records: Vec<HealthRecord>) {
        self.records.insert(category, records);
    }

    /// Records of `category`, empty when it was not read.
    pub fn records(&self, category: Category) -> &[HealthRecord] {
        self.records.get(&category).map(Vec::as_slice).unwrap_or_default()
    }

    /// Iterates categories with at least one record.
    pub fn non_empty(&self) -> impl Iterator<Item = (Category, &[HealthRecord])> {
        self.records
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(category, records)| (*category, records.as_slice()))
    }

    /// Returns true when every category came back empty.
    pub fn is_empty(&self) -> bool {
        self.non_empty().next().is_none()
    }

    /// Total record count over all categories.
    pub fn total_records(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    /// Record count per non-empty category.
    pub fn counts(&self) -> BTreeMap<Category, usize> {
        self.non_empty().map(|(category, records)| (category, records.len())).collect()
    }

    /// Latest watermark timestamp per non-empty category.
    pub fn latest_times(&self) -> BTreeMap<Category, DateTime<Utc>> {
        self.non_empty()
            .filter_map(|(category, records)| {
                records.iter().map(HealthRecord::watermark_time).max().map(|t| (category, t))
            })
            .collect()
    }
}

/// Reads health categories incrementally from a [`HealthPlatform`].
#[derive(Clone)]
pub struct HealthAdapter {
    platform: Arc<dyn HealthPlatform>,
}

impl HealthAdapter {
    /// Wraps a platform.
    pub fn new(platform: Arc<dyn HealthPlatform>) -> Self {
        Self { platform }
    }

    /// Returns true when the platform can be queried.
    pub async fn is_available(&self) -> bool {
        matches!(self.platform.availability().await, Availability::Available)
    }

    /// Returns the subset of `enabled` the user has granted access to.
    ///
    /// # Errors
    ///
    /// Fails when the platform is unavailable or the grant lookup fails.
    pub async fn authorized_categories(
        &self,
        enabled: &BTreeSet<Category>,
    ) -> Result<BTreeSet<Category>> {
        if let Availability::Unavailable { reason } = self.platform.availability().await {
            return Err(SourceError::unavailable(reason));
        }
        let granted = self.platform.granted_capabilities().await?;
        Ok(enabled.iter().copied().filter(|c| granted.contains(&c.capability())).collect())
    }

    /// Reads new records for `categories`.
    ///
    /// Each category is read over `[now - 168h, now)` and filtered to
    /// records whose watermark time is at or after the category watermark.
    /// Unsupported categories and categories whose read fails come back
    /// empty. Records that cannot be converted are skipped one by one.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Unavailable` when the platform cannot be
    /// queried at all.
    pub async fn read(
        &self,
        categories: &BTreeSet<Category>,
        watermarks: &BTreeMap<Category, DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<HealthSnapshot> {
        if let Availability::Unavailable { reason } = self.platform.availability().await {
            return Err(SourceError::unavailable(reason));
        }

        let range = TimeRange { start: now - Duration::hours(LOOKBACK_HOURS), end: now };
        let mut snapshot = HealthSnapshot::new();

        for &category in categories {
            let Some(descriptor) = Descriptor::for_category(category) else {
                continue;
            };
            if !self.platform.supports(category) {
                debug!(%category, "category unsupported by platform, skipping");
                snapshot.insert(category, Vec::new());
                continue;
            }

            let watermark = watermarks.get(&category).copied();
            let records = match self.read_category(descriptor, range, watermark).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(%category, error = %e, "category read failed, treating as empty");
                    Vec::new()
                },
            };
            debug!(%category, count = records.len(), "category read");
            snapshot.insert(category, records);
        }

        Ok(snapshot)
    }

    async fn read_category(
        &self,
        descriptor: Descriptor,
        range: TimeRange,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<Vec<HealthRecord>> {
        let raw = self
            .platform
            .read_records(descriptor.category, range)
            .await
            .map_err(|e| SourceError::read(descriptor.category, e.to_string()))?;

        let mut records = Vec::with_capacity(raw.len());
        for record in &raw {
            match descriptor.convert(record) {
                Ok(converted) => records.extend(converted),
                Err(e) => warn!(category = %descriptor.category, error = %e, "skipping malformed record"),
            }
        }
        records.retain(|r| watermark.map_or(true, |w| r.watermark_time() >= w));
        Ok(records)
    }
}

impl std::fmt::Debug for HealthAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthAdapter").finish_non_exhaustive()
    }
}
