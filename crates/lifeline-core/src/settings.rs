//! Typed access to user settings and sync state.
//!
//! [`Settings`] is the only component that knows key names and value
//! encodings. It is created once and shared by handle with the delivery
//! engine, the orchestrator and the CLI.
//!
//! # Encodings
//!
//! - URL lists and enabled categories are comma-joined strings.
//! - Custom headers are a JSON object per source.
//! - Watermarks are epoch milliseconds.
//! - The attempt log is a JSON array, newest entry first.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    error::{CoreError, Result},
    models::{AttemptLogEntry, Category, SourceKind, WebhookTarget},
    storage::SettingsStore,
};

/// Maximum number of attempt log entries kept.
pub const MAX_LOG_ENTRIES: usize = 100;

/// Default sync interval for both sources, in minutes.
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u32 = 60;

/// Default logical day boundary hour.
pub const DEFAULT_DAY_BOUNDARY_HOUR: u32 = 4;

const KEY_ENABLED_CATEGORIES: &str = "health_enabled_data_types";
const KEY_HEALTH_WATERMARK_PREFIX: &str = "health_last_sync_ts_";
const KEY_USAGE_WATERMARK: &str = "screentime_last_sync_ts";
const KEY_DAY_BOUNDARY_HOUR: &str = "screentime_day_boundary_hour";
const KEY_USE_DAY_BOUNDARY: &str = "screentime_use_day_boundary";
const KEY_WEBHOOK_LOGS: &str = "webhook_logs";

/// Typed facade over a [`SettingsStore`].
#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn SettingsStore>,
    write_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings").finish_non_exhaustive()
    }
}

impl Settings {
    /// Creates a facade over `store`.
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store, write_lock: Arc::new(Mutex::new(())) }
    }

    /// Webhook URLs configured for `source`, in configuration order.
    pub async fn webhook_urls(&self, source: SourceKind) -> Result<Vec<String>> {
        let raw = self.store.get(&urls_key(source)).await?.unwrap_or_default();
        Ok(raw.split(',').map(str::trim).filter(|url| !url.is_empty()).map(String::from).collect())
    }

    /// Replaces the webhook URLs for `source`. Blank entries are dropped.
    pub async fn set_webhook_urls(&self, source: SourceKind, urls: &[String]) -> Result<()> {
        if let Some(bad) = urls.iter().find(|url| url.contains(',')) {
            return Err(CoreError::invalid_input(format!("webhook URL must not contain ',': {bad}")));
        }
        let joined = urls
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        self.store.set(&urls_key(source), joined).await
    }

    /// Custom headers sent with every request for `source`.
    ///
    /// A corrupt stored value reads as no headers.
    pub async fn webhook_headers(&self, source: SourceKind) -> Result<BTreeMap<String, String>> {
        let Some(raw) = self.store.get(&headers_key(source)).await? else {
            return Ok(BTreeMap::new());
        };
        Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(%source, error = %e, "ignoring unreadable custom headers");
            BTreeMap::new()
        }))
    }

    /// Replaces the custom headers for `source`.
    pub async fn set_webhook_headers(
        &self,
        source: SourceKind,
        headers: &BTreeMap<String, String>,
    ) -> Result<()> {
        let encoded = serde_json::to_string(headers)?;
        self.store.set(&headers_key(source), encoded).await
    }

    /// Webhook targets for `source`: each URL with the source's headers.
    pub async fn webhook_targets(&self, source: SourceKind) -> Result<Vec<WebhookTarget>> {
        let headers = self.webhook_headers(source).await?;
        Ok(self
            .webhook_urls(source)
            .await?
            .into_iter()
            .map(|url| WebhookTarget { url, headers: headers.clone() })
            .collect())
    }

    /// Health categories the user enabled. Unknown names are ignored.
    pub async fn enabled_categories(&self) -> Result<BTreeSet<Category>> {
        let raw = self.store.get(KEY_ENABLED_CATEGORIES).await?.unwrap_or_default();
        Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .filter_map(|name| match name.parse::<Category>() {
                Ok(category) if category.source() == SourceKind::Health => Some(category),
                _ => {
                    debug!(name, "ignoring unknown enabled category");
                    None
                },
            })
            .collect())
    }

    /// Replaces the enabled health categories.
    pub async fn set_enabled_categories(&self, categories: &BTreeSet<Category>) -> Result<()> {
        if let Some(other) = categories.iter().find(|c| c.source() != SourceKind::Health) {
            return Err(CoreError::invalid_input(format!("{other} is not a health category")));
        }
        let joined = categories.iter().map(|c| c.name()).collect::<Vec<_>>().join(",");
        self.store.set(KEY_ENABLED_CATEGORIES, joined).await
    }

    /// Sync interval for `source` in minutes.
    pub async fn sync_interval_minutes(&self, source: SourceKind) -> Result<u32> {
        Ok(self.parsed(&interval_key(source)).await?.unwrap_or(DEFAULT_SYNC_INTERVAL_MINUTES))
    }

    /// Sync interval for `source`.
    pub async fn sync_interval(&self, source: SourceKind) -> Result<Duration> {
        let minutes = self.sync_interval_minutes(source).await?;
        Ok(Duration::from_secs(u64::from(minutes.max(1)) * 60))
    }

    /// Sets the sync interval for `source`.
    pub async fn set_sync_interval_minutes(&self, source: SourceKind, minutes: u32) -> Result<()> {
        if minutes == 0 {
            return Err(CoreError::invalid_input("sync interval must be at least one minute"));
        }
        self.store.set(&interval_key(source), minutes.to_string()).await
    }

    /// Last committed watermark for `category`.
    pub async fn watermark(&self, category: Category) -> Result<Option<DateTime<Utc>>> {
        let millis: Option<i64> = self.parsed(&watermark_key(category)).await?;
        Ok(millis.filter(|ms| *ms >= 0).and_then(DateTime::from_timestamp_millis))
    }

    /// Watermarks for every category in `categories` that has one.
    pub async fn watermarks(
        &self,
        categories: impl IntoIterator<Item = Category>,
    ) -> Result<BTreeMap<Category, DateTime<Utc>>> {
        let mut watermarks = BTreeMap::new();
        for category in categories {
            if let Some(watermark) = self.watermark(category).await? {
                watermarks.insert(category, watermark);
            }
        }
        Ok(watermarks)
    }

    /// Advances the watermark for `category` to `at`.
    ///
    /// The stored value never moves backwards: committing an older instant
    /// keeps the existing watermark. Returns the watermark now stored.
    pub async fn commit_watermark(
        &self,
        category: Category,
        at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let _guard = self.write_lock.lock().await;

        let committed = match self.watermark(category).await? {
            Some(existing) if existing >= at => existing,
            _ => {
                self.store.set(&watermark_key(category), at.timestamp_millis().to_string()).await?;
                at
            },
        };
        Ok(committed)
    }

    /// Logical day boundary hour, clamped to `0..=23`.
    pub async fn day_boundary_hour(&self) -> Result<u32> {
        let hour: u32 = self.parsed(KEY_DAY_BOUNDARY_HOUR).await?.unwrap_or(DEFAULT_DAY_BOUNDARY_HOUR);
        Ok(hour.min(23))
    }

    /// Sets the day boundary hour, clamping it to `0..=23`.
    pub async fn set_day_boundary_hour(&self, hour: u32) -> Result<()> {
        self.store.set(KEY_DAY_BOUNDARY_HOUR, hour.min(23).to_string()).await
    }

    /// Whether usage days start at the boundary hour instead of midnight.
    pub async fn use_day_boundary(&self) -> Result<bool> {
        Ok(self.parsed(KEY_USE_DAY_BOUNDARY).await?.unwrap_or(true))
    }

    /// Enables or disables the day boundary.
    pub async fn set_use_day_boundary(&self, enabled: bool) -> Result<()> {
        self.store.set(KEY_USE_DAY_BOUNDARY, enabled.to_string()).await
    }

    /// Attempt log entries, newest first, optionally only for `filter`.
    ///
    /// An unreadable log reads as empty.
    pub async fn attempt_log(&self, filter: Option<SourceKind>) -> Result<Vec<AttemptLogEntry>> {
        let mut entries = self.read_log().await?;
        if let Some(source) = filter {
            entries.retain(|entry| entry.source == source);
        }
        Ok(entries)
    }

    /// Prepends `entry` to the attempt log, evicting the oldest entries
    /// beyond [`MAX_LOG_ENTRIES`].
    pub async fn append_attempt(&self, entry: AttemptLogEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.read_log().await?;
        entries.insert(0, entry);
        entries.truncate(MAX_LOG_ENTRIES);
        self.store.set(KEY_WEBHOOK_LOGS, serde_json::to_string(&entries)?).await
    }

    /// Clears the attempt log, or only the entries of `filter`.
    pub async fn clear_attempt_log(&self, filter: Option<SourceKind>) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        match filter {
            None => self.store.remove(KEY_WEBHOOK_LOGS).await,
            Some(source) => {
                let mut entries = self.read_log().await?;
                entries.retain(|entry| entry.source != source);
                self.store.set(KEY_WEBHOOK_LOGS, serde_json::to_string(&entries)?).await
            },
        }
    }

    /// Every stored setting except the attempt log, ordered by key.
    pub async fn dump(&self) -> Result<Vec<(String, String)>> {
        let mut entries = self.store.entries().await?;
        entries.retain(|(key, _)| key != KEY_WEBHOOK_LOGS);
        Ok(entries)
    }

    async fn read_log(&self) -> Result<Vec<AttemptLogEntry>> {
        let Some(raw) = self.store.get(KEY_WEBHOOK_LOGS).await? else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "attempt log is unreadable, treating as empty");
            Vec::new()
        }))
    }

    async fn parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        let value = raw.trim().parse().ok();
        if value.is_none() {
            warn!(key, value = %raw, "ignoring unparsable setting");
        }
        Ok(value)
    }
}

fn urls_key(source: SourceKind) -> String {
    format!("{}_webhook_urls", source.settings_prefix())
}

fn headers_key(source: SourceKind) -> String {
    format!("{}_webhook_headers", source.settings_prefix())
}

fn interval_key(source: SourceKind) -> String {
    format!("{}_sync_interval_minutes", source.settings_prefix())
}

fn watermark_key(category: Category) -> String {
    match category.source() {
        SourceKind::Health => format!("{KEY_HEALTH_WATERMARK_PREFIX}{}", category.name()),
        SourceKind::Usage => KEY_USAGE_WATERMARK.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;
    use crate::storage::mock::MemorySettingsStore;

    fn settings() -> (Settings, MemorySettingsStore) {
        let store = MemorySettingsStore::new();
        (Settings::new(Arc::new(store.clone())), store)
    }

    fn entry(n: usize, source: SourceKind) -> AttemptLogEntry {
        AttemptLogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_000 + n as i64).unwrap(),
            url: format!("https://hooks.example.com/{n}"),
            status_code: Some(200),
            success: true,
            error_message: None,
            data_type: Some(source.as_str().to_string()),
            record_count: Some(n),
            raw_payload: None,
            source,
        }
    }

    #[tokio::test]
    async fn defaults_apply_when_unset() {
        let (settings, _) = settings();

        assert!(settings.webhook_urls(SourceKind::Health).await.unwrap().is_empty());
        assert!(settings.enabled_categories().await.unwrap().is_empty());
        assert_eq!(settings.sync_interval_minutes(SourceKind::Usage).await.unwrap(), 60);
        assert_eq!(settings.day_boundary_hour().await.unwrap(), 4);
        assert!(settings.use_day_boundary().await.unwrap());
        assert_eq!(settings.watermark(Category::Steps).await.unwrap(), None);
    }

    #[tokio::test]
    async fn url_lists_are_comma_joined_per_source() {
        let (settings, store) = settings();
        let urls = vec!["https://a.example".to_string(), " ".to_string(), "https://b.example".into()];

        settings.set_webhook_urls(SourceKind::Usage, &urls).await.unwrap();

        assert_eq!(
            store.snapshot().await.get("screentime_webhook_urls").map(String::as_str),
            Some("https://a.example,https://b.example")
        );
        assert_eq!(settings.webhook_urls(SourceKind::Usage).await.unwrap().len(), 2);
        assert!(settings.webhook_urls(SourceKind::Health).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn targets_carry_source_headers() {
        let (settings, _) = settings();
        let headers = BTreeMap::from([("Authorization".to_string(), "Bearer t".to_string())]);
        settings.set_webhook_urls(SourceKind::Health, &["https://a".into()]).await.unwrap();
        settings.set_webhook_headers(SourceKind::Health, &headers).await.unwrap();

        let targets = settings.webhook_targets(SourceKind::Health).await.unwrap();

        assert_eq!(targets, vec![WebhookTarget { url: "https://a".into(), headers }]);
    }

    #[tokio::test]
    async fn unknown_enabled_categories_are_ignored() {
        let (settings, store) = settings();
        store
            .set(KEY_ENABLED_CATEGORIES, "STEPS,TELEPATHY,HEART_RATE,SCREEN_TIME".into())
            .await
            .unwrap();

        let enabled = settings.enabled_categories().await.unwrap();

        assert_eq!(enabled, BTreeSet::from([Category::Steps, Category::HeartRate]));
    }

    #[tokio::test]
    async fn watermark_commit_never_regresses() {
        let (settings, store) = settings();
        let later = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();

        assert_eq!(settings.commit_watermark(Category::Weight, later).await.unwrap(), later);
        assert_eq!(settings.commit_watermark(Category::Weight, earlier).await.unwrap(), later);
        assert_eq!(settings.watermark(Category::Weight).await.unwrap(), Some(later));
        assert!(store.snapshot().await.contains_key("health_last_sync_ts_WEIGHT"));
    }

    #[tokio::test]
    async fn usage_watermark_uses_single_key() {
        let (settings, store) = settings();
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();

        settings.commit_watermark(Category::ScreenTime, at).await.unwrap();

        assert_eq!(
            store.snapshot().await.get("screentime_last_sync_ts"),
            Some(&at.timestamp_millis().to_string())
        );
    }

    #[tokio::test]
    async fn day_boundary_hour_is_clamped() {
        let (settings, _) = settings();

        settings.set_day_boundary_hour(31).await.unwrap();

        assert_eq!(settings.day_boundary_hour().await.unwrap(), 23);
    }

    #[tokio::test]
    async fn log_is_capped_newest_first() {
        let (settings, _) = settings();
        for n in 0..=MAX_LOG_ENTRIES {
            settings.append_attempt(entry(n, SourceKind::Health)).await.unwrap();
        }

        let log = settings.attempt_log(None).await.unwrap();

        assert_eq!(log.len(), MAX_LOG_ENTRIES);
        assert_eq!(log[0].record_count, Some(MAX_LOG_ENTRIES));
        assert_eq!(log.last().unwrap().record_count, Some(1));
    }

    #[tokio::test]
    async fn log_filtering_and_clearing_by_source() {
        let (settings, _) = settings();
        settings.append_attempt(entry(1, SourceKind::Health)).await.unwrap();
        settings.append_attempt(entry(2, SourceKind::Usage)).await.unwrap();
        settings.append_attempt(entry(3, SourceKind::Health)).await.unwrap();

        assert_eq!(settings.attempt_log(Some(SourceKind::Health)).await.unwrap().len(), 2);

        settings.clear_attempt_log(Some(SourceKind::Health)).await.unwrap();
        let remaining = settings.attempt_log(None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].source, SourceKind::Usage);

        settings.clear_attempt_log(None).await.unwrap();
        assert!(settings.attempt_log(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_log_reads_as_empty() {
        let (settings, store) = settings();
        store.set(KEY_WEBHOOK_LOGS, "[{oops".into()).await.unwrap();

        assert!(settings.attempt_log(None).await.unwrap().is_empty());

        settings.append_attempt(entry(7, SourceKind::Usage)).await.unwrap();
        assert_eq!(settings.attempt_log(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn storage_errors_propagate() {
        let (settings, store) = settings();
        store.inject_read_error("locked").await;

        assert!(matches!(
            settings.webhook_urls(SourceKind::Health).await,
            Err(CoreError::Database(_))
        ));
    }
}
