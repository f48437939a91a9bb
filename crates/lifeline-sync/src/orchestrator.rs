//! Per-source sync runs.
//!
//! A run walks `ReadingWatermarks -> ReadingRecords -> BuildingPayload ->
//! Delivering -> CommittingWatermarks` and stops early with `NoData` or a
//! failure. Watermarks are committed only after a target accepted the
//! payload, so a failed run never advances them. Pre-flight failures (no
//! targets, no categories, no authorization) return before any delivery and
//! leave the attempt log untouched.

use std::{collections::BTreeMap, fmt, sync::Arc};

use lifeline_core::{Category, Clock, Settings, SourceKind, SyncFailure, SyncOutcome};
use lifeline_delivery::{DeliveryContext, WebhookDispatcher};
use lifeline_sources::{
    DayBoundary, HealthAdapter, HealthSnapshot, SourceError, UsageAdapter, UsageDay,
    DEFAULT_LOOKBACK_DAYS,
};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::payload::{health_payload, usage_payload, PayloadMeta};

/// Step of a sync run, logged as the run progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Loading per-category watermarks.
    ReadingWatermarks,
    /// Reading new records from the source.
    ReadingRecords,
    /// Nothing new was found.
    NoData,
    /// Serializing the payload.
    BuildingPayload,
    /// Posting to webhook targets.
    Delivering,
    /// Advancing watermarks after delivery.
    CommittingWatermarks,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadingWatermarks => "reading_watermarks",
            Self::ReadingRecords => "reading_records",
            Self::NoData => "no_data",
            Self::BuildingPayload => "building_payload",
            Self::Delivering => "delivering",
            Self::CommittingWatermarks => "committing_watermarks",
        })
    }
}

fn enter(phase: SyncPhase) {
    debug!(%phase, "sync phase");
}

/// Message used when no enabled health category is granted.
pub const HEALTH_PERMISSION_MESSAGE: &str = "Health permissions not granted";

fn source_failure(err: SourceError) -> SyncFailure {
    match err {
        SourceError::Unavailable { reason } => SyncFailure::SourceUnavailable(reason),
        SourceError::Unauthorized { message } => SyncFailure::Unauthorized(message),
        other => SyncFailure::ReadFailed(other.to_string()),
    }
}

type RunResult<T> = Result<T, SyncFailure>;

/// Runs health and usage syncs end to end.
///
/// Runs of the same source are mutually exclusive; a run triggered while
/// another is in progress returns `AlreadyRunning` immediately. Health and
/// usage runs may overlap.
pub struct SyncService {
    settings: Settings,
    health: HealthAdapter,
    usage: UsageAdapter,
    dispatcher: WebhookDispatcher,
    clock: Arc<dyn Clock>,
    meta: PayloadMeta,
    health_lock: Mutex<()>,
    usage_lock: Mutex<()>,
}

impl SyncService {
    /// Creates a service.
    pub fn new(
        settings: Settings,
        health: HealthAdapter,
        usage: UsageAdapter,
        dispatcher: WebhookDispatcher,
        clock: Arc<dyn Clock>,
        meta: PayloadMeta,
    ) -> Self {
        Self {
            settings,
            health,
            usage,
            dispatcher,
            clock,
            meta,
            health_lock: Mutex::new(()),
            usage_lock: Mutex::new(()),
        }
    }

    /// Settings this service reads and commits to.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs the sync of `source`.
    pub async fn run(&self, source: SourceKind) -> SyncOutcome {
        match source {
            SourceKind::Health => self.run_health_sync().await,
            SourceKind::Usage => self.run_usage_sync().await,
        }
    }

    /// Syncs new health records to the health webhooks.
    pub async fn run_health_sync(&self) -> SyncOutcome {
        let Ok(_guard) = self.health_lock.try_lock() else {
            warn!(source = %SourceKind::Health, "sync already in progress");
            return SyncOutcome::failure(SyncFailure::AlreadyRunning);
        };
        let span = info_span!("sync_run", source = %SourceKind::Health);
        conclude(SourceKind::Health, self.health_sync().instrument(span).await)
    }

    /// Syncs reconstructed screen time to the usage webhooks.
    pub async fn run_usage_sync(&self) -> SyncOutcome {
        let Ok(_guard) = self.usage_lock.try_lock() else {
            warn!(source = %SourceKind::Usage, "sync already in progress");
            return SyncOutcome::failure(SyncFailure::AlreadyRunning);
        };
        let span = info_span!("sync_run", source = %SourceKind::Usage);
        conclude(SourceKind::Usage, self.usage_sync().instrument(span).await)
    }

    /// Builds the health payload that the next sync would send, without
    /// delivering, logging or committing anything.
    ///
    /// # Errors
    ///
    /// Fails with `NothingToPreview` when there is no new data, and with the
    /// same pre-flight and read failures as a sync.
    pub async fn preview_health(&self) -> Result<String, SyncFailure> {
        let snapshot = self.collect_health().await?;
        if snapshot.is_empty() {
            return Err(SyncFailure::NothingToPreview);
        }
        Ok(pretty(&health_payload(&snapshot, &self.meta, self.clock.now_utc())))
    }

    /// Builds the usage payload that the next sync would send, without
    /// delivering, logging or committing anything.
    ///
    /// # Errors
    ///
    /// Fails with `NothingToPreview` when no day has usage, and with
    /// authorization or read failures.
    pub async fn preview_usage(&self) -> Result<String, SyncFailure> {
        let days = self.collect_usage().await?;
        if days.is_empty() {
            return Err(SyncFailure::NothingToPreview);
        }
        Ok(pretty(&usage_payload(&days, &self.meta, self.clock.now_utc())))
    }

    async fn health_sync(&self) -> RunResult<SyncOutcome> {
        let targets = self.settings.webhook_targets(SourceKind::Health).await?;
        if targets.is_empty() {
            return Err(SyncFailure::NoTargets);
        }

        let snapshot = self.collect_health().await?;
        if snapshot.is_empty() {
            enter(SyncPhase::NoData);
            return Ok(SyncOutcome::NoData);
        }

        enter(SyncPhase::BuildingPayload);
        let payload = health_payload(&snapshot, &self.meta, self.clock.now_utc()).to_string();

        enter(SyncPhase::Delivering);
        let context =
            DeliveryContext { source: SourceKind::Health, record_count: snapshot.total_records() };
        self.dispatcher
            .post(&targets, &payload, context)
            .await
            .map_err(|e| SyncFailure::DeliveryFailed(e.to_string()))?;

        enter(SyncPhase::CommittingWatermarks);
        for (category, latest) in snapshot.latest_times() {
            let committed = self.settings.commit_watermark(category, latest).await?;
            debug!(%category, watermark = %committed, "watermark committed");
        }

        Ok(SyncOutcome::Success { counts: snapshot.counts(), days: None })
    }

    async fn collect_health(&self) -> RunResult<HealthSnapshot> {
        let enabled = self.settings.enabled_categories().await?;
        if enabled.is_empty() {
            return Err(SyncFailure::NoCategories);
        }

        let authorized = self.health.authorized_categories(&enabled).await.map_err(source_failure)?;
        if authorized.is_empty() {
            return Err(SyncFailure::Unauthorized(HEALTH_PERMISSION_MESSAGE.to_string()));
        }

        enter(SyncPhase::ReadingWatermarks);
        let watermarks = self.settings.watermarks(authorized.iter().copied()).await?;

        enter(SyncPhase::ReadingRecords);
        let snapshot = self
            .health
            .read(&authorized, &watermarks, self.clock.now_utc())
            .await
            .map_err(source_failure)?;
        debug!(records = snapshot.total_records(), "health records read");
        Ok(snapshot)
    }

    async fn usage_sync(&self) -> RunResult<SyncOutcome> {
        let targets = self.settings.webhook_targets(SourceKind::Usage).await?;
        if targets.is_empty() {
            return Err(SyncFailure::NoTargets);
        }

        let days = self.collect_usage().await?;
        if days.is_empty() {
            enter(SyncPhase::NoData);
            return Ok(SyncOutcome::NoData);
        }

        enter(SyncPhase::BuildingPayload);
        let now = self.clock.now_utc();
        let payload = usage_payload(&days, &self.meta, now).to_string();
        let app_entries: usize = days.iter().map(|d| d.apps.len()).sum();

        enter(SyncPhase::Delivering);
        let context = DeliveryContext { source: SourceKind::Usage, record_count: app_entries };
        self.dispatcher
            .post(&targets, &payload, context)
            .await
            .map_err(|e| SyncFailure::DeliveryFailed(e.to_string()))?;

        enter(SyncPhase::CommittingWatermarks);
        self.settings.commit_watermark(Category::ScreenTime, now).await?;

        Ok(SyncOutcome::Success {
            counts: BTreeMap::from([(Category::ScreenTime, app_entries)]),
            days: Some(days.len()),
        })
    }

    async fn collect_usage(&self) -> RunResult<Vec<UsageDay>> {
        let boundary = DayBoundary {
            enabled: self.settings.use_day_boundary().await?,
            hour: self.settings.day_boundary_hour().await?,
        };

        enter(SyncPhase::ReadingRecords);
        self.usage
            .read_days(boundary, self.clock.now_utc(), DEFAULT_LOOKBACK_DAYS)
            .await
            .map_err(source_failure)
    }
}

fn pretty(payload: &Value) -> String {
    format!("{payload:#}")
}

fn conclude(source: SourceKind, result: RunResult<SyncOutcome>) -> SyncOutcome {
    match result {
        Ok(outcome) => {
            info!(%source, records = outcome.total_records(), "{outcome}");
            outcome
        },
        Err(reason) => {
            warn!(%source, %reason, "sync failed");
            SyncOutcome::failure(reason)
        },
    }
}

impl fmt::Debug for SyncService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncService").field("meta", &self.meta).finish_non_exhaustive()
    }
}
