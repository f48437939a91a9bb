//! Domain models shared by every lifeline crate.
//!
//! Covers the category taxonomy, the two data sources, webhook targets, the
//! delivery attempt log entry and the tagged outcome of a sync run.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::CoreError;

/// Data source a category or a log entry belongs to.
///
/// Each source has its own webhook targets, sync interval and attempt log
/// tag. The wire identifiers are kept stable for downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Health records platform.
    #[serde(rename = "HEALTH_CONNECT")]
    Health,
    /// Device usage events.
    #[serde(rename = "SCREEN_TIME")]
    Usage,
}

impl SourceKind {
    /// Both sources, health first.
    pub const ALL: [SourceKind; 2] = [SourceKind::Health, SourceKind::Usage];

    /// Identifier used in payloads, CSV exports and as the log `data_type`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Health => "health_connect",
            Self::Usage => "screen_time",
        }
    }

    /// Prefix of this source's keys in the settings store.
    pub const fn settings_prefix(self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Usage => "screentime",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "health" | "health_connect" => Ok(Self::Health),
            "usage" | "screen_time" | "screentime" => Ok(Self::Usage),
            other => Err(CoreError::invalid_input(format!("unknown source: {other}"))),
        }
    }
}

/// Kind of metric collected from a data source.
///
/// The serialized form is the stable upper-case name that is also used for
/// enabled-category lists and watermark keys in the settings store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// Step count over an interval.
    Steps,
    /// Sleep session with stages.
    Sleep,
    /// Heart rate samples.
    HeartRate,
    /// Distance travelled.
    Distance,
    /// Active energy burned.
    ActiveCalories,
    /// Total energy burned.
    TotalCalories,
    /// Body weight.
    Weight,
    /// Body height.
    Height,
    /// Systolic and diastolic pressure.
    BloodPressure,
    /// Blood glucose level.
    BloodGlucose,
    /// Blood oxygen saturation.
    OxygenSaturation,
    /// Body temperature.
    BodyTemperature,
    /// Breaths per minute.
    RespiratoryRate,
    /// Resting heart rate.
    RestingHeartRate,
    /// Exercise session.
    Exercise,
    /// Water intake.
    Hydration,
    /// Nutrition intake.
    Nutrition,
    /// Mindfulness session.
    Mindfulness,
    /// Body fat percentage.
    BodyFat,
    /// Lean body mass.
    LeanBodyMass,
    /// Bone mass.
    BoneMass,
    /// Body water mass.
    BodyWaterMass,
    /// Heart rate variability (RMSSD).
    HeartRateVariability,
    /// Per-app foreground time reconstructed from usage events.
    ScreenTime,
}

impl Category {
    /// Every health category in declaration order.
    pub const HEALTH: [Category; 23] = [
        Category::Steps,
        Category::Sleep,
        Category::HeartRate,
        Category::Distance,
        Category::ActiveCalories,
        Category::TotalCalories,
        Category::Weight,
        Category::Height,
        Category::BloodPressure,
        Category::BloodGlucose,
        Category::OxygenSaturation,
        Category::BodyTemperature,
        Category::RespiratoryRate,
        Category::RestingHeartRate,
        Category::Exercise,
        Category::Hydration,
        Category::Nutrition,
        Category::Mindfulness,
        Category::BodyFat,
        Category::LeanBodyMass,
        Category::BoneMass,
        Category::BodyWaterMass,
        Category::HeartRateVariability,
    ];

    /// Stable upper-case name, e.g. `HEART_RATE`.
    pub const fn name(self) -> &'static str {
        self.labels().0
    }

    /// Human-readable name shown in settings and logs.
    pub const fn display_name(self) -> &'static str {
        self.labels().1
    }

    /// Field name of this category's array in the webhook payload.
    pub const fn payload_key(self) -> &'static str {
        self.labels().2
    }

    /// Identifier of the read authorization this category requires.
    pub fn capability(self) -> String {
        match self.source() {
            SourceKind::Health => format!("health.read.{}", self.payload_key()),
            SourceKind::Usage => "usage.read.events".to_string(),
        }
    }

    /// Source this category is read from.
    pub const fn source(self) -> SourceKind {
        match self {
            Self::ScreenTime => SourceKind::Usage,
            _ => SourceKind::Health,
        }
    }

    const fn labels(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::Steps => ("STEPS", "Steps", "steps"),
            Self::Sleep => ("SLEEP", "Sleep", "sleep"),
            Self::HeartRate => ("HEART_RATE", "Heart Rate", "heart_rate"),
            Self::Distance => ("DISTANCE", "Distance", "distance"),
            Self::ActiveCalories => ("ACTIVE_CALORIES", "Active Calories", "active_calories"),
            Self::TotalCalories => ("TOTAL_CALORIES", "Total Calories", "total_calories"),
            Self::Weight => ("WEIGHT", "Weight", "weight"),
            Self::Height => ("HEIGHT", "Height", "height"),
            Self::BloodPressure => ("BLOOD_PRESSURE", "Blood Pressure", "blood_pressure"),
            Self::BloodGlucose => ("BLOOD_GLUCOSE", "Blood Glucose", "blood_glucose"),
            Self::OxygenSaturation => {
                ("OXYGEN_SATURATION", "Oxygen Saturation", "oxygen_saturation")
            },
            Self::BodyTemperature => ("BODY_TEMPERATURE", "Body Temperature", "body_temperature"),
            Self::RespiratoryRate => ("RESPIRATORY_RATE", "Respiratory Rate", "respiratory_rate"),
            Self::RestingHeartRate => {
                ("RESTING_HEART_RATE", "Resting Heart Rate", "resting_heart_rate")
            },
            Self::Exercise => ("EXERCISE", "Exercise Sessions", "exercise"),
            Self::Hydration => ("HYDRATION", "Hydration", "hydration"),
            Self::Nutrition => ("NUTRITION", "Nutrition", "nutrition"),
            Self::Mindfulness => ("MINDFULNESS", "Mindfulness", "mindfulness"),
            Self::BodyFat => ("BODY_FAT", "Body Fat", "body_fat"),
            Self::LeanBodyMass => ("LEAN_BODY_MASS", "Lean Body Mass", "lean_body_mass"),
            Self::BoneMass => ("BONE_MASS", "Bone Mass", "bone_mass"),
            Self::BodyWaterMass => ("BODY_WATER_MASS", "Body Water Mass", "body_water_mass"),
            Self::HeartRateVariability => {
                ("HEART_RATE_VARIABILITY", "Heart Rate Variability", "heart_rate_variability")
            },
            Self::ScreenTime => ("SCREEN_TIME", "Screen Time", "screen_time"),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Category {
    type Err = CoreError;

    /// Accepts the upper-case name or the payload key, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::HEALTH
            .into_iter()
            .chain(std::iter::once(Self::ScreenTime))
            .find(|c| c.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CoreError::invalid_input(format!("unknown category: {wanted}")))
    }
}

/// A configured webhook destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookTarget {
    /// Destination URL.
    pub url: String,
    /// Custom headers sent with every request, e.g. for authentication.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl WebhookTarget {
    /// Creates a target without custom headers.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), headers: BTreeMap::new() }
    }
}

/// One entry of the delivery attempt log.
///
/// Written once per target per post, after the retry loop for that target
/// has finished. The timestamp is taken when delivery to the target began.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptLogEntry {
    /// Unique entry identifier.
    pub id: Uuid,
    /// Start of the delivery to this target.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Target URL.
    pub url: String,
    /// Final HTTP status, absent for transport failures.
    pub status_code: Option<u16>,
    /// Whether the target accepted the payload.
    pub success: bool,
    /// Last observed error, absent on success.
    pub error_message: Option<String>,
    /// Source identifier of the payload, e.g. `health_connect`.
    pub data_type: Option<String>,
    /// Number of records carried by the payload.
    pub record_count: Option<usize>,
    /// The JSON body that was sent.
    pub raw_payload: Option<String>,
    /// Source tag used for filtered reads and clears.
    #[serde(rename = "log_type")]
    pub source: SourceKind,
}

/// Reason a sync run did not deliver.
///
/// The `Display` output is the short message surfaced to users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncFailure {
    /// No webhook URL is configured for the source.
    #[error("No webhook URLs configured")]
    NoTargets,

    /// No category is enabled for the source.
    #[error("No data types enabled")]
    NoCategories,

    /// The user has not granted access to the source.
    #[error("{0}")]
    Unauthorized(String),

    /// The source cannot be queried on this device.
    #[error("Data source unavailable: {0}")]
    SourceUnavailable(String),

    /// The umbrella read failed.
    #[error("Failed to read data: {0}")]
    ReadFailed(String),

    /// Every webhook target failed; carries the last target's error.
    #[error("{0}")]
    DeliveryFailed(String),

    /// Another run of the same source is in progress.
    #[error("Sync already in progress")]
    AlreadyRunning,

    /// Settings could not be read or written.
    #[error("Settings storage error: {0}")]
    Storage(String),

    /// A preview found nothing new to show.
    #[error("No new data to preview")]
    NothingToPreview,
}

impl From<CoreError> for SyncFailure {
    fn from(err: CoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result of one sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every category came back empty; nothing was sent.
    NoData,
    /// The payload was accepted by at least one target and watermarks were
    /// committed.
    Success {
        /// Records synced per category.
        counts: BTreeMap<Category, usize>,
        /// Logical days covered, for usage syncs.
        days: Option<usize>,
    },
    /// The run stopped without committing anything.
    Failure {
        /// Why the run failed.
        reason: SyncFailure,
    },
}

impl SyncOutcome {
    /// Wraps a failure reason.
    pub fn failure(reason: impl Into<SyncFailure>) -> Self {
        Self::Failure { reason: reason.into() }
    }

    /// Returns true for [`SyncOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Total number of records synced, zero unless successful.
    pub fn total_records(&self) -> usize {
        match self {
            Self::Success { counts, .. } => counts.values().sum(),
            Self::NoData | Self::Failure { .. } => 0,
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => f.write_str("No new data to sync"),
            Self::Success { days: Some(days), .. } => {
                write!(f, "Synced {} apps across {days} days", self.total_records())
            },
            Self::Success { counts, days: None } => {
                write!(f, "Synced {} records in {} categories", self.total_records(), counts.len())
            },
            Self::Failure { reason } => write!(f, "Sync failed: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_names_round_trip_through_from_str() {
        for category in Category::HEALTH {
            assert_eq!(category.name().parse::<Category>().unwrap(), category);
            assert_eq!(category.payload_key(), category.name().to_ascii_lowercase());
        }
        assert_eq!("screen_time".parse::<Category>().unwrap(), Category::ScreenTime);
    }

    #[test]
    fn unknown_category_is_rejected() {
        assert!("TELEPATHY".parse::<Category>().is_err());
    }

    #[test]
    fn serde_uses_upper_case_names() {
        let json = serde_json::to_string(&Category::HeartRateVariability).unwrap();
        assert_eq!(json, "\"HEART_RATE_VARIABILITY\"");
    }

    #[test]
    fn categories_belong_to_expected_source() {
        assert!(Category::HEALTH.iter().all(|c| c.source() == SourceKind::Health));
        assert_eq!(Category::ScreenTime.source(), SourceKind::Usage);
        assert_eq!(Category::Exercise.display_name(), "Exercise Sessions");
        assert_eq!(Category::Steps.capability(), "health.read.steps");
    }

    #[test]
    fn source_kind_parses_aliases() {
        assert_eq!("health".parse::<SourceKind>().unwrap(), SourceKind::Health);
        assert_eq!("SCREEN_TIME".parse::<SourceKind>().unwrap(), SourceKind::Usage);
        assert!("fitness".parse::<SourceKind>().is_err());
    }

    #[test]
    fn sync_failure_messages_are_user_facing() {
        assert_eq!(SyncFailure::NoTargets.to_string(), "No webhook URLs configured");
        assert_eq!(SyncFailure::NoCategories.to_string(), "No data types enabled");
        assert_eq!(
            SyncFailure::DeliveryFailed("HTTP 500: Internal Server Error".into()).to_string(),
            "HTTP 500: Internal Server Error"
        );
    }

    #[test]
    fn attempt_log_entry_serializes_source_tag() {
        let entry = AttemptLogEntry {
            id: Uuid::nil(),
            timestamp: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            url: "https://example.com/hook".into(),
            status_code: Some(200),
            success: true,
            error_message: None,
            data_type: Some("health_connect".into()),
            record_count: Some(4),
            raw_payload: None,
            source: SourceKind::Health,
        };

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["log_type"], "HEALTH_CONNECT");
        assert_eq!(value["timestamp"], 1_700_000_000_000_i64);

        let back: AttemptLogEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn outcome_totals_only_count_successes() {
        let counts = BTreeMap::from([(Category::Steps, 3), (Category::HeartRate, 10)]);
        let success = SyncOutcome::Success { counts, days: None };
        assert_eq!(success.total_records(), 13);
        assert_eq!(SyncOutcome::NoData.total_records(), 0);
        assert!(!SyncOutcome::failure(SyncFailure::NoTargets).is_success());
    }
}
