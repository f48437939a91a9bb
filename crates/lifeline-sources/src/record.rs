//! Raw platform records and the normalized records that go into payloads.
//!
//! A [`RawRecord`] is what a platform hands back: timestamps, a bag of
//! quantities keyed by name, free-form labels, nested samples and stages.
//! The descriptor table turns it into one or more [`HealthRecord`]s whose
//! serialized form is exactly the payload entry for that category.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use lifeline_core::Category;
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};

use crate::units::Quantity;

/// Formats an instant as ISO-8601 UTC, dropping zero fractional seconds.
pub fn iso8601(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// A record as returned by a health platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Start of an interval or session.
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// End of an interval or session.
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Observation time of an instantaneous record.
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    /// Measured quantities, e.g. `count`, `distance`, `energy`.
    #[serde(default)]
    pub values: BTreeMap<String, Quantity>,
    /// Free-form labels, e.g. `exercise_type`, `title`.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Samples of a series record such as heart rate.
    #[serde(default)]
    pub samples: Vec<RawSample>,
    /// Stages of a sleep session.
    #[serde(default)]
    pub stages: Vec<RawStage>,
}

/// One sample of a series record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Sample time.
    pub time: DateTime<Utc>,
    /// Sampled value in the record's native unit.
    pub value: f64,
}

/// One stage of a sleep session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStage {
    /// Stage identifier as reported by the platform.
    pub stage: String,
    /// Stage start.
    pub start_time: DateTime<Utc>,
    /// Stage end.
    pub end_time: DateTime<Utc>,
}

/// A numeric payload value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measure {
    /// Whole number, e.g. a step count or beats per minute.
    Integer(i64),
    /// Fractional value in the payload unit.
    Decimal(f64),
}

impl Serialize for Measure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Integer(v) => serializer.serialize_i64(*v),
            Self::Decimal(v) => serializer.serialize_f64(*v),
        }
    }
}

/// Sleep stage with its own duration.
#[derive(Debug, Clone, PartialEq)]
pub struct SleepStage {
    /// Stage identifier.
    pub stage: String,
    /// Stage start.
    pub start_time: DateTime<Utc>,
    /// Stage end.
    pub end_time: DateTime<Utc>,
}

impl Serialize for SleepStage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("stage", &self.stage)?;
        map.serialize_entry("start_time", &iso8601(&self.start_time))?;
        map.serialize_entry("end_time", &iso8601(&self.end_time))?;
        map.serialize_entry("duration_seconds", &duration_seconds(self.start_time, self.end_time))?;
        map.end()
    }
}

/// Category-specific content of a normalized record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordBody {
    /// One value measured over a time range.
    Interval {
        /// Payload field name of the value.
        field: &'static str,
        /// Value in the payload unit.
        value: Measure,
        /// Range start.
        start_time: DateTime<Utc>,
        /// Range end.
        end_time: DateTime<Utc>,
    },
    /// One value observed at an instant.
    Instant {
        /// Payload field name of the value.
        field: &'static str,
        /// Value in the payload unit.
        value: Measure,
        /// Observation time.
        time: DateTime<Utc>,
    },
    /// Systolic and diastolic pressure in mmHg.
    BloodPressure {
        /// Systolic pressure.
        systolic: f64,
        /// Diastolic pressure.
        diastolic: f64,
        /// Observation time.
        time: DateTime<Utc>,
    },
    /// Sleep session with nested stages.
    Sleep {
        /// Session start, used only for the duration.
        start_time: DateTime<Utc>,
        /// Session end.
        end_time: DateTime<Utc>,
        /// Stages in platform order.
        stages: Vec<SleepStage>,
    },
    /// Exercise session.
    Exercise {
        /// Exercise type identifier.
        exercise_type: String,
        /// Session start.
        start_time: DateTime<Utc>,
        /// Session end.
        end_time: DateTime<Utc>,
    },
    /// Nutrition intake; absent nutrients are omitted.
    Nutrition {
        /// Energy in kcal.
        calories: Option<f64>,
        /// Protein in grams.
        protein_grams: Option<f64>,
        /// Carbohydrates in grams.
        carbs_grams: Option<f64>,
        /// Fat in grams.
        fat_grams: Option<f64>,
        /// Range start.
        start_time: DateTime<Utc>,
        /// Range end.
        end_time: DateTime<Utc>,
    },
    /// Mindfulness session.
    Mindfulness {
        /// Optional session title.
        title: Option<String>,
        /// Session start.
        start_time: DateTime<Utc>,
        /// Session end.
        end_time: DateTime<Utc>,
    },
}

/// A record normalized into payload units.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthRecord {
    /// Category the record belongs to.
    pub category: Category,
    /// Category-specific fields.
    pub body: RecordBody,
}

impl HealthRecord {
    /// Timestamp compared against and committed as the category watermark.
    ///
    /// End time for interval and session records, observation time for
    /// instantaneous ones.
    pub fn watermark_time(&self) -> DateTime<Utc> {
        match &self.body {
            RecordBody::Interval { end_time, .. }
            | RecordBody::Sleep { end_time, .. }
            | RecordBody::Exercise { end_time, .. }
            | RecordBody::Nutrition { end_time, .. }
            | RecordBody::Mindfulness { end_time, .. } => *end_time,
            RecordBody::Instant { time, .. } | RecordBody::BloodPressure { time, .. } => *time,
        }
    }
}

fn duration_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds()
}

impl Serialize for HealthRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match &self.body {
            RecordBody::Interval { field, value, start_time, end_time } => {
                map.serialize_entry(*field, value)?;
                map.serialize_entry("start_time", &iso8601(start_time))?;
                map.serialize_entry("end_time", &iso8601(end_time))?;
            },
            RecordBody::Instant { field, value, time } => {
                map.serialize_entry(*field, value)?;
                map.serialize_entry("time", &iso8601(time))?;
            },
            RecordBody::BloodPressure { systolic, diastolic, time } => {
                map.serialize_entry("systolic", systolic)?;
                map.serialize_entry("diastolic", diastolic)?;
                map.serialize_entry("time", &iso8601(time))?;
            },
            RecordBody::Sleep { start_time, end_time, stages } => {
                map.serialize_entry("session_end_time", &iso8601(end_time))?;
                map.serialize_entry("duration_seconds", &duration_seconds(*start_time, *end_time))?;
                map.serialize_entry("stages", stages)?;
            },
            RecordBody::Exercise { exercise_type, start_time, end_time } => {
                map.serialize_entry("type", exercise_type)?;
                map.serialize_entry("start_time", &iso8601(start_time))?;
                map.serialize_entry("end_time", &iso8601(end_time))?;
                map.serialize_entry("duration_seconds", &duration_seconds(*start_time, *end_time))?;
            },
            RecordBody::Nutrition {
                calories,
                protein_grams,
                carbs_grams,
                fat_grams,
                start_time,
                end_time,
            } => {
                if let Some(v) = calories {
                    map.serialize_entry("calories", v)?;
                }
                if let Some(v) = protein_grams {
                    map.serialize_entry("protein_grams", v)?;
                }
                if let Some(v) = carbs_grams {
                    map.serialize_entry("carbs_grams", v)?;
                }
                if let Some(v) = fat_grams {
                    map.serialize_entry("fat_grams", v)?;
                }
                map.serialize_entry("start_time", &iso8601(start_time))?;
                map.serialize_entry("end_time", &iso8601(end_time))?;
            },
            RecordBody::Mindfulness { title, start_time, end_time } => {
                if let Some(t) = title {
                    map.serialize_entry("title", t)?;
                }
                map.serialize_entry("start_time", &iso8601(start_time))?;
                map.serialize_entry("end_time", &iso8601(end_time))?;
                map.serialize_entry("duration_seconds", &duration_seconds(*start_time, *end_time))?;
            },
        }
        map.end()
    }
}
