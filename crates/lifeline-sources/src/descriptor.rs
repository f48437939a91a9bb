//! Per-category extraction descriptors.
//!
//! Every health category is read the same way; what differs is which raw
//! quantities are picked, which unit the payload uses and which timestamp
//! drives the watermark. That variation lives in one table here instead of
//! in per-category read functions.

use lifeline_core::Category;

use crate::{
    error::{Result, SourceError},
    record::{HealthRecord, Measure, RawRecord, RecordBody, SleepStage},
    units::Unit,
};

/// How a raw record maps onto payload records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// One quantity over `start_time..end_time`.
    Interval {
        /// Key of the quantity in [`RawRecord::values`].
        input: &'static str,
        /// Payload field name.
        field: &'static str,
        /// Payload unit.
        unit: Unit,
        /// Whether the payload value is rounded to an integer.
        integer: bool,
    },
    /// One quantity observed at `time`.
    Instant {
        /// Key of the quantity in [`RawRecord::values`].
        input: &'static str,
        /// Payload field name.
        field: &'static str,
        /// Payload unit.
        unit: Unit,
        /// Whether the payload value is rounded to an integer.
        integer: bool,
    },
    /// Series flattened into one integer record per sample.
    Series {
        /// Payload field name of each sample value.
        field: &'static str,
    },
    /// Systolic and diastolic quantities.
    BloodPressure,
    /// Session with nested stages.
    Sleep,
    /// Session labelled with an exercise type.
    Exercise,
    /// Interval with optional nutrients.
    Nutrition,
    /// Session with an optional title.
    Mindfulness,
}

/// Extraction rules for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    /// Category described.
    pub category: Category,
    /// Extraction shape.
    pub shape: Shape,
}

const fn interval(input: &'static str, field: &'static str, unit: Unit, integer: bool) -> Shape {
    Shape::Interval { input, field, unit, integer }
}

const fn instant(input: &'static str, field: &'static str, unit: Unit, integer: bool) -> Shape {
    Shape::Instant { input, field, unit, integer }
}

impl Descriptor {
    /// Returns the descriptor of a health category, `None` for usage.
    pub fn for_category(category: Category) -> Option<Self> {
        let shape = match category {
            Category::Steps => interval("count", "count", Unit::Count, true),
            Category::Sleep => Shape::Sleep,
            Category::HeartRate => Shape::Series { field: "bpm" },
            Category::Distance => interval("distance", "meters", Unit::Meters, false),
            Category::ActiveCalories | Category::TotalCalories => {
                interval("energy", "calories", Unit::Kilocalories, false)
            },
            Category::Weight
            | Category::LeanBodyMass
            | Category::BoneMass
            | Category::BodyWaterMass => instant("mass", "kilograms", Unit::Kilograms, false),
            Category::Height => instant("height", "meters", Unit::Meters, false),
            Category::BloodPressure => Shape::BloodPressure,
            Category::BloodGlucose => {
                instant("level", "mmol_per_liter", Unit::MillimolesPerLiter, false)
            },
            Category::OxygenSaturation | Category::BodyFat => {
                instant("percentage", "percentage", Unit::Percent, false)
            },
            Category::BodyTemperature => instant("temperature", "celsius", Unit::Celsius, false),
            Category::RespiratoryRate => instant("rate", "rate", Unit::BreathsPerMinute, false),
            Category::RestingHeartRate => instant("bpm", "bpm", Unit::BeatsPerMinute, true),
            Category::Exercise => Shape::Exercise,
            Category::Hydration => interval("volume", "liters", Unit::Liters, false),
            Category::Nutrition => Shape::Nutrition,
            Category::Mindfulness => Shape::Mindfulness,
            Category::HeartRateVariability => {
                instant("rmssd", "heart_rate_variability_millis", Unit::Milliseconds, false)
            },
            Category::ScreenTime => return None,
        };
        Some(Self { category, shape })
    }

    /// Converts one raw record into payload records.
    ///
    /// Series records yield one record per sample; every other shape yields
    /// exactly one.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::MalformedRecord` when a required timestamp or
    /// quantity is missing or carries an incompatible unit.
    pub fn convert(&self, raw: &RawRecord) -> Result<Vec<HealthRecord>> {
        let body = match self.shape {
            Shape::Interval { input, field, unit, integer } => RecordBody::Interval {
                field,
                value: measure(raw, input, unit, integer)?,
                start_time: required(raw.start_time, "start_time")?,
                end_time: required(raw.end_time, "end_time")?,
            },
            Shape::Instant { input, field, unit, integer } => RecordBody::Instant {
                field,
                value: measure(raw, input, unit, integer)?,
                time: required(raw.time, "time")?,
            },
            Shape::Series { field } => {
                return Ok(raw
                    .samples
                    .iter()
                    .map(|sample| HealthRecord {
                        category: self.category,
                        body: RecordBody::Instant {
                            field,
                            value: Measure::Integer(sample.value.round() as i64),
                            time: sample.time,
                        },
                    })
                    .collect());
            },
            Shape::BloodPressure => RecordBody::BloodPressure {
                systolic: quantity(raw, "systolic", Unit::MillimetersOfMercury)?,
                diastolic: quantity(raw, "diastolic", Unit::MillimetersOfMercury)?,
                time: required(raw.time, "time")?,
            },
            Shape::Sleep => RecordBody::Sleep {
                start_time: required(raw.start_time, "start_time")?,
                end_time: required(raw.end_time, "end_time")?,
                stages: raw
                    .stages
                    .iter()
                    .map(|s| SleepStage {
                        stage: s.stage.clone(),
                        start_time: s.start_time,
                        end_time: s.end_time,
                    })
                    .collect(),
            },
            Shape::Exercise => RecordBody::Exercise {
                exercise_type: raw
                    .labels
                    .get("exercise_type")
                    .cloned()
                    .unwrap_or_else(|| "0".to_string()),
                start_time: required(raw.start_time, "start_time")?,
                end_time: required(raw.end_time, "end_time")?,
            },
            Shape::Nutrition => RecordBody::Nutrition {
                calories: optional_quantity(raw, "energy", Unit::Kilocalories)?,
                protein_grams: optional_quantity(raw, "protein", Unit::Grams)?,
                carbs_grams: optional_quantity(raw, "carbs", Unit::Grams)?,
                fat_grams: optional_quantity(raw, "fat", Unit::Grams)?,
                start_time: required(raw.start_time, "start_time")?,
                end_time: required(raw.end_time, "end_time")?,
            },
            Shape::Mindfulness => RecordBody::Mindfulness {
                title: raw.labels.get("title").cloned(),
                start_time: required(raw.start_time, "start_time")?,
                end_time: required(raw.end_time, "end_time")?,
            },
        };

        Ok(vec![HealthRecord { category: self.category, body }])
    }
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| SourceError::malformed(format!("missing {name}")))
}

fn optional_quantity(raw: &RawRecord, key: &str, unit: Unit) -> Result<Option<f64>> {
    raw.values.get(key).map(|q| q.in_unit(unit)).transpose()
}

fn quantity(raw: &RawRecord, key: &str, unit: Unit) -> Result<f64> {
    required(optional_quantity(raw, key, unit)?, key)
}

fn measure(raw: &RawRecord, key: &str, unit: Unit, integer: bool) -> Result<Measure> {
    let value = quantity(raw, key, unit)?;
    Ok(if integer { Measure::Integer(value.round() as i64) } else { Measure::Decimal(value) })
}
