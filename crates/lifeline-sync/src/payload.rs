//! Webhook payload construction.
//!
//! Pure functions from collected data to the JSON document that is posted.
//! Both builders are total: any snapshot, including an empty one, produces
//! a valid object.

use chrono::{DateTime, Utc};
use lifeline_core::SourceKind;
use lifeline_sources::{record::iso8601, AppUsage, HealthSnapshot, UsageDay};
use serde_json::{json, Map, Value};

/// Constant metadata stamped on every payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadMeta {
    /// Version string reported as `app_version`.
    pub app_version: String,
    /// Device description reported as `device` on usage payloads.
    pub device: String,
}

impl Default for PayloadMeta {
    fn default() -> Self {
        Self { app_version: "1.0".to_string(), device: "lifeline".to_string() }
    }
}

/// Builds the health payload.
///
/// Carries `timestamp`, `app_version` and `source`, plus one array per
/// category that has records. Empty categories are omitted entirely.
pub fn health_payload(
    snapshot: &HealthSnapshot,
    meta: &PayloadMeta,
    timestamp: DateTime<Utc>,
) -> Value {
    let mut payload = Map::new();
    payload.insert("timestamp".into(), json!(iso8601(&timestamp)));
    payload.insert("app_version".into(), json!(meta.app_version));
    payload.insert("source".into(), json!(SourceKind::Health.as_str()));

    for (category, records) in snapshot.non_empty() {
        payload.insert(category.payload_key().into(), json!(records));
    }

    Value::Object(payload)
}

fn app_entry(app: &AppUsage) -> Value {
    json!({
        "package": app.package,
        "name": app.name,
        "seconds": app.total_ms / 1000,
        "minutes": app.total_ms / 60_000,
        "last_used": iso8601(&app.last_used),
    })
}

/// Builds the usage payload with one entry per logical day.
pub fn usage_payload(days: &[UsageDay], meta: &PayloadMeta, timestamp: DateTime<Utc>) -> Value {
    let screen_time: Vec<Value> = days
        .iter()
        .map(|day| {
            let total = day.total_ms();
            json!({
                "date": day.date.format("%Y-%m-%d").to_string(),
                "total_screen_time_seconds": total / 1000,
                "total_screen_time_minutes": total / 60_000,
                "apps": day.apps.iter().map(app_entry).collect::<Vec<_>>(),
            })
        })
        .collect();

    json!({
        "timestamp": iso8601(&timestamp),
        "app_version": meta.app_version,
        "device": meta.device,
        "source": SourceKind::Usage.as_str(),
        "screen_time": screen_time,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};
    use lifeline_core::Category;
    use lifeline_sources::{HealthRecord, Measure, RecordBody};

    use super::*;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, h, 0, 0).unwrap()
    }

    fn heart_rate(bpm: i64, h: u32) -> HealthRecord {
        HealthRecord {
            category: Category::HeartRate,
            body: RecordBody::Instant { field: "bpm", value: Measure::Integer(bpm), time: at(h) },
        }
    }

    #[test]
    fn only_populated_categories_appear() {
        let mut snapshot = HealthSnapshot::new();
        snapshot.insert(Category::HeartRate, vec![heart_rate(62, 6), heart_rate(70, 7)]);
        snapshot.insert(Category::Steps, Vec::new());

        let payload = health_payload(&snapshot, &PayloadMeta::default(), at(12));
        let object = payload.as_object().unwrap();

        let mut keys: Vec<_> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["app_version", "heart_rate", "source", "timestamp"]);
        assert_eq!(object["source"], "health_connect");
        assert_eq!(object["heart_rate"][1]["bpm"], 70);
    }

    #[test]
    fn empty_snapshot_still_builds() {
        let payload = health_payload(&HealthSnapshot::new(), &PayloadMeta::default(), at(12));
        assert_eq!(payload.as_object().map(Map::len), Some(3));
        assert_eq!(payload["timestamp"], "2024-03-05T12:00:00Z");
    }

    #[test]
    fn usage_payload_shape() {
        let days = vec![UsageDay {
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            apps: vec![AppUsage {
                package: "com.example.reader".into(),
                name: "Reader".into(),
                total_ms: 1_830_000,
                last_used: Utc.with_ymd_and_hms(2024, 3, 4, 21, 15, 0).unwrap(),
            }],
        }];
        let meta = PayloadMeta { app_version: "1.0".into(), device: "Pixel 8".into() };

        insta::assert_json_snapshot!(usage_payload(&days, &meta, at(12)), @r#"
        {
          "app_version": "1.0",
          "device": "Pixel 8",
          "screen_time": [
            {
              "apps": [
                {
                  "last_used": "2024-03-04T21:15:00Z",
                  "minutes": 30,
                  "name": "Reader",
                  "package": "com.example.reader",
                  "seconds": 1830
                }
              ],
              "date": "2024-03-04",
              "total_screen_time_minutes": 30,
              "total_screen_time_seconds": 1830
            }
          ],
          "source": "screen_time",
          "timestamp": "2024-03-05T12:00:00Z"
        }
        "#);
    }
}
