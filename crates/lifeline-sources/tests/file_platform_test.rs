//! Tests for the JSON-export backed platforms.

use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use chrono::{TimeZone, Utc};
use lifeline_core::Category;
use lifeline_sources::{
    Availability, FileHealthPlatform, FileUsageSource, HealthAdapter, HealthPlatform, TimeRange,
    UsageEventSource,
};
use tempfile::TempDir;

const HEALTH_EXPORT: &str = r#"{
  "granted": ["health.read.steps", "health.read.weight"],
  "unsupported": ["MINDFULNESS"],
  "records": {
    "STEPS": [
      { "start_time": "2024-03-05T06:00:00Z", "end_time": "2024-03-05T07:00:00Z",
        "values": { "count": { "value": 812, "unit": "count" } } },
      { "start_time": "2024-02-01T06:00:00Z", "end_time": "2024-02-01T07:00:00Z",
        "values": { "count": { "value": 90, "unit": "count" } } }
    ],
    "WEIGHT": [
      { "time": "2024-03-05T07:30:00Z", "values": { "mass": { "value": 160, "unit": "pounds" } } }
    ]
  }
}"#;

const USAGE_EXPORT: &str = r#"{
  "labels": { "com.example.reader": "Reader" },
  "events": [
    { "package": "com.example.reader", "kind": "foreground_enter", "timestamp": "2024-03-05T09:00:00Z" },
    { "package": "com.example.reader", "kind": "screen_off", "timestamp": "2024-03-05T09:05:00Z" },
    { "package": "com.example.reader", "kind": "foreground_exit", "timestamp": "2024-03-05T09:30:00Z" }
  ]
}"#;

/// Records outside the requested range are not returned.
#[tokio::test]
async fn health_export_is_filtered_by_range() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("health.json");
    std::fs::write(&path, HEALTH_EXPORT)?;
    let platform = FileHealthPlatform::open(&path).await?;

    let range = TimeRange {
        start: Utc.with_ymd_and_hms(2024, 2, 27, 12, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap(),
    };
    let records = platform.read_records(Category::Steps, range).await?;

    assert_eq!(records.len(), 1);
    assert!(!platform.supports(Category::Mindfulness));
    assert_eq!(platform.granted_capabilities().await?.len(), 2);
    Ok(())
}

/// Quantities in foreign units arrive converted.
#[tokio::test]
async fn health_export_feeds_adapter() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("health.json");
    std::fs::write(&path, HEALTH_EXPORT)?;
    let adapter = HealthAdapter::new(Arc::new(FileHealthPlatform::open(&path).await?));

    let now = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
    let snapshot = adapter
        .read(&[Category::Weight].into_iter().collect(), &BTreeMap::new(), now)
        .await?;

    let value = serde_json::to_value(&snapshot.records(Category::Weight)[0])?;
    let kilograms = value["kilograms"].as_f64().unwrap_or_default();
    assert!((kilograms - 72.574_779_2).abs() < 1e-6);
    Ok(())
}

/// A missing health export makes the platform unavailable.
#[tokio::test]
async fn missing_health_export_is_unavailable() -> Result<()> {
    let dir = TempDir::new()?;
    let platform = FileHealthPlatform::open(dir.path().join("absent.json")).await?;

    assert!(matches!(platform.availability().await, Availability::Unavailable { .. }));
    Ok(())
}

/// Usage exports default to authorized, ignore unknown event kinds and
/// provide labels.
#[tokio::test]
async fn usage_export_round_trip() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("usage.json");
    std::fs::write(&path, USAGE_EXPORT)?;
    let source = FileUsageSource::open(&path).await?;

    assert!(source.has_usage_authorization().await?);
    assert_eq!(source.app_label("com.example.reader").as_deref(), Some("Reader"));

    let events = source
        .query_events(
            Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap(),
        )
        .await?;
    assert_eq!(events.len(), 2);
    Ok(())
}

/// A missing usage export reads as "not authorized".
#[tokio::test]
async fn missing_usage_export_is_unauthorized() -> Result<()> {
    let dir = TempDir::new()?;
    let source = FileUsageSource::open(dir.path().join("absent.json")).await?;

    assert!(!source.has_usage_authorization().await?);
    Ok(())
}
