//! Integration tests for usage reconstruction across logical days.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use lifeline_sources::{
    mock::MockUsageSource, usage::aggregate_day, DayBoundary, LocalZone, SourceError,
    UsageAdapter, UsageEvent, UsageEventKind, PERMISSION_MESSAGE,
};
use proptest::prelude::*;

fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, d, h, m, 0).unwrap()
}

fn enter(package: &str, at: DateTime<Utc>) -> UsageEvent {
    UsageEvent { package: package.into(), kind: UsageEventKind::ForegroundEnter, timestamp: at }
}

fn exit(package: &str, at: DateTime<Utc>) -> UsageEvent {
    UsageEvent { package: package.into(), kind: UsageEventKind::ForegroundExit, timestamp: at }
}

fn adapter(source: &MockUsageSource) -> UsageAdapter {
    UsageAdapter::new(Arc::new(source.clone()), LocalZone::Fixed(FixedOffset::east_opt(0).unwrap()))
}

/// Events before the boundary hour count toward the previous logical day,
/// and days come back newest first.
#[tokio::test]
async fn events_are_bucketed_by_logical_day() -> Result<()> {
    let source = MockUsageSource::new().with_label("com.example.reader", "Reader");
    source
        .add_events([
            enter("com.example.reader", utc(5, 2, 0)),
            exit("com.example.reader", utc(5, 2, 30)),
            enter("com.example.reader", utc(5, 9, 0)),
            exit("com.example.reader", utc(5, 9, 20)),
        ])
        .await;

    let days = adapter(&source).read_days(DayBoundary::default(), utc(5, 12, 0), 7).await?;

    let dates: Vec<_> = days.iter().map(|d| d.date).collect();
    assert_eq!(
        dates,
        [NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()]
    );
    assert_eq!(days[0].total_ms(), 20 * 60_000);
    assert_eq!(days[1].apps[0].total_ms, 30 * 60_000);
    assert_eq!(days[1].apps[0].name, "Reader");
    assert_eq!(source.queries().await.len(), 7);
    Ok(())
}

/// With the boundary disabled the same early event stays on its calendar
/// date.
#[tokio::test]
async fn disabled_boundary_uses_midnight() -> Result<()> {
    let source = MockUsageSource::new();
    source
        .add_events([enter("com.example.chat", utc(5, 2, 0)), exit("com.example.chat", utc(5, 2, 30))])
        .await;

    let boundary = DayBoundary { enabled: false, hour: 4 };
    let days = adapter(&source).read_days(boundary, utc(5, 12, 0), 7).await?;

    assert_eq!(days.len(), 1);
    assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    Ok(())
}

/// Missing usage access fails with the user-facing message.
#[tokio::test]
async fn denied_access_fails() -> Result<()> {
    let source = MockUsageSource::new();
    source.deny_authorization().await;

    let result = adapter(&source).read_days(DayBoundary::default(), utc(5, 12, 0), 7).await;

    assert_eq!(result, Err(SourceError::unauthorized(PERMISSION_MESSAGE)));
    assert!(source.queries().await.is_empty());
    Ok(())
}

/// A failing event query fails the whole read.
#[tokio::test]
async fn query_failure_fails_read() -> Result<()> {
    let source = MockUsageSource::new();
    source.inject_query_error("service died").await;

    let result = adapter(&source).read_days(DayBoundary::default(), utc(5, 12, 0), 7).await;

    assert!(matches!(result, Err(SourceError::Io(_))));
    Ok(())
}

/// No app above the noise floor means no days at all.
#[tokio::test]
async fn short_sessions_yield_no_days() -> Result<()> {
    let source = MockUsageSource::new();
    source.add_events([enter("com.blip", utc(5, 9, 0)), exit("com.blip", utc(5, 9, 1))]).await;

    let days = adapter(&source).read_days(DayBoundary::default(), utc(5, 12, 0), 7).await?;

    assert!(days.is_empty());
    Ok(())
}

fn session_events() -> impl Strategy<Value = Vec<UsageEvent>> {
    let packages = prop::sample::select(vec!["a.one", "b.two", "c.three"]);
    prop::collection::vec((packages, any::<bool>(), 0_i64..(36 * 60)), 0..40).prop_map(|raw| {
        let base = utc(4, 0, 0);
        let mut events: Vec<_> = raw
            .into_iter()
            .map(|(package, is_enter, minute)| UsageEvent {
                package: package.to_string(),
                kind: if is_enter { UsageEventKind::ForegroundEnter } else { UsageEventKind::ForegroundExit },
                timestamp: base + chrono::Duration::minutes(minute),
            })
            .collect();
        events.sort_by_key(|e| e.timestamp);
        events
    })
}

proptest! {
    /// Per-app totals stay above the noise floor, never exceed the window
    /// and come out longest first.
    #[test]
    fn aggregated_totals_are_bounded_and_sorted(events in session_events()) {
        let window = DayBoundary::default().window(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(), &Utc);
        let apps = aggregate_day(&events, &window, utc(6, 0, 0), |_| None);

        let window_ms = (window.end - window.start).num_milliseconds();
        for app in &apps {
            prop_assert!(app.total_ms > 60_000);
            prop_assert!(app.total_ms <= window_ms * 3);
        }
        for pair in apps.windows(2) {
            prop_assert!(pair[0].total_ms >= pair[1].total_ms);
        }
    }

    /// With the boundary enabled, a time's logical date is its calendar
    /// date or the day before, and only before the boundary hour.
    #[test]
    fn logical_date_shifts_only_before_boundary(hour in 0_u32..24, minute in 0_u32..60, boundary in 0_u32..24) {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, hour, minute, 0).unwrap();
        let day = DayBoundary { enabled: true, hour: boundary };

        let expected = if hour < boundary { 4 } else { 5 };
        prop_assert_eq!(day.logical_date(&at), NaiveDate::from_ymd_opt(2024, 3, expected).unwrap());
        prop_assert_eq!(DayBoundary { enabled: false, hour: boundary }.logical_date(&at), at.date_naive());
    }
}
