//! Per-app foreground time reconstructed from raw usage events.
//!
//! Pre-aggregated usage tables are unreliable at day granularity, so the
//! adapter pairs foreground-enter and foreground-exit events inside each
//! logical day window. A logical day runs from the boundary hour on one
//! calendar date to the boundary hour on the next.

use std::{collections::HashMap, sync::Arc};

use chrono::{
    DateTime, Duration, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Timelike, Utc,
};
use lifeline_core::storage::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SourceError};

/// Per-app totals at or below this many milliseconds are dropped.
pub const NOISE_FLOOR_MS: i64 = 60_000;

/// Logical days read by a usage sync, today included.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;

/// Message returned when usage access has not been granted.
pub const PERMISSION_MESSAGE: &str = "Usage stats permission not granted";

/// Kind of a raw usage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageEventKind {
    /// An app came to the foreground.
    ForegroundEnter,
    /// An app left the foreground.
    ForegroundExit,
    /// Any other event; ignored.
    #[serde(other)]
    Other,
}

/// One raw usage event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Package identifier, e.g. `com.example.reader`.
    pub package: String,
    /// Event kind.
    pub kind: UsageEventKind,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
}

/// Platform that records usage events.
pub trait UsageEventSource: Send + Sync + 'static {
    /// Returns true when the user has granted usage access.
    fn has_usage_authorization(&self) -> BoxFuture<'_, Result<bool>>;

    /// Returns the events in `[start, end)`.
    fn query_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<UsageEvent>>>;

    /// Human-readable label of an installed app.
    fn app_label(&self, _package: &str) -> Option<String> {
        None
    }
}

/// Configurable start hour of a logical day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBoundary {
    /// Whether the boundary applies; midnight is used otherwise.
    pub enabled: bool,
    /// Boundary hour, 0 to 23.
    pub hour: u32,
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self { enabled: true, hour: 4 }
    }
}

/// One logical day as a UTC window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    /// Logical date.
    pub date: NaiveDate,
    /// Window start, the boundary hour on `date`.
    pub start: DateTime<Utc>,
    /// Window end, the boundary hour on the following date.
    pub end: DateTime<Utc>,
}

impl DayBoundary {
    /// Boundary hour actually applied.
    pub fn effective_hour(&self) -> u32 {
        if self.enabled {
            self.hour.min(23)
        } else {
            0
        }
    }

    /// Logical date of `at`: times before the boundary hour belong to the
    /// previous calendar date.
    pub fn logical_date<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> NaiveDate {
        let date = at.date_naive();
        if self.enabled && at.hour() < self.effective_hour() {
            date.pred_opt().unwrap_or(date)
        } else {
            date
        }
    }

    /// Window of the logical day `date` in zone `tz`.
    pub fn window<Tz: TimeZone>(&self, date: NaiveDate, tz: &Tz) -> DayWindow {
        let at_boundary = NaiveTime::from_hms_opt(self.effective_hour(), 0, 0).unwrap_or_default();
        let next = date.succ_opt().unwrap_or(date);
        DayWindow {
            date,
            start: resolve_local(tz, date.and_time(at_boundary)),
            end: resolve_local(tz, next.and_time(at_boundary)),
        }
    }
}

/// Maps a local wall time to UTC, taking the earlier instant when the time
/// is repeated and skipping forward when it falls into a gap.
fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t.with_timezone(&Utc),
        LocalResult::None => tz
            .from_local_datetime(&(local + Duration::hours(1)))
            .earliest()
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&local)),
    }
}

/// Zone logical days are computed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalZone {
    /// The system's local zone.
    #[default]
    System,
    /// A fixed UTC offset.
    Fixed(FixedOffset),
}

impl LocalZone {
    /// Windows of the last `days` logical days, today first.
    pub fn day_windows(
        &self,
        boundary: DayBoundary,
        now: DateTime<Utc>,
        days: u32,
    ) -> Vec<DayWindow> {
        match self {
            Self::System => windows_in(&Local, boundary, now, days),
            Self::Fixed(offset) => windows_in(offset, boundary, now, days),
        }
    }
}

fn windows_in<Tz: TimeZone>(
    tz: &Tz,
    boundary: DayBoundary,
    now: DateTime<Utc>,
    days: u32,
) -> Vec<DayWindow> {
    let today = boundary.logical_date(&now.with_timezone(tz));
    (0..days)
        .filter_map(|offset| today.checked_sub_signed(Duration::days(i64::from(offset))))
        .map(|date| boundary.window(date, tz))
        .collect()
}

/// Foreground time of one app on one logical day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppUsage {
    /// Package identifier.
    pub package: String,
    /// Display name.
    pub name: String,
    /// Foreground time in milliseconds.
    pub total_ms: i64,
    /// Last enter or exit event, or the window end if none was seen.
    pub last_used: DateTime<Utc>,
}

/// Usage of one logical day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageDay {
    /// Logical date.
    pub date: NaiveDate,
    /// Apps sorted by foreground time, longest first.
    pub apps: Vec<AppUsage>,
}

impl UsageDay {
    /// Sum of the app totals in milliseconds.
    pub fn total_ms(&self) -> i64 {
        self.apps.iter().map(|a| a.total_ms).sum()
    }
}

/// Fallback display name: the package segment after the last `.`.
pub fn fallback_label(package: &str) -> String {
    package.rsplit('.').next().unwrap_or(package).to_string()
}

/// Pairs enter and exit events inside `window` into per-app totals.
///
/// `events` must be sorted by timestamp. Sessions that began before the
/// window are clamped to its start; sessions still open are closed at the
/// earlier of the window end and `now`. A session whose enter event lies in
/// an earlier window is not seen at all.
pub fn aggregate_day(
    events: &[UsageEvent],
    window: &DayWindow,
    now: DateTime<Utc>,
    label: impl Fn(&str) -> Option<String>,
) -> Vec<AppUsage> {
    let mut totals: HashMap<&str, i64> = HashMap::new();
    let mut last_used: HashMap<&str, DateTime<Utc>> = HashMap::new();
    let mut open: HashMap<&str, DateTime<Utc>> = HashMap::new();

    for event in events {
        let package = event.package.as_str();
        match event.kind {
            UsageEventKind::ForegroundEnter => {
                open.insert(package, event.timestamp);
                last_used.insert(package, event.timestamp);
            },
            UsageEventKind::ForegroundExit => {
                if let Some(started) = open.remove(package) {
                    let effective = started.max(window.start);
                    let millis = (event.timestamp - effective).num_milliseconds();
                    if millis > 0 {
                        *totals.entry(package).or_default() += millis;
                    }
                }
                last_used.insert(package, event.timestamp);
            },
            UsageEventKind::Other => {},
        }
    }

    let close_at = window.end.min(now);
    for (package, started) in open {
        let effective = started.max(window.start);
        if effective < close_at {
            *totals.entry(package).or_default() += (close_at - effective).num_milliseconds();
        }
    }

    let mut apps: Vec<AppUsage> = totals
        .into_iter()
        .filter(|(_, total)| *total > NOISE_FLOOR_MS)
        .map(|(package, total_ms)| AppUsage {
            package: package.to_string(),
            name: label(package).unwrap_or_else(|| fallback_label(package)),
            total_ms,
            last_used: last_used.get(package).copied().unwrap_or(window.end),
        })
        .collect();
    apps.sort_by(|a, b| b.total_ms.cmp(&a.total_ms).then_with(|| a.package.cmp(&b.package)));
    apps
}

/// Reads usage events and reconstructs per-day app usage.
#[derive(Clone)]
pub struct UsageAdapter {
    source: Arc<dyn UsageEventSource>,
    zone: LocalZone,
}

impl UsageAdapter {
    /// Creates an adapter computing logical days in `zone`.
    pub fn new(source: Arc<dyn UsageEventSource>, zone: LocalZone) -> Self {
        Self { source, zone }
    }

    /// Returns true when usage access has been granted.
    pub async fn is_authorized(&self) -> Result<bool> {
        self.source.has_usage_authorization().await
    }

    /// Reconstructs the last `lookback_days` logical days, newest first.
    ///
    /// Days without any app above the noise floor are omitted.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Unauthorized` without usage access, and
    /// propagates any event query failure.
    pub async fn read_days(
        &self,
        boundary: DayBoundary,
        now: DateTime<Utc>,
        lookback_days: u32,
    ) -> Result<Vec<UsageDay>> {
        if !self.source.has_usage_authorization().await? {
            return Err(SourceError::unauthorized(PERMISSION_MESSAGE));
        }

        let mut days = Vec::new();
        for window in self.zone.day_windows(boundary, now, lookback_days) {
            let mut events = self.source.query_events(window.start, window.end).await?;
            events.sort_by_key(|e| e.timestamp);

            let apps = aggregate_day(&events, &window, now, |p| self.source.app_label(p));
            debug!(date = %window.date, events = events.len(), apps = apps.len(), "usage day reconstructed");
            if !apps.is_empty() {
                days.push(UsageDay { date: window.date, apps });
            }
        }

        days.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(days)
    }
}

impl std::fmt::Debug for UsageAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageAdapter").field("zone", &self.zone).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, m, 0).unwrap()
    }

    fn event(package: &str, kind: UsageEventKind, at: DateTime<Utc>) -> UsageEvent {
        UsageEvent { package: package.to_string(), kind, timestamp: at }
    }

    fn march(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn early_morning_belongs_to_previous_day() {
        let at = utc(5, 2, 30);
        let enabled = DayBoundary { enabled: true, hour: 4 };
        let disabled = DayBoundary { enabled: false, hour: 4 };

        assert_eq!(enabled.logical_date(&at), march(4));
        assert_eq!(disabled.logical_date(&at), march(5));
        assert_eq!(enabled.logical_date(&utc(5, 4, 0)), march(5));
    }

    #[test]
    fn window_spans_boundary_to_boundary() {
        let window = DayBoundary { enabled: true, hour: 4 }.window(march(4), &Utc);
        assert_eq!(window.start, utc(4, 4, 0));
        assert_eq!(window.end, utc(5, 4, 0));

        let midnight = DayBoundary { enabled: false, hour: 4 }.window(march(4), &Utc);
        assert_eq!(midnight.start, utc(4, 0, 0));
        assert_eq!(midnight.end, utc(5, 0, 0));
    }

    #[test]
    fn window_respects_fixed_offset() {
        let cet = FixedOffset::east_opt(3600).unwrap();
        let window = DayBoundary { enabled: true, hour: 4 }.window(march(4), &cet);
        assert_eq!(window.start, utc(4, 3, 0));
    }

    #[test]
    fn pairs_enter_and_exit_events() {
        let window = DayBoundary::default().window(march(4), &Utc);
        let events = [
            event("com.example.reader", UsageEventKind::ForegroundEnter, utc(4, 9, 0)),
            event("com.example.reader", UsageEventKind::ForegroundExit, utc(4, 9, 10)),
            event("com.example.reader", UsageEventKind::ForegroundEnter, utc(4, 10, 0)),
            event("com.example.reader", UsageEventKind::ForegroundExit, utc(4, 10, 5)),
        ];

        let apps = aggregate_day(&events, &window, utc(6, 0, 0), |_| None);
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].total_ms, 15 * 60_000);
        assert_eq!(apps[0].name, "reader");
        assert_eq!(apps[0].last_used, utc(4, 10, 5));
    }

    #[test]
    fn open_session_closes_at_now_or_window_end() {
        let window = DayBoundary::default().window(march(4), &Utc);
        let events = [event("com.example.maps", UsageEventKind::ForegroundEnter, utc(5, 3, 0))];

        let closed_by_end = aggregate_day(&events, &window, utc(6, 0, 0), |_| None);
        assert_eq!(closed_by_end[0].total_ms, 60 * 60_000);

        let closed_by_now = aggregate_day(&events, &window, utc(5, 3, 30), |_| None);
        assert_eq!(closed_by_now[0].total_ms, 30 * 60_000);
    }

    #[test]
    fn session_start_is_clamped_to_window() {
        let window = DayBoundary::default().window(march(4), &Utc);
        let events = [
            event("com.example.chat", UsageEventKind::ForegroundEnter, utc(4, 3, 0)),
            event("com.example.chat", UsageEventKind::ForegroundExit, utc(4, 4, 5)),
        ];

        let apps = aggregate_day(&events, &window, utc(6, 0, 0), |_| None);
        assert_eq!(apps[0].total_ms, 5 * 60_000);
    }

    #[test]
    fn noise_floor_is_exclusive() {
        let window = DayBoundary::default().window(march(4), &Utc);
        let events = [
            event("a.exact", UsageEventKind::ForegroundEnter, utc(4, 9, 0)),
            event("a.exact", UsageEventKind::ForegroundExit, utc(4, 9, 1)),
            event("b.longer", UsageEventKind::ForegroundEnter, utc(4, 9, 0)),
            event("b.longer", UsageEventKind::ForegroundExit, utc(4, 9, 2)),
        ];

        let apps = aggregate_day(&events, &window, utc(6, 0, 0), |_| None);
        assert_eq!(apps.iter().map(|a| a.package.as_str()).collect::<Vec<_>>(), ["b.longer"]);
    }

    #[test]
    fn apps_sorted_longest_first_and_labels_applied() {
        let window = DayBoundary::default().window(march(4), &Utc);
        let events = [
            event("com.short", UsageEventKind::ForegroundEnter, utc(4, 9, 0)),
            event("com.short", UsageEventKind::ForegroundExit, utc(4, 9, 5)),
            event("com.long", UsageEventKind::ForegroundEnter, utc(4, 10, 0)),
            event("com.long", UsageEventKind::ForegroundExit, utc(4, 11, 0)),
        ];

        let apps = aggregate_day(&events, &window, utc(6, 0, 0), |p| {
            (p == "com.long").then(|| "Long App".to_string())
        });
        assert_eq!(apps[0].name, "Long App");
        assert_eq!(apps[1].name, "short");
    }

    #[test]
    fn seven_windows_newest_first() {
        let windows = LocalZone::Fixed(FixedOffset::east_opt(0).unwrap()).day_windows(
            DayBoundary::default(),
            utc(10, 2, 0),
            7,
        );
        assert_eq!(windows.len(), 7);
        assert_eq!(windows[0].date, march(9));
        assert_eq!(windows[6].date, march(3));
    }
}
