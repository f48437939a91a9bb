//! Data source adapters for lifeline.
//!
//! Two independent sources feed sync runs:
//!
//! - **Health records** via [`HealthPlatform`]. [`HealthAdapter`] reads each
//!   enabled category over a 168 hour lookback window, keeps records at or
//!   after the category watermark and converts them to payload units using
//!   the per-category [`descriptor`] table. A failing or unsupported
//!   category comes back empty instead of failing the read.
//! - **Usage events** via [`UsageEventSource`]. [`UsageAdapter`] pairs
//!   foreground enter and exit events inside logical day windows
//!   ([`DayBoundary`]) and reports per-app foreground time per day.
//!
//! Availability and authorization are separate queries: a platform can be
//! present but not granted, or absent entirely.
//!
//! [`file`] provides JSON-export backed platforms for the daemon and
//! [`mock`] provides in-memory fakes for tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod descriptor;
pub mod error;
pub mod file;
pub mod health;
pub mod mock;
pub mod record;
pub mod units;
pub mod usage;

pub use descriptor::{Descriptor, Shape};
pub use error::{Result, SourceError};
pub use file::{FileHealthPlatform, FileUsageSource};
pub use health::{
    Availability, HealthAdapter, HealthPlatform, HealthSnapshot, TimeRange, LOOKBACK_HOURS,
};
pub use record::{HealthRecord, Measure, RawRecord, RawSample, RawStage, RecordBody};
pub use units::{Quantity, Unit};
pub use usage::{
    AppUsage, DayBoundary, DayWindow, LocalZone, UsageAdapter, UsageDay, UsageEvent,
    UsageEventKind, UsageEventSource, DEFAULT_LOOKBACK_DAYS, NOISE_FLOOR_MS,
    PERMISSION_MESSAGE,
};
