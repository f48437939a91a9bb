//! Sync orchestration for lifeline.
//!
//! Ties the sources, the settings store and the webhook dispatcher together:
//!
//! - [`SyncService`] runs one source end to end: pre-flight checks,
//!   watermark lookup, adapter read, payload build, delivery, and watermark
//!   commit after a confirmed delivery. It also builds previews.
//! - [`payload`] turns snapshots into the JSON documents that are posted.
//! - [`export`] renders the attempt log as CSV or JSON.
//! - [`Scheduler`] triggers periodic runs per source until cancelled.
//!
//! # Example
//!
//! ```no_run
//! use lifeline_core::SyncOutcome;
//! use lifeline_sync::SyncService;
//!
//! # async fn example(service: SyncService) {
//! match service.run_health_sync().await {
//!     SyncOutcome::NoData => println!("nothing new"),
//!     SyncOutcome::Success { counts, .. } => println!("synced {counts:?}"),
//!     SyncOutcome::Failure { reason } => eprintln!("{reason}"),
//! }
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod export;
pub mod orchestrator;
pub mod payload;
pub mod scheduler;

pub use export::{export_csv, export_json, pretty_payload, CSV_HEADER};
pub use orchestrator::{SyncPhase, SyncService, HEALTH_PERMISSION_MESSAGE};
pub use payload::{health_payload, usage_payload, PayloadMeta};
pub use scheduler::{Scheduler, SchedulerError};
