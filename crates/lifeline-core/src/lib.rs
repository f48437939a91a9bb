//! Core domain types, clock and settings storage for lifeline.
//!
//! Every other lifeline crate builds on the primitives defined here:
//!
//! - [`models`]: categories, sources, webhook targets, attempt log entries
//!   and the tagged [`SyncOutcome`].
//! - [`time`]: the [`Clock`] abstraction used for read windows, watermarks
//!   and retry sleeps.
//! - [`storage`]: the [`SettingsStore`] key-value interface with SQLite and
//!   in-memory implementations.
//! - [`settings`]: the typed [`Settings`] facade that owns key names and
//!   encodings.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lifeline_core::{storage::Storage, Settings, SourceKind};
//!
//! # async fn example() -> lifeline_core::Result<()> {
//! let storage = Storage::connect("sqlite://lifeline.db?mode=rwc", 4).await?;
//! let settings = Settings::new(storage.settings.clone());
//!
//! let urls = settings.webhook_urls(SourceKind::Health).await?;
//! println!("{} health webhooks configured", urls.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod settings;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{
    AttemptLogEntry, Category, SourceKind, SyncFailure, SyncOutcome, WebhookTarget,
};
pub use settings::{Settings, MAX_LOG_ENTRIES};
pub use storage::SettingsStore;
pub use time::{Clock, RealClock, TestClock};
