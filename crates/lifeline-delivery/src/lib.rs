//! Webhook delivery with bounded retries and attempt logging.
//!
//! This crate posts one JSON payload to an ordered list of webhook targets.
//! It is the only place lifeline performs outbound HTTP.
//!
//! # Architecture
//!
//! Delivery is strictly sequential:
//!
//! 1. **Targets in order** - the first target that answers 2xx wins; later
//!    targets are never contacted
//! 2. **Retries per target** - up to three attempts with exponential backoff
//!    (1 s, then 2 s) and no wait after the last attempt
//! 3. **One log entry per target** - written after its retry loop, stamped
//!    with the time delivery to that target began
//!
//! Sleeping goes through [`lifeline_core::Clock`], so tests assert exact
//! backoff without waiting.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lifeline_core::{RealClock, Settings, SourceKind, WebhookTarget};
//! use lifeline_delivery::{
//!     DeliveryClient, DeliveryContext, DeliveryError, RetryPolicy, WebhookDispatcher,
//! };
//!
//! # async fn example(settings: Settings) -> Result<(), DeliveryError> {
//! let dispatcher = WebhookDispatcher::new(
//!     DeliveryClient::with_defaults()?,
//!     RetryPolicy::default(),
//!     Arc::new(settings),
//!     Arc::new(RealClock::new()),
//! );
//!
//! let targets = vec![WebhookTarget::new("https://hooks.example.com/health")];
//! let context = DeliveryContext { source: SourceKind::Health, record_count: 1 };
//! dispatcher.post(&targets, r#"{"source":"health_connect"}"#, context).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod engine;
pub mod error;
pub mod retry;
pub mod storage;

pub use client::{ClientConfig, DeliveryClient, JSON_CONTENT_TYPE};
pub use engine::{DeliveryContext, DeliveryReceipt, WebhookDispatcher};
pub use error::{DeliveryError, Result};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use storage::AttemptSink;

/// Default number of attempts per target.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay after the first failed attempt, in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Default connect timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
