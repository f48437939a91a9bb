//! Where the dispatcher records attempt log entries.
//!
//! Production uses the shared [`Settings`] facade, which keeps the capped
//! newest-first log. Tests use [`mock::RecordingSink`].

use std::{future::Future, pin::Pin};

use lifeline_core::{error::Result, AttemptLogEntry, Settings};

/// Destination for attempt log entries.
pub trait AttemptSink: Send + Sync + 'static {
    /// Appends one entry to the attempt log.
    fn record_attempt(
        &self,
        entry: AttemptLogEntry,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

impl AttemptSink for Settings {
    fn record_attempt(
        &self,
        entry: AttemptLogEntry,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.append_attempt(entry))
    }
}

pub mod mock {
    //! In-memory attempt sink for testing.

    use std::{future::Future, pin::Pin, sync::Arc};

    use lifeline_core::{
        error::{CoreError, Result},
        AttemptLogEntry,
    };
    use tokio::sync::RwLock;

    use super::AttemptSink;

    /// Records entries in insertion order and can be told to fail.
    #[derive(Clone, Default)]
    pub struct RecordingSink {
        entries: Arc<RwLock<Vec<AttemptLogEntry>>>,
        record_error: Arc<RwLock<Option<String>>>,
    }

    impl RecordingSink {
        /// Creates an empty sink.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes the next `record_attempt` fail with `error`.
        pub async fn inject_record_error(&self, error: impl Into<String>) {
            *self.record_error.write().await = Some(error.into());
        }

        /// Returns all recorded entries, oldest first.
        pub async fn recorded_attempts(&self) -> Vec<AttemptLogEntry> {
            self.entries.read().await.clone()
        }
    }

    impl AttemptSink for RecordingSink {
        fn record_attempt(
            &self,
            entry: AttemptLogEntry,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                if let Some(error) = self.record_error.write().await.take() {
                    return Err(CoreError::Database(error));
                }
                self.entries.write().await.push(entry);
                Ok(())
            })
        }
    }
}
