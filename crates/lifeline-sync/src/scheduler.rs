//! Periodic sync loops.
//!
//! One loop per source sleeps for that source's interval, then runs a sync.
//! The interval is re-read from settings every cycle so changes apply
//! without a restart. Loops stop when the cancellation token fires; a run
//! already in progress finishes first.

use std::{sync::Arc, time::Duration};

use lifeline_core::{settings::DEFAULT_SYNC_INTERVAL_MINUTES, Clock, SourceKind, SyncOutcome};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::orchestrator::SyncService;

/// Errors raised while stopping the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Loops did not finish within the grace period.
    #[error("sync loops did not stop within {timeout_seconds}s")]
    ShutdownTimeout {
        /// Grace period that was exceeded
        timeout_seconds: u64,
    },

    /// A loop task panicked.
    #[error("sync loop for {data_source} panicked: {message}")]
    LoopPanicked {
        /// Source of the failed loop
        data_source: SourceKind,
        /// Join error text
        message: String,
    },
}

/// Owns the periodic sync loops.
pub struct Scheduler {
    service: Arc<SyncService>,
    clock: Arc<dyn Clock>,
    cancellation_token: CancellationToken,
    handles: Vec<(SourceKind, JoinHandle<()>)>,
}

impl Scheduler {
    /// Creates a scheduler; nothing runs until [`Scheduler::start`].
    pub fn new(
        service: Arc<SyncService>,
        clock: Arc<dyn Clock>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self { service, clock, cancellation_token, handles: Vec::new() }
    }

    /// Spawns one loop per source.
    pub fn start(&mut self) {
        for source in SourceKind::ALL {
            let service = self.service.clone();
            let clock = self.clock.clone();
            let token = self.cancellation_token.clone();

            let handle = tokio::spawn(async move {
                info!(%source, "sync loop starting");
                run_loop(&service, clock.as_ref(), &token, source).await;
                info!(%source, "sync loop stopped");
            });
            self.handles.push((source, handle));
        }
    }

    /// Number of running loops.
    pub fn loop_count(&self) -> usize {
        self.handles.len()
    }

    /// Cancels every loop and waits up to `timeout` for them to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the loops outlive `timeout` or one of them
    /// panicked.
    pub async fn shutdown_graceful(self, timeout: Duration) -> Result<(), SchedulerError> {
        info!(loops = self.handles.len(), timeout_seconds = timeout.as_secs(), "stopping sync loops");
        self.cancellation_token.cancel();

        let join_all = async {
            for (source, handle) in self.handles {
                handle.await.map_err(|e| SchedulerError::LoopPanicked {
                    data_source: source,
                    message: e.to_string(),
                })?;
            }
            Ok::<(), SchedulerError>(())
        };

        tokio::time::timeout(timeout, join_all).await.map_err(|_| {
            SchedulerError::ShutdownTimeout { timeout_seconds: timeout.as_secs() }
        })?
    }
}

async fn run_loop(
    service: &SyncService,
    clock: &dyn Clock,
    token: &CancellationToken,
    source: SourceKind,
) {
    loop {
        let interval = match service.settings().sync_interval(source).await {
            Ok(interval) => interval,
            Err(e) => {
                warn!(%source, error = %e, "failed to read sync interval, using default");
                Duration::from_secs(u64::from(DEFAULT_SYNC_INTERVAL_MINUTES) * 60)
            },
        };

        tokio::select! {
            () = clock.sleep(interval) => {}
            () = token.cancelled() => break,
        }

        match service.run(source).await {
            SyncOutcome::Failure { reason } => error!(%source, %reason, "scheduled sync failed"),
            outcome => info!(%source, "scheduled sync finished: {outcome}"),
        }
    }
}
