//! Multi-target webhook dispatch with per-target retries.
//!
//! The dispatcher walks the configured targets in order and stops at the
//! first one that accepts the payload. Each target gets up to
//! `RetryPolicy::max_attempts` sequential attempts and exactly one attempt
//! log entry, written after its retry loop ends.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use lifeline_core::{AttemptLogEntry, Clock, SourceKind, WebhookTarget};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    client::{DeliveryClient, WebhookRequest},
    error::{DeliveryError, ErrorCategory, Result},
    retry::{RetryDecision, RetryPolicy},
    storage::AttemptSink,
};

/// What a payload is, for the attempt log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryContext {
    /// Source the payload was built from.
    pub source: SourceKind,
    /// Number of records in the payload.
    pub record_count: usize,
}

/// Proof that a target accepted a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Target that accepted the payload.
    pub url: String,
    /// 2xx status returned by the target.
    pub status_code: u16,
    /// Attempts used against that target.
    pub attempts: u32,
}

/// Posts payloads to webhook targets and records every target's outcome.
pub struct WebhookDispatcher {
    client: DeliveryClient,
    policy: RetryPolicy,
    sink: Arc<dyn AttemptSink>,
    clock: Arc<dyn Clock>,
}

impl WebhookDispatcher {
    /// Creates a dispatcher.
    pub fn new(
        client: DeliveryClient,
        policy: RetryPolicy,
        sink: Arc<dyn AttemptSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { client, policy, sink, clock }
    }

    /// Returns the retry policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delivers `payload` to the first target that accepts it.
    ///
    /// Targets are tried sequentially in order. Later targets are not
    /// contacted once one succeeds.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::NoTargets` without logging anything when
    /// `targets` is empty. When every target fails, returns the last
    /// target's final error.
    pub async fn post(
        &self,
        targets: &[WebhookTarget],
        payload: &str,
        context: DeliveryContext,
    ) -> Result<DeliveryReceipt> {
        if targets.is_empty() {
            return Err(DeliveryError::NoTargets);
        }

        let body = Bytes::from(payload.to_owned());
        let mut last_error = DeliveryError::NoTargets;

        for target in targets {
            match self.post_to_target(target, &body, context).await {
                Ok(receipt) => {
                    info!(
                        url = %receipt.url,
                        attempts = receipt.attempts,
                        source = %context.source,
                        records = context.record_count,
                        "payload delivered"
                    );
                    return Ok(receipt);
                },
                Err(error) => {
                    warn!(
                        url = %target.url,
                        category = %ErrorCategory::from(&error),
                        error = %error,
                        "target failed, trying next"
                    );
                    last_error = error;
                },
            }
        }

        Err(last_error)
    }

    async fn post_to_target(
        &self,
        target: &WebhookTarget,
        body: &Bytes,
        context: DeliveryContext,
    ) -> Result<DeliveryReceipt> {
        let started_at = self.clock.now_utc();
        let mut attempt = 1;

        let result = loop {
            let request = WebhookRequest {
                url: target.url.clone(),
                headers: target.headers.clone(),
                body: body.clone(),
                attempt_number: attempt,
            };

            let error = match self.client.deliver(request).await {
                Ok(response) if response.is_success => {
                    break Ok(DeliveryReceipt {
                        url: target.url.clone(),
                        status_code: response.status_code,
                        attempts: attempt,
                    });
                },
                Ok(response) => DeliveryError::http_status(response.status_code, response.reason),
                Err(error) => error,
            };

            match self.policy.decide(attempt, &error) {
                RetryDecision::Retry { delay } => {
                    debug!(
                        url = %target.url,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "attempt failed, backing off"
                    );
                    self.clock.sleep(delay).await;
                    attempt += 1;
                },
                RetryDecision::GiveUp { reason } => {
                    debug!(url = %target.url, attempt, %reason, "giving up on target");
                    break Err(error);
                },
            }
        };

        self.record(target, started_at, &result, body, context).await;
        result
    }

    async fn record(
        &self,
        target: &WebhookTarget,
        started_at: DateTime<Utc>,
        result: &Result<DeliveryReceipt>,
        body: &Bytes,
        context: DeliveryContext,
    ) {
        let (status_code, error_message) = match result {
            Ok(receipt) => (Some(receipt.status_code), None),
            Err(error) => (error.status_code(), Some(error.to_string())),
        };

        let entry = AttemptLogEntry {
            id: Uuid::new_v4(),
            timestamp: started_at,
            url: target.url.clone(),
            status_code,
            success: result.is_ok(),
            error_message,
            data_type: Some(context.source.as_str().to_string()),
            record_count: Some(context.record_count),
            raw_payload: Some(String::from_utf8_lossy(body).into_owned()),
            source: context.source,
        };

        if let Err(e) = self.sink.record_attempt(entry).await {
            warn!(url = %target.url, error = %e, "failed to record attempt log entry");
        }
    }
}
