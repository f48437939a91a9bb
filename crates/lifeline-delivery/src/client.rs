//! HTTP client for webhook delivery with configurable timeouts.
//!
//! Sends one POST per call and reports the response without judging it;
//! retry decisions belong to the dispatcher.

use std::{collections::BTreeMap, time::Duration};

use bytes::Bytes;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::error::{DeliveryError, Result};

/// Content type of every webhook body.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Configuration for the webhook delivery client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Time allowed to establish a connection.
    pub connect_timeout: Duration,
    /// Longest silence allowed while waiting for or reading the response.
    pub read_timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            read_timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            user_agent: concat!("lifeline/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 5,
        }
    }
}

/// HTTP client used to post payloads to webhook targets.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    config: ClientConfig,
}

/// One POST to one target.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// Destination URL.
    pub url: String,
    /// Custom headers configured for the target.
    pub headers: BTreeMap<String, String>,
    /// JSON body.
    pub body: Bytes,
    /// Attempt number against this target, starting at 1.
    pub attempt_number: u32,
}

/// Response from a webhook delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Reason phrase of the status, empty if unknown.
    pub reason: String,
    /// Response body, truncated; logged at debug level for non-2xx.
    pub body: String,
    /// Total duration of the request.
    pub duration: Duration,
    /// Whether the request was successful (2xx status).
    pub is_success: bool,
}

impl DeliveryClient {
    /// Creates a new delivery client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot
    /// be configured with the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a new delivery client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the TLS backend cannot
    /// be initialized.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Posts the request body to its URL.
    ///
    /// Any HTTP response, 2xx or not, is returned as `Ok`.
    ///
    /// # Errors
    ///
    /// - `Timeout` when the connect or read timeout elapses
    /// - `Network` for connection and other transport failures
    /// - `Configuration` when the URL or a custom header is invalid
    pub async fn deliver(&self, request: WebhookRequest) -> Result<DeliveryResponse> {
        let start_time = std::time::Instant::now();

        let span = info_span!(
            "webhook_attempt",
            url = %request.url,
            attempt = request.attempt_number
        );

        async move {
            tracing::debug!(bytes = request.body.len(), "sending webhook");

            let mut http_request = self
                .client
                .post(&request.url)
                .header(reqwest::header::CONTENT_TYPE, JSON_CONTENT_TYPE)
                .body(request.body.clone());

            for (name, value) in &request.headers {
                if !is_managed_header(name) {
                    http_request = http_request.header(name.as_str(), value.as_str());
                }
            }

            let response = match http_request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let duration = start_time.elapsed();
                    tracing::warn!(duration_ms = duration.as_millis(), "request failed: {}", e);

                    if e.is_builder() {
                        return Err(DeliveryError::configuration(e.to_string()));
                    }
                    if e.is_timeout() {
                        let limit = if e.is_connect() {
                            self.config.connect_timeout
                        } else {
                            self.config.read_timeout
                        };
                        return Err(DeliveryError::timeout(limit.as_secs()));
                    }
                    if e.is_connect() {
                        return Err(DeliveryError::network(format!("connection failed: {e}")));
                    }
                    return Err(DeliveryError::network(e.to_string()));
                },
            };

            let delivery_response = parse_response(response, start_time.elapsed()).await;

            match delivery_response.status_code {
                200..=299 => tracing::info!(
                    status = delivery_response.status_code,
                    duration_ms = delivery_response.duration.as_millis(),
                    "webhook accepted"
                ),
                400..=499 => {
                    tracing::warn!(status = delivery_response.status_code, "client error response");
                },
                500..=599 => {
                    tracing::warn!(status = delivery_response.status_code, "server error response");
                },
                _ => {
                    tracing::warn!(status = delivery_response.status_code, "unexpected status code");
                },
            }
            if !delivery_response.is_success {
                tracing::debug!(body = %delivery_response.body, "error response body");
            }

            Ok(delivery_response)
        }
        .instrument(span)
        .await
    }
}

async fn parse_response(response: Response, duration: std::time::Duration) -> DeliveryResponse {
    const MAX_LOGGED_BODY: usize = 1024;

    let status = response.status();
    let reason = status.canonical_reason().unwrap_or_default().to_string();

    let body = match response.bytes().await {
        Ok(bytes) if bytes.len() > MAX_LOGGED_BODY => {
            let truncated = String::from_utf8_lossy(&bytes[..MAX_LOGGED_BODY]);
            format!("{truncated}... (truncated)")
        },
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!("failed to read response body: {}", e);
            String::new()
        },
    };

    DeliveryResponse {
        status_code: status.as_u16(),
        reason,
        body,
        duration,
        is_success: status.is_success(),
    }
}

/// Headers the client sets itself and never takes from configuration.
fn is_managed_header(header_name: &str) -> bool {
    let lowercase = header_name.to_lowercase();
    matches!(
        lowercase.as_str(),
        "content-type"
            | "content-length"
            | "host"
            | "connection"
            | "keep-alive"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

#[cfg(test)]
mod tests {
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn request(url: String) -> WebhookRequest {
        WebhookRequest {
            url,
            headers: BTreeMap::from([
                ("X-Api-Key".to_string(), "secret".to_string()),
                ("Content-Type".to_string(), "text/plain".to_string()),
            ]),
            body: Bytes::from_static(br#"{"source":"health_connect"}"#),
            attempt_number: 1,
        }
    }

    #[tokio::test]
    async fn successful_delivery_sends_json_and_custom_headers() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/hook"))
            .and(matchers::header("content-type", JSON_CONTENT_TYPE))
            .and(matchers::header("x-api-key", "secret"))
            .and(matchers::body_string(r#"{"source":"health_connect"}"#))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let response = client.deliver(request(format!("{}/hook", mock_server.uri()))).await;

        let response = response.unwrap();
        assert_eq!(response.status_code, 200);
        assert!(response.is_success);
        assert_eq!(response.body, "OK");
    }

    #[tokio::test]
    async fn non_success_status_is_returned_not_raised() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&mock_server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let response = client.deliver(request(mock_server.uri())).await.unwrap();

        assert_eq!(response.status_code, 503);
        assert_eq!(response.reason, "Service Unavailable");
        assert_eq!(response.body, "down");
        assert!(!response.is_success);
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        let client = DeliveryClient::with_defaults().unwrap();

        let result = client.deliver(request("http://127.0.0.1:1/hook".to_string())).await;

        assert!(matches!(result, Err(DeliveryError::Network { .. })));
    }

    #[tokio::test]
    async fn invalid_url_is_configuration_error() {
        let client = DeliveryClient::with_defaults().unwrap();

        let result = client.deliver(request("not a url".to_string())).await;

        assert!(matches!(result, Err(DeliveryError::Configuration { .. })));
    }

    #[tokio::test]
    async fn stalled_response_times_out_after_read_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&mock_server)
            .await;

        let config = ClientConfig { read_timeout: Duration::from_secs(1), ..ClientConfig::default() };
        let client = DeliveryClient::new(config).unwrap();

        let start = std::time::Instant::now();
        let result = client.deliver(request(mock_server.uri())).await;

        assert_eq!(result.unwrap_err(), DeliveryError::timeout(1));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn default_timeouts_are_ten_seconds_each() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(10));
    }

    #[test]
    fn managed_headers_are_case_insensitive() {
        assert!(is_managed_header("Content-Type"));
        assert!(is_managed_header("HOST"));
        assert!(!is_managed_header("Authorization"));
    }
}
