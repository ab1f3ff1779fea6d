//! WhatsApp Gateway Notifier
//!
//! Sends reminder texts through an HTTP WhatsApp gateway. Each message is a
//! single JSON `POST` authenticated with a bearer token.
//!
//! # Error Handling
//!
//! Gateway responses are mapped to `PortError` variants:
//! - 400/422 -> `PortError::Validation` (the gateway refused the number or text)
//! - 401/403 -> `PortError::Unauthorized`
//! - 404 -> `PortError::NotFound`
//! - 429 -> `PortError::RateLimited`
//! - 5xx -> `PortError::ServiceUnavailable`
//! - Timeouts -> `PortError::Timeout`
//! - Other -> `PortError::Internal`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use core_kernel::{DomainPort, PortError};
use domain_billing::Notifier;

const SERVICE_NAME: &str = "whatsapp";

/// Connection settings for the gateway
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    /// Endpoint messages are posted to
    pub api_url: String,
    pub api_token: String,
    /// Sender number registered with the gateway
    pub sender: String,
    /// Request timeout
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    from: &'a str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

/// `Notifier` backed by a WhatsApp HTTP gateway
#[derive(Debug, Clone)]
pub struct WhatsAppNotifier {
    client: Client,
    config: WhatsAppConfig,
}

impl WhatsAppNotifier {
    pub fn new(config: WhatsAppConfig) -> Result<Self, PortError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PortError::internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }
}

impl DomainPort for WhatsAppNotifier {}

#[async_trait]
impl Notifier for WhatsAppNotifier {
    #[instrument(skip(self, text), fields(destination = %destination))]
    async fn send(&self, destination: &str, text: &str) -> Result<(), PortError> {
        let message = OutboundMessage {
            from: &self.config.sender,
            to: destination,
            kind: "text",
            text,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_token)
            .json(&message)
            .send()
            .await
            .map_err(|e| transport_error(e, self.config.timeout))?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "Gateway accepted message");
            return Ok(());
        }

        let retry_after = retry_after_secs(response.headers());
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %body, "Gateway rejected message");
        Err(status_error(status, retry_after, &body))
    }
}

/// Maps a non-success gateway status to a port error
fn status_error(status: StatusCode, retry_after: Option<u64>, body: &str) -> PortError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            PortError::validation_field(format!("Gateway rejected message: {}", body), "destination")
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized {
            message: format!("Gateway returned {}", status),
        },
        StatusCode::NOT_FOUND => PortError::not_found("Gateway endpoint", status),
        StatusCode::TOO_MANY_REQUESTS => PortError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(60),
        },
        s if s.is_server_error() => PortError::ServiceUnavailable {
            service: SERVICE_NAME.to_string(),
        },
        s => PortError::internal(format!("Unexpected gateway status {}", s)),
    }
}

fn transport_error(error: reqwest::Error, timeout: Duration) -> PortError {
    if error.is_timeout() {
        PortError::Timeout {
            operation: "whatsapp send".to_string(),
            duration_ms: timeout.as_millis() as u64,
        }
    } else if error.is_connect() {
        PortError::connection(format!("Gateway unreachable: {}", error))
    } else {
        PortError::internal(format!("Gateway request failed: {}", error))
    }
}

fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
