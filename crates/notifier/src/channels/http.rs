//! HTTP relay transport.
//!
//! Posts each message as JSON to a provider gateway configured per channel.
//! Provider wire formats live behind the gateway; this side only speaks:
//!
//! ```text
//! POST <gateway>  {"channel", "recipient": {id, address, display_name}, "payload": {...}}
//! 2xx             optional body {"status": "sent" | "delivered" | "bounced", "detail"}
//! 4xx             rejected
//! 5xx             provider error
//! ```

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use rollcall_common::types::{Channel, Payload, Recipient};

use crate::error::{SendOutcome, TransportError};
use crate::transport::Transport;

/// Relays messages to a provider gateway over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    channel: Channel,
    url: String,
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    channel: Channel,
    recipient: &'a Recipient,
    payload: &'a Payload,
}

#[derive(Debug, Default, Deserialize)]
struct RelayResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, channel: Channel, url: impl Into<String>) -> Self {
        Self {
            client,
            channel,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(
        &self,
        recipient: &Recipient,
        payload: &Payload,
    ) -> Result<SendOutcome, TransportError> {
        let request = RelayRequest {
            channel: self.channel,
            recipient,
            payload,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        // An empty or non-JSON success body simply means "accepted".
        let body = response.bytes().await.unwrap_or_default();
        let parsed: RelayResponse = serde_json::from_slice(&body).unwrap_or_default();
        Ok(outcome_from(parsed))
    }
}

fn classify_request_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() || err.is_request() {
        TransportError::Network(err.to_string())
    } else {
        TransportError::Unclassified(err.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str) -> TransportError {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body.trim())
    };

    if status.is_client_error() {
        TransportError::Rejected(detail)
    } else if status.is_server_error() {
        TransportError::Network(detail)
    } else {
        TransportError::Unclassified(detail)
    }
}

fn outcome_from(response: RelayResponse) -> SendOutcome {
    match response.status.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("delivered") => SendOutcome::Delivered,
        Some("bounced") => SendOutcome::Bounced(
            response
                .detail
                .unwrap_or_else(|| "reported undeliverable".to_string()),
        ),
        _ => SendOutcome::Sent,
    }
}
