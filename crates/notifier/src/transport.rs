//! Channel-agnostic transport interface and per-channel registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use rollcall_common::config::AppConfig;
use rollcall_common::types::{Channel, Payload, Recipient};

use crate::channels::http::HttpTransport;
use crate::channels::log::LogTransport;
use crate::error::{SendOutcome, TransportError};

/// Sends one payload to one recipient.
///
/// Push, e-mail and in-app delivery are interchangeable implementations;
/// workers only ever see this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn send(
        &self,
        recipient: &Recipient,
        payload: &Payload,
    ) -> Result<SendOutcome, TransportError>;
}

/// Transport strategy per channel.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: HashMap<Channel, Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: Channel, transport: Arc<dyn Transport>) -> Self {
        self.register(channel, transport);
        self
    }

    pub fn register(&mut self, channel: Channel, transport: Arc<dyn Transport>) {
        self.transports.insert(channel, transport);
    }

    pub fn get(&self, channel: Channel) -> Option<Arc<dyn Transport>> {
        self.transports.get(&channel).cloned()
    }

    /// One transport per channel: the HTTP relay when a gateway URL is
    /// configured, the logging transport otherwise.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.transport_timeout_ms))
            .build()?;

        let gateways = [
            (Channel::Push, config.push_gateway_url.as_deref()),
            (Channel::Email, config.email_gateway_url.as_deref()),
            (Channel::InApp, config.in_app_gateway_url.as_deref()),
        ];

        let mut registry = Self::new();
        for (channel, gateway) in gateways {
            let transport: Arc<dyn Transport> = match gateway {
                Some(url) => Arc::new(HttpTransport::new(client.clone(), channel, url)),
                None => Arc::new(LogTransport::new(channel)),
            };
            tracing::info!(
                channel = %channel,
                transport = transport.name(),
                "Transport registered"
            );
            registry.register(channel, transport);
        }

        Ok(registry)
    }
}
