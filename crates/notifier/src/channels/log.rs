use async_trait::async_trait;

use rollcall_common::types::{Channel, Payload, Recipient};

use crate::error::{SendOutcome, TransportError};
use crate::transport::Transport;

/// Development transport: logs the message and reports it sent.
#[derive(Debug, Clone, Copy)]
pub struct LogTransport {
    channel: Channel,
}

impl LogTransport {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Transport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(
        &self,
        recipient: &Recipient,
        payload: &Payload,
    ) -> Result<SendOutcome, TransportError> {
        tracing::info!(
            channel = %self.channel,
            recipient_id = %recipient.id,
            address = %recipient.address,
            title = %payload.title,
            "Message logged instead of sent"
        );
        Ok(SendOutcome::Sent)
    }
}
