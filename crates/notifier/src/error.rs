use thiserror::Error;

use rollcall_common::types::AttemptStatus;

/// Why a single send did not go through.
///
/// Recorded on the attempt and counted in stats; never aborts the job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The provider refused the message (bad address, invalid token, ...).
    #[error("rejected by provider: {0}")]
    Rejected(String),

    #[error("transport call timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    /// Anything else, including a transport that panicked.
    #[error("unclassified transport failure: {0}")]
    Unclassified(String),
}

/// What a transport reports for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted by the provider; delivery not yet confirmed.
    Sent,
    /// Provider confirmed delivery synchronously.
    Delivered,
    /// Accepted, then reported undeliverable.
    Bounced(String),
}

impl SendOutcome {
    /// Attempt status and detail to record for this outcome.
    pub fn into_status(self) -> (AttemptStatus, Option<String>) {
        match self {
            SendOutcome::Sent => (AttemptStatus::Sent, None),
            SendOutcome::Delivered => (AttemptStatus::Delivered, None),
            SendOutcome::Bounced(detail) => (AttemptStatus::Bounced, Some(detail)),
        }
    }
}
