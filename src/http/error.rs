use std::sync::Arc;

use thiserror::Error;

use crate::flight::Cancelled;

/// Outbound request failures
///
/// Cloneable so one failed dispatch can be handed to every coalesced waiter.
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    #[error("Network error: {0}")]
    Network(Arc<reqwest::Error>),

    #[error("Rate limit queue full for host {host}")]
    RateLimited { host: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request has no destination host: {0}")]
    MissingHost(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        HttpError::Network(Arc::new(err))
    }
}

impl From<Cancelled> for HttpError {
    fn from(_: Cancelled) -> Self {
        HttpError::Cancelled
    }
}
