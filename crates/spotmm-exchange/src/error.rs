//! Error types for spotmm-exchange.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Network, timeout, TLS. The loop logs and retries next tick.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// HTTP 429; engages the rate-limit governor.
    #[error("Rate limited by exchange: {body}")]
    RateLimited { body: String },

    /// Any other non-success HTTP status.
    #[error("Exchange returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not match the expected shape.
    #[error("Failed to parse exchange response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Expected field absent from an otherwise well-formed response.
    #[error("Malformed exchange response: {0}")]
    Malformed(String),

    /// Signed call attempted without credentials; fatal at construction.
    #[error("Missing API credentials")]
    MissingCredentials,
}

impl ExchangeError {
    /// Whether this error should engage the backoff governor.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
