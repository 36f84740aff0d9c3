//! Error types for spotmm-ledger.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Scales must be strictly positive; fatal at construction.
    #[error("Invalid ledger configuration: {0}")]
    Config(String),

    /// Storage read/write failure.
    #[error("Ledger storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Record serialization failure.
    #[error("Ledger encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Integer overflow in position accounting; requires operator attention.
    #[error("Ledger arithmetic overflow while applying trade {trade_id}")]
    Overflow { trade_id: i64 },
}

pub type LedgerResult<T> = Result<T, LedgerError>;
