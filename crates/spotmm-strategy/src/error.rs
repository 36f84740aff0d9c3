//! Error types for spotmm-strategy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Exchange(#[from] spotmm_exchange::ExchangeError),

    #[error(transparent)]
    Ledger(#[from] spotmm_ledger::LedgerError),

    /// Account snapshot older than the configured staleness bound.
    #[error("Account snapshot stale ({age_ms} ms old)")]
    StaleAccount { age_ms: i64 },

    /// Depth `lastUpdateId` went backwards; the snapshot is out of order.
    #[error("Out-of-order depth snapshot (got {received}, had {stored})")]
    DepthRegression { received: i64, stored: i64 },
}

impl StrategyError {
    /// Fatal errors stop the loop; everything else consumes one tick.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Ledger(spotmm_ledger::LedgerError::Overflow { .. })
                | Self::Ledger(spotmm_ledger::LedgerError::Config(_))
        )
    }

    /// Whether the underlying cause was an HTTP 429.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::Exchange(err) if err.is_rate_limit())
    }
}

pub type StrategyResult<T> = Result<T, StrategyError>;
