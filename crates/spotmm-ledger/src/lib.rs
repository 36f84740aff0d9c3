//! Durable append-only fill ledger.
//!
//! One JSON object per line, append-only, flushed per record. The in-memory
//! state (position, cost basis, realized PnL) is rebuilt from disk on load by
//! replaying fills in ascending id order, so a restart reproduces exactly the
//! state the previous process accumulated.

pub mod error;
pub mod ledger;

pub use error::{LedgerError, LedgerResult};
pub use ledger::{LedgerConfig, LedgerState, TradeFill, TradeLedger};
