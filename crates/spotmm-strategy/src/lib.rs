//! Market-making control loop.
//!
//! One iteration per refresh interval, strictly sequential:
//! account -> open orders -> depth -> fills -> escape -> risk -> quotes.
//! The ordering encodes causal dependencies (quote sizes depend on balances,
//! escape needs the order list, risk needs NAV) and must be preserved.

pub mod config;
pub mod engine;
pub mod error;
pub mod governor;
pub mod quoting;
pub mod risk;

pub use config::StrategyConfig;
pub use engine::{FillEvent, StrategyEngine};
pub use error::{StrategyError, StrategyResult};
pub use governor::RateLimitGovernor;
pub use quoting::{plan_quotes, QuoteInputs, QuotePlan, QuoteSkip};
pub use risk::{EscapeThrottle, RiskEvent, RiskState};
