//! Core domain types for the spotmm market maker.
//!
//! This crate provides the fundamental types shared across the workspace:
//! - Fixed-point conversion and grid-rounding helpers (`fixed`)
//! - `Side`, `OrderStatus`, `WorkingOrder`, and client-order-id minting
//! - `ExchangeFilters`: exchange-imposed price/quantity/notional constraints

pub mod error;
pub mod filters;
pub mod fixed;
pub mod order;
pub mod time;

pub use error::{CoreError, CoreResult};
pub use filters::{ExchangeFilters, FilterViolation};
pub use fixed::{floor_to_increment, from_units, pow10, precision_from_step, round_down_dp, to_units, within_increment};
pub use order::{OrderIdFactory, OrderStatus, Side, WorkingOrder};
pub use time::wall_clock_ms;
