//! Typed exchange client.
//!
//! The strategy talks to the venue only through the [`ExchangeClient`] trait;
//! [`RestClient`] is the production implementation wrapping signed and public
//! REST calls. Responses are parsed once into typed values here and never
//! threaded through the strategy as raw JSON.

pub mod client;
pub mod error;
pub mod rest;
pub mod types;

pub use client::{ExchangeClient, NewOrderRequest, OrderKind};
pub use error::{ExchangeError, ExchangeResult};
pub use rest::{Credentials, RequestTiming, RestClient};
pub use types::{
    AccountInfo, Balance, DepthSnapshot, OpenOrder, OrderAck, SymbolInfo, TradeRecord,
};
