//! The abstract exchange interface the strategy is written against.

use async_trait::async_trait;

use spotmm_core::{OrderStatus, Side};

use crate::error::ExchangeResult;
use crate::types::{AccountInfo, DepthSnapshot, OpenOrder, OrderAck, SymbolInfo, TradeRecord};

/// Limit or market placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Limit,
    Market,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Limit => "LIMIT",
            Self::Market => "MARKET",
        }
    }
}

/// A fully formatted order request. Quantity and price strings are rendered
/// to the symbol's precision by the caller before they get here.
#[derive(Debug, Clone)]
pub struct NewOrderRequest {
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    /// Base quantity; used by limit orders and market sells.
    pub quantity: Option<String>,
    pub price: Option<String>,
    /// Quote amount to spend; used by market buys.
    pub quote_order_qty: Option<String>,
    pub new_client_order_id: Option<String>,
}

impl NewOrderRequest {
    pub fn limit(
        symbol: impl Into<String>,
        side: Side,
        price: String,
        quantity: String,
        client_order_id: String,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            kind: OrderKind::Limit,
            quantity: Some(quantity),
            price: Some(price),
            quote_order_qty: None,
            new_client_order_id: Some(client_order_id),
        }
    }

    pub fn market_sell(symbol: impl Into<String>, quantity: String) -> Self {
        Self {
            symbol: symbol.into(),
            side: Side::Sell,
            kind: OrderKind::Market,
            quantity: Some(quantity),
            price: None,
            quote_order_qty: None,
            new_client_order_id: None,
        }
    }

    pub fn market_buy(symbol: impl Into<String>, quote_order_qty: String) -> Self {
        Self {
            symbol: symbol.into(),
            side: Side::Buy,
            kind: OrderKind::Market,
            quantity: None,
            price: None,
            quote_order_qty: Some(quote_order_qty),
            new_client_order_id: None,
        }
    }
}

/// Typed operations over the venue's REST API.
///
/// Every call is blocking network I/O from the strategy's point of view; rate
/// limiting surfaces as `ExchangeError::RateLimited` so the caller can engage
/// its backoff governor.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn server_time(&self) -> ExchangeResult<i64>;

    async fn exchange_info(&self, symbol: &str) -> ExchangeResult<SymbolInfo>;

    async fn depth(&self, symbol: &str, limit: u32) -> ExchangeResult<DepthSnapshot>;

    async fn account_info(&self) -> ExchangeResult<AccountInfo>;

    async fn open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>>;

    async fn new_order(&self, request: NewOrderRequest) -> ExchangeResult<OrderAck>;

    async fn cancel_order(&self, symbol: &str, orig_client_order_id: &str) -> ExchangeResult<()>;

    async fn cancel_open_orders(&self, symbol: &str) -> ExchangeResult<()>;

    async fn query_order(
        &self,
        symbol: &str,
        orig_client_order_id: &str,
    ) -> ExchangeResult<OrderStatus>;

    async fn my_trades(
        &self,
        symbol: &str,
        from_id: Option<i64>,
        limit: u32,
    ) -> ExchangeResult<Vec<TradeRecord>>;
}
