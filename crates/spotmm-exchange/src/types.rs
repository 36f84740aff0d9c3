//! Typed views over exchange responses.
//!
//! Each operation's response is parsed once into one of these structs;
//! unknown fields are ignored. Numeric fields arrive as strings on most spot
//! wire formats, which `Decimal`'s deserializer accepts either way.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use spotmm_core::{ExchangeFilters, OrderStatus, Side};

/// Free/locked amounts for one asset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Balance {
    pub asset: String,
    #[serde(default)]
    pub free: Decimal,
    #[serde(default)]
    pub locked: Decimal,
}

/// Account snapshot: balances plus the exchange-side update time.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    #[serde(default)]
    pub balances: Vec<Balance>,
    #[serde(default)]
    pub update_time: i64,
}

impl AccountInfo {
    /// Balance entry for an asset, zero if the account does not list it.
    pub fn balance(&self, asset: &str) -> Balance {
        self.balances
            .iter()
            .find(|b| b.asset == asset)
            .cloned()
            .unwrap_or_else(|| Balance {
                asset: asset.to_string(),
                ..Balance::default()
            })
    }
}

/// One resting order as reported by the open-orders endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    #[serde(default)]
    pub client_order_id: String,
    pub side: Side,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub orig_qty: Decimal,
    #[serde(default)]
    pub executed_qty: Decimal,
}

impl OpenOrder {
    pub fn remaining(&self) -> Decimal {
        (self.orig_qty - self.executed_qty).max(Decimal::ZERO)
    }
}

/// Top-of-book depth snapshot from the public REST endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthSnapshot {
    #[serde(default)]
    pub last_update_id: i64,
    #[serde(default)]
    pub bids: Vec<(Decimal, Decimal)>,
    #[serde(default)]
    pub asks: Vec<(Decimal, Decimal)>,
}

/// Placement acknowledgement. `order_id` arrives as a number on some venues
/// and a string on others.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    #[serde(default, deserialize_with = "de_id_string")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
}

/// One own-trade record from the account trade list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub is_buyer: bool,
    #[serde(default)]
    pub is_maker: bool,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub qty: Decimal,
    #[serde(default)]
    pub quote_qty: Decimal,
    #[serde(default)]
    pub commission: Decimal,
    #[serde(default)]
    pub commission_asset: String,
    #[serde(default)]
    pub time: i64,
}

impl TradeRecord {
    pub fn side(&self) -> Side {
        if self.is_buyer {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    /// Quote quantity, falling back to `price * qty` when the field is
    /// absent from the response.
    pub fn quote_quantity(&self) -> Decimal {
        if self.quote_qty > Decimal::ZERO {
            self.quote_qty
        } else {
            self.price * self.qty
        }
    }
}

/// Per-symbol trading rules distilled from the exchange-info response.
#[derive(Debug, Clone, Default)]
pub struct SymbolInfo {
    pub symbol: String,
    pub filters: ExchangeFilters,
}

// --- exchange-info wire shapes ---------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ExchangeInfoResponse {
    #[serde(default)]
    pub symbols: Vec<SymbolEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SymbolEntry {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub filters: Vec<FilterEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FilterEntry {
    #[serde(default)]
    pub filter_type: String,
    #[serde(default)]
    pub min_price: Option<Decimal>,
    #[serde(default)]
    pub tick_size: Option<Decimal>,
    #[serde(default)]
    pub min_qty: Option<Decimal>,
    #[serde(default)]
    pub step_size: Option<Decimal>,
    #[serde(default)]
    pub min_notional: Option<Decimal>,
}

impl SymbolEntry {
    pub(crate) fn into_symbol_info(self) -> SymbolInfo {
        let mut filters = ExchangeFilters::default();
        for entry in self.filters {
            match entry.filter_type.as_str() {
                "PRICE_FILTER" => {
                    filters.min_price = entry.min_price.unwrap_or_default();
                    filters.tick_size = entry.tick_size.unwrap_or_default();
                }
                "LOT_SIZE" => {
                    filters.min_qty = entry.min_qty.unwrap_or_default();
                    filters.step_size = entry.step_size.unwrap_or_default();
                }
                "MIN_NOTIONAL" => {
                    filters.min_notional = entry.min_notional.unwrap_or_default();
                }
                _ => {}
            }
        }
        SymbolInfo {
            symbol: self.symbol,
            filters,
        }
    }
}

/// Accept an order id that is either a JSON number or a string.
fn de_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Str(s) => s,
        Raw::Int(i) => i.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_account_info_parsing() {
        let raw = r#"{
            "balances": [
                {"asset": "SPYX", "free": "12.5", "locked": "0.5"},
                {"asset": "USDT", "free": "100.00", "locked": "25.00"}
            ],
            "updateTime": 1700000000000,
            "canTrade": true
        }"#;
        let info: AccountInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.update_time, 1_700_000_000_000);
        assert_eq!(info.balance("SPYX").free, dec!(12.5));
        assert_eq!(info.balance("USDT").locked, dec!(25));
        // Missing asset reads as zero.
        assert_eq!(info.balance("BTC").free, Decimal::ZERO);
    }

    #[test]
    fn test_open_order_remaining() {
        let raw = r#"{
            "clientOrderId": "SB17000000000000001",
            "side": "BUY",
            "price": "50.25",
            "origQty": "1.0",
            "executedQty": "0.4"
        }"#;
        let order: OpenOrder = serde_json::from_str(raw).unwrap();
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.remaining(), dec!(0.6));
    }

    #[test]
    fn test_depth_snapshot_parsing() {
        let raw = r#"{
            "lastUpdateId": 42,
            "bids": [["100.1", "2"], ["100.0", "1"]],
            "asks": [["100.2", "3"]]
        }"#;
        let depth: DepthSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(depth.last_update_id, 42);
        assert_eq!(depth.bids[0], (dec!(100.1), dec!(2)));
        assert_eq!(depth.asks.len(), 1);
    }

    #[test]
    fn test_order_ack_numeric_and_string_ids() {
        let ack: OrderAck =
            serde_json::from_str(r#"{"orderId": 123456, "status": "NEW"}"#).unwrap();
        assert_eq!(ack.order_id.as_deref(), Some("123456"));
        assert_eq!(ack.status, Some(OrderStatus::New));

        let ack: OrderAck = serde_json::from_str(r#"{"orderId": "abc-1"}"#).unwrap();
        assert_eq!(ack.order_id.as_deref(), Some("abc-1"));
        assert!(ack.status.is_none());
    }

    #[test]
    fn test_trade_record_quote_fallback() {
        let record = TradeRecord {
            price: dec!(50),
            qty: dec!(0.5),
            ..TradeRecord::default()
        };
        assert_eq!(record.quote_quantity(), dec!(25));
        assert_eq!(record.side(), Side::Sell);
    }

    #[test]
    fn test_exchange_info_filters() {
        let raw = r#"{
            "symbols": [{
                "symbol": "SPYXUSDT",
                "filters": [
                    {"filterType": "PRICE_FILTER", "minPrice": "0.0001", "tickSize": "0.0001"},
                    {"filterType": "LOT_SIZE", "minQty": "0.001", "stepSize": "0.001"},
                    {"filterType": "MIN_NOTIONAL", "minNotional": "1.0"},
                    {"filterType": "SOMETHING_ELSE", "limit": 5}
                ]
            }]
        }"#;
        let response: ExchangeInfoResponse = serde_json::from_str(raw).unwrap();
        let info = response.symbols.into_iter().next().unwrap().into_symbol_info();
        assert_eq!(info.symbol, "SPYXUSDT");
        assert_eq!(info.filters.tick_size, dec!(0.0001));
        assert_eq!(info.filters.step_size, dec!(0.001));
        assert_eq!(info.filters.min_notional, dec!(1));
    }
}
