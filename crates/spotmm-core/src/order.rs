//! Order-side and order-identity types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::time::wall_clock_ms;

/// Order side as the exchange spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    /// Single-letter tag used in minted client order ids.
    pub fn tag(&self) -> char {
        match self {
            Self::Buy => 'B',
            Self::Sell => 'S',
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exchange-reported order status.
///
/// Statuses this client does not know are kept verbatim in `Other` rather
/// than failing the parse; venues add statuses without notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Canceled,
    Filled,
    Rejected,
    Expired,
    Other(String),
}

impl From<String> for OrderStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "NEW" => Self::New,
            "PARTIALLY_FILLED" => Self::PartiallyFilled,
            "CANCELED" => Self::Canceled,
            "FILLED" => Self::Filled,
            "REJECTED" => Self::Rejected,
            "EXPIRED" => Self::Expired,
            _ => Self::Other(raw),
        }
    }
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self {
        status.to_string()
    }
}

impl OrderStatus {
    /// Whether this status means the order no longer rests on the book.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Canceled | Self::Filled | Self::Rejected | Self::Expired
        )
    }

    /// Whether a placement response with this status counts as accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::New | Self::PartiallyFilled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => f.write_str("NEW"),
            Self::PartiallyFilled => f.write_str("PARTIALLY_FILLED"),
            Self::Canceled => f.write_str("CANCELED"),
            Self::Filled => f.write_str("FILLED"),
            Self::Rejected => f.write_str("REJECTED"),
            Self::Expired => f.write_str("EXPIRED"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// A resting quote we placed and still believe to be open.
///
/// At most one buy and one sell are tracked at any time; the quantity is the
/// unfilled remainder as of the last open-orders refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingOrder {
    pub client_id: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Mints client order ids: `<symbol initial><side tag><epoch ms><seq%10000>`,
/// truncated to the 32-character exchange limit.
///
/// The counter is process-scoped state owned by whoever constructs the
/// factory; tests reset it to keep ids deterministic.
#[derive(Debug, Default)]
pub struct OrderIdFactory {
    counter: AtomicU64,
}

impl OrderIdFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&self, symbol: &str, side: Option<Side>) -> String {
        let ms = wall_clock_ms();
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) % 10_000;
        let tag = side.map(|s| s.tag()).unwrap_or('X');
        let mut id = String::with_capacity(32);
        if let Some(initial) = symbol.chars().next() {
            id.push(initial);
        }
        id.push(tag);
        id.push_str(&ms.to_string());
        id.push_str(&format!("{seq:04}"));
        id.truncate(32);
        id
    }

    pub fn reset(&self) {
        self.counter.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_serde_matches_wire() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"BUY\"");
        let side: Side = serde_json::from_str("\"SELL\"").unwrap();
        assert_eq!(side, Side::Sell);
    }

    #[test]
    fn test_status_terminal() {
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
        assert!(!OrderStatus::Other("PENDING_CANCEL".into()).is_terminal());
    }

    #[test]
    fn test_status_accepted() {
        assert!(OrderStatus::New.is_accepted());
        assert!(OrderStatus::PartiallyFilled.is_accepted());
        assert!(!OrderStatus::Rejected.is_accepted());
    }

    #[test]
    fn test_status_serde_matches_wire() {
        let status: OrderStatus = serde_json::from_str("\"CANCELED\"").unwrap();
        assert_eq!(status, OrderStatus::Canceled);
        let status: OrderStatus = serde_json::from_str("\"PARTIALLY_FILLED\"").unwrap();
        assert_eq!(status, OrderStatus::PartiallyFilled);
        assert_eq!(
            serde_json::to_string(&OrderStatus::Filled).unwrap(),
            "\"FILLED\""
        );
    }

    #[test]
    fn test_unknown_status_round_trips() {
        let status: OrderStatus = serde_json::from_str("\"PENDING_CANCEL\"").unwrap();
        assert_eq!(status, OrderStatus::Other("PENDING_CANCEL".to_string()));
        // Unknown statuses survive re-serialization verbatim.
        assert_eq!(
            serde_json::to_string(&status).unwrap(),
            "\"PENDING_CANCEL\""
        );
    }

    #[test]
    fn test_id_format() {
        let factory = OrderIdFactory::new();
        factory.reset();
        let id = factory.mint("SPYXUSDT", Some(Side::Buy));
        assert!(id.starts_with("SB"));
        assert!(id.ends_with("0000"));
        assert!(id.len() <= 32);

        let next = factory.mint("SPYXUSDT", Some(Side::Sell));
        assert!(next.starts_with("SS"));
        assert!(next.ends_with("0001"));
    }

    #[test]
    fn test_id_without_side_uses_x_tag() {
        let factory = OrderIdFactory::new();
        let id = factory.mint("SPYXUSDT", None);
        assert_eq!(id.chars().nth(1), Some('X'));
    }

    #[test]
    fn test_counter_reset() {
        let factory = OrderIdFactory::new();
        factory.mint("SPYXUSDT", Some(Side::Buy));
        factory.mint("SPYXUSDT", Some(Side::Buy));
        factory.reset();
        let id = factory.mint("SPYXUSDT", Some(Side::Buy));
        assert!(id.ends_with("0000"));
    }
}
