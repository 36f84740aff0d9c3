//! Order book container: ordered price levels plus derived queries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

/// One price level. A zero quantity in an update means "remove".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Self-contained copy of the book's top, safe to hold across writer updates.
#[derive(Debug, Clone, Default)]
pub struct BookSnapshot {
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub spread: Decimal,
    /// Cumulative notional over the top N bid levels.
    pub bid_volume: Decimal,
    /// Cumulative notional over the top N ask levels.
    pub ask_volume: Decimal,
    pub microprice: Decimal,
    pub last_update_id: i64,
    pub timestamp: DateTime<Utc>,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl BookSnapshot {
    pub fn has_both_sides(&self) -> bool {
        self.best_bid > Decimal::ZERO && self.best_ask > Decimal::ZERO
    }
}

/// Own-quote exclusion matches prices within this tolerance.
fn price_eq(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= Decimal::new(1, 6)
}

fn excluded(price: Decimal, excludes: &[Decimal]) -> bool {
    excludes.iter().any(|&ex| price_eq(price, ex))
}

#[derive(Debug)]
struct Inner {
    /// Keyed ascending; iterate in reverse for best-first.
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    last_update_id: i64,
    last_update_time: DateTime<Utc>,
}

impl Inner {
    fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update_id: 0,
            last_update_time: Utc::now(),
        }
    }

    fn best_bid(&self) -> Decimal {
        self.bids.keys().next_back().copied().unwrap_or_default()
    }

    fn best_ask(&self) -> Decimal {
        self.asks.keys().next().copied().unwrap_or_default()
    }

    /// Liquidity-weighted midpoint over the top N levels of each side.
    ///
    /// A heavier ask pulls the fair price toward the bid: each side's weight
    /// is the opposite side's share of the combined notional.
    fn microprice(&self, depth_levels: usize) -> Decimal {
        if self.bids.is_empty() || self.asks.is_empty() {
            return Decimal::ZERO;
        }

        let bid_volume: Decimal = self
            .bids
            .iter()
            .rev()
            .take(depth_levels)
            .map(|(price, qty)| price * qty)
            .sum();
        let ask_volume: Decimal = self
            .asks
            .iter()
            .take(depth_levels)
            .map(|(price, qty)| price * qty)
            .sum();

        let best_bid = self.best_bid();
        let best_ask = self.best_ask();

        if bid_volume.is_zero() || ask_volume.is_zero() {
            return (best_bid + best_ask) / Decimal::TWO;
        }

        let total = bid_volume + ask_volume;
        best_bid * (ask_volume / total) + best_ask * (bid_volume / total)
    }
}

/// Concurrent order book for a single symbol (multi-reader, single-writer).
pub struct OrderBook {
    symbol: String,
    inner: RwLock<Inner>,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            inner: RwLock::new(Inner::new()),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Replace both sides atomically. Non-positive entries are dropped.
    pub fn apply_snapshot(&self, bids: &[PriceLevel], asks: &[PriceLevel], update_id: i64) {
        let mut inner = self.inner.write();
        inner.bids.clear();
        inner.asks.clear();
        for level in bids {
            if level.price > Decimal::ZERO && level.quantity > Decimal::ZERO {
                inner.bids.insert(level.price, level.quantity);
            }
        }
        for level in asks {
            if level.price > Decimal::ZERO && level.quantity > Decimal::ZERO {
                inner.asks.insert(level.price, level.quantity);
            }
        }
        inner.last_update_id = update_id;
        inner.last_update_time = Utc::now();
    }

    /// Apply absolute per-level quantities: positive inserts/overwrites, zero
    /// removes. Levels absent from the update remain unchanged.
    pub fn apply_update(&self, bid_updates: &[PriceLevel], ask_updates: &[PriceLevel], update_id: i64) {
        let mut inner = self.inner.write();
        for level in bid_updates {
            if level.quantity <= Decimal::ZERO {
                inner.bids.remove(&level.price);
            } else if level.price > Decimal::ZERO {
                inner.bids.insert(level.price, level.quantity);
            }
        }
        for level in ask_updates {
            if level.quantity <= Decimal::ZERO {
                inner.asks.remove(&level.price);
            } else if level.price > Decimal::ZERO {
                inner.asks.insert(level.price, level.quantity);
            }
        }
        inner.last_update_id = update_id;
        inner.last_update_time = Utc::now();
    }

    pub fn best_bid(&self) -> Decimal {
        self.inner.read().best_bid()
    }

    pub fn best_ask(&self) -> Decimal {
        self.inner.read().best_ask()
    }

    pub fn spread(&self) -> Decimal {
        let inner = self.inner.read();
        let bid = inner.best_bid();
        let ask = inner.best_ask();
        if bid <= Decimal::ZERO || ask <= Decimal::ZERO || ask <= bid {
            return Decimal::ZERO;
        }
        ask - bid
    }

    pub fn microprice(&self, depth_levels: usize) -> Decimal {
        self.inner.read().microprice(depth_levels)
    }

    pub fn quantity_at_price(&self, price: Decimal, is_bid: bool) -> Decimal {
        let inner = self.inner.read();
        let side = if is_bid { &inner.bids } else { &inner.asks };
        side.get(&price).copied().unwrap_or_default()
    }

    /// Cumulative notional (`price * qty`) over the top N levels of one side.
    pub fn cumulative_volume(&self, is_bid: bool, levels: usize) -> Decimal {
        let inner = self.inner.read();
        if is_bid {
            inner
                .bids
                .iter()
                .rev()
                .take(levels)
                .map(|(price, qty)| price * qty)
                .sum()
        } else {
            inner
                .asks
                .iter()
                .take(levels)
                .map(|(price, qty)| price * qty)
                .sum()
        }
    }

    pub fn get_bids(&self, levels: usize) -> Vec<PriceLevel> {
        let inner = self.inner.read();
        inner
            .bids
            .iter()
            .rev()
            .take(levels)
            .map(|(&price, &quantity)| PriceLevel { price, quantity })
            .collect()
    }

    pub fn get_asks(&self, levels: usize) -> Vec<PriceLevel> {
        let inner = self.inner.read();
        inner
            .asks
            .iter()
            .take(levels)
            .map(|(&price, &quantity)| PriceLevel { price, quantity })
            .collect()
    }

    pub fn get_snapshot(&self, depth_levels: usize, include_depth: bool) -> BookSnapshot {
        let inner = self.inner.read();
        let mut snapshot = BookSnapshot::default();

        if inner.bids.is_empty() || inner.asks.is_empty() {
            return snapshot;
        }

        snapshot.best_bid = inner.best_bid();
        snapshot.best_ask = inner.best_ask();
        snapshot.spread = snapshot.best_ask - snapshot.best_bid;
        snapshot.bid_volume = inner
            .bids
            .iter()
            .rev()
            .take(depth_levels)
            .map(|(price, qty)| price * qty)
            .sum();
        snapshot.ask_volume = inner
            .asks
            .iter()
            .take(depth_levels)
            .map(|(price, qty)| price * qty)
            .sum();
        snapshot.microprice = inner.microprice(depth_levels);
        snapshot.last_update_id = inner.last_update_id;
        snapshot.timestamp = inner.last_update_time;

        if include_depth {
            snapshot.bids = inner
                .bids
                .iter()
                .rev()
                .take(depth_levels)
                .map(|(&price, &quantity)| PriceLevel { price, quantity })
                .collect();
            snapshot.asks = inner
                .asks
                .iter()
                .take(depth_levels)
                .map(|(&price, &quantity)| PriceLevel { price, quantity })
                .collect();
        }

        snapshot
    }

    /// Snapshot of the market as seen without our own resting quotes: levels
    /// whose price matches an excluded price (within 1e-6) are filtered out
    /// of top-of-book, volumes, and the microprice.
    pub fn get_snapshot_excluding(
        &self,
        exclude_bid_prices: &[Decimal],
        exclude_ask_prices: &[Decimal],
        depth_levels: usize,
    ) -> BookSnapshot {
        let inner = self.inner.read();
        let mut snapshot = BookSnapshot::default();

        if inner.bids.is_empty() || inner.asks.is_empty() {
            return snapshot;
        }

        snapshot.best_bid = inner
            .bids
            .iter()
            .rev()
            .map(|(&price, _)| price)
            .find(|&price| !excluded(price, exclude_bid_prices))
            .unwrap_or_default();
        snapshot.best_ask = inner
            .asks
            .iter()
            .map(|(&price, _)| price)
            .find(|&price| !excluded(price, exclude_ask_prices))
            .unwrap_or_default();

        if snapshot.best_bid <= Decimal::ZERO || snapshot.best_ask <= Decimal::ZERO {
            return snapshot;
        }

        snapshot.spread = snapshot.best_ask - snapshot.best_bid;
        snapshot.bid_volume = inner
            .bids
            .iter()
            .rev()
            .filter(|&(&price, _)| !excluded(price, exclude_bid_prices))
            .take(depth_levels)
            .map(|(price, qty)| price * qty)
            .sum();
        snapshot.ask_volume = inner
            .asks
            .iter()
            .filter(|&(&price, _)| !excluded(price, exclude_ask_prices))
            .take(depth_levels)
            .map(|(price, qty)| price * qty)
            .sum();

        let total = snapshot.bid_volume + snapshot.ask_volume;
        snapshot.microprice = if total > Decimal::ZERO {
            snapshot.best_bid * (snapshot.ask_volume / total)
                + snapshot.best_ask * (snapshot.bid_volume / total)
        } else {
            (snapshot.best_bid + snapshot.best_ask) / Decimal::TWO
        };

        snapshot.last_update_id = inner.last_update_id;
        snapshot.timestamp = inner.last_update_time;
        snapshot
    }

    /// Both sides populated and not crossed.
    pub fn is_valid(&self) -> bool {
        let inner = self.inner.read();
        !inner.bids.is_empty() && !inner.asks.is_empty() && inner.best_bid() < inner.best_ask()
    }

    pub fn last_update_id(&self) -> i64 {
        self.inner.read().last_update_id
    }

    pub fn last_update_time(&self) -> DateTime<Utc> {
        self.inner.read().last_update_time
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.bids.clear();
        inner.asks.clear();
        inner.last_update_id = 0;
        inner.last_update_time = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read();
        inner.bids.is_empty() && inner.asks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(price: Decimal, quantity: Decimal) -> PriceLevel {
        PriceLevel { price, quantity }
    }

    fn seeded_book() -> OrderBook {
        let book = OrderBook::new("SPYXUSDT");
        book.apply_snapshot(
            &[level(dec!(100), dec!(1)), level(dec!(99), dec!(2))],
            &[level(dec!(101), dec!(1)), level(dec!(102), dec!(2))],
            1,
        );
        book
    }

    #[test]
    fn test_snapshot_then_update() {
        let book = seeded_book();
        book.apply_update(
            &[level(dec!(100), dec!(0))],
            &[level(dec!(101), dec!(3))],
            2,
        );

        assert_eq!(book.best_bid(), dec!(99));
        assert_eq!(book.best_ask(), dec!(101));
        assert_eq!(book.quantity_at_price(dec!(101), false), dec!(3));
        assert_eq!(book.last_update_id(), 2);
        assert!(book.is_valid());
    }

    #[test]
    fn test_update_leaves_absent_levels_unchanged() {
        let book = seeded_book();
        book.apply_update(&[level(dec!(98), dec!(5))], &[], 2);
        assert_eq!(book.best_bid(), dec!(100));
        assert_eq!(book.quantity_at_price(dec!(98), true), dec!(5));
        assert_eq!(book.quantity_at_price(dec!(99), true), dec!(2));
    }

    #[test]
    fn test_snapshot_drops_non_positive_levels() {
        let book = OrderBook::new("SPYXUSDT");
        book.apply_snapshot(
            &[level(dec!(100), dec!(0)), level(dec!(99), dec!(1))],
            &[level(dec!(101), dec!(-1)), level(dec!(102), dec!(2))],
            1,
        );
        assert_eq!(book.best_bid(), dec!(99));
        assert_eq!(book.best_ask(), dec!(102));
    }

    #[test]
    fn test_microprice_pulled_toward_thin_side() {
        // Heavy bid, thin ask: fair value sits near the ask.
        let book = OrderBook::new("SPYXUSDT");
        book.apply_snapshot(&[level(dec!(10), dec!(10))], &[level(dec!(11), dec!(1))], 1);

        // bid notional 100, ask notional 11:
        // micro = 10 * 11/111 + 11 * 100/111 = 1210/111
        let micro = book.microprice(5);
        assert!((micro - dec!(10.9009)).abs() < dec!(0.0001));
    }

    #[test]
    fn test_microprice_bounded_by_touch() {
        let book = seeded_book();
        let micro = book.microprice(5);
        assert!(micro >= book.best_bid());
        assert!(micro <= book.best_ask());
    }

    #[test]
    fn test_microprice_empty_side_is_zero() {
        let book = OrderBook::new("SPYXUSDT");
        book.apply_snapshot(&[level(dec!(10), dec!(1))], &[], 1);
        assert_eq!(book.microprice(5), Decimal::ZERO);
    }

    #[test]
    fn test_crossed_book_invalid() {
        let book = OrderBook::new("SPYXUSDT");
        book.apply_snapshot(&[level(dec!(101), dec!(1))], &[level(dec!(100), dec!(1))], 1);
        assert!(!book.is_valid());
        assert_eq!(book.spread(), Decimal::ZERO);
    }

    #[test]
    fn test_cumulative_volume_is_notional() {
        let book = seeded_book();
        // 100*1 + 99*2
        assert_eq!(book.cumulative_volume(true, 5), dec!(298));
        // 101*1 only
        assert_eq!(book.cumulative_volume(false, 1), dec!(101));
    }

    #[test]
    fn test_get_bids_best_first() {
        let book = seeded_book();
        let bids = book.get_bids(5);
        assert_eq!(bids.len(), 2);
        assert_eq!(bids[0].price, dec!(100));
        assert_eq!(bids[1].price, dec!(99));
    }

    #[test]
    fn test_snapshot_excluding_own_quote() {
        let book = seeded_book();
        // Our own bid rests at 100; the market without us starts at 99.
        let snap = book.get_snapshot_excluding(&[dec!(100)], &[], 5);
        assert_eq!(snap.best_bid, dec!(99));
        assert_eq!(snap.best_ask, dec!(101));
        assert_eq!(snap.bid_volume, dec!(198));
        // Microprice recomputed from filtered volumes stays within the touch.
        assert!(snap.microprice >= snap.best_bid && snap.microprice <= snap.best_ask);
    }

    #[test]
    fn test_snapshot_excluding_everything_returns_empty() {
        let book = OrderBook::new("SPYXUSDT");
        book.apply_snapshot(&[level(dec!(100), dec!(1))], &[level(dec!(101), dec!(1))], 1);
        let snap = book.get_snapshot_excluding(&[dec!(100)], &[], 5);
        assert!(!snap.has_both_sides());
    }

    #[test]
    fn test_exclusion_tolerance() {
        let book = OrderBook::new("SPYXUSDT");
        book.apply_snapshot(
            &[level(dec!(100.0000004), dec!(1)), level(dec!(99), dec!(1))],
            &[level(dec!(101), dec!(1))],
            1,
        );
        let snap = book.get_snapshot_excluding(&[dec!(100.0000001)], &[], 5);
        assert_eq!(snap.best_bid, dec!(99));
    }

    #[test]
    fn test_get_snapshot_with_depth() {
        let book = seeded_book();
        let snap = book.get_snapshot(5, true);
        assert_eq!(snap.bids.len(), 2);
        assert_eq!(snap.asks.len(), 2);
        assert_eq!(snap.best_bid, dec!(100));
        assert_eq!(snap.spread, dec!(1));
        assert_eq!(snap.last_update_id, 1);
    }

    #[test]
    fn test_clear() {
        let book = seeded_book();
        book.clear();
        assert!(book.is_empty());
        assert_eq!(book.last_update_id(), 0);
        assert_eq!(book.best_bid(), Decimal::ZERO);
    }

    #[test]
    fn test_last_update_id_tracks_maximum_applied() {
        let book = seeded_book();
        book.apply_update(&[], &[level(dec!(103), dec!(1))], 5);
        book.apply_update(&[], &[level(dec!(104), dec!(1))], 9);
        assert_eq!(book.last_update_id(), 9);
    }
}
