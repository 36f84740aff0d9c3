//! Depth-stream applicator with version-gap gating.
//!
//! Aggregated depth streams tag each message with `fromVersion`/`toVersion`
//! and periodically skip versions under backpressure. Dropping every gapped
//! message stalls the book forever; applying everything risks silent
//! corruption. The middle ground here: small gaps pass, large forward gaps
//! re-anchor the version baseline (accepting the message), and far-behind
//! messages are dropped as stale.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::book::{OrderBook, PriceLevel};

/// Forward gap beyond which a subsequent message re-anchors the baseline.
const SUBSEQUENT_GAP_LIMIT: i64 = 100;
/// Backward gap beyond which a message is dropped as stale.
const STALE_GAP_LIMIT: i64 = 100;
/// Forward gap beyond which the first post-snapshot message would corrupt
/// the book and is dropped instead of re-anchored.
const FIRST_GAP_LIMIT: i64 = 5000;

/// One depth-stream message. Quantities are absolute, not deltas.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DepthMessage {
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
    #[serde(rename = "fromVersion")]
    pub from_version: Option<String>,
    #[serde(rename = "toVersion")]
    pub to_version: Option<String>,
    #[serde(rename = "lastUpdateId")]
    pub update_id: Option<i64>,
}

/// Why a message was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Neither side carried levels.
    Empty,
    /// First message after the snapshot is too far ahead to apply safely.
    AheadOfSnapshot { gap: i64 },
    /// Message is behind what the book already reflects.
    Stale { gap: i64 },
    /// Book is not valid yet and the message cannot bootstrap it.
    Incomplete,
}

/// Result of feeding one message into the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    AppliedSnapshot,
    AppliedUpdate,
    Dropped(DropReason),
}

/// Applies a REST snapshot followed by version-checked incremental updates.
pub struct BookFeed {
    book: Arc<OrderBook>,
    /// Version of the REST snapshot; the anchor for the first stream message.
    snapshot_version: i64,
    /// `toVersion` of the last applied message, once one has been applied.
    last_to_version: Option<i64>,
}

impl BookFeed {
    pub fn new(book: Arc<OrderBook>) -> Self {
        Self {
            book,
            snapshot_version: 0,
            last_to_version: None,
        }
    }

    pub fn book(&self) -> &Arc<OrderBook> {
        &self.book
    }

    /// Seed the book from a REST depth snapshot and reset version tracking.
    pub fn prime(&mut self, bids: &[PriceLevel], asks: &[PriceLevel], last_update_id: i64) {
        self.book.apply_snapshot(bids, asks, last_update_id);
        self.snapshot_version = last_update_id;
        self.last_to_version = None;
        debug!(
            version = last_update_id,
            bids = bids.len(),
            asks = asks.len(),
            "Primed order book from snapshot"
        );
    }

    pub fn handle_message(&mut self, message: &DepthMessage) -> FeedOutcome {
        let bids: Vec<PriceLevel> = message
            .bids
            .iter()
            .filter(|(price, qty)| *price > Decimal::ZERO && *qty >= Decimal::ZERO)
            .map(|&(price, quantity)| PriceLevel { price, quantity })
            .collect();
        let asks: Vec<PriceLevel> = message
            .asks
            .iter()
            .filter(|(price, qty)| *price > Decimal::ZERO && *qty >= Decimal::ZERO)
            .map(|&(price, quantity)| PriceLevel { price, quantity })
            .collect();

        if bids.is_empty() && asks.is_empty() {
            return FeedOutcome::Dropped(DropReason::Empty);
        }

        let from_version = parse_version(message.from_version.as_deref());
        let to_version = parse_version(message.to_version.as_deref());

        if let Some(from) = from_version {
            if let Some(reason) = self.check_version_gap(from) {
                return FeedOutcome::Dropped(reason);
            }
        }

        let update_id = to_version
            .or(message.update_id)
            .or(from_version)
            .unwrap_or(0);

        let is_snapshot = self.book.last_update_id() == 0 && !bids.is_empty() && !asks.is_empty();
        let outcome = if is_snapshot {
            self.book.apply_snapshot(&bids, &asks, update_id);
            self.snapshot_version = update_id;
            FeedOutcome::AppliedSnapshot
        } else if self.book.is_valid() || (!bids.is_empty() && !asks.is_empty()) {
            self.book.apply_update(&bids, &asks, update_id);
            FeedOutcome::AppliedUpdate
        } else {
            return FeedOutcome::Dropped(DropReason::Incomplete);
        };

        if let Some(to) = to_version {
            self.last_to_version = Some(to);
        } else if update_id > 0 {
            self.last_to_version = Some(update_id);
        }

        outcome
    }

    /// Gate a message on its `fromVersion`. Returns a drop reason, or `None`
    /// to accept (possibly after re-anchoring the baseline).
    fn check_version_gap(&mut self, from: i64) -> Option<DropReason> {
        match self.last_to_version {
            None => {
                // First stream message; the REST snapshot is the anchor.
                if self.snapshot_version > 0 {
                    let expected = self.snapshot_version + 1;
                    let gap = from - expected;
                    if gap > FIRST_GAP_LIMIT {
                        warn!(
                            gap,
                            from,
                            snapshot = self.snapshot_version,
                            "First depth message too far ahead of snapshot; dropping"
                        );
                        return Some(DropReason::AheadOfSnapshot { gap });
                    }
                    if gap < 0 && -gap > STALE_GAP_LIMIT {
                        return Some(DropReason::Stale { gap });
                    }
                    if gap > 0 {
                        if gap > 1000 {
                            warn!(gap, "Large first-message gap; re-anchoring baseline");
                        }
                        self.snapshot_version = from - 1;
                    }
                } else if from > 0 {
                    // No snapshot yet; accept the stream as the baseline.
                    self.snapshot_version = from - 1;
                }
                None
            }
            Some(last_to) => {
                let expected = last_to + 1;
                let gap = from - expected;
                if gap > SUBSEQUENT_GAP_LIMIT {
                    // Re-anchor rather than reject: a permanently stalled
                    // book is worse than a briefly stale one.
                    warn!(gap, from, expected, "Version gap; re-anchoring baseline");
                    self.last_to_version = Some(from - 1);
                    None
                } else if gap < 0 && -gap > STALE_GAP_LIMIT {
                    Some(DropReason::Stale { gap })
                } else {
                    None
                }
            }
        }
    }
}

fn parse_version(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn feed_with_snapshot() -> BookFeed {
        let book = Arc::new(OrderBook::new("SPYXUSDT"));
        let mut feed = BookFeed::new(book);
        feed.prime(
            &[PriceLevel::new(dec!(100), dec!(1))],
            &[PriceLevel::new(dec!(101), dec!(1))],
            1000,
        );
        feed
    }

    fn message(from: i64, to: i64, bid: (Decimal, Decimal)) -> DepthMessage {
        DepthMessage {
            bids: vec![bid],
            asks: vec![],
            from_version: Some(from.to_string()),
            to_version: Some(to.to_string()),
            update_id: None,
        }
    }

    #[test]
    fn test_contiguous_updates_apply() {
        let mut feed = feed_with_snapshot();
        let outcome = feed.handle_message(&message(1001, 1005, (dec!(100.5), dec!(2))));
        assert_eq!(outcome, FeedOutcome::AppliedUpdate);
        assert_eq!(feed.book().best_bid(), dec!(100.5));
        assert_eq!(feed.book().last_update_id(), 1005);

        let outcome = feed.handle_message(&message(1006, 1010, (dec!(100.6), dec!(1))));
        assert_eq!(outcome, FeedOutcome::AppliedUpdate);
        assert_eq!(feed.book().best_bid(), dec!(100.6));
    }

    #[test]
    fn test_empty_message_dropped() {
        let mut feed = feed_with_snapshot();
        let outcome = feed.handle_message(&DepthMessage::default());
        assert_eq!(outcome, FeedOutcome::Dropped(DropReason::Empty));
    }

    #[test]
    fn test_small_gap_accepted() {
        let mut feed = feed_with_snapshot();
        feed.handle_message(&message(1001, 1005, (dec!(100.5), dec!(2))));
        // Gap of 50 versions: within tolerance, applied as-is.
        let outcome = feed.handle_message(&message(1056, 1060, (dec!(100.7), dec!(1))));
        assert_eq!(outcome, FeedOutcome::AppliedUpdate);
    }

    #[test]
    fn test_large_forward_gap_reanchors_and_applies() {
        let mut feed = feed_with_snapshot();
        feed.handle_message(&message(1001, 1005, (dec!(100.5), dec!(2))));
        // Gap of 494: beyond tolerance, but the message is still applied so
        // the book does not stall permanently.
        let outcome = feed.handle_message(&message(1500, 1510, (dec!(100.9), dec!(1))));
        assert_eq!(outcome, FeedOutcome::AppliedUpdate);
        assert_eq!(feed.book().best_bid(), dec!(100.9));

        // Continuity resumes from the re-anchored version.
        let outcome = feed.handle_message(&message(1511, 1512, (dec!(101.0), dec!(1))));
        assert_eq!(outcome, FeedOutcome::AppliedUpdate);
    }

    #[test]
    fn test_far_behind_message_dropped() {
        let mut feed = feed_with_snapshot();
        feed.handle_message(&message(1001, 1005, (dec!(100.5), dec!(2))));
        let outcome = feed.handle_message(&message(800, 810, (dec!(99), dec!(1))));
        assert!(matches!(
            outcome,
            FeedOutcome::Dropped(DropReason::Stale { .. })
        ));
        // Book untouched.
        assert_eq!(feed.book().best_bid(), dec!(100.5));
    }

    #[test]
    fn test_first_message_moderate_gap_adjusts_anchor() {
        let mut feed = feed_with_snapshot();
        // Snapshot at 1000, first message from 3000: within the 5000 bound.
        let outcome = feed.handle_message(&message(3000, 3004, (dec!(100.2), dec!(1))));
        assert_eq!(outcome, FeedOutcome::AppliedUpdate);
        assert_eq!(feed.book().best_bid(), dec!(100.2));
    }

    #[test]
    fn test_first_message_huge_gap_dropped() {
        let mut feed = feed_with_snapshot();
        let outcome = feed.handle_message(&message(7000, 7004, (dec!(100.2), dec!(1))));
        assert!(matches!(
            outcome,
            FeedOutcome::Dropped(DropReason::AheadOfSnapshot { .. })
        ));
        assert_eq!(feed.book().best_bid(), dec!(100));
    }

    #[test]
    fn test_first_message_stale_dropped() {
        let mut feed = feed_with_snapshot();
        let outcome = feed.handle_message(&message(500, 510, (dec!(99), dec!(1))));
        assert!(matches!(
            outcome,
            FeedOutcome::Dropped(DropReason::Stale { .. })
        ));
    }

    #[test]
    fn test_two_sided_message_bootstraps_empty_book() {
        let book = Arc::new(OrderBook::new("SPYXUSDT"));
        let mut feed = BookFeed::new(book);
        let msg = DepthMessage {
            bids: vec![(dec!(100), dec!(1))],
            asks: vec![(dec!(101), dec!(1))],
            from_version: Some("2000".to_string()),
            to_version: Some("2005".to_string()),
            update_id: None,
        };
        let outcome = feed.handle_message(&msg);
        assert_eq!(outcome, FeedOutcome::AppliedSnapshot);
        assert!(feed.book().is_valid());
        assert_eq!(feed.book().last_update_id(), 2005);
    }

    #[test]
    fn test_one_sided_message_cannot_bootstrap() {
        let book = Arc::new(OrderBook::new("SPYXUSDT"));
        let mut feed = BookFeed::new(book);
        let msg = DepthMessage {
            bids: vec![(dec!(100), dec!(1))],
            asks: vec![],
            from_version: Some("2000".to_string()),
            to_version: Some("2005".to_string()),
            update_id: None,
        };
        let outcome = feed.handle_message(&msg);
        assert_eq!(outcome, FeedOutcome::Dropped(DropReason::Incomplete));
    }

    #[test]
    fn test_zero_quantity_removes_level() {
        let mut feed = feed_with_snapshot();
        let msg = DepthMessage {
            bids: vec![(dec!(100), dec!(0)), (dec!(99.5), dec!(1))],
            asks: vec![],
            from_version: Some("1001".to_string()),
            to_version: Some("1002".to_string()),
            update_id: None,
        };
        feed.handle_message(&msg);
        assert_eq!(feed.book().best_bid(), dec!(99.5));
    }

    #[test]
    fn test_update_id_falls_back_to_last_update_id_field() {
        let mut feed = feed_with_snapshot();
        let msg = DepthMessage {
            bids: vec![(dec!(100.1), dec!(1))],
            asks: vec![],
            from_version: None,
            to_version: None,
            update_id: Some(4242),
        };
        let outcome = feed.handle_message(&msg);
        assert_eq!(outcome, FeedOutcome::AppliedUpdate);
        assert_eq!(feed.book().last_update_id(), 4242);
    }

    #[test]
    fn test_wire_parsing() {
        let raw = r#"{
            "bids": [["100.5", "2"], ["100.4", "0"]],
            "asks": [["101.0", "3"]],
            "fromVersion": "1001",
            "toVersion": "1003"
        }"#;
        let msg: DepthMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.bids.len(), 2);
        assert_eq!(msg.bids[0], (dec!(100.5), dec!(2)));
        assert_eq!(msg.from_version.as_deref(), Some("1001"));
    }
}
