//! End-to-end exercise of the snapshot-then-stream lifecycle: a REST prime,
//! a run of incremental messages with gaps, and reader queries in between.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use spotmm_book::{BookFeed, DepthMessage, DropReason, FeedOutcome, OrderBook, PriceLevel};

fn level(price: Decimal, quantity: Decimal) -> PriceLevel {
    PriceLevel::new(price, quantity)
}

fn message(
    from: i64,
    to: i64,
    bids: Vec<(Decimal, Decimal)>,
    asks: Vec<(Decimal, Decimal)>,
) -> DepthMessage {
    DepthMessage {
        bids,
        asks,
        from_version: Some(from.to_string()),
        to_version: Some(to.to_string()),
        update_id: None,
    }
}

#[test]
fn snapshot_stream_lifecycle() {
    let book = Arc::new(OrderBook::new("SPYXUSDT"));
    let mut feed = BookFeed::new(book.clone());

    feed.prime(
        &[
            level(dec!(100.00), dec!(2)),
            level(dec!(99.90), dec!(3)),
            level(dec!(99.80), dec!(5)),
        ],
        &[
            level(dec!(100.10), dec!(1)),
            level(dec!(100.20), dec!(4)),
            level(dec!(100.30), dec!(6)),
        ],
        5_000,
    );

    assert!(book.is_valid());
    assert_eq!(book.best_bid(), dec!(100.00));
    assert_eq!(book.best_ask(), dec!(100.10));
    assert_eq!(book.last_update_id(), 5_000);

    // Contiguous update: tighten the ask, remove the second bid.
    let outcome = feed.handle_message(&message(
        5_001,
        5_010,
        vec![(dec!(99.90), dec!(0))],
        vec![(dec!(100.05), dec!(2))],
    ));
    assert_eq!(outcome, FeedOutcome::AppliedUpdate);
    assert_eq!(book.best_ask(), dec!(100.05));
    assert_eq!(book.quantity_at_price(dec!(99.90), true), Decimal::ZERO);

    // Readers see a consistent snapshot mid-stream.
    let snap = book.get_snapshot(5, true);
    assert!(snap.microprice >= snap.best_bid && snap.microprice <= snap.best_ask);
    assert_eq!(snap.last_update_id, 5_010);
    assert_eq!(snap.bids.len(), 2);

    // A stale replay from before the snapshot is refused.
    let outcome = feed.handle_message(&message(
        4_000,
        4_005,
        vec![(dec!(98), dec!(10))],
        vec![],
    ));
    assert!(matches!(
        outcome,
        FeedOutcome::Dropped(DropReason::Stale { .. })
    ));
    assert_eq!(book.best_bid(), dec!(100.00));

    // A large forward gap re-anchors rather than stalling the book.
    let outcome = feed.handle_message(&message(
        9_000,
        9_002,
        vec![(dec!(100.02), dec!(1))],
        vec![],
    ));
    assert_eq!(outcome, FeedOutcome::AppliedUpdate);
    assert_eq!(book.best_bid(), dec!(100.02));

    // Stream resumes contiguously from the new anchor.
    let outcome = feed.handle_message(&message(
        9_003,
        9_004,
        vec![],
        vec![(dec!(100.04), dec!(1))],
    ));
    assert_eq!(outcome, FeedOutcome::AppliedUpdate);
    assert_eq!(book.best_ask(), dec!(100.04));
    assert!(book.is_valid());

    // The exclusion view hides our own resting quote.
    let ex = book.get_snapshot_excluding(&[dec!(100.02)], &[], 5);
    assert_eq!(ex.best_bid, dec!(100.00));
}
