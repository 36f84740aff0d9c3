//! Concurrent in-memory order book for a single symbol.
//!
//! Writers (depth-feed applicators) take exclusive access during
//! `apply_snapshot`/`apply_update`/`clear`; readers (strategy, observers)
//! take shared access for all getters and receive self-contained copies, so
//! they never observe mid-update state.

pub mod book;
pub mod feed;

pub use book::{BookSnapshot, OrderBook, PriceLevel};
pub use feed::{BookFeed, DepthMessage, DropReason, FeedOutcome};
