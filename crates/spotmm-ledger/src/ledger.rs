//! Append-only trade ledger with weighted-average-cost accounting.
//!
//! All quantities are scaled integers: `base_qty` in `10^quantity_precision`
//! units, `quote_qty` and PnL in `10^quote_precision` units. Sells realize
//! PnL against the current average cost of the held position; the strategy
//! is never short, so sell quantity beyond current inventory is dropped.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use spotmm_core::Side;

use crate::error::{LedgerError, LedgerResult};

/// Realized PnL is clamped to +/- 10^15 quote units.
const QUOTE_CAPACITY_LIMIT: i64 = 1_000_000_000_000_000;

/// Ledger construction parameters.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub storage_path: PathBuf,
    /// `10^quantity_precision`.
    pub base_scale: i64,
    /// `10^quote_precision`.
    pub quote_scale: i64,
}

/// One persisted fill. Field names match the on-disk record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeFill {
    #[serde(default)]
    pub id: i64,
    /// Fill time, milliseconds since epoch.
    #[serde(rename = "time", default)]
    pub time_ms: i64,
    #[serde(default = "default_side")]
    pub side: Side,
    /// Base quantity in `base_scale` units.
    #[serde(rename = "base", default)]
    pub base_qty: i64,
    /// Quote quantity in `quote_scale` units.
    #[serde(rename = "quote", default)]
    pub quote_qty: i64,
    /// Fee in the fee asset's own scale; informational only.
    #[serde(rename = "feeQty", default)]
    pub fee_qty: i64,
    #[serde(rename = "feeAsset", default)]
    pub fee_asset: String,
    #[serde(rename = "isMaker", default = "default_is_maker")]
    pub is_maker: bool,
}

fn default_side() -> Side {
    Side::Buy
}

fn default_is_maker() -> bool {
    true
}

/// Derived position state, rebuilt from disk on load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerState {
    /// Held base quantity in `base_scale` units; never negative.
    pub position_base: i64,
    /// Cost basis of the held position in `quote_scale` units; never negative.
    pub position_cost: i64,
    /// Realized PnL in `quote_scale` units.
    pub realized_pnl: i64,
    /// Highest fill id ever appended.
    pub last_trade_id: i64,
}

/// Durable append-only log of own fills.
///
/// Owns its file exclusively; every `append` is flushed before returning.
pub struct TradeLedger {
    config: LedgerConfig,
    state: LedgerState,
    entries: Vec<TradeFill>,
    writer: Option<File>,
}

impl TradeLedger {
    pub fn new(config: LedgerConfig) -> LedgerResult<Self> {
        if config.base_scale <= 0 || config.quote_scale <= 0 {
            return Err(LedgerError::Config(format!(
                "scales must be positive (base_scale={}, quote_scale={})",
                config.base_scale, config.quote_scale
            )));
        }
        Ok(Self {
            config,
            state: LedgerState::default(),
            entries: Vec::new(),
            writer: None,
        })
    }

    /// Read the storage file and rebuild state by replaying fills in
    /// ascending id order. Unparseable lines are skipped; they must never
    /// abort startup.
    pub fn load(&mut self) -> LedgerResult<LedgerState> {
        self.entries.clear();
        self.state = LedgerState::default();
        self.ensure_directory()?;

        let file = match File::open(&self.config.storage_path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.config.storage_path.display(), "No ledger file yet");
                return Ok(self.state);
            }
            Err(err) => return Err(err.into()),
        };

        let mut skipped = 0usize;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TradeFill>(&line) {
                Ok(fill) => self.entries.push(fill),
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(skipped, "Skipped unparseable ledger lines");
        }

        self.rebuild_from_entries()?;
        Ok(self.state)
    }

    /// Persist a fill (one line, flushed) and fold it into the state.
    pub fn append(&mut self, fill: TradeFill) -> LedgerResult<()> {
        self.persist_fill(&fill)?;
        self.entries.push(fill.clone());
        Self::apply_fill(&mut self.state, &fill)
    }

    /// Read-only view of the derived state.
    pub fn state(&self) -> LedgerState {
        self.state
    }

    pub fn base_scale(&self) -> i64 {
        self.config.base_scale
    }

    pub fn quote_scale(&self) -> i64 {
        self.config.quote_scale
    }

    fn ensure_directory(&self) -> LedgerResult<()> {
        if let Some(dir) = self.config.storage_path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }

    fn rebuild_from_entries(&mut self) -> LedgerResult<()> {
        self.state = LedgerState::default();
        let mut sorted = self.entries.clone();
        sorted.sort_by_key(|fill| fill.id);
        for fill in &sorted {
            Self::apply_fill(&mut self.state, fill)?;
        }
        Ok(())
    }

    /// The accounting step, identical in load-rebuild and append.
    fn apply_fill(state: &mut LedgerState, fill: &TradeFill) -> LedgerResult<()> {
        match fill.side {
            Side::Buy => {
                state.position_base = safe_add(state.position_base, fill.base_qty, fill.id)?;
                state.position_cost = safe_add(state.position_cost, fill.quote_qty, fill.id)?;
            }
            Side::Sell => {
                let mut remaining = fill.base_qty;
                while remaining > 0 && state.position_base > 0 {
                    let avg_cost =
                        state.position_cost as f64 / state.position_base.max(1) as f64;
                    let matched = state.position_base.min(remaining);
                    let cost_reduction = (avg_cost * matched as f64).round() as i64;
                    let fill_ratio = matched as f64 / fill.base_qty as f64;
                    let proceeds = (fill.quote_qty as f64 * fill_ratio).round() as i64;

                    state.position_base -= matched;
                    state.position_cost = (state.position_cost - cost_reduction).max(0);
                    state.realized_pnl =
                        safe_add(state.realized_pnl, proceeds - cost_reduction, fill.id)?;

                    remaining -= matched;
                }
            }
        }

        state.last_trade_id = state.last_trade_id.max(fill.id);
        state.realized_pnl = state
            .realized_pnl
            .clamp(-QUOTE_CAPACITY_LIMIT, QUOTE_CAPACITY_LIMIT);
        Ok(())
    }

    fn persist_fill(&mut self, fill: &TradeFill) -> LedgerResult<()> {
        if self.writer.is_none() {
            self.ensure_directory()?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.config.storage_path)?;
            self.writer = Some(file);
        }
        let writer = self.writer.as_mut().expect("writer just opened");
        let line = serde_json::to_string(fill)?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

fn safe_add(lhs: i64, rhs: i64, trade_id: i64) -> LedgerResult<i64> {
    lhs.checked_add(rhs)
        .ok_or(LedgerError::Overflow { trade_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger_at(dir: &TempDir) -> TradeLedger {
        TradeLedger::new(LedgerConfig {
            storage_path: dir.path().join("fills.jsonl"),
            base_scale: 10_000,
            quote_scale: 100,
        })
        .unwrap()
    }

    fn buy(id: i64, base: i64, quote: i64) -> TradeFill {
        TradeFill {
            id,
            time_ms: 1_700_000_000_000 + id,
            side: Side::Buy,
            base_qty: base,
            quote_qty: quote,
            fee_qty: 0,
            fee_asset: String::new(),
            is_maker: true,
        }
    }

    fn sell(id: i64, base: i64, quote: i64) -> TradeFill {
        TradeFill {
            side: Side::Sell,
            ..buy(id, base, quote)
        }
    }

    #[test]
    fn test_scales_must_be_positive() {
        let dir = TempDir::new().unwrap();
        let result = TradeLedger::new(LedgerConfig {
            storage_path: dir.path().join("fills.jsonl"),
            base_scale: 0,
            quote_scale: 100,
        });
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_weighted_average_round_trip() {
        // 1.0 base @ 50.0 quote, then sell 0.6 base @ 55.0 (precisions 4 & 2).
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger_at(&dir);
        ledger.load().unwrap();

        ledger.append(buy(1, 10_000, 500_000)).unwrap();
        ledger.append(sell(2, 6_000, 330_000)).unwrap();

        let state = ledger.state();
        assert_eq!(state.position_base, 4_000);
        assert_eq!(state.position_cost, 200_000);
        // 330000 - round(50/unit * 6000) = 330000 - 300000
        assert_eq!(state.realized_pnl, 30_000);
        assert_eq!(state.last_trade_id, 2);

        // Reload from disk reproduces the same state.
        let mut reopened = ledger_at(&dir);
        let reloaded = reopened.load().unwrap();
        assert_eq!(reloaded, state);
    }

    #[test]
    fn test_sell_beyond_inventory_is_dropped() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger_at(&dir);
        ledger.load().unwrap();

        ledger.append(buy(1, 5_000, 250_000)).unwrap();
        // Sell 1.0 while holding 0.5: only the held half is accounted.
        ledger.append(sell(2, 10_000, 600_000)).unwrap();

        let state = ledger.state();
        assert_eq!(state.position_base, 0);
        assert_eq!(state.position_cost, 0);
        // Proceeds prorated to the matched half: 300000 - 250000.
        assert_eq!(state.realized_pnl, 50_000);
    }

    #[test]
    fn test_load_skips_garbage_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fills.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(file, r#"{{"id":1,"time":1,"side":"BUY","base":10000,"quote":500000,"feeQty":0,"feeAsset":"","isMaker":true}}"#).unwrap();
        writeln!(file, "this is not json").unwrap();
        writeln!(file, r#"{{"truncated":"#).unwrap();
        writeln!(file, r#"{{"id":2,"time":2,"side":"SELL","base":6000,"quote":330000,"feeQty":0,"feeAsset":"","isMaker":false}}"#).unwrap();

        let mut ledger = TradeLedger::new(LedgerConfig {
            storage_path: path,
            base_scale: 10_000,
            quote_scale: 100,
        })
        .unwrap();
        let state = ledger.load().unwrap();

        assert_eq!(state.position_base, 4_000);
        assert_eq!(state.realized_pnl, 30_000);
        assert_eq!(state.last_trade_id, 2);
    }

    #[test]
    fn test_rebuild_orders_by_id_regardless_of_file_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fills.jsonl");
        let mut file = File::create(&path).unwrap();
        // Sell recorded before the buy it depends on; replay must sort by id.
        writeln!(file, r#"{{"id":2,"time":2,"side":"SELL","base":6000,"quote":330000}}"#).unwrap();
        writeln!(file, r#"{{"id":1,"time":1,"side":"BUY","base":10000,"quote":500000}}"#).unwrap();

        let mut ledger = TradeLedger::new(LedgerConfig {
            storage_path: path,
            base_scale: 10_000,
            quote_scale: 100,
        })
        .unwrap();
        let state = ledger.load().unwrap();
        assert_eq!(state.position_base, 4_000);
        assert_eq!(state.realized_pnl, 30_000);
    }

    #[test]
    fn test_append_matches_load_rebuild() {
        let dir = TempDir::new().unwrap();
        let fills = vec![
            buy(1, 10_000, 500_000),
            buy(2, 4_000, 220_000),
            sell(3, 8_000, 480_000),
            buy(4, 2_000, 98_000),
            sell(5, 8_000, 430_000),
        ];

        let mut live = ledger_at(&dir);
        live.load().unwrap();
        for fill in &fills {
            live.append(fill.clone()).unwrap();
        }

        let mut replayed = ledger_at(&dir);
        let state = replayed.load().unwrap();
        let live_state = live.state();

        assert_eq!(state.position_base, live_state.position_base);
        assert_eq!(state.last_trade_id, live_state.last_trade_id);
        assert!((state.position_cost - live_state.position_cost).abs() <= 1);
        assert!((state.realized_pnl - live_state.realized_pnl).abs() <= 1);
    }

    #[test]
    fn test_position_equals_buys_minus_sells() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger_at(&dir);
        ledger.load().unwrap();

        ledger.append(buy(1, 3_000, 150_000)).unwrap();
        ledger.append(buy(2, 7_000, 360_000)).unwrap();
        ledger.append(sell(3, 4_000, 210_000)).unwrap();

        assert_eq!(ledger.state().position_base, 3_000 + 7_000 - 4_000);
    }

    #[test]
    fn test_overflow_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger_at(&dir);
        ledger.load().unwrap();

        ledger.append(buy(1, i64::MAX - 1, 100)).unwrap();
        let result = ledger.append(buy(2, 2, 100));
        assert!(matches!(result, Err(LedgerError::Overflow { trade_id: 2 })));
    }

    #[test]
    fn test_last_trade_id_is_monotonic_max() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger_at(&dir);
        ledger.load().unwrap();

        ledger.append(buy(7, 1_000, 50_000)).unwrap();
        ledger.append(buy(3, 1_000, 50_000)).unwrap();
        assert_eq!(ledger.state().last_trade_id, 7);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("fills.jsonl");
        let mut ledger = TradeLedger::new(LedgerConfig {
            storage_path: path.clone(),
            base_scale: 10_000,
            quote_scale: 100,
        })
        .unwrap();
        ledger.load().unwrap();
        ledger.append(buy(1, 100, 5_000)).unwrap();
        assert!(path.exists());
    }
}
