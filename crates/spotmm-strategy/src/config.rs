//! Strategy configuration.
//!
//! Defaults match a small-account deployment on a thin spot pair; every field
//! can be overridden from the bot's TOML config. Exchange filters loaded at
//! startup may tighten the sizing grid further (`apply_exchange_filters`).

use std::path::PathBuf;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use spotmm_core::{precision_from_step, ExchangeFilters};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Trading symbol, e.g. `SPYXUSDT`.
    pub symbol: String,
    /// Trade-ledger file location.
    pub ledger_path: PathBuf,

    /// Max quote spent per single buy (or equivalent sell).
    pub quote_budget: Decimal,
    /// Placement floor in quote units.
    pub min_quote_order: Decimal,
    /// Placement floor in base units.
    pub min_base_quantity: Decimal,

    /// Target quoting half-spread, basis points.
    pub spread_bps: Decimal,
    /// Minimum edge required before quoting at all, basis points.
    pub min_edge_bps: Decimal,

    /// Desired base share of NAV.
    pub inventory_target: Decimal,
    /// Deadband around the target.
    pub inventory_tolerance: Decimal,
    /// Hard guard; outside it the corresponding quote side pauses.
    pub max_inventory_ratio: Decimal,

    /// Adverse-move trigger for escapes, basis points.
    pub escape_bps: Decimal,
    /// Hysteresis applied to the escape threshold, basis points.
    pub escape_hysteresis_bps: Decimal,
    pub min_escape_interval_ms: u64,
    pub taker_escape_cooldown_ms: u64,
    pub max_taker_escapes_per_min: u32,

    /// Fee fractions (0.0005 = 5 bps).
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,

    /// Sizing grid; exchange filters may tighten these at startup.
    pub quantity_increment: Decimal,
    pub quote_increment: Decimal,
    pub price_precision: u32,
    pub quantity_precision: u32,
    pub quote_precision: u32,

    /// Risk halt thresholds; zero disables the corresponding check.
    pub max_drawdown_pct: Decimal,
    pub max_drawdown_usd: Decimal,
    pub risk_cooldown_ms: u64,

    /// Loop pacing.
    pub refresh_interval_ms: u64,
    pub account_staleness_ms: i64,
    pub depth_staleness_ms: i64,
    pub order_status_poll_ms: u64,
    pub order_status_timeout_ms: u64,
    pub fill_poll_interval_ms: u64,

    /// Governor bounds.
    pub rate_limit_backoff_ms_initial: u64,
    pub rate_limit_backoff_ms_max: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol: "SPYXUSDT".to_string(),
            ledger_path: PathBuf::from("data/trade_ledger.jsonl"),
            quote_budget: Decimal::from(10),
            min_quote_order: Decimal::ONE,
            min_base_quantity: Decimal::new(5, 4),
            spread_bps: Decimal::from(20),
            min_edge_bps: Decimal::from(5),
            inventory_target: Decimal::new(5, 1),
            inventory_tolerance: Decimal::new(10, 2),
            max_inventory_ratio: Decimal::new(8, 1),
            escape_bps: Decimal::from(25),
            escape_hysteresis_bps: Decimal::from(5),
            min_escape_interval_ms: 1_500,
            taker_escape_cooldown_ms: 5_000,
            max_taker_escapes_per_min: 6,
            maker_fee: Decimal::ZERO,
            taker_fee: Decimal::new(5, 4),
            quantity_increment: Decimal::new(1, 4),
            quote_increment: Decimal::new(1, 2),
            price_precision: 4,
            quantity_precision: 4,
            quote_precision: 2,
            max_drawdown_pct: Decimal::new(2, 1),
            max_drawdown_usd: Decimal::from(10),
            risk_cooldown_ms: 60_000,
            refresh_interval_ms: 1_000,
            account_staleness_ms: 2_000,
            depth_staleness_ms: 1_500,
            order_status_poll_ms: 200,
            order_status_timeout_ms: 2_000,
            fill_poll_interval_ms: 2_000,
            rate_limit_backoff_ms_initial: 750,
            rate_limit_backoff_ms_max: 10_000,
        }
    }
}

impl StrategyConfig {
    /// Base asset derived from the symbol (`SPYXUSDT` -> `SPYX`).
    pub fn base_asset(&self) -> String {
        match self.symbol.find(QUOTE_ASSET) {
            Some(pos) => self.symbol[..pos].to_string(),
            None => self.symbol.clone(),
        }
    }

    /// Tighten the sizing grid where the exchange is stricter than the
    /// configured values.
    pub fn apply_exchange_filters(&mut self, filters: &ExchangeFilters) {
        if filters.step_size > Decimal::ZERO && filters.step_size != self.quantity_increment {
            info!(
                configured = %self.quantity_increment,
                exchange = %filters.step_size,
                "Adjusting quantity increment to exchange step size"
            );
            self.quantity_increment = filters.step_size;
        }
        if filters.step_size > Decimal::ZERO {
            self.quantity_precision = self
                .quantity_precision
                .max(precision_from_step(filters.step_size) as u32);
        }
        if filters.tick_size > Decimal::ZERO {
            self.price_precision = self
                .price_precision
                .max(precision_from_step(filters.tick_size) as u32);
        }
    }
}

/// The quote leg is always USDT on this venue.
pub const QUOTE_ASSET: &str = "USDT";
