//! Quote price computation: spread gating, inventory skew, side gating.
//!
//! Pure functions over a book snapshot and the mirrored balances; the engine
//! handles sizing, filters, and placement.

use rust_decimal::Decimal;

use spotmm_core::round_down_dp;

use crate::config::StrategyConfig;

const BPS: Decimal = Decimal::from_parts(1, 0, 0, false, 4); // 0.0001
const HALF_SPREAD_FLOOR: Decimal = Decimal::from_parts(5, 0, 0, false, 4); // 0.0005
const HALF_SPREAD_CAP: Decimal = Decimal::from_parts(2, 0, 0, false, 2); // 0.02
const FEE_PAD: Decimal = Decimal::from_parts(2, 0, 0, false, 4); // 0.0002
const QUARTER: Decimal = Decimal::from_parts(25, 0, 0, false, 2); // 0.25
const HALF: Decimal = Decimal::from_parts(5, 0, 0, false, 1); // 0.5

/// Market and balance inputs for one quoting decision, with our own resting
/// quotes already excluded from the book figures.
#[derive(Debug, Clone)]
pub struct QuoteInputs {
    pub microprice: Decimal,
    pub spread: Decimal,
    pub bid_volume: Decimal,
    pub ask_volume: Decimal,
    /// Base holdings, free plus locked.
    pub total_base: Decimal,
    /// Quote holdings, free plus locked.
    pub total_quote: Decimal,
}

/// Why no quotes should be placed this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteSkip {
    InvalidMicroprice,
    SpreadTooTight { spread_bps: Decimal },
    NoInventory,
    CrossedAfterRounding,
}

/// Computed quote prices and the inventory band they were derived from.
#[derive(Debug, Clone)]
pub struct QuotePlan {
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub target_qty: Decimal,
    pub lower_qty: Decimal,
    pub upper_qty: Decimal,
    pub inventory_ratio: Decimal,
    pub skew: Decimal,
    pub allow_buy: bool,
    pub allow_sell: bool,
}

/// Derive both quote prices from the microprice.
///
/// The half-spread is the larger of the configured target and half the
/// observed book spread, clamped to [5, 200] bps. The skew blends book
/// imbalance against inventory deviation and shifts the quote centre by up
/// to a quarter of the half-spread.
pub fn plan_quotes(inputs: &QuoteInputs, config: &StrategyConfig) -> Result<QuotePlan, QuoteSkip> {
    if inputs.microprice <= Decimal::ZERO {
        return Err(QuoteSkip::InvalidMicroprice);
    }

    let spread_fraction = if inputs.spread > Decimal::ZERO {
        inputs.spread / inputs.microprice
    } else {
        Decimal::ZERO
    };
    let min_edge_fraction =
        (config.min_edge_bps * BPS).max(Decimal::TWO * config.maker_fee + FEE_PAD);
    if spread_fraction < min_edge_fraction {
        return Err(QuoteSkip::SpreadTooTight {
            spread_bps: spread_fraction / BPS,
        });
    }

    let total_value = inputs.total_quote + inputs.total_base * inputs.microprice;
    if total_value <= Decimal::ZERO {
        return Err(QuoteSkip::NoInventory);
    }

    let target_qty = total_value * config.inventory_target / inputs.microprice;
    let upper_qty = target_qty * (Decimal::ONE + config.inventory_tolerance);
    let lower_qty = target_qty * (Decimal::ONE - config.inventory_tolerance);

    let half_spread = (config.spread_bps * BPS)
        .max(spread_fraction * HALF)
        .clamp(HALF_SPREAD_FLOOR, HALF_SPREAD_CAP);

    let volume_total = inputs.bid_volume + inputs.ask_volume;
    let imbalance = if volume_total > Decimal::ZERO {
        (inputs.bid_volume - inputs.ask_volume) / volume_total
    } else {
        Decimal::ZERO
    };

    let inventory_ratio = inputs.total_base * inputs.microprice / total_value;
    let tolerance = config.inventory_tolerance.max(Decimal::new(1, 9));
    let deviation = (inventory_ratio - config.inventory_target) / tolerance;
    let skew = (HALF * imbalance - deviation).clamp(-Decimal::ONE, Decimal::ONE);

    let shift = QUARTER * skew * half_spread;
    let buy_price = round_down_dp(
        inputs.microprice * (Decimal::ONE - half_spread * HALF - shift),
        config.price_precision,
    );
    let sell_price = round_down_dp(
        inputs.microprice * (Decimal::ONE + half_spread * HALF + shift),
        config.price_precision,
    );

    if buy_price <= Decimal::ZERO || sell_price <= Decimal::ZERO || buy_price >= sell_price {
        return Err(QuoteSkip::CrossedAfterRounding);
    }

    let hysteresis = config.inventory_tolerance * HALF;
    let allow_sell = inventory_ratio > (Decimal::ONE - config.max_inventory_ratio) + hysteresis;
    let allow_buy = inventory_ratio < config.max_inventory_ratio - hysteresis;

    Ok(QuotePlan {
        buy_price,
        sell_price,
        target_qty,
        lower_qty,
        upper_qty,
        inventory_ratio,
        skew,
        allow_buy,
        allow_sell,
    })
}
