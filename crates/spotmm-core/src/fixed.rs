//! Fixed-point conversion and grid rounding.
//!
//! The trade ledger accounts in scaled `i64` units (`base_scale = 10^quantity_precision`,
//! `quote_scale = 10^quote_precision`); everything else works in `Decimal`.
//! Conversions between the two round to nearest. Sizing and pricing snap to
//! the exchange grid with the floor-based helpers below.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// `10^precision` as an `i64` scale factor. Negative precision yields 1.
pub fn pow10(precision: i32) -> i64 {
    if precision <= 0 {
        return 1;
    }
    let mut value: i64 = 1;
    for _ in 0..precision {
        value *= 10;
    }
    value
}

/// Convert a decimal quantity to scaled integer units, rounding to nearest.
pub fn to_units(value: Decimal, scale: i64) -> i64 {
    let scaled = value * Decimal::from(scale);
    scaled
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

/// Convert scaled integer units back to a decimal quantity.
pub fn from_units(units: i64, scale: i64) -> Decimal {
    if scale <= 0 {
        return Decimal::ZERO;
    }
    Decimal::from(units) / Decimal::from(scale)
}

/// Floor a value to a multiple of `increment`. Non-positive increments and
/// values pass through unchanged (clamped at zero).
pub fn floor_to_increment(value: Decimal, increment: Decimal) -> Decimal {
    if increment <= Decimal::ZERO || value <= Decimal::ZERO {
        return value.max(Decimal::ZERO);
    }
    (value / increment).floor() * increment
}

/// Round a value down (toward zero) to `precision` decimal places.
pub fn round_down_dp(value: Decimal, precision: u32) -> Decimal {
    value.round_dp_with_strategy(precision, RoundingStrategy::ToZero)
}

/// Whether `value` sits on the grid defined by `increment`, within a small
/// relative tolerance for values that arrived through decimal parsing.
pub fn within_increment(value: Decimal, increment: Decimal) -> bool {
    if increment <= Decimal::ZERO {
        return true;
    }
    let steps = value / increment;
    let nearest = steps.round();
    (steps - nearest).abs() < Decimal::new(1, 6)
}

/// Derive a decimal-place precision from a step value such as `0.0001`.
///
/// Walks the step left one digit at a time until it is integral, clamped to
/// 0..=8 which covers every spot grid seen in practice.
pub fn precision_from_step(step: Decimal) -> i32 {
    if step <= Decimal::ZERO {
        return 0;
    }
    let mut value = step;
    let mut precision = 0;
    while precision < 12 && value.fract() != Decimal::ZERO {
        value *= Decimal::from(10);
        precision += 1;
    }
    precision.clamp(0, 8)
}
