//! Exchange-imposed symbol filters.
//!
//! Loaded once at startup from exchange metadata. Every outgoing order must
//! pass these before it is sent; a violation is logged and the quote side is
//! skipped for the tick, never submitted.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::fixed::within_increment;

/// Price/quantity/notional constraints for a symbol.
///
/// Zero means "not enforced by the exchange" for that rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangeFilters {
    pub min_price: Decimal,
    pub tick_size: Decimal,
    pub min_qty: Decimal,
    pub step_size: Decimal,
    pub min_notional: Decimal,
}

/// A sizing or pricing value that fails the exchange filters.
#[derive(Debug, Error, PartialEq)]
pub enum FilterViolation {
    #[error("price {price} below exchange minimum {min_price}")]
    PriceBelowMinimum { price: Decimal, min_price: Decimal },

    #[error("price {price} not aligned to tick size {tick_size}")]
    PriceOffTick { price: Decimal, tick_size: Decimal },

    #[error("quantity {quantity} below exchange minimum {min_qty}")]
    QuantityBelowMinimum { quantity: Decimal, min_qty: Decimal },

    #[error("quantity {quantity} not aligned to step size {step_size}")]
    QuantityOffStep { quantity: Decimal, step_size: Decimal },

    #[error("notional {notional} below exchange minimum {min_notional}")]
    NotionalBelowMinimum { notional: Decimal, min_notional: Decimal },
}

impl ExchangeFilters {
    /// Check an order against the filters. Zero-valued inputs skip the
    /// corresponding rule, so market orders pass a zero price through.
    pub fn check(
        &self,
        price: Decimal,
        quantity: Decimal,
        notional: Decimal,
    ) -> Result<(), FilterViolation> {
        if price > Decimal::ZERO && self.tick_size > Decimal::ZERO {
            if self.min_price > Decimal::ZERO && price < self.min_price {
                return Err(FilterViolation::PriceBelowMinimum {
                    price,
                    min_price: self.min_price,
                });
            }
            if !within_increment(price, self.tick_size) {
                return Err(FilterViolation::PriceOffTick {
                    price,
                    tick_size: self.tick_size,
                });
            }
        }

        if quantity > Decimal::ZERO && self.step_size > Decimal::ZERO {
            if self.min_qty > Decimal::ZERO && quantity < self.min_qty {
                return Err(FilterViolation::QuantityBelowMinimum {
                    quantity,
                    min_qty: self.min_qty,
                });
            }
            if !within_increment(quantity, self.step_size) {
                return Err(FilterViolation::QuantityOffStep {
                    quantity,
                    step_size: self.step_size,
                });
            }
        }

        if notional > Decimal::ZERO
            && self.min_notional > Decimal::ZERO
            && notional < self.min_notional
        {
            return Err(FilterViolation::NotionalBelowMinimum {
                notional,
                min_notional: self.min_notional,
            });
        }

        Ok(())
    }
}
