//! Injected precision configuration.
//!
//! The source this engine is modelled on sets price/amount rounding
//! precision once, process-wide, in a global. There is no such global
//! here: every constructor that needs rounding takes a `Precision` value
//! explicitly (see spec design note in SPEC_FULL.md §9).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decimal digit counts used to round prices and amounts before they are
/// sent to the exchange or compared for grid alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precision {
    pub price_precision: u32,
    pub amount_precision: u32,
}

impl Default for Precision {
    fn default() -> Self {
        Self {
            price_precision: 4,
            amount_precision: 6,
        }
    }
}

impl Precision {
    pub fn new(price_precision: u32, amount_precision: u32) -> Self {
        Self {
            price_precision,
            amount_precision,
        }
    }

    pub fn round_price(&self, value: Decimal) -> Decimal {
        value.round_dp(self.price_precision)
    }

    pub fn round_amount(&self, value: Decimal) -> Decimal {
        value.round_dp(self.amount_precision)
    }

    /// `round(amount × price, price_precision)`, per the Order's derived
    /// `cost` field.
    pub fn cost(&self, amount: Decimal, price: Decimal) -> Decimal {
        (amount * price).round_dp(self.price_precision)
    }
}
