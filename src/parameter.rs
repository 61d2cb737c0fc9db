//! Grid sizing: turns an allocation of base/quote currency plus a target
//! step into a feasible grid plan with derived range and earn-rate bounds.
//!
//! Formulas grounded on `original_source/grid_trade/base.py`'s
//! `calc_grid_params_by_interval` / `calc_grid_params_by_support`; the
//! `validate()` surface is grounded on the teacher's
//! `GridRebalancerConfig::validate()` (`strategies/grid_rebalancer.rs`),
//! since Rust has no implicit float-to-exception path for infeasible
//! inputs the way the dynamically-typed original does.

use rust_decimal::Decimal;

use crate::error::ParameterError;
use crate::precision::Precision;

/// A fully-sized grid plan. Describes the *grid*, not the running
/// process — see `Config` for the latter (SPEC_FULL.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub pair: String,
    pub unit_amount: Decimal,
    pub price_interval: Decimal,
    pub init_base: Decimal,
    pub init_quote: Decimal,
    pub init_price: Decimal,
    pub grid_num: u32,
    pub fee: Decimal,
    pub unused_base: Decimal,
    pub unused_quote: Decimal,
}

impl Parameter {
    pub fn half_grid_num(&self) -> u32 {
        self.grid_num / 2
    }

    pub fn lowest_price(&self) -> Decimal {
        self.init_price - Decimal::from(self.half_grid_num()) * self.price_interval
    }

    pub fn highest_price(&self) -> Decimal {
        self.init_price + Decimal::from(self.half_grid_num()) * self.price_interval
    }

    pub fn highest_earn_rate_per_grid(&self) -> Decimal {
        self.price_interval / self.lowest_price() - Decimal::from(2) * self.fee
    }

    pub fn lowest_earn_rate_per_grid(&self) -> Decimal {
        let half = self.half_grid_num();
        let denom = self.init_price + Decimal::from(half.saturating_sub(1)) * self.price_interval;
        self.price_interval / denom - Decimal::from(2) * self.fee
    }

    /// Build a `Parameter` from a support price (the lowest buy line)
    /// instead of an explicit step.
    #[allow(clippy::too_many_arguments)]
    pub fn by_support_line(
        pair: impl Into<String>,
        init_base: Decimal,
        init_quote: Decimal,
        init_price: Decimal,
        support: Decimal,
        grid_num: u32,
        fee: Decimal,
        precision: &Precision,
    ) -> Result<Self, ParameterError> {
        if support >= init_price {
            return Err(ParameterError::SupportNotBelowInitPrice {
                support: support.to_string(),
                init_price: init_price.to_string(),
            });
        }
        let half = Self::validated_half(grid_num)?;
        let price_interval = (init_price - support) / Decimal::from(half);
        Self::by_interval(
            pair,
            init_base,
            init_quote,
            init_price,
            price_interval,
            grid_num,
            fee,
            precision,
        )
    }

    /// Build a `Parameter` from an explicit grid step.
    #[allow(clippy::too_many_arguments)]
    pub fn by_interval(
        pair: impl Into<String>,
        init_base: Decimal,
        init_quote: Decimal,
        init_price: Decimal,
        price_interval: Decimal,
        grid_num: u32,
        fee: Decimal,
        precision: &Precision,
    ) -> Result<Self, ParameterError> {
        let half = Self::validated_half(grid_num)?;
        if price_interval <= Decimal::ZERO {
            return Err(ParameterError::NonPositiveInterval(price_interval.to_string()));
        }
        if init_base < Decimal::ZERO || init_quote < Decimal::ZERO {
            return Err(ParameterError::NegativeAllocation);
        }

        let half_dec = Decimal::from(half);
        let ideal_unit_amount = init_base / half_dec;
        let total_buy_price =
            half_dec * (init_price - (Decimal::ONE + half_dec) * price_interval / Decimal::from(2));
        let quote_needed = total_buy_price * ideal_unit_amount;

        let (unit_amount, unused_base, unused_quote) = if quote_needed > init_quote {
            let unit_amount = init_quote / total_buy_price;
            let unused_base = init_base - unit_amount * half_dec;
            (unit_amount, unused_base, Decimal::ZERO)
        } else {
            let unused_quote = init_quote - quote_needed;
            (ideal_unit_amount, Decimal::ZERO, unused_quote)
        };

        Ok(Self {
            pair: pair.into(),
            unit_amount: precision.round_amount(unit_amount),
            price_interval: precision.round_price(price_interval),
            init_base: precision.round_amount(init_base),
            init_quote: precision.round_amount(init_quote),
            init_price: precision.round_price(init_price),
            grid_num,
            fee,
            unused_base: precision.round_amount(unused_base),
            unused_quote: precision.round_amount(unused_quote),
        })
    }

    fn validated_half(grid_num: u32) -> Result<u32, ParameterError> {
        if grid_num == 0 || grid_num % 2 != 0 {
            return Err(ParameterError::InvalidGridNum(grid_num));
        }
        Ok(grid_num / 2)
    }

    /// Re-check feasibility after construction (e.g. once loaded back from
    /// a config file rather than built via the constructors above).
    pub fn validate(&self) -> Result<(), ParameterError> {
        Self::validated_half(self.grid_num)?;
        if self.price_interval <= Decimal::ZERO {
            return Err(ParameterError::NonPositiveInterval(self.price_interval.to_string()));
        }
        if self.init_base < Decimal::ZERO || self.init_quote < Decimal::ZERO {
            return Err(ParameterError::NegativeAllocation);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn precision() -> Precision {
        Precision::new(4, 6)
    }

    /// SPEC_FULL.md §8 scenario S1.
    #[test]
    fn by_interval_enough_quote_matches_s1() {
        let p = Parameter::by_interval(
            "btc_jpy",
            dec!(10),
            dec!(700),
            dec!(100),
            dec!(10),
            10,
            dec!(-0.0002),
            &precision(),
        )
        .unwrap();

        assert_eq!(p.unit_amount, dec!(2));
        assert_eq!(p.unused_base, dec!(0));
        assert_eq!(p.unused_quote, dec!(0));
        assert_eq!(p.lowest_price(), dec!(50));
        assert_eq!(p.highest_price(), dec!(150));
        assert_eq!(p.highest_earn_rate_per_grid(), dec!(0.2004));

        let lowest = p.lowest_earn_rate_per_grid();
        assert!((lowest - dec!(0.0718286)).abs() < dec!(0.000001));
    }

    #[test]
    fn by_interval_short_on_quote_scales_unit_amount_down() {
        let p = Parameter::by_interval(
            "btc_jpy",
            dec!(10),
            dec!(350),
            dec!(100),
            dec!(10),
            10,
            dec!(-0.0002),
            &precision(),
        )
        .unwrap();

        assert_eq!(p.unit_amount, dec!(1));
        assert_eq!(p.unused_base, dec!(5));
        assert_eq!(p.unused_quote, dec!(0));
    }

    #[test]
    fn by_support_line_derives_matching_interval() {
        let p = Parameter::by_support_line(
            "btc_jpy",
            dec!(10),
            dec!(700),
            dec!(100),
            dec!(50),
            10,
            dec!(-0.0002),
            &precision(),
        )
        .unwrap();
        assert_eq!(p.price_interval, dec!(10));
    }

    #[test]
    fn support_not_below_init_price_is_rejected() {
        let err = Parameter::by_support_line(
            "btc_jpy",
            dec!(10),
            dec!(700),
            dec!(100),
            dec!(100),
            10,
            dec!(0),
            &precision(),
        )
        .unwrap_err();
        assert!(matches!(err, ParameterError::SupportNotBelowInitPrice { .. }));
    }

    #[test]
    fn odd_grid_num_is_rejected() {
        let err = Parameter::by_interval(
            "btc_jpy",
            dec!(10),
            dec!(700),
            dec!(100),
            dec!(10),
            9,
            dec!(0),
            &precision(),
        )
        .unwrap_err();
        assert!(matches!(err, ParameterError::InvalidGridNum(9)));
    }

    #[test]
    fn negative_allocation_is_rejected() {
        let err = Parameter::by_interval(
            "btc_jpy",
            dec!(-1),
            dec!(700),
            dec!(100),
            dec!(10),
            10,
            dec!(0),
            &precision(),
        )
        .unwrap_err();
        assert_eq!(err, ParameterError::NegativeAllocation);
    }
}
