//! `ExecutionReport`: a pure, side-effect-free summary of a run's fill
//! counters and realised yield so far.
//!
//! Grounded on `trading/trade.rs`'s derived-field-plus-`summary()` style
//! (compute everything eagerly in a constructor, render via `Display`) and
//! on `original_source/grid_trade/base.py`'s report fields.

use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;

use crate::model::OrderSide;
use crate::parameter::Parameter;

/// Per-side count of completed fills over the life of a `GridBot` run.
#[derive(Debug, Clone, Default)]
pub struct OrderCounter {
    counts: HashMap<OrderSide, u64>,
}

impl OrderCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, side: OrderSide) {
        *self.counts.entry(side).or_insert(0) += 1;
    }

    pub fn count(&self, side: OrderSide) -> u64 {
        self.counts.get(&side).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.count(OrderSide::Buy) + self.count(OrderSide::Sell)
    }
}

/// A derived snapshot; computing one has no side effects and does not
/// mutate the counter or parameter it was built from.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub buy_count: u64,
    pub sell_count: u64,
    pub matched: u64,
    pub extra_count: u64,
    pub extra_side: String,
    pub traded_value: Decimal,
    pub lowest_actual_earning: Decimal,
    pub highest_actual_earning: Decimal,
    pub init_value: Decimal,
    pub lowest_earn_rate: Decimal,
    pub highest_earn_rate: Decimal,
    pub lowest_yearly_rate: Decimal,
    pub highest_yearly_rate: Decimal,
    pub avg_hold_price: Decimal,
    pub extra_hold_amount: Decimal,
    pub extra_hold_cost: Decimal,
    pub duration_hours: Decimal,
}

impl ExecutionReport {
    pub fn new(parameter: &Parameter, counter: &OrderCounter, duration_hours: Decimal) -> Self {
        let buy_count = counter.count(OrderSide::Buy);
        let sell_count = counter.count(OrderSide::Sell);
        let matched = buy_count.min(sell_count);
        let extra_count = buy_count.abs_diff(sell_count);

        let traded_value = parameter.unit_amount * parameter.init_price * Decimal::from(matched);
        let lowest_actual_earning = parameter.lowest_earn_rate_per_grid() * traded_value;
        let highest_actual_earning = parameter.highest_earn_rate_per_grid() * traded_value;
        let init_value = parameter.init_quote + parameter.init_base * parameter.init_price;

        let (lowest_earn_rate, highest_earn_rate) = if init_value > Decimal::ZERO {
            (
                lowest_actual_earning / init_value,
                highest_actual_earning / init_value,
            )
        } else {
            (Decimal::ZERO, Decimal::ZERO)
        };

        let yearly_factor = if duration_hours > Decimal::ZERO {
            Decimal::from(24 * 365) / duration_hours
        } else {
            Decimal::ZERO
        };
        let lowest_yearly_rate = lowest_earn_rate * yearly_factor;
        let highest_yearly_rate = highest_earn_rate * yearly_factor;

        let extra_side = match sell_count.cmp(&buy_count) {
            std::cmp::Ordering::Greater => "sell",
            std::cmp::Ordering::Less => "buy",
            std::cmp::Ordering::Equal => "equal",
        };
        let sign = if sell_count > buy_count {
            Decimal::ONE
        } else {
            Decimal::NEGATIVE_ONE
        };
        let avg_hold_price = parameter.init_price
            + sign * Decimal::from(extra_count) * parameter.price_interval / Decimal::from(2);
        let extra_hold_amount = parameter.unit_amount * Decimal::from(extra_count);
        let extra_hold_cost = avg_hold_price * extra_hold_amount;

        Self {
            buy_count,
            sell_count,
            matched,
            extra_count,
            extra_side: extra_side.to_string(),
            traded_value,
            lowest_actual_earning,
            highest_actual_earning,
            init_value,
            lowest_earn_rate,
            highest_earn_rate,
            lowest_yearly_rate,
            highest_yearly_rate,
            avg_hold_price,
            extra_hold_amount,
            extra_hold_cost,
            duration_hours,
        }
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Execution report ({} h elapsed)", self.duration_hours)?;
        writeln!(
            f,
            "  fills: buy={} sell={} matched={} extra={} ({})",
            self.buy_count, self.sell_count, self.matched, self.extra_count, self.extra_side
        )?;
        writeln!(f, "  traded_value: {}", self.traded_value)?;
        writeln!(
            f,
            "  earn_rate_per_grid: {} - {} ({} - {} yearly)",
            self.lowest_earn_rate,
            self.highest_earn_rate,
            self.lowest_yearly_rate,
            self.highest_yearly_rate
        )?;
        writeln!(
            f,
            "  extra hold: {} @ avg {} (cost {})",
            self.extra_hold_amount, self.avg_hold_price, self.extra_hold_cost
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn parameter() -> Parameter {
        Parameter::by_interval(
            "btc_jpy",
            dec!(10),
            dec!(700),
            dec!(100),
            dec!(10),
            10,
            dec!(-0.0002),
            &crate::precision::Precision::new(4, 6),
        )
        .unwrap()
    }

    #[test]
    fn matched_count_is_the_lesser_side() {
        let mut counter = OrderCounter::new();
        counter.record(OrderSide::Buy);
        counter.record(OrderSide::Buy);
        counter.record(OrderSide::Sell);

        let report = ExecutionReport::new(&parameter(), &counter, dec!(1));
        assert_eq!(report.matched, 1);
        assert_eq!(report.extra_count, 1);
        assert_eq!(report.extra_side, "buy");
    }

    #[test]
    fn balanced_fills_have_no_extra_hold() {
        let mut counter = OrderCounter::new();
        counter.record(OrderSide::Buy);
        counter.record(OrderSide::Sell);

        let report = ExecutionReport::new(&parameter(), &counter, dec!(2));
        assert_eq!(report.extra_count, 0);
        assert_eq!(report.extra_side, "equal");
        assert_eq!(report.extra_hold_amount, dec!(0));
        assert_eq!(report.avg_hold_price, parameter().init_price);
    }

    #[test]
    fn traded_value_scales_with_matched_fills() {
        let mut counter = OrderCounter::new();
        for _ in 0..3 {
            counter.record(OrderSide::Buy);
            counter.record(OrderSide::Sell);
        }
        let report = ExecutionReport::new(&parameter(), &counter, dec!(3));
        // unit_amount(2) * init_price(100) * matched(3)
        assert_eq!(report.traded_value, dec!(600));
    }
}
