//! `OrderManager`: pairs a Buy stack and a Sell stack into one grid,
//! enforcing the cross-stack rules (pairing priority, balancing,
//! capacity) that a single `OrderStack` cannot see on its own.
//!
//! Grounded on `dex/order_manager.rs`'s HashMap-of-orders-plus-anyhow
//! style (much simplified here, since this manager owns two typed stacks
//! rather than one generic map) and on
//! `original_source/grid_trade/orders.py`'s `OrderManager.balance_stacks`
//! for the exact expand/shrink delta formula.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::OrderManagerError;
use crate::model::{Direction, Order, OrderId, OrderSide, OrderStack, OrderStatus};
use crate::precision::Precision;

/// Local `OrderId`s are allocated per-stack; offsetting the Sell stack's
/// range keeps ids unique across both stacks so the shared lookup map
/// below can use a bare `OrderId` as its key.
const SELL_ID_RANGE_START: OrderId = 1_000_000_000;

pub struct OrderManager {
    pair: String,
    price_interval: Decimal,
    unit_amount: Decimal,
    order_limit: u32,
    balance_threshold: u32,
    precision: Precision,
    buy: OrderStack,
    sell: OrderStack,
    /// `order_id -> side`, rebuilt after every mutating call below so
    /// `get_order_by_id` doesn't need to scan both stacks (SPEC_FULL.md §9).
    lookup: HashMap<OrderId, OrderSide>,
}

impl OrderManager {
    pub fn new(
        pair: impl Into<String>,
        price_interval: Decimal,
        unit_amount: Decimal,
        order_limit: u32,
        balance_threshold: u32,
        precision: Precision,
    ) -> Self {
        let pair = pair.into();
        let mut buy = OrderStack::new(OrderSide::Buy, pair.clone(), price_interval);
        let mut sell = OrderStack::new(OrderSide::Sell, pair.clone(), price_interval);
        sell.set_id_range_start(SELL_ID_RANGE_START);
        Self {
            pair,
            price_interval,
            unit_amount,
            order_limit,
            balance_threshold,
            precision,
            buy,
            sell,
            lookup: HashMap::new(),
        }
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    pub fn buy_stack(&self) -> &OrderStack {
        &self.buy
    }

    pub fn sell_stack(&self) -> &OrderStack {
        &self.sell
    }

    fn rebuild_lookup(&mut self) {
        self.lookup.clear();
        for o in self.buy.orders() {
            self.lookup.insert(o.id, OrderSide::Buy);
        }
        for o in self.sell.orders() {
            self.lookup.insert(o.id, OrderSide::Sell);
        }
    }

    /// Lay out both stacks' initial orders around `init_price`.
    pub fn init_stacks(&mut self, init_price: Decimal) {
        let active_limit = self.order_limit / 2;
        self.buy
            .prepare_init(init_price, active_limit, self.unit_amount, &self.precision);
        self.sell
            .prepare_init(init_price, active_limit, self.unit_amount, &self.precision);
        self.rebuild_lookup();
    }

    /// Core of the fill-response algorithm (SPEC_FULL.md §4.3). Sell-side
    /// fills pairing into new Buy orders takes priority: only when no Buy
    /// order was added this way do Buy-side fills pair into new Sells
    /// (SPEC_FULL.md §9 "Pair-side priority" / §8 invariant 8).
    pub fn refill_orders_at_opposite_position(&mut self) -> usize {
        let sell_traded: Vec<Order> = self
            .sell
            .orders()
            .iter()
            .filter(|o| o.status == OrderStatus::OnTraded)
            .cloned()
            .collect();
        let added = self
            .buy
            .refill_stack_by_pairing(&sell_traded, self.unit_amount, &self.precision);

        let added = if added > 0 {
            added
        } else {
            let buy_traded: Vec<Order> = self
                .buy
                .orders()
                .iter()
                .filter(|o| o.status == OrderStatus::OnTraded)
                .cloned()
                .collect();
            self.sell
                .refill_stack_by_pairing(&buy_traded, self.unit_amount, &self.precision)
        };

        self.rebuild_lookup();
        added
    }

    /// If either side's expected size has dropped to `balance_threshold`
    /// or below, expand it outward and shrink the other side by the same
    /// amount. At most one side expands per call.
    pub fn balance_stacks(&mut self) {
        let exp_buy = self.buy.expected_size();
        let exp_sell = self.sell.expected_size();

        if exp_buy + exp_sell > self.order_limit as usize {
            log::warn!(
                "order_limit exceeded: buy {} + sell {} > {}",
                exp_buy,
                exp_sell,
                self.order_limit
            );
        }

        let threshold = self.balance_threshold as usize;
        if exp_buy <= threshold {
            let delta = Self::half_abs_diff(exp_sell, exp_buy);
            if delta > 0 {
                self.buy
                    .refill_orders(delta, Direction::Outer, self.unit_amount, &self.precision);
                self.sell.shrink_outer(delta);
            }
        } else if exp_sell <= threshold {
            let delta = Self::half_abs_diff(exp_buy, exp_sell);
            if delta > 0 {
                self.sell
                    .refill_orders(delta, Direction::Outer, self.unit_amount, &self.precision);
                self.buy.shrink_outer(delta);
            }
        }

        self.rebuild_lookup();
    }

    fn half_abs_diff(a: usize, b: usize) -> u32 {
        (a.abs_diff(b) / 2) as u32
    }

    fn stack_mut(&mut self, side: OrderSide) -> &mut OrderStack {
        match side {
            OrderSide::Buy => &mut self.buy,
            OrderSide::Sell => &mut self.sell,
        }
    }

    fn side_of(&self, id: OrderId) -> Result<OrderSide, OrderManagerError> {
        self.lookup
            .get(&id)
            .copied()
            .ok_or_else(|| OrderManagerError::UnknownOrderId(id.to_string()))
    }

    pub fn get_order_by_id(&self, id: OrderId) -> Option<&Order> {
        let side = self.lookup.get(&id)?;
        match side {
            OrderSide::Buy => self.buy.find(id),
            OrderSide::Sell => self.sell.find(id),
        }
    }

    pub fn get_order_and_stack_by_order_id(&self, id: OrderId) -> Option<(OrderSide, &Order)> {
        let side = *self.lookup.get(&id)?;
        let order = match side {
            OrderSide::Buy => self.buy.find(id),
            OrderSide::Sell => self.sell.find(id),
        }?;
        Some((side, order))
    }

    pub fn order_create_ok(
        &mut self,
        id: OrderId,
        exchange_order_id: String,
        ordered_at: DateTime<Utc>,
    ) -> Result<(), OrderManagerError> {
        let side = self.side_of(id)?;
        self.stack_mut(side).order_create_ok(id, exchange_order_id, ordered_at);
        Ok(())
    }

    pub fn order_create_fail(&mut self, id: OrderId) -> Result<(), OrderManagerError> {
        let side = self.side_of(id)?;
        self.stack_mut(side).order_create_fail(id);
        self.rebuild_lookup();
        Ok(())
    }

    pub fn order_cancel_ok(&mut self, id: OrderId) -> Result<(), OrderManagerError> {
        let side = self.side_of(id)?;
        self.stack_mut(side).order_cancel_ok(id);
        self.rebuild_lookup();
        Ok(())
    }

    pub fn mark_order_on_traded(
        &mut self,
        id: OrderId,
        executed_at: DateTime<Utc>,
        average_price: Option<Decimal>,
    ) -> Result<(), OrderManagerError> {
        let side = self.side_of(id)?;
        self.stack_mut(side).mark_order_on_traded(id, executed_at, average_price);
        Ok(())
    }

    /// Two-phase fill commit: every order currently `OnTraded` on either
    /// stack transitions to `Traded` and is removed. Returns the orders
    /// committed, by side, for counter bookkeeping.
    pub fn orders_traded(&mut self) -> (Vec<Order>, Vec<Order>) {
        let buy_traded = self.buy.orders_traded();
        let sell_traded = self.sell.orders_traded();
        self.rebuild_lookup();
        (buy_traded, sell_traded)
    }

    pub fn order_force_cancelled(&mut self, id: OrderId) -> Result<(), OrderManagerError> {
        let side = self.side_of(id)?;
        self.stack_mut(side).order_force_cancelled(id);
        self.rebuild_lookup();
        Ok(())
    }

    pub fn cancel_all(&mut self) {
        self.buy.cancel_all();
        self.sell.cancel_all();
        self.lookup.clear();
    }

    pub fn orders_to_create(&self) -> Vec<&Order> {
        self.buy
            .orders()
            .iter()
            .chain(self.sell.orders())
            .filter(|o| o.status == OrderStatus::ToCreate)
            .collect()
    }

    pub fn orders_to_cancel(&self) -> Vec<&Order> {
        self.buy
            .orders()
            .iter()
            .chain(self.sell.orders())
            .filter(|o| o.status == OrderStatus::ToCancel)
            .collect()
    }

    pub fn active_orders(&self) -> Vec<&Order> {
        self.buy
            .orders()
            .iter()
            .chain(self.sell.orders())
            .filter(|o| o.status.is_active())
            .collect()
    }

    pub fn active_order_ids(&self) -> Vec<OrderId> {
        self.active_orders().iter().map(|o| o.id).collect()
    }

    /// Advisory-only irregular-price check (SPEC_FULL.md §4.4, disabled by
    /// default via `Config.enable_irregular_price_check`). For each just-
    /// filled order, the pair it is about to generate should still be
    /// makeable against the current spread; if not, the caller gets a
    /// human-readable warning to forward to the notifier rather than the
    /// engine silently creating an order that would take instead of make.
    pub fn check_irregular_price(
        &self,
        filled_orders: &[Order],
        best_bid: Decimal,
        best_ask: Decimal,
    ) -> Vec<String> {
        let mut warnings = Vec::new();
        for order in filled_orders {
            let opposite = order.opposite_price(self.price_interval);
            let problem = match order.side {
                // A filled buy pairs into a sell at `opposite`; as a maker
                // sell it must rest above the best ask.
                OrderSide::Buy if opposite <= best_ask => Some("sell"),
                // A filled sell pairs into a buy at `opposite`; as a maker
                // buy it must rest below the best bid.
                OrderSide::Sell if opposite >= best_bid => Some("buy"),
                _ => None,
            };
            if let Some(pair_side) = problem {
                warnings.push(format!(
                    "order {} filled at {}: opposite {} order at {} would not rest as a maker order (best_bid={best_bid}, best_ask={best_ask})",
                    order.id, order.price, pair_side, opposite
                ));
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn manager() -> OrderManager {
        OrderManager::new("btc_jpy", dec!(10), dec!(2), 4, 1, Precision::new(4, 6))
    }

    fn fill(manager: &mut OrderManager, side: OrderSide, price: Decimal) {
        let stack = match side {
            OrderSide::Buy => &manager.buy,
            OrderSide::Sell => &manager.sell,
        };
        let id = stack
            .orders()
            .iter()
            .find(|o| o.price == price)
            .map(|o| o.id)
            .expect("order at price must exist");
        manager.order_create_ok(id, format!("ex-{id}"), Utc::now()).unwrap();
        manager
            .mark_order_on_traded(id, Utc::now(), Some(price))
            .unwrap();
    }

    /// SPEC_FULL.md §8 scenario S2.
    #[test]
    fn init_stacks_lays_out_s2_grid() {
        let mut m = manager();
        m.init_stacks(dec!(100));
        let buy_prices: Vec<Decimal> = m.buy_stack().orders().iter().map(|o| o.price).collect();
        let sell_prices: Vec<Decimal> = m.sell_stack().orders().iter().map(|o| o.price).collect();
        assert_eq!(buy_prices, vec![dec!(90), dec!(80)]);
        assert_eq!(sell_prices, vec![dec!(110), dec!(120)]);
    }

    /// SPEC_FULL.md §8 scenario S3 (sell side pairs into a new buy).
    #[test]
    fn sell_fill_pairs_into_new_buy() {
        let mut m = manager();
        m.init_stacks(dec!(100));
        fill(&mut m, OrderSide::Sell, dec!(110));

        let added = m.refill_orders_at_opposite_position();
        assert_eq!(added, 1);

        let mut buy_prices: Vec<Decimal> = m.buy_stack().orders().iter().map(|o| o.price).collect();
        buy_prices.sort_by(|a, b| b.cmp(a));
        assert_eq!(buy_prices, vec![dec!(100), dec!(90), dec!(80)]);
    }

    #[test]
    fn balance_stacks_expands_starved_side_and_shrinks_the_other() {
        let mut m = OrderManager::new("btc_jpy", dec!(10), dec!(2), 4, 2, Precision::new(4, 6));
        m.init_stacks(dec!(100));
        // shrink_outer only touches `Created` orders, so bring the sell
        // side up from `ToCreate` first.
        for o in m.sell.orders().iter().map(|o| o.id).collect::<Vec<_>>() {
            m.order_create_ok(o, format!("ex-{o}"), Utc::now()).unwrap();
        }
        // Drain the buy side down to zero expected orders so it triggers
        // expansion against the still-full sell side.
        for o in m.buy.orders().iter().map(|o| o.id).collect::<Vec<_>>() {
            m.order_force_cancelled(o).unwrap();
        }

        m.balance_stacks();

        assert_eq!(m.buy_stack().expected_size(), 1);
        let sell_to_cancel = m
            .sell_stack()
            .orders()
            .iter()
            .filter(|o| o.status == OrderStatus::ToCancel)
            .count();
        assert_eq!(sell_to_cancel, 1);
    }

    #[test]
    fn unknown_order_id_is_reported() {
        let m = manager();
        assert!(m.get_order_by_id(9999).is_none());
    }

    #[test]
    fn check_irregular_price_flags_crossed_spread() {
        let m = manager();
        let mut filled =
            Order::new_to_create(1, "btc_jpy", OrderSide::Sell, dec!(110), dec!(2), &Precision::new(4, 6));
        filled.mark_created("ex".into(), Utc::now());
        filled.mark_on_traded(Utc::now(), Some(dec!(110)));

        // opposite buy would sit at 100, but best_bid is already 105: not makeable.
        let warnings = m.check_irregular_price(&[filled], dec!(105), dec!(111));
        assert_eq!(warnings.len(), 1);
    }
}
