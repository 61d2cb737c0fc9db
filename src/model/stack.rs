//! `OrderStack`: the per-side ordered collection of grid positions.
//!
//! Grounded on `original_source/grid_trade/orders.py`'s `OrderStack` for
//! the grid-snapping and refill formulas, and on the teacher's
//! `trading/grid_level.rs` for the lifecycle-method style (one thin
//! method per transition, warnings on invalid calls) — minus the
//! `Arc<RwLock<_>>` wrapping, since the core here is single-threaded
//! (SPEC_FULL.md §5).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::model::order::{Order, OrderId, OrderSide, OrderStatus};
use crate::precision::Precision;

/// Which way along the grid a refill extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Toward the center (init_price).
    Inner,
    /// Away from the center.
    Outer,
}

/// Which orders a best/worst/count query considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFilter {
    All,
    Active,
}

pub struct OrderStack {
    side: OrderSide,
    pair: String,
    price_interval: Decimal,
    init_price: Option<Decimal>,
    next_id: OrderId,
    orders: Vec<Order>,
}

impl OrderStack {
    pub fn new(side: OrderSide, pair: impl Into<String>, price_interval: Decimal) -> Self {
        Self {
            side,
            pair: pair.into(),
            price_interval,
            init_price: None,
            next_id: 1,
            orders: Vec::new(),
        }
    }

    pub fn side(&self) -> OrderSide {
        self.side
    }

    /// Rebase local id allocation so two stacks sharing one OrderManager
    /// never hand out the same `OrderId` (needed for the manager's shared
    /// id→side lookup map, SPEC_FULL.md §3/§9).
    pub(crate) fn set_id_range_start(&mut self, start: OrderId) {
        self.next_id = start;
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn expected_size(&self) -> usize {
        self.orders
            .iter()
            .filter(|o| o.status.is_expected())
            .count()
    }

    fn alloc_id(&mut self) -> OrderId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// +1 moves away from the center for this side, -1 moves toward it.
    fn outward_sign(&self) -> i64 {
        match self.side {
            OrderSide::Buy => -1,
            OrderSide::Sell => 1,
        }
    }

    fn direction_sign(&self, direction: Direction) -> i64 {
        match direction {
            Direction::Outer => self.outward_sign(),
            Direction::Inner => -self.outward_sign(),
        }
    }

    fn price_of_k(&self, k: i64) -> Decimal {
        self.init_price.expect("stack not initialised") + Decimal::from(k) * self.price_interval
    }

    fn k_of(&self, price: Decimal) -> i64 {
        let init = self.init_price.expect("stack not initialised");
        ((price - init) / self.price_interval)
            .round()
            .to_i64()
            .unwrap_or(0)
    }

    fn snap_k(&self, origin: Decimal, sign: i64) -> i64 {
        let init = self.init_price.expect("stack not initialised");
        let ratio = (origin - init) / self.price_interval;
        let snapped = if sign > 0 { ratio.ceil() } else { ratio.floor() };
        snapped.to_i64().unwrap_or(0)
    }

    /// Lazy grid sequence: snap `origin` to the nearest grid price in
    /// `direction`, then step by `price_interval` for `count` positions
    /// starting at offset `start`.
    pub fn get_price_grid(
        &self,
        origin: Decimal,
        direction: Direction,
        start: i64,
        count: u32,
    ) -> Vec<Decimal> {
        let sign = self.direction_sign(direction);
        let base_k = self.snap_k(origin, sign);
        (0..count as i64)
            .map(|i| self.price_of_k(base_k + sign * (start + i)))
            .collect()
    }

    fn resort(&mut self) {
        match self.side {
            OrderSide::Buy => self
                .orders
                .sort_by(|a, b| b.price.cmp(&a.price)),
            OrderSide::Sell => self
                .orders
                .sort_by(|a, b| a.price.cmp(&b.price)),
        }
    }

    pub fn best_order(&self, filter: OrderFilter) -> Option<&Order> {
        self.orders.iter().find(|o| Self::matches(o, filter))
    }

    pub fn worst_order(&self, filter: OrderFilter) -> Option<&Order> {
        self.orders.iter().rev().find(|o| Self::matches(o, filter))
    }

    fn matches(order: &Order, filter: OrderFilter) -> bool {
        match filter {
            OrderFilter::All => true,
            OrderFilter::Active => order.status.is_expected(),
        }
    }

    fn has_active_price(&self, price: Decimal) -> bool {
        self.orders
            .iter()
            .any(|o| o.status.is_expected() && o.price == price)
    }

    fn push_new(&mut self, price: Decimal, amount: Decimal, precision: &Precision) {
        if self.has_active_price(price) {
            log::warn!(
                "{} stack skipping duplicate grid price {} on refill",
                self.side,
                price
            );
            return;
        }
        let id = self.alloc_id();
        let order = Order::new_to_create(id, self.pair.clone(), self.side, price, amount, precision);
        self.orders.push(order);
        self.resort();
    }

    /// Populate the stack with `active_limit` orders on the grid, in the
    /// outer direction, never at `init_price` itself.
    pub fn prepare_init(
        &mut self,
        init_price: Decimal,
        active_limit: u32,
        unit_amount: Decimal,
        precision: &Precision,
    ) {
        self.init_price = Some(init_price);
        let prices = self.get_price_grid(init_price, Direction::Outer, 1, active_limit);
        for price in prices {
            self.push_new(price, unit_amount, precision);
        }
    }

    /// Grow the stack by `count` orders, extending from the current best
    /// (`Inner`) or worst (`Outer`) *active* order; falls back to the
    /// best/worst of all orders if none are active.
    pub fn refill_orders(
        &mut self,
        count: u32,
        direction: Direction,
        unit_amount: Decimal,
        precision: &Precision,
    ) {
        if count == 0 {
            return;
        }
        let base_price = match direction {
            Direction::Outer => self
                .worst_order(OrderFilter::Active)
                .or_else(|| self.worst_order(OrderFilter::All))
                .map(|o| o.price),
            Direction::Inner => self
                .best_order(OrderFilter::Active)
                .or_else(|| self.best_order(OrderFilter::All))
                .map(|o| o.price),
        };
        let origin = base_price.unwrap_or_else(|| self.init_price.unwrap_or(Decimal::ZERO));
        let prices = self.get_price_grid(origin, direction, 1, count);
        for price in prices {
            self.push_new(price, unit_amount, precision);
        }
    }

    /// For each traded order handed in (must be `OnTraded` or `Traded`),
    /// add one order at its opposite price on *this* (the opposite) side.
    /// Returns the count actually added.
    pub fn refill_stack_by_pairing(
        &mut self,
        traded_orders: &[Order],
        unit_amount: Decimal,
        precision: &Precision,
    ) -> usize {
        let mut added = 0;
        for traded in traded_orders {
            if !matches!(traded.status, OrderStatus::OnTraded | OrderStatus::Traded) {
                log::warn!(
                    "pairing ignored order {} not in OnTraded/Traded (status {})",
                    traded.id,
                    traded.status
                );
                continue;
            }
            let opposite_price = traded.opposite_price(self.price_interval);
            if self.has_active_price(opposite_price) {
                log::warn!(
                    "{} stack skipping duplicate grid price {} on pairing",
                    self.side,
                    opposite_price
                );
                continue;
            }
            self.push_new(opposite_price, unit_amount, precision);
            added += 1;
        }
        added
    }

    /// Mark the outermost `count` orders for cancellation.
    pub fn shrink_outer(&mut self, count: u32) {
        for _ in 0..count {
            let idx = self
                .orders
                .iter()
                .enumerate()
                .rev()
                .find(|(_, o)| o.status == OrderStatus::Created)
                .map(|(i, _)| i);
            match idx {
                Some(i) => self.orders[i].mark_to_cancel(),
                None => {
                    log::warn!("{} stack has no more active orders to shrink", self.side);
                    break;
                }
            }
        }
    }

    pub fn order_create_ok(
        &mut self,
        id: OrderId,
        exchange_order_id: String,
        ordered_at: chrono::DateTime<chrono::Utc>,
    ) {
        if let Some(o) = self.find_mut(id) {
            o.mark_created(exchange_order_id, ordered_at);
        }
    }

    pub fn order_create_fail(&mut self, id: OrderId) {
        if let Some(o) = self.find_mut(id) {
            o.force_cancel();
        }
        self.remove_terminal();
    }

    pub fn order_cancel_ok(&mut self, id: OrderId) {
        if let Some(o) = self.find_mut(id) {
            if let Err(e) = o.mark_cancel_ok() {
                log::warn!("{e}");
            }
        }
        self.remove_terminal();
    }

    pub fn mark_order_on_traded(
        &mut self,
        id: OrderId,
        executed_at: chrono::DateTime<chrono::Utc>,
        average_price: Option<Decimal>,
    ) {
        if let Some(o) = self.find_mut(id) {
            o.mark_on_traded(executed_at, average_price);
        }
    }

    /// Every order currently `OnTraded` transitions to `Traded` and is
    /// removed. Returns the orders that were committed, in their
    /// pre-removal (`OnTraded`) form, for counter bookkeeping.
    pub fn orders_traded(&mut self) -> Vec<Order> {
        let committed: Vec<Order> = self
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::OnTraded)
            .cloned()
            .collect();
        for o in self.orders.iter_mut() {
            if o.status == OrderStatus::OnTraded {
                o.mark_traded();
            }
        }
        self.remove_terminal();
        committed
    }

    pub fn order_force_cancelled(&mut self, id: OrderId) {
        if let Some(o) = self.find_mut(id) {
            o.force_cancel();
        }
        self.remove_terminal();
    }

    pub fn cancel_all(&mut self) {
        for o in self.orders.iter_mut() {
            o.force_cancel();
        }
        self.orders.clear();
    }

    fn remove_terminal(&mut self) {
        self.orders.retain(|o| !o.status.is_terminal());
    }

    pub fn find(&self, id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    fn find_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        self.orders.iter_mut().find(|o| o.id == id)
    }

    /// Every order whose `(price - init_price)` is an integer multiple of
    /// `price_interval` within tolerance, per SPEC_FULL.md §8 invariant 2.
    #[cfg(test)]
    pub(crate) fn all_on_grid(&self, tolerance: Decimal) -> bool {
        self.orders.iter().all(|o| {
            let k = self.k_of(o.price);
            (self.price_of_k(k) - o.price).abs() <= tolerance
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn precision() -> Precision {
        Precision::new(4, 6)
    }

    #[test]
    fn prepare_init_lays_out_buy_stack_descending() {
        let mut stack = OrderStack::new(OrderSide::Buy, "btc_jpy", dec!(10));
        stack.prepare_init(dec!(100), 2, dec!(2), &precision());
        let prices: Vec<Decimal> = stack.orders().iter().map(|o| o.price).collect();
        assert_eq!(prices, vec![dec!(90), dec!(80)]);
    }

    #[test]
    fn prepare_init_lays_out_sell_stack_ascending() {
        let mut stack = OrderStack::new(OrderSide::Sell, "btc_jpy", dec!(10));
        stack.prepare_init(dec!(100), 2, dec!(2), &precision());
        let prices: Vec<Decimal> = stack.orders().iter().map(|o| o.price).collect();
        assert_eq!(prices, vec![dec!(110), dec!(120)]);
    }

    #[test]
    fn refill_orders_outer_extends_past_worst() {
        let mut stack = OrderStack::new(OrderSide::Sell, "btc_jpy", dec!(10));
        stack.prepare_init(dec!(100), 2, dec!(2), &precision());
        stack.refill_orders(1, Direction::Outer, dec!(2), &precision());
        let prices: Vec<Decimal> = stack.orders().iter().map(|o| o.price).collect();
        assert_eq!(prices, vec![dec!(110), dec!(120), dec!(130)]);
    }

    #[test]
    fn refill_stack_by_pairing_adds_opposite_side_order() {
        let mut sell = OrderStack::new(OrderSide::Sell, "btc_jpy", dec!(10));
        sell.prepare_init(dec!(100), 2, dec!(2), &precision());

        let mut filled_buy =
            Order::new_to_create(99, "btc_jpy", OrderSide::Buy, dec!(90), dec!(2), &precision());
        filled_buy.mark_created("ex".into(), chrono::Utc::now());
        filled_buy.mark_on_traded(chrono::Utc::now(), Some(dec!(90)));

        let added = sell.refill_stack_by_pairing(&[filled_buy], dec!(2), &precision());
        assert_eq!(added, 1);
        let prices: Vec<Decimal> = sell.orders().iter().map(|o| o.price).collect();
        assert_eq!(prices, vec![dec!(100), dec!(110), dec!(120)]);
    }

    #[test]
    fn shrink_outer_marks_worst_orders_to_cancel() {
        let mut stack = OrderStack::new(OrderSide::Buy, "btc_jpy", dec!(10));
        stack.prepare_init(dec!(100), 2, dec!(2), &precision());
        for o in stack.orders.iter_mut() {
            o.mark_created(format!("ex-{}", o.id), chrono::Utc::now());
        }
        stack.shrink_outer(1);
        let worst = stack.worst_order(OrderFilter::All).unwrap();
        assert_eq!(worst.status, OrderStatus::ToCancel);
    }

    #[test]
    fn grid_alignment_holds_after_mutation() {
        let mut stack = OrderStack::new(OrderSide::Buy, "btc_jpy", dec!(10));
        stack.prepare_init(dec!(100), 2, dec!(2), &precision());
        stack.refill_orders(1, Direction::Outer, dec!(2), &precision());
        assert!(stack.all_on_grid(dec!(0.0001)));
    }
}
