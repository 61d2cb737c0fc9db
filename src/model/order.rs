//! A single grid order and its lifecycle state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::OrderManagerError;
use crate::precision::Precision;

/// Local handle assigned at construction time, stable for the lifetime of
/// the order regardless of whether the exchange has accepted it yet.
pub type OrderId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
}

/// The order state machine described in SPEC_FULL.md §3.
///
/// `OnTraded` is deliberately kept distinct from `Traded` — it is the
/// window in which `refill_orders_at_opposite_position` can still see a
/// just-filled order before its counter and removal are committed. Do not
/// merge the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    ToCreate,
    Created,
    OnTraded,
    Traded,
    ToCancel,
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl OrderStatus {
    pub fn is_active(self) -> bool {
        matches!(self, OrderStatus::Created)
    }

    pub fn is_expected(self) -> bool {
        matches!(self, OrderStatus::ToCreate | OrderStatus::Created)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Traded | OrderStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub exchange_order_id: Option<String>,
    pub pair: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Decimal,
    pub amount: Decimal,
    pub post_only: bool,
    pub average_price: Option<Decimal>,
    pub ordered_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub status: OrderStatus,
}

impl Order {
    pub fn new_to_create(
        id: OrderId,
        pair: impl Into<String>,
        side: OrderSide,
        price: Decimal,
        amount: Decimal,
        precision: &Precision,
    ) -> Self {
        Self {
            id,
            exchange_order_id: None,
            pair: pair.into(),
            side,
            order_type: OrderType::Limit,
            price: precision.round_price(price),
            amount: precision.round_amount(amount),
            post_only: true,
            average_price: None,
            ordered_at: None,
            executed_at: None,
            status: OrderStatus::ToCreate,
        }
    }

    pub fn cost(&self, precision: &Precision) -> Decimal {
        precision.cost(self.amount, self.price)
    }

    /// The price a paired order on the opposite side would sit at, one
    /// grid step toward the center from this order's price.
    pub fn opposite_price(&self, price_interval: Decimal) -> Decimal {
        match self.side {
            OrderSide::Buy => self.price + price_interval,
            OrderSide::Sell => self.price - price_interval,
        }
    }

    pub fn mark_created(&mut self, exchange_order_id: String, ordered_at: DateTime<Utc>) {
        if self.status != OrderStatus::ToCreate {
            log::warn!(
                "order {} ignored create-ok transition from status {}",
                self.id,
                self.status
            );
            return;
        }
        self.exchange_order_id = Some(exchange_order_id);
        self.ordered_at = Some(ordered_at);
        self.status = OrderStatus::Created;
    }

    pub fn mark_to_cancel(&mut self) {
        if self.status != OrderStatus::Created {
            log::warn!(
                "order {} ignored to-cancel request from status {}",
                self.id,
                self.status
            );
            return;
        }
        self.status = OrderStatus::ToCancel;
    }

    pub fn mark_cancel_ok(&mut self) -> Result<(), OrderManagerError> {
        if self.status != OrderStatus::ToCancel {
            return Err(OrderManagerError::InvalidTransition(format!(
                "order {} cancel-ok from status {}",
                self.id, self.status
            )));
        }
        self.status = OrderStatus::Cancelled;
        Ok(())
    }

    pub fn mark_on_traded(&mut self, executed_at: DateTime<Utc>, average_price: Option<Decimal>) {
        if self.status != OrderStatus::Created {
            log::warn!(
                "order {} ignored on-traded transition from status {}",
                self.id,
                self.status
            );
            return;
        }
        self.executed_at = Some(executed_at);
        self.average_price = average_price;
        self.status = OrderStatus::OnTraded;
    }

    /// Committed after a sync completes: every `OnTraded` order becomes
    /// `Traded`. Must not be called before the pairing step has observed
    /// the `OnTraded` set.
    pub fn mark_traded(&mut self) {
        if self.status != OrderStatus::OnTraded {
            log::warn!(
                "order {} ignored traded-commit from status {}",
                self.id,
                self.status
            );
            return;
        }
        self.status = OrderStatus::Traded;
    }

    /// Local transition to `Cancelled` without an awaited exchange cancel
    /// for this specific order — used for orders that disappear from the
    /// exchange unexpectedly, or rejected creates.
    pub fn force_cancel(&mut self) {
        self.status = OrderStatus::Cancelled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn precision() -> Precision {
        Precision::new(2, 4)
    }

    #[test]
    fn new_order_rounds_to_configured_precision() {
        let o = Order::new_to_create(
            1,
            "btc_jpy",
            OrderSide::Buy,
            dec!(100.12345),
            dec!(0.123456789),
            &precision(),
        );
        assert_eq!(o.price, dec!(100.12));
        assert_eq!(o.amount, dec!(0.1235));
        assert_eq!(o.status, OrderStatus::ToCreate);
    }

    #[test]
    fn opposite_price_moves_toward_center() {
        let buy = Order::new_to_create(1, "p", OrderSide::Buy, dec!(90), dec!(1), &precision());
        assert_eq!(buy.opposite_price(dec!(10)), dec!(100));

        let sell = Order::new_to_create(2, "p", OrderSide::Sell, dec!(110), dec!(1), &precision());
        assert_eq!(sell.opposite_price(dec!(10)), dec!(100));
    }

    #[test]
    fn lifecycle_happy_path() {
        let mut o = Order::new_to_create(1, "p", OrderSide::Buy, dec!(90), dec!(1), &precision());
        o.mark_created("ex-1".into(), Utc::now());
        assert_eq!(o.status, OrderStatus::Created);

        o.mark_on_traded(Utc::now(), Some(dec!(90)));
        assert_eq!(o.status, OrderStatus::OnTraded);

        o.mark_traded();
        assert_eq!(o.status, OrderStatus::Traded);
    }

    #[test]
    fn cancel_ok_rejects_wrong_state() {
        let mut o = Order::new_to_create(1, "p", OrderSide::Buy, dec!(90), dec!(1), &precision());
        assert!(o.mark_cancel_ok().is_err());
    }
}
