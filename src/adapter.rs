//! `ExchangeAdapter`: the capability set the core needs from a spot
//! exchange, expressed as an `async_trait` so the core never depends on a
//! concrete venue.
//!
//! Grounded on `exchanges/bitbank.py`'s `Bitbank`/`Exchange` capability
//! shape (`get_latest_prices`, `get_assets`, `create_order`,
//! `cancel_orders`, `get_orders_data`, `is_order_fullyfilled`,
//! `is_order_cancelled`) — re-expressed as a typed trait instead of a
//! string-keyed response dict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::model::{Order, OrderId, OrderSide};

/// A ticker snapshot, all fields already in the exchange's native decimal
/// representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub last: Decimal,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
}

impl Ticker {
    pub fn spread(&self) -> Decimal {
        self.best_ask - self.best_bid
    }

    pub fn mid_price(&self) -> Decimal {
        (self.best_ask + self.best_bid) / Decimal::from(2)
    }
}

/// Free balance of the pair's two currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assets {
    pub base_amount: Decimal,
    pub quote_amount: Decimal,
}

/// One exchange-reported order status, keyed back to the local `OrderId`
/// via `client_order_id` the adapter is responsible for round-tripping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusRecord {
    pub client_order_id: OrderId,
    pub exchange_order_id: String,
    pub fully_filled: bool,
    pub cancelled: bool,
    pub average_price: Option<Decimal>,
    pub executed_at: Option<DateTime<Utc>>,
}

/// One exchange-reported cancel result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResult {
    pub client_order_id: OrderId,
    pub cancelled: bool,
}

/// Capabilities the core requires of a spot exchange (SPEC_FULL.md §6.1).
/// The adapter snaps prices/amounts to the exchange's own tick/lot rules;
/// the core only ever hands it values already rounded to its configured
/// `Precision`.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn pair(&self) -> &str;
    fn fee(&self) -> Decimal;
    fn max_order_count(&self) -> u32;

    async fn get_latest_prices(&self) -> Result<Ticker, AdapterError>;
    async fn get_assets(&self) -> Result<Assets, AdapterError>;

    /// Submit a `ToCreate` order; on success the adapter has assigned it
    /// an `exchange_order_id` and an `ordered_at` timestamp.
    async fn create_order(&self, order: &Order) -> Result<(String, DateTime<Utc>), AdapterError>;

    /// Batch cancel by local id; the adapter maps these to exchange ids
    /// internally and returns one result per id actually acted on (which
    /// may be a subset of, or include ids outside, what was requested —
    /// see SPEC_FULL.md §8 scenario S6).
    async fn cancel_orders(&self, ids: &[OrderId]) -> Result<Vec<CancelResult>, AdapterError>;

    /// Batch status lookup by local id.
    async fn get_orders_data(&self, ids: &[OrderId]) -> Result<Vec<OrderStatusRecord>, AdapterError>;

    /// Whether `err` is one of this exchange's known/recoverable failure
    /// modes (network blips, transient auth) rather than something that
    /// should surface as an error notification. Expressed as a predicate
    /// rather than the original's open string `KnownExceptions` tuple,
    /// since Rust error kinds are typed.
    fn is_known_exception(&self, err: &AdapterError) -> bool {
        matches!(err, AdapterError::Known(_))
    }
}

/// Convenience helper shared by adapters and the bot: which side an
/// opposite-pair order belongs to, given the side that just filled.
pub fn pair_side(filled_side: OrderSide) -> OrderSide {
    filled_side.opposite()
}


#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ticker_mid_price_averages_bid_and_ask() {
        let t = Ticker {
            last: dec!(100),
            best_bid: dec!(99),
            best_ask: dec!(101),
        };
        assert_eq!(t.mid_price(), dec!(100));
        assert_eq!(t.spread(), dec!(2));
    }

    #[test]
    fn pair_side_is_opposite() {
        assert_eq!(pair_side(OrderSide::Buy), OrderSide::Sell);
        assert_eq!(pair_side(OrderSide::Sell), OrderSide::Buy);
    }
}
