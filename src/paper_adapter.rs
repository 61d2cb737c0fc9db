//! A risk-free `ExchangeAdapter` that fills orders against a synthetic
//! price path instead of a live venue, so `main.rs` has something to run
//! against without exchange credentials.
//!
//! Grounded on `trading/paper_trader.rs`'s `PaperTradingEngine` (virtual
//! order book, maker-fee-on-fill, `RwLock`-guarded state) with its price
//! feed replaced: the original drives fills off a live/fetched price, but
//! this workspace dropped `price_feed.rs`'s network dependencies, so fills
//! are driven by a deterministic sine wave seeded from wall-clock elapsed
//! time instead of `rand` or an external feed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::adapter::{Assets, CancelResult, ExchangeAdapter, OrderStatusRecord, Ticker};
use crate::error::AdapterError;
use crate::model::{Order, OrderId};

/// Resting paper order, keyed by the local `OrderId` the core submitted.
struct RestingOrder {
    order: Order,
    exchange_order_id: String,
}

/// Deterministic sine-wave price generator: oscillates around `base`
/// with `amplitude`, completing one cycle every `period_secs`. Avoids
/// reintroducing a `rand` dependency the teacher's live feeds used.
pub struct PaperExchangeAdapter {
    pair: String,
    fee: Decimal,
    max_order_count: u32,
    base_price: Decimal,
    amplitude: Decimal,
    period_secs: f64,
    started_at: Instant,
    next_exchange_id: AtomicU64,
    book: Mutex<HashMap<OrderId, RestingOrder>>,
}

impl PaperExchangeAdapter {
    pub fn new(
        pair: impl Into<String>,
        fee: Decimal,
        max_order_count: u32,
        base_price: Decimal,
        amplitude: Decimal,
        period_secs: f64,
    ) -> Self {
        Self {
            pair: pair.into(),
            fee,
            max_order_count,
            base_price,
            amplitude,
            period_secs,
            started_at: Instant::now(),
            next_exchange_id: AtomicU64::new(1),
            book: Mutex::new(HashMap::new()),
        }
    }

    fn current_price(&self) -> Decimal {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        let phase = 2.0 * std::f64::consts::PI * elapsed / self.period_secs;
        let offset = Decimal::from_f64(phase.sin()).unwrap_or(Decimal::ZERO) * self.amplitude;
        (self.base_price + offset).max(Decimal::new(1, 2))
    }

    fn would_fill(order: &Order, price: Decimal) -> bool {
        match order.side {
            crate::model::OrderSide::Buy => price <= order.price,
            crate::model::OrderSide::Sell => price >= order.price,
        }
    }
}

#[async_trait]
impl ExchangeAdapter for PaperExchangeAdapter {
    fn name(&self) -> &str {
        "paper"
    }

    fn pair(&self) -> &str {
        &self.pair
    }

    fn fee(&self) -> Decimal {
        self.fee
    }

    fn max_order_count(&self) -> u32 {
        self.max_order_count
    }

    async fn get_latest_prices(&self) -> Result<Ticker, AdapterError> {
        let last = self.current_price();
        let half_spread = last * Decimal::new(1, 4); // 0.01%, a tight synthetic spread
        Ok(Ticker {
            last,
            best_bid: last - half_spread,
            best_ask: last + half_spread,
        })
    }

    async fn get_assets(&self) -> Result<Assets, AdapterError> {
        Ok(Assets {
            base_amount: Decimal::ZERO,
            quote_amount: Decimal::ZERO,
        })
    }

    async fn create_order(&self, order: &Order) -> Result<(String, chrono::DateTime<Utc>), AdapterError> {
        let exchange_id = self.next_exchange_id.fetch_add(1, Ordering::SeqCst);
        let exchange_order_id = format!("paper-{exchange_id}");
        let ordered_at = Utc::now();
        self.book.lock().await.insert(
            order.id,
            RestingOrder {
                order: order.clone(),
                exchange_order_id: exchange_order_id.clone(),
            },
        );
        Ok((exchange_order_id, ordered_at))
    }

    async fn cancel_orders(&self, ids: &[OrderId]) -> Result<Vec<CancelResult>, AdapterError> {
        let mut book = self.book.lock().await;
        Ok(ids
            .iter()
            .map(|&id| CancelResult {
                client_order_id: id,
                cancelled: book.remove(&id).is_some(),
            })
            .collect())
    }

    async fn get_orders_data(&self, ids: &[OrderId]) -> Result<Vec<OrderStatusRecord>, AdapterError> {
        let price = self.current_price();
        let mut book = self.book.lock().await;
        let mut records = Vec::new();
        for &id in ids {
            let Some(resting) = book.get(&id) else { continue };
            if Self::would_fill(&resting.order, price) {
                records.push(OrderStatusRecord {
                    client_order_id: id,
                    exchange_order_id: resting.exchange_order_id.clone(),
                    fully_filled: true,
                    cancelled: false,
                    average_price: Some(price),
                    executed_at: Some(Utc::now()),
                });
                book.remove(&id);
            }
        }
        Ok(records)
    }
}
