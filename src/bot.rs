//! `GridBot`: owns the `OrderManager` and an `ExchangeAdapter`, and drives
//! the periodic sync-and-adjust reconciliation loop.
//!
//! Grounded on `bots/grid_bot.rs` for texture (constructor-then-async-
//! methods shape, `Result`/`Context` propagation, a status-snapshot
//! struct) and on `original_source/grid_trade/base.py`'s `GridBot` for
//! semantics (`init_and_start`'s double-init guard, `cancel_and_stop`'s
//! unconditional local force-cancel, `sync_order_status`'s control-flow
//! skeleton), extended per SPEC_FULL.md §4.4's richer pairing-aware sync.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use crate::adapter::ExchangeAdapter;
use crate::error::AdapterError;
use crate::manager::OrderManager;
use crate::model::{Order, OrderId};
use crate::notifier::Notifier;
use crate::parameter::Parameter;
use crate::precision::Precision;
use crate::report::{ExecutionReport, OrderCounter};
use crate::store::StateStore;

/// `Created | Running | Stopped` (SPEC_FULL.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridBotStatus {
    Created,
    Running,
    Stopped,
}

/// Typed stand-in for the source's free-form `additional_info` bag
/// (SPEC_FULL.md §9): the dependency handles `GridBot` needs besides the
/// exchange, plus the pair it is quoting, with no stringly-keyed map.
#[derive(Clone)]
pub struct GridBotDeps {
    pub notifier: Arc<dyn Notifier>,
    pub store: Option<Arc<dyn StateStore>>,
    pub pair: String,
}

/// The grid engine's top-level controller. Owns exactly one
/// `OrderManager`, is not re-entrant, and must not be driven concurrently
/// with itself (SPEC_FULL.md §5).
pub struct GridBot {
    id: Uuid,
    status: GridBotStatus,
    parameter: Parameter,
    precision: Precision,
    balance_threshold: u32,
    enable_irregular_price_check: bool,
    adapter: Arc<dyn ExchangeAdapter>,
    deps: GridBotDeps,
    manager: Option<OrderManager>,
    counter: OrderCounter,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    latest_price: Option<Decimal>,
    report_interval: ChronoDuration,
    last_report_at: Option<DateTime<Utc>>,
    stop_warned: bool,
}

impl GridBot {
    pub fn new(
        parameter: Parameter,
        precision: Precision,
        balance_threshold: u32,
        enable_irregular_price_check: bool,
        adapter: Arc<dyn ExchangeAdapter>,
        deps: GridBotDeps,
        report_interval_secs: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: GridBotStatus::Created,
            parameter,
            precision,
            balance_threshold,
            enable_irregular_price_check,
            adapter,
            deps,
            manager: None,
            counter: OrderCounter::new(),
            started_at: None,
            stopped_at: None,
            latest_price: None,
            report_interval: ChronoDuration::seconds(report_interval_secs as i64),
            last_report_at: None,
            stop_warned: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> GridBotStatus {
        self.status
    }

    pub fn latest_price(&self) -> Option<Decimal> {
        self.latest_price
    }

    pub fn manager(&self) -> Option<&OrderManager> {
        self.manager.as_ref()
    }

    pub fn counter(&self) -> &OrderCounter {
        &self.counter
    }

    /// Lay out the initial grid and submit its orders. Guards against
    /// double-init: a bot already `Running` logs and notifies an error
    /// rather than rebuilding its state out from under itself.
    pub async fn init_and_start(&mut self) -> Result<()> {
        if self.status == GridBotStatus::Running {
            log::error!("bot {} init_and_start called while already running", self.id);
            self.deps
                .notifier
                .error(&format!("grid bot {} is already running, ignoring init request", self.id))
                .await;
            return Ok(());
        }

        let order_limit = self.adapter.max_order_count();
        let mut manager = OrderManager::new(
            self.deps.pair.clone(),
            self.parameter.price_interval,
            self.parameter.unit_amount,
            order_limit,
            self.balance_threshold,
            self.precision,
        );
        manager.init_stacks(self.parameter.init_price);
        self.manager = Some(manager);

        self.status = GridBotStatus::Running;
        self.started_at = Some(Utc::now());
        self.stopped_at = None;
        self.stop_warned = false;
        log::info!(
            "grid bot {} started on {} at init_price {} ({} - {})",
            self.id,
            self.deps.pair,
            self.parameter.init_price,
            self.parameter.lowest_price(),
            self.parameter.highest_price()
        );

        if let Some(store) = &self.deps.store {
            let _ = store
                .create_and_use_runner(
                    &self.id.to_string(),
                    json!({
                        "pair": self.deps.pair,
                        "init_price": self.parameter.init_price.to_string(),
                        "started_at": self.started_at,
                    }),
                )
                .await;
        }

        self.commit_create_orders().await?;
        self.deps
            .notifier
            .info(&format!("grid bot {} initialised and started", self.id))
            .await;
        Ok(())
    }

    /// Cancel every active order at the exchange, then force-cancel
    /// locally regardless of whether that succeeded, and emit a final
    /// execution report. A no-op (logged, not notified) if never started;
    /// idempotent if already stopped.
    pub async fn cancel_and_stop(&mut self) -> Result<()> {
        if self.status == GridBotStatus::Created {
            log::warn!("bot {} cancel_and_stop called before init_and_start", self.id);
            return Ok(());
        }
        if self.status == GridBotStatus::Stopped {
            if !self.stop_warned {
                log::warn!("bot {} is already stopped", self.id);
                self.stop_warned = true;
            }
            return Ok(());
        }

        let manager = self.manager.as_mut().expect("running bot always has a manager");
        let ids = manager.active_order_ids();
        if !ids.is_empty() {
            if let Err(e) = self.adapter.cancel_orders(&ids).await {
                log::warn!("bot {} cancel_orders at stop failed: {e}", self.id);
            }
        }
        manager.cancel_all();

        self.status = GridBotStatus::Stopped;
        self.stopped_at = Some(Utc::now());
        log::info!("grid bot {} stopped", self.id);

        if let Some(store) = &self.deps.store {
            let _ = store
                .update_runner(
                    &self.id.to_string(),
                    json!({ "status": "Stopped", "stopped_at": self.stopped_at }),
                )
                .await;
        }

        let duration_hours = self.duration_hours();
        let report = ExecutionReport::new(&self.parameter, &self.counter, duration_hours);
        self.deps.notifier.info(&format!("final {report}")).await;
        Ok(())
    }

    fn duration_hours(&self) -> Decimal {
        let Some(started) = self.started_at else {
            return Decimal::ZERO;
        };
        let seconds = (Utc::now() - started).num_seconds().max(0);
        Decimal::from(seconds) / Decimal::from(3600)
    }

    /// One reconciliation cycle (SPEC_FULL.md §4.4). Not re-entrant.
    pub async fn sync_and_adjust(&mut self) -> Result<()> {
        if self.status != GridBotStatus::Running {
            log::warn!("bot {} sync_and_adjust called while not running", self.id);
            return Ok(());
        }

        // Step 1: fetch statuses.
        let ids = self.manager().unwrap().active_order_ids();
        let statuses = if ids.is_empty() {
            Vec::new()
        } else {
            match self.adapter.get_orders_data(&ids).await {
                Ok(v) => v,
                Err(e) if self.adapter.is_known_exception(&e) => {
                    log::warn!("bot {} known exchange error fetching statuses: {e}", self.id);
                    Vec::new()
                }
                Err(e) => {
                    self.deps
                        .notifier
                        .error(&format!("bot {} failed to fetch order statuses: {e}", self.id))
                        .await;
                    return Ok(());
                }
            }
        };

        // Step 2: classify.
        let mut filled_orders: Vec<Order> = Vec::new();
        for record in &statuses {
            if record.fully_filled {
                let Some(order) = self.manager().unwrap().get_order_by_id(record.client_order_id).cloned()
                else {
                    self.deps
                        .notifier
                        .error(&format!(
                            "bot {} reported fill for unknown order id {}",
                            self.id, record.client_order_id
                        ))
                        .await;
                    continue;
                };
                let manager = self.manager.as_mut().unwrap();
                manager.mark_order_on_traded(
                    record.client_order_id,
                    record.executed_at.unwrap_or_else(Utc::now),
                    record.average_price,
                )?;
                self.counter.record(order.side);
                self.deps
                    .notifier
                    .trade(order.side, &format!("order {} filled at {}", order.id, order.price))
                    .await;
                filled_orders.push(order);
            } else if record.cancelled {
                if let Err(e) = self.manager.as_mut().unwrap().order_force_cancelled(record.client_order_id) {
                    self.deps
                        .notifier
                        .error(&format!(
                            "bot {} reported cancel for unknown order id {}: {e}",
                            self.id, record.client_order_id
                        ))
                        .await;
                    continue;
                }
                if let Some(store) = &self.deps.store {
                    let _ = store.delete_order(record.client_order_id).await;
                }
                self.deps
                    .notifier
                    .error(&format!(
                        "order {} was cancelled outside our control (possible manual cancel or rejected create)",
                        record.client_order_id
                    ))
                    .await;
            }
        }

        // Step 3: periodic execution report.
        let now = Utc::now();
        let due = self
            .last_report_at
            .map(|last| now - last >= self.report_interval)
            .unwrap_or(true);
        if due {
            let report = ExecutionReport::new(&self.parameter, &self.counter, self.duration_hours());
            self.deps.notifier.info(&format!("{report}")).await;
            self.last_report_at = Some(now);
        }

        // Step 4: short-circuit if nothing filled.
        if filled_orders.is_empty() {
            return Ok(());
        }

        // Step 5: fetch price, bail out of range.
        let ticker = match self.adapter.get_latest_prices().await {
            Ok(t) => t,
            Err(e) if self.adapter.is_known_exception(&e) => {
                log::warn!("bot {} known exchange error fetching price: {e}", self.id);
                return Ok(());
            }
            Err(e) => {
                self.deps
                    .notifier
                    .error(&format!("bot {} failed to fetch ticker: {e}", self.id))
                    .await;
                return Ok(());
            }
        };
        self.latest_price = Some(ticker.last);
        if ticker.last < self.parameter.lowest_price() || ticker.last > self.parameter.highest_price() {
            log::warn!(
                "bot {} price {} outside grid range [{}, {}], skipping adjustment this sync",
                self.id,
                ticker.last,
                self.parameter.lowest_price(),
                self.parameter.highest_price()
            );
            return Ok(());
        }

        // Step 6: adjust the grid.
        if self.enable_irregular_price_check {
            let warnings = self
                .manager()
                .unwrap()
                .check_irregular_price(&filled_orders, ticker.best_bid, ticker.best_ask);
            for warning in warnings {
                self.deps.notifier.error(&warning).await;
            }
        }

        let manager = self.manager.as_mut().unwrap();
        manager.refill_orders_at_opposite_position();
        manager.balance_stacks();
        let (buy_traded, sell_traded) = manager.orders_traded();

        if let Some(store) = &self.deps.store {
            for order in buy_traded.iter().chain(sell_traded.iter()) {
                let _ = store.delete_order(order.id).await;
            }
        }

        self.commit_cancel_orders().await?;
        self.commit_create_orders().await?;

        // Step 7: persist latest price and counters.
        if let Some(store) = &self.deps.store {
            let _ = store
                .update_runner(
                    &self.id.to_string(),
                    json!({
                        "latest_price": self.latest_price.map(|p| p.to_string()),
                        "buy_count": self.counter.count(crate::model::OrderSide::Buy),
                        "sell_count": self.counter.count(crate::model::OrderSide::Sell),
                    }),
                )
                .await;
        }

        Ok(())
    }

    /// Batch-cancel every `ToCancel` order at the exchange. A record that
    /// doesn't confirm cancellation, or references an id we didn't ask
    /// about, is reported but never force-cancelled here — the order
    /// stays active and is retried next sync.
    async fn commit_cancel_orders(&mut self) -> Result<()> {
        let to_cancel: Vec<OrderId> = self
            .manager()
            .unwrap()
            .orders_to_cancel()
            .iter()
            .map(|o| o.id)
            .collect();
        if to_cancel.is_empty() {
            return Ok(());
        }

        match self.adapter.cancel_orders(&to_cancel).await {
            Ok(results) => {
                for result in results {
                    if !to_cancel.contains(&result.client_order_id) {
                        self.deps
                            .notifier
                            .error(&format!(
                                "bot {} cancel batch returned irrelevant order id {}",
                                self.id, result.client_order_id
                            ))
                            .await;
                        continue;
                    }
                    if result.cancelled {
                        self.manager.as_mut().unwrap().order_cancel_ok(result.client_order_id)?;
                        if let Some(store) = &self.deps.store {
                            let _ = store.delete_order(result.client_order_id).await;
                        }
                    } else {
                        self.deps
                            .notifier
                            .error(&format!(
                                "bot {} cancel not confirmed for order {}, will retry",
                                self.id, result.client_order_id
                            ))
                            .await;
                    }
                }
            }
            Err(e) => {
                self.deps
                    .notifier
                    .error(&format!("bot {} cancel batch raised: {e}, will retry next sync", self.id))
                    .await;
            }
        }
        Ok(())
    }

    /// Submit every `ToCreate` order. A rejection the adapter classifies
    /// as `InvalidPrice` or `ExceedOrderLimit` force-cancels that order
    /// locally (its slot is reclaimed on the next `balance_stacks` call);
    /// any other adapter error leaves it `ToCreate` to retry next sync.
    async fn commit_create_orders(&mut self) -> Result<()> {
        let to_create: Vec<Order> = self
            .manager()
            .unwrap()
            .orders_to_create()
            .into_iter()
            .cloned()
            .collect();

        for order in to_create {
            match self.adapter.create_order(&order).await {
                Ok((exchange_order_id, ordered_at)) => {
                    self.manager
                        .as_mut()
                        .unwrap()
                        .order_create_ok(order.id, exchange_order_id.clone(), ordered_at)?;
                    if let Some(store) = &self.deps.store {
                        let _ = store
                            .create_order(
                                order.id,
                                json!({
                                    "side": order.side.to_string(),
                                    "price": order.price.to_string(),
                                    "amount": order.amount.to_string(),
                                    "exchange_order_id": exchange_order_id,
                                }),
                            )
                            .await;
                    }
                }
                Err(e @ (AdapterError::InvalidPrice(_) | AdapterError::ExceedOrderLimit)) => {
                    self.manager.as_mut().unwrap().order_force_cancelled(order.id)?;
                    if let Some(store) = &self.deps.store {
                        let _ = store.delete_order(order.id).await;
                    }
                    self.deps
                        .notifier
                        .error(&format!(
                            "bot {} order {} rejected at {}: {e}",
                            self.id, order.id, order.price
                        ))
                        .await;
                }
                Err(e) => {
                    self.deps
                        .notifier
                        .error(&format!(
                            "bot {} order {} create failed, will retry: {e}",
                            self.id, order.id
                        ))
                        .await;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::mock::MockExchangeAdapter;
    use crate::adapter::{CancelResult, OrderStatusRecord, Ticker};
    use crate::notifier::mock::MockNotifier;
    use crate::precision::Precision;
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
            &Precision::new(4, 6),
        )
        .unwrap()
    }

    fn deps(notifier: Arc<MockNotifier>) -> GridBotDeps {
        GridBotDeps {
            notifier,
            store: None,
            pair: "btc_jpy".to_string(),
        }
    }

    /// SPEC_FULL.md §8 scenario S2: four creates recorded in order, grid
    /// laid out symmetrically with a fixed `order_limit`.
    #[tokio::test]
    async fn init_and_start_lays_out_s2_grid() {
        let adapter = Arc::new(MockExchangeAdapter::new("btc_jpy", dec!(-0.0002), 4));
        let notifier = Arc::new(MockNotifier::new());
        let mut bot = GridBot::new(
            parameter(),
            Precision::new(4, 6),
            1,
            false,
            adapter.clone(),
            deps(notifier),
            3600,
        );

        bot.init_and_start().await.unwrap();

        assert_eq!(bot.status(), GridBotStatus::Running);
        let created = adapter.created_order_ids().await;
        assert_eq!(created.len(), 4);
        assert_eq!(bot.manager().unwrap().active_order_ids().len(), 4);
    }

    /// SPEC_FULL.md §8 scenario S3: a single sell fill pairs into a new
    /// buy and the grid rebalances.
    #[tokio::test]
    async fn sync_and_adjust_pairs_a_single_sell_fill() {
        let adapter = Arc::new(MockExchangeAdapter::new("btc_jpy", dec!(-0.0002), 4));
        let notifier = Arc::new(MockNotifier::new());
        let mut bot = GridBot::new(
            parameter(),
            Precision::new(4, 6),
            1,
            false,
            adapter.clone(),
            deps(notifier.clone()),
            3600,
        );
        bot.init_and_start().await.unwrap();

        let sell_110_id = bot
            .manager()
            .unwrap()
            .sell_stack()
            .orders()
            .iter()
            .find(|o| o.price == dec!(110))
            .unwrap()
            .id;

        adapter
            .push_status_batch(vec![OrderStatusRecord {
                client_order_id: sell_110_id,
                exchange_order_id: "mock".to_string(),
                fully_filled: true,
                cancelled: false,
                average_price: Some(dec!(110)),
                executed_at: Some(Utc::now()),
            }])
            .await;
        adapter
            .push_ticker(Ticker {
                last: dec!(101),
                best_bid: dec!(100.9),
                best_ask: dec!(101.1),
            })
            .await;

        bot.sync_and_adjust().await.unwrap();

        let buy_prices: Vec<Decimal> = bot
            .manager()
            .unwrap()
            .buy_stack()
            .orders()
            .iter()
            .map(|o| o.price)
            .collect();
        assert!(buy_prices.contains(&dec!(100)));
        assert_eq!(bot.counter().count(crate::model::OrderSide::Sell), 1);
    }

    #[tokio::test]
    async fn cancel_and_stop_is_idempotent() {
        let adapter = Arc::new(MockExchangeAdapter::new("btc_jpy", dec!(-0.0002), 4));
        let notifier = Arc::new(MockNotifier::new());
        let mut bot = GridBot::new(
            parameter(),
            Precision::new(4, 6),
            1,
            false,
            adapter,
            deps(notifier),
            3600,
        );
        bot.init_and_start().await.unwrap();

        bot.cancel_and_stop().await.unwrap();
        assert_eq!(bot.status(), GridBotStatus::Stopped);
        bot.cancel_and_stop().await.unwrap();
        assert_eq!(bot.status(), GridBotStatus::Stopped);
    }

    /// SPEC_FULL.md §8 scenario S6: a cancel batch that returns a
    /// mismatch leaves the un-confirmed order active and reports the
    /// irrelevant id.
    #[tokio::test]
    async fn cancel_mismatch_keeps_order_active_and_reports_irrelevant_id() {
        let adapter = Arc::new(MockExchangeAdapter::new("btc_jpy", dec!(-0.0002), 4));
        let notifier = Arc::new(MockNotifier::new());
        let mut bot = GridBot::new(
            parameter(),
            Precision::new(4, 6),
            2,
            false,
            adapter.clone(),
            deps(notifier.clone()),
            3600,
        );
        bot.init_and_start().await.unwrap();

        // Mirror manager.rs's own balance_stacks test: bring the sell side
        // up to Created, then drain the buy side so balance_stacks shrinks
        // sell, giving commit_cancel_orders exactly one ToCancel order.
        let sell_ids: Vec<_> = bot.manager().unwrap().sell_stack().orders().iter().map(|o| o.id).collect();
        let buy_ids: Vec<_> = bot.manager().unwrap().buy_stack().orders().iter().map(|o| o.id).collect();
        {
            let manager = bot.manager.as_mut().unwrap();
            for id in &sell_ids {
                manager.order_create_ok(*id, format!("ex-{id}"), Utc::now()).unwrap();
            }
            for id in &buy_ids {
                manager.order_force_cancelled(*id).unwrap();
            }
            manager.balance_stacks();
        }

        let to_cancel: Vec<_> = bot
            .manager()
            .unwrap()
            .orders_to_cancel()
            .iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(to_cancel.len(), 1);
        let valid_id = to_cancel[0];

        adapter
            .push_cancel_batch(vec![
                CancelResult {
                    client_order_id: valid_id,
                    cancelled: true,
                },
                CancelResult {
                    client_order_id: 424_242,
                    cancelled: true,
                },
            ])
            .await;

        bot.commit_cancel_orders().await.unwrap();

        assert_eq!(notifier.errors.lock().await.len(), 1);
        assert!(bot.manager().unwrap().get_order_by_id(valid_id).is_none());
    }
}
