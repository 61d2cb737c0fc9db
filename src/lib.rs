//! A grid trading engine: lays out paired buy/sell order stacks around a
//! reference price, refills them as fills pair across the grid, and
//! reports realised yield over the run.
//!
//! The core (`model`, `manager`, `parameter`, `report`) is exchange-
//! agnostic and synchronous; `adapter`, `notifier`, and `store` are the
//! `async_trait` seams a driver plugs a concrete venue, alert channel,
//! and persistence layer into. `bot` ties them together into the
//! `GridBot` controller a process actually runs.

#![warn(rust_2018_idioms, unreachable_pub)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

pub mod adapter;
pub mod bot;
pub mod config;
pub mod error;
pub mod manager;
pub mod model;
pub mod notifier;
pub mod paper_adapter;
pub mod parameter;
pub mod precision;
pub mod report;
pub mod store;

pub use adapter::{Assets, CancelResult, ExchangeAdapter, OrderStatusRecord, Ticker};
pub use bot::{GridBot, GridBotDeps, GridBotStatus};
pub use config::{CliOverrides, Config, ConfigLoader};
pub use error::{AdapterError, OrderManagerError, ParameterError};
pub use manager::OrderManager;
pub use model::{Order, OrderId, OrderSide, OrderStatus, OrderType};
pub use notifier::{Notifier, WebhookNotifier};
pub use parameter::Parameter;
pub use precision::Precision;
pub use report::{ExecutionReport, OrderCounter};
pub use store::StateStore;

/// Common imports for a binary driving a `GridBot`.
pub mod prelude {
    pub use crate::{
        CliOverrides, Config, ConfigLoader, ExchangeAdapter, GridBot, GridBotDeps, GridBotStatus,
        Notifier, Order, OrderSide, OrderStatus, Parameter, Precision, StateStore,
    };
    pub use anyhow::{Context, Result};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_reexports_resolve() {
        let _: Option<Parameter> = None;
        let _: Option<Config> = None;
    }
}
