//! Library error types for the grid engine's internal seams.
//!
//! These are the typed errors a caller can match on; the driver binary
//! wraps them in `anyhow::Context` at each call site instead of matching.

use thiserror::Error;

/// Errors the Exchange Adapter surface can report back into the engine.
#[derive(Debug, Error, Clone)]
pub enum AdapterError {
    #[error("order price rejected by exchange: {0}")]
    InvalidPrice(String),

    #[error("order would exceed the exchange's max order count")]
    ExceedOrderLimit,

    #[error("known/recoverable exchange error: {0}")]
    Known(String),

    #[error("unknown exchange error: {0}")]
    Unknown(String),
}

/// Errors from infeasible grid parameter sizing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParameterError {
    #[error("support price {support} must be strictly below init_price {init_price}")]
    SupportNotBelowInitPrice { support: String, init_price: String },

    #[error("grid_num must be a positive even number, got {0}")]
    InvalidGridNum(u32),

    #[error("price_interval must be positive, got {0}")]
    NonPositiveInterval(String),

    #[error("init_base and init_quote must both be non-negative")]
    NegativeAllocation,
}

/// Errors surfaced by the OrderManager for programmer-level misuse.
///
/// Most invariant violations described in the spec (capacity overrun,
/// duplicate grid price) are logged and the engine proceeds; these
/// variants are reserved for lookups that should never fail given correct
/// call sequencing.
#[derive(Debug, Error, Clone)]
pub enum OrderManagerError {
    #[error("no order registered with id {0}")]
    UnknownOrderId(String),

    #[error("order {0} is not in a state that allows this transition")]
    InvalidTransition(String),
}
