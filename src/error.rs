//! Error types for the feeder boundary and decimal primitives.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised at the provider/ticker boundary. A failing observation is
/// dropped and counted; it never aborts a tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TickerError {
    #[error("{provider} failed to get ticker price for {symbol}")]
    MissingTicker { provider: String, symbol: String },

    #[error("invalid decimal string {0:?}")]
    InvalidDecimal(String),

    #[error("negative price {0}")]
    NegativePrice(Decimal),

    #[error("negative volume {0}")]
    NegativeVolume(Decimal),
}

/// Errors from the fixed-point primitives. These are catastrophic by
/// contract: the pipeline never divides by an unchecked zero, so hitting one
/// aborts the whole tick.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("square root of negative value")]
    NegativeSqrt,

    #[error("decimal overflow")]
    Overflow,
}
