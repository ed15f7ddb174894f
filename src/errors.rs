use crate::engine::{OrderId, OrderSide};

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building orders, running a backtest or loading data.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The candle data provided is empty. Backtesting requires at least one candle.
    #[error("Candle data is empty: backtesting requires at least one candle")]
    CandleDataEmpty,

    /// The candle breaks `low <= open, close <= high`.
    #[error("Invalid candle: open {0}, high {1}, low {2}, close {3}")]
    InvalidCandle(f64, f64, f64, f64),

    /// The input sequences are misaligned or the timeline is not strictly increasing.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Stop-loss and target do not bracket the entry price on the right sides.
    #[error(
        "Invalid trigger configuration for {side} order at {entry_price}: stop loss {stop_loss:?}, target {target:?}"
    )]
    InvalidTriggerConfiguration {
        /// Side of the rejected order.
        side: OrderSide,
        /// Entry price of the rejected order.
        entry_price: f64,
        /// Requested stop-loss trigger.
        stop_loss: Option<f64>,
        /// Requested target trigger.
        target: Option<f64>,
    },

    /// The quantity of an order must be at least one unit.
    #[error("Quantity must be positive (got: {0})")]
    InvalidQuantity(u64),

    /// A price is not finite or not positive.
    #[error("Price must be finite and positive (got: {0})")]
    InvalidPrice(f64),

    /// The order was already closed and cannot be closed again.
    #[error("Order {0} is already closed")]
    CloseOnClosedOrder(OrderId),

    /// Steps must be taken one after another, starting at zero.
    #[error("Step out of order: expected index {expected}, got {got}")]
    StepOutOfOrder {
        /// The next index the engine can process.
        expected: usize,
        /// The index that was requested.
        got: usize,
    },

    /// No candle exists at this index.
    #[error("Candle not found at index {0}")]
    CandleNotFound(usize),

    /// The run was cancelled before this step.
    #[error("Backtest cancelled before step {0}")]
    Cancelled(usize),

    /// Failure raised by a strategy.
    #[error("{0}")]
    Msg(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error occurred.
    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
