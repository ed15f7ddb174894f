//! # algobt: replay a trading strategy over historical candles
//!
//! **algobt** steps a strategy through a timeline of candles (open, high, low, close),
//! keeps track of the orders it opens and closes them when their stop-loss or target
//! trigger is crossed. The closed orders then give trade statistics and a profit curve,
//! so a strategy can be judged before it trades for real.
//!
//! ## Core Components
//! | Component       | Description                                                                  |
//! |-----------------|------------------------------------------------------------------------------|
//! | **`Candle`**    | Open, high, low and close prices at one timestamp.                           |
//! | **`Order`**     | A buy or sell position with an optional stop-loss and an optional target.    |
//! | **`OrderBook`** | Open orders, and closed orders in closing order.                             |
//! | **`Backtest`**  | The engine: checks open orders against each candle, then calls the strategy. |
//! | **`Snapshot`**  | Executed, open, profitable and loss making trade counts at a step.           |
//! | **`Report`**    | Final counts, profit percent curve, profit factor and drawdown.              |
//!
//! ## Trigger rules
//! | Side     | Stop-loss                          | Target                               |
//! |----------|------------------------------------|--------------------------------------|
//! | **Buy**  | `low <= stop_loss`, exits at `low`  | `high >= target`, exits at `high`    |
//! | **Sell** | `high >= stop_loss`, exits at `high`| `low <= target`, exits at `low`      |
//!
//! The stop-loss is checked first: a candle crossing both triggers closes the order at a loss.
//!
//! ## Getting Started
//! ```rust
//! use std::sync::Arc;
//!
//! use algobt::prelude::*;
//! use chrono::{DateTime, Duration};
//!
//! let candles = (0..3)
//!     .map(|i| {
//!         let price = 100.0 + i as f64 * 5.0;
//!         CandleBuilder::builder()
//!             .open(price)
//!             .high(price + 6.0)
//!             .low(price - 1.0)
//!             .close(price + 5.0)
//!             .time(DateTime::default() + Duration::days(i))
//!             .build()
//!             .unwrap()
//!     })
//!     .collect::<Vec<_>>();
//!
//! let mut backtest = Backtest::new(Arc::from(candles), BacktestOptions::default()).unwrap();
//!
//! backtest
//!     .run(|bt, index, candle| {
//!         if index == 0 {
//!             let close = candle.close();
//!             bt.open_buy(close, 1, Some(close.subpercent(2.0)), Some(close.addpercent(5.0)))?;
//!         }
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let snapshot = backtest.snapshot(None).unwrap();
//! assert_eq!(snapshot.executed_trades, 1);
//! assert_eq!(snapshot.profitable_trades, 1);
//! println!("{}", backtest.report());
//! ```
//!
//! ## Error Handling
//! Orders whose triggers do not bracket the entry price, empty quantities, malformed input data
//! and closing an order twice are reported as [`errors::Error`]. A strategy returning an error
//! stops the run.
//!
//! ## License
//! MIT
#![warn(missing_docs)]

/// Core simulation components: candles, orders, order book and backtest loop.
pub mod engine;

/// Error types for the library.
pub mod errors;

/// Market data sources.
pub mod data;

/// Trade statistics and profit curve.
pub mod stats;

/// Re-exports of commonly used types and traits for convenience.
pub mod prelude {
    pub use super::*;
    pub use crate::data::*;
    pub use crate::engine::*;
    pub use crate::errors::*;
    pub use crate::stats::*;
}

/// Percentage helpers for prices, handy to place triggers around an entry price.
pub trait PercentCalculus {
    /// Returns the value raised by `percent` (e.g. `100.0.addpercent(1.0) == 101.0`).
    fn addpercent(self, percent: Self) -> Self;

    /// Returns the value lowered by `percent`.
    fn subpercent(self, percent: Self) -> Self;

    /// Returns the change from the value to `new`, in percent.
    fn change(self, new: Self) -> Self;
}

impl PercentCalculus for f64 {
    fn addpercent(self, percent: Self) -> Self {
        self + self * percent / 100.0
    }

    fn subpercent(self, percent: Self) -> Self {
        self - self * percent / 100.0
    }

    fn change(self, new: Self) -> Self {
        (new - self) * 100.0 / self
    }
}

#[cfg(test)]
mod percent {
    use super::*;

    #[test]
    fn add() {
        assert_eq!(110.0, 100.0.addpercent(10.0))
    }

    #[test]
    fn sub() {
        assert_eq!(90.0, 100.0.subpercent(10.0))
    }

    #[test]
    fn change() {
        assert_eq!(10.0, 100.0.change(110.0));
        assert_eq!(-6.0, 100.0.change(94.0));
    }
}
