//! Core simulation components.
//!
//! This module provides the fundamental types for backtesting:
//! - `Candle`: OHLC data for one step of the timeline.
//! - `Order`: A buy or sell position closed by its stop-loss or target trigger.
//! - `OrderBook`: The open and closed orders of a run.
//! - `Backtest`: The engine stepping through the timeline.

mod book;
mod candle;
mod options;
mod order;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    data::DataSource,
    errors::{Error, Result},
};

pub use book::*;
pub use candle::*;
pub use options::*;
pub use order::*;


/// A trading strategy called once per step, after the open orders were checked against the candle.
///
/// The strategy opens orders through [`Backtest::open_buy`] and [`Backtest::open_sell`].
pub trait Strategy {
    /// Reacts to the candle at `index`.
    fn on_step(&mut self, bt: &mut Backtest, index: usize, candle: &Candle) -> Result<()>;
}

impl<F> Strategy for F
where
    F: FnMut(&mut Backtest, usize, &Candle) -> Result<()>,
{
    fn on_step(&mut self, bt: &mut Backtest, index: usize, candle: &Candle) -> Result<()> {
        self(bt, index, candle)
    }
}

/// Backtesting engine for trading strategies.
#[derive(Debug, Clone)]
pub struct Backtest {
    index: usize,
    next_id: u64,
    data: Arc<[Candle]>,
    book: OrderBook,
    options: BacktestOptions,
}

impl Backtest {
    /// Creates a new backtest instance.
    ///
    /// ### Arguments
    /// * `data` - Candles in timeline order.
    /// * `options` - Settings of the run.
    ///
    /// ### Returns
    /// The new backtest instance, [`Error::CandleDataEmpty`] without candles,
    /// or [`Error::MalformedInput`] when the candle times are not strictly increasing.
    ///
    /// ### Example
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use algobt::prelude::*;
    /// use chrono::DateTime;
    ///
    /// let candle = CandleBuilder::builder()
    ///     .open(100.0)
    ///     .high(110.0)
    ///     .low(95.0)
    ///     .close(105.0)
    ///     .time(DateTime::default())
    ///     .build()
    ///     .unwrap();
    ///
    /// let bt = Backtest::new(Arc::from_iter(vec![candle]), BacktestOptions::default()).unwrap();
    /// assert_eq!(bt.index(), 0);
    /// ```
    pub fn new(data: Arc<[Candle]>, options: BacktestOptions) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::CandleDataEmpty);
        }
        if let Some(i) = data.windows(2).position(|w| w[0].time() >= w[1].time()) {
            return Err(Error::MalformedInput(format!(
                "timeline is not strictly increasing at index {}",
                i + 1
            )));
        }

        Ok(Self {
            data,
            options,
            index: 0,
            next_id: 0,
            book: OrderBook::new(),
        })
    }

    /// Creates a backtest from the candles read from `source`.
    pub fn from_source<D>(source: &mut D, options: BacktestOptions) -> Result<Self>
    where
        D: DataSource + ?Sized,
    {
        let candles = source.read()?.into_candles()?;
        Self::new(Arc::from(candles), options)
    }

    /// Returns the settings.
    pub fn options(&self) -> &BacktestOptions {
        &self.options
    }

    /// Returns an iterator over the data.
    pub fn candles(&self) -> std::slice::Iter<'_, Candle> {
        self.data.iter()
    }

    /// Returns an iterator over the timestamps of the timeline.
    pub fn timeline(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.data.iter().map(Candle::time)
    }

    /// Returns the index of the next step to run.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns `true` once every step was run.
    pub fn is_finished(&self) -> bool {
        self.index >= self.data.len()
    }

    /// Returns the candle of the last step run.
    pub fn current(&self) -> Option<&Candle> {
        self.index.checked_sub(1).and_then(|i| self.data.get(i))
    }

    /// Returns the order book.
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    /// Returns an iterator over the open orders.
    pub fn open_orders(&self) -> std::collections::vec_deque::Iter<'_, Order> {
        self.book.open_orders()
    }

    /// Returns the closed orders, in closing order.
    pub fn closed_orders(&self) -> &[Order] {
        self.book.closed_orders()
    }

    /// Returns every order, closed ones first.
    pub fn orders(&self) -> impl Iterator<Item = &Order> + '_ {
        self.book.closed_orders().iter().chain(self.book.open_orders())
    }

    /// Finds an order by id.
    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.book.get(id)
    }

    /// Opens a buy order at the time of the current step.
    ///
    /// ### Arguments
    /// * `entry_price` - The price the position is entered at.
    /// * `quantity` - Number of units.
    /// * `stop_loss` - Optional trigger below the entry price.
    /// * `target` - Optional trigger above the entry price.
    ///
    /// ### Returns
    /// The id of the new order, or the construction error of [`Order::new`].
    pub fn open_buy(
        &mut self,
        entry_price: f64,
        quantity: u64,
        stop_loss: Option<f64>,
        target: Option<f64>,
    ) -> Result<OrderId> {
        self.open_order(OrderSide::Buy, entry_price, quantity, stop_loss, target)
    }

    /// Opens a sell order at the time of the current step.
    ///
    /// The stop loss must be above and the target below the entry price.
    pub fn open_sell(
        &mut self,
        entry_price: f64,
        quantity: u64,
        stop_loss: Option<f64>,
        target: Option<f64>,
    ) -> Result<OrderId> {
        self.open_order(OrderSide::Sell, entry_price, quantity, stop_loss, target)
    }

    /// Opens a buy order with the default quantity of the options.
    pub fn open_buy_default(&mut self, entry_price: f64, stop_loss: Option<f64>, target: Option<f64>) -> Result<OrderId> {
        self.open_buy(entry_price, self.options.default_quantity, stop_loss, target)
    }

    /// Opens a sell order with the default quantity of the options.
    pub fn open_sell_default(&mut self, entry_price: f64, stop_loss: Option<f64>, target: Option<f64>) -> Result<OrderId> {
        self.open_sell(entry_price, self.options.default_quantity, stop_loss, target)
    }

    fn open_order(
        &mut self,
        side: OrderSide,
        entry_price: f64,
        quantity: u64,
        stop_loss: Option<f64>,
        target: Option<f64>,
    ) -> Result<OrderId> {
        let entry_time = self.current().ok_or(Error::CandleNotFound(self.index))?.time();
        let id = OrderId::from(self.next_id);
        let order = Order::new(id, side, entry_price, quantity, entry_time, stop_loss, target)?;
        tracing::debug!(
            %id,
            %side,
            entry_price,
            quantity,
            ?stop_loss,
            ?target,
            "order opened"
        );
        self.next_id += 1;
        self.book.insert(order);
        Ok(id)
    }

    /// Runs one step of the timeline.
    ///
    /// Open orders are checked against the candle at `index` first, then `func` is called
    /// with the same candle and may open new orders. Steps must be run in order, starting at zero.
    ///
    /// ### Returns
    /// Ok if successful, [`Error::StepOutOfOrder`] if `index` is not the next step,
    /// [`Error::Cancelled`] if the cancel token fired, or the error of `func`.
    pub fn step<F>(&mut self, index: usize, mut func: F) -> Result<()>
    where
        F: FnMut(&mut Self, usize, &Candle) -> Result<()>,
    {
        if index != self.index {
            return Err(Error::StepOutOfOrder {
                expected: self.index,
                got: index,
            });
        }
        if self.options.is_cancelled() {
            return Err(Error::Cancelled(index));
        }

        let candle = *self.data.get(index).ok_or(Error::CandleNotFound(index))?;
        let closed = self.book.evaluate(&candle)?;
        tracing::trace!(index, closed, "step");

        self.index += 1;
        func(self, index, &candle)
    }

    /// Runs the backtest, executing the provided function for each candle.
    ///
    /// ### Arguments
    /// * `func` - A closure that takes the backtest, the step index and the current candle.
    ///
    /// ### Returns
    /// Ok if successful, or the first error raised. Orders still open at the end stay open.
    pub fn run<F>(&mut self, mut func: F) -> Result<()>
    where
        F: FnMut(&mut Self, usize, &Candle) -> Result<()>,
    {
        tracing::info!(candles = self.data.len(), from = self.index, "backtest started");
        while self.index < self.data.len() {
            self.step(self.index, &mut func)?;
        }
        tracing::info!(
            orders = self.book.len(),
            closed = self.book.closed_orders().len(),
            open = self.book.len() - self.book.closed_orders().len(),
            "backtest finished"
        );
        Ok(())
    }

    /// Runs the backtest with a [`Strategy`].
    pub fn run_strategy<S>(&mut self, strategy: &mut S) -> Result<()>
    where
        S: Strategy + ?Sized,
    {
        self.run(|bt, index, candle| strategy.on_step(bt, index, candle))
    }

    /// Resets the backtest to its initial state.
    pub fn reset(&mut self) {
        self.index = 0;
        self.next_id = 0;
        self.book.clear();
    }
}
