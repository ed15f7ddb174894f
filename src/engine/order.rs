use std::fmt;

use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Identifier of an order, unique within one backtest.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(u64);

impl From<u64> for OrderId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Represents the side of an order (buy or sell).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    /// Profits when the price goes up.
    Buy,
    /// Profits when the price goes down.
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("buy"),
            Self::Sell => f.write_str("sell"),
        }
    }
}

/// The price threshold that closed an order.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Loss-limiting threshold.
    StopLoss,
    /// Profit-taking threshold.
    Target,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopLoss => f.write_str("stop loss"),
            Self::Target => f.write_str("target"),
        }
    }
}

/// Exit details, fixed once the order is closed.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exit {
    price: f64,
    time: DateTime<Utc>,
    trigger: Trigger,
    profit: f64,
    profit_percent: f64,
}

impl Exit {
    /// Returns the exit price.
    pub fn price(&self) -> f64 {
        self.price
    }

    /// Returns the exit time.
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Returns the trigger that closed the order.
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// Returns the realized profit (negative for a loss).
    pub fn profit(&self) -> f64 {
        self.profit
    }

    /// Returns the realized profit relative to the invested amount, in percent.
    pub fn profit_percent(&self) -> f64 {
        self.profit_percent
    }
}

/// Lifecycle of an order. `Closed` is terminal.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderState {
    /// Waiting for a trigger.
    Open,
    /// Closed by a trigger.
    Closed(Exit),
}

/// A buy or sell position with its optional stop-loss and target triggers.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Order {
    id: OrderId,
    side: OrderSide,
    entry_price: f64,
    quantity: u64,
    entry_time: DateTime<Utc>,
    stop_loss: Option<f64>,
    target: Option<f64>,
    state: OrderState,
}

impl PartialEq for Order {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

fn check_price(price: f64) -> Result<f64> {
    if price <= 0.0 || !price.is_finite() {
        return Err(Error::InvalidPrice(price));
    }
    Ok(price)
}

impl Order {
    /// Creates an open order.
    ///
    /// ### Arguments
    /// * `id` - Identifier of the order.
    /// * `side` - Buy or sell.
    /// * `entry_price` - The price the position was entered at.
    /// * `quantity` - Number of units, at least one.
    /// * `entry_time` - The moment the position was entered.
    /// * `stop_loss` - Optional loss-limiting trigger.
    /// * `target` - Optional profit-taking trigger.
    ///
    /// ### Returns
    /// The order, or [`Error::InvalidQuantity`], [`Error::InvalidPrice`] or
    /// [`Error::InvalidTriggerConfiguration`] when the triggers do not bracket the entry price:
    /// `stop_loss < entry_price < target` for a buy, `target < entry_price < stop_loss` for a sell.
    pub fn new(
        id: OrderId,
        side: OrderSide,
        entry_price: f64,
        quantity: u64,
        entry_time: DateTime<Utc>,
        stop_loss: Option<f64>,
        target: Option<f64>,
    ) -> Result<Self> {
        if quantity == 0 {
            return Err(Error::InvalidQuantity(quantity));
        }
        check_price(entry_price)?;
        let stop_loss = stop_loss.map(check_price).transpose()?;
        let target = target.map(check_price).transpose()?;

        let valid = match side {
            OrderSide::Buy => {
                stop_loss.is_none_or(|sl| sl < entry_price) && target.is_none_or(|tg| tg > entry_price)
            }
            OrderSide::Sell => {
                stop_loss.is_none_or(|sl| sl > entry_price) && target.is_none_or(|tg| tg < entry_price)
            }
        };
        if !valid {
            return Err(Error::InvalidTriggerConfiguration {
                side,
                entry_price,
                stop_loss,
                target,
            });
        }

        Ok(Self {
            id,
            side,
            entry_price,
            quantity,
            entry_time,
            stop_loss,
            target,
            state: OrderState::Open,
        })
    }

    /// Returns the identifier.
    pub fn id(&self) -> OrderId {
        self.id
    }

    /// Returns the side.
    pub fn side(&self) -> OrderSide {
        self.side
    }

    /// Returns the entry price.
    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    /// Returns the quantity.
    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    /// Returns the entry time.
    pub fn entry_time(&self) -> DateTime<Utc> {
        self.entry_time
    }

    /// Returns the stop-loss trigger, if any.
    pub fn stop_loss(&self) -> Option<f64> {
        self.stop_loss
    }

    /// Returns the target trigger, if any.
    pub fn target(&self) -> Option<f64> {
        self.target
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> &OrderState {
        &self.state
    }

    /// Returns `true` while no trigger has closed the order.
    pub fn is_open(&self) -> bool {
        matches!(self.state, OrderState::Open)
    }

    /// Returns the exit details once closed.
    pub fn exit(&self) -> Option<&Exit> {
        match &self.state {
            OrderState::Open => None,
            OrderState::Closed(exit) => Some(exit),
        }
    }

    /// Returns the exit price once closed.
    pub fn exit_price(&self) -> Option<f64> {
        self.exit().map(Exit::price)
    }

    /// Returns the exit time once closed.
    pub fn exit_time(&self) -> Option<DateTime<Utc>> {
        self.exit().map(Exit::time)
    }

    /// Returns the realized profit once closed.
    pub fn profit(&self) -> Option<f64> {
        self.exit().map(Exit::profit)
    }

    /// Returns the realized profit in percent once closed.
    pub fn profit_percent(&self) -> Option<f64> {
        self.exit().map(Exit::profit_percent)
    }

    /// Checks the triggers against a candle and closes the order when one is crossed.
    ///
    /// The stop loss is checked first, so a candle crossing both triggers closes at a loss.
    /// A buy closes at `candle_low` on its stop loss and at `candle_high` on its target;
    /// a sell closes at `candle_high` on its stop loss and at `candle_low` on its target.
    ///
    /// ### Returns
    /// `true` if the order was closed by this call, `false` if it stays open,
    /// or [`Error::CloseOnClosedOrder`] when the order is already closed (its exit is left untouched).
    pub fn try_close(&mut self, candle_high: f64, candle_low: f64, time: DateTime<Utc>) -> Result<bool> {
        if !self.is_open() {
            return Err(Error::CloseOnClosedOrder(self.id));
        }

        let hit = match self.side {
            OrderSide::Buy => {
                if self.stop_loss.is_some_and(|sl| candle_low <= sl) {
                    Some((candle_low, Trigger::StopLoss))
                } else if self.target.is_some_and(|tg| candle_high >= tg) {
                    Some((candle_high, Trigger::Target))
                } else {
                    None
                }
            }
            OrderSide::Sell => {
                if self.stop_loss.is_some_and(|sl| candle_high >= sl) {
                    Some((candle_high, Trigger::StopLoss))
                } else if self.target.is_some_and(|tg| candle_low <= tg) {
                    Some((candle_low, Trigger::Target))
                } else {
                    None
                }
            }
        };

        match hit {
            Some((price, trigger)) => {
                self.close(price, time, trigger);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns the profit of the order if it were closed at `exit_price`.
    pub fn estimate_profit(&self, exit_price: f64) -> f64 {
        let quantity = self.quantity as f64;
        match self.side {
            OrderSide::Buy => (exit_price - self.entry_price) * quantity,
            OrderSide::Sell => (self.entry_price - exit_price) * quantity,
        }
    }

    fn close(&mut self, price: f64, time: DateTime<Utc>, trigger: Trigger) {
        let profit = self.estimate_profit(price);
        let profit_percent = 100.0 * profit / (self.quantity as f64 * self.entry_price);
        self.state = OrderState::Closed(Exit {
            price,
            time,
            trigger,
            profit,
            profit_percent,
        });
        tracing::debug!(
            id = %self.id,
            side = %self.side,
            %trigger,
            quantity = self.quantity,
            price,
            profit_percent,
            "order closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy(stop_loss: Option<f64>, target: Option<f64>) -> Result<Order> {
        Order::new(OrderId(1), OrderSide::Buy, 100.0, 2, DateTime::default(), stop_loss, target)
    }

    fn sell(stop_loss: Option<f64>, target: Option<f64>) -> Result<Order> {
        Order::new(OrderId(2), OrderSide::Sell, 100.0, 2, DateTime::default(), stop_loss, target)
    }

    #[test]
    fn create_order_without_triggers() {
        let order = buy(None, None).unwrap();
        assert_eq!(order.entry_price(), 100.0);
        assert_eq!(order.quantity(), 2);
        assert!(order.is_open());
        assert!(order.exit().is_none());
        assert!(order.profit().is_none());
    }

    #[test]
    fn reject_buy_with_stop_loss_above_entry() {
        let result = buy(Some(100.0), Some(110.0));
        assert!(matches!(result, Err(Error::InvalidTriggerConfiguration { .. })));
    }

    #[test]
    fn reject_buy_with_target_below_entry() {
        let result = buy(Some(95.0), Some(99.0));
        assert!(matches!(result, Err(Error::InvalidTriggerConfiguration { .. })));
    }

    #[test]
    fn reject_sell_with_inverted_triggers() {
        assert!(matches!(
            sell(Some(95.0), None),
            Err(Error::InvalidTriggerConfiguration { .. })
        ));
        assert!(matches!(
            sell(None, Some(105.0)),
            Err(Error::InvalidTriggerConfiguration { .. })
        ));
        assert!(sell(Some(105.0), Some(90.0)).is_ok());
    }

    #[test]
    fn reject_zero_quantity() {
        let result = Order::new(OrderId(1), OrderSide::Buy, 100.0, 0, DateTime::default(), None, None);
        assert!(matches!(result, Err(Error::InvalidQuantity(0))));
    }

    #[test]
    fn reject_non_finite_prices() {
        let result = Order::new(OrderId(1), OrderSide::Buy, f64::NAN, 1, DateTime::default(), None, None);
        assert!(matches!(result, Err(Error::InvalidPrice(_))));
        assert!(matches!(buy(Some(-1.0), None), Err(Error::InvalidPrice(_))));
    }

    #[test]
    fn buy_stop_loss_wins_over_target() {
        let mut order = buy(Some(95.0), Some(110.0)).unwrap();
        assert!(order.try_close(112.0, 94.0, DateTime::default()).unwrap());
        let exit = order.exit().unwrap();
        assert_eq!(exit.price(), 94.0);
        assert_eq!(exit.trigger(), Trigger::StopLoss);
        assert_eq!(exit.profit(), (94.0 - 100.0) * 2.0);
        assert_eq!(exit.profit_percent(), -6.0);
    }

    #[test]
    fn buy_target_hit() {
        let mut order = buy(Some(95.0), Some(110.0)).unwrap();
        assert!(order.try_close(111.0, 97.0, DateTime::default()).unwrap());
        assert_eq!(order.exit_price(), Some(111.0));
        assert_eq!(order.profit(), Some(22.0));
        assert_eq!(order.profit_percent(), Some(11.0));
    }

    #[test]
    fn sell_triggers() {
        let mut order = sell(Some(105.0), Some(90.0)).unwrap();
        assert!(!order.try_close(103.0, 92.0, DateTime::default()).unwrap());
        assert!(order.is_open());

        assert!(order.try_close(104.0, 89.0, DateTime::default()).unwrap());
        assert_eq!(order.exit_price(), Some(89.0));
        assert_eq!(order.profit(), Some(22.0));

        let mut order = sell(Some(105.0), Some(90.0)).unwrap();
        assert!(order.try_close(106.0, 89.0, DateTime::default()).unwrap());
        assert_eq!(order.exit().unwrap().trigger(), Trigger::StopLoss);
        assert_eq!(order.profit(), Some(-12.0));
    }

    #[test]
    fn order_without_triggers_never_closes() {
        let mut order = buy(None, None).unwrap();
        assert!(!order.try_close(1_000.0, 1.0, DateTime::default()).unwrap());
        assert!(order.is_open());
    }

    #[test]
    fn close_twice_is_an_error_and_keeps_exit() {
        let mut order = buy(Some(95.0), Some(110.0)).unwrap();
        assert!(order.try_close(111.0, 97.0, DateTime::default()).unwrap());
        let exit = *order.exit().unwrap();

        let result = order.try_close(200.0, 1.0, DateTime::default());
        assert!(matches!(result, Err(Error::CloseOnClosedOrder(id)) if id == OrderId(1)));
        assert_eq!(order.exit(), Some(&exit));
    }

    #[test]
    fn order_equality() {
        let order1 = buy(None, None).unwrap();
        let order2 = sell(None, None).unwrap();
        assert_ne!(order1, order2);
        assert_eq!(order1, order1.clone());
    }
}
