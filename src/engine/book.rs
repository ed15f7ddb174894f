use std::collections::{VecDeque, vec_deque::Iter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{Candle, Order, OrderId};
use crate::errors::Result;

/// Open and closed orders of a backtest.
///
/// Open orders keep their insertion order. Closed orders are appended in the order
/// they were closed, so their exit times never decrease.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    open: VecDeque<Order>,
    closed: Vec<Order>,
}

impl OrderBook {
    /// Creates an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an iterator over the open orders, oldest first.
    pub fn open_orders(&self) -> Iter<'_, Order> {
        self.open.iter()
    }

    /// Returns the closed orders in closing order.
    pub fn closed_orders(&self) -> &[Order] {
        &self.closed
    }

    /// Returns the number of orders ever inserted.
    pub fn len(&self) -> usize {
        self.open.len() + self.closed.len()
    }

    /// Returns `true` if no order was ever inserted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finds an order by id, open or closed.
    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.closed.iter().chain(self.open.iter()).find(|o| o.id() == id)
    }

    pub(crate) fn insert(&mut self, order: Order) {
        self.open.push_back(order);
    }

    /// Checks every open order against the candle and moves the triggered ones to the closed list.
    ///
    /// ### Returns
    /// The number of orders closed by this candle.
    pub(crate) fn evaluate(&mut self, candle: &Candle) -> Result<usize> {
        let mut still_open = VecDeque::with_capacity(self.open.len());
        let mut closed = 0;

        while let Some(mut order) = self.open.pop_front() {
            match order.try_close(candle.high(), candle.low(), candle.time()) {
                Ok(true) => {
                    self.closed.push(order);
                    closed += 1;
                }
                Ok(false) => still_open.push_back(order),
                Err(err) => {
                    // restore the open orders in insertion order
                    still_open.push_back(order);
                    still_open.append(&mut self.open);
                    self.open = still_open;
                    return Err(err);
                }
            }
        }

        self.open.append(&mut still_open);
        Ok(closed)
    }

    pub(crate) fn clear(&mut self) {
        self.open.clear();
        self.closed.clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use super::*;
    use crate::engine::{CandleBuilder, OrderSide};

    fn candle(high: f64, low: f64, time: DateTime<Utc>) -> Candle {
        CandleBuilder::builder()
            .open(low)
            .high(high)
            .low(low)
            .close(high)
            .time(time)
            .build()
            .unwrap()
    }

    fn order(id: u64, side: OrderSide, stop_loss: f64, target: f64) -> Order {
        Order::new(id.into(), side, 100.0, 1, DateTime::default(), Some(stop_loss), Some(target)).unwrap()
    }

    #[test]
    fn evaluate_moves_triggered_orders_and_keeps_order_of_the_rest() {
        let mut book = OrderBook::new();
        book.insert(order(1, OrderSide::Buy, 95.0, 120.0));
        book.insert(order(2, OrderSide::Buy, 90.0, 105.0));
        book.insert(order(3, OrderSide::Sell, 115.0, 80.0));
        book.insert(order(4, OrderSide::Buy, 85.0, 106.0));

        let t1 = DateTime::default() + Duration::days(1);
        let closed = book.evaluate(&candle(105.5, 98.0, t1)).unwrap();
        assert_eq!(closed, 1);

        let open_ids = book.open_orders().map(Order::id).collect::<Vec<_>>();
        assert_eq!(open_ids, vec![OrderId::from(1), OrderId::from(3), OrderId::from(4)]);
        assert_eq!(book.closed_orders().len(), 1);
        assert_eq!(book.closed_orders()[0].id(), OrderId::from(2));
        assert_eq!(book.len(), 4);

        let t2 = t1 + Duration::days(1);
        let closed = book.evaluate(&candle(130.0, 70.0, t2)).unwrap();
        assert_eq!(closed, 3);
        assert!(book.open_orders().next().is_none());

        let exit_times = book.closed_orders().iter().filter_map(Order::exit_time).collect::<Vec<_>>();
        assert!(exit_times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn evaluate_error_keeps_every_order_in_the_book() {
        let mut stale = order(2, OrderSide::Buy, 95.0, 120.0);
        stale.try_close(121.0, 99.0, DateTime::default()).unwrap();

        let mut book = OrderBook::new();
        book.insert(order(1, OrderSide::Buy, 95.0, 120.0));
        book.insert(stale);
        book.insert(order(3, OrderSide::Sell, 115.0, 80.0));

        let result = book.evaluate(&candle(101.0, 99.0, DateTime::default() + Duration::days(1)));
        assert!(matches!(result, Err(crate::errors::Error::CloseOnClosedOrder(id)) if id == OrderId::from(2)));

        let open_ids = book.open_orders().map(Order::id).collect::<Vec<_>>();
        assert_eq!(open_ids, vec![OrderId::from(1), OrderId::from(2), OrderId::from(3)]);
        assert!(book.closed_orders().is_empty());
        assert_eq!(book.len(), 3);
    }

    #[test]
    fn get_finds_open_and_closed_orders() {
        let mut book = OrderBook::new();
        book.insert(order(1, OrderSide::Buy, 95.0, 120.0));
        book.insert(order(2, OrderSide::Buy, 99.0, 120.0));
        book.evaluate(&candle(101.0, 98.0, DateTime::default())).unwrap();

        assert!(book.get(1.into()).unwrap().is_open());
        assert!(!book.get(2.into()).unwrap().is_open());
        assert!(book.get(3.into()).is_none());
    }
}
