//! Statistics of a backtest.
//!
//! This module derives, from the orders of a run:
//! - Trade counts (executed, open, profitable, loss making) as of any step
//! - The running profit percent, one value per step
//! - Profit factor and drawdown of the profit curve

use std::fmt;

use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    engine::{Backtest, Order},
    errors::{Error, Result},
};

/// Trade counts at a point of the timeline.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Orders closed at or before the cutoff.
    pub executed_trades: usize,
    /// Orders entered before the cutoff and not closed yet.
    pub open_trades: usize,
    /// Executed orders with a profit of zero or more.
    pub profitable_trades: usize,
    /// Executed orders with a negative profit.
    pub loss_making_trades: usize,
}

impl Snapshot {
    /// Classifies `orders` as of `cutoff`.
    ///
    /// An order closed at or before `cutoff` is executed. An order entered strictly before
    /// `cutoff` and still open at that time is open. Any other order is left out.
    pub fn at<'a, I>(orders: I, cutoff: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a Order>,
    {
        let mut snapshot = Self::default();
        for order in orders {
            match order.exit() {
                Some(exit) if exit.time() <= cutoff => {
                    snapshot.executed_trades += 1;
                    if exit.profit() >= 0.0 {
                        snapshot.profitable_trades += 1;
                    } else {
                        snapshot.loss_making_trades += 1;
                    }
                }
                _ if order.entry_time() < cutoff => snapshot.open_trades += 1,
                _ => {}
            }
        }
        snapshot
    }

    /// Returns the share of profitable trades among executed ones, in percent.
    pub fn win_rate(&self) -> f64 {
        if self.executed_trades == 0 {
            return 0.0;
        }
        (self.profitable_trades as f64 / self.executed_trades as f64) * 100.0
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Statistics:")?;
        writeln!(f, "---------------------------")?;
        writeln!(f, "Executed trades: {}", self.executed_trades)?;
        writeln!(f, "Open trades: {}", self.open_trades)?;
        writeln!(f, "Profitable trades: {}", self.profitable_trades)?;
        write!(f, "Loss making trades: {}", self.loss_making_trades)
    }
}

/// Running profit percent for every timestamp of `timeline`.
///
/// Each value is the total profit of the orders closed at or before the timestamp, as a
/// percentage of the largest entry price among those orders. `floor` is the denominator
/// while no order has closed. This normalizes the curve; it is not a capital account.
///
/// `closed` must be sorted by exit time, which is how a backtest records them.
pub fn profit_percent_series<I>(closed: &[Order], timeline: I, floor: f64) -> Vec<f64>
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let mut exits = closed
        .iter()
        .filter_map(|order| order.exit().map(|exit| (order.entry_price(), exit)))
        .peekable();
    let mut total_profit = 0.0;
    let mut max_entry_price = floor;

    timeline
        .into_iter()
        .map(|time| {
            while let Some((entry_price, exit)) = exits.next_if(|(_, exit)| exit.time() <= time) {
                total_profit += exit.profit();
                max_entry_price = max_entry_price.max(entry_price);
            }
            100.0 * total_profit / max_entry_price
        })
        .collect()
}

impl Backtest {
    /// Counts trades as of the step `as_of`, or as of the last step when `None`.
    ///
    /// ### Returns
    /// The snapshot, or [`Error::CandleNotFound`] when `as_of` is past the timeline.
    pub fn snapshot(&self, as_of: Option<usize>) -> Result<Snapshot> {
        let index = as_of.unwrap_or(self.candles().len().saturating_sub(1));
        let cutoff = self.candles().nth(index).ok_or(Error::CandleNotFound(index))?.time();
        Ok(Snapshot::at(self.orders(), cutoff))
    }

    /// Returns the running profit percent, one value per step of the timeline.
    pub fn profit_percent_series(&self) -> Vec<f64> {
        profit_percent_series(self.closed_orders(), self.timeline(), self.options().profit_floor)
    }

    /// Returns the report of the whole run.
    pub fn report(&self) -> Report {
        Report::from(self)
    }
}

/// Summary of a backtest.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    snapshot: Snapshot,
    profit_percents: Vec<f64>,
    total_profit: f64,
    gross_profit: f64,
    gross_loss: f64,
}

impl From<&Backtest> for Report {
    fn from(value: &Backtest) -> Self {
        let profits = value.closed_orders().iter().filter_map(Order::profit);
        let (gross_profit, gross_loss) = profits.fold((0.0, 0.0), |(gains, losses), profit| {
            if profit > 0.0 {
                (gains + profit, losses)
            } else {
                (gains, losses - profit)
            }
        });
        let cutoff = value.timeline().last().unwrap_or_default();

        Self {
            snapshot: Snapshot::at(value.orders(), cutoff),
            profit_percents: value.profit_percent_series(),
            total_profit: gross_profit - gross_loss,
            gross_profit,
            gross_loss,
        }
    }
}

impl Report {
    /// Returns the trade counts at the end of the run.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Returns the running profit percent.
    pub fn profit_percents(&self) -> &[f64] {
        &self.profit_percents
    }

    /// Returns the realized profit of the closed orders.
    pub fn total_profit(&self) -> f64 {
        self.total_profit
    }

    /// Returns the last value of the profit percent series.
    pub fn final_profit_percent(&self) -> f64 {
        self.profit_percents.last().copied().unwrap_or_default()
    }

    /// Computes the profit factor: gross gains over gross losses.
    pub fn profit_factor(&self) -> f64 {
        if self.gross_loss == 0.0 {
            return f64::INFINITY;
        }
        self.gross_profit / self.gross_loss
    }

    /// Computes the largest fall of the profit percent curve from a previous peak, in points.
    pub fn max_drawdown(&self) -> f64 {
        let mut peak = f64::NEG_INFINITY;
        let mut max_drawdown = 0.0_f64;
        for &value in &self.profit_percents {
            peak = peak.max(value);
            max_drawdown = max_drawdown.max(peak - value);
        }
        max_drawdown
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Backtest Report ===")?;
        writeln!(f, "{}", self.snapshot)?;
        writeln!(f)?;
        writeln!(f, "Total profit: {:.2}", self.total_profit)?;
        writeln!(f, "Profit percent: {:.2}%", self.final_profit_percent())?;
        writeln!(f, "Max drawdown: {:.2} pts", self.max_drawdown())?;
        writeln!(f, "Profit factor: {:.2}", self.profit_factor())?;
        write!(f, "Win rate: {:.2}%", self.snapshot.win_rate())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::engine::OrderSide;

    fn day(n: i64) -> DateTime<Utc> {
        DateTime::default() + Duration::days(n)
    }

    /// Buy at 100 entered on `entry`, closed on `exit` at `exit_price`.
    fn closed_buy(id: u64, entry: i64, exit: i64, exit_price: f64) -> Order {
        let mut order = Order::new(id.into(), OrderSide::Buy, 100.0, 1, day(entry), Some(90.0), Some(105.0)).unwrap();
        assert!(order.try_close(exit_price.max(100.0), exit_price.min(100.0), day(exit)).unwrap());
        order
    }

    #[test]
    fn snapshot_classifies_orders() {
        let orders = vec![
            closed_buy(0, 0, 1, 106.0),
            closed_buy(1, 1, 2, 107.0),
            closed_buy(2, 1, 3, 89.0),
            Order::new(3.into(), OrderSide::Sell, 100.0, 1, day(2), None, None).unwrap(),
            Order::new(4.into(), OrderSide::Buy, 100.0, 1, day(4), None, None).unwrap(),
        ];

        let snapshot = Snapshot::at(&orders, day(4));
        assert_eq!(
            snapshot,
            Snapshot {
                executed_trades: 3,
                open_trades: 1,
                profitable_trades: 2,
                loss_making_trades: 1,
            }
        );

        // closed at day 2 and 3 are still open on day 1.5, order 3 is not entered yet
        let snapshot = Snapshot::at(&orders, day(1) + Duration::hours(12));
        assert_eq!(snapshot.executed_trades, 1);
        assert_eq!(snapshot.open_trades, 2);
    }

    #[test]
    fn snapshot_display() {
        let snapshot = Snapshot {
            executed_trades: 3,
            open_trades: 1,
            profitable_trades: 2,
            loss_making_trades: 1,
        };
        let text = snapshot.to_string();
        assert!(text.starts_with("Statistics:"));
        assert!(text.contains("Executed trades: 3"));
        assert!(text.contains("Loss making trades: 1"));
    }

    #[test]
    fn win_rate() {
        let snapshot = Snapshot {
            executed_trades: 4,
            profitable_trades: 1,
            ..Default::default()
        };
        assert_eq!(snapshot.win_rate(), 25.0);
        assert_eq!(Snapshot::default().win_rate(), 0.0);
    }

    #[test]
    fn profit_percent_series_accumulates() {
        let closed = vec![closed_buy(0, 0, 1, 106.0), closed_buy(1, 0, 1, 110.0), closed_buy(2, 1, 3, 89.0)];
        let timeline = (0..5).map(day);
        let series = profit_percent_series(&closed, timeline, 1e-10);

        assert_eq!(series.len(), 5);
        assert_eq!(series[0], 0.0);
        assert_eq!(series[1], 16.0);
        assert_eq!(series[2], 16.0);
        assert_eq!(series[3], 5.0);
        assert_eq!(series[4], 5.0);
    }

    #[test]
    fn profit_percent_series_without_orders() {
        let series = profit_percent_series(&[], (0..3).map(day), 1e-10);
        assert_eq!(series, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn report_ratios() {
        let report = Report {
            snapshot: Snapshot::default(),
            profit_percents: vec![0.0, 10.0, 4.0, 12.0, 1.0],
            total_profit: 10.0,
            gross_profit: 20.0,
            gross_loss: 10.0,
        };
        assert_eq!(report.profit_factor(), 2.0);
        assert_eq!(report.max_drawdown(), 11.0);
        assert_eq!(report.final_profit_percent(), 1.0);

        let report = Report {
            gross_loss: 0.0,
            ..report
        };
        assert_eq!(report.profit_factor(), f64::INFINITY);
    }
}
