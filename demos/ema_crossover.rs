//! # EMA crossover with stop-loss and target
//!
//! Buys when the 3-period EMA crosses above the 15-period EMA and sells on the opposite cross.
//! Every order gets a 1% stop-loss and a 0.3% target.
//!
//! Run on synthetic 5-minute candles with `cargo run --example crossover`, or on a JSON
//! file of `{time, open, high, low, close}` records with
//! `cargo run --example crossover --features serde -- data.json`.

use std::cmp::Ordering;

use algobt::prelude::*;
use chrono::Duration;
use ta::{Next, indicators::ExponentialMovingAverage};

struct Crossover {
    fast: ExponentialMovingAverage,
    slow: ExponentialMovingAverage,
    warmup: usize,
    previous: Option<Ordering>,
}

impl Crossover {
    fn new(fast: usize, slow: usize) -> anyhow::Result<Self> {
        Ok(Self {
            fast: ExponentialMovingAverage::new(fast)?,
            slow: ExponentialMovingAverage::new(slow)?,
            // same warm-up as an EMA seeded with the SMA of the first window
            warmup: 2 * slow - 1,
            previous: None,
        })
    }
}

impl Strategy for Crossover {
    fn on_step(&mut self, bt: &mut Backtest, index: usize, candle: &Candle) -> Result<()> {
        let close = candle.close();
        let fast = self.fast.next(close);
        let slow = self.slow.next(close);
        if index < self.warmup {
            return Ok(());
        }

        let Some(current) = fast.partial_cmp(&slow) else {
            return Ok(());
        };
        match self.previous.replace(current) {
            Some(previous) if current > previous => {
                let (stop_loss, target) = (close.subpercent(1.0), close.addpercent(0.3));
                tracing::info!(index, close, stop_loss, target, "crossover, buy");
                bt.open_buy_default(close, Some(stop_loss), Some(target))?;
            }
            Some(previous) if current < previous => {
                let (stop_loss, target) = (close.addpercent(1.0), close.subpercent(0.3));
                tracing::info!(index, close, stop_loss, target, "crossover, sell");
                bt.open_sell_default(close, Some(stop_loss), Some(target))?;
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
fn json_source() -> Option<Box<dyn DataSource>> {
    std::env::args()
        .nth(1)
        .map(|path| Box::new(JsonFile::new(path)) as Box<dyn DataSource>)
}

#[cfg(not(feature = "serde"))]
fn json_source() -> Option<Box<dyn DataSource>> {
    None
}

fn source() -> Box<dyn DataSource> {
    json_source().unwrap_or_else(|| {
        Box::new(
            RandomWalk::new(42, 3_000)
                .start_price(250.0)
                .interval(Duration::minutes(5))
                .volatility(0.4),
        )
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let mut source = source();
    let mut bt = Backtest::from_source(source.as_mut(), BacktestOptions::default())?;
    let mut strategy = Crossover::new(3, 15)?;
    bt.run_strategy(&mut strategy)?;

    // progression of the counts along the timeline
    let steps = bt.candles().len();
    let frame = (steps / 10).max(1);
    for index in (0..steps).step_by(frame).chain([steps - 1]) {
        let snapshot = bt.snapshot(Some(index))?;
        println!(
            "[{index:>5}] executed {:>4} | open {:>3} | win rate {:>6.2}%",
            snapshot.executed_trades,
            snapshot.open_trades,
            snapshot.win_rate()
        );
    }

    println!();
    println!("{}", bt.report());

    Ok(())
}
