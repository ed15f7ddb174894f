//! Data sources feeding a backtest.
//!
//! A source hands over a [`Series`]: a timeline and four aligned price sequences.
//! The series is checked once, before the run starts, and turned into candles.

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    engine::{Candle, CandleBuilder},
    errors::{Error, Result},
};

/// A timeline with its aligned open, close, high and low prices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    /// Timestamps, strictly increasing.
    pub timeline: Vec<DateTime<Utc>>,
    /// Open prices.
    pub open: Vec<f64>,
    /// Close prices.
    pub close: Vec<f64>,
    /// Highest prices.
    pub high: Vec<f64>,
    /// Lowest prices.
    pub low: Vec<f64>,
}

impl Series {
    /// Returns the number of steps of the timeline.
    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    /// Returns `true` if the timeline is empty.
    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    /// Checks the series and zips it into candles.
    ///
    /// ### Returns
    /// The candles, [`Error::CandleDataEmpty`] for an empty timeline, [`Error::MalformedInput`]
    /// when the sequences differ in length or the timeline is not strictly increasing,
    /// or [`Error::InvalidCandle`] for a candle outside its own high and low.
    pub fn into_candles(self) -> Result<Vec<Candle>> {
        let n = self.timeline.len();
        if n == 0 {
            return Err(Error::CandleDataEmpty);
        }
        for (name, len) in [
            ("open", self.open.len()),
            ("close", self.close.len()),
            ("high", self.high.len()),
            ("low", self.low.len()),
        ] {
            if len != n {
                return Err(Error::MalformedInput(format!(
                    "{name} has {len} values, timeline has {n}"
                )));
            }
        }
        if let Some(i) = self.timeline.windows(2).position(|w| w[0] >= w[1]) {
            return Err(Error::MalformedInput(format!(
                "timeline is not strictly increasing at index {}",
                i + 1
            )));
        }

        (0..n)
            .map(|i| {
                CandleBuilder::builder()
                    .open(self.open[i])
                    .high(self.high[i])
                    .low(self.low[i])
                    .close(self.close[i])
                    .time(self.timeline[i])
                    .build()
            })
            .collect()
    }
}

impl FromIterator<Candle> for Series {
    fn from_iter<I: IntoIterator<Item = Candle>>(iter: I) -> Self {
        let mut series = Series::default();
        for candle in iter {
            series.timeline.push(candle.time());
            series.open.push(candle.open());
            series.close.push(candle.close());
            series.high.push(candle.high());
            series.low.push(candle.low());
        }
        series
    }
}

/// Supplies the market data of a backtest.
pub trait DataSource {
    /// Reads the whole series.
    fn read(&mut self) -> Result<Series>;
}

impl DataSource for Series {
    fn read(&mut self) -> Result<Series> {
        Ok(self.clone())
    }
}

/// Seeded random walk producing synthetic candles.
#[derive(Debug, Clone)]
pub struct RandomWalk {
    seed: u64,
    len: usize,
    start_price: f64,
    start_time: DateTime<Utc>,
    interval: Duration,
    volatility: f64,
}

impl RandomWalk {
    /// Creates a walk of `len` daily candles starting at 100.0 with 1% volatility.
    pub fn new(seed: u64, len: usize) -> Self {
        Self {
            seed,
            len,
            start_price: 100.0,
            start_time: DateTime::default(),
            interval: Duration::days(1),
            volatility: 1.0,
        }
    }

    /// Sets the open price of the first candle.
    pub fn start_price(mut self, price: f64) -> Self {
        self.start_price = price;
        self
    }

    /// Sets the time of the first candle.
    pub fn start_time(mut self, time: DateTime<Utc>) -> Self {
        self.start_time = time;
        self
    }

    /// Sets the time between two candles.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the largest move of one candle, in percent (clamped to `0..=50`).
    pub fn volatility(mut self, percent: f64) -> Self {
        self.volatility = percent.clamp(0.0, 50.0);
        self
    }
}

impl DataSource for RandomWalk {
    fn read(&mut self) -> Result<Series> {
        if self.start_price <= 0.0 || !self.start_price.is_finite() {
            return Err(Error::InvalidPrice(self.start_price));
        }
        if self.interval <= Duration::zero() {
            return Err(Error::MalformedInput("random walk interval must be positive".to_string()));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let vol = self.volatility / 100.0;
        let mut series = Series::default();
        let mut price = self.start_price;
        let mut time = self.start_time;

        for _ in 0..self.len {
            let open = price;
            let close = open * (1.0 + (rng.random::<f64>() * 2.0 - 1.0) * vol);
            let high = open.max(close) * (1.0 + rng.random::<f64>() * vol);
            let low = open.min(close) * (1.0 - rng.random::<f64>() * vol);

            series.timeline.push(time);
            series.open.push(open);
            series.close.push(close);
            series.high.push(high);
            series.low.push(low);

            price = close;
            time += self.interval;
        }

        Ok(series)
    }
}

#[cfg(feature = "serde")]
mod json {
    use std::{fs::File, io::BufReader, path::PathBuf};

    use chrono::{DateTime, Utc, serde::ts_milliseconds};
    use serde::Deserialize;

    use super::{DataSource, Series};
    use crate::errors::Result;

    // { "time": 1759813200000, "open_price": 124499.99, "high_price": 124640.76, ... }
    #[derive(Debug, Deserialize)]
    struct Record {
        #[serde(with = "ts_milliseconds", alias = "open_time")]
        time: DateTime<Utc>,
        #[serde(alias = "open_price")]
        open: f64,
        #[serde(alias = "high_price")]
        high: f64,
        #[serde(alias = "low_price")]
        low: f64,
        #[serde(alias = "close_price")]
        close: f64,
    }

    /// JSON file holding an array of `{time, open, high, low, close}` records,
    /// `time` being a Unix timestamp in milliseconds.
    #[derive(Debug, Clone)]
    pub struct JsonFile {
        path: PathBuf,
    }

    impl JsonFile {
        /// Points to the file at `path`.
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }

        /// Parses records from any reader.
        pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Series> {
            let records: Vec<Record> = serde_json::from_reader(reader)?;
            let mut series = Series::default();
            for record in records {
                series.timeline.push(record.time);
                series.open.push(record.open);
                series.close.push(record.close);
                series.high.push(record.high);
                series.low.push(record.low);
            }
            Ok(series)
        }
    }

    impl DataSource for JsonFile {
        fn read(&mut self) -> Result<Series> {
            let file = File::open(&self.path)?;
            Self::from_reader(BufReader::new(file))
        }
    }
}

#[cfg(feature = "serde")]
pub use json::JsonFile;

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> Series {
        let t0 = DateTime::<Utc>::default();
        Series {
            timeline: vec![t0, t0 + Duration::days(1), t0 + Duration::days(2)],
            open: vec![100.0, 101.0, 102.0],
            close: vec![101.0, 102.0, 101.5],
            high: vec![101.5, 103.0, 102.5],
            low: vec![99.5, 100.5, 101.0],
        }
    }

    #[test]
    fn series_into_candles() {
        let candles = series().into_candles().unwrap();
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[1].high(), 103.0);
        assert_eq!(candles[2].close(), 101.5);
        assert_eq!(Series::from_iter(candles), series());
    }

    #[test]
    fn reject_misaligned_series() {
        let mut data = series();
        data.high.pop();
        assert!(matches!(data.into_candles(), Err(Error::MalformedInput(_))));
    }

    #[test]
    fn reject_repeated_timestamp() {
        let mut data = series();
        data.timeline[2] = data.timeline[1];
        assert!(matches!(data.into_candles(), Err(Error::MalformedInput(_))));
    }

    #[test]
    fn reject_empty_series() {
        assert!(matches!(Series::default().into_candles(), Err(Error::CandleDataEmpty)));
    }

    #[test]
    fn reject_candle_outside_its_range() {
        let mut data = series();
        data.close[0] = 200.0;
        assert!(matches!(data.into_candles(), Err(Error::InvalidCandle(..))));
    }

    #[test]
    fn random_walk_is_deterministic_and_valid() {
        let a = RandomWalk::new(7, 250).volatility(2.0).read().unwrap();
        let b = RandomWalk::new(7, 250).volatility(2.0).read().unwrap();
        let c = RandomWalk::new(8, 250).volatility(2.0).read().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let candles = a.into_candles().unwrap();
        assert_eq!(candles.len(), 250);
        assert!(candles.windows(2).all(|w| w[0].close() == w[1].open()));
    }

    #[test]
    fn random_walk_rejects_bad_start_price() {
        let result = RandomWalk::new(1, 10).start_price(0.0).read();
        assert!(matches!(result, Err(Error::InvalidPrice(_))));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_records() {
        let json = br#"[
            { "time": 1000, "open": 10.0, "high": 12.0, "low": 9.0, "close": 11.0 },
            { "open_time": 2000, "open_price": 11.0, "high_price": 13.0, "low_price": 10.5, "close_price": 12.5 }
        ]"#;
        let series = JsonFile::from_reader(&json[..]).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.close, vec![11.0, 12.5]);
        assert_eq!(series.timeline[1].timestamp_millis(), 2000);
        assert!(series.into_candles().is_ok());
    }
}
