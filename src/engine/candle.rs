use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// One step of market data: open, high, low and close prices at a point of the timeline.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "CandleFields"))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    time: DateTime<Utc>,
}

impl Candle {
    /// Returns the open price.
    pub fn open(&self) -> f64 {
        self.open
    }

    /// Returns the highest price.
    pub fn high(&self) -> f64 {
        self.high
    }

    /// Returns the lowest price.
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Returns the close price.
    pub fn close(&self) -> f64 {
        self.close
    }

    /// Returns the timestamp of the candle.
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Builder for [`Candle`], checking the OHLC invariant on `build`.
#[derive(Debug, Default)]
pub struct CandleBuilder {
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    time: Option<DateTime<Utc>>,
}

impl CandleBuilder {
    /// Starts an empty builder.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Sets the open price.
    pub fn open(mut self, open: f64) -> Self {
        self.open = Some(open);
        self
    }

    /// Sets the highest price.
    pub fn high(mut self, high: f64) -> Self {
        self.high = Some(high);
        self
    }

    /// Sets the lowest price.
    pub fn low(mut self, low: f64) -> Self {
        self.low = Some(low);
        self
    }

    /// Sets the close price.
    pub fn close(mut self, close: f64) -> Self {
        self.close = Some(close);
        self
    }

    /// Sets the timestamp.
    pub fn time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Builds the candle.
    ///
    /// Fails with [`Error::MalformedInput`] when a field is missing and with
    /// [`Error::InvalidCandle`] unless `low <= open, close <= high`.
    pub fn build(self) -> Result<Candle> {
        let missing = |field: &str| Error::MalformedInput(format!("candle field `{field}` is missing"));
        let open = self.open.ok_or_else(|| missing("open"))?;
        let high = self.high.ok_or_else(|| missing("high"))?;
        let low = self.low.ok_or_else(|| missing("low"))?;
        let close = self.close.ok_or_else(|| missing("close"))?;
        let time = self.time.ok_or_else(|| missing("time"))?;

        let finite = [open, high, low, close].iter().all(|p| p.is_finite());
        if !finite || low > high || open < low || open > high || close < low || close > high {
            return Err(Error::InvalidCandle(open, high, low, close));
        }

        Ok(Candle {
            open,
            high,
            low,
            close,
            time,
        })
    }
}

/// Deserialized fields of a [`Candle`], checked through [`CandleBuilder`].
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct CandleFields {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    time: DateTime<Utc>,
}

#[cfg(feature = "serde")]
impl TryFrom<CandleFields> for Candle {
    type Error = Error;

    fn try_from(fields: CandleFields) -> Result<Self> {
        CandleBuilder::builder()
            .open(fields.open)
            .high(fields.high)
            .low(fields.low)
            .close(fields.close)
            .time(fields.time)
            .build()
    }
}

#[cfg(test)]
#[test]
fn build_valid_candle() {
    let candle = CandleBuilder::builder()
        .open(100.0)
        .high(110.0)
        .low(95.0)
        .close(105.0)
        .time(DateTime::default())
        .build()
        .unwrap();

    assert_eq!(candle.open(), 100.0);
    assert_eq!(candle.high(), 110.0);
    assert_eq!(candle.low(), 95.0);
    assert_eq!(candle.close(), 105.0);
    assert_eq!(candle.time(), DateTime::<Utc>::default());
}

#[cfg(test)]
#[test]
fn reject_close_above_high() {
    let result = CandleBuilder::builder()
        .open(100.0)
        .high(110.0)
        .low(95.0)
        .close(111.0)
        .time(DateTime::default())
        .build();
    assert!(matches!(result, Err(Error::InvalidCandle(..))));
}

#[cfg(test)]
#[test]
fn reject_low_above_high() {
    let result = CandleBuilder::builder()
        .open(100.0)
        .high(90.0)
        .low(95.0)
        .close(100.0)
        .time(DateTime::default())
        .build();
    assert!(matches!(result, Err(Error::InvalidCandle(..))));
}

#[cfg(test)]
#[test]
fn reject_missing_time() {
    let result = CandleBuilder::builder().open(1.0).high(1.0).low(1.0).close(1.0).build();
    assert!(matches!(result, Err(Error::MalformedInput(_))));
}

#[cfg(all(test, feature = "serde"))]
#[test]
fn deserialize_checks_ohlc() {
    let candle: Candle =
        serde_json::from_str(r#"{"open":100.0,"high":110.0,"low":95.0,"close":105.0,"time":"2018-01-05T11:25:15Z"}"#)
            .unwrap();
    assert_eq!(candle.high(), 110.0);

    let result = serde_json::from_str::<Candle>(
        r#"{"open":100.0,"high":110.0,"low":95.0,"close":111.0,"time":"2018-01-05T11:25:15Z"}"#,
    );
    assert!(result.is_err());
}
