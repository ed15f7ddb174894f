use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Smallest denominator used for the profit percent series.
pub const DEFAULT_PROFIT_FLOOR: f64 = 1e-10;

/// Shared flag to stop a running backtest between two steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the backtest to stop before its next step.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once [`CancelToken::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Settings of a backtest.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone)]
pub struct BacktestOptions {
    /// Floor of the denominator of the profit percent series.
    pub(crate) profit_floor: f64,
    /// Quantity used by `open_buy_default` and `open_sell_default`.
    pub(crate) default_quantity: u64,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) cancel: Option<CancelToken>,
}

impl Default for BacktestOptions {
    fn default() -> Self {
        Self {
            profit_floor: DEFAULT_PROFIT_FLOOR,
            default_quantity: 1,
            cancel: None,
        }
    }
}

impl BacktestOptions {
    /// Sets the floor of the profit percent denominator.
    ///
    /// Non-positive or non-finite values fall back to [`DEFAULT_PROFIT_FLOOR`].
    pub fn profit_floor(mut self, floor: f64) -> Self {
        self.profit_floor = if floor > 0.0 && floor.is_finite() {
            floor
        } else {
            DEFAULT_PROFIT_FLOOR
        };
        self
    }

    /// Sets the quantity of orders opened without an explicit one.
    pub fn default_quantity(mut self, quantity: u64) -> Self {
        self.default_quantity = quantity;
        self
    }

    /// Attaches a cancellation token checked before every step.
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Reads options from a JSON document. Missing fields keep their default.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> crate::errors::Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        let floor = options.profit_floor;
        Ok(options.profit_floor(floor))
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

#[cfg(test)]
#[test]
fn default_options() {
    let options = BacktestOptions::default();
    assert_eq!(options.profit_floor, DEFAULT_PROFIT_FLOOR);
    assert_eq!(options.default_quantity, 1);
    assert!(!options.is_cancelled());
}

#[cfg(test)]
#[test]
fn invalid_profit_floor_falls_back_to_default() {
    let options = BacktestOptions::default().profit_floor(-1.0);
    assert_eq!(options.profit_floor, DEFAULT_PROFIT_FLOOR);
    let options = BacktestOptions::default().profit_floor(0.5);
    assert_eq!(options.profit_floor, 0.5);
}

#[cfg(test)]
#[test]
fn cancel_token_is_shared() {
    let token = CancelToken::new();
    let options = BacktestOptions::default().cancel_token(token.clone());
    assert!(!options.is_cancelled());
    token.cancel();
    assert!(options.is_cancelled());
}

#[cfg(all(test, feature = "serde"))]
#[test]
fn options_from_json() {
    let options = BacktestOptions::from_json(r#"{ "default_quantity": 5 }"#).unwrap();
    assert_eq!(options.default_quantity, 5);
    assert_eq!(options.profit_floor, DEFAULT_PROFIT_FLOOR);
}
