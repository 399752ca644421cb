//! Indicator-math collaborators.
//!
//! The snapshot builder consumes indicators as black boxes through
//! `IndicatorMath`: a price series in, a derived series out, then a rolling
//! percentile rank of the derived series. Undefined values are NaN.
//!
//! `RsiMa` (RSI smoothed by a simple moving average) is the default
//! implementation. ATR and the regime SMA are always computed by the builder
//! because the stop-loss and regime logic depend on them.

pub mod atr;
pub mod percentile;
pub mod rsi;
pub mod sma;
pub mod table;

pub use atr::atr;
pub use percentile::percentile_rank;
pub use rsi::rsi;
pub use sma::sma;
pub use table::build_indicator_table;

use crate::params::LookbackWindows;

/// Pure indicator functions consumed by the snapshot builder.
pub trait IndicatorMath: Send + Sync {
    /// Stable name recorded in snapshot metadata.
    fn name(&self) -> &str;

    /// Map a close-price series to a derived indicator series of equal length.
    fn compute_indicator(&self, prices: &[f64]) -> Vec<f64>;

    /// Rolling percentile rank of `derived` over `window` bars.
    fn compute_percentile_rank(&self, derived: &[f64], window: usize) -> Vec<f64> {
        percentile_rank(derived, window)
    }
}

/// RSI-MA: RSI over `rsi_period`, smoothed by an SMA over `smoothing_period`.
#[derive(Debug, Clone)]
pub struct RsiMa {
    rsi_period: usize,
    smoothing_period: usize,
    name: String,
}

impl RsiMa {
    pub fn new(rsi_period: usize, smoothing_period: usize) -> Self {
        Self {
            rsi_period,
            smoothing_period,
            name: format!("rsi_ma_{rsi_period}_{smoothing_period}"),
        }
    }

    pub fn from_windows(windows: &LookbackWindows) -> Self {
        Self::new(windows.indicator_period, windows.smoothing_period)
    }
}

impl IndicatorMath for RsiMa {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute_indicator(&self, prices: &[f64]) -> Vec<f64> {
        sma(&rsi(prices, self.rsi_period), self.smoothing_period)
    }
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
