//! Stop-loss distance, computed once at entry and held for the life of the trade.

use crate::domain::IndicatorRow;
use crate::params::StopLossMethod;
use crate::stats::{percentile_sorted, sorted_copy};

/// Stop distance in price units for a position opened at `entry_index`.
///
/// `None` when the method cannot produce a positive, finite distance at that
/// bar (ATR still warming up, too little history for the robust estimate, flat
/// prices). The engine does not enter in that case.
pub fn stop_distance(
    method: &StopLossMethod,
    rows: &[IndicatorRow],
    entry_index: usize,
    construction_window: usize,
) -> Option<f64> {
    let entry = rows.get(entry_index)?;
    let distance = match method {
        StopLossMethod::Fixed { percent } => entry.close * percent / 100.0,
        StopLossMethod::Atr { multiplier } => multiplier * entry.atr?,
        StopLossMethod::Robust {
            multiplier,
            confidence,
        } => {
            let returns = trailing_returns(rows, entry_index, construction_window);
            if returns.len() < 2 {
                return None;
            }
            let sorted = sorted_copy(&returns);
            let tail = percentile_sorted(&sorted, (1.0 - confidence) * 100.0);
            multiplier * tail.abs() * entry.close
        }
    };
    (distance.is_finite() && distance > 0.0).then_some(distance)
}

/// Close-to-close fractional returns over the `window` bars ending at `end`.
fn trailing_returns(rows: &[IndicatorRow], end: usize, window: usize) -> Vec<f64> {
    let start = end.saturating_sub(window);
    rows[start..=end]
        .windows(2)
        .filter(|w| w[0].close > 0.0)
        .map(|w| w[1].close / w[0].close - 1.0)
        .collect()
}
