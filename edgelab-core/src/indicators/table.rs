//! Assemble a per-symbol indicator table from raw bars.

use super::{atr, sma, IndicatorMath};
use crate::domain::{Bar, IndicatorRow, IndicatorTable};
use crate::params::LookbackWindows;

/// Run every indicator over `bars` and zip the results into rows.
///
/// NaN (warm-up or undefined) values become `None`.
pub fn build_indicator_table(
    symbol: &str,
    bars: &[Bar],
    math: &dyn IndicatorMath,
    windows: &LookbackWindows,
) -> IndicatorTable {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let indicator = math.compute_indicator(&closes);
    let percentile = math.compute_percentile_rank(&indicator, windows.percentile_window);
    let atr = atr(bars, windows.atr_period);
    let regime_ma = sma(&closes, windows.regime_window);

    let rows = bars
        .iter()
        .enumerate()
        .map(|(i, b)| IndicatorRow {
            date: b.date,
            open: b.open,
            high: b.high,
            low: b.low,
            close: b.close,
            volume: b.volume,
            indicator: defined(&indicator, i),
            percentile: defined(&percentile, i),
            atr: defined(&atr, i),
            regime_ma: defined(&regime_ma, i),
        })
        .collect();

    IndicatorTable {
        symbol: symbol.to_string(),
        rows,
    }
}

fn defined(series: &[f64], i: usize) -> Option<f64> {
    series.get(i).copied().filter(|v| v.is_finite())
}
