//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! ATR uses Wilder smoothing (EMA with alpha = 1/period), seeded from TR[1..=period].

use crate::domain::Bar;

/// TR[0] = high[0] - low[0]; TR[t] uses the previous close.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let n = bars.len();
    let mut tr = vec![f64::NAN; n];

    if n == 0 {
        return tr;
    }

    let (h, l) = (bars[0].high, bars[0].low);
    if !h.is_nan() && !l.is_nan() {
        tr[0] = h - l;
    }

    for i in 1..n {
        let (h, l, pc) = (bars[i].high, bars[i].low, bars[i - 1].close);
        if !h.is_nan() && !l.is_nan() && !pc.is_nan() {
            tr[i] = (h - l).max((h - pc).abs()).max((l - pc).abs());
        }
    }

    tr
}

/// Apply Wilder smoothing to a series. Alpha = 1/period.
/// Seed: mean of the first `period` consecutive valid values.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 || n < period {
        return result;
    }

    let seed_start = (0..=n - period).find(|&i| values[i..i + period].iter().all(|v| !v.is_nan()));
    let Some(seed_start) = seed_start else {
        return result;
    };

    let seed_end = seed_start + period;
    let mut prev = values[seed_start..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = prev;

    let alpha = 1.0 / period as f64;
    for i in seed_end..n {
        if values[i].is_nan() {
            return result;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }

    result
}

/// ATR over `period` bars. NaN for the first `period` bars.
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    let mut tr = true_range(bars);
    // TR[0] has no previous close; start the seed at TR[1].
    if let Some(first) = tr.first_mut() {
        *first = f64::NAN;
    }
    wilder_smooth(&tr, period)
}
