//! Relative Strength Index (RSI).
//!
//! Uses Wilder smoothing of average gains and average losses.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! Lookback: period.
//! Edge cases: avg_loss == 0 → RSI = 100; avg_gain == 0 → RSI = 0; both zero → 50.

/// RSI of a close series. NaN until `period` changes are available; a NaN close
/// after the seed invalidates the rest of the series.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 || n < period + 1 {
        return result;
    }

    let mut changes = vec![f64::NAN; n];
    for i in 1..n {
        let (curr, prev) = (closes[i], closes[i - 1]);
        if !curr.is_nan() && !prev.is_nan() {
            changes[i] = curr - prev;
        }
    }

    // Seed: average gain and average loss over first `period` changes
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for &ch in &changes[1..=period] {
        if ch.is_nan() {
            return result;
        }
        if ch > 0.0 {
            avg_gain += ch;
        } else {
            avg_loss -= ch;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result[period] = compute_rsi(avg_gain, avg_loss);

    let alpha = 1.0 / period as f64;
    for i in (period + 1)..n {
        let ch = changes[i];
        if ch.is_nan() {
            return result;
        }
        let gain = ch.max(0.0);
        let loss = (-ch).max(0.0);
        avg_gain = alpha * gain + (1.0 - alpha) * avg_gain;
        avg_loss = alpha * loss + (1.0 - alpha) * avg_loss;
        result[i] = compute_rsi(avg_gain, avg_loss);
    }

    result
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0 // no movement
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn rsi_all_gains() {
        let result = rsi(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0], 3);
        assert_approx(result[3], 100.0, 1e-6);
    }

    #[test]
    fn rsi_all_losses() {
        let result = rsi(&[105.0, 104.0, 103.0, 102.0, 101.0, 100.0], 3);
        assert_approx(result[3], 0.0, 1e-6);
    }

    #[test]
    fn rsi_mixed_seed() {
        // Changes: +0.34, -0.25, -0.48 → avg_gain = 0.34/3, avg_loss = 0.73/3
        let result = rsi(&[44.0, 44.34, 44.09, 43.61, 44.33], 3);
        assert!(result[..3].iter().all(|v| v.is_nan()));
        assert_approx(result[3], 100.0 - 100.0 / (1.0 + 0.34 / 0.73), DEFAULT_EPSILON);
    }

    #[test]
    fn rsi_bounds() {
        let result = rsi(&[100.0, 105.0, 98.0, 110.0, 95.0, 115.0, 90.0, 120.0], 3);
        for (i, &v) in result.iter().enumerate() {
            if !v.is_nan() {
                assert!((0.0..=100.0).contains(&v), "RSI out of bounds at bar {i}: {v}");
            }
        }
    }

    #[test]
    fn rsi_nan_in_seed_window() {
        let result = rsi(&[100.0, 101.0, f64::NAN, 103.0, 104.0], 3);
        assert!(result.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn flat_series_is_fifty() {
        let result = rsi(&[10.0; 6], 3);
        assert_approx(result[5], 50.0, DEFAULT_EPSILON);
    }
}
