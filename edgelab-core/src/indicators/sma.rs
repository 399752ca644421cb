//! Simple Moving Average (SMA).
//!
//! Rolling mean over a lookback window. The first valid value is at index
//! `period - 1`; any NaN inside the window yields NaN.

pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 || n < period {
        return result;
    }

    let mut sum = 0.0;
    let mut nan_count = 0usize;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            nan_count += 1;
        } else {
            sum += v;
        }

        if i >= period {
            let leaving = values[i - period];
            if leaving.is_nan() {
                nan_count -= 1;
            } else {
                sum -= leaving;
            }
        }

        if i + 1 >= period && nan_count == 0 {
            result[i] = sum / period as f64;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn sma_basic() {
        let result = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert!(result[0].is_nan() && result[1].is_nan());
        assert_approx(result[2], 2.0, DEFAULT_EPSILON);
        assert_approx(result[3], 3.0, DEFAULT_EPSILON);
        assert_approx(result[4], 4.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_skips_leading_nan() {
        let result = sma(&[f64::NAN, f64::NAN, 3.0, 5.0, 7.0], 2);
        assert!(result[..3].iter().all(|v| v.is_nan()));
        assert_approx(result[3], 4.0, DEFAULT_EPSILON);
        assert_approx(result[4], 6.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_nan_gap_recovers() {
        let result = sma(&[1.0, f64::NAN, 3.0, 5.0, 7.0], 2);
        assert!(result[1].is_nan() && result[2].is_nan());
        assert_approx(result[3], 4.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_period_one_is_identity() {
        assert_eq!(sma(&[1.0, 2.0], 1), vec![1.0, 2.0]);
    }
}
