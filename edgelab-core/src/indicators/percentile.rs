//! Rolling percentile rank.
//!
//! For bar `t` with a full trailing window `[t - window + 1, t]` of valid values,
//! the rank is the share of the other `window - 1` values strictly below
//! `values[t]`, scaled to `[0, 100]`. NaN otherwise.

pub fn percentile_rank(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if window < 2 || n < window {
        return result;
    }

    for t in (window - 1)..n {
        let current = values[t];
        let slice = &values[t + 1 - window..t];
        if current.is_nan() || slice.iter().any(|v| v.is_nan()) {
            continue;
        }
        let below = slice.iter().filter(|&&v| v < current).count();
        result[t] = below as f64 / (window - 1) as f64 * 100.0;
    }

    result
}
