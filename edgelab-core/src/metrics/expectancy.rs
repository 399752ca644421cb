//! Expectancy with a block-bootstrap confidence interval.
//!
//! `E = win_rate · avg_win + (1 − win_rate) · avg_loss`, in percent per trade.
//! Breakeven trades count as losses. The interval is the empirical
//! `(1 − c)/2` and `(1 + c)/2` percentiles of `E` over block-bootstrap
//! resamples of the trade sequence.

use super::MetricsError;
use crate::domain::Trade;
use crate::params::{BootstrapSettings, CalculationParameters};
use crate::rng::DeterministicRng;
use crate::stats::{mean, percentile_sorted, sorted_copy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub level: f64,
    pub iterations: usize,
    pub block_size: usize,
}

impl ConfidenceInterval {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectancyMetrics {
    pub trade_count: usize,
    pub win_count: usize,
    pub loss_count: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub expectancy: f64,
    pub avg_holding_days: f64,
    /// Expectancy per holding day.
    pub time_normalized: f64,
    pub avg_stop_distance_pct: f64,
    /// Expectancy per unit of stop distance. `None` when no trade carried a stop.
    pub risk_normalized: Option<f64>,
    pub confidence_interval: ConfidenceInterval,
}

/// Win/loss decomposition of a return sample.
#[derive(Debug, Clone, Copy, PartialEq)]
struct WinLoss {
    wins: usize,
    losses: usize,
    win_rate: f64,
    avg_win: f64,
    avg_loss: f64,
}

impl WinLoss {
    fn from_returns<I: IntoIterator<Item = f64>>(returns: I) -> Self {
        let (mut wins, mut losses) = (0usize, 0usize);
        let (mut win_sum, mut loss_sum) = (0.0, 0.0);
        for r in returns {
            if r > 0.0 {
                wins += 1;
                win_sum += r;
            } else {
                losses += 1;
                loss_sum += r;
            }
        }
        let n = wins + losses;
        let avg = |sum: f64, count: usize| if count == 0 { 0.0 } else { sum / count as f64 };
        Self {
            wins,
            losses,
            win_rate: if n == 0 { 0.0 } else { wins as f64 / n as f64 },
            avg_win: avg(win_sum, wins),
            avg_loss: avg(loss_sum, losses),
        }
    }

    fn expectancy(&self) -> f64 {
        self.win_rate * self.avg_win + (1.0 - self.win_rate) * self.avg_loss
    }
}

/// Expectancy of a return sample (percent per trade).
pub fn expectancy_of(returns: &[f64]) -> f64 {
    WinLoss::from_returns(returns.iter().copied()).expectancy()
}

/// Full expectancy metrics for a trade list.
///
/// The caller owns `rng`; passing a freshly seeded generator makes the result
/// bit-identical across runs.
pub fn compute_expectancy(
    trades: &[Trade],
    params: &CalculationParameters,
    rng: &mut DeterministicRng,
) -> Result<ExpectancyMetrics, MetricsError> {
    if trades.is_empty() {
        return Err(MetricsError::InsufficientSample {
            count: 0,
            required: 1,
        });
    }

    let returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();
    let wl = WinLoss::from_returns(returns.iter().copied());
    let expectancy = wl.expectancy();

    let holding: Vec<f64> = trades.iter().map(|t| t.holding_days as f64).collect();
    let avg_holding_days = mean(&holding);
    let time_normalized = if avg_holding_days > 0.0 {
        expectancy / avg_holding_days
    } else {
        0.0
    };

    let stops: Vec<f64> = trades.iter().map(Trade::stop_distance_pct).collect();
    let avg_stop_distance_pct = mean(&stops);
    let risk_normalized =
        (avg_stop_distance_pct > 0.0).then(|| expectancy / avg_stop_distance_pct);

    let confidence_interval = bootstrap_ci(&returns, &params.bootstrap, rng);

    Ok(ExpectancyMetrics {
        trade_count: trades.len(),
        win_count: wl.wins,
        loss_count: wl.losses,
        win_rate: wl.win_rate,
        avg_win: wl.avg_win,
        avg_loss: wl.avg_loss,
        expectancy,
        avg_holding_days,
        time_normalized,
        avg_stop_distance_pct,
        risk_normalized,
        confidence_interval,
    })
}

/// Block-bootstrap percentile interval for the expectancy of `returns`.
pub fn bootstrap_ci(
    returns: &[f64],
    settings: &BootstrapSettings,
    rng: &mut DeterministicRng,
) -> ConfidenceInterval {
    let n = returns.len();
    let mut stats = Vec::with_capacity(settings.iterations);
    for _ in 0..settings.iterations {
        let idx = rng.resample_blocks(n, settings.block_size);
        stats.push(WinLoss::from_returns(idx.into_iter().map(|i| returns[i])).expectancy());
    }
    let sorted = sorted_copy(&stats);
    let c = settings.confidence_level;
    ConfidenceInterval {
        lower: percentile_sorted(&sorted, (1.0 - c) / 2.0 * 100.0),
        upper: percentile_sorted(&sorted, (1.0 + c) / 2.0 * 100.0),
        level: c,
        iterations: settings.iterations,
        block_size: settings.block_size,
    }
}
