//! Integration tests for metrics over constructed trades.
//!
//! Tests:
//! 1. Determinism of every metric kind from a fresh seed
//! 2. Bootstrap interval behaviour: stability across seeds, narrowing with sample size
//! 3. Regime breakdown consistency with the trade list
//! 4. A hand-computed ten-trade sample

use chrono::NaiveDate;
use edgelab_core::domain::{ExitReason, Regime, Trade};
use edgelab_core::metrics::{
    bootstrap_ci, compute_metric, expectancy_of, MetricKind, MetricsError, MetricsRecord,
};
use edgelab_core::params::{BootstrapSettings, CalculationParameters};
use edgelab_core::rng::DeterministicRng;

fn make_trade(i: usize, return_pct: f64, regime: Option<Regime>) -> Trade {
    let entry_date = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap() + chrono::Duration::days(i as i64);
    Trade {
        symbol: "SPY".into(),
        entry_index: i,
        entry_date,
        entry_price: 100.0,
        entry_percentile: 8.0,
        entry_regime: regime,
        exit_index: i + 3,
        exit_date: entry_date + chrono::Duration::days(3),
        exit_price: 100.0 + return_pct,
        exit_percentile: Some(55.0),
        exit_reason: ExitReason::TargetHit,
        holding_days: 3,
        bars_held: 3,
        return_pct,
        stop_distance: 1.5,
        truncated: false,
    }
}

/// Deterministic pseudo-random returns in roughly [-5, 6].
fn sample_returns(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = DeterministicRng::new(seed);
    (0..n).map(|_| rng.next_uniform() * 11.0 - 5.0).collect()
}

fn trades_from(returns: &[f64]) -> Vec<Trade> {
    returns
        .iter()
        .enumerate()
        .map(|(i, &r)| {
            let regime = match i % 3 {
                0 => Some(Regime::Uptrend),
                1 => Some(Regime::Downtrend),
                _ => None,
            };
            make_trade(i, r, regime)
        })
        .collect()
}

// ── 1. Determinism ───────────────────────────────────────────────────

#[test]
fn every_kind_is_bit_identical_across_runs() {
    let trades = trades_from(&sample_returns(80, 3));
    let params = CalculationParameters::default();
    for kind in MetricKind::ALL {
        let a = serde_json::to_string(&compute_metric(kind, &trades, &params).unwrap()).unwrap();
        let b = serde_json::to_string(&compute_metric(kind, &trades, &params).unwrap()).unwrap();
        assert_eq!(a, b, "{kind} not reproducible");
    }
}

#[test]
fn empty_trade_list_is_insufficient_for_every_kind() {
    let params = CalculationParameters::default();
    for kind in MetricKind::ALL {
        assert_eq!(
            compute_metric(kind, &[], &params),
            Err(MetricsError::InsufficientSample {
                count: 0,
                required: 1
            })
        );
    }
}

// ── 2. Bootstrap interval ────────────────────────────────────────────

fn ci_spread_across_seeds(returns: &[f64], iterations: usize) -> f64 {
    let lowers: Vec<f64> = (0..8u64)
        .map(|seed| {
            let settings = BootstrapSettings {
                iterations,
                seed,
                ..BootstrapSettings::default()
            };
            bootstrap_ci(returns, &settings, &mut DeterministicRng::new(seed)).lower
        })
        .collect();
    let max = lowers.iter().cloned().fold(f64::MIN, f64::max);
    let min = lowers.iter().cloned().fold(f64::MAX, f64::min);
    max - min
}

#[test]
fn ci_estimate_stabilizes_with_more_iterations() {
    let returns = sample_returns(120, 11);
    let coarse = ci_spread_across_seeds(&returns, 100);
    let fine = ci_spread_across_seeds(&returns, 10_000);
    assert!(
        fine < coarse,
        "10k-iteration spread {fine} should be below 100-iteration spread {coarse}"
    );
}

#[test]
fn ci_narrows_as_sample_grows() {
    let settings = BootstrapSettings {
        iterations: 2_000,
        ..BootstrapSettings::default()
    };
    let small = sample_returns(20, 5);
    let large = sample_returns(500, 5);
    let w_small = bootstrap_ci(&small, &settings, &mut DeterministicRng::new(1)).width();
    let w_large = bootstrap_ci(&large, &settings, &mut DeterministicRng::new(1)).width();
    assert!(w_large < w_small, "width {w_large} (n=500) vs {w_small} (n=20)");
}

#[test]
fn ci_brackets_point_estimate() {
    let returns = sample_returns(200, 17);
    let trades = trades_from(&returns);
    let params = CalculationParameters::default();
    let MetricsRecord::Expectancy(m) =
        compute_metric(MetricKind::Expectancy, &trades, &params).unwrap()
    else {
        panic!("expected expectancy record");
    };
    assert!((m.expectancy - expectancy_of(&returns)).abs() < 1e-12);
    assert!(m.confidence_interval.lower <= m.expectancy);
    assert!(m.confidence_interval.upper >= m.expectancy);
    assert_eq!(m.confidence_interval.iterations, params.bootstrap.iterations);
}

// ── 3. Regime breakdown ──────────────────────────────────────────────

#[test]
fn regime_groups_partition_trades() {
    let trades = trades_from(&sample_returns(90, 23));
    let params = CalculationParameters::default();
    let MetricsRecord::Regime(b) = compute_metric(MetricKind::Regime, &trades, &params).unwrap()
    else {
        panic!("expected regime record");
    };
    let total: usize = b.groups.iter().map(|g| g.metrics.trade_count).sum();
    assert_eq!(total, trades.len());
    let labels: Vec<&str> = b.groups.iter().map(|g| g.regime.as_str()).collect();
    assert_eq!(labels, vec!["uptrend", "downtrend", "unclassified"]);
}

#[test]
fn composite_reuses_expectancy_stream() {
    let trades = trades_from(&sample_returns(60, 29));
    let params = CalculationParameters::default();
    let MetricsRecord::Expectancy(e) =
        compute_metric(MetricKind::Expectancy, &trades, &params).unwrap()
    else {
        panic!("expected expectancy record");
    };
    let MetricsRecord::Composite(c) =
        compute_metric(MetricKind::Composite, &trades, &params).unwrap()
    else {
        panic!("expected composite record");
    };
    assert_eq!(c.expectancy, e);
    assert_eq!(c.components.ci_lower, e.confidence_interval.lower);
}

// ── 4. Hand-computed sample ──────────────────────────────────────────

#[test]
fn ten_trade_sample_matches_hand_computation() {
    // Wins 2, 3, 1, 4, 2, 1 (sum 13); losses -1, -2, -1, -3 (sum -7).
    let returns = [2.0, -1.0, 3.0, -2.0, 1.0, 4.0, -1.0, 2.0, -3.0, 1.0];
    let trades = trades_from(&returns);
    let record = compute_metric(
        MetricKind::Expectancy,
        &trades,
        &CalculationParameters::default(),
    )
    .unwrap();
    let MetricsRecord::Expectancy(m) = record else {
        panic!("expected expectancy record");
    };

    let eps = 1e-12;
    assert_eq!(m.trade_count, 10);
    assert_eq!((m.win_count, m.loss_count), (6, 4));
    assert!((m.win_rate - 0.6).abs() < eps);
    assert!((m.avg_win - 13.0 / 6.0).abs() < eps, "avg_win {}", m.avg_win);
    assert!((m.avg_loss + 1.75).abs() < eps, "avg_loss {}", m.avg_loss);
    // 0.6 * 13/6 + 0.4 * -1.75 = 1.3 - 0.7, which is also the plain mean.
    assert!((m.expectancy - 0.6).abs() < eps, "expectancy {}", m.expectancy);
    assert!((expectancy_of(&returns) - 0.6).abs() < eps);
    assert!(m.confidence_interval.lower <= 0.6 && 0.6 <= m.confidence_interval.upper);
}

