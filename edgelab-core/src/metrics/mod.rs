//! Metrics over constructed trades.
//!
//! Every metric kind goes through [`compute_metric`], which seeds a fresh
//! [`DeterministicRng`] from the parameters. Same trades and same parameters
//! always produce bit-identical records.

pub mod composite;
pub mod expectancy;
pub mod regime;

pub use composite::{compute_composite, CompositeComponents, CompositeScore};
pub use expectancy::{
    bootstrap_ci, compute_expectancy, expectancy_of, ConfidenceInterval, ExpectancyMetrics,
};
pub use regime::{compute_regime_breakdown, RegimeBreakdown, RegimeExpectancy};

use crate::domain::Trade;
use crate::params::{CalculationParameters, ParamsError};
use crate::rng::DeterministicRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    #[error("insufficient sample: {count} trades, need at least {required}")]
    InsufficientSample { count: usize, required: usize },

    #[error(transparent)]
    InvalidParameters(#[from] ParamsError),
}

/// The metric families the service can compute and cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Expectancy,
    Regime,
    Composite,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [Self::Expectancy, Self::Regime, Self::Composite];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expectancy => "expectancy",
            Self::Regime => "regime",
            Self::Composite => "composite",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown metric kind '{s}' (expected expectancy, regime or composite)"))
    }
}

/// Result of one metric computation, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricsRecord {
    Expectancy(ExpectancyMetrics),
    Regime(RegimeBreakdown),
    Composite(CompositeScore),
}

impl MetricsRecord {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Expectancy(_) => MetricKind::Expectancy,
            Self::Regime(_) => MetricKind::Regime,
            Self::Composite(_) => MetricKind::Composite,
        }
    }
}

/// Single dispatch point for every metric kind.
///
/// Parameters are re-validated here: the fields are public, so a caller can
/// hold an instance that never went through a constructor.
pub fn compute_metric(
    kind: MetricKind,
    trades: &[Trade],
    params: &CalculationParameters,
) -> Result<MetricsRecord, MetricsError> {
    params.validate()?;
    let mut rng = DeterministicRng::new(params.bootstrap.seed);
    Ok(match kind {
        MetricKind::Expectancy => {
            MetricsRecord::Expectancy(compute_expectancy(trades, params, &mut rng)?)
        }
        MetricKind::Regime => MetricsRecord::Regime(compute_regime_breakdown(trades, params)?),
        MetricKind::Composite => {
            MetricsRecord::Composite(compute_composite(trades, params, &mut rng)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::expectancy::tests::trade;

    #[test]
    fn kind_round_trips_through_string() {
        for kind in MetricKind::ALL {
            assert_eq!(kind.as_str().parse::<MetricKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
        assert!("sharpe".parse::<MetricKind>().is_err());
    }

    #[test]
    fn dispatch_is_deterministic() {
        let trades: Vec<Trade> = (0..25).map(|i| trade((i % 5) as f64 - 1.5, 3)).collect();
        let params = CalculationParameters::default();
        for kind in MetricKind::ALL {
            let a = compute_metric(kind, &trades, &params).unwrap();
            let b = compute_metric(kind, &trades, &params).unwrap();
            assert_eq!(a, b);
            assert_eq!(a.kind(), kind);
        }
    }

    #[test]
    fn mutated_parameters_are_rejected_before_bootstrap() {
        let trades: Vec<Trade> = (0..10).map(|i| trade(i as f64 - 4.0, 2)).collect();
        let mut params = CalculationParameters::default();
        params.bootstrap.iterations = 0;
        for kind in MetricKind::ALL {
            let err = compute_metric(kind, &trades, &params).unwrap_err();
            assert!(matches!(
                err,
                MetricsError::InvalidParameters(ParamsError::InvalidParameters {
                    field: "bootstrap_iterations",
                    ..
                })
            ));
        }
    }

    #[test]
    fn record_serializes_with_kind_tag() {
        let params = CalculationParameters::default();
        let rec = compute_metric(MetricKind::Composite, &[trade(1.0, 1)], &params).unwrap();
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["kind"], "composite");
        let back: MetricsRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn seed_change_moves_interval() {
        let trades: Vec<Trade> = (0..30).map(|i| trade(((i * 13) % 17) as f64 - 8.0, 2)).collect();
        let a = compute_metric(MetricKind::Expectancy, &trades, &CalculationParameters::default());
        let mut params = CalculationParameters::default();
        params.bootstrap.seed = 7;
        let b = compute_metric(MetricKind::Expectancy, &trades, &params);
        assert_ne!(a.unwrap(), b.unwrap());
    }
}
