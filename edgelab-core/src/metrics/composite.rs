//! Weighted composite score over expectancy components.

use super::expectancy::{compute_expectancy, ExpectancyMetrics};
use super::MetricsError;
use crate::domain::Trade;
use crate::params::{CalculationParameters, RiskWeights};
use crate::rng::DeterministicRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeComponents {
    pub expectancy: f64,
    /// Win rate in percent, on the same scale as expectancy.
    pub win_rate_pct: f64,
    pub time_normalized: f64,
    /// Zero when the risk-normalized expectancy is undefined.
    pub risk_normalized: f64,
    pub ci_lower: f64,
}

impl CompositeComponents {
    pub fn from_metrics(m: &ExpectancyMetrics) -> Self {
        Self {
            expectancy: m.expectancy,
            win_rate_pct: m.win_rate * 100.0,
            time_normalized: m.time_normalized,
            risk_normalized: m.risk_normalized.unwrap_or(0.0),
            ci_lower: m.confidence_interval.lower,
        }
    }

    pub fn weighted_sum(&self, w: &RiskWeights) -> f64 {
        w.expectancy * self.expectancy
            + w.win_rate * self.win_rate_pct
            + w.time_efficiency * self.time_normalized
            + w.risk_efficiency * self.risk_normalized
            + w.ci_lower * self.ci_lower
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub score: f64,
    pub components: CompositeComponents,
    pub weights: RiskWeights,
    pub expectancy: ExpectancyMetrics,
}

pub fn compute_composite(
    trades: &[Trade],
    params: &CalculationParameters,
    rng: &mut DeterministicRng,
) -> Result<CompositeScore, MetricsError> {
    let expectancy = compute_expectancy(trades, params, rng)?;
    let components = CompositeComponents::from_metrics(&expectancy);
    Ok(CompositeScore {
        score: components.weighted_sum(&params.weights),
        components,
        weights: params.weights.clone(),
        expectancy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::expectancy::tests::trade;

    #[test]
    fn score_is_weighted_sum() {
        let trades = vec![trade(4.0, 2), trade(-2.0, 2)];
        let params = CalculationParameters::default();
        let c = compute_composite(&trades, &params, &mut DeterministicRng::new(42)).unwrap();
        let comp = &c.components;
        let w = &params.weights;
        let expected = w.expectancy * 1.0
            + w.win_rate * 50.0
            + w.time_efficiency * 0.5
            + w.risk_efficiency * 0.5
            + w.ci_lower * comp.ci_lower;
        assert!((c.score - expected).abs() < 1e-12);
    }

    #[test]
    fn only_expectancy_weight() {
        let params = CalculationParameters {
            weights: RiskWeights {
                expectancy: 1.0,
                win_rate: 0.0,
                time_efficiency: 0.0,
                risk_efficiency: 0.0,
                ci_lower: 0.0,
            },
            ..CalculationParameters::default()
        };
        let trades = vec![trade(3.0, 1), trade(1.0, 1)];
        let c = compute_composite(&trades, &params, &mut DeterministicRng::new(7)).unwrap();
        assert!((c.score - 2.0).abs() < 1e-12);
    }
}
