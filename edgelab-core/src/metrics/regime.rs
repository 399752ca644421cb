//! Expectancy split by the market regime at entry.

use super::expectancy::{compute_expectancy, ExpectancyMetrics};
use super::MetricsError;
use crate::domain::{Regime, Trade};
use crate::params::CalculationParameters;
use crate::rng::{derive_seed, DeterministicRng};
use serde::{Deserialize, Serialize};

/// Label for trades entered before the regime average was defined.
pub const UNCLASSIFIED: &str = "unclassified";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeExpectancy {
    pub regime: String,
    pub metrics: ExpectancyMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeBreakdown {
    pub trade_count: usize,
    /// Non-empty groups in the order uptrend, downtrend, unclassified.
    pub groups: Vec<RegimeExpectancy>,
}

impl RegimeBreakdown {
    pub fn group(&self, label: &str) -> Option<&ExpectancyMetrics> {
        self.groups
            .iter()
            .find(|g| g.regime == label)
            .map(|g| &g.metrics)
    }
}

/// Group by entry regime and compute expectancy per non-empty group.
///
/// Each group bootstraps with its own generator seeded from the master seed
/// and the group label, so one group's numbers never depend on another's size.
pub fn compute_regime_breakdown(
    trades: &[Trade],
    params: &CalculationParameters,
) -> Result<RegimeBreakdown, MetricsError> {
    if trades.is_empty() {
        return Err(MetricsError::InsufficientSample {
            count: 0,
            required: 1,
        });
    }

    let buckets: [(&str, Option<Regime>); 3] = [
        (Regime::Uptrend.as_str(), Some(Regime::Uptrend)),
        (Regime::Downtrend.as_str(), Some(Regime::Downtrend)),
        (UNCLASSIFIED, None),
    ];

    let mut groups = Vec::new();
    for (label, regime) in buckets {
        let members: Vec<Trade> = trades
            .iter()
            .filter(|t| t.entry_regime == regime)
            .cloned()
            .collect();
        if members.is_empty() {
            continue;
        }
        let mut rng = DeterministicRng::new(derive_seed(params.bootstrap.seed, label));
        groups.push(RegimeExpectancy {
            regime: label.to_string(),
            metrics: compute_expectancy(&members, params, &mut rng)?,
        });
    }

    Ok(RegimeBreakdown {
        trade_count: trades.len(),
        groups,
    })
}
