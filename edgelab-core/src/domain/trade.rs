//! Trade: one completed entry/exit produced by the construction engine.

use super::snapshot::Regime;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a position was closed. Variants are listed in exit-precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TargetHit,
    DeadZone,
    MaxHoldingPeriod,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopLoss => "stop_loss",
            Self::TargetHit => "target_hit",
            Self::DeadZone => "dead_zone",
            Self::MaxHoldingPeriod => "max_holding_period",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete long round trip: entry → exit.
///
/// Immutable once emitted. For a fixed snapshot and parameter set the list of
/// trades per symbol is a pure function of the inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,

    // ── Entry ──
    pub entry_index: usize,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub entry_percentile: f64,
    pub entry_regime: Option<Regime>,

    // ── Exit ──
    pub exit_index: usize,
    pub exit_date: NaiveDate,
    pub exit_price: f64,
    /// `None` when the exit bar had no percentile (warm-up gap).
    pub exit_percentile: Option<f64>,
    pub exit_reason: ExitReason,

    // ── Duration ──
    /// Calendar days between entry and exit.
    pub holding_days: i64,
    pub bars_held: usize,

    // ── Outcome ──
    /// `(exit - entry) / entry × 100`.
    pub return_pct: f64,
    /// Stop distance in price units, fixed at entry.
    pub stop_distance: f64,
    /// Closed at the end of the series rather than by an exit rule.
    pub truncated: bool,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.return_pct > 0.0
    }

    /// Stop distance as a percentage of the entry price.
    pub fn stop_distance_pct(&self) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        self.stop_distance / self.entry_price * 100.0
    }
}

/// Signed percentage return of a long position.
pub fn return_pct(entry_price: f64, exit_price: f64) -> f64 {
    if entry_price <= 0.0 {
        return 0.0;
    }
    (exit_price - entry_price) / entry_price * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trade() -> Trade {
        Trade {
            symbol: "SPY".into(),
            entry_index: 4,
            entry_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            entry_price: 100.0,
            entry_percentile: 8.0,
            entry_regime: Some(Regime::Uptrend),
            exit_index: 8,
            exit_date: NaiveDate::from_ymd_opt(2024, 1, 11).unwrap(),
            exit_price: 110.0,
            exit_percentile: Some(55.0),
            exit_reason: ExitReason::TargetHit,
            holding_days: 6,
            bars_held: 4,
            return_pct: 10.0,
            stop_distance: 5.0,
            truncated: false,
        }
    }

    #[test]
    fn return_pct_calculation() {
        assert!((return_pct(100.0, 110.0) - 10.0).abs() < 1e-12);
        assert!((return_pct(100.0, 95.0) + 5.0).abs() < 1e-12);
        assert_eq!(return_pct(0.0, 10.0), 0.0);
    }

    #[test]
    fn stop_distance_pct() {
        assert!((sample_trade().stop_distance_pct() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn is_winner() {
        assert!(sample_trade().is_winner());
        let mut flat = sample_trade();
        flat.return_pct = 0.0;
        assert!(!flat.is_winner());
    }

    #[test]
    fn exit_reason_serializes_snake_case() {
        let json = serde_json::to_string(&ExitReason::MaxHoldingPeriod).unwrap();
        assert_eq!(json, "\"max_holding_period\"");
        assert_eq!(ExitReason::DeadZone.to_string(), "dead_zone");
    }
}
