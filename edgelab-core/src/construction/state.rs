//! Two-state position machine: `Flat` ⇄ `InPosition`, with named transition guards.
//!
//! Exit guards are evaluated in a fixed precedence and the first that fires wins:
//!
//! 1. stop loss (always active)
//! 2. target hit: `exit <= percentile <= dead_zone`, once `min_holding_period` is met
//! 3. dead zone: `percentile > dead_zone`, once `min_holding_period` is met
//! 4. max holding period
//!
//! Bars without a percentile can only trigger guards 1 and 4.

use crate::domain::{trade::return_pct, ExitReason, IndicatorRow, Regime, Trade};
use crate::params::{Thresholds, TradeRules};
use chrono::NaiveDate;

/// An open long position. Stop distance is fixed at entry.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub entry_index: usize,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub entry_percentile: f64,
    pub entry_regime: Option<Regime>,
    pub stop_distance: f64,
}

impl OpenPosition {
    pub fn open(index: usize, row: &IndicatorRow, percentile: f64, stop_distance: f64) -> Self {
        Self {
            entry_index: index,
            entry_date: row.date,
            entry_price: row.close,
            entry_percentile: percentile,
            entry_regime: row.regime(),
            stop_distance,
        }
    }

    pub fn bars_held(&self, index: usize) -> usize {
        index.saturating_sub(self.entry_index)
    }

    /// Close at `row` (bar `index`) and produce the trade record.
    pub fn close(
        &self,
        symbol: &str,
        index: usize,
        row: &IndicatorRow,
        reason: ExitReason,
        truncated: bool,
    ) -> Trade {
        Trade {
            symbol: symbol.to_string(),
            entry_index: self.entry_index,
            entry_date: self.entry_date,
            entry_price: self.entry_price,
            entry_percentile: self.entry_percentile,
            entry_regime: self.entry_regime,
            exit_index: index,
            exit_date: row.date,
            exit_price: row.close,
            exit_percentile: row.percentile,
            exit_reason: reason,
            holding_days: (row.date - self.entry_date).num_days(),
            bars_held: self.bars_held(index),
            return_pct: return_pct(self.entry_price, row.close),
            stop_distance: self.stop_distance,
            truncated,
        }
    }
}

/// State of one position slot.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    InPosition(OpenPosition),
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, Self::Flat)
    }

    pub fn position(&self) -> Option<&OpenPosition> {
        match self {
            Self::Flat => None,
            Self::InPosition(p) => Some(p),
        }
    }

    /// Feed one bar to an open slot. On exit the slot goes back to `Flat` and
    /// the closed trade is returned. A flat slot ignores the bar.
    pub fn on_bar(
        &mut self,
        symbol: &str,
        index: usize,
        row: &IndicatorRow,
        thresholds: &Thresholds,
        rules: &TradeRules,
    ) -> Option<Trade> {
        let reason = {
            let pos = self.position()?;
            exit_reason(pos, index, row, thresholds, rules)?
        };
        match std::mem::take(self) {
            Self::InPosition(pos) => Some(pos.close(symbol, index, row, reason, false)),
            Self::Flat => None,
        }
    }
}

// ── Guards ───────────────────────────────────────────────────────────

/// Flat → InPosition: percentile at or below the entry threshold.
pub fn entry_signal(row: &IndicatorRow, thresholds: &Thresholds) -> Option<f64> {
    row.percentile.filter(|&p| p <= thresholds.entry)
}

pub fn stop_loss_hit(pos: &OpenPosition, row: &IndicatorRow) -> bool {
    pos.entry_price - row.close > pos.stop_distance
}

pub fn target_hit(percentile: f64, thresholds: &Thresholds) -> bool {
    percentile >= thresholds.exit && percentile <= thresholds.dead_zone
}

pub fn dead_zone_hit(percentile: f64, thresholds: &Thresholds) -> bool {
    percentile > thresholds.dead_zone
}

pub fn max_hold_reached(bars_held: usize, rules: &TradeRules) -> bool {
    bars_held >= rules.max_holding_period
}

/// InPosition → Flat: first guard in precedence order that fires.
pub fn exit_reason(
    pos: &OpenPosition,
    index: usize,
    row: &IndicatorRow,
    thresholds: &Thresholds,
    rules: &TradeRules,
) -> Option<ExitReason> {
    let bars_held = pos.bars_held(index);
    if stop_loss_hit(pos, row) {
        return Some(ExitReason::StopLoss);
    }
    if bars_held >= rules.min_holding_period {
        if let Some(p) = row.percentile {
            if target_hit(p, thresholds) {
                return Some(ExitReason::TargetHit);
            }
            if dead_zone_hit(p, thresholds) {
                return Some(ExitReason::DeadZone);
            }
        }
    }
    if max_hold_reached(bars_held, rules) {
        return Some(ExitReason::MaxHoldingPeriod);
    }
    None
}
