//! Trade construction: walk each symbol's indicator table through the position
//! machine and collect completed trades.
//!
//! Pure: for a fixed snapshot and parameter set the output is identical on every
//! run, regardless of how many threads process symbols.

use super::state::{entry_signal, OpenPosition, PositionState};
use super::stop::stop_distance;
use crate::domain::{ExitReason, IndicatorRow, Regime, Snapshot, Trade};
use crate::params::CalculationParameters;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trades for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolTrades {
    pub symbol: String,
    /// Completed trades ordered by entry. Includes the truncated ones only when
    /// `include_truncated` is set.
    pub trades: Vec<Trade>,
    /// Positions still open on the last bar, closed there.
    pub truncated: Vec<Trade>,
}

/// Per-symbol results of a construction run, keyed and iterated in symbol order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstructedTrades {
    pub by_symbol: BTreeMap<String, SymbolTrades>,
}

impl ConstructedTrades {
    /// All trades across symbols, ordered by `(entry_date, symbol, exit_date)`.
    pub fn all_trades(&self) -> Vec<Trade> {
        let mut all: Vec<Trade> = self
            .by_symbol
            .values()
            .flat_map(|s| s.trades.iter().cloned())
            .collect();
        all.sort_by(|a, b| {
            (a.entry_date, &a.symbol, a.exit_date).cmp(&(b.entry_date, &b.symbol, b.exit_date))
        });
        all
    }

    pub fn truncated_trades(&self) -> Vec<Trade> {
        self.by_symbol
            .values()
            .flat_map(|s| s.truncated.iter().cloned())
            .collect()
    }

    pub fn trade_count(&self) -> usize {
        self.by_symbol.values().map(|s| s.trades.len()).sum()
    }

    /// Narrow to a symbol and/or an entry regime.
    pub fn filtered(&self, filter: &TradeFilter) -> ConstructedTrades {
        let by_symbol = self
            .by_symbol
            .iter()
            .filter(|(sym, _)| filter.symbol.as_deref().map_or(true, |s| s == sym.as_str()))
            .map(|(sym, st)| {
                let keep = |t: &&Trade| filter.matches(t);
                (
                    sym.clone(),
                    SymbolTrades {
                        symbol: st.symbol.clone(),
                        trades: st.trades.iter().filter(keep).cloned().collect(),
                        truncated: st.truncated.iter().filter(keep).cloned().collect(),
                    },
                )
            })
            .collect();
        ConstructedTrades { by_symbol }
    }
}

/// Optional narrowing applied to constructed trades.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeFilter {
    pub symbol: Option<String>,
    /// Matches on the regime at entry. Trades entered while the regime was
    /// still unclassified never match a regime filter.
    pub regime: Option<Regime>,
}

impl TradeFilter {
    pub fn matches(&self, trade: &Trade) -> bool {
        let symbol_ok = self
            .symbol
            .as_deref()
            .map_or(true, |s| s == trade.symbol);
        let regime_ok = self
            .regime
            .map_or(true, |r| trade.entry_regime == Some(r));
        symbol_ok && regime_ok
    }
}

/// Builds trades from indicator tables under one parameter set.
pub struct TradeConstructionEngine<'a> {
    params: &'a CalculationParameters,
}

impl<'a> TradeConstructionEngine<'a> {
    pub fn new(params: &'a CalculationParameters) -> Self {
        Self { params }
    }

    /// Construct trades for every symbol of the snapshot, one symbol per task.
    pub fn construct(&self, snapshot: &Snapshot) -> ConstructedTrades {
        let by_symbol: BTreeMap<String, SymbolTrades> = snapshot
            .tables
            .par_iter()
            .map(|(symbol, table)| (symbol.clone(), self.construct_symbol(symbol, &table.rows)))
            .collect();
        ConstructedTrades { by_symbol }
    }

    /// Single-symbol scan over rows ordered by date.
    pub fn construct_symbol(&self, symbol: &str, rows: &[IndicatorRow]) -> SymbolTrades {
        let thresholds = &self.params.thresholds;
        let rules = &self.params.rules;
        let mut slots: Vec<PositionState> = vec![PositionState::Flat];
        let mut closed: Vec<Trade> = Vec::new();
        let mut last_exit: Option<NaiveDate> = None;

        for (i, row) in rows.iter().enumerate() {
            // InPosition → Flat
            for slot in slots.iter_mut() {
                if let Some(trade) = slot.on_bar(symbol, i, row, thresholds, rules) {
                    last_exit = Some(trade.exit_date);
                    closed.push(trade);
                }
            }
            if rules.allow_overlap {
                slots.retain(|s| !s.is_flat());
            }

            // Flat → InPosition
            let is_last = i + 1 == rows.len();
            let reentry_ok = rules.allow_same_day_reentry || last_exit != Some(row.date);
            let has_room = rules.allow_overlap || slots.iter().all(PositionState::is_flat);
            if is_last || !reentry_ok || !has_room {
                continue;
            }
            let Some(percentile) = entry_signal(row, thresholds) else {
                continue;
            };
            let Some(distance) = stop_distance(
                &self.params.stop_loss,
                rows,
                i,
                self.params.windows.construction_window,
            ) else {
                continue;
            };
            let opened = PositionState::InPosition(OpenPosition::open(i, row, percentile, distance));
            if rules.allow_overlap {
                slots.push(opened);
            } else {
                slots[0] = opened;
            }
        }

        let mut truncated = Vec::new();
        if let Some(last) = rows.last() {
            let last_index = rows.len() - 1;
            for pos in slots.iter().filter_map(PositionState::position) {
                if pos.entry_index < last_index {
                    truncated.push(pos.close(
                        symbol,
                        last_index,
                        last,
                        ExitReason::MaxHoldingPeriod,
                        true,
                    ));
                }
            }
        }

        let mut trades = closed;
        if rules.include_truncated {
            trades.extend(truncated.iter().cloned());
        }
        trades.sort_by_key(|t| (t.entry_index, t.exit_index));

        SymbolTrades {
            symbol: symbol.to_string(),
            trades,
            truncated,
        }
    }
}

/// Convenience wrapper over [`TradeConstructionEngine::construct`].
pub fn construct_trades(snapshot: &Snapshot, params: &CalculationParameters) -> ConstructedTrades {
    TradeConstructionEngine::new(params).construct(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{StopLossMethod, TradeRules};

    fn rows_from(percentiles: &[Option<f64>], closes: &[f64]) -> Vec<IndicatorRow> {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        percentiles
            .iter()
            .zip(closes)
            .enumerate()
            .map(|(i, (&p, &c))| IndicatorRow {
                date: base + chrono::Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 100,
                indicator: p,
                percentile: p,
                atr: Some(1.0),
                regime_ma: Some(c - 1.0),
            })
            .collect()
    }

    fn params(rules: TradeRules) -> CalculationParameters {
        CalculationParameters {
            stop_loss: StopLossMethod::Fixed { percent: 50.0 },
            rules,
            ..CalculationParameters::default()
        }
    }

    fn flat(n: usize) -> Vec<f64> {
        vec![100.0; n]
    }

    #[test]
    fn documented_example_single_trade() {
        let pct = [80.0, 40.0, 10.0, 30.0, 55.0, 20.0, 60.0].map(Some);
        let rows = rows_from(&pct, &flat(7));
        let p = params(TradeRules {
            max_holding_period: 5,
            ..TradeRules::default()
        });
        let out = TradeConstructionEngine::new(&p).construct_symbol("SPY", &rows);
        assert_eq!(out.trades.len(), 1);
        let t = &out.trades[0];
        assert_eq!((t.entry_index, t.exit_index), (2, 4));
        assert_eq!(t.exit_reason, ExitReason::TargetHit);
        assert_eq!(t.entry_regime, Some(Regime::Uptrend));
        assert!(out.truncated.is_empty());
    }

    #[test]
    fn no_entry_on_last_bar() {
        let rows = rows_from(&[Some(50.0), Some(5.0)], &flat(2));
        let p = params(TradeRules::default());
        let out = TradeConstructionEngine::new(&p).construct_symbol("SPY", &rows);
        assert!(out.trades.is_empty());
        assert!(out.truncated.is_empty());
    }

    #[test]
    fn open_position_is_truncated_at_series_end() {
        let rows = rows_from(&[Some(5.0), Some(20.0), Some(30.0)], &flat(3));
        let p = params(TradeRules::default());
        let out = TradeConstructionEngine::new(&p).construct_symbol("SPY", &rows);
        assert!(out.trades.is_empty());
        assert_eq!(out.truncated.len(), 1);
        let t = &out.truncated[0];
        assert!(t.truncated);
        assert_eq!(t.exit_reason, ExitReason::MaxHoldingPeriod);
        assert_eq!(t.exit_index, 2);

        let p = params(TradeRules {
            include_truncated: true,
            ..TradeRules::default()
        });
        let out = TradeConstructionEngine::new(&p).construct_symbol("SPY", &rows);
        assert_eq!(out.trades.len(), 1);
    }

    #[test]
    fn same_day_reentry_flag() {
        // Entry at 0, stop hit on bar 1 while percentile still low.
        let pct = [Some(5.0), Some(5.0), Some(60.0), Some(60.0)];
        let closes = [100.0, 40.0, 40.0, 40.0];
        let rows = rows_from(&pct, &closes);

        let p = params(TradeRules::default());
        let out = TradeConstructionEngine::new(&p).construct_symbol("SPY", &rows);
        assert_eq!(out.trades.len(), 1);
        assert_eq!(out.trades[0].exit_reason, ExitReason::StopLoss);

        let p = params(TradeRules {
            allow_same_day_reentry: true,
            ..TradeRules::default()
        });
        let out = TradeConstructionEngine::new(&p).construct_symbol("SPY", &rows);
        assert_eq!(out.trades.len(), 2);
        assert_eq!(out.trades[1].entry_index, 1);
        assert_eq!(out.trades[1].exit_reason, ExitReason::TargetHit);
    }

    #[test]
    fn overlap_stacks_positions() {
        let pct = [Some(5.0), Some(8.0), Some(10.0), Some(60.0), Some(60.0)];
        let rows = rows_from(&pct, &flat(5));

        let single = params(TradeRules::default());
        let out = TradeConstructionEngine::new(&single).construct_symbol("SPY", &rows);
        assert_eq!(out.trades.len(), 1);

        let stacked = params(TradeRules {
            allow_overlap: true,
            ..TradeRules::default()
        });
        let out = TradeConstructionEngine::new(&stacked).construct_symbol("SPY", &rows);
        assert_eq!(out.trades.len(), 3);
        assert!(out.trades.iter().all(|t| t.exit_index == 3));
        let entries: Vec<usize> = out.trades.iter().map(|t| t.entry_index).collect();
        assert_eq!(entries, vec![0, 1, 2]);
    }

    #[test]
    fn never_overlaps_when_disabled() {
        let pct: Vec<Option<f64>> = (0..60)
            .map(|i| Some(((i * 37) % 100) as f64))
            .collect();
        let rows = rows_from(&pct, &flat(60));
        let p = params(TradeRules {
            max_holding_period: 4,
            ..TradeRules::default()
        });
        let out = TradeConstructionEngine::new(&p).construct_symbol("SPY", &rows);
        for pair in out.trades.windows(2) {
            assert!(pair[1].entry_index >= pair[0].exit_index);
        }
    }

    #[test]
    fn warmup_gap_produces_no_entries() {
        let pct = [None, None, Some(90.0), Some(5.0), Some(60.0)];
        let rows = rows_from(&pct, &flat(5));
        let p = params(TradeRules::default());
        let out = TradeConstructionEngine::new(&p).construct_symbol("SPY", &rows);
        assert_eq!(out.trades.len(), 1);
        assert_eq!(out.trades[0].entry_index, 3);
    }

    #[test]
    fn empty_rows_yield_nothing() {
        let p = params(TradeRules::default());
        let out = TradeConstructionEngine::new(&p).construct_symbol("SPY", &[]);
        assert!(out.trades.is_empty());
        assert!(out.truncated.is_empty());
    }

    #[test]
    fn filter_by_regime_and_symbol() {
        let trade = |sym: &str, regime| {
            let pct = [Some(5.0), Some(60.0)];
            let mut rows = rows_from(&pct, &flat(2));
            rows[0].regime_ma = regime;
            TradeConstructionEngine::new(&params(TradeRules::default()))
                .construct_symbol(sym, &rows)
        };
        let mut constructed = ConstructedTrades::default();
        constructed
            .by_symbol
            .insert("AAA".into(), trade("AAA", Some(200.0)));
        constructed
            .by_symbol
            .insert("BBB".into(), trade("BBB", Some(50.0)));

        let down = constructed.filtered(&TradeFilter {
            symbol: None,
            regime: Some(Regime::Downtrend),
        });
        assert_eq!(down.trade_count(), 1);
        assert_eq!(down.all_trades()[0].symbol, "AAA");

        let bbb = constructed.filtered(&TradeFilter {
            symbol: Some("BBB".into()),
            regime: None,
        });
        assert_eq!(bbb.by_symbol.len(), 1);
        assert_eq!(bbb.trade_count(), 1);
    }
}
