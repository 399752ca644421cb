//! Synthetic market data for development and tests.
//!
//! Each symbol gets its own deterministic random walk on weekdays, seeded from
//! `derive_seed(master_seed, symbol)`. Same seed and symbol → same bars.

use super::provider::{DataError, MarketDataProvider};
use crate::domain::Bar;
use crate::rng::{derive_seed, DeterministicRng};
use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeSet;

pub struct SyntheticProvider {
    master_seed: u64,
    /// Symbols that return `NoData`, for exercising failure paths.
    unknown: BTreeSet<String>,
}

impl SyntheticProvider {
    pub fn new(master_seed: u64) -> Self {
        Self {
            master_seed,
            unknown: BTreeSet::new(),
        }
    }

    pub fn with_unknown(mut self, symbol: &str) -> Self {
        self.unknown.insert(symbol.to_string());
        self
    }
}

impl MarketDataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, DataError> {
        let bars = if self.unknown.contains(symbol) {
            Vec::new()
        } else {
            generate_bars(derive_seed(self.master_seed, symbol), start, end)
        };
        if bars.is_empty() {
            return Err(DataError::NoData {
                symbol: symbol.to_string(),
                start,
                end,
            });
        }
        Ok(bars)
    }
}

/// Random walk from 100.0 with ±2% daily moves, weekdays only.
pub fn generate_bars(seed: u64, start: NaiveDate, end: NaiveDate) -> Vec<Bar> {
    let mut rng = DeterministicRng::new(seed);
    let mut bars = Vec::new();
    let mut close = 100.0_f64;
    let mut date = start;

    while date <= end {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            let change = (rng.next_uniform() - 0.5) * 0.04;
            let open = close;
            close = (open * (1.0 + change)).max(0.01);
            let wick = open.max(close) * rng.next_uniform() * 0.01;
            bars.push(Bar {
                date,
                open,
                high: open.max(close) + wick,
                low: (open.min(close) - wick).max(0.005),
                close,
                volume: 1_000_000 + (rng.next_uniform() * 500_000.0) as u64,
            });
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }

    bars
}
