//! Market-data provider trait and structured error types.
//!
//! The provider is an external collaborator: it returns daily OHLCV bars for a
//! symbol and date range. The snapshot builder sits above this trait; providers
//! know nothing about snapshots.

use crate::domain::Bar;
use chrono::NaiveDate;
use thiserror::Error;

/// Structured error types for market-data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no data for '{symbol}' in {start}..{end}")]
    NoData {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("network unreachable: {0}")]
    Network(String),

    #[error("malformed data for '{symbol}': {reason}")]
    Malformed { symbol: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataError {
    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Trait for market-data providers (CSV directory, synthetic, remote vendors).
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily bars for `symbol` in `[start, end]`, sorted by date ascending.
    ///
    /// Fails with `DataError::NoData` when the symbol or range is unknown.
    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, DataError>;
}

/// Sort by date, drop duplicate dates (last wins) and keep only `[start, end]`.
pub(crate) fn normalize_bars(mut bars: Vec<Bar>, start: NaiveDate, end: NaiveDate) -> Vec<Bar> {
    bars.retain(|b| b.date >= start && b.date <= end);
    bars.sort_by_key(|b| b.date);
    let mut out: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(last) if last.date == bar.date => *last = bar,
            _ => out.push(bar),
        }
    }
    out
}
