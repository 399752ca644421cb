//! Snapshot: an immutable, timestamped bundle of market data, the parameters
//! used to derive it, and the per-symbol indicator tables.

use super::ids::{DatasetHash, ParamsHash, SnapshotId};
use crate::params::CalculationParameters;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// `None` if `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Trend regime of a bar: close relative to its regime moving average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Uptrend,
    Downtrend,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uptrend => "uptrend",
            Self::Downtrend => "downtrend",
        }
    }
}

impl std::str::FromStr for Regime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uptrend" | "up" => Ok(Self::Uptrend),
            "downtrend" | "down" => Ok(Self::Downtrend),
            other => Err(format!("unknown regime '{other}' (expected uptrend|downtrend)")),
        }
    }
}

/// One bar of a symbol's indicator table.
///
/// Derived values are `None` during their warm-up period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub indicator: Option<f64>,
    pub percentile: Option<f64>,
    pub atr: Option<f64>,
    pub regime_ma: Option<f64>,
}

impl IndicatorRow {
    pub fn regime(&self) -> Option<Regime> {
        self.regime_ma.map(|ma| {
            if self.close >= ma {
                Regime::Uptrend
            } else {
                Regime::Downtrend
            }
        })
    }
}

/// Chronologically sorted indicator rows for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorTable {
    pub symbol: String,
    pub rows: Vec<IndicatorRow>,
}

impl IndicatorTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.close).collect()
    }
}

/// Descriptive metadata of a snapshot; cheap to list without loading tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub id: SnapshotId,
    pub created_at: DateTime<Utc>,
    pub params_hash: ParamsHash,
    /// Symbols in requested order, including any that failed in a partial snapshot.
    pub symbols: Vec<String>,
    pub range: DateRange,
    pub bar_counts: BTreeMap<String, usize>,
    pub missing_symbols: Vec<String>,
    pub data_hash: DatasetHash,
    /// Name of the indicator collaborator that produced the tables.
    pub indicator: String,
}

impl SnapshotMeta {
    pub fn is_partial(&self) -> bool {
        !self.missing_symbols.is_empty()
    }

    /// Symbols with data, in requested order.
    pub fn available_symbols(&self) -> impl Iterator<Item = &String> {
        self.symbols
            .iter()
            .filter(move |s| !self.missing_symbols.contains(s))
    }
}

/// The full immutable bundle. Owns its indicator tables exclusively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub parameters: CalculationParameters,
    pub tables: BTreeMap<String, IndicatorTable>,
}

impl Snapshot {
    pub fn id(&self) -> &SnapshotId {
        &self.meta.id
    }

    pub fn table(&self, symbol: &str) -> Option<&IndicatorTable> {
        self.tables.get(symbol)
    }
}
