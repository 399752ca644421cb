//! Snapshot construction: fetch bars per symbol, derive indicator tables.
//!
//! Fetches run sequentially through the bounded retry layer and check the
//! cancellation flag before each symbol. Indicator tables are then computed in
//! parallel, one symbol per task.

use chrono::{NaiveDate, Utc};
use edgelab_core::data::{fetch_with_retry, MarketDataProvider, RetryPolicy};
use edgelab_core::domain::{
    is_valid_symbol, Bar, DatasetHash, DateRange, IndicatorTable, Snapshot, SnapshotId,
    SnapshotMeta,
};
use edgelab_core::indicators::{build_indicator_table, IndicatorMath, RsiMa};
use edgelab_core::params::CalculationParameters;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// What to do when some symbols cannot be fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialPolicy {
    /// Any missing symbol fails the whole build.
    #[default]
    FailWhole,
    /// Record missing symbols and build from the rest.
    AllowPartial,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("data unavailable for '{symbol}' in {start}..{end} after {attempts} attempt(s): {reason}")]
    DataUnavailable {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
        attempts: u32,
        reason: String,
    },

    #[error("snapshot build cancelled")]
    Cancelled,

    #[error("no symbols requested")]
    NoSymbols,

    #[error("invalid symbol '{symbol}'")]
    InvalidSymbol { symbol: String },
}

/// Inputs of one build.
#[derive(Debug, Clone)]
pub struct SnapshotRequest {
    pub symbols: Vec<String>,
    pub range: DateRange,
    pub params: CalculationParameters,
    /// Overrides the builder's policy for this request only.
    pub partial: Option<PartialPolicy>,
}

impl SnapshotRequest {
    pub fn new(symbols: &[String], range: DateRange, params: CalculationParameters) -> Self {
        Self {
            symbols: normalize_symbols(symbols),
            range,
            params,
            partial: None,
        }
    }

    pub fn with_partial_policy(mut self, partial: PartialPolicy) -> Self {
        self.partial = Some(partial);
        self
    }
}

/// Trim, upper-case and de-duplicate, keeping first-seen order.
pub fn normalize_symbols(symbols: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(symbols.len());
    for s in symbols {
        let s = s.trim().to_uppercase();
        if !s.is_empty() && !out.contains(&s) {
            out.push(s);
        }
    }
    out
}

pub struct SnapshotBuilder {
    provider: Arc<dyn MarketDataProvider>,
    indicator: Option<Arc<dyn IndicatorMath>>,
    retry: RetryPolicy,
    partial: PartialPolicy,
}

impl SnapshotBuilder {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            provider,
            indicator: None,
            retry: RetryPolicy::default(),
            partial: PartialPolicy::default(),
        }
    }

    /// Replace the default RSI-MA indicator.
    pub fn with_indicator(mut self, indicator: Arc<dyn IndicatorMath>) -> Self {
        self.indicator = Some(indicator);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Default policy for requests that do not carry their own.
    pub fn with_partial_policy(mut self, partial: PartialPolicy) -> Self {
        self.partial = partial;
        self
    }

    pub fn partial_policy(&self) -> PartialPolicy {
        self.partial
    }

    /// Build an in-memory snapshot with the given id.
    pub fn build(
        &self,
        id: SnapshotId,
        request: &SnapshotRequest,
        cancel: Option<&AtomicBool>,
    ) -> Result<Snapshot, BuildError> {
        if request.symbols.is_empty() {
            return Err(BuildError::NoSymbols);
        }
        if let Some(bad) = request.symbols.iter().find(|s| !is_valid_symbol(s)) {
            return Err(BuildError::InvalidSymbol {
                symbol: bad.clone(),
            });
        }
        let DateRange { start, end } = request.range;
        let partial = request.partial.unwrap_or(self.partial);

        let mut fetched: Vec<(String, Vec<Bar>)> = Vec::with_capacity(request.symbols.len());
        let mut missing: Vec<String> = Vec::new();
        let mut first_failure: Option<BuildError> = None;

        for symbol in &request.symbols {
            if is_cancelled(cancel) {
                return Err(BuildError::Cancelled);
            }
            match fetch_with_retry(self.provider.as_ref(), symbol, start, end, &self.retry) {
                Ok(bars) => fetched.push((symbol.clone(), bars)),
                Err(failure) => {
                    let err = BuildError::DataUnavailable {
                        symbol: symbol.clone(),
                        start,
                        end,
                        attempts: failure.attempts,
                        reason: failure.error.to_string(),
                    };
                    if partial == PartialPolicy::FailWhole {
                        return Err(err);
                    }
                    warn!(symbol = %symbol, error = %err, "symbol skipped in partial snapshot");
                    missing.push(symbol.clone());
                    first_failure.get_or_insert(err);
                }
            }
        }

        if fetched.is_empty() {
            return Err(first_failure.unwrap_or(BuildError::NoSymbols));
        }
        if is_cancelled(cancel) {
            return Err(BuildError::Cancelled);
        }

        let params = &request.params;
        let default_math;
        let math: &dyn IndicatorMath = match &self.indicator {
            Some(m) => m.as_ref(),
            None => {
                default_math = RsiMa::from_windows(&params.windows);
                &default_math
            }
        };

        let tables: BTreeMap<String, IndicatorTable> = fetched
            .par_iter()
            .map(|(symbol, bars)| {
                (
                    symbol.clone(),
                    build_indicator_table(symbol, bars, math, &params.windows),
                )
            })
            .collect();

        let meta = SnapshotMeta {
            id,
            created_at: Utc::now(),
            params_hash: params.compute_hash(),
            symbols: request.symbols.clone(),
            range: request.range,
            bar_counts: tables.iter().map(|(s, t)| (s.clone(), t.len())).collect(),
            missing_symbols: missing,
            data_hash: compute_dataset_hash(&fetched),
            indicator: math.name().to_string(),
        };

        info!(
            snapshot = %meta.id,
            provider = self.provider.name(),
            symbols = tables.len(),
            missing = meta.missing_symbols.len(),
            range = %meta.range,
            "built snapshot"
        );

        Ok(Snapshot {
            meta,
            parameters: params.clone(),
            tables,
        })
    }
}

fn is_cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|f| f.load(Ordering::Relaxed))
}

/// Deterministic BLAKE3 hash over all bars, in sorted symbol order.
fn compute_dataset_hash(fetched: &[(String, Vec<Bar>)]) -> DatasetHash {
    let mut hasher = blake3::Hasher::new();
    let mut ordered: Vec<&(String, Vec<Bar>)> = fetched.iter().collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0));

    for (symbol, bars) in ordered {
        hasher.update(symbol.as_bytes());
        for bar in bars {
            hasher.update(bar.date.to_string().as_bytes());
            hasher.update(&bar.open.to_le_bytes());
            hasher.update(&bar.high.to_le_bytes());
            hasher.update(&bar.low.to_le_bytes());
            hasher.update(&bar.close.to_le_bytes());
            hasher.update(&bar.volume.to_le_bytes());
        }
    }

    DatasetHash::from_hash(hasher.finalize().to_hex().as_str())
}
