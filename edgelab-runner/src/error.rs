//! Service-level error taxonomy.
//!
//! Every lower-level error converts into `ServiceError` with enough structure
//! (symbol, range, field, sample count) for the caller to act on it.

use crate::metrics_cache::{CacheError, CacheKey};
use crate::snapshot_builder::BuildError;
use crate::snapshot_store::StoreError;
use chrono::NaiveDate;
use edgelab_core::domain::SnapshotId;
use edgelab_core::metrics::MetricsError;
use edgelab_core::params::ParamsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Upstream market data missing or unreachable after the retry budget.
    #[error("data unavailable for '{symbol}' in {start}..{end} after {attempts} attempt(s): {reason}")]
    DataUnavailable {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
        attempts: u32,
        reason: String,
    },

    #[error("snapshot not found: {id}")]
    SnapshotNotFound { id: SnapshotId },

    #[error("no snapshots exist")]
    NoSnapshotsExist,

    #[error("insufficient sample: {count} trades, need at least {required}")]
    InsufficientSample { count: usize, required: usize },

    #[error("invalid parameter '{field}': {reason}")]
    InvalidParameters { field: String, reason: String },

    /// The metric computation behind a cache key failed; nothing was cached.
    #[error("metric computation failed for {key}: {source}")]
    CacheComputationFailed {
        key: CacheKey,
        #[source]
        source: MetricsError,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(String),
}

impl ServiceError {
    /// `(count, required)` when the failure is a too-small sample, whether
    /// it surfaced directly or through the cache.
    pub fn insufficient_sample(&self) -> Option<(usize, usize)> {
        match self {
            Self::InsufficientSample { count, required }
            | Self::CacheComputationFailed {
                source: MetricsError::InsufficientSample { count, required },
                ..
            } => Some((*count, *required)),
            _ => None,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { id } => Self::SnapshotNotFound { id },
            StoreError::Empty { .. } => Self::NoSnapshotsExist,
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<BuildError> for ServiceError {
    fn from(e: BuildError) -> Self {
        match e {
            BuildError::DataUnavailable {
                symbol,
                start,
                end,
                attempts,
                reason,
            } => Self::DataUnavailable {
                symbol,
                start,
                end,
                attempts,
                reason,
            },
            BuildError::Cancelled => Self::Cancelled,
            BuildError::NoSymbols => Self::InvalidParameters {
                field: "symbols".into(),
                reason: "at least one symbol is required".into(),
            },
            BuildError::InvalidSymbol { symbol } => Self::InvalidParameters {
                field: "symbols".into(),
                reason: format!("'{symbol}' is not a valid ticker symbol"),
            },
        }
    }
}

impl From<CacheError> for ServiceError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::ComputationFailed { key, source } => {
                Self::CacheComputationFailed { key, source }
            }
        }
    }
}

impl From<MetricsError> for ServiceError {
    fn from(e: MetricsError) -> Self {
        match e {
            MetricsError::InsufficientSample { count, required } => {
                Self::InsufficientSample { count, required }
            }
            MetricsError::InvalidParameters(e) => e.into(),
        }
    }
}

impl From<ParamsError> for ServiceError {
    fn from(e: ParamsError) -> Self {
        match e {
            ParamsError::InvalidParameters { field, reason } => Self::InvalidParameters {
                field: field.to_string(),
                reason,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgelab_core::domain::ParamsHash;
    use edgelab_core::metrics::MetricKind;

    #[test]
    fn store_errors_map_to_taxonomy() {
        let id = SnapshotId::new("x");
        let e: ServiceError = StoreError::NotFound { id: id.clone() }.into();
        assert!(matches!(e, ServiceError::SnapshotNotFound { id: ref got } if *got == id));
        let e: ServiceError = StoreError::Empty {
            root: "/tmp".into(),
        }
        .into();
        assert!(matches!(e, ServiceError::NoSnapshotsExist));
    }

    #[test]
    fn insufficient_sample_seen_through_cache() {
        let key = CacheKey::new(
            SnapshotId::new("x"),
            ParamsHash::from_bytes(b"p"),
            MetricKind::Expectancy,
        );
        let e: ServiceError = CacheError::ComputationFailed {
            key,
            source: MetricsError::InsufficientSample {
                count: 0,
                required: 1,
            },
        }
        .into();
        assert_eq!(e.insufficient_sample(), Some((0, 1)));
        assert!(e.to_string().contains("insufficient sample"));
    }

    #[test]
    fn params_error_keeps_field_name() {
        let e: ServiceError = ParamsError::InvalidParameters {
            field: "entry_threshold",
            reason: "too high".into(),
        }
        .into();
        match e {
            ServiceError::InvalidParameters { field, .. } => assert_eq!(field, "entry_threshold"),
            other => panic!("unexpected: {other}"),
        }
    }
}
