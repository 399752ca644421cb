//! EdgeLab Runner: snapshot lifecycle, metrics cache and the analytics service.
//!
//! This crate builds on `edgelab-core` to provide:
//! - TOML configuration (`edgelab.toml`)
//! - Snapshot building with bounded retry and cancellation
//! - Immutable on-disk snapshot bundles (JSON metadata + Parquet tables)
//! - A single-flight metrics cache with optional write-through persistence
//! - `AnalyticsService`, the API surface used by the CLI
//! - CSV / JSON / Markdown export

pub mod config;
pub mod error;
pub mod export;
pub mod metrics_cache;
pub mod service;
pub mod snapshot_builder;
pub mod snapshot_store;

pub use config::{AppConfig, CacheConfig, ConfigError, ProviderConfig};
pub use error::ServiceError;
pub use export::{export_metrics_json, export_trades_csv, import_metrics_json, metrics_summary};
pub use metrics_cache::{CacheEntry, CacheError, CacheKey, CacheLookup, MetricsCache};
pub use service::{AnalyticsService, CreatedSnapshot, MetricsResponse};
pub use snapshot_builder::{BuildError, PartialPolicy, SnapshotBuilder, SnapshotRequest};
pub use snapshot_store::{SnapshotIter, SnapshotStore, StoreError};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn service_is_send_sync() {
        assert_send::<AnalyticsService>();
        assert_sync::<AnalyticsService>();
    }

    #[test]
    fn store_and_cache_are_send_sync() {
        assert_send::<SnapshotStore>();
        assert_sync::<SnapshotStore>();
        assert_send::<MetricsCache>();
        assert_sync::<MetricsCache>();
    }

    #[test]
    fn builder_is_send_sync() {
        assert_send::<SnapshotBuilder>();
        assert_sync::<SnapshotBuilder>();
    }

    #[test]
    fn responses_are_send_sync() {
        assert_send::<MetricsResponse>();
        assert_sync::<MetricsResponse>();
        assert_send::<CreatedSnapshot>();
        assert_sync::<CreatedSnapshot>();
        assert_send::<CacheEntry>();
        assert_sync::<CacheEntry>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<ServiceError>();
        assert_sync::<ServiceError>();
        assert_send::<ConfigError>();
        assert_sync::<ConfigError>();
    }
}
