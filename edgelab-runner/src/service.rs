//! `AnalyticsService`: the API surface over builder, store, engine and cache.
//!
//! Stateless apart from its collaborators. Every call names the snapshot it
//! works on, so results never depend on what ran before.

use crate::config::AppConfig;
use crate::error::ServiceError;
use crate::metrics_cache::{CacheKey, MetricsCache};
use crate::snapshot_builder::{PartialPolicy, SnapshotBuilder, SnapshotRequest};
use crate::snapshot_store::SnapshotStore;
use edgelab_core::construction::{construct_trades, ConstructedTrades, TradeFilter};
use edgelab_core::domain::{DateRange, ParamsHash, Snapshot, SnapshotId, SnapshotMeta};
use edgelab_core::metrics::{compute_metric, MetricKind, MetricsRecord};
use edgelab_core::params::{CalculationParameters, ParameterOverrides};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedSnapshot {
    pub id: SnapshotId,
    pub params_hash: ParamsHash,
    /// An existing snapshot matched and nothing was fetched.
    pub reused: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub snapshot_id: SnapshotId,
    pub params_hash: ParamsHash,
    pub cache_hit: bool,
    pub record: MetricsRecord,
}

/// Identity of a build for reuse purposes: normalized symbols, range, parameter hash.
type BuildKey = (Vec<String>, DateRange, ParamsHash);

pub struct AnalyticsService {
    store: SnapshotStore,
    cache: MetricsCache,
    builder: SnapshotBuilder,
    defaults: CalculationParameters,
    // Identical requests serialize so they cannot both miss the reuse check;
    // unrelated builds run concurrently.
    build_locks: Mutex<HashMap<BuildKey, Arc<Mutex<()>>>>,
}

impl AnalyticsService {
    pub fn new(
        store: SnapshotStore,
        cache: MetricsCache,
        builder: SnapshotBuilder,
        defaults: CalculationParameters,
    ) -> Self {
        Self {
            store,
            cache,
            builder,
            defaults,
            build_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let store = SnapshotStore::open(&config.store_dir)?;
        let cache = if config.cache.persist {
            MetricsCache::with_persistence(&config.cache.dir)
        } else {
            MetricsCache::in_memory()
        };
        let builder = SnapshotBuilder::new(config.build_provider())
            .with_retry(config.retry.clone())
            .with_partial_policy(config.partial);
        let defaults = config.default_parameters()?;
        Ok(Self::new(store, cache, builder, defaults))
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn cache(&self) -> &MetricsCache {
        &self.cache
    }

    /// Parameters new snapshots start from.
    pub fn defaults(&self) -> &CalculationParameters {
        &self.defaults
    }

    // ─── Snapshots ──────────────────────────────────────────────────

    /// Build and persist a snapshot, or reuse a complete one with the same
    /// symbols, range and parameter hash unless `force_refresh` is set.
    pub fn create_snapshot(
        &self,
        symbols: &[String],
        range: DateRange,
        force_refresh: bool,
        overrides: &ParameterOverrides,
        cancel: Option<&AtomicBool>,
    ) -> Result<CreatedSnapshot, ServiceError> {
        let params = self.defaults.with_overrides(overrides)?;
        self.create(SnapshotRequest::new(symbols, range, params), force_refresh, cancel)
    }

    /// Like [`create_snapshot`](Self::create_snapshot), with the partial-data
    /// policy chosen for this call instead of taken from configuration.
    pub fn create_snapshot_with_policy(
        &self,
        symbols: &[String],
        range: DateRange,
        force_refresh: bool,
        overrides: &ParameterOverrides,
        partial: PartialPolicy,
        cancel: Option<&AtomicBool>,
    ) -> Result<CreatedSnapshot, ServiceError> {
        let params = self.defaults.with_overrides(overrides)?;
        let request = SnapshotRequest::new(symbols, range, params).with_partial_policy(partial);
        self.create(request, force_refresh, cancel)
    }

    fn create(
        &self,
        request: SnapshotRequest,
        force_refresh: bool,
        cancel: Option<&AtomicBool>,
    ) -> Result<CreatedSnapshot, ServiceError> {
        let params_hash = request.params.compute_hash();
        let key: BuildKey = (request.symbols.clone(), request.range, params_hash.clone());

        let slot = Arc::clone(self.build_locks.lock().entry(key.clone()).or_default());
        let result = {
            let _guard = slot.lock();
            self.create_locked(&request, params_hash, force_refresh, cancel)
        };

        // Only the map and this call hold the slot: nobody else is waiting on it.
        let mut locks = self.build_locks.lock();
        if Arc::strong_count(&slot) == 2 {
            locks.remove(&key);
        }
        result
    }

    fn create_locked(
        &self,
        request: &SnapshotRequest,
        params_hash: ParamsHash,
        force_refresh: bool,
        cancel: Option<&AtomicBool>,
    ) -> Result<CreatedSnapshot, ServiceError> {
        if !force_refresh {
            if let Some(meta) = self.find_reusable(request, &params_hash)? {
                info!(snapshot = %meta.id, "reusing existing snapshot");
                return Ok(CreatedSnapshot {
                    id: meta.id,
                    params_hash,
                    reused: true,
                });
            }
        }

        let id = self.store.next_id();
        let snapshot = self.builder.build(id, request, cancel)?;
        let stored = self.store.persist(snapshot)?;
        Ok(CreatedSnapshot {
            id: stored.meta.id.clone(),
            params_hash,
            reused: false,
        })
    }

    fn find_reusable(
        &self,
        request: &SnapshotRequest,
        params_hash: &ParamsHash,
    ) -> Result<Option<SnapshotMeta>, ServiceError> {
        for meta in self.store.list_snapshots()? {
            let meta = match meta {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable snapshot metadata");
                    continue;
                }
            };
            if meta.params_hash == *params_hash
                && meta.range == request.range
                && meta.symbols == request.symbols
                && !meta.is_partial()
            {
                return Ok(Some(meta));
            }
        }
        Ok(None)
    }

    /// Metadata of every stored snapshot, newest first.
    pub fn list_snapshots(&self) -> Result<Vec<SnapshotMeta>, ServiceError> {
        self.store
            .list_snapshots()?
            .map(|meta| meta.map_err(ServiceError::from))
            .collect()
    }

    pub fn get_snapshot(&self, id: &SnapshotId) -> Result<Arc<Snapshot>, ServiceError> {
        Ok(self.store.load_snapshot(id)?)
    }

    pub fn latest_snapshot(&self) -> Result<Arc<Snapshot>, ServiceError> {
        Ok(self.store.latest_snapshot()?)
    }

    /// Delete a snapshot bundle together with its cached metrics.
    pub fn delete_snapshot(&self, id: &SnapshotId) -> Result<(), ServiceError> {
        self.store.delete_snapshot(id)?;
        let dropped = self.cache.invalidate(id);
        info!(snapshot = %id, cache_entries = dropped, "snapshot removed");
        Ok(())
    }

    // ─── Trades & metrics ───────────────────────────────────────────

    pub fn construct_trades(
        &self,
        id: &SnapshotId,
        filter: &TradeFilter,
        overrides: &ParameterOverrides,
    ) -> Result<ConstructedTrades, ServiceError> {
        let (snapshot, params) = self.resolve(id, overrides)?;
        let constructed = construct_trades(&snapshot, &params).filtered(filter);
        debug!(
            snapshot = %id,
            trades = constructed.trade_count(),
            "constructed trades"
        );
        Ok(constructed)
    }

    /// Compute one metric kind over every trade in the snapshot.
    ///
    /// With `use_cache`, the result is served from (and stored in) the metrics
    /// cache under `(id, params_hash, kind)`.
    pub fn compute_metrics(
        &self,
        id: &SnapshotId,
        kind: MetricKind,
        use_cache: bool,
        overrides: &ParameterOverrides,
    ) -> Result<MetricsResponse, ServiceError> {
        let (snapshot, params) = self.resolve(id, overrides)?;
        let params_hash = params.compute_hash();
        let compute = || {
            let trades = construct_trades(&snapshot, &params).all_trades();
            compute_metric(kind, &trades, &params)
        };

        let (record, cache_hit) = if use_cache {
            let key = CacheKey::new(id.clone(), params_hash.clone(), kind);
            let lookup = self.cache.get_or_compute(&key, compute)?;
            (lookup.entry.record.clone(), lookup.hit)
        } else {
            (compute()?, false)
        };

        info!(
            snapshot = %id,
            kind = %kind,
            params = params_hash.short(),
            cache_hit,
            "metrics computed"
        );
        Ok(MetricsResponse {
            snapshot_id: id.clone(),
            params_hash,
            cache_hit,
            record,
        })
    }

    /// Drop cached metrics for one snapshot.
    pub fn clear_cache(&self, id: &SnapshotId) -> usize {
        self.cache.invalidate(id)
    }

    /// Load the snapshot and derive the effective parameters for this call.
    ///
    /// Window overrides would change the stored indicator tables, so they
    /// need a new snapshot instead.
    fn resolve(
        &self,
        id: &SnapshotId,
        overrides: &ParameterOverrides,
    ) -> Result<(Arc<Snapshot>, CalculationParameters), ServiceError> {
        if let Some(field) = overrides.indicator_table_field() {
            return Err(ServiceError::InvalidParameters {
                field: field.to_string(),
                reason: "changes the indicator tables; create a new snapshot instead".into(),
            });
        }
        let snapshot = self.store.load_snapshot(id)?;
        let params = snapshot.parameters.with_overrides(overrides)?;
        Ok((snapshot, params))
    }
}
