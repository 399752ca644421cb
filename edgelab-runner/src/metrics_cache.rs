//! Content-addressed metrics cache with single-flight computation.
//!
//! Keys are `(snapshot_id, params_hash, kind)`. Entries are immutable once
//! stored. A lookup takes the map lock only long enough to find (or create) the
//! per-key slot, then computes under that slot's lock, so concurrent requests
//! for the same key wait for a single computation while other keys proceed.
//!
//! With persistence enabled, entries are also written through to
//! `{dir}/{snapshot_id}/{params_hash}/{kind}.json` and read back on a memory miss.

use chrono::{DateTime, Utc};
use edgelab_core::domain::{ParamsHash, SnapshotId};
use edgelab_core::metrics::{MetricKind, MetricsError, MetricsRecord};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub snapshot_id: SnapshotId,
    pub params_hash: ParamsHash,
    pub kind: MetricKind,
}

impl CacheKey {
    pub fn new(snapshot_id: SnapshotId, params_hash: ParamsHash, kind: MetricKind) -> Self {
        Self {
            snapshot_id,
            params_hash,
            kind,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.snapshot_id,
            self.params_hash.short(),
            self.kind
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub record: MetricsRecord,
    pub created_at: DateTime<Utc>,
}

/// Result of [`MetricsCache::get_or_compute`].
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub entry: Arc<CacheEntry>,
    /// `false` when this call ran the computation.
    pub hit: bool,
}

#[derive(Debug, Error)]
pub enum CacheError {
    /// The computation failed; nothing was stored.
    #[error("metric computation failed for {key}: {source}")]
    ComputationFailed {
        key: CacheKey,
        #[source]
        source: MetricsError,
    },
}

type Slot = Arc<Mutex<Option<Arc<CacheEntry>>>>;

pub struct MetricsCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
    persist_dir: Option<PathBuf>,
}

impl Default for MetricsCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl MetricsCache {
    pub fn in_memory() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            persist_dir: None,
        }
    }

    /// Memory cache backed by write-through JSON records under `dir`.
    pub fn with_persistence(dir: impl Into<PathBuf>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            persist_dir: Some(dir.into()),
        }
    }

    pub fn persist_dir(&self) -> Option<&Path> {
        self.persist_dir.as_deref()
    }

    /// Return the cached entry for `key`, computing it at most once.
    ///
    /// Failed computations are returned as `ComputationFailed` and leave the
    /// key empty, so the next call computes again.
    pub fn get_or_compute<F>(&self, key: &CacheKey, compute: F) -> Result<CacheLookup, CacheError>
    where
        F: FnOnce() -> Result<MetricsRecord, MetricsError>,
    {
        let slot: Slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        let mut value = slot.lock();

        if let Some(entry) = value.as_ref() {
            return Ok(CacheLookup {
                entry: Arc::clone(entry),
                hit: true,
            });
        }

        if let Some(entry) = self.read_persisted(key) {
            debug!(key = %key, "metrics cache: loaded persisted entry");
            let entry = Arc::new(entry);
            *value = Some(Arc::clone(&entry));
            return Ok(CacheLookup { entry, hit: true });
        }

        let record = compute().map_err(|source| CacheError::ComputationFailed {
            key: key.clone(),
            source,
        })?;
        let entry = Arc::new(CacheEntry {
            key: key.clone(),
            record,
            created_at: Utc::now(),
        });
        *value = Some(Arc::clone(&entry));
        debug!(key = %key, "metrics cache: computed entry");

        // An invalidation that ran while we computed has already detached this
        // slot; writing its record to disk would resurrect the entry.
        if self.persist_dir.is_some() && self.is_current(key, &slot) {
            self.write_persisted(&entry);
        }

        Ok(CacheLookup { entry, hit: false })
    }

    /// Cached entry without computing.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let slot = self.slots.lock().get(key).cloned()?;
        let value = slot.lock();
        value.clone()
    }

    /// Number of stored entries in memory.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|s| s.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry for a snapshot. Returns the number of entries removed.
    pub fn invalidate(&self, snapshot_id: &SnapshotId) -> usize {
        self.remove_where(|k| &k.snapshot_id == snapshot_id, Some(snapshot_id), None)
    }

    /// Drop the entries of one `(snapshot, params_hash)` pair.
    pub fn invalidate_params(&self, snapshot_id: &SnapshotId, params_hash: &ParamsHash) -> usize {
        self.remove_where(
            |k| &k.snapshot_id == snapshot_id && &k.params_hash == params_hash,
            Some(snapshot_id),
            Some(params_hash),
        )
    }

    /// Drop everything, in memory and on disk.
    pub fn clear(&self) -> usize {
        self.remove_where(|_| true, None, None)
    }

    fn is_current(&self, key: &CacheKey, slot: &Slot) -> bool {
        self.slots
            .lock()
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    fn remove_where<P>(
        &self,
        pred: P,
        snapshot_id: Option<&SnapshotId>,
        params_hash: Option<&ParamsHash>,
    ) -> usize
    where
        P: Fn(&CacheKey) -> bool,
    {
        let detached: Vec<(CacheKey, Slot)> = {
            let mut slots = self.slots.lock();
            let keys: Vec<CacheKey> = slots.keys().filter(|k| pred(k)).cloned().collect();
            keys.into_iter()
                .filter_map(|k| slots.remove(&k).map(|s| (k, s)))
                .collect()
        };

        let mut removed: HashSet<CacheKey> = detached
            .into_iter()
            .filter(|(_, slot)| slot.lock().is_some())
            .map(|(k, _)| k)
            .collect();
        removed.extend(self.remove_persisted(snapshot_id, params_hash));

        if !removed.is_empty() {
            debug!(count = removed.len(), "metrics cache: invalidated entries");
        }
        removed.len()
    }

    // ─── Persistence ────────────────────────────────────────────────

    fn entry_path(dir: &Path, key: &CacheKey) -> PathBuf {
        dir.join(key.snapshot_id.as_str())
            .join(key.params_hash.as_str())
            .join(format!("{}.json", key.kind))
    }

    fn read_persisted(&self, key: &CacheKey) -> Option<CacheEntry> {
        let dir = self.persist_dir.as_deref()?;
        if !key.snapshot_id.is_well_formed() {
            return None;
        }
        let path = Self::entry_path(dir, key);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) if &entry.key == key => Some(entry),
            Ok(_) => {
                warn!(path = %path.display(), "metrics cache: key mismatch, ignoring record");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "metrics cache: unreadable record, ignoring");
                None
            }
        }
    }

    /// Write-through is best effort: the entry is already in memory.
    fn write_persisted(&self, entry: &CacheEntry) {
        let Some(dir) = self.persist_dir.as_deref() else {
            return;
        };
        if !entry.key.snapshot_id.is_well_formed() {
            return;
        }
        let path = Self::entry_path(dir, &entry.key);
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(entry)?;
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, json)?;
            fs::rename(&tmp, &path)
        })();
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "metrics cache: failed to persist entry");
        }
    }

    /// Delete persisted records matching the filter; returns their keys.
    fn remove_persisted(
        &self,
        snapshot_id: Option<&SnapshotId>,
        params_hash: Option<&ParamsHash>,
    ) -> Vec<CacheKey> {
        let Some(dir) = self.persist_dir.as_deref() else {
            return Vec::new();
        };
        let snapshot_dirs: Vec<PathBuf> = match snapshot_id {
            Some(id) if id.is_well_formed() => vec![dir.join(id.as_str())],
            Some(_) => Vec::new(),
            None => list_dirs(dir),
        };

        let mut removed = Vec::new();
        for snap_dir in snapshot_dirs {
            let Some(snap_name) = file_name(&snap_dir) else {
                continue;
            };
            let hash_dirs = match params_hash {
                Some(h) => vec![snap_dir.join(h.as_str())],
                None => list_dirs(&snap_dir),
            };
            for hash_dir in hash_dirs {
                let Some(hash_name) = file_name(&hash_dir) else {
                    continue;
                };
                for kind in MetricKind::ALL {
                    if hash_dir.join(format!("{kind}.json")).is_file() {
                        removed.push(CacheKey::new(
                            SnapshotId::new(snap_name.clone()),
                            ParamsHash(hash_name.clone()),
                            kind,
                        ));
                    }
                }
                if hash_dir.exists() {
                    if let Err(e) = fs::remove_dir_all(&hash_dir) {
                        warn!(path = %hash_dir.display(), error = %e, "metrics cache: failed to remove records");
                    }
                }
            }
            if params_hash.is_none() || list_dirs(&snap_dir).is_empty() {
                let _ = fs::remove_dir_all(&snap_dir);
            }
        }
        removed
    }
}

fn list_dirs(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_dir())
                .collect()
        })
        .unwrap_or_default()
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()?.to_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgelab_core::metrics::{compute_metric, MetricKind};
    use edgelab_core::params::CalculationParameters;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(snapshot: &str, kind: MetricKind) -> CacheKey {
        CacheKey::new(
            SnapshotId::new(snapshot),
            CalculationParameters::default().compute_hash(),
            kind,
        )
    }

    fn insufficient() -> Result<MetricsRecord, MetricsError> {
        compute_metric(MetricKind::Expectancy, &[], &CalculationParameters::default())
    }

    fn sample_record() -> MetricsRecord {
        use edgelab_core::domain::{ExitReason, Trade};
        let d = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let trade = Trade {
            symbol: "SPY".into(),
            entry_index: 0,
            entry_date: d,
            entry_price: 100.0,
            entry_percentile: 5.0,
            entry_regime: None,
            exit_index: 2,
            exit_date: d + chrono::Duration::days(2),
            exit_price: 102.0,
            exit_percentile: Some(60.0),
            exit_reason: ExitReason::TargetHit,
            holding_days: 2,
            bars_held: 2,
            return_pct: 2.0,
            stop_distance: 3.0,
            truncated: false,
        };
        compute_metric(MetricKind::Expectancy, &[trade], &CalculationParameters::default())
            .unwrap()
    }

    #[test]
    fn second_lookup_is_a_hit() {
        let cache = MetricsCache::in_memory();
        let k = key("snap-a", MetricKind::Expectancy);
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(sample_record())
        };
        let first = cache.get_or_compute(&k, compute).unwrap();
        let second = cache.get_or_compute(&k, compute).unwrap();
        assert!(!first.hit);
        assert!(second.hit);
        assert!(Arc::ptr_eq(&first.entry, &second.entry));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = MetricsCache::in_memory();
        let k = key("snap-a", MetricKind::Expectancy);
        let err = cache.get_or_compute(&k, insufficient).unwrap_err();
        assert!(matches!(
            err,
            CacheError::ComputationFailed {
                source: MetricsError::InsufficientSample { count: 0, .. },
                ..
            }
        ));
        assert!(cache.is_empty());
        assert!(cache.get(&k).is_none());

        let ok = cache.get_or_compute(&k, || Ok(sample_record())).unwrap();
        assert!(!ok.hit);
    }

    #[test]
    fn invalidate_scopes_to_snapshot() {
        let cache = MetricsCache::in_memory();
        for kind in MetricKind::ALL {
            cache
                .get_or_compute(&key("snap-a", kind), || Ok(sample_record()))
                .unwrap();
        }
        cache
            .get_or_compute(&key("snap-b", MetricKind::Expectancy), || Ok(sample_record()))
            .unwrap();

        assert_eq!(cache.invalidate(&SnapshotId::new("snap-a")), 3);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.invalidate(&SnapshotId::new("snap-a")), 0);
        assert_eq!(cache.clear(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_params_leaves_other_hashes() {
        let cache = MetricsCache::in_memory();
        let a = key("snap-a", MetricKind::Expectancy);
        let mut b = a.clone();
        b.params_hash = ParamsHash::from_bytes(b"other");
        cache.get_or_compute(&a, || Ok(sample_record())).unwrap();
        cache.get_or_compute(&b, || Ok(sample_record())).unwrap();

        assert_eq!(cache.invalidate_params(&a.snapshot_id, &a.params_hash), 1);
        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_some());
    }

    #[test]
    fn persisted_entries_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let k = key("snap-a", MetricKind::Expectancy);
        let original = {
            let cache = MetricsCache::with_persistence(dir.path());
            cache.get_or_compute(&k, || Ok(sample_record())).unwrap().entry
        };
        assert!(dir
            .path()
            .join("snap-a")
            .join(k.params_hash.as_str())
            .join("expectancy.json")
            .is_file());

        let reopened = MetricsCache::with_persistence(dir.path());
        let lookup = reopened
            .get_or_compute(&k, || panic!("should load from disk"))
            .unwrap();
        assert!(lookup.hit);
        assert_eq!(*lookup.entry, *original);

        assert_eq!(reopened.invalidate(&k.snapshot_id), 1);
        assert!(!dir.path().join("snap-a").exists());
    }

    #[test]
    fn key_display_is_compact() {
        let k = key("snap-a", MetricKind::Regime);
        let shown = k.to_string();
        assert!(shown.starts_with("snap-a/"));
        assert!(shown.ends_with("/regime"));
    }
}
