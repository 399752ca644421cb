//! On-disk snapshot store.
//!
//! Layout: `{root}/{snapshot_id}/`
//! - `meta.json`: `SnapshotMeta`
//! - `parameters.json`: the `CalculationParameters` the tables were derived with
//! - `symbol={SYMBOL}.parquet`: one indicator table per symbol
//!
//! Bundles are written to `{snapshot_id}.tmp` and renamed into place, so a
//! reader never observes a half-written snapshot. A bundle is never rewritten
//! after the rename. Recently loaded snapshots are memoized as `Arc<Snapshot>`
//! behind a read-write lock, so concurrent readers share one copy and never
//! wait on a build. The memo holds at most `memo_capacity` bundles and evicts
//! the oldest insertion first.

use chrono::{NaiveDate, NaiveDateTime, SubsecRound, Utc};
use edgelab_core::domain::{
    is_valid_symbol, IndicatorRow, IndicatorTable, Snapshot, SnapshotId, SnapshotMeta,
};
use edgelab_core::params::CalculationParameters;
use parking_lot::{Mutex, RwLock};
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

const META_FILE: &str = "meta.json";
const PARAMS_FILE: &str = "parameters.json";
const TMP_SUFFIX: &str = ".tmp";
const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";
const STAMP_PARSE_FORMAT: &str = "%Y%m%dT%H%M%S%.fZ";
/// Largest per-stamp sequence number; ids carry it zero-padded to four digits.
const MAX_SEQ: u32 = 9_999;
pub const DEFAULT_MEMO_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot not found: {id}")]
    NotFound { id: SnapshotId },

    #[error("no snapshots exist in {root}")]
    Empty { root: PathBuf },

    #[error("snapshot {id} already exists")]
    AlreadyExists { id: SnapshotId },

    #[error("invalid snapshot id '{0}'")]
    InvalidId(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("corrupt snapshot {id}: {reason}")]
    Corrupt { id: SnapshotId, reason: String },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Bounded insertion-ordered memo of loaded bundles.
struct Memo {
    entries: HashMap<SnapshotId, Arc<Snapshot>>,
    order: VecDeque<SnapshotId>,
    capacity: usize,
}

impl Memo {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Insert unless already present; returns the shared copy either way.
    fn insert(&mut self, id: SnapshotId, snapshot: Arc<Snapshot>) -> Arc<Snapshot> {
        if let Some(existing) = self.entries.get(&id) {
            return Arc::clone(existing);
        }
        if self.capacity == 0 {
            return snapshot;
        }
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        self.order.push_back(id.clone());
        self.entries.insert(id, Arc::clone(&snapshot));
        snapshot
    }

    fn remove(&mut self, id: &SnapshotId) {
        if self.entries.remove(id).is_some() {
            self.order.retain(|x| x != id);
        }
    }
}

/// Immutable snapshot bundles under one root directory.
pub struct SnapshotStore {
    root: PathBuf,
    loaded: RwLock<Memo>,
    /// Last issued `(timestamp, sequence)`, keeps ids strictly increasing.
    last_id: Mutex<Option<(NaiveDateTime, u32)>>,
}

impl SnapshotStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(io_err(&root))?;
        let last = sorted_ids(&root)?
            .last()
            .and_then(|id| split_id(id.as_str()));
        Ok(Self {
            root,
            loaded: RwLock::new(Memo::new(DEFAULT_MEMO_CAPACITY)),
            last_id: Mutex::new(last),
        })
    }

    /// Keep at most `capacity` loaded bundles in memory. Zero disables the memo.
    pub fn with_memo_capacity(mut self, capacity: usize) -> Self {
        self.loaded = RwLock::new(Memo::new(capacity));
        self
    }

    /// Number of bundles currently held in memory.
    pub fn memoized(&self) -> usize {
        self.loaded.read().entries.len()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshot_dir(&self, id: &SnapshotId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Issue a fresh, time-ordered id: `YYYYMMDDTHHMMSS.ffffffZ-NNNN`.
    ///
    /// Ids issued by one store are strictly increasing even if the clock
    /// stalls or steps backwards.
    pub fn next_id(&self) -> SnapshotId {
        let now = Utc::now().naive_utc().trunc_subsecs(6);
        let mut last = self.last_id.lock();
        let (stamp, seq) = next_slot(*last, now);
        *last = Some((stamp, seq));
        format_id(stamp, seq)
    }

    pub fn contains(&self, id: &SnapshotId) -> bool {
        self.loaded.read().entries.contains_key(id)
            || self.snapshot_dir(id).join(META_FILE).is_file()
    }

    /// Write a new bundle atomically and memoize it.
    pub fn persist(&self, snapshot: Snapshot) -> Result<Arc<Snapshot>, StoreError> {
        let id = snapshot.id().clone();
        if !id.is_well_formed() || id.as_str().ends_with(TMP_SUFFIX) {
            return Err(StoreError::InvalidId(id.0));
        }
        let final_dir = self.snapshot_dir(&id);
        if final_dir.exists() {
            return Err(StoreError::AlreadyExists { id });
        }

        let tmp_dir = self.root.join(format!("{id}{TMP_SUFFIX}"));
        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir).map_err(io_err(&tmp_dir))?;
        }
        fs::create_dir_all(&tmp_dir).map_err(io_err(&tmp_dir))?;

        if let Err(e) = write_bundle(&tmp_dir, &snapshot) {
            let _ = fs::remove_dir_all(&tmp_dir);
            return Err(e);
        }
        fs::rename(&tmp_dir, &final_dir).map_err(|source| {
            let _ = fs::remove_dir_all(&tmp_dir);
            StoreError::Io {
                path: final_dir.clone(),
                source,
            }
        })?;

        info!(
            snapshot = %id,
            symbols = snapshot.tables.len(),
            params_hash = snapshot.meta.params_hash.short(),
            "persisted snapshot"
        );
        Ok(self.loaded.write().insert(id, Arc::new(snapshot)))
    }

    /// Load a snapshot, from memory if it was already loaded.
    pub fn load_snapshot(&self, id: &SnapshotId) -> Result<Arc<Snapshot>, StoreError> {
        if let Some(s) = self.loaded.read().entries.get(id) {
            return Ok(Arc::clone(s));
        }
        if !id.is_well_formed() {
            return Err(StoreError::NotFound { id: id.clone() });
        }

        let dir = self.snapshot_dir(id);
        if !dir.join(META_FILE).is_file() {
            return Err(StoreError::NotFound { id: id.clone() });
        }
        let snapshot = read_bundle(&dir, id)?;
        debug!(snapshot = %id, "loaded snapshot from disk");

        Ok(self.loaded.write().insert(id.clone(), Arc::new(snapshot)))
    }

    /// Lazy iterator over snapshot metadata, newest first.
    ///
    /// Each call takes a fresh directory listing, so the iterator can be
    /// restarted by calling this again.
    pub fn list_snapshots(&self) -> Result<SnapshotIter, StoreError> {
        let mut ids = sorted_ids(&self.root)?;
        ids.reverse();
        Ok(SnapshotIter {
            root: self.root.clone(),
            ids: ids.into_iter(),
        })
    }

    /// The most recently created snapshot.
    pub fn latest_snapshot(&self) -> Result<Arc<Snapshot>, StoreError> {
        let ids = sorted_ids(&self.root)?;
        match ids.last() {
            Some(id) => self.load_snapshot(id),
            None => Err(StoreError::Empty {
                root: self.root.clone(),
            }),
        }
    }

    /// Remove a bundle from disk and memory.
    pub fn delete_snapshot(&self, id: &SnapshotId) -> Result<(), StoreError> {
        let dir = self.snapshot_dir(id);
        if !id.is_well_formed() || !dir.join(META_FILE).is_file() {
            return Err(StoreError::NotFound { id: id.clone() });
        }
        self.loaded.write().remove(id);
        fs::remove_dir_all(&dir).map_err(io_err(&dir))?;
        info!(snapshot = %id, "deleted snapshot");
        Ok(())
    }
}

/// Iterator returned by [`SnapshotStore::list_snapshots`].
pub struct SnapshotIter {
    root: PathBuf,
    ids: std::vec::IntoIter<SnapshotId>,
}

impl Iterator for SnapshotIter {
    type Item = Result<SnapshotMeta, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;
        Some(read_json(&self.root.join(id.as_str()).join(META_FILE)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

/// Committed snapshot ids under `root`, ascending (oldest first).
fn sorted_ids(root: &Path) -> Result<Vec<SnapshotId>, StoreError> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(root).map_err(io_err(root))? {
        let entry = entry.map_err(io_err(root))?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.ends_with(TMP_SUFFIX) || !entry.path().join(META_FILE).is_file() {
            continue;
        }
        let id = SnapshotId::new(name);
        if id.is_well_formed() {
            ids.push(id);
        }
    }
    ids.sort();
    Ok(ids)
}

fn split_id(id: &str) -> Option<(NaiveDateTime, u32)> {
    let (stamp, seq) = id.rsplit_once('-')?;
    let stamp = NaiveDateTime::parse_from_str(stamp, STAMP_PARSE_FORMAT).ok()?;
    Some((stamp, seq.parse().ok()?))
}

fn format_id(stamp: NaiveDateTime, seq: u32) -> SnapshotId {
    SnapshotId::new(format!("{}-{seq:04}", stamp.format(STAMP_FORMAT)))
}

/// Next `(stamp, sequence)` after `last`. Once the sequence is exhausted the
/// stamp moves forward one microsecond, so the padded ids keep sorting in
/// issue order.
fn next_slot(last: Option<(NaiveDateTime, u32)>, now: NaiveDateTime) -> (NaiveDateTime, u32) {
    match last {
        Some((prev, seq)) if prev >= now && seq < MAX_SEQ => (prev, seq + 1),
        Some((prev, _)) if prev >= now => (prev + chrono::Duration::microseconds(1), 0),
        _ => (now, 0),
    }
}

fn table_path(dir: &Path, symbol: &str) -> PathBuf {
    dir.join(format!("symbol={symbol}.parquet"))
}

// ─── Bundle I/O ─────────────────────────────────────────────────────

fn write_bundle(dir: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    write_json(&dir.join(META_FILE), &snapshot.meta)?;
    write_json(&dir.join(PARAMS_FILE), &snapshot.parameters)?;
    for (symbol, table) in &snapshot.tables {
        let df = table_to_dataframe(table)?;
        write_parquet(&df, &table_path(dir, symbol))?;
    }
    Ok(())
}

fn read_bundle(dir: &Path, id: &SnapshotId) -> Result<Snapshot, StoreError> {
    let meta: SnapshotMeta = read_json(&dir.join(META_FILE))?;
    // Deserialization validates the parameters as well.
    let parameters: CalculationParameters =
        read_json(&dir.join(PARAMS_FILE)).map_err(|e| match e {
            StoreError::Json { source, .. } => StoreError::Corrupt {
                id: id.clone(),
                reason: format!("parameters: {source}"),
            },
            other => other,
        })?;
    if meta.params_hash != parameters.compute_hash() {
        return Err(StoreError::Corrupt {
            id: id.clone(),
            reason: "parameters do not match recorded hash".into(),
        });
    }

    let mut tables = BTreeMap::new();
    for (symbol, &expected) in &meta.bar_counts {
        if !is_valid_symbol(symbol) {
            return Err(StoreError::Corrupt {
                id: id.clone(),
                reason: format!("invalid symbol '{symbol}' in metadata"),
            });
        }
        let path = table_path(dir, symbol);
        let file = fs::File::open(&path).map_err(io_err(&path))?;
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| StoreError::Parquet(format!("read {}: {e}", path.display())))?;
        let table = dataframe_to_table(symbol, &df)?;
        if table.len() != expected {
            return Err(StoreError::Corrupt {
                id: id.clone(),
                reason: format!("{symbol}: {} rows, expected {expected}", table.len()),
            });
        }
        tables.insert(symbol.clone(), table);
    }

    Ok(Snapshot {
        meta,
        parameters,
        tables,
    })
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(io_err(path))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let content = fs::read_to_string(path).map_err(io_err(path))?;
    serde_json::from_str(&content).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Convert an indicator table to a DataFrame. Undefined values are nulls.
fn table_to_dataframe(table: &IndicatorTable) -> Result<DataFrame, StoreError> {
    let rows = &table.rows;
    let dates: Vec<i32> = rows
        .iter()
        .map(|r| (r.date - epoch()).num_days() as i32)
        .collect();
    let col = |f: fn(&IndicatorRow) -> f64| rows.iter().map(f).collect::<Vec<f64>>();
    let opt = |f: fn(&IndicatorRow) -> Option<f64>| rows.iter().map(f).collect::<Vec<_>>();
    let volumes: Vec<u64> = rows.iter().map(|r| r.volume).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| StoreError::Parquet(format!("date cast: {e}")))?,
        Column::new("open".into(), col(|r| r.open)),
        Column::new("high".into(), col(|r| r.high)),
        Column::new("low".into(), col(|r| r.low)),
        Column::new("close".into(), col(|r| r.close)),
        Column::new("volume".into(), volumes),
        Column::new("indicator".into(), opt(|r| r.indicator)),
        Column::new("percentile".into(), opt(|r| r.percentile)),
        Column::new("atr".into(), opt(|r| r.atr)),
        Column::new("regime_ma".into(), opt(|r| r.regime_ma)),
    ])
    .map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), StoreError> {
    let file = fs::File::create(path).map_err(io_err(path))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| StoreError::Parquet(format!("write {}: {e}", path.display())))?;
    Ok(())
}

fn column<'a>(df: &'a DataFrame, symbol: &str, name: &str) -> Result<&'a Column, StoreError> {
    df.column(name)
        .map_err(|e| StoreError::Parquet(format!("{symbol}: column '{name}': {e}")))
}

fn f64_column<'a>(
    df: &'a DataFrame,
    symbol: &str,
    name: &str,
) -> Result<&'a Float64Chunked, StoreError> {
    column(df, symbol, name)?
        .f64()
        .map_err(|e| StoreError::Parquet(format!("{symbol}: column '{name}' type: {e}")))
}

/// Convert a DataFrame back to an indicator table.
fn dataframe_to_table(symbol: &str, df: &DataFrame) -> Result<IndicatorTable, StoreError> {
    let date_ca = column(df, symbol, "date")?
        .date()
        .map_err(|e| StoreError::Parquet(format!("{symbol}: date column type: {e}")))?;
    let vol_ca = column(df, symbol, "volume")?
        .u64()
        .map_err(|e| StoreError::Parquet(format!("{symbol}: volume column type: {e}")))?;
    let open = f64_column(df, symbol, "open")?;
    let high = f64_column(df, symbol, "high")?;
    let low = f64_column(df, symbol, "low")?;
    let close = f64_column(df, symbol, "close")?;
    let indicator = f64_column(df, symbol, "indicator")?;
    let percentile = f64_column(df, symbol, "percentile")?;
    let atr = f64_column(df, symbol, "atr")?;
    let regime_ma = f64_column(df, symbol, "regime_ma")?;

    let n = df.height();
    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let days = date_ca
            .get(i)
            .ok_or_else(|| StoreError::Parquet(format!("{symbol}: null date at row {i}")))?;
        rows.push(IndicatorRow {
            date: epoch() + chrono::Duration::days(days as i64),
            open: open.get(i).unwrap_or(f64::NAN),
            high: high.get(i).unwrap_or(f64::NAN),
            low: low.get(i).unwrap_or(f64::NAN),
            close: close.get(i).unwrap_or(f64::NAN),
            volume: vol_ca.get(i).unwrap_or(0),
            indicator: indicator.get(i),
            percentile: percentile.get(i),
            atr: atr.get(i),
            regime_ma: regime_ma.get(i),
        });
    }

    Ok(IndicatorTable {
        symbol: symbol.to_string(),
        rows,
    })
}
