//! CSV-directory market-data provider.
//!
//! Layout: `{dir}/{SYMBOL}.csv` with header `date,open,high,low,close,volume`
//! (dates as `YYYY-MM-DD`). Missing files and empty ranges are `NoData`.
//! Symbols that could escape `dir` are `Malformed` and never touch the disk.

use super::provider::{normalize_bars, DataError, MarketDataProvider};
use crate::domain::{is_valid_symbol, Bar};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct CsvRecord {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: u64,
}

pub struct CsvProvider {
    dir: PathBuf,
}

impl CsvProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn symbol_path(&self, symbol: &str) -> Result<PathBuf, DataError> {
        if !is_valid_symbol(symbol) {
            return Err(DataError::Malformed {
                symbol: symbol.to_string(),
                reason: "not a valid ticker symbol".into(),
            });
        }
        Ok(self.dir.join(format!("{symbol}.csv")))
    }
}

impl MarketDataProvider for CsvProvider {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, DataError> {
        let no_data = || DataError::NoData {
            symbol: symbol.to_string(),
            start,
            end,
        };

        let path = self.symbol_path(symbol)?;
        if !path.exists() {
            return Err(no_data());
        }

        let mut reader = csv::Reader::from_path(&path).map_err(|e| DataError::Malformed {
            symbol: symbol.to_string(),
            reason: format!("open {}: {e}", path.display()),
        })?;

        let mut bars = Vec::new();
        for (line, record) in reader.deserialize::<CsvRecord>().enumerate() {
            let r = record.map_err(|e| DataError::Malformed {
                symbol: symbol.to_string(),
                reason: format!("row {}: {e}", line + 1),
            })?;
            let bar = Bar {
                date: r.date,
                open: r.open,
                high: r.high,
                low: r.low,
                close: r.close,
                volume: r.volume,
            };
            if !bar.is_sane() {
                return Err(DataError::Malformed {
                    symbol: symbol.to_string(),
                    reason: format!("row {}: inconsistent OHLC on {}", line + 1, bar.date),
                });
            }
            bars.push(bar);
        }

        let bars = normalize_bars(bars, start, end);
        if bars.is_empty() {
            return Err(no_data());
        }
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn write_csv(dir: &Path, symbol: &str, body: &str) {
        fs::write(
            dir.join(format!("{symbol}.csv")),
            format!("date,open,high,low,close,volume\n{body}"),
        )
        .unwrap();
    }

    #[test]
    fn reads_bars_in_range() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "SPY",
            "2024-01-03,101,103,100,102,1100\n2024-01-02,100,102,99,101,1000\n2024-01-10,1,1,1,1,1\n",
        );
        let provider = CsvProvider::new(dir.path());
        let bars = provider.fetch_bars("SPY", day(1), day(5)).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, day(2));
        assert_eq!(bars[1].close, 102.0);
    }

    #[test]
    fn missing_file_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CsvProvider::new(dir.path());
        let err = provider.fetch_bars("QQQ", day(1), day(5)).unwrap_err();
        assert!(matches!(err, DataError::NoData { .. }));
    }

    #[test]
    fn empty_range_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "SPY", "2024-01-02,100,102,99,101,1000\n");
        let provider = CsvProvider::new(dir.path());
        let err = provider.fetch_bars("SPY", day(10), day(20)).unwrap_err();
        assert!(matches!(err, DataError::NoData { .. }));
    }

    #[test]
    fn inconsistent_bar_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "SPY", "2024-01-02,100,90,99,101,1000\n");
        let provider = CsvProvider::new(dir.path());
        let err = provider.fetch_bars("SPY", day(1), day(5)).unwrap_err();
        assert!(matches!(err, DataError::Malformed { .. }));
    }

    #[test]
    fn traversal_symbol_never_reads_outside_dir() {
        let root = tempfile::tempdir().unwrap();
        let data = root.path().join("data");
        fs::create_dir(&data).unwrap();
        write_csv(root.path(), "SECRET", "2024-01-02,100,102,99,101,1000\n");

        let provider = CsvProvider::new(&data);
        for symbol in ["../SECRET", "..", "sub/SECRET"] {
            let err = provider.fetch_bars(symbol, day(1), day(5)).unwrap_err();
            assert!(matches!(err, DataError::Malformed { .. }), "{symbol}: {err}");
            assert!(!err.is_retryable());
        }
    }
}
