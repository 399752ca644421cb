//! EdgeLab Core: parameters, deterministic RNG, snapshots, trade construction, metrics.
//!
//! This crate holds the pure half of the analytics pipeline:
//! - Versioned, content-hashed calculation parameters
//! - A deterministic RNG whose algorithm is part of the public contract
//! - Domain types (bars, indicator tables, snapshots, trades, ids)
//! - Market-data provider trait with CSV and synthetic providers and bounded retry
//! - Indicator math (RSI-MA, rolling percentile rank, ATR, SMA)
//! - Trade construction as an explicit per-symbol state machine
//! - Expectancy, regime and composite metrics with block-bootstrap intervals
//!
//! Nothing here reads the clock or global state on the computation path.

pub mod construction;
pub mod data;
pub mod domain;
pub mod indicators;
pub mod metrics;
pub mod params;
pub mod rng;
pub mod stats;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types shared across worker threads are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::Snapshot>();
        require_sync::<domain::Snapshot>();
        require_send::<domain::SnapshotMeta>();
        require_sync::<domain::SnapshotMeta>();

        // Parameters
        require_send::<params::CalculationParameters>();
        require_sync::<params::CalculationParameters>();
        require_send::<params::ParameterOverrides>();
        require_sync::<params::ParameterOverrides>();

        // Construction and metrics outputs
        require_send::<construction::ConstructedTrades>();
        require_sync::<construction::ConstructedTrades>();
        require_send::<metrics::MetricsRecord>();
        require_sync::<metrics::MetricsRecord>();

        // Providers are shared behind Arc by the snapshot builder
        require_send::<data::CsvProvider>();
        require_sync::<data::CsvProvider>();
        require_send::<data::SyntheticProvider>();
        require_sync::<data::SyntheticProvider>();
        require_send::<indicators::RsiMa>();
        require_sync::<indicators::RsiMa>();
    }
}
