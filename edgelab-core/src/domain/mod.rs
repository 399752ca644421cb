//! Domain types for EdgeLab

pub mod bar;
pub mod ids;
pub mod snapshot;
pub mod symbol;
pub mod trade;

pub use bar::Bar;
pub use ids::{DatasetHash, ParamsHash, SnapshotId};
pub use snapshot::{DateRange, IndicatorRow, IndicatorTable, Regime, Snapshot, SnapshotMeta};
pub use symbol::is_valid_symbol;
pub use trade::{ExitReason, Trade};
