//! Trade construction from percentile-ranked indicator tables.

pub mod engine;
pub mod state;
pub mod stop;

pub use engine::{
    construct_trades, ConstructedTrades, SymbolTrades, TradeConstructionEngine, TradeFilter,
};
pub use state::{OpenPosition, PositionState};
pub use stop::stop_distance;
