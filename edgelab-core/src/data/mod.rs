//! Market-data collaborators: provider trait, reference providers, bounded retry.

pub mod csv_provider;
pub mod provider;
pub mod retry;
pub mod synthetic;

pub use csv_provider::CsvProvider;
pub use provider::{DataError, MarketDataProvider};
pub use retry::{fetch_with_retry, FetchFailure, RetryPolicy};
pub use synthetic::SyntheticProvider;
