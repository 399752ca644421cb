//! Bounded retry around provider fetches.
//!
//! Only retryable errors (`DataError::Network`) are retried, with exponential
//! backoff. The attempt budget is explicit; exhaustion is reported to the caller
//! with the number of attempts made.

use super::provider::{DataError, MarketDataProvider};
use crate::domain::Bar;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Retry budget for one symbol fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one (>= 1).
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each subsequent one.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no sleeping.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 0,
        }
    }

    fn delay_before(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(2));
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

/// Failure after the retry budget was spent (or on a terminal error).
#[derive(Debug)]
pub struct FetchFailure {
    pub attempts: u32,
    pub error: DataError,
}

/// Fetch bars, retrying transient failures within `policy`.
pub fn fetch_with_retry(
    provider: &dyn MarketDataProvider,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
    policy: &RetryPolicy,
) -> Result<Vec<Bar>, FetchFailure> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match provider.fetch_bars(symbol, start, end) {
            Ok(bars) => return Ok(bars),
            Err(error) if error.is_retryable() && attempt < max_attempts => {
                warn!(
                    provider = provider.name(),
                    symbol,
                    attempt,
                    max_attempts,
                    error = %error,
                    "fetch failed, retrying"
                );
                attempt += 1;
                let delay = policy.delay_before(attempt);
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
            Err(error) => {
                return Err(FetchFailure {
                    attempts: attempt,
                    error,
                })
            }
        }
    }
}
