//! Fill source abstraction for fetching raw executions from a broker.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod broker;
pub mod mock;
pub mod raw;

pub use broker::HttpFillSource;
pub use mock::MockFillSource;
pub use raw::{normalize_fill, RawFill, RawNumber};

/// Source of raw broker fills for one account.
///
/// Implementations own authentication, pagination, and retry/backoff, and
/// may return fills in any order; deterministic ordering is re-established
/// by the reconciliation pass.
#[async_trait]
pub trait FillSource: Send + Sync + fmt::Debug {
    /// Fetch raw fills for an account within a time window (inclusive,
    /// milliseconds since Unix epoch).
    async fn fetch_fills(
        &self,
        account_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<RawFill>, FillSourceError>;
}

/// Error type for fill source operations.
#[derive(Debug, Clone, Error)]
pub enum FillSourceError {
    /// Network error (connection timeout, DNS failure).
    #[error("network error: {0}")]
    Network(String),
    /// Upstream HTTP error.
    #[error("http error {status}: {message}")]
    Http { status: u16, message: String },
    /// Invalid JSON or malformed response body.
    #[error("parse error: {0}")]
    Parse(String),
    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,
}
