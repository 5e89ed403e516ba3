//! Mock fill source for testing without network calls.

use async_trait::async_trait;

use super::{FillSource, FillSourceError, RawFill};
use crate::domain::{parse_timestamp, RawTimestamp, TimeMs};

/// Mock fill source returning predefined raw fills per account.
#[derive(Debug, Clone, Default)]
pub struct MockFillSource {
    fills: Vec<(String, RawFill)>,
    failure: Option<FillSourceError>,
}

impl MockFillSource {
    /// Create an empty mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one raw fill for an account.
    pub fn with_fill(mut self, account_id: &str, fill: RawFill) -> Self {
        self.fills.push((account_id.to_string(), fill));
        self
    }

    /// Add multiple raw fills for an account.
    pub fn with_fills(mut self, account_id: &str, fills: Vec<RawFill>) -> Self {
        for fill in fills {
            self.fills.push((account_id.to_string(), fill));
        }
        self
    }

    /// Make every fetch fail with the given error.
    pub fn with_failure(mut self, err: FillSourceError) -> Self {
        self.failure = Some(err);
        self
    }
}

/// Best-effort parse of a raw fill's time for window filtering.
fn raw_time_ms(raw: &RawFill) -> Option<i64> {
    let far_future = TimeMs::new(i64::MAX / 2);
    [
        raw.timestamp.as_ref(),
        raw.time.as_ref(),
        raw.executed_at.as_ref(),
        raw.transaction_time.as_ref(),
    ]
    .into_iter()
    .flatten()
    .next()
    .and_then(|ts: &RawTimestamp| parse_timestamp(ts, far_future))
    .map(|t| t.as_i64())
}

#[async_trait]
impl FillSource for MockFillSource {
    async fn fetch_fills(
        &self,
        account_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<RawFill>, FillSourceError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        Ok(self
            .fills
            .iter()
            .filter(|(account, raw)| {
                if account != account_id {
                    return false;
                }
                // Fills without a parseable time stay in every window, the
                // way a sloppy upstream would return them.
                match raw_time_ms(raw) {
                    Some(t) => t >= start_ms && t <= end_ms,
                    None => true,
                }
            })
            .map(|(_, raw)| raw.clone())
            .collect())
    }
}
