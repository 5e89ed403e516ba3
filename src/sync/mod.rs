//! Sync orchestration: one sequential pipeline per broker connection.
//!
//! Fetch -> normalize -> reconcile -> dedup -> persist -> replicate ->
//! stats -> cursor. Retry is by wide re-fetch window on the next scheduled
//! run, not by an in-run backoff primitive; idempotent trade ids make the
//! redundant refetching safe.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

pub mod replication;
pub mod stats;

pub use replication::{
    NoopReplicator, RecordingReplicator, ReplicationError, ReplicationSink, TradeNotice,
};
pub use stats::compute_account_stats;

use crate::config::Config;
use crate::datasource::{normalize_fill, FillSource, FillSourceError};
use crate::db::Repository;
use crate::domain::{BrokerConnection, SyncCursor, SyncStatus, TimeMs};
use crate::engine::{pnl, reconcile_account};

const DAY_MS: i64 = 86_400_000;

/// Error type for a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] FillSourceError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("sync already in flight for connection {0}")]
    AlreadyRunning(String),
}

/// Outcome counters for one sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub fills_fetched: usize,
    pub fills_skipped: usize,
    pub trades_reconciled: usize,
    pub trades_inserted: usize,
    pub trades_deduped: usize,
    pub open_positions: usize,
    pub window_start: TimeMs,
    pub window_end: TimeMs,
}

/// Drives the reconciliation pipeline for broker connections.
pub struct SyncOrchestrator {
    source: Arc<dyn FillSource>,
    repo: Arc<Repository>,
    replicator: Arc<dyn ReplicationSink>,
    config: Config,
    /// Per-connection in-flight guards: at most one run per connection.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn FillSource>,
        repo: Arc<Repository>,
        replicator: Arc<dyn ReplicationSink>,
        config: Config,
    ) -> Self {
        Self {
            source,
            repo,
            replicator,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run one sync pipeline for a connection.
    ///
    /// A second call for the same connection while one is in flight is
    /// refused with [`SyncError::AlreadyRunning`] rather than queued.
    /// Abandoning a run mid-pipeline never records a Success cursor; the
    /// next run re-fetches the same or a wider window and re-derives
    /// identical trade ids for anything already persisted.
    pub async fn sync_connection(
        &self,
        connection: &BrokerConnection,
    ) -> Result<SyncReport, SyncError> {
        let lock = self.connection_lock(&connection.connection_id).await;
        let _guard = lock
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning(connection.connection_id.clone()))?;

        let run_id = Uuid::new_v4();
        let now = TimeMs::now();
        let cursor = self
            .repo
            .get_connection_status(&connection.connection_id)
            .await?;
        let (window_start, window_end) = self.fetch_window(cursor.as_ref(), now);

        info!(
            %run_id,
            connection = %connection.connection_id,
            account = %connection.account_id,
            window_start = window_start.as_i64(),
            window_end = window_end.as_i64(),
            "starting sync run"
        );

        let raw_fills = match self
            .source
            .fetch_fills(
                connection.account_id.as_str(),
                window_start.as_i64(),
                window_end.as_i64(),
            )
            .await
        {
            Ok(fills) => fills,
            Err(err) => {
                self.record_failure(connection, &err.to_string()).await;
                return Err(err.into());
            }
        };

        let fills_fetched = raw_fills.len();
        let mut fills = Vec::with_capacity(fills_fetched);
        for raw in &raw_fills {
            if let Some(fill) = normalize_fill(raw, &connection.account_id, now) {
                fills.push(fill);
            }
        }
        let fills_skipped = fills_fetched - fills.len();

        let output = reconcile_account(&connection.account_id, fills);
        let open_positions = output.open_positions.len();
        let trades_reconciled = output.trades.len();

        for trade in &output.trades {
            pnl::check_divergence(trade, self.config.pnl_divergence_threshold);
        }

        let mut staged = Vec::new();
        let mut trades_deduped = 0usize;
        for trade in output.trades {
            match self.repo.find_trade_by_broker_id(&trade.broker_trade_id).await {
                Ok(Some(_)) => trades_deduped += 1,
                Ok(None) => staged.push(trade),
                Err(err) => {
                    self.record_failure(connection, &err.to_string()).await;
                    return Err(err.into());
                }
            }
        }

        if let Err(err) = self.repo.insert_trades_batch(&staged).await {
            self.record_failure(connection, &err.to_string()).await;
            return Err(err.into());
        }
        let trades_inserted = staged.len();

        for trade in &staged {
            let notice = TradeNotice::from_trade(trade);
            if let Err(err) = self.replicator.notify(&notice).await {
                warn!(
                    trade = %trade.composite_id,
                    error = %err,
                    "replication notification failed, continuing"
                );
            }
        }

        // Recompute from full history, not just this batch; idempotent on
        // already-correct rows.
        let history = match self
            .repo
            .query_trades_for_account(&connection.account_id)
            .await
        {
            Ok(history) => history,
            Err(err) => {
                self.record_failure(connection, &err.to_string()).await;
                return Err(err.into());
            }
        };
        let account_stats = compute_account_stats(&connection.account_id, &history);
        if let Err(err) = self.repo.upsert_account_stats(&account_stats).await {
            self.record_failure(connection, &err.to_string()).await;
            return Err(err.into());
        }

        self.repo
            .upsert_connection_status(
                &connection.connection_id,
                &connection.account_id,
                Some(now.as_i64()),
                SyncStatus::Success,
                None,
            )
            .await?;

        let report = SyncReport {
            fills_fetched,
            fills_skipped,
            trades_reconciled,
            trades_inserted,
            trades_deduped,
            open_positions,
            window_start,
            window_end,
        };
        info!(
            %run_id,
            connection = %connection.connection_id,
            fills_fetched = report.fills_fetched,
            trades_inserted = report.trades_inserted,
            trades_deduped = report.trades_deduped,
            open_positions = report.open_positions,
            "sync run complete"
        );
        Ok(report)
    }

    /// Select the fetch window for a run.
    ///
    /// First sync pulls the trailing lookback period; later syncs start
    /// from before the last recorded success to tolerate late-arriving
    /// fills, accepting redundant refetching as the cost of not missing
    /// data.
    fn fetch_window(&self, cursor: Option<&SyncCursor>, now: TimeMs) -> (TimeMs, TimeMs) {
        let start = match cursor.and_then(|c| c.last_sync_at_ms) {
            Some(last_success) => {
                last_success.as_i64() - self.config.resync_overlap_days * DAY_MS
            }
            None => now.as_i64() - self.config.first_sync_lookback_days * DAY_MS,
        };
        (TimeMs::new(start.max(0)), now)
    }

    async fn connection_lock(&self, connection_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(connection_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn record_failure(&self, connection: &BrokerConnection, detail: &str) {
        error!(
            connection = %connection.connection_id,
            error = detail,
            "sync run failed"
        );
        if let Err(err) = self
            .repo
            .upsert_connection_status(
                &connection.connection_id,
                &connection.account_id,
                None,
                SyncStatus::Error,
                Some(detail),
            )
            .await
        {
            error!(
                connection = %connection.connection_id,
                error = %err,
                "failed to record sync failure"
            );
        }
    }
}
