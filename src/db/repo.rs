//! Repository layer for database operations.
//!
//! Decimals round-trip as canonical TEXT to avoid float drift; rows that
//! fail to parse are recovered with a warning rather than failing a whole
//! query.

use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

use crate::domain::{
    AccountId, AccountStats, Direction, ExitLevel, SyncCursor, SyncStatus, Symbol, TimeMs, Trade,
};

/// Repository for trade, sync-cursor, and account-stats operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    // =========================================================================
    // Trade operations
    // =========================================================================

    /// Look up a persisted trade by its idempotency key.
    pub async fn find_trade_by_broker_id(
        &self,
        broker_trade_id: &str,
    ) -> Result<Option<Trade>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT composite_id, broker_trade_id, account_id, symbol, direction,
                   quantity, avg_entry_price, avg_exit_price, realized_pnl, fees,
                   entry_time_ms, exit_time_ms
            FROM trades
            WHERE broker_trade_id = ?
            "#,
        )
        .bind(broker_trade_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut trade = trade_from_row(&row);
                trade.exit_levels = self.load_exit_levels(&trade.broker_trade_id).await?;
                Ok(Some(trade))
            }
            None => Ok(None),
        }
    }

    /// Insert a batch of trades (with their exit levels) in one
    /// transaction: all-or-nothing for the batch.
    ///
    /// Plain INSERT, so a `broker_trade_id` uniqueness violation fails the
    /// batch instead of silently rewriting history. Trades are immutable
    /// once written.
    pub async fn insert_trades_batch(&self, trades: &[Trade]) -> Result<usize, sqlx::Error> {
        if trades.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        for trade in trades {
            sqlx::query(
                r#"
                INSERT INTO trades
                (composite_id, broker_trade_id, account_id, symbol, direction,
                 quantity, avg_entry_price, avg_exit_price, realized_pnl, fees,
                 entry_time_ms, exit_time_ms)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&trade.composite_id)
            .bind(&trade.broker_trade_id)
            .bind(trade.account_id.as_str())
            .bind(trade.symbol.as_str())
            .bind(trade.direction.as_str())
            .bind(canonical(&trade.quantity))
            .bind(canonical(&trade.avg_entry_price))
            .bind(canonical(&trade.avg_exit_price))
            .bind(canonical(&trade.realized_pnl))
            .bind(canonical(&trade.fees))
            .bind(trade.entry_time_ms.as_i64())
            .bind(trade.exit_time_ms.as_i64())
            .execute(&mut *tx)
            .await?;

            for (seq, level) in trade.exit_levels.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO trade_exit_levels
                    (broker_trade_id, seq, price, quantity, time_ms, realized_pnl)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&trade.broker_trade_id)
                .bind(seq as i64)
                .bind(canonical(&level.price))
                .bind(canonical(&level.quantity))
                .bind(level.time_ms.as_i64())
                .bind(level.realized_pnl.as_ref().map(canonical))
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(trades.len())
    }

    /// Full persisted trade history for an account, oldest exit first.
    pub async fn query_trades_for_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Trade>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT composite_id, broker_trade_id, account_id, symbol, direction,
                   quantity, avg_entry_price, avg_exit_price, realized_pnl, fees,
                   entry_time_ms, exit_time_ms
            FROM trades
            WHERE account_id = ?
            ORDER BY exit_time_ms ASC, broker_trade_id ASC
            "#,
        )
        .bind(account_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut trades = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut trade = trade_from_row(row);
            trade.exit_levels = self.load_exit_levels(&trade.broker_trade_id).await?;
            trades.push(trade);
        }
        Ok(trades)
    }

    async fn load_exit_levels(
        &self,
        broker_trade_id: &str,
    ) -> Result<Vec<ExitLevel>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT price, quantity, time_ms, realized_pnl
            FROM trade_exit_levels
            WHERE broker_trade_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(broker_trade_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let pnl: Option<String> = row.get("realized_pnl");
                ExitLevel {
                    price: parse_decimal("price", &row.get::<String, _>("price")),
                    quantity: parse_decimal("quantity", &row.get::<String, _>("quantity")),
                    time_ms: TimeMs::new(row.get("time_ms")),
                    realized_pnl: pnl.map(|s| parse_decimal("realized_pnl", &s)),
                }
            })
            .collect())
    }

    // =========================================================================
    // Sync cursor operations
    // =========================================================================

    /// Record the outcome of a sync run for a connection.
    ///
    /// `last_sync_at_ms = None` (the failure path) preserves the previously
    /// recorded value, so a failed run never narrows the next fetch window.
    pub async fn upsert_connection_status(
        &self,
        connection_id: &str,
        account_id: &AccountId,
        last_sync_at_ms: Option<i64>,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO broker_connections
            (connection_id, account_id, last_sync_at_ms, last_sync_status, last_sync_error)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(connection_id) DO UPDATE SET
                account_id = excluded.account_id,
                last_sync_at_ms = COALESCE(excluded.last_sync_at_ms, broker_connections.last_sync_at_ms),
                last_sync_status = excluded.last_sync_status,
                last_sync_error = excluded.last_sync_error
            "#,
        )
        .bind(connection_id)
        .bind(account_id.as_str())
        .bind(last_sync_at_ms)
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the sync cursor for a connection, if one has been recorded.
    pub async fn get_connection_status(
        &self,
        connection_id: &str,
    ) -> Result<Option<SyncCursor>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT connection_id, account_id, last_sync_at_ms, last_sync_status, last_sync_error
            FROM broker_connections
            WHERE connection_id = ?
            "#,
        )
        .bind(connection_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| SyncCursor {
            connection_id: row.get("connection_id"),
            account_id: AccountId::new(row.get("account_id")),
            last_sync_at_ms: row
                .get::<Option<i64>, _>("last_sync_at_ms")
                .map(TimeMs::new),
            last_sync_status: SyncStatus::parse(&row.get::<String, _>("last_sync_status")),
            last_sync_error: row.get("last_sync_error"),
        }))
    }

    // =========================================================================
    // Account stats operations
    // =========================================================================

    /// Replace the derived statistics row for an account.
    pub async fn upsert_account_stats(&self, stats: &AccountStats) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO account_stats
            (account_id, trade_count, total_realized_pnl, total_fees,
             win_count, loss_count, avg_r_multiple)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(account_id) DO UPDATE SET
                trade_count = excluded.trade_count,
                total_realized_pnl = excluded.total_realized_pnl,
                total_fees = excluded.total_fees,
                win_count = excluded.win_count,
                loss_count = excluded.loss_count,
                avg_r_multiple = excluded.avg_r_multiple
            "#,
        )
        .bind(stats.account_id.as_str())
        .bind(stats.trade_count)
        .bind(canonical(&stats.total_realized_pnl))
        .bind(canonical(&stats.total_fees))
        .bind(stats.win_count)
        .bind(stats.loss_count)
        .bind(stats.avg_r_multiple.as_ref().map(canonical))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the derived statistics for an account, if recorded.
    pub async fn get_account_stats(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<AccountStats>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT account_id, trade_count, total_realized_pnl, total_fees,
                   win_count, loss_count, avg_r_multiple
            FROM account_stats
            WHERE account_id = ?
            "#,
        )
        .bind(account_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let avg_r: Option<String> = row.get("avg_r_multiple");
            AccountStats {
                account_id: AccountId::new(row.get("account_id")),
                trade_count: row.get("trade_count"),
                total_realized_pnl: parse_decimal(
                    "total_realized_pnl",
                    &row.get::<String, _>("total_realized_pnl"),
                ),
                total_fees: parse_decimal("total_fees", &row.get::<String, _>("total_fees")),
                win_count: row.get("win_count"),
                loss_count: row.get("loss_count"),
                avg_r_multiple: avg_r.map(|s| parse_decimal("avg_r_multiple", &s)),
            }
        }))
    }
}

fn trade_from_row(row: &SqliteRow) -> Trade {
    let direction_str: String = row.get("direction");
    Trade {
        composite_id: row.get("composite_id"),
        broker_trade_id: row.get("broker_trade_id"),
        account_id: AccountId::new(row.get("account_id")),
        symbol: Symbol::new(row.get("symbol")),
        direction: Direction::parse(&direction_str).unwrap_or_else(|| {
            warn!(direction = %direction_str, "unknown stored direction, defaulting to long");
            Direction::Long
        }),
        quantity: parse_decimal("quantity", &row.get::<String, _>("quantity")),
        avg_entry_price: parse_decimal("avg_entry_price", &row.get::<String, _>("avg_entry_price")),
        avg_exit_price: parse_decimal("avg_exit_price", &row.get::<String, _>("avg_exit_price")),
        realized_pnl: parse_decimal("realized_pnl", &row.get::<String, _>("realized_pnl")),
        fees: parse_decimal("fees", &row.get::<String, _>("fees")),
        entry_time_ms: TimeMs::new(row.get("entry_time_ms")),
        exit_time_ms: TimeMs::new(row.get("exit_time_ms")),
        exit_levels: Vec::new(),
    }
}

/// Canonical TEXT form for storage: normalized, no exponent notation.
fn canonical(value: &Decimal) -> String {
    value.normalize().to_string()
}

fn parse_decimal(field: &str, raw: &str) -> Decimal {
    Decimal::from_str(raw).unwrap_or_else(|e| {
        warn!(field, raw, error = %e, "failed to parse stored decimal, using zero");
        Decimal::ZERO
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use tempfile::TempDir;

    async fn setup_repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn make_trade(broker_trade_id: &str, pnl: &str) -> Trade {
        Trade {
            composite_id: format!("acct-1:ES:{}", broker_trade_id),
            broker_trade_id: broker_trade_id.to_string(),
            account_id: AccountId::new("acct-1".to_string()),
            symbol: Symbol::new("ES".to_string()),
            direction: Direction::Long,
            quantity: d("10"),
            avg_entry_price: d("100"),
            avg_exit_price: d("108"),
            realized_pnl: d(pnl),
            fees: d("2.5"),
            entry_time_ms: TimeMs::new(1000),
            exit_time_ms: TimeMs::new(5000),
            exit_levels: vec![
                ExitLevel {
                    price: d("110"),
                    quantity: d("6"),
                    time_ms: TimeMs::new(3000),
                    realized_pnl: Some(d("60")),
                },
                ExitLevel {
                    price: d("105"),
                    quantity: d("4"),
                    time_ms: TimeMs::new(5000),
                    realized_pnl: None,
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_insert_and_find_trade_roundtrip() {
        let (repo, _temp) = setup_repo().await;
        let trade = make_trade("fills:aaa", "77.5");

        let inserted = repo.insert_trades_batch(&[trade.clone()]).await.unwrap();
        assert_eq!(inserted, 1);

        let found = repo
            .find_trade_by_broker_id("fills:aaa")
            .await
            .unwrap()
            .expect("trade not found");
        assert_eq!(found, trade);
    }

    #[tokio::test]
    async fn test_find_missing_trade_returns_none() {
        let (repo, _temp) = setup_repo().await;
        let found = repo.find_trade_by_broker_id("fills:zzz").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_batch_insert_is_all_or_nothing() {
        let (repo, _temp) = setup_repo().await;
        repo.insert_trades_batch(&[make_trade("fills:aaa", "10")])
            .await
            .unwrap();

        // Second batch holds one new trade and one duplicate; the whole
        // batch must fail without persisting the new trade.
        let result = repo
            .insert_trades_batch(&[make_trade("fills:bbb", "20"), make_trade("fills:aaa", "10")])
            .await;
        assert!(result.is_err());

        let orphan = repo.find_trade_by_broker_id("fills:bbb").await.unwrap();
        assert!(orphan.is_none(), "failed batch must not leave partial writes");
    }

    #[tokio::test]
    async fn test_query_trades_for_account_ordered() {
        let (repo, _temp) = setup_repo().await;
        let mut early = make_trade("fills:aaa", "10");
        early.exit_time_ms = TimeMs::new(1000);
        let mut late = make_trade("fills:bbb", "20");
        late.exit_time_ms = TimeMs::new(9000);
        repo.insert_trades_batch(&[late, early]).await.unwrap();

        let trades = repo
            .query_trades_for_account(&AccountId::new("acct-1".to_string()))
            .await
            .unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].broker_trade_id, "fills:aaa");
        assert_eq!(trades[1].broker_trade_id, "fills:bbb");
    }

    #[tokio::test]
    async fn test_cursor_upsert_and_get() {
        let (repo, _temp) = setup_repo().await;
        let account = AccountId::new("acct-1".to_string());

        repo.upsert_connection_status("conn-1", &account, Some(5000), SyncStatus::Success, None)
            .await
            .unwrap();

        let cursor = repo
            .get_connection_status("conn-1")
            .await
            .unwrap()
            .expect("cursor missing");
        assert_eq!(cursor.last_sync_at_ms, Some(TimeMs::new(5000)));
        assert_eq!(cursor.last_sync_status, SyncStatus::Success);
        assert!(cursor.last_sync_error.is_none());
    }

    #[tokio::test]
    async fn test_failure_upsert_preserves_last_sync_at() {
        let (repo, _temp) = setup_repo().await;
        let account = AccountId::new("acct-1".to_string());

        repo.upsert_connection_status("conn-1", &account, Some(5000), SyncStatus::Success, None)
            .await
            .unwrap();
        repo.upsert_connection_status(
            "conn-1",
            &account,
            None,
            SyncStatus::Error,
            Some("network error: timeout"),
        )
        .await
        .unwrap();

        let cursor = repo.get_connection_status("conn-1").await.unwrap().unwrap();
        assert_eq!(cursor.last_sync_at_ms, Some(TimeMs::new(5000)));
        assert_eq!(cursor.last_sync_status, SyncStatus::Error);
        assert_eq!(
            cursor.last_sync_error.as_deref(),
            Some("network error: timeout")
        );
    }

    #[tokio::test]
    async fn test_account_stats_roundtrip() {
        let (repo, _temp) = setup_repo().await;
        let stats = AccountStats {
            account_id: AccountId::new("acct-1".to_string()),
            trade_count: 3,
            total_realized_pnl: d("125.5"),
            total_fees: d("6"),
            win_count: 2,
            loss_count: 1,
            avg_r_multiple: Some(d("0.83")),
        };

        repo.upsert_account_stats(&stats).await.unwrap();
        // Idempotent on already-correct data.
        repo.upsert_account_stats(&stats).await.unwrap();

        let found = repo
            .get_account_stats(&AccountId::new("acct-1".to_string()))
            .await
            .unwrap()
            .expect("stats missing");
        assert_eq!(found, stats);
    }
}
