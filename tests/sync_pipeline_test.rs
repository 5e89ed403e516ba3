use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;
use tradesync::datasource::{MockFillSource, RawFill, RawNumber};
use tradesync::sync::{RecordingReplicator, ReplicationSink, SyncError, SyncOrchestrator};
use tradesync::{
    init_db, AccountId, BrokerConnection, Config, FillSourceError, RawTimestamp, Repository, Side,
    SyncStatus, TimeMs,
};

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn test_config() -> Config {
    Config {
        database_path: ":memory:".to_string(),
        broker_api_url: "http://example.invalid".to_string(),
        connections: vec![],
        first_sync_lookback_days: 30,
        resync_overlap_days: 7,
        pnl_divergence_threshold: Decimal::new(1, 2),
        sync_interval_secs: 300,
    }
}

fn connection() -> BrokerConnection {
    BrokerConnection::new("conn-1".to_string(), AccountId::new("acct-1".to_string()))
}

fn raw(id: &str, symbol: &str, side: &str, qty: &str, price: &str, time_ms: i64) -> RawFill {
    RawFill {
        id: Some(id.to_string()),
        symbol: Some(symbol.to_string()),
        side: Some(side.to_string()),
        quantity: Some(RawNumber::Text(qty.to_string())),
        price: Some(RawNumber::Text(price.to_string())),
        timestamp: Some(RawTimestamp::Unix(time_ms)),
        ..RawFill::default()
    }
}

async fn setup(
    mock: MockFillSource,
) -> (
    SyncOrchestrator,
    Arc<Repository>,
    Arc<RecordingReplicator>,
    TempDir,
) {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("test.db").to_string_lossy().to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let replicator = Arc::new(RecordingReplicator::new());
    let sink: Arc<dyn ReplicationSink> = replicator.clone();
    let orchestrator = SyncOrchestrator::new(Arc::new(mock), repo.clone(), sink, test_config());
    (orchestrator, repo, replicator, temp)
}

/// A recent instant that lands inside both the first-sync window and the
/// overlap window of any immediately following run.
fn recent_ms(offset: i64) -> i64 {
    TimeMs::now().as_i64() - 3_600_000 + offset
}

#[tokio::test]
async fn test_sync_is_idempotent_across_overlapping_windows() {
    let mock = MockFillSource::new().with_fills(
        "acct-1",
        vec![
            raw("f1", "ES", "buy", "10", "100", recent_ms(0)),
            raw("f2", "ES", "sell", "6", "110", recent_ms(1000)),
            raw("f3", "ES", "sell", "4", "105", recent_ms(2000)),
        ],
    );
    let (orchestrator, repo, _, _temp) = setup(mock).await;

    let first = orchestrator.sync_connection(&connection()).await.unwrap();
    assert_eq!(first.fills_fetched, 3);
    assert_eq!(first.trades_reconciled, 1);
    assert_eq!(first.trades_inserted, 1);
    assert_eq!(first.trades_deduped, 0);

    // The second run refetches an overlapping window, regenerates the same
    // broker_trade_id, and inserts nothing.
    let second = orchestrator.sync_connection(&connection()).await.unwrap();
    assert_eq!(second.fills_fetched, 3);
    assert_eq!(second.trades_inserted, 0);
    assert_eq!(second.trades_deduped, 1);

    let trades = repo
        .query_trades_for_account(&AccountId::new("acct-1".to_string()))
        .await
        .unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].avg_exit_price, d("108"));
}

#[tokio::test]
async fn test_success_advances_cursor() {
    let mock = MockFillSource::new().with_fills(
        "acct-1",
        vec![
            raw("f1", "ES", "buy", "1", "100", recent_ms(0)),
            raw("f2", "ES", "sell", "1", "110", recent_ms(1000)),
        ],
    );
    let (orchestrator, repo, _, _temp) = setup(mock).await;

    orchestrator.sync_connection(&connection()).await.unwrap();

    let cursor = repo
        .get_connection_status("conn-1")
        .await
        .unwrap()
        .expect("cursor missing");
    assert_eq!(cursor.last_sync_status, SyncStatus::Success);
    assert!(cursor.last_sync_at_ms.is_some());
    assert!(cursor.last_sync_error.is_none());
}

#[tokio::test]
async fn test_fetch_failure_records_error_cursor() {
    let mock = MockFillSource::new()
        .with_failure(FillSourceError::Network("connection refused".to_string()));
    let (orchestrator, repo, _, _temp) = setup(mock).await;

    let result = orchestrator.sync_connection(&connection()).await;
    assert!(matches!(result, Err(SyncError::Source(_))));

    let cursor = repo
        .get_connection_status("conn-1")
        .await
        .unwrap()
        .expect("failure must still record a cursor");
    assert_eq!(cursor.last_sync_status, SyncStatus::Error);
    assert!(cursor
        .last_sync_error
        .as_deref()
        .unwrap()
        .contains("connection refused"));
    // No success has ever been recorded, so no watermark to narrow.
    assert!(cursor.last_sync_at_ms.is_none());
}

#[tokio::test]
async fn test_replication_notified_once_per_new_trade() {
    let mock = MockFillSource::new().with_fills(
        "acct-1",
        vec![
            raw("f1", "ES", "buy", "10", "100", recent_ms(0)),
            raw("f2", "ES", "sell", "10", "110", recent_ms(1000)),
        ],
    );
    let (orchestrator, _, replicator, _temp) = setup(mock).await;

    orchestrator.sync_connection(&connection()).await.unwrap();
    let notices = replicator.recorded();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].side, Side::Buy);
    assert_eq!(notices[0].quantity, d("10"));
    assert_eq!(notices[0].price, d("100"));

    // Deduped trades on the second run trigger no further notices.
    orchestrator.sync_connection(&connection()).await.unwrap();
    assert_eq!(replicator.recorded().len(), 1);
}

#[tokio::test]
async fn test_open_position_reported_not_persisted() {
    let mock = MockFillSource::new().with_fills(
        "acct-1",
        vec![
            raw("f1", "ES", "buy", "10", "100", recent_ms(0)),
            raw("f2", "ES", "sell", "15", "90", recent_ms(1000)),
        ],
    );
    let (orchestrator, repo, _, _temp) = setup(mock).await;

    let report = orchestrator.sync_connection(&connection()).await.unwrap();
    assert_eq!(report.trades_inserted, 1);
    assert_eq!(report.open_positions, 1);

    let trades = repo
        .query_trades_for_account(&AccountId::new("acct-1".to_string()))
        .await
        .unwrap();
    assert_eq!(trades.len(), 1, "the open short remainder must not persist");
    assert_eq!(trades[0].quantity, d("10"));
}

#[tokio::test]
async fn test_unparseable_timestamp_still_produces_trade() {
    let mut entry = raw("a", "ES", "buy", "1", "100", 0);
    entry.timestamp = Some(RawTimestamp::Text("not a date".to_string()));
    let mut exit = raw("b", "ES", "sell", "1", "110", 0);
    exit.timestamp = Some(RawTimestamp::Text("also garbage".to_string()));

    let mock = MockFillSource::new().with_fills("acct-1", vec![entry, exit]);
    let (orchestrator, _, _, _temp) = setup(mock).await;

    let report = orchestrator.sync_connection(&connection()).await.unwrap();
    // Both fills fall back to "now" and tie-break by id: the buy opens.
    assert_eq!(report.fills_skipped, 0);
    assert_eq!(report.trades_inserted, 1);
}

#[tokio::test]
async fn test_malformed_fill_skipped_without_blocking_run() {
    let mut no_symbol = raw("junk", "ES", "buy", "1", "100", recent_ms(500));
    no_symbol.symbol = None;

    let mock = MockFillSource::new().with_fills(
        "acct-1",
        vec![
            no_symbol,
            raw("f1", "ES", "buy", "1", "100", recent_ms(0)),
            raw("f2", "ES", "sell", "1", "110", recent_ms(1000)),
        ],
    );
    let (orchestrator, _, _, _temp) = setup(mock).await;

    let report = orchestrator.sync_connection(&connection()).await.unwrap();
    assert_eq!(report.fills_fetched, 3);
    assert_eq!(report.fills_skipped, 1);
    assert_eq!(report.trades_inserted, 1);
}

#[tokio::test]
async fn test_account_stats_recomputed_from_full_history() {
    let mock = MockFillSource::new().with_fills(
        "acct-1",
        vec![
            raw("f1", "ES", "buy", "1", "100", recent_ms(0)),
            raw("f2", "ES", "sell", "1", "110", recent_ms(1000)),
            raw("n1", "NQ", "sell", "1", "15000", recent_ms(2000)),
            raw("n2", "NQ", "buy", "1", "15040", recent_ms(3000)),
        ],
    );
    let (orchestrator, repo, _, _temp) = setup(mock).await;

    orchestrator.sync_connection(&connection()).await.unwrap();

    let stats = repo
        .get_account_stats(&AccountId::new("acct-1".to_string()))
        .await
        .unwrap()
        .expect("stats missing");
    assert_eq!(stats.trade_count, 2);
    // +10 on ES, -40 on NQ.
    assert_eq!(stats.total_realized_pnl, d("-30"));
    assert_eq!(stats.win_count, 1);
    assert_eq!(stats.loss_count, 1);

    // A second run over the same data leaves the stats unchanged.
    orchestrator.sync_connection(&connection()).await.unwrap();
    let again = repo
        .get_account_stats(&AccountId::new("acct-1".to_string()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again, stats);
}

#[tokio::test]
async fn test_replication_failure_does_not_fail_run() {
    let mock = MockFillSource::new().with_fills(
        "acct-1",
        vec![
            raw("f1", "ES", "buy", "1", "100", recent_ms(0)),
            raw("f2", "ES", "sell", "1", "110", recent_ms(1000)),
        ],
    );
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("test.db").to_string_lossy().to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let replicator = Arc::new(RecordingReplicator::new().with_failure(
        tradesync::sync::ReplicationError::Unavailable("replication down".to_string()),
    ));
    let sink: Arc<dyn ReplicationSink> = replicator.clone();
    let orchestrator = SyncOrchestrator::new(Arc::new(mock), repo.clone(), sink, test_config());

    let report = orchestrator.sync_connection(&connection()).await.unwrap();
    assert_eq!(report.trades_inserted, 1);

    // The trade stayed persisted and the run still recorded success.
    let cursor = repo.get_connection_status("conn-1").await.unwrap().unwrap();
    assert_eq!(cursor.last_sync_status, SyncStatus::Success);
}
