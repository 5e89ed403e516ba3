use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tradesync::sync::NoopReplicator;
use tradesync::{
    Config, FillSource, HttpFillSource, Repository, SyncOrchestrator, init_db,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let pool = init_db(&config.database_path)
        .await
        .context("initializing database")?;
    let repo = Arc::new(Repository::new(pool));

    // One client per process, passed by reference into the pipeline.
    let source: Arc<dyn FillSource> =
        Arc::new(HttpFillSource::new(config.broker_api_url.clone()));
    let replicator = Arc::new(NoopReplicator);
    let orchestrator = SyncOrchestrator::new(source, repo, replicator, config.clone());

    if config.connections.is_empty() {
        tracing::warn!("no connections configured, nothing to sync");
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(config.sync_interval_secs));
    loop {
        ticker.tick().await;
        for connection in &config.connections {
            match orchestrator.sync_connection(connection).await {
                Ok(report) => tracing::info!(
                    connection = %connection.connection_id,
                    fills_fetched = report.fills_fetched,
                    trades_inserted = report.trades_inserted,
                    trades_deduped = report.trades_deduped,
                    open_positions = report.open_positions,
                    "sync cycle complete"
                ),
                Err(err) => tracing::error!(
                    connection = %connection.connection_id,
                    error = %err,
                    "sync cycle failed"
                ),
            }
        }
    }
}
