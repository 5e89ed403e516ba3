pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod sync;

pub use config::Config;
pub use datasource::{
    normalize_fill, FillSource, FillSourceError, HttpFillSource, MockFillSource, RawFill,
};
pub use db::{init_db, Repository};
pub use domain::{
    AccountId, AccountStats, BrokerConnection, Direction, ExitLevel, Fill, FillStatus, RawTimestamp,
    Side, Symbol, SyncCursor, SyncStatus, TimeMs, Trade,
};
pub use engine::{reconcile_account, PositionReconciler, ReconcileOutput};
pub use sync::{NoopReplicator, ReplicationSink, SyncError, SyncOrchestrator, SyncReport};
