//! Broker connection bookkeeping: sync cursor and derived account stats.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, TimeMs};

/// One linked brokerage connection to synchronize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConnection {
    pub connection_id: String,
    pub account_id: AccountId,
}

impl BrokerConnection {
    pub fn new(connection_id: String, account_id: AccountId) -> Self {
        Self {
            connection_id,
            account_id,
        }
    }
}

/// Outcome of a connection's most recent sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No run has ever completed for this connection.
    Never,
    Success,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Never => "never",
            SyncStatus::Success => "success",
            SyncStatus::Error => "error",
        }
    }

    /// Parse a stored status string; unknown values read as Never.
    pub fn parse(s: &str) -> Self {
        match s {
            "success" => SyncStatus::Success,
            "error" => SyncStatus::Error,
            _ => SyncStatus::Never,
        }
    }
}

/// Persisted per-connection sync cursor.
///
/// Written once per orchestrator run, on both success and failure.
/// `last_sync_at_ms` advances only on success and drives the next run's
/// fetch window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub connection_id: String,
    pub account_id: AccountId,
    pub last_sync_at_ms: Option<TimeMs>,
    pub last_sync_status: SyncStatus,
    pub last_sync_error: Option<String>,
}

/// Derived account statistics, recomputed from full persisted history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountStats {
    pub account_id: AccountId,
    pub trade_count: i64,
    pub total_realized_pnl: Decimal,
    pub total_fees: Decimal,
    pub win_count: i64,
    pub loss_count: i64,
    /// Mean per-trade R-multiple; None when the account has no losing
    /// trades to anchor the risk unit.
    pub avg_r_multiple: Option<Decimal>,
}
