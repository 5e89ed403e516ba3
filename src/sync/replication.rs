//! Downstream replication notifications for newly persisted trades.
//!
//! The orchestrator notifies the sink once per inserted trade and makes no
//! assumption about its success; persistence is never rolled back for a
//! failed notification.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;

use crate::domain::{AccountId, Side, Symbol, Trade};

/// Everything the replication system needs to construct a scaled replica
/// order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeNotice {
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
}

impl TradeNotice {
    pub fn from_trade(trade: &Trade) -> Self {
        Self {
            account_id: trade.account_id.clone(),
            symbol: trade.symbol.clone(),
            side: trade.direction.entry_side(),
            quantity: trade.quantity,
            price: trade.avg_entry_price,
        }
    }
}

/// Error type for replication notifications.
#[derive(Debug, Clone, Error)]
pub enum ReplicationError {
    #[error("replication rejected notice: {0}")]
    Rejected(String),
    #[error("replication unavailable: {0}")]
    Unavailable(String),
}

/// Consumer of trade notices.
#[async_trait]
pub trait ReplicationSink: Send + Sync + fmt::Debug {
    async fn notify(&self, notice: &TradeNotice) -> Result<(), ReplicationError>;
}

/// Sink that drops every notice; for deployments without copy-trading.
#[derive(Debug, Default)]
pub struct NoopReplicator;

#[async_trait]
impl ReplicationSink for NoopReplicator {
    async fn notify(&self, _notice: &TradeNotice) -> Result<(), ReplicationError> {
        Ok(())
    }
}

/// Sink that records every notice; for tests.
#[derive(Debug, Default)]
pub struct RecordingReplicator {
    notices: Mutex<Vec<TradeNotice>>,
    failure: Option<ReplicationError>,
}

impl RecordingReplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every notification fail with the given error (still recorded).
    pub fn with_failure(mut self, err: ReplicationError) -> Self {
        self.failure = Some(err);
        self
    }

    pub fn recorded(&self) -> Vec<TradeNotice> {
        self.notices.lock().expect("notices lock poisoned").clone()
    }
}

#[async_trait]
impl ReplicationSink for RecordingReplicator {
    async fn notify(&self, notice: &TradeNotice) -> Result<(), ReplicationError> {
        self.notices
            .lock()
            .expect("notices lock poisoned")
            .push(notice.clone());
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
