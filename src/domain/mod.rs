//! Domain types for execution-to-trade reconciliation.
//!
//! This module provides:
//! - Domain primitives: AccountId, Symbol, Side, TimeMs
//! - Fill and Trade types with deterministic identity derivation
//! - Timestamp normalization for loosely-specified upstream formats
//! - Stable fill ordering for deterministic reconciliation

pub mod connection;
pub mod fill;
pub mod ordering;
pub mod primitives;
pub mod timestamp;
pub mod trade;

pub use connection::{AccountStats, BrokerConnection, SyncCursor, SyncStatus};
pub use fill::{Fill, FillStatus};
pub use ordering::{partition_by_symbol, sort_fills_deterministic};
pub use primitives::{AccountId, Side, Symbol, TimeMs};
pub use timestamp::{normalize_timestamp, parse_timestamp, RawTimestamp};
pub use trade::{derive_broker_trade_id, Direction, ExitLevel, Trade};
