//! Round-trip trade: the reconciliation engine's persisted output.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, Side, Symbol, TimeMs};

/// Position direction over the life of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// The side that opens a position in this direction.
    pub fn entry_side(&self) -> Side {
        match self {
            Direction::Long => Side::Buy,
            Direction::Short => Side::Sell,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }

    /// Parse a stored direction string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "long" => Some(Direction::Long),
            "short" => Some(Direction::Short),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One partial exit within a trade that closed via multiple fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitLevel {
    pub price: Decimal,
    pub quantity: Decimal,
    pub time_ms: TimeMs,
    pub realized_pnl: Option<Decimal>,
}

/// A completed round-trip trade reconstructed from fills.
///
/// Append-only: created once when a position reaches zero open quantity,
/// never mutated afterwards. `broker_trade_id` is the idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Human-readable key: account, symbol, and a trade id suffix.
    pub composite_id: String,
    /// Deterministic idempotency key derived from contributing fill ids.
    pub broker_trade_id: String,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub direction: Direction,
    /// Total round-trip quantity (sum of entry fill quantities).
    pub quantity: Decimal,
    pub avg_entry_price: Decimal,
    pub avg_exit_price: Decimal,
    /// Net realized P&L (broker-reported where available, less fees).
    pub realized_pnl: Decimal,
    /// Total commissions across entry and exit fills.
    pub fees: Decimal,
    pub entry_time_ms: TimeMs,
    pub exit_time_ms: TimeMs,
    /// One record per partial exit, in exit order.
    pub exit_levels: Vec<ExitLevel>,
}

impl Trade {
    /// Build the composite id from its parts.
    pub fn composite_id_for(
        account_id: &AccountId,
        symbol: &Symbol,
        broker_trade_id: &str,
    ) -> String {
        let suffix = broker_trade_id
            .strip_prefix("fills:")
            .unwrap_or(broker_trade_id);
        let suffix = &suffix[..suffix.len().min(12)];
        format!("{}:{}:{}", account_id.as_str(), symbol.as_str(), suffix)
    }
}

/// Derive the idempotency key for a trade from its contributing fill ids.
///
/// The key depends only on the *set* of ids: sorted and deduplicated before
/// hashing, so re-deriving from the same fills in any processing order
/// always yields the same key.
pub fn derive_broker_trade_id(fill_ids: &[String]) -> String {
    use sha2::{Digest, Sha256};

    let mut ids: Vec<&str> = fill_ids.iter().map(String::as_str).collect();
    ids.sort_unstable();
    ids.dedup();

    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    let hash = hasher.finalize();
    format!("fills:{}", hex::encode(&hash[..16]))
}
