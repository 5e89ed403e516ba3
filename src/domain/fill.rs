//! Fill type representing a single broker execution report.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, Side, Symbol, TimeMs};

/// Lifecycle status of a fill as reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillStatus {
    /// A live execution that contributes to position tracking.
    Executed,
    /// Voided/busted by the broker; skipped during reconciliation.
    Void,
}

/// A single broker fill (partial or full order execution).
///
/// Immutable once constructed; identity is the broker-assigned id, or a
/// deterministic hash-derived id when the broker omits one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Stable unique identifier for this fill.
    pub id: String,
    /// Owning brokerage account.
    pub account_id: AccountId,
    /// Instrument symbol.
    pub symbol: Symbol,
    /// Execution side (Buy or Sell).
    pub side: Side,
    /// Executed quantity, always positive.
    pub quantity: Decimal,
    /// Execution price per unit.
    pub price: Decimal,
    /// Broker-reported realized P&L for this fill, if any.
    pub realized_pnl: Option<Decimal>,
    /// Commission charged for this fill.
    pub commission: Decimal,
    /// Execution time, normalized to milliseconds since Unix epoch.
    pub time_ms: TimeMs,
    /// Broker-reported status.
    pub status: FillStatus,
}

impl Fill {
    /// Quantity signed by side: +quantity for Buy, -quantity for Sell.
    pub fn signed_quantity(&self) -> Decimal {
        match self.side {
            Side::Buy => self.quantity,
            Side::Sell => -self.quantity,
        }
    }

    /// Deterministic identifier for a fill the broker returned without one.
    ///
    /// Re-fetching the same execution must always reproduce the same id, so
    /// the hash covers only fields the broker reports stably.
    pub fn synthetic_id(
        account_id: &AccountId,
        symbol: &Symbol,
        side: Side,
        time_ms: TimeMs,
        price: &Decimal,
        quantity: &Decimal,
    ) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(account_id.as_str());
        hasher.update(symbol.as_str());
        hasher.update(if side == Side::Buy { b"B" } else { b"S" });
        hasher.update(time_ms.as_i64().to_le_bytes());
        hasher.update(price.normalize().to_string());
        hasher.update(quantity.normalize().to_string());
        let hash = hasher.finalize();
        format!("hash:{}", hex::encode(&hash[..16]))
    }
}
