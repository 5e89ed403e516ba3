//! Raw broker payload shapes and their normalization into [`Fill`]s.
//!
//! Brokers disagree on field names and on whether numbers arrive as JSON
//! numbers or strings. All of that variance is modeled explicitly here and
//! resolved by a single function, [`normalize_fill`], so the reconciliation
//! core never sees it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

use crate::domain::{
    normalize_timestamp, AccountId, Fill, FillStatus, RawTimestamp, Side, Symbol, TimeMs,
};

/// A numeric value as it appears in a broker payload: JSON number or
/// stringly-typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawNumber {
    /// Parse losslessly where possible; string input keeps full precision.
    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            RawNumber::Int(n) => Some(Decimal::from(*n)),
            RawNumber::Float(f) => Decimal::from_f64_retain(*f),
            RawNumber::Text(s) => {
                let trimmed = s.trim();
                Decimal::from_str(trimmed)
                    .ok()
                    .or_else(|| Decimal::from_scientific(trimmed).ok())
            }
        }
    }
}

/// One fill exactly as the broker returns it: every field optional, with
/// aliases for the alternate names seen across brokers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFill {
    #[serde(alias = "execution_id", alias = "fill_id")]
    pub id: Option<String>,
    #[serde(alias = "ticker", alias = "instrument")]
    pub symbol: Option<String>,
    pub side: Option<String>,
    #[serde(alias = "qty", alias = "size")]
    pub quantity: Option<RawNumber>,
    #[serde(alias = "fill_price", alias = "avg_price")]
    pub price: Option<RawNumber>,
    #[serde(alias = "closed_pnl", alias = "pnl")]
    pub realized_pnl: Option<RawNumber>,
    #[serde(alias = "fee", alias = "fees")]
    pub commission: Option<RawNumber>,
    pub status: Option<String>,
    pub timestamp: Option<RawTimestamp>,
    pub time: Option<RawTimestamp>,
    pub executed_at: Option<RawTimestamp>,
    pub transaction_time: Option<RawTimestamp>,
}

/// Normalize a raw broker fill into a [`Fill`], or None if the row is
/// unusable.
///
/// Owns every ingestion fallback: timestamp candidates are tried in
/// priority order (falling back to `now`), missing ids get a deterministic
/// synthetic id, and rows missing symbol/side/quantity/price are skipped
/// with a warning rather than failing the run.
pub fn normalize_fill(raw: &RawFill, account_id: &AccountId, now: TimeMs) -> Option<Fill> {
    let symbol = match raw.symbol.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Symbol::new(s.to_string()),
        _ => {
            warn!(raw_id = ?raw.id, "skipping fill without symbol");
            return None;
        }
    };

    let Some(side) = raw.side.as_deref().and_then(parse_side) else {
        warn!(raw_id = ?raw.id, side = ?raw.side, "skipping fill with unknown side");
        return None;
    };

    let Some(quantity) = raw.quantity.as_ref().and_then(RawNumber::to_decimal) else {
        warn!(raw_id = ?raw.id, "skipping fill with unparseable quantity");
        return None;
    };
    if quantity <= Decimal::ZERO {
        warn!(raw_id = ?raw.id, quantity = %quantity, "skipping fill with non-positive quantity");
        return None;
    }

    let Some(price) = raw.price.as_ref().and_then(RawNumber::to_decimal) else {
        warn!(raw_id = ?raw.id, "skipping fill with unparseable price");
        return None;
    };
    if price < Decimal::ZERO {
        warn!(raw_id = ?raw.id, price = %price, "skipping fill with negative price");
        return None;
    }

    let realized_pnl = raw.realized_pnl.as_ref().and_then(RawNumber::to_decimal);
    let commission = raw
        .commission
        .as_ref()
        .and_then(RawNumber::to_decimal)
        .unwrap_or(Decimal::ZERO);

    let time_ms = normalize_timestamp(
        &[
            raw.timestamp.as_ref(),
            raw.time.as_ref(),
            raw.executed_at.as_ref(),
            raw.transaction_time.as_ref(),
        ],
        now,
    );

    let status = match raw.status.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("void" | "voided" | "busted" | "canceled" | "cancelled") => FillStatus::Void,
        _ => FillStatus::Executed,
    };

    let id = match raw.id.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => Fill::synthetic_id(account_id, &symbol, side, time_ms, &price, &quantity),
    };

    Some(Fill {
        id,
        account_id: account_id.clone(),
        symbol,
        side,
        quantity,
        price,
        realized_pnl,
        commission,
        time_ms,
        status,
    })
}

fn parse_side(s: &str) -> Option<Side> {
    match s.trim().to_ascii_lowercase().as_str() {
        "buy" | "b" | "long" => Some(Side::Buy),
        "sell" | "s" | "short" => Some(Side::Sell),
        _ => None,
    }
}
