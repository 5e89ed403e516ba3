//! Pure reconciliation engine: fills in, round-trip trades out.
//!
//! No I/O lives here. The reconciler owns the only mutable state in the
//! pipeline (the open position per partition) and the P&L module keeps
//! broker-reported figures authoritative over price-derived ones.

use rust_decimal::Decimal;

use crate::domain::{Direction, TimeMs};

pub mod pnl;
pub mod reconciler;

pub use reconciler::{reconcile_account, OpenRemainder, PositionReconciler, ReconcileOutput};

/// The portion of one fill attributed to a position as entry or exit.
///
/// Usually a whole fill; a fill that overshoots the open quantity is split
/// across two portions with commission pro-rated by quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct FillPortion {
    pub fill_id: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    pub realized_pnl: Option<Decimal>,
    pub time_ms: TimeMs,
}

/// Mutable position state for one (account, symbol) partition.
///
/// Created when net exposure leaves flat, finalized into a Trade and
/// discarded when it returns to flat. Never shared across partitions or
/// across sync runs.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub direction: Direction,
    /// Remaining open quantity: entries matched so far minus exits.
    pub open_quantity: Decimal,
    pub entry_notional: Decimal,
    pub exit_notional: Decimal,
    /// Commissions accumulated across entry and exit portions.
    pub fees: Decimal,
    pub entry_fills: Vec<FillPortion>,
    pub exit_fills: Vec<FillPortion>,
    pub opened_at: TimeMs,
    pub last_activity_at: TimeMs,
}

impl OpenPosition {
    /// Total quantity entered over the life of the position.
    pub fn entered_quantity(&self) -> Decimal {
        self.entry_fills.iter().map(|p| p.quantity).sum()
    }

    /// Total quantity exited so far.
    pub fn exited_quantity(&self) -> Decimal {
        self.exit_fills.iter().map(|p| p.quantity).sum()
    }
}
