//! P&L reconciliation: broker figures are authoritative, price-derived
//! figures are a consistency check and a fallback.

use rust_decimal::Decimal;
use tracing::warn;

use crate::domain::{Direction, Trade};

/// P&L implied by average prices alone, gross of fees.
pub fn price_derived_pnl(
    direction: Direction,
    avg_entry: Decimal,
    avg_exit: Decimal,
    quantity: Decimal,
) -> Decimal {
    match direction {
        Direction::Long => (avg_exit - avg_entry) * quantity,
        Direction::Short => (avg_entry - avg_exit) * quantity,
    }
}

/// Cross-check a trade's broker-reported P&L against the price-derived
/// figure.
///
/// Returns the absolute divergence when it exceeds `threshold`, after
/// logging it. Non-fatal: broker figures are trusted over derived ones,
/// since averaged prices can lose information the broker had.
pub fn check_divergence(trade: &Trade, threshold: Decimal) -> Option<Decimal> {
    let derived = price_derived_pnl(
        trade.direction,
        trade.avg_entry_price,
        trade.avg_exit_price,
        trade.quantity,
    );
    // Stored realized P&L is net of fees; the derived figure is gross.
    let broker_gross = trade.realized_pnl + trade.fees;
    let divergence = (broker_gross - derived).abs();
    if divergence > threshold {
        warn!(
            trade = %trade.composite_id,
            broker_pnl = %broker_gross,
            derived_pnl = %derived,
            divergence = %divergence,
            "broker-reported P&L diverges from price-derived P&L"
        );
        Some(divergence)
    } else {
        None
    }
}

/// Synthesize distinct entry/exit prices for a source that reports only a
/// net P&L with entry == exit price.
///
/// The single reported price is split by half the implied per-unit delta
/// (`|pnl| / quantity / 2`), signed so the band is consistent with the
/// direction and the sign of the P&L. Display-only: the reported P&L is
/// never altered by this.
pub fn synthesize_price_band(
    price: Decimal,
    pnl: Decimal,
    quantity: Decimal,
    direction: Direction,
) -> (Decimal, Decimal) {
    if quantity <= Decimal::ZERO {
        return (price, price);
    }
    let half = pnl.abs() / quantity / Decimal::TWO;
    let gain = pnl >= Decimal::ZERO;
    match (direction, gain) {
        (Direction::Long, true) => (price - half, price + half),
        (Direction::Long, false) => (price + half, price - half),
        (Direction::Short, true) => (price + half, price - half),
        (Direction::Short, false) => (price - half, price + half),
    }
}
