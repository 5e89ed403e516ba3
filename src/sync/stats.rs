//! Derived account statistics, recomputed from full trade history.
//!
//! Sums run in Rust over Decimal rather than in SQL so no precision is
//! lost to REAL aggregates.

use rust_decimal::Decimal;

use crate::domain::{AccountId, AccountStats, Trade};

/// Recompute an account's statistics from its complete persisted history.
///
/// Idempotent: the same history always produces the same row. The
/// R-multiple risk unit is the account's average absolute losing-trade
/// P&L; with no losing trades there is no unit and the aggregate R is
/// None.
pub fn compute_account_stats(account_id: &AccountId, trades: &[Trade]) -> AccountStats {
    let mut total_realized_pnl = Decimal::ZERO;
    let mut total_fees = Decimal::ZERO;
    let mut win_count = 0i64;
    let mut loss_count = 0i64;
    let mut loss_total = Decimal::ZERO;

    for trade in trades {
        total_realized_pnl += trade.realized_pnl;
        total_fees += trade.fees;
        if trade.realized_pnl > Decimal::ZERO {
            win_count += 1;
        } else if trade.realized_pnl < Decimal::ZERO {
            loss_count += 1;
            loss_total += trade.realized_pnl.abs();
        }
    }

    let trade_count = trades.len() as i64;
    let avg_r_multiple = if loss_count > 0 && trade_count > 0 {
        let risk_unit = loss_total / Decimal::from(loss_count);
        if risk_unit > Decimal::ZERO {
            Some(total_realized_pnl / Decimal::from(trade_count) / risk_unit)
        } else {
            None
        }
    } else {
        None
    };

    AccountStats {
        account_id: account_id.clone(),
        trade_count,
        total_realized_pnl,
        total_fees,
        win_count,
        loss_count,
        avg_r_multiple,
    }
}
