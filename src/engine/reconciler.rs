//! FIFO signed-position reconciliation of fills into round-trip trades.

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::domain::{
    derive_broker_trade_id, partition_by_symbol, sort_fills_deterministic, AccountId, Direction,
    ExitLevel, Fill, FillStatus, Symbol, TimeMs, Trade,
};
use crate::engine::{pnl, FillPortion, OpenPosition};

/// A position still open when the fetched window ran out of fills.
///
/// Not emitted as a trade; it will complete on a later sync once its
/// closing fills are fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenRemainder {
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub direction: Direction,
    pub open_quantity: Decimal,
    pub opened_at: TimeMs,
    pub last_activity_at: TimeMs,
}

/// Result of reconciling one account's fills.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReconcileOutput {
    pub trades: Vec<Trade>,
    pub open_positions: Vec<OpenRemainder>,
}

/// Signed-position state machine for one (account, symbol) partition.
///
/// Fills must arrive sorted by (time_ms, fill id); callers go through
/// [`reconcile_account`], which establishes that order.
pub struct PositionReconciler {
    account_id: AccountId,
    symbol: Symbol,
    /// Net exposure: positive = long, negative = short, zero = flat.
    net_pos: Decimal,
    current: Option<OpenPosition>,
    trades: Vec<Trade>,
}

impl PositionReconciler {
    pub fn new(account_id: AccountId, symbol: Symbol) -> Self {
        Self {
            account_id,
            symbol,
            net_pos: Decimal::ZERO,
            current: None,
            trades: Vec::new(),
        }
    }

    /// Process a single fill, possibly closing one position and opening
    /// the next in the same pass when the fill overshoots.
    pub fn process_fill(&mut self, fill: &Fill) {
        if fill.status == FillStatus::Void {
            debug!(fill_id = %fill.id, "skipping void fill");
            return;
        }
        if fill.quantity <= Decimal::ZERO {
            warn!(fill_id = %fill.id, quantity = %fill.quantity, "skipping fill with non-positive quantity");
            return;
        }

        let mut remaining = fill.signed_quantity();
        while remaining != Decimal::ZERO {
            if self.net_pos == Decimal::ZERO {
                self.open_position(fill, remaining);
                remaining = Decimal::ZERO;
            } else if same_sign(remaining, self.net_pos) {
                self.scale_position(fill, remaining);
                remaining = Decimal::ZERO;
            } else {
                let closed = remaining.abs().min(self.net_pos.abs());
                self.close_portion(fill, closed);
                remaining += if remaining > Decimal::ZERO { -closed } else { closed };
                if self.net_pos == Decimal::ZERO {
                    self.finalize_current();
                }
            }
        }
    }

    /// Emit accumulated trades and whatever position is still open.
    pub fn finish(self) -> (Vec<Trade>, Option<OpenRemainder>) {
        let account_id = self.account_id;
        let symbol = self.symbol;
        let open = self.current.map(|pos| OpenRemainder {
            account_id: account_id.clone(),
            symbol: symbol.clone(),
            direction: pos.direction,
            open_quantity: pos.open_quantity,
            opened_at: pos.opened_at,
            last_activity_at: pos.last_activity_at,
        });
        (self.trades, open)
    }

    fn open_position(&mut self, fill: &Fill, signed_remaining: Decimal) {
        let direction = if signed_remaining > Decimal::ZERO {
            Direction::Long
        } else {
            Direction::Short
        };
        let quantity = signed_remaining.abs();
        let portion = portion_of(fill, quantity, false);

        self.net_pos += signed_remaining;
        self.current = Some(OpenPosition {
            direction,
            open_quantity: quantity,
            entry_notional: fill.price * quantity,
            exit_notional: Decimal::ZERO,
            fees: portion.commission,
            entry_fills: vec![portion],
            exit_fills: Vec::new(),
            opened_at: fill.time_ms,
            last_activity_at: fill.time_ms,
        });
    }

    fn scale_position(&mut self, fill: &Fill, signed_remaining: Decimal) {
        let pos = self
            .current
            .as_mut()
            .expect("scaling fill requires an open position");
        let quantity = signed_remaining.abs();
        let portion = portion_of(fill, quantity, false);

        pos.open_quantity += quantity;
        pos.entry_notional += fill.price * quantity;
        pos.fees += portion.commission;
        pos.entry_fills.push(portion);
        pos.last_activity_at = fill.time_ms;
        self.net_pos += signed_remaining;
    }

    fn close_portion(&mut self, fill: &Fill, closed: Decimal) {
        let pos = self
            .current
            .as_mut()
            .expect("closing fill requires an open position");
        let portion = portion_of(fill, closed, true);

        pos.open_quantity -= closed;
        pos.exit_notional += fill.price * closed;
        pos.fees += portion.commission;
        pos.exit_fills.push(portion);
        pos.last_activity_at = fill.time_ms;
        self.net_pos += if self.net_pos > Decimal::ZERO {
            -closed
        } else {
            closed
        };
    }

    /// Finalize the current position into a Trade at zero open quantity.
    fn finalize_current(&mut self) {
        let Some(pos) = self.current.take() else {
            return;
        };
        let quantity = pos.entered_quantity();
        if quantity <= Decimal::ZERO {
            warn!(
                account = %self.account_id,
                symbol = %self.symbol,
                "discarding position with no entered quantity"
            );
            return;
        }

        let mut avg_entry = pos.entry_notional / quantity;
        let mut avg_exit = pos.exit_notional / quantity;

        // Broker-reported P&L across exit portions is authoritative; the
        // price-derived figure only steps in when the broker reported none.
        let broker_pnl = pos
            .exit_fills
            .iter()
            .filter_map(|p| p.realized_pnl)
            .fold(None, |acc: Option<Decimal>, p| {
                Some(acc.unwrap_or(Decimal::ZERO) + p)
            });
        let gross_pnl = broker_pnl.unwrap_or_else(|| {
            pnl::price_derived_pnl(pos.direction, avg_entry, avg_exit, quantity)
        });
        let realized_pnl = gross_pnl - pos.fees;

        // Sources that report P&L without distinct prices collapse entry
        // and exit to the same figure; synthesize a display band around it.
        if avg_entry == avg_exit {
            if let Some(reported) = broker_pnl {
                if reported != Decimal::ZERO {
                    let (entry, exit) =
                        pnl::synthesize_price_band(avg_entry, reported, quantity, pos.direction);
                    avg_entry = entry;
                    avg_exit = exit;
                }
            }
        }

        let fill_ids: Vec<String> = pos
            .entry_fills
            .iter()
            .chain(pos.exit_fills.iter())
            .map(|p| p.fill_id.clone())
            .collect();
        let broker_trade_id = derive_broker_trade_id(&fill_ids);

        let exit_time = pos
            .exit_fills
            .last()
            .map(|p| p.time_ms)
            .unwrap_or(pos.last_activity_at);
        let exit_levels: Vec<ExitLevel> = pos
            .exit_fills
            .iter()
            .map(|p| ExitLevel {
                price: p.price,
                quantity: p.quantity,
                time_ms: p.time_ms,
                realized_pnl: p.realized_pnl,
            })
            .collect();

        let trade = Trade {
            composite_id: Trade::composite_id_for(&self.account_id, &self.symbol, &broker_trade_id),
            broker_trade_id,
            account_id: self.account_id.clone(),
            symbol: self.symbol.clone(),
            direction: pos.direction,
            quantity,
            avg_entry_price: avg_entry,
            avg_exit_price: avg_exit,
            realized_pnl,
            fees: pos.fees,
            entry_time_ms: pos.opened_at,
            exit_time_ms: exit_time,
            exit_levels,
        };
        debug!(trade = %trade.composite_id, pnl = %trade.realized_pnl, "position closed");
        self.trades.push(trade);
    }
}

/// Reconcile one account's fills into completed trades, partitioned by
/// symbol with deterministic (time_ms, fill id) ordering.
pub fn reconcile_account(account_id: &AccountId, mut fills: Vec<Fill>) -> ReconcileOutput {
    sort_fills_deterministic(&mut fills);

    let mut output = ReconcileOutput::default();
    for (symbol, partition) in partition_by_symbol(fills) {
        let mut reconciler = PositionReconciler::new(account_id.clone(), symbol);
        for fill in &partition {
            reconciler.process_fill(fill);
        }
        let (trades, open) = reconciler.finish();
        output.trades.extend(trades);
        if let Some(open) = open {
            info!(
                account = %open.account_id,
                symbol = %open.symbol,
                direction = %open.direction,
                open_quantity = %open.open_quantity,
                "position still open at window end, deferred to a future sync"
            );
            output.open_positions.push(open);
        }
    }
    output
}

/// Carve a portion of `quantity` units out of a fill, pro-rating the
/// commission by the consumed fraction. Broker-reported P&L stays with
/// the closing portion only.
fn portion_of(fill: &Fill, quantity: Decimal, is_exit: bool) -> FillPortion {
    let commission = if quantity == fill.quantity {
        fill.commission
    } else {
        fill.commission * quantity / fill.quantity
    };
    FillPortion {
        fill_id: fill.id.clone(),
        quantity,
        price: fill.price,
        commission,
        realized_pnl: if is_exit { fill.realized_pnl } else { None },
        time_ms: fill.time_ms,
    }
}

fn same_sign(a: Decimal, b: Decimal) -> bool {
    (a > Decimal::ZERO) == (b > Decimal::ZERO)
}
