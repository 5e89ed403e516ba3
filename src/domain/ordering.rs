//! Deterministic fill ordering and symbol partitioning.
//!
//! Two fills at the identical timestamp are ordered by ascending fill id.
//! Reconciliation matches fills in this order, so the tie-break is what
//! keeps `broker_trade_id` derivation reproducible across re-runs.

use std::collections::BTreeMap;

use crate::domain::{Fill, Symbol};

/// Sort fills by (time_ms, fill id) ascending.
pub fn sort_fills_deterministic(fills: &mut [Fill]) {
    fills.sort_by(|a, b| {
        a.time_ms
            .cmp(&b.time_ms)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Partition fills by symbol, preserving the order within each partition.
///
/// BTreeMap keeps partition iteration order stable, so a whole-account
/// reconciliation pass is deterministic end to end.
pub fn partition_by_symbol(fills: Vec<Fill>) -> BTreeMap<Symbol, Vec<Fill>> {
    let mut partitions: BTreeMap<Symbol, Vec<Fill>> = BTreeMap::new();
    for fill in fills {
        partitions.entry(fill.symbol.clone()).or_default().push(fill);
    }
    partitions
}
