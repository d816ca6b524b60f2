//! Backtest aggregator.
//!
//! Replays one ticket against every draw in the history and reports,
//! for each of the nine tiers, how often it would have won and when.

use chrono::NaiveDate;
use serde::Serialize;

use super::classifier::PrizeTable;
use crate::types::{DrawRecord, Ticket, Tier};

/// Hits for one tier. Dates are in history order (newest first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierResult {
    pub tier: Tier,
    pub name: &'static str,
    /// Winning patterns, e.g. `"3+1 / 2+2"`.
    pub condition: String,
    pub count: usize,
    pub dates: Vec<NaiveDate>,
}

impl TierResult {
    pub fn last_hit(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }
}

/// Full backtest output for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestSummary {
    pub ticket: Ticket,
    pub draws_evaluated: usize,
    pub history_version: u64,
    pub total_hits: usize,
    pub best_tier: Option<Tier>,
    pub tiers: Vec<TierResult>,
}

/// Aggregate against the standard prize table.
pub fn aggregate(ticket: &Ticket, history: &[DrawRecord]) -> Vec<TierResult> {
    aggregate_with(&PrizeTable::standard(), ticket, history)
}

/// Aggregate against an explicit prize table. Always returns nine
/// entries in tier order, zero-count tiers included.
pub fn aggregate_with(table: &PrizeTable, ticket: &Ticket, history: &[DrawRecord]) -> Vec<TierResult> {
    let mut results: Vec<TierResult> = Tier::ALL
        .iter()
        .map(|&tier| TierResult {
            tier,
            name: tier.name(),
            condition: table.condition_label(tier),
            count: 0,
            dates: Vec::new(),
        })
        .collect();

    for draw in history {
        if let Some(tier) = table.classify(ticket, draw) {
            let slot = &mut results[usize::from(tier.number()) - 1];
            slot.count += 1;
            slot.dates.push(draw.date());
        }
    }
    results
}

/// Best tier with at least one hit.
pub fn best_tier(results: &[TierResult]) -> Option<Tier> {
    results.iter().filter(|r| r.count > 0).map(|r| r.tier).min()
}

pub fn total_hits(results: &[TierResult]) -> usize {
    results.iter().map(|r| r.count).sum()
}

pub fn summarise(ticket: &Ticket, history: &[DrawRecord], version: u64) -> BacktestSummary {
    let tiers = aggregate(ticket, history);
    BacktestSummary {
        ticket: ticket.clone(),
        draws_evaluated: history.len(),
        history_version: version,
        total_hits: total_hits(&tiers),
        best_tier: best_tier(&tiers),
        tiers,
    }
}
