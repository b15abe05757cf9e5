//! Opportunity scanner: pure max-profit selection over a reserve snapshot

use std::collections::HashSet;

use tracing::debug;

use crate::domain::cycle::Cycle;
use crate::domain::math::{optimal_input_2hop, optimal_input_3hop, size_trade};
use crate::domain::pool::{PoolId, PoolRegistry, ReserveView};

#[derive(Debug, Clone, Copy)]
pub struct ScanParams {
    /// Minimum net profit in reference-token native units
    pub min_profit: u64,
    /// Global capital-at-risk bound, overridable per pool
    pub max_capital_ratio: f64,
}

/// A scored evaluation of one cycle at one snapshot instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opportunity {
    pub cycle_index: usize,
    pub amount_in: u64,
    /// Chained expected output per leg
    pub outputs: Vec<u64>,
    pub profit: u64,
}

/// Evaluate every cycle against one snapshot and return the best
/// executable opportunity, if any clears the filters.
///
/// Pure: identical snapshot, balance and cooldown inputs always produce
/// the identical result. Degenerate optima (no mispricing, zero reserves,
/// non-finite math) skip the cycle silently.
pub fn scan(
    cycles: &[Cycle],
    registry: &PoolRegistry,
    views: &[ReserveView],
    wallet_balance: u64,
    cooling: &HashSet<PoolId>,
    params: &ScanParams,
) -> Option<Opportunity> {
    let mut best: Option<Opportunity> = None;

    for cycle in cycles {
        if cycle.legs.iter().any(|leg| cooling.contains(&leg.pool)) {
            debug!(cycle = %cycle.name, "skipped: pool cooling down");
            continue;
        }

        let legs = cycle.leg_reserves(registry, views);
        let optimal = match legs.len() {
            2 => optimal_input_2hop(&legs[0], &legs[1]),
            3 => optimal_input_3hop(&legs[0], &legs[1], &legs[2]),
            _ => None,
        };
        let candidate = match optimal {
            Some(amount) => amount.min(wallet_balance),
            None => continue,
        };
        if candidate == 0 {
            continue;
        }

        let ratio = cycle.risk_ratio(registry, params.max_capital_ratio);
        let sized = match size_trade(&legs, candidate, ratio) {
            Some(sized) => sized,
            None => continue,
        };
        if sized.profit < params.min_profit {
            continue;
        }

        let better = best
            .as_ref()
            .map(|b| sized.profit > b.profit)
            .unwrap_or(true);
        if better {
            best = Some(Opportunity {
                cycle_index: cycle.index,
                amount_in: sized.amount_in,
                outputs: sized.outputs,
                profit: sized.profit,
            });
        }
    }

    best
}
