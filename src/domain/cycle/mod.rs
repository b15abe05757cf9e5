//! Trade cycles: ordered pool paths that start and end in the reference
//! asset, enumerated once at startup.

use std::collections::HashSet;

use crate::domain::math::LegReserves;
use crate::domain::pool::{PoolId, PoolMeta, PoolRegistry, ReserveView};

/// One hop of a cycle. `reversed` means the pool's quote side is sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leg {
    pub pool: PoolId,
    pub reversed: bool,
}

impl Leg {
    /// Orientation for selling `symbol` into the pool, if it trades it
    pub fn selling(meta: &PoolMeta, symbol: &str) -> Option<bool> {
        if meta.base.symbol == symbol {
            Some(false)
        } else if meta.quote.symbol == symbol {
            Some(true)
        } else {
            None
        }
    }
}

/// An immutable 2- or 3-hop path through distinct pools
#[derive(Debug, Clone)]
pub struct Cycle {
    pub index: usize,
    pub name: String,
    pub legs: Vec<Leg>,
}

impl Cycle {
    pub fn pool_ids(&self) -> Vec<PoolId> {
        self.legs.iter().map(|l| l.pool).collect()
    }

    /// Reserves of every leg oriented in trade direction, read from a
    /// snapshot indexed by pool id
    pub fn leg_reserves(&self, registry: &PoolRegistry, views: &[ReserveView]) -> Vec<LegReserves> {
        leg_reserves(&self.legs, registry, views)
    }

    /// Capital-at-risk bound for this cycle: the tightest per-pool
    /// override wins, and an explicit 0 on any pool disables the clamp.
    pub fn risk_ratio(&self, registry: &PoolRegistry, global: f64) -> Option<f64> {
        let mut ratio = f64::INFINITY;
        for leg in &self.legs {
            match registry.get(leg.pool).meta.risk_ratio {
                Some(r) if r == 0.0 => return None,
                Some(r) => ratio = ratio.min(r),
                None => ratio = ratio.min(global),
            }
        }
        Some(ratio)
    }

    /// Symbol held after leg `index - 1`, i.e. the asset stranded when
    /// leg `index` fails
    pub fn symbol_into_leg(&self, registry: &PoolRegistry, index: usize) -> String {
        let leg = &self.legs[index];
        let meta = &registry.get(leg.pool).meta;
        if leg.reversed {
            meta.quote.symbol.clone()
        } else {
            meta.base.symbol.clone()
        }
    }
}

/// Reserves of an ad-hoc leg sequence oriented in trade direction
pub fn leg_reserves(
    legs: &[Leg],
    registry: &PoolRegistry,
    views: &[ReserveView],
) -> Vec<LegReserves> {
    legs.iter()
        .map(|leg| {
            let view = &views[leg.pool.0];
            let meta = &registry.get(leg.pool).meta;
            let (reserve_in, reserve_out) = if leg.reversed {
                (view.quote, view.base)
            } else {
                (view.base, view.quote)
            };
            LegReserves {
                reserve_in,
                reserve_out,
                fee: meta.fee,
            }
        })
        .collect()
}

/// Enumerate all 2-hop and 3-hop cycles through the reference asset.
///
/// Pools must be pairwise distinct within a cycle; both orderings of a
/// pool pair are distinct cycles (the mispricing can lean either way).
pub fn build_cycles(
    registry: &PoolRegistry,
    reference: &str,
    tokens_of_interest: &[String],
) -> Vec<Cycle> {
    let mut cycles = Vec::new();
    let intermediates: Vec<&String> = tokens_of_interest
        .iter()
        .filter(|t| t.as_str() != reference)
        .collect();

    // 2-hop: reference -> T on one pool, T -> reference on another
    for &token in &intermediates {
        let pools = registry.pools_pairing(reference, token);
        for &first in &pools {
            for &second in &pools {
                if first == second {
                    continue;
                }
                if let Some(cycle) = two_hop(registry, cycles.len(), reference, token, first, second)
                {
                    cycles.push(cycle);
                }
            }
        }
    }

    // 3-hop: reference -> T1 -> T2 -> reference
    for &t1 in &intermediates {
        for &t2 in &intermediates {
            if t1 == t2 {
                continue;
            }
            for &p1 in &registry.pools_pairing(reference, t1) {
                for &p2 in &registry.pools_pairing(t1, t2) {
                    for &p3 in &registry.pools_pairing(t2, reference) {
                        let distinct = p1 != p2 && p2 != p3 && p1 != p3;
                        if !distinct {
                            continue;
                        }
                        if let Some(cycle) = three_hop(
                            registry,
                            cycles.len(),
                            reference,
                            t1,
                            t2,
                            [p1, p2, p3],
                        ) {
                            cycles.push(cycle);
                        }
                    }
                }
            }
        }
    }

    cycles
}

fn two_hop(
    registry: &PoolRegistry,
    index: usize,
    reference: &str,
    token: &str,
    first: PoolId,
    second: PoolId,
) -> Option<Cycle> {
    let first_meta = &registry.get(first).meta;
    let second_meta = &registry.get(second).meta;
    let legs = vec![
        Leg {
            pool: first,
            reversed: Leg::selling(first_meta, reference)?,
        },
        Leg {
            pool: second,
            reversed: Leg::selling(second_meta, token)?,
        },
    ];
    Some(Cycle {
        index,
        name: format!("{}>{}", first_meta.name, second_meta.name),
        legs,
    })
}

fn three_hop(
    registry: &PoolRegistry,
    index: usize,
    reference: &str,
    t1: &str,
    t2: &str,
    pools: [PoolId; 3],
) -> Option<Cycle> {
    let sell_order = [reference, t1, t2];
    let mut legs = Vec::with_capacity(3);
    let mut names = Vec::with_capacity(3);
    for (pool, sell) in pools.iter().zip(sell_order) {
        let meta = &registry.get(*pool).meta;
        legs.push(Leg {
            pool: *pool,
            reversed: Leg::selling(meta, sell)?,
        });
        names.push(meta.name.clone());
    }
    Some(Cycle {
        index,
        name: names.join(">"),
        legs,
    })
}

/// Sanity check used at startup: every cycle must return to the reference
/// asset through pairwise-distinct pools.
pub fn verify_cycles(registry: &PoolRegistry, cycles: &[Cycle], reference: &str) -> bool {
    cycles.iter().all(|cycle| {
        let pools: HashSet<PoolId> = cycle.legs.iter().map(|l| l.pool).collect();
        if pools.len() != cycle.legs.len() {
            return false;
        }
        let last = cycle.legs.last().expect("cycle has legs");
        registry.get(last.pool).meta.symbol_out(last.reversed) == reference
    })
}
