//! Pool domain - tracked AMM pools and their synchronized reserve state

use anyhow::{Context, Result};
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::domain::math::FeeRate;
use crate::shared::config::Config;
use crate::shared::types::TokenInfo;

/// Stable arena index of a tracked pool.
///
/// Cycles and cooldown marks hold ids, never pool references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(pub usize);

/// Instruction format of the program owning a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolProgram {
    AmmV4,
    TokenSwap,
}

impl FromStr for PoolProgram {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amm_v4" => Ok(PoolProgram::AmmV4),
            "token_swap" => Ok(PoolProgram::TokenSwap),
            other => Err(anyhow::anyhow!("unknown program kind: {}", other)),
        }
    }
}

/// Immutable per-pool metadata from the startup registry
#[derive(Debug, Clone)]
pub struct PoolMeta {
    pub name: String,
    pub address: Pubkey,
    pub program: PoolProgram,
    pub program_id: Pubkey,
    pub authority: Pubkey,
    pub base: TokenInfo,
    pub quote: TokenInfo,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub fee: FeeRate,
    pub risk_ratio: Option<f64>,
}

impl PoolMeta {
    /// Mint of the given side, `reversed` meaning the quote side is sold
    pub fn mint_in(&self, reversed: bool) -> Pubkey {
        if reversed {
            self.quote.mint
        } else {
            self.base.mint
        }
    }

    pub fn mint_out(&self, reversed: bool) -> Pubkey {
        if reversed {
            self.base.mint
        } else {
            self.quote.mint
        }
    }

    pub fn symbol_out(&self, reversed: bool) -> &str {
        if reversed {
            &self.base.symbol
        } else {
            &self.quote.symbol
        }
    }

    /// Whether this pool trades exactly the pair {a, b}
    pub fn trades_pair(&self, a: &str, b: &str) -> bool {
        (self.base.symbol == a && self.quote.symbol == b)
            || (self.base.symbol == b && self.quote.symbol == a)
    }

    /// The other symbol of the pair, if `symbol` is one side
    pub fn counter_symbol(&self, symbol: &str) -> Option<&str> {
        if self.base.symbol == symbol {
            Some(&self.quote.symbol)
        } else if self.quote.symbol == symbol {
            Some(&self.base.symbol)
        } else {
            None
        }
    }
}

/// Raw synchronized reserve state of one pool.
///
/// All fields are overwritten together from a single account payload;
/// `refresh_seq` increments once per applied refresh.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reserves {
    pub base_vault: u64,
    pub quote_vault: u64,
    pub base_open_orders: u64,
    pub quote_open_orders: u64,
    pub base_pending_pnl: u64,
    pub quote_pending_pnl: u64,
    pub refresh_seq: u64,
}

impl Reserves {
    /// Effective tradable liquidity per side: vault plus open-order
    /// reservations minus pending PnL owed to the protocol.
    pub fn effective(&self) -> (u64, u64) {
        let base = self
            .base_vault
            .saturating_add(self.base_open_orders)
            .saturating_sub(self.base_pending_pnl);
        let quote = self
            .quote_vault
            .saturating_add(self.quote_open_orders)
            .saturating_sub(self.quote_pending_pnl);
        (base, quote)
    }
}

/// One consistent read of a pool's effective reserves
#[derive(Debug, Clone, Copy)]
pub struct ReserveView {
    pub base: u64,
    pub quote: u64,
    pub refresh_seq: u64,
}

/// A tracked pool: immutable metadata plus the guarded reserve cell.
///
/// The lock covers the whole `Reserves` struct and is held only across a
/// decode-and-overwrite or a read of both sides; never across an await.
pub struct Pool {
    pub meta: PoolMeta,
    cell: Mutex<Reserves>,
}

impl Pool {
    pub fn new(meta: PoolMeta) -> Self {
        Self {
            meta,
            cell: Mutex::new(Reserves::default()),
        }
    }

    /// Atomically replace the full reserve state
    pub fn store(&self, mut reserves: Reserves) {
        let mut cell = self.cell.lock().expect("pool lock poisoned");
        reserves.refresh_seq = cell.refresh_seq.wrapping_add(1);
        *cell = reserves;
    }

    /// One consistent snapshot of both effective sides
    pub fn view(&self) -> ReserveView {
        let cell = self.cell.lock().expect("pool lock poisoned");
        let (base, quote) = cell.effective();
        ReserveView {
            base,
            quote,
            refresh_seq: cell.refresh_seq,
        }
    }
}

/// Arena of tracked pools with a name lookup built once at startup
pub struct PoolRegistry {
    pools: Vec<Pool>,
    by_name: HashMap<String, PoolId>,
}

impl PoolRegistry {
    pub fn from_metas(metas: Vec<PoolMeta>) -> Self {
        let mut by_name = HashMap::new();
        let pools: Vec<Pool> = metas.into_iter().map(Pool::new).collect();
        for (index, pool) in pools.iter().enumerate() {
            by_name.insert(pool.meta.name.clone(), PoolId(index));
        }
        Self { pools, by_name }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let mut pools = Vec::with_capacity(cfg.pools.len());
        let mut by_name = HashMap::new();

        for (index, pool_cfg) in cfg.pools.iter().enumerate() {
            let interesting = cfg.trade.tokens_of_interest.contains(&pool_cfg.base_symbol)
                && cfg.trade.tokens_of_interest.contains(&pool_cfg.quote_symbol);
            if !interesting {
                continue;
            }

            let parse = |field: &str, value: &str| -> Result<Pubkey> {
                Pubkey::from_str(value)
                    .with_context(|| format!("pool {}: invalid {}", pool_cfg.name, field))
            };

            let meta = PoolMeta {
                name: pool_cfg.name.clone(),
                address: parse("address", &pool_cfg.address)?,
                program: pool_cfg.program.parse()?,
                program_id: parse("program_id", &pool_cfg.program_id)?,
                authority: parse("authority", &pool_cfg.authority)?,
                base: TokenInfo::new(
                    parse("base_mint", &pool_cfg.base_mint)?,
                    pool_cfg.base_symbol.clone(),
                    pool_cfg.base_decimals,
                ),
                quote: TokenInfo::new(
                    parse("quote_mint", &pool_cfg.quote_mint)?,
                    pool_cfg.quote_symbol.clone(),
                    pool_cfg.quote_decimals,
                ),
                base_vault: parse("base_vault", &pool_cfg.base_vault)?,
                quote_vault: parse("quote_vault", &pool_cfg.quote_vault)?,
                fee: FeeRate::new(pool_cfg.fee_numerator, pool_cfg.fee_denominator),
                risk_ratio: pool_cfg.risk_ratio,
            };

            if by_name.contains_key(&meta.name) {
                anyhow::bail!("duplicate pool name: {} (entry {})", meta.name, index);
            }
            by_name.insert(meta.name.clone(), PoolId(pools.len()));
            pools.push(Pool::new(meta));
        }

        if pools.is_empty() {
            anyhow::bail!("no configured pool trades the tokens of interest");
        }
        Ok(Self { pools, by_name })
    }

    pub fn get(&self, id: PoolId) -> &Pool {
        &self.pools[id.0]
    }

    pub fn lookup(&self, name: &str) -> Option<PoolId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = PoolId> {
        (0..self.pools.len()).map(PoolId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PoolId, &Pool)> {
        self.pools.iter().enumerate().map(|(i, p)| (PoolId(i), p))
    }

    /// Pools trading exactly the pair {a, b}
    pub fn pools_pairing(&self, a: &str, b: &str) -> Vec<PoolId> {
        self.iter()
            .filter(|(_, p)| p.meta.trades_pair(a, b))
            .map(|(id, _)| id)
            .collect()
    }

    /// Pools with `symbol` on either side
    pub fn pools_with(&self, symbol: &str) -> Vec<PoolId> {
        self.iter()
            .filter(|(_, p)| p.meta.counter_symbol(symbol).is_some())
            .map(|(id, _)| id)
            .collect()
    }

    /// One consistent view per pool, indexed by pool id.
    ///
    /// Locks are taken one pool at a time; views of different pools may
    /// come from different refresh ticks.
    pub fn snapshot(&self) -> Vec<ReserveView> {
        self.pools.iter().map(|p| p.view()).collect()
    }
}

/// Per-pool cooldown marks written at trade submission
#[derive(Default)]
pub struct CooldownBook {
    last_trade: Mutex<HashMap<PoolId, Instant>>,
}

impl CooldownBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, pools: &[PoolId]) {
        let now = Instant::now();
        let mut book = self.last_trade.lock().expect("cooldown lock poisoned");
        for id in pools {
            book.insert(*id, now);
        }
    }

    /// Pools still inside their cooldown window
    pub fn cooling_set(&self, cooldown: Duration) -> HashSet<PoolId> {
        let now = Instant::now();
        let book = self.last_trade.lock().expect("cooldown lock poisoned");
        book.iter()
            .filter(|(_, t)| now.duration_since(**t) < cooldown)
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Guarded wallet balance of the reference asset
#[derive(Default)]
pub struct WalletBalance {
    amount: Mutex<u64>,
}

impl WalletBalance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, amount: u64) {
        *self.amount.lock().expect("balance lock poisoned") = amount;
    }

    pub fn get(&self) -> u64 {
        *self.amount.lock().expect("balance lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn test_meta(name: &str, base: &str, quote: &str) -> PoolMeta {
        PoolMeta {
            name: name.to_string(),
            address: Pubkey::new_unique(),
            program: PoolProgram::AmmV4,
            program_id: Pubkey::new_unique(),
            authority: Pubkey::new_unique(),
            base: TokenInfo::new(Pubkey::new_unique(), base, 9),
            quote: TokenInfo::new(Pubkey::new_unique(), quote, 6),
            base_vault: Pubkey::new_unique(),
            quote_vault: Pubkey::new_unique(),
            fee: FeeRate::new(25, 10_000),
            risk_ratio: None,
        }
    }

    #[test]
    fn test_effective_reserves_saturate() {
        let reserves = Reserves {
            base_vault: 100,
            quote_vault: 50,
            base_open_orders: 20,
            quote_open_orders: 0,
            base_pending_pnl: 500,
            quote_pending_pnl: 10,
            refresh_seq: 0,
        };
        assert_eq!(reserves.effective(), (0, 40));
    }

    #[test]
    fn test_store_bumps_refresh_seq() {
        let pool = Pool::new(test_meta("SOL-USDC", "SOL", "USDC"));
        pool.store(Reserves {
            base_vault: 1,
            ..Default::default()
        });
        pool.store(Reserves {
            base_vault: 2,
            ..Default::default()
        });
        let view = pool.view();
        assert_eq!(view.refresh_seq, 2);
        assert_eq!(view.base, 2);
    }

    #[test]
    fn test_counter_symbol() {
        let meta = test_meta("SOL-USDC", "SOL", "USDC");
        assert_eq!(meta.counter_symbol("SOL"), Some("USDC"));
        assert_eq!(meta.counter_symbol("USDC"), Some("SOL"));
        assert_eq!(meta.counter_symbol("RAY"), None);
    }

    // Writers always store a coherent pair (quote = 2 * base); a reader
    // observing anything else has seen a torn view.
    #[test]
    fn test_views_never_tear_under_concurrent_refresh() {
        let pool = Arc::new(Pool::new(test_meta("SOL-USDC", "SOL", "USDC")));

        let writer = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                for seed in 1..5_000u64 {
                    pool.store(Reserves {
                        base_vault: seed,
                        quote_vault: seed * 2,
                        ..Default::default()
                    });
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        let view = pool.view();
                        assert_eq!(view.quote, view.base * 2, "torn reserve read");
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn test_cooldown_window() {
        let book = CooldownBook::new();
        book.mark(&[PoolId(0), PoolId(2)]);
        let cooling = book.cooling_set(Duration::from_secs(60));
        assert!(cooling.contains(&PoolId(0)));
        assert!(cooling.contains(&PoolId(2)));
        assert!(!cooling.contains(&PoolId(1)));
        assert!(book.cooling_set(Duration::ZERO).is_empty());
    }
}
