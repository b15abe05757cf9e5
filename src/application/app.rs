//! Process wiring: bootstrap the pool set, start synchronization, and
//! drive the scan loop. Execution runs in detached tasks so a trade that
//! blocks on confirmation or recovery never stalls the next scan tick.

use anyhow::{Context, Result};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::read_keypair_file;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::application::report::TradeLog;
use crate::domain::cycle::{build_cycles, verify_cycles, Cycle};
use crate::domain::execution::{ExecutionParams, SagaCoordinator, TradeSink};
use crate::domain::pool::{CooldownBook, PoolRegistry, WalletBalance};
use crate::domain::scanner::{scan, ScanParams};
use crate::infrastructure::chain::client::SolanaChainClient;
use crate::infrastructure::chain::pubsub::{spawn_pool_subscriptions, SubscriptionConfig};
use crate::infrastructure::chain::sync::ReserveSynchronizer;
use crate::shared::config::Config;
use crate::shared::types::format_amount;

pub async fn run(cfg: Config) -> Result<()> {
    let registry = Arc::new(PoolRegistry::from_config(&cfg)?);
    let cycles = build_cycles(
        &registry,
        &cfg.trade.reference_token,
        &cfg.trade.tokens_of_interest,
    );
    anyhow::ensure!(
        !cycles.is_empty(),
        "no tradable cycle passes through {}",
        cfg.trade.reference_token
    );
    anyhow::ensure!(
        verify_cycles(&registry, &cycles, &cfg.trade.reference_token),
        "cycle enumeration produced a path that does not close at {}",
        cfg.trade.reference_token
    );
    info!(
        pools = registry.len(),
        cycles = cycles.len(),
        reference = %cfg.trade.reference_token,
        "pool registry loaded"
    );

    let commitment = CommitmentConfig::from_str(&cfg.rpc.commitment)
        .map_err(|e| anyhow::anyhow!("rpc.commitment: {}", e))?;
    let keypair = read_keypair_file(&cfg.wallet.keypair)
        .map_err(|e| anyhow::anyhow!("failed to load keypair {}: {}", cfg.wallet.keypair, e))?;
    let wallet_account =
        Pubkey::from_str(&cfg.wallet.reference_account).context("wallet.reference_account")?;

    let chain = Arc::new(SolanaChainClient::new(
        cfg.rpc.url.clone(),
        Duration::from_millis(cfg.rpc.timeout_ms),
        commitment,
        keypair,
    ));
    let wallet_balance = Arc::new(WalletBalance::new());
    let sync = Arc::new(ReserveSynchronizer::new(
        Arc::clone(&chain),
        Arc::clone(&registry),
        wallet_account,
        Arc::clone(&wallet_balance),
    ));

    // Fail fast: a pool that cannot be read and decoded at startup is a
    // configuration problem, not a transient one.
    sync.initialize().await.context("startup reserve initialization")?;

    spawn_synchronization(&cfg, commitment, Arc::clone(&registry), Arc::clone(&sync));

    let log = Arc::new(TradeLog::open(&cfg.report.path)?) as Arc<dyn TradeSink>;
    let cooldowns = Arc::new(CooldownBook::new());
    let coordinator = Arc::new(SagaCoordinator::new(
        Arc::clone(&chain),
        Arc::clone(&registry),
        Arc::clone(&sync),
        Arc::clone(&cooldowns),
        Arc::clone(&wallet_balance),
        log,
        cfg.trade.reference_token.clone(),
        execution_params(&cfg),
    ));

    run_scan_loop(
        &cfg,
        registry,
        Arc::new(cycles),
        cooldowns,
        wallet_balance,
        coordinator,
    )
    .await
}

fn execution_params(cfg: &Config) -> ExecutionParams {
    ExecutionParams {
        slippage_bps: cfg.trade.slippage_bps,
        compute_unit_limit: cfg.trade.compute_unit_limit,
        priority_fee_microlamports: cfg.trade.priority_fee_microlamports,
        confirm_poll_interval: Duration::from_millis(cfg.execution.confirm_poll_interval_ms),
        confirm_poll_attempts: cfg.execution.confirm_poll_attempts,
        max_leg_retries: cfg.execution.max_leg_retries,
        max_recovery_attempts: cfg.execution.max_recovery_attempts,
        retry_backoff: Duration::from_millis(cfg.execution.retry_backoff_ms),
    }
}

fn spawn_synchronization(
    cfg: &Config,
    commitment: CommitmentConfig,
    registry: Arc<PoolRegistry>,
    sync: Arc<ReserveSynchronizer<SolanaChainClient>>,
) {
    let refresh_interval = Duration::from_millis(cfg.sync.refresh_interval_ms);

    if cfg.sync.mode == "subscribe" {
        info!(pools = registry.len(), "starting push-based reserve feeds");
        spawn_pool_subscriptions(
            SubscriptionConfig {
                ws_url: cfg.rpc.ws_url.clone(),
                commitment,
                resubscribe_delay: Duration::from_millis(cfg.sync.resubscribe_delay_ms),
            },
            registry,
        );
        // The wallet balance has no account feed; keep it on the poll tick
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = sync.refresh_wallet().await {
                    warn!(error = %e, "wallet refresh skipped this tick");
                }
            }
        });
    } else {
        info!(
            interval_ms = cfg.sync.refresh_interval_ms,
            "starting batched reserve polling"
        );
        tokio::spawn(async move {
            sync.run_poll_loop(refresh_interval).await;
        });
    }
}

async fn run_scan_loop(
    cfg: &Config,
    registry: Arc<PoolRegistry>,
    cycles: Arc<Vec<Cycle>>,
    cooldowns: Arc<CooldownBook>,
    wallet_balance: Arc<WalletBalance>,
    coordinator: Arc<SagaCoordinator<SolanaChainClient>>,
) -> Result<()> {
    let params = ScanParams {
        min_profit: cfg.trade.min_profit,
        max_capital_ratio: cfg.risk.max_capital_ratio,
    };
    let cooldown = Duration::from_millis(cfg.trade.cooldown_ms);
    let mut ticker = tokio::time::interval(Duration::from_millis(cfg.trade.scan_interval_ms));
    info!(
        interval_ms = cfg.trade.scan_interval_ms,
        min_profit = cfg.trade.min_profit,
        dry_run = cfg.trade.dry_run,
        "scan loop running"
    );

    loop {
        ticker.tick().await;

        let views = registry.snapshot();
        let cooling = cooldowns.cooling_set(cooldown);
        let balance = wallet_balance.get();

        let Some(opportunity) = scan(&cycles, &registry, &views, balance, &cooling, &params)
        else {
            continue;
        };

        let cycle = &cycles[opportunity.cycle_index];
        if cfg.trade.dry_run {
            let first = &cycle.legs[0];
            let meta = &registry.get(first.pool).meta;
            let decimals = if first.reversed {
                meta.quote.decimals
            } else {
                meta.base.decimals
            };
            info!(
                cycle = %cycle.name,
                amount_in = %format_amount(opportunity.amount_in, decimals),
                profit = %format_amount(opportunity.profit, decimals),
                "dry run: opportunity not executed"
            );
            continue;
        }

        // Detached: confirmation and recovery may block for tens of
        // seconds while the scanner keeps ticking.
        let coordinator = Arc::clone(&coordinator);
        let cycles = Arc::clone(&cycles);
        tokio::spawn(async move {
            let cycle = &cycles[opportunity.cycle_index];
            coordinator.execute(cycle, &opportunity).await;
        });
    }
}
