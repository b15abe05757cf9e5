//! Saga coordinator: turns a scanned opportunity into signed
//! transactions and reconciles partially-executed cycles.
//!
//! Per transaction the attempt moves `Built -> Submitted -> {Confirmed,
//! Failed, TimedOut}`. A 2-hop cycle whose pools share one instruction
//! format is packed into a single atomic transaction; heterogeneous
//! pairings and 3-hop cycles run leg-by-leg, each gated on the observed
//! success of the previous leg. A later leg failing on slippage leaves
//! the wallet holding an intermediate asset; the recovery path converts
//! it back to the reference asset with no profit floor.

use rand::Rng;
use solana_sdk::instruction::Instruction;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::{TradeOutcome, TradeRecord, TradeSink};
use crate::domain::cycle::{leg_reserves, Cycle, Leg};
use crate::domain::math::{min_out, quote_chain};
use crate::domain::pool::{CooldownBook, PoolId, PoolRegistry, WalletBalance};
use crate::domain::scanner::Opportunity;
use crate::infrastructure::chain::client::{ChainClient, SignatureStatus};
use crate::infrastructure::chain::instructions::{compute_budget_instructions, swap_instruction};
use crate::infrastructure::chain::sync::ReserveSynchronizer;
use crate::shared::errors::{classify_execution_failure, FailureKind};

#[derive(Debug, Clone)]
pub struct ExecutionParams {
    pub slippage_bps: u32,
    pub compute_unit_limit: u32,
    pub priority_fee_microlamports: u64,
    pub confirm_poll_interval: Duration,
    pub confirm_poll_attempts: u32,
    pub max_leg_retries: u32,
    pub max_recovery_attempts: u32,
    pub retry_backoff: Duration,
}

/// Terminal state of one submitted transaction
enum SubmitOutcome {
    Confirmed(Signature),
    Failed(Signature, String),
    TimedOut(Signature),
}

/// Result of driving one leg through its bounded retry loop
enum LegResult {
    Confirmed(Signature),
    /// Remote rejected the leg; kind selects the failure branch
    Rejected { kind: FailureKind, error: String },
    /// Generic failures persisted through the whole retry budget
    Exhausted(String),
    TimedOut,
}

pub struct SagaCoordinator<C: ChainClient> {
    chain: Arc<C>,
    registry: Arc<PoolRegistry>,
    sync: Arc<ReserveSynchronizer<C>>,
    cooldowns: Arc<CooldownBook>,
    wallet_balance: Arc<WalletBalance>,
    sink: Arc<dyn TradeSink>,
    reference: String,
    params: ExecutionParams,
}

impl<C: ChainClient> SagaCoordinator<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Arc<C>,
        registry: Arc<PoolRegistry>,
        sync: Arc<ReserveSynchronizer<C>>,
        cooldowns: Arc<CooldownBook>,
        wallet_balance: Arc<WalletBalance>,
        sink: Arc<dyn TradeSink>,
        reference: String,
        params: ExecutionParams,
    ) -> Self {
        Self {
            chain,
            registry,
            sync,
            cooldowns,
            wallet_balance,
            sink,
            reference,
            params,
        }
    }

    /// Drive one opportunity to a terminal outcome. Never returns an
    /// error: every failure mode ends in a log record, nothing propagates
    /// to the scan loop.
    pub async fn execute(&self, cycle: &Cycle, opportunity: &Opportunity) {
        let attempt_id = Uuid::new_v4().to_string();
        let balance_before = self.wallet_balance.get();

        // Pessimistic: written at submission time so the scanner cannot
        // re-select these pools while the attempt is outstanding.
        self.cooldowns.mark(&cycle.pool_ids());

        info!(
            attempt = %attempt_id,
            cycle = %cycle.name,
            amount_in = opportunity.amount_in,
            expected_profit = opportunity.profit,
            "executing opportunity"
        );

        if self.is_atomic(cycle) {
            self.execute_atomic(cycle, opportunity, &attempt_id, balance_before)
                .await;
        } else {
            self.execute_sequential(cycle, opportunity, &attempt_id, balance_before)
                .await;
        }
    }

    /// Both legs of a homogeneous 2-hop cycle fit one transaction
    fn is_atomic(&self, cycle: &Cycle) -> bool {
        if cycle.legs.len() != 2 {
            return false;
        }
        let first = self.registry.get(cycle.legs[0].pool).meta.program;
        cycle
            .legs
            .iter()
            .all(|leg| self.registry.get(leg.pool).meta.program == first)
    }

    async fn execute_atomic(
        &self,
        cycle: &Cycle,
        opportunity: &Opportunity,
        attempt_id: &str,
        balance_before: u64,
    ) {
        let mut instructions = self.budget_instructions();
        let inputs = self.leg_inputs(opportunity);
        for (index, leg) in cycle.legs.iter().enumerate() {
            instructions.push(self.leg_instruction(leg, inputs[index], opportunity.outputs[index]));
        }

        let final_out = *opportunity.outputs.last().expect("cycle has legs");
        match self.submit_and_confirm(&instructions).await {
            Ok(SubmitOutcome::Confirmed(signature)) => {
                self.finish(
                    attempt_id,
                    cycle.name.clone(),
                    TradeOutcome::Success,
                    opportunity.amount_in,
                    final_out,
                    balance_before,
                    Some(signature),
                    None,
                )
                .await;
            }
            Ok(SubmitOutcome::Failed(signature, error)) => {
                // Atomic: leg 1 never took effect, nothing is stranded
                self.finish(
                    attempt_id,
                    cycle.name.clone(),
                    TradeOutcome::Failed,
                    opportunity.amount_in,
                    opportunity.amount_in,
                    balance_before,
                    Some(signature),
                    Some(error),
                )
                .await;
            }
            Ok(SubmitOutcome::TimedOut(signature)) => {
                self.finish(
                    attempt_id,
                    cycle.name.clone(),
                    TradeOutcome::TimedOut,
                    opportunity.amount_in,
                    0,
                    balance_before,
                    Some(signature),
                    Some("status unresolved within poll budget".to_string()),
                )
                .await;
            }
            Err(error) => {
                self.finish(
                    attempt_id,
                    cycle.name.clone(),
                    TradeOutcome::Failed,
                    opportunity.amount_in,
                    opportunity.amount_in,
                    balance_before,
                    None,
                    Some(error),
                )
                .await;
            }
        }
    }

    async fn execute_sequential(
        &self,
        cycle: &Cycle,
        opportunity: &Opportunity,
        attempt_id: &str,
        balance_before: u64,
    ) {
        let inputs = self.leg_inputs(opportunity);

        for (index, leg) in cycle.legs.iter().enumerate() {
            let mut instructions = self.budget_instructions();
            instructions.push(self.leg_instruction(leg, inputs[index], opportunity.outputs[index]));

            match self.drive_leg(&instructions).await {
                LegResult::Confirmed(_) => continue,
                LegResult::TimedOut => {
                    // Success is not assumed: abandon without touching the
                    // remaining legs.
                    let detail = if index == 0 {
                        "leg 1 status unresolved; no further legs submitted".to_string()
                    } else {
                        format!(
                            "leg {} status unresolved; {} {} possibly stranded",
                            index + 1,
                            inputs[index],
                            cycle.symbol_into_leg(&self.registry, index)
                        )
                    };
                    self.finish(
                        attempt_id,
                        cycle.name.clone(),
                        TradeOutcome::TimedOut,
                        opportunity.amount_in,
                        0,
                        balance_before,
                        None,
                        Some(detail),
                    )
                    .await;
                    return;
                }
                LegResult::Rejected { kind, error } => {
                    if index > 0 && kind == FailureKind::Slippage {
                        self.recover(
                            cycle,
                            attempt_id,
                            opportunity.amount_in,
                            inputs[index],
                            cycle.symbol_into_leg(&self.registry, index),
                            balance_before,
                        )
                        .await;
                        return;
                    }
                    let (outcome, amount_out) = if index == 0 {
                        // Wallet still holds the reference asset
                        (TradeOutcome::Failed, opportunity.amount_in)
                    } else {
                        (TradeOutcome::Failed, 0)
                    };
                    self.finish(
                        attempt_id,
                        cycle.name.clone(),
                        outcome,
                        opportunity.amount_in,
                        amount_out,
                        balance_before,
                        None,
                        Some(format!("leg {} rejected: {}", index + 1, error)),
                    )
                    .await;
                    return;
                }
                LegResult::Exhausted(error) => {
                    let detail = if index == 0 {
                        format!("leg 1 retries exhausted: {}", error)
                    } else {
                        format!(
                            "leg {} retries exhausted, {} {} stranded: {}",
                            index + 1,
                            inputs[index],
                            cycle.symbol_into_leg(&self.registry, index),
                            error
                        )
                    };
                    let amount_out = if index == 0 { opportunity.amount_in } else { 0 };
                    self.finish(
                        attempt_id,
                        cycle.name.clone(),
                        TradeOutcome::Failed,
                        opportunity.amount_in,
                        amount_out,
                        balance_before,
                        None,
                        Some(detail),
                    )
                    .await;
                    return;
                }
            }
        }

        let final_out = *opportunity.outputs.last().expect("cycle has legs");
        self.finish(
            attempt_id,
            cycle.name.clone(),
            TradeOutcome::Success,
            opportunity.amount_in,
            final_out,
            balance_before,
            None,
            None,
        )
        .await;
    }

    /// Convert a stranded intermediate balance back to the reference
    /// asset over the best currently-priced path. Capital recovery only:
    /// the original profit target is ignored.
    async fn recover(
        &self,
        cycle: &Cycle,
        attempt_id: &str,
        cycle_amount_in: u64,
        stranded_amount: u64,
        stranded_symbol: String,
        balance_before: u64,
    ) {
        warn!(
            attempt = %attempt_id,
            asset = %stranded_symbol,
            amount = stranded_amount,
            "leg rejected on slippage, entering recovery"
        );

        let paths = self.recovery_paths(&stranded_symbol);
        if paths.is_empty() {
            self.finish(
                attempt_id,
                cycle.name.clone(),
                TradeOutcome::RecoveryFailed,
                cycle_amount_in,
                0,
                balance_before,
                None,
                Some(format!("no route from {} to {}", stranded_symbol, self.reference)),
            )
            .await;
            return;
        }
        let involved: Vec<PoolId> = paths.iter().flatten().map(|leg| leg.pool).collect();

        for attempt in 0..self.params.max_recovery_attempts {
            if let Err(e) = self.sync.refresh_pools(&involved).await {
                warn!(error = %e, "recovery reserve refresh failed, retrying");
                tokio::time::sleep(self.backoff_delay(attempt)).await;
                continue;
            }

            let views = self.registry.snapshot();
            let Some((path, outputs)) = self.best_recovery_path(&paths, &views, stranded_amount)
            else {
                self.finish(
                    attempt_id,
                    cycle.name.clone(),
                    TradeOutcome::RecoveryFailed,
                    cycle_amount_in,
                    0,
                    balance_before,
                    None,
                    Some(format!(
                        "no recovery path prices {} {}",
                        stranded_amount, stranded_symbol
                    )),
                )
                .await;
                return;
            };

            let mut instructions = self.budget_instructions();
            let mut amount = stranded_amount;
            for (leg, expected_out) in path.iter().zip(&outputs) {
                instructions.push(self.leg_instruction(leg, amount, *expected_out));
                amount = *expected_out;
            }

            match self.submit_and_confirm(&instructions).await {
                Ok(SubmitOutcome::Confirmed(signature)) => {
                    let recovered = *outputs.last().expect("path has legs");
                    self.finish(
                        attempt_id,
                        cycle.name.clone(),
                        TradeOutcome::Recovered,
                        cycle_amount_in,
                        recovered,
                        balance_before,
                        Some(signature),
                        Some(format!(
                            "recovered {} {} via {} pool(s)",
                            recovered,
                            self.reference,
                            path.len()
                        )),
                    )
                    .await;
                    return;
                }
                Ok(SubmitOutcome::Failed(_, error)) => {
                    if classify_execution_failure(&error) == FailureKind::InsufficientLiquidity {
                        // Fatal: manual intervention required
                        self.finish(
                            attempt_id,
                            cycle.name.clone(),
                            TradeOutcome::RecoveryFailed,
                            cycle_amount_in,
                            0,
                            balance_before,
                            None,
                            Some(format!("recovery rejected: {}", error)),
                        )
                        .await;
                        return;
                    }
                    warn!(attempt, error = %error, "recovery submission rejected, repricing");
                }
                Ok(SubmitOutcome::TimedOut(_)) => {
                    warn!(attempt, "recovery status unresolved, resubmitting");
                }
                Err(error) => {
                    warn!(attempt, error = %error, "recovery submit failed");
                }
            }
            tokio::time::sleep(self.backoff_delay(attempt)).await;
        }

        self.finish(
            attempt_id,
            cycle.name.clone(),
            TradeOutcome::RecoveryFailed,
            cycle_amount_in,
            0,
            balance_before,
            None,
            Some(format!(
                "recovery attempts exhausted, {} {} still stranded",
                stranded_amount, stranded_symbol
            )),
        )
        .await;
    }

    /// Direct pairs and every 2-hop path through a third asset
    fn recovery_paths(&self, stranded: &str) -> Vec<Vec<Leg>> {
        let mut paths = Vec::new();

        for id in self.registry.pools_pairing(stranded, &self.reference) {
            let meta = &self.registry.get(id).meta;
            if let Some(reversed) = Leg::selling(meta, stranded) {
                paths.push(vec![Leg { pool: id, reversed }]);
            }
        }

        for first in self.registry.pools_with(stranded) {
            let first_meta = &self.registry.get(first).meta;
            let Some(mid) = first_meta.counter_symbol(stranded) else {
                continue;
            };
            if mid == self.reference {
                continue;
            }
            let mid = mid.to_string();
            for second in self.registry.pools_pairing(&mid, &self.reference) {
                if second == first {
                    continue;
                }
                let second_meta = &self.registry.get(second).meta;
                let legs = match (
                    Leg::selling(first_meta, stranded),
                    Leg::selling(second_meta, &mid),
                ) {
                    (Some(a), Some(b)) => vec![
                        Leg {
                            pool: first,
                            reversed: a,
                        },
                        Leg {
                            pool: second,
                            reversed: b,
                        },
                    ],
                    _ => continue,
                };
                paths.push(legs);
            }
        }

        paths
    }

    /// Highest-output path for the stranded amount at current reserves
    fn best_recovery_path<'a>(
        &self,
        paths: &'a [Vec<Leg>],
        views: &[crate::domain::pool::ReserveView],
        amount: u64,
    ) -> Option<(&'a Vec<Leg>, Vec<u64>)> {
        paths
            .iter()
            .filter_map(|path| {
                let legs = leg_reserves(path, &self.registry, views);
                let outputs = quote_chain(&legs, amount);
                let final_out = *outputs.last()?;
                (final_out > 0).then_some((path, outputs, final_out))
            })
            .max_by_key(|(_, _, final_out)| *final_out)
            .map(|(path, outputs, _)| (path, outputs))
    }

    /// Bounded generic-failure retry loop around one leg transaction
    async fn drive_leg(&self, instructions: &[Instruction]) -> LegResult {
        for attempt in 0..=self.params.max_leg_retries {
            match self.submit_and_confirm(instructions).await {
                Ok(SubmitOutcome::Confirmed(signature)) => {
                    return LegResult::Confirmed(signature);
                }
                Ok(SubmitOutcome::Failed(_, error)) => {
                    match classify_execution_failure(&error) {
                        FailureKind::Other => {
                            if attempt == self.params.max_leg_retries {
                                return LegResult::Exhausted(error);
                            }
                            warn!(attempt, error = %error, "leg failed, retrying");
                        }
                        kind => return LegResult::Rejected { kind, error },
                    }
                }
                Ok(SubmitOutcome::TimedOut(_)) => return LegResult::TimedOut,
                Err(error) => {
                    if attempt == self.params.max_leg_retries {
                        return LegResult::Exhausted(error);
                    }
                    warn!(attempt, error = %error, "leg submit failed, retrying");
                }
            }
            tokio::time::sleep(self.backoff_delay(attempt)).await;
        }
        unreachable!("retry loop always returns")
    }

    /// Broadcast and poll until the status resolves or the budget runs out
    async fn submit_and_confirm(
        &self,
        instructions: &[Instruction],
    ) -> Result<SubmitOutcome, String> {
        let signature = self
            .chain
            .submit_transaction(instructions)
            .await
            .map_err(|e| e.to_string())?;

        for _ in 0..self.params.confirm_poll_attempts {
            tokio::time::sleep(self.params.confirm_poll_interval).await;
            match self.chain.signature_status(&signature).await {
                Ok(SignatureStatus::Confirmed) => {
                    return Ok(SubmitOutcome::Confirmed(signature));
                }
                Ok(SignatureStatus::Failed(error)) => {
                    return Ok(SubmitOutcome::Failed(signature, error));
                }
                Ok(SignatureStatus::Unknown) => {}
                Err(e) => {
                    warn!(error = %e, "status query failed, polling again");
                }
            }
        }
        Ok(SubmitOutcome::TimedOut(signature))
    }

    fn budget_instructions(&self) -> Vec<Instruction> {
        compute_budget_instructions(
            self.params.compute_unit_limit,
            self.params.priority_fee_microlamports,
        )
    }

    fn leg_instruction(&self, leg: &Leg, amount_in: u64, expected_out: u64) -> Instruction {
        let meta = &self.registry.get(leg.pool).meta;
        swap_instruction(
            meta,
            &self.chain.payer(),
            leg.reversed,
            amount_in,
            min_out(expected_out, self.params.slippage_bps),
        )
    }

    /// Input amount per leg: the configured input, then the expected chain
    fn leg_inputs(&self, opportunity: &Opportunity) -> Vec<u64> {
        let mut inputs = vec![opportunity.amount_in];
        inputs.extend(&opportunity.outputs[..opportunity.outputs.len() - 1]);
        inputs
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.params.retry_backoff.as_millis() as u64;
        if base == 0 {
            return Duration::ZERO;
        }
        let exponential = base.saturating_mul(1u64 << attempt.min(6));
        let jitter = rand::thread_rng().gen_range(0..=base / 2);
        Duration::from_millis(exponential + jitter)
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        attempt_id: &str,
        cycle: String,
        outcome: TradeOutcome,
        amount_in: u64,
        amount_out: u64,
        balance_before: u64,
        signature: Option<Signature>,
        detail: Option<String>,
    ) {
        if let Err(e) = self.sync.refresh_wallet().await {
            warn!(error = %e, "wallet refresh after attempt failed");
        }
        let balance = self.wallet_balance.get();

        let record = TradeRecord {
            timestamp: chrono::Utc::now(),
            attempt_id: attempt_id.to_string(),
            outcome,
            cycle,
            amount_in,
            amount_out,
            profit: amount_out as i64 - amount_in as i64,
            wallet_balance: balance,
            balance_delta: balance as i64 - balance_before as i64,
            signature: signature.map(|s| s.to_string()),
            detail,
        };
        info!(
            attempt = %record.attempt_id,
            outcome = ?record.outcome,
            profit = record.profit,
            "attempt finished"
        );
        self.sink.record(record);
    }
}
