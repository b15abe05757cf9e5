//! Process configuration loaded from Config.toml with CLI overrides

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

#[derive(Debug, Clone, Deserialize)]
pub struct RpcCfg {
    pub url: String,
    pub ws_url: String,
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletCfg {
    pub keypair: String,
    /// Token account holding the reference asset; caps the trade size and
    /// is refreshed alongside the pools.
    pub reference_account: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeCfg {
    pub reference_token: String,
    pub tokens_of_interest: Vec<String>,
    /// Minimum net profit in reference-token native units
    pub min_profit: u64,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    #[serde(default = "default_priority_fee")]
    pub priority_fee_microlamports: u64,
    #[serde(default = "default_compute_unit_limit")]
    pub compute_unit_limit: u32,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskCfg {
    /// Maximum allowed input/profit ratio before the trade size is halved
    #[serde(default = "default_max_capital_ratio")]
    pub max_capital_ratio: f64,
}

impl Default for RiskCfg {
    fn default() -> Self {
        Self {
            max_capital_ratio: default_max_capital_ratio(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncCfg {
    /// "poll" for batched refresh, "subscribe" for per-account push feeds
    #[serde(default = "default_sync_mode")]
    pub mode: String,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default = "default_resubscribe_delay_ms")]
    pub resubscribe_delay_ms: u64,
}

impl Default for SyncCfg {
    fn default() -> Self {
        Self {
            mode: default_sync_mode(),
            refresh_interval_ms: default_refresh_interval_ms(),
            resubscribe_delay_ms: default_resubscribe_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionCfg {
    #[serde(default = "default_confirm_poll_interval_ms")]
    pub confirm_poll_interval_ms: u64,
    #[serde(default = "default_confirm_poll_attempts")]
    pub confirm_poll_attempts: u32,
    #[serde(default = "default_max_leg_retries")]
    pub max_leg_retries: u32,
    #[serde(default = "default_max_recovery_attempts")]
    pub max_recovery_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for ExecutionCfg {
    fn default() -> Self {
        Self {
            confirm_poll_interval_ms: default_confirm_poll_interval_ms(),
            confirm_poll_attempts: default_confirm_poll_attempts(),
            max_leg_retries: default_max_leg_retries(),
            max_recovery_attempts: default_max_recovery_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportCfg {
    #[serde(default = "default_report_path")]
    pub path: String,
}

impl Default for ReportCfg {
    fn default() -> Self {
        Self {
            path: default_report_path(),
        }
    }
}

/// One statically known pool
#[derive(Debug, Clone, Deserialize)]
pub struct PoolCfg {
    pub name: String,
    pub address: String,
    /// Instruction format of the owning program: "amm_v4" or "token_swap"
    pub program: String,
    pub program_id: String,
    pub authority: String,
    pub base_symbol: String,
    pub base_mint: String,
    #[serde(default = "default_decimals")]
    pub base_decimals: u8,
    pub quote_symbol: String,
    pub quote_mint: String,
    #[serde(default = "default_decimals")]
    pub quote_decimals: u8,
    pub base_vault: String,
    pub quote_vault: String,
    pub fee_numerator: u64,
    pub fee_denominator: u64,
    /// Per-pool capital-at-risk override; 0 disables the clamp for cycles
    /// touching this pool.
    #[serde(default)]
    pub risk_ratio: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc: RpcCfg,
    pub wallet: WalletCfg,
    pub trade: TradeCfg,
    #[serde(default)]
    pub risk: RiskCfg,
    #[serde(default)]
    pub sync: SyncCfg,
    #[serde(default)]
    pub execution: ExecutionCfg,
    #[serde(default)]
    pub report: ReportCfg,
    pub pools: Vec<PoolCfg>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref())
            .with_context(|| format!("read {}", path.as_ref().display()))?;
        let cfg: Self = toml::from_str(&s).context("parse Config.toml")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pools.is_empty() {
            bail!("no pools configured");
        }
        if self.trade.reference_token_missing() {
            bail!(
                "reference token {} is not traded by any configured pool",
                self.trade.reference_token
            );
        }
        for pool in &self.pools {
            if pool.fee_denominator == 0 {
                bail!("pool {} has a zero fee denominator", pool.name);
            }
            if pool.fee_numerator >= pool.fee_denominator {
                bail!("pool {} fee would consume the whole input", pool.name);
            }
            if pool.program != "amm_v4" && pool.program != "token_swap" {
                bail!("pool {}: unknown program kind {}", pool.name, pool.program);
            }
            if pool.base_symbol == pool.quote_symbol {
                bail!("pool {} trades a token against itself", pool.name);
            }
        }
        if self.sync.mode != "poll" && self.sync.mode != "subscribe" {
            bail!("sync.mode must be \"poll\" or \"subscribe\"");
        }
        Ok(())
    }
}

impl TradeCfg {
    fn reference_token_missing(&self) -> bool {
        !self.tokens_of_interest.contains(&self.reference_token)
    }
}

fn default_rpc_timeout_ms() -> u64 {
    30_000
}
fn default_commitment() -> String {
    "confirmed".to_string()
}
fn default_cooldown_ms() -> u64 {
    10_000
}
fn default_scan_interval_ms() -> u64 {
    400
}
fn default_slippage_bps() -> u32 {
    100
}
fn default_priority_fee() -> u64 {
    1_000
}
fn default_compute_unit_limit() -> u32 {
    400_000
}
fn default_max_capital_ratio() -> f64 {
    50.0
}
fn default_sync_mode() -> String {
    "poll".to_string()
}
fn default_refresh_interval_ms() -> u64 {
    800
}
fn default_resubscribe_delay_ms() -> u64 {
    2_000
}
fn default_confirm_poll_interval_ms() -> u64 {
    1_000
}
fn default_confirm_poll_attempts() -> u32 {
    30
}
fn default_max_leg_retries() -> u32 {
    8
}
fn default_max_recovery_attempts() -> u32 {
    20
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_report_path() -> String {
    "trades.jsonl".to_string()
}
fn default_decimals() -> u8 {
    6
}
