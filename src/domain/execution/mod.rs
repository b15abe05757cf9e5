//! Execution domain - saga coordination of multi-leg trades

mod coordinator;

pub use coordinator::{ExecutionParams, SagaCoordinator};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal outcome of one cycle attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeOutcome {
    /// Full cycle confirmed
    Success,
    /// Attempt ended without stranding funds outside the reference asset
    Failed,
    /// Status never resolved within the poll budget; nothing assumed
    TimedOut,
    /// A later leg failed but the stranded balance was converted back
    Recovered,
    /// Stranded funds could not be recovered automatically
    RecoveryFailed,
}

/// One line of the append-only execution log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub attempt_id: String,
    pub outcome: TradeOutcome,
    pub cycle: String,
    pub amount_in: u64,
    pub amount_out: u64,
    pub profit: i64,
    pub wallet_balance: u64,
    pub balance_delta: i64,
    pub signature: Option<String>,
    pub detail: Option<String>,
}

/// Destination of terminal trade records
pub trait TradeSink: Send + Sync {
    fn record(&self, record: TradeRecord);
}
