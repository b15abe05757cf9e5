//! Append-only execution log, one JSON record per terminal outcome

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::error;

use crate::domain::execution::{TradeRecord, TradeSink};

pub struct TradeLog {
    file: Mutex<File>,
}

impl TradeLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .with_context(|| format!("open trade log {}", path.as_ref().display()))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    fn append(&self, record: &TradeRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut file = self.file.lock().expect("trade log lock poisoned");
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

impl TradeSink for TradeLog {
    fn record(&self, record: TradeRecord) {
        // The log is an operator surface; losing a line must never take
        // down the execution task that produced it.
        if let Err(e) = self.append(&record) {
            error!(error = %e, "failed to append trade record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::TradeOutcome;

    fn record(outcome: TradeOutcome, profit: i64) -> TradeRecord {
        TradeRecord {
            timestamp: chrono::Utc::now(),
            attempt_id: "a-1".to_string(),
            outcome,
            cycle: "RAY:SOL-USDC>ORC:SOL-USDC".to_string(),
            amount_in: 1_000,
            amount_out: (1_000 + profit) as u64,
            profit,
            wallet_balance: 50_000,
            balance_delta: profit,
            signature: None,
            detail: None,
        }
    }

    #[test]
    fn test_appends_one_json_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.jsonl");
        let log = TradeLog::open(&path).unwrap();

        log.record(record(TradeOutcome::Success, 36));
        log.record(record(TradeOutcome::RecoveryFailed, -1_000));

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: TradeRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.outcome, TradeOutcome::Success);
        assert_eq!(first.profit, 36);
        assert!(lines[1].contains("\"recovery_failed\""));
    }

    #[test]
    fn test_reopen_appends_instead_of_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.jsonl");

        TradeLog::open(&path)
            .unwrap()
            .record(record(TradeOutcome::Success, 1));
        TradeLog::open(&path)
            .unwrap()
            .record(record(TradeOutcome::Failed, 0));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
