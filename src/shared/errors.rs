//! Error handling for the application

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Account payload decoding errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("account data too short: {got} bytes, expected {want}")]
    TooShort { got: usize, want: usize },

    #[error("malformed account payload")]
    Malformed,

    #[error("pool not tradable (status {0})")]
    PoolDisabled(u64),

    #[error("token account unpack failed: {0}")]
    TokenAccount(String),
}

/// Reserve synchronization errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("rpc transport error: {0}")]
    Transport(String),

    #[error("batch response shorter than request: got {got}, expected {want}")]
    ShortBatch { got: usize, want: usize },

    #[error("account not found: {0}")]
    MissingAccount(Pubkey),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Execution-related errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("transaction submit failed: {0}")]
    SubmitFailed(String),

    #[error("signature status query failed: {0}")]
    StatusQuery(String),
}

/// Classified cause of an on-chain execution failure.
///
/// The remote reports failures as free-form error text; which branch the
/// coordinator takes depends only on this classification. Keeping the
/// substring matching behind this one predicate localizes the coupling to
/// the remote's error wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The pool moved against us past the slippage bound; funds may be
    /// stranded in an intermediate asset.
    Slippage,
    /// The pool (or wallet) cannot cover the trade; retrying is pointless.
    InsufficientLiquidity,
    /// Anything else; assumed transient.
    Other,
}

/// Classify a remote execution error message
pub fn classify_execution_failure(message: &str) -> FailureKind {
    let text = message.to_ascii_lowercase();
    if text.contains("exceeds desired slippage limit")
        || text.contains("slippage tolerance exceeded")
    {
        FailureKind::Slippage
    } else if text.contains("insufficient") {
        FailureKind::InsufficientLiquidity
    } else {
        FailureKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_slippage() {
        let kind = classify_execution_failure(
            "Error processing Instruction 3: custom program error: exceeds desired slippage limit",
        );
        assert_eq!(kind, FailureKind::Slippage);
    }

    #[test]
    fn test_classify_insufficient() {
        assert_eq!(
            classify_execution_failure("Transfer: insufficient funds"),
            FailureKind::InsufficientLiquidity
        );
        assert_eq!(
            classify_execution_failure("insufficient liquidity in pool vault"),
            FailureKind::InsufficientLiquidity
        );
    }

    #[test]
    fn test_classify_generic() {
        assert_eq!(
            classify_execution_failure("BlockhashNotFound"),
            FailureKind::Other
        );
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        assert_eq!(
            classify_execution_failure("EXCEEDS DESIRED SLIPPAGE LIMIT"),
            FailureKind::Slippage
        );
    }
}
