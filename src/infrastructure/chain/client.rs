//! RPC client seam: the `ChainClient` trait and its Solana implementation

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use std::time::Duration;

use crate::shared::errors::{ExecutionError, SyncError};

/// Confirmation state of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Not yet known to the cluster at the configured commitment
    Unknown,
    Confirmed,
    Failed(String),
}

/// Everything the engine needs from the chain, behind one seam so the
/// coordinator and synchronizer can be driven against a mock.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn payer(&self) -> Pubkey;

    /// Batched account read; the response preserves request order and
    /// holds `None` for missing accounts.
    async fn fetch_accounts(&self, addresses: &[Pubkey])
        -> Result<Vec<Option<Vec<u8>>>, SyncError>;

    /// Sign and broadcast with preflight skipped; returns the signature
    /// synchronously, the execution result arrives via `signature_status`.
    async fn submit_transaction(
        &self,
        instructions: &[Instruction],
    ) -> Result<Signature, ExecutionError>;

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<SignatureStatus, ExecutionError>;
}

pub struct SolanaChainClient {
    rpc: RpcClient,
    wallet: Keypair,
    commitment: CommitmentConfig,
}

impl SolanaChainClient {
    pub fn new(
        url: String,
        timeout: Duration,
        commitment: CommitmentConfig,
        wallet: Keypair,
    ) -> Self {
        Self {
            rpc: RpcClient::new_with_timeout_and_commitment(url, timeout, commitment),
            wallet,
            commitment,
        }
    }
}

#[async_trait]
impl ChainClient for SolanaChainClient {
    fn payer(&self) -> Pubkey {
        self.wallet.pubkey()
    }

    async fn fetch_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<Vec<u8>>>, SyncError> {
        let response = self
            .rpc
            .get_multiple_accounts_with_commitment(addresses, self.commitment)
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        let accounts = response.value;
        if accounts.len() != addresses.len() {
            return Err(SyncError::ShortBatch {
                got: accounts.len(),
                want: addresses.len(),
            });
        }
        Ok(accounts
            .into_iter()
            .map(|account| account.map(|a| a.data))
            .collect())
    }

    async fn submit_transaction(
        &self,
        instructions: &[Instruction],
    ) -> Result<Signature, ExecutionError> {
        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| ExecutionError::SubmitFailed(e.to_string()))?;

        let message = Message::new(instructions, Some(&self.wallet.pubkey()));
        let transaction = Transaction::new(&[&self.wallet], message, blockhash);

        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            preflight_commitment: Some(self.commitment.commitment),
            ..RpcSendTransactionConfig::default()
        };
        self.rpc
            .send_transaction_with_config(&transaction, config)
            .await
            .map_err(|e| ExecutionError::SubmitFailed(e.to_string()))
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<SignatureStatus, ExecutionError> {
        let response = self
            .rpc
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| ExecutionError::StatusQuery(e.to_string()))?;

        let status = match response.value.into_iter().next().flatten() {
            Some(status) => status,
            None => return Ok(SignatureStatus::Unknown),
        };
        if let Some(err) = status.err {
            return Ok(SignatureStatus::Failed(err.to_string()));
        }
        if status.satisfies_commitment(self.commitment) {
            Ok(SignatureStatus::Confirmed)
        } else {
            Ok(SignatureStatus::Unknown)
        }
    }
}
