//! Reserve synchronizer: keeps tracked pools and the wallet balance
//! within one refresh of the remote ground truth.

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::client::ChainClient;
use super::codec;
use crate::domain::pool::{PoolId, PoolRegistry, WalletBalance};
use crate::shared::errors::SyncError;

pub struct ReserveSynchronizer<C: ChainClient> {
    chain: Arc<C>,
    registry: Arc<PoolRegistry>,
    wallet_account: Pubkey,
    wallet_balance: Arc<WalletBalance>,
}

impl<C: ChainClient> ReserveSynchronizer<C> {
    pub fn new(
        chain: Arc<C>,
        registry: Arc<PoolRegistry>,
        wallet_account: Pubkey,
        wallet_balance: Arc<WalletBalance>,
    ) -> Self {
        Self {
            chain,
            registry,
            wallet_account,
            wallet_balance,
        }
    }

    fn addresses(&self) -> Vec<Pubkey> {
        let mut addresses: Vec<Pubkey> =
            self.registry.ids().map(|id| self.registry.get(id).meta.address).collect();
        addresses.push(self.wallet_account);
        addresses
    }

    /// Startup refresh: every tracked account must be present and decode
    /// cleanly, otherwise process start fails fast.
    pub async fn initialize(&self) -> Result<(), SyncError> {
        let addresses = self.addresses();
        let payloads = self.chain.fetch_accounts(&addresses).await?;

        for (id, payload) in self.registry.ids().zip(&payloads) {
            let pool = self.registry.get(id);
            let data = payload
                .as_ref()
                .ok_or(SyncError::MissingAccount(pool.meta.address))?;
            let decoded = codec::decode_pool(data)?;
            if decoded.fee != pool.meta.fee {
                warn!(
                    pool = %pool.meta.name,
                    configured = ?pool.meta.fee,
                    on_chain = ?decoded.fee,
                    "configured fee differs from on-chain fee"
                );
            }
            pool.store(decoded.reserves);
        }

        let wallet_data = payloads
            .last()
            .and_then(|p| p.as_ref())
            .ok_or(SyncError::MissingAccount(self.wallet_account))?;
        self.wallet_balance.set(codec::decode_token_amount(wallet_data)?);

        info!(pools = self.registry.len(), "reserve state initialized");
        Ok(())
    }

    /// One best-effort batched refresh of every pool and the wallet.
    ///
    /// A transport error skips the whole refresh (the caller retries next
    /// tick); a per-account decode failure keeps that pool's stale value.
    pub async fn refresh_all(&self) -> Result<(), SyncError> {
        let addresses = self.addresses();
        let payloads = self.chain.fetch_accounts(&addresses).await?;

        for (id, payload) in self.registry.ids().zip(&payloads) {
            self.apply_pool_payload(id, payload.as_deref());
        }
        if let Some(Some(data)) = payloads.last().map(|p| p.as_ref()) {
            match codec::decode_token_amount(data) {
                Ok(amount) => self.wallet_balance.set(amount),
                Err(e) => warn!(error = %e, "wallet balance refresh skipped"),
            }
        } else {
            warn!(account = %self.wallet_account, "wallet account missing from batch");
        }
        Ok(())
    }

    /// Refresh a subset of pools, used before sizing a recovery path
    pub async fn refresh_pools(&self, ids: &[PoolId]) -> Result<(), SyncError> {
        if ids.is_empty() {
            return Ok(());
        }
        let addresses: Vec<Pubkey> = ids
            .iter()
            .map(|id| self.registry.get(*id).meta.address)
            .collect();
        let payloads = self.chain.fetch_accounts(&addresses).await?;
        for (id, payload) in ids.iter().zip(&payloads) {
            self.apply_pool_payload(*id, payload.as_deref());
        }
        Ok(())
    }

    pub async fn refresh_wallet(&self) -> Result<(), SyncError> {
        let payloads = self.chain.fetch_accounts(&[self.wallet_account]).await?;
        let data = payloads
            .first()
            .and_then(|p| p.as_ref())
            .ok_or(SyncError::MissingAccount(self.wallet_account))?;
        self.wallet_balance.set(codec::decode_token_amount(data)?);
        Ok(())
    }

    fn apply_pool_payload(&self, id: PoolId, payload: Option<&[u8]>) {
        let pool = self.registry.get(id);
        let Some(data) = payload else {
            warn!(pool = %pool.meta.name, "account missing, keeping stale reserves");
            return;
        };
        match codec::decode_pool(data) {
            Ok(decoded) => pool.store(decoded.reserves),
            Err(e) => {
                warn!(pool = %pool.meta.name, error = %e, "decode failed, keeping stale reserves");
            }
        }
    }

    /// Owns the refresh cadence in poll mode; never returns.
    pub async fn run_poll_loop(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.refresh_all().await {
                warn!(error = %e, "refresh skipped this tick");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::math::FeeRate;
    use crate::domain::pool::{PoolMeta, PoolProgram};
    use crate::infrastructure::chain::client::SignatureStatus;
    use crate::infrastructure::chain::codec::AmmStateLayout;
    use crate::shared::errors::ExecutionError;
    use crate::shared::types::TokenInfo;
    use async_trait::async_trait;
    use solana_sdk::instruction::Instruction;
    use solana_sdk::signature::Signature;
    use spl_token::solana_program::program_option::COption;
    use spl_token::solana_program::program_pack::Pack;
    use spl_token::solana_program::pubkey::Pubkey as SplPubkey;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MockChain {
        payloads: Mutex<HashMap<Pubkey, Option<Vec<u8>>>>,
        fail_transport: Mutex<bool>,
    }

    impl MockChain {
        fn new() -> Self {
            Self {
                payloads: Mutex::new(HashMap::new()),
                fail_transport: Mutex::new(false),
            }
        }

        fn put(&self, address: Pubkey, payload: Option<Vec<u8>>) {
            self.payloads.lock().unwrap().insert(address, payload);
        }
    }

    #[async_trait]
    impl ChainClient for MockChain {
        fn payer(&self) -> Pubkey {
            Pubkey::new_unique()
        }

        async fn fetch_accounts(
            &self,
            addresses: &[Pubkey],
        ) -> Result<Vec<Option<Vec<u8>>>, SyncError> {
            if *self.fail_transport.lock().unwrap() {
                return Err(SyncError::Transport("connection refused".to_string()));
            }
            let payloads = self.payloads.lock().unwrap();
            Ok(addresses
                .iter()
                .map(|a| payloads.get(a).cloned().flatten())
                .collect())
        }

        async fn submit_transaction(
            &self,
            _instructions: &[Instruction],
        ) -> Result<Signature, ExecutionError> {
            unimplemented!("not exercised by sync tests")
        }

        async fn signature_status(
            &self,
            _signature: &Signature,
        ) -> Result<SignatureStatus, ExecutionError> {
            unimplemented!("not exercised by sync tests")
        }
    }

    fn pool_meta(name: &str) -> PoolMeta {
        PoolMeta {
            name: name.to_string(),
            address: Pubkey::new_unique(),
            program: PoolProgram::AmmV4,
            program_id: Pubkey::new_unique(),
            authority: Pubkey::new_unique(),
            base: TokenInfo::new(Pubkey::new_unique(), "SOL", 9),
            quote: TokenInfo::new(Pubkey::new_unique(), "USDC", 6),
            base_vault: Pubkey::new_unique(),
            quote_vault: Pubkey::new_unique(),
            fee: FeeRate::new(25, 10_000),
            risk_ratio: None,
        }
    }

    fn pool_payload(base_reserve: u64, quote_reserve: u64) -> Vec<u8> {
        let layout = AmmStateLayout {
            status: 6,
            base_decimals: 9,
            quote_decimals: 6,
            swap_fee_numerator: 25,
            swap_fee_denominator: 10_000,
            base_need_take_pnl: 0,
            quote_need_take_pnl: 0,
            base_open_orders: 0,
            quote_open_orders: 0,
            base_reserve,
            quote_reserve,
            base_vault: [0; 32],
            quote_vault: [0; 32],
            base_mint: [0; 32],
            quote_mint: [0; 32],
        };
        bytemuck::bytes_of(&layout).to_vec()
    }

    fn wallet_payload(amount: u64) -> Vec<u8> {
        let account = spl_token::state::Account {
            mint: SplPubkey::new_unique(),
            owner: SplPubkey::new_unique(),
            amount,
            delegate: COption::None,
            state: spl_token::state::AccountState::Initialized,
            is_native: COption::None,
            delegated_amount: 0,
            close_authority: COption::None,
        };
        let mut data = vec![0u8; spl_token::state::Account::LEN];
        spl_token::state::Account::pack(account, &mut data).unwrap();
        data
    }

    struct Setup {
        chain: Arc<MockChain>,
        registry: Arc<PoolRegistry>,
        wallet_account: Pubkey,
        balance: Arc<WalletBalance>,
        sync: ReserveSynchronizer<MockChain>,
    }

    fn setup() -> Setup {
        let chain = Arc::new(MockChain::new());
        let registry = Arc::new(PoolRegistry::from_metas(vec![
            pool_meta("RAY:SOL-USDC"),
            pool_meta("ORC:SOL-USDC"),
        ]));
        let wallet_account = Pubkey::new_unique();
        let balance = Arc::new(WalletBalance::new());
        let sync = ReserveSynchronizer::new(
            Arc::clone(&chain),
            Arc::clone(&registry),
            wallet_account,
            Arc::clone(&balance),
        );
        Setup {
            chain,
            registry,
            wallet_account,
            balance,
            sync,
        }
    }

    #[tokio::test]
    async fn test_initialize_fails_fast_on_missing_account() {
        let s = setup();
        s.chain
            .put(s.registry.get(PoolId(0)).meta.address, Some(pool_payload(1, 2)));
        // second pool missing entirely
        s.chain.put(s.wallet_account, Some(wallet_payload(10)));

        assert!(matches!(
            s.sync.initialize().await,
            Err(SyncError::MissingAccount(_))
        ));
    }

    #[tokio::test]
    async fn test_initialize_fails_fast_on_decode_error() {
        let s = setup();
        s.chain
            .put(s.registry.get(PoolId(0)).meta.address, Some(pool_payload(1, 2)));
        s.chain
            .put(s.registry.get(PoolId(1)).meta.address, Some(vec![0u8; 8]));
        s.chain.put(s.wallet_account, Some(wallet_payload(10)));

        assert!(matches!(s.sync.initialize().await, Err(SyncError::Codec(_))));
    }

    #[tokio::test]
    async fn test_initialize_applies_reserves_and_balance() {
        let s = setup();
        s.chain.put(
            s.registry.get(PoolId(0)).meta.address,
            Some(pool_payload(100, 200)),
        );
        s.chain.put(
            s.registry.get(PoolId(1)).meta.address,
            Some(pool_payload(300, 400)),
        );
        s.chain.put(s.wallet_account, Some(wallet_payload(5_000)));

        s.sync.initialize().await.unwrap();
        assert_eq!(s.registry.get(PoolId(0)).view().base, 100);
        assert_eq!(s.registry.get(PoolId(1)).view().quote, 400);
        assert_eq!(s.balance.get(), 5_000);
    }

    #[tokio::test]
    async fn test_refresh_keeps_stale_value_on_decode_error() {
        let s = setup();
        s.chain.put(
            s.registry.get(PoolId(0)).meta.address,
            Some(pool_payload(100, 200)),
        );
        s.chain.put(
            s.registry.get(PoolId(1)).meta.address,
            Some(pool_payload(300, 400)),
        );
        s.chain.put(s.wallet_account, Some(wallet_payload(5_000)));
        s.sync.refresh_all().await.unwrap();

        // next tick delivers garbage for pool 1
        s.chain
            .put(s.registry.get(PoolId(1)).meta.address, Some(vec![0xFF; 16]));
        s.chain.put(
            s.registry.get(PoolId(0)).meta.address,
            Some(pool_payload(111, 222)),
        );
        s.sync.refresh_all().await.unwrap();

        assert_eq!(s.registry.get(PoolId(0)).view().base, 111);
        // stale but coherent
        assert_eq!(s.registry.get(PoolId(1)).view().base, 300);
        assert_eq!(s.registry.get(PoolId(1)).view().quote, 400);
    }

    #[tokio::test]
    async fn test_refresh_skips_whole_batch_on_transport_error() {
        let s = setup();
        s.chain.put(
            s.registry.get(PoolId(0)).meta.address,
            Some(pool_payload(100, 200)),
        );
        s.chain.put(
            s.registry.get(PoolId(1)).meta.address,
            Some(pool_payload(300, 400)),
        );
        s.chain.put(s.wallet_account, Some(wallet_payload(5_000)));
        s.sync.refresh_all().await.unwrap();

        *s.chain.fail_transport.lock().unwrap() = true;
        assert!(s.sync.refresh_all().await.is_err());
        // nothing was partially applied
        assert_eq!(s.registry.get(PoolId(0)).view().base, 100);
        assert_eq!(s.balance.get(), 5_000);
    }

    #[tokio::test]
    async fn test_refresh_subset_only_touches_requested_pools() {
        let s = setup();
        s.chain.put(
            s.registry.get(PoolId(0)).meta.address,
            Some(pool_payload(100, 200)),
        );
        s.chain.put(
            s.registry.get(PoolId(1)).meta.address,
            Some(pool_payload(300, 400)),
        );
        s.chain.put(s.wallet_account, Some(wallet_payload(5_000)));
        s.sync.refresh_all().await.unwrap();

        s.chain.put(
            s.registry.get(PoolId(0)).meta.address,
            Some(pool_payload(150, 250)),
        );
        s.chain.put(
            s.registry.get(PoolId(1)).meta.address,
            Some(pool_payload(350, 450)),
        );
        s.sync.refresh_pools(&[PoolId(1)]).await.unwrap();

        assert_eq!(s.registry.get(PoolId(0)).view().base, 100);
        assert_eq!(s.registry.get(PoolId(1)).view().base, 350);
    }

    #[tokio::test]
    async fn test_refresh_wallet_updates_balance() {
        let s = setup();
        s.chain.put(s.wallet_account, Some(wallet_payload(42)));
        s.sync.refresh_wallet().await.unwrap();
        assert_eq!(s.balance.get(), 42);

        s.chain.put(s.wallet_account, Some(wallet_payload(43)));
        s.sync.refresh_wallet().await.unwrap();
        assert_eq!(s.balance.get(), 43);
    }
}
