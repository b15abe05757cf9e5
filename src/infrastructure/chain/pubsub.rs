//! Push-based reserve updates: one persistent account subscription per
//! pool, reconnecting forever and keeping the last good value meanwhile.

use futures_util::StreamExt;
use solana_account_decoder::UiAccountEncoding;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::RpcAccountInfoConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::codec;
use crate::domain::pool::{PoolId, PoolRegistry};

#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    pub ws_url: String,
    pub commitment: CommitmentConfig,
    pub resubscribe_delay: Duration,
}

/// Spawn one subscription task per tracked pool
pub fn spawn_pool_subscriptions(
    config: SubscriptionConfig,
    registry: Arc<PoolRegistry>,
) -> Vec<JoinHandle<()>> {
    registry
        .ids()
        .map(|id| {
            let config = config.clone();
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                run_pool_subscription(config, registry, id).await;
            })
        })
        .collect()
}

/// Subscribe to one pool account and apply every delivery.
///
/// Transport failures and stream closures are retried without bound; the
/// pool simply serves its last stored reserves until the feed is back.
async fn run_pool_subscription(
    config: SubscriptionConfig,
    registry: Arc<PoolRegistry>,
    id: PoolId,
) {
    let address = registry.get(id).meta.address;
    let account_config = RpcAccountInfoConfig {
        encoding: Some(UiAccountEncoding::Base64),
        data_slice: None,
        commitment: Some(config.commitment),
        min_context_slot: None,
    };

    loop {
        match PubsubClient::new(&config.ws_url).await {
            Ok(client) => {
                match client
                    .account_subscribe(&address, Some(account_config.clone()))
                    .await
                {
                    Ok((mut stream, _unsubscribe)) => {
                        debug!(pool = %registry.get(id).meta.name, "account subscription open");
                        while let Some(update) = stream.next().await {
                            apply_update(&registry, id, update.value.data.decode());
                        }
                        warn!(pool = %registry.get(id).meta.name, "subscription stream closed");
                    }
                    Err(e) => {
                        warn!(pool = %registry.get(id).meta.name, error = %e, "subscribe failed");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "pubsub connect failed");
            }
        }
        tokio::time::sleep(config.resubscribe_delay).await;
    }
}

fn apply_update(registry: &PoolRegistry, id: PoolId, payload: Option<Vec<u8>>) {
    let pool = registry.get(id);
    let Some(data) = payload else {
        warn!(pool = %pool.meta.name, "subscription delivered undecodable payload encoding");
        return;
    };
    match codec::decode_pool(&data) {
        Ok(decoded) => pool.store(decoded.reserves),
        Err(e) => {
            warn!(pool = %pool.meta.name, error = %e, "decode failed, keeping stale reserves");
        }
    }
}
