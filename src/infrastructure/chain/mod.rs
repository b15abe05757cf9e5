//! Chain access: RPC client seam, account codec, reserve synchronizer,
//! subscriptions and instruction builders

pub mod client;
pub mod codec;
pub mod instructions;
pub mod pubsub;
pub mod sync;

pub use client::{ChainClient, SignatureStatus, SolanaChainClient};
pub use sync::ReserveSynchronizer;
