//! Arbloop - Solana AMM cycle arbitrage bot

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

// Re-export main types for convenience
pub use domain::cycle::{build_cycles, Cycle};
pub use domain::execution::SagaCoordinator;
pub use domain::pool::PoolRegistry;
pub use domain::scanner::{scan, Opportunity};
pub use infrastructure::chain::sync::ReserveSynchronizer;
