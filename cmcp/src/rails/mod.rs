//! Payment rail implementations.
//!
//! Two rails are provided: [`evm::EvmRail`] for EVM stablecoin payments
//! and [`canton::CantonRail`] for Canton Coin. Both delegate verification
//! and settlement to a remote facilitator over HTTP through a shared
//! internal client.

pub mod canton;
mod client;
pub mod evm;

pub use canton::CantonRail;
pub use evm::EvmRail;
