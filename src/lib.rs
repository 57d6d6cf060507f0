//! ricks-engine: an execution engine for RICKS escrows.
//!
//! An nft is staked into an escrow and fractionalized into ricks shares.
//! Each elapsed period, newly issued shares go to auction; proceeds are
//! distributed pro rata to existing holders. A resolver may buy out the
//! nft, finalizing the escrow. Signed instructions arrive over JSON-RPC,
//! queue in a pending pool, and execute under per-escrow locks.

pub mod crypto;
pub mod engine;
pub mod node;
pub mod pool;
pub mod rpc;
pub mod state;
pub mod token;
pub mod utils;

#[cfg(test)]
mod tests;
