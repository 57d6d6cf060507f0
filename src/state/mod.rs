pub mod auction;
pub mod escrow;
pub mod locks;
pub mod position;
pub mod store;

pub use auction::{Bid, RicksAuction};
pub use escrow::{Escrow, MAX_DELAY_SEC, REWARD_PRECISION};
pub use locks::{EscrowLocks, LockGuard};
pub use position::UserPosition;
pub use store::{EscrowStore, InMemEscrowStore};

#[cfg(feature = "rocksdb")]
pub use store::RocksEscrowStore;
