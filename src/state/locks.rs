//! Sharded async escrow locking for parallel instruction execution.
//!
//! One `tokio::sync::Mutex` per escrow address, sharded to bound map
//! contention. Locks are acquired in sorted key order so concurrent
//! acquirers cannot deadlock; `OwnedMutexGuard`s are held across await
//! points and released when the returned [LockGuard] drops.

use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::Arc;
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};
use twox_hash::XxHash64;

use crate::token::Address;

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 64;

/// Holds the acquired guards; dropping it releases every lock.
pub struct LockGuard {
    guards: Vec<OwnedMutexGuard<()>>,
}

impl LockGuard {
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

/// Per-escrow lock table. The same `Arc<Mutex<()>>` is handed to every
/// task requesting a given address.
#[derive(Clone)]
pub struct EscrowLocks {
    shards: Arc<Vec<TokioMutex<HashMap<Address, Arc<TokioMutex<()>>>>>>,
    shard_count: usize,
}

impl EscrowLocks {
    pub fn new(shard_count: usize) -> Self {
        let mut shards = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            shards.push(TokioMutex::new(HashMap::new()));
        }
        Self { shards: Arc::new(shards), shard_count }
    }

    fn shard_for(&self, key: &Address) -> usize {
        let mut hasher = XxHash64::default();
        hasher.write(key.as_bytes());
        (hasher.finish() as usize) % self.shard_count
    }

    /// Acquire locks for a set of escrow addresses. Keys are sorted and
    /// deduplicated before acquisition.
    pub async fn acquire(&self, mut keys: Vec<Address>) -> LockGuard {
        keys.sort();
        keys.dedup();

        let mut guards: Vec<OwnedMutexGuard<()>> = Vec::with_capacity(keys.len());
        for key in keys {
            let sid = self.shard_for(&key);
            // scope the shard-map borrow so it is not held across the await
            let key_mutex = {
                let mut shard_map = self.shards[sid].lock().await;
                shard_map
                    .entry(key)
                    .or_insert_with(|| Arc::new(TokioMutex::new(())))
                    .clone()
            };
            guards.push(key_mutex.lock_owned().await);
        }
        LockGuard { guards }
    }

    /// Drop entries no task holds, returning how many were removed. An
    /// entry whose Arc is only referenced by the map cannot be mid-acquire
    /// because clones are taken under the shard lock held here.
    pub async fn gc(&self) -> usize {
        let mut dropped = 0;
        for shard in self.shards.iter() {
            let mut map = shard.lock().await;
            let before = map.len();
            map.retain(|_, m| Arc::strong_count(m) > 1);
            dropped += before - map.len();
        }
        dropped
    }
}

impl Default for EscrowLocks {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}
