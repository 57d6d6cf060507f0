//! PendingPool: in-memory queue of validated instructions awaiting
//! execution, with dedup, TTL expiry, and a seen-cache so executed ids
//! cannot be resubmitted.
//!
//! Data model:
//! - keyed by transaction signature (hex SHA-256 of the envelope)
//! - DashMap for lookup + a FIFO queue for drain order
//! - LRU of recently drained ids backs the replay check

use dashmap::DashMap;
use lru::LruCache;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::engine::instruction::SignedInstruction;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("duplicate instruction")]
    Duplicate,
    #[error("pool full")]
    PoolFull,
}

struct PendingEntry {
    signed: SignedInstruction,
    inserted_at: Instant,
}

/// FIFO pool of pending instructions.
pub struct PendingPool {
    entries: DashMap<String, Arc<PendingEntry>>,
    order: Mutex<VecDeque<String>>,
    seen: Mutex<LruCache<String, ()>>,
    pub max_size: usize,
    pub ttl: Duration,
}

impl PendingPool {
    pub fn new(max_size: usize, ttl: Duration, seen_capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            seen: Mutex::new(LruCache::new(seen_capacity)),
            max_size,
            ttl,
        }
    }

    /// Insert a validated instruction. Returns its transaction signature.
    pub async fn insert(&self, signed: SignedInstruction) -> Result<String, PoolError> {
        let id = signed.id();
        if self.entries.contains_key(&id) {
            return Err(PoolError::Duplicate);
        }
        {
            let seen = self.seen.lock().await;
            if seen.contains(&id) {
                return Err(PoolError::Duplicate);
            }
        }
        if self.entries.len() >= self.max_size {
            return Err(PoolError::PoolFull);
        }

        self.entries
            .insert(id.clone(), Arc::new(PendingEntry { signed, inserted_at: Instant::now() }));
        self.order.lock().await.push_back(id.clone());
        Ok(id)
    }

    /// Drain up to `limit` instructions in arrival order. Drained ids move
    /// to the seen-cache.
    pub async fn pop_batch(&self, limit: usize) -> Vec<SignedInstruction> {
        let mut batch = Vec::new();
        let mut order = self.order.lock().await;
        let mut seen = self.seen.lock().await;
        while batch.len() < limit {
            let id = match order.pop_front() {
                Some(id) => id,
                None => break,
            };
            // ids whose entries were GC'd are skipped
            if let Some((_, entry)) = self.entries.remove(&id) {
                batch.push(entry.signed.clone());
                seen.put(id, ());
            }
        }
        batch
    }

    pub fn get(&self, id: &str) -> Option<SignedInstruction> {
        self.entries.get(id).map(|e| e.signed.clone())
    }

    /// Drop entries older than the TTL.
    pub fn gc_ttl(&self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| now.duration_since(e.value().inserted_at) > self.ttl)
            .map(|e| e.key().clone())
            .collect();
        for id in expired {
            self.entries.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
