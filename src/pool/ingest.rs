//! Ingest: accepts signed instructions from the RPC surface, validates
//! them, and inserts into the pending pool.
//!
//! Validation is pluggable via the `InstructionValidator` trait. The
//! stock `SignatureValidator` checks the Ed25519 envelope signature and
//! enforces strictly increasing nonces per payer.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::engine::instruction::SignedInstruction;
use crate::pool::pool::{PendingPool, PoolError};
use crate::token::Address;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),
}

/// Ingest result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestResult {
    Accepted(String),
    Rejected(String),
}

/// Trait for pluggable validation
#[async_trait::async_trait]
pub trait InstructionValidator: Send + Sync + 'static {
    /// Check the envelope and atomically reserve whatever replay state it
    /// consumes, so two concurrent envelopes cannot both pass on the same
    /// nonce.
    async fn validate(&self, signed: &SignedInstruction) -> Result<(), String>;

    /// Undo a reservation after the pool refused the instruction.
    async fn rollback(&self, _signed: &SignedInstruction) {}
}

/// Checks the envelope signature and replay-protects via per-payer nonces.
#[derive(Default)]
pub struct SignatureValidator {
    last_nonce: DashMap<Address, u64>,
}

impl SignatureValidator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl InstructionValidator for SignatureValidator {
    async fn validate(&self, signed: &SignedInstruction) -> Result<(), String> {
        signed.verify().map_err(|e| e.to_string())?;
        // reserve the nonce under the entry lock; a concurrent envelope
        // with the same nonce sees the reservation and is rejected
        match self.last_nonce.entry(signed.payer.clone()) {
            Entry::Occupied(mut slot) => {
                if signed.nonce <= *slot.get() {
                    return Err(format!("nonce {} already used", signed.nonce));
                }
                slot.insert(signed.nonce);
            }
            Entry::Vacant(slot) => {
                slot.insert(signed.nonce);
            }
        }
        Ok(())
    }

    async fn rollback(&self, signed: &SignedInstruction) {
        // payers submit sequential nonces, so stepping the slot back by
        // one restores the pre-reservation state and lets the same nonce
        // be retried
        if let Some(mut slot) = self.last_nonce.get_mut(&signed.payer) {
            if *slot == signed.nonce {
                *slot = signed.nonce.saturating_sub(1);
            }
        }
    }
}

/// Validates and inserts into the pool.
pub struct Ingestor<V: InstructionValidator> {
    pub pool: Arc<PendingPool>,
    pub validator: Arc<V>,
}

impl<V: InstructionValidator> Ingestor<V> {
    pub fn new(pool: Arc<PendingPool>, validator: Arc<V>) -> Self {
        Self { pool, validator }
    }

    pub async fn ingest(&self, signed: SignedInstruction) -> Result<IngestResult, IngestError> {
        if let Err(reason) = self.validator.validate(&signed).await {
            return Ok(IngestResult::Rejected(reason));
        }
        match self.pool.insert(signed.clone()).await {
            Ok(id) => Ok(IngestResult::Accepted(id)),
            Err(e) => {
                self.validator.rollback(&signed).await;
                Err(IngestError::from(e))
            }
        }
    }
}
