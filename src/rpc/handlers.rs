use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::engine::executor::Genesis;
use crate::engine::instruction::{Receipt, SignedInstruction};
use crate::pool::IngestResult;
use crate::state::{Escrow, RicksAuction, UserPosition};

/// Engine status returned by the `status` RPC method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub genesis: Option<Genesis>,
    pub payment_mint: String,
    pub escrows: usize,
    pub pool_size: usize,
}

/// Trait describing dependencies the RPC handlers require.
/// Implement this in the node wiring layer and pass into RpcServer.
#[async_trait]
pub trait RpcDeps: Send + Sync + 'static {
    /// Run engine genesis, returning the transaction signature.
    async fn initialize(&self) -> Result<String>;

    /// Submit a signed instruction to the ingest path.
    async fn submit_instruction(&self, signed: SignedInstruction) -> Result<IngestResult>;

    async fn get_escrow(&self, address: &str) -> Result<Option<Escrow>>;

    async fn get_position(&self, address: &str) -> Result<Option<UserPosition>>;

    async fn get_auction(&self, escrow: &str) -> Result<Option<RicksAuction>>;

    async fn get_receipt(&self, signature: &str) -> Result<Option<Receipt>>;

    async fn status(&self) -> Result<StatusSnapshot>;
}

/// A small wrapper that calls into RpcDeps to handle requests.
#[derive(Clone)]
pub struct RpcHandler {
    deps: Arc<dyn RpcDeps>,
}

impl RpcHandler {
    pub fn new(deps: Arc<dyn RpcDeps>) -> Self {
        Self { deps }
    }

    pub async fn initialize(&self) -> Result<String> {
        self.deps.initialize().await
    }

    pub async fn submit_instruction(&self, signed: SignedInstruction) -> Result<IngestResult> {
        self.deps.submit_instruction(signed).await
    }

    pub async fn get_escrow(&self, address: &str) -> Result<Option<Escrow>> {
        self.deps.get_escrow(address).await
    }

    pub async fn get_position(&self, address: &str) -> Result<Option<UserPosition>> {
        self.deps.get_position(address).await
    }

    pub async fn get_auction(&self, escrow: &str) -> Result<Option<RicksAuction>> {
        self.deps.get_auction(escrow).await
    }

    pub async fn get_receipt(&self, signature: &str) -> Result<Option<Receipt>> {
        self.deps.get_receipt(signature).await
    }

    pub async fn status(&self) -> Result<serde_json::Value> {
        let snap = self.deps.status().await?;
        Ok(serde_json::to_value(snap)?)
    }
}
