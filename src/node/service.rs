//! Service orchestration: wire up ledger, store, executor, pool, and rpc.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::crypto::Keypair;
use crate::engine::clock::SystemClock;
use crate::engine::executor::Executor;
use crate::engine::instruction::{Instruction, Receipt, SignedInstruction};
use crate::node::config::NodeConfig;
use crate::node::service_handle::ServiceHandle;
use crate::pool::{IngestResult, Ingestor, PendingPool, SignatureValidator};
use crate::rpc::auth::AuthConfig;
use crate::rpc::handlers::{RpcDeps, RpcHandler, StatusSnapshot};
use crate::rpc::server::RpcServer;
use crate::state::{Escrow, EscrowLocks, EscrowStore, RicksAuction, UserPosition};
use crate::token::{derive_address, Address, TokenLedger};
use crate::utils::metrics::METRICS;

/// The engine's payment denomination mint address.
pub fn payment_mint_address() -> Address {
    derive_address(&[b"mint", b"payment"])
}

/// Load the node keypair from `data_dir/node_key`, generating one on
/// first use.
pub fn load_or_create_keypair<P: AsRef<Path>>(data_dir: P) -> Result<Keypair> {
    let path = data_dir.as_ref().join("node_key");
    if path.exists() {
        let text = std::fs::read_to_string(&path)?;
        let secret = hex::decode(text.trim())?;
        Keypair::from_bytes(&secret)
    } else {
        let kp = Keypair::generate();
        std::fs::write(&path, hex::encode(kp.secret_bytes()))?;
        Ok(kp)
    }
}

#[cfg(feature = "rocksdb")]
fn open_store(data_dir: &str) -> Result<Arc<dyn EscrowStore>> {
    Ok(Arc::new(crate::state::RocksEscrowStore::open(data_dir)?))
}

#[cfg(not(feature = "rocksdb"))]
fn open_store(_data_dir: &str) -> Result<Arc<dyn EscrowStore>> {
    Ok(Arc::new(crate::state::InMemEscrowStore::new()))
}

struct NodeRpcDeps {
    executor: Arc<Executor>,
    store: Arc<dyn EscrowStore>,
    pool: Arc<PendingPool>,
    ingestor: Ingestor<SignatureValidator>,
    node_key: Arc<Keypair>,
    node_nonce: AtomicU64,
}

#[async_trait]
impl RpcDeps for NodeRpcDeps {
    async fn initialize(&self) -> Result<String> {
        let nonce = self.node_nonce.fetch_add(1, Ordering::SeqCst);
        let signed = SignedInstruction::sign(&self.node_key, nonce, Instruction::Initialize);
        match self.ingestor.ingest(signed).await? {
            IngestResult::Accepted(signature) => Ok(signature),
            IngestResult::Rejected(reason) => Err(anyhow!("initialize rejected: {reason}")),
        }
    }

    async fn submit_instruction(&self, signed: SignedInstruction) -> Result<IngestResult> {
        Ok(self.ingestor.ingest(signed).await?)
    }

    async fn get_escrow(&self, address: &str) -> Result<Option<Escrow>> {
        self.store.get_escrow(&address.to_string())
    }

    async fn get_position(&self, address: &str) -> Result<Option<UserPosition>> {
        self.store.get_position(&address.to_string())
    }

    async fn get_auction(&self, escrow: &str) -> Result<Option<RicksAuction>> {
        self.store.get_auction(&escrow.to_string())
    }

    async fn get_receipt(&self, signature: &str) -> Result<Option<Receipt>> {
        Ok(self.executor.receipt(signature))
    }

    async fn status(&self) -> Result<StatusSnapshot> {
        Ok(StatusSnapshot {
            genesis: self.executor.genesis(),
            payment_mint: self.executor.payment_mint().clone(),
            escrows: self.store.list_escrows()?.len(),
            pool_size: self.pool.len(),
        })
    }
}

/// Main service object
pub struct EngineService {
    cfg: NodeConfig,
}

impl EngineService {
    pub fn new(cfg: NodeConfig) -> Self {
        Self { cfg }
    }

    /// Start the engine: spawn subsystems and return a ServiceHandle for
    /// graceful shutdown.
    pub async fn start(self) -> Result<ServiceHandle> {
        let (mut svc_handle, shutdown_rx) = ServiceHandle::new();

        std::fs::create_dir_all(&self.cfg.data_dir)?;
        let node_key = Arc::new(load_or_create_keypair(&self.cfg.data_dir)?);
        info!("node address: {}", node_key.address());

        // -----------------------
        // Escrow store + token ledger
        // -----------------------
        let store = open_store(&self.cfg.data_dir)?;
        let payment_mint = payment_mint_address();
        // restore ledger balances checkpointed alongside the escrow state;
        // a fresh store gets a new ledger with just the payment mint
        let ledger = match store.get_ledger()? {
            Some(snapshot) => {
                info!("restored token ledger from store");
                TokenLedger::from_snapshot(snapshot)
            }
            None => {
                let ledger = TokenLedger::new();
                ledger.create_mint(payment_mint.clone(), node_key.address(), 6)?;
                ledger
            }
        };

        // -----------------------
        // Locks + executor
        // -----------------------
        let locks = EscrowLocks::default();
        let executor = Arc::new(Executor::new(
            ledger.clone(),
            store.clone(),
            locks,
            Arc::new(SystemClock),
            payment_mint,
        ));

        // -----------------------
        // Pending pool + ingest
        // -----------------------
        let pool = Arc::new(PendingPool::new(
            self.cfg.max_pool_size,
            std::time::Duration::from_secs(self.cfg.pool_ttl_secs),
            10_000,
        ));
        let ingestor = Ingestor::new(pool.clone(), Arc::new(SignatureValidator::new()));

        // -----------------------
        // Drain loop
        // -----------------------
        {
            let executor = executor.clone();
            let pool = pool.clone();
            let store = store.clone();
            let ledger = ledger.clone();
            let batch_size = self.cfg.batch_size;
            let tick = std::time::Duration::from_millis(self.cfg.tick_ms);
            let shutdown_rx = shutdown_rx.clone();
            let h: JoinHandle<anyhow::Result<()>> = tokio::spawn(async move {
                let mut interval = tokio::time::interval(tick);
                loop {
                    interval.tick().await;
                    if *shutdown_rx.borrow() {
                        info!("drain loop observed shutdown");
                        break;
                    }
                    let batch = pool.pop_batch(batch_size).await;
                    if !batch.is_empty() {
                        executor.execute_batch(batch).await;
                        // checkpoint balances so escrows never outlive their vaults
                        if let Err(e) = store.put_ledger(&ledger.snapshot()) {
                            error!("ledger checkpoint failed: {:?}", e);
                        }
                    }
                    pool.gc_ttl();
                    executor.gc_locks().await;
                    METRICS.set_gauge("pool_size", pool.len() as f64);
                }
                Ok(())
            });
            svc_handle.attach(h);
        }

        // -----------------------
        // RPC server
        // -----------------------
        {
            let deps = Arc::new(NodeRpcDeps {
                executor,
                store,
                pool,
                ingestor,
                node_key,
                node_nonce: AtomicU64::new(1),
            });
            let handler = RpcHandler::new(deps);

            let auth = match &self.cfg.auth_secret {
                Some(secret) => AuthConfig::new(hex::decode(secret)?),
                None => AuthConfig::disabled(),
            };
            let rpc_addr = self.cfg.rpc_addr.parse()?;
            let server = RpcServer::new(rpc_addr, handler, auth);
            let shutdown_rx = shutdown_rx.clone();
            let h: JoinHandle<anyhow::Result<()>> = tokio::spawn(async move {
                if let Err(e) = server.start(shutdown_rx).await {
                    error!("RPC server failed: {:?}", e);
                    return Err(anyhow!(e));
                }
                Ok(())
            });
            svc_handle.attach(h);
        }

        info!("engine started, RPC: {}", self.cfg.rpc_addr);
        Ok(svc_handle)
    }
}
