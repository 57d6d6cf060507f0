//! RPC module
//!
//! - JSON-RPC 2.0 endpoint at POST /rpc
//! - REST getters: /escrow/:address, /receipt/:signature
//! - Diagnostic endpoints: /health, /metrics
//! - Simple HMAC auth middleware (optional)
//!
//! To integrate: implement the `RpcDeps` trait (wrapping the executor,
//! store, and ingest path) and pass an `RpcHandler` to `RpcServer::new()`.

pub mod auth;
pub mod handlers;
pub mod server;

pub use handlers::{RpcDeps, RpcHandler, StatusSnapshot};
pub use server::RpcServer;
