use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json as AxumJson, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::engine::instruction::SignedInstruction;
use crate::pool::IngestResult;
use crate::rpc::auth::{require_hmac, AuthConfig};
use crate::rpc::handlers::RpcHandler;
use crate::utils::metrics::METRICS;

/// JSON-RPC 2.0 request structure (simplified)
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub result: Option<Value>,
    pub error: Option<Value>,
    pub id: Option<Value>,
}

impl JsonRpcResponse {
    fn result(id: Option<Value>, v: Value) -> Self {
        Self { jsonrpc: "2.0".into(), result: Some(v), error: None, id }
    }

    fn error(id: Option<Value>, code: i32, message: &str) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(serde_json::json!({"code": code, "message": message})),
            id,
        }
    }
}

/// RpcServer ties together the HTTP server and handler implementations.
pub struct RpcServer {
    addr: SocketAddr,
    handler: RpcHandler,
    auth: Arc<AuthConfig>,
}

impl RpcServer {
    pub fn new(addr: SocketAddr, handler: RpcHandler, auth: AuthConfig) -> Self {
        Self { addr, handler, auth: Arc::new(auth) }
    }

    pub fn router(&self) -> Router {
        let auth = self.auth.clone();
        Router::new()
            .route("/health", get(|| async { "ok" }))
            .route("/metrics", get(metrics_handler))
            .route("/rpc", post(rpc_endpoint))
            .route("/escrow/:address", get(get_escrow_handler))
            .route("/receipt/:signature", get(get_receipt_handler))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(axum::middleware::from_fn(move |req, next| {
                        let auth = auth.clone();
                        async move { require_hmac(auth, req, next).await }
                    }))
                    .layer(Extension(Arc::new(self.handler.clone()))),
            )
    }

    /// Serve until `shutdown_rx` flips to true or the listener fails.
    pub async fn start(self, mut shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!("Starting RPC server on {}", self.addr);
        let app = self.router();
        axum::Server::bind(&self.addr)
            .serve(app.into_make_service())
            .with_graceful_shutdown(async move {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("RPC server observed shutdown");
            })
            .await?;
        Ok(())
    }
}

async fn metrics_handler() -> String {
    METRICS.render()
}

async fn get_escrow_handler(
    Path(address): Path<String>,
    Extension(rh): Extension<Arc<RpcHandler>>,
) -> impl IntoResponse {
    match rh.get_escrow(&address).await {
        Ok(Some(escrow)) => AxumJson(escrow).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "not found").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("err: {e:?}")).into_response(),
    }
}

async fn get_receipt_handler(
    Path(signature): Path<String>,
    Extension(rh): Extension<Arc<RpcHandler>>,
) -> impl IntoResponse {
    match rh.get_receipt(&signature).await {
        Ok(Some(receipt)) => AxumJson(receipt).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "not found").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("err: {e:?}")).into_response(),
    }
}

/// JSON-RPC router: single endpoint POST /rpc
async fn rpc_endpoint(
    Extension(rh): Extension<Arc<RpcHandler>>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    let req: JsonRpcRequest = match serde_json::from_value(payload) {
        Ok(req) => req,
        Err(_) => return AxumJson(JsonRpcResponse::error(None, -32700, "Parse error")),
    };
    AxumJson(dispatch(&rh, req).await)
}

/// Single string param, positional or named.
fn string_param(params: &Option<Value>, name: &str) -> Option<String> {
    let params = params.as_ref()?;
    if params.is_array() {
        params[0].as_str().map(|s| s.to_string())
    } else {
        params.get(name).and_then(|v| v.as_str()).map(|s| s.to_string())
    }
}

/// Dispatch one JSON-RPC request to the handler.
pub async fn dispatch(rh: &RpcHandler, req: JsonRpcRequest) -> JsonRpcResponse {
    let id = req.id.clone();
    match req.method.as_str() {
        "initialize" => match rh.initialize().await {
            Ok(signature) => {
                JsonRpcResponse::result(id, serde_json::json!({ "signature": signature }))
            }
            Err(e) => JsonRpcResponse::error(id, -32000, &format!("{e}")),
        },
        "submit_instruction" => {
            let ix_val = match &req.params {
                Some(params) if params.is_array() => params[0].clone(),
                Some(params) => params.clone(),
                None => return JsonRpcResponse::error(id, -32602, "missing params"),
            };
            let signed: SignedInstruction = match serde_json::from_value(ix_val) {
                Ok(signed) => signed,
                Err(e) => {
                    return JsonRpcResponse::error(id, -32602, &format!("invalid params: {e}"))
                }
            };
            match rh.submit_instruction(signed).await {
                Ok(IngestResult::Accepted(signature)) => JsonRpcResponse::result(
                    id,
                    serde_json::json!({ "accepted": true, "signature": signature }),
                ),
                Ok(IngestResult::Rejected(reason)) => JsonRpcResponse::result(
                    id,
                    serde_json::json!({ "accepted": false, "reason": reason }),
                ),
                Err(e) => JsonRpcResponse::error(id, -32001, &format!("{e}")),
            }
        }
        "get_escrow" => {
            let Some(address) = string_param(&req.params, "address") else {
                return JsonRpcResponse::error(id, -32602, "missing address");
            };
            match rh.get_escrow(&address).await {
                Ok(Some(escrow)) => {
                    JsonRpcResponse::result(id, serde_json::to_value(escrow).unwrap_or(Value::Null))
                }
                Ok(None) => JsonRpcResponse::error(id, -32602, "escrow not found"),
                Err(e) => JsonRpcResponse::error(id, -32001, &format!("{e}")),
            }
        }
        "get_position" => {
            let Some(address) = string_param(&req.params, "address") else {
                return JsonRpcResponse::error(id, -32602, "missing address");
            };
            match rh.get_position(&address).await {
                Ok(Some(position)) => JsonRpcResponse::result(
                    id,
                    serde_json::to_value(position).unwrap_or(Value::Null),
                ),
                Ok(None) => JsonRpcResponse::error(id, -32602, "position not found"),
                Err(e) => JsonRpcResponse::error(id, -32001, &format!("{e}")),
            }
        }
        "get_auction" => {
            let Some(escrow) = string_param(&req.params, "escrow") else {
                return JsonRpcResponse::error(id, -32602, "missing escrow");
            };
            match rh.get_auction(&escrow).await {
                Ok(Some(auction)) => JsonRpcResponse::result(
                    id,
                    serde_json::to_value(auction).unwrap_or(Value::Null),
                ),
                Ok(None) => JsonRpcResponse::error(id, -32602, "no open auction"),
                Err(e) => JsonRpcResponse::error(id, -32001, &format!("{e}")),
            }
        }
        "get_receipt" => {
            let Some(signature) = string_param(&req.params, "signature") else {
                return JsonRpcResponse::error(id, -32602, "missing signature");
            };
            match rh.get_receipt(&signature).await {
                Ok(Some(receipt)) => JsonRpcResponse::result(
                    id,
                    serde_json::to_value(receipt).unwrap_or(Value::Null),
                ),
                Ok(None) => JsonRpcResponse::error(id, -32602, "receipt not found"),
                Err(e) => JsonRpcResponse::error(id, -32001, &format!("{e}")),
            }
        }
        "status" => match rh.status().await {
            Ok(v) => JsonRpcResponse::result(id, v),
            Err(e) => JsonRpcResponse::error(id, -32000, &format!("{e}")),
        },
        _ => JsonRpcResponse::error(id, -32601, "Method not found"),
    }
}
