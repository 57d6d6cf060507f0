use axum::{
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use tracing::warn;

/// Simple HMAC token-based auth middleware.
/// Requests carry `x-auth-token: <hex-hmac>` where the value is
/// HMAC_SHA256(secret, request path). Disabled by default for local use.

pub type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct AuthConfig {
    pub enabled: bool,
    pub secret: Arc<Vec<u8>>,
}

impl AuthConfig {
    pub fn disabled() -> Self {
        Self { enabled: false, secret: Arc::new(vec![]) }
    }

    pub fn new(secret: Vec<u8>) -> Self {
        Self { enabled: true, secret: Arc::new(secret) }
    }

    /// Compute the expected token for a request path.
    pub fn token_for(&self, path: &str) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(path.as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }
}

/// Validate the header token against the HMAC of the request path.
pub async fn require_hmac<B>(
    auth: Arc<AuthConfig>,
    req: Request<B>,
    next: Next<B>,
) -> Result<Response, StatusCode> {
    if !auth.enabled {
        return Ok(next.run(req).await);
    }

    let token = match req.headers().get("x-auth-token") {
        Some(v) => v.to_str().unwrap_or(""),
        None => {
            warn!("missing auth header");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };
    let path = req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("");
    let expected = auth
        .token_for(path)
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    if expected != token {
        warn!("invalid auth token");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_deterministic_per_path() {
        let auth = AuthConfig::new(b"secret".to_vec());
        let a = auth.token_for("/rpc").unwrap();
        let b = auth.token_for("/rpc").unwrap();
        let c = auth.token_for("/health").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
