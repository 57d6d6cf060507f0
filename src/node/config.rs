use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Engine configuration, loaded from `config.toml` in the data dir.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub data_dir: String,
    pub rpc_addr: String,
    pub max_pool_size: usize,
    pub pool_ttl_secs: u64,
    /// Drain-loop tick interval
    pub tick_ms: u64,
    /// Instructions drained per tick
    pub batch_size: usize,
    /// Hex HMAC secret; enables RPC auth when set
    pub auth_secret: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            rpc_addr: "0.0.0.0:8080".to_string(),
            max_pool_size: 100_000,
            pool_ttl_secs: 3_600,
            tick_ms: 100,
            batch_size: 64,
            auth_secret: None,
        }
    }
}

impl NodeConfig {
    /// Load config from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let cfg: NodeConfig = toml::from_str(&data)?;
        Ok(cfg)
    }

    /// Write config as TOML.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}
