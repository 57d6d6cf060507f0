use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::crypto::Keypair;
use crate::node::config::NodeConfig;
use crate::node::service::EngineService;
use crate::utils::logging::init_logging;

/// CLI for engine control.
#[derive(Parser)]
#[clap(name = "ricks-engine", version)]
pub struct Cli {
    /// Path to data directory
    #[clap(long, default_value = "./data")]
    pub data_dir: PathBuf,

    #[clap(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand)]
pub enum Cmd {
    /// Initialize the data directory: write config and node key
    Init {
        /// rpc bind address (host:port)
        #[clap(long, default_value = "0.0.0.0:8080")]
        rpc: String,
    },
    /// Generate a fresh node keypair and print its address
    Keygen,
    /// Run the engine
    Run {
        /// rpc bind address override (host:port)
        #[clap(long)]
        rpc: Option<String>,
    },
}

pub async fn run_cli() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config_path = cli.data_dir.join("config.toml");

    match cli.cmd {
        Cmd::Init { rpc } => {
            std::fs::create_dir_all(&cli.data_dir)?;
            let cfg = NodeConfig {
                data_dir: cli.data_dir.display().to_string(),
                rpc_addr: rpc,
                ..Default::default()
            };
            cfg.save(&config_path)?;
            let kp = crate::node::service::load_or_create_keypair(&cli.data_dir)?;
            println!("initialized data dir at {}", cli.data_dir.display());
            println!("node address: {}", kp.address());
            Ok(())
        }
        Cmd::Keygen => {
            std::fs::create_dir_all(&cli.data_dir)?;
            let kp = Keypair::generate();
            std::fs::write(cli.data_dir.join("node_key"), hex::encode(kp.secret_bytes()))?;
            println!("node address: {}", kp.address());
            Ok(())
        }
        Cmd::Run { rpc } => {
            let mut cfg = if config_path.exists() {
                NodeConfig::load(&config_path)?
            } else {
                NodeConfig {
                    data_dir: cli.data_dir.display().to_string(),
                    ..Default::default()
                }
            };
            if let Some(rpc) = rpc {
                cfg.rpc_addr = rpc;
            }

            let svc = EngineService::new(cfg).start().await?;
            tokio::signal::ctrl_c().await?;
            println!("Shutting down engine...");
            svc.shutdown().await?;
            println!("Engine stopped");
            Ok(())
        }
    }
}
