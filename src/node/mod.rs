pub mod cli;
pub mod config;
pub mod service;
pub mod service_handle;

pub use cli::run_cli;
pub use config::NodeConfig;
pub use service::EngineService;
pub use service_handle::ServiceHandle;
