use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    ricks_engine::node::run_cli().await
}
