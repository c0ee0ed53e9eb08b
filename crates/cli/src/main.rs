//! CLI entry point for the `treebus` binary.

use clap::Parser;
use tracing_subscriber::EnvFilter;
use treebus_cli::CliConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = CliConfig::parse();
    config.run().await
}
