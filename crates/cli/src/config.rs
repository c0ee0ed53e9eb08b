//! Command-line arguments and how they combine with the config file.

use crate::commands::Command;
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use treebus_core::BusConfig;

/// Tree-structured message bus over TCP.
#[derive(Parser, Debug)]
#[command(name = "treebus")]
#[command(version, about, long_about = None)]
pub struct CliConfig {
    /// JSON bus configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Per-request timeout in milliseconds, 0 to wait forever
    #[arg(long, global = true, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    /// File values first, then flag overrides.
    pub fn bus_config(&self) -> anyhow::Result<BusConfig> {
        let mut config = match &self.config {
            Some(path) => BusConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => BusConfig::default(),
        };
        if let Some(ms) = self.timeout_ms {
            config.request_timeout_ms = (ms > 0).then_some(ms);
        }
        Ok(config)
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let config = self.bus_config()?;
        self.command.run(config).await
    }
}
