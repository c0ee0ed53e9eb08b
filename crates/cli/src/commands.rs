//! Subcommands.

use anyhow::Context;
use clap::Subcommand;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use treebus_core::{BusConfig, Interface, Methods, MANAGER_NAME};
use treebus_node::Bus;
use treebus_transport::{TcpAcceptor, TcpConnector};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the root node
    Root {
        /// Address to accept child nodes on
        #[arg(long, value_name = "ADDR")]
        listen: String,

        /// Publish an echo object under this name
        #[arg(long, value_name = "NAME")]
        echo: Option<String>,
    },

    /// Run a child node
    Node {
        /// Address of the parent node
        #[arg(long, value_name = "ADDR")]
        parent: String,

        /// Also accept child nodes on this address
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,

        /// Publish an echo object under this name
        #[arg(long, value_name = "NAME")]
        echo: Option<String>,
    },

    /// Call `[<path>]<interface>.<member>` and print the result
    Call {
        #[arg(long, value_name = "ADDR")]
        parent: String,

        name: String,

        /// Arguments, parsed as JSON where possible
        args: Vec<String>,
    },

    /// Broadcast a signal
    Emit {
        #[arg(long, value_name = "ADDR")]
        parent: String,

        signal: String,

        /// Arguments, parsed as JSON where possible
        args: Vec<String>,
    },

    /// Print every occurrence of a signal
    Listen {
        #[arg(long, value_name = "ADDR")]
        parent: String,

        signal: String,
    },
}

impl Command {
    pub async fn run(self, config: BusConfig) -> anyhow::Result<()> {
        match self {
            Command::Root { listen, echo } => {
                let bus = Bus::root(config)?;
                serve(&bus, &listen).await?;
                publish_echo(&bus, echo).await?;
                wait_for_interrupt(&bus).await
            }
            Command::Node {
                parent,
                listen,
                echo,
            } => {
                let bus = connect(&parent, config).await?;
                if let Some(listen) = listen {
                    serve(&bus, &listen).await?;
                }
                publish_echo(&bus, echo).await?;
                wait_for_interrupt(&bus).await
            }
            Command::Call { parent, name, args } => {
                let bus = connect(&parent, config).await?;
                let result = bus.request(&name, parse_args(&args)).await;
                bus.shutdown();
                let value = result.with_context(|| format!("calling {name}"))?;
                println!("{}", serde_json::to_string_pretty(&value)?);
                Ok(())
            }
            Command::Emit {
                parent,
                signal,
                args,
            } => {
                let bus = connect(&parent, config).await?;
                bus.emit(&signal, parse_args(&args))?;
                // Frames on one link stay in order, so once this round trip
                // completes the signal has left the process.
                bus.manager().resolve_name(MANAGER_NAME).await?;
                bus.shutdown();
                Ok(())
            }
            Command::Listen { parent, signal } => {
                let bus = connect(&parent, config).await?;
                bus.on_signal(&signal, |args| match serde_json::to_string(args) {
                    Ok(line) => println!("{line}"),
                    Err(err) => tracing::warn!(error = %err, "unprintable signal"),
                });
                wait_for_interrupt(&bus).await
            }
        }
    }
}

async fn connect(parent: &str, config: BusConfig) -> anyhow::Result<Bus> {
    let bus = Bus::connect(Arc::new(TcpConnector::new(parent)), config)
        .await
        .with_context(|| format!("joining the bus at {parent}"))?;
    info!(addr = %parent, path = %bus.path(), "joined the bus");
    Ok(bus)
}

async fn serve(bus: &Bus, listen: &str) -> anyhow::Result<()> {
    let acceptor = TcpAcceptor::bind(listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    info!(addr = %acceptor.local_addr()?, path = %bus.path(), "accepting child nodes");
    bus.serve(acceptor);
    Ok(())
}

async fn publish_echo(bus: &Bus, name: Option<String>) -> anyhow::Result<()> {
    if let Some(name) = name {
        bus.register_object(&name, echo(), None).await?;
        info!(name = %name, path = %bus.path(), "echo object published");
    }
    Ok(())
}

async fn wait_for_interrupt(bus: &Bus) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!(path = %bus.path(), "shutting down");
    bus.shutdown();
    Ok(())
}

/// Echo object: `call` returns its first argument, `all` every argument.
pub fn echo() -> Arc<dyn Interface> {
    Arc::new(
        Methods::new()
            .sync_method("call", |args| Ok(args.into_iter().next().unwrap_or_default()))
            .sync_method("all", |args| Ok(Value::Array(args))),
    )
}

/// Parse each argument as JSON, falling back to a plain string.
pub fn parse_args(raw: &[String]) -> Vec<Value> {
    raw.iter()
        .map(|arg| serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.clone())))
        .collect()
}
