//! portswarm: run a swarm of IRC clients, one per local address.
//!
//! Logs go to stderr via `tracing`. Set `RUST_LOG` to adjust the filter and
//! `PORTSWARM_LOG_JSON=1` for JSON output.

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use portswarm_bots::config::{Cli, SwarmConfig};
use portswarm_bots::{host, supervisor};

#[tokio::main]
async fn main() -> Result<()> {
    let json_logs = std::env::var("PORTSWARM_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env()
        .add_directive("portswarm_bots=info".parse()?)
        .add_directive("portswarm_sdk=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let cli = Cli::parse();
    let config = SwarmConfig::resolve(&cli)?;

    let addresses = if config.addresses.is_empty() {
        let found = host::discover_addresses().await?;
        tracing::info!("Discovered {} usable local address(es)", found.len());
        found
    } else {
        config.addresses.clone()
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(supervisor::forward_shutdown(
        tokio::signal::ctrl_c(),
        shutdown_tx,
    ));

    supervisor::run(config, &addresses, shutdown_rx).await
}
