use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use jhelp::{RelayServer, config::RelayConfig};
use log::info;

/// Relay server: forwards front-end requests to the persistence tier.
#[derive(Parser)]
#[command(author, version)]
struct Args {
    /// JSON config file with host, port, dbHost and dbPort.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Interface to listen on.
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on.
    #[arg(short, long)]
    port: Option<u16>,
    /// Persistence tier host.
    #[arg(long)]
    db_host: Option<String>,
    /// Persistence tier port.
    #[arg(long)]
    db_port: Option<u16>,
    /// Downstream round-trip timeout in seconds, 0 waits forever.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<RelayConfig> {
        let mut config: RelayConfig = jhelp::config::load(self.config.as_deref())?;
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(db_host) = self.db_host {
            config.db_host = db_host;
        }
        if let Some(db_port) = self.db_port {
            config.db_port = db_port;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.timeout_secs = timeout_secs;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Args::parse().into_config()?;
    info!(
        "jhelp-server {} on {}, persistence tier {}",
        env!("CARGO_PKG_VERSION"),
        config.listen_addr(),
        config.db_addr()
    );
    RelayServer::new(&config)?.run()?;
    Ok(())
}
