use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use jhelp::{DbServer, SqliteEngine, config::DbConfig};
use log::{info, warn};

/// Persistence tier: serves the relay server from a SQLite glossary.
#[derive(Parser)]
#[command(author, version)]
struct Args {
    /// JSON config file with dbHost, dbPort and dbName.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Interface to listen on.
    #[arg(long)]
    db_host: Option<String>,
    /// Port to listen on.
    #[arg(short = 'p', long)]
    db_port: Option<u16>,
    /// SQLite database file.
    #[arg(short = 'd', long)]
    db_name: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<DbConfig> {
        let mut config: DbConfig = jhelp::config::load(self.config.as_deref())?;
        if let Some(db_host) = self.db_host {
            config.db_host = db_host;
        }
        if let Some(db_port) = self.db_port {
            config.db_port = db_port;
        }
        if let Some(db_name) = self.db_name {
            config.db_name = db_name;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Args::parse().into_config()?;
    info!(
        "jhelp-db {} on {}, database {}",
        env!("CARGO_PKG_VERSION"),
        config.listen_addr(),
        config.db_name.display()
    );
    if config.user.is_some() || config.password.is_some() {
        warn!("user and password are ignored by the SQLite backend");
    }
    let engine = SqliteEngine::open(&config.db_name)?;
    DbServer::new(&config.listen_addr(), engine)?.run()?;
    Ok(())
}
