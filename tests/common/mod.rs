#![allow(dead_code)]

use std::net::SocketAddr;
use std::thread::{self, JoinHandle};

use jhelp::config::RelayConfig;
use jhelp::{DbServer, RelayServer, ShutdownHandle, SqliteEngine};

pub struct Tier<T> {
    pub addr: SocketAddr,
    pub shutdown: ShutdownHandle,
    pub thread: JoinHandle<jhelp::Result<T>>,
}

impl<T> Tier<T> {
    pub fn stop(self) -> jhelp::Result<T> {
        self.shutdown.shutdown();
        self.thread.join().unwrap()
    }
}

pub fn start_db() -> Tier<()> {
    let engine = SqliteEngine::open_in_memory().unwrap();
    let server = DbServer::new("127.0.0.1:0", engine).unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = server.shutdown_handle();
    let thread = thread::spawn(move || server.run());
    Tier {
        addr,
        shutdown,
        thread,
    }
}

pub fn relay_config(db: SocketAddr, timeout_secs: u64) -> RelayConfig {
    RelayConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        db_host: db.ip().to_string(),
        db_port: db.port(),
        timeout_secs,
    }
}

pub fn start_relay(config: &RelayConfig) -> Tier<()> {
    let server = RelayServer::new(config).unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = server.shutdown_handle();
    let thread = thread::spawn(move || server.run());
    Tier {
        addr,
        shutdown,
        thread,
    }
}

/// A persistence tier and a relay in front of it.
pub fn start_stack() -> (Tier<()>, Tier<()>) {
    let db = start_db();
    let relay = start_relay(&relay_config(db.addr, 5));
    (db, relay)
}

pub fn stop_stack(db: Tier<()>, relay: Tier<()>) {
    relay.stop().unwrap();
    db.stop().unwrap();
}
