//! Accept loop shared by the relay server and the persistence tier.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::info;

use crate::error::{JHelpError, Result};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Asks a running server to stop accepting connections.
#[derive(Clone, Debug, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Raise the shutdown flag.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A listener whose accept loop stops once its [`ShutdownHandle`] fires.
pub(crate) struct Acceptor {
    listener: TcpListener,
    shutdown: ShutdownHandle,
}

impl Acceptor {
    pub(crate) fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|e| JHelpError::connection(addr, e))?;
        // Non-blocking so the loop can poll the shutdown flag.
        listener
            .set_nonblocking(true)
            .map_err(|e| JHelpError::connection(addr, e))?;
        Ok(Self {
            listener,
            shutdown: ShutdownHandle::default(),
        })
    }

    pub(crate) fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub(crate) fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Hand every accepted connection to `on_accept` until shutdown.
    pub(crate) fn run(&self, mut on_accept: impl FnMut(TcpStream, SocketAddr)) -> Result<()> {
        loop {
            if self.shutdown.is_shutdown() {
                info!("shutdown requested, no longer accepting connections");
                return Ok(());
            }
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false)?;
                    on_accept(stream, peer);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    if self.shutdown.is_shutdown() {
                        return Ok(());
                    }
                    return Err(JHelpError::connection(self.local_addr()?, e));
                }
            }
        }
    }
}
