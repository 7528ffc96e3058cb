//! The persistence tier: serves the relay's single connection.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream};

use log::{debug, error, info, warn};

use crate::engine::GlossaryEngine;
use crate::error::{JHelpError, Result};
use crate::frame::{read_request, write_request};
use crate::listener::{Acceptor, ShutdownHandle};
use crate::protocol::Operation;

/// Network front of a [`GlossaryEngine`].
///
/// Relay connections are served one at a time, in accept order.
pub struct DbServer<E: GlossaryEngine> {
    acceptor: Acceptor,
    engine: E,
}

impl<E: GlossaryEngine> DbServer<E> {
    /// Bind `addr` in front of `engine`.
    pub fn new(addr: &str, engine: E) -> Result<Self> {
        Ok(Self {
            acceptor: Acceptor::bind(addr)?,
            engine,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.acceptor.local_addr()
    }

    /// A handle that stops [`DbServer::run`].
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.acceptor.shutdown_handle()
    }

    /// Serve relay connections until shutdown.
    pub fn run(&self) -> Result<()> {
        info!("persistence tier listening on {}", self.local_addr()?);
        self.acceptor.run(|stream, peer| {
            info!("relay connected from {peer}");
            match serve(stream, &self.engine) {
                Ok(()) => info!("relay {peer} disconnected"),
                Err(e) => error!("relay {peer} dropped: {e}"),
            }
        })
    }
}

fn serve(stream: TcpStream, engine: &impl GlossaryEngine) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);
    loop {
        let request = match read_request(&mut reader) {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(JHelpError::ProtocolViolation(msg)) => {
                warn!("dropping message: {msg}");
                continue;
            }
            Err(e) => return Err(e),
        };
        debug!("received {request:?}");
        if request.operation == Operation::Disconnect {
            return Ok(());
        }
        let response = engine.handle(request);
        debug!("sending {response:?}");
        write_request(&mut writer, &response)?;
    }
}
