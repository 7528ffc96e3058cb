//! The relay server.
//!
//! Many front-end connections share one connection to the persistence tier.
//! The protocol carries no correlation id, so responses are matched to
//! requests purely by order: a single actor thread owns the downstream
//! socket and performs one round trip at a time for whichever worker called.

use std::collections::HashMap;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError, mpsc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_utils::sync::WaitGroup;
use log::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::error::{JHelpError, Result};
use crate::frame::{read_request, write_request};
use crate::listener::{Acceptor, ShutdownHandle};
use crate::protocol::{Operation, Request};

/// Bound on writing the shutdown notice to one front-end.
const DISCONNECT_NOTICE_TIMEOUT: Duration = Duration::from_secs(1);

struct Call {
    request: Request,
    reply: mpsc::Sender<Result<Request>>,
}

/// Handle on the shared persistence tier connection.
///
/// Clones feed the same actor; dropping the last one makes the actor send
/// `DISCONNECT` downstream and exit.
#[derive(Clone)]
pub struct Downstream {
    calls: mpsc::Sender<Call>,
    failed: Arc<AtomicBool>,
}

impl Downstream {
    /// Connect to the persistence tier at `addr` and start the owning actor.
    ///
    /// `timeout` bounds a whole round trip, from the first byte written to
    /// the last byte of the response. A failed round trip fires `on_failure`.
    pub fn connect(
        addr: &str,
        timeout: Option<Duration>,
        on_failure: ShutdownHandle,
    ) -> Result<(Downstream, JoinHandle<()>)> {
        let stream = TcpStream::connect(addr).map_err(|e| JHelpError::connection(addr, e))?;
        let conn = BufReader::new(DeadlineStream::new(stream, timeout));
        let (calls, queue) = mpsc::channel();
        let failed = Arc::new(AtomicBool::new(false));
        let actor = {
            let failed = failed.clone();
            thread::Builder::new()
                .name("relay-downstream".to_string())
                .spawn(move || run_actor(conn, queue, failed, on_failure))?
        };
        info!("connected to persistence tier at {addr}");
        Ok((Downstream { calls, failed }, actor))
    }

    /// Forward `request` downstream and wait for its response.
    ///
    /// At most one round trip is in flight at any instant.
    pub fn relay(&self, request: Request) -> Result<Request> {
        let (reply, response) = mpsc::channel();
        self.calls
            .send(Call { request, reply })
            .map_err(|_| JHelpError::Disconnected)?;
        response.recv().map_err(|_| JHelpError::Disconnected)?
    }

    /// Whether a downstream round trip has failed.
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

/// The downstream socket, with every read and write bounded by the deadline
/// of the current round trip.
struct DeadlineStream {
    stream: TcpStream,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl DeadlineStream {
    fn new(stream: TcpStream, timeout: Option<Duration>) -> Self {
        Self {
            stream,
            timeout,
            deadline: None,
        }
    }

    fn start_round_trip(&mut self) {
        self.deadline = self.timeout.map(|timeout| Instant::now() + timeout);
    }

    fn remaining(&self) -> io::Result<Option<Duration>> {
        let Some(deadline) = self.deadline else {
            return Ok(None);
        };
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "downstream round trip timed out",
            ));
        }
        Ok(Some(left))
    }

    fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl Read for DeadlineStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.set_read_timeout(self.remaining()?)?;
        self.stream.read(buf)
    }
}

impl Write for DeadlineStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.set_write_timeout(self.remaining()?)?;
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

fn run_actor(
    mut conn: BufReader<DeadlineStream>,
    queue: mpsc::Receiver<Call>,
    failed: Arc<AtomicBool>,
    on_failure: ShutdownHandle,
) {
    for Call { request, reply } in queue.iter() {
        let result = round_trip(&mut conn, &request);
        if let Err(e) = &result {
            error!("downstream round trip failed: {e}");
            failed.store(true, Ordering::SeqCst);
            on_failure.shutdown();
            let _ = reply.send(result);
            conn.get_ref().shutdown();
            return;
        }
        let _ = reply.send(result);
    }

    info!("disconnecting from persistence tier");
    conn.get_mut().start_round_trip();
    if let Err(e) = write_request(conn.get_mut(), &Request::disconnect()) {
        warn!("cannot announce disconnect downstream: {e}");
    }
    conn.get_ref().shutdown();
}

fn round_trip(conn: &mut BufReader<DeadlineStream>, request: &Request) -> Result<Request> {
    conn.get_mut().start_round_trip();
    write_request(conn.get_mut(), request)?;
    match read_request(conn)? {
        Some(response) if response.operation != Operation::Disconnect => Ok(response),
        _ => Err(JHelpError::Disconnected),
    }
}

/// The write half of one front-end connection.
struct Session {
    writer: Mutex<BufWriter<TcpStream>>,
    stream: TcpStream,
}

impl Session {
    fn new(stream: &TcpStream) -> Result<Self> {
        Ok(Self {
            writer: Mutex::new(BufWriter::new(stream.try_clone()?)),
            stream: stream.try_clone()?,
        })
    }

    fn send(&self, request: &Request) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        write_request(&mut *writer, request)
    }

    /// Tell the front-end to disconnect and close the socket.
    ///
    /// Never waits on a front-end that stopped reading: when its worker is
    /// stuck in a write the notice is skipped, and the notice itself may take
    /// at most `DISCONNECT_NOTICE_TIMEOUT`.
    fn disconnect(&self) {
        let _ = self.stream.set_write_timeout(Some(DISCONNECT_NOTICE_TIMEOUT));
        match self.writer.try_lock() {
            Ok(mut writer) => {
                if let Err(e) = write_request(&mut *writer, &Request::disconnect()) {
                    debug!("front-end already gone: {e}");
                }
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                let _ = write_request(&mut *poisoned.into_inner(), &Request::disconnect());
            }
            Err(TryLockError::WouldBlock) => {
                debug!("front-end is not reading, closing without notice");
            }
        }
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

type Sessions = Arc<Mutex<HashMap<u64, Arc<Session>>>>;

/// Accepts front-end connections and relays their requests downstream.
pub struct RelayServer {
    acceptor: Acceptor,
    downstream: Downstream,
    actor: JoinHandle<()>,
    sessions: Sessions,
}

impl RelayServer {
    /// Bind the front-end listener and connect to the persistence tier.
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let acceptor = Acceptor::bind(&config.listen_addr())?;
        let (downstream, actor) = Downstream::connect(
            &config.db_addr(),
            config.timeout(),
            acceptor.shutdown_handle(),
        )?;
        Ok(Self {
            acceptor,
            downstream,
            actor,
            sessions: Arc::default(),
        })
    }

    /// The bound front-end address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.acceptor.local_addr()
    }

    /// A handle that stops [`RelayServer::run`].
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.acceptor.shutdown_handle()
    }

    /// Serve front-ends until shutdown or until the downstream connection fails.
    ///
    /// On exit every live front-end is told to disconnect, every worker is
    /// joined and the persistence tier receives `DISCONNECT`.
    pub fn run(self) -> Result<()> {
        info!("relay listening on {}", self.local_addr()?);
        let workers = WaitGroup::new();
        let mut next_id = 0u64;
        let accepted = self.acceptor.run(|stream, peer| {
            next_id += 1;
            let id = next_id;
            if let Err(e) = self.spawn_worker(id, stream, workers.clone()) {
                error!("cannot serve front-end {peer}: {e}");
                return;
            }
            info!("front-end {id} connected from {peer}");
        });

        let live: Vec<_> = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        info!("disconnecting {} front-end(s)", live.len());
        for session in live {
            session.disconnect();
        }
        workers.wait();

        let failed = self.downstream.is_failed();
        drop(self.downstream);
        if self.actor.join().is_err() {
            error!("downstream actor panicked");
        }
        accepted?;
        if failed {
            return Err(JHelpError::Disconnected);
        }
        Ok(())
    }

    fn spawn_worker(&self, id: u64, stream: TcpStream, done: WaitGroup) -> Result<()> {
        let session = Arc::new(Session::new(&stream)?);
        let reader = BufReader::new(stream);
        let downstream = self.downstream.clone();
        let sessions = self.sessions.clone();
        sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, session.clone());

        let spawned = thread::Builder::new()
            .name(format!("relay-session-{id}"))
            .spawn(move || {
                match serve(reader, &session, &downstream) {
                    Ok(()) => info!("front-end {id} disconnected"),
                    Err(e) => error!("front-end {id} dropped: {e}"),
                }
                let _ = session.stream.shutdown(Shutdown::Both);
                sessions
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
                drop(done);
            });
        if let Err(e) = spawned {
            self.sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Worker loop of one front-end connection.
fn serve(
    mut reader: BufReader<TcpStream>,
    session: &Session,
    downstream: &Downstream,
) -> Result<()> {
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
            // Acknowledge; the peer may already have closed.
            let _ = session.send(&Request::disconnect());
            return Ok(());
        }
        match downstream.relay(request) {
            Ok(response) => {
                debug!("sending {response:?}");
                session.send(&response)?;
            }
            Err(e) => {
                let _ = session.send(&Request::disconnect());
                return Err(e);
            }
        }
    }
}
