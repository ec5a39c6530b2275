//! # Proxy
//!
//! Relay for FTP data connections.
//!
//! An FTP-aware intercepting proxy rewrites the data endpoint negotiated on the control channel
//! to one of its own ports. [`DataConnectionProxy`] binds that port through a shared
//! [`PortAllocator`], accepts the data connections arriving on it and relays each of them
//! to the real data endpoint in the background.

mod port;
mod relay;

pub use port::PortAllocator;
pub use relay::{CancelToken, CopyRelay, Direction, LogTap, RelayHandler, RelayStats, Tap};

use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::net;
use crate::ProxyResult;

/// How long a relay session waits for the remote data endpoint to accept
const REMOTE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound of a single connect attempt; cancellation is checked between attempts
const REMOTE_CONNECT_ATTEMPT: Duration = Duration::from_millis(250);

#[derive(Debug)]
struct RunningRelay {
    local_addr: SocketAddr,
    cancel: CancelToken,
    acceptor: JoinHandle<()>,
}

/// Accepts FTP data connections on a local port and relays them to a remote data endpoint
pub struct DataConnectionProxy {
    ports: Arc<PortAllocator>,
    handler: Arc<dyn RelayHandler>,
    running: Option<RunningRelay>,
}

impl std::fmt::Debug for DataConnectionProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataConnectionProxy")
            .field("range", &self.ports.range())
            .field("running", &self.running)
            .finish()
    }
}

impl DataConnectionProxy {
    /// Proxy drawing ports from `ports` and relaying with a plain [`CopyRelay`]
    pub fn new(ports: Arc<PortAllocator>) -> Self {
        Self {
            ports,
            handler: Arc::new(CopyRelay::new()),
            running: None,
        }
    }

    /// Relay accepted connections with `handler`
    pub fn with_handler(mut self, handler: Arc<dyn RelayHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Local endpoint of the running relay
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Stop any running relay, bind a port on `bind_address` and relay the connections
    /// accepted on it to `remote_address`. Returns the bound local endpoint.
    pub fn start(&mut self, bind_address: IpAddr, remote_address: SocketAddr) -> ProxyResult<SocketAddr> {
        self.stop();

        let listener = self.ports.bind(bind_address)?;
        let local_addr = listener.local_addr()?;
        let cancel = CancelToken::new();

        let acceptor = {
            let cancel = cancel.clone();
            let handler = Arc::clone(&self.handler);
            thread::Builder::new()
                .name(format!("ftp-relay-{}", local_addr.port()))
                .spawn(move || accept_loop(listener, remote_address, handler, cancel))?
        };

        info!("Relaying data connections from {} to {}", local_addr, remote_address);
        self.running = Some(RunningRelay {
            local_addr,
            cancel,
            acceptor,
        });
        Ok(local_addr)
    }

    /// Stop the relay and wait for its sessions to end. Does nothing when not running.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            debug!("Stopping relay on {}", running.local_addr);
            running.cancel.cancel();
            if running.acceptor.join().is_err() {
                error!("Relay acceptor on {} panicked", running.local_addr);
            }
        }
    }
}

impl Drop for DataConnectionProxy {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(
    listener: TcpListener,
    remote_address: SocketAddr,
    handler: Arc<dyn RelayHandler>,
    cancel: CancelToken,
) {
    let mut sessions: Vec<JoinHandle<()>> = Vec::new();
    loop {
        let (peer, peer_addr) = match net::accept_until(&listener, None, || cancel.is_cancelled()) {
            Ok(Some(accepted)) => accepted,
            Ok(None) => break,
            Err(e) => {
                error!("Relay listener failed: {}", e);
                break;
            }
        };
        debug!("Accepted data connection from {}", peer_addr);
        sessions.retain(|session| !session.is_finished());

        let session_cancel = cancel.child();
        let handler = Arc::clone(&handler);
        let spawned = thread::Builder::new()
            .name(format!("ftp-relay-session-{}", peer_addr))
            .spawn(move || run_session(peer, peer_addr, remote_address, handler.as_ref(), &session_cancel));
        match spawned {
            Ok(session) => sessions.push(session),
            Err(e) => error!("Could not spawn relay session for {}: {}", peer_addr, e),
        }
    }

    cancel.cancel();
    for session in sessions {
        if session.join().is_err() {
            error!("Relay session panicked");
        }
    }
    trace!("Relay acceptor finished");
}

fn run_session(
    peer: TcpStream,
    peer_addr: SocketAddr,
    remote_address: SocketAddr,
    handler: &dyn RelayHandler,
    cancel: &CancelToken,
) {
    match connect_remote(remote_address, cancel) {
        Ok(Some(remote)) => {
            debug!("Relay session {} <-> {} started", peer_addr, remote_address);
            match handler.relay(peer, remote, cancel) {
                Ok(stats) => debug!(
                    "Relay session {} <-> {} ended: {} bytes up, {} bytes down",
                    peer_addr, remote_address, stats.peer_to_remote, stats.remote_to_peer
                ),
                Err(e) => warn!("Relay session {} <-> {} failed: {}", peer_addr, remote_address, e),
            }
        }
        Ok(None) => debug!("Relay session for {} stopped while connecting", peer_addr),
        Err(e) => warn!("Could not connect relay for {} to {}: {}", peer_addr, remote_address, e),
    }
    // releases whatever the handler registered and detaches the session from its parent
    cancel.cancel();
}

/// Connect to the remote data endpoint in short attempts so that cancellation is noticed.
/// Returns `Ok(None)` once `cancel` fires.
fn connect_remote(remote_address: SocketAddr, cancel: &CancelToken) -> io::Result<Option<TcpStream>> {
    let deadline = Instant::now() + REMOTE_CONNECT_TIMEOUT;
    loop {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "remote data endpoint did not accept in time",
            ));
        }
        let attempt = REMOTE_CONNECT_ATTEMPT.min(deadline - now);
        match TcpStream::connect_timeout(&remote_address, attempt) {
            Ok(remote) => return Ok(Some(remote)),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                trace!("Connect to {} still pending", remote_address);
            }
            Err(e) => return Err(e),
        }
    }
}
