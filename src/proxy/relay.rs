//! # Relay
//!
//! Bidirectional byte relay between two established connections

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Which way relayed bytes travel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// From the connection accepted by the proxy to the remote endpoint
    PeerToRemote,
    /// From the remote endpoint back to the accepted connection
    RemoteToPeer,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::PeerToRemote => f.pad("peer -> remote"),
            Direction::RemoteToPeer => f.pad("remote -> peer"),
        }
    }
}

/// Diagnostic sink receiving a copy of every relayed chunk
pub trait Tap: Send + Sync {
    fn tap(&self, direction: Direction, data: &[u8]);
}

impl<F> Tap for F
where
    F: Fn(Direction, &[u8]) + Send + Sync,
{
    fn tap(&self, direction: Direction, data: &[u8]) {
        self(direction, data)
    }
}

/// Tap writing every chunk to the log at trace level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTap;

impl Tap for LogTap {
    fn tap(&self, direction: Direction, data: &[u8]) {
        trace!("{} ({} bytes): {:?}", direction, data.len(), String::from_utf8_lossy(data));
    }
}

/// Shared cancellation signal.
///
/// Cancelling shuts down every registered socket, so reads blocked on them return at once,
/// and cancels every child token.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    streams: Mutex<Vec<TcpStream>>,
    children: Mutex<Vec<CancelToken>>,
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let streams = std::mem::take(
            &mut *self.inner.streams.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for stream in streams {
            shutdown(&stream);
        }
        let children = std::mem::take(
            &mut *self.inner.children.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for child in children {
            child.cancel();
        }
    }

    /// Shut `stream` down when the token is cancelled; immediately if it already is
    pub fn register(&self, stream: &TcpStream) -> io::Result<()> {
        let handle = stream.try_clone()?;
        self.inner
            .streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        if self.is_cancelled() {
            shutdown(stream);
        }
        Ok(())
    }

    /// A token cancelled together with this one, but which can also be cancelled on its own.
    /// Children cancelled earlier are forgotten.
    pub fn child(&self) -> CancelToken {
        let child = CancelToken::new();
        let mut children = self
            .inner
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        children.retain(|c| !c.is_cancelled());
        children.push(child.clone());
        drop(children);
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }
}

fn shutdown(stream: &TcpStream) {
    if let Err(e) = stream.shutdown(Shutdown::Both) {
        if e.kind() != io::ErrorKind::NotConnected {
            warn!("Failed to shut down relayed socket: {}", e);
        }
    }
}

/// Bytes moved by one relay session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub peer_to_remote: u64,
    pub remote_to_peer: u64,
}

/// Strategy relaying one accepted connection
pub trait RelayHandler: Send + Sync {
    /// Relay between `peer` and `remote` until both directions have ended.
    /// Cancelling `cancel` must make the call return promptly.
    fn relay(&self, peer: TcpStream, remote: TcpStream, cancel: &CancelToken) -> io::Result<RelayStats>;
}

/// Copies both directions concurrently. When either direction ends, the session is
/// cancelled so the other one stops as well.
#[derive(Default, Clone)]
pub struct CopyRelay {
    tap: Option<Arc<dyn Tap>>,
}

impl fmt::Debug for CopyRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyRelay")
            .field("tap", &self.tap.is_some())
            .finish()
    }
}

impl CopyRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duplicate relayed bytes to `tap`
    pub fn with_tap(mut self, tap: Arc<dyn Tap>) -> Self {
        self.tap = Some(tap);
        self
    }
}

impl RelayHandler for CopyRelay {
    fn relay(&self, peer: TcpStream, remote: TcpStream, cancel: &CancelToken) -> io::Result<RelayStats> {
        cancel.register(&peer)?;
        cancel.register(&remote)?;
        let tap = self.tap.as_deref();

        thread::scope(|s| {
            let upstream = s.spawn(|| {
                let copied = pump(&peer, &remote, Direction::PeerToRemote, tap, cancel);
                cancel.cancel();
                copied
            });
            let downstream = pump(&remote, &peer, Direction::RemoteToPeer, tap, cancel);
            cancel.cancel();
            let upstream = upstream
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "relay thread panicked"))?;

            Ok(RelayStats {
                peer_to_remote: upstream?,
                remote_to_peer: downstream?,
            })
        })
    }
}

/// Copy `from` into `to` until end of input. Errors raised after cancellation end the copy quietly.
fn pump(
    mut from: &TcpStream,
    mut to: &TcpStream,
    direction: Direction,
    tap: Option<&dyn Tap>,
    cancel: &CancelToken,
) -> io::Result<u64> {
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut total = 0;
    loop {
        let n = match from.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) if cancel.is_cancelled() => break,
            Err(e) => return Err(e),
        };
        if let Some(tap) = tap {
            tap.tap(direction, &buf[..n]);
        }
        match to.write_all(&buf[..n]) {
            Ok(()) => total += n as u64,
            Err(_) if cancel.is_cancelled() => break,
            Err(e) => return Err(e),
        }
    }
    trace!("{} finished after {} bytes", direction, total);
    Ok(total)
}
