//! # Net
//!
//! Accepting on a std listener with a deadline or a stop condition.
//! The listener is switched to non-blocking mode and polled.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Accept one connection. Returns `Ok(None)` as soon as `stop` reports true,
/// and a `TimedOut` error once `deadline` has passed.
pub(crate) fn accept_until<F>(
    listener: &TcpListener,
    deadline: Option<Instant>,
    stop: F,
) -> io::Result<Option<(TcpStream, SocketAddr)>>
where
    F: Fn() -> bool,
{
    listener.set_nonblocking(true)?;
    loop {
        if stop() {
            return Ok(None);
        }
        match listener.accept() {
            Ok((stream, addr)) => {
                // accepted sockets inherit O_NONBLOCK on some platforms
                stream.set_nonblocking(false)?;
                return Ok(Some((stream, addr)));
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "no data connection was accepted in time",
                ));
            }
        }
        std::thread::sleep(ACCEPT_POLL_INTERVAL);
    }
}
