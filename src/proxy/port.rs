//! # Port
//!
//! Cyclic allocation of relay listening ports from a shared range.
//!
//! Every proxy holding the same allocator draws from one cursor. Candidates walk from `first`
//! towards `last` and wrap around; a candidate that is already in use is skipped, and an
//! allocation gives up once every port of the range has been tried.

use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::{ProxyError, ProxyResult};

/// Shared port range and cursor. `(0, 0)` lets the OS pick an ephemeral port for every allocation.
#[derive(Debug, Default)]
pub struct PortAllocator {
    range: OnceLock<(u16, u16)>,
    cursor: Mutex<Option<u16>>,
}

impl PortAllocator {
    /// Allocator handing out OS-assigned ports
    pub fn ephemeral() -> Self {
        let this = Self::default();
        let _ = this.range.set((0, 0));
        this
    }

    /// Allocator cycling over `first..=last`; `first` may be greater than `last`
    pub fn with_range(first: u16, last: u16) -> ProxyResult<Self> {
        let this = Self::default();
        this.configure(first, last)?;
        Ok(this)
    }

    /// Set the range of an allocator built with `default()`.
    /// Fails once a range has been set or a port has been allocated.
    pub fn configure(&self, first: u16, last: u16) -> ProxyResult<()> {
        if (first == 0) != (last == 0) {
            return Err(ProxyError::InvalidRange(first, last));
        }
        self.range
            .set((first, last))
            .map_err(|_| ProxyError::RangeAlreadyConfigured)?;
        debug!("Relay port range set to {}..={}", first, last);
        Ok(())
    }

    /// The configured range; `(0, 0)` when unset
    pub fn range(&self) -> (u16, u16) {
        self.range.get().copied().unwrap_or((0, 0))
    }

    /// Bind a listener on `ip` with the next free port of the range
    pub fn bind(&self, ip: IpAddr) -> ProxyResult<TcpListener> {
        self.allocate(|port| TcpListener::bind(SocketAddr::new(ip, port)))
    }

    /// Run `bind` with successive candidate ports until it succeeds.
    ///
    /// Only `AddrInUse` failures move on to the next candidate; any other error is returned as is.
    pub fn allocate<T, F>(&self, mut bind: F) -> ProxyResult<T>
    where
        F: FnMut(u16) -> io::Result<T>,
    {
        let (first, last) = *self.range.get_or_init(|| (0, 0));
        if first == 0 && last == 0 {
            return bind(0).map_err(ProxyError::Bind);
        }

        let attempts = usize::from(first.abs_diff(last)) + 1;
        let mut first_tried = None;
        let mut last_error = None;
        for _ in 0..attempts {
            let port = self.next_candidate(first, last);
            if first_tried == Some(port) {
                break;
            }
            first_tried.get_or_insert(port);

            match bind(port) {
                Ok(bound) => {
                    trace!("Allocated relay port {}", port);
                    return Ok(bound);
                }
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                    trace!("Relay port {} is in use", port);
                    last_error = Some(e);
                }
                Err(e) => return Err(ProxyError::Bind(e)),
            }
        }

        warn!("No free relay port in {}..={}", first, last);
        Err(ProxyError::Bind(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrInUse, "port range exhausted")
        })))
    }

    fn next_candidate(&self, first: u16, last: u16) -> u16 {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let next = match *cursor {
            None => first,
            Some(current) if current == last => first,
            Some(current) if first < last => current + 1,
            Some(current) => current - 1,
        };
        *cursor = Some(next);
        next
    }
}
