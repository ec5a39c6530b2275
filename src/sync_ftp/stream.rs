//! # Stream
//!
//! The control connection and the data connections opened for transfers
use std::io::{BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::command::Command;
use crate::{FtpError, FtpResult};

/// Control connection: commands are written to the socket, replies are read through a buffer
pub struct CommandStream {
    reader: BufReader<TcpStream>,
}

impl CommandStream {
    /// Try to connect to the remote server
    pub fn connect<A: ToSocketAddrs>(addr: A) -> FtpResult<Self> {
        trace!("Connecting to server");
        let stream = TcpStream::connect(addr).map_err(FtpError::ConnectionError)?;
        Ok(Self::from_tcp(stream))
    }

    /// Try to connect to the remote server but with the specified timeout
    pub fn connect_timeout<A: ToSocketAddrs>(addr: A, timeout: Duration) -> FtpResult<Self> {
        trace!("Connecting to server");
        let stream = tcp_connect_timeout(addr, timeout).map_err(FtpError::ConnectionError)?;
        Ok(Self::from_tcp(stream))
    }

    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            reader: BufReader::new(stream),
        }
    }

    pub fn local_addr(&self) -> FtpResult<SocketAddr> {
        self.get_ref().local_addr().map_err(FtpError::ConnectionError)
    }

    pub fn peer_addr(&self) -> FtpResult<SocketAddr> {
        self.get_ref().peer_addr().map_err(FtpError::ConnectionError)
    }

    /// Returns a reference to the underlying TcpStream.
    pub fn get_ref(&self) -> &TcpStream {
        self.reader.get_ref()
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> FtpResult<()> {
        self.get_ref()
            .set_read_timeout(timeout)
            .map_err(FtpError::ConnectionError)
    }

    /// Buffered reader over the replies
    pub fn reader(&mut self) -> &mut BufReader<TcpStream> {
        &mut self.reader
    }

    /// Whether a reply (or the end of the connection) can be read without blocking
    pub fn has_pending_reply(&self) -> bool {
        if !self.reader.buffer().is_empty() {
            return true;
        }
        let stream = self.get_ref();
        if stream.set_nonblocking(true).is_err() {
            // let the next read report the failure
            return true;
        }
        let mut byte = [0u8; 1];
        let pending = !matches!(
            stream.peek(&mut byte),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock
        );
        if let Err(e) = stream.set_nonblocking(false) {
            warn!("Failed to restore blocking mode on control stream: {}", e);
        }
        pending
    }

    /// Write one command line
    pub fn write_command(&mut self, command: &Command) -> FtpResult<()> {
        trace!("CC OUT: {}", command.loggable());

        let stream = self.reader.get_mut();
        write!(stream, "{command}\r\n").map_err(FtpError::ConnectionError)?;
        stream.flush().map_err(FtpError::ConnectionError)
    }

    /// Open a data connection to `addr`
    pub fn connect_data(&self, addr: SocketAddr, timeout: Duration) -> FtpResult<DataStream> {
        let data = TcpStream::connect_timeout(&addr, timeout).map_err(FtpError::ConnectionError)?;
        trace!("TCP Stream to data socket {} opened", addr);
        Ok(DataStream::from_tcp(data))
    }
}

impl std::fmt::Debug for CommandStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("CommandStream");
        if let Ok(peer) = self.peer_addr() {
            d.field("peer", &peer);
        }
        if let Ok(local) = self.local_addr() {
            d.field("local", &local);
        }
        d.finish()
    }
}

/// One data connection
pub struct DataStream {
    stream: TcpStream,
}

impl std::fmt::Debug for DataStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("DataStream");
        if let Ok(peer) = self.peer_addr() {
            d.field("peer", &peer);
        }
        if let Ok(local) = self.local_addr() {
            d.field("local", &local);
        }
        d.finish()
    }
}

impl DataStream {
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub fn get_ref(&self) -> &TcpStream {
        &self.stream
    }

    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> std::io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    /// Close both directions. Failure to shut down is logged, not returned,
    /// since the socket is released either way.
    pub fn close(self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            if e.kind() != std::io::ErrorKind::NotConnected {
                warn!("Failed to shut down data stream: {}", e);
            }
        }
        trace!("Data stream closed");
    }
}

impl Read for DataStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for DataStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}

fn tcp_connect_timeout<A: ToSocketAddrs>(addr: A, timeout: Duration) -> std::io::Result<TcpStream> {
    let addrs = addr
        .to_socket_addrs()?
        .map(|a| TcpStream::connect_timeout(&a, timeout));

    let mut result = std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        "could not resolve to any addresses",
    );
    for addr in addrs {
        match addr {
            Ok(a) => return Ok(a),
            Err(e) => result = e,
        }
    }

    Err(result)
}
