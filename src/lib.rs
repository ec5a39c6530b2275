#![crate_name = "ftpgate"]
#![crate_type = "lib"]

//! # ftpgate
//!
//! ftpgate is a synchronous FTP client engine together with a relay for FTP data connections.
//!
//! - [`FtpStream`] drives the control connection: login, navigation, store/retrieve,
//!   directory listings and active/passive data connection negotiation.
//! - [`list::DirEntry`] parses and renders UNIX `ls -l` style listing lines.
//! - [`proxy::DataConnectionProxy`] accepts FTP data connections on a port drawn from a
//!   shared [`proxy::PortAllocator`] and relays them to a remote data endpoint.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ftpgate::FtpStream;
//! use std::io::Read;
//!
//! let mut ftp_stream = FtpStream::connect("127.0.0.1:21").unwrap();
//! ftp_stream.login("test", "test").unwrap();
//! ftp_stream.passive().unwrap();
//!
//! let mut download = ftp_stream.retrieve("readme.txt").unwrap();
//! let mut body = String::new();
//! download.read_to_string(&mut body).unwrap();
//! download.finish().unwrap();
//!
//! for line in ftp_stream.list(None).unwrap() {
//!     println!("{}", line.unwrap());
//! }
//!
//! ftp_stream.quit().unwrap();
//! ```
//!
//! ## Data connection proxy
//!
//! ```rust,no_run
//! use ftpgate::proxy::{DataConnectionProxy, PortAllocator};
//! use std::sync::Arc;
//!
//! let ports = Arc::new(PortAllocator::with_range(50000, 50100).unwrap());
//! let mut proxy = DataConnectionProxy::new(ports);
//! let local = proxy
//!     .start("0.0.0.0".parse().unwrap(), "10.0.0.5:20".parse().unwrap())
//!     .unwrap();
//! println!("advertise {local} to the client");
//! proxy.stop();
//! ```

// -- common deps
#[macro_use]
extern crate log;

// -- private
pub(crate) mod command;
mod net;
mod regex;
mod status;
mod sync_ftp;

// -- public
pub mod list;
pub mod proxy;
pub mod types;

// -- export
pub use status::Status;
pub use sync_ftp::{FileDownload, FileUpload, FtpStream, ListStream, DEFAULT_ACCEPT_TIMEOUT};
pub use types::{FtpError, FtpResult, Mode, ProxyError, ProxyResult, Reply};

// -- test logging
#[cfg(test)]
pub fn log_init() {
    let _ = env_logger::builder().is_test(true).try_init();
}
