//! # Types
//!
//! Errors, replies and the set of valid values for FTP commands

use super::list::ParseError;
use super::Status;
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;

/// A shorthand for a Result whose error type is always an FtpError.
pub type FtpResult<T> = std::result::Result<T, FtpError>;

/// A shorthand for a Result whose error type is always a ProxyError.
pub type ProxyResult<T> = std::result::Result<T, ProxyError>;

/// `FtpError` is a library-global error type to describe the different kinds of
/// errors that might occur while using FTP.
#[derive(Debug, Error)]
pub enum FtpError {
    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(std::io::Error),
    /// Unexpected response from remote. The command expected a certain response, but got another one.
    /// This means the ftp server refused to perform your request or there was an error while processing it.
    /// Contains the response data.
    #[error("Invalid response: {0}")]
    UnexpectedResponse(Reply),
    /// The response syntax is invalid
    #[error("Response contains an invalid syntax")]
    BadResponse,
    /// The control connection was closed in the middle of a reply
    #[error("Connection closed while waiting for a reply")]
    UnexpectedEof,
    /// A directory listing line could not be parsed
    #[error("Invalid listing line: {0}")]
    BadListing(ParseError),
    /// A data connection was requested before choosing active or passive mode
    #[error("Data transfer mode has not been negotiated")]
    ModeNotSet,
    /// PORT and PASV only describe IPv4 endpoints
    #[error("Unsupported address: {0}")]
    UnsupportedAddress(SocketAddr),
}

impl From<std::io::Error> for FtpError {
    fn from(value: std::io::Error) -> Self {
        Self::ConnectionError(value)
    }
}

impl From<ParseError> for FtpError {
    fn from(value: ParseError) -> Self {
        Self::BadListing(value)
    }
}

/// Errors raised by the data connection proxy and its port allocator
#[derive(Debug, Error)]
pub enum ProxyError {
    /// No port of the configured range could be bound
    #[error("Could not bind relay listener: {0}")]
    Bind(std::io::Error),
    /// I/O failure while setting up the relay
    #[error("Relay I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The port range is frozen once configured or used
    #[error("Port range has already been configured")]
    RangeAlreadyConfigured,
    /// Port 0 may only appear as `(0, 0)`
    #[error("Invalid port range {0}..={1}")]
    InvalidRange(u16, u16),
}

/// One complete reply read from the control channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    /// Reply text; continuation lines are joined with `\n`
    pub text: String,
}

impl Reply {
    pub fn new(status: Status, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
        }
    }

    pub fn code(&self) -> u32 {
        self.status.code()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status, self.text)
    }
}

/// Text Format Control used in `TYPE` command
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormatControl {
    /// Default text format control (is NonPrint)
    Default,
    /// Non-print (not destined for printing)
    NonPrint,
    /// Telnet format control (\<CR\>, \<FF\>, etc.)
    Telnet,
    /// ASA (Fortran) Carriage Control
    Asa,
}

impl std::fmt::Display for FormatControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatControl::Default | FormatControl::NonPrint => f.pad("N"),
            FormatControl::Telnet => f.pad("T"),
            FormatControl::Asa => f.pad("C"),
        }
    }
}

/// File Type used in `TYPE` command
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileType {
    /// ASCII text (the argument is the text format control)
    Ascii(FormatControl),
    /// Image,
    Image,
    /// Binary (the synonym to Image)
    Binary,
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileType::Ascii(fc) => write!(f, "A {}", fc),
            FileType::Image | FileType::Binary => write!(f, "I"),
        }
    }
}

/// Connection mode for data channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The client listens and the server connects
    Active,
    /// The client connects to the endpoint advertised by `PASV`
    Passive,
}
