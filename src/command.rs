//! # Command
//!
//! The set of FTP commands

use crate::types::FileType;

use std::net::SocketAddrV4;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Ftp commands with their arguments
pub enum Command<'a> {
    /// Append to file
    Appe(&'a str),
    /// Change directory to parent directory
    Cdup,
    /// Change working directory
    Cwd(&'a str),
    /// Remove file at specified path
    Dele(&'a str),
    /// List entries at specified path. If path is not provided list entries at current working directory
    List(Option<&'a str>),
    /// Get modification time for file at specified path
    Mdtm(&'a str),
    /// Make directory
    Mkd(&'a str),
    /// Get the list of file names at specified path. If path is not provided list entries at current working directory
    Nlst(Option<&'a str>),
    /// Ping server
    Noop,
    /// Provide login password
    Pass(&'a str),
    /// Passive mode
    Pasv,
    /// Specifies an address and port to which the server should connect (active mode)
    Port(SocketAddrV4),
    /// Print working directory
    Pwd,
    /// Quit
    Quit,
    /// Select file to rename
    RenameFrom(&'a str),
    /// Rename selected file to
    RenameTo(&'a str),
    /// Retrieve file
    Retr(&'a str),
    /// Remove directory
    Rmd(&'a str),
    /// Server specific command
    Site(&'a str),
    /// Get file size of specified path
    Size(&'a str),
    /// Put file at specified path
    Store(&'a str),
    /// Set transfer type
    Type(FileType),
    /// Provide user to login as
    User(&'a str),
}

impl Command<'_> {
    /// The line as it may appear in logs; passwords are masked
    pub fn loggable(&self) -> String {
        match self {
            Self::Pass(_) => "PASS ******".to_string(),
            other => other.to_string(),
        }
    }
}

/// Render an IPv4 endpoint as the six comma-separated octets used by `PORT` and `PASV`
pub fn encode_host_port(addr: &SocketAddrV4) -> String {
    let msb = addr.port() / 256;
    let lsb = addr.port() % 256;
    let oct = addr.ip().octets();

    format!("{},{},{},{},{},{}", oct[0], oct[1], oct[2], oct[3], msb, lsb)
}

impl std::fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Appe(p) => write!(f, "APPE {p}"),
            Self::Cdup => write!(f, "CDUP"),
            Self::Cwd(d) => write!(f, "CWD {d}"),
            Self::Dele(p) => write!(f, "DELE {p}"),
            Self::List(Some(p)) => write!(f, "LIST {p}"),
            Self::List(None) => write!(f, "LIST"),
            Self::Mdtm(p) => write!(f, "MDTM {p}"),
            Self::Mkd(p) => write!(f, "MKD {p}"),
            Self::Nlst(Some(p)) => write!(f, "NLST {p}"),
            Self::Nlst(None) => write!(f, "NLST"),
            Self::Noop => write!(f, "NOOP"),
            Self::Pass(p) => write!(f, "PASS {p}"),
            Self::Pasv => write!(f, "PASV"),
            Self::Port(addr) => write!(f, "PORT {}", encode_host_port(addr)),
            Self::Pwd => write!(f, "PWD"),
            Self::Quit => write!(f, "QUIT"),
            Self::RenameFrom(p) => write!(f, "RNFR {p}"),
            Self::RenameTo(p) => write!(f, "RNTO {p}"),
            Self::Retr(p) => write!(f, "RETR {p}"),
            Self::Rmd(p) => write!(f, "RMD {p}"),
            Self::Site(c) => write!(f, "SITE {c}"),
            Self::Size(p) => write!(f, "SIZE {p}"),
            Self::Store(p) => write!(f, "STOR {p}"),
            Self::Type(t) => write!(f, "TYPE {t}"),
            Self::User(u) => write!(f, "USER {u}"),
        }
    }
}
