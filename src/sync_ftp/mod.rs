//! # Sync
//!
//! This module contains the synchronous FTP client

mod file;
mod lines;
mod response;
mod stream;
#[cfg(test)]
mod test;

use super::regex::{MDTM_RE, PASV_PORT_RE, SIZE_RE};
use super::types::{FileType, FtpError, FtpResult, Mode, Reply};
use super::Status;
use crate::command::Command;
use crate::list::DirEntry;
use crate::net;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::io::{copy, Cursor, Read};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

// export
pub use file::{FileDownload, FileUpload};
pub use lines::ListStream;
use stream::{CommandStream, DataStream};

/// How long an active mode listener waits for the server to connect
pub const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Negotiated data connection endpoint
#[derive(Debug)]
enum DataChannel {
    /// Neither `active()` nor `passive()` has succeeded yet
    Unset,
    /// The server connects to us; the listener is bound and announced on first use
    Active(Option<ActiveListener>),
    /// We connect to the address announced by `PASV`
    Passive(SocketAddrV4),
}

#[derive(Debug)]
struct ActiveListener {
    listener: TcpListener,
    addr: SocketAddrV4,
}

/// Stream to interface with the FTP server. This interface is only for the command stream.
#[derive(Debug)]
pub struct FtpStream {
    cmd_stream: CommandStream,
    data_channel: DataChannel,
    accept_timeout: Duration,
    welcome_msg: Option<String>,
}

impl FtpStream {
    /// Try to connect to the remote server
    pub fn connect<A: ToSocketAddrs>(addr: A) -> FtpResult<Self> {
        let stream = CommandStream::connect(addr)?;
        Self::initialise_stream(stream)
    }

    /// Try to connect to the remote server but with the specified timeout
    pub fn connect_timeout<A: ToSocketAddrs>(addr: A, timeout: Duration) -> FtpResult<Self> {
        let stream = CommandStream::connect_timeout(addr, timeout)?;
        Self::initialise_stream(stream)
    }

    /// Use an already connected control socket
    pub fn connect_with_stream(stream: TcpStream) -> FtpResult<Self> {
        Self::initialise_stream(CommandStream::from_tcp(stream))
    }

    fn initialise_stream(stream: CommandStream) -> FtpResult<Self> {
        let mut this = Self {
            cmd_stream: stream,
            data_channel: DataChannel::Unset,
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            welcome_msg: None,
        };
        trace!("Reading server response...");
        let welcome_msg = this.read_response(Status::Ready)?;
        trace!("Server READY; response: {:?}", welcome_msg);
        this.welcome_msg = Some(welcome_msg);
        Ok(this)
    }

    /// Select active mode; the listener is bound and announced with `PORT` on the first transfer
    pub fn active_mode(mut self) -> Self {
        trace!("Changed mode to {:?}", Mode::Active);
        self.data_channel = DataChannel::Active(None);
        self
    }

    /// Set how long to wait for a data connection: for the server to connect to the active mode
    /// listener, or for the connect to the passive mode endpoint to complete
    pub fn with_accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = timeout;
        self
    }

    /// Same as [`FtpStream::with_accept_timeout`]; bounds both active accepts and passive connects
    pub fn set_accept_timeout(&mut self, timeout: Duration) {
        self.accept_timeout = timeout;
    }

    pub fn accept_timeout(&self) -> Duration {
        self.accept_timeout
    }

    /// Current data transfer mode, `None` until negotiated
    pub fn mode(&self) -> Option<Mode> {
        match self.data_channel {
            DataChannel::Unset => None,
            DataChannel::Active(_) => Some(Mode::Active),
            DataChannel::Passive(_) => Some(Mode::Passive),
        }
    }

    /// Endpoint announced by the last successful `PASV`
    pub fn passive_addr(&self) -> Option<SocketAddr> {
        match &self.data_channel {
            DataChannel::Passive(addr) => Some(SocketAddr::V4(*addr)),
            _ => None,
        }
    }

    /// Endpoint announced by the last successful `PORT`
    pub fn active_addr(&self) -> Option<SocketAddr> {
        match &self.data_channel {
            DataChannel::Active(Some(active)) => Some(SocketAddr::V4(active.addr)),
            _ => None,
        }
    }

    /// Returns welcome message retrieved from server (if available)
    pub fn get_welcome_msg(&self) -> Option<&str> {
        self.welcome_msg.as_deref()
    }

    /// Returns a reference to the underlying TcpStream.
    ///
    /// Example:
    /// ```no_run
    /// use ftpgate::FtpStream;
    /// use std::time::Duration;
    ///
    /// let stream = FtpStream::connect("127.0.0.1:21")
    ///                        .expect("Couldn't connect to the server...");
    /// stream.get_ref().set_read_timeout(Some(Duration::from_secs(10)))
    ///                 .expect("set_read_timeout call failed");
    /// ```
    pub fn get_ref(&self) -> &TcpStream {
        self.cmd_stream.get_ref()
    }

    /// Set the read timeout of the control connection
    pub fn set_read_timeout(&mut self, timeout: Duration) -> FtpResult<()> {
        self.cmd_stream.set_read_timeout(Some(timeout))
    }

    /// Log in to the FTP server.
    pub fn login<S: AsRef<str>>(&mut self, user: S, password: S) -> FtpResult<()> {
        debug!("Signin in with user '{}'", user.as_ref());
        self.perform(Command::User(user.as_ref()))?;
        let reply = self.read_response_in(&[Status::LoggedIn, Status::NeedPassword])?;
        if reply.status == Status::NeedPassword {
            debug!("Password is required");
            self.perform(Command::Pass(password.as_ref()))?;
            self.read_response_in(&[Status::LoggedIn, Status::CommandNotImplemented])?;
        }
        debug!("Login OK");
        Ok(())
    }

    /// Change the current directory to the path specified.
    pub fn cwd<S: AsRef<str>>(&mut self, path: S) -> FtpResult<()> {
        debug!("Changing working directory to {}", path.as_ref());
        self.perform(Command::Cwd(path.as_ref()))?;
        self.read_response(Status::RequestedFileActionOk).map(|_| ())
    }

    /// Move the current directory to the parent directory.
    pub fn cdup(&mut self) -> FtpResult<()> {
        debug!("Going to parent directory");
        self.perform(Command::Cdup)?;
        self.read_response_in(&[Status::CommandOk, Status::RequestedFileActionOk])
            .map(|_| ())
    }

    /// Gets the current directory
    pub fn pwd(&mut self) -> FtpResult<String> {
        debug!("Getting working directory");
        self.perform(Command::Pwd)?;
        let reply = self.read_response_in(&[Status::PathCreated])?;
        match (reply.text.find('"'), reply.text.rfind('"')) {
            (Some(begin), Some(end)) if begin < end => Ok(reply.text[begin + 1..end].to_string()),
            _ => Err(FtpError::UnexpectedResponse(reply)),
        }
    }

    /// This does nothing. This is usually just used to keep the connection open.
    pub fn noop(&mut self) -> FtpResult<()> {
        debug!("Pinging server");
        self.perform(Command::Noop)?;
        self.read_response(Status::CommandOk).map(|_| ())
    }

    /// This creates a new directory on the server.
    pub fn mkdir<S: AsRef<str>>(&mut self, pathname: S) -> FtpResult<()> {
        debug!("Creating directory at {}", pathname.as_ref());
        self.perform(Command::Mkd(pathname.as_ref()))?;
        self.read_response(Status::PathCreated).map(|_| ())
    }

    /// Removes the remote pathname from the server.
    pub fn rmdir<S: AsRef<str>>(&mut self, pathname: S) -> FtpResult<()> {
        debug!("Removing directory {}", pathname.as_ref());
        self.perform(Command::Rmd(pathname.as_ref()))?;
        self.read_response(Status::RequestedFileActionOk).map(|_| ())
    }

    /// Remove the remote file from the server.
    pub fn delete<S: AsRef<str>>(&mut self, filename: S) -> FtpResult<()> {
        debug!("Removing file {}", filename.as_ref());
        self.perform(Command::Dele(filename.as_ref()))?;
        self.read_response(Status::RequestedFileActionOk).map(|_| ())
    }

    /// Renames the file from_name to to_name
    pub fn rename<S: AsRef<str>>(&mut self, from_name: S, to_name: S) -> FtpResult<()> {
        debug!("Renaming '{}' to '{}'", from_name.as_ref(), to_name.as_ref());
        self.perform(Command::RenameFrom(from_name.as_ref()))?;
        self.read_response(Status::RequestFilePending)?;
        self.perform(Command::RenameTo(to_name.as_ref()))?;
        self.read_response(Status::RequestedFileActionOk).map(|_| ())
    }

    /// Send a server specific `SITE` command. Any positive completion reply is accepted.
    pub fn site<S: AsRef<str>>(&mut self, command: S) -> FtpResult<Reply> {
        debug!("SITE {}", command.as_ref());
        self.perform(Command::Site(command.as_ref()))?;
        let reply = response::receive_reply(self.cmd_stream.reader())?;
        if reply.status.is_positive_completion() {
            Ok(reply)
        } else {
            Err(FtpError::UnexpectedResponse(reply))
        }
    }

    /// Sets the type of file to be transferred. That is the implementation
    /// of `TYPE` command.
    pub fn transfer_type(&mut self, file_type: FileType) -> FtpResult<()> {
        debug!("Setting transfer type {}", file_type);
        self.perform(Command::Type(file_type))?;
        self.read_response(Status::CommandOk).map(|_| ())
    }

    /// Quits the current FTP session.
    pub fn quit(&mut self) -> FtpResult<()> {
        debug!("Quitting stream");
        self.perform(Command::Quit)?;
        self.read_response(Status::Closing).map(|_| ())
    }

    /// Retrieves the modification time of the file at `pathname` if it exists.
    pub fn mdtm<S: AsRef<str>>(&mut self, pathname: S) -> FtpResult<NaiveDateTime> {
        debug!("Getting modification time for {}", pathname.as_ref());
        self.perform(Command::Mdtm(pathname.as_ref()))?;
        let body = self.read_response(Status::File)?;

        let caps = MDTM_RE.captures(&body).ok_or(FtpError::BadResponse)?;
        let field = |i: usize| caps[i].parse::<u32>().map_err(|_| FtpError::BadResponse);
        let year = caps[1].parse::<i32>().map_err(|_| FtpError::BadResponse)?;

        let date = NaiveDate::from_ymd_opt(year, field(2)?, field(3)?).ok_or(FtpError::BadResponse)?;
        let time =
            NaiveTime::from_hms_opt(field(4)?, field(5)?, field(6)?).ok_or(FtpError::BadResponse)?;

        Ok(NaiveDateTime::new(date, time))
    }

    /// Retrieves the size of the file in bytes at `pathname` if it exists.
    pub fn size<S: AsRef<str>>(&mut self, pathname: S) -> FtpResult<u64> {
        debug!("Getting file size for {}", pathname.as_ref());
        self.perform(Command::Size(pathname.as_ref()))?;
        let body = self.read_response(Status::File)?;

        let caps = SIZE_RE.captures(&body).ok_or(FtpError::BadResponse)?;
        caps[1].parse().map_err(|_| FtpError::BadResponse)
    }

    /// Enter passive mode.
    ///
    /// Closes the active mode listener if any, sends `PASV` and remembers the announced endpoint.
    pub fn passive(&mut self) -> FtpResult<SocketAddr> {
        debug!("PASV command");
        self.close_active_listener();
        self.perform(Command::Pasv)?;
        // PASV response format : 227 Entering Passive Mode (h1,h2,h3,h4,p1,p2).
        let body = self.read_response(Status::PassiveMode)?;
        let addr = parse_pasv(&body)?;
        trace!("Passive address: {}", addr);
        self.data_channel = DataChannel::Passive(addr);
        Ok(SocketAddr::V4(addr))
    }

    /// Enter active mode.
    ///
    /// Binds a listener on the control connection's local address and `port` (0 lets the OS choose),
    /// and announces it with `PORT`. Any previous listener or passive endpoint is dropped first.
    pub fn active(&mut self, port: u16) -> FtpResult<SocketAddr> {
        debug!("Starting local tcp listener...");
        self.data_channel = match self.data_channel {
            DataChannel::Active(_) => DataChannel::Active(None),
            _ => DataChannel::Unset,
        };

        let ip = match self.cmd_stream.local_addr()? {
            SocketAddr::V4(local) => *local.ip(),
            other => return Err(FtpError::UnsupportedAddress(other)),
        };
        let listener = TcpListener::bind(SocketAddrV4::new(ip, port))?;
        let addr = match listener.local_addr()? {
            SocketAddr::V4(addr) => addr,
            other => return Err(FtpError::UnsupportedAddress(other)),
        };
        trace!("Local address is {}", addr);

        debug!("Running PORT command");
        self.perform(Command::Port(addr))?;
        self.read_response(Status::CommandOk)?;

        debug!("Active mode, listening on {}", addr);
        self.data_channel = DataChannel::Active(Some(ActiveListener { listener, addr }));
        Ok(SocketAddr::V4(addr))
    }

    /// Release the active mode listener, if any. Never fails.
    pub fn dispose(&mut self) {
        debug!("Disposing data channel resources");
        self.close_active_listener();
    }

    /// Open `filename` for writing on the server. Write the content to the returned stream,
    /// then call [`FileUpload::finish`].
    pub fn store<S: AsRef<str>>(&mut self, filename: S) -> FtpResult<FileUpload<'_>> {
        debug!("Put file {}", filename.as_ref());
        let stream = self.binary_data_command(Command::Store(filename.as_ref()))?;
        Ok(FileUpload::new(self, stream))
    }

    /// Open `filename` for appending. Same contract as [`FtpStream::store`].
    pub fn append<S: AsRef<str>>(&mut self, filename: S) -> FtpResult<FileUpload<'_>> {
        debug!("Appending to file {}", filename.as_ref());
        let stream = self.binary_data_command(Command::Appe(filename.as_ref()))?;
        Ok(FileUpload::new(self, stream))
    }

    /// Open `filename` for reading. Read the content from the returned stream,
    /// then call [`FileDownload::finish`].
    pub fn retrieve<S: AsRef<str>>(&mut self, filename: S) -> FtpResult<FileDownload<'_>> {
        debug!("Retrieving '{}'", filename.as_ref());
        let stream = self.binary_data_command(Command::Retr(filename.as_ref()))?;
        Ok(FileDownload::new(self, stream))
    }

    /// This stores a file on the server.
    /// Returns amount of written bytes
    pub fn put_file<S: AsRef<str>, R: Read>(&mut self, filename: S, r: &mut R) -> FtpResult<u64> {
        let mut upload = self.store(filename)?;
        let bytes = copy(r, &mut upload).map_err(FtpError::ConnectionError)?;
        upload.finish()?;
        Ok(bytes)
    }

    /// The implementation of `RETR` command where `filename` is the name of the file
    /// to download from FTP and `reader` is the function which operates with the
    /// data stream opened.
    pub fn retr<F, D>(&mut self, file_name: &str, mut reader: F) -> FtpResult<D>
    where
        F: FnMut(&mut dyn Read) -> FtpResult<D>,
    {
        let mut stream = self.retrieve(file_name)?;
        let result = reader(&mut stream)?;
        stream.finish()?;
        Ok(result)
    }

    /// Simple way to retr a file from the server. This stores the file in a buffer in memory.
    pub fn retr_as_buffer(&mut self, file_name: &str) -> FtpResult<Cursor<Vec<u8>>> {
        self.retr(file_name, |reader| {
            let mut buffer = Vec::new();
            reader
                .read_to_end(&mut buffer)
                .map(|_| buffer)
                .map_err(FtpError::ConnectionError)
        })
        .map(Cursor::new)
    }

    /// Execute `LIST` command which returns the detailed file listing in human readable format.
    /// If `pathname` is omited then the list of files in the current directory will be
    /// returned otherwise it will the list of files on `pathname`.
    ///
    /// Lines are read lazily from the data connection; the final reply is consumed
    /// once the listing ends.
    pub fn list(&mut self, pathname: Option<&str>) -> FtpResult<ListStream<'_>> {
        debug!("Reading {} directory content", pathname.unwrap_or("working"));
        let stream = self.binary_data_command(Command::List(pathname))?;
        Ok(ListStream::new(self, stream))
    }

    /// Execute `NLST` command which returns the list of file names only.
    /// If `pathname` is omited then the list of files in the current directory will be
    /// returned otherwise it will the list of files on `pathname`.
    pub fn nlist(&mut self, pathname: Option<&str>) -> FtpResult<ListStream<'_>> {
        debug!("Getting file names for {} directory", pathname.unwrap_or("working"));
        let stream = self.binary_data_command(Command::Nlst(pathname))?;
        Ok(ListStream::new(self, stream))
    }

    /// `LIST` with every line parsed into a [`DirEntry`]
    pub fn list_entries(
        &mut self,
        pathname: Option<&str>,
    ) -> FtpResult<impl Iterator<Item = FtpResult<DirEntry>> + '_> {
        Ok(self
            .list(pathname)?
            .map(|line| line.and_then(|l| DirEntry::parse(&l).map_err(FtpError::from))))
    }

    /// Read the next reply and return its text if its status is `expected_code`
    pub fn read_response(&mut self, expected_code: Status) -> FtpResult<String> {
        self.read_response_in(&[expected_code]).map(|reply| reply.text)
    }

    /// Read the next non-preliminary reply and return it if its status is one of `expected_code`
    pub fn read_response_in(&mut self, expected_code: &[Status]) -> FtpResult<Reply> {
        let reply = response::receive_reply(self.cmd_stream.reader())?;
        trace!("Code parsed from response: {}", reply.status);
        response::expect_in(reply, expected_code)
    }

    // -- crate

    /// Close a data stream, then read the transfer completion reply
    pub(crate) fn finalize_data_stream(&mut self, stream: DataStream) -> FtpResult<()> {
        debug!("Finalizing data stream");
        // must be closed first, otherwise the server won't send the reply
        stream.close();
        self.read_response_in(&[
            Status::ClosingDataConnection,
            Status::RequestedFileActionOk,
        ])
        .map(|_| ())
    }

    /// Close a data stream after a failure and drain whatever reply the server sends
    pub(crate) fn abandon_data_stream(&mut self, stream: DataStream) {
        stream.close();
        match response::receive_reply(self.cmd_stream.reader()) {
            Ok(reply) => debug!("Abandoned transfer ended with {}", reply),
            Err(e) => warn!("Could not read reply of abandoned transfer: {}", e),
        }
    }

    // -- private

    fn close_active_listener(&mut self) {
        if let DataChannel::Active(listener) = &mut self.data_channel {
            if let Some(active) = listener.take() {
                trace!("Closing active listener on {}", active.addr);
            }
        }
    }

    /// Write data to stream with command to perform
    fn perform(&mut self, command: Command) -> FtpResult<()> {
        self.cmd_stream.write_command(&command)
    }

    /// Switch to binary, then run a data command
    fn binary_data_command(&mut self, cmd: Command) -> FtpResult<DataStream> {
        if let DataChannel::Unset = self.data_channel {
            return Err(FtpError::ModeNotSet);
        }
        self.transfer_type(FileType::Binary)?;
        self.data_command(cmd)
    }

    /// Execute command which send data back in a separate stream.
    ///
    /// Passive: connect, then send the command. Active: send the command, then accept.
    /// The preliminary reply is read once the data connection is up.
    fn data_command(&mut self, cmd: Command) -> FtpResult<DataStream> {
        let (stream, preliminary) = match self.data_channel {
            DataChannel::Unset => return Err(FtpError::ModeNotSet),
            DataChannel::Passive(addr) => {
                let stream = self
                    .cmd_stream
                    .connect_data(SocketAddr::V4(addr), self.accept_timeout)?;
                self.perform(cmd)?;
                (stream, None)
            }
            DataChannel::Active(_) => {
                if let DataChannel::Active(None) = self.data_channel {
                    self.active(0)?;
                }
                self.perform(cmd)?;
                self.accept_data_connection()?
            }
        };

        let preliminary = match preliminary {
            Some(reply) => reply,
            None => response::receive_one_reply(self.cmd_stream.reader())?,
        };
        response::expect_in(preliminary, &[Status::AboutToSend, Status::AlreadyOpen])?;

        Ok(stream)
    }

    /// Wait for the server to connect to the active listener while watching the control channel.
    ///
    /// A preliminary reply arriving first is returned along with the connection; any other reply
    /// means the server refused the transfer and is returned as `UnexpectedResponse`.
    fn accept_data_connection(&mut self) -> FtpResult<(DataStream, Option<Reply>)> {
        let deadline = Instant::now() + self.accept_timeout;
        let mut preliminary = None;
        loop {
            let DataChannel::Active(Some(active)) = &self.data_channel else {
                return Err(FtpError::ModeNotSet);
            };
            let cmd_stream = &self.cmd_stream;
            let accepted = net::accept_until(&active.listener, Some(deadline), || {
                cmd_stream.has_pending_reply()
            })?;
            if let Some((stream, peer)) = accepted {
                trace!("Accepted data connection from {}", peer);
                return Ok((DataStream::from_tcp(stream), preliminary));
            }

            let reply = response::receive_one_reply(self.cmd_stream.reader())?;
            if !reply.status.is_preliminary() {
                debug!("Transfer refused before the data connection opened: {}", reply);
                return Err(FtpError::UnexpectedResponse(reply));
            }
            if preliminary.is_none() {
                preliminary = Some(reply);
            } else {
                trace!("Skipping preliminary reply {}", reply);
            }
        }
    }
}

/// Extract the endpoint from the text of a `227` reply
fn parse_pasv(body: &str) -> FtpResult<SocketAddrV4> {
    let caps = PASV_PORT_RE.captures(body).ok_or(FtpError::BadResponse)?;
    let mut octets = [0u8; 6];
    for (i, octet) in octets.iter_mut().enumerate() {
        *octet = caps[i + 1].parse::<u8>().map_err(|_| FtpError::BadResponse)?;
    }
    let ip = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
    let port = (u16::from(octets[4]) << 8) | u16::from(octets[5]);
    Ok(SocketAddrV4::new(ip, port))
}
