use crate::list::DirEntry;
use crate::types::{FileType, FormatControl};
use crate::{FtpError, FtpStream, Mode, Status};

use pretty_assertions::assert_eq;
use std::io::{BufRead, BufReader, Cursor, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const SERVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Scripted FTP server serving one control connection on localhost
struct MockServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl MockServer {
    fn start<F>(script: F) -> Self
    where
        F: FnOnce(&mut Session) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            stream.set_read_timeout(Some(SERVER_TIMEOUT)).unwrap();
            let mut session = Session {
                reader: BufReader::new(stream.try_clone().unwrap()),
                writer: stream,
                passive: None,
            };
            script(&mut session);
        });
        Self { addr, handle }
    }

    fn connect(&self) -> FtpStream {
        FtpStream::connect(self.addr).unwrap()
    }

    /// Wait for the script to end, surfacing its assertion failures
    fn join(self) {
        self.handle.join().unwrap();
    }
}

struct Session {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    passive: Option<TcpListener>,
}

impl Session {
    fn reply(&mut self, line: &str) {
        write!(self.writer, "{line}\r\n").unwrap();
        self.writer.flush().unwrap();
    }

    fn command(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        line.trim_end_matches(['\r', '\n']).to_string()
    }

    fn expect(&mut self, command: &str) {
        assert_eq!(self.command().as_str(), command);
    }

    /// Wait for the client to close the control connection
    fn expect_closed(&mut self) {
        assert_eq!(self.command().as_str(), "");
    }

    fn expect_reply(&mut self, command: &str, reply: &str) {
        self.expect(command);
        self.reply(reply);
    }

    /// Answer `PASV` with a freshly bound data listener
    fn passive(&mut self) -> SocketAddrV4 {
        self.expect("PASV");
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        self.passive = Some(listener);
        self.reply(&format!(
            "227 Entering Passive Mode (127,0,0,1,{},{}).",
            port >> 8,
            port & 0xff
        ));
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
    }

    /// Answer `PORT` and return the announced endpoint
    fn port(&mut self) -> SocketAddrV4 {
        let command = self.command();
        let args = command.strip_prefix("PORT ").unwrap();
        let n: Vec<u8> = args.split(',').map(|x| x.parse().unwrap()).collect();
        assert_eq!(n.len(), 6);
        self.reply("200 PORT command successful");
        SocketAddrV4::new(
            Ipv4Addr::new(n[0], n[1], n[2], n[3]),
            (u16::from(n[4]) << 8) | u16::from(n[5]),
        )
    }

    fn accept_data(&mut self) -> TcpStream {
        let (stream, _) = self.passive.as_ref().unwrap().accept().unwrap();
        stream.set_read_timeout(Some(SERVER_TIMEOUT)).unwrap();
        stream
    }
}

fn connect_data(addr: SocketAddrV4) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(SERVER_TIMEOUT)).unwrap();
    stream
}

#[test]
fn should_login_and_navigate() {
    crate::log_init();
    let server = MockServer::start(|s| {
        s.reply("220 mock ready");
        s.expect_reply("USER test", "331 Password required");
        s.expect_reply("PASS secret", "230 Logged in");
        s.expect_reply("PWD", "257 \"/home/test\" is the current directory");
        s.expect_reply("CWD docs", "250 Directory changed");
        s.expect_reply("CDUP", "200 Directory changed");
        s.expect_reply("QUIT", "221 Goodbye");
    });

    let mut ftp_stream = server.connect();
    assert_eq!(ftp_stream.get_welcome_msg(), Some("mock ready"));
    assert_eq!(ftp_stream.mode(), None);
    ftp_stream.login("test", "secret").unwrap();
    assert_eq!(ftp_stream.pwd().unwrap().as_str(), "/home/test");
    ftp_stream.cwd("docs").unwrap();
    ftp_stream.cdup().unwrap();
    ftp_stream.quit().unwrap();
    server.join();
}

#[test]
fn should_report_rejected_login() {
    crate::log_init();
    let server = MockServer::start(|s| {
        s.reply("220 mock ready");
        s.expect_reply("USER test", "331 Password required");
        s.expect_reply("PASS wrong", "530 Login incorrect");
    });

    let mut ftp_stream = server.connect();
    match ftp_stream.login("test", "wrong") {
        Err(FtpError::UnexpectedResponse(reply)) => {
            assert_eq!(reply.status, Status::NotLoggedIn);
            assert_eq!(reply.text.as_str(), "Login incorrect");
        }
        other => panic!("Expected UnexpectedResponse, got {:?}", other),
    }
    server.join();
}

#[test]
fn should_read_multiline_welcome() {
    crate::log_init();
    let server = MockServer::start(|s| {
        s.reply("220-Welcome");
        s.reply("second line");
        s.reply("220 Ready");
        s.expect_reply("NOOP", "200 OK");
    });

    let mut ftp_stream = server.connect();
    assert_eq!(
        ftp_stream.get_welcome_msg(),
        Some("Welcome\nsecond line\nReady")
    );
    ftp_stream.noop().unwrap();
    server.join();
}

#[test]
fn should_retrieve_in_passive_mode() {
    crate::log_init();
    let server = MockServer::start(|s| {
        s.reply("220 mock ready");
        s.passive();
        s.expect_reply("TYPE I", "200 Type set to I");
        s.expect_reply("RETR readme.txt", "150 Opening BINARY mode data connection");
        let mut data = s.accept_data();
        data.write_all(b"hello from the server\n").unwrap();
        drop(data);
        s.reply("226 Transfer complete");
        s.expect_reply("NOOP", "200 OK");
    });

    let mut ftp_stream = server.connect();
    let addr = ftp_stream.passive().unwrap();
    assert_eq!(ftp_stream.mode(), Some(Mode::Passive));
    assert_eq!(ftp_stream.passive_addr(), Some(addr));
    let buffer = ftp_stream.retr_as_buffer("readme.txt").unwrap();
    assert_eq!(buffer.into_inner(), b"hello from the server\n".to_vec());
    ftp_stream.noop().unwrap();
    server.join();
}

#[test]
fn should_store_and_append_in_passive_mode() {
    crate::log_init();
    let server = MockServer::start(|s| {
        s.reply("220 mock ready");
        s.passive();
        s.expect_reply("TYPE I", "200 Type set to I");
        s.expect_reply("STOR upload.bin", "150 Ok to send data");
        let mut received = Vec::new();
        s.accept_data().read_to_end(&mut received).unwrap();
        assert_eq!(received, b"0123456789".to_vec());
        s.reply("226 Transfer complete");

        s.expect_reply("TYPE I", "200 Type set to I");
        s.expect_reply("APPE upload.bin", "125 Data connection already open");
        let mut received = Vec::new();
        s.accept_data().read_to_end(&mut received).unwrap();
        assert_eq!(received, b"tail".to_vec());
        s.reply("226 Transfer complete");
    });

    let mut ftp_stream = server.connect();
    ftp_stream.passive().unwrap();
    let written = ftp_stream
        .put_file("upload.bin", &mut Cursor::new(b"0123456789".to_vec()))
        .unwrap();
    assert_eq!(written, 10);

    let mut upload = ftp_stream.append("upload.bin").unwrap();
    upload.write_all(b"tail").unwrap();
    upload.finish().unwrap();
    server.join();
}

#[test]
fn should_list_in_active_mode() {
    crate::log_init();
    let server = MockServer::start(|s| {
        s.reply("220 mock ready");
        let announced = s.port();
        s.expect_reply("TYPE I", "200 Type set to I");
        s.expect_reply("LIST", "150 Here comes the directory listing");
        let mut data = connect_data(announced);
        data.write_all(b"first\r\n\r\nsecond\n").unwrap();
        drop(data);
        s.reply("226 Directory send OK");
        s.passive();
    });

    let mut ftp_stream = server.connect();
    let local = ftp_stream.active(0).unwrap();
    assert_eq!(ftp_stream.mode(), Some(Mode::Active));
    assert_eq!(ftp_stream.active_addr(), Some(local));
    let lines: Vec<String> = ftp_stream
        .list(None)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(lines, vec!["first".to_string(), "second".to_string()]);

    // the listener is kept for the next transfer until released
    assert_eq!(ftp_stream.active_addr(), Some(local));
    ftp_stream.dispose();
    assert_eq!(ftp_stream.active_addr(), None);
    assert_eq!(ftp_stream.mode(), Some(Mode::Active));

    ftp_stream.passive().unwrap();
    assert_eq!(ftp_stream.mode(), Some(Mode::Passive));
    server.join();
}

#[test]
fn should_bind_listener_on_first_active_transfer() {
    crate::log_init();
    let server = MockServer::start(|s| {
        s.reply("220 mock ready");
        s.expect_reply("TYPE I", "200 Type set to I");
        let announced = s.port();
        s.expect_reply("NLST pub", "150 Here comes the listing");
        let mut data = connect_data(announced);
        data.write_all(b"a.txt\r\nb.txt\r\n").unwrap();
        drop(data);
        s.reply("226 Transfer complete");
    });

    let mut ftp_stream = server.connect().active_mode();
    assert_eq!(ftp_stream.mode(), Some(Mode::Active));
    assert_eq!(ftp_stream.active_addr(), None);
    let names: Vec<String> = ftp_stream
        .nlist(Some("pub"))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(names, vec!["a.txt".to_string(), "b.txt".to_string()]);
    assert!(ftp_stream.active_addr().is_some());
    server.join();
}

#[test]
fn should_parse_listing_entries() {
    crate::log_init();
    let server = MockServer::start(|s| {
        s.reply("220 mock ready");
        s.passive();
        s.expect_reply("TYPE I", "200 Type set to I");
        s.expect_reply("LIST /pub", "150 Here comes the directory listing");
        let mut data = s.accept_data();
        data.write_all(
            b"-rw-r--r--   1 ftp      ftp          1024 Jan 15  2020 notes.txt\r\n\
              drwxr-xr-x   2 ftp      ftp          4096 Mar  3  2019 archive\r\n\
              total 8\r\n",
        )
        .unwrap();
        drop(data);
        s.reply("226 Directory send OK");
    });

    let mut ftp_stream = server.connect();
    ftp_stream.passive().unwrap();
    let entries: Vec<_> = ftp_stream.list_entries(Some("/pub")).unwrap().collect();
    assert_eq!(entries.len(), 3);

    let notes: &DirEntry = entries[0].as_ref().unwrap();
    assert_eq!(notes.name(), "notes.txt");
    assert_eq!(notes.length(), 1024);
    assert!(!notes.is_dir());
    let archive = entries[1].as_ref().unwrap();
    assert_eq!(archive.name(), "archive");
    assert!(archive.is_dir());
    assert!(matches!(entries[2], Err(FtpError::BadListing(_))));
    server.join();
}

#[test]
fn should_require_data_mode() {
    crate::log_init();
    let server = MockServer::start(|s| {
        s.reply("220 mock ready");
        // nothing may be sent before the mode is set
        s.expect_reply("NOOP", "200 OK");
    });

    let mut ftp_stream = server.connect();
    assert!(matches!(ftp_stream.retrieve("x"), Err(FtpError::ModeNotSet)));
    assert!(matches!(ftp_stream.list(None), Err(FtpError::ModeNotSet)));
    ftp_stream.noop().unwrap();
    server.join();
}

#[test]
fn should_reject_malformed_pasv_reply() {
    crate::log_init();
    let server = MockServer::start(|s| {
        s.reply("220 mock ready");
        s.expect_reply("PASV", "227 Entering Passive Mode (127,0,1)");
    });

    let mut ftp_stream = server.connect();
    assert!(matches!(ftp_stream.passive(), Err(FtpError::BadResponse)));
    assert_eq!(ftp_stream.mode(), None);
    server.join();
}

#[test]
fn should_report_refused_transfer() {
    crate::log_init();
    let server = MockServer::start(|s| {
        s.reply("220 mock ready");
        s.passive();
        s.expect_reply("TYPE I", "200 Type set to I");
        s.expect_reply("RETR missing.txt", "550 No such file");
        s.expect_reply("NOOP", "200 OK");
    });

    let mut ftp_stream = server.connect();
    ftp_stream.passive().unwrap();
    match ftp_stream.retrieve("missing.txt") {
        Err(FtpError::UnexpectedResponse(reply)) => assert_eq!(reply.code(), 550),
        other => panic!("Expected UnexpectedResponse, got {:?}", other),
    }
    ftp_stream.noop().unwrap();
    server.join();
}

#[test]
fn should_report_refused_transfer_in_active_mode() {
    crate::log_init();
    let server = MockServer::start(|s| {
        s.reply("220 mock ready");
        s.expect_reply("TYPE I", "200 Type set to I");
        s.port();
        s.expect_reply("RETR missing.txt", "550 No such file");
        s.expect_reply("NOOP", "200 OK");

        s.expect_reply("TYPE I", "200 Type set to I");
        s.expect("RETR late.txt");
        s.reply("150 Opening data connection");
        s.reply("425 Can't open data connection");
        s.expect_reply("NOOP", "200 OK");
    });

    let mut ftp_stream = server.connect().active_mode();
    match ftp_stream.retrieve("missing.txt") {
        Err(FtpError::UnexpectedResponse(reply)) => {
            assert_eq!(reply.status, Status::FileUnavailable);
            assert_eq!(reply.text.as_str(), "No such file");
        }
        other => panic!("Expected UnexpectedResponse, got {:?}", other),
    }
    ftp_stream.noop().unwrap();

    match ftp_stream.retrieve("late.txt") {
        Err(FtpError::UnexpectedResponse(reply)) => assert_eq!(reply.code(), 425),
        other => panic!("Expected UnexpectedResponse, got {:?}", other),
    }
    ftp_stream.noop().unwrap();
    server.join();
}

#[test]
fn should_switch_between_data_modes() {
    crate::log_init();
    let server = MockServer::start(|s| {
        s.reply("220 mock ready");
        s.port();
        s.passive();
        s.port();
        // rejected while active
        s.command();
        s.reply("500 PORT not allowed");
        s.passive();
        // rejected while passive
        s.command();
        s.reply("500 PORT not allowed");
    });

    let mut ftp_stream = server.connect();
    let first_listener = ftp_stream.active(0).unwrap();
    assert_eq!(ftp_stream.active_addr(), Some(first_listener));
    assert_eq!(ftp_stream.passive_addr(), None);

    let pasv = ftp_stream.passive().unwrap();
    assert_eq!(ftp_stream.mode(), Some(Mode::Passive));
    assert_eq!(ftp_stream.passive_addr(), Some(pasv));
    assert_eq!(ftp_stream.active_addr(), None);
    // the active listener was released
    drop(TcpListener::bind(first_listener).unwrap());

    let second_listener = ftp_stream.active(0).unwrap();
    assert_eq!(ftp_stream.mode(), Some(Mode::Active));
    assert_eq!(ftp_stream.active_addr(), Some(second_listener));
    assert_eq!(ftp_stream.passive_addr(), None);

    assert!(matches!(
        ftp_stream.active(0),
        Err(FtpError::UnexpectedResponse(_))
    ));
    assert_eq!(ftp_stream.mode(), Some(Mode::Active));
    assert_eq!(ftp_stream.active_addr(), None);
    drop(TcpListener::bind(second_listener).unwrap());

    ftp_stream.passive().unwrap();
    assert!(matches!(
        ftp_stream.active(0),
        Err(FtpError::UnexpectedResponse(_))
    ));
    assert_eq!(ftp_stream.mode(), None);
    assert_eq!(ftp_stream.passive_addr(), None);
    assert_eq!(ftp_stream.active_addr(), None);
    server.join();
}

#[test]
fn should_drain_reply_of_dropped_download() {
    crate::log_init();
    let server = MockServer::start(|s| {
        s.reply("220 mock ready");
        s.passive();
        s.expect_reply("TYPE I", "200 Type set to I");
        s.expect_reply("RETR big.bin", "150 Opening data connection");
        let mut data = s.accept_data();
        data.write_all(b"partial content").unwrap();
        let mut rest = Vec::new();
        // the client closes its side without reading everything
        let _ = data.read_to_end(&mut rest);
        s.reply("426 Connection closed; transfer aborted");
        s.expect_reply("NOOP", "200 OK");
    });

    let mut ftp_stream = server.connect();
    ftp_stream.passive().unwrap();
    {
        let mut download = ftp_stream.retrieve("big.bin").unwrap();
        let mut head = [0u8; 7];
        download.read_exact(&mut head).unwrap();
        assert_eq!(&head, b"partial");
    }
    ftp_stream.noop().unwrap();
    server.join();
}

#[test]
fn should_time_out_waiting_for_active_connection() {
    crate::log_init();
    let server = MockServer::start(|s| {
        s.reply("220 mock ready");
        s.expect_reply("TYPE I", "200 Type set to I");
        s.port();
        s.expect("RETR never.txt");
        s.expect_closed();
    });

    let mut ftp_stream = server
        .connect()
        .active_mode()
        .with_accept_timeout(Duration::from_millis(200));
    assert_eq!(ftp_stream.accept_timeout(), Duration::from_millis(200));
    match ftp_stream.retrieve("never.txt") {
        Err(FtpError::ConnectionError(e)) => assert_eq!(e.kind(), std::io::ErrorKind::TimedOut),
        other => panic!("Expected ConnectionError, got {:?}", other),
    }
    drop(ftp_stream);
    server.join();
}

#[test]
fn should_run_file_commands() {
    crate::log_init();
    let server = MockServer::start(|s| {
        s.reply("220 mock ready");
        s.expect_reply("MKD new", "257 \"/new\" created");
        s.expect_reply("RNFR a.txt", "350 Ready for destination name");
        s.expect_reply("RNTO b.txt", "250 Rename successful");
        s.expect_reply("DELE b.txt", "250 Deleted");
        s.expect_reply("RMD new", "250 Removed");
        s.expect_reply("SITE CHMOD 644 c.txt", "200 SITE CHMOD command ok");
        s.expect_reply("SIZE c.txt", "213 4096");
        s.expect_reply("MDTM c.txt", "213 20201225123000");
        s.expect_reply("TYPE A N", "200 Type set to A");
        s.expect_reply("SITE BOGUS", "500 Unknown SITE command");
    });

    let mut ftp_stream = server.connect();
    ftp_stream.mkdir("new").unwrap();
    ftp_stream.rename("a.txt", "b.txt").unwrap();
    ftp_stream.delete("b.txt").unwrap();
    ftp_stream.rmdir("new").unwrap();
    let reply = ftp_stream.site("CHMOD 644 c.txt").unwrap();
    assert_eq!(reply.code(), 200);
    assert_eq!(ftp_stream.size("c.txt").unwrap(), 4096);
    assert_eq!(
        ftp_stream.mdtm("c.txt").unwrap().to_string().as_str(),
        "2020-12-25 12:30:00"
    );
    ftp_stream
        .transfer_type(FileType::Ascii(FormatControl::Default))
        .unwrap();
    assert!(matches!(
        ftp_stream.site("BOGUS"),
        Err(FtpError::UnexpectedResponse(_))
    ));
    server.join();
}
