//! # Response
//!
//! Reads replies from the control channel.
//!
//! A reply is either one line `DDD text`, or a block opened by `DDD-text` and closed by
//! the first line starting with the same code followed by a space. Continuation lines
//! are joined with `\n`; a leading `DDD-` on them is stripped.

use std::io::BufRead;

use crate::regex::REPLY_LINE_RE;
use crate::types::{FtpError, FtpResult, Reply};
use crate::Status;

/// Read exactly one reply, preliminary (1xx) replies included
pub(crate) fn receive_one_reply<R: BufRead>(reader: &mut R) -> FtpResult<Reply> {
    let first_line = next_line(reader)?;
    let caps = REPLY_LINE_RE
        .captures(&first_line)
        .ok_or(FtpError::BadResponse)?;

    let code: u32 = caps[1].parse().map_err(|_| FtpError::BadResponse)?;
    if !(100..600).contains(&code) {
        return Err(FtpError::BadResponse);
    }

    let mut text = caps[3].to_string();

    if &caps[2] == "-" {
        let terminator = format!("{} ", &caps[1]);
        let continuation = format!("{}-", &caps[1]);
        loop {
            let line = next_line(reader)?;
            text.push('\n');
            if let Some(last) = line.strip_prefix(terminator.as_str()) {
                text.push_str(last);
                break;
            }
            text.push_str(line.strip_prefix(continuation.as_str()).unwrap_or(&line));
        }
    }

    Ok(Reply::new(Status::from(code), text))
}

/// Read replies until one that is not preliminary
pub(crate) fn receive_reply<R: BufRead>(reader: &mut R) -> FtpResult<Reply> {
    loop {
        let reply = receive_one_reply(reader)?;
        if reply.status.is_preliminary() {
            trace!("Skipping preliminary reply {}", reply);
            continue;
        }
        return Ok(reply);
    }
}

/// Accept the reply if its status is one of `expected`
pub(crate) fn expect_in(reply: Reply, expected: &[Status]) -> FtpResult<Reply> {
    if expected.iter().any(|s| s.code() == reply.code()) {
        Ok(reply)
    } else {
        Err(FtpError::UnexpectedResponse(reply))
    }
}

/// Read one line without its end of line marker
fn next_line<R: BufRead>(reader: &mut R) -> FtpResult<String> {
    let mut buf = Vec::new();
    let read = reader
        .read_until(b'\n', &mut buf)
        .map_err(FtpError::ConnectionError)?;
    if read == 0 {
        return Err(FtpError::UnexpectedEof);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    let line = String::from_utf8_lossy(&buf).into_owned();
    trace!("CC IN: {}", line);
    Ok(line)
}
