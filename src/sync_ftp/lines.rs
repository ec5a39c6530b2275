//! # Lines
//!
//! Lazy line producer over the data connection of `LIST` and `NLST`

use std::io::{BufRead, BufReader};
use std::iter::FusedIterator;

use super::DataStream;
use crate::{FtpError, FtpResult, FtpStream};

/// Yields the lines of a listing one at a time.
///
/// Once the data connection reaches its end, the connection is closed and the final reply is
/// consumed; a failing final reply is yielded as the last item. The sequence is finite and cannot
/// be restarted.
#[derive(Debug)]
#[must_use = "The listing must be consumed so that its final reply is read"]
pub struct ListStream<'a> {
    cmd_stream: &'a mut FtpStream,
    reader: Option<BufReader<DataStream>>,
}

impl<'a> ListStream<'a> {
    pub(crate) fn new(cmd_stream: &'a mut FtpStream, data_stream: DataStream) -> Self {
        Self {
            cmd_stream,
            reader: Some(BufReader::new(data_stream)),
        }
    }

    fn abandon(&mut self) {
        if let Some(reader) = self.reader.take() {
            self.cmd_stream.abandon_data_stream(reader.into_inner());
        }
    }
}

impl Iterator for ListStream<'_> {
    type Item = FtpResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let reader = self.reader.as_mut()?;
            let mut line = Vec::new();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => {
                    let reader = self.reader.take()?;
                    return self
                        .cmd_stream
                        .finalize_data_stream(reader.into_inner())
                        .err()
                        .map(Err);
                }
                Ok(_) => {
                    while matches!(line.last(), Some(b'\n' | b'\r')) {
                        line.pop();
                    }
                    if line.is_empty() {
                        continue;
                    }
                    let line = String::from_utf8_lossy(&line).into_owned();
                    trace!("LIST IN: {}", line);
                    return Some(Ok(line));
                }
                Err(e) => {
                    self.abandon();
                    return Some(Err(FtpError::ConnectionError(e)));
                }
            }
        }
    }
}

impl FusedIterator for ListStream<'_> {}

impl Drop for ListStream<'_> {
    fn drop(&mut self) {
        if self.reader.is_some() {
            debug!("Listing dropped before its end; closing data stream");
            self.abandon();
        }
    }
}
