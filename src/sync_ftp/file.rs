//! # File
//!
//! Wrappers around the data connection of a running transfer.
//!
//! `finish()` closes the data connection and then reads the transfer completion reply.
//! Dropping a wrapper without finishing it closes the connection and drains the reply, ignoring errors.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};

use super::DataStream;
use crate::{FtpError, FtpResult, FtpStream};

fn finished() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotConnected, "transfer already finished")
}

#[derive(Debug)]
#[must_use = "The file upload must be terminated with `FileUpload::finish()`"]
pub struct FileUpload<'a> {
    cmd_stream: &'a mut FtpStream,
    data_stream: Option<BufWriter<DataStream>>,
}

impl<'a> FileUpload<'a> {
    pub(crate) fn new(cmd_stream: &'a mut FtpStream, data_stream: DataStream) -> Self {
        Self {
            cmd_stream,
            data_stream: Some(BufWriter::new(data_stream)),
        }
    }

    /// Flush, close the data connection and read the completion reply
    pub fn finish(mut self) -> FtpResult<()> {
        let Some(mut writer) = self.data_stream.take() else {
            return Ok(());
        };
        if let Err(e) = writer.flush() {
            let (stream, _) = writer.into_parts();
            self.cmd_stream.abandon_data_stream(stream);
            return Err(FtpError::ConnectionError(e));
        }
        let (stream, _) = writer.into_parts();
        self.cmd_stream.finalize_data_stream(stream)
    }
}

impl Write for FileUpload<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.data_stream.as_mut().ok_or_else(finished)?.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.data_stream.as_mut().ok_or_else(finished)?.flush()
    }
}

impl Drop for FileUpload<'_> {
    fn drop(&mut self) {
        if let Some(mut writer) = self.data_stream.take() {
            debug!("Upload dropped before finish; closing data stream");
            if let Err(e) = writer.flush() {
                warn!("Failed to flush dropped upload: {}", e);
            }
            let (stream, _) = writer.into_parts();
            self.cmd_stream.abandon_data_stream(stream);
        }
    }
}

#[derive(Debug)]
#[must_use = "The file download must be terminated with `FileDownload::finish()`"]
pub struct FileDownload<'a> {
    cmd_stream: &'a mut FtpStream,
    data_stream: Option<BufReader<DataStream>>,
}

impl<'a> FileDownload<'a> {
    pub(crate) fn new(cmd_stream: &'a mut FtpStream, data_stream: DataStream) -> Self {
        Self {
            cmd_stream,
            data_stream: Some(BufReader::new(data_stream)),
        }
    }

    /// Close the data connection and read the completion reply
    pub fn finish(mut self) -> FtpResult<()> {
        match self.data_stream.take() {
            Some(reader) => self.cmd_stream.finalize_data_stream(reader.into_inner()),
            None => Ok(()),
        }
    }
}

impl Read for FileDownload<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.data_stream.as_mut().ok_or_else(finished)?.read(buf)
    }
}

impl BufRead for FileDownload<'_> {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        self.data_stream.as_mut().ok_or_else(finished)?.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        if let Some(reader) = self.data_stream.as_mut() {
            reader.consume(amt)
        }
    }
}

impl Drop for FileDownload<'_> {
    fn drop(&mut self) {
        if let Some(reader) = self.data_stream.take() {
            debug!("Download dropped before finish; closing data stream");
            self.cmd_stream.abandon_data_stream(reader.into_inner());
        }
    }
}
