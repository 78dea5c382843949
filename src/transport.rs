//! Line-oriented links to the oven.

use std::io::{self, Read, Write};

use serialport::SerialPort;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::oven::DriverConfig;

/// Longest reply we are willing to buffer before giving up on a line.
const MAX_LINE_LEN: usize = 256;

/// Something that can carry one command line out and one response line back.
pub trait Transport {
    /// Sends `line`; the transport adds its own terminator.
    fn write_line(&mut self, line: &str) -> Result<()>;

    /// Blocks until a full response line arrives, returned without its terminator.
    fn read_line(&mut self) -> Result<String>;

    /// Throws away anything received but not yet read, such as the tail of a
    /// reply that timed out.
    fn clear_input(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A [`Transport`] over any byte stream, normally an RS-232 port.
pub struct SerialTransport<P = Box<dyn SerialPort>> {
    port: P,
    terminator: String,
    pending: Vec<u8>,
}

impl SerialTransport {
    /// Opens the serial port named in `config`.
    pub fn open(config: &DriverConfig) -> Result<Self> {
        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .timeout(config.timeout)
            .open()?;
        info!(port = %config.port, baud = config.baud_rate, "opened serial port");
        Ok(Self::new(port, &config.write_terminator))
    }
}

impl<P: Read + Write> SerialTransport<P> {
    pub fn new(port: P, terminator: &str) -> Self {
        Self {
            port,
            terminator: String::from(terminator),
            pending: Vec::new(),
        }
    }

    pub fn into_inner(self) -> P {
        self.port
    }

    fn take_line(&mut self) -> Option<Result<String>> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=end).collect();
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches(['\r', '\n']);
        if line.len() > MAX_LINE_LEN {
            return Some(Err(oversize(line)));
        }
        Some(Ok(String::from(line)))
    }
}

impl<P: Read + Write> Transport for SerialTransport<P> {
    fn write_line(&mut self, line: &str) -> Result<()> {
        self.port.write_all(line.as_bytes())?;
        self.port.write_all(self.terminator.as_bytes())?;
        self.port.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let mut chunk = [0u8; 64];
        loop {
            if let Some(line) = self.take_line() {
                return line;
            }
            // Reads are at most one chunk, so this bounds the buffer too.
            if self.pending.len() > MAX_LINE_LEN {
                let response = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                return Err(oversize(&response));
            }

            match self.port.read(&mut chunk) {
                Ok(0) => return Err(Error::Timeout),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {
                    debug!(buffered = self.pending.len(), "read timed out");
                    return Err(Error::Timeout);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => (),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn clear_input(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            debug!(dropped = self.pending.len(), "discarding stale input");
            self.pending.clear();
        }
        Ok(())
    }
}

fn oversize(response: &str) -> Error {
    Error::InvalidResponse {
        command: String::from("<read>"),
        response: String::from(response),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    // Hands out queued reads one chunk at a time, then times out.
    #[derive(Default)]
    struct FakePort {
        reads: VecDeque<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.reads.push_front(chunk[n..].to_vec());
                    }
                    Ok(n)
                }
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
            }
        }
    }

    impl Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn transport_with(reads: &[&[u8]]) -> SerialTransport<FakePort> {
        let port = FakePort {
            reads: reads.iter().map(|r| r.to_vec()).collect(),
            written: Vec::new(),
        };
        SerialTransport::new(port, "\r\n")
    }

    #[test]
    fn write_appends_terminator() {
        let mut link = transport_with(&[]);
        link.write_line("RUNM").unwrap();
        assert_eq!(link.into_inner().written, b"RUNM\r\n");
    }

    #[test]
    fn read_joins_split_chunks() {
        let mut link = transport_with(&[b"23.", b"5\r", b"\n"]);
        assert_eq!(link.read_line().unwrap(), "23.5");
    }

    #[test]
    fn read_keeps_the_rest_for_the_next_line() {
        let mut link = transport_with(&[b"16\r\n2", b"5.0\r\n"]);
        assert_eq!(link.read_line().unwrap(), "16");
        assert_eq!(link.read_line().unwrap(), "25.0");
    }

    #[test]
    fn partial_line_times_out() {
        let mut link = transport_with(&[b"12"]);
        assert!(matches!(link.read_line(), Err(Error::Timeout)));
    }

    #[test]
    fn cleared_input_drops_a_timed_out_fragment() {
        let mut link = transport_with(&[b"12"]);
        assert!(matches!(link.read_line(), Err(Error::Timeout)));

        link.port.reads.push_back(b"25.0\r\n".to_vec());
        link.clear_input().unwrap();
        assert_eq!(link.read_line().unwrap(), "25.0");
    }

    #[test]
    fn oversize_line_with_terminator_is_rejected() {
        let mut line = vec![b'x'; MAX_LINE_LEN + 4];
        line.extend_from_slice(b"\r\n");
        let mut link = transport_with(&[&line, b"7\r\n"]);
        assert!(matches!(link.read_line(), Err(Error::InvalidResponse { .. })));
        assert_eq!(link.read_line().unwrap(), "7");
    }

    #[test]
    fn longest_allowed_line_is_accepted() {
        let mut line = vec![b'y'; MAX_LINE_LEN];
        line.extend_from_slice(b"\r\n");
        let mut link = transport_with(&[&line]);
        assert_eq!(link.read_line().unwrap().len(), MAX_LINE_LEN);
    }

    #[test]
    fn runaway_line_is_rejected() {
        let junk = vec![b'x'; MAX_LINE_LEN + 10];
        let mut link = transport_with(&[&junk]);
        assert!(matches!(link.read_line(), Err(Error::InvalidResponse { .. })));
    }
}
