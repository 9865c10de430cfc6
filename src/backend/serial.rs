//! Serial port line source
//!
//! Reads newline-terminated text from a serial device via the `serialport`
//! crate. Bytes that arrive without a terminator before the read timeout are
//! kept and completed on the next call, so a slow line is never split. A
//! partial line that grows past [`MAX_LINE_BYTES`] is discarded.

use super::source::{LineSource, TransportResult};
use crate::config::SerialConfig;
use crate::error::TransportError;
use serialport::SerialPort;
use std::io::{BufRead, BufReader, ErrorKind};
use std::time::Duration;

/// Longest unterminated line kept while waiting for `\n`
pub const MAX_LINE_BYTES: usize = 4096;

/// List the serial ports present on this machine
pub fn list_ports() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate serial ports: {}", e);
            Vec::new()
        }
    }
}

/// [`LineSource`] backed by a real serial port
pub struct SerialLineSource {
    port_name: String,
    baud_rate: u32,
    timeout: Duration,
    reader: Option<BufReader<Box<dyn SerialPort>>>,
    /// Bytes of an unfinished line
    pending: Vec<u8>,
}

impl SerialLineSource {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout: Duration::from_secs(1),
            reader: None,
            pending: Vec::with_capacity(256),
        }
    }

    pub fn from_config(config: &SerialConfig) -> Self {
        let mut source = Self::new(config.port.clone(), config.baud_rate);
        source.timeout = config.read_timeout();
        source
    }

    fn take_line(&mut self) -> String {
        let bytes = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&bytes)
            .trim_end_matches(['\r', '\n'])
            .to_string()
    }
}

impl LineSource for SerialLineSource {
    fn open(&mut self) -> TransportResult<()> {
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(|e| TransportError::Open {
                port: self.port_name.clone(),
                message: e.to_string(),
            })?;

        tracing::info!("Opened {} @ {}", self.port_name, self.baud_rate);
        self.reader = Some(BufReader::new(port));
        self.pending.clear();
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> TransportResult<Option<String>> {
        let reader = self.reader.as_mut().ok_or(TransportError::Closed)?;

        if timeout != self.timeout {
            reader.get_mut().set_timeout(timeout)?;
            self.timeout = timeout;
        }

        if fill_line(reader, &mut self.pending, &self.port_name)? {
            Ok(Some(self.take_line()))
        } else {
            Ok(None)
        }
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            tracing::info!("Closed {}", self.port_name);
        }
        self.pending.clear();
    }

    fn describe(&self) -> String {
        format!("{} @ {}", self.port_name, self.baud_rate)
    }

    fn available_ports(&self) -> Vec<String> {
        list_ports()
    }
}

/// Move bytes from `reader` into `pending` until a `\n` arrives.
///
/// Returns `Ok(true)` once `pending` ends with a complete line and
/// `Ok(false)` when the read timed out first.
fn fill_line<R: BufRead>(
    reader: &mut R,
    pending: &mut Vec<u8>,
    port_name: &str,
) -> TransportResult<bool> {
    loop {
        let available = match reader.fill_buf() {
            Ok([]) => {
                return Err(TransportError::Read(format!(
                    "{} returned end of stream",
                    port_name
                )))
            }
            Ok(buf) => buf,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                return Ok(false)
            }
            Err(e) => return Err(TransportError::Io(e)),
        };

        let (taken, complete) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };
        pending.extend_from_slice(&available[..taken]);
        reader.consume(taken);

        if complete {
            return Ok(true);
        }
        if pending.len() > MAX_LINE_BYTES {
            tracing::debug!(
                "Discarding {} bytes from {} without a line terminator",
                pending.len(),
                port_name
            );
            pending.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_before_open_is_closed_error() {
        let mut source = SerialLineSource::new("/dev/serialvis-does-not-exist", 115200);
        assert!(matches!(
            source.read_line(Duration::from_millis(10)),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn test_open_missing_port_fails() {
        let mut source = SerialLineSource::new("/dev/serialvis-does-not-exist", 115200);
        let err = source.open().unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
        assert!(source.reader.is_none());
    }

    #[test]
    fn test_describe() {
        let source = SerialLineSource::new("COM7", 9600);
        assert_eq!(source.describe(), "COM7 @ 9600");
    }

    /// Reader that hands out fixed chunks, then times out
    struct ChunkedReader {
        chunks: std::collections::VecDeque<Vec<u8>>,
    }

    impl ChunkedReader {
        fn new(chunks: Vec<Vec<u8>>) -> BufReader<Self> {
            BufReader::with_capacity(
                64,
                Self {
                    chunks: chunks.into(),
                },
            )
        }
    }

    impl std::io::Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let Some(mut chunk) = self.chunks.pop_front() else {
                return Err(ErrorKind::TimedOut.into());
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                self.chunks.push_front(chunk.split_off(n));
            }
            Ok(n)
        }
    }

    #[test]
    fn test_partial_line_is_completed_on_next_read() {
        let mut reader = ChunkedReader::new(vec![b"DAT,1,".to_vec()]);
        let mut pending = Vec::new();
        assert!(!fill_line(&mut reader, &mut pending, "COM7").unwrap());
        assert_eq!(pending, b"DAT,1,");

        reader.get_mut().chunks.push_back(b"0,1\r\nDAT,2".to_vec());
        assert!(fill_line(&mut reader, &mut pending, "COM7").unwrap());
        assert_eq!(pending, b"DAT,1,0,1\r\n");
    }

    #[test]
    fn test_unterminated_flood_is_bounded() {
        let noise = vec![vec![b'x'; 1000]; 10];
        let mut reader = ChunkedReader::new(noise);
        let mut pending = Vec::new();

        assert!(!fill_line(&mut reader, &mut pending, "COM7").unwrap());
        assert!(pending.len() <= MAX_LINE_BYTES);

        reader.get_mut().chunks.push_back(b"DAT,1,0,1\n".to_vec());
        pending.clear();
        assert!(fill_line(&mut reader, &mut pending, "COM7").unwrap());
        assert_eq!(pending, b"DAT,1,0,1\n");
    }

    #[test]
    fn test_end_of_stream_is_a_read_error() {
        let mut reader = BufReader::new(std::io::empty());
        let mut pending = Vec::new();
        assert!(matches!(
            fill_line(&mut reader, &mut pending, "COM7"),
            Err(TransportError::Read(_))
        ));
    }
}
