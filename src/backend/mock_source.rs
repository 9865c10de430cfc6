//! Scripted line source for testing without hardware
//!
//! Plays back a fixed script of lines, timeouts and read errors, and can be
//! told to fail a number of open attempts first. The binary also uses it to
//! replay a captured text log (`--replay`).

use super::source::{LineSource, TransportResult};
use crate::error::TransportError;
use std::collections::VecDeque;
use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Longest a scripted read will sleep when it has nothing to return
const IDLE_SLEEP: Duration = Duration::from_millis(5);

/// One step of a script
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    /// Deliver a line
    Line(String),
    /// Report an empty read
    Timeout,
    /// Fail the read as if the link dropped
    ReadError(String),
}

/// In-memory [`LineSource`] driven by a script
#[derive(Debug)]
pub struct ScriptedLineSource {
    name: String,
    steps: VecDeque<ScriptStep>,
    /// Open attempts left to fail
    failing_opens: usize,
    /// Delay between delivered lines
    line_interval: Duration,
    open: bool,
    open_attempts: Arc<AtomicUsize>,
}

impl ScriptedLineSource {
    pub fn new() -> Self {
        Self {
            name: "scripted".to_string(),
            steps: VecDeque::new(),
            failing_opens: 0,
            line_interval: Duration::ZERO,
            open: false,
            open_attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Script that delivers the given lines in order
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut source = Self::new();
        source
            .steps
            .extend(lines.into_iter().map(|l| ScriptStep::Line(l.into())));
        source
    }

    /// Script that replays every line of a text capture
    ///
    /// Invalid UTF-8 is replaced the same way the serial source does it.
    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let lines = std::io::BufReader::new(file)
            .split(b'\n')
            .map(|line| {
                line.map(|bytes| {
                    String::from_utf8_lossy(&bytes)
                        .trim_end_matches('\r')
                        .to_string()
                })
            })
            .collect::<std::io::Result<Vec<String>>>()?;
        let mut source = Self::from_lines(lines);
        source.name = format!("replay:{}", path.display());
        Ok(source)
    }

    /// Fail the first `count` open attempts
    pub fn with_failing_opens(mut self, count: usize) -> Self {
        self.failing_opens = count;
        self
    }

    /// Pause between delivered lines
    pub fn with_line_interval(mut self, interval: Duration) -> Self {
        self.line_interval = interval;
        self
    }

    /// Append a step to the script
    pub fn push(mut self, step: ScriptStep) -> Self {
        self.steps.push_back(step);
        self
    }

    /// Counter of open attempts, shared so tests can watch it after the
    /// source has moved to the reader thread
    pub fn open_attempts(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.open_attempts)
    }

    /// Whether every scripted step has been consumed
    pub fn is_exhausted(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Default for ScriptedLineSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LineSource for ScriptedLineSource {
    fn open(&mut self) -> TransportResult<()> {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing_opens > 0 {
            self.failing_opens -= 1;
            return Err(TransportError::Open {
                port: self.name.clone(),
                message: "scripted open failure".to_string(),
            });
        }
        self.open = true;
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> TransportResult<Option<String>> {
        if !self.open {
            return Err(TransportError::Closed);
        }

        match self.steps.pop_front() {
            Some(ScriptStep::Line(line)) => {
                if !self.line_interval.is_zero() {
                    std::thread::sleep(self.line_interval);
                }
                Ok(Some(line))
            }
            Some(ScriptStep::Timeout) => Ok(None),
            Some(ScriptStep::ReadError(message)) => {
                self.open = false;
                Err(TransportError::Read(message))
            }
            None => {
                std::thread::sleep(timeout.min(IDLE_SLEEP));
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn describe(&self) -> String {
        self.name.clone()
    }

    fn available_ports(&self) -> Vec<String> {
        vec![self.name.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TICK: Duration = Duration::from_millis(1);

    #[test]
    fn test_failing_opens_then_success() {
        let mut source = ScriptedLineSource::from_lines(["a"]).with_failing_opens(2);
        let attempts = source.open_attempts();

        assert!(source.open().is_err());
        assert!(source.open().is_err());
        assert!(source.open().is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(source.read_line(TICK).unwrap(), Some("a".to_string()));
    }

    #[test]
    fn test_read_requires_open() {
        let mut source = ScriptedLineSource::from_lines(["a"]);
        assert!(matches!(source.read_line(TICK), Err(TransportError::Closed)));
    }

    #[test]
    fn test_read_error_closes_source() {
        let mut source = ScriptedLineSource::new()
            .push(ScriptStep::Timeout)
            .push(ScriptStep::ReadError("unplugged".into()))
            .push(ScriptStep::Line("after".into()));
        source.open().unwrap();

        assert_eq!(source.read_line(TICK).unwrap(), None);
        assert!(source.read_line(TICK).is_err());
        assert!(!source.open);

        source.open().unwrap();
        assert_eq!(source.read_line(TICK).unwrap(), Some("after".to_string()));
        assert!(source.is_exhausted());
        assert_eq!(source.read_line(TICK).unwrap(), None);
    }

    #[test]
    fn test_replay_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "HDR,1,X,fields=a").unwrap();
        writeln!(file, "DAT,1,0,1").unwrap();

        let mut source = ScriptedLineSource::from_file(file.path()).unwrap();
        assert!(source.describe().starts_with("replay:"));
        source.open().unwrap();
        assert_eq!(
            source.read_line(TICK).unwrap(),
            Some("HDR,1,X,fields=a".to_string())
        );
        assert_eq!(source.read_line(TICK).unwrap(), Some("DAT,1,0,1".to_string()));
    }

    #[test]
    fn test_replay_tolerates_invalid_utf8() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"boot \xff\xfe ok\r\nDAT,1,0,1\n").unwrap();

        let mut source = ScriptedLineSource::from_file(file.path()).unwrap();
        source.open().unwrap();
        assert_eq!(
            source.read_line(TICK).unwrap(),
            Some("boot \u{FFFD}\u{FFFD} ok".to_string())
        );
        assert_eq!(source.read_line(TICK).unwrap(), Some("DAT,1,0,1".to_string()));
        assert!(source.is_exhausted());
    }
}
