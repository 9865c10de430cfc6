//! Stream reader thread implementation
//!
//! This module contains the producer loop that owns the [`LineSource`], turns
//! raw lines into [`Record`]s and pushes them to the consumer over a bounded
//! crossbeam channel.
//!
//! # State machine
//!
//! ```text
//! Disconnected --open ok--> Connected --transport error--> Disconnected
//!      |  ^                     |
//!      +--+ open failed,        +--stop signal--> Stopping --> Stopped
//!           wait backoff
//! ```
//!
//! With auto-reconnect disabled, a failed open or a transport error while
//! connected ends the loop with an error instead.
//!
//! # Backpressure
//!
//! Records are sent with a blocking send, so a slow consumer stalls the
//! reader rather than losing data. The send wakes up periodically to honour
//! the stop flag.
//!
//! # Persistence
//!
//! When a [`CsvSink`] is attached every decoded sample is appended before it
//! is forwarded. A write failure disables the sink for the rest of the
//! session; the live stream keeps running.

use super::csv_sink::CsvSink;
use super::source::LineSource;
use crate::config::SerialConfig;
use crate::decoder::RecordDecoder;
use crate::error::{Result, ResultExt};
use crate::types::{ReaderState, ReaderStats, Record, Sample};
use crossbeam_channel::{SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How long a blocked send waits before re-checking the stop flag
const SEND_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Longest single sleep while waiting out the reconnect backoff
const BACKOFF_SLICE: Duration = Duration::from_millis(50);

/// How often the shared stats snapshot is refreshed
const STATS_PUBLISH_INTERVAL: Duration = Duration::from_millis(200);

/// Reader behaviour knobs
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Retry opening the transport after failures
    pub auto_reconnect: bool,
    /// Wait between reconnect attempts
    pub reconnect_backoff: Duration,
    /// Upper bound on one blocking read
    pub read_timeout: Duration,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            reconnect_backoff: Duration::from_secs(2),
            read_timeout: Duration::from_secs(1),
        }
    }
}

impl From<&SerialConfig> for ReaderOptions {
    fn from(config: &SerialConfig) -> Self {
        Self {
            auto_reconnect: config.auto_reconnect,
            reconnect_backoff: config.reconnect_backoff(),
            read_timeout: config.read_timeout(),
        }
    }
}

/// Producer side of the pipeline
pub struct StreamReader {
    source: Box<dyn LineSource>,
    decoder: RecordDecoder,
    options: ReaderOptions,
    /// Decoded records to the consumer
    record_tx: Sender<Record>,
    /// State transitions, best effort
    status_tx: Option<Sender<ReaderState>>,
    /// Cleared to request a stop
    running: Arc<AtomicBool>,
    sink: Option<CsvSink>,
    state: ReaderState,
    stats: ReaderStats,
    shared_stats: Arc<Mutex<ReaderStats>>,
    last_stats_publish: Instant,
}

impl StreamReader {
    pub fn new(
        source: Box<dyn LineSource>,
        options: ReaderOptions,
        record_tx: Sender<Record>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            decoder: RecordDecoder::new(),
            options,
            record_tx,
            status_tx: None,
            running,
            sink: None,
            state: ReaderState::Disconnected,
            stats: ReaderStats::default(),
            shared_stats: Arc::new(Mutex::new(ReaderStats::default())),
            last_stats_publish: Instant::now(),
        }
    }

    /// Publish state transitions on `status_tx`
    pub fn with_status(mut self, status_tx: Sender<ReaderState>) -> Self {
        self.status_tx = Some(status_tx);
        self
    }

    /// Mirror decoded samples to a CSV sink
    pub fn with_sink(mut self, sink: Option<CsvSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Share counters through `stats`
    pub fn with_shared_stats(mut self, stats: Arc<Mutex<ReaderStats>>) -> Self {
        self.shared_stats = stats;
        self
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn stats(&self) -> &ReaderStats {
        &self.stats
    }

    /// Run until stopped, or until a transport failure with reconnect disabled
    pub fn run(&mut self) -> Result<()> {
        tracing::info!("Stream reader started on {}", self.source.describe());

        let result = loop {
            if !self.running.load(Ordering::SeqCst) {
                break Ok(());
            }

            let step = match self.state {
                ReaderState::Disconnected => self.connect(),
                ReaderState::Connected => self.read_once(),
                ReaderState::Stopping | ReaderState::Stopped => break Ok(()),
            };

            if let Err(e) = step {
                break Err(e);
            }

            self.maybe_publish_stats();
        };

        self.shutdown();

        match &result {
            Ok(()) => tracing::info!("Stream reader stopped"),
            Err(e) => tracing::error!("Stream reader terminated: {}", e),
        }
        result
    }

    /// Try to open the source once
    fn connect(&mut self) -> Result<()> {
        match self.source.open() {
            Ok(()) => {
                tracing::info!("Connected to {}", self.source.describe());
                self.set_state(ReaderState::Connected);
                Ok(())
            }
            Err(e) => {
                self.stats.open_failures += 1;
                tracing::warn!("Open failed: {}", e);

                let ports = self.source.available_ports();
                if !ports.is_empty() {
                    tracing::info!("Available ports: {:?}", ports);
                }

                if !self.options.auto_reconnect {
                    return Err(e).context("Reconnect disabled, giving up");
                }
                self.set_state(ReaderState::Disconnected);
                self.wait_backoff();
                Ok(())
            }
        }
    }

    /// Read and handle at most one line
    fn read_once(&mut self) -> Result<()> {
        let line = match self.source.read_line(self.options.read_timeout) {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(()),
            Err(e) => {
                self.stats.connection_losses += 1;
                tracing::warn!("Serial error: {}", e);
                self.source.close();

                if !self.options.auto_reconnect {
                    return Err(e).with_context(|| {
                        format!("Lost connection to {}", self.source.describe())
                    });
                }
                self.set_state(ReaderState::Disconnected);
                self.wait_backoff();
                return Ok(());
            }
        };

        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        self.stats.lines_read += 1;
        tracing::trace!("<< {}", line);

        match self.decoder.feed(line, &mut self.stats) {
            Ok(record) => {
                if let Record::Sample(sample) = &record {
                    self.persist(sample);
                }
                self.forward(record);
            }
            Err(e) => {
                tracing::debug!("Dropped line {:?}: {}", line, e);
            }
        }

        Ok(())
    }

    fn persist(&mut self, sample: &Sample) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };

        match sink.write_sample(sample, self.decoder.schema()) {
            Ok(()) => self.stats.rows_persisted += 1,
            Err(e) => {
                tracing::warn!("CSV logging disabled after write failure: {}", e);
                self.sink = None;
            }
        }
    }

    /// Blocking send that still notices a stop request
    fn forward(&mut self, mut record: Record) {
        loop {
            match self.record_tx.send_timeout(record, SEND_POLL_INTERVAL) {
                Ok(()) => return,
                Err(SendTimeoutError::Timeout(r)) => {
                    if !self.running.load(Ordering::SeqCst) {
                        return;
                    }
                    record = r;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    tracing::warn!("Record consumer disconnected, stopping reader");
                    self.running.store(false, Ordering::SeqCst);
                    return;
                }
            }
        }
    }

    /// Sleep for the reconnect backoff in slices so a stop is seen quickly
    fn wait_backoff(&self) {
        let deadline = Instant::now() + self.options.reconnect_backoff;
        while self.running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(BACKOFF_SLICE));
        }
    }

    fn shutdown(&mut self) {
        self.set_state(ReaderState::Stopping);
        self.source.close();

        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close() {
                tracing::warn!("Failed to close CSV log: {}", e);
            }
        }

        self.set_state(ReaderState::Stopped);
        self.publish_stats();
    }

    fn set_state(&mut self, state: ReaderState) {
        self.state = state;
        if let Some(tx) = &self.status_tx {
            let _ = tx.try_send(state);
        }
    }

    fn maybe_publish_stats(&mut self) {
        if self.last_stats_publish.elapsed() >= STATS_PUBLISH_INTERVAL {
            self.publish_stats();
        }
    }

    fn publish_stats(&mut self) {
        if let Ok(mut shared) = self.shared_stats.lock() {
            *shared = self.stats.clone();
        }
        self.last_stats_publish = Instant::now();
    }
}
