//! Backend module for serial line acquisition
//!
//! This module handles all transport I/O in a separate thread so the
//! presenter never blocks on the device. It uses crossbeam channels for
//! thread-safe communication with the consumer side.
//!
//! # Architecture
//!
//! - [`LineSource`] - Transport abstraction yielding text lines
//! - [`StreamReader`] - Producer loop: decode, persist, forward
//! - [`StreamBackend`] - Entry point that wires channels and spawns the reader
//! - [`FrontendReceiver`] - Consumer-side handle for records, states and stats
//!
//! # Components
//!
//! - [`SerialLineSource`] - Real serial port via the `serialport` crate
//! - [`ScriptedLineSource`] - Scripted/replayed lines for tests and `--replay`
//! - [`CsvSink`] - Append-only CSV log of decoded samples
//!
//! # Example
//!
//! ```ignore
//! use serialvis::backend::{SerialLineSource, StreamBackend};
//! use serialvis::config::AppConfig;
//!
//! let config = AppConfig::default();
//! let source = SerialLineSource::from_config(&config.serial);
//! let (backend, frontend) = StreamBackend::new(config, Box::new(source));
//! let handle = backend.spawn()?;
//!
//! for record in frontend.drain() {
//!     // feed the presenter
//! }
//!
//! handle.stop();
//! handle.join()?;
//! ```

pub mod csv_sink;
pub mod mock_source;
pub mod reader;
pub mod serial;
pub mod source;

pub use csv_sink::CsvSink;
pub use mock_source::{ScriptStep, ScriptedLineSource};
pub use reader::{ReaderOptions, StreamReader};
pub use serial::{list_ports, SerialLineSource};
pub use source::{LineSource, TransportResult};

use crate::config::AppConfig;
use crate::error::{Result, ResultExt, StreamError};
use crate::types::{ReaderState, ReaderStats, Record};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Capacity of the state transition channel
const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Consumer-side handle of the backend
pub struct FrontendReceiver {
    /// Decoded records, in arrival order
    pub receiver: Receiver<Record>,
    /// Reader state transitions
    pub status: Receiver<ReaderState>,
    stats: Arc<Mutex<ReaderStats>>,
    running: Arc<AtomicBool>,
}

impl FrontendReceiver {
    /// Try to receive a record without blocking
    pub fn try_recv(&self) -> Option<Record> {
        self.receiver.try_recv().ok()
    }

    /// Receive all pending records
    pub fn drain(&self) -> Vec<Record> {
        self.receiver.try_iter().collect()
    }

    /// Receive all pending state transitions
    pub fn states(&self) -> Vec<ReaderState> {
        self.status.try_iter().collect()
    }

    /// Latest published reader counters
    pub fn stats(&self) -> ReaderStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Ask the reader to stop
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// The stream backend that runs in a separate thread
pub struct StreamBackend {
    config: AppConfig,
    source: Box<dyn LineSource>,
    record_tx: Sender<Record>,
    status_tx: Sender<ReaderState>,
    stats: Arc<Mutex<ReaderStats>>,
    running: Arc<AtomicBool>,
}

impl StreamBackend {
    /// Create a backend reading from `source`, with its communication channels
    pub fn new(config: AppConfig, source: Box<dyn LineSource>) -> (Self, FrontendReceiver) {
        // Bounded for backpressure: a stalled consumer blocks the reader
        let (record_tx, record_rx) = bounded(config.collection.channel_capacity.max(1));
        let (status_tx, status_rx) = bounded(STATUS_CHANNEL_CAPACITY);
        let stats = Arc::new(Mutex::new(ReaderStats::default()));
        let running = Arc::new(AtomicBool::new(true));

        let frontend = FrontendReceiver {
            receiver: record_rx,
            status: status_rx,
            stats: stats.clone(),
            running: running.clone(),
        };

        let backend = Self {
            config,
            source,
            record_tx,
            status_tx,
            stats,
            running,
        };

        (backend, frontend)
    }

    /// Get a handle to stop the backend
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Build the reader, opening the CSV sink if one is configured
    ///
    /// A sink that cannot be opened is reported and skipped; the live
    /// stream runs without persistence.
    pub fn into_reader(self) -> StreamReader {
        let sink = self
            .config
            .collection
            .save_path
            .as_ref()
            .and_then(|path| match CsvSink::open(path).context("CSV logging disabled") {
                Ok(sink) => Some(sink),
                Err(e) => {
                    tracing::warn!("{}", e);
                    None
                }
            });

        StreamReader::new(
            self.source,
            ReaderOptions::from(&self.config.serial),
            self.record_tx,
            self.running,
        )
        .with_status(self.status_tx)
        .with_shared_stats(self.stats)
        .with_sink(sink)
    }

    /// Run the reader on the current thread
    pub fn run(self) -> Result<()> {
        self.into_reader().run()
    }

    /// Run the reader on a dedicated thread
    pub fn spawn(self) -> Result<ReaderHandle> {
        let running = self.running.clone();
        let thread = std::thread::Builder::new()
            .name("serialvis-reader".to_string())
            .spawn(move || self.run())?;

        Ok(ReaderHandle { thread, running })
    }
}

/// Handle to a spawned reader thread
pub struct ReaderHandle {
    thread: JoinHandle<Result<()>>,
    running: Arc<AtomicBool>,
}

impl ReaderHandle {
    /// Request a cooperative stop
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the reader to exit and return its result
    pub fn join(self) -> Result<()> {
        self.thread
            .join()
            .map_err(|_| StreamError::Channel("reader thread panicked".to_string()))?
    }
}
