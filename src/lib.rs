//! # serialvis: live plotting of line-oriented serial telemetry
//!
//! A streaming pipeline for devices that print schema-tagged text records
//! over a serial link. `HDR` records announce the field names, `DAT` records
//! carry one timestamped sample, and anything else is passed through as a
//! device diagnostic.
//!
//! ## Architecture
//!
//! - **Backend**: a reader thread owns the serial port, decodes lines and
//!   optionally mirrors samples to CSV
//! - **Presenter**: drains records on a fixed clock into per-field ring
//!   buffers and computes a smoothed vertical range
//! - **Communication**: one bounded crossbeam channel of [`Record`]s, so a
//!   slow consumer stalls the reader instead of dropping data
//!
//! ## Configuration
//!
//! Settings are read from `config.toml` in the platform config directory
//! under `serialvis` when present, and overridden from the command line.
//!
//! ## Example
//!
//! ```ignore
//! use serialvis::{
//!     backend::{SerialLineSource, StreamBackend},
//!     config::AppConfig,
//!     presenter::Presenter,
//! };
//!
//! let config = AppConfig::default();
//! let source = SerialLineSource::from_config(&config.serial);
//! let (backend, frontend) = StreamBackend::new(config.clone(), Box::new(source));
//! let handle = backend.spawn()?;
//!
//! let mut presenter = Presenter::new(
//!     frontend.receiver.clone(),
//!     &config.view,
//!     config.collection.max_points,
//! );
//! loop {
//!     let frame = presenter.update();
//!     // render frame.series within frame.x_limits / frame.y_range
//!     std::thread::sleep(config.view.refresh_interval());
//! }
//! ```

pub mod backend;
pub mod buffer;
pub mod config;
pub mod decoder;
pub mod error;
pub mod presenter;
pub mod range;
pub mod types;

// Re-export commonly used types
pub use backend::{FrontendReceiver, LineSource, StreamBackend, StreamReader};
pub use buffer::TimeWindowBuffer;
pub use config::AppConfig;
pub use decoder::{decode, decode_lossy, RecordDecoder};
pub use error::{DecodeError, Result, ResultExt, StreamError, TransportError};
pub use presenter::{Frame, Presenter, ViewInput};
pub use range::{AutoRangeEstimator, DisplayRange, RangeSettings};
pub use types::{ReaderState, ReaderStats, Record, Sample, SchemaState};
