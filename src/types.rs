//! Core data types for serialvis
//!
//! This module contains the fundamental data structures that flow through
//! the pipeline, from the reader thread to the presenter.
//!
//! # Main Types
//!
//! - [`Record`] - A decoded line: schema header, data sample, or pass-through text
//! - [`Sample`] - One timestamped DAT row, labelled with the schema active at decode time
//! - [`SchemaState`] - The versioned, ordered list of field names from the last HDR
//! - [`ReaderState`] - Connection state machine of the stream reader
//! - [`ReaderStats`] - Counters collected by the reader
//!
//! # Schema Snapshots
//!
//! Field names are held in an `Arc<[String]>`. A header replaces the whole
//! slice, so every [`Sample`] keeps a cheap handle to the exact schema it was
//! decoded against and never observes a partially updated list.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default number of points retained per field
pub const DEFAULT_MAX_POINTS: usize = 5000;

/// Default capacity of the reader -> consumer channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Versioned, ordered list of field names
#[derive(Debug, Clone, Default)]
pub struct SchemaState {
    fields: Arc<[String]>,
    version: u64,
}

impl SchemaState {
    /// Create an empty schema (version 0)
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schema from a field list, starting at version 1
    pub fn with_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Self::new();
        schema.replace(fields.into_iter().map(Into::into).collect());
        schema
    }

    /// Replace the field list wholesale.
    ///
    /// An empty list leaves the schema untouched and returns `false`.
    /// Every accepted replacement bumps the version, even if the names are
    /// identical to the current ones.
    pub fn replace(&mut self, fields: Vec<String>) -> bool {
        if fields.is_empty() {
            return false;
        }
        self.fields = fields.into();
        self.version += 1;
        true
    }

    /// Current field names in declaration order
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Shared handle to the current field names
    pub fn shared_fields(&self) -> Arc<[String]> {
        Arc::clone(&self.fields)
    }

    /// Monotonic version, 0 until the first header is applied
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

/// One decoded DAT row
#[derive(Debug, Clone)]
pub struct Sample {
    /// Sequence number assigned by the sending device
    pub source_sequence: i64,
    /// Device clock in milliseconds
    pub timestamp_ms: f64,
    /// Field names, one per value
    fields: Arc<[String]>,
    /// Values aligned with `fields`, NaN where the row had no value
    values: Vec<f64>,
}

impl Sample {
    /// Create a sample. `values` must have the same length as `fields`.
    pub fn new(source_sequence: i64, timestamp_ms: f64, fields: Arc<[String]>, values: Vec<f64>) -> Self {
        debug_assert_eq!(fields.len(), values.len());
        Self {
            source_sequence,
            timestamp_ms,
            fields,
            values,
        }
    }

    /// Field names in schema order
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Values in schema order
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Look up a value by field name
    pub fn get(&self, name: &str) -> Option<f64> {
        self.fields
            .iter()
            .position(|f| f == name)
            .map(|i| self.values[i])
    }

    /// Iterate `(name, value)` pairs in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.fields
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A decoded line from the device
#[derive(Debug, Clone)]
pub enum Record {
    /// Schema declaration; an empty field list leaves the schema unchanged
    Header { raw_fields: Vec<String> },
    /// A data row
    Sample(Sample),
    /// Any other line, passed through for diagnostics
    Unrecognized { raw_line: String },
}

impl Record {
    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Record::Header { .. } => "HDR",
            Record::Sample(_) => "DAT",
            Record::Unrecognized { .. } => "LOG",
        }
    }

    pub fn as_sample(&self) -> Option<&Sample> {
        match self {
            Record::Sample(sample) => Some(sample),
            _ => None,
        }
    }
}

/// Connection state of the stream reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReaderState {
    /// No open transport; the reader is trying to acquire one
    #[default]
    Disconnected,
    /// Transport open, lines are being read
    Connected,
    /// Stop requested, releasing resources
    Stopping,
    /// Terminal state
    Stopped,
}

impl std::fmt::Display for ReaderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderState::Disconnected => write!(f, "Disconnected"),
            ReaderState::Connected => write!(f, "Connected"),
            ReaderState::Stopping => write!(f, "Stopping..."),
            ReaderState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Counters collected by the stream reader
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderStats {
    /// Non-empty lines read from the transport
    pub lines_read: u64,
    /// Header records decoded
    pub headers: u64,
    /// Sample records decoded
    pub samples: u64,
    /// Lines passed through as unrecognized
    pub unrecognized: u64,
    /// HDR/DAT lines dropped because they failed to decode
    pub decode_errors: u64,
    /// Samples whose value count differed from the schema
    pub field_count_mismatches: u64,
    /// Failed attempts to open the transport
    pub open_failures: u64,
    /// Transport failures while connected
    pub connection_losses: u64,
    /// Rows appended to the CSV log
    pub rows_persisted: u64,
    /// Current schema version
    pub schema_version: u64,
}
