//! Bounded time-series storage for decoded samples
//!
//! [`TimeWindowBuffer`] is the consumer side of the pipeline. It keeps one
//! shared ring buffer of elapsed times (one entry per sample) and one ring
//! buffer of values per field, all capped at `max_points` with FIFO eviction.
//!
//! Fields only grow on samples that carry them, so different fields can hold
//! different numbers of points. A field's points are paired with the *last*
//! `len(field)` entries of the time buffer, never by absolute index.

use crate::types::{Record, Sample};
use std::collections::{HashMap, VecDeque};

/// Points of one field inside a window: `(elapsed_seconds, value)`
pub type SeriesPoints = Vec<(f64, f64)>;

/// Fixed-capacity, per-field ring buffers keyed by field name
#[derive(Debug, Clone)]
pub struct TimeWindowBuffer {
    max_points: usize,
    /// Device time of the first sample ever seen, in seconds
    t0: Option<f64>,
    /// Elapsed seconds since `t0`, one per sample
    times: VecDeque<f64>,
    series: HashMap<String, VecDeque<f64>>,
    /// Field names from the most recent non-empty header
    schema_fields: Vec<String>,
    schema_version: u64,
    samples_seen: u64,
}

impl TimeWindowBuffer {
    /// Create an empty buffer holding at most `max_points` per series
    pub fn new(max_points: usize) -> Self {
        let max_points = max_points.max(1);
        Self {
            max_points,
            t0: None,
            times: VecDeque::with_capacity(max_points),
            series: HashMap::new(),
            schema_fields: Vec::new(),
            schema_version: 0,
            samples_seen: 0,
        }
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    /// Apply one record
    ///
    /// A header only changes the labels used for future samples; points
    /// already buffered are not relabelled.
    pub fn ingest(&mut self, record: &Record) {
        match record {
            Record::Header { raw_fields } => {
                if !raw_fields.is_empty() {
                    self.schema_fields = raw_fields.clone();
                    self.schema_version += 1;
                }
            }
            Record::Sample(sample) => self.push_sample(sample),
            Record::Unrecognized { .. } => {}
        }
    }

    /// Apply every record from an iterator, returning how many were seen
    pub fn ingest_all<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = Record>,
    {
        let mut count = 0;
        for record in records {
            self.ingest(&record);
            count += 1;
        }
        count
    }

    fn push_sample(&mut self, sample: &Sample) {
        let t_secs = sample.timestamp_ms / 1000.0;
        let t0 = *self.t0.get_or_insert(t_secs);
        let mut elapsed = t_secs - t0;

        // Keep the time axis non-decreasing if the device clock steps back
        if let Some(&last) = self.times.back() {
            if elapsed < last {
                tracing::debug!(
                    "Sample #{} is {:.3}s behind the previous one",
                    sample.source_sequence,
                    last - elapsed
                );
                elapsed = last;
            }
        }

        push_bounded(&mut self.times, elapsed, self.max_points);

        let max_points = self.max_points;
        for (name, value) in sample.iter() {
            let buffer = self
                .series
                .entry(name.to_string())
                .or_insert_with(|| VecDeque::with_capacity(max_points));
            push_bounded(buffer, value, max_points);
        }

        self.samples_seen += 1;
    }

    /// Points of each requested field within the trailing `window_seconds`
    ///
    /// Unknown fields map to an empty series.
    pub fn windowed_view<S: AsRef<str>>(
        &self,
        field_names: &[S],
        window_seconds: f64,
    ) -> HashMap<String, SeriesPoints> {
        let cutoff = self.latest_time().map(|t| t - window_seconds);

        field_names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                let points = match (cutoff, self.series.get(name)) {
                    (Some(cutoff), Some(values)) => self.pair_with_times(values, cutoff),
                    _ => Vec::new(),
                };
                (name.to_string(), points)
            })
            .collect()
    }

    /// Finite values of the requested fields within the window
    pub fn values_in_window<S: AsRef<str>>(&self, field_names: &[S], window_seconds: f64) -> Vec<f64> {
        let Some(cutoff) = self.latest_time().map(|t| t - window_seconds) else {
            return Vec::new();
        };

        field_names
            .iter()
            .filter_map(|name| self.series.get(name.as_ref()))
            .flat_map(|values| self.pair_with_times(values, cutoff))
            .map(|(_, v)| v)
            .filter(|v| v.is_finite())
            .collect()
    }

    fn pair_with_times(&self, values: &VecDeque<f64>, cutoff: f64) -> SeriesPoints {
        let len = values.len().min(self.times.len());
        let times = self.times.iter().skip(self.times.len() - len);
        let values = values.iter().skip(values.len() - len);

        times
            .zip(values)
            .skip_while(|(t, _)| **t < cutoff)
            .map(|(t, v)| (*t, *v))
            .collect()
    }

    /// Elapsed time of the newest sample
    pub fn latest_time(&self) -> Option<f64> {
        self.times.back().copied()
    }

    /// Shared time axis, oldest first
    pub fn times(&self) -> &VecDeque<f64> {
        &self.times
    }

    /// Buffered values of one field, oldest first
    pub fn series(&self, name: &str) -> Option<&VecDeque<f64>> {
        self.series.get(name)
    }

    /// Names of every field that has a buffer, sorted
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.series.keys().cloned().collect();
        names.sort();
        names
    }

    /// Field names from the latest header
    pub fn schema_fields(&self) -> &[String] {
        &self.schema_fields
    }

    /// Number of headers applied so far
    pub fn schema_version(&self) -> u64 {
        self.schema_version
    }

    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    /// Drop all points and forget `t0`; the schema labels are kept
    pub fn clear(&mut self) {
        self.t0 = None;
        self.times.clear();
        self.series.clear();
        self.samples_seen = 0;
    }
}

impl Default for TimeWindowBuffer {
    fn default() -> Self {
        Self::new(crate::types::DEFAULT_MAX_POINTS)
    }
}

#[inline]
fn push_bounded(buffer: &mut VecDeque<f64>, value: f64, max_points: usize) {
    if buffer.len() >= max_points {
        buffer.pop_front();
    }
    buffer.push_back(value);
}
