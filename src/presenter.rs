//! Consumer side of the pipeline
//!
//! The [`Presenter`] drains the record channel on every refresh tick, feeds
//! the [`TimeWindowBuffer`], and produces a [`Frame`] holding everything a
//! renderer needs: windowed points, the vertical range and the x limits.
//!
//! All mutable view state (plotted fields, time window, range settings and
//! the smoothing history) lives in [`ViewState`]. It changes either on a
//! refresh or through [`Presenter::handle_input`].

use crate::buffer::{SeriesPoints, TimeWindowBuffer};
use crate::config::ViewConfig;
use crate::range::{AutoRangeEstimator, DisplayRange, RangeSettings};
use crate::types::Record;
use crossbeam_channel::Receiver;
use std::collections::HashMap;

/// Field names plotted by default, in display order
pub const PREFERRED_FIELDS: [&str; 7] = ["ax", "ay", "az", "gx", "gy", "gz", "dt_ms"];

/// Maximum number of automatically selected fields
pub const MAX_AUTO_FIELDS: usize = 6;

/// Fields to plot when none were requested.
///
/// Uses the preferred IMU names present in the schema, in preferred order;
/// otherwise the first three schema fields.
pub fn choose_auto_fields(schema_fields: &[String]) -> Vec<String> {
    let mut chosen: Vec<String> = PREFERRED_FIELDS
        .iter()
        .filter(|name| schema_fields.iter().any(|f| f == *name))
        .map(|name| name.to_string())
        .collect();

    if chosen.is_empty() {
        chosen = schema_fields.iter().take(3).cloned().collect();
    }
    chosen.truncate(MAX_AUTO_FIELDS);
    chosen
}

/// Discrete user input handled between refreshes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewInput {
    /// Switch between auto range and a range pinned at the current one
    ToggleAutoRange,
    /// Flip zero inclusion of the auto range
    ToggleIncludeZero,
}

impl ViewInput {
    /// Key help shown at startup
    pub const KEY_HELP: &'static str = "a = toggle auto/fixed Y range, 0 = toggle include zero";

    /// Input bound to a key, if any
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            'a' | 'A' => Some(ViewInput::ToggleAutoRange),
            '0' => Some(ViewInput::ToggleIncludeZero),
            _ => None,
        }
    }
}

/// Mutable state of the view
#[derive(Debug, Clone)]
pub struct ViewState {
    /// Fields to plot; empty until chosen
    pub target_fields: Vec<String>,
    /// Trailing time window in seconds
    pub window_seconds: f64,
    /// Range settings currently in effect
    pub range_settings: RangeSettings,
    estimator: AutoRangeEstimator,
}

impl ViewState {
    pub fn from_config(config: &ViewConfig) -> Self {
        let range_settings = config.range_settings();
        Self {
            target_fields: config.plot_fields.clone(),
            window_seconds: config.window_seconds,
            range_settings,
            estimator: AutoRangeEstimator::new(range_settings),
        }
    }

    pub fn is_auto_range(&self) -> bool {
        self.range_settings.fixed.is_none()
    }
}

/// One rendered refresh
#[derive(Debug, Clone)]
pub struct Frame {
    /// Plotted fields in display order
    pub fields: Vec<String>,
    /// `(elapsed_seconds, value)` points per plotted field
    pub series: HashMap<String, SeriesPoints>,
    pub y_range: DisplayRange,
    /// `(max(0, tmax - window), tmax + 5% of window)`
    pub x_limits: (f64, f64),
    /// Records taken off the channel this tick
    pub ingested: usize,
    /// Unrecognized lines received this tick
    pub diagnostics: Vec<String>,
}

impl Frame {
    /// Newest value of a plotted field
    pub fn latest(&self, field: &str) -> Option<f64> {
        self.series
            .get(field)
            .and_then(|points| points.last())
            .map(|(_, v)| *v)
    }

    /// Number of points across all plotted fields
    pub fn point_count(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }
}

/// Periodic consumer of the record channel
pub struct Presenter {
    receiver: Receiver<Record>,
    buffer: TimeWindowBuffer,
    view: ViewState,
}

impl Presenter {
    pub fn new(receiver: Receiver<Record>, config: &ViewConfig, max_points: usize) -> Self {
        Self {
            receiver,
            buffer: TimeWindowBuffer::new(max_points),
            view: ViewState::from_config(config),
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn buffer(&self) -> &TimeWindowBuffer {
        &self.buffer
    }

    /// Windowed points of `fields`
    pub fn pull_window<S: AsRef<str>>(
        &self,
        fields: &[S],
        window_seconds: f64,
    ) -> HashMap<String, SeriesPoints> {
        self.buffer.windowed_view(fields, window_seconds)
    }

    /// Vertical range for `fields` over the current window
    ///
    /// Changing `settings` between calls restarts the smoothing.
    pub fn current_range<S: AsRef<str>>(
        &mut self,
        fields: &[S],
        settings: &RangeSettings,
    ) -> DisplayRange {
        if self.view.estimator.settings() != settings {
            self.view.estimator.set_settings(*settings);
            self.view.range_settings = *settings;
        }
        let values = self
            .buffer
            .values_in_window(fields, self.view.window_seconds);
        self.view.estimator.update(values)
    }

    /// Apply a user input to the view state
    pub fn handle_input(&mut self, input: ViewInput) {
        match input {
            ViewInput::ToggleAutoRange => match self.view.estimator.toggle_fixed() {
                Some(range) => {
                    tracing::info!("Y range fixed at [{:.3}, {:.3}]", range.min, range.max)
                }
                None => tracing::info!("Y auto-range enabled"),
            },
            ViewInput::ToggleIncludeZero => {
                let include = self.view.estimator.toggle_include_zero();
                tracing::info!("Include zero in Y range: {}", include);
            }
        }
        self.view.range_settings = *self.view.estimator.settings();
    }

    /// Drain pending records and build the next frame
    pub fn update(&mut self) -> Frame {
        let mut ingested = 0;
        let mut diagnostics = Vec::new();

        for record in self.receiver.try_iter() {
            match &record {
                Record::Header { raw_fields } => {
                    if self.view.target_fields.is_empty() && !raw_fields.is_empty() {
                        self.view.target_fields = choose_auto_fields(raw_fields);
                        tracing::info!("Plotting fields: {}", self.view.target_fields.join(", "));
                    }
                }
                Record::Unrecognized { raw_line } => {
                    tracing::info!("{}", raw_line);
                    diagnostics.push(raw_line.clone());
                }
                Record::Sample(_) => {}
            }
            self.buffer.ingest(&record);
            ingested += 1;
        }

        let fields = self.view.target_fields.clone();
        let window = self.view.window_seconds;
        let settings = self.view.range_settings;

        let series = self.pull_window(&fields, window);
        let y_range = self.current_range(&fields, &settings);
        let tmax = self.buffer.latest_time().unwrap_or(0.0);
        let x_limits = ((tmax - window).max(0.0), tmax + 0.05 * window);

        Frame {
            fields,
            series,
            y_range,
            x_limits,
            ingested,
            diagnostics,
        }
    }
}
