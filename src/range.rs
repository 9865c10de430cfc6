//! Vertical auto-ranging for the live view
//!
//! [`estimate`] turns the currently visible values into a padded display
//! range and eases it towards the previous range so the axis does not
//! jitter on every refresh.
//!
//! Steps, in order:
//!
//! 1. min/max over the finite values (no values: keep the previous range)
//! 2. optionally stretch to include zero
//! 3. widen a zero-height range by ±1
//! 4. pad both ends by `margin_ratio` of the height
//! 5. exponential smoothing against the previous range
//!
//! The result is always finite with `max > min`, even for values near the
//! ends of the `f64` range where ±1 or the margin stop changing anything.

use serde::{Deserialize, Serialize};

/// Range reported before any data has been seen
pub const DEFAULT_RANGE: DisplayRange = DisplayRange { min: 0.0, max: 1.0 };

/// A vertical display range with `max > min`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayRange {
    pub min: f64,
    pub max: f64,
}

impl DisplayRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn is_usable(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.max > self.min
    }
}

impl From<(f64, f64)> for DisplayRange {
    fn from((min, max): (f64, f64)) -> Self {
        Self { min, max }
    }
}

/// Parameters of the auto-range computation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeSettings {
    /// Fraction of the data height added above and below
    pub margin_ratio: f64,
    /// Smoothing factor in [0, 1]; 1 follows the data immediately
    pub smoothing_alpha: f64,
    /// Stretch the range so it always contains zero
    pub include_zero: bool,
    /// User-forced range; bypasses estimation
    pub fixed: Option<DisplayRange>,
}

impl Default for RangeSettings {
    fn default() -> Self {
        Self {
            margin_ratio: 0.05,
            smoothing_alpha: 0.25,
            include_zero: false,
            fixed: None,
        }
    }
}

/// Compute the next display range.
///
/// Non-finite values are ignored. Without any finite value the previous
/// range is returned unchanged, or [`DEFAULT_RANGE`] on the first call.
pub fn estimate<I>(
    current_values: I,
    prev_range: Option<DisplayRange>,
    margin_ratio: f64,
    smoothing_alpha: f64,
    include_zero: bool,
) -> DisplayRange
where
    I: IntoIterator<Item = f64>,
{
    let bounds = current_values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        });

    let Some((mut vmin, mut vmax)) = bounds else {
        return prev_range.unwrap_or(DEFAULT_RANGE);
    };

    if include_zero {
        vmin = vmin.min(0.0);
        vmax = vmax.max(0.0);
    }

    if vmin == vmax {
        vmin -= 1.0;
        vmax += 1.0;
    }

    // Scaled separately so the height of a range spanning most of f64
    // does not overflow
    let pad = vmax * margin_ratio - vmin * margin_ratio;
    let pad = if pad.is_nan() { 0.0 } else { pad };
    let raw = finite_span(vmin - pad, vmax + pad);

    match prev_range.filter(DisplayRange::is_usable) {
        None => raw,
        Some(prev) => {
            let alpha = if smoothing_alpha.is_nan() {
                1.0
            } else {
                smoothing_alpha.clamp(0.0, 1.0)
            };
            finite_span(
                prev.min * (1.0 - alpha) + raw.min * alpha,
                prev.max * (1.0 - alpha) + raw.max * alpha,
            )
        }
    }
}

/// Clamp to finite bounds and open up a range that has no height left
fn finite_span(lo: f64, hi: f64) -> DisplayRange {
    let mut lo = lo.max(f64::MIN).min(f64::MAX);
    let mut hi = hi.min(f64::MAX).max(f64::MIN);

    if !(hi > lo) {
        let half = lo.abs().max(hi.abs()).max(1.0) * 1e-9;
        let mid = lo / 2.0 + hi / 2.0;
        lo = (mid - half).max(f64::MIN);
        hi = (mid + half).min(f64::MAX);
    }
    DisplayRange::new(lo, hi)
}

/// Stateful estimator holding the previous range between refreshes
#[derive(Debug, Clone, Default)]
pub struct AutoRangeEstimator {
    settings: RangeSettings,
    prev: Option<DisplayRange>,
}

impl AutoRangeEstimator {
    pub fn new(settings: RangeSettings) -> Self {
        Self {
            settings,
            prev: None,
        }
    }

    pub fn settings(&self) -> &RangeSettings {
        &self.settings
    }

    /// Replace the settings and forget the smoothing history
    pub fn set_settings(&mut self, settings: RangeSettings) {
        self.settings = settings;
        self.reset();
    }

    /// Range from the last update, if any
    pub fn current(&self) -> Option<DisplayRange> {
        self.settings.fixed.or(self.prev)
    }

    /// Feed the visible values of this refresh and get the range to draw
    pub fn update<I>(&mut self, values: I) -> DisplayRange
    where
        I: IntoIterator<Item = f64>,
    {
        if let Some(fixed) = self.settings.fixed {
            return fixed;
        }

        let next = estimate(
            values,
            self.prev,
            self.settings.margin_ratio,
            self.settings.smoothing_alpha,
            self.settings.include_zero,
        );
        self.prev = Some(next);
        next
    }

    /// Forget the smoothing history
    pub fn reset(&mut self) {
        self.prev = None;
    }

    /// Switch between a fixed range and auto mode.
    ///
    /// Going fixed pins the range currently shown; going back to auto
    /// starts smoothing from scratch.
    pub fn toggle_fixed(&mut self) -> Option<DisplayRange> {
        match self.settings.fixed {
            Some(_) => {
                self.settings.fixed = None;
                self.reset();
                None
            }
            None => {
                let pinned = self.prev.unwrap_or(DEFAULT_RANGE);
                self.settings.fixed = Some(pinned);
                Some(pinned)
            }
        }
    }

    /// Flip zero inclusion and restart smoothing
    pub fn toggle_include_zero(&mut self) -> bool {
        self.settings.include_zero = !self.settings.include_zero;
        self.reset();
        self.settings.include_zero
    }
}
