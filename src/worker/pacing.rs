//! Cook timing and adaptive step pacing.
//!
//! All timestamps are offsets from the worker's epoch, so they fit in an
//! atomic and compare without touching `Instant` arithmetic on the hot path.

use std::time::Duration;

use crate::config::WorkerConfig;

/// Worker-side view of the host's cook cadence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CookClock {
    last_cook: Duration,
    inter_cook: Duration,
    packed_this_cook: bool,
}

impl CookClock {
    /// Feeds the latest published cook stamp. Returns true on a new cook.
    pub fn observe(&mut self, stamp: Duration) -> bool {
        if stamp == self.last_cook {
            return false;
        }
        self.inter_cook = stamp.saturating_sub(self.last_cook);
        self.last_cook = stamp;
        self.packed_this_cook = false;
        true
    }

    /// Start of the current cook window.
    #[must_use]
    pub const fn last_cook(&self) -> Duration {
        self.last_cook
    }

    /// Duration between the two most recent cooks.
    #[must_use]
    pub const fn inter_cook(&self) -> Duration {
        self.inter_cook
    }

    /// Time left in the current window if it lasts as long as the previous one.
    #[must_use]
    pub fn left(&self, now: Duration) -> Duration {
        let elapsed = now.saturating_sub(self.last_cook);
        self.inter_cook.saturating_sub(elapsed)
    }

    /// True once an extraction happened in the current window.
    #[must_use]
    pub const fn packed_this_cook(&self) -> bool {
        self.packed_this_cook
    }

    /// Records that this window already produced an output.
    pub fn mark_packed(&mut self) {
        self.packed_this_cook = true;
    }

    /// Extract on a fresh cook, or once past the middle of the window.
    #[must_use]
    pub fn should_extract(&self, new_cook: bool, now: Duration) -> bool {
        if self.packed_this_cook {
            return false;
        }
        new_cook || self.left(now) < self.inter_cook / 2
    }
}

/// Last-sample estimate of the wall-clock cost of one solver step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepEstimator {
    per_step: Option<Duration>,
}

impl StepEstimator {
    /// Replaces the estimate with `total / count`.
    pub fn record(&mut self, total: Duration, count: u32) {
        if count > 0 {
            self.per_step = Some(total / count);
        }
    }

    /// Cost of one step from the last recorded batch.
    #[must_use]
    pub const fn per_step(&self) -> Option<Duration> {
        self.per_step
    }
}

/// Turns remaining window time into a step count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepPacer {
    ratio: f64,
    min_steps: u32,
    max_steps: u32,
    fallback_steps: u32,
}

impl Default for StepPacer {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

impl StepPacer {
    /// Pacer with the ratio and step bounds of `config`.
    #[must_use]
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            ratio: config.pacing_ratio,
            min_steps: config.min_steps,
            max_steps: config.max_steps,
            fallback_steps: config.fallback_steps,
        }
    }

    /// `clamp(floor(left * ratio / per_step), min, max)`, or the fallback
    /// count while no non-zero estimate exists.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn step_count(&self, left: Duration, per_step: Option<Duration>) -> u32 {
        let Some(per_step) = per_step.filter(|d| !d.is_zero()) else {
            return self.fallback_steps;
        };
        let raw = (left.as_secs_f64() * self.ratio / per_step.as_secs_f64()).floor();
        raw.clamp(f64::from(self.min_steps), f64::from(self.max_steps)) as u32
    }
}
