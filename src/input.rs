//! Host-supplied simulation inputs.
//!
//! The host thread builds a fresh [`InputSnapshot`] on every cook from the
//! previous one. Each field remembers whether it moved, and the snapshot's
//! revision advances only when something did.

use std::time::Duration;

use crate::output::ExtractionSet;
use crate::tracked::ChangeTracked;

/// Raw, untracked input values as read from the host's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct InputValues {
    /// Model definition text. Empty means "no model".
    pub source_text: String,
    /// Frame of the model to simulate.
    pub frame_index: u16,
    /// How far creases are folded, in `[-1, 1]`.
    pub fold_percentage: f32,
    /// Extract absolute vertex positions.
    pub extract_position: bool,
    /// Extract per-vertex velocity.
    pub extract_velocity: bool,
    /// Extract per-vertex error.
    pub extract_error: bool,
    /// Simulated time per wall-clock time, `>= 0`.
    pub time_scale: f32,
    /// Whether time scaling adapts to load.
    pub adaptive: bool,
    /// Share of the cook period the simulation may use, in `[0, 1]`.
    pub frame_budget: f32,
    /// Host's intended cook period. Zero when unknown.
    pub target_period: Duration,
}

impl Default for InputValues {
    fn default() -> Self {
        Self {
            source_text: String::new(),
            frame_index: 0,
            fold_percentage: 0.0,
            extract_position: true,
            extract_velocity: false,
            extract_error: false,
            time_scale: 1.0,
            adaptive: false,
            frame_budget: 1.0,
            target_period: Duration::ZERO,
        }
    }
}

fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

impl InputValues {
    /// Clamps every numeric field into its valid range.
    ///
    /// NaN is replaced by the field's default.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        self.fold_percentage = clamp_or(self.fold_percentage, -1.0, 1.0, defaults.fold_percentage);
        self.time_scale = clamp_or(self.time_scale, 0.0, f32::MAX, defaults.time_scale);
        self.frame_budget = clamp_or(self.frame_budget, 0.0, 1.0, defaults.frame_budget);
        self
    }
}

/// An immutable bundle of every simulation-affecting setting.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct InputSnapshot {
    /// Advances by one for every snapshot that differs from its predecessor.
    pub revision: u64,
    pub source_text: ChangeTracked<String>,
    pub frame_index: ChangeTracked<u16>,
    pub fold_percentage: ChangeTracked<f32>,
    pub extract_position: ChangeTracked<bool>,
    pub extract_velocity: ChangeTracked<bool>,
    pub extract_error: ChangeTracked<bool>,
    pub time_scale: ChangeTracked<f32>,
    pub adaptive: ChangeTracked<bool>,
    pub frame_budget: ChangeTracked<f32>,
    pub target_period: ChangeTracked<Duration>,
    /// Edge-triggered; the worker consumes it once.
    pub reset_requested: bool,
}

impl Default for InputSnapshot {
    fn default() -> Self {
        Self::from_values(0, InputValues::default())
    }
}

impl InputSnapshot {
    /// Creates a snapshot whose fields are all marked unchanged.
    #[must_use]
    pub fn from_values(revision: u64, values: InputValues) -> Self {
        let values = values.sanitized();
        Self {
            revision,
            source_text: ChangeTracked::unchanged(values.source_text),
            frame_index: ChangeTracked::unchanged(values.frame_index),
            fold_percentage: ChangeTracked::unchanged(values.fold_percentage),
            extract_position: ChangeTracked::unchanged(values.extract_position),
            extract_velocity: ChangeTracked::unchanged(values.extract_velocity),
            extract_error: ChangeTracked::unchanged(values.extract_error),
            time_scale: ChangeTracked::unchanged(values.time_scale),
            adaptive: ChangeTracked::unchanged(values.adaptive),
            frame_budget: ChangeTracked::unchanged(values.frame_budget),
            target_period: ChangeTracked::unchanged(values.target_period),
            reset_requested: false,
        }
    }

    /// Derives the successor snapshot after the host observed `values`.
    ///
    /// The revision advances by exactly one if any field differs.
    #[must_use]
    pub fn next(&self, values: InputValues) -> Self {
        let values = values.sanitized();
        let mut next = Self {
            revision: self.revision,
            source_text: self.source_text.update(values.source_text),
            frame_index: self.frame_index.update(values.frame_index),
            fold_percentage: self.fold_percentage.update(values.fold_percentage),
            extract_position: self.extract_position.update(values.extract_position),
            extract_velocity: self.extract_velocity.update(values.extract_velocity),
            extract_error: self.extract_error.update(values.extract_error),
            time_scale: self.time_scale.update(values.time_scale),
            adaptive: self.adaptive.update(values.adaptive),
            frame_budget: self.frame_budget.update(values.frame_budget),
            target_period: self.target_period.update(values.target_period),
            reset_requested: false,
        };
        if next.changed() {
            next.revision = self.revision + 1;
        }
        next
    }

    /// Marks this snapshot as carrying a reset request.
    #[must_use]
    pub fn with_reset(mut self) -> Self {
        self.reset_requested = true;
        self
    }

    /// True if any field other than the reset flag changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.source_text.changed
            || self.frame_index.changed
            || self.fold_percentage.changed
            || self.extract_position.changed
            || self.extract_velocity.changed
            || self.extract_error.changed
            || self.time_scale.changed
            || self.adaptive.changed
            || self.frame_budget.changed
            || self.target_period.changed
    }

    /// True if the model geometry (source or frame) changed.
    #[must_use]
    pub const fn geometry_changed(&self) -> bool {
        self.source_text.changed || self.frame_index.changed
    }

    /// True if any of the pacing knobs changed.
    #[must_use]
    pub const fn timing_changed(&self) -> bool {
        self.time_scale.changed
            || self.adaptive.changed
            || self.frame_budget.changed
            || self.target_period.changed
    }

    /// Which channels the host wants extracted.
    #[must_use]
    pub const fn extraction_set(&self) -> ExtractionSet {
        ExtractionSet {
            position: self.extract_position.value,
            velocity: self.extract_velocity.value,
            error: self.extract_error.value,
        }
    }

    /// The raw values carried by this snapshot.
    #[must_use]
    pub fn values(&self) -> InputValues {
        InputValues {
            source_text: self.source_text.value.clone(),
            frame_index: self.frame_index.value,
            fold_percentage: self.fold_percentage.value,
            extract_position: self.extract_position.value,
            extract_velocity: self.extract_velocity.value,
            extract_error: self.extract_error.value,
            time_scale: self.time_scale.value,
            adaptive: self.adaptive.value,
            frame_budget: self.frame_budget.value,
            target_period: self.target_period.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_source(source: &str) -> InputValues {
        InputValues {
            source_text: source.to_string(),
            ..InputValues::default()
        }
    }

    #[test]
    fn default_snapshot_is_unchanged_at_revision_zero() {
        let snapshot = InputSnapshot::default();
        assert_eq!(snapshot.revision, 0);
        assert!(!snapshot.changed());
        assert!(!snapshot.reset_requested);
    }

    #[test]
    fn identical_values_keep_revision() {
        let a = InputSnapshot::default().next(with_source("{}"));
        let b = a.next(with_source("{}"));
        assert_eq!(a.revision, 1);
        assert_eq!(b.revision, 1);
        assert!(!b.changed());
    }

    #[test]
    fn revision_counts_differing_submissions() {
        let payloads = ["a", "a", "b", "b", "b", "c", "a"];
        let mut snapshot = InputSnapshot::default();
        let mut previous = String::new();
        let mut expected = 0;
        for payload in payloads {
            if payload != previous {
                expected += 1;
            }
            previous = payload.to_string();
            let next = snapshot.next(with_source(payload));
            assert!(next.revision >= snapshot.revision);
            snapshot = next;
        }
        assert_eq!(snapshot.revision, expected);
    }

    #[test]
    fn geometry_changed_tracks_source_and_frame_only() {
        let base = InputSnapshot::default().next(with_source("x"));
        let percentage = base.next(InputValues {
            fold_percentage: 0.5,
            ..base.values()
        });
        assert!(percentage.changed());
        assert!(!percentage.geometry_changed());

        let frame = percentage.next(InputValues {
            frame_index: 2,
            ..percentage.values()
        });
        assert!(frame.geometry_changed());
    }

    #[test]
    fn reset_is_not_a_change() {
        let snapshot = InputSnapshot::default().with_reset();
        assert!(snapshot.reset_requested);
        assert!(!snapshot.changed());
        assert!(!snapshot.next(snapshot.values()).reset_requested);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let snapshot = InputSnapshot::default().next(InputValues {
            fold_percentage: 3.0,
            time_scale: -2.0,
            frame_budget: f32::NAN,
            ..InputValues::default()
        });
        assert_eq!(snapshot.fold_percentage.value, 1.0);
        assert_eq!(snapshot.time_scale.value, 0.0);
        assert_eq!(snapshot.frame_budget.value, 1.0);
        assert!(!snapshot.frame_budget.changed);
    }

    #[test]
    fn timing_knobs_count_as_changes() {
        let snapshot = InputSnapshot::default().next(InputValues {
            target_period: Duration::from_millis(16),
            ..InputValues::default()
        });
        assert!(snapshot.changed());
        assert!(snapshot.timing_changed());
        assert_eq!(snapshot.revision, 1);
    }

    #[test]
    fn extraction_set_mirrors_toggles() {
        let snapshot = InputSnapshot::default().next(InputValues {
            extract_position: false,
            extract_error: true,
            ..InputValues::default()
        });
        let set = snapshot.extraction_set();
        assert!(!set.position);
        assert!(!set.velocity);
        assert!(set.error);
    }
}
