//! Kinematic reference solver with call instrumentation.
//!
//! `InstrumentedSolver` does no physics. It lifts every vertex along `z` in
//! proportion to the fold percentage, converging over a fixed number of
//! steps, which is enough to exercise the worker's pacing, extraction and
//! error paths. A shared [`SolverRecorder`] counts every call and can inject
//! failures while the solver is owned by a worker thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::error::{ParseError, SolverError};
use crate::fold::FoldModel;

use super::{ExtractRequest, FrameIndex, Solver, SolverModel};

/// Recent step counts kept by the recorder.
const STEP_HISTORY_CAPACITY: usize = 1024;

/// Fraction of the full lift gained per step.
const DEFAULT_STEP_GAIN: f32 = 0.001;

#[derive(Debug, Default)]
struct RecorderInner {
    parse_calls: AtomicU64,
    load_calls: AtomicU64,
    fold_percentage_calls: AtomicU64,
    step_calls: AtomicU64,
    steps_total: AtomicU64,
    extract_calls: AtomicU64,
    step_history: Mutex<VecDeque<u32>>,
    fail_load: AtomicBool,
    reject_fold_percentage: AtomicBool,
    fail_step: AtomicBool,
    fail_extract: AtomicBool,
    step_delay_nanos: AtomicU64,
}

/// Point-in-time copy of the recorder counters.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallCounts {
    pub parse_calls: u64,
    pub load_calls: u64,
    pub fold_percentage_calls: u64,
    pub step_calls: u64,
    pub steps_total: u64,
    pub extract_calls: u64,
}

impl CallCounts {
    /// Every solver call, of any kind.
    #[must_use]
    pub const fn total_calls(&self) -> u64 {
        self.parse_calls + self.load_calls + self.fold_percentage_calls + self.step_calls + self.extract_calls
    }
}

/// Shared view into an [`InstrumentedSolver`]'s activity.
#[derive(Debug, Clone, Default)]
pub struct SolverRecorder {
    inner: Arc<RecorderInner>,
}

impl SolverRecorder {
    /// Snapshot of the call counters.
    #[must_use]
    pub fn counts(&self) -> CallCounts {
        let i = &self.inner;
        CallCounts {
            parse_calls: i.parse_calls.load(Ordering::Acquire),
            load_calls: i.load_calls.load(Ordering::Acquire),
            fold_percentage_calls: i.fold_percentage_calls.load(Ordering::Acquire),
            step_calls: i.step_calls.load(Ordering::Acquire),
            steps_total: i.steps_total.load(Ordering::Acquire),
            extract_calls: i.extract_calls.load(Ordering::Acquire),
        }
    }

    /// Step counts of the most recent `step` calls, oldest first.
    #[must_use]
    pub fn step_history(&self) -> Vec<u32> {
        self.inner
            .step_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    /// Makes subsequent loads fail.
    pub fn set_fail_load(&self, fail: bool) {
        self.inner.fail_load.store(fail, Ordering::Release);
    }

    /// Makes subsequent fold percentage updates fail.
    pub fn set_reject_fold_percentage(&self, reject: bool) {
        self.inner.reject_fold_percentage.store(reject, Ordering::Release);
    }

    /// Makes subsequent steps fail.
    pub fn set_fail_step(&self, fail: bool) {
        self.inner.fail_step.store(fail, Ordering::Release);
    }

    /// Makes subsequent extractions fail.
    pub fn set_fail_extract(&self, fail: bool) {
        self.inner.fail_extract.store(fail, Ordering::Release);
    }

    /// Simulated cost of a single step.
    pub fn set_step_delay(&self, delay: Duration) {
        let nanos = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
        self.inner.step_delay_nanos.store(nanos, Ordering::Release);
    }

    fn record_step(&self, count: u32) {
        self.inner.step_calls.fetch_add(1, Ordering::AcqRel);
        self.inner.steps_total.fetch_add(u64::from(count), Ordering::AcqRel);
        let mut history = self
            .inner
            .step_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if history.len() == STEP_HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(count);
    }

    fn step_delay(&self, count: u32) -> Duration {
        Duration::from_nanos(self.inner.step_delay_nanos.load(Ordering::Acquire)).saturating_mul(count)
    }
}

#[derive(Debug, Clone, Copy)]
struct Loaded {
    vertex_count: usize,
}

/// Kinematic stand-in for a physical fold solver.
#[derive(Debug)]
pub struct InstrumentedSolver {
    recorder: SolverRecorder,
    loaded: Option<Loaded>,
    fold_percentage: f32,
    progress: f32,
    last_gain: f32,
    step_gain: f32,
}

impl Default for InstrumentedSolver {
    fn default() -> Self {
        Self::with_recorder(SolverRecorder::default())
    }
}

impl InstrumentedSolver {
    /// Creates a solver reporting into `recorder`.
    #[must_use]
    pub fn with_recorder(recorder: SolverRecorder) -> Self {
        Self {
            recorder,
            loaded: None,
            fold_percentage: 0.0,
            progress: 0.0,
            last_gain: 0.0,
            step_gain: DEFAULT_STEP_GAIN,
        }
    }

    /// Sets the fraction of the full lift gained per step.
    #[must_use]
    pub fn with_step_gain(mut self, gain: f32) -> Self {
        self.step_gain = gain.max(0.0);
        self
    }

    /// The recorder this solver reports into.
    #[must_use]
    pub fn recorder(&self) -> &SolverRecorder {
        &self.recorder
    }

    fn fill(dest: Option<&mut [f32]>, expected: usize, channel: &'static str, value: impl Fn(usize) -> f32) -> Result<(), SolverError> {
        let Some(dest) = dest else {
            return Ok(());
        };
        if dest.len() != expected {
            return Err(SolverError::RegionMismatch {
                channel,
                expected,
                actual: dest.len(),
            });
        }
        for (i, slot) in dest.iter_mut().enumerate() {
            *slot = value(i);
        }
        Ok(())
    }
}

impl Solver for InstrumentedSolver {
    type Model = FoldModel;

    fn parse(&mut self, source: &[u8]) -> Result<FoldModel, ParseError> {
        self.recorder.inner.parse_calls.fetch_add(1, Ordering::AcqRel);
        FoldModel::parse(source)
    }

    fn load(&mut self, model: &FoldModel, frame: FrameIndex) -> Result<(), SolverError> {
        self.recorder.inner.load_calls.fetch_add(1, Ordering::AcqRel);
        self.loaded = None;
        if self.recorder.inner.fail_load.load(Ordering::Acquire) {
            return Err(SolverError::Rejected {
                reason: "load disabled by recorder".to_string(),
            });
        }
        model.validate_frame(frame)?;
        self.loaded = Some(Loaded {
            vertex_count: model.vertex_count(frame) as usize,
        });
        self.progress = 0.0;
        self.last_gain = 0.0;
        Ok(())
    }

    fn set_fold_percentage(&mut self, percentage: f32) -> Result<(), SolverError> {
        self.recorder.inner.fold_percentage_calls.fetch_add(1, Ordering::AcqRel);
        if self.loaded.is_none() {
            return Err(SolverError::NotLoaded);
        }
        if self.recorder.inner.reject_fold_percentage.load(Ordering::Acquire) {
            return Err(SolverError::Rejected {
                reason: "fold percentage disabled by recorder".to_string(),
            });
        }
        self.fold_percentage = percentage.clamp(-1.0, 1.0);
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn step(&mut self, count: u32) -> Result<(), SolverError> {
        self.recorder.record_step(count);
        if self.loaded.is_none() {
            return Err(SolverError::NotLoaded);
        }
        if self.recorder.inner.fail_step.load(Ordering::Acquire) {
            return Err(SolverError::Diverged {
                steps: self.recorder.inner.steps_total.load(Ordering::Acquire),
            });
        }

        let delay = self.recorder.step_delay(count);
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let before = self.progress;
        self.progress = (self.progress + self.step_gain * count as f32).min(1.0);
        self.last_gain = self.progress - before;
        Ok(())
    }

    fn extract(&mut self, request: ExtractRequest<'_>) -> Result<(), SolverError> {
        self.recorder.inner.extract_calls.fetch_add(1, Ordering::AcqRel);
        let Some(loaded) = self.loaded else {
            return Err(SolverError::NotLoaded);
        };
        if self.recorder.inner.fail_extract.load(Ordering::Acquire) {
            return Err(SolverError::Rejected {
                reason: "extract disabled by recorder".to_string(),
            });
        }

        let lift = self.fold_percentage * self.progress;
        let speed = self.fold_percentage * self.last_gain;
        let residual = self.fold_percentage.abs() * (1.0 - self.progress);
        let n = loaded.vertex_count;

        Self::fill(request.position, 3 * n, "position", |i| if i % 3 == 2 { lift } else { 0.0 })?;
        Self::fill(request.velocity, 3 * n, "velocity", |i| if i % 3 == 2 { speed } else { 0.0 })?;
        Self::fill(request.error, n, "error", |_| residual)?;
        Ok(())
    }
}
