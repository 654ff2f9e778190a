//! The worker thread's loop.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::error::SolverError;
use crate::input::InputSnapshot;
use crate::output::ExtractionSet;
use crate::session::ModelSession;
use crate::solver::Solver;

use super::pacing::{CookClock, StepEstimator, StepPacer};
use super::status::{StatusEvent, StatusSender, WorkerState};
use super::Shared;

pub(crate) struct WorkerLoop<S: Solver> {
    shared: Arc<Shared>,
    status: StatusSender,
    session: ModelSession<S>,
    pacer: StepPacer,
    clock: CookClock,
    estimator: StepEstimator,
    /// Values the session currently reflects.
    applied: InputSnapshot,
    applied_revision: Option<u64>,
    extraction: ExtractionSet,
    /// Set only by a successful update. A failed update idles the loop even
    /// though the session keeps its last good model.
    loaded: bool,
    steps_since_output: u64,
    step_failing: bool,
}

impl<S: Solver> WorkerLoop<S> {
    pub(crate) fn new(solver: S, config: &WorkerConfig, shared: Arc<Shared>, status: StatusSender) -> Self {
        let applied = InputSnapshot::default();
        let extraction = applied.extraction_set();
        Self {
            shared,
            status,
            session: ModelSession::new(solver),
            pacer: StepPacer::from_config(config),
            clock: CookClock::default(),
            estimator: StepEstimator::default(),
            applied,
            applied_revision: None,
            extraction,
            loaded: false,
            steps_since_output: 0,
            step_failing: false,
        }
    }

    pub(crate) fn run(mut self) {
        debug!("worker loop entered");
        while !self.shared.stop_requested() {
            self.iterate();
        }
        self.shared.set_state(WorkerState::Stopped);
        self.emit(StatusEvent::Stopped { at: Utc::now() });
        debug!("worker loop exited");
    }

    fn emit(&self, event: StatusEvent) {
        self.status.emit(event, &self.shared.dropped_events);
    }

    fn iterate(&mut self) {
        let new_cook = self.clock.observe(self.shared.cook_stamp());
        let mut busy = new_cook;

        if self.loaded
            && self.extraction.any()
            && self.clock.should_extract(new_cook, self.shared.now())
        {
            busy |= self.try_extract();
        }

        if new_cook {
            self.poll_input();
        }

        if self.loaded {
            self.step();
            busy = true;
        }

        if !busy {
            thread::yield_now();
        }
    }

    /// Copies the solver state into the shared output. Returns false if the
    /// host holds the output lock.
    fn try_extract(&mut self) -> bool {
        let shared = Arc::clone(&self.shared);
        let Some(mut output) = shared.try_output() else {
            return false;
        };

        output.prepare(self.extraction, self.session.vertex_count());
        if let Err(err) = self.session.extract(output.extract_request()) {
            self.extraction_rejected(err);
            return true;
        }

        if output.positions_region().is_some() {
            let base = self.session.static_vertex_coords();
            if let Some(positions) = output.positions_mut() {
                for (position, offset) in positions.iter_mut().zip(base) {
                    *position += *offset;
                }
            }
        }

        let generation = self.session.geometry_generation();
        let face_count = self.session.face_count();
        if output.face_count() != face_count || output.indices_generation != Some(generation) {
            let written = self.session.face_indices(output.indices_mut(face_count));
            if written != 3 * face_count as usize {
                warn!(written, faces = face_count, "model wrote fewer indices than its face count");
            }
            output.indices_generation = Some(generation);
        }

        output.finish(self.applied_revision.unwrap_or(0), self.steps_since_output);
        self.steps_since_output = 0;
        self.clock.mark_packed();
        true
    }

    fn extraction_rejected(&mut self, err: SolverError) {
        error!(error = %err, "solver rejected extraction of a loaded model");
        if cfg!(debug_assertions) {
            panic!("solver rejected extraction of a loaded model: {err}");
        }
        self.emit(StatusEvent::ExtractRejected {
            error: err,
            at: Utc::now(),
        });
        self.clock.mark_packed();
    }

    /// Takes the pending input if the host submitted a new revision or a reset.
    fn poll_input(&mut self) {
        let snapshot = {
            let Some(mut pending) = self.shared.try_input() else {
                return;
            };
            if self.applied_revision == Some(pending.revision) && !pending.reset_requested {
                return;
            }
            let snapshot = pending.clone();
            pending.reset_requested = false;
            snapshot
        };
        self.apply_input(snapshot);
    }

    fn apply_input(&mut self, snapshot: InputSnapshot) {
        // Diff against what was applied, not against the host's previous
        // submission: submissions between two cooks collapse into one.
        let delta = self.applied.next(snapshot.values());
        let reset = snapshot.reset_requested;
        if reset {
            info!(revision = snapshot.revision, "reset requested");
        }

        if delta.timing_changed() {
            debug!(
                time_scale = snapshot.time_scale.value,
                adaptive = snapshot.adaptive.value,
                frame_budget = snapshot.frame_budget.value,
                target_period_ms = snapshot.target_period.value.as_secs_f64() * 1000.0,
                "pacing knobs changed"
            );
        }

        self.extraction = snapshot.extraction_set();

        let source = (reset || delta.source_text.changed).then_some(snapshot.source_text.value.as_str());
        let frame = (reset || delta.frame_index.changed).then_some(snapshot.frame_index.value);
        let fold_percentage = (reset || delta.fold_percentage.changed).then_some(snapshot.fold_percentage.value);
        let result = self.session.update(source, frame, fold_percentage);

        self.loaded = result.is_ok();
        let next = if self.loaded {
            WorkerState::Loaded
        } else {
            WorkerState::Idle
        };
        let previous = self.shared.set_state(next);
        if previous != next {
            info!(from = %previous, to = %next, revision = snapshot.revision, "worker state changed");
            self.step_failing = false;
        }

        let revision = snapshot.revision;
        self.applied_revision = Some(revision);
        self.applied = snapshot;

        let at = Utc::now();
        match result {
            Ok(()) => self.emit(StatusEvent::Imported { revision, at }),
            Err(error) => self.emit(StatusEvent::ImportFailed { revision, error, at }),
        }
    }

    fn step(&mut self) {
        let left = self.clock.left(self.shared.now());
        let count = self.pacer.step_count(left, self.estimator.per_step());

        let started = Instant::now();
        let result = self.session.step(count);
        self.estimator.record(started.elapsed(), count);

        match result {
            Ok(()) => {
                self.steps_since_output += u64::from(count);
                if self.step_failing {
                    self.step_failing = false;
                    info!("stepping recovered");
                }
            }
            Err(err) => {
                if !self.step_failing {
                    self.step_failing = true;
                    warn!(error = %err, steps = count, "step failed");
                    self.emit(StatusEvent::StepFailed {
                        error: err,
                        at: Utc::now(),
                    });
                }
            }
        }
    }
}
