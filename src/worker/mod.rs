//! Background simulation worker.
//!
//! The worker runs one solver on a dedicated thread and paces stepping
//! against the host's cook cadence. The host talks to it through three
//! channels of shared state:
//!
//! - a cook timestamp the host publishes at the start of every cook
//! - the latest [`InputSnapshot`], replaced wholesale by the host
//! - the latest [`OutputSnapshot`], written by the worker in place
//!
//! The worker only ever *tries* to lock either snapshot, so a host holding a
//! lock costs the worker at most one iteration. Status events travel over a
//! bounded channel and are dropped, with a counter, when the host does not
//! drain them.

mod pacing;
mod runner;
mod status;

pub use pacing::{CookClock, StepEstimator, StepPacer};
pub use status::{StatusEvent, WorkerId, WorkerState};

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use tracing::{debug, info, info_span, warn};

use crate::config::WorkerConfig;
use crate::error::{FoldSimResult, ImportError, WorkerError};
use crate::input::InputSnapshot;
use crate::output::OutputSnapshot;
use crate::solver::Solver;

use runner::WorkerLoop;
use status::{StateCell, StatusSender};

/// State shared between the host handle and the worker thread.
#[derive(Debug)]
pub(crate) struct Shared {
    epoch: Instant,
    /// Nanoseconds since `epoch` of the latest cook, 0 before the first.
    cook_stamp: AtomicU64,
    stop: AtomicBool,
    state: StateCell,
    input: Mutex<InputSnapshot>,
    output: Mutex<OutputSnapshot>,
    dropped_events: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            cook_stamp: AtomicU64::new(0),
            stop: AtomicBool::new(false),
            state: StateCell::new(WorkerState::Idle),
            input: Mutex::new(InputSnapshot::default()),
            output: Mutex::new(OutputSnapshot::new()),
            dropped_events: AtomicU64::new(0),
        }
    }

    /// Time since the worker epoch.
    pub(crate) fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    pub(crate) fn cook_stamp(&self) -> Duration {
        Duration::from_nanos(self.cook_stamp.load(Ordering::Acquire))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn publish_cook(&self, at: Instant) {
        let nanos = at.saturating_duration_since(self.epoch).as_nanos();
        // 0 is reserved for "never cooked".
        let nanos = (nanos.min(u128::from(u64::MAX)) as u64).max(1);
        self.cook_stamp.store(nanos, Ordering::Release);
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Locks the input without blocking. A poisoned lock is recovered.
    pub(crate) fn try_input(&self) -> Option<MutexGuard<'_, InputSnapshot>> {
        match self.input.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Locks the output without blocking. A poisoned lock is recovered.
    pub(crate) fn try_output(&self) -> Option<MutexGuard<'_, OutputSnapshot>> {
        match self.output.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    pub(crate) fn set_state(&self, state: WorkerState) -> WorkerState {
        self.state.swap(state)
    }
}

/// Read access to the latest extraction.
///
/// Holds the output lock; the worker skips extraction while a guard lives.
#[derive(Debug)]
pub struct OutputGuard<'a> {
    guard: MutexGuard<'a, OutputSnapshot>,
}

impl Deref for OutputGuard<'_> {
    type Target = OutputSnapshot;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

/// Host-side handle to a running simulation worker.
///
/// Dropping the handle stops the worker and joins its thread.
#[derive(Debug)]
pub struct SimulationWorker {
    id: WorkerId,
    shared: Arc<Shared>,
    status_rx: Receiver<StatusEvent>,
    join: Option<JoinHandle<()>>,
    last_input: InputSnapshot,
    last_import_error: Option<ImportError>,
}

impl SimulationWorker {
    /// Validates `config` and starts a worker thread that owns `solver`.
    pub fn start<S>(solver: S, config: WorkerConfig) -> FoldSimResult<Self>
    where
        S: Solver + 'static,
    {
        config.validate()?;

        let id = WorkerId::new();
        let shared = Arc::new(Shared::new());
        let (status_tx, status_rx) = bounded::<StatusEvent>(config.status_capacity);

        let thread_shared = Arc::clone(&shared);
        let thread_name = config.thread_name.clone();
        let join = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let span = info_span!("worker", id = %id);
                let _entered = span.enter();
                WorkerLoop::new(solver, &config, thread_shared, StatusSender::new(status_tx)).run();
            })
            .map_err(WorkerError::Spawn)?;

        info!(id = %id, "worker started");

        Ok(Self {
            id,
            shared,
            status_rx,
            join: Some(join),
            last_input: InputSnapshot::default(),
            last_import_error: None,
        })
    }

    /// This worker's id.
    #[must_use]
    pub const fn id(&self) -> WorkerId {
        self.id
    }

    /// Marks the start of a host cook at `at`.
    pub fn publish_cook(&self, at: Instant) {
        self.shared.publish_cook(at);
    }

    /// Marks the start of a host cook now.
    pub fn notify_cook(&self) {
        self.publish_cook(Instant::now());
    }

    /// Replaces the shared input. The worker picks it up on its next cook.
    pub fn submit_input(&mut self, snapshot: InputSnapshot) -> FoldSimResult<()> {
        {
            let mut guard = self
                .shared
                .input
                .lock()
                .map_err(|_| WorkerError::Poisoned { context: "input" })?;
            guard.clone_from(&snapshot);
        }
        debug!(id = %self.id, revision = snapshot.revision, reset = snapshot.reset_requested, "input submitted");
        self.last_input = snapshot;
        Ok(())
    }

    /// The snapshot most recently passed to [`submit_input`](Self::submit_input).
    #[must_use]
    pub const fn get_input(&self) -> &InputSnapshot {
        &self.last_input
    }

    /// Locks the latest extraction, waiting for the worker if it is writing.
    pub fn query_output(&self) -> FoldSimResult<OutputGuard<'_>> {
        let guard = self
            .shared
            .output
            .lock()
            .map_err(|_| WorkerError::Poisoned { context: "output" })?;
        Ok(OutputGuard { guard })
    }

    /// Like [`query_output`](Self::query_output), but gives up if the worker
    /// is writing right now.
    #[must_use]
    pub fn try_query_output(&self) -> Option<OutputGuard<'_>> {
        self.shared.output.try_lock().ok().map(|guard| OutputGuard { guard })
    }

    /// Current coarse state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.shared.state.load()
    }

    /// True until the worker thread has been joined.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.join.is_some()
    }

    fn record(&mut self, event: &StatusEvent) {
        match event {
            StatusEvent::Imported { .. } => self.last_import_error = None,
            StatusEvent::ImportFailed { error, .. } => self.last_import_error = Some(error.clone()),
            _ => {}
        }
    }

    /// Drains every pending status event.
    pub fn poll_status(&mut self) -> Vec<StatusEvent> {
        let events: Vec<StatusEvent> = self.status_rx.try_iter().collect();
        for event in &events {
            self.record(event);
        }
        events
    }

    /// Waits up to `timeout` for the next status event.
    pub fn recv_status_timeout(&mut self, timeout: Duration) -> Option<StatusEvent> {
        match self.status_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.record(&event);
                Some(event)
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// The import failure from the last applied revision, as seen through
    /// the status events received so far.
    #[must_use]
    pub const fn last_import_error(&self) -> Option<&ImportError> {
        self.last_import_error.as_ref()
    }

    /// Status events lost because the channel was full.
    #[must_use]
    pub fn dropped_status_events(&self) -> u64 {
        self.shared.dropped_events.load(Ordering::Relaxed)
    }

    /// Stops the worker and joins its thread. Idempotent.
    pub fn stop(&mut self) -> FoldSimResult<()> {
        self.shared.stop.store(true, Ordering::Release);
        let Some(join) = self.join.take() else {
            return Ok(());
        };
        let joined = join.join();
        self.shared.set_state(WorkerState::Stopped);
        if joined.is_err() {
            return Err(WorkerError::Panicked.into());
        }
        info!(id = %self.id, "worker stopped");
        Ok(())
    }
}

impl Drop for SimulationWorker {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(id = %self.id, error = %err, "worker did not stop cleanly");
        }
    }
}

