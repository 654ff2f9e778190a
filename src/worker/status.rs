//! Worker lifecycle state and status events.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use crossbeam_channel::{Sender, TrySendError};
use uuid::Uuid;

use crate::error::{ImportError, SolverError};

/// Unique identifier of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    /// Creates a new random worker ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker:{}", self.0)
    }
}

/// Coarse worker state, readable from the host without locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerState {
    /// Running with no model loaded.
    Idle = 0,
    /// Running with a model loaded and stepping.
    Loaded = 1,
    /// The worker thread has exited.
    Stopped = 2,
}

impl WorkerState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Loaded,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Loaded => "loaded",
            Self::Stopped => "stopped",
        })
    }
}

/// Atomic cell holding a [`WorkerState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) const fn new(state: WorkerState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Stores `state` and returns the previous one.
    pub(crate) fn swap(&self, state: WorkerState) -> WorkerState {
        WorkerState::from_u8(self.0.swap(state as u8, Ordering::AcqRel))
    }
}

/// Something the worker wants the host to know about.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// An input revision was applied and a model is loaded.
    Imported { revision: u64, at: DateTime<Utc> },
    /// An input revision was applied but left the worker without a usable model.
    ImportFailed {
        revision: u64,
        error: ImportError,
        at: DateTime<Utc>,
    },
    /// Stepping started failing.
    StepFailed { error: SolverError, at: DateTime<Utc> },
    /// The solver refused an extraction of a loaded model.
    ExtractRejected { error: SolverError, at: DateTime<Utc> },
    /// The worker loop exited.
    Stopped { at: DateTime<Utc> },
}

impl StatusEvent {
    /// When the event was raised.
    #[must_use]
    pub const fn at(&self) -> DateTime<Utc> {
        match self {
            Self::Imported { at, .. }
            | Self::ImportFailed { at, .. }
            | Self::StepFailed { at, .. }
            | Self::ExtractRejected { at, .. }
            | Self::Stopped { at } => *at,
        }
    }

    /// True for events that report a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ImportFailed { .. } | Self::StepFailed { .. } | Self::ExtractRejected { .. }
        )
    }
}

/// Non-blocking sender side of the status channel.
#[derive(Debug)]
pub(crate) struct StatusSender {
    tx: Sender<StatusEvent>,
}

impl StatusSender {
    pub(crate) const fn new(tx: Sender<StatusEvent>) -> Self {
        Self { tx }
    }

    /// Never blocks; counts the event in `dropped` when the host is not draining.
    pub(crate) fn emit(&self, event: StatusEvent, dropped: &AtomicU64) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
