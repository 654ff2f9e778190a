//! Explicit solver context.
//!
//! A [`SolverContext`] owns the factory that creates solvers and counts the
//! solvers currently alive. It is a cheap `Arc` handle: whoever composes
//! workers passes it around explicitly, and the factory is torn down when the
//! last context handle and the last leased solver are gone.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::WorkerConfig;
use crate::error::{FoldSimResult, ParseError, SolverError};
use crate::worker::SimulationWorker;

use super::{ExtractRequest, FrameIndex, Solver};

/// Creates solver instances.
pub trait SolverFactory: Send + Sync + 'static {
    /// Solver type produced by this factory.
    type Solver: Solver + 'static;

    /// Creates a fresh, unloaded solver.
    fn create(&self) -> Result<Self::Solver, SolverError>;
}

struct ContextInner<F> {
    factory: F,
    live: AtomicUsize,
}

/// Shared handle to a solver factory.
pub struct SolverContext<F: SolverFactory> {
    inner: Arc<ContextInner<F>>,
}

impl<F: SolverFactory> Clone for SolverContext<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: SolverFactory> fmt::Debug for SolverContext<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolverContext")
            .field("live_solvers", &self.live_solvers())
            .finish_non_exhaustive()
    }
}

impl<F: SolverFactory> SolverContext<F> {
    /// Wraps a factory.
    pub fn new(factory: F) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                factory,
                live: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of solvers created by this context that are still alive.
    #[must_use]
    pub fn live_solvers(&self) -> usize {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Creates a solver tied to this context.
    pub fn create_solver(&self) -> Result<LeasedSolver<F>, SolverError> {
        let solver = self.inner.factory.create()?;
        self.inner.live.fetch_add(1, Ordering::AcqRel);
        Ok(LeasedSolver {
            solver,
            context: Arc::clone(&self.inner),
        })
    }

    /// Creates a solver and starts a worker around it.
    pub fn spawn_worker(&self, config: WorkerConfig) -> FoldSimResult<SimulationWorker> {
        let solver = self.create_solver()?;
        SimulationWorker::start(solver, config)
    }
}

/// A solver that keeps its context alive and is counted by it.
pub struct LeasedSolver<F: SolverFactory> {
    solver: F::Solver,
    context: Arc<ContextInner<F>>,
}

impl<F: SolverFactory> fmt::Debug for LeasedSolver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeasedSolver").finish_non_exhaustive()
    }
}

impl<F: SolverFactory> LeasedSolver<F> {
    /// The wrapped solver.
    pub fn get_ref(&self) -> &F::Solver {
        &self.solver
    }
}

impl<F: SolverFactory> Drop for LeasedSolver<F> {
    fn drop(&mut self) {
        self.context.live.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<F: SolverFactory> Solver for LeasedSolver<F> {
    type Model = <F::Solver as Solver>::Model;

    fn parse(&mut self, source: &[u8]) -> Result<Self::Model, ParseError> {
        self.solver.parse(source)
    }

    fn load(&mut self, model: &Self::Model, frame: FrameIndex) -> Result<(), SolverError> {
        self.solver.load(model, frame)
    }

    fn set_fold_percentage(&mut self, percentage: f32) -> Result<(), SolverError> {
        self.solver.set_fold_percentage(percentage)
    }

    fn step(&mut self, count: u32) -> Result<(), SolverError> {
        self.solver.step(count)
    }

    fn extract(&mut self, request: ExtractRequest<'_>) -> Result<(), SolverError> {
        self.solver.extract(request)
    }
}
