//! Solver capability surface.
//!
//! The worker never looks inside a solver. It only needs to parse model text,
//! load a frame, nudge the fold percentage, step, and copy per-vertex results
//! out. Geometry queries go through the parsed model.

pub mod context;
pub mod instrumented;

pub use context::{LeasedSolver, SolverContext, SolverFactory};
pub use instrumented::{CallCounts, InstrumentedSolver, SolverRecorder};

use crate::error::{ParseError, SolverError};

/// Index of a frame within a model. Frame 0 is the key frame.
pub type FrameIndex = u16;

/// Destination slices for one extraction.
///
/// Every slice present must be filled completely: `3 * vertex_count` floats
/// for position and velocity, `vertex_count` floats for error. Positions are
/// displacements from the static vertex coordinates.
#[allow(missing_docs)]
#[derive(Debug, Default)]
pub struct ExtractRequest<'a> {
    pub position: Option<&'a mut [f32]>,
    pub velocity: Option<&'a mut [f32]>,
    pub error: Option<&'a mut [f32]>,
}

impl ExtractRequest<'_> {
    /// True if no channel is requested.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.position.is_none() && self.velocity.is_none() && self.error.is_none()
    }
}

/// Geometry queries on a parsed model.
pub trait SolverModel: Send {
    /// Number of frames in the model.
    fn frame_count(&self) -> FrameIndex;

    /// Number of vertices in `frame`.
    fn vertex_count(&self, frame: FrameIndex) -> u32;

    /// Writes the unfolded `x y z` coordinates of `frame` into `out`.
    ///
    /// Returns the number of floats written.
    fn static_vertex_coords(&self, frame: FrameIndex, out: &mut [f32]) -> usize;

    /// Number of triangles in `frame`.
    fn face_count(&self, frame: FrameIndex) -> u32;

    /// Writes 3 vertex indices per triangle of `frame` into `out`.
    ///
    /// Returns the number of indices written.
    fn face_indices(&self, frame: FrameIndex, out: &mut [u32]) -> usize;
}

/// A steppable fold solver.
///
/// Implementations are owned by exactly one worker thread, hence `Send`
/// without `Sync`.
pub trait Solver: Send {
    /// Parsed model type.
    type Model: SolverModel + 'static;

    /// Parses model source text.
    fn parse(&mut self, source: &[u8]) -> Result<Self::Model, ParseError>;

    /// Loads `frame` of `model`, replacing whatever was loaded before.
    fn load(&mut self, model: &Self::Model, frame: FrameIndex) -> Result<(), SolverError>;

    /// Sets how far creases are folded, in `[-1, 1]`.
    fn set_fold_percentage(&mut self, percentage: f32) -> Result<(), SolverError>;

    /// Advances the simulation by `count` steps.
    fn step(&mut self, count: u32) -> Result<(), SolverError>;

    /// Copies the current per-vertex state into the request's slices.
    fn extract(&mut self, request: ExtractRequest<'_>) -> Result<(), SolverError>;
}

impl<S: Solver + ?Sized> Solver for Box<S> {
    type Model = S::Model;

    fn parse(&mut self, source: &[u8]) -> Result<Self::Model, ParseError> {
        (**self).parse(source)
    }

    fn load(&mut self, model: &Self::Model, frame: FrameIndex) -> Result<(), SolverError> {
        (**self).load(model, frame)
    }

    fn set_fold_percentage(&mut self, percentage: f32) -> Result<(), SolverError> {
        (**self).set_fold_percentage(percentage)
    }

    fn step(&mut self, count: u32) -> Result<(), SolverError> {
        (**self).step(count)
    }

    fn extract(&mut self, request: ExtractRequest<'_>) -> Result<(), SolverError> {
        (**self).extract(request)
    }
}
