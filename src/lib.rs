//! # foldsim - adaptive fold simulation for cooking hosts
//!
//! foldsim runs an origami fold solver on a background thread next to a host
//! that "cooks" a node graph at its own cadence. The host never waits on the
//! solver: it publishes a cook timestamp, swaps in new inputs, and reads back
//! whatever geometry the worker extracted last. The worker sizes every batch
//! of solver steps to fit the time left until the next expected cook.
//!
//! ## Core Concepts
//!
//! - **InputSnapshot**: every simulation setting, each with a changed flag
//! - **OutputSnapshot**: one flat float buffer with a region per channel
//! - **ModelSession**: the model currently fed to a solver
//! - **SimulationWorker**: the paced stepping loop and its host handle
//! - **Simulator**: operator-facing glue composed on top of a worker
//!
//! ## Usage
//!
//! ```rust,ignore
//! use foldsim::{HostParameters, Interests, InstrumentedSolver, Simulator, WorkerConfig};
//!
//! let mut simulator = Simulator::start(InstrumentedSolver::default(), WorkerConfig::default())?;
//! let parameters = HostParameters {
//!     fold_source: std::fs::read_to_string("crane.fold")?,
//!     fold_percentage: 0.8,
//!     ..HostParameters::default()
//! };
//!
//! // Once per host cook:
//! simulator.execute(&parameters, Interests::default())?;
//! let output = simulator.query()?;
//! println!("{} vertices, output #{}", output.vertex_count(), output.output_number());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod config;
pub mod error;
pub mod input;
pub mod output;
pub mod tracked;

// Solver surface and the reference model format
pub mod fold;
pub mod solver;

// Runtime
pub mod host;
pub mod session;
pub mod worker;

pub use config::WorkerConfig;
pub use error::{
    ConfigError, FoldSimError, FoldSimResult, ImportError, ParseError, ParseErrorCategory, SolverError,
    WorkerError,
};
pub use fold::FoldModel;
pub use host::{
    pack_mesh, HostParameters, InfoChannel, Interests, MeshBuffers, MeshSink, PackedMesh, Simulator,
};
pub use input::{InputSnapshot, InputValues};
pub use output::{ExtractionSet, OutputSnapshot, Region, RegionLayout};
pub use session::ModelSession;
pub use solver::{
    CallCounts, ExtractRequest, FrameIndex, InstrumentedSolver, LeasedSolver, Solver, SolverContext,
    SolverFactory, SolverModel, SolverRecorder,
};
pub use tracked::ChangeTracked;
pub use worker::{OutputGuard, SimulationWorker, StatusEvent, WorkerId, WorkerState};
