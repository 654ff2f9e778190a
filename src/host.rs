//! Host-side glue.
//!
//! [`Simulator`] is what a node-graph operator holds: on every cook it turns
//! the operator's parameters into an input snapshot, publishes the cook to
//! the worker and exposes the latest extraction. [`pack_mesh`] copies that
//! extraction into any mesh builder implementing [`MeshSink`].

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::debug;

use crate::config::WorkerConfig;
use crate::error::{FoldSimResult, ImportError};
use crate::input::{InputSnapshot, InputValues};
use crate::output::OutputSnapshot;
use crate::solver::Solver;
use crate::worker::{OutputGuard, SimulationWorker, WorkerState};

/// Name of the pulse parameter that reloads the model.
pub const RESET_PULSE: &str = "Reset";

/// Attribute name of the per-vertex velocity.
pub const VELOCITY_ATTRIBUTE: &str = "velocity";

/// Attribute name of the per-vertex error.
pub const ERROR_ATTRIBUTE: &str = "error";

/// Which channels the downstream consumer wants.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interests {
    pub position: bool,
    pub velocity: bool,
    pub error: bool,
}

impl Default for Interests {
    fn default() -> Self {
        Self {
            position: true,
            velocity: false,
            error: false,
        }
    }
}

/// Operator parameters read by the host at cook time.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct HostParameters {
    pub fold_source: String,
    pub frame_index: u16,
    pub fold_percentage: f32,
    pub time_scale: f32,
    pub adaptive: bool,
    pub frame_budget: f32,
    pub target_period: Duration,
}

impl Default for HostParameters {
    fn default() -> Self {
        let values = InputValues::default();
        Self {
            fold_source: values.source_text,
            frame_index: values.frame_index,
            fold_percentage: values.fold_percentage,
            time_scale: values.time_scale,
            adaptive: values.adaptive,
            frame_budget: values.frame_budget,
            target_period: values.target_period,
        }
    }
}

impl HostParameters {
    fn to_values(&self, interests: Interests) -> InputValues {
        InputValues {
            source_text: self.fold_source.clone(),
            frame_index: self.frame_index,
            fold_percentage: self.fold_percentage,
            extract_position: interests.position,
            extract_velocity: interests.velocity,
            extract_error: interests.error,
            time_scale: self.time_scale,
            adaptive: self.adaptive,
            frame_budget: self.frame_budget,
            target_period: self.target_period,
        }
    }
}

/// Renders an import outcome for an operator's status line.
#[must_use]
pub fn import_status_text(result: Result<(), &ImportError>) -> String {
    match result {
        Ok(()) => "[SUCCESS] Fold loaded successfully".to_string(),
        Err(ImportError::Empty) => "[ERROR] Fold input is empty".to_string(),
        Err(ImportError::Parse(err)) => format!(
            "[ERROR] Fold parse error \"{:?}\" on line {}, column {}",
            err.category, err.line, err.column
        ),
        Err(ImportError::Load { reason }) => format!("[ERROR] Fold load error: {reason}"),
        Err(ImportError::FoldPercentageRejected { value, reason }) => {
            format!("[ERROR] Fold percentage {value} rejected: {reason}")
        }
    }
}

/// One named scalar for an operator's info channels.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InfoChannel {
    pub name: &'static str,
    pub value: f64,
}

/// The simulation capability an operator composes.
#[derive(Debug)]
pub struct Simulator {
    worker: SimulationWorker,
    reset_pending: bool,
}

impl Simulator {
    /// Wraps a running worker.
    #[must_use]
    pub const fn new(worker: SimulationWorker) -> Self {
        Self {
            worker,
            reset_pending: false,
        }
    }

    /// Starts a worker around `solver` and wraps it.
    pub fn start<S>(solver: S, config: WorkerConfig) -> FoldSimResult<Self>
    where
        S: Solver + 'static,
    {
        Ok(Self::new(SimulationWorker::start(solver, config)?))
    }

    /// Runs one host cook. Returns true if a new snapshot was submitted.
    pub fn execute(&mut self, parameters: &HostParameters, interests: Interests) -> FoldSimResult<bool> {
        self.worker.notify_cook();

        let mut snapshot = self.consolidate(parameters, interests);
        if self.reset_pending {
            snapshot = snapshot.with_reset();
        }
        if !snapshot.changed() && !snapshot.reset_requested {
            return Ok(false);
        }

        debug!(revision = snapshot.revision, reset = snapshot.reset_requested, "submitting parameters");
        self.worker.submit_input(snapshot)?;
        self.reset_pending = false;
        Ok(true)
    }

    fn consolidate(&self, parameters: &HostParameters, interests: Interests) -> InputSnapshot {
        self.worker.get_input().next(parameters.to_values(interests))
    }

    /// Locks the latest extraction.
    pub fn query(&self) -> FoldSimResult<OutputGuard<'_>> {
        self.worker.query_output()
    }

    /// Handles a pulse parameter. Returns false if the pulse is not ours.
    pub fn pulse_pressed(&mut self, name: &str) -> bool {
        if name == RESET_PULSE {
            self.reset_pending = true;
            true
        } else {
            false
        }
    }

    /// Status line for the operator, after draining pending status events.
    pub fn status_text(&mut self) -> String {
        self.worker.poll_status();
        match self.worker.last_import_error() {
            Some(err) => import_status_text(Err(err)),
            None if self.worker.state() == WorkerState::Loaded => import_status_text(Ok(())),
            None => "[WAITING] No fold applied yet".to_string(),
        }
    }

    /// Scalar diagnostics for an info channel output.
    pub fn info_channels(&self) -> FoldSimResult<Vec<InfoChannel>> {
        let state = self.worker.state();
        let output = self.query()?;
        #[allow(clippy::cast_precision_loss)]
        let channels = vec![
            InfoChannel {
                name: "foldsim_loaded",
                value: f64::from(u8::from(state == WorkerState::Loaded)),
            },
            InfoChannel {
                name: "foldsim_running",
                value: f64::from(u8::from(state != WorkerState::Stopped)),
            },
            InfoChannel {
                name: "foldsim_output_number",
                value: output.output_number() as f64,
            },
            InfoChannel {
                name: "foldsim_steps_per_cook",
                value: output.steps_since_last_output() as f64,
            },
            InfoChannel {
                name: "foldsim_max_velocity",
                value: output.max_velocity().map_or(0.0, f64::from),
            },
            InfoChannel {
                name: "foldsim_max_error",
                value: output.max_error().map_or(0.0, f64::from),
            },
        ];
        Ok(channels)
    }

    /// The wrapped worker.
    #[must_use]
    pub const fn worker(&self) -> &SimulationWorker {
        &self.worker
    }

    /// The wrapped worker, mutably.
    pub fn worker_mut(&mut self) -> &mut SimulationWorker {
        &mut self.worker
    }

    /// Stops the worker.
    pub fn shutdown(mut self) -> FoldSimResult<()> {
        self.worker.stop()
    }
}

/// A host mesh builder.
pub trait MeshSink {
    /// Appends one point.
    fn add_point(&mut self, position: [f32; 3]);

    /// Appends triangles, 3 point indices each.
    fn add_triangles(&mut self, indices: &[u32]);

    /// Sets a per-point attribute with `components` floats per point.
    fn set_point_attribute(&mut self, name: &str, components: usize, data: &[f32]);
}

/// What [`pack_mesh`] wrote.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackedMesh {
    pub points: usize,
    pub triangles: usize,
    pub attributes: usize,
}

/// Copies an extraction into `sink`.
///
/// Triangles are only emitted alongside points, since they index into them.
pub fn pack_mesh(output: &OutputSnapshot, sink: &mut impl MeshSink) -> PackedMesh {
    let mut packed = PackedMesh::default();

    if let Some(positions) = output.positions() {
        for point in positions.chunks_exact(3) {
            sink.add_point([point[0], point[1], point[2]]);
            packed.points += 1;
        }
        let indices = output.indices();
        if !indices.is_empty() {
            sink.add_triangles(indices);
            packed.triangles = indices.len() / 3;
        }
    }

    if let Some(velocity) = output.velocity() {
        sink.set_point_attribute(VELOCITY_ATTRIBUTE, 3, velocity);
        packed.attributes += 1;
    }
    if let Some(error) = output.error() {
        sink.set_point_attribute(ERROR_ATTRIBUTE, 1, error);
        packed.attributes += 1;
    }

    packed
}

/// Plain in-memory [`MeshSink`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshBuffers {
    pub points: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub attributes: BTreeMap<String, (usize, Vec<f32>)>,
}

impl MeshSink for MeshBuffers {
    fn add_point(&mut self, position: [f32; 3]) {
        self.points.push(position);
    }

    fn add_triangles(&mut self, indices: &[u32]) {
        self.indices.extend_from_slice(indices);
    }

    fn set_point_attribute(&mut self, name: &str, components: usize, data: &[f32]) {
        self.attributes.insert(name.to_string(), (components, data.to_vec()));
    }
}
