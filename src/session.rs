//! Model session: one solver plus the model currently fed to it.
//!
//! The session turns "new source / new frame / new fold percentage" requests
//! into solver calls. It is owned by the worker thread and never locked.

use tracing::{debug, info, warn};

use crate::error::{ImportError, SolverError};
use crate::solver::{ExtractRequest, FrameIndex, Solver, SolverModel};

/// Short, stable fingerprint of a model source, for logs.
#[must_use]
pub fn source_fingerprint(source: &str) -> String {
    let hash = blake3::hash(source.as_bytes());
    hash.to_hex()[..16].to_string()
}

/// Owns a solver and the model loaded into it.
pub struct ModelSession<S: Solver> {
    solver: S,
    model: Option<S::Model>,
    frame_index: FrameIndex,
    loaded: bool,
    fold_percentage: Option<f32>,
    static_coords: Vec<f32>,
    static_coords_valid: bool,
    generation: u64,
    last_error: Option<ImportError>,
}

impl<S: Solver> std::fmt::Debug for ModelSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSession")
            .field("has_model", &self.model.is_some())
            .field("frame_index", &self.frame_index)
            .field("loaded", &self.loaded)
            .field("fold_percentage", &self.fold_percentage)
            .field("static_coords_valid", &self.static_coords_valid)
            .field("generation", &self.generation)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl<S: Solver> ModelSession<S> {
    /// Creates a session with no model.
    pub fn new(solver: S) -> Self {
        Self {
            solver,
            model: None,
            frame_index: 0,
            loaded: false,
            fold_percentage: None,
            static_coords: Vec::new(),
            static_coords_valid: false,
            generation: 0,
            last_error: None,
        }
    }

    /// Applies any combination of new source text, frame and fold percentage.
    ///
    /// `None` means "unchanged". An empty source unloads the model. A parse
    /// failure leaves the current model and frame untouched. Returns `Ok` only
    /// if a model ends up loaded and every requested change was applied.
    pub fn update(
        &mut self,
        source: Option<&str>,
        frame: Option<FrameIndex>,
        fold_percentage: Option<f32>,
    ) -> Result<(), ImportError> {
        let result = self.apply(source, frame, fold_percentage);
        self.last_error = result.as_ref().err().cloned();
        result
    }

    fn apply(
        &mut self,
        source: Option<&str>,
        frame: Option<FrameIndex>,
        fold_percentage: Option<f32>,
    ) -> Result<(), ImportError> {
        let mut candidate = None;
        if let Some(source) = source {
            if source.is_empty() {
                self.unload();
                info!("model unloaded");
                return Err(ImportError::Empty);
            }
            let fingerprint = source_fingerprint(source);
            match self.solver.parse(source.as_bytes()) {
                Ok(model) => {
                    debug!(source_hash = %fingerprint, frames = model.frame_count(), "parsed model");
                    candidate = Some(model);
                }
                Err(err) => {
                    warn!(source_hash = %fingerprint, line = err.line, column = err.column, "model parse failed");
                    return Err(err.into());
                }
            }
        }

        let geometry_changed = candidate.is_some() || frame.is_some();
        if let Some(frame) = frame {
            self.frame_index = frame;
        }
        if let Some(model) = candidate {
            self.model = Some(model);
        }
        if geometry_changed {
            self.invalidate_static_coords();
        }

        let Some(model) = self.model.as_ref() else {
            self.loaded = false;
            if let Some(percentage) = fold_percentage {
                self.fold_percentage = Some(percentage);
            }
            return Err(ImportError::Empty);
        };

        if geometry_changed {
            self.loaded = false;
            if let Err(err) = self.solver.load(model, self.frame_index) {
                warn!(frame = self.frame_index, error = %err, "model load failed");
                if let Some(percentage) = fold_percentage {
                    self.fold_percentage = Some(percentage);
                }
                return Err(ImportError::Load { reason: err.to_string() });
            }
            self.loaded = true;
            self.generation += 1;
            info!(
                frame = self.frame_index,
                vertices = model.vertex_count(self.frame_index),
                faces = model.face_count(self.frame_index),
                "model loaded"
            );
        }

        let percentage = fold_percentage.or(if geometry_changed { self.fold_percentage } else { None });
        if let Some(percentage) = percentage {
            self.fold_percentage = Some(percentage);
            if self.loaded {
                if let Err(err) = self.solver.set_fold_percentage(percentage) {
                    warn!(percentage, error = %err, "fold percentage rejected");
                    return Err(ImportError::FoldPercentageRejected {
                        value: percentage,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if self.loaded {
            Ok(())
        } else {
            Err(ImportError::Load {
                reason: SolverError::NotLoaded.to_string(),
            })
        }
    }

    fn unload(&mut self) {
        self.model = None;
        self.loaded = false;
        self.invalidate_static_coords();
    }

    /// True if a model is loaded into the solver.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// The most recent update failure, cleared by the next successful update.
    #[must_use]
    pub const fn last_error(&self) -> Option<&ImportError> {
        self.last_error.as_ref()
    }

    /// Frame most recently requested.
    #[must_use]
    pub const fn frame_index(&self) -> FrameIndex {
        self.frame_index
    }

    /// The parsed model, loaded or not.
    #[must_use]
    pub const fn model(&self) -> Option<&S::Model> {
        self.model.as_ref()
    }

    /// Bumped on every successful load.
    #[must_use]
    pub const fn geometry_generation(&self) -> u64 {
        self.generation
    }

    /// Vertex count of the current frame, 0 without a model.
    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        self.model
            .as_ref()
            .map_or(0, |model| model.vertex_count(self.frame_index))
    }

    /// Triangle count of the current frame, 0 without a model.
    #[must_use]
    pub fn face_count(&self) -> u32 {
        self.model
            .as_ref()
            .map_or(0, |model| model.face_count(self.frame_index))
    }

    /// Writes the current frame's triangle indices into `out`.
    pub fn face_indices(&self, out: &mut [u32]) -> usize {
        self.model
            .as_ref()
            .map_or(0, |model| model.face_indices(self.frame_index, out))
    }

    /// True while the cached static coordinates match the loaded geometry.
    #[must_use]
    pub const fn static_coords_valid(&self) -> bool {
        self.static_coords_valid
    }

    /// Drops the cached static coordinates.
    pub fn invalidate_static_coords(&mut self) {
        self.static_coords_valid = false;
    }

    /// Unfolded `x y z` coordinates of the current frame, cached.
    pub fn static_vertex_coords(&mut self) -> &[f32] {
        if !self.static_coords_valid {
            let len = 3 * self.vertex_count() as usize;
            self.static_coords.clear();
            self.static_coords.resize(len, 0.0);
            if let Some(model) = &self.model {
                model.static_vertex_coords(self.frame_index, &mut self.static_coords);
            }
            self.static_coords_valid = true;
        }
        &self.static_coords
    }

    /// Steps the solver. Makes no solver call when nothing is loaded.
    pub fn step(&mut self, count: u32) -> Result<(), SolverError> {
        if !self.loaded {
            return Err(SolverError::NotLoaded);
        }
        self.solver.step(count)
    }

    /// Extracts from the solver. Makes no solver call when nothing is loaded.
    pub fn extract(&mut self, request: ExtractRequest<'_>) -> Result<(), SolverError> {
        if !self.loaded {
            return Err(SolverError::NotLoaded);
        }
        self.solver.extract(request)
    }

    /// The solver.
    pub fn solver(&self) -> &S {
        &self.solver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorCategory;
    use crate::solver::{InstrumentedSolver, SolverRecorder};

    const QUAD: &str = r#"{
        "vertices_coords": [[0,0],[1,0],[1,1],[0,1]],
        "faces_vertices": [[0,1,2],[0,2,3]],
        "file_frames": [{ "frame_inherit": true, "vertices_coords": [[0,0,2],[1,0,2],[1,1,2],[0,1,2]] }]
    }"#;

    fn session() -> (ModelSession<InstrumentedSolver>, SolverRecorder) {
        let recorder = SolverRecorder::default();
        (ModelSession::new(InstrumentedSolver::with_recorder(recorder.clone())), recorder)
    }

    #[test]
    fn fresh_session_is_idle() {
        let (mut session, recorder) = session();
        assert!(!session.is_loaded());
        assert_eq!(session.update(None, None, None), Err(ImportError::Empty));
        assert_eq!(recorder.counts().total_calls(), 0);
    }

    #[test]
    fn valid_source_loads() {
        let (mut session, recorder) = session();
        session.update(Some(QUAD), Some(0), Some(0.25)).unwrap();
        assert!(session.is_loaded());
        assert_eq!(session.vertex_count(), 4);
        assert_eq!(session.face_count(), 2);
        assert_eq!(session.geometry_generation(), 1);
        assert!(session.last_error().is_none());

        let counts = recorder.counts();
        assert_eq!(counts.parse_calls, 1);
        assert_eq!(counts.load_calls, 1);
        assert_eq!(counts.fold_percentage_calls, 1);
    }

    #[test]
    fn nothing_requested_makes_no_solver_call() {
        let (mut session, recorder) = session();
        session.update(Some(QUAD), Some(0), Some(0.0)).unwrap();
        let before = recorder.counts();
        session.update(None, None, None).unwrap();
        assert_eq!(recorder.counts(), before);
    }

    #[test]
    fn parse_failure_keeps_previous_model() {
        let (mut session, _) = session();
        session.update(Some(QUAD), None, None).unwrap();

        let err = session.update(Some(r#"{ "vertices_coords": ["#), Some(1), None).unwrap_err();
        let ImportError::Parse(parse) = &err else {
            panic!("expected parse error, got {err:?}");
        };
        assert_eq!(parse.category, ParseErrorCategory::Eof);
        assert!(session.is_loaded());
        assert_eq!(session.frame_index(), 0);
        assert_eq!(session.vertex_count(), 4);
        assert_eq!(session.last_error(), Some(&err));
    }

    #[test]
    fn empty_source_unloads_and_invalidates_cache() {
        let (mut session, _) = session();
        session.update(Some(QUAD), None, None).unwrap();
        assert_eq!(session.static_vertex_coords().len(), 12);
        assert!(session.static_coords_valid());

        assert_eq!(session.update(Some(""), None, None), Err(ImportError::Empty));
        assert!(!session.is_loaded());
        assert!(!session.static_coords_valid());
        assert!(session.model().is_none());
        assert!(session.static_vertex_coords().is_empty());

        session.update(Some(QUAD), Some(1), None).unwrap();
        let coords = session.static_vertex_coords().to_vec();
        assert_eq!(coords.len(), 12);
        assert!(coords.chunks_exact(3).all(|v| v[2] == 2.0));
    }

    #[test]
    fn frame_change_reloads_and_invalidates_cache() {
        let (mut session, recorder) = session();
        session.update(Some(QUAD), Some(0), None).unwrap();
        assert_eq!(session.static_vertex_coords()[2], 0.0);

        session.update(None, Some(1), None).unwrap();
        assert!(!session.static_coords_valid());
        assert_eq!(session.static_vertex_coords()[2], 2.0);
        assert_eq!(recorder.counts().load_calls, 2);
        assert_eq!(recorder.counts().parse_calls, 1);
    }

    #[test]
    fn load_failure_leaves_session_unloaded() {
        let (mut session, recorder) = session();
        session.update(Some(QUAD), None, None).unwrap();

        let err = session.update(None, Some(7), None).unwrap_err();
        assert!(matches!(err, ImportError::Load { .. }));
        assert!(!session.is_loaded());

        recorder.set_fail_load(true);
        assert!(matches!(session.update(None, Some(0), None), Err(ImportError::Load { .. })));
        recorder.set_fail_load(false);

        session.update(None, Some(0), None).unwrap();
        assert!(session.is_loaded());
    }

    #[test]
    fn rejected_fold_percentage_is_recoverable() {
        let (mut session, recorder) = session();
        session.update(Some(QUAD), None, Some(0.1)).unwrap();

        recorder.set_reject_fold_percentage(true);
        let err = session.update(None, None, Some(0.9)).unwrap_err();
        assert!(matches!(err, ImportError::FoldPercentageRejected { value, .. } if (value - 0.9).abs() < f32::EPSILON));
        assert!(session.is_loaded());
    }

    #[test]
    fn fold_percentage_is_reapplied_after_reload() {
        let (mut session, recorder) = session();
        assert_eq!(session.update(None, None, Some(0.5)), Err(ImportError::Empty));
        assert_eq!(recorder.counts().fold_percentage_calls, 0);

        session.update(Some(QUAD), Some(0), None).unwrap();
        assert_eq!(recorder.counts().fold_percentage_calls, 1);

        session.update(None, Some(1), None).unwrap();
        assert_eq!(recorder.counts().fold_percentage_calls, 2);
    }

    #[test]
    fn idle_session_never_reaches_solver() {
        let (mut session, recorder) = session();
        assert_eq!(session.step(5), Err(SolverError::NotLoaded));
        assert_eq!(session.extract(ExtractRequest::default()), Err(SolverError::NotLoaded));
        assert_eq!(recorder.counts().total_calls(), 0);
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let a = source_fingerprint(QUAD);
        assert_eq!(a.len(), 16);
        assert_eq!(a, source_fingerprint(QUAD));
        assert_ne!(a, source_fingerprint("{}"));
    }
}
