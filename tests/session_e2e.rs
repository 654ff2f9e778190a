use std::io::Write;

use foldsim::{
    ExtractRequest, FoldModel, ImportError, InstrumentedSolver, ModelSession, SolverContext, SolverError,
    SolverFactory, SolverModel, SolverRecorder, WorkerConfig,
};

const CRANE_BASE: &str = r#"{
    "file_creator": "session_e2e",
    "frame_title": "unfolded",
    "vertices_coords": [[0,0],[2,0],[2,2],[0,2],[1,1]],
    "faces_vertices": [[0,1,4],[1,2,4],[2,3,4],[3,0,4]],
    "file_frames": [
        { "frame_title": "pinched", "frame_inherit": true, "vertices_coords": [[0,0,0],[2,0,0],[2,2,0],[0,2,0],[1,1,0.5]] },
        { "frame_title": "quads", "frame_inherit": true, "faces_vertices": [[0,1,2,3]] }
    ]
}"#;

fn session() -> (ModelSession<InstrumentedSolver>, SolverRecorder) {
    let recorder = SolverRecorder::default();
    (ModelSession::new(InstrumentedSolver::with_recorder(recorder.clone())), recorder)
}

#[test]
fn typing_a_model_keeps_the_last_good_one_loaded() {
    let (mut session, recorder) = session();
    session.update(Some(CRANE_BASE), Some(0), Some(0.5)).unwrap();
    let generation = session.geometry_generation();

    // Every prefix of the edited text is broken JSON until the closing brace.
    let edited = CRANE_BASE.replace("unfolded", "flat");
    for end in (1..edited.len()).step_by(37) {
        let err = session.update(Some(&edited[..end]), None, None).unwrap_err();
        assert!(matches!(err, ImportError::Parse(_)), "prefix {end}: {err:?}");
        assert!(session.is_loaded());
        assert_eq!(session.geometry_generation(), generation);
    }

    session.update(Some(&edited), None, None).unwrap();
    assert_eq!(session.geometry_generation(), generation + 1);
    assert_eq!(session.model().and_then(|m| m.frame_title(0)), Some("flat"));
    assert_eq!(recorder.counts().load_calls, 2);
}

#[test]
fn switching_frames_reloads_geometry() {
    let (mut session, _) = session();
    session.update(Some(CRANE_BASE), Some(0), None).unwrap();
    assert_eq!(session.face_count(), 4);
    assert!(session.static_vertex_coords().chunks_exact(3).all(|v| v[2] == 0.0));

    session.update(None, Some(1), None).unwrap();
    assert!((session.static_vertex_coords()[14] - 0.5).abs() < 1e-6);

    session.update(None, Some(2), None).unwrap();
    assert_eq!(session.face_count(), 2);
    let mut indices = vec![0; 6];
    assert_eq!(session.face_indices(&mut indices), 6);
    assert_eq!(indices, [0, 1, 2, 0, 2, 3]);

    let err = session.update(None, Some(3), None).unwrap_err();
    assert!(matches!(err, ImportError::Load { .. }));
    assert!(!session.is_loaded());
    assert_eq!(session.step(1), Err(SolverError::NotLoaded));
}

#[test]
fn extracted_lift_converges_to_fold_percentage() {
    let (mut session, _) = session();
    session.update(Some(CRANE_BASE), Some(0), Some(0.8)).unwrap();
    let vertices = session.vertex_count() as usize;

    let mut position = vec![0.0; 3 * vertices];
    let mut error = vec![0.0; vertices];
    session
        .extract(ExtractRequest {
            position: Some(&mut position),
            error: Some(&mut error),
            ..ExtractRequest::default()
        })
        .unwrap();
    assert!(position.iter().all(|v| *v == 0.0));
    assert!((error[0] - 0.8).abs() < 1e-6);

    for _ in 0..50 {
        session.step(100).unwrap();
    }
    session
        .extract(ExtractRequest {
            position: Some(&mut position),
            error: Some(&mut error),
            ..ExtractRequest::default()
        })
        .unwrap();
    assert!((position[2] - 0.8).abs() < 1e-4, "lift {}", position[2]);
    assert!(error.iter().all(|e| e.abs() < 1e-4));
}

#[test]
fn mis_sized_request_is_an_error_not_a_panic() {
    let (mut session, _) = session();
    session.update(Some(CRANE_BASE), Some(0), None).unwrap();
    let mut short = vec![0.0; 3];
    let err = session
        .extract(ExtractRequest {
            velocity: Some(&mut short),
            ..ExtractRequest::default()
        })
        .unwrap_err();
    assert_eq!(
        err,
        SolverError::RegionMismatch {
            channel: "velocity",
            expected: 15,
            actual: 3
        }
    );
}

#[test]
fn model_read_from_disk_matches_inline_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crane.fold");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(CRANE_BASE.as_bytes()).unwrap();
    drop(file);

    let from_disk: FoldModel = std::fs::read_to_string(&path).unwrap().parse().unwrap();
    let inline: FoldModel = CRANE_BASE.parse().unwrap();
    assert_eq!(from_disk, inline);
    assert_eq!(from_disk.creator(), Some("session_e2e"));
    assert_eq!(from_disk.frame_count(), 3);
}

struct RecordingFactory {
    recorder: SolverRecorder,
}

impl SolverFactory for RecordingFactory {
    type Solver = InstrumentedSolver;

    fn create(&self) -> Result<Self::Solver, SolverError> {
        Ok(InstrumentedSolver::with_recorder(self.recorder.clone()))
    }
}

#[test]
fn context_counts_solvers_across_workers() {
    let recorder = SolverRecorder::default();
    let context = SolverContext::new(RecordingFactory { recorder });

    let first = context.spawn_worker(WorkerConfig::default()).unwrap();
    let second = context
        .spawn_worker(WorkerConfig {
            thread_name: "foldsim-second".to_string(),
            ..WorkerConfig::default()
        })
        .unwrap();
    assert_eq!(context.live_solvers(), 2);
    assert_ne!(first.id(), second.id());

    drop(first);
    assert_eq!(context.live_solvers(), 1);
    drop(second);
    assert_eq!(context.live_solvers(), 0);
}
