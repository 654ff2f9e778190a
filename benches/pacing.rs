use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use foldsim::worker::{CookClock, StepPacer};
use foldsim::{
    ExtractionSet, FoldModel, InputSnapshot, InputValues, InstrumentedSolver, ModelSession, RegionLayout,
};

/// A flat `n x n` grid of quads as FOLD JSON.
fn grid_fold(n: u32) -> String {
    let mut coords = Vec::new();
    for y in 0..=n {
        for x in 0..=n {
            coords.push(format!("[{x},{y}]"));
        }
    }
    let mut faces = Vec::new();
    let row = n + 1;
    for y in 0..n {
        for x in 0..n {
            let a = y * row + x;
            faces.push(format!("[{},{},{},{}]", a, a + 1, a + row + 1, a + row));
        }
    }
    format!(
        r#"{{"vertices_coords":[{}],"faces_vertices":[{}]}}"#,
        coords.join(","),
        faces.join(",")
    )
}

fn bench_step_count(c: &mut Criterion) {
    let pacer = StepPacer::default();
    c.bench_function("pacing/step_count", |b| {
        b.iter(|| {
            pacer.step_count(
                black_box(Duration::from_micros(11_300)),
                black_box(Some(Duration::from_micros(37))),
            )
        });
    });

    let mut clock = CookClock::default();
    clock.observe(Duration::from_millis(16));
    clock.observe(Duration::from_millis(32));
    c.bench_function("pacing/should_extract", |b| {
        b.iter(|| clock.should_extract(black_box(false), black_box(Duration::from_millis(41))));
    });
}

fn bench_input_next(c: &mut Criterion) {
    let source = grid_fold(32);
    let base = InputSnapshot::default().next(InputValues {
        source_text: source.clone(),
        ..InputValues::default()
    });
    let values = InputValues {
        source_text: source,
        fold_percentage: 0.5,
        ..InputValues::default()
    };
    c.bench_function("input/next_with_large_source", |b| {
        b.iter(|| base.next(black_box(values.clone())));
    });
}

fn bench_layout(c: &mut Criterion) {
    c.bench_function("output/layout_all_channels", |b| {
        b.iter(|| RegionLayout::compute(black_box(ExtractionSet::ALL), black_box(10_000)));
    });
}

fn bench_fold_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("fold/parse");
    for n in [8u32, 32, 64] {
        let source = grid_fold(n);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &source, |b, source| {
            b.iter(|| FoldModel::parse(black_box(source.as_bytes())));
        });
    }
    group.finish();
}

fn bench_static_coords(c: &mut Criterion) {
    let mut group = c.benchmark_group("session/static_coords");
    for n in [8u32, 64] {
        let mut session = ModelSession::new(InstrumentedSolver::default());
        session
            .update(Some(&grid_fold(n)), Some(0), Some(1.0))
            .expect("grid loads");
        group.throughput(Throughput::Elements(u64::from(session.vertex_count())));
        group.bench_function(BenchmarkId::from_parameter(n), |b| {
            b.iter(|| {
                session.invalidate_static_coords();
                session.static_vertex_coords().len()
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_step_count,
    bench_input_next,
    bench_layout,
    bench_fold_parse,
    bench_static_coords
);
criterion_main!(benches);
