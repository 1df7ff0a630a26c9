use criterion::{
    BenchmarkId, Criterion, black_box, criterion_group, criterion_main,
};
use meshbatch::{
    buffer::BufferKind,
    config::{ExtractConfig, RenderOptions, ThreadPool},
    extract::{Descriptor, descriptor, extract_buffers},
    mesh::{EditMesh, Mesh, MeshBuilder, MeshSource},
};

/// Builds a wavy `n x n` grid of quads
fn grid(n: u32) -> Mesh {
    let mut b = MeshBuilder::new();
    for y in 0..=n {
        for x in 0..=n {
            let (fx, fy) = (x as f32, y as f32);
            b.vert([fx, fy, (fx * 0.3).sin() * (fy * 0.2).cos()]);
        }
    }
    let w = n + 1;
    for y in 0..n {
        for x in 0..n {
            let i = y * w + x;
            b.poly(&[i, i + 1, i + 1 + w, i + w]);
        }
    }
    b.build().unwrap()
}

fn descriptors(kinds: &[BufferKind]) -> Vec<&'static dyn Descriptor> {
    kinds.iter().filter_map(|k| descriptor(*k, false)).collect()
}

pub fn object_thread_sweep(c: &mut Criterion) {
    let src = &MeshSource::object(grid(256));
    let opts = &RenderOptions::default();
    let descs = &descriptors(&[
        BufferKind::PosNor,
        BufferKind::Lnor,
        BufferKind::Tris,
        BufferKind::Lines,
    ]);

    let mut group = c.benchmark_group("speed vs threads (grid, object) (256)");
    for threads in [0, 1, 2, 4, 8] {
        let pool = (threads > 0).then(|| ThreadPool::with_threads(threads).unwrap());
        let cfg = &ExtractConfig {
            threads: pool.as_ref(),
            ..ExtractConfig::default()
        };
        group.bench_function(BenchmarkId::new("extract", threads), move |b| {
            b.iter(|| black_box(extract_buffers(src, opts, descs, cfg)))
        });
    }
}

pub fn edit_overlays(c: &mut Criterion) {
    let src = &MeshSource::edit(EditMesh::from_mesh(&grid(128)));
    let opts = &RenderOptions::default();
    let descs = &descriptors(&[
        BufferKind::PosNor,
        BufferKind::EditData,
        BufferKind::EdgeFac,
        BufferKind::Points,
        BufferKind::Fdots,
        BufferKind::FdotsPos,
    ]);

    let mut group = c.benchmark_group("speed vs threads (grid, edit) (128)");
    for threads in [0, 4, 8] {
        let pool = (threads > 0).then(|| ThreadPool::with_threads(threads).unwrap());
        let cfg = &ExtractConfig {
            threads: pool.as_ref(),
            ..ExtractConfig::default()
        };
        group.bench_function(BenchmarkId::new("extract", threads), move |b| {
            b.iter(|| black_box(extract_buffers(src, opts, descs, cfg)))
        });
    }
}

criterion_group!(benches, object_thread_sweep, edit_overlays);
criterion_main!(benches);
