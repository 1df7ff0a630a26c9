//! Scheduler properties under parallel execution
mod common;

use std::{
    ops::Range,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use meshbatch::{
    buffer::{
        Attr, Buffer, BufferKind, CompType, FetchMode, VertBuf, VertFormat,
        Window,
    },
    config::{ExtractConfig, RenderOptions, ThreadPool},
    extract::{
        Callbacks, Descriptor, Domain, ElementKind, Extract, IterPair,
        descriptor, extract_buffers,
    },
    mesh::{EditMesh, Mesh, MeshSource},
    render_data::MeshRenderData,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use strum::IntoEnumIterator;

const TALLY_FORMAT: VertFormat =
    VertFormat::new(&[Attr::new("tally", CompType::U32, 1, FetchMode::Int)]);

/// Extractor that records every chunk and checks them in its finish step
#[derive(Default)]
struct Tally {
    finishes: AtomicUsize,
}

/// Completion log of one pass
#[derive(Default)]
struct TallyLog(Mutex<Vec<(ElementKind, Range<usize>)>>);

impl Tally {
    fn mark(
        kind: ElementKind,
        dest: Range<usize>,
        r: Range<usize>,
        log: &TallyLog,
        w: &mut Window<'_, u32>,
    ) {
        w.slice_mut(dest).fill(1);
        log.0.lock().unwrap().push((kind, r));
    }

    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        log: &TallyLog,
        w: &mut Window<'_, u32>,
    ) {
        let dest = mr.poly_loop_start(r.start)..mr.poly_loop_start(r.end);
        Self::mark(ElementKind::Poly, dest, r, log, w);
    }

    fn ledge<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        log: &TallyLog,
        w: &mut Window<'_, u32>,
    ) {
        let s = mr.ledge_loop_start();
        let dest = s + 2 * r.start..s + 2 * r.end;
        Self::mark(ElementKind::LEdge, dest, r, log, w);
    }

    fn lvert<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        log: &TallyLog,
        w: &mut Window<'_, u32>,
    ) {
        let s = mr.lvert_loop_start();
        Self::mark(ElementKind::LVert, s + r.start..s + r.end, r, log, w);
    }
}

impl Extract for Tally {
    type Data = TallyLog;
    type Elem = u32;

    const NAME: &'static str = "tally";
    const USE_THREADING: bool = true;
    const DOMAIN: Domain = Domain::Loop;
    const CALLBACKS: Callbacks<Self> = Callbacks {
        poly: Some(IterPair {
            edit: Self::poly::<EditMesh>,
            mesh: Self::poly::<Mesh>,
        }),
        ledge: Some(IterPair {
            edit: Self::ledge::<EditMesh>,
            mesh: Self::ledge::<Mesh>,
        }),
        lvert: Some(IterPair {
            edit: Self::lvert::<EditMesh>,
            mesh: Self::lvert::<Mesh>,
        }),
        ..Callbacks::NONE
    };

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, TallyLog) {
        let vbo = VertBuf::new::<u32>(&TALLY_FORMAT, mr.loop_len_total());
        (Buffer::Vert(vbo), TallyLog::default())
    }

    fn finish(&self, mr: &MeshRenderData<'_>, buf: &mut Buffer, log: &TallyLog) {
        assert_eq!(self.finishes.fetch_add(1, Ordering::SeqCst), 0);

        // Every element of every kind must be logged exactly once
        let log = log.0.lock().unwrap();
        for kind in [ElementKind::Poly, ElementKind::LEdge, ElementKind::LVert] {
            let mut seen: Vec<_> = log
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, r)| r.clone())
                .collect();
            seen.sort_by_key(|r| r.start);
            let mut next = 0;
            for r in seen {
                assert_eq!(r.start, next, "{kind:?}");
                next = r.end;
            }
            let len = match kind {
                ElementKind::Poly => mr.poly_len(),
                ElementKind::LEdge => mr.ledge_len(),
                _ => mr.lvert_len(),
            };
            assert_eq!(next, len, "{kind:?}");
        }

        // ...and every chunk's writes must be visible
        let data = buf.elems_mut::<u32>().unwrap();
        assert!(data.iter().all(|&d| d == 1));
        data.fill(2);
    }
}

fn pools() -> Vec<Option<ThreadPool>> {
    let mut out = vec![None];
    for n in 1..=8 {
        out.push(Some(ThreadPool::with_threads(n).unwrap()));
    }
    out
}

#[test]
fn finish_runs_once() {
    let sources = [
        MeshSource::object(common::random_mesh(10, 48)),
        MeshSource::edit(EditMesh::from_mesh(&common::random_mesh(11, 48))),
    ];
    for pool in pools() {
        for src in &sources {
            let config = ExtractConfig {
                chunk_size: 128,
                threads: pool.as_ref(),
                ..ExtractConfig::default()
            };
            let tally = Tally::default();
            let (bufs, report) = extract_buffers(
                src,
                &RenderOptions::default(),
                &[&tally as &dyn Descriptor],
                &config,
            );
            assert!(report.chunk_tasks >= 8, "{}", report.chunk_tasks);
            assert_eq!(report.chunked, ["tally"]);
            assert_eq!(tally.finishes.load(Ordering::SeqCst), 1);
            assert!(bufs[0].data::<u32>().unwrap().iter().all(|&d| d == 2));
        }
    }
}

fn all_kinds() -> Vec<BufferKind> {
    BufferKind::iter()
        .filter(|k| *k != BufferKind::LinesLoose)
        .collect()
}

fn run(
    src: &MeshSource,
    kinds: &[BufferKind],
    config: &ExtractConfig,
) -> Vec<common::Contents> {
    let descs: Vec<&dyn Descriptor> = kinds
        .iter()
        .map(|k| descriptor(*k, config.hq_normals).unwrap())
        .collect();
    let (bufs, _) =
        extract_buffers(src, &RenderOptions::default(), &descs, config);
    bufs.iter().map(common::contents).collect()
}

#[test]
fn subsets_match_full_pass() {
    let mut rng = StdRng::seed_from_u64(123);
    let pool = ThreadPool::with_threads(4).unwrap();
    let config = ExtractConfig {
        chunk_size: 64,
        threads: Some(&pool),
        ..ExtractConfig::default()
    };
    for seed in 0..4 {
        let me = common::random_mesh(seed, 24);
        for src in [
            MeshSource::object(me.clone()),
            MeshSource::edit(EditMesh::from_mesh(&me)),
        ] {
            let kinds = all_kinds();
            let full = run(&src, &kinds, &config);
            for _ in 0..4 {
                let subset: Vec<usize> =
                    (0..kinds.len()).filter(|_| rng.gen_bool(0.3)).collect();
                let ks: Vec<_> = subset.iter().map(|&i| kinds[i]).collect();
                let part = run(&src, &ks, &config);
                for (i, p) in subset.iter().zip(&part) {
                    assert_eq!(&full[*i], p, "{}", kinds[*i]);
                }
            }
        }
    }
}

#[test]
fn repeated_passes_are_identical() {
    let me = common::random_mesh(99, 32);
    let src = MeshSource::edit(EditMesh::from_mesh(&me));
    let kinds = all_kinds();
    let inline = ExtractConfig {
        chunk_size: 50,
        threads: None,
        hq_normals: true,
    };
    let first = run(&src, &kinds, &inline);
    for pool in pools().into_iter().flatten() {
        let config = ExtractConfig {
            threads: Some(&pool),
            ..inline
        };
        assert!(run(&src, &kinds, &config) == first);
    }
}
