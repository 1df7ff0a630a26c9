//! Builds and runs the task graph of one extraction pass
use std::{
    ops::Range,
    time::{Duration, Instant},
};

use log::debug;
use strum::IntoEnumIterator;

use super::{Descriptor, Domain, ElementKind, ExtractJob};
use crate::{
    buffer::Buffer,
    config::{ExtractConfig, RenderOptions},
    mesh::MeshSource,
    render_data::{DataFlags, ExtractType, IterFlags, MeshRenderData},
    task::TaskGraph,
};

/// Summary of one extraction pass
#[derive(Clone, Debug)]
pub struct ExtractReport {
    /// Representation the pass iterated
    pub extract_type: ExtractType,
    /// Extractors run, in request order
    pub extractors: Vec<&'static str>,
    /// Extractors split into parallel chunks
    pub chunked: Vec<&'static str>,
    /// Number of chunk tasks across all chunked extractors
    pub chunk_tasks: usize,
    /// Extractors that ran in the shared small-work node
    pub bundled: Vec<&'static str>,
    /// Wall-clock time of the pass, including view construction
    pub elapsed: Duration,
}

/// How one extractor is scheduled
enum Plan {
    /// Init node, then one task per chunk
    Chunked(Vec<(ElementKind, Range<usize>)>),
    /// A dedicated node running everything back to back
    Own,
    /// Part of the shared small-work node
    Bundled,
}

/// Splits each iterated kind into contiguous chunks of at most `size`
fn chunks(
    mr: &MeshRenderData<'_>,
    iter: IterFlags,
    size: usize,
) -> Vec<(ElementKind, Range<usize>)> {
    let mut out = vec![];
    for kind in ElementKind::iter().filter(|k| iter.contains(k.flag())) {
        let n = mr.iter_len(kind.flag());
        let mut start = 0;
        while start < n {
            let end = (start + size).min(n);
            out.push((kind, start..end));
            start = end;
        }
    }
    out
}

/// Runs one extraction pass, producing a buffer per descriptor
///
/// Buffers are returned in the same order as `descs`.  The pass always
/// completes; missing layers degrade to documented defaults inside each
/// extractor.
pub fn extract_buffers(
    source: &MeshSource,
    opts: &RenderOptions,
    descs: &[&dyn Descriptor],
    config: &ExtractConfig,
) -> (Vec<Buffer>, ExtractReport) {
    let start = Instant::now();

    let mut iter = IterFlags::empty();
    let mut data = DataFlags::empty();
    for d in descs {
        iter |= d.iter_flags();
        data |= d.data_flags();
        // Every per-loop buffer shares one layout, so the loose tail must be
        // sized the same regardless of which extractors asked for it
        if d.domain() == Domain::Loop {
            iter |= IterFlags::LEDGE | IterFlags::LVERT;
        }
    }

    let mr = MeshRenderData::new(source, opts, iter);
    let jobs: Vec<Box<dyn ExtractJob + '_>> =
        descs.iter().map(|d| d.job(&mr)).collect();

    let chunk_size = config.chunk_size.max(1);
    let plans: Vec<Plan> = descs
        .iter()
        .map(|d| {
            let total: usize = ElementKind::iter()
                .filter(|k| d.iter_flags().contains(k.flag()))
                .map(|k| mr.iter_len(k.flag()))
                .sum();
            if total <= chunk_size {
                Plan::Bundled
            } else if d.use_threading() {
                Plan::Chunked(chunks(&mr, d.iter_flags(), chunk_size))
            } else {
                Plan::Own
            }
        })
        .collect();

    let mut report = ExtractReport {
        extract_type: mr.extract_type(),
        extractors: descs.iter().map(|d| d.name()).collect(),
        chunked: vec![],
        chunk_tasks: 0,
        bundled: vec![],
        elapsed: Duration::ZERO,
    };

    {
        let mut graph = TaskGraph::new();
        let mr = &mr;
        let root = graph.add_node(move || mr.update_aux(data));
        graph.push_work(root);

        let mut bundle: Vec<&dyn ExtractJob> = vec![];
        let mut chunked: Vec<(&dyn ExtractJob, Vec<_>)> = vec![];
        for (job, plan) in jobs.iter().zip(plans) {
            let job: &dyn ExtractJob = job.as_ref();
            match plan {
                Plan::Chunked(c) => {
                    report.chunked.push(job.name());
                    report.chunk_tasks += c.len();
                    job.set_chunk_count(c.len());
                    chunked.push((job, c));
                }
                Plan::Own => {
                    let n = graph.add_node(move || job.run_all());
                    graph.add_edge(root, n);
                }
                Plan::Bundled => {
                    report.bundled.push(job.name());
                    bundle.push(job);
                }
            }
        }

        if !chunked.is_empty() {
            let inits: Vec<&dyn ExtractJob> =
                chunked.iter().map(|(j, _)| *j).collect();
            let init = graph.add_node(move || {
                for j in inits {
                    j.init();
                }
            });
            graph.add_edge(root, init);
            for (job, c) in chunked {
                for (kind, range) in c {
                    let n = graph.add_node(move || job.run_chunk(kind, range));
                    graph.add_edge(init, n);
                }
            }
        }

        if !bundle.is_empty() {
            let n = graph.add_node(move || {
                for j in bundle {
                    j.run_all();
                }
            });
            graph.add_edge(root, n);
        }

        debug!(
            "extracting {} buffers ({:?}) with {} tasks",
            descs.len(),
            report.extract_type,
            graph.len()
        );
        graph.work_and_wait(config.threads);
    }

    let buffers = jobs.into_iter().map(|j| j.into_buffer()).collect();
    report.elapsed = start.elapsed();
    debug!(
        "extraction pass done in {:?}: {} chunk tasks, {} bundled",
        report.elapsed,
        report.chunk_tasks,
        report.bundled.len()
    );
    (buffers, report)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        buffer::BufferKind,
        config::ThreadPool,
        extract::descriptor,
        mesh::MeshBuilder,
    };

    fn strip(n: usize) -> MeshSource {
        let mut b = MeshBuilder::new();
        let v: Vec<_> = (0..=n)
            .flat_map(|i| [[i as f32, 0.0, 0.0], [i as f32, 1.0, 0.0]])
            .map(|p| b.vert(p))
            .collect();
        for i in 0..n {
            b.poly(&[v[2 * i], v[2 * i + 2], v[2 * i + 3], v[2 * i + 1]]);
        }
        MeshSource::object(b.build().unwrap())
    }

    #[test]
    fn chunk_boundaries() {
        let src = strip(10);
        let mr = MeshRenderData::new(
            &src,
            &RenderOptions::default(),
            IterFlags::POLY,
        );
        let c = chunks(&mr, IterFlags::POLY | IterFlags::LEDGE, 4);
        assert_eq!(
            c,
            vec![
                (ElementKind::Poly, 0..4),
                (ElementKind::Poly, 4..8),
                (ElementKind::Poly, 8..10)
            ]
        );
    }

    #[test]
    fn planning() {
        let src = strip(64);
        let pos = descriptor(BufferKind::PosNor, false).unwrap();
        let tris = descriptor(BufferKind::Tris, false).unwrap();
        let fdots = descriptor(BufferKind::Fdots, false).unwrap();
        let pool = ThreadPool::with_threads(2).unwrap();
        let config = ExtractConfig {
            chunk_size: 16,
            threads: Some(&pool),
            ..Default::default()
        };
        let (bufs, report) = extract_buffers(
            &src,
            &RenderOptions::default(),
            &[pos, tris, fdots],
            &config,
        );
        assert_eq!(bufs.len(), 3);
        assert_eq!(report.extractors, ["pos_nor", "tris", "fdots"]);
        assert_eq!(report.chunked, ["pos_nor"]);
        assert_eq!(report.chunk_tasks, 4);
        assert!(report.bundled.is_empty());
        assert_eq!(bufs[0].len(), 64 * 4);
        assert_eq!(bufs[1].len(), 64 * 2 * 3);

        // Everything fits in one chunk, so everything is bundled
        let config = ExtractConfig {
            chunk_size: 1 << 20,
            threads: None,
            ..Default::default()
        };
        let (_, report) = extract_buffers(
            &src,
            &RenderOptions::default(),
            &[pos, tris],
            &config,
        );
        assert_eq!(report.bundled, ["pos_nor", "tris"]);
        assert_eq!(report.chunk_tasks, 0);
    }

    #[test]
    fn empty_mesh() {
        let src = MeshSource::object(MeshBuilder::new().build().unwrap());
        let descs: Vec<_> = [BufferKind::PosNor, BufferKind::Tris]
            .into_iter()
            .filter_map(|k| descriptor(k, false))
            .collect();
        let (bufs, _) = extract_buffers(
            &src,
            &RenderOptions::default(),
            &descs,
            &ExtractConfig::default(),
        );
        assert!(bufs.iter().all(|b| b.is_empty()));
    }
}
