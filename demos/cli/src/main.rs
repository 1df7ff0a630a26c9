use std::time::Instant;

use anyhow::{Result, bail};
use clap::Parser;
use env_logger::Env;
use log::info;
use rand::{Rng, SeedableRng, rngs::StdRng};
use strum::IntoEnumIterator;

use meshbatch::{
    buffer::{Buffer, BufferKind, BufferSet},
    cache::{BatchCache, DirtyReason},
    config::{
        CacheConfig, DEFAULT_CHUNK_SIZE, ExtractConfig, RenderOptions,
        SelectMode, ThreadPool,
    },
    mesh::{
        AttrDomain, EditMesh, ElemFlags, LayerData, LayerType, LoopUv, Mesh,
        MeshBuilder, MeshSource,
    },
};

/// Extracts GPU buffers from a generated grid mesh
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Number of grid cells along each side
    #[clap(short, long, default_value_t = 256)]
    size: u32,

    /// Number of loose edges (and loose vertices) to add
    #[clap(long, default_value_t = 0)]
    loose: u32,

    /// Draw the mesh in edit mode
    #[clap(short, long)]
    edit: bool,

    /// Buffers to build, as a comma-separated list (all of them if omitted)
    #[clap(short, long, value_delimiter = ',')]
    buffers: Vec<BufferKind>,

    /// Number of threads to use (0 runs every task on the calling thread)
    #[clap(short, long)]
    threads: Option<usize>,

    /// Chunk size for parallel extraction
    #[clap(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Use 16-bit normals
    #[clap(long)]
    hq: bool,

    /// Invalidate the cache for this reason between passes
    #[clap(long, value_parser = parse_reason)]
    invalidate: Option<DirtyReason>,

    /// Seed for vertex jitter and random selection
    #[clap(long, default_value_t = 0)]
    seed: u64,

    /// Number of passes to run (for benchmarking)
    #[clap(short = 'N', default_value_t = 1)]
    n: usize,
}

fn parse_reason(s: &str) -> Result<DirtyReason, String> {
    DirtyReason::iter()
        .find(|r| r.to_string().eq_ignore_ascii_case(s))
        .ok_or_else(|| {
            let names: Vec<_> =
                DirtyReason::iter().map(|r| r.to_string()).collect();
            format!("expected one of {}", names.join(", "))
        })
}

/// Builds a jittered grid with UVs, a weight layer, and random selection
fn grid(args: &Args) -> Result<Mesh> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let n = args.size;
    let w = n + 1;

    let mut b = MeshBuilder::new();
    for y in 0..=n {
        for x in 0..=n {
            let z = rng.gen_range(-0.1..0.1);
            b.vert([x as f32, y as f32, z]);
        }
    }
    for y in 0..n {
        for x in 0..n {
            let i = y * w + x;
            let mat = ((x + y) % 2) as u16;
            b.poly_with_material(&[i, i + 1, i + 1 + w, i + w], mat);
        }
    }
    for i in 0..args.loose {
        let x = -1.0 - i as f32;
        let a = b.vert([x, 0.0, 0.0]);
        let c = b.vert([x, 1.0, 0.0]);
        b.edge(a, c);
        b.vert([x, -1.0, 0.0]);
    }
    let mut me = b.build()?;

    let scale = 1.0 / n.max(1) as f32;
    let uvs = me
        .loops
        .iter()
        .map(|l| {
            let co = me.verts[l.v as usize].co;
            LoopUv::new(co.x * scale, co.y * scale)
        })
        .collect();
    me.add_layer(AttrDomain::Loop, LayerType::Uv, "uv", LayerData::Uv(uvs))?;
    let weights = (0..me.verts.len()).map(|_| rng.r#gen()).collect();
    me.add_layer(
        AttrDomain::Vert,
        LayerType::Weight,
        "weight",
        LayerData::Float(weights),
    )?;

    for v in &mut me.verts {
        v.flag.set(ElemFlags::SELECT, rng.gen_bool(0.2));
    }
    for p in &mut me.polys {
        p.flag.set(ElemFlags::SELECT, rng.gen_bool(0.2));
        p.flag.set(ElemFlags::SMOOTH, true);
    }
    Ok(me)
}

fn describe(b: &Buffer) -> String {
    match b {
        Buffer::Vert(v) => {
            format!("{} verts, {} bytes", v.len(), v.as_bytes().len())
        }
        Buffer::Index(i) => format!(
            "{} indices, {} subranges",
            i.indices().len(),
            i.subranges().len()
        ),
        Buffer::SubIndex(i) => format!("{} indices (view)", i.indices().len()),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .init();
    let args = Args::parse();
    if args.chunk_size == 0 {
        bail!("chunk size must be nonzero");
    }

    let start = Instant::now();
    let me = grid(&args)?;
    let source = if args.edit {
        MeshSource::edit(EditMesh::from_mesh(&me))
    } else {
        MeshSource::object(me)
    };
    info!("Built mesh in {:?}", start.elapsed());

    let kinds: BufferSet = if args.buffers.is_empty() {
        BufferSet::all()
    } else {
        args.buffers.iter().copied().collect()
    };

    let pool = match args.threads {
        Some(0) | None => None,
        Some(n) => Some(ThreadPool::with_threads(n)?),
    };
    let threads = match args.threads {
        Some(0) => None,
        Some(_) => pool.as_ref(),
        None => Some(&ThreadPool::Global),
    };
    let config = ExtractConfig {
        chunk_size: args.chunk_size,
        hq_normals: args.hq,
        threads,
    };
    let opts = RenderOptions {
        select_mode: SelectMode::VERT | SelectMode::FACE,
        uv_edit: true,
        ..RenderOptions::default()
    };

    let mut cache = BatchCache::new(CacheConfig::default());
    for frame in 0..args.n {
        if let Some(reason) = args.invalidate {
            cache.invalidate(reason);
        }
        let start = Instant::now();
        cache.request_buffers(&source, &opts, kinds, &config);
        info!("Pass {frame} took {:?}", start.elapsed());
        cache.free_old(frame as u64);
    }

    let stats = cache.stats();
    info!("{} extraction passes", stats.passes);
    if let Some(r) = &stats.last_report {
        info!(
            "Last pass: {:?}, {} extractors ({} chunked into {} tasks) in {:?}",
            r.extract_type,
            r.extractors.len(),
            r.chunked.len(),
            r.chunk_tasks,
            r.elapsed
        );
    }
    for k in kinds.iter() {
        match cache.get(k) {
            Some(b) => info!("  {k}: {}", describe(b)),
            None => info!("  {k}: not built"),
        }
    }
    Ok(())
}
