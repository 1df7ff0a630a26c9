//! Mesh generators shared by the integration tests
#![allow(dead_code)]
use meshbatch::{
    buffer::Buffer,
    mesh::{ElemFlags, Mesh, MeshBuilder},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Builds `n` quads in a row, with `loose_edges` loose edges and
/// `loose_verts` loose vertices after them
pub fn quad_strip(n: usize, loose_edges: usize, loose_verts: usize) -> Mesh {
    let mut b = MeshBuilder::new();
    for x in 0..=n {
        b.vert([x as f32, 0.0, 0.0]);
        b.vert([x as f32, 1.0, 0.0]);
    }
    for i in 0..n as u32 {
        b.poly(&[2 * i, 2 * i + 2, 2 * i + 3, 2 * i + 1]);
    }
    for i in 0..loose_edges {
        let a = b.vert([-1.0 - i as f32, 0.0, 0.0]);
        let c = b.vert([-1.0 - i as f32, 1.0, 0.0]);
        b.edge(a, c);
    }
    for i in 0..loose_verts {
        b.vert([0.0, -1.0 - i as f32, 0.0]);
    }
    b.build().unwrap()
}

/// Builds a jittered grid of quads and triangles with random holes, loose
/// geometry, and selection and visibility flags
pub fn random_mesh(seed: u64, size: usize) -> Mesh {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut b = MeshBuilder::new();
    let w = size + 1;
    for y in 0..w {
        for x in 0..w {
            let z = rng.gen_range(-0.25..0.25);
            b.vert([x as f32, y as f32, z]);
        }
    }
    for y in 0..size {
        for x in 0..size {
            let i = (y * w + x) as u32;
            let (a, c, d, e) = (i, i + 1, i + 1 + w as u32, i + w as u32);
            match rng.gen_range(0..8) {
                0 => (),
                1 | 2 => {
                    b.poly(&[a, c, d]);
                    b.poly(&[a, d, e]);
                }
                3 => {
                    b.poly_with_material(&[a, c, d, e], 1);
                }
                _ => {
                    b.poly(&[a, c, d, e]);
                }
            }
        }
    }
    for _ in 0..size {
        let p = [rng.gen_range(-5.0..0.0), rng.gen_range(-5.0..0.0), 1.0];
        let a = b.vert(p);
        let c = b.vert([p[0], p[1], 2.0]);
        b.edge(a, c);
        b.vert([p[0], p[1], -1.0]);
    }

    let mut me = b.build().unwrap();
    for v in &mut me.verts {
        v.flag.set(ElemFlags::SELECT, rng.gen_bool(0.3));
    }
    for e in &mut me.edges {
        e.flag.set(ElemFlags::SEAM, rng.gen_bool(0.1));
    }
    for p in &mut me.polys {
        p.flag.set(ElemFlags::SELECT, rng.gen_bool(0.3));
        p.flag.set(ElemFlags::HIDDEN, rng.gen_bool(0.05));
        p.flag.set(ElemFlags::SMOOTH, rng.gen_bool(0.5));
    }
    me
}

/// Raw contents of a buffer, for bitwise comparisons
#[derive(Debug, PartialEq, Eq)]
pub enum Contents {
    /// Vertex bytes
    Vert(Vec<u8>),
    /// Indices and per-material sub-ranges
    Index(Vec<u32>, Vec<std::ops::Range<usize>>),
}

pub fn contents(b: &Buffer) -> Contents {
    match b {
        Buffer::Vert(v) => Contents::Vert(v.as_bytes().to_vec()),
        Buffer::Index(i) => {
            Contents::Index(i.indices().to_vec(), i.subranges().to_vec())
        }
        Buffer::SubIndex(s) => Contents::Index(s.indices().to_vec(), vec![]),
    }
}
