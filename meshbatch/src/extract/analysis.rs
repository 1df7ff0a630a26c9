//! Mesh analysis overlay: per-loop weights for overhang, thickness,
//! self-intersection, distortion and sharpness
//!
//! Every quantity needs the whole mesh (ray casts, triangle overlaps, edge
//! pairing), so the buffer is filled in the finish step.  Polygon quantities
//! are written to every loop of the polygon; vertex quantities to every loop
//! using the vertex.
use std::f32::consts::{FRAC_1_PI, FRAC_PI_2, PI};

use log::debug;
use nalgebra::Vector3;

use super::{Domain, Extract, vert_data};
use crate::{
    buffer::{Attr, Buffer, CompType, FetchMode, VertBuf, VertFormat},
    config::{StatVis, StatVisKind},
    render_data::{DataFlags, MeshRenderData},
};

const MESH_ANALYSIS_FORMAT: VertFormat = VertFormat::new(&[Attr::new(
    "weight",
    CompType::F32,
    1,
    FetchMode::Float,
)]);

/// Per-loop weight of the quantity selected by [`StatVis::kind`]
///
/// Weights are in `0..=1`, or `-1` where the overlay leaves the surface
/// uncolored.  Loose geometry has no weight; its entries stay zeroed.
pub struct MeshAnalysis;

impl Extract for MeshAnalysis {
    type Data = ();
    type Elem = f32;

    const NAME: &'static str = "mesh_analysis";
    const DATA_FLAGS: DataFlags = DataFlags::POLY_NOR.union(DataFlags::LOOPTRI);
    const DOMAIN: Domain = Domain::Loop;

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, ()) {
        let vbo =
            VertBuf::new::<f32>(&MESH_ANALYSIS_FORMAT, mr.loop_len_total());
        (Buffer::Vert(vbo), ())
    }

    fn finish(&self, mr: &MeshRenderData<'_>, buf: &mut Buffer, _: &()) {
        let s = &mr.opts().statvis;
        let out = &mut vert_data::<f32>(Self::NAME, buf)[..mr.loop_len()];
        match s.kind {
            StatVisKind::Overhang => overhang(mr, s, out),
            StatVisKind::Thickness => thickness(mr, s, out),
            StatVisKind::Intersect => intersect(mr, out),
            StatVisKind::Distort => distort(mr, s, out),
            StatVisKind::Sharp => sharp(mr, s, out),
        }
        debug!("mesh_analysis: {:?} over {} loops", s.kind, out.len());
    }
}

/// Inverse of a range's width, or 0 for an empty range
fn inv_range(min: f32, max: f32) -> f32 {
    if max > min { 1.0 / (max - min) } else { 0.0 }
}

/// Writes one value per polygon to all of its loops
fn fill_polys(
    mr: &MeshRenderData<'_>,
    out: &mut [f32],
    f: impl Fn(usize) -> f32,
) {
    for p in 0..mr.poly_len() {
        out[mr.poly_loops(p)].fill(f(p));
    }
}

fn tri_cos(mr: &MeshRenderData<'_>, i: usize) -> [Vector3<f32>; 3] {
    mr.looptri(i).tri.map(|l| mr.vert_co(mr.loop_vert(l as usize)))
}

////////////////////////////////////////////////////////////////////////////////

fn overhang_remap(fac: f32, min: f32, max: f32, ir: f32) -> f32 {
    if fac < min {
        1.0
    } else if fac > max {
        -1.0
    } else {
        (1.0 - (fac - min) * ir).clamp(0.0, 1.0)
    }
}

/// Angle between each polygon normal and the reference axis
///
/// Both are in object space.
fn overhang(mr: &MeshRenderData<'_>, s: &StatVis, out: &mut [f32]) {
    let (min, max) = (s.overhang_min * FRAC_1_PI, s.overhang_max * FRAC_1_PI);
    let ir = inv_range(min, max);
    let dir = s.overhang_axis.dir();
    fill_polys(mr, out, |p| {
        let fac = mr.poly_normal(p).angle(&dir) * FRAC_1_PI;
        overhang_remap(fac, min, max, ir)
    });
}

////////////////////////////////////////////////////////////////////////////////

/// Distance that ray origins are pushed below the surface
const RAY_OFFSET: f32 = 2e-5;

fn thickness_remap(fac: f32, min: f32, max: f32, ir: f32) -> f32 {
    if fac < max {
        (1.0 - (fac - min) * ir).clamp(0.0, 1.0)
    } else {
        -1.0
    }
}

/// Barycentric sample positions within a triangle
///
/// The first sample is the centroid; the rest follow a low-discrepancy
/// sequence from there, folded back into the triangle.
fn ray_samples(n: usize) -> Vec<(f32, f32)> {
    const A1: f32 = 0.754_877_7;
    const A2: f32 = 0.569_840_3;
    (0..n)
        .map(|k| {
            let k = k as f32;
            let u = (1.0 / 3.0 + k * A1).fract();
            let v = (1.0 / 3.0 + k * A2).fract();
            if u + v > 1.0 { (1.0 - u, 1.0 - v) } else { (u, v) }
        })
        .collect()
}

/// Distance to the opposite surface, along rays cast inward from each
/// triangle
///
/// Hits on surfaces at a steep angle count as further away.  Polygons
/// without a hit closer than the maximum are left uncolored.
fn thickness(mr: &MeshRenderData<'_>, s: &StatVis, out: &mut [f32]) {
    let (min, max) = (s.thickness_min, s.thickness_max);
    let ir = inv_range(min, max);
    let samples = ray_samples(
        s.thickness_samples.clamp(1, StatVis::MAX_THICKNESS_SAMPLES),
    );

    let tris: Vec<_> = (0..mr.tri_len()).map(|i| tri_cos(mr, i)).collect();
    let tree = TriTree::new(&tris);
    let mut face_dists = vec![max; mr.poly_len()];
    for (i, [a, b, c]) in tris.iter().enumerate() {
        let p = mr.looptri(i).poly as usize;
        let Some(dir) = (a - c).cross(&(b - c)).try_normalize(0.0) else {
            continue;
        };
        // Triangle normals point out, so the ray goes the other way
        let dir = -dir;
        for &(u, v) in &samples {
            let org = a + (b - a) * u + (c - a) * v + dir * RAY_OFFSET;
            let Some((j, mut dist)) = tree.ray_cast(org, dir, face_dists[p])
            else {
                continue;
            };
            let hit_no = mr.poly_normal(mr.looptri(j).poly as usize);
            let cos = mr.poly_normal(p).dot(&hit_no).abs();
            let angle_fac = 1.0 - (1.0 - cos).powi(3);
            dist /= angle_fac;
            if dist < face_dists[p] {
                face_dists[p] = dist;
            }
        }
    }
    fill_polys(mr, out, |p| thickness_remap(face_dists[p], min, max, ir));
}

////////////////////////////////////////////////////////////////////////////////

/// Squared length below which an intersection is a single point
const POINT_EPSILON: f32 = 1e-10;

/// Marks polygons with a triangle crossing a triangle of another polygon
///
/// Triangles sharing an edge never count; triangles sharing a vertex count
/// only if they cross along a segment rather than at that vertex.
fn intersect(mr: &MeshRenderData<'_>, out: &mut [f32]) {
    out.fill(-1.0);
    let tris: Vec<_> = (0..mr.tri_len()).map(|i| tri_cos(mr, i)).collect();
    let verts: Vec<_> = (0..mr.tri_len())
        .map(|i| mr.looptri(i).tri.map(|l| mr.loop_vert(l as usize)))
        .collect();
    let tree = TriTree::new(&tris);
    let mut hit = vec![false; mr.poly_len()];
    tree.overlapping(|i, j| {
        let pi = mr.looptri(i).poly as usize;
        let pj = mr.looptri(j).poly as usize;
        if pi == pj || (hit[pi] && hit[pj]) {
            return;
        }
        let shared = verts[i].iter().filter(|v| verts[j].contains(v)).count();
        if shared >= 2 {
            return;
        }
        let crosses = match tri_tri_points(&tris[i], &tris[j]) {
            Some((a, b)) => {
                shared == 0 || (a - b).norm_squared() > POINT_EPSILON
            }
            None => false,
        };
        if crosses {
            hit[pi] = true;
            hit[pj] = true;
        }
    });
    for p in (0..mr.poly_len()).filter(|&p| hit[p]) {
        out[mr.poly_loops(p)].fill(1.0);
    }
}

/// Finds where the edges of each triangle cross the other triangle
///
/// Returns the two crossing points furthest apart, or `None` if the
/// triangles don't touch.  Coplanar triangles never touch.
fn tri_tri_points(
    a: &[Vector3<f32>; 3],
    b: &[Vector3<f32>; 3],
) -> Option<(Vector3<f32>, Vector3<f32>)> {
    let mut pts = vec![];
    for (edges, tri) in [(a, b), (b, a)] {
        for k in 0..3 {
            let (p, q) = (edges[k], edges[(k + 1) % 3]);
            if let Some(t) = ray_triangle(p, q - p, tri).filter(|&t| t <= 1.0) {
                pts.push(p + (q - p) * t);
            }
        }
    }
    let first = *pts.first()?;
    let far = pts
        .iter()
        .copied()
        .max_by(|x, y| {
            (x - first).norm_squared().total_cmp(&(y - first).norm_squared())
        })
        .unwrap_or(first);
    Some((first, far))
}

////////////////////////////////////////////////////////////////////////////////

fn distort_remap(fac: f32, min: f32, ir: f32) -> f32 {
    if fac >= min {
        ((fac - min) * ir).clamp(0.0, 1.0)
    } else {
        -1.0
    }
}

/// Non-planarity of quads and n-gons
///
/// Twice the largest angle between the polygon normal and the normal of
/// the triangle at any corner.  Triangles are always planar and left
/// uncolored.
fn distort(mr: &MeshRenderData<'_>, s: &StatVis, out: &mut [f32]) {
    let (min, max) = (s.distort_min, s.distort_max);
    let ir = inv_range(min, max);
    fill_polys(mr, out, |p| {
        let loops = mr.poly_loops(p);
        if loops.len() <= 3 {
            return -1.0;
        }
        let f_no = mr.poly_normal(p);
        let co = |l: usize| mr.vert_co(mr.loop_vert(l));
        let fac = loops
            .clone()
            .map(|l| {
                let prev = if l == loops.start { loops.end - 1 } else { l - 1 };
                let next = if l + 1 == loops.end { loops.start } else { l + 1 };
                let (a, b, c) = (co(prev), co(l), co(next));
                let n = (b - a)
                    .cross(&(c - b))
                    .try_normalize(0.0)
                    .unwrap_or_else(Vector3::zeros);
                // Concave corners face the other way
                let n = if f_no.dot(&n) < 0.0 { -n } else { n };
                f_no.angle(&n)
            })
            .fold(0.0, f32::max);
        distort_remap(fac * 2.0, min, ir)
    });
}

////////////////////////////////////////////////////////////////////////////////

fn sharp_remap(fac: f32, min: f32, ir: f32) -> f32 {
    if fac > min {
        ((fac - min) * ir).clamp(0.0, 1.0)
    } else {
        -1.0
    }
}

/// Polygons seen so far around an edge
#[derive(Copy, Clone)]
enum EdgeFaces {
    Empty,
    One(Vector3<f32>),
    Many,
}

/// Largest signed dihedral angle of the edges around each vertex
///
/// Convex edges are positive and concave ones negative.  Edges with one
/// polygon or more than two count as a right angle.
fn sharp(mr: &MeshRenderData<'_>, s: &StatVis, out: &mut [f32]) {
    let (min, max) = (s.sharp_min, s.sharp_max);
    let ir = inv_range(min, max);
    let mut vert_angles = vec![-PI; mr.vert_len()];
    let mut edges = vec![EdgeFaces::Empty; mr.edge_len()];
    let mut bump = |v: usize, angle: f32| {
        vert_angles[v] = vert_angles[v].max(angle);
    };

    for p in 0..mr.poly_len() {
        let f1 = mr.poly_normal(p);
        let loops = mr.poly_loops(p);
        for l in loops.clone() {
            let next = if l + 1 == loops.end { loops.start } else { l + 1 };
            let (v, v_next) = (mr.loop_vert(l), mr.loop_vert(next));
            let e = mr.loop_edge(l);
            let angle = match edges[e] {
                EdgeFaces::Empty => {
                    edges[e] = EdgeFaces::One(f1);
                    continue;
                }
                EdgeFaces::One(f2) => {
                    edges[e] = EdgeFaces::Many;
                    let angle = f1.angle(&f2);
                    let dir = mr.vert_co(v_next) - mr.vert_co(v);
                    let convex = f1 != f2 && dir.dot(&f1.cross(&f2)) > 0.0;
                    if convex { angle } else { -angle }
                }
                EdgeFaces::Many => FRAC_PI_2,
            };
            bump(v, angle);
            bump(v_next, angle);
        }
    }
    for (e, state) in edges.iter().enumerate() {
        if let EdgeFaces::One(..) = state {
            let [a, b] = mr.edge_verts(e);
            bump(a, FRAC_PI_2);
            bump(b, FRAC_PI_2);
        }
    }
    for (l, o) in out.iter_mut().enumerate() {
        *o = sharp_remap(vert_angles[mr.loop_vert(l)], min, ir);
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Möller–Trumbore intersection of the ray `org + t * dir` with a triangle
///
/// Returns `t` for hits in front of the origin.  Rays parallel to the
/// triangle never hit.
fn ray_triangle(
    org: Vector3<f32>,
    dir: Vector3<f32>,
    [v0, v1, v2]: &[Vector3<f32>; 3],
) -> Option<f32> {
    let e1 = v1 - v0;
    let e2 = v2 - v0;
    let h = dir.cross(&e2);
    let a = e1.dot(&h);
    if a.abs() < 1e-12 {
        return None;
    }
    let f = 1.0 / a;
    let s = org - v0;
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(&e1);
    let v = f * dir.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = f * e2.dot(&q);
    (t >= 0.0).then_some(t)
}

#[derive(Copy, Clone, Debug)]
struct Aabb {
    min: Vector3<f32>,
    max: Vector3<f32>,
}

impl Aabb {
    fn empty() -> Self {
        Self {
            min: Vector3::repeat(f32::INFINITY),
            max: Vector3::repeat(f32::NEG_INFINITY),
        }
    }

    fn of(t: &[Vector3<f32>; 3]) -> Self {
        Self {
            min: t[0].inf(&t[1]).inf(&t[2]),
            max: t[0].sup(&t[1]).sup(&t[2]),
        }
    }

    fn union(&self, o: &Self) -> Self {
        Self {
            min: self.min.inf(&o.min),
            max: self.max.sup(&o.max),
        }
    }

    fn overlaps(&self, o: &Self) -> bool {
        (0..3).all(|i| self.min[i] <= o.max[i] && o.min[i] <= self.max[i])
    }

    /// Slab test against a ray segment of length `max_t`
    fn hit_by(
        &self,
        org: &Vector3<f32>,
        inv_dir: &Vector3<f32>,
        max_t: f32,
    ) -> bool {
        let (mut t0, mut t1) = (0.0f32, max_t);
        for i in 0..3 {
            let a = (self.min[i] - org[i]) * inv_dir[i];
            let b = (self.max[i] - org[i]) * inv_dir[i];
            // NaN from 0 * inf means the ray runs inside this slab
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            if !lo.is_nan() {
                t0 = t0.max(lo);
            }
            if !hi.is_nan() {
                t1 = t1.min(hi);
            }
        }
        t0 <= t1
    }
}

/// Triangles per leaf
const LEAF_SIZE: usize = 4;

enum Node {
    Leaf(std::ops::Range<usize>),
    Branch(usize, usize),
}

/// Bounding volume hierarchy over triangles, split at the median centroid
/// along the widest axis
struct TriTree<'a> {
    tris: &'a [[Vector3<f32>; 3]],
    order: Vec<usize>,
    nodes: Vec<(Aabb, Node)>,
}

impl<'a> TriTree<'a> {
    fn new(tris: &'a [[Vector3<f32>; 3]]) -> Self {
        let mut out = Self {
            tris,
            order: (0..tris.len()).collect(),
            nodes: vec![],
        };
        if !tris.is_empty() {
            out.build(0..tris.len());
        }
        out
    }

    fn build(&mut self, r: std::ops::Range<usize>) -> usize {
        let tris = self.tris;
        let bounds = self.order[r.clone()]
            .iter()
            .fold(Aabb::empty(), |b, &i| b.union(&Aabb::of(&tris[i])));
        let index = self.nodes.len();
        if r.len() <= LEAF_SIZE {
            self.nodes.push((bounds, Node::Leaf(r)));
            return index;
        }
        self.nodes.push((bounds, Node::Leaf(0..0)));

        let axis = (bounds.max - bounds.min).imax();
        let centroid =
            |i: &usize| tris[*i].iter().map(|v| v[axis]).sum::<f32>();
        let mid = r.len() / 2;
        self.order[r.clone()].select_nth_unstable_by(mid, |a, b| {
            centroid(a).total_cmp(&centroid(b))
        });
        let left = self.build(r.start..r.start + mid);
        let right = self.build(r.start + mid..r.end);
        self.nodes[index].1 = Node::Branch(left, right);
        index
    }

    /// Finds the nearest triangle hit closer than `max_dist`
    ///
    /// `dir` must be normalized, so that `t` is a distance.
    fn ray_cast(
        &self,
        org: Vector3<f32>,
        dir: Vector3<f32>,
        max_dist: f32,
    ) -> Option<(usize, f32)> {
        let inv_dir = dir.map(|d| 1.0 / d);
        let mut best: Option<(usize, f32)> = None;
        let mut stack = vec![];
        if !self.nodes.is_empty() {
            stack.push(0);
        }
        while let Some(n) = stack.pop() {
            let limit = best.map_or(max_dist, |(_, t)| t);
            let (bounds, node) = &self.nodes[n];
            if !bounds.hit_by(&org, &inv_dir, limit) {
                continue;
            }
            match node {
                Node::Branch(a, b) => stack.extend([*a, *b]),
                Node::Leaf(r) => {
                    for &i in &self.order[r.clone()] {
                        let limit = best.map_or(max_dist, |(_, t)| t);
                        match ray_triangle(org, dir, &self.tris[i]) {
                            Some(t) if t < limit => best = Some((i, t)),
                            _ => (),
                        }
                    }
                }
            }
        }
        best
    }

    /// Calls `f(i, j)` once for each pair of triangles `i < j` whose bounds
    /// overlap
    fn overlapping(&self, mut f: impl FnMut(usize, usize)) {
        let mut stack = vec![];
        for (i, t) in self.tris.iter().enumerate() {
            let b = Aabb::of(t);
            stack.clear();
            if !self.nodes.is_empty() {
                stack.push(0);
            }
            while let Some(n) = stack.pop() {
                let (bounds, node) = &self.nodes[n];
                if !bounds.overlaps(&b) {
                    continue;
                }
                match node {
                    Node::Branch(a, c) => stack.extend([*a, *c]),
                    Node::Leaf(r) => {
                        for &j in &self.order[r.clone()] {
                            if j > i && Aabb::of(&self.tris[j]).overlaps(&b) {
                                f(i, j);
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        config::{Axis, RenderOptions},
        extract::{Descriptor, ExtractJob},
        mesh::{MeshBuilder, MeshSource, test_cube},
        render_data::IterFlags,
    };

    fn run(src: &MeshSource, statvis: StatVis) -> Vec<f32> {
        let opts = RenderOptions {
            statvis,
            ..RenderOptions::default()
        };
        let mr = MeshRenderData::new(src, &opts, IterFlags::all());
        let job = MeshAnalysis.job(&mr);
        job.run_all();
        job.into_buffer().data::<f32>().unwrap().to_vec()
    }

    fn quads(quads: &[[[f32; 3]; 4]]) -> MeshSource {
        let mut b = MeshBuilder::new();
        for q in quads {
            let v = q.map(|p| b.vert(p));
            b.poly(&v);
        }
        MeshSource::object(b.build().unwrap())
    }

    fn cube() -> MeshSource {
        MeshSource::object(test_cube())
    }

    #[test]
    fn overhang_faces() {
        let down = [
            [0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
            [1.0, 0.0, 0.0],
        ];
        let up = [
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ];
        let w = run(&quads(&[down, up]), StatVis::default());
        assert_eq!(w[..4], [1.0; 4]);
        assert_eq!(w[4..], [-1.0; 4]);

        let s = StatVis {
            overhang_axis: Axis::PosZ,
            ..StatVis::default()
        };
        let w = run(&quads(&[down, up]), s);
        assert_eq!(w[..4], [-1.0; 4]);
        assert_eq!(w[4..], [1.0; 4]);
    }

    #[test]
    fn loose_entries_stay_zero() {
        let mut b = MeshBuilder::new();
        for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            b.vert(p);
        }
        b.poly(&[0, 1, 2]);
        let a = b.vert([5.0, 0.0, 0.0]);
        let c = b.vert([6.0, 0.0, 0.0]);
        b.edge(a, c);
        b.vert([9.0, 0.0, 0.0]);
        let src = MeshSource::object(b.build().unwrap());
        for kind in [StatVisKind::Overhang, StatVisKind::Intersect] {
            let w = run(&src, StatVis { kind, ..StatVis::default() });
            assert_eq!(w.len(), 3 + 2 + 1);
            assert_eq!(w[3..], [0.0; 3]);
        }
    }

    #[test]
    fn thickness_of_cube() {
        let s = StatVis {
            kind: StatVisKind::Thickness,
            thickness_max: 2.0,
            ..StatVis::default()
        };
        let w = run(&cube(), s);
        assert_eq!(w.len(), 24);
        // Top and bottom see each other one unit away
        for (l, w) in w[..8].iter().enumerate() {
            assert!((w - 0.5).abs() < 1e-3, "loop {l}: {w}");
        }

        // Nothing closer than the default maximum
        let s = StatVis {
            kind: StatVisKind::Thickness,
            ..StatVis::default()
        };
        assert!(run(&cube(), s).iter().all(|&w| w == -1.0));

        // An open quad has no opposite surface
        let q = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        let s = StatVis {
            kind: StatVisKind::Thickness,
            thickness_max: 2.0,
            thickness_samples: 8,
            ..StatVis::default()
        };
        assert_eq!(run(&quads(&[q]), s), [-1.0; 4]);
    }

    #[test]
    fn intersecting_quads() {
        let s = StatVis {
            kind: StatVisKind::Intersect,
            ..StatVis::default()
        };
        assert!(run(&cube(), s).iter().all(|&w| w == -1.0));

        let flat = [
            [-1.0, -1.0, 0.0],
            [1.0, -1.0, 0.0],
            [1.0, 1.0, 0.0],
            [-1.0, 1.0, 0.0],
        ];
        let cross = [
            [-0.5, 0.1, -1.0],
            [0.7, 0.1, -1.0],
            [0.7, 0.1, 1.3],
            [-0.5, 0.1, 1.3],
        ];
        let apart = [
            [5.0, 0.0, 0.0],
            [6.0, 0.0, 0.0],
            [6.0, 1.0, 0.0],
            [5.0, 1.0, 0.0],
        ];
        let w = run(&quads(&[flat, cross, apart]), s);
        assert_eq!(w[..8], [1.0; 8]);
        assert_eq!(w[8..], [-1.0; 4]);
    }

    #[test]
    fn distortion() {
        let s = StatVis {
            kind: StatVisKind::Distort,
            ..StatVis::default()
        };
        let flat = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        let bent = [
            [2.0, 0.0, 0.0],
            [3.0, 0.0, 0.0],
            [3.0, 1.0, 0.5],
            [2.0, 1.0, 0.0],
        ];
        let w = run(&quads(&[flat, bent]), s);
        assert_eq!(w[..4], [-1.0; 4]);
        assert!(w[4] > 0.0 && w[4] <= 1.0, "{}", w[4]);
        assert!(w[4..].iter().all(|&x| x == w[4]));
    }

    #[test]
    fn sharp_cube() {
        let s = StatVis {
            kind: StatVisKind::Sharp,
            sharp_min: 0.0,
            sharp_max: PI,
            ..StatVis::default()
        };
        let w = run(&cube(), s);
        assert!(w.iter().all(|&w| (w - 0.5).abs() < 1e-5), "{w:?}");

        // The default range starts at a right angle, which is excluded
        let s = StatVis {
            kind: StatVisKind::Sharp,
            ..StatVis::default()
        };
        assert!(run(&cube(), s).iter().all(|&w| w == -1.0));
    }

    #[test]
    fn tree_ray_cast() {
        let tris = [
            [
                Vector3::new(0.0, 0.0, 1.0),
                Vector3::new(1.0, 0.0, 1.0),
                Vector3::new(0.0, 1.0, 1.0),
            ],
            [
                Vector3::new(0.0, 0.0, 3.0),
                Vector3::new(1.0, 0.0, 3.0),
                Vector3::new(0.0, 1.0, 3.0),
            ],
        ];
        let tree = TriTree::new(&tris);
        let org = Vector3::new(0.25, 0.25, 0.0);
        assert_eq!(tree.ray_cast(org, Vector3::z(), 10.0), Some((0, 1.0)));
        assert_eq!(tree.ray_cast(org, Vector3::z(), 0.5), None);
        assert_eq!(tree.ray_cast(org, -Vector3::z(), 10.0), None);

        let mut pairs = vec![];
        tree.overlapping(|i, j| pairs.push((i, j)));
        assert!(pairs.is_empty());
    }
}
