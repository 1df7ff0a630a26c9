//! Normal computation over the render-data view
use nalgebra::Vector3;

use super::MeshRenderData;
use crate::mesh::{
    AttrDomain, EditMesh, ElemFlags, FaceId, LayerType, corner_angle,
    polygon_normal,
};

/// Computes vertex and face normals of an editable mesh from deformed
/// coordinates
pub(super) fn deformed_normals(
    bm: &EditMesh,
    cos: &[Vector3<f32>],
) -> (Vec<Vector3<f32>>, Vec<Vector3<f32>>) {
    let poly_normals: Vec<_> = (0..bm.face_len())
        .map(|f| {
            polygon_normal(
                bm.face_loops(FaceId::new(f))
                    .map(|l| cos[bm.loop_(l).v.index()]),
            )
        })
        .collect();

    let mut acc = vec![Vector3::zeros(); bm.vert_len()];
    for f in 0..bm.face_len() {
        for l in bm.face_loops(FaceId::new(f)) {
            let lp = bm.loop_(l);
            let co = cos[lp.v.index()];
            let prev = cos[bm.loop_(lp.prev).v.index()];
            let next = cos[bm.loop_(lp.next).v.index()];
            acc[lp.v.index()] +=
                poly_normals[f] * corner_angle(prev - co, next - co);
        }
    }
    let vert_normals = acc
        .into_iter()
        .zip(cos)
        .map(|(a, co)| {
            a.try_normalize(f32::EPSILON)
                .or_else(|| co.try_normalize(f32::EPSILON))
                .unwrap_or_else(Vector3::z)
        })
        .collect();
    (vert_normals, poly_normals)
}

/// Disjoint-set forest over loop indices
struct Groups(Vec<usize>);

impl Groups {
    fn new(n: usize) -> Self {
        Self((0..n).collect())
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.0[i] != i {
            self.0[i] = self.0[self.0[i]];
            i = self.0[i];
        }
        i
    }

    /// Merges two sets, keeping the smaller root so results are deterministic
    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a != b {
            self.0[a.max(b)] = a.min(b);
        }
    }
}

/// Computes split (per-corner) normals
///
/// Corners around a vertex share a normal when they are connected through
/// smooth edges: manifold, not marked sharp, between two smooth polygons whose
/// normals differ by at most `split_angle`.  Shared normals are the corner
/// angle weighted sum of the polygon normals in the group.  A non-zero entry
/// in the active custom normal layer overrides the computed value.
pub(super) fn split_normals(
    mr: &MeshRenderData<'_>,
    split_angle: f32,
) -> Vec<Vector3<f32>> {
    let poly_no = mr.poly_normals();
    let loop_len = mr.loop_len();

    let mut loop_poly = vec![0; loop_len];
    for p in 0..mr.poly_len() {
        for l in mr.poly_loops(p) {
            loop_poly[l] = p;
        }
    }
    let next = |l: usize| {
        let r = mr.poly_loops(loop_poly[l]);
        if l + 1 == r.end { r.start } else { l + 1 }
    };
    let prev = |l: usize| {
        let r = mr.poly_loops(loop_poly[l]);
        if l == r.start { r.end - 1 } else { l - 1 }
    };
    let smooth = |p: usize| mr.poly_flag(p).contains(ElemFlags::SMOOTH);

    // Use count and first two loops of every edge
    let mut users = vec![(0usize, [0usize; 2]); mr.edge_len()];
    for l in 0..loop_len {
        let u = &mut users[mr.loop_edge(l)];
        if u.0 < 2 {
            u.1[u.0] = l;
        }
        u.0 += 1;
    }

    let mut groups = Groups::new(loop_len);
    for (e, &(n, [l1, l2])) in users.iter().enumerate() {
        if n != 2 || mr.edge_flag(e).contains(ElemFlags::SHARP) {
            continue;
        }
        let (p1, p2) = (loop_poly[l1], loop_poly[l2]);
        if p1 == p2
            || !smooth(p1)
            || !smooth(p2)
            || poly_no[p1].angle(&poly_no[p2]) > split_angle
        {
            continue;
        }
        // Find the corner of the second polygon at a given vertex
        let other =
            |v: usize| if mr.loop_vert(l2) == v { l2 } else { next(l2) };
        for a in [l1, next(l1)] {
            groups.union(a, other(mr.loop_vert(a)));
        }
    }

    let mut acc = vec![Vector3::zeros(); loop_len];
    for l in 0..loop_len {
        let co = mr.vert_co(mr.loop_vert(l));
        let a = mr.vert_co(mr.loop_vert(prev(l))) - co;
        let b = mr.vert_co(mr.loop_vert(next(l))) - co;
        acc[groups.find(l)] += poly_no[loop_poly[l]] * corner_angle(a, b);
    }

    let ldata = mr.cdata(AttrDomain::Loop);
    let custom = ldata
        .active(LayerType::CustomNormal)
        .and_then(|o| ldata.normal(o));

    (0..loop_len)
        .map(|l| {
            let over = custom
                .and_then(|c| Vector3::from(c[l]).try_normalize(f32::EPSILON));
            over.or_else(|| acc[groups.find(l)].try_normalize(f32::EPSILON))
                .unwrap_or(poly_no[loop_poly[l]])
        })
        .collect()
}
