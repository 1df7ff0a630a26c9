use nalgebra::Vector3;
use rustc_hash::FxHashMap;

use super::{ElemFlags, MEdge, MLoop, MPoly, MVert, Mesh};
use crate::Error;

/// Container used during construction of a [`Mesh`]
///
/// Polygons are given as vertex rings; edges are deduplicated and loose edges
/// are tagged when the mesh is built.
#[derive(Default)]
pub struct MeshBuilder {
    verts: Vec<Vector3<f32>>,
    /// Vertex rings and material slot of each polygon
    polys: Vec<(Vec<u32>, u16)>,
    loose_edges: Vec<[u32; 2]>,
}

impl MeshBuilder {
    /// Builds an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a vertex, returning its index
    pub fn vert(&mut self, p: [f32; 3]) -> u32 {
        let i = self.verts.len();
        self.verts.push(p.into());
        i as u32
    }

    /// Adds a polygon in material slot 0
    pub fn poly(&mut self, vs: &[u32]) -> &mut Self {
        self.poly_with_material(vs, 0)
    }

    /// Adds a polygon in the given material slot
    pub fn poly_with_material(&mut self, vs: &[u32], mat: u16) -> &mut Self {
        self.polys.push((vs.to_vec(), mat));
        self
    }

    /// Adds an edge which is not part of any polygon
    pub fn edge(&mut self, a: u32, b: u32) -> &mut Self {
        self.loose_edges.push([a, b]);
        self
    }

    /// Validates input and builds the mesh
    ///
    /// The material count is one more than the highest material slot used.
    pub fn build(self) -> Result<Mesh, Error> {
        let vert_len = self.verts.len();
        let check = |v: u32| {
            if (v as usize) < vert_len {
                Ok(())
            } else {
                Err(Error::BadVertIndex(v, vert_len))
            }
        };

        let mut out = Mesh {
            verts: self
                .verts
                .iter()
                .map(|&co| MVert {
                    co,
                    ..MVert::default()
                })
                .collect(),
            ..Mesh::default()
        };

        // Map from sorted vertex pair to edge index
        let mut edge_map: FxHashMap<(u32, u32), u32> = FxHashMap::default();
        let mut get_edge = |edges: &mut Vec<MEdge>, a: u32, b: u32| {
            let key = (a.min(b), a.max(b));
            *edge_map.entry(key).or_insert_with(|| {
                edges.push(MEdge {
                    v: [a, b],
                    flag: ElemFlags::empty(),
                });
                (edges.len() - 1) as u32
            })
        };

        let mut mat_len = 1;
        for (vs, mat) in &self.polys {
            if vs.len() < 3 {
                return Err(Error::DegeneratePolygon(vs.len()));
            }
            let loopstart = out.loops.len() as u32;
            for (i, &v) in vs.iter().enumerate() {
                check(v)?;
                let next = vs[(i + 1) % vs.len()];
                if next == v {
                    return Err(Error::RepeatedVertex(v));
                }
                let e = get_edge(&mut out.edges, v, next);
                out.loops.push(MLoop { v, e });
            }
            out.polys.push(MPoly {
                loopstart,
                totloop: vs.len() as u32,
                mat: *mat,
                flag: ElemFlags::SMOOTH,
            });
            mat_len = mat_len.max(mat + 1);
        }
        out.mat_len = mat_len;

        for &[a, b] in &self.loose_edges {
            check(a)?;
            check(b)?;
            if a == b {
                return Err(Error::RepeatedVertex(a));
            }
            let prev_len = out.edges.len();
            let e = get_edge(&mut out.edges, a, b) as usize;
            if out.edges.len() == prev_len {
                return Err(Error::DuplicateEdge(a, b));
            }
            out.edges[e].flag |= ElemFlags::LOOSE;
        }

        out.recalc_normals();
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn edges_are_shared() {
        let mut b = MeshBuilder::new();
        let vs = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [2.0, 0.0, 0.0],
        ]
        .map(|p| b.vert(p));
        b.poly(&[vs[0], vs[1], vs[2], vs[3]]);
        b.poly_with_material(&[vs[1], vs[4], vs[2]], 2);
        let mesh = b.build().unwrap();
        assert_eq!(mesh.vert_len(), 5);
        assert_eq!(mesh.edge_len(), 6);
        assert_eq!(mesh.loop_len(), 7);
        assert_eq!(mesh.tri_len(), 3);
        assert_eq!(mesh.mat_len, 3);
        assert!(mesh.edges.iter().all(|e| !e.flag.contains(ElemFlags::LOOSE)));

        // The shared edge is referenced by a loop of each polygon
        let shared = mesh.loops[1].e;
        assert_eq!(mesh.loops[6].e, shared);
    }

    #[test]
    fn loose_edges() {
        let mut b = MeshBuilder::new();
        let a = b.vert([0.0; 3]);
        let c = b.vert([1.0, 0.0, 0.0]);
        b.edge(a, c);
        let mesh = b.build().unwrap();
        assert_eq!(mesh.edge_len(), 1);
        assert!(mesh.edges[0].flag.contains(ElemFlags::LOOSE));
    }

    #[test]
    fn bad_input() {
        let mut b = MeshBuilder::new();
        let a = b.vert([0.0; 3]);
        let c = b.vert([1.0, 0.0, 0.0]);
        b.poly(&[a, c]);
        assert_eq!(b.build().unwrap_err(), Error::DegeneratePolygon(2));

        let mut b = MeshBuilder::new();
        let a = b.vert([0.0; 3]);
        b.poly(&[a, 1, 2]);
        assert_eq!(b.build().unwrap_err(), Error::BadVertIndex(1, 1));

        let mut b = MeshBuilder::new();
        let vs = [[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
            .map(|p| b.vert(p));
        b.poly(&vs);
        b.edge(vs[0], vs[1]);
        assert_eq!(
            b.build().unwrap_err(),
            Error::DuplicateEdge(vs[0], vs[1])
        );
    }
}
