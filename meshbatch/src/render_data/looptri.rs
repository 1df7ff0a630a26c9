use crate::mesh::{EditMesh, Mesh};

/// A triangle of polygon corners, tagged with its polygon
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoopTri {
    /// Loop indices, in winding order
    pub tri: [u32; 3],
    /// Polygon the triangle belongs to
    pub poly: u32,
}

impl LoopTri {
    /// Reads triangle `i` of the editable mesh's maintained triangulation
    pub(super) fn from_edit(bm: &EditMesh, i: usize) -> Self {
        let t = bm.looptris()[i];
        Self {
            tri: t.map(|l| l.index() as u32),
            poly: bm.loop_(t[0]).f.index() as u32,
        }
    }
}

/// Triangulates every polygon of a stable mesh as a fan from its first loop
///
/// Triangles come out in polygon order, so polygon `p` owns triangles
/// starting at `loopstart - 2p`.
pub(super) fn mesh_looptris(me: &Mesh) -> Vec<LoopTri> {
    let mut out = Vec::with_capacity(me.tri_len());
    for (p, mp) in me.polys.iter().enumerate() {
        let start = mp.loopstart;
        for i in 1..mp.totloop - 1 {
            out.push(LoopTri {
                tri: [start, start + i, start + i + 1],
                poly: p as u32,
            });
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::MeshBuilder;

    #[test]
    fn fan() {
        let mut b = MeshBuilder::new();
        let v: Vec<_> = (0..5)
            .map(|i| {
                let a = i as f32 * std::f32::consts::TAU / 5.0;
                b.vert([a.cos(), a.sin(), 0.0])
            })
            .collect();
        b.poly(&v);
        b.poly(&[v[0], v[2], v[1]]);
        let me = b.build().unwrap();
        let tris = mesh_looptris(&me);
        assert_eq!(tris.len(), me.tri_len());
        assert_eq!(tris[0].tri, [0, 1, 2]);
        assert_eq!(tris[2].tri, [0, 3, 4]);
        assert_eq!(tris[3], LoopTri { tri: [5, 6, 7], poly: 1 });

        let bm = EditMesh::from_mesh(&me);
        for (i, t) in tris.iter().enumerate() {
            assert_eq!(LoopTri::from_edit(&bm, i), *t);
        }
    }
}
