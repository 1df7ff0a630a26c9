//! Loose geometry: edges without polygons and vertices without edges
use crate::mesh::{EdgeId, EditMesh, ElemFlags, Mesh, VertId};

/// Collects loose edges and vertices of an editable mesh
///
/// An edge is loose if its radial cycle is empty; a vertex is loose if its
/// disk cycle is empty.
pub(super) fn edit_loose(bm: &EditMesh) -> (Vec<u32>, Vec<u32>) {
    let ledges = (0..bm.edge_len())
        .filter(|&e| bm.edge(EdgeId::new(e)).radial().is_none())
        .map(|e| e as u32)
        .collect();
    let lverts = (0..bm.vert_len())
        .filter(|&v| bm.vert(VertId::new(v)).edge().is_none())
        .map(|v| v as u32)
        .collect();
    (ledges, lverts)
}

/// Collects loose edges and vertices of a stable mesh
///
/// Loose edges carry [`ElemFlags::LOOSE`]; a vertex is loose if no edge at
/// all references it.
pub(super) fn mesh_loose(me: &Mesh) -> (Vec<u32>, Vec<u32>) {
    let mut used = vec![false; me.vert_len()];
    let mut ledges = vec![];
    for (i, e) in me.edges.iter().enumerate() {
        if e.flag.contains(ElemFlags::LOOSE) {
            ledges.push(i as u32);
        }
        for v in e.v {
            used[v as usize] = true;
        }
    }
    let lverts = used
        .iter()
        .enumerate()
        .filter(|(_, u)| !**u)
        .map(|(v, _)| v as u32)
        .collect();
    (ledges, lverts)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::MeshBuilder;

    fn three_quads_with_loose() -> Mesh {
        let mut b = MeshBuilder::new();
        let v: Vec<_> = (0..8)
            .map(|i| b.vert([(i % 4) as f32, (i / 4) as f32, 0.0]))
            .collect();
        for i in 0..3 {
            b.poly(&[v[i], v[i + 1], v[i + 5], v[i + 4]]);
        }
        let a = b.vert([10.0, 0.0, 0.0]);
        let c = b.vert([11.0, 0.0, 0.0]);
        b.edge(a, c);
        b.vert([20.0, 0.0, 0.0]);
        b.vert([21.0, 0.0, 0.0]);
        b.build().unwrap()
    }

    #[test]
    fn stable_and_editable_agree() {
        let me = three_quads_with_loose();
        let (ledges, lverts) = mesh_loose(&me);
        assert_eq!(ledges, [10]);
        assert_eq!(lverts, [10, 11]);
        assert_eq!(edit_loose(&EditMesh::from_mesh(&me)), (ledges, lverts));
    }

    #[test]
    fn edge_endpoints_are_not_loose_verts() {
        let mut b = MeshBuilder::new();
        let a = b.vert([0.0; 3]);
        let c = b.vert([1.0, 0.0, 0.0]);
        b.edge(a, c);
        let me = b.build().unwrap();
        assert_eq!(mesh_loose(&me), (vec![0], vec![]));
    }
}
