//! End-to-end extraction scenarios
mod common;

use approx::assert_relative_eq;
use meshbatch::{
    buffer::{Buffer, BufferKind, PackedNormal},
    config::{ExtractConfig, RenderOptions},
    extract::{
        Descriptor, Domain, EditFlags, PosNorVert, descriptor, extract_buffers,
    },
    mesh::{EditMesh, MeshSource, poly_to_tri_count},
};
use nalgebra::Vector3;
use strum::IntoEnumIterator;

fn inline() -> ExtractConfig<'static> {
    ExtractConfig {
        threads: None,
        ..ExtractConfig::default()
    }
}

fn extract(src: &MeshSource, kinds: &[BufferKind]) -> Vec<Buffer> {
    let descs: Vec<&dyn Descriptor> =
        kinds.iter().map(|k| descriptor(*k, false).unwrap()).collect();
    extract_buffers(src, &RenderOptions::default(), &descs, &inline()).0
}

#[test]
fn three_quads_tris() {
    let src = MeshSource::object(common::quad_strip(3, 0, 0));
    let bufs = extract(&src, &[BufferKind::Tris]);
    let ibo = bufs[0].as_index().unwrap();
    assert_eq!(ibo.prim_len(), 6);
    assert_eq!(ibo.indices().len(), 18);
    assert!(ibo.indices().iter().all(|&i| i < 12));
}

#[test]
fn loose_layout() {
    let src = MeshSource::object(common::quad_strip(3, 1, 2));
    let bufs = extract(&src, &[BufferKind::PosNor]);
    let v = bufs[0].data::<PosNorVert>().unwrap();
    assert_eq!(v.len(), 12 + 2 * 1 + 2);

    // Loose edge endpoints, then loose vertices, in creation order
    assert_eq!(v[12].pos, [-1.0, 0.0, 0.0]);
    assert_eq!(v[13].pos, [-1.0, 1.0, 0.0]);
    assert_eq!(v[14].pos, [0.0, -1.0, 0.0]);
    assert_eq!(v[15].pos, [0.0, -2.0, 0.0]);
}

#[test]
fn empty_kinds_give_empty_buffers() {
    let src = MeshSource::object(common::quad_strip(0, 0, 0));
    let kinds: Vec<BufferKind> = BufferKind::iter()
        .filter(|k| *k != BufferKind::LinesLoose)
        .collect();
    let bufs = extract(&src, &kinds);
    assert_eq!(bufs.len(), kinds.len());
    for (k, b) in kinds.iter().zip(&bufs) {
        match k {
            // One entry per (unconnected) vertex
            BufferKind::Points => assert_eq!(b.len(), 2),
            BufferKind::PosNor
            | BufferKind::Lnor
            | BufferKind::EdgeFac
            | BufferKind::EditData
            | BufferKind::EditUvData
            | BufferKind::PolyIdx
            | BufferKind::EdgeIdx
            | BufferKind::VertIdx
            | BufferKind::Uv
            | BufferKind::Tan
            | BufferKind::Vcol
            | BufferKind::Weights
            | BufferKind::StretchArea
            | BufferKind::StretchAngle
            | BufferKind::MeshAnalysis => assert_eq!(b.len(), 2, "{k}"),
            _ => assert!(b.is_empty(), "{k}"),
        }
    }
}

#[test]
fn edit_uv_data_covers_loose_geometry() {
    let me = common::quad_strip(3, 1, 2);
    let src = MeshSource::edit(EditMesh::from_mesh(&me));
    let bufs = extract(&src, &[BufferKind::PosNor, BufferKind::EditUvData]);
    assert_eq!(bufs[0].len(), 16);
    assert_eq!(bufs[1].len(), 16);
    let d = bufs[1].data::<EditFlags>().unwrap();
    assert!(d[12..].iter().all(|f| *f == EditFlags::default()));
}

#[test]
fn loop_domain_lengths_agree() {
    let me = common::quad_strip(3, 1, 2);
    let loop_kinds: Vec<BufferKind> = BufferKind::iter()
        .filter(|k| {
            descriptor(*k, false).is_some_and(|d| d.domain() == Domain::Loop)
        })
        .collect();
    assert!(loop_kinds.contains(&BufferKind::EditUvData));
    assert!(loop_kinds.contains(&BufferKind::MeshAnalysis));

    let expected = me.loop_len() + 2 * 1 + 2;
    assert_eq!(expected, 16);
    for src in [
        MeshSource::object(me.clone()),
        MeshSource::edit(EditMesh::from_mesh(&me)),
    ] {
        let bufs = extract(&src, &loop_kinds);
        for (k, b) in loop_kinds.iter().zip(&bufs) {
            assert_eq!(b.len(), expected, "{k}");
        }
    }
}

#[test]
fn tri_count_formula() {
    let me = common::random_mesh(1, 12);
    let expected = me.loop_len() - 2 * me.poly_len();
    assert_eq!(me.tri_len(), expected);
    assert_eq!(poly_to_tri_count(me.poly_len(), me.loop_len()), expected);

    let bm = EditMesh::from_mesh(&me);
    assert_eq!(bm.tri_len(), expected);
}

#[test]
fn editable_matches_stable() {
    use meshbatch::mesh::ElemFlags;

    // Edit mode always skips hidden elements, so start with none
    let mut me = common::random_mesh(2, 10);
    for p in &mut me.polys {
        p.flag.remove(ElemFlags::HIDDEN);
    }
    let stable = MeshSource::object(me.clone());
    let edit = MeshSource::edit(EditMesh::from_mesh(&me));

    let kinds = [
        BufferKind::Tris,
        BufferKind::Lines,
        BufferKind::Points,
        BufferKind::Fdots,
        BufferKind::PolyIdx,
        BufferKind::EdgeIdx,
        BufferKind::VertIdx,
        BufferKind::FdotIdx,
    ];
    let a = extract(&stable, &kinds);
    let b = extract(&edit, &kinds);
    for ((k, a), b) in kinds.iter().zip(&a).zip(&b) {
        assert_eq!(common::contents(a), common::contents(b), "{k}");
    }

    let a = extract(&stable, &[BufferKind::PosNor]);
    let b = extract(&edit, &[BufferKind::PosNor]);
    let (a, b) = (
        a[0].data::<PosNorVert>().unwrap(),
        b[0].data::<PosNorVert>().unwrap(),
    );
    assert_eq!(a.len(), b.len());
    for (a, b) in a.iter().zip(b) {
        assert_eq!(a.pos, b.pos);
        let (na, _) = a.nor.unpack();
        let (nb, _) = b.nor.unpack();
        assert_relative_eq!(na, nb, epsilon = 1e-2);
    }
}

#[test]
fn mapped_overlays_follow_edit_state() {
    use meshbatch::mesh::{AttrDomain, ElemFlags, FaceId};
    use std::sync::Arc;

    // The evaluated mesh is a copy of the editable mesh, with origin indices
    let me = common::quad_strip(3, 0, 0);
    let mut bm = EditMesh::from_mesh(&me);
    bm.select_face(FaceId::new(1), true).unwrap();

    let mut cage = me.clone();
    cage.is_original = false;
    cage.set_origindex(AttrDomain::Poly, vec![0, 1, 2]).unwrap();
    let src = MeshSource::edit_evaluated(bm, Arc::new(cage.clone()), Arc::new(cage));

    let bufs = extract(&src, &[BufferKind::FdotsNor]);
    let n = bufs[0].data::<PackedNormal>().unwrap();
    let flags: Vec<i32> = n.iter().map(|n| n.unpack().1).collect();
    assert_eq!(flags, [0, 1, 0]);
    let (no, _) = n[0].unpack();
    assert_relative_eq!(no, Vector3::z(), epsilon = 1e-2);

    // Selection lives in the editable mesh, not in the evaluated copy
    assert!(!src.mesh.polys[1].flag.contains(ElemFlags::SELECT));
}
