//! Selection-id buffers: the original element index behind each entry
use std::ops::Range;

use super::{Callbacks, Domain, Extract, IterPair};
use crate::{
    buffer::{Attr, Buffer, CompType, FetchMode, VertBuf, VertFormat, Window},
    mesh::{AttrDomain, EditMesh, Mesh},
    render_data::MeshRenderData,
};

const INDEX_FORMAT: VertFormat =
    VertFormat::new(&[Attr::new("index", CompType::U32, 1, FetchMode::Int)]);

/// Implements [`Extract`] for a per-loop selection-id buffer
///
/// `$poly` maps a loop of polygon `p` to its id, `$ledge` maps entry `j` of
/// loose edge `e`, and `$lvert` maps loose vertex `v`.
macro_rules! loop_index {
    ($name:ident, $str:literal,
     |$mr:ident, $p:ident, $l:ident| $poly:expr,
     |$mr2:ident, $e:ident, $j:ident| $ledge:expr,
     |$mr3:ident, $v:ident| $lvert:expr) => {
        impl $name {
            fn poly<S>(
                &self,
                $mr: &MeshRenderData<'_>,
                _: &S,
                r: Range<usize>,
                _: &(),
                w: &mut Window<'_, u32>,
            ) {
                for $p in r {
                    for $l in $mr.poly_loops($p) {
                        w[$l] = $poly;
                    }
                }
            }

            fn ledge<S>(
                &self,
                $mr2: &MeshRenderData<'_>,
                _: &S,
                r: Range<usize>,
                _: &(),
                w: &mut Window<'_, u32>,
            ) {
                let start = $mr2.ledge_loop_start();
                for i in r {
                    let $e = $mr2.ledges()[i] as usize;
                    for $j in 0..2 {
                        w[start + i * 2 + $j] = $ledge;
                    }
                }
            }

            fn lvert<S>(
                &self,
                $mr3: &MeshRenderData<'_>,
                _: &S,
                r: Range<usize>,
                _: &(),
                w: &mut Window<'_, u32>,
            ) {
                let start = $mr3.lvert_loop_start();
                for i in r {
                    let $v = $mr3.lverts()[i] as usize;
                    w[start + i] = $lvert;
                }
            }
        }

        impl Extract for $name {
            type Data = ();
            type Elem = u32;

            const NAME: &'static str = $str;
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

            fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, ()) {
                let vbo =
                    VertBuf::new::<u32>(&INDEX_FORMAT, mr.loop_len_total());
                (Buffer::Vert(vbo), ())
            }
        }
    };
}

/// Original polygon of each loop; loose entries have no polygon
pub struct PolyIdx;
loop_index!(
    PolyIdx, "poly_idx",
    |mr, p, _l| mr.orig_index(AttrDomain::Poly, p),
    |_mr, _e, _j| u32::MAX,
    |_mr, _v| u32::MAX
);

/// Original edge of each loop
pub struct EdgeIdx;
loop_index!(
    EdgeIdx, "edge_idx",
    |mr, _p, l| mr.orig_index(AttrDomain::Edge, mr.loop_edge(l)),
    |mr, e, _j| mr.orig_index(AttrDomain::Edge, e),
    |_mr, _v| u32::MAX
);

/// Original vertex of each loop
pub struct VertIdx;
loop_index!(
    VertIdx, "vert_idx",
    |mr, _p, l| mr.orig_index(AttrDomain::Vert, mr.loop_vert(l)),
    |mr, e, j| mr.orig_index(AttrDomain::Vert, mr.edge_verts(e)[j]),
    |mr, v| mr.orig_index(AttrDomain::Vert, v)
);

////////////////////////////////////////////////////////////////////////////////

/// Original polygon of each face dot
pub struct FdotIdx;

impl FdotIdx {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, u32>,
    ) {
        for p in r {
            w[p] = mr.orig_index(AttrDomain::Poly, p);
        }
    }
}

impl Extract for FdotIdx {
    type Data = ();
    type Elem = u32;

    const NAME: &'static str = "fdot_idx";
    const USE_THREADING: bool = true;
    const DOMAIN: Domain = Domain::Poly;
    const CALLBACKS: Callbacks<Self> = Callbacks {
        poly: Some(IterPair {
            edit: Self::poly::<EditMesh>,
            mesh: Self::poly::<Mesh>,
        }),
        ..Callbacks::NONE
    };

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, ()) {
        let vbo = VertBuf::new::<u32>(&INDEX_FORMAT, mr.poly_len());
        (Buffer::Vert(vbo), ())
    }
}
