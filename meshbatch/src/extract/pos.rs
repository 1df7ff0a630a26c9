//! Positions and normals, per loop and per polygon
use std::{marker::PhantomData, ops::Range};

use nalgebra::Vector3;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::{Callbacks, Domain, Extract, IterPair, vert_data};
use crate::{
    buffer::{
        Attr, Buffer, CompType, FetchMode, GpuNormal, PackedNormal, VertBuf,
        VertFormat, Window,
    },
    mesh::{EditMesh, ElemFlags, LoopId, Mesh},
    render_data::{DataFlags, MeshRenderData},
};

/// Normal `w` flag for an element state: hidden or unmapped, selected, or
/// neither
fn state_flag(s: Option<ElemFlags>) -> i32 {
    match s {
        None => -1,
        Some(f) if f.contains(ElemFlags::HIDDEN) => -1,
        Some(f) if f.contains(ElemFlags::SELECT) => 1,
        Some(..) => 0,
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Vertex of the [`PosNor`] buffer
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
)]
#[repr(C)]
pub struct PosNorVert {
    /// Vertex position
    pub pos: [f32; 3],
    /// Vertex normal, with the vertex state in `w`
    pub nor: PackedNormal,
}

const POS_NOR_FORMAT: VertFormat = VertFormat::new(&[
    Attr::new("pos", CompType::F32, 3, FetchMode::Float),
    Attr::new("nor", CompType::I10, 4, FetchMode::IntToFloatUnit),
]);

static_assertions::const_assert_eq!(
    std::mem::size_of::<PosNorVert>(),
    POS_NOR_FORMAT.stride()
);

/// Per-loop position and vertex normal
///
/// Loose edges contribute both endpoints and loose vertices one entry each,
/// so this buffer covers every vertex that can be drawn.
pub struct PosNor;

impl PosNor {
    fn vert(mr: &MeshRenderData<'_>, v: usize) -> PosNorVert {
        PosNorVert {
            pos: mr.vert_co(v).into(),
            nor: PackedNormal::new(mr.vert_normal(v), state_flag(mr.vert_state(v))),
        }
    }

    fn poly_edit(
        &self,
        mr: &MeshRenderData<'_>,
        bm: &EditMesh,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, PosNorVert>,
    ) {
        for p in r {
            for l in mr.poly_loops(p) {
                let v = bm.loop_(LoopId::new(l)).v.index();
                w[l] = Self::vert(mr, v);
            }
        }
    }

    fn poly_mesh(
        &self,
        mr: &MeshRenderData<'_>,
        me: &Mesh,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, PosNorVert>,
    ) {
        for p in r {
            let start = me.polys[p].loopstart as usize;
            for (i, ml) in me.poly_loops(p).iter().enumerate() {
                w[start + i] = Self::vert(mr, ml.v as usize);
            }
        }
    }

    fn ledge<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, PosNorVert>,
    ) {
        let start = mr.ledge_loop_start();
        for i in r {
            let [a, b] = mr.edge_verts(mr.ledges()[i] as usize);
            w[start + 2 * i] = Self::vert(mr, a);
            w[start + 2 * i + 1] = Self::vert(mr, b);
        }
    }

    fn lvert<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, PosNorVert>,
    ) {
        let start = mr.lvert_loop_start();
        for i in r {
            w[start + i] = Self::vert(mr, mr.lverts()[i] as usize);
        }
    }
}

impl Extract for PosNor {
    type Data = ();
    type Elem = PosNorVert;

    const NAME: &'static str = "pos_nor";
    const USE_THREADING: bool = true;
    const DOMAIN: Domain = Domain::Loop;
    const CALLBACKS: Callbacks<Self> = Callbacks {
        poly: Some(IterPair {
            edit: Self::poly_edit,
            mesh: Self::poly_mesh,
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
        let vbo = VertBuf::new::<PosNorVert>(&POS_NOR_FORMAT, mr.loop_len_total());
        (Buffer::Vert(vbo), ())
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Per-loop shading normal, with the polygon state in `w`
///
/// `N` selects the packing precision.  Loose entries are left zeroed.
pub struct Lnor<N>(PhantomData<N>);

impl<N> Lnor<N> {
    /// Builds the extractor
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<N: GpuNormal> Lnor<N> {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, N>,
    ) {
        for p in r {
            let flag = state_flag(mr.face_state(p));
            for l in mr.poly_loops(p) {
                w[l] = N::pack(mr.corner_normal(p, l), flag);
            }
        }
    }
}

impl<N: GpuNormal> Extract for Lnor<N> {
    type Data = ();
    type Elem = N;

    const NAME: &'static str = "lnor";
    const DATA_FLAGS: DataFlags =
        DataFlags::POLY_NOR.union(DataFlags::LOOP_NOR);
    const USE_THREADING: bool = true;
    const DOMAIN: Domain = Domain::Loop;
    const CALLBACKS: Callbacks<Self> = Callbacks {
        poly: Some(IterPair {
            edit: Self::poly::<EditMesh>,
            mesh: Self::poly::<Mesh>,
        }),
        ..Callbacks::NONE
    };

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, ()) {
        let vbo = VertBuf::new::<N>(N::FORMAT, mr.loop_len_total());
        (Buffer::Vert(vbo), ())
    }
}

////////////////////////////////////////////////////////////////////////////////

const FDOTS_POS_FORMAT: VertFormat =
    VertFormat::new(&[Attr::new("pos", CompType::F32, 3, FetchMode::Float)]);

/// Per-polygon center, the mean of its corner positions
pub struct FdotsPos;

impl FdotsPos {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, [f32; 3]>,
    ) {
        for p in r {
            let loops = mr.poly_loops(p);
            let n = loops.len() as f32;
            let sum = loops
                .map(|l| mr.vert_co(mr.loop_vert(l)))
                .fold(Vector3::zeros(), |a, b| a + b);
            w[p] = (sum / n).into();
        }
    }
}

impl Extract for FdotsPos {
    type Data = ();
    type Elem = [f32; 3];

    const NAME: &'static str = "fdots_pos";
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
        let vbo = VertBuf::new::<[f32; 3]>(&FDOTS_POS_FORMAT, mr.poly_len());
        (Buffer::Vert(vbo), ())
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Per-polygon normal, with the polygon state in `w`
///
/// States are 0 by default, 1 if selected, -1 for the active face and -2 for
/// hidden (or unmapped) polygons, whose normal is zeroed.  Everything happens
/// in the finish step, after polygon normals are available.
pub struct FdotsNor;

impl Extract for FdotsNor {
    type Data = ();
    type Elem = PackedNormal;

    const NAME: &'static str = "fdots_nor";
    const DATA_FLAGS: DataFlags = DataFlags::POLY_NOR;

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, ()) {
        let vbo =
            VertBuf::new::<PackedNormal>(PackedNormal::FORMAT, mr.poly_len());
        (Buffer::Vert(vbo), ())
    }

    fn finish(&self, mr: &MeshRenderData<'_>, buf: &mut Buffer, _: &()) {
        let out = vert_data::<PackedNormal>(Self::NAME, buf);
        for (p, o) in out.iter_mut().enumerate() {
            *o = match mr.face_state(p) {
                Some(f) if !f.contains(ElemFlags::HIDDEN) => {
                    let w = if mr.is_active_face(p) {
                        -1
                    } else if f.contains(ElemFlags::SELECT) {
                        1
                    } else {
                        0
                    };
                    PackedNormal::new(mr.poly_normal(p), w)
                }
                _ => PackedNormal::new(Vector3::zeros(), -2),
            };
        }
    }
}
