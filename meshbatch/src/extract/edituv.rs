//! UV-editor index buffers and face-dot UVs
//!
//! The UV editor only shows polygons that are visible and, unless selection
//! is synced with the 3D view, selected.  Each index buffer keeps one slot
//! per element, so polygons that are not shown become restart primitives.
use std::ops::Range;

use log::debug;
use nalgebra::Vector2;

use super::{Callbacks, Domain, Extract, IterPair, index_buf};
use crate::{
    buffer::{
        Attr, Buffer, CompType, FetchMode, IndexBuf, PrimType, RESTART_INDEX,
        VertBuf, VertFormat, Window,
    },
    mesh::{AttrDomain, EditMesh, ElemFlags, LayerOffset, LayerType, Mesh},
    render_data::{DataFlags, MeshRenderData},
};

/// Checks whether polygon `p` is drawn in the UV editor
fn uv_visible(mr: &MeshRenderData<'_>, p: usize) -> bool {
    mr.face_state(p).is_some_and(|f| {
        !f.contains(ElemFlags::HIDDEN)
            && (mr.opts().uv_sync_select || f.contains(ElemFlags::SELECT))
    })
}

fn build(name: &str, buf: &mut Buffer) {
    let ibo = index_buf(name, buf);
    ibo.build_in_place();
    debug!("{name}: {} primitives", ibo.prim_len());
}

/// Loop triangles of the polygons shown in the UV editor, in triangle order
pub struct EditUvTris;

impl EditUvTris {
    fn looptri<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, u32>,
    ) {
        for i in r {
            let t = mr.looptri(i);
            let tri = if uv_visible(mr, t.poly as usize) {
                t.tri
            } else {
                [RESTART_INDEX; 3]
            };
            w.slice_mut(3 * i..3 * i + 3).copy_from_slice(&tri);
        }
    }
}

impl Extract for EditUvTris {
    type Data = ();
    type Elem = u32;

    const NAME: &'static str = "edituv_tris";
    const DATA_FLAGS: DataFlags = DataFlags::LOOPTRI;
    const CALLBACKS: Callbacks<Self> = Callbacks {
        looptri: Some(IterPair {
            edit: Self::looptri::<EditMesh>,
            mesh: Self::looptri::<Mesh>,
        }),
        ..Callbacks::NONE
    };

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, ()) {
        let ibo =
            IndexBuf::new(PrimType::Tris, mr.tri_len(), mr.loop_len_total());
        (Buffer::Index(ibo), ())
    }

    fn finish(&self, _: &MeshRenderData<'_>, buf: &mut Buffer, _: &()) {
        build(Self::NAME, buf);
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Polygon outlines in the UV editor, one line per loop
///
/// Unlike [`Lines`](super::Lines), an edge shared by two polygons is drawn
/// once per polygon, since its UV corners may differ.  Edges with no
/// counterpart in the editable mesh are skipped.
pub struct EditUvLines;

impl EditUvLines {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, u32>,
    ) {
        for p in r {
            let visible = uv_visible(mr, p);
            let loops = mr.poly_loops(p);
            for l in loops.clone() {
                let next = if l + 1 == loops.end { loops.start } else { l + 1 };
                let real = !mr.is_unmapped(AttrDomain::Edge, mr.loop_edge(l));
                let line = if visible && real {
                    [l as u32, next as u32]
                } else {
                    [RESTART_INDEX; 2]
                };
                w.slice_mut(2 * l..2 * l + 2).copy_from_slice(&line);
            }
        }
    }
}

impl Extract for EditUvLines {
    type Data = ();
    type Elem = u32;

    const NAME: &'static str = "edituv_lines";
    const CALLBACKS: Callbacks<Self> = Callbacks {
        poly: Some(IterPair {
            edit: Self::poly::<EditMesh>,
            mesh: Self::poly::<Mesh>,
        }),
        ..Callbacks::NONE
    };

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, ()) {
        let ibo =
            IndexBuf::new(PrimType::Lines, mr.loop_len(), mr.loop_len_total());
        (Buffer::Index(ibo), ())
    }

    fn finish(&self, _: &MeshRenderData<'_>, buf: &mut Buffer, _: &()) {
        build(Self::NAME, buf);
    }
}

////////////////////////////////////////////////////////////////////////////////

/// UV corners in the UV editor, one point per loop
pub struct EditUvPoints;

impl EditUvPoints {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, u32>,
    ) {
        for p in r {
            let visible = uv_visible(mr, p);
            for l in mr.poly_loops(p) {
                let real = !mr.is_unmapped(AttrDomain::Vert, mr.loop_vert(l));
                w[l] = if visible && real { l as u32 } else { RESTART_INDEX };
            }
        }
    }
}

impl Extract for EditUvPoints {
    type Data = ();
    type Elem = u32;

    const NAME: &'static str = "edituv_points";
    const CALLBACKS: Callbacks<Self> = Callbacks {
        poly: Some(IterPair {
            edit: Self::poly::<EditMesh>,
            mesh: Self::poly::<Mesh>,
        }),
        ..Callbacks::NONE
    };

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, ()) {
        let ibo =
            IndexBuf::new(PrimType::Points, mr.loop_len(), mr.loop_len_total());
        (Buffer::Index(ibo), ())
    }

    fn finish(&self, _: &MeshRenderData<'_>, buf: &mut Buffer, _: &()) {
        build(Self::NAME, buf);
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Face dots in the UV editor, indexing the per-polygon buffers
pub struct EditUvFdots;

impl EditUvFdots {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, u32>,
    ) {
        for p in r {
            let shown =
                uv_visible(mr, p) && !mr.is_unmapped(AttrDomain::Poly, p);
            w[p] = if shown { p as u32 } else { RESTART_INDEX };
        }
    }
}

impl Extract for EditUvFdots {
    type Data = ();
    type Elem = u32;

    const NAME: &'static str = "edituv_fdots";
    const CALLBACKS: Callbacks<Self> = Callbacks {
        poly: Some(IterPair {
            edit: Self::poly::<EditMesh>,
            mesh: Self::poly::<Mesh>,
        }),
        ..Callbacks::NONE
    };

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, ()) {
        let ibo = IndexBuf::new(PrimType::Points, mr.poly_len(), mr.poly_len());
        (Buffer::Index(ibo), ())
    }

    fn finish(&self, _: &MeshRenderData<'_>, buf: &mut Buffer, _: &()) {
        build(Self::NAME, buf);
    }
}

////////////////////////////////////////////////////////////////////////////////

const FDOTS_UV_FORMAT: VertFormat =
    VertFormat::new(&[Attr::new("u", CompType::F32, 2, FetchMode::Float)]);

/// Per-polygon UV centroid, for face dots in the UV editor
///
/// Zeroed when there is no UV layer.
pub struct FdotsUv;

impl FdotsUv {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        layer: &Option<LayerOffset>,
        w: &mut Window<'_, [f32; 2]>,
    ) {
        let ldata = mr.cdata(AttrDomain::Loop);
        let Some(uv) = layer.and_then(|o| ldata.uv(o)) else {
            return;
        };
        for p in r {
            let loops = mr.poly_loops(p);
            let n = loops.len() as f32;
            let sum = uv[loops]
                .iter()
                .fold(Vector2::zeros(), |a, c| a + Vector2::from(c.uv));
            w[p] = (sum / n).into();
        }
    }
}

impl Extract for FdotsUv {
    type Data = Option<LayerOffset>;
    type Elem = [f32; 2];

    const NAME: &'static str = "fdots_uv";
    const USE_THREADING: bool = true;
    const DOMAIN: Domain = Domain::Poly;
    const CALLBACKS: Callbacks<Self> = Callbacks {
        poly: Some(IterPair {
            edit: Self::poly::<EditMesh>,
            mesh: Self::poly::<Mesh>,
        }),
        ..Callbacks::NONE
    };

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, Option<LayerOffset>) {
        let layer = mr.cdata(AttrDomain::Loop).active(LayerType::Uv);
        let vbo = VertBuf::new::<[f32; 2]>(&FDOTS_UV_FORMAT, mr.poly_len());
        (Buffer::Vert(vbo), layer)
    }
}
