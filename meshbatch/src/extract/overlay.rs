//! Edit-mode overlay data: wireframe factors, element state, UV stretch
use std::{
    ops::Range,
    sync::atomic::{AtomicU32, Ordering},
};

use bitflags::bitflags;
use log::trace;
use nalgebra::{Vector2, Vector3};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::{Callbacks, Domain, Extract, IterPair, vert_data};
use crate::{
    buffer::{Attr, Buffer, CompType, FetchMode, VertBuf, VertFormat, Window},
    config::SelectMode,
    mesh::{
        AttrDomain, EditMesh, ElemFlags, LayerOffset, LayerType, LoopUv, Mesh,
        UvFlags,
    },
    render_data::{DataFlags, MeshRenderData},
};

const EDGE_FAC_FORMAT: VertFormat = VertFormat::new(&[Attr::new(
    "wd",
    CompType::U8,
    1,
    FetchMode::IntToFloatUnit,
)]);

/// Value written for edges that are always drawn at full strength
const EDGE_FAC_MAX: u8 = 255;

/// Per-loop wireframe visibility of the edge leaving each corner
///
/// Manifold edges fade with the angle between the surface and the edge's
/// vertex normal; every other edge is drawn fully.
pub struct EdgeFac;

/// Rescales `|edge normal · face normal|` to the wireframe slider range
fn edge_factor(
    f_no: Vector3<f32>,
    v_co: Vector3<f32>,
    v_no: Vector3<f32>,
    v_next_co: Vector3<f32>,
) -> f32 {
    let enor = v_no.cross(&(v_next_co - v_co)).normalize();
    let d = enor.dot(&f_no).abs() * (1.0 / 0.065);
    if d.is_nan() { 0.0 } else { d.clamp(0.0, 1.0) }
}

impl EdgeFac {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        edge_loops: &Vec<u8>,
        w: &mut Window<'_, u8>,
    ) {
        for p in r {
            let loops = mr.poly_loops(p);
            let f_no = mr.poly_normal(p);
            for l in loops.clone() {
                let next = if l + 1 == loops.end { loops.start } else { l + 1 };
                w[l] = if edge_loops[mr.loop_edge(l)] == 2 {
                    let v = mr.loop_vert(l);
                    let ratio = edge_factor(
                        f_no,
                        mr.vert_co(v),
                        mr.vert_normal(v),
                        mr.vert_co(mr.loop_vert(next)),
                    );
                    (ratio * 253.0 + 1.0) as u8
                } else {
                    EDGE_FAC_MAX
                };
            }
        }
    }

    fn ledge<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &Vec<u8>,
        w: &mut Window<'_, u8>,
    ) {
        let start = mr.ledge_loop_start();
        w.slice_mut(start + r.start * 2..start + r.end * 2)
            .fill(EDGE_FAC_MAX);
    }
}

impl Extract for EdgeFac {
    /// Number of polygon corners using each edge, saturating
    type Data = Vec<u8>;
    type Elem = u8;

    const NAME: &'static str = "edge_fac";
    const DATA_FLAGS: DataFlags = DataFlags::POLY_NOR;
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
        ..Callbacks::NONE
    };

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, Vec<u8>) {
        let mut edge_loops = vec![0u8; mr.edge_len()];
        for l in 0..mr.loop_len() {
            let c = &mut edge_loops[mr.loop_edge(l)];
            *c = c.saturating_add(1);
        }
        let vbo = VertBuf::new::<u8>(&EDGE_FAC_FORMAT, mr.loop_len_total());
        (Buffer::Vert(vbo), edge_loops)
    }
}

////////////////////////////////////////////////////////////////////////////////

bitflags! {
    /// Polygon and UV state, stored in [`EditFlags::v_flag`]
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FaceFlags: u8 {
        /// Polygon is the active face
        const FACE_ACTIVE = 1 << 0;
        /// Polygon is selected
        const FACE_SELECTED = 1 << 1;
        /// Polygon is the active face in the UV editor
        const FACE_UV_ACTIVE = 1 << 3;
        /// Every corner of the polygon is UV-selected
        const FACE_UV_SELECT = 1 << 4;
        /// Corner is UV-selected
        const VERT_UV_SELECT = 1 << 5;
        /// Corner is pinned in the UV editor
        const VERT_UV_PINNED = 1 << 6;
        /// Edge leaving the corner is UV-selected
        const EDGE_UV_SELECT = 1 << 7;
    }
}

bitflags! {
    /// Vertex and edge state, stored in [`EditFlags::e_flag`]
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct VertFlags: u8 {
        /// Vertex is the active vertex
        const VERT_ACTIVE = 1 << 0;
        /// Vertex is selected
        const VERT_SELECTED = 1 << 1;
        /// Edge is active
        const EDGE_ACTIVE = 1 << 2;
        /// Edge is selected
        const EDGE_SELECTED = 1 << 3;
        /// Edge is a UV seam
        const EDGE_SEAM = 1 << 4;
        /// Edge is marked sharp
        const EDGE_SHARP = 1 << 5;
    }
}

/// Packed edit-mode state of one loop
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
)]
#[repr(C)]
pub struct EditFlags {
    /// Bits of [`FaceFlags`]
    pub v_flag: u8,
    /// Bits of [`VertFlags`]
    pub e_flag: u8,
    /// Edge crease, scaled to `0..=255`
    pub crease: u8,
    /// Edge bevel weight, scaled to `0..=255`
    pub bweight: u8,
}

impl EditFlags {
    /// Returns the face flags
    pub fn face(&self) -> FaceFlags {
        FaceFlags::from_bits_retain(self.v_flag)
    }

    /// Returns the vertex and edge flags
    pub fn vert(&self) -> VertFlags {
        VertFlags::from_bits_retain(self.e_flag)
    }
}

const EDIT_DATA_FORMAT: VertFormat =
    VertFormat::new(&[Attr::new("data", CompType::U8, 4, FetchMode::Int)]);

static_assertions::const_assert_eq!(
    std::mem::size_of::<EditFlags>(),
    EDIT_DATA_FORMAT.stride()
);

fn is_selected(s: Option<ElemFlags>) -> bool {
    s.is_some_and(|f| f.contains(ElemFlags::SELECT))
}

fn face_flags(mr: &MeshRenderData<'_>, p: usize) -> FaceFlags {
    let mut f = FaceFlags::empty();
    f.set(FaceFlags::FACE_ACTIVE, mr.is_active_face(p));
    f.set(FaceFlags::FACE_SELECTED, is_selected(mr.face_state(p)));
    f
}

fn vert_flags(mr: &MeshRenderData<'_>, v: usize) -> VertFlags {
    let mut f = VertFlags::empty();
    f.set(VertFlags::VERT_ACTIVE, mr.is_active_vert(v));
    f.set(VertFlags::VERT_SELECTED, is_selected(mr.vert_state(v)));
    f
}

/// Reads an edge weight layer, scaled to a byte
///
/// Edges that display an editable edge read its layer; other edges read
/// the iterated store, unless they are unmapped.
fn edge_weight(mr: &MeshRenderData<'_>, ty: LayerType, e: usize) -> u8 {
    let (data, i) = match (mr.bm(), mr.edit_edge(e)) {
        (Some(bm), Some(o)) => (&bm.edata, o.index()),
        _ if mr.is_unmapped(AttrDomain::Edge, e) => return 0,
        _ => (mr.cdata(AttrDomain::Edge), e),
    };
    match data.active(ty).and_then(|o| data.float(o)) {
        Some(f) if f[i] > 0.0 => (f[i].min(1.0) * 255.0) as u8,
        _ => 0,
    }
}

/// Builds the edge part of a loop's state: flags, crease, and bevel weight
fn edge_flags(mr: &MeshRenderData<'_>, e: usize) -> EditFlags {
    let Some(state) = mr.edge_state(e) else {
        return EditFlags::default();
    };
    let select_mode = mr.opts().select_mode;
    let mut f = VertFlags::empty();
    f.set(VertFlags::EDGE_ACTIVE, mr.is_active_edge(e));

    if !select_mode.contains(SelectMode::VERT) {
        f.set(VertFlags::EDGE_SELECTED, state.contains(ElemFlags::SELECT));
    } else {
        let ends_selected = match (mr.bm(), mr.edit_edge(e)) {
            (Some(bm), Some(o)) => bm
                .edge(o)
                .v
                .iter()
                .all(|&v| bm.vert(v).flag.contains(ElemFlags::SELECT)),
            _ => mr
                .edge_verts(e)
                .iter()
                .all(|&v| is_selected(mr.vert_state(v))),
        };
        if ends_selected {
            f |= VertFlags::EDGE_SELECTED | VertFlags::VERT_SELECTED;
        }
    }
    f.set(VertFlags::EDGE_SEAM, state.contains(ElemFlags::SEAM));
    f.set(VertFlags::EDGE_SHARP, state.contains(ElemFlags::SHARP));

    // Face-only selection highlights the boundary of the active face
    if select_mode == SelectMode::FACE {
        let in_active = match (mr.bm(), mr.edit_edge(e)) {
            (Some(bm), Some(o)) => bm.active_face().is_some_and(|af| {
                bm.face_loops(af).any(|l| bm.loop_(l).e == o)
            }),
            _ => false,
        };
        if in_active {
            f |= VertFlags::EDGE_ACTIVE;
        }
    }

    EditFlags {
        v_flag: 0,
        e_flag: f.bits(),
        crease: edge_weight(mr, LayerType::Crease, e),
        bweight: edge_weight(mr, LayerType::BevelWeight, e),
    }
}

/// Per-loop edit-mode state of the face, edge and vertex at each corner
///
/// Loose edges get the edge's state on both entries, combined with each
/// endpoint's vertex state; loose vertices get only their vertex state.
pub struct EditData;

impl EditData {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, EditFlags>,
    ) {
        for p in r {
            let face = face_flags(mr, p);
            for l in mr.poly_loops(p) {
                let mut d = edge_flags(mr, mr.loop_edge(l));
                d.v_flag = face.bits();
                d.e_flag |= vert_flags(mr, mr.loop_vert(l)).bits();
                w[l] = d;
            }
        }
    }

    fn ledge<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, EditFlags>,
    ) {
        let start = mr.ledge_loop_start();
        for i in r {
            let e = mr.ledges()[i] as usize;
            let d = edge_flags(mr, e);
            for (j, v) in mr.edge_verts(e).into_iter().enumerate() {
                w[start + i * 2 + j] = EditFlags {
                    e_flag: d.e_flag | vert_flags(mr, v).bits(),
                    ..d
                };
            }
        }
    }

    fn lvert<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, EditFlags>,
    ) {
        let start = mr.lvert_loop_start();
        for i in r {
            let v = mr.lverts()[i] as usize;
            w[start + i] = EditFlags {
                e_flag: vert_flags(mr, v).bits(),
                ..EditFlags::default()
            };
        }
    }
}

impl Extract for EditData {
    type Data = ();
    type Elem = EditFlags;

    const NAME: &'static str = "edit_data";
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
            VertBuf::new::<EditFlags>(&EDIT_DATA_FORMAT, mr.loop_len_total());
        (Buffer::Vert(vbo), ())
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Per-loop UV-editor state
///
/// Loose edges and vertices have no UV corners, so their entries at the end
/// of the buffer stay zeroed.
pub struct EditUvData;

impl EditUvData {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, EditFlags>,
    ) {
        let ldata = mr.cdata(AttrDomain::Loop);
        let uv = ldata.active(LayerType::Uv).and_then(|o| ldata.uv(o));
        for p in r {
            let face = uv_face_flags(mr, uv, p);
            for l in mr.poly_loops(p) {
                let corner = uv.map(|uv| uv_flags(&uv[l])).unwrap_or_default();
                w[l] = EditFlags {
                    v_flag: (face | corner).bits(),
                    ..EditFlags::default()
                };
            }
        }
    }
}

/// Face state as seen by the UV editor
fn uv_face_flags(
    mr: &MeshRenderData<'_>,
    uv: Option<&[LoopUv]>,
    p: usize,
) -> FaceFlags {
    let mut face = face_flags(mr, p);
    face.set(FaceFlags::FACE_UV_ACTIVE, mr.is_active_face(p));
    if let Some(uv) = uv {
        let all = uv[mr.poly_loops(p)]
            .iter()
            .all(|c| c.flag.contains(UvFlags::SELECT));
        face.set(FaceFlags::FACE_UV_SELECT, all);
    }
    face
}

fn uv_flags(c: &LoopUv) -> FaceFlags {
    let mut f = FaceFlags::empty();
    if c.flag.contains(UvFlags::PIN) {
        f |= FaceFlags::VERT_UV_PINNED;
    }
    if c.flag.contains(UvFlags::SELECT) {
        f |= FaceFlags::VERT_UV_SELECT;
    }
    if c.flag.contains(UvFlags::EDGE_SELECT) {
        f |= FaceFlags::EDGE_UV_SELECT | FaceFlags::VERT_UV_SELECT;
    }
    f
}

impl Extract for EditUvData {
    type Data = ();
    type Elem = EditFlags;

    const NAME: &'static str = "edituv_data";
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
        let vbo =
            VertBuf::new::<EditFlags>(&EDIT_DATA_FORMAT, mr.loop_len_total());
        (Buffer::Vert(vbo), ())
    }
}

/// Per-polygon UV-editor state, for face dots
///
/// Unmapped polygons keep a zeroed entry.
pub struct FdotsEditUvData;

impl FdotsEditUvData {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, EditFlags>,
    ) {
        let ldata = mr.cdata(AttrDomain::Loop);
        let uv = ldata.active(LayerType::Uv).and_then(|o| ldata.uv(o));
        for p in r {
            if mr.is_unmapped(AttrDomain::Poly, p) {
                continue;
            }
            w[p] = EditFlags {
                v_flag: uv_face_flags(mr, uv, p).bits(),
                ..EditFlags::default()
            };
        }
    }
}

impl Extract for FdotsEditUvData {
    type Data = ();
    type Elem = EditFlags;

    const NAME: &'static str = "fdots_edituv_data";
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
        let vbo = VertBuf::new::<EditFlags>(&EDIT_DATA_FORMAT, mr.poly_len());
        (Buffer::Vert(vbo), ())
    }
}

////////////////////////////////////////////////////////////////////////////////

const STRETCH_AREA_FORMAT: VertFormat = VertFormat::new(&[Attr::new(
    "ratio",
    CompType::I16,
    1,
    FetchMode::IntToFloatUnit,
)]);

/// Per-loop UV area distortion of each polygon
///
/// The raw ratio compares a polygon's 3D area with its UV area; its sign
/// tags polygons whose UV area is the larger of the two.  The written value
/// is normalized by the whole mesh's area ratio, so a uniformly scaled UV
/// map shows no stretch.
pub struct StretchArea;

/// Per-polygon areas, written by any chunk and read in finish
///
/// Each slot holds the bits of an `f32`.
pub struct PolyAreas {
    area: Vec<AtomicU32>,
    uv_area: Vec<AtomicU32>,
}

impl PolyAreas {
    fn load(v: &[AtomicU32], p: usize) -> f32 {
        f32::from_bits(v[p].load(Ordering::Relaxed))
    }
}

/// Signed ratio of the smaller to the larger area, or 0 if either is empty
fn area_ratio(area: f32, uv_area: f32) -> f32 {
    if area < f32::EPSILON || uv_area < f32::EPSILON {
        0.0
    } else if area > uv_area {
        uv_area / area
    } else {
        -(area / uv_area)
    }
}

/// Normalizes a raw ratio by the mesh-wide ratio, folding it into `-1..=1`
fn ratio_to_stretch(ratio: f32, tot_ratio: f32) -> f32 {
    let s = if ratio > 0.0 {
        ratio * tot_ratio
    } else {
        -ratio / tot_ratio
    };
    let s = if s > 1.0 { 1.0 / s } else { s };
    s.copysign(ratio)
}

impl StretchArea {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        areas: &PolyAreas,
        _: &mut Window<'_, i16>,
    ) {
        let ldata = mr.cdata(AttrDomain::Loop);
        let uv = ldata.active(LayerType::Uv).and_then(|o| ldata.uv(o));
        for p in r {
            let loops = mr.poly_loops(p);
            let next = |l: usize| if l + 1 == loops.end { loops.start } else { l + 1 };

            let area = loops
                .clone()
                .map(|l| {
                    let a = mr.vert_co(mr.loop_vert(l));
                    let b = mr.vert_co(mr.loop_vert(next(l)));
                    a.cross(&b)
                })
                .sum::<Vector3<f32>>()
                .norm()
                * 0.5;
            let uv_area = uv.map_or(0.0, |uv| {
                loops
                    .clone()
                    .map(|l| {
                        let a = Vector2::from(uv[l].uv);
                        let b = Vector2::from(uv[next(l)].uv);
                        a.perp(&b)
                    })
                    .sum::<f32>()
                    .abs()
                    * 0.5
            });
            areas.area[p].store(area.to_bits(), Ordering::Relaxed);
            areas.uv_area[p].store(uv_area.to_bits(), Ordering::Relaxed);
        }
    }
}

impl Extract for StretchArea {
    type Data = PolyAreas;
    type Elem = i16;

    const NAME: &'static str = "stretch_area";
    const USE_THREADING: bool = true;
    const DOMAIN: Domain = Domain::Loop;
    const CALLBACKS: Callbacks<Self> = Callbacks {
        poly: Some(IterPair {
            edit: Self::poly::<EditMesh>,
            mesh: Self::poly::<Mesh>,
        }),
        ..Callbacks::NONE
    };

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, PolyAreas) {
        let slots = || (0..mr.poly_len()).map(|_| AtomicU32::new(0)).collect();
        let vbo =
            VertBuf::new::<i16>(&STRETCH_AREA_FORMAT, mr.loop_len_total());
        let areas = PolyAreas {
            area: slots(),
            uv_area: slots(),
        };
        (Buffer::Vert(vbo), areas)
    }

    fn finish(
        &self,
        mr: &MeshRenderData<'_>,
        buf: &mut Buffer,
        areas: &PolyAreas,
    ) {
        // Summed in polygon order, so the result doesn't depend on chunking
        let (mut tot_area, mut tot_uv_area) = (0.0f32, 0.0f32);
        for p in 0..mr.poly_len() {
            tot_area += PolyAreas::load(&areas.area, p);
            tot_uv_area += PolyAreas::load(&areas.uv_area, p);
        }
        let tot_ratio = if tot_area >= f32::EPSILON && tot_uv_area >= f32::EPSILON
        {
            tot_area / tot_uv_area
        } else {
            1.0
        };
        trace!("stretch_area: area {tot_area}, uv area {tot_uv_area}");

        let out = vert_data::<i16>(Self::NAME, buf);
        for p in 0..mr.poly_len() {
            let ratio = area_ratio(
                PolyAreas::load(&areas.area, p),
                PolyAreas::load(&areas.uv_area, p),
            );
            let s = ratio_to_stretch(ratio, tot_ratio);
            out[mr.poly_loops(p)].fill((s * f32::from(i16::MAX)) as i16);
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Corner angles of one loop, in 3D and in UV space
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
)]
#[repr(C)]
pub struct StretchAngleVert {
    /// Angle between the two 3D edges at the corner, divided by π
    pub angle: i16,
    /// Directions of the incoming and outgoing UV edges, divided by π
    pub uv_angles: [i16; 2],
}

const STRETCH_ANGLE_FORMAT: VertFormat = VertFormat::new(&[
    Attr::new("angle", CompType::I16, 1, FetchMode::IntToFloatUnit),
    Attr::new("uv_angles", CompType::I16, 2, FetchMode::IntToFloatUnit),
]);

static_assertions::const_assert_eq!(
    std::mem::size_of::<StretchAngleVert>(),
    STRETCH_ANGLE_FORMAT.stride()
);

/// Per-loop UV angle distortion
///
/// Only the 3D corner angle is computed here; the UV edge directions are
/// passed along so the comparison can account for the editor's aspect
/// ratio.  Loops get zeros when there is no UV layer.
pub struct StretchAngle;

fn to_short_angle(a: f32) -> i16 {
    (a * std::f32::consts::FRAC_1_PI * f32::from(i16::MAX)) as i16
}

impl StretchAngle {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        layer: &Option<LayerOffset>,
        w: &mut Window<'_, StretchAngleVert>,
    ) {
        let ldata = mr.cdata(AttrDomain::Loop);
        let Some(uv) = layer.and_then(|o| ldata.uv(o)) else {
            return;
        };
        let uv_dir = |a: usize, b: usize| {
            (Vector2::from(uv[b].uv) - Vector2::from(uv[a].uv))
                .try_normalize(0.0)
                .unwrap_or_else(Vector2::zeros)
        };
        let co_dir = |a: usize, b: usize| {
            let d = mr.vert_co(mr.loop_vert(b)) - mr.vert_co(mr.loop_vert(a));
            d.try_normalize(0.0).unwrap_or_else(Vector3::zeros)
        };
        for p in r {
            let loops = mr.poly_loops(p);
            for l in loops.clone() {
                let prev = if l == loops.start { loops.end - 1 } else { l - 1 };
                let next = if l + 1 == loops.end { loops.start } else { l + 1 };
                let (uv_in, uv_out) = (uv_dir(prev, l), uv_dir(l, next));
                let angle = co_dir(prev, l).angle(&co_dir(l, next));
                w[l] = StretchAngleVert {
                    angle: to_short_angle(angle),
                    uv_angles: [uv_in, uv_out]
                        .map(|d| to_short_angle(d.y.atan2(d.x))),
                };
            }
        }
    }
}

impl Extract for StretchAngle {
    type Data = Option<LayerOffset>;
    type Elem = StretchAngleVert;

    const NAME: &'static str = "stretch_angle";
    const USE_THREADING: bool = true;
    const DOMAIN: Domain = Domain::Loop;
    const CALLBACKS: Callbacks<Self> = Callbacks {
        poly: Some(IterPair {
            edit: Self::poly::<EditMesh>,
            mesh: Self::poly::<Mesh>,
        }),
        ..Callbacks::NONE
    };

    fn init(
        &self,
        mr: &MeshRenderData<'_>,
    ) -> (Buffer, Option<LayerOffset>) {
        let layer = mr.cdata(AttrDomain::Loop).active(LayerType::Uv);
        let vbo = VertBuf::new::<StretchAngleVert>(
            &STRETCH_ANGLE_FORMAT,
            mr.loop_len_total(),
        );
        (Buffer::Vert(vbo), layer)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        config::RenderOptions,
        extract::{Descriptor, ExtractJob},
        mesh::{FaceId, LayerData, MeshBuilder, MeshSource, VertId},
        render_data::IterFlags,
    };

    fn run_with<E: Extract>(
        e: &E,
        src: &MeshSource,
        opts: &RenderOptions,
    ) -> Buffer {
        let mr = MeshRenderData::new(src, opts, IterFlags::all());
        let job = e.job(&mr);
        job.run_all();
        job.into_buffer()
    }

    fn run<E: Extract>(e: &E, src: &MeshSource) -> Buffer {
        run_with(e, src, &RenderOptions::default())
    }

    /// Two quads folded along their shared edge, plus a loose edge and a
    /// loose vertex
    fn folded() -> Mesh {
        let mut b = MeshBuilder::new();
        for p in [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [2.0, 0.0, 1.0],
            [2.0, 1.0, 1.0],
            [5.0, 0.0, 0.0],
            [5.0, 1.0, 0.0],
            [9.0, 9.0, 9.0],
        ] {
            b.vert(p);
        }
        b.poly(&[0, 1, 2, 3]).poly(&[1, 4, 5, 2]).edge(6, 7);
        b.build().unwrap()
    }

    #[test]
    fn edge_fac_manifold() {
        let src = MeshSource::object(folded());
        let buf = run(&EdgeFac, &src);
        let f = buf.data::<u8>().unwrap();
        assert_eq!(f.len(), 8 + 2 + 1);

        // Loop 1 runs along the shared edge 1 -> 2
        assert!(f[1] >= 1 && f[1] < EDGE_FAC_MAX, "{}", f[1]);
        for l in [0, 2, 3] {
            assert_eq!(f[l], EDGE_FAC_MAX);
        }
        assert_eq!(f[8..10], [EDGE_FAC_MAX; 2]);
        assert_eq!(f[10], 0);
    }

    #[test]
    fn edit_data_flags() {
        let mut bm = EditMesh::from_mesh(&folded());
        let shared = bm.find_edge(VertId::new(1), VertId::new(2)).unwrap();
        bm.set_edge_flag(shared, ElemFlags::SEAM, true).unwrap();
        bm.select_face(FaceId::new(0), true).unwrap();
        bm.set_active_face(Some(FaceId::new(0))).unwrap();
        bm.set_active_vert(Some(VertId::new(6))).unwrap();
        let crease = (0..bm.edge_len())
            .map(|e| if e == shared.index() { 0.5 } else { 0.0 })
            .collect();
        bm.add_layer(
            AttrDomain::Edge,
            LayerType::Crease,
            "crease",
            LayerData::Float(crease),
        )
        .unwrap();
        let src = MeshSource::edit(bm);

        let buf = run(&EditData, &src);
        let d = buf.data::<EditFlags>().unwrap();
        assert_eq!(d.len(), 11);

        // Vertex selection mode: the shared edge has both ends selected
        assert!(d[0].face().contains(FaceFlags::FACE_ACTIVE));
        assert!(d[0].face().contains(FaceFlags::FACE_SELECTED));
        assert!(d[1].vert().contains(
            VertFlags::EDGE_SELECTED | VertFlags::EDGE_SEAM
        ));
        assert_eq!(d[1].crease, 127);
        assert_eq!(d[0].crease, 0);
        assert!(d[4].face().is_empty());

        // Loose edge 6 -> 7 and loose vertex 8
        assert!(d[8].vert().contains(VertFlags::VERT_ACTIVE));
        assert!(!d[9].vert().contains(VertFlags::VERT_ACTIVE));
        assert_eq!(d[10], EditFlags::default());

        // Face-only selection: the active face's edges are highlighted
        let opts = RenderOptions {
            select_mode: SelectMode::FACE,
            ..RenderOptions::default()
        };
        let buf = run_with(&EditData, &src, &opts);
        let d = buf.data::<EditFlags>().unwrap();
        for l in 0..4 {
            assert!(d[l].vert().contains(VertFlags::EDGE_ACTIVE));
        }
        assert!(!d[5].vert().contains(VertFlags::EDGE_ACTIVE));
    }

    #[test]
    fn edge_selection_by_mode() {
        let mut bm = EditMesh::from_mesh(&folded());
        let e = bm.find_edge(VertId::new(0), VertId::new(1)).unwrap();
        bm.set_edge_flag(e, ElemFlags::SELECT, true).unwrap();
        let src = MeshSource::edit(bm);

        // In vertex mode, the edge's own flag is ignored
        let d = run(&EditData, &src);
        let d = d.data::<EditFlags>().unwrap();
        assert!(!d[0].vert().contains(VertFlags::EDGE_SELECTED));

        let opts = RenderOptions {
            select_mode: SelectMode::EDGE,
            ..RenderOptions::default()
        };
        let d = run_with(&EditData, &src, &opts);
        let d = d.data::<EditFlags>().unwrap();
        assert!(d[0].vert().contains(VertFlags::EDGE_SELECTED));
    }

    fn with_uv(me: &mut Mesh, scale: f32, pin: usize) {
        let uv = (0..me.loop_len())
            .map(|l| {
                let co = me.verts[me.loops[l].v as usize].co;
                let mut c = LoopUv::new(co.x * scale, co.y * scale);
                if l < 4 {
                    c.flag |= UvFlags::SELECT;
                }
                if l == pin {
                    c.flag |= UvFlags::PIN;
                }
                c
            })
            .collect();
        me.add_layer(AttrDomain::Loop, LayerType::Uv, "uv", LayerData::Uv(uv))
            .unwrap();
    }

    #[test]
    fn edit_uv_flags() {
        let mut me = folded();
        with_uv(&mut me, 1.0, 5);
        let buf = run(&EditUvData, &MeshSource::object(me));
        let d = buf.data::<EditFlags>().unwrap();
        assert_eq!(d.len(), 8 + 2 + 1);
        assert!(d[8..].iter().all(|f| *f == EditFlags::default()));
        assert!(d[0].face().contains(
            FaceFlags::FACE_UV_SELECT | FaceFlags::VERT_UV_SELECT
        ));
        assert!(!d[4].face().contains(FaceFlags::FACE_UV_SELECT));
        assert!(d[5].face().contains(FaceFlags::VERT_UV_PINNED));
    }

    #[test]
    fn fdots_edit_uv_flags() {
        let mut me = folded();
        with_uv(&mut me, 1.0, usize::MAX);
        let mut bm = EditMesh::from_mesh(&me);
        bm.set_active_face(Some(FaceId::new(1))).unwrap();
        let buf = run(&FdotsEditUvData, &MeshSource::edit(bm));
        let d = buf.data::<EditFlags>().unwrap();
        assert_eq!(d.len(), 2);
        assert_eq!(d[0].face(), FaceFlags::FACE_UV_SELECT);
        assert_eq!(
            d[1].face(),
            FaceFlags::FACE_ACTIVE | FaceFlags::FACE_UV_ACTIVE
        );
        assert!(d.iter().all(|f| f.e_flag == 0));
    }

    #[test]
    fn stretch_angle_square() {
        let right = i16::MAX / 2;
        let close = |a: i16, b: i16| (i32::from(a) - i32::from(b)).abs() <= 1;

        let mut me = folded();
        with_uv(&mut me, 1.0, usize::MAX);
        let buf = run(&StretchAngle, &MeshSource::object(me));
        let s = buf.data::<StretchAngleVert>().unwrap();
        assert_eq!(s.len(), 8 + 2 + 1);
        assert!(s[..8].iter().all(|v| close(v.angle, right)), "{s:?}");
        assert!(s[8..].iter().all(|v| *v == StretchAngleVert::default()));

        // Corner 0 is entered going down and left going right
        assert!(close(s[0].uv_angles[0], -right));
        assert_eq!(s[0].uv_angles[1], 0);
        // Corner 1 is entered going right and left going up
        assert_eq!(s[1].uv_angles[0], 0);
        assert!(close(s[1].uv_angles[1], right));

        // No UV layer
        let buf = run(&StretchAngle, &MeshSource::object(folded()));
        let s = buf.data::<StretchAngleVert>().unwrap();
        assert!(s.iter().all(|v| *v == StretchAngleVert::default()));
    }

    #[test]
    fn stretch_ratios() {
        assert_eq!(area_ratio(2.0, 1.0), 0.5);
        assert_eq!(area_ratio(1.0, 2.0), -0.5);
        assert_eq!(area_ratio(0.0, 2.0), 0.0);
        assert_eq!(ratio_to_stretch(0.5, 2.0), 1.0);
        assert_eq!(ratio_to_stretch(-0.5, 0.5), -1.0);
        assert_eq!(ratio_to_stretch(0.25, 2.0), 0.5);
    }

    #[test]
    fn stretch_uniform_scale() {
        // A uniformly scaled UV map has no relative stretch
        let mut b = MeshBuilder::new();
        for y in 0..2 {
            for x in 0..3 {
                b.vert([x as f32, y as f32, 0.0]);
            }
        }
        b.vert([9.0, 9.0, 9.0]);
        b.poly(&[0, 1, 4, 3]).poly(&[1, 2, 5, 4]);
        let mut me = b.build().unwrap();
        with_uv(&mut me, 0.5, usize::MAX);
        let buf = run(&StretchArea, &MeshSource::object(me));
        let s = buf.data::<i16>().unwrap();
        assert_eq!(s.len(), 9);
        assert!(s[..8].iter().all(|&s| s == i16::MAX));
        assert_eq!(s[8], 0);

        // Halving the UVs of one polygon stretches both, in opposite ways
        let mut me = folded();
        with_uv(&mut me, 0.5, usize::MAX);
        let buf = run(&StretchArea, &MeshSource::object(me));
        let s = buf.data::<i16>().unwrap();
        assert!(s[0] > 0 && s[0] < i16::MAX);
        assert!(s[4] > 0 && s[4] < i16::MAX);

        // Without UVs, every polygon is degenerate
        let buf = run(&StretchArea, &MeshSource::object(folded()));
        assert!(buf.data::<i16>().unwrap().iter().all(|&s| s == 0));
    }
}
