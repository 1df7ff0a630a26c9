//! Per-loop shading attributes read from custom layers
//!
//! Missing layers are not an error: each extractor fills its buffer with a
//! neutral value instead (zero UVs, white, zero weight, a fixed tangent).
use std::{marker::PhantomData, ops::Range};

use log::debug;
use nalgebra::{Vector2, Vector3};

use super::{Callbacks, Domain, Extract, IterPair};
use crate::{
    buffer::{
        Attr, Buffer, CompType, FetchMode, GpuNormal, VertBuf, VertFormat,
        Window,
    },
    mesh::{AttrDomain, EditMesh, LayerOffset, LayerType, Mesh},
    render_data::{DataFlags, MeshRenderData},
};

const UV_FORMAT: VertFormat =
    VertFormat::new(&[Attr::new("u", CompType::F32, 2, FetchMode::Float)]);

/// Active UV layer, per loop
pub struct Uv;

impl Uv {
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
            for l in mr.poly_loops(p) {
                w[l] = uv[l].uv;
            }
        }
    }
}

impl Extract for Uv {
    type Data = Option<LayerOffset>;
    type Elem = [f32; 2];

    const NAME: &'static str = "uv";
    const USE_THREADING: bool = true;
    const DOMAIN: Domain = Domain::Loop;
    const CALLBACKS: Callbacks<Self> = Callbacks {
        poly: Some(IterPair {
            edit: Self::poly::<EditMesh>,
            mesh: Self::poly::<Mesh>,
        }),
        ..Callbacks::NONE
    };

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, Option<LayerOffset>) {
        let layer = mr.cdata(AttrDomain::Loop).active(LayerType::Uv);
        if layer.is_none() {
            debug!("no UV layer; filling with zeros");
        }
        let vbo = VertBuf::new::<[f32; 2]>(&UV_FORMAT, mr.loop_len_total());
        (Buffer::Vert(vbo), layer)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Per-loop tangent, computed from the active UV layer
///
/// Tangents are accumulated per triangle, then orthogonalized against the
/// loop's tangent-space normal.  `w` holds the handedness (+1 or -1).  The
/// whole buffer is built in the init step, since accumulation crosses
/// polygon boundaries.
pub struct Tan<N>(PhantomData<N>);

impl<N> Tan<N> {
    /// Builds the extractor
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

/// Tangent used when there is no UV layer or the UV mapping is degenerate
fn fallback_tangent() -> Vector3<f32> {
    Vector3::x()
}

/// Computes per-loop tangents and handedness from per-triangle UV gradients
fn loop_tangents(
    mr: &MeshRenderData<'_>,
    uv: &[crate::mesh::LoopUv],
) -> Vec<(Vector3<f32>, i32)> {
    let loop_len = mr.loop_len();
    let mut tan = vec![Vector3::zeros(); loop_len];
    let mut bitan = vec![Vector3::zeros(); loop_len];
    for i in 0..mr.tri_len() {
        let t = mr.looptri(i).tri.map(|l| l as usize);
        let co = t.map(|l| mr.vert_co(mr.loop_vert(l)));
        let st = t.map(|l| Vector2::from(uv[l].uv));

        let (e1, e2) = (co[1] - co[0], co[2] - co[0]);
        let (d1, d2) = (st[1] - st[0], st[2] - st[0]);
        let det = d1.x * d2.y - d2.x * d1.y;
        if det.abs() < f32::EPSILON {
            continue;
        }
        let r = 1.0 / det;
        let sdir = (e1 * d2.y - e2 * d1.y) * r;
        let tdir = (e2 * d1.x - e1 * d2.x) * r;
        for l in t {
            tan[l] += sdir;
            bitan[l] += tdir;
        }
    }

    let normals = mr.tan_loop_normals();
    tan.into_iter()
        .zip(bitan)
        .zip(normals)
        .map(|((t, b), n)| {
            let Some(o) = (t - n * n.dot(&t)).try_normalize(f32::EPSILON)
            else {
                return (fallback_tangent(), 1);
            };
            let sign = if n.cross(&o).dot(&b) < 0.0 { -1 } else { 1 };
            (o, sign)
        })
        .collect()
}

impl<N: GpuNormal> Extract for Tan<N> {
    type Data = ();
    type Elem = N;

    const NAME: &'static str = "tan";
    const DATA_FLAGS: DataFlags = DataFlags::POLY_NOR
        .union(DataFlags::TAN_LOOP_NOR)
        .union(DataFlags::LOOPTRI);

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, ()) {
        let ldata = mr.cdata(AttrDomain::Loop);
        let uv = ldata.active(LayerType::Uv).and_then(|o| ldata.uv(o));

        let mut out = vec![N::pack(Vector3::zeros(), 0); mr.loop_len_total()];
        match uv {
            Some(uv) => {
                for (o, (t, s)) in out.iter_mut().zip(loop_tangents(mr, uv)) {
                    *o = N::pack(t, s);
                }
            }
            None => {
                debug!("no UV layer; using fallback tangents");
                out[..mr.loop_len()].fill(N::pack(fallback_tangent(), 1));
            }
        }
        (Buffer::Vert(VertBuf::from_vec(N::TAN_FORMAT, out)), ())
    }
}

////////////////////////////////////////////////////////////////////////////////

const VCOL_FORMAT: VertFormat = VertFormat::new(&[Attr::new(
    "c",
    CompType::U16,
    4,
    FetchMode::IntToFloatUnit,
)]);

fn unit_u16(f: f32) -> u16 {
    (f.clamp(0.0, 1.0) * 65535.0).round() as u16
}

/// Active color layer, per loop, as normalized 16-bit values
pub struct Vcol;

impl Vcol {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        layer: &Option<LayerOffset>,
        w: &mut Window<'_, [u16; 4]>,
    ) {
        let ldata = mr.cdata(AttrDomain::Loop);
        let color = layer.and_then(|o| ldata.color(o));
        for p in r {
            for l in mr.poly_loops(p) {
                w[l] = match color {
                    Some(c) => c[l].map(unit_u16),
                    None => [u16::MAX; 4],
                };
            }
        }
    }
}

impl Extract for Vcol {
    type Data = Option<LayerOffset>;
    type Elem = [u16; 4];

    const NAME: &'static str = "vcol";
    const USE_THREADING: bool = true;
    const DOMAIN: Domain = Domain::Loop;
    const CALLBACKS: Callbacks<Self> = Callbacks {
        poly: Some(IterPair {
            edit: Self::poly::<EditMesh>,
            mesh: Self::poly::<Mesh>,
        }),
        ..Callbacks::NONE
    };

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, Option<LayerOffset>) {
        let layer = mr.cdata(AttrDomain::Loop).active(LayerType::Color);
        if layer.is_none() {
            debug!("no color layer; filling with white");
        }
        let vbo = VertBuf::new::<[u16; 4]>(&VCOL_FORMAT, mr.loop_len_total());
        (Buffer::Vert(vbo), layer)
    }
}

////////////////////////////////////////////////////////////////////////////////

const WEIGHTS_FORMAT: VertFormat = VertFormat::new(&[Attr::new(
    "weight",
    CompType::F32,
    1,
    FetchMode::Float,
)]);

/// Active deform weight of each loop's vertex
pub struct Weights;

impl Weights {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        layer: &Option<LayerOffset>,
        w: &mut Window<'_, f32>,
    ) {
        let vdata = mr.cdata(AttrDomain::Vert);
        let Some(weight) = layer.and_then(|o| vdata.float(o)) else {
            return;
        };
        for p in r {
            for l in mr.poly_loops(p) {
                w[l] = weight[mr.loop_vert(l)];
            }
        }
    }
}

impl Extract for Weights {
    type Data = Option<LayerOffset>;
    type Elem = f32;

    const NAME: &'static str = "weights";
    const USE_THREADING: bool = true;
    const DOMAIN: Domain = Domain::Loop;
    const CALLBACKS: Callbacks<Self> = Callbacks {
        poly: Some(IterPair {
            edit: Self::poly::<EditMesh>,
            mesh: Self::poly::<Mesh>,
        }),
        ..Callbacks::NONE
    };

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, Option<LayerOffset>) {
        let layer = mr.cdata(AttrDomain::Vert).active(LayerType::Weight);
        if layer.is_none() {
            debug!("no weight layer; filling with zeros");
        }
        let vbo = VertBuf::new::<f32>(&WEIGHTS_FORMAT, mr.loop_len_total());
        (Buffer::Vert(vbo), layer)
    }
}
