//! Extractors: per-buffer producers driven by the scheduler
//!
//! Each output buffer is produced by one [`Extract`] implementation, which
//! declares
//!
//! - an init step allocating the destination buffer and a private
//!   accumulator,
//! - up to four [`IterPair`]s, one per element kind, each with one function
//!   for the editable store and one for stable stores,
//! - an optional finish step,
//! - the auxiliary data it needs and whether chunks may run in parallel.
//!
//! The scheduler only sees the object-safe [`Descriptor`] view of an
//! extractor, which every [`Extract`] type implements automatically.
use std::ops::Range;

use strum::IntoEnumIterator;

use crate::{
    buffer::{Buffer, BufferKind, IndexBuf, PackedNormal, ShortNormal, Window},
    mesh::{EditMesh, Mesh},
    render_data::{DataFlags, IterFlags, MeshRenderData},
};

mod analysis;
mod attr;
mod edituv;
mod ibo;
mod job;
mod overlay;
mod pos;
mod scheduler;
mod select;

pub use analysis::MeshAnalysis;
pub use attr::{Tan, Uv, Vcol, Weights};
pub use edituv::{EditUvFdots, EditUvLines, EditUvPoints, EditUvTris, FdotsUv};
pub use ibo::{Fdots, Lines, LinesAdjacency, LinesPaintMask, Points, Tris};
pub use job::ExtractJob;
pub use overlay::{
    EdgeFac, EditData, EditFlags, EditUvData, FaceFlags, FdotsEditUvData,
    StretchAngle, StretchAngleVert, StretchArea, VertFlags,
};
pub use pos::{FdotsNor, FdotsPos, Lnor, PosNor, PosNorVert};
pub use scheduler::{ExtractReport, extract_buffers};
pub use select::{EdgeIdx, FdotIdx, PolyIdx, VertIdx};

/// Kinds of element an extractor can iterate
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum ElementKind {
    /// Loop triangles
    LoopTri,
    /// Polygons, with their loops
    Poly,
    /// Loose edges
    LEdge,
    /// Loose vertices
    LVert,
}

impl ElementKind {
    /// Returns the matching iteration flag
    pub fn flag(self) -> IterFlags {
        match self {
            ElementKind::LoopTri => IterFlags::LOOPTRI,
            ElementKind::Poly => IterFlags::POLY,
            ElementKind::LEdge => IterFlags::LEDGE,
            ElementKind::LVert => IterFlags::LVERT,
        }
    }
}

/// Index space of an extractor's destination buffer
///
/// Chunked extractors must write a per-loop or per-polygon buffer, so that
/// each chunk of elements maps onto one contiguous destination range.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Domain {
    /// One entry per loop, in the combined loop layout
    Loop,
    /// One entry per polygon
    Poly,
    /// Anything else (index buffers, finish-only outputs)
    Whole,
}

/// Per-element iteration function over one store
///
/// Arguments are the extractor, the view, the store being iterated, a range
/// of element indices (of the kind the function is registered for), the
/// accumulator, and a window over the destination range of that element
/// range.
pub type IterFn<E, S> = fn(
    &E,
    &MeshRenderData<'_>,
    &S,
    Range<usize>,
    &<E as Extract>::Data,
    &mut Window<'_, <E as Extract>::Elem>,
);

/// Iteration functions for one element kind, one per store
///
/// Both variants are required, so an extractor can't support a kind in only
/// one representation.
pub struct IterPair<E: Extract> {
    /// Iterates the editable mesh
    pub edit: IterFn<E, EditMesh>,
    /// Iterates a stable (or mapped) mesh
    pub mesh: IterFn<E, Mesh>,
}

impl<E: Extract> Clone for IterPair<E> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<E: Extract> Copy for IterPair<E> {}

/// Iteration functions of an extractor, by element kind
pub struct Callbacks<E: Extract> {
    /// Loop triangles
    pub looptri: Option<IterPair<E>>,
    /// Polygons
    pub poly: Option<IterPair<E>>,
    /// Loose edges
    pub ledge: Option<IterPair<E>>,
    /// Loose vertices
    pub lvert: Option<IterPair<E>>,
}

impl<E: Extract> Clone for Callbacks<E> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<E: Extract> Copy for Callbacks<E> {}

impl<E: Extract> Callbacks<E> {
    /// No iteration at all (init-only or finish-only extractors)
    pub const NONE: Self = Self {
        looptri: None,
        poly: None,
        ledge: None,
        lvert: None,
    };

    /// Returns the pair for a given kind
    pub fn get(&self, kind: ElementKind) -> Option<IterPair<E>> {
        match kind {
            ElementKind::LoopTri => self.looptri,
            ElementKind::Poly => self.poly,
            ElementKind::LEdge => self.ledge,
            ElementKind::LVert => self.lvert,
        }
    }

    /// Returns the kinds that have iteration functions
    pub fn iter_flags(&self) -> IterFlags {
        ElementKind::iter()
            .filter(|k| self.get(*k).is_some())
            .fold(IterFlags::empty(), |f, k| f | k.flag())
    }
}

/// A producer of one output buffer
///
/// The accumulator (`Data`) is created by [`Extract::init`] and then shared
/// immutably by every chunk; anything that chunks must update concurrently
/// has to live behind atomics inside it.  `Elem` is the element type of the
/// destination buffer, as returned by [`Buffer::elems_mut`].
pub trait Extract: Sync + Sized {
    /// Extractor-private accumulator
    type Data: Send + Sync;
    /// Element type of the destination buffer
    type Elem: Send + Sync + 'static;

    /// Name used in logs and reports
    const NAME: &'static str;
    /// Auxiliary arrays needed before init
    const DATA_FLAGS: DataFlags = DataFlags::empty();
    /// Whether chunks of this extractor may run concurrently
    const USE_THREADING: bool = false;
    /// Index space of the destination buffer
    const DOMAIN: Domain = Domain::Whole;
    /// Iteration functions
    const CALLBACKS: Callbacks<Self> = Callbacks::NONE;

    /// Allocates the destination buffer and the accumulator
    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, Self::Data);

    /// Runs once, after every element of every kind has been iterated
    fn finish(
        &self,
        _mr: &MeshRenderData<'_>,
        _buf: &mut Buffer,
        _data: &Self::Data,
    ) {
    }
}

/// Object-safe view of an extractor, as seen by the scheduler
pub trait Descriptor: Sync {
    /// Name used in logs and reports
    fn name(&self) -> &'static str;
    /// Auxiliary arrays needed before init
    fn data_flags(&self) -> DataFlags;
    /// Element kinds iterated
    fn iter_flags(&self) -> IterFlags;
    /// Whether chunks may run concurrently
    fn use_threading(&self) -> bool;
    /// Index space of the destination buffer
    fn domain(&self) -> Domain;
    /// Builds the per-pass job state for this extractor
    fn job<'a>(
        &'a self,
        mr: &'a MeshRenderData<'a>,
    ) -> Box<dyn ExtractJob + 'a>;
}

impl<E: Extract> Descriptor for E {
    fn name(&self) -> &'static str {
        E::NAME
    }
    fn data_flags(&self) -> DataFlags {
        E::DATA_FLAGS
    }
    fn iter_flags(&self) -> IterFlags {
        E::CALLBACKS.iter_flags()
    }
    fn use_threading(&self) -> bool {
        E::USE_THREADING
    }
    fn domain(&self) -> Domain {
        E::DOMAIN
    }
    fn job<'a>(
        &'a self,
        mr: &'a MeshRenderData<'a>,
    ) -> Box<dyn ExtractJob + 'a> {
        Box::new(job::Job::new(self, mr))
    }
}

/// Returns the typed vertex data of an extractor's own buffer
///
/// # Panics
/// If the buffer does not hold `T`, which means `init` and `finish` disagree
fn vert_data<'b, T: 'static>(name: &str, buf: &'b mut Buffer) -> &'b mut [T] {
    match buf {
        Buffer::Vert(v) => match v.data_mut_any::<T>() {
            Some(d) => d,
            None => panic!("{name}: unexpected vertex type"),
        },
        _ => panic!("{name}: expected a vertex buffer"),
    }
}

/// Returns an extractor's own index buffer
///
/// # Panics
/// If the buffer is not an index buffer
fn index_buf<'b>(name: &str, buf: &'b mut Buffer) -> &'b mut IndexBuf {
    match buf {
        Buffer::Index(i) => i,
        _ => panic!("{name}: expected an index buffer"),
    }
}

////////////////////////////////////////////////////////////////////////////////

static POS_NOR: PosNor = PosNor;
static LNOR: Lnor<PackedNormal> = Lnor::new();
static LNOR_HQ: Lnor<ShortNormal> = Lnor::new();
static UV: Uv = Uv;
static TAN: Tan<PackedNormal> = Tan::new();
static TAN_HQ: Tan<ShortNormal> = Tan::new();
static VCOL: Vcol = Vcol;
static WEIGHTS: Weights = Weights;
static EDGE_FAC: EdgeFac = EdgeFac;
static EDIT_DATA: EditData = EditData;
static EDIT_UV_DATA: EditUvData = EditUvData;
static STRETCH_AREA: StretchArea = StretchArea;
static STRETCH_ANGLE: StretchAngle = StretchAngle;
static MESH_ANALYSIS: MeshAnalysis = MeshAnalysis;
static FDOTS_POS: FdotsPos = FdotsPos;
static FDOTS_NOR: FdotsNor = FdotsNor;
static FDOTS_UV: FdotsUv = FdotsUv;
static FDOTS_EDIT_UV_DATA: FdotsEditUvData = FdotsEditUvData;
static POLY_IDX: PolyIdx = PolyIdx;
static EDGE_IDX: EdgeIdx = EdgeIdx;
static VERT_IDX: VertIdx = VertIdx;
static FDOT_IDX: FdotIdx = FdotIdx;
static TRIS: Tris = Tris;
static LINES: Lines = Lines;
static LINES_PAINT_MASK: LinesPaintMask = LinesPaintMask;
static LINES_ADJACENCY: LinesAdjacency = LinesAdjacency;
static POINTS: Points = Points;
static FDOTS: Fdots = Fdots;
static EDIT_UV_TRIS: EditUvTris = EditUvTris;
static EDIT_UV_LINES: EditUvLines = EditUvLines;
static EDIT_UV_POINTS: EditUvPoints = EditUvPoints;
static EDIT_UV_FDOTS: EditUvFdots = EditUvFdots;

/// Looks up the extractor for an output slot
///
/// `hq` selects 16-bit normals for the loop normal and tangent buffers.
/// Returns `None` for [`BufferKind::LinesLoose`], which is a view into
/// [`BufferKind::Lines`] rather than an extracted buffer.
pub fn descriptor(kind: BufferKind, hq: bool) -> Option<&'static dyn Descriptor> {
    let d: &'static dyn Descriptor = match kind {
        BufferKind::PosNor => &POS_NOR,
        BufferKind::Lnor if hq => &LNOR_HQ,
        BufferKind::Lnor => &LNOR,
        BufferKind::Uv => &UV,
        BufferKind::Tan if hq => &TAN_HQ,
        BufferKind::Tan => &TAN,
        BufferKind::Vcol => &VCOL,
        BufferKind::Weights => &WEIGHTS,
        BufferKind::EdgeFac => &EDGE_FAC,
        BufferKind::EditData => &EDIT_DATA,
        BufferKind::EditUvData => &EDIT_UV_DATA,
        BufferKind::StretchArea => &STRETCH_AREA,
        BufferKind::StretchAngle => &STRETCH_ANGLE,
        BufferKind::MeshAnalysis => &MESH_ANALYSIS,
        BufferKind::FdotsPos => &FDOTS_POS,
        BufferKind::FdotsNor => &FDOTS_NOR,
        BufferKind::FdotsUv => &FDOTS_UV,
        BufferKind::FdotsEditUvData => &FDOTS_EDIT_UV_DATA,
        BufferKind::PolyIdx => &POLY_IDX,
        BufferKind::EdgeIdx => &EDGE_IDX,
        BufferKind::VertIdx => &VERT_IDX,
        BufferKind::FdotIdx => &FDOT_IDX,
        BufferKind::Tris => &TRIS,
        BufferKind::Lines => &LINES,
        BufferKind::LinesLoose => return None,
        BufferKind::LinesPaintMask => &LINES_PAINT_MASK,
        BufferKind::LinesAdjacency => &LINES_ADJACENCY,
        BufferKind::Points => &POINTS,
        BufferKind::Fdots => &FDOTS,
        BufferKind::EditUvTris => &EDIT_UV_TRIS,
        BufferKind::EditUvLines => &EDIT_UV_LINES,
        BufferKind::EditUvPoints => &EDIT_UV_POINTS,
        BufferKind::EditUvFdots => &EDIT_UV_FDOTS,
    };
    Some(d)
}
