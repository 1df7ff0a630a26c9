//! GPU-ready buffers produced by extraction
//!
//! Buffers are plain CPU memory in a layout that can be uploaded directly:
//! [`VertBuf`] holds interleaved vertices described by a [`VertFormat`], and
//! [`IndexBuf`] holds primitive indices into per-loop vertex buffers.
//!
//! Every per-loop buffer shares one layout: regular polygon loops in polygon
//! order, then two entries per loose edge, then one entry per loose vertex.
//! Index buffers referencing a "loop index" are valid against all of them.
use std::ops::{Index, IndexMut, Range};

use strum::{EnumCount, IntoEnumIterator};
use zerocopy::{FromZeros, Immutable, IntoBytes};

mod format;
mod index;
mod vert;

pub use format::{
    Attr, CompType, FetchMode, GpuNormal, PackedNormal, ShortNormal,
    VertFormat,
};
pub use index::{IndexBuf, IndexSub, PrimType, RESTART_INDEX};
pub use vert::VertBuf;

/// Types that can be stored in a [`VertBuf`]
pub trait Vertex:
    IntoBytes + Immutable + FromZeros + Copy + Send + Sync + 'static
{
}

impl<T> Vertex for T where
    T: IntoBytes + Immutable + FromZeros + Copy + Send + Sync + 'static
{
}

/// An extracted buffer
#[derive(Debug)]
pub enum Buffer {
    /// Vertex buffer
    Vert(VertBuf),
    /// Index buffer
    Index(IndexBuf),
    /// Run of primitives within another index buffer
    SubIndex(IndexSub),
}

impl Buffer {
    /// Returns the vertex buffer, if this is one
    pub fn as_vert(&self) -> Option<&VertBuf> {
        match self {
            Buffer::Vert(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the index buffer, if this is one
    pub fn as_index(&self) -> Option<&IndexBuf> {
        match self {
            Buffer::Index(i) => Some(i),
            _ => None,
        }
    }

    /// Returns the index sub-range, if this is one
    pub fn as_sub_index(&self) -> Option<&IndexSub> {
        match self {
            Buffer::SubIndex(i) => Some(i),
            _ => None,
        }
    }

    /// Returns the indices of an index buffer or sub-range
    pub fn indices(&self) -> Option<&[u32]> {
        match self {
            Buffer::Vert(..) => None,
            Buffer::Index(i) => Some(i.indices()),
            Buffer::SubIndex(i) => Some(i.indices()),
        }
    }

    /// Returns typed vertex data of a vertex buffer
    pub fn data<T: Vertex>(&self) -> Option<&[T]> {
        self.as_vert().and_then(|v| v.data())
    }

    /// Number of elements (vertices or indices)
    pub fn len(&self) -> usize {
        match self {
            Buffer::Vert(v) => v.len(),
            Buffer::Index(i) => i.indices().len(),
            Buffer::SubIndex(i) => i.indices().len(),
        }
    }

    /// Checks whether the buffer has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns mutable element storage, viewed as `T`
    ///
    /// Vertex buffers expose their vertex type; index buffers expose `u32`.
    /// Returns `None` on a type mismatch or for sub-ranges.
    pub fn elems_mut<T: 'static>(&mut self) -> Option<&mut [T]> {
        use std::any::Any;
        match self {
            Buffer::Vert(v) => v.data_mut_any::<T>(),
            Buffer::Index(i) => (i.indices_vec_mut() as &mut dyn Any)
                .downcast_mut::<Vec<T>>()
                .map(|v| v.as_mut_slice()),
            Buffer::SubIndex(..) => None,
        }
    }
}

/// Mutable view of part of a destination buffer, addressed by global index
///
/// Each chunk of a parallel extraction gets a window over its own disjoint
/// range; writes outside that range are bookkeeping bugs and panic.
pub struct Window<'a, T> {
    start: usize,
    data: &'a mut [T],
}

impl<'a, T> Window<'a, T> {
    /// Builds a window whose first element has global index `start`
    pub fn new(start: usize, data: &'a mut [T]) -> Self {
        Self { start, data }
    }

    /// Global index range covered by this window
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.data.len()
    }

    /// Returns a run of elements by global index range
    pub fn slice_mut(&mut self, r: Range<usize>) -> &mut [T] {
        self.check(r.start);
        if r.end > r.start {
            self.check(r.end - 1);
        }
        &mut self.data[r.start - self.start..r.end - self.start]
    }

    fn check(&self, i: usize) {
        assert!(
            self.range().contains(&i),
            "index {i} is outside of window {:?}",
            self.range()
        );
    }
}

impl<T> Index<usize> for Window<'_, T> {
    type Output = T;
    fn index(&self, i: usize) -> &T {
        self.check(i);
        &self.data[i - self.start]
    }
}

impl<T> IndexMut<usize> for Window<'_, T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        self.check(i);
        &mut self.data[i - self.start]
    }
}

/// Identifies one output buffer slot of a mesh
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    enum_map::Enum,
    strum::EnumIter,
    strum::EnumCount,
    strum::EnumString,
    strum::Display,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum BufferKind {
    /// Per-loop position and packed normal
    PosNor,
    /// Per-loop normal
    Lnor,
    /// Per-loop texture coordinate
    Uv,
    /// Per-loop tangent
    Tan,
    /// Per-loop vertex color
    Vcol,
    /// Per-loop deform weight
    Weights,
    /// Per-loop edge factor for wireframe display
    EdgeFac,
    /// Per-loop edit-mode overlay flags
    EditData,
    /// Per-loop UV-editor overlay flags
    EditUvData,
    /// Per-loop UV area distortion
    StretchArea,
    /// Per-loop UV angle distortion
    StretchAngle,
    /// Per-loop mesh analysis weight
    MeshAnalysis,
    /// Per-polygon center
    FdotsPos,
    /// Per-polygon normal and state flag
    FdotsNor,
    /// Per-polygon UV center
    FdotsUv,
    /// Per-polygon UV-editor overlay flags
    FdotsEditUvData,
    /// Per-loop original polygon index
    PolyIdx,
    /// Per-loop original edge index
    EdgeIdx,
    /// Per-loop original vertex index
    VertIdx,
    /// Per-polygon original polygon index
    FdotIdx,
    /// Triangle list, sorted by material
    Tris,
    /// One line per edge
    Lines,
    /// Loose-edge run of [`BufferKind::Lines`]
    LinesLoose,
    /// Edge outlines of the paint-mode face selection
    LinesPaintMask,
    /// Lines with adjacency, for silhouette detection
    LinesAdjacency,
    /// One point per vertex
    Points,
    /// One point per polygon
    Fdots,
    /// UV-editor triangles
    EditUvTris,
    /// UV-editor polygon outlines
    EditUvLines,
    /// UV-editor points, one per loop
    EditUvPoints,
    /// UV-editor face dots
    EditUvFdots,
}

impl BufferKind {
    /// Checks whether this slot holds indices
    pub fn is_index(self) -> bool {
        matches!(
            self,
            BufferKind::Tris
                | BufferKind::Lines
                | BufferKind::LinesLoose
                | BufferKind::LinesPaintMask
                | BufferKind::LinesAdjacency
                | BufferKind::Points
                | BufferKind::Fdots
                | BufferKind::EditUvTris
                | BufferKind::EditUvLines
                | BufferKind::EditUvPoints
                | BufferKind::EditUvFdots
        )
    }

    /// Returns the slot as a set bit
    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

static_assertions::const_assert!(BufferKind::COUNT <= 32);

/// Set of buffer slots, stored as a bitmask
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct BufferSet(u32);

impl BufferSet {
    /// The empty set
    pub const EMPTY: Self = Self(0);

    /// Builds the set of every slot
    pub fn all() -> Self {
        BufferKind::iter().collect()
    }

    /// Checks whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Number of slots in the set
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Checks whether a slot is present
    pub fn contains(&self, k: BufferKind) -> bool {
        self.0 & k.bit() != 0
    }

    /// Adds a slot
    pub fn insert(&mut self, k: BufferKind) {
        self.0 |= k.bit();
    }

    /// Removes a slot
    pub fn remove(&mut self, k: BufferKind) {
        self.0 &= !k.bit();
    }

    /// Returns slots in either set
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns slots in `self` but not in `other`
    pub fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Returns slots in both sets
    pub fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Iterates over slots in declaration order
    pub fn iter(self) -> impl Iterator<Item = BufferKind> {
        BufferKind::iter().filter(move |k| self.contains(*k))
    }
}

impl FromIterator<BufferKind> for BufferSet {
    fn from_iter<I: IntoIterator<Item = BufferKind>>(iter: I) -> Self {
        let mut out = Self::EMPTY;
        for k in iter {
            out.insert(k);
        }
        out
    }
}

impl<const N: usize> From<[BufferKind; N]> for BufferSet {
    fn from(ks: [BufferKind; N]) -> Self {
        ks.into_iter().collect()
    }
}

impl std::fmt::Debug for BufferSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
