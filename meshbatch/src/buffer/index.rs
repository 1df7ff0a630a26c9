use std::{ops::Range, sync::Arc};

/// Index marking a primitive restart (or an unused primitive slot)
pub const RESTART_INDEX: u32 = u32::MAX;

/// Primitive type of an index buffer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PrimType {
    /// One index per point
    Points,
    /// Two indices per line
    Lines,
    /// Three indices per triangle
    Tris,
    /// Four indices per line: the vertex opposite the line in one adjacent
    /// triangle, the two endpoints, then the opposite vertex in the other
    LinesAdj,
}

impl PrimType {
    /// Number of indices per primitive
    pub fn verts_per_prim(self) -> usize {
        match self {
            PrimType::Points => 1,
            PrimType::Lines => 2,
            PrimType::Tris => 3,
            PrimType::LinesAdj => 4,
        }
    }
}

/// An index buffer referencing vertices of per-loop vertex buffers
///
/// Slots start out as [`RESTART_INDEX`]; unwritten primitives are therefore
/// skipped when drawn.
#[derive(Clone, Debug)]
pub struct IndexBuf {
    prim: PrimType,
    indices: Vec<u32>,
    /// Exclusive upper bound on valid indices
    vert_len: usize,
    /// Smallest and largest index, set by [`IndexBuf::build_in_place`]
    range: Option<(u32, u32)>,
    /// Named primitive ranges (per-material runs, loose-edge runs)
    subranges: Vec<Range<usize>>,
}

impl IndexBuf {
    /// Allocates a buffer of `prim_len` primitives, all restart entries
    pub fn new(prim: PrimType, prim_len: usize, vert_len: usize) -> Self {
        Self {
            prim,
            indices: vec![RESTART_INDEX; prim_len * prim.verts_per_prim()],
            vert_len,
            range: None,
            subranges: vec![],
        }
    }

    /// Returns the primitive type
    pub fn prim(&self) -> PrimType {
        self.prim
    }

    /// Number of primitive slots
    pub fn prim_len(&self) -> usize {
        self.indices.len() / self.prim.verts_per_prim()
    }

    /// Returns every index, including restart entries
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Returns mutable index storage
    pub fn indices_mut(&mut self) -> &mut [u32] {
        &mut self.indices
    }

    pub(crate) fn indices_vec_mut(&mut self) -> &mut Vec<u32> {
        &mut self.indices
    }

    /// Iterates over primitives that are not restart entries
    pub fn prims(&self) -> impl Iterator<Item = &[u32]> + '_ {
        self.indices
            .chunks_exact(self.prim.verts_per_prim())
            .filter(|p| !p.contains(&RESTART_INDEX))
    }

    /// Shrinks the buffer to its first `prim_len` primitives
    pub fn truncate(&mut self, prim_len: usize) {
        self.indices.truncate(prim_len * self.prim.verts_per_prim());
    }

    /// Finalizes the buffer after all primitives are written
    ///
    /// # Panics
    /// If any index is out of range for the referenced vertex buffers
    pub fn build_in_place(&mut self) {
        let mut range: Option<(u32, u32)> = None;
        for &i in self.indices.iter().filter(|&&i| i != RESTART_INDEX) {
            assert!(
                (i as usize) < self.vert_len,
                "index {i} is out of range ({} vertices)",
                self.vert_len
            );
            range = Some(match range {
                None => (i, i),
                Some((lo, hi)) => (lo.min(i), hi.max(i)),
            });
        }
        self.range = range;
    }

    /// Smallest and largest index, if any primitive was written
    pub fn index_range(&self) -> Option<(u32, u32)> {
        self.range
    }

    /// Records named primitive ranges
    pub fn set_subranges(&mut self, r: Vec<Range<usize>>) {
        debug_assert!(r.iter().all(|r| r.end <= self.prim_len()));
        self.subranges = r;
    }

    /// Returns the recorded primitive ranges
    pub fn subranges(&self) -> &[Range<usize>] {
        &self.subranges
    }
}

/// A view of a run of primitives in a shared index buffer
#[derive(Clone, Debug)]
pub struct IndexSub {
    parent: Arc<super::Buffer>,
    /// Primitive range within the parent
    range: Range<usize>,
}

impl IndexSub {
    /// Builds a view of `range` (in primitives) within `parent`
    ///
    /// # Panics
    /// If `parent` is not an index buffer or the range is out of bounds
    pub fn new(parent: Arc<super::Buffer>, range: Range<usize>) -> Self {
        let ibo = parent.as_index().unwrap_or_else(|| {
            panic!("sub-range parent must be an index buffer")
        });
        assert!(range.end <= ibo.prim_len());
        Self { parent, range }
    }

    /// Returns the parent buffer
    pub fn parent(&self) -> &Arc<super::Buffer> {
        &self.parent
    }

    /// Returns the primitive range within the parent
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Returns the indices of this run
    pub fn indices(&self) -> &[u32] {
        match self.parent.as_index() {
            Some(ibo) => {
                let n = ibo.prim().verts_per_prim();
                &ibo.indices()[self.range.start * n..self.range.end * n]
            }
            None => &[],
        }
    }
}
