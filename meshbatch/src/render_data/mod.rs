//! Uniform read-only view over either mesh store
//!
//! A [`MeshRenderData`] is built once per extraction pass.  It picks the
//! backing representation, counts elements (including loose geometry), and
//! lazily materializes auxiliary arrays shared by every extractor in the pass.
//! Once published, auxiliary arrays are never mutated.
use std::{ops::Range, sync::OnceLock};

use bitflags::bitflags;
use log::debug;
use nalgebra::Vector3;

use crate::{
    config::RenderOptions,
    mesh::{
        AttrDomain, CustomData, EdgeId, EditMesh, ElemFlags, FaceId, LoopId,
        Mesh, MeshSource, MeshWrapper, ORIGINDEX_NONE, VertId,
    },
};

mod loose;
mod looptri;
mod normals;

pub use looptri::LoopTri;

/// Backing representation chosen for one pass
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExtractType {
    /// Iterate the editable mesh directly
    Editable,
    /// Iterate an evaluated stable mesh, resolving edit state through its
    /// origin indices
    EditableMapped,
    /// Iterate a stable mesh
    Stable,
}

bitflags! {
    /// Element kinds an extraction pass iterates
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct IterFlags: u8 {
        /// Loop triangles
        const LOOPTRI = 1 << 0;
        /// Polygons (and their loops)
        const POLY = 1 << 1;
        /// Loose edges
        const LEDGE = 1 << 2;
        /// Loose vertices
        const LVERT = 1 << 3;
    }
}

bitflags! {
    /// Auxiliary arrays an extraction pass needs precomputed
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DataFlags: u8 {
        /// Polygon normals
        const POLY_NOR = 1 << 0;
        /// Split loop normals (only materialized with auto-smooth)
        const LOOP_NOR = 1 << 1;
        /// Flat loop-triangle list
        const LOOPTRI = 1 << 2;
        /// Per-loop normals for tangent space, always materialized
        const TAN_LOOP_NOR = 1 << 3;
    }
}

/// Reference to the store that per-element callbacks iterate
#[derive(Copy, Clone)]
pub enum Store<'a> {
    /// The editable mesh
    Edit(&'a EditMesh),
    /// A stable mesh (plain or mapped)
    Mesh(&'a Mesh),
}

/// Read-only view over one mesh for the duration of an extraction pass
pub struct MeshRenderData<'a> {
    extract_type: ExtractType,
    /// Stable mesh read in [`ExtractType::Stable`] and
    /// [`ExtractType::EditableMapped`] modes; carries smoothing settings in
    /// every mode
    me: &'a Mesh,
    /// Live editable mesh, present in edit mode
    bm: Option<&'a EditMesh>,
    /// Deformed editable coordinates, with matching vertex and face normals
    deformed: Option<Deformed<'a>>,
    opts: RenderOptions,
    mat_len: usize,

    vert_len: usize,
    edge_len: usize,
    poly_len: usize,
    loop_len: usize,
    tri_len: usize,

    ledges: Vec<u32>,
    lverts: Vec<u32>,

    poly_normals: OnceLock<Vec<Vector3<f32>>>,
    loop_normals: OnceLock<Option<Vec<Vector3<f32>>>>,
    tan_loop_normals: OnceLock<Vec<Vector3<f32>>>,
    looptris: OnceLock<Vec<LoopTri>>,
}

/// Deformed coordinates of an editable mesh
struct Deformed<'a> {
    cos: &'a [Vector3<f32>],
    vert_normals: Vec<Vector3<f32>>,
    poly_normals: Vec<Vector3<f32>>,
}

impl<'a> MeshRenderData<'a> {
    /// Builds a view, choosing the representation and counting elements
    ///
    /// Loose geometry is only gathered if `iter` includes loose edges or
    /// loose vertices; otherwise both loose counts are zero.
    pub fn new(
        source: &'a MeshSource,
        opts: &RenderOptions,
        iter: IterFlags,
    ) -> Self {
        let (extract_type, me, bm) = select_representation(source, opts);
        let mut opts = *opts;
        opts.use_hide |= bm.is_some();

        let deformed = match (extract_type, &me.wrapper, bm) {
            (
                ExtractType::Editable,
                MeshWrapper::Edit {
                    vertex_cos: Some(cos),
                },
                Some(bm),
            ) => {
                if cos.len() == bm.vert_len() {
                    let (vert_normals, poly_normals) =
                        normals::deformed_normals(bm, cos);
                    Some(Deformed {
                        cos,
                        vert_normals,
                        poly_normals,
                    })
                } else {
                    debug!(
                        "ignoring {} deformed coordinates for {} vertices",
                        cos.len(),
                        bm.vert_len()
                    );
                    None
                }
            }
            _ => None,
        };

        let (vert_len, edge_len, poly_len, loop_len, tri_len) =
            match (extract_type, bm) {
                (ExtractType::Editable, Some(bm)) => (
                    bm.vert_len(),
                    bm.edge_len(),
                    bm.face_len(),
                    bm.loop_len(),
                    bm.tri_len(),
                ),
                _ => (
                    me.vert_len(),
                    me.edge_len(),
                    me.poly_len(),
                    me.loop_len(),
                    me.tri_len(),
                ),
            };

        let mut out = Self {
            extract_type,
            me,
            bm,
            deformed,
            opts,
            mat_len: source.mat_len(),
            vert_len,
            edge_len,
            poly_len,
            loop_len,
            tri_len,
            ledges: vec![],
            lverts: vec![],
            poly_normals: OnceLock::new(),
            loop_normals: OnceLock::new(),
            tan_loop_normals: OnceLock::new(),
            looptris: OnceLock::new(),
        };
        if iter.intersects(IterFlags::LEDGE | IterFlags::LVERT) {
            let (ledges, lverts) = match out.store() {
                Store::Edit(bm) => loose::edit_loose(bm),
                Store::Mesh(me) => loose::mesh_loose(me),
            };
            out.ledges = ledges;
            out.lverts = lverts;
        }
        out
    }

    /// Materializes the auxiliary arrays named by `flags`
    ///
    /// Arrays that are not requested here are still computed on first use.
    pub fn update_aux(&self, flags: DataFlags) {
        if flags.contains(DataFlags::POLY_NOR) {
            self.poly_normals();
        }
        if flags.contains(DataFlags::LOOP_NOR) {
            self.loop_normals();
        }
        if flags.contains(DataFlags::TAN_LOOP_NOR) {
            self.tan_loop_normals();
        }
        if flags.contains(DataFlags::LOOPTRI) {
            self.looptris();
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // Representation

    /// Returns the chosen representation
    pub fn extract_type(&self) -> ExtractType {
        self.extract_type
    }

    /// Returns the store that per-element callbacks iterate
    pub fn store(&self) -> Store<'a> {
        match (self.extract_type, self.bm) {
            (ExtractType::Editable, Some(bm)) => Store::Edit(bm),
            _ => Store::Mesh(self.me),
        }
    }

    /// Returns the stable mesh backing this view
    pub fn mesh(&self) -> &'a Mesh {
        self.me
    }

    /// Returns the live editable mesh, if the object is in edit mode
    pub fn bm(&self) -> Option<&'a EditMesh> {
        self.bm
    }

    /// Returns the request options (with `use_hide` forced on in edit mode)
    pub fn opts(&self) -> &RenderOptions {
        &self.opts
    }

    /// Checks whether hidden elements are skipped
    pub fn use_hide(&self) -> bool {
        self.opts.use_hide
    }

    /// Number of material slots
    pub fn mat_len(&self) -> usize {
        self.mat_len
    }

    ////////////////////////////////////////////////////////////////////////////
    // Counts

    /// Number of vertices
    pub fn vert_len(&self) -> usize {
        self.vert_len
    }
    /// Number of edges
    pub fn edge_len(&self) -> usize {
        self.edge_len
    }
    /// Number of polygons
    pub fn poly_len(&self) -> usize {
        self.poly_len
    }
    /// Number of polygon loops
    pub fn loop_len(&self) -> usize {
        self.loop_len
    }
    /// Number of loop triangles
    pub fn tri_len(&self) -> usize {
        self.tri_len
    }
    /// Number of loose edges
    pub fn ledge_len(&self) -> usize {
        self.ledges.len()
    }
    /// Number of loose vertices
    pub fn lvert_len(&self) -> usize {
        self.lverts.len()
    }

    /// Length of every per-loop buffer
    ///
    /// Polygon loops come first, then two entries per loose edge, then one
    /// entry per loose vertex.
    pub fn loop_len_total(&self) -> usize {
        self.loop_len + 2 * self.ledge_len() + self.lvert_len()
    }

    /// Index of the first loose-edge entry in per-loop buffers
    pub fn ledge_loop_start(&self) -> usize {
        self.loop_len
    }

    /// Index of the first loose-vertex entry in per-loop buffers
    pub fn lvert_loop_start(&self) -> usize {
        self.loop_len + 2 * self.ledge_len()
    }

    /// Returns the number of elements of the given iteration kind
    ///
    /// # Panics
    /// If `kind` is not exactly one flag
    pub fn iter_len(&self, kind: IterFlags) -> usize {
        match kind {
            IterFlags::LOOPTRI => self.tri_len,
            IterFlags::POLY => self.poly_len,
            IterFlags::LEDGE => self.ledge_len(),
            IterFlags::LVERT => self.lvert_len(),
            _ => panic!("invalid iteration kind {kind:?}"),
        }
    }

    /// Indices of loose edges
    pub fn ledges(&self) -> &[u32] {
        &self.ledges
    }

    /// Indices of loose vertices
    pub fn lverts(&self) -> &[u32] {
        &self.lverts
    }

    ////////////////////////////////////////////////////////////////////////////
    // Topology

    /// First loop of polygon `p`; `p == poly_len` returns `loop_len`
    pub fn poly_loop_start(&self, p: usize) -> usize {
        if p == self.poly_len {
            return self.loop_len;
        }
        match self.store() {
            Store::Edit(bm) => bm.face(FaceId::new(p)).l_first.index(),
            Store::Mesh(me) => me.polys[p].loopstart as usize,
        }
    }

    /// Loop range of polygon `p`
    pub fn poly_loops(&self, p: usize) -> Range<usize> {
        match self.store() {
            Store::Edit(bm) => {
                let f = bm.face(FaceId::new(p));
                let start = f.l_first.index();
                start..start + f.len as usize
            }
            Store::Mesh(me) => {
                let mp = &me.polys[p];
                let start = mp.loopstart as usize;
                start..start + mp.totloop as usize
            }
        }
    }

    /// Vertex of loop `l`
    pub fn loop_vert(&self, l: usize) -> usize {
        match self.store() {
            Store::Edit(bm) => bm.loop_(LoopId::new(l)).v.index(),
            Store::Mesh(me) => me.loops[l].v as usize,
        }
    }

    /// Edge leaving loop `l`
    pub fn loop_edge(&self, l: usize) -> usize {
        match self.store() {
            Store::Edit(bm) => bm.loop_(LoopId::new(l)).e.index(),
            Store::Mesh(me) => me.loops[l].e as usize,
        }
    }

    /// Endpoints of edge `e`
    pub fn edge_verts(&self, e: usize) -> [usize; 2] {
        match self.store() {
            Store::Edit(bm) => bm.edge(EdgeId::new(e)).v.map(|v| v.index()),
            Store::Mesh(me) => me.edges[e].v.map(|v| v as usize),
        }
    }

    /// Material slot of polygon `p`
    pub fn poly_mat(&self, p: usize) -> usize {
        match self.store() {
            Store::Edit(bm) => bm.face(FaceId::new(p)).mat as usize,
            Store::Mesh(me) => me.polys[p].mat as usize,
        }
    }

    /// Flags of polygon `p` in the iterated store
    pub fn poly_flag(&self, p: usize) -> ElemFlags {
        match self.store() {
            Store::Edit(bm) => bm.face(FaceId::new(p)).flag,
            Store::Mesh(me) => me.polys[p].flag,
        }
    }

    /// Flags of edge `e` in the iterated store
    pub fn edge_flag(&self, e: usize) -> ElemFlags {
        match self.store() {
            Store::Edit(bm) => bm.edge(EdgeId::new(e)).flag,
            Store::Mesh(me) => me.edges[e].flag,
        }
    }

    /// Flags of vertex `v` in the iterated store
    pub fn vert_flag(&self, v: usize) -> ElemFlags {
        match self.store() {
            Store::Edit(bm) => bm.vert(VertId::new(v)).flag,
            Store::Mesh(me) => me.verts[v].flag,
        }
    }

    /// Checks whether polygon `p` is hidden from the triangle list
    ///
    /// Unmapped polygons are still drawn as triangles; use
    /// [`MeshRenderData::is_unmapped`] to skip them elsewhere.
    pub fn poly_hidden(&self, p: usize) -> bool {
        self.use_hide() && self.poly_flag(p).contains(ElemFlags::HIDDEN)
    }

    /// Checks whether edge `e` is skipped by index buffers
    pub fn edge_hidden(&self, e: usize) -> bool {
        (self.use_hide() && self.edge_flag(e).contains(ElemFlags::HIDDEN))
            || self.is_unmapped(AttrDomain::Edge, e)
    }

    /// Checks whether vertex `v` is skipped by index buffers
    pub fn vert_hidden(&self, v: usize) -> bool {
        (self.use_hide() && self.vert_flag(v).contains(ElemFlags::HIDDEN))
            || self.is_unmapped(AttrDomain::Vert, v)
    }

    /// Custom layers of a domain in the iterated store
    pub fn cdata(&self, domain: AttrDomain) -> &'a CustomData {
        match self.store() {
            Store::Edit(bm) => match domain {
                AttrDomain::Vert => &bm.vdata,
                AttrDomain::Edge => &bm.edata,
                AttrDomain::Poly => &bm.pdata,
                AttrDomain::Loop => &bm.ldata,
            },
            Store::Mesh(me) => me.data(domain),
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // Geometry

    /// Position of vertex `v`
    pub fn vert_co(&self, v: usize) -> Vector3<f32> {
        match self.store() {
            Store::Edit(bm) => match &self.deformed {
                Some(d) => d.cos[v],
                None => bm.vert(VertId::new(v)).co,
            },
            Store::Mesh(me) => me.verts[v].co,
        }
    }

    /// Normal of vertex `v`
    pub fn vert_normal(&self, v: usize) -> Vector3<f32> {
        match self.store() {
            Store::Edit(bm) => match &self.deformed {
                Some(d) => d.vert_normals[v],
                None => bm.vert(VertId::new(v)).no,
            },
            Store::Mesh(me) => me.verts[v].no,
        }
    }

    /// Normal of polygon `p`
    pub fn poly_normal(&self, p: usize) -> Vector3<f32> {
        self.poly_normals()[p]
    }

    /// Polygon normals, computed on first use
    pub fn poly_normals(&self) -> &[Vector3<f32>] {
        self.poly_normals.get_or_init(|| match self.store() {
            Store::Edit(bm) => match &self.deformed {
                Some(d) => d.poly_normals.clone(),
                None => (0..bm.face_len())
                    .map(|f| bm.face(FaceId::new(f)).no)
                    .collect(),
            },
            Store::Mesh(me) => {
                (0..me.poly_len()).map(|p| me.poly_normal(p)).collect()
            }
        })
    }

    /// Split loop normals, or `None` when auto-smooth is disabled
    ///
    /// Without auto-smooth, [`MeshRenderData::corner_normal`] derives
    /// per-loop normals from polygon flags instead.
    pub fn loop_normals(&self) -> Option<&[Vector3<f32>]> {
        self.loop_normals
            .get_or_init(|| {
                self.me.auto_smooth.then(|| {
                    let split = self.me.smooth_angle;
                    normals::split_normals(self, split)
                })
            })
            .as_deref()
    }

    /// Per-loop normals for tangent computation, computed on first use
    pub fn tan_loop_normals(&self) -> &[Vector3<f32>] {
        self.tan_loop_normals.get_or_init(|| match self.loop_normals() {
            Some(n) => n.to_vec(),
            None => (0..self.poly_len)
                .flat_map(|p| self.poly_loops(p).map(move |l| (p, l)))
                .map(|(p, l)| self.corner_normal(p, l))
                .collect(),
        })
    }

    /// Shading normal of loop `l` in polygon `p`
    ///
    /// This is the split normal when available; otherwise the vertex normal
    /// for smooth polygons and the polygon normal for flat ones.
    pub fn corner_normal(&self, p: usize, l: usize) -> Vector3<f32> {
        if let Some(n) = self.loop_normals() {
            n[l]
        } else if self.poly_flag(p).contains(ElemFlags::SMOOTH) {
            self.vert_normal(self.loop_vert(l))
        } else {
            self.poly_normal(p)
        }
    }

    /// Loop triangle `i`
    pub fn looptri(&self, i: usize) -> LoopTri {
        match self.store() {
            Store::Edit(bm) => LoopTri::from_edit(bm, i),
            Store::Mesh(..) => self.looptris()[i],
        }
    }

    /// Loop triangles of the stable mesh, computed on first use
    ///
    /// This is empty in [`ExtractType::Editable`] mode, where the editable
    /// mesh maintains its own triangulation.
    pub fn looptris(&self) -> &[LoopTri] {
        self.looptris.get_or_init(|| match self.store() {
            Store::Edit(..) => vec![],
            Store::Mesh(me) => looptri::mesh_looptris(me),
        })
    }

    ////////////////////////////////////////////////////////////////////////////
    // Origin lookups

    /// Editable vertex corresponding to stable vertex `v`
    pub fn orig_vert(&self, v: usize) -> Option<VertId> {
        let bm = self.bm?;
        orig(self.me.origindex.vert.as_deref(), v, bm.vert_len())
            .map(VertId::new)
    }

    /// Editable edge corresponding to stable edge `e`
    pub fn orig_edge(&self, e: usize) -> Option<EdgeId> {
        let bm = self.bm?;
        orig(self.me.origindex.edge.as_deref(), e, bm.edge_len())
            .map(EdgeId::new)
    }

    /// Editable face corresponding to stable polygon `p`
    pub fn orig_face(&self, p: usize) -> Option<FaceId> {
        let bm = self.bm?;
        orig(self.me.origindex.poly.as_deref(), p, bm.face_len())
            .map(FaceId::new)
    }

    /// Checks whether element `i` has no original counterpart
    ///
    /// Only [`ExtractType::EditableMapped`] views have unmapped elements.
    pub fn is_unmapped(&self, domain: AttrDomain, i: usize) -> bool {
        if self.extract_type != ExtractType::EditableMapped {
            return false;
        }
        let index = match domain {
            AttrDomain::Vert => self.me.origindex.vert.as_deref(),
            AttrDomain::Edge => self.me.origindex.edge.as_deref(),
            AttrDomain::Poly => self.me.origindex.poly.as_deref(),
            AttrDomain::Loop => None,
        };
        index.is_some_and(|o| o[i] == ORIGINDEX_NONE)
    }

    /// Editing state of vertex `v`
    ///
    /// In mapped mode this reads the original editable vertex, returning
    /// `None` if there is none; otherwise it reads the iterated store.
    pub fn vert_state(&self, v: usize) -> Option<ElemFlags> {
        match (self.store(), self.extract_type, self.bm) {
            (Store::Edit(bm), ..) => Some(bm.vert(VertId::new(v)).flag),
            (Store::Mesh(..), ExtractType::EditableMapped, Some(bm)) => {
                self.orig_vert(v).map(|o| bm.vert(o).flag)
            }
            (Store::Mesh(me), ..) => (!self.is_unmapped(AttrDomain::Vert, v))
                .then(|| me.verts[v].flag),
        }
    }

    /// Editing state of edge `e`, with the same rules as
    /// [`MeshRenderData::vert_state`]
    pub fn edge_state(&self, e: usize) -> Option<ElemFlags> {
        match (self.store(), self.extract_type, self.bm) {
            (Store::Edit(bm), ..) => Some(bm.edge(EdgeId::new(e)).flag),
            (Store::Mesh(..), ExtractType::EditableMapped, Some(bm)) => {
                self.orig_edge(e).map(|o| bm.edge(o).flag)
            }
            (Store::Mesh(me), ..) => (!self.is_unmapped(AttrDomain::Edge, e))
                .then(|| me.edges[e].flag),
        }
    }

    /// Editing state of polygon `p`, with the same rules as
    /// [`MeshRenderData::vert_state`]
    pub fn face_state(&self, p: usize) -> Option<ElemFlags> {
        match (self.store(), self.extract_type, self.bm) {
            (Store::Edit(bm), ..) => Some(bm.face(FaceId::new(p)).flag),
            (Store::Mesh(..), ExtractType::EditableMapped, Some(bm)) => {
                self.orig_face(p).map(|o| bm.face(o).flag)
            }
            (Store::Mesh(me), ..) => (!self.is_unmapped(AttrDomain::Poly, p))
                .then(|| me.polys[p].flag),
        }
    }

    /// Editable vertex whose state vertex `v` displays, if any
    fn edit_vert(&self, v: usize) -> Option<VertId> {
        match (self.store(), self.extract_type) {
            (Store::Edit(..), _) => Some(VertId::new(v)),
            (_, ExtractType::EditableMapped) => self.orig_vert(v),
            _ => None,
        }
    }

    /// Editable edge whose state edge `e` displays, if any
    pub fn edit_edge(&self, e: usize) -> Option<EdgeId> {
        match (self.store(), self.extract_type) {
            (Store::Edit(..), _) => Some(EdgeId::new(e)),
            (_, ExtractType::EditableMapped) => self.orig_edge(e),
            _ => None,
        }
    }

    /// Editable face whose state polygon `p` displays, if any
    pub fn edit_face(&self, p: usize) -> Option<FaceId> {
        match (self.store(), self.extract_type) {
            (Store::Edit(..), _) => Some(FaceId::new(p)),
            (_, ExtractType::EditableMapped) => self.orig_face(p),
            _ => None,
        }
    }

    /// Checks whether vertex `v` displays the active vertex
    pub fn is_active_vert(&self, v: usize) -> bool {
        let active = self.bm.and_then(|bm| bm.active_vert());
        active.is_some() && self.edit_vert(v) == active
    }

    /// Checks whether edge `e` displays the active edge
    pub fn is_active_edge(&self, e: usize) -> bool {
        let active = self.bm.and_then(|bm| bm.active_edge());
        active.is_some() && self.edit_edge(e) == active
    }

    /// Checks whether polygon `p` displays the active face
    pub fn is_active_face(&self, p: usize) -> bool {
        let active = self.bm.and_then(|bm| bm.active_face());
        active.is_some() && self.edit_face(p) == active
    }

    /// Original index of element `i`, for selection-id buffers
    ///
    /// Without an origin-index array, this is `i` itself; unmapped elements
    /// return `u32::MAX`.
    pub fn orig_index(&self, domain: AttrDomain, i: usize) -> u32 {
        let index = match (self.store(), domain) {
            (Store::Edit(..), _) | (_, AttrDomain::Loop) => None,
            (Store::Mesh(me), AttrDomain::Vert) => me.origindex.vert.as_deref(),
            (Store::Mesh(me), AttrDomain::Edge) => me.origindex.edge.as_deref(),
            (Store::Mesh(me), AttrDomain::Poly) => me.origindex.poly.as_deref(),
        };
        match index {
            Some(o) => o[i] as u32,
            None => i as u32,
        }
    }
}

/// Resolves an origin index, rejecting missing or out-of-range entries
fn orig(index: Option<&[i32]>, i: usize, len: usize) -> Option<usize> {
    let o = *index?.get(i)?;
    (o != ORIGINDEX_NONE && (o as usize) < len).then_some(o as usize)
}

/// Picks the representation and the stores it reads
fn select_representation<'a>(
    source: &'a MeshSource,
    opts: &RenderOptions,
) -> (ExtractType, &'a Mesh, Option<&'a EditMesh>) {
    let Some(edit) = &source.edit else {
        let me = &*source.mesh;
        let mapped = opts.paint_mode && !me.is_original && me.origindex.any();
        let t = if mapped {
            ExtractType::EditableMapped
        } else {
            ExtractType::Stable
        };
        return (t, me, None);
    };

    let me = if opts.prefer_final {
        &*edit.eval_final
    } else {
        &*edit.cage
    };
    let has_mdata = matches!(me.wrapper, MeshWrapper::Data);
    let mapped = has_mdata
        && !opts.uv_edit
        && !me.is_original
        && me.origindex.any();
    let mut t = if mapped {
        ExtractType::EditableMapped
    } else {
        ExtractType::Editable
    };

    // The final mesh does not carry origin indices that agree with the cage
    if has_mdata
        && opts.prefer_final
        && !std::sync::Arc::ptr_eq(&edit.eval_final, &edit.cage)
    {
        debug!("final mesh differs from cage; extracting {t:?} as Stable");
        t = ExtractType::Stable;
    }
    (t, me, Some(&*edit.bm))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::{MeshBuilder, MeshSource};
    use std::sync::Arc;

    /// A 2x1 grid of quads with a loose edge and a loose vertex
    fn grid_with_loose() -> Mesh {
        let mut b = MeshBuilder::new();
        let v: Vec<_> = (0..6)
            .map(|i| b.vert([(i % 3) as f32, (i / 3) as f32, 0.0]))
            .collect();
        b.poly(&[v[0], v[1], v[4], v[3]]);
        b.poly(&[v[1], v[2], v[5], v[4]]);
        let a = b.vert([5.0, 0.0, 0.0]);
        let c = b.vert([6.0, 0.0, 0.0]);
        b.edge(a, c);
        b.vert([8.0, 0.0, 0.0]);
        b.build().unwrap()
    }

    #[test]
    fn stable_counts() {
        let src = MeshSource::object(grid_with_loose());
        let opts = RenderOptions::default();
        let mr = MeshRenderData::new(&src, &opts, IterFlags::all());
        assert_eq!(mr.extract_type(), ExtractType::Stable);
        assert_eq!(mr.poly_len(), 2);
        assert_eq!(mr.loop_len(), 8);
        assert_eq!(mr.tri_len(), 4);
        assert_eq!(mr.ledge_len(), 1);
        assert_eq!(mr.lvert_len(), 1);
        assert_eq!(mr.loop_len_total(), 8 + 2 + 1);
        assert_eq!(mr.poly_loop_start(1), 4);
        assert_eq!(mr.poly_loop_start(2), 8);

        // Loose geometry is skipped unless requested
        let mr = MeshRenderData::new(&src, &opts, IterFlags::POLY);
        assert_eq!(mr.ledge_len(), 0);
        assert_eq!(mr.loop_len_total(), 8);
    }

    #[test]
    fn editable_matches_stable() {
        let me = grid_with_loose();
        let stable = MeshSource::object(me.clone());
        let edit = MeshSource::edit(EditMesh::from_mesh(&me));
        let opts = RenderOptions::default();
        let a = MeshRenderData::new(&stable, &opts, IterFlags::all());
        let b = MeshRenderData::new(&edit, &opts, IterFlags::all());
        assert_eq!(b.extract_type(), ExtractType::Editable);
        assert!(b.use_hide());
        assert_eq!(a.tri_len(), b.tri_len());
        assert_eq!(a.loop_len_total(), b.loop_len_total());
        assert_eq!(a.ledges(), b.ledges());
        assert_eq!(a.lverts(), b.lverts());
        for i in 0..a.tri_len() {
            assert_eq!(a.looptri(i), b.looptri(i));
        }
        for p in 0..a.poly_len() {
            approx::assert_relative_eq!(a.poly_normal(p), b.poly_normal(p));
        }
    }

    #[test]
    fn mapped_selection() {
        let me = grid_with_loose();
        let bm = EditMesh::from_mesh(&me);
        let mut cage = me.clone();
        cage.is_original = false;
        let mut poly_index = vec![0, ORIGINDEX_NONE];
        cage.set_origindex(AttrDomain::Poly, poly_index.clone()).unwrap();
        let cage = Arc::new(cage);

        let src =
            MeshSource::edit_evaluated(bm.clone(), cage.clone(), cage.clone());
        let opts = RenderOptions::default();
        let mr = MeshRenderData::new(&src, &opts, IterFlags::POLY);
        assert_eq!(mr.extract_type(), ExtractType::EditableMapped);
        assert_eq!(mr.orig_face(0), Some(FaceId::new(0)));
        assert_eq!(mr.orig_face(1), None);
        assert_eq!(mr.orig_vert(0), None);
        assert!(mr.is_unmapped(AttrDomain::Poly, 1));
        assert_eq!(mr.orig_index(AttrDomain::Poly, 1), u32::MAX);

        // UV editing disables mapping
        let opts = RenderOptions {
            uv_edit: true,
            ..opts
        };
        let mr = MeshRenderData::new(&src, &opts, IterFlags::POLY);
        assert_eq!(mr.extract_type(), ExtractType::Editable);

        // A final mesh that differs from the cage downgrades to Stable
        let mut fin = (*cage).clone();
        poly_index[1] = 1;
        fin.set_origindex(AttrDomain::Poly, poly_index).unwrap();
        let src = MeshSource::edit_evaluated(bm, cage, Arc::new(fin));
        let opts = RenderOptions {
            prefer_final: true,
            ..RenderOptions::default()
        };
        let mr = MeshRenderData::new(&src, &opts, IterFlags::POLY);
        assert_eq!(mr.extract_type(), ExtractType::Stable);
        assert_eq!(mr.orig_face(1), Some(FaceId::new(1)));
    }

    #[test]
    fn paint_mode_mapping() {
        let mut me = grid_with_loose();
        me.is_original = false;
        let index = (0..me.vert_len() as i32).collect();
        me.set_origindex(AttrDomain::Vert, index).unwrap();
        let src = MeshSource::object(me);
        let opts = RenderOptions::default();
        let mr = MeshRenderData::new(&src, &opts, IterFlags::POLY);
        assert_eq!(mr.extract_type(), ExtractType::Stable);
        let opts = RenderOptions {
            paint_mode: true,
            ..opts
        };
        let mr = MeshRenderData::new(&src, &opts, IterFlags::POLY);
        assert_eq!(mr.extract_type(), ExtractType::EditableMapped);
        assert!(!mr.use_hide());
    }
}
