//! Index buffers over the per-loop vertex layout
use std::{
    ops::Range,
    sync::atomic::{AtomicBool, Ordering},
};

use log::trace;
use rustc_hash::FxHashMap;

use super::{Callbacks, Extract, IterPair, index_buf};
use crate::{
    buffer::{Buffer, IndexBuf, PrimType, RESTART_INDEX, Window},
    mesh::{AttrDomain, EditMesh, ElemFlags, Mesh},
    render_data::{DataFlags, MeshRenderData},
};

/// Triangle list, grouped by material
///
/// Triangles of material 0 come first, then material 1, and so on; within a
/// material, triangles keep polygon order.  Hidden polygons are left out
/// entirely, so the buffer holds exactly the visible triangles.
pub struct Tris;

/// Placement of every polygon's triangles in the sorted list
pub struct TrisData {
    /// First destination triangle of each polygon, or `u32::MAX` if hidden
    first: Vec<u32>,
    /// Triangle range of each material
    mats: Vec<Range<usize>>,
}

impl Tris {
    fn looptri<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        data: &TrisData,
        w: &mut Window<'_, u32>,
    ) {
        for i in r {
            let t = mr.looptri(i);
            let p = t.poly as usize;
            let first = data.first[p];
            if first == u32::MAX {
                continue;
            }
            // Index of this triangle within its polygon
            let k = i - (mr.poly_loop_start(p) - 2 * p);
            let dst = (first as usize + k) * 3;
            w.slice_mut(dst..dst + 3).copy_from_slice(&t.tri);
        }
    }
}

impl Extract for Tris {
    type Data = TrisData;
    type Elem = u32;

    const NAME: &'static str = "tris";
    const DATA_FLAGS: DataFlags = DataFlags::LOOPTRI;
    const CALLBACKS: Callbacks<Self> = Callbacks {
        looptri: Some(IterPair {
            edit: Self::looptri::<EditMesh>,
            mesh: Self::looptri::<Mesh>,
        }),
        ..Callbacks::NONE
    };

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, TrisData) {
        let mat_len = mr.mat_len().max(1);
        let mat = |p: usize| mr.poly_mat(p).min(mat_len - 1);
        let tri_count = |p: usize| mr.poly_loops(p).len() - 2;

        let mut counts = vec![0; mat_len];
        for p in (0..mr.poly_len()).filter(|&p| !mr.poly_hidden(p)) {
            counts[mat(p)] += tri_count(p);
        }
        let mut mats = Vec::with_capacity(mat_len);
        let mut start = 0;
        for c in counts {
            mats.push(start..start + c);
            start += c;
        }

        let mut next: Vec<usize> = mats.iter().map(|r| r.start).collect();
        let first = (0..mr.poly_len())
            .map(|p| {
                if mr.poly_hidden(p) {
                    u32::MAX
                } else {
                    let m = mat(p);
                    let out = next[m];
                    next[m] += tri_count(p);
                    out as u32
                }
            })
            .collect();

        let ibo = IndexBuf::new(PrimType::Tris, start, mr.loop_len_total());
        (Buffer::Index(ibo), TrisData { first, mats })
    }

    fn finish(&self, _: &MeshRenderData<'_>, buf: &mut Buffer, data: &TrisData) {
        let ibo = index_buf(Self::NAME, buf);
        ibo.set_subranges(data.mats.clone());
        ibo.build_in_place();
        trace!("tris: {} triangles in {} materials", ibo.prim_len(), data.mats.len());
    }
}

////////////////////////////////////////////////////////////////////////////////

/// One line per edge, in edge order, followed by one line per loose edge
///
/// A polygon edge's line joins the loop that owns it to the next loop of
/// the same polygon.  Loose edges join their two entries in the loose tail of
/// the per-loop layout.  The loose run is recorded as a sub-range, which the
/// cache exposes as a separate buffer.
pub struct Lines;

impl Lines {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, u32>,
    ) {
        for p in r {
            let loops = mr.poly_loops(p);
            for l in loops.clone() {
                let e = mr.loop_edge(l);
                let next = if l + 1 == loops.end { loops.start } else { l + 1 };
                let line = if mr.edge_hidden(e) {
                    [RESTART_INDEX; 2]
                } else {
                    [l as u32, next as u32]
                };
                w.slice_mut(2 * e..2 * e + 2).copy_from_slice(&line);
            }
        }
    }

    fn ledge<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, u32>,
    ) {
        let start = mr.ledge_loop_start();
        for i in r {
            let e = mr.ledges()[i] as usize;
            let slot = 2 * (mr.edge_len() + i);
            let line = if mr.edge_hidden(e) {
                [RESTART_INDEX; 2]
            } else {
                let l = (start + 2 * i) as u32;
                [l, l + 1]
            };
            w.slice_mut(slot..slot + 2).copy_from_slice(&line);
        }
    }
}

impl Extract for Lines {
    type Data = ();
    type Elem = u32;

    const NAME: &'static str = "lines";
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

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, ()) {
        let ibo = IndexBuf::new(
            PrimType::Lines,
            mr.edge_len() + mr.ledge_len(),
            mr.loop_len_total(),
        );
        (Buffer::Index(ibo), ())
    }

    fn finish(&self, mr: &MeshRenderData<'_>, buf: &mut Buffer, _: &()) {
        let ibo = index_buf(Self::NAME, buf);
        let start = mr.edge_len();
        ibo.set_subranges(vec![start..start + mr.ledge_len()]);
        ibo.build_in_place();
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Edge outlines of the face selection, for paint modes with face masking
///
/// Like [`Lines`], each edge has its own slot and joins two loops of a
/// polygon that uses it.  Edges shared by two selected polygons are left
/// out, so a selected region shows only its boundary; otherwise a selected
/// polygon's loops take precedence over unselected ones.
pub struct LinesPaintMask;

impl LinesPaintMask {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        claimed: &Vec<AtomicBool>,
        w: &mut Window<'_, u32>,
    ) {
        for p in r {
            let selected = mr.poly_flag(p).contains(ElemFlags::SELECT);
            let loops = mr.poly_loops(p);
            for l in loops.clone() {
                let e = mr.loop_edge(l);
                let slot = 2 * e..2 * e + 2;
                if mr.edge_hidden(e) {
                    w.slice_mut(slot).fill(RESTART_INDEX);
                    continue;
                }
                let next = if l + 1 == loops.end { loops.start } else { l + 1 };
                let line = [l as u32, next as u32];
                if selected {
                    if claimed[e].swap(true, Ordering::Relaxed) {
                        w.slice_mut(slot).fill(RESTART_INDEX);
                    } else {
                        w.slice_mut(slot).copy_from_slice(&line);
                    }
                } else if !claimed[e].load(Ordering::Relaxed) {
                    w.slice_mut(slot).copy_from_slice(&line);
                }
            }
        }
    }
}

impl Extract for LinesPaintMask {
    /// Edges already drawn from a selected polygon
    type Data = Vec<AtomicBool>;
    type Elem = u32;

    const NAME: &'static str = "lines_paint_mask";
    const CALLBACKS: Callbacks<Self> = Callbacks {
        poly: Some(IterPair {
            edit: Self::poly::<EditMesh>,
            mesh: Self::poly::<Mesh>,
        }),
        ..Callbacks::NONE
    };

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, Vec<AtomicBool>) {
        let ibo =
            IndexBuf::new(PrimType::Lines, mr.edge_len(), mr.loop_len_total());
        let claimed = (0..mr.edge_len()).map(|_| AtomicBool::new(false));
        (Buffer::Index(ibo), claimed.collect())
    }

    fn finish(
        &self,
        _: &MeshRenderData<'_>,
        buf: &mut Buffer,
        _: &Vec<AtomicBool>,
    ) {
        index_buf(Self::NAME, buf).build_in_place();
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Lines with adjacency over the visible loop triangles
///
/// Every edge of the triangulation becomes one [`PrimType::LinesAdj`]
/// primitive `[opposite, a, b, other opposite]`, where the opposite corners
/// belong to the two triangles sharing the edge.  An edge with only one
/// triangle, or whose two triangles disagree on winding, repeats its own
/// opposite corner instead; see [`LinesAdjacency::is_manifold`].
///
/// Pairing needs every triangle at once, so the buffer is built in the
/// finish step.
pub struct LinesAdjacency;

/// Triangle edge still waiting for a second triangle
struct OpenEdge {
    /// Loop opposite the edge
    opposite: u32,
    /// Loops at the edge's endpoints, in triangle order
    ends: [u32; 2],
    /// The edge runs from its larger vertex index to its smaller one
    flipped: bool,
}

impl LinesAdjacency {
    /// Checks whether a finished buffer describes a closed, consistently
    /// wound surface
    pub fn is_manifold(ibo: &IndexBuf) -> bool {
        ibo.prims().all(|p| p[0] != p[3])
    }

    fn build(mr: &MeshRenderData<'_>) -> Vec<[u32; 4]> {
        let tess_edge_len = mr.loop_len() + mr.tri_len() - mr.poly_len();
        let mut out = Vec::with_capacity(tess_edge_len);
        let mut open: FxHashMap<(usize, usize), OpenEdge> = FxHashMap::default();
        // Keys in first-seen order, so that the output is deterministic
        let mut seen = vec![];

        for i in 0..mr.tri_len() {
            let t = mr.looptri(i);
            if mr.poly_hidden(t.poly as usize) {
                continue;
            }
            let l = t.tri;
            let v = l.map(|l| mr.loop_vert(l as usize));
            for k in 0..3 {
                let (o, a, b) = (k, (k + 1) % 3, (k + 2) % 3);
                let key = (v[a].min(v[b]), v[a].max(v[b]));
                let flipped = v[a] > v[b];
                match open.remove(&key) {
                    None => {
                        open.insert(
                            key,
                            OpenEdge {
                                opposite: l[o],
                                ends: [l[a], l[b]],
                                flipped,
                            },
                        );
                        seen.push(key);
                    }
                    Some(e) if e.flipped == flipped => {
                        out.push([l[o], l[a], l[b], l[o]]);
                        out.push([e.opposite, l[a], l[b], e.opposite]);
                    }
                    Some(e) => out.push([l[o], l[a], l[b], e.opposite]),
                }
            }
        }
        for key in seen {
            if let Some(e) = open.remove(&key) {
                let [a, b] = e.ends;
                out.push([e.opposite, a, b, e.opposite]);
            }
        }
        out
    }
}

impl Extract for LinesAdjacency {
    type Data = ();
    type Elem = u32;

    const NAME: &'static str = "lines_adjacency";
    const DATA_FLAGS: DataFlags = DataFlags::LOOPTRI;

    fn init(&self, mr: &MeshRenderData<'_>) -> (Buffer, ()) {
        let ibo = IndexBuf::new(PrimType::LinesAdj, 0, mr.loop_len_total());
        (Buffer::Index(ibo), ())
    }

    fn finish(&self, mr: &MeshRenderData<'_>, buf: &mut Buffer, _: &()) {
        let prims = Self::build(mr);
        let ibo = index_buf(Self::NAME, buf);
        ibo.indices_vec_mut().extend(prims.into_iter().flatten());
        ibo.build_in_place();
        trace!(
            "lines_adjacency: {} lines, manifold: {}",
            ibo.prim_len(),
            Self::is_manifold(ibo)
        );
    }
}

////////////////////////////////////////////////////////////////////////////////

/// One point per vertex
///
/// Each vertex points at one of the per-loop entries that displays it; when
/// several do, the last one written wins.
pub struct Points;

impl Points {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, u32>,
    ) {
        for p in r {
            for l in mr.poly_loops(p) {
                let v = mr.loop_vert(l);
                w[v] = point(mr, v, l);
            }
        }
    }

    fn ledge<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, u32>,
    ) {
        let start = mr.ledge_loop_start();
        for i in r {
            let [a, b] = mr.edge_verts(mr.ledges()[i] as usize);
            w[a] = point(mr, a, start + 2 * i);
            w[b] = point(mr, b, start + 2 * i + 1);
        }
    }

    fn lvert<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, u32>,
    ) {
        let start = mr.lvert_loop_start();
        for i in r {
            let v = mr.lverts()[i] as usize;
            w[v] = point(mr, v, start + i);
        }
    }
}

/// Index for vertex `v` displayed by loop entry `l`
fn point(mr: &MeshRenderData<'_>, v: usize, l: usize) -> u32 {
    if mr.vert_hidden(v) {
        RESTART_INDEX
    } else {
        l as u32
    }
}

impl Extract for Points {
    type Data = ();
    type Elem = u32;

    const NAME: &'static str = "points";
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
        let ibo =
            IndexBuf::new(PrimType::Points, mr.vert_len(), mr.loop_len_total());
        (Buffer::Index(ibo), ())
    }

    fn finish(&self, _: &MeshRenderData<'_>, buf: &mut Buffer, _: &()) {
        index_buf(Self::NAME, buf).build_in_place();
    }
}

////////////////////////////////////////////////////////////////////////////////

/// One point per polygon, indexing the per-polygon buffers
pub struct Fdots;

impl Fdots {
    fn poly<S>(
        &self,
        mr: &MeshRenderData<'_>,
        _: &S,
        r: Range<usize>,
        _: &(),
        w: &mut Window<'_, u32>,
    ) {
        for p in r {
            let hidden =
                mr.poly_hidden(p) || mr.is_unmapped(AttrDomain::Poly, p);
            w[p] = if hidden { RESTART_INDEX } else { p as u32 };
        }
    }
}

impl Extract for Fdots {
    type Data = ();
    type Elem = u32;

    const NAME: &'static str = "fdots";
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
        index_buf(Self::NAME, buf).build_in_place();
    }
}
