//! Half-edge / radial-loop mesh store used while editing
//!
//! Elements live in dense arenas and are addressed by strongly-typed ids.
//! Around each vertex, incident edges form a circular **disk** list; around
//! each edge, the loops (polygon corners) using it form a circular **radial**
//! list.  Elements are never removed, so ids stay dense and a face's loops
//! always occupy a contiguous run of loop ids, in face order.
use nalgebra::Vector3;

use super::{
    AttrDomain, CustomData, ElemFlags, LayerData, LayerOffset, LayerType,
    Mesh,
};
use crate::Error;

macro_rules! id_type {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Builds an id from a table index
            pub fn new(i: usize) -> Self {
                Self(i as u32)
            }
            /// Returns the table index of this element
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

id_type!(VertId, "Handle to a vertex in an [`EditMesh`]");
id_type!(EdgeId, "Handle to an edge in an [`EditMesh`]");
id_type!(LoopId, "Handle to a loop (polygon corner) in an [`EditMesh`]");
id_type!(FaceId, "Handle to a face in an [`EditMesh`]");

/// Links of one edge within the disk cycle of one of its vertices
#[derive(Copy, Clone, Debug)]
struct Disk {
    next: EdgeId,
    prev: EdgeId,
}

/// Editable vertex
#[derive(Clone, Debug)]
pub struct EditVert {
    /// Position
    pub co: Vector3<f32>,
    /// Normal, updated by [`EditMesh::normals_update`]
    pub no: Vector3<f32>,
    /// State flags
    pub flag: ElemFlags,
    /// Head of the disk cycle, or `None` for a vertex with no edges
    e: Option<EdgeId>,
}

impl EditVert {
    /// Returns an edge of the disk cycle, if any
    pub fn edge(&self) -> Option<EdgeId> {
        self.e
    }
}

/// Editable edge
#[derive(Clone, Debug)]
pub struct EditEdge {
    /// Endpoints
    pub v: [VertId; 2],
    /// State flags
    pub flag: ElemFlags,
    disk: [Disk; 2],
    /// Head of the radial cycle, or `None` for an edge with no faces
    l: Option<LoopId>,
}

impl EditEdge {
    /// Returns a loop of the radial cycle, if any
    pub fn radial(&self) -> Option<LoopId> {
        self.l
    }
    /// Returns the endpoint that is not `v`
    pub fn other_vert(&self, v: VertId) -> VertId {
        if self.v[0] == v { self.v[1] } else { self.v[0] }
    }
}

/// Editable polygon corner
#[derive(Clone, Debug)]
pub struct EditLoop {
    /// Vertex at this corner
    pub v: VertId,
    /// Edge from this corner to the next one
    pub e: EdgeId,
    /// Owning face
    pub f: FaceId,
    /// Next corner of the same face
    pub next: LoopId,
    /// Previous corner of the same face
    pub prev: LoopId,
    /// Next corner (of another face) using the same edge
    pub radial_next: LoopId,
    radial_prev: LoopId,
}

/// Editable polygon
#[derive(Clone, Debug)]
pub struct EditFace {
    /// First corner; the face's corners are `l_first..l_first + len`
    pub l_first: LoopId,
    /// Number of corners
    pub len: u32,
    /// Normal, updated by [`EditMesh::normals_update`]
    pub no: Vector3<f32>,
    /// Material slot
    pub mat: u16,
    /// State flags
    pub flag: ElemFlags,
}

/// Editable mesh store
#[derive(Clone, Debug, Default)]
pub struct EditMesh {
    verts: Vec<EditVert>,
    edges: Vec<EditEdge>,
    loops: Vec<EditLoop>,
    faces: Vec<EditFace>,

    /// Triangulation of every face, kept in face order
    looptris: Vec<[LoopId; 3]>,

    /// Per-vertex layers
    pub vdata: CustomData,
    /// Per-edge layers
    pub edata: CustomData,
    /// Per-face layers
    pub pdata: CustomData,
    /// Per-loop layers
    pub ldata: CustomData,

    act_vert: Option<VertId>,
    act_edge: Option<EdgeId>,
    act_face: Option<FaceId>,
}

impl EditMesh {
    /// Builds an empty edit mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an edit mesh from a stable mesh
    ///
    /// Element indices are preserved: vertex, edge, face and loop `i` of the
    /// result correspond to element `i` of the input.
    pub fn from_mesh(me: &Mesh) -> Self {
        let mut out = Self::new();
        for v in &me.verts {
            let id = out.push_vert(v.co);
            out.verts[id.index()].flag = v.flag;
            out.verts[id.index()].no = v.no;
        }
        for e in &me.edges {
            let id = out.push_edge(VertId(e.v[0]), VertId(e.v[1]));
            out.edges[id.index()].flag = e.flag - ElemFlags::LOOSE;
        }
        for (p, mp) in me.polys.iter().enumerate() {
            let ls = me.poly_loops(p);
            let vs: Vec<_> = ls.iter().map(|l| VertId(l.v)).collect();
            let es: Vec<_> = ls.iter().map(|l| EdgeId(l.e)).collect();
            let f = out.push_face(&vs, &es, mp.mat);
            out.faces[f.index()].flag = mp.flag;
        }
        out.vdata = me.vdata.clone();
        out.edata = me.edata.clone();
        out.pdata = me.pdata.clone();
        out.ldata = me.ldata.clone();
        out.normals_update();
        out.update_looptris();
        out
    }

    /// Number of vertices
    pub fn vert_len(&self) -> usize {
        self.verts.len()
    }
    /// Number of edges
    pub fn edge_len(&self) -> usize {
        self.edges.len()
    }
    /// Number of loops
    pub fn loop_len(&self) -> usize {
        self.loops.len()
    }
    /// Number of faces
    pub fn face_len(&self) -> usize {
        self.faces.len()
    }
    /// Number of triangles in the maintained triangulation
    pub fn tri_len(&self) -> usize {
        self.looptris.len()
    }

    /// Looks up a vertex
    pub fn vert(&self, v: VertId) -> &EditVert {
        &self.verts[v.index()]
    }
    /// Looks up an edge
    pub fn edge(&self, e: EdgeId) -> &EditEdge {
        &self.edges[e.index()]
    }
    /// Looks up a loop
    pub fn loop_(&self, l: LoopId) -> &EditLoop {
        &self.loops[l.index()]
    }
    /// Looks up a face
    pub fn face(&self, f: FaceId) -> &EditFace {
        &self.faces[f.index()]
    }

    /// Returns the maintained triangulation
    pub fn looptris(&self) -> &[[LoopId; 3]] {
        &self.looptris
    }

    /// Iterates over the corners of a face, starting at its first loop
    pub fn face_loops(&self, f: FaceId) -> impl Iterator<Item = LoopId> + '_ {
        let face = &self.faces[f.index()];
        let start = face.l_first.index();
        (start..start + face.len as usize).map(LoopId::new)
    }

    /// Iterates over the edges around a vertex
    pub fn vert_edges(&self, v: VertId) -> impl Iterator<Item = EdgeId> + '_ {
        let first = self.verts[v.index()].e;
        let mut cur = first;
        std::iter::from_fn(move || {
            let e = cur?;
            let next = self.disk(e, v).next;
            cur = if Some(next) == first { None } else { Some(next) };
            Some(e)
        })
    }

    /// Iterates over the loops using an edge
    pub fn edge_loops(&self, e: EdgeId) -> impl Iterator<Item = LoopId> + '_ {
        let first = self.edges[e.index()].l;
        let mut cur = first;
        std::iter::from_fn(move || {
            let l = cur?;
            let next = self.loops[l.index()].radial_next;
            cur = if Some(next) == first { None } else { Some(next) };
            Some(l)
        })
    }

    /// Checks whether an edge is used by exactly two faces
    pub fn edge_is_manifold(&self, e: EdgeId) -> bool {
        match self.edges[e.index()].l {
            Some(l) => {
                let next = self.loops[l.index()].radial_next;
                next != l && self.loops[next.index()].radial_next == l
            }
            None => false,
        }
    }

    /// Finds the edge between two vertices
    pub fn find_edge(&self, a: VertId, b: VertId) -> Option<EdgeId> {
        self.vert_edges(a)
            .find(|&e| self.edges[e.index()].other_vert(a) == b)
    }

    /// Returns the active vertex
    pub fn active_vert(&self) -> Option<VertId> {
        self.act_vert
    }
    /// Returns the active edge
    pub fn active_edge(&self) -> Option<EdgeId> {
        self.act_edge
    }
    /// Returns the active face
    pub fn active_face(&self) -> Option<FaceId> {
        self.act_face
    }

    /// Sets (or clears) the active vertex
    pub fn set_active_vert(&mut self, v: Option<VertId>) -> Result<(), Error> {
        if let Some(v) = v {
            self.check(v.index(), self.verts.len())?;
        }
        self.act_vert = v;
        Ok(())
    }
    /// Sets (or clears) the active edge
    pub fn set_active_edge(&mut self, e: Option<EdgeId>) -> Result<(), Error> {
        if let Some(e) = e {
            self.check(e.index(), self.edges.len())?;
        }
        self.act_edge = e;
        Ok(())
    }
    /// Sets (or clears) the active face
    pub fn set_active_face(&mut self, f: Option<FaceId>) -> Result<(), Error> {
        if let Some(f) = f {
            self.check(f.index(), self.faces.len())?;
        }
        self.act_face = f;
        Ok(())
    }

    /// Sets or clears flags on a vertex
    pub fn set_vert_flag(
        &mut self,
        v: VertId,
        flag: ElemFlags,
        on: bool,
    ) -> Result<(), Error> {
        self.check(v.index(), self.verts.len())?;
        self.verts[v.index()].flag.set(flag, on);
        Ok(())
    }

    /// Sets or clears flags on an edge
    pub fn set_edge_flag(
        &mut self,
        e: EdgeId,
        flag: ElemFlags,
        on: bool,
    ) -> Result<(), Error> {
        self.check(e.index(), self.edges.len())?;
        self.edges[e.index()].flag.set(flag, on);
        Ok(())
    }

    /// Sets or clears flags on a face
    pub fn set_face_flag(
        &mut self,
        f: FaceId,
        flag: ElemFlags,
        on: bool,
    ) -> Result<(), Error> {
        self.check(f.index(), self.faces.len())?;
        self.faces[f.index()].flag.set(flag, on);
        Ok(())
    }

    /// Selects or deselects a face together with its vertices and edges
    pub fn select_face(&mut self, f: FaceId, on: bool) -> Result<(), Error> {
        self.check(f.index(), self.faces.len())?;
        self.faces[f.index()].flag.set(ElemFlags::SELECT, on);
        for l in self.face_loops(f).collect::<Vec<_>>() {
            let (v, e) = (self.loops[l.index()].v, self.loops[l.index()].e);
            self.verts[v.index()].flag.set(ElemFlags::SELECT, on);
            self.edges[e.index()].flag.set(ElemFlags::SELECT, on);
        }
        Ok(())
    }

    /// Assigns a face to a material slot
    pub fn set_face_material(
        &mut self,
        f: FaceId,
        mat: u16,
    ) -> Result<(), Error> {
        self.check(f.index(), self.faces.len())?;
        self.faces[f.index()].mat = mat;
        Ok(())
    }

    /// Moves a vertex
    ///
    /// Normals are stale until [`EditMesh::normals_update`] is called.
    pub fn set_vert_co(
        &mut self,
        v: VertId,
        co: Vector3<f32>,
    ) -> Result<(), Error> {
        self.check(v.index(), self.verts.len())?;
        self.verts[v.index()].co = co;
        Ok(())
    }

    /// Adds a vertex with no edges
    pub fn add_vert(&mut self, co: [f32; 3]) -> VertId {
        let v = self.push_vert(co.into());
        self.vdata.push_default();
        v
    }

    /// Adds an edge between two existing vertices
    ///
    /// If the edge already exists, it is returned unchanged.
    pub fn add_edge(&mut self, a: VertId, b: VertId) -> Result<EdgeId, Error> {
        self.check(a.index(), self.verts.len())?;
        self.check(b.index(), self.verts.len())?;
        if a == b {
            return Err(Error::RepeatedVertex(a.0));
        }
        Ok(self.get_or_add_edge(a, b))
    }

    /// Adds a face over existing vertices, creating missing edges
    ///
    /// The triangulation and normals are updated.
    pub fn add_face(&mut self, vs: &[VertId], mat: u16) -> Result<FaceId, Error> {
        if vs.len() < 3 {
            return Err(Error::DegeneratePolygon(vs.len()));
        }
        for (i, v) in vs.iter().enumerate() {
            if v.index() >= self.verts.len() {
                return Err(Error::BadVertIndex(v.0, self.verts.len()));
            }
            if vs[(i + 1) % vs.len()] == *v {
                return Err(Error::RepeatedVertex(v.0));
            }
        }
        let es: Vec<_> = (0..vs.len())
            .map(|i| self.get_or_add_edge(vs[i], vs[(i + 1) % vs.len()]))
            .collect();
        let f = self.push_face(vs, &es, mat);
        self.faces[f.index()].flag = ElemFlags::SMOOTH;
        self.pdata.push_default();
        for _ in 0..vs.len() {
            self.ldata.push_default();
        }
        self.normals_update();
        self.update_looptris();
        Ok(f)
    }

    /// Adds a custom layer, checking its length against the domain
    pub fn add_layer(
        &mut self,
        domain: AttrDomain,
        ty: LayerType,
        name: &str,
        data: LayerData,
    ) -> Result<LayerOffset, Error> {
        let (n, cd) = match domain {
            AttrDomain::Vert => (self.verts.len(), &mut self.vdata),
            AttrDomain::Edge => (self.edges.len(), &mut self.edata),
            AttrDomain::Poly => (self.faces.len(), &mut self.pdata),
            AttrDomain::Loop => (self.loops.len(), &mut self.ldata),
        };
        if data.len() != n {
            return Err(Error::LayerLength(data.len(), n));
        }
        Ok(cd.add(ty, name, data))
    }

    /// Recomputes face and vertex normals
    pub fn normals_update(&mut self) {
        for f in 0..self.faces.len() {
            let no = super::polygon_normal(
                self.face_loops(FaceId::new(f))
                    .map(|l| self.verts[self.loops[l.index()].v.index()].co),
            );
            self.faces[f].no = no;
        }
        let mut acc = vec![Vector3::zeros(); self.verts.len()];
        for l in &self.loops {
            let co = self.verts[l.v.index()].co;
            let prev = self.verts[self.loops[l.prev.index()].v.index()].co;
            let next = self.verts[self.loops[l.next.index()].v.index()].co;
            let angle = super::corner_angle(prev - co, next - co);
            acc[l.v.index()] += self.faces[l.f.index()].no * angle;
        }
        for (v, a) in self.verts.iter_mut().zip(acc) {
            v.no = a
                .try_normalize(f32::EPSILON)
                .or_else(|| v.co.try_normalize(f32::EPSILON))
                .unwrap_or_else(Vector3::z);
        }
    }

    /// Rebuilds the triangulation (a fan from each face's first corner)
    pub fn update_looptris(&mut self) {
        self.looptris.clear();
        for f in &self.faces {
            let first = f.l_first.index();
            for i in 1..f.len as usize - 1 {
                self.looptris.push([
                    LoopId::new(first),
                    LoopId::new(first + i),
                    LoopId::new(first + i + 1),
                ]);
            }
        }
    }

    ////////////////////////////////////////////////////////////////////////////

    fn check(&self, i: usize, len: usize) -> Result<(), Error> {
        if i < len { Ok(()) } else { Err(Error::BadElement(i)) }
    }

    fn disk(&self, e: EdgeId, v: VertId) -> &Disk {
        let edge = &self.edges[e.index()];
        &edge.disk[(edge.v[0] != v) as usize]
    }

    fn disk_mut(&mut self, e: EdgeId, v: VertId) -> &mut Disk {
        let edge = &mut self.edges[e.index()];
        &mut edge.disk[(edge.v[0] != v) as usize]
    }

    fn push_vert(&mut self, co: Vector3<f32>) -> VertId {
        let id = VertId::new(self.verts.len());
        self.verts.push(EditVert {
            co,
            no: Vector3::z(),
            flag: ElemFlags::empty(),
            e: None,
        });
        id
    }

    fn get_or_add_edge(&mut self, a: VertId, b: VertId) -> EdgeId {
        if let Some(e) = self.find_edge(a, b) {
            return e;
        }
        let e = self.push_edge(a, b);
        self.edata.push_default();
        e
    }

    /// Appends an edge and links it into both disk cycles
    fn push_edge(&mut self, a: VertId, b: VertId) -> EdgeId {
        let id = EdgeId::new(self.edges.len());
        let link = Disk { next: id, prev: id };
        self.edges.push(EditEdge {
            v: [a, b],
            flag: ElemFlags::empty(),
            disk: [link; 2],
            l: None,
        });
        for v in [a, b] {
            match self.verts[v.index()].e {
                None => self.verts[v.index()].e = Some(id),
                Some(first) => {
                    let last = self.disk(first, v).prev;
                    *self.disk_mut(id, v) = Disk {
                        next: first,
                        prev: last,
                    };
                    self.disk_mut(last, v).next = id;
                    self.disk_mut(first, v).prev = id;
                }
            }
        }
        id
    }

    /// Appends a face whose loops are contiguous, linking radial cycles
    fn push_face(&mut self, vs: &[VertId], es: &[EdgeId], mat: u16) -> FaceId {
        let f = FaceId::new(self.faces.len());
        let start = self.loops.len();
        let n = vs.len();
        for i in 0..n {
            let id = LoopId::new(start + i);
            self.loops.push(EditLoop {
                v: vs[i],
                e: es[i],
                f,
                next: LoopId::new(start + (i + 1) % n),
                prev: LoopId::new(start + (i + n - 1) % n),
                radial_next: id,
                radial_prev: id,
            });
            match self.edges[es[i].index()].l {
                None => self.edges[es[i].index()].l = Some(id),
                Some(first) => {
                    let last = self.loops[first.index()].radial_prev;
                    self.loops[id.index()].radial_next = first;
                    self.loops[id.index()].radial_prev = last;
                    self.loops[last.index()].radial_next = id;
                    self.loops[first.index()].radial_prev = id;
                }
            }
        }
        self.faces.push(EditFace {
            l_first: LoopId::new(start),
            len: n as u32,
            no: Vector3::z(),
            mat,
            flag: ElemFlags::empty(),
        });
        f
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::MeshBuilder;

    /// Two quads sharing an edge, plus a loose edge and a loose vertex
    fn two_quads() -> Mesh {
        let mut b = MeshBuilder::new();
        let v = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
            [2.0, 1.0, 0.0],
            [5.0, 0.0, 0.0],
            [6.0, 0.0, 0.0],
            [9.0, 0.0, 0.0],
        ]
        .map(|p| b.vert(p));
        b.poly(&[v[0], v[1], v[4], v[3]]);
        b.poly(&[v[1], v[2], v[5], v[4]]);
        b.edge(v[6], v[7]);
        b.build().unwrap()
    }

    #[test]
    fn from_mesh_topology() {
        let me = two_quads();
        let bm = EditMesh::from_mesh(&me);
        assert_eq!(bm.vert_len(), 9);
        assert_eq!(bm.edge_len(), 8);
        assert_eq!(bm.face_len(), 2);
        assert_eq!(bm.loop_len(), 8);
        assert_eq!(bm.tri_len(), 4);
        assert_eq!(bm.tri_len(), me.tri_len());

        // Loop ids match the stable mesh
        for (i, l) in me.loops.iter().enumerate() {
            let bl = bm.loop_(LoopId::new(i));
            assert_eq!(bl.v.index(), l.v as usize);
            assert_eq!(bl.e.index(), l.e as usize);
        }

        // The shared edge is manifold, the rest are boundaries or loose
        let shared = bm.find_edge(VertId::new(1), VertId::new(4)).unwrap();
        assert!(bm.edge_is_manifold(shared));
        assert_eq!(bm.edge_loops(shared).count(), 2);
        let boundary = bm.find_edge(VertId::new(0), VertId::new(1)).unwrap();
        assert!(!bm.edge_is_manifold(boundary));

        let loose = bm.find_edge(VertId::new(6), VertId::new(7)).unwrap();
        assert!(bm.edge(loose).radial().is_none());
        assert!(bm.vert(VertId::new(8)).edge().is_none());

        assert_eq!(bm.vert_edges(VertId::new(1)).count(), 3);
        assert_eq!(bm.vert_edges(VertId::new(4)).count(), 3);
        assert_eq!(bm.vert_edges(VertId::new(0)).count(), 2);
    }

    #[test]
    fn add_elements() {
        let mut bm = EditMesh::new();
        let a = bm.add_vert([0.0, 0.0, 0.0]);
        let b = bm.add_vert([1.0, 0.0, 0.0]);
        let c = bm.add_vert([0.0, 1.0, 0.0]);
        let e = bm.add_edge(a, b).unwrap();
        assert_eq!(bm.add_edge(b, a).unwrap(), e);
        assert!(bm.edge(e).radial().is_none());

        let f = bm.add_face(&[a, b, c], 0).unwrap();
        assert_eq!(bm.edge_len(), 3);
        assert_eq!(bm.edge(e).radial(), Some(LoopId::new(0)));
        assert_eq!(bm.tri_len(), 1);
        approx::assert_relative_eq!(bm.face(f).no, Vector3::z());

        assert_eq!(bm.add_face(&[a, b], 0), Err(Error::DegeneratePolygon(2)));
        assert_eq!(
            bm.add_face(&[a, b, VertId::new(7)], 0),
            Err(Error::BadVertIndex(7, 3))
        );
        assert_eq!(
            bm.set_active_face(Some(FaceId::new(3))),
            Err(Error::BadElement(3))
        );
    }

    #[test]
    fn face_selection() {
        let mut bm = EditMesh::from_mesh(&two_quads());
        bm.select_face(FaceId::new(0), true).unwrap();
        assert!(bm.face(FaceId::new(0)).flag.contains(ElemFlags::SELECT));
        assert!(bm.vert(VertId::new(3)).flag.contains(ElemFlags::SELECT));
        assert!(!bm.vert(VertId::new(2)).flag.contains(ElemFlags::SELECT));
    }
}
