//! Flat-array mesh store
use nalgebra::Vector3;

use super::{AttrDomain, CustomData, ElemFlags, LayerData, LayerOffset, LayerType};
use crate::Error;

/// A vertex in a stable mesh
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct MVert {
    /// Position
    pub co: Vector3<f32>,
    /// Normal, kept up to date by [`Mesh::recalc_normals`]
    pub no: Vector3<f32>,
    /// Selection and visibility state
    pub flag: ElemFlags,
}

/// An edge in a stable mesh
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MEdge {
    /// Vertex indices
    pub v: [u32; 2],
    /// State flags; [`ElemFlags::LOOSE`] marks edges with no polygon
    pub flag: ElemFlags,
}

/// A polygon in a stable mesh, referencing a contiguous run of loops
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MPoly {
    /// Index of the first loop in [`Mesh::loops`]
    pub loopstart: u32,
    /// Number of loops (corners)
    pub totloop: u32,
    /// Material slot
    pub mat: u16,
    /// State flags
    pub flag: ElemFlags,
}

/// A polygon corner
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MLoop {
    /// Vertex at this corner
    pub v: u32,
    /// Edge from this corner to the next one
    pub e: u32,
}

/// Per-element back-references into an editable mesh
///
/// An entry of [`super::ORIGINDEX_NONE`] marks an element without an
/// original counterpart.
#[derive(Clone, Debug, Default)]
pub struct OriginIndex {
    /// Original vertex of each vertex
    pub vert: Option<Vec<i32>>,
    /// Original edge of each edge
    pub edge: Option<Vec<i32>>,
    /// Original face of each polygon
    pub poly: Option<Vec<i32>>,
}

impl OriginIndex {
    /// Checks whether any origin array is present
    pub fn any(&self) -> bool {
        self.vert.is_some() || self.edge.is_some() || self.poly.is_some()
    }
}

/// What the stable mesh actually stores
#[derive(Clone, Debug, Default)]
pub enum MeshWrapper {
    /// Real flat arrays
    #[default]
    Data,
    /// A thin wrapper around the object's editable mesh
    ///
    /// The flat arrays are not authoritative; extraction reads the editable
    /// mesh instead, using these deformed coordinates when present.
    Edit {
        /// Deformed vertex positions, indexed like the editable vertices
        vertex_cos: Option<Vec<Vector3<f32>>>,
    },
}

/// Stable mesh store: flat arrays of vertices, edges, polygons and loops
#[derive(Clone, Debug)]
pub struct Mesh {
    /// Vertex array
    pub verts: Vec<MVert>,
    /// Edge array
    pub edges: Vec<MEdge>,
    /// Polygon array
    pub polys: Vec<MPoly>,
    /// Loop array, in polygon order
    pub loops: Vec<MLoop>,

    /// Per-vertex layers
    pub vdata: CustomData,
    /// Per-edge layers
    pub edata: CustomData,
    /// Per-polygon layers
    pub pdata: CustomData,
    /// Per-loop layers
    pub ldata: CustomData,

    /// Back-references into the editable mesh (evaluated meshes only)
    pub origindex: OriginIndex,

    /// Enables split normals
    pub auto_smooth: bool,
    /// Angle (in radians) beyond which adjacent polygons are not smoothed
    pub smooth_angle: f32,
    /// Number of material slots
    pub mat_len: u16,

    /// Storage kind
    pub wrapper: MeshWrapper,
    /// Whether this is the original (unevaluated) mesh
    pub is_original: bool,
}

impl Default for Mesh {
    fn default() -> Self {
        Self {
            verts: vec![],
            edges: vec![],
            polys: vec![],
            loops: vec![],
            vdata: CustomData::default(),
            edata: CustomData::default(),
            pdata: CustomData::default(),
            ldata: CustomData::default(),
            origindex: OriginIndex::default(),
            auto_smooth: false,
            smooth_angle: std::f32::consts::PI,
            mat_len: 1,
            wrapper: MeshWrapper::Data,
            is_original: true,
        }
    }
}

impl Mesh {
    /// Number of vertices
    pub fn vert_len(&self) -> usize {
        self.verts.len()
    }
    /// Number of edges
    pub fn edge_len(&self) -> usize {
        self.edges.len()
    }
    /// Number of polygons
    pub fn poly_len(&self) -> usize {
        self.polys.len()
    }
    /// Number of loops
    pub fn loop_len(&self) -> usize {
        self.loops.len()
    }
    /// Number of triangles produced by triangulating every polygon
    pub fn tri_len(&self) -> usize {
        super::poly_to_tri_count(self.poly_len(), self.loop_len())
    }

    /// Returns the loops of a polygon
    pub fn poly_loops(&self, p: usize) -> &[MLoop] {
        let mp = &self.polys[p];
        let start = mp.loopstart as usize;
        &self.loops[start..start + mp.totloop as usize]
    }

    /// Returns the layer table for a domain
    pub fn data(&self, domain: AttrDomain) -> &CustomData {
        match domain {
            AttrDomain::Vert => &self.vdata,
            AttrDomain::Edge => &self.edata,
            AttrDomain::Poly => &self.pdata,
            AttrDomain::Loop => &self.ldata,
        }
    }

    /// Returns the mutable layer table for a domain
    pub fn data_mut(&mut self, domain: AttrDomain) -> &mut CustomData {
        match domain {
            AttrDomain::Vert => &mut self.vdata,
            AttrDomain::Edge => &mut self.edata,
            AttrDomain::Poly => &mut self.pdata,
            AttrDomain::Loop => &mut self.ldata,
        }
    }

    /// Number of elements in a domain
    pub fn domain_len(&self, domain: AttrDomain) -> usize {
        match domain {
            AttrDomain::Vert => self.vert_len(),
            AttrDomain::Edge => self.edge_len(),
            AttrDomain::Poly => self.poly_len(),
            AttrDomain::Loop => self.loop_len(),
        }
    }

    /// Adds a custom layer, checking its length against the domain
    pub fn add_layer(
        &mut self,
        domain: AttrDomain,
        ty: LayerType,
        name: &str,
        data: LayerData,
    ) -> Result<LayerOffset, Error> {
        let n = self.domain_len(domain);
        if data.len() != n {
            return Err(Error::LayerLength(data.len(), n));
        }
        Ok(self.data_mut(domain).add(ty, name, data))
    }

    /// Installs an origin-index array for the given domain
    ///
    /// Loop-domain origin indices are not tracked.
    pub fn set_origindex(
        &mut self,
        domain: AttrDomain,
        index: Vec<i32>,
    ) -> Result<(), Error> {
        let n = self.domain_len(domain);
        if index.len() != n {
            return Err(Error::LayerLength(index.len(), n));
        }
        let slot = match domain {
            AttrDomain::Vert => &mut self.origindex.vert,
            AttrDomain::Edge => &mut self.origindex.edge,
            AttrDomain::Poly => &mut self.origindex.poly,
            AttrDomain::Loop => return Ok(()),
        };
        *slot = Some(index);
        Ok(())
    }

    /// Computes the normal of a single polygon
    pub fn poly_normal(&self, p: usize) -> Vector3<f32> {
        super::polygon_normal(
            self.poly_loops(p).iter().map(|l| self.verts[l.v as usize].co),
        )
    }

    /// Recomputes vertex normals as the normalized sum of adjacent polygon
    /// normals, weighted by corner angle
    ///
    /// Vertices with no adjacent polygon get a normal pointing away from the
    /// origin (or `+Z` at the origin).
    pub fn recalc_normals(&mut self) {
        let mut acc = vec![Vector3::zeros(); self.verts.len()];
        for p in 0..self.polys.len() {
            let no = self.poly_normal(p);
            let ls = self.poly_loops(p);
            for (i, l) in ls.iter().enumerate() {
                let prev = ls[(i + ls.len() - 1) % ls.len()].v as usize;
                let next = ls[(i + 1) % ls.len()].v as usize;
                let co = self.verts[l.v as usize].co;
                let angle = super::corner_angle(
                    self.verts[prev].co - co,
                    self.verts[next].co - co,
                );
                acc[l.v as usize] += no * angle;
            }
        }
        for (v, a) in self.verts.iter_mut().zip(acc) {
            v.no = a
                .try_normalize(f32::EPSILON)
                .or_else(|| v.co.try_normalize(f32::EPSILON))
                .unwrap_or_else(Vector3::z);
        }
    }
}
