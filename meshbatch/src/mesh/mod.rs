//! Mesh stores consumed by extraction
//!
//! There are two representations of the same polygon mesh:
//!
//! - [`Mesh`] is the stable store: flat arrays of vertices, edges, polygons
//!   and loops, cheap to iterate, optionally carrying origin indices back to an
//!   editable mesh.
//! - [`EditMesh`] is the editable store: a half-edge / radial-loop structure
//!   with connectivity queries and live selection state.
//!
//! [`MeshSource`] bundles the representations that exist for one object at a
//! given moment.
use bitflags::bitflags;
use nalgebra::Vector3;

mod builder;
mod edit;
mod layers;
mod source;
mod stable;

pub use builder::MeshBuilder;
pub use edit::{
    EdgeId, EditEdge, EditFace, EditLoop, EditMesh, EditVert, FaceId, LoopId,
    VertId,
};
pub use layers::{
    CustomData, Layer, LayerData, LayerOffset, LayerType, LoopUv, UvFlags,
};
pub use source::{EditSource, MeshSource};
pub use stable::{MEdge, MLoop, MPoly, MVert, Mesh, MeshWrapper, OriginIndex};

/// Origin index of an element with no original counterpart
pub const ORIGINDEX_NONE: i32 = -1;

bitflags! {
    /// Per-element state flags shared by both mesh stores
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ElemFlags: u8 {
        /// Element is selected
        const SELECT = 1 << 0;
        /// Element is hidden
        const HIDDEN = 1 << 1;
        /// Polygon is smooth shaded
        const SMOOTH = 1 << 2;
        /// Edge is a UV seam
        const SEAM = 1 << 3;
        /// Edge is marked sharp
        const SHARP = 1 << 4;
        /// Edge is not used by any polygon (stable store only)
        const LOOSE = 1 << 5;
    }
}

/// Element domain of a custom layer
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AttrDomain {
    /// Per-vertex
    Vert,
    /// Per-edge
    Edge,
    /// Per-polygon
    Poly,
    /// Per-loop (polygon corner)
    Loop,
}

/// Number of triangles produced by triangulating simple polygons
///
/// A polygon with `L` corners contributes `L - 2` triangles.
pub fn poly_to_tri_count(poly_len: usize, loop_len: usize) -> usize {
    debug_assert!(loop_len >= 2 * poly_len);
    loop_len - 2 * poly_len
}

/// Computes a polygon normal with Newell's method
///
/// Returns `+Z` for degenerate polygons.
pub fn polygon_normal<I>(corners: I) -> Vector3<f32>
where
    I: IntoIterator<Item = Vector3<f32>>,
{
    let mut it = corners.into_iter();
    let Some(first) = it.next() else {
        return Vector3::z();
    };
    let mut n = Vector3::zeros();
    let mut prev = first;
    for co in it.chain(std::iter::once(first)) {
        n.x += (prev.y - co.y) * (prev.z + co.z);
        n.y += (prev.z - co.z) * (prev.x + co.x);
        n.z += (prev.x - co.x) * (prev.y + co.y);
        prev = co;
    }
    n.try_normalize(f32::EPSILON).unwrap_or_else(Vector3::z)
}

/// Angle between two corner edge vectors, or 0 if either is degenerate
pub(crate) fn corner_angle(a: Vector3<f32>, b: Vector3<f32>) -> f32 {
    match (a.try_normalize(f32::EPSILON), b.try_normalize(f32::EPSILON)) {
        (Some(a), Some(b)) => a.dot(&b).clamp(-1.0, 1.0).acos(),
        _ => 0.0,
    }
}

/// Unit cube with outward-facing polygons, shared by unit tests
#[cfg(test)]
pub(crate) fn test_cube() -> Mesh {
    let mut b = MeshBuilder::new();
    for i in 0..8 {
        let (x, y, z) = (i & 1, (i >> 1) & 1, i >> 2);
        // Walk the bottom and top rings in counter-clockwise order
        let x = if y == 1 { 1 - x } else { x };
        b.vert([x as f32, y as f32, z as f32]);
    }
    b.poly(&[0, 3, 2, 1])
        .poly(&[4, 5, 6, 7])
        .poly(&[0, 1, 5, 4])
        .poly(&[1, 2, 6, 5])
        .poly(&[2, 3, 7, 6])
        .poly(&[3, 0, 4, 7]);
    match b.build() {
        Ok(me) => me,
        Err(e) => panic!("bad cube: {e}"),
    }
}
