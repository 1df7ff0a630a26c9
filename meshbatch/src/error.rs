//! Module containing the universal error type
use thiserror::Error;

/// Universal error type for `meshbatch`
///
/// Extraction itself never fails; these errors are only produced when
/// building or editing a mesh store from malformed input.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// A polygon or edge references a vertex that does not exist
    #[error("vertex {0} is out of range (mesh has {1} vertices)")]
    BadVertIndex(u32, usize),

    /// A polygon has fewer than three corners
    #[error("polygon has {0} corners; at least 3 are required")]
    DegeneratePolygon(usize),

    /// A polygon visits the same vertex twice in a row
    #[error("polygon repeats vertex {0} on consecutive corners")]
    RepeatedVertex(u32),

    /// A custom layer has the wrong number of elements for its domain
    #[error("layer has {0} elements; its domain has {1}")]
    LayerLength(usize, usize),

    /// A loose edge duplicates an existing edge
    #[error("edge ({0}, {1}) already exists")]
    DuplicateEdge(u32, u32),

    /// An editable element handle is out of range or was removed
    #[error("element {0} is not present in this edit mesh")]
    BadElement(usize),
}
