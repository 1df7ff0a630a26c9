//! `meshbatch` turns polygon meshes into flat, tightly packed vertex and index
//! buffers, ready for upload to a GPU.
//!
//! A mesh can be stored in one of two ways:
//! - A **stable** [`Mesh`](crate::mesh::Mesh), with flat arrays of vertices,
//!   edges, polygons, and loops (polygon corners)
//! - An **editable** [`EditMesh`](crate::mesh::EditMesh), a half-edge
//!   structure with radial loop cycles, used while the mesh is being edited
//!
//! While editing, an evaluated stable mesh may also carry **origin indices**
//! back into the editable mesh, so that overlays show live edit state on
//! deformed geometry.  A [`MeshSource`](crate::mesh::MeshSource) bundles
//! whatever representations currently exist.
//!
//! # Extraction
//! Each output buffer is produced by an **extractor**, which implements the
//! [`Extract`](crate::extract::Extract) trait.  An extractor allocates its
//! buffer, then visits polygons, loop triangles, loose edges, and loose
//! vertices through a [`MeshRenderData`](crate::render_data::MeshRenderData)
//! view, which hides the difference between the two stores.
//!
//! [`extract_buffers`](crate::extract::extract_buffers) runs a set of
//! extractors as one task graph.  Thread-safe extractors over large meshes
//! are split into chunks that run in parallel; the last chunk to finish runs
//! the extractor's finish step.
//!
//! ```
//! use meshbatch::{
//!     buffer::BufferKind,
//!     config::{ExtractConfig, RenderOptions},
//!     extract::{descriptor, extract_buffers},
//!     mesh::{MeshBuilder, MeshSource},
//! };
//!
//! let mut b = MeshBuilder::new();
//! for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]] {
//!     b.vert(p);
//! }
//! b.poly(&[0, 1, 2, 3]);
//! let src = MeshSource::object(b.build()?);
//!
//! let tris = descriptor(BufferKind::Tris, false).unwrap();
//! let (bufs, _report) = extract_buffers(
//!     &src,
//!     &RenderOptions::default(),
//!     &[tris],
//!     &ExtractConfig::default(),
//! );
//! assert_eq!(bufs[0].indices().unwrap(), [0, 1, 2, 0, 2, 3]);
//! # Ok::<(), meshbatch::Error>(())
//! ```
//!
//! # Caching
//! A [`BatchCache`](crate::cache::BatchCache) keeps the buffers of one mesh
//! across frames, extracting only the slots that are missing and discarding
//! the slots affected by a [`DirtyReason`](crate::cache::DirtyReason).
#![warn(missing_docs)]

pub mod buffer;
pub mod cache;
pub mod config;
pub mod extract;
pub mod mesh;
pub mod render_data;
pub mod task;

mod error;
pub use error::Error;
