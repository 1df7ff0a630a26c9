//! Types used in configuration structures
use bitflags::bitflags;

/// Thread pool to use for multithreaded extraction
///
/// Most users will use the global Rayon pool, but it's possible to provide your
/// own as well.
pub enum ThreadPool {
    /// User-provided pool
    Custom(rayon::ThreadPool),
    /// Global Rayon pool
    Global,
}

impl ThreadPool {
    /// Builds a dedicated pool with the given number of threads
    pub fn with_threads(n: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map(ThreadPool::Custom)
    }

    /// Runs a function across the thread pool
    pub fn run<F: FnOnce() -> V + Send, V: Send>(&self, f: F) -> V {
        match self {
            ThreadPool::Custom(p) => p.install(f),
            ThreadPool::Global => f(),
        }
    }

    /// Returns the number of threads in the pool
    pub fn thread_count(&self) -> usize {
        match self {
            ThreadPool::Custom(p) => p.current_num_threads(),
            ThreadPool::Global => rayon::current_num_threads(),
        }
    }
}

/// Default chunk size, in elements
///
/// This is both the threshold above which a thread-safe extractor is split
/// into chunks and the width of each chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Settings for a single extraction pass
pub struct ExtractConfig<'a> {
    /// Chunk size (and parallel-eligibility threshold), in elements
    pub chunk_size: usize,

    /// Use 16-bit normals instead of 10-bit packed normals for loop normals
    /// and tangents
    pub hq_normals: bool,

    /// Thread pool to use for extraction
    ///
    /// If this is `None`, then every task runs on the calling thread;
    /// otherwise, the provided pool is used.
    pub threads: Option<&'a ThreadPool>,
}

impl Default for ExtractConfig<'_> {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            hq_normals: false,
            threads: Some(&ThreadPool::Global),
        }
    }
}

bitflags! {
    /// Element types that can be selected by the editing tools
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct SelectMode: u8 {
        /// Vertex selection
        const VERT = 1 << 0;
        /// Edge selection
        const EDGE = 1 << 1;
        /// Face selection
        const FACE = 1 << 2;
    }
}

impl Default for SelectMode {
    fn default() -> Self {
        SelectMode::VERT
    }
}

/// Context in which a mesh is being drawn
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RenderOptions {
    /// In edit mode, draw the fully evaluated mesh instead of the cage
    pub prefer_final: bool,
    /// A paint mode with selection masking is active
    pub paint_mode: bool,
    /// The UV editor is showing this mesh
    pub uv_edit: bool,
    /// Skip hidden elements (always on in edit mode)
    pub use_hide: bool,
    /// Active selection mode of the editing tools
    pub select_mode: SelectMode,
    /// The UV editor shares the mesh selection, so every visible face is
    /// shown in it (not only selected ones)
    pub uv_sync_select: bool,
    /// Settings of the mesh analysis overlay
    pub statvis: StatVis,
}

/// Quantity shown by the mesh analysis overlay
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, strum::EnumIter)]
pub enum StatVisKind {
    /// Angle between each face and a reference axis
    #[default]
    Overhang,
    /// Distance to the opposite surface, measured along inward rays
    Thickness,
    /// Faces that cut through other faces
    Intersect,
    /// Non-planarity of quads and n-gons
    Distort,
    /// Largest dihedral angle around each vertex
    Sharp,
}

/// Signed coordinate axis
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Axis {
    PosX,
    PosY,
    PosZ,
    NegX,
    NegY,
    NegZ,
}

impl Axis {
    /// Returns the axis as a unit vector
    pub fn dir(self) -> nalgebra::Vector3<f32> {
        use nalgebra::Vector3;
        match self {
            Axis::PosX => Vector3::x(),
            Axis::PosY => Vector3::y(),
            Axis::PosZ => Vector3::z(),
            Axis::NegX => -Vector3::x(),
            Axis::NegY => -Vector3::y(),
            Axis::NegZ => -Vector3::z(),
        }
    }
}

/// Mesh analysis settings
///
/// Angles are in radians and distances in object space.  Each quantity is
/// remapped from its `min..max` range to a weight in `0..=1`; values outside
/// the range that the overlay should not color are written as `-1`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StatVis {
    /// Quantity to compute
    pub kind: StatVisKind,
    /// Reference axis for [`StatVisKind::Overhang`]
    pub overhang_axis: Axis,
    /// Overhang angle range, in `0..=π`
    pub overhang_min: f32,
    #[allow(missing_docs)]
    pub overhang_max: f32,
    /// Thickness range; anything at least as thick as the maximum is not
    /// colored
    pub thickness_min: f32,
    #[allow(missing_docs)]
    pub thickness_max: f32,
    /// Rays cast per triangle, at most [`StatVis::MAX_THICKNESS_SAMPLES`]
    pub thickness_samples: usize,
    /// Distortion angle range
    pub distort_min: f32,
    #[allow(missing_docs)]
    pub distort_max: f32,
    /// Sharpness (signed dihedral angle) range
    pub sharp_min: f32,
    #[allow(missing_docs)]
    pub sharp_max: f32,
}

impl StatVis {
    /// Upper bound on [`StatVis::thickness_samples`]
    pub const MAX_THICKNESS_SAMPLES: usize = 32;
}

impl Default for StatVis {
    fn default() -> Self {
        use std::f32::consts::PI;
        Self {
            kind: StatVisKind::Overhang,
            overhang_axis: Axis::NegZ,
            overhang_min: 0.0,
            overhang_max: PI / 4.0,
            thickness_min: 0.0,
            thickness_max: 0.1,
            thickness_samples: 1,
            distort_min: 5f32.to_radians(),
            distort_max: PI / 4.0,
            sharp_min: PI / 2.0,
            sharp_max: PI,
        }
    }
}

/// Settings for a per-mesh buffer cache
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Frames after which unused shaded buffers (UV, tangent, color) are
    /// discarded once the requested layers stop matching
    pub shaded_timeout: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shaded_timeout: 120,
        }
    }
}
