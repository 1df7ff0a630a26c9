//! Per-mesh buffer caches
//!
//! A [`BatchCache`] owns the extracted buffers of one mesh.  Requests only
//! extract the slots that are not ready; [`BatchCache::invalidate`] discards
//! the slots affected by a change, and [`BatchCache::free_old`] evicts shaded
//! buffers whose layers have stopped being requested.
//!
//! A [`DrawCache`] maps mesh ids to their caches.
use std::sync::Arc;

use bitflags::bitflags;
use enum_map::EnumMap;
use log::trace;
use rustc_hash::FxHashMap;

use crate::{
    buffer::{Buffer, BufferKind, BufferSet, IndexSub},
    config::{CacheConfig, ExtractConfig, RenderOptions},
    extract::{
        Descriptor, ExtractReport, LinesAdjacency, descriptor, extract_buffers,
    },
    mesh::MeshSource,
};

/// Why cached buffers became stale
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, strum::EnumIter, strum::Display,
)]
pub enum DirtyReason {
    /// Edit-mode selection changed
    Select,
    /// Paint-mode selection changed
    SelectPaint,
    /// Inputs to shading changed (layers or materials)
    Shading,
    /// UV-editor selection changed
    UvEditSelect,
    /// UV coordinates changed
    UvEditAll,
    /// Geometry or topology changed
    All,
}

impl DirtyReason {
    /// Returns the slots discarded for this reason
    pub fn affected(self) -> BufferSet {
        use BufferKind::*;
        match self {
            DirtyReason::Select => [EditData, FdotsNor].into(),
            // The selection flag lives in the normal's `w` component
            DirtyReason::SelectPaint => [PosNor, Lnor, LinesPaintMask].into(),
            // Triangles carry the per-material sub-ranges
            DirtyReason::Shading => [Uv, Tan, Vcol, Tris].into(),
            DirtyReason::UvEditSelect => uv_editor().union(
                [EditUvData, FdotsEditUvData].into(),
            ),
            DirtyReason::UvEditAll => uv_editor().union(
                [
                    Uv,
                    Tan,
                    EditUvData,
                    FdotsEditUvData,
                    FdotsUv,
                    StretchArea,
                    StretchAngle,
                ]
                .into(),
            ),
            DirtyReason::All => BufferSet::all(),
        }
    }
}

bitflags! {
    /// Custom layers read by the shaded buffers
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct LayerMask: u8 {
        /// UV coordinates
        const UV = 1 << 0;
        /// Tangents (which also read UVs)
        const TANGENT = 1 << 1;
        /// Vertex colors
        const VCOL = 1 << 2;
    }
}

impl LayerMask {
    /// Returns the layers that a set of slots reads
    pub fn of(kinds: BufferSet) -> Self {
        let mut out = LayerMask::empty();
        for k in kinds.iter() {
            out |= match k {
                BufferKind::Uv => LayerMask::UV,
                BufferKind::Tan => LayerMask::UV | LayerMask::TANGENT,
                BufferKind::Vcol => LayerMask::VCOL,
                _ => LayerMask::empty(),
            };
        }
        out
    }
}

/// Index buffers of the UV editor, which only list shown faces
fn uv_editor() -> BufferSet {
    use BufferKind::*;
    [EditUvTris, EditUvLines, EditUvPoints, EditUvFdots].into()
}

/// Options that change the layout of every slot
///
/// These select the drawn geometry (cage or evaluated mesh, origin mapping,
/// hidden elements), so nothing built under different values is reusable.
fn layout_key(opts: &RenderOptions) -> (bool, bool, bool, bool) {
    (opts.prefer_final, opts.paint_mode, opts.uv_edit, opts.use_hide)
}

/// Slots holding layer-heavy buffers, evicted by [`BatchCache::free_old`]
fn shaded() -> BufferSet {
    [BufferKind::Uv, BufferKind::Tan, BufferKind::Vcol].into()
}

/// Instrumentation accumulated by a [`BatchCache`]
#[derive(Clone, Debug, Default)]
pub struct CacheStats {
    /// Number of extraction passes run
    pub passes: usize,
    /// Number of times each slot was extracted
    pub extracted: EnumMap<BufferKind, usize>,
    /// Report of the most recent pass
    pub last_report: Option<ExtractReport>,
}

/// Extracted buffers of one mesh
pub struct BatchCache {
    slots: EnumMap<BufferKind, Option<Arc<Buffer>>>,
    /// Slots requested since the layout was last reset
    requested: BufferSet,

    /// Mode the slots were built in
    is_editmode: bool,
    /// Material count the triangle sub-ranges were built for
    mat_len: usize,
    /// Normal precision of the [`BufferKind::Lnor`] and [`BufferKind::Tan`]
    /// slots
    hq_normals: bool,
    /// Options the slots were built with
    opts: RenderOptions,

    /// Layers requested since the last call to [`BatchCache::free_old`]
    layers_used_over_time: LayerMask,
    /// Frame at which the requested layers last matched the cached ones
    last_match: u64,

    config: CacheConfig,
    stats: CacheStats,
}

impl Default for BatchCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl BatchCache {
    /// Builds an empty cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            slots: EnumMap::default(),
            requested: BufferSet::EMPTY,
            is_editmode: false,
            mat_len: 0,
            hq_normals: false,
            opts: RenderOptions::default(),
            layers_used_over_time: LayerMask::empty(),
            last_match: 0,
            config,
            stats: CacheStats::default(),
        }
    }

    /// Returns the set of slots holding a buffer
    pub fn ready(&self) -> BufferSet {
        self.slots
            .iter()
            .filter(|(_, s)| s.is_some())
            .map(|(k, _)| k)
            .collect()
    }

    /// Returns the set of slots requested since the last layout reset
    ///
    /// Unlike [`BatchCache::ready`], this survives invalidation.
    pub fn requested(&self) -> BufferSet {
        self.requested
    }

    /// Returns a ready buffer
    pub fn get(&self, kind: BufferKind) -> Option<&Arc<Buffer>> {
        self.slots[kind].as_ref()
    }

    /// Returns instrumentation counters
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Layers read by the shaded buffers that are currently cached
    pub fn layers_used(&self) -> LayerMask {
        LayerMask::of(self.ready())
    }

    /// Layers requested since the last eviction tick
    pub fn layers_used_over_time(&self) -> LayerMask {
        self.layers_used_over_time
    }

    fn discard(&mut self, kinds: BufferSet) {
        let mut kinds = kinds;
        if kinds.contains(BufferKind::Lines) {
            kinds.insert(BufferKind::LinesLoose);
        }
        for k in kinds.iter() {
            self.slots[k] = None;
        }
    }

    /// Clears every slot if the source no longer matches the cached layout
    ///
    /// Edit mode and object mode have incompatible layouts, triangle
    /// sub-ranges depend on the material count, and the options in
    /// [`layout_key`] pick the drawn geometry.  Options read by only a few
    /// extractors discard just those slots.
    fn validate(
        &mut self,
        source: &MeshSource,
        opts: &RenderOptions,
        config: &ExtractConfig,
    ) {
        let is_editmode = source.is_editmode();
        let mat_len = source.mat_len();
        if is_editmode != self.is_editmode
            || mat_len != self.mat_len
            || layout_key(opts) != layout_key(&self.opts)
        {
            trace!(
                "cache layout changed (editmode {}, {} materials, {:?}); \
                 clearing",
                is_editmode,
                mat_len,
                layout_key(opts),
            );
            self.discard(BufferSet::all());
            self.requested = BufferSet::EMPTY;
            self.is_editmode = is_editmode;
            self.mat_len = mat_len;
        }
        if config.hq_normals != self.hq_normals {
            self.discard([BufferKind::Lnor, BufferKind::Tan].into());
            self.hq_normals = config.hq_normals;
        }
        if opts.select_mode != self.opts.select_mode {
            self.discard([BufferKind::EditData].into());
        }
        if opts.uv_sync_select != self.opts.uv_sync_select {
            self.discard(uv_editor());
        }
        if opts.statvis != self.opts.statvis {
            self.discard([BufferKind::MeshAnalysis].into());
        }
        self.opts = *opts;
    }

    /// Makes every slot in `kinds` ready, extracting the ones that are not
    ///
    /// All missing slots are built in a single extraction pass.
    pub fn request_buffers(
        &mut self,
        source: &MeshSource,
        opts: &RenderOptions,
        kinds: BufferSet,
        config: &ExtractConfig,
    ) {
        self.validate(source, opts, config);
        self.requested = self.requested.union(kinds);
        self.layers_used_over_time |= LayerMask::of(kinds);

        let mut wanted = kinds;
        if wanted.contains(BufferKind::LinesLoose) {
            wanted.insert(BufferKind::Lines);
        }
        let missing = wanted.difference(self.ready());
        if missing.is_empty() {
            return;
        }

        let (built, descs): (Vec<BufferKind>, Vec<&'static dyn Descriptor>) =
            missing
                .iter()
                .filter_map(|k| descriptor(k, config.hq_normals).map(|d| (k, d)))
                .unzip();
        if !descs.is_empty() {
            let (bufs, report) = extract_buffers(source, opts, &descs, config);
            for (k, b) in built.into_iter().zip(bufs) {
                self.slots[k] = Some(Arc::new(b));
                self.stats.extracted[k] += 1;
            }
            self.stats.passes += 1;
            self.stats.last_report = Some(report);
        }

        if missing.contains(BufferKind::LinesLoose) {
            if let Some(lines) = &self.slots[BufferKind::Lines] {
                let range = lines
                    .as_index()
                    .and_then(|i| i.subranges().first().cloned())
                    .unwrap_or(0..0);
                let sub = IndexSub::new(lines.clone(), range);
                self.slots[BufferKind::LinesLoose] =
                    Some(Arc::new(Buffer::SubIndex(sub)));
            }
        }
    }

    /// Returns a buffer, extracting it if necessary
    pub fn request_buffer(
        &mut self,
        source: &MeshSource,
        opts: &RenderOptions,
        kind: BufferKind,
        config: &ExtractConfig,
    ) -> Arc<Buffer> {
        self.request_buffers(source, opts, [kind].into(), config);
        match &self.slots[kind] {
            Some(b) => b.clone(),
            None => unreachable!("{kind} was not built by its request"),
        }
    }

    /// Checks whether the cached mesh is closed and consistently wound
    ///
    /// Returns `None` until [`BufferKind::LinesAdjacency`] has been built.
    pub fn is_manifold(&self) -> Option<bool> {
        self.slots[BufferKind::LinesAdjacency]
            .as_ref()
            .and_then(|b| b.as_index())
            .map(LinesAdjacency::is_manifold)
    }

    /// Discards the slots affected by a change
    pub fn invalidate(&mut self, reason: DirtyReason) {
        let affected = reason.affected().intersection(self.ready());
        trace!("invalidate ({reason}): discarding {affected:?}");
        self.discard(reason.affected());
    }

    /// Evicts shaded buffers whose layers have not been requested recently
    ///
    /// Call this once per frame.  When the layers requested since the last
    /// call match the cached ones, the frame is recorded as a match;
    /// otherwise, shaded slots are discarded once `frame` is more than the
    /// configured timeout past the last match.
    pub fn free_old(&mut self, frame: u64) {
        if self.layers_used_over_time == self.layers_used() {
            self.last_match = frame;
        } else if frame.saturating_sub(self.last_match)
            > self.config.shaded_timeout
        {
            let evicted = shaded().intersection(self.ready());
            trace!("frame {frame}: evicting {evicted:?}");
            self.discard(shaded());
            self.last_match = frame;
        }
        self.layers_used_over_time = LayerMask::empty();
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Buffer caches of every mesh, keyed by mesh id
#[derive(Default)]
pub struct DrawCache {
    entries: FxHashMap<u64, BatchCache>,
    config: CacheConfig,
}

impl DrawCache {
    /// Builds an empty cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: FxHashMap::default(),
            config,
        }
    }

    /// Returns the cache of a mesh, if it exists
    pub fn get(&self, id: u64) -> Option<&BatchCache> {
        self.entries.get(&id)
    }

    /// Number of cached meshes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether no mesh is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&mut self, id: u64) -> &mut BatchCache {
        let config = self.config;
        self.entries
            .entry(id)
            .or_insert_with(|| BatchCache::new(config))
    }

    /// Makes a set of slots of one mesh ready
    pub fn request_buffers(
        &mut self,
        id: u64,
        source: &MeshSource,
        opts: &RenderOptions,
        kinds: BufferSet,
        config: &ExtractConfig,
    ) {
        self.entry(id).request_buffers(source, opts, kinds, config)
    }

    /// Returns one buffer of a mesh, extracting it if necessary
    pub fn request_buffer(
        &mut self,
        id: u64,
        source: &MeshSource,
        opts: &RenderOptions,
        kind: BufferKind,
        config: &ExtractConfig,
    ) -> Arc<Buffer> {
        self.entry(id).request_buffer(source, opts, kind, config)
    }

    /// Marks part of a mesh's cache as stale; unknown ids are ignored
    pub fn invalidate(&mut self, id: u64, reason: DirtyReason) {
        if let Some(c) = self.entries.get_mut(&id) {
            c.invalidate(reason);
        }
    }

    /// Drops the cache of a mesh that no longer exists
    pub fn remove(&mut self, id: u64) -> Option<BatchCache> {
        self.entries.remove(&id)
    }

    /// Runs [`BatchCache::free_old`] on every mesh
    pub fn free_old(&mut self, frame: u64) {
        for c in self.entries.values_mut() {
            c.free_old(frame);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::{EditMesh, Mesh, MeshBuilder};

    fn config() -> ExtractConfig<'static> {
        ExtractConfig {
            threads: None,
            ..ExtractConfig::default()
        }
    }

    /// Two quads and a loose edge
    fn mesh() -> Mesh {
        let mut b = MeshBuilder::new();
        for y in 0..2 {
            for x in 0..3 {
                b.vert([x as f32, y as f32, 0.0]);
            }
        }
        let (a, c) = (b.vert([5.0, 0.0, 0.0]), b.vert([5.0, 1.0, 0.0]));
        b.poly(&[0, 1, 4, 3]).poly(&[1, 2, 5, 4]).edge(a, c);
        b.build().unwrap()
    }

    #[test]
    fn cache_hit() {
        let src = MeshSource::object(mesh());
        let opts = RenderOptions::default();
        let mut cache = BatchCache::default();

        let a = cache.request_buffer(&src, &opts, BufferKind::PosNor, &config());
        let b = cache.request_buffer(&src, &opts, BufferKind::PosNor, &config());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.stats().passes, 1);
        assert_eq!(cache.stats().extracted[BufferKind::PosNor], 1);
    }

    #[test]
    fn selection_invalidation() {
        let src = MeshSource::edit(EditMesh::from_mesh(&mesh()));
        let opts = RenderOptions::default();
        let mut cache = BatchCache::default();
        let kinds = BufferSet::from([
            BufferKind::PosNor,
            BufferKind::Uv,
            BufferKind::EditData,
            BufferKind::FdotsNor,
        ]);
        cache.request_buffers(&src, &opts, kinds, &config());
        assert_eq!(cache.ready(), kinds);
        let pos = cache.get(BufferKind::PosNor).unwrap().clone();

        cache.invalidate(DirtyReason::Select);
        assert_eq!(
            cache.ready(),
            BufferSet::from([BufferKind::PosNor, BufferKind::Uv])
        );
        assert_eq!(cache.requested(), kinds);

        cache.request_buffers(&src, &opts, kinds, &config());
        assert_eq!(cache.ready(), kinds);
        let report = cache.stats().last_report.as_ref().unwrap();
        assert_eq!(report.extractors, ["edit_data", "fdots_nor"]);
        assert!(Arc::ptr_eq(&pos, cache.get(BufferKind::PosNor).unwrap()));
    }

    #[test]
    fn invalidation_table() {
        for reason in <DirtyReason as strum::IntoEnumIterator>::iter() {
            let affected = reason.affected();
            assert!(!affected.is_empty());
            if reason != DirtyReason::All {
                assert!(!affected.contains(BufferKind::Lines), "{reason}");
            }
        }
        assert!(DirtyReason::Shading.affected().contains(BufferKind::Tris));
        assert!(!DirtyReason::Select.affected().contains(BufferKind::PosNor));
    }

    #[test]
    fn mode_switch_clears() {
        let me = mesh();
        let opts = RenderOptions::default();
        let mut cache = BatchCache::default();
        let object = MeshSource::object(me.clone());
        cache.request_buffer(&object, &opts, BufferKind::Tris, &config());
        assert_eq!(cache.ready(), BufferSet::from([BufferKind::Tris]));

        let edit = MeshSource::edit(EditMesh::from_mesh(&me));
        cache.request_buffer(&edit, &opts, BufferKind::PosNor, &config());
        assert_eq!(cache.ready(), BufferSet::from([BufferKind::PosNor]));
    }

    #[test]
    fn layout_options_clear() {
        let src = MeshSource::edit(EditMesh::from_mesh(&mesh()));
        let mut opts = RenderOptions::default();
        let mut cache = BatchCache::default();
        let kinds = BufferSet::from([BufferKind::PosNor, BufferKind::EditData]);
        cache.request_buffers(&src, &opts, kinds, &config());
        assert_eq!(cache.ready(), kinds);

        opts.uv_edit = true;
        cache.request_buffer(&src, &opts, BufferKind::EditUvData, &config());
        assert_eq!(cache.ready(), BufferSet::from([BufferKind::EditUvData]));
        assert_eq!(
            cache.requested(),
            BufferSet::from([BufferKind::EditUvData])
        );
        assert_eq!(cache.stats().passes, 2);

        // Unchanged options keep the slot
        cache.request_buffer(&src, &opts, BufferKind::EditUvData, &config());
        assert_eq!(cache.stats().passes, 2);

        let toggles: [fn(&mut RenderOptions); 3] = [
            |o| o.prefer_final = true,
            |o| o.paint_mode = true,
            |o| o.use_hide = true,
        ];
        for f in toggles {
            let mut next = opts;
            f(&mut next);
            cache.request_buffer(&src, &opts, BufferKind::PosNor, &config());
            cache.request_buffer(&src, &next, BufferKind::Lines, &config());
            assert_eq!(cache.ready(), BufferSet::from([BufferKind::Lines]));
            assert_eq!(cache.requested(), BufferSet::from([BufferKind::Lines]));
        }
    }

    #[test]
    fn partial_options_discard() {
        use crate::config::{SelectMode, StatVisKind};

        let src = MeshSource::edit(EditMesh::from_mesh(&mesh()));
        let mut opts = RenderOptions::default();
        let mut cache = BatchCache::default();
        let kinds = BufferSet::from([
            BufferKind::PosNor,
            BufferKind::EditData,
            BufferKind::EditUvTris,
            BufferKind::MeshAnalysis,
        ]);
        cache.request_buffers(&src, &opts, kinds, &config());
        assert_eq!(cache.ready(), kinds);

        opts.select_mode = SelectMode::FACE;
        opts.uv_sync_select = !opts.uv_sync_select;
        opts.statvis.kind = StatVisKind::Distort;
        cache.request_buffers(&src, &opts, BufferSet::EMPTY, &config());
        assert_eq!(cache.ready(), BufferSet::from([BufferKind::PosNor]));
        assert_eq!(cache.requested(), kinds);
    }

    #[test]
    fn manifold_query() {
        let opts = RenderOptions::default();
        let adj = BufferKind::LinesAdjacency;
        let mut cache = BatchCache::default();
        let src = MeshSource::object(crate::mesh::test_cube());
        assert_eq!(cache.is_manifold(), None);
        cache.request_buffer(&src, &opts, adj, &config());
        assert_eq!(cache.is_manifold(), Some(true));

        let mut cache = BatchCache::default();
        let src = MeshSource::object(mesh());
        cache.request_buffer(&src, &opts, adj, &config());
        assert_eq!(cache.is_manifold(), Some(false));
    }

    #[test]
    fn lines_loose_view() {
        let src = MeshSource::object(mesh());
        let opts = RenderOptions::default();
        let mut cache = BatchCache::default();
        let loose =
            cache.request_buffer(&src, &opts, BufferKind::LinesLoose, &config());
        assert_eq!(loose.indices().unwrap(), [8, 9]);
        assert!(cache.ready().contains(BufferKind::Lines));

        let sub = loose.as_sub_index().unwrap();
        let lines = cache.get(BufferKind::Lines).unwrap();
        assert!(Arc::ptr_eq(sub.parent(), lines));

        cache.invalidate(DirtyReason::All);
        assert!(cache.ready().is_empty());
    }

    #[test]
    fn shaded_eviction() {
        let src = MeshSource::object(mesh());
        let opts = RenderOptions::default();
        let mut cache = BatchCache::new(CacheConfig { shaded_timeout: 10 });
        let kinds = BufferSet::from([BufferKind::Uv, BufferKind::PosNor]);

        // Requested every frame: never evicted
        for frame in 0..20 {
            cache.request_buffers(&src, &opts, kinds, &config());
            cache.free_old(frame);
        }
        assert_eq!(cache.ready(), kinds);
        assert_eq!(cache.stats().passes, 1);

        // No longer requested: evicted once the window passes
        for frame in 20..30 {
            cache.free_old(frame);
        }
        assert!(cache.ready().contains(BufferKind::Uv));
        cache.free_old(30);
        assert_eq!(cache.ready(), BufferSet::from([BufferKind::PosNor]));
    }

    #[test]
    fn draw_cache() {
        let src = MeshSource::object(mesh());
        let opts = RenderOptions::default();
        let mut cache = DrawCache::default();
        cache.request_buffer(1, &src, &opts, BufferKind::EdgeFac, &config());
        cache.request_buffer(2, &src, &opts, BufferKind::EdgeFac, &config());
        assert_eq!(cache.len(), 2);

        cache.invalidate(1, DirtyReason::All);
        cache.invalidate(3, DirtyReason::All);
        assert!(cache.get(1).unwrap().ready().is_empty());
        assert!(!cache.get(2).unwrap().ready().is_empty());

        assert!(cache.remove(2).is_some());
        assert!(cache.get(2).is_none());
    }
}
