//! Per-pass state of one extractor
use std::{
    cell::UnsafeCell,
    ops::Range,
    sync::{
        OnceLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use strum::IntoEnumIterator;

use super::{Domain, ElementKind, Extract};
use crate::{
    buffer::{Buffer, Window},
    render_data::{MeshRenderData, Store},
};

/// Operations the scheduler performs on an extractor during one pass
///
/// The scheduler guarantees that [`ExtractJob::init`] completes before any
/// [`ExtractJob::run_chunk`] call starts, and that each chunk covers a
/// distinct range of elements.
pub trait ExtractJob: Sync {
    /// Name of the extractor
    fn name(&self) -> &'static str;

    /// Allocates the destination buffer and accumulator
    fn init(&self);

    /// Sets the number of chunks that must complete before finish runs
    fn set_chunk_count(&self, n: usize);

    /// Iterates one chunk of elements
    ///
    /// The chunk that completes last also runs the finish step.
    fn run_chunk(&self, kind: ElementKind, range: Range<usize>);

    /// Runs init, every element of every kind, then finish
    fn run_all(&self);

    /// Returns the finished buffer
    ///
    /// # Panics
    /// If the finish step has not run
    fn into_buffer(self: Box<Self>) -> Buffer;
}

/// Base pointer and length of the destination's element storage
struct RawSlice<T> {
    ptr: *mut T,
    len: usize,
}

// SAFETY: the pointer is only dereferenced through disjoint windows, as
// described on `Job`
unsafe impl<T: Send> Send for RawSlice<T> {}
unsafe impl<T: Send> Sync for RawSlice<T> {}

pub(super) struct Job<'a, E: Extract> {
    extractor: &'a E,
    mr: &'a MeshRenderData<'a>,
    data: OnceLock<E::Data>,
    buffer: UnsafeCell<Option<Buffer>>,
    storage: OnceLock<RawSlice<E::Elem>>,
    remaining: AtomicUsize,
    finished: AtomicBool,

    /// Destination ranges handed out so far, checked for overlap
    #[cfg(debug_assertions)]
    claimed: std::sync::Mutex<Vec<Range<usize>>>,
}

// SAFETY: `buffer` is written once by `init`, which the task graph orders
// before every chunk.  Chunks then only touch it through windows built from
// `storage` over disjoint ranges.  The finish step takes `&mut Buffer` only
// after the completion counter reaches zero (with acquire-release ordering),
// at which point no window is alive.
unsafe impl<E: Extract> Sync for Job<'_, E> {}

impl<'a, E: Extract> Job<'a, E> {
    pub(super) fn new(extractor: &'a E, mr: &'a MeshRenderData<'a>) -> Self {
        Self {
            extractor,
            mr,
            data: OnceLock::new(),
            buffer: UnsafeCell::new(None),
            storage: OnceLock::new(),
            remaining: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
            #[cfg(debug_assertions)]
            claimed: std::sync::Mutex::new(vec![]),
        }
    }

    fn data(&self) -> &E::Data {
        match self.data.get() {
            Some(d) => d,
            None => panic!("{} used before init", E::NAME),
        }
    }

    fn storage(&self) -> &RawSlice<E::Elem> {
        match self.storage.get() {
            Some(s) => s,
            None => panic!("{} used before init", E::NAME),
        }
    }

    /// Maps a chunk of elements onto its destination range
    fn dest_range(&self, kind: ElementKind, r: &Range<usize>) -> Range<usize> {
        let mr = self.mr;
        match (E::DOMAIN, kind) {
            (Domain::Loop, ElementKind::Poly) => {
                mr.poly_loop_start(r.start)..mr.poly_loop_start(r.end)
            }
            (Domain::Loop, ElementKind::LEdge) => {
                let s = mr.ledge_loop_start();
                s + 2 * r.start..s + 2 * r.end
            }
            (Domain::Loop, ElementKind::LVert) => {
                let s = mr.lvert_loop_start();
                s + r.start..s + r.end
            }
            (Domain::Poly, ElementKind::Poly) => r.clone(),
            (d, k) => panic!("{} can't chunk {k:?} in {d:?} domain", E::NAME),
        }
    }

    /// Builds a mutable window over a destination range
    ///
    /// # Panics
    /// If the range is out of bounds or (in debug builds) overlaps a range
    /// that was already handed out
    fn window(&self, dest: Range<usize>) -> Window<'_, E::Elem> {
        let s = self.storage();
        assert!(
            dest.start <= dest.end && dest.end <= s.len,
            "{}: range {dest:?} is outside of {} elements",
            E::NAME,
            s.len
        );
        #[cfg(debug_assertions)]
        self.claim(&dest);

        // SAFETY: the range is in bounds, and callers never request
        // overlapping ranges within one pass (checked above in debug builds)
        let data = unsafe {
            std::slice::from_raw_parts_mut(s.ptr.add(dest.start), dest.len())
        };
        Window::new(dest.start, data)
    }

    #[cfg(debug_assertions)]
    fn claim(&self, r: &Range<usize>) {
        if r.is_empty() {
            return;
        }
        let mut claimed = match self.claimed.lock() {
            Ok(c) => c,
            Err(e) => e.into_inner(),
        };
        assert!(
            claimed.iter().all(|c| c.end <= r.start || r.end <= c.start),
            "{}: chunk {r:?} overlaps another chunk",
            E::NAME
        );
        claimed.push(r.clone());
    }

    fn iterate(
        &self,
        kind: ElementKind,
        range: Range<usize>,
        w: &mut Window<'_, E::Elem>,
    ) {
        let Some(pair) = E::CALLBACKS.get(kind) else {
            panic!("{} does not iterate {kind:?}", E::NAME);
        };
        let data = self.data();
        match self.mr.store() {
            Store::Edit(bm) => {
                (pair.edit)(self.extractor, self.mr, bm, range, data, w)
            }
            Store::Mesh(me) => {
                (pair.mesh)(self.extractor, self.mr, me, range, data, w)
            }
        }
    }

    fn finish(&self) {
        let done = self.finished.swap(true, Ordering::AcqRel);
        assert!(!done, "{} finished twice", E::NAME);

        // SAFETY: every chunk has completed and dropped its window
        let buf = unsafe { &mut *self.buffer.get() };
        let Some(buf) = buf.as_mut() else {
            panic!("{} finished before init", E::NAME);
        };
        self.extractor.finish(self.mr, buf, self.data());
    }
}

impl<E: Extract> ExtractJob for Job<'_, E> {
    fn name(&self) -> &'static str {
        E::NAME
    }

    fn init(&self) {
        let (buf, data) = self.extractor.init(self.mr);
        if self.data.set(data).is_err() {
            panic!("{} initialized twice", E::NAME);
        }

        // SAFETY: init runs once, before anything else reads the buffer
        let cell = unsafe { &mut *self.buffer.get() };
        let buf = cell.insert(buf);
        let Some(elems) = buf.elems_mut::<E::Elem>() else {
            panic!("{} buffer does not hold its element type", E::NAME);
        };
        let raw = RawSlice {
            ptr: elems.as_mut_ptr(),
            len: elems.len(),
        };
        if self.storage.set(raw).is_err() {
            unreachable!()
        }
    }

    fn set_chunk_count(&self, n: usize) {
        assert!(n > 0);
        self.remaining.store(n, Ordering::Release);
    }

    fn run_chunk(&self, kind: ElementKind, range: Range<usize>) {
        {
            let dest = self.dest_range(kind, &range);
            let mut w = self.window(dest);
            self.iterate(kind, range, &mut w);
        }
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.finish();
        }
    }

    fn run_all(&self) {
        self.init();
        {
            let mut w = self.window(0..self.storage().len);
            for kind in ElementKind::iter() {
                if E::CALLBACKS.get(kind).is_some() {
                    let n = self.mr.iter_len(kind.flag());
                    self.iterate(kind, 0..n, &mut w);
                }
            }
        }
        self.finish();
    }

    fn into_buffer(self: Box<Self>) -> Buffer {
        assert!(
            self.finished.load(Ordering::Acquire),
            "{} did not finish",
            E::NAME
        );
        match self.buffer.into_inner() {
            Some(b) => b,
            None => unreachable!(),
        }
    }
}
