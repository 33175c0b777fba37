//! Atomic view over a shared log region.
//!
//! Publishers and the driver communicate exclusively through atomic
//! loads and stores at fixed offsets inside mmap-style regions. This
//! module is the one place that turns raw region bytes into those
//! atomics; everything above it (metadata view, term appender, claims)
//! speaks in offsets and never touches a pointer.
//!
//! Concurrency contract, mirrored from the frame protocol:
//!
//! - control words (frame length, tail counters, partition index) are
//!   only ever accessed through the atomic methods;
//! - bulk payload bytes are copied non-atomically, which is sound
//!   because a claimed `[offset, offset + length)` range is exclusively
//!   owned by one producer until the frame length is release-published,
//!   and readers load that length with acquire before touching payload.
//!
//! Every offset is bounds-checked against the view and every atomic
//! offset is alignment-checked; a violation is a logic bug upstream and
//! fails loudly rather than corrupting the shared region.

#![allow(unsafe_code)]

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU8, AtomicU16, Ordering};

/// A bounds-checked atomic window onto a shared byte region.
///
/// Views are cheap to clone and slice; they share an owner handle that
/// keeps the underlying allocation (or mapping) alive for as long as any
/// view, claim, or publication still references it.
pub struct AtomicBuffer {
    ptr: *mut u8,
    len: usize,
    owner: Arc<dyn Any + Send + Sync>,
}

// SAFETY: all mutation goes through atomics or through bulk copies whose
// exclusivity is guaranteed by the claim protocol documented above; the
// owner handle is itself Send + Sync.
unsafe impl Send for AtomicBuffer {}
// SAFETY: as above; shared references only expose atomic operations.
unsafe impl Sync for AtomicBuffer {}

impl Clone for AtomicBuffer {
    fn clone(&self) -> Self {
        Self { ptr: self.ptr, len: self.len, owner: Arc::clone(&self.owner) }
    }
}

impl std::fmt::Debug for AtomicBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicBuffer").field("len", &self.len).finish_non_exhaustive()
    }
}

impl AtomicBuffer {
    /// Allocate a zeroed, 8-byte-aligned in-process region.
    ///
    /// This is the in-process stand-in for a driver-mapped file: tests
    /// and same-process pub/sub use it directly, while real deployments
    /// wrap their mapping via [`AtomicBuffer::from_raw_parts`].
    #[must_use]
    pub fn allocate(len: usize) -> Self {
        assert!(len > 0, "cannot allocate an empty buffer");
        let words: Arc<Vec<AtomicI64>> =
            Arc::new(std::iter::repeat_with(|| AtomicI64::new(0)).take(len.div_ceil(8)).collect());
        let ptr = words.as_ptr().cast::<u8>().cast_mut();
        Self { ptr, len, owner: words }
    }

    /// Wrap an externally owned region, e.g. a mapping shared with the
    /// media driver.
    ///
    /// # Safety
    ///
    /// - `ptr` must be valid for reads and writes of `len` bytes and
    ///   8-byte aligned;
    /// - the region must stay mapped for as long as `owner` is alive,
    ///   and `owner` must actually own that lifetime (RAII mapping);
    /// - all concurrent access to the region, from this process or any
    ///   other, must follow the control-word/bulk-copy contract in the
    ///   module docs.
    #[must_use]
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize, owner: Arc<dyn Any + Send + Sync>) -> Self {
        assert!(!ptr.is_null(), "region pointer is null");
        assert!(ptr.addr() % 8 == 0, "region pointer is not 8-byte aligned");
        Self { ptr, len, owner }
    }

    /// Length of this view in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.len
    }

    /// Narrow the view to `[offset, offset + len)`, sharing the owner.
    ///
    /// The slice offset must be 8-byte aligned so atomic offsets within
    /// the slice stay aligned.
    #[must_use]
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        assert!(offset % 8 == 0, "slice offset {offset} is not 8-byte aligned");
        self.bounds_check(offset, len);
        Self {
            // SAFETY: bounds checked above; the result stays inside the region.
            ptr: unsafe { self.ptr.add(offset) },
            len,
            owner: Arc::clone(&self.owner),
        }
    }

    fn bounds_check(&self, offset: usize, size: usize) {
        assert!(
            offset.checked_add(size).is_some_and(|end| end <= self.len),
            "access [{offset}, +{size}) out of bounds for buffer of {len} bytes",
            len = self.len
        );
    }

    fn atomic_i32(&self, offset: usize) -> &AtomicI32 {
        self.bounds_check(offset, 4);
        assert!(offset % 4 == 0, "i32 offset {offset} is not 4-byte aligned");
        // SAFETY: in range, aligned, and the region outlives self via owner.
        unsafe { &*self.ptr.add(offset).cast::<AtomicI32>() }
    }

    fn atomic_i64(&self, offset: usize) -> &AtomicI64 {
        self.bounds_check(offset, 8);
        assert!(offset % 8 == 0, "i64 offset {offset} is not 8-byte aligned");
        // SAFETY: in range, aligned, and the region outlives self via owner.
        unsafe { &*self.ptr.add(offset).cast::<AtomicI64>() }
    }

    fn atomic_u8(&self, offset: usize) -> &AtomicU8 {
        self.bounds_check(offset, 1);
        // SAFETY: in range; byte atomics have no alignment requirement.
        unsafe { &*self.ptr.add(offset).cast::<AtomicU8>() }
    }

    fn atomic_u16(&self, offset: usize) -> &AtomicU16 {
        self.bounds_check(offset, 2);
        assert!(offset % 2 == 0, "u16 offset {offset} is not 2-byte aligned");
        // SAFETY: in range, aligned.
        unsafe { &*self.ptr.add(offset).cast::<AtomicU16>() }
    }

    /// Volatile (acquire) load of an i32 control word.
    #[must_use]
    pub fn get_i32_volatile(&self, offset: usize) -> i32 {
        self.atomic_i32(offset).load(Ordering::Acquire)
    }

    /// Ordered (release) store of an i32 control word.
    pub fn put_i32_ordered(&self, offset: usize, value: i32) {
        self.atomic_i32(offset).store(value, Ordering::Release);
    }

    /// Plain (relaxed) load of an i32.
    #[must_use]
    pub fn get_i32(&self, offset: usize) -> i32 {
        self.atomic_i32(offset).load(Ordering::Relaxed)
    }

    /// Plain (relaxed) store of an i32.
    pub fn put_i32(&self, offset: usize, value: i32) {
        self.atomic_i32(offset).store(value, Ordering::Relaxed);
    }

    /// Volatile (acquire) load of an i64 control word.
    #[must_use]
    pub fn get_i64_volatile(&self, offset: usize) -> i64 {
        self.atomic_i64(offset).load(Ordering::Acquire)
    }

    /// Ordered (release) store of an i64 control word.
    pub fn put_i64_ordered(&self, offset: usize, value: i64) {
        self.atomic_i64(offset).store(value, Ordering::Release);
    }

    /// Plain (relaxed) load of an i64.
    #[must_use]
    pub fn get_i64(&self, offset: usize) -> i64 {
        self.atomic_i64(offset).load(Ordering::Relaxed)
    }

    /// Plain (relaxed) store of an i64.
    pub fn put_i64(&self, offset: usize, value: i64) {
        self.atomic_i64(offset).store(value, Ordering::Relaxed);
    }

    /// Atomic fetch-add on an i64 counter, returning the previous value.
    ///
    /// This is the linearisation point for producers claiming term space.
    #[must_use]
    pub fn get_and_add_i64(&self, offset: usize, delta: i64) -> i64 {
        self.atomic_i64(offset).fetch_add(delta, Ordering::AcqRel)
    }

    /// Compare-and-set on an i64 control word.
    ///
    /// Returns true if the word was `expected` and is now `update`.
    pub fn compare_and_set_i64(&self, offset: usize, expected: i64, update: i64) -> bool {
        self.atomic_i64(offset)
            .compare_exchange(expected, update, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Plain (relaxed) load of a byte.
    #[must_use]
    pub fn get_u8(&self, offset: usize) -> u8 {
        self.atomic_u8(offset).load(Ordering::Relaxed)
    }

    /// Plain (relaxed) store of a byte.
    pub fn put_u8(&self, offset: usize, value: u8) {
        self.atomic_u8(offset).store(value, Ordering::Relaxed);
    }

    /// Plain (relaxed) load of a u16.
    #[must_use]
    pub fn get_u16(&self, offset: usize) -> u16 {
        self.atomic_u16(offset).load(Ordering::Relaxed)
    }

    /// Plain (relaxed) store of a u16.
    pub fn put_u16(&self, offset: usize, value: u16) {
        self.atomic_u16(offset).store(value, Ordering::Relaxed);
    }

    /// Bulk-copy `src` into the buffer at `offset`.
    ///
    /// Non-atomic: the caller must hold the claim on the target range,
    /// i.e. the range was reserved by a tail fetch-add and its frame
    /// length has not been published yet.
    pub fn put_bytes(&self, offset: usize, src: &[u8]) {
        self.bounds_check(offset, src.len());
        // SAFETY: in range; exclusivity per the claim contract; `src`
        // cannot overlap the region because the region is only reachable
        // through atomic views.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.add(offset), src.len());
        }
    }

    /// Bulk-copy out of the buffer at `offset` into `dst`.
    ///
    /// Non-atomic: callers must have observed the covering frame length
    /// with an acquire load first (or otherwise own the range).
    pub fn get_bytes(&self, offset: usize, dst: &mut [u8]) {
        self.bounds_check(offset, dst.len());
        // SAFETY: in range; happens-after the release publish per contract.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.add(offset), dst.as_mut_ptr(), dst.len());
        }
    }

    /// Fill `[offset, offset + len)` with `value`.
    ///
    /// Same exclusivity contract as [`AtomicBuffer::put_bytes`].
    pub fn set_memory(&self, offset: usize, len: usize, value: u8) {
        self.bounds_check(offset, len);
        // SAFETY: in range; exclusivity per the claim contract.
        unsafe {
            std::ptr::write_bytes(self.ptr.add(offset), value, len);
        }
    }
}
