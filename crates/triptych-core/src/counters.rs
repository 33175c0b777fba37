//! Shared position counters maintained by the media driver.
//!
//! The publication limit is the single back-pressure signal between the
//! driver and publishers: the driver advances it with release stores as
//! subscribers consume, publishers load it with acquire before every
//! append. In-process it is a cache-padded atomic; across processes the
//! same protocol runs over a slot in the driver's counters file.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crossbeam_utils::CachePadded;

/// A monotonically non-decreasing position counter shared between the
/// driver (writer) and publishers (readers).
#[derive(Debug, Clone)]
pub struct PositionCounter {
    value: Arc<CachePadded<AtomicI64>>,
}

impl PositionCounter {
    /// Create a counter starting at `initial`.
    #[must_use]
    pub fn new(initial: i64) -> Self {
        Self { value: Arc::new(CachePadded::new(AtomicI64::new(initial))) }
    }

    /// Volatile (acquire) read, the publisher side of the protocol.
    #[must_use]
    pub fn get_volatile(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Ordered (release) write, the driver side of the protocol.
    ///
    /// The counter contract is monotonic non-decrease; this is not
    /// enforced here because the driver owns the write side.
    pub fn set_ordered(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }
}

impl Default for PositionCounter {
    fn default() -> Self {
        Self::new(0)
    }
}
