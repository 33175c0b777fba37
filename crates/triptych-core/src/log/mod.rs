//! Log buffer layout: three rotating term partitions plus a metadata
//! section shared with the media driver.
//!
//! While one partition is actively appended to, the previous holds the
//! dirty tail awaiting cleaning and the next is clean and ready, so
//! rotation never waits. The driver owns creation and cleaning; this
//! module only carves typed views out of the region.

use triptych_proto::{ProtocolError, Result, validate_term_length};

use crate::buffer::AtomicBuffer;

pub mod meta;

pub use meta::LogMeta;

/// Fixed offsets within the log region and its metadata section.
///
/// The metadata section sits after the three term partitions:
///
/// ```text
/// +----------------------------+
/// |        Term 0              |
/// +----------------------------+
/// |        Term 1              |
/// +----------------------------+
/// |        Term 2              |
/// +----------------------------+
/// |  0: tail counter 0         |
/// |  8: tail counter 1         |
/// | 16: tail counter 2         |
/// | 24: active partition index |
/// | 64: time of last SM        |
/// | 72: is-connected flag      |
/// |128: initial term id        |
/// |132: mtu length             |
/// |136: term length            |
/// |192: default header (48 B)  |
/// +----------------------------+
/// ```
///
/// Tail counters pack `termId` in the high 32 bits and the next free
/// term offset in the low 32. The default-header slot is 48 bytes of
/// which the leading 32 hold the frame header template; the trailer is
/// reserved.
pub mod descriptor {
    /// Number of term partitions in a log.
    pub const PARTITION_COUNT: usize = 3;

    /// Partition index at which the metadata section begins.
    pub const LOG_META_DATA_SECTION_INDEX: usize = PARTITION_COUNT;

    /// Assumed cache line length for field spacing.
    pub const CACHE_LINE_LENGTH: usize = 64;

    /// Offset of the first tail counter.
    pub const TERM_TAIL_COUNTERS_OFFSET: usize = 0;

    /// Offset of the active partition index.
    pub const LOG_ACTIVE_PARTITION_INDEX_OFFSET: usize = PARTITION_COUNT * 8;

    /// Offset of the time-of-last-status-message field (ms since epoch).
    pub const LOG_TIME_OF_LAST_SM_OFFSET: usize = CACHE_LINE_LENGTH;

    /// Offset of the driver-maintained is-connected flag.
    pub const LOG_IS_CONNECTED_OFFSET: usize = LOG_TIME_OF_LAST_SM_OFFSET + 8;

    /// Offset of the initial term id.
    pub const LOG_INITIAL_TERM_ID_OFFSET: usize = 2 * CACHE_LINE_LENGTH;

    /// Offset of the MTU length.
    pub const LOG_MTU_LENGTH_OFFSET: usize = LOG_INITIAL_TERM_ID_OFFSET + 4;

    /// Offset of the term length.
    pub const LOG_TERM_LENGTH_OFFSET: usize = LOG_INITIAL_TERM_ID_OFFSET + 8;

    /// Offset of the default frame header template slot.
    pub const LOG_DEFAULT_FRAME_HEADER_OFFSET: usize = 3 * CACHE_LINE_LENGTH;

    /// Size of the template slot (32 bytes used, 16 reserved).
    pub const LOG_DEFAULT_FRAME_HEADER_SLOT_LENGTH: usize = 48;

    /// Total length of the metadata section.
    pub const LOG_META_DATA_LENGTH: usize = 4 * CACHE_LINE_LENGTH;

    /// Offset of the tail counter for `partition_index`.
    #[must_use]
    pub fn tail_counter_offset(partition_index: usize) -> usize {
        debug_assert!(partition_index < PARTITION_COUNT);
        TERM_TAIL_COUNTERS_OFFSET + partition_index * 8
    }

    /// Pack a `(termId, termOffset)` pair into a raw tail value.
    #[must_use]
    pub fn pack_raw_tail(term_id: i32, term_offset: i32) -> i64 {
        (i64::from(term_id) << 32) | i64::from(term_offset as u32)
    }

    /// Term id half of a raw tail value.
    #[must_use]
    pub fn term_id_from_raw_tail(raw_tail: i64) -> i32 {
        (raw_tail >> 32) as i32
    }

    /// Term offset half of a raw tail value, unclamped.
    ///
    /// After a term trips, concurrent fetch-adds keep pushing this past
    /// the term length; callers clamp against the term length when
    /// computing positions.
    #[must_use]
    pub fn term_offset_from_raw_tail(raw_tail: i64) -> i64 {
        raw_tail & 0xFFFF_FFFF
    }

    /// Next partition in rotation order.
    #[must_use]
    pub fn next_partition_index(partition_index: usize) -> usize {
        (partition_index + 1) % PARTITION_COUNT
    }
}

/// Typed access to one log region: three term buffers and the metadata
/// section. Cloning is cheap; clones share the underlying region.
#[derive(Debug, Clone)]
pub struct LogBuffers {
    buffer: AtomicBuffer,
    term_length: usize,
}

impl LogBuffers {
    /// Allocate a fresh zeroed in-process log for `term_length` terms.
    pub fn allocate(term_length: usize) -> Result<Self> {
        validate_term_length(term_length)?;
        let len = term_length * descriptor::PARTITION_COUNT + descriptor::LOG_META_DATA_LENGTH;
        Ok(Self { buffer: AtomicBuffer::allocate(len), term_length })
    }

    /// Wrap an existing region, e.g. one mapped from a driver log file.
    ///
    /// The term length is derived from the region size, which must be
    /// exactly three terms plus the metadata section.
    pub fn wrap(buffer: AtomicBuffer) -> Result<Self> {
        let capacity = buffer.capacity();
        let term_length = capacity
            .checked_sub(descriptor::LOG_META_DATA_LENGTH)
            .map(|terms| terms / descriptor::PARTITION_COUNT)
            .ok_or(ProtocolError::InvalidTermLength { length: 0 })?;
        validate_term_length(term_length)?;
        if term_length * descriptor::PARTITION_COUNT + descriptor::LOG_META_DATA_LENGTH != capacity
        {
            return Err(ProtocolError::InvalidTermLength { length: term_length });
        }
        Ok(Self { buffer, term_length })
    }

    /// Length of each term partition.
    #[must_use]
    pub fn term_length(&self) -> usize {
        self.term_length
    }

    /// View over term partition `index`.
    #[must_use]
    pub fn term_buffer(&self, index: usize) -> AtomicBuffer {
        assert!(index < descriptor::PARTITION_COUNT, "partition index {index} out of range");
        self.buffer.slice(index * self.term_length, self.term_length)
    }

    /// View over the metadata section.
    #[must_use]
    pub fn meta_buffer(&self) -> AtomicBuffer {
        self.buffer.slice(
            descriptor::LOG_META_DATA_SECTION_INDEX * self.term_length,
            descriptor::LOG_META_DATA_LENGTH,
        )
    }
}

#[cfg(test)]
mod tests {
    use triptych_proto::TERM_MIN_LENGTH;

    use super::*;

    #[test]
    fn raw_tail_packs_and_unpacks() {
        let raw = descriptor::pack_raw_tail(77, 4096);
        assert_eq!(descriptor::term_id_from_raw_tail(raw), 77);
        assert_eq!(descriptor::term_offset_from_raw_tail(raw), 4096);

        // Negative term ids survive the round trip.
        let raw = descriptor::pack_raw_tail(-3, 64);
        assert_eq!(descriptor::term_id_from_raw_tail(raw), -3);
        assert_eq!(descriptor::term_offset_from_raw_tail(raw), 64);
    }

    #[test]
    fn partition_rotation_cycles() {
        assert_eq!(descriptor::next_partition_index(0), 1);
        assert_eq!(descriptor::next_partition_index(1), 2);
        assert_eq!(descriptor::next_partition_index(2), 0);
    }

    #[test]
    fn allocate_carves_three_terms_and_metadata() {
        let log = LogBuffers::allocate(TERM_MIN_LENGTH).expect("valid term length");
        assert_eq!(log.term_length(), TERM_MIN_LENGTH);
        for index in 0..descriptor::PARTITION_COUNT {
            assert_eq!(log.term_buffer(index).capacity(), TERM_MIN_LENGTH);
        }
        assert_eq!(log.meta_buffer().capacity(), descriptor::LOG_META_DATA_LENGTH);
    }

    #[test]
    fn term_buffers_are_disjoint() {
        let log = LogBuffers::allocate(TERM_MIN_LENGTH).expect("valid term length");
        log.term_buffer(1).put_i64(0, 42);
        assert_eq!(log.term_buffer(0).get_i64(0), 0);
        assert_eq!(log.term_buffer(2).get_i64(0), 0);
        assert_eq!(log.term_buffer(1).get_i64(0), 42);
    }

    #[test]
    fn wrap_rejects_bad_sizes() {
        assert!(LogBuffers::wrap(AtomicBuffer::allocate(1024)).is_err());

        let good = TERM_MIN_LENGTH * descriptor::PARTITION_COUNT + descriptor::LOG_META_DATA_LENGTH;
        assert!(LogBuffers::wrap(AtomicBuffer::allocate(good)).is_ok());
        assert!(LogBuffers::wrap(AtomicBuffer::allocate(good + 8)).is_err());
    }

    #[test]
    fn allocate_rejects_invalid_term_length() {
        assert!(LogBuffers::allocate(TERM_MIN_LENGTH - 1).is_err());
        assert!(LogBuffers::allocate(0).is_err());
    }
}
