//! Typed view over the log metadata section.
//!
//! The metadata section is the control plane between the driver and
//! publishers: geometry stamped once at creation (initial term id, term
//! and MTU lengths, header template), liveness fields the driver updates
//! as status messages arrive, and the hot rotation state (tail counters,
//! active partition index) mutated by the term appender.
//!
//! Geometry fields are plain loads; anything that changes after creation
//! goes through volatile/ordered access.

use triptych_proto::{DefaultFrameHeader, Result};

use crate::buffer::AtomicBuffer;
use crate::log::descriptor;

/// View over a log's metadata section.
#[derive(Debug, Clone)]
pub struct LogMeta {
    buffer: AtomicBuffer,
}

impl LogMeta {
    /// Wrap the metadata buffer of a log.
    #[must_use]
    pub fn new(buffer: AtomicBuffer) -> Self {
        assert!(
            buffer.capacity() >= descriptor::LOG_META_DATA_LENGTH,
            "metadata buffer too small: {} < {}",
            buffer.capacity(),
            descriptor::LOG_META_DATA_LENGTH
        );
        Self { buffer }
    }

    /// Term id of the first term of the stream.
    #[must_use]
    pub fn initial_term_id(&self) -> i32 {
        self.buffer.get_i32(descriptor::LOG_INITIAL_TERM_ID_OFFSET)
    }

    /// MTU bounding any single frame including its header.
    #[must_use]
    pub fn mtu_length(&self) -> usize {
        self.buffer.get_i32(descriptor::LOG_MTU_LENGTH_OFFSET) as usize
    }

    /// Length of each term partition.
    #[must_use]
    pub fn term_length(&self) -> usize {
        self.buffer.get_i32(descriptor::LOG_TERM_LENGTH_OFFSET) as usize
    }

    /// Index of the partition currently being appended to.
    #[must_use]
    pub fn active_partition_index(&self) -> usize {
        self.buffer.get_i32_volatile(descriptor::LOG_ACTIVE_PARTITION_INDEX_OFFSET) as usize
    }

    /// Raw tail counter of `partition_index` (volatile).
    #[must_use]
    pub fn raw_tail_volatile(&self, partition_index: usize) -> i64 {
        self.buffer.get_i64_volatile(descriptor::tail_counter_offset(partition_index))
    }

    /// Milliseconds-since-epoch timestamp of the last status message the
    /// driver saw for this publication.
    #[must_use]
    pub fn time_of_last_status_message(&self) -> i64 {
        self.buffer.get_i64_volatile(descriptor::LOG_TIME_OF_LAST_SM_OFFSET)
    }

    /// Driver-maintained connected flag.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.buffer.get_i32_volatile(descriptor::LOG_IS_CONNECTED_OFFSET) == 1
    }

    /// Copy of the driver-supplied default frame header template.
    pub fn default_frame_header(&self) -> Result<DefaultFrameHeader> {
        let mut bytes = [0u8; DefaultFrameHeader::SIZE];
        self.buffer.get_bytes(descriptor::LOG_DEFAULT_FRAME_HEADER_OFFSET, &mut bytes);
        DefaultFrameHeader::from_bytes(&bytes).copied()
    }

    /// Release-publish a new active partition index (rotation step 2).
    pub(crate) fn activate_partition(&self, partition_index: usize) {
        self.buffer.put_i32_ordered(
            descriptor::LOG_ACTIVE_PARTITION_INDEX_OFFSET,
            partition_index as i32,
        );
    }

    /// CAS a partition's raw tail (rotation step 1). Loss is benign: the
    /// winner has installed the same or a newer term.
    pub(crate) fn cas_raw_tail(&self, partition_index: usize, expected: i64, update: i64) -> bool {
        self.buffer.compare_and_set_i64(
            descriptor::tail_counter_offset(partition_index),
            expected,
            update,
        )
    }

    /// Stamp the geometry of a fresh log the way the driver does at
    /// creation time.
    ///
    /// Tail counter 0 is seeded with the initial term id; the inactive
    /// partitions are seeded `PARTITION_COUNT` terms behind so the first
    /// rotations find the expected stale term ids.
    pub fn initialize(
        &self,
        initial_term_id: i32,
        term_length: usize,
        mtu_length: usize,
        template: &DefaultFrameHeader,
    ) {
        self.buffer.put_i32(descriptor::LOG_INITIAL_TERM_ID_OFFSET, initial_term_id);
        self.buffer.put_i32(descriptor::LOG_TERM_LENGTH_OFFSET, term_length as i32);
        self.buffer.put_i32(descriptor::LOG_MTU_LENGTH_OFFSET, mtu_length as i32);
        self.buffer.put_bytes(descriptor::LOG_DEFAULT_FRAME_HEADER_OFFSET, &template.to_bytes());

        self.buffer.put_i64(
            descriptor::tail_counter_offset(0),
            descriptor::pack_raw_tail(initial_term_id, 0),
        );
        for index in 1..descriptor::PARTITION_COUNT {
            let stale_term_id = initial_term_id
                .wrapping_add(index as i32)
                .wrapping_sub(descriptor::PARTITION_COUNT as i32);
            self.buffer.put_i64(
                descriptor::tail_counter_offset(index),
                descriptor::pack_raw_tail(stale_term_id, 0),
            );
        }

        self.buffer.put_i32_ordered(descriptor::LOG_ACTIVE_PARTITION_INDEX_OFFSET, 0);
    }

    /// Driver-side: stamp the arrival time of a status message.
    pub fn set_time_of_last_status_message(&self, time_ms: i64) {
        self.buffer.put_i64_ordered(descriptor::LOG_TIME_OF_LAST_SM_OFFSET, time_ms);
    }

    /// Driver-side: flip the connected flag.
    pub fn set_is_connected(&self, is_connected: bool) {
        self.buffer
            .put_i32_ordered(descriptor::LOG_IS_CONNECTED_OFFSET, i32::from(is_connected));
    }
}

#[cfg(test)]
mod tests {
    use triptych_proto::{FrameFlags, TERM_MIN_LENGTH};

    use super::*;
    use crate::log::LogBuffers;

    fn fresh_meta() -> LogMeta {
        let log = LogBuffers::allocate(TERM_MIN_LENGTH).expect("valid term length");
        LogMeta::new(log.meta_buffer())
    }

    #[test]
    fn initialize_stamps_geometry() {
        let meta = fresh_meta();
        let template = DefaultFrameHeader::new(11, 1001);
        meta.initialize(42, TERM_MIN_LENGTH, 4096, &template);

        assert_eq!(meta.initial_term_id(), 42);
        assert_eq!(meta.term_length(), TERM_MIN_LENGTH);
        assert_eq!(meta.mtu_length(), 4096);
        assert_eq!(meta.active_partition_index(), 0);

        let parsed = meta.default_frame_header().expect("valid template");
        assert_eq!(parsed.session_id(), 11);
        assert_eq!(parsed.stream_id(), 1001);
        assert_eq!(parsed.flags(), FrameFlags::UNFRAGMENTED);
    }

    #[test]
    fn tail_counters_are_seeded_for_rotation() {
        let meta = fresh_meta();
        meta.initialize(100, TERM_MIN_LENGTH, 4096, &DefaultFrameHeader::new(1, 1));

        assert_eq!(descriptor::term_id_from_raw_tail(meta.raw_tail_volatile(0)), 100);
        // One and two terms ahead in rotation order, three behind in id.
        assert_eq!(descriptor::term_id_from_raw_tail(meta.raw_tail_volatile(1)), 98);
        assert_eq!(descriptor::term_id_from_raw_tail(meta.raw_tail_volatile(2)), 99);
        assert_eq!(descriptor::term_offset_from_raw_tail(meta.raw_tail_volatile(1)), 0);
    }

    #[test]
    fn liveness_fields_round_trip() {
        let meta = fresh_meta();

        assert_eq!(meta.time_of_last_status_message(), 0);
        assert!(!meta.is_connected());

        meta.set_time_of_last_status_message(123_456);
        meta.set_is_connected(true);

        assert_eq!(meta.time_of_last_status_message(), 123_456);
        assert!(meta.is_connected());
    }

    #[test]
    fn cas_raw_tail_requires_expected_value() {
        let meta = fresh_meta();
        meta.initialize(7, TERM_MIN_LENGTH, 4096, &DefaultFrameHeader::new(1, 1));

        let current = meta.raw_tail_volatile(1);
        let update = descriptor::pack_raw_tail(8, 0);

        assert!(!meta.cas_raw_tail(1, current + 1, update));
        assert!(meta.cas_raw_tail(1, current, update));
        assert_eq!(descriptor::term_id_from_raw_tail(meta.raw_tail_volatile(1)), 8);
    }
}
