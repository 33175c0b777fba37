//! Per-partition term appender.
//!
//! All producer coordination within a term happens on one atomic: the
//! partition's tail counter. A fetch-add both claims a byte range and
//! linearises the claimant against every other producer; everything
//! after that operates on a range nobody else can touch. The appender
//! never blocks and never retries internally; when a claim does not fit
//! the remaining term it stamps padding (or observes someone else
//! already did) and reports back so the publication can rotate.

use triptych_proto::{
    DATA_OFFSET, FLAGS_OFFSET, FRAME_ALIGNMENT, FRAME_LENGTH_OFFSET, FrameFlags, FrameType,
    HEADER_LENGTH, RESERVED_VALUE_OFFSET, TYPE_OFFSET, align, compute_term_begin_position,
};

use crate::buffer::AtomicBuffer;
use crate::log::descriptor;
use crate::term::header_writer::HeaderWriter;

/// Supplies the user reserved value for a frame about to be published:
/// `(term_buffer, frame_offset, frame_length) -> value`.
pub type ReservedValueSupplier<'a> = &'a dyn Fn(&AtomicBuffer, usize, usize) -> i64;

/// Result of a reservation attempt on one term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Append {
    /// Frame(s) written; stream position after the last byte.
    Appended {
        /// Position at the end of the appended frames
        position: i64,
    },
    /// This producer hit the end of the term and stamped the pad.
    Tripped,
    /// Another producer already tripped this term.
    Failed,
}

/// Result of a zero-copy claim attempt on one term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Claim {
    /// Range reserved and header stamped; length not yet published.
    Claimed {
        /// Frame start offset within the term
        frame_offset: usize,
        /// Header plus payload length (unaligned)
        frame_length: usize,
        /// Position at the end of the claimed frame
        position: i64,
    },
    /// This producer hit the end of the term and stamped the pad.
    Tripped,
    /// Another producer already tripped this term.
    Failed,
}

/// Appender bound to one term partition and its tail counter.
#[derive(Debug)]
pub(crate) struct TermAppender {
    term_buffer: AtomicBuffer,
    meta_buffer: AtomicBuffer,
    tail_counter_offset: usize,
    position_bits_to_shift: u32,
    initial_term_id: i32,
}

impl TermAppender {
    pub(crate) fn new(
        term_buffer: AtomicBuffer,
        meta_buffer: AtomicBuffer,
        partition_index: usize,
        position_bits_to_shift: u32,
        initial_term_id: i32,
    ) -> Self {
        Self {
            term_buffer,
            meta_buffer,
            tail_counter_offset: descriptor::tail_counter_offset(partition_index),
            position_bits_to_shift,
            initial_term_id,
        }
    }

    /// The term buffer this appender writes into.
    pub(crate) fn term_buffer(&self) -> &AtomicBuffer {
        &self.term_buffer
    }

    /// Volatile read of this partition's raw tail.
    pub(crate) fn raw_tail_volatile(&self) -> i64 {
        self.meta_buffer.get_i64_volatile(self.tail_counter_offset)
    }

    fn get_and_add_raw_tail(&self, aligned_length: usize) -> i64 {
        self.meta_buffer.get_and_add_i64(self.tail_counter_offset, aligned_length as i64)
    }

    fn position(&self, term_id: i32, resulting_offset: i64) -> i64 {
        compute_term_begin_position(term_id, self.position_bits_to_shift, self.initial_term_id)
            + resulting_offset
    }

    /// Append a message that fits a single frame, copying the payload.
    pub(crate) fn append_unfragmented(
        &self,
        header: &HeaderWriter,
        message: &[u8],
        reserved_value_supplier: Option<ReservedValueSupplier<'_>>,
    ) -> Append {
        let frame_length = HEADER_LENGTH + message.len();
        let aligned_length = align(frame_length, FRAME_ALIGNMENT);

        let raw_tail = self.get_and_add_raw_tail(aligned_length);
        let term_id = descriptor::term_id_from_raw_tail(raw_tail);
        let term_offset = descriptor::term_offset_from_raw_tail(raw_tail);

        let resulting_offset = term_offset + aligned_length as i64;
        if resulting_offset > self.term_buffer.capacity() as i64 {
            return self.handle_end_of_term(header, term_offset, term_id);
        }

        let frame_offset = term_offset as usize;
        header.write(&self.term_buffer, frame_offset, term_id);
        self.term_buffer.put_bytes(frame_offset + DATA_OFFSET, message);

        if let Some(supplier) = reserved_value_supplier {
            let value = supplier(&self.term_buffer, frame_offset, frame_length);
            self.term_buffer.put_i64(frame_offset + RESERVED_VALUE_OFFSET, value.to_le());
        }

        self.term_buffer
            .put_i32_ordered(frame_offset + FRAME_LENGTH_OFFSET, (frame_length as i32).to_le());

        Append::Appended { position: self.position(term_id, resulting_offset) }
    }

    /// Append a message larger than one frame as a BEGIN / MID* / END
    /// chain sharing a single tail reservation.
    pub(crate) fn append_fragmented(
        &self,
        header: &HeaderWriter,
        message: &[u8],
        max_payload_length: usize,
        reserved_value_supplier: Option<ReservedValueSupplier<'_>>,
    ) -> Append {
        debug_assert!(message.len() > max_payload_length);

        let full_frames = message.len() / max_payload_length;
        let remainder = message.len() - full_frames * max_payload_length;
        let mut required_length = full_frames * (HEADER_LENGTH + max_payload_length);
        if remainder > 0 {
            required_length += align(HEADER_LENGTH + remainder, FRAME_ALIGNMENT);
        }

        let raw_tail = self.get_and_add_raw_tail(required_length);
        let term_id = descriptor::term_id_from_raw_tail(raw_tail);
        let term_offset = descriptor::term_offset_from_raw_tail(raw_tail);

        let resulting_offset = term_offset + required_length as i64;
        if resulting_offset > self.term_buffer.capacity() as i64 {
            return self.handle_end_of_term(header, term_offset, term_id);
        }

        let mut flags = FrameFlags::BEGIN;
        let mut frame_offset = term_offset as usize;
        let mut remaining = message;

        loop {
            let payload_length = remaining.len().min(max_payload_length);
            let frame_length = HEADER_LENGTH + payload_length;

            header.write(&self.term_buffer, frame_offset, term_id);
            self.term_buffer.put_bytes(frame_offset + DATA_OFFSET, &remaining[..payload_length]);

            if remaining.len() == payload_length {
                flags = flags | FrameFlags::END;
            }
            self.term_buffer.put_u8(frame_offset + FLAGS_OFFSET, flags.to_byte());

            if let Some(supplier) = reserved_value_supplier {
                let value = supplier(&self.term_buffer, frame_offset, frame_length);
                self.term_buffer.put_i64(frame_offset + RESERVED_VALUE_OFFSET, value.to_le());
            }

            self.term_buffer
                .put_i32_ordered(frame_offset + FRAME_LENGTH_OFFSET, (frame_length as i32).to_le());

            remaining = &remaining[payload_length..];
            if remaining.is_empty() {
                break;
            }
            flags = FrameFlags::NONE;
            frame_offset += align(frame_length, FRAME_ALIGNMENT);
        }

        Append::Appended { position: self.position(term_id, resulting_offset) }
    }

    /// Reserve a single frame for zero-copy writing; the header is
    /// stamped but the frame length stays zero until the claim commits.
    pub(crate) fn claim(&self, header: &HeaderWriter, length: usize) -> Claim {
        let frame_length = HEADER_LENGTH + length;
        let aligned_length = align(frame_length, FRAME_ALIGNMENT);

        let raw_tail = self.get_and_add_raw_tail(aligned_length);
        let term_id = descriptor::term_id_from_raw_tail(raw_tail);
        let term_offset = descriptor::term_offset_from_raw_tail(raw_tail);

        let resulting_offset = term_offset + aligned_length as i64;
        if resulting_offset > self.term_buffer.capacity() as i64 {
            return match self.handle_end_of_term(header, term_offset, term_id) {
                Append::Tripped => Claim::Tripped,
                _ => Claim::Failed,
            };
        }

        let frame_offset = term_offset as usize;
        header.write(&self.term_buffer, frame_offset, term_id);

        Claim::Claimed {
            frame_offset,
            frame_length,
            position: self.position(term_id, resulting_offset),
        }
    }

    /// A reservation ran past the term end. Whoever lands first past the
    /// boundary with space remaining stamps the pad; later arrivals see
    /// an offset already at or past the end and just report failure.
    fn handle_end_of_term(&self, header: &HeaderWriter, term_offset: i64, term_id: i32) -> Append {
        let term_length = self.term_buffer.capacity() as i64;
        if term_offset >= term_length {
            return Append::Failed;
        }

        let frame_offset = term_offset as usize;
        let pad_length = (term_length - term_offset) as usize;

        header.write(&self.term_buffer, frame_offset, term_id);
        self.term_buffer
            .put_u16(frame_offset + TYPE_OFFSET, FrameType::Pad.to_u16().to_le());
        self.term_buffer
            .put_u8(frame_offset + FLAGS_OFFSET, FrameFlags::UNFRAGMENTED.to_byte());
        self.term_buffer
            .put_i32_ordered(frame_offset + FRAME_LENGTH_OFFSET, (pad_length as i32).to_le());

        Append::Tripped
    }
}

#[cfg(test)]
mod tests {
    use triptych_proto::{DefaultFrameHeader, TERM_ID_OFFSET, TERM_MIN_LENGTH};

    use super::*;
    use crate::log::{LogBuffers, LogMeta};

    const INITIAL_TERM_ID: i32 = 5;

    fn appender() -> (LogBuffers, TermAppender, HeaderWriter) {
        let log = LogBuffers::allocate(TERM_MIN_LENGTH).expect("valid term length");
        let template = DefaultFrameHeader::new(3, 7);
        LogMeta::new(log.meta_buffer()).initialize(INITIAL_TERM_ID, TERM_MIN_LENGTH, 4096, &template);

        let bits = TERM_MIN_LENGTH.trailing_zeros();
        let appender =
            TermAppender::new(log.term_buffer(0), log.meta_buffer(), 0, bits, INITIAL_TERM_ID);
        (log, appender, HeaderWriter::new(&template))
    }

    fn frame_length_at(term: &AtomicBuffer, offset: usize) -> i32 {
        i32::from_le(term.get_i32_volatile(offset + FRAME_LENGTH_OFFSET))
    }

    #[test]
    fn appends_are_contiguous_and_aligned() {
        let (log, appender, header) = appender();
        let term = log.term_buffer(0);

        let first = appender.append_unfragmented(&header, &[1u8; 100], None);
        let second = appender.append_unfragmented(&header, &[2u8; 100], None);

        // 100 + 32 header aligns to 160.
        assert_eq!(first, Append::Appended { position: 160 });
        assert_eq!(second, Append::Appended { position: 320 });

        assert_eq!(frame_length_at(&term, 0), 132);
        assert_eq!(frame_length_at(&term, 160), 132);
        assert_eq!(i32::from_le(term.get_i32(160 + TERM_ID_OFFSET)), INITIAL_TERM_ID);
    }

    #[test]
    fn zero_length_message_still_takes_a_frame() {
        let (log, appender, header) = appender();

        let outcome = appender.append_unfragmented(&header, &[], None);
        assert_eq!(outcome, Append::Appended { position: FRAME_ALIGNMENT as i64 });
        assert_eq!(frame_length_at(&log.term_buffer(0), 0), HEADER_LENGTH as i32);
    }

    #[test]
    fn reserved_value_supplier_sees_the_frame() {
        let (log, appender, header) = appender();

        let supplier = |_buffer: &AtomicBuffer, frame_offset: usize, frame_length: usize| {
            (frame_offset + frame_length) as i64
        };
        let outcome = appender.append_unfragmented(&header, &[9u8; 10], Some(&supplier));

        assert!(matches!(outcome, Append::Appended { .. }));
        let stamped = i64::from_le(log.term_buffer(0).get_i64(RESERVED_VALUE_OFFSET));
        assert_eq!(stamped, (HEADER_LENGTH + 10) as i64);
    }

    #[test]
    fn trip_stamps_pad_to_term_end() {
        let (log, appender, header) = appender();
        let term = log.term_buffer(0);

        // Walk the tail to 64 bytes short of the end.
        let chunk = TERM_MIN_LENGTH / 2 - FRAME_ALIGNMENT;
        for _ in 0..2 {
            let outcome = appender.append_unfragmented(&header, &[0u8; 1], None);
            assert!(matches!(outcome, Append::Appended { .. }));
            let _ = appender.get_and_add_raw_tail(chunk - 2 * FRAME_ALIGNMENT);
        }

        let pad_offset = TERM_MIN_LENGTH - 2 * FRAME_ALIGNMENT;
        let outcome = appender.append_unfragmented(&header, &[0u8; 100], None);
        assert_eq!(outcome, Append::Tripped);

        assert_eq!(frame_length_at(&term, pad_offset), 2 * FRAME_ALIGNMENT as i32);
        assert_eq!(
            u16::from_le(term.get_u16(pad_offset + TYPE_OFFSET)),
            FrameType::Pad.to_u16()
        );

        // Everyone after the trip fails without touching the term.
        let outcome = appender.append_unfragmented(&header, &[0u8; 8], None);
        assert_eq!(outcome, Append::Failed);
    }

    #[test]
    fn fragmented_append_chains_begin_mid_end() {
        let (log, appender, header) = appender();
        let term = log.term_buffer(0);
        let max_payload = 4096 - HEADER_LENGTH;

        let message = vec![7u8; 10_000];
        let outcome = appender.append_fragmented(&header, &message, max_payload, None);

        // 4064 + 4064 + 1872 payloads; last frame aligns 1904 -> 1920.
        let expected_length = 2 * 4096 + align(HEADER_LENGTH + 1872, FRAME_ALIGNMENT);
        assert_eq!(outcome, Append::Appended { position: expected_length as i64 });

        let offsets = [0usize, 4096, 8192];
        let flags: Vec<u8> = offsets
            .iter()
            .map(|offset| term.get_u8(offset + FLAGS_OFFSET))
            .collect();
        assert_eq!(flags[0], FrameFlags::BEGIN.to_byte());
        assert_eq!(flags[1], FrameFlags::NONE.to_byte());
        assert_eq!(flags[2], FrameFlags::END.to_byte());

        assert_eq!(frame_length_at(&term, 0), 4096);
        assert_eq!(frame_length_at(&term, 4096), 4096);
        assert_eq!(frame_length_at(&term, 8192), (HEADER_LENGTH + 1872) as i32);
    }

    #[test]
    fn claim_reserves_without_publishing() {
        let (log, appender, header) = appender();
        let term = log.term_buffer(0);

        let outcome = appender.claim(&header, 200);
        let Claim::Claimed { frame_offset, frame_length, position } = outcome else {
            unreachable!("claim on an empty term succeeds");
        };

        assert_eq!(frame_offset, 0);
        assert_eq!(frame_length, HEADER_LENGTH + 200);
        assert_eq!(position, align(frame_length, FRAME_ALIGNMENT) as i64);

        // Header is stamped but the frame is not yet visible.
        assert_eq!(frame_length_at(&term, 0), 0);
        assert_eq!(i32::from_le(term.get_i32(TERM_ID_OFFSET)), INITIAL_TERM_ID);

        // The tail has moved on regardless.
        let raw_tail = appender.raw_tail_volatile();
        assert_eq!(descriptor::term_offset_from_raw_tail(raw_tail), 256);
    }
}
