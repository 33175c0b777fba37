//! Subscriber-semantics frame scanner.
//!
//! Reads a term buffer the way an out-of-process consumer would: poll
//! each frame-length word with an acquire load, stop at the first zero
//! (nothing published yet), and otherwise decode the header and copy the
//! payload out. Also stops at anything structurally impossible instead
//! of panicking, so it can be pointed at arbitrary bytes (the fuzz
//! targets do exactly that).

use bytes::Bytes;
use triptych_core::AtomicBuffer;
use triptych_proto::{
    DATA_OFFSET, FLAGS_OFFSET, FRAME_ALIGNMENT, FRAME_LENGTH_OFFSET, FrameFlags, FrameType,
    HEADER_LENGTH, RESERVED_VALUE_OFFSET, SESSION_ID_OFFSET, STREAM_ID_OFFSET, TERM_ID_OFFSET,
    TYPE_OFFSET, align,
};

/// One decoded frame as a subscriber would observe it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFrame {
    /// Offset of the frame within its term.
    pub term_offset: usize,
    /// Unaligned frame length from the header (header + payload).
    pub frame_length: usize,
    /// Bytes the frame occupies in the term.
    pub aligned_length: usize,
    /// Decoded frame type; `None` for unknown wire values.
    pub frame_type: Option<FrameType>,
    /// Fragmentation flags.
    pub flags: FrameFlags,
    /// Term id stamped in the header.
    pub term_id: i32,
    /// Session id stamped in the header.
    pub session_id: i32,
    /// Stream id stamped in the header.
    pub stream_id: i32,
    /// User reserved value.
    pub reserved_value: i64,
    /// Copy of the payload bytes.
    pub payload: Bytes,
}

impl ScannedFrame {
    /// True for padding frames, which carry no payload semantics.
    #[must_use]
    pub fn is_pad(&self) -> bool {
        self.frame_type == Some(FrameType::Pad)
    }
}

/// Scan a term buffer from offset zero until the first unpublished slot,
/// the end of the term, or a structurally invalid header.
#[must_use]
pub fn scan_term(term: &AtomicBuffer) -> Vec<ScannedFrame> {
    let mut frames = Vec::new();
    let mut offset = 0;

    while offset + HEADER_LENGTH <= term.capacity() {
        let raw_length = i32::from_le(term.get_i32_volatile(offset + FRAME_LENGTH_OFFSET));
        if raw_length <= 0 {
            break;
        }

        let frame_length = raw_length as usize;
        if frame_length < HEADER_LENGTH {
            break;
        }
        let aligned_length = align(frame_length, FRAME_ALIGNMENT);
        if offset + aligned_length > term.capacity() {
            break;
        }

        let mut payload = vec![0u8; frame_length - HEADER_LENGTH];
        term.get_bytes(offset + DATA_OFFSET, &mut payload);

        frames.push(ScannedFrame {
            term_offset: offset,
            frame_length,
            aligned_length,
            frame_type: FrameType::from_u16(u16::from_le(term.get_u16(offset + TYPE_OFFSET))),
            flags: FrameFlags::from_byte(term.get_u8(offset + FLAGS_OFFSET)),
            term_id: i32::from_le(term.get_i32(offset + TERM_ID_OFFSET)),
            session_id: i32::from_le(term.get_i32(offset + SESSION_ID_OFFSET)),
            stream_id: i32::from_le(term.get_i32(offset + STREAM_ID_OFFSET)),
            reserved_value: i64::from_le(term.get_i64(offset + RESERVED_VALUE_OFFSET)),
            payload: Bytes::from(payload),
        });

        offset += aligned_length;
    }

    frames
}

/// Reassemble the data payload stream of a scanned term: pads dropped,
/// fragment chains glued back together.
#[must_use]
pub fn reassemble_messages(frames: &[ScannedFrame]) -> Vec<Bytes> {
    let mut messages = Vec::new();
    let mut assembly: Vec<u8> = Vec::new();

    for frame in frames.iter().filter(|frame| !frame.is_pad()) {
        if frame.flags.is_begin() {
            assembly.clear();
        }
        assembly.extend_from_slice(&frame.payload);
        if frame.flags.is_end() {
            messages.push(Bytes::from(std::mem::take(&mut assembly)));
        }
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp_frame(term: &AtomicBuffer, offset: usize, payload: &[u8], flags: FrameFlags) {
        term.put_u8(offset + FLAGS_OFFSET, flags.to_byte());
        term.put_u16(offset + TYPE_OFFSET, FrameType::Data.to_u16().to_le());
        term.put_bytes(offset + DATA_OFFSET, payload);
        term.put_i32_ordered(
            offset + FRAME_LENGTH_OFFSET,
            ((HEADER_LENGTH + payload.len()) as i32).to_le(),
        );
    }

    #[test]
    fn scan_stops_at_unpublished_slot() {
        let term = AtomicBuffer::allocate(1024);
        stamp_frame(&term, 0, b"one", FrameFlags::UNFRAGMENTED);
        // Offset 64 left unpublished; frame at 128 must stay invisible.
        stamp_frame(&term, 128, b"three", FrameFlags::UNFRAGMENTED);

        let frames = scan_term(&term);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].payload[..], b"one");
    }

    #[test]
    fn scan_rejects_corrupt_lengths() {
        let term = AtomicBuffer::allocate(256);

        // Shorter than a header.
        term.put_i32_ordered(FRAME_LENGTH_OFFSET, 8_i32.to_le());
        assert!(scan_term(&term).is_empty());

        // Runs past the end of the term.
        term.put_i32_ordered(FRAME_LENGTH_OFFSET, 512_i32.to_le());
        assert!(scan_term(&term).is_empty());

        // Negative.
        term.put_i32_ordered(FRAME_LENGTH_OFFSET, (-64_i32).to_le());
        assert!(scan_term(&term).is_empty());
    }

    #[test]
    fn reassembly_joins_fragment_chains() {
        let term = AtomicBuffer::allocate(1024);
        stamp_frame(&term, 0, b"he", FrameFlags::BEGIN);
        stamp_frame(&term, 64, b"ll", FrameFlags::NONE);
        stamp_frame(&term, 128, b"o", FrameFlags::END);
        stamp_frame(&term, 192, b"!", FrameFlags::UNFRAGMENTED);

        let messages = reassemble_messages(&scan_term(&term));
        assert_eq!(messages.len(), 2);
        assert_eq!(&messages[0][..], b"hello");
        assert_eq!(&messages[1][..], b"!");
    }
}
