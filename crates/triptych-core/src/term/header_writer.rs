//! Stamps per-frame headers from the driver-supplied template.

use triptych_proto::{DefaultFrameHeader, TERM_ID_OFFSET, TERM_OFFSET_OFFSET, VERSION_OFFSET};

use crate::buffer::AtomicBuffer;

/// Writes frame headers by copying a cached template and patching the
/// per-frame fields.
///
/// The frame-length word (bytes 0..4) is deliberately never touched:
/// subscribers poll it atomically and it must stay zero until the caller
/// release-publishes it after the payload is in place. Everything behind
/// it is plain-written here, made visible by that final publish.
#[derive(Debug, Clone)]
pub struct HeaderWriter {
    template: [u8; DefaultFrameHeader::SIZE],
}

impl HeaderWriter {
    /// Cache `template` for subsequent frame stamping.
    #[must_use]
    pub fn new(template: &DefaultFrameHeader) -> Self {
        Self { template: template.to_bytes() }
    }

    /// Stamp the header of the frame starting at `frame_offset`.
    ///
    /// Copies version, default flags, type, session id, stream id, and a
    /// zero reserved value from the template, then overwrites term offset
    /// and term id for this frame. The caller owns the claimed range.
    pub fn write(&self, term_buffer: &AtomicBuffer, frame_offset: usize, term_id: i32) {
        term_buffer.put_bytes(frame_offset + VERSION_OFFSET, &self.template[VERSION_OFFSET..]);
        term_buffer.put_i32(frame_offset + TERM_OFFSET_OFFSET, (frame_offset as i32).to_le());
        term_buffer.put_i32(frame_offset + TERM_ID_OFFSET, term_id.to_le());
    }
}
