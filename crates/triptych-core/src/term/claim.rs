//! Zero-copy claim over a reserved frame range.
//!
//! `try_claim` reserves term space and stamps everything except the
//! frame length, then hands the caller this handle. The claimed range is
//! exclusively the caller's until exactly one of [`BufferClaim::commit`]
//! or [`BufferClaim::abort`] publishes the length and retires the claim;
//! both take the claim by value so reuse is unrepresentable.
//!
//! A claim that is dropped without either call leaves a zero length in
//! the term, which stalls every subscriber at that offset until the slot
//! is somehow published. That is a bug in the owning code; drop logs a
//! warning so it surfaces in tests.

use triptych_proto::{
    DATA_OFFSET, FLAGS_OFFSET, FRAME_LENGTH_OFFSET, FrameFlags, FrameType, HEADER_LENGTH,
    RESERVED_VALUE_OFFSET, TYPE_OFFSET,
};

use crate::buffer::AtomicBuffer;
use crate::error::ClaimError;

/// Handle over a claimed frame awaiting commit or abort.
#[derive(Debug)]
pub struct BufferClaim {
    buffer: AtomicBuffer,
    frame_offset: usize,
    frame_length: usize,
    position: i64,
    privileged: bool,
    consumed: bool,
}

impl BufferClaim {
    pub(crate) fn new(
        buffer: AtomicBuffer,
        frame_offset: usize,
        frame_length: usize,
        position: i64,
        privileged: bool,
    ) -> Self {
        Self { buffer, frame_offset, frame_length, position, privileged, consumed: false }
    }

    /// Stream position at the end of the claimed frame once committed.
    #[must_use]
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Term buffer the claim lives in; payload writes go through this
    /// view at [`BufferClaim::offset`].
    #[must_use]
    pub fn buffer(&self) -> &AtomicBuffer {
        &self.buffer
    }

    /// Offset of the payload within [`BufferClaim::buffer`].
    #[must_use]
    pub fn offset(&self) -> usize {
        self.frame_offset + DATA_OFFSET
    }

    /// Payload capacity of the claim.
    #[must_use]
    pub fn length(&self) -> usize {
        self.frame_length - HEADER_LENGTH
    }

    /// Copy `src` into the payload starting at payload-relative `offset`.
    pub fn put_bytes(&mut self, offset: usize, src: &[u8]) {
        assert!(
            offset + src.len() <= self.length(),
            "write of {} bytes at {offset} exceeds claim payload of {}",
            src.len(),
            self.length()
        );
        self.buffer.put_bytes(self.offset() + offset, src);
    }

    /// User reserved value currently stamped in the header.
    #[must_use]
    pub fn reserved_value(&self) -> i64 {
        i64::from_le(self.buffer.get_i64(self.frame_offset + RESERVED_VALUE_OFFSET))
    }

    /// Stamp the user reserved value (little-endian at header offset 24).
    pub fn set_reserved_value(&mut self, value: i64) {
        self.buffer.put_i64(self.frame_offset + RESERVED_VALUE_OFFSET, value.to_le());
    }

    /// Frame flags currently stamped in the header.
    #[must_use]
    pub fn flags(&self) -> FrameFlags {
        FrameFlags::from_byte(self.buffer.get_u8(self.frame_offset + FLAGS_OFFSET))
    }

    /// Overwrite the frame flags. Privileged claims only.
    pub fn set_flags(&mut self, flags: FrameFlags) -> Result<(), ClaimError> {
        if !self.privileged {
            return Err(ClaimError::Restricted);
        }
        self.buffer.put_u8(self.frame_offset + FLAGS_OFFSET, flags.to_byte());
        Ok(())
    }

    /// Frame type currently stamped in the header.
    #[must_use]
    pub fn header_type(&self) -> u16 {
        u16::from_le(self.buffer.get_u16(self.frame_offset + TYPE_OFFSET))
    }

    /// Overwrite the frame type. Privileged claims only.
    pub fn set_header_type(&mut self, header_type: u16) -> Result<(), ClaimError> {
        if !self.privileged {
            return Err(ClaimError::Restricted);
        }
        self.buffer.put_u16(self.frame_offset + TYPE_OFFSET, header_type.to_le());
        Ok(())
    }

    /// Release-publish the frame length, making the frame visible to
    /// subscribers exactly once.
    pub fn commit(mut self) {
        self.buffer.put_i32_ordered(
            self.frame_offset + FRAME_LENGTH_OFFSET,
            (self.frame_length as i32).to_le(),
        );
        self.consumed = true;
    }

    /// Retire the claim without publishing data: the frame becomes
    /// padding that subscribers skip.
    pub fn abort(mut self) {
        self.buffer
            .put_u16(self.frame_offset + TYPE_OFFSET, FrameType::Pad.to_u16().to_le());
        self.buffer.put_i32_ordered(
            self.frame_offset + FRAME_LENGTH_OFFSET,
            (self.frame_length as i32).to_le(),
        );
        self.consumed = true;
    }
}

impl Drop for BufferClaim {
    fn drop(&mut self) {
        if !self.consumed {
            tracing::warn!(
                frame_offset = self.frame_offset,
                frame_length = self.frame_length,
                "buffer claim dropped without commit or abort; subscribers stall at this frame"
            );
        }
    }
}
