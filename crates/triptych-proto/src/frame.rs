//! Data frame layout shared between publishers and subscribers.
//!
//! Every frame in a term buffer starts with a fixed 32-byte header, laid
//! out little-endian on the wire. The `frame-length` word doubles as the
//! visibility gate: it stays zero while a frame is being assembled and is
//! published last with a release store, so a subscriber that observes a
//! non-zero length with an acquire load is guaranteed to see the complete
//! header and payload behind it.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Frame Length                          |
//! +---------------+-+-+-----------+-------------------------------+
//! |    Version    |B|E|   Flags   |             Type              |
//! +---------------+-+-+-----------+-------------------------------+
//! |                          Term Offset                          |
//! +---------------------------------------------------------------+
//! |                          Session ID                           |
//! +---------------------------------------------------------------+
//! |                           Stream ID                           |
//! +---------------------------------------------------------------+
//! |                            Term ID                            |
//! +---------------------------------------------------------------+
//! |                         Reserved Value                        |
//! |                                                               |
//! +---------------------------------------------------------------+
//! |                            Payload                           ...
//! +---------------------------------------------------------------+
//! ```

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Length of the fixed data frame header in bytes.
pub const HEADER_LENGTH: usize = 32;

/// Every frame occupies a multiple of this many bytes in its term.
///
/// The `frame-length` header field records the unaligned length
/// (header + payload); the bytes between that and the next alignment
/// boundary are padding and belong to the frame.
pub const FRAME_ALIGNMENT: usize = 32;

/// Protocol version stamped into every header.
pub const FRAME_VERSION: u8 = 0;

/// Byte offset of the frame-length field within a frame.
pub const FRAME_LENGTH_OFFSET: usize = 0;

/// Byte offset of the version field.
pub const VERSION_OFFSET: usize = 4;

/// Byte offset of the flags field.
pub const FLAGS_OFFSET: usize = 5;

/// Byte offset of the frame type field.
pub const TYPE_OFFSET: usize = 6;

/// Byte offset of the term-offset field.
pub const TERM_OFFSET_OFFSET: usize = 8;

/// Byte offset of the session-id field.
pub const SESSION_ID_OFFSET: usize = 12;

/// Byte offset of the stream-id field.
pub const STREAM_ID_OFFSET: usize = 16;

/// Byte offset of the term-id field.
pub const TERM_ID_OFFSET: usize = 20;

/// Byte offset of the user reserved-value field.
pub const RESERVED_VALUE_OFFSET: usize = 24;

/// Byte offset of the payload, equal to [`HEADER_LENGTH`].
pub const DATA_OFFSET: usize = HEADER_LENGTH;

/// On-the-wire frame type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FrameType {
    /// Padding filling the tail of a term; subscribers skip it
    Pad = 0x00,
    /// Application data fragment
    Data = 0x01,
}

impl FrameType {
    /// Decode a frame type from its wire value. `None` if unrecognized.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x00 => Some(Self::Pad),
            0x01 => Some(Self::Data),
            _ => None,
        }
    }

    /// Wire value of this frame type.
    #[must_use]
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Fragmentation flags carried in byte 5 of the header.
///
/// `BEGIN` marks the first fragment of a message, `END` the last.
/// An unfragmented message carries both; middle fragments carry neither.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// No flags set (a middle fragment).
    pub const NONE: Self = Self(0);

    /// First fragment of a fragmented message.
    pub const BEGIN: Self = Self(0x80);

    /// Last fragment of a fragmented message.
    pub const END: Self = Self(0x40);

    /// Begin and end in one frame: a complete, unfragmented message.
    pub const UNFRAGMENTED: Self = Self(0x80 | 0x40);

    /// Reconstruct flags from the raw header byte.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Raw header byte for these flags.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        self.0
    }

    /// True if every flag in `other` is set in `self`.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if this frame starts a message.
    #[must_use]
    pub fn is_begin(self) -> bool {
        self.contains(Self::BEGIN)
    }

    /// True if this frame ends a message.
    #[must_use]
    pub fn is_end(self) -> bool {
        self.contains(Self::END)
    }
}

impl std::ops::BitOr for FrameFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::fmt::Debug for FrameFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FrameFlags({}{}{:#04x})",
            if self.is_begin() { "B" } else { "-" },
            if self.is_end() { "E" } else { "-" },
            self.0
        )
    }
}

/// Driver-supplied default frame header template (little-endian).
///
/// The driver stamps session id, stream id, version, and default flags
/// once at log creation; the header writer then copies this template into
/// each frame and patches the per-frame fields (term offset, term id).
/// Frame length and reserved value are never taken from the template.
///
/// All fields are raw little-endian byte arrays so the struct has no
/// alignment requirements and any 32-byte pattern is a valid read, which
/// is what lets `zerocopy` cast it straight out of the shared metadata
/// section.
#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct DefaultFrameHeader {
    frame_length: [u8; 4],
    version: u8,
    flags: u8,
    frame_type: [u8; 2],
    term_offset: [u8; 4],
    session_id: [u8; 4],
    stream_id: [u8; 4],
    term_id: [u8; 4],
    reserved_value: [u8; 8],
}

impl DefaultFrameHeader {
    /// Size of the template, identical to [`HEADER_LENGTH`].
    pub const SIZE: usize = HEADER_LENGTH;

    /// Build the template a driver would install for a new publication.
    ///
    /// Version is [`FRAME_VERSION`], flags default to
    /// [`FrameFlags::UNFRAGMENTED`], type to [`FrameType::Data`]. Frame
    /// length, term offset, term id, and reserved value start zeroed.
    #[must_use]
    pub fn new(session_id: i32, stream_id: i32) -> Self {
        Self {
            frame_length: [0; 4],
            version: FRAME_VERSION,
            flags: FrameFlags::UNFRAGMENTED.to_byte(),
            frame_type: FrameType::Data.to_u16().to_le_bytes(),
            term_offset: [0; 4],
            session_id: session_id.to_le_bytes(),
            stream_id: stream_id.to_le_bytes(),
            term_id: [0; 4],
            reserved_value: [0; 8],
        }
    }

    /// Parse a template from the metadata section (zero-copy).
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::TemplateTooShort`] if fewer than 32 bytes
    /// - [`ProtocolError::UnsupportedVersion`] on a version mismatch
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::TemplateTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if header.version != FRAME_VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        Ok(header)
    }

    /// Serialize the template to its wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(IntoBytes::as_bytes(self));
        arr
    }

    /// Protocol version carried by the template.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Default flags stamped into each frame.
    #[must_use]
    pub fn flags(&self) -> FrameFlags {
        FrameFlags::from_byte(self.flags)
    }

    /// Frame type as raw u16.
    #[must_use]
    pub fn frame_type(&self) -> u16 {
        u16::from_le_bytes(self.frame_type)
    }

    /// Publisher session identity.
    #[must_use]
    pub fn session_id(&self) -> i32 {
        i32::from_le_bytes(self.session_id)
    }

    /// Logical stream within the channel.
    #[must_use]
    pub fn stream_id(&self) -> i32 {
        i32::from_le_bytes(self.stream_id)
    }

    /// Update the session id (driver use).
    pub fn set_session_id(&mut self, session_id: i32) {
        self.session_id = session_id.to_le_bytes();
    }

    /// Update the stream id (driver use).
    pub fn set_stream_id(&mut self, stream_id: i32) {
        self.stream_id = stream_id.to_le_bytes();
    }

    /// Update the default flags (driver use).
    pub fn set_flags(&mut self, flags: FrameFlags) {
        self.flags = flags.to_byte();
    }
}

impl std::fmt::Debug for DefaultFrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultFrameHeader")
            .field("version", &self.version())
            .field("flags", &self.flags())
            .field("frame_type", &self.frame_type())
            .field("session_id", &self.session_id())
            .field("stream_id", &self.stream_id())
            .finish_non_exhaustive()
    }
}

impl PartialEq for DefaultFrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for DefaultFrameHeader {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_fixed() {
        assert_eq!(std::mem::size_of::<DefaultFrameHeader>(), HEADER_LENGTH);
        assert_eq!(DATA_OFFSET, 32);
        assert_eq!(RESERVED_VALUE_OFFSET, 24);
    }

    #[test]
    fn template_round_trip() {
        let header = DefaultFrameHeader::new(7, 1001);
        let bytes = header.to_bytes();
        let parsed = DefaultFrameHeader::from_bytes(&bytes).expect("should parse");

        assert_eq!(parsed.session_id(), 7);
        assert_eq!(parsed.stream_id(), 1001);
        assert_eq!(parsed.version(), FRAME_VERSION);
        assert_eq!(parsed.flags(), FrameFlags::UNFRAGMENTED);
        assert_eq!(parsed.frame_type(), FrameType::Data.to_u16());
    }

    #[test]
    fn template_fields_are_little_endian() {
        let header = DefaultFrameHeader::new(0x0102_0304, 0x0506_0708);
        let bytes = header.to_bytes();

        assert_eq!(&bytes[SESSION_ID_OFFSET..SESSION_ID_OFFSET + 4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[STREAM_ID_OFFSET..STREAM_ID_OFFSET + 4], &[0x08, 0x07, 0x06, 0x05]);
        // length(0) | version 0 | flags C0 | type 0100 LE.
        assert_eq!(hex::encode(&bytes[..8]), "0000000000c00100");
    }

    #[test]
    fn reject_short_template() {
        let result = DefaultFrameHeader::from_bytes(&[0u8; 16]);
        assert_eq!(result, Err(ProtocolError::TemplateTooShort { expected: 32, actual: 16 }));
    }

    #[test]
    fn reject_unknown_version() {
        let mut bytes = DefaultFrameHeader::new(1, 1).to_bytes();
        bytes[VERSION_OFFSET] = 9;

        let result = DefaultFrameHeader::from_bytes(&bytes);
        assert_eq!(result, Err(ProtocolError::UnsupportedVersion(9)));
    }

    #[test]
    fn flags_compose() {
        let both = FrameFlags::BEGIN | FrameFlags::END;
        assert_eq!(both, FrameFlags::UNFRAGMENTED);
        assert!(both.is_begin());
        assert!(both.is_end());
        assert!(!FrameFlags::NONE.is_begin());
        assert_eq!(FrameFlags::UNFRAGMENTED.to_byte(), 0xC0);
    }

    #[test]
    fn frame_type_wire_values() {
        assert_eq!(FrameType::from_u16(0x00), Some(FrameType::Pad));
        assert_eq!(FrameType::from_u16(0x01), Some(FrameType::Data));
        assert_eq!(FrameType::from_u16(0x7F), None);
    }
}
