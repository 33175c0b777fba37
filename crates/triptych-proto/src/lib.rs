//! Wire layout and position arithmetic for the Triptych log transport.
//!
//! This crate is the shared vocabulary between publishers, subscribers,
//! and the media driver: the 32-byte data frame header layout, the
//! fragmentation flags, the driver-supplied header template, and the bit
//! arithmetic that maps `(term id, term offset)` pairs to 64-bit stream
//! positions and back.
//!
//! It contains no concurrency; the atomic append protocol over these
//! layouts lives in `triptych-core`.

mod errors;
mod frame;
mod position;

pub use errors::{ProtocolError, Result};
pub use frame::{
    DATA_OFFSET, DefaultFrameHeader, FLAGS_OFFSET, FRAME_ALIGNMENT, FRAME_LENGTH_OFFSET,
    FRAME_VERSION, FrameFlags, FrameType, HEADER_LENGTH, RESERVED_VALUE_OFFSET, SESSION_ID_OFFSET,
    STREAM_ID_OFFSET, TERM_ID_OFFSET, TERM_OFFSET_OFFSET, TYPE_OFFSET, VERSION_OFFSET,
};
pub use position::{
    MTU_MAX_LENGTH, MTU_MIN_LENGTH, TERM_MAX_LENGTH, TERM_MIN_LENGTH, align,
    compute_max_message_length, compute_max_payload_length, compute_position,
    compute_term_begin_position, compute_term_id_from_position, compute_term_offset_from_position,
    max_possible_position, position_bits_to_shift, validate_mtu_for_term, validate_mtu_length,
    validate_term_length,
};
