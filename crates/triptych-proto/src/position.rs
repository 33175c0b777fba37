//! Stream position arithmetic and layout parameter validation.
//!
//! A stream position is the sole cross-process identity of a byte in the
//! stream: a monotonic 64-bit coordinate derived from the term id and the
//! offset within that term. Because term lengths are powers of two the
//! conversions are pure bit arithmetic, cheap enough for the append fast
//! path.

use crate::errors::{ProtocolError, Result};
use crate::frame::{FRAME_ALIGNMENT, HEADER_LENGTH};

/// Smallest legal term length (64 KiB).
pub const TERM_MIN_LENGTH: usize = 64 * 1024;

/// Largest legal term length (1 GiB).
pub const TERM_MAX_LENGTH: usize = 1024 * 1024 * 1024;

/// Largest legal MTU (1 MiB), bounding a single frame including header.
pub const MTU_MAX_LENGTH: usize = 1024 * 1024;

/// Smallest legal MTU: one header plus one alignment unit of payload.
pub const MTU_MIN_LENGTH: usize = HEADER_LENGTH + FRAME_ALIGNMENT;

/// Round `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two; frame bookkeeping always passes
/// [`FRAME_ALIGNMENT`].
#[must_use]
pub fn align(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Number of bits to shift a term id when converting to a position.
///
/// `term_length` must already be validated as a power of two.
#[must_use]
pub fn position_bits_to_shift(term_length: usize) -> u32 {
    debug_assert!(term_length.is_power_of_two());
    term_length.trailing_zeros()
}

/// Compute the stream position for `(term_id, term_offset)`.
///
/// Term ids wrap in 32 bits; the subtraction against the initial term id
/// is wrapping so a stream that has cycled through `i32::MAX` terms still
/// produces the correct monotonic position.
#[must_use]
pub fn compute_position(
    term_id: i32,
    term_offset: i32,
    bits_to_shift: u32,
    initial_term_id: i32,
) -> i64 {
    compute_term_begin_position(term_id, bits_to_shift, initial_term_id) + i64::from(term_offset)
}

/// Position of the first byte of `term_id`.
#[must_use]
pub fn compute_term_begin_position(term_id: i32, bits_to_shift: u32, initial_term_id: i32) -> i64 {
    let term_count = i64::from(term_id.wrapping_sub(initial_term_id));
    term_count << bits_to_shift
}

/// Recover the term id containing `position`.
#[must_use]
pub fn compute_term_id_from_position(position: i64, bits_to_shift: u32, initial_term_id: i32) -> i32 {
    ((position >> bits_to_shift) as i32).wrapping_add(initial_term_id)
}

/// Recover the offset within its term of `position`.
#[must_use]
pub fn compute_term_offset_from_position(position: i64, bits_to_shift: u32) -> i32 {
    (position & ((1_i64 << bits_to_shift) - 1)) as i32
}

/// Highest position a stream over terms of `term_length` can ever reach.
///
/// Beyond this the 32-bit term id space is exhausted and the publication
/// is permanently done.
#[must_use]
pub fn max_possible_position(term_length: usize) -> i64 {
    (term_length as i64) << 31
}

/// Largest message accepted by `offer`, a fraction of the term so that a
/// single message cannot monopolise a partition.
#[must_use]
pub fn compute_max_message_length(term_length: usize) -> usize {
    term_length / 8
}

/// Largest payload that fits one frame under `mtu_length`.
#[must_use]
pub fn compute_max_payload_length(mtu_length: usize) -> usize {
    mtu_length - HEADER_LENGTH
}

/// Check a term length against the power-of-two range contract.
pub fn validate_term_length(term_length: usize) -> Result<()> {
    if !term_length.is_power_of_two()
        || term_length < TERM_MIN_LENGTH
        || term_length > TERM_MAX_LENGTH
    {
        return Err(ProtocolError::InvalidTermLength { length: term_length });
    }
    Ok(())
}

/// Check an MTU against the alignment and range contract.
pub fn validate_mtu_length(mtu_length: usize) -> Result<()> {
    if mtu_length % FRAME_ALIGNMENT != 0
        || mtu_length < MTU_MIN_LENGTH
        || mtu_length > MTU_MAX_LENGTH
    {
        return Err(ProtocolError::InvalidMtuLength { mtu: mtu_length });
    }
    Ok(())
}

/// Check an MTU against the term it will fragment into.
///
/// A frame must never exceed the maximum message length of its term,
/// otherwise a single fragment could defeat the term/8 bound.
pub fn validate_mtu_for_term(mtu_length: usize, term_length: usize) -> Result<()> {
    validate_mtu_length(mtu_length)?;
    let max = compute_max_message_length(term_length);
    if mtu_length > max {
        return Err(ProtocolError::MtuExceedsTerm { mtu: mtu_length, max, term_length });
    }
    Ok(())
}
