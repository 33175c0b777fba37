//! Error types for wire layout and parameter validation.
//!
//! These cover static configuration mistakes (term length, MTU, header
//! template) that are caught before a log is ever appended to. Dynamic
//! conditions on the append path (back-pressure, rotation, closure) are
//! not errors at this layer; they live with the publication.

use thiserror::Error;

use crate::frame::{FRAME_ALIGNMENT, HEADER_LENGTH};
use crate::position::{TERM_MAX_LENGTH, TERM_MIN_LENGTH};

/// Result alias for layout validation.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised when validating log layout parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Term length is not a power of two or is out of range
    #[error(
        "term length {length} is invalid: must be a power of two in \
         [{TERM_MIN_LENGTH}, {TERM_MAX_LENGTH}]"
    )]
    InvalidTermLength {
        /// The rejected term length
        length: usize,
    },

    /// MTU is not a multiple of the frame alignment or is out of range
    #[error(
        "mtu length {mtu} is invalid: must be a multiple of {FRAME_ALIGNMENT} \
         and leave room for a {HEADER_LENGTH}-byte header"
    )]
    InvalidMtuLength {
        /// The rejected MTU
        mtu: usize,
    },

    /// MTU does not fit the term it is paired with
    #[error("mtu length {mtu} exceeds maximum message length {max} for term length {term_length}")]
    MtuExceedsTerm {
        /// The rejected MTU
        mtu: usize,
        /// Maximum message length for the term
        max: usize,
        /// Term length the MTU was validated against
        term_length: usize,
    },

    /// Header template buffer is shorter than the fixed header layout
    #[error("header template too short: {actual} bytes, expected at least {expected}")]
    TemplateTooShort {
        /// Required minimum length
        expected: usize,
        /// Length actually provided
        actual: usize,
    },

    /// Header template carries a version this implementation does not speak
    #[error("unsupported frame version: {0}")]
    UnsupportedVersion(u8),
}
