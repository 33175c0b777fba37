//! Error types for the append engine.
//!
//! Two classes, deliberately kept apart (callers branch on the
//! difference): dynamic stream states that vary over time and carry a
//! stable negative status code for cross-component contracts, and
//! precondition faults that indicate a programming error at the call
//! site. A fault never maps to a status code, and neither class makes
//! the publication unusable except where documented.

use thiserror::Error;

/// Stable negative status codes for the dynamic publication states.
///
/// These exact integers are an external contract: out-of-process
/// consumers of offer results (for example replicated-log publishers)
/// branch on them directly.
pub mod status {
    /// No subscriber is connected within the liveness window.
    pub const NOT_CONNECTED: i64 = -1;

    /// The publication limit has been reached; retry after the driver
    /// advances it.
    pub const BACK_PRESSURED: i64 = -2;

    /// A term rotation (or other administrative transition) happened
    /// mid-call; retry with identical semantics.
    pub const ADMIN_ACTION: i64 = -3;

    /// The publication has been closed.
    pub const CLOSED: i64 = -4;

    /// The 32-bit term id space is exhausted; the publication is done.
    pub const MAX_POSITION_EXCEEDED: i64 = -5;
}

/// Errors returned by `offer` and `try_claim`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublicationError {
    /// No connected subscriber within the liveness window
    #[error("publication is not connected to a subscriber")]
    NotConnected,

    /// Position has caught up with the publication limit
    #[error("publication is back-pressured at the publication limit")]
    BackPressured,

    /// Term rotation in progress; the caller should simply retry
    #[error("administrative action in progress, retry the operation")]
    AdminAction,

    /// Publication closed by its owner
    #[error("publication is closed")]
    Closed,

    /// Term id space exhausted, a terminal condition
    #[error("position {position} would exceed the maximum possible position {max}")]
    MaxPositionExceeded {
        /// Position the stream has reached
        position: i64,
        /// Hard ceiling for this term length
        max: i64,
    },

    /// Offered range escapes the source buffer
    #[error("range [{offset}, +{length}) escapes source buffer of {buffer_length} bytes")]
    InvalidLength {
        /// Start of the offered range
        offset: usize,
        /// Length of the offered range
        length: usize,
        /// Length of the source buffer
        buffer_length: usize,
    },

    /// Message larger than the per-term message limit
    #[error("message length {length} exceeds maximum of {max}")]
    MaxMessageLengthExceeded {
        /// Offered length
        length: usize,
        /// term length / 8
        max: usize,
    },

    /// Claim larger than a single frame's payload capacity
    #[error("claim length {length} exceeds maximum payload length {max}")]
    MaxPayloadLengthExceeded {
        /// Requested claim length
        length: usize,
        /// mtu - header length
        max: usize,
    },
}

impl PublicationError {
    /// The stable negative status code, if this is a dynamic stream
    /// state. Precondition faults have no code: they are programming
    /// errors, not states a retry loop should encode.
    #[must_use]
    pub fn status_code(&self) -> Option<i64> {
        match self {
            Self::NotConnected => Some(status::NOT_CONNECTED),
            Self::BackPressured => Some(status::BACK_PRESSURED),
            Self::AdminAction => Some(status::ADMIN_ACTION),
            Self::Closed => Some(status::CLOSED),
            Self::MaxPositionExceeded { .. } => Some(status::MAX_POSITION_EXCEEDED),
            Self::InvalidLength { .. }
            | Self::MaxMessageLengthExceeded { .. }
            | Self::MaxPayloadLengthExceeded { .. } => None,
        }
    }

    /// True if retrying (typically under an idle strategy) can succeed.
    ///
    /// Back-pressure and not-connected clear when the driver advances the
    /// limit or a subscriber arrives; admin-action clears as soon as the
    /// in-flight rotation lands.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotConnected | Self::BackPressured | Self::AdminAction)
    }

    /// True if the publication will never accept another offer.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::MaxPositionExceeded { .. })
    }
}

/// Errors from operations on a [`crate::BufferClaim`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimError {
    /// Flags/type mutation attempted on a standard (non-privileged) claim
    #[error("claim does not carry the privileged capability")]
    Restricted,
}
