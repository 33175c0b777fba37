//! Publisher-side endpoint of the data plane.
//!
//! A `Publication` orchestrates the three term appenders: it picks the
//! active partition, enforces the publication limit the driver maintains,
//! converts appender outcomes into the stable status surface, and runs
//! term rotation when a term trips. It is safe for any number of
//! concurrent producer threads; every operation is non-blocking and
//! either succeeds with a new stream position or returns a state the
//! caller can branch on.
//!
//! Retry discipline: [`PublicationError::is_transient`] states clear on
//! their own (back-pressure, rotation in flight, subscriber catching up);
//! callers typically spin them through an idle strategy. Terminal states
//! (closed, position exhausted) never clear.

use std::sync::atomic::{AtomicBool, Ordering};

use triptych_proto::{
    Result, compute_max_message_length, compute_max_payload_length, compute_term_begin_position,
    max_possible_position, position_bits_to_shift, validate_mtu_for_term, validate_term_length,
};

use crate::buffer::AtomicBuffer;
use crate::conductor::{ClientCommand, ConductorHandle};
use crate::counters::PositionCounter;
use crate::error::PublicationError;
use crate::log::{LogBuffers, LogMeta, descriptor};
use crate::term::appender::{Append, Claim, ReservedValueSupplier, TermAppender};
use crate::term::claim::BufferClaim;
use crate::term::header_writer::HeaderWriter;

/// Identity of a publication as acknowledged by the driver.
#[derive(Debug, Clone)]
pub struct PublicationParams {
    /// Channel URI this publication was added on.
    pub channel: String,
    /// Driver registration id from the acknowledgement.
    pub registration_id: i64,
}

/// A publisher endpoint over one shared log.
pub struct Publication {
    meta: LogMeta,
    appenders: [TermAppender; descriptor::PARTITION_COUNT],
    header_writer: HeaderWriter,
    limit: PositionCounter,
    conductor: ConductorHandle,
    channel: String,
    registration_id: i64,
    session_id: i32,
    stream_id: i32,
    initial_term_id: i32,
    term_length: usize,
    position_bits_to_shift: u32,
    max_possible_position: i64,
    max_message_length: usize,
    max_payload_length: usize,
    is_closed: AtomicBool,
}

impl std::fmt::Debug for Publication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publication")
            .field("channel", &self.channel)
            .field("stream_id", &self.stream_id)
            .field("session_id", &self.session_id)
            .field("registration_id", &self.registration_id)
            .field("is_closed", &self.is_closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Publication {
    /// Bind a publication to a driver-initialized log.
    ///
    /// Geometry (term length, MTU, initial term id, header template) is
    /// read from the log's metadata section and validated; session and
    /// stream ids come from the template the driver stamped.
    pub fn new(
        params: PublicationParams,
        buffers: &LogBuffers,
        limit: PositionCounter,
        conductor: ConductorHandle,
    ) -> Result<Self> {
        let meta = LogMeta::new(buffers.meta_buffer());

        let term_length = meta.term_length();
        validate_term_length(term_length)?;
        let mtu_length = meta.mtu_length();
        validate_mtu_for_term(mtu_length, term_length)?;

        let template = meta.default_frame_header()?;
        let initial_term_id = meta.initial_term_id();
        let bits_to_shift = position_bits_to_shift(term_length);

        let appenders = std::array::from_fn(|index| {
            TermAppender::new(
                buffers.term_buffer(index),
                buffers.meta_buffer(),
                index,
                bits_to_shift,
                initial_term_id,
            )
        });

        Ok(Self {
            meta,
            appenders,
            header_writer: HeaderWriter::new(&template),
            limit,
            conductor,
            channel: params.channel,
            registration_id: params.registration_id,
            session_id: template.session_id(),
            stream_id: template.stream_id(),
            initial_term_id,
            term_length,
            position_bits_to_shift: bits_to_shift,
            max_possible_position: max_possible_position(term_length),
            max_message_length: compute_max_message_length(term_length),
            max_payload_length: compute_max_payload_length(mtu_length),
            is_closed: AtomicBool::new(false),
        })
    }

    /// Channel URI.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Driver registration id.
    #[must_use]
    pub fn registration_id(&self) -> i64 {
        self.registration_id
    }

    /// Session id stamped into every frame.
    #[must_use]
    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    /// Stream id stamped into every frame.
    #[must_use]
    pub fn stream_id(&self) -> i32 {
        self.stream_id
    }

    /// Term id of the first term of the stream.
    #[must_use]
    pub fn initial_term_id(&self) -> i32 {
        self.initial_term_id
    }

    /// Length of each term partition.
    #[must_use]
    pub fn term_length(&self) -> usize {
        self.term_length
    }

    /// Largest message `offer` accepts (fragmented as needed).
    #[must_use]
    pub fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    /// Largest payload a single frame (and thus `try_claim`) can carry.
    #[must_use]
    pub fn max_payload_length(&self) -> usize {
        self.max_payload_length
    }

    /// Hard ceiling on the stream position for this term length.
    #[must_use]
    pub fn max_possible_position(&self) -> i64 {
        self.max_possible_position
    }

    /// Current publication limit from the driver's counter.
    #[must_use]
    pub fn publication_limit(&self) -> i64 {
        self.limit.get_volatile()
    }

    /// True once [`Publication::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::Acquire)
    }

    /// Liveness as seen through status messages: true if the driver has
    /// stamped one within the conductor's liveness window.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.is_closed() && self.conductor.is_publication_live(self.meta.time_of_last_status_message())
    }

    /// Current stream position of the active term's tail.
    pub fn position(&self) -> std::result::Result<i64, PublicationError> {
        if self.is_closed() {
            return Err(PublicationError::Closed);
        }

        let partition_index = self.meta.active_partition_index();
        let raw_tail = self.appenders[partition_index].raw_tail_volatile();
        Ok(self.tail_position(raw_tail))
    }

    fn tail_position(&self, raw_tail: i64) -> i64 {
        let term_id = descriptor::term_id_from_raw_tail(raw_tail);
        let term_offset =
            descriptor::term_offset_from_raw_tail(raw_tail).min(self.term_length as i64);
        compute_term_begin_position(term_id, self.position_bits_to_shift, self.initial_term_id)
            + term_offset
    }

    /// Publish a message by copy. Returns the stream position after the
    /// message on success.
    pub fn offer(&self, message: &[u8]) -> std::result::Result<i64, PublicationError> {
        self.offer_inner(message, None)
    }

    /// Publish `length` bytes of `buffer` starting at `offset` by copy.
    ///
    /// A range that escapes the source buffer is a precondition fault
    /// ([`PublicationError::InvalidLength`]), never a stream state; the
    /// publication remains usable.
    pub fn offer_part(
        &self,
        buffer: &[u8],
        offset: usize,
        length: usize,
    ) -> std::result::Result<i64, PublicationError> {
        let end = offset
            .checked_add(length)
            .filter(|&end| end <= buffer.len())
            .ok_or_else(|| PublicationError::InvalidLength {
                offset,
                length,
                buffer_length: buffer.len(),
            })?;
        self.offer_inner(&buffer[offset..end], None)
    }

    /// As [`Publication::offer`], additionally stamping each frame's
    /// reserved value from `supplier` immediately before it is published.
    pub fn offer_with<F>(
        &self,
        message: &[u8],
        supplier: F,
    ) -> std::result::Result<i64, PublicationError>
    where
        F: Fn(&AtomicBuffer, usize, usize) -> i64,
    {
        self.offer_inner(message, Some(&supplier))
    }

    fn offer_inner(
        &self,
        message: &[u8],
        supplier: Option<ReservedValueSupplier<'_>>,
    ) -> std::result::Result<i64, PublicationError> {
        if self.is_closed() {
            return Err(PublicationError::Closed);
        }
        if message.len() > self.max_message_length {
            return Err(PublicationError::MaxMessageLengthExceeded {
                length: message.len(),
                max: self.max_message_length,
            });
        }

        let limit = self.limit.get_volatile();
        let partition_index = self.meta.active_partition_index();
        let appender = &self.appenders[partition_index];
        let raw_tail = appender.raw_tail_volatile();
        let term_id = descriptor::term_id_from_raw_tail(raw_tail);
        let position = self.tail_position(raw_tail);

        if position >= self.max_possible_position {
            return Err(PublicationError::MaxPositionExceeded {
                position,
                max: self.max_possible_position,
            });
        }
        if position >= limit {
            return Err(self.back_pressure_state());
        }

        let outcome = if message.len() <= self.max_payload_length {
            appender.append_unfragmented(&self.header_writer, message, supplier)
        } else {
            appender.append_fragmented(
                &self.header_writer,
                message,
                self.max_payload_length,
                supplier,
            )
        };

        match outcome {
            Append::Appended { position } => Ok(position),
            Append::Tripped | Append::Failed => {
                self.rotate_term(partition_index, term_id);
                Err(PublicationError::AdminAction)
            },
        }
    }

    /// Reserve a frame for zero-copy writing.
    ///
    /// On success the returned claim must be committed or aborted; see
    /// [`BufferClaim`]. `length` must not exceed
    /// [`Publication::max_payload_length`].
    pub fn try_claim(&self, length: usize) -> std::result::Result<BufferClaim, PublicationError> {
        self.try_claim_inner(length, false)
    }

    /// As [`Publication::try_claim`] but the claim may also rewrite the
    /// frame flags and type, for infrastructure layered over the log
    /// (e.g. replicated-log session headers).
    pub fn try_claim_privileged(
        &self,
        length: usize,
    ) -> std::result::Result<BufferClaim, PublicationError> {
        self.try_claim_inner(length, true)
    }

    fn try_claim_inner(
        &self,
        length: usize,
        privileged: bool,
    ) -> std::result::Result<BufferClaim, PublicationError> {
        if self.is_closed() {
            return Err(PublicationError::Closed);
        }
        if length > self.max_payload_length {
            return Err(PublicationError::MaxPayloadLengthExceeded {
                length,
                max: self.max_payload_length,
            });
        }

        let limit = self.limit.get_volatile();
        let partition_index = self.meta.active_partition_index();
        let appender = &self.appenders[partition_index];
        let raw_tail = appender.raw_tail_volatile();
        let term_id = descriptor::term_id_from_raw_tail(raw_tail);
        let position = self.tail_position(raw_tail);

        if position >= self.max_possible_position {
            return Err(PublicationError::MaxPositionExceeded {
                position,
                max: self.max_possible_position,
            });
        }
        if position >= limit {
            return Err(self.back_pressure_state());
        }

        match appender.claim(&self.header_writer, length) {
            Claim::Claimed { frame_offset, frame_length, position } => Ok(BufferClaim::new(
                appender.term_buffer().clone(),
                frame_offset,
                frame_length,
                position,
                privileged,
            )),
            Claim::Tripped | Claim::Failed => {
                self.rotate_term(partition_index, term_id);
                Err(PublicationError::AdminAction)
            },
        }
    }

    fn back_pressure_state(&self) -> PublicationError {
        if self.meta.is_connected() {
            PublicationError::BackPressured
        } else {
            PublicationError::NotConnected
        }
    }

    /// Transition the log to the next term after a trip.
    ///
    /// The next partition's tail is CAS-initialised to the next term id;
    /// losing the CAS means a concurrent rotator (or a newer term) got
    /// there first, which is fine. The active index is release-published
    /// after the tail so no producer can land on an uninitialised term.
    fn rotate_term(&self, active_partition_index: usize, active_term_id: i32) {
        let next_index = descriptor::next_partition_index(active_partition_index);
        let next_term_id = active_term_id.wrapping_add(1);

        let expected_raw = self.meta.raw_tail_volatile(next_index);
        let expected_term_id = descriptor::term_id_from_raw_tail(expected_raw);
        if next_term_id.wrapping_sub(expected_term_id) > 0 {
            let _won = self.meta.cas_raw_tail(
                next_index,
                expected_raw,
                descriptor::pack_raw_tail(next_term_id, 0),
            );
        }

        self.meta.activate_partition(next_index);
        tracing::trace!(next_index, next_term_id, "rotated log to next term");
    }

    /// Queue a manual destination addition with the driver.
    pub fn add_destination(
        &self,
        destination: impl Into<String>,
    ) -> std::result::Result<(), PublicationError> {
        if self.is_closed() {
            return Err(PublicationError::Closed);
        }
        self.conductor.post(ClientCommand::AddDestination {
            registration_id: self.registration_id,
            channel: destination.into(),
        });
        Ok(())
    }

    /// Queue a manual destination removal with the driver.
    pub fn remove_destination(
        &self,
        destination: impl Into<String>,
    ) -> std::result::Result<(), PublicationError> {
        if self.is_closed() {
            return Err(PublicationError::Closed);
        }
        self.conductor.post(ClientCommand::RemoveDestination {
            registration_id: self.registration_id,
            channel: destination.into(),
        });
        Ok(())
    }

    /// Release the publication: further operations return
    /// [`PublicationError::Closed`] and the conductor is told to notify
    /// the driver. Idempotent.
    pub fn close(&self) {
        if !self.is_closed.swap(true, Ordering::AcqRel) {
            self.conductor
                .post(ClientCommand::ReleasePublication { registration_id: self.registration_id });
            tracing::debug!(
                channel = %self.channel,
                stream_id = self.stream_id,
                session_id = self.session_id,
                "publication closed"
            );
        }
    }
}

impl Drop for Publication {
    fn drop(&mut self) {
        self.close();
    }
}
