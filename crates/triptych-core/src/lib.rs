//! Lock-free shared-memory term append engine.
//!
//! This crate is the publisher side of the Triptych data plane: a log of
//! three rotating term partitions shared with an out-of-process media
//! driver, appended to by any number of producer threads using nothing
//! but atomic operations. No locks, no syscalls, no blocking anywhere on
//! the fast path.
//!
//! The moving parts, bottom up:
//!
//! - [`AtomicBuffer`]: bounds-checked atomic access to the shared region
//! - [`log`]: the three-partition log layout and its metadata section
//! - term appenders (internal): fetch-add reservation, framing, padding
//! - [`BufferClaim`]: zero-copy reservation with commit/abort
//! - [`Publication`]: `offer`/`try_claim`, back-pressure, term rotation
//! - [`ClientConductor`]: lifecycle commands and connection liveness
//!
//! The driver is an external collaborator: it creates and cleans logs,
//! advances the publication limit, and stamps liveness metadata. Tests
//! and in-process deployments play the driver role through [`LogBuffers`]
//! and [`PositionCounter`] directly.

mod buffer;
mod conductor;
mod counters;
mod error;
pub mod log;
mod publication;
mod term;

pub use buffer::AtomicBuffer;
pub use conductor::{ClientCommand, ClientConductor, ConductorHandle, EpochClock, SystemClock};
pub use counters::PositionCounter;
pub use error::{ClaimError, PublicationError, status};
pub use log::{LogBuffers, LogMeta};
pub use publication::{Publication, PublicationParams};
pub use term::{BufferClaim, HeaderWriter};
