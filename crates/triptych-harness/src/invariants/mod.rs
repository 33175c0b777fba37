//! Invariant checking over scanned term snapshots.
//!
//! These capture the structural properties the append protocol must
//! preserve under any interleaving of producers. They verify WHAT must
//! be true of a term's contents, independent of the scenario that
//! produced them; the tests feed them snapshots from single-threaded
//! boundary runs and from multi-producer chaos runs alike.

use triptych_core::AtomicBuffer;

use crate::scanner::{ScannedFrame, scan_term};

pub mod checks;

/// Identifies which invariant a violation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantKind {
    /// Every frame lies fully within its term.
    FrameBounds,
    /// Frames tile a prefix of the term with no gaps or overlap.
    ContiguousCoverage,
    /// Every frame in a term carries the same term id.
    TermIdConsistency,
    /// Every frame carries the owning publication's session/stream ids.
    HeaderIdentity,
    /// Stream positions recovered from scanned frames never decrease.
    PositionMonotonic,
}

/// A failed invariant with a human-readable explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Which invariant failed.
    pub invariant: InvariantKind,
    /// What was observed.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.invariant, self.message)
    }
}

/// Result of a single invariant check.
pub type InvariantResult = Result<(), Violation>;

/// A behavioral invariant over a term snapshot.
pub trait Invariant {
    /// Which invariant this is.
    fn kind(&self) -> InvariantKind;

    /// Check the invariant against a snapshot.
    fn check(&self, snapshot: &TermSnapshot) -> InvariantResult;
}

/// Everything an invariant needs to know about one scanned term.
#[derive(Debug, Clone)]
pub struct TermSnapshot {
    /// Term partition length.
    pub term_length: usize,
    /// Session id the publication stamps.
    pub session_id: i32,
    /// Stream id the publication stamps.
    pub stream_id: i32,
    /// Frames visible in the term, in offset order.
    pub frames: Vec<ScannedFrame>,
}

/// Scan a term buffer into a snapshot ready for checking.
#[must_use]
pub fn snapshot_term(term: &AtomicBuffer, session_id: i32, stream_id: i32) -> TermSnapshot {
    TermSnapshot {
        term_length: term.capacity(),
        session_id,
        stream_id,
        frames: scan_term(term),
    }
}

/// The standard invariant suite.
#[must_use]
pub fn standard_invariants() -> Vec<Box<dyn Invariant>> {
    vec![
        Box::new(checks::FrameBounds),
        Box::new(checks::ContiguousCoverage),
        Box::new(checks::TermIdConsistency),
        Box::new(checks::HeaderIdentity),
        Box::new(checks::PositionMonotonic),
    ]
}

/// Run the standard suite, failing on the first violation.
pub fn check_all(snapshot: &TermSnapshot) -> InvariantResult {
    for invariant in standard_invariants() {
        invariant.check(snapshot)?;
    }
    Ok(())
}
