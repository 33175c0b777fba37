//! Standard invariant checks.

use triptych_proto::{HEADER_LENGTH, compute_position, position_bits_to_shift};

use super::{Invariant, InvariantKind, InvariantResult, TermSnapshot, Violation};

/// Every published frame must lie fully within its term and be at least
/// a header long.
pub struct FrameBounds;

impl Invariant for FrameBounds {
    fn kind(&self) -> InvariantKind {
        InvariantKind::FrameBounds
    }

    fn check(&self, snapshot: &TermSnapshot) -> InvariantResult {
        for frame in &snapshot.frames {
            if frame.frame_length < HEADER_LENGTH
                || frame.term_offset + frame.aligned_length > snapshot.term_length
            {
                return Err(Violation {
                    invariant: self.kind(),
                    message: format!(
                        "frame at {} with length {} (aligned {}) escapes term of {}",
                        frame.term_offset,
                        frame.frame_length,
                        frame.aligned_length,
                        snapshot.term_length
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Visible frames must tile a prefix of the term: the first starts at
/// offset zero and each subsequent frame starts exactly where the
/// previous aligned range ended. Concurrent producers may never overlap
/// nor leave an unclaimed hole behind a published frame.
pub struct ContiguousCoverage;

impl Invariant for ContiguousCoverage {
    fn kind(&self) -> InvariantKind {
        InvariantKind::ContiguousCoverage
    }

    fn check(&self, snapshot: &TermSnapshot) -> InvariantResult {
        let mut expected_offset = 0;
        for frame in &snapshot.frames {
            if frame.term_offset != expected_offset {
                return Err(Violation {
                    invariant: self.kind(),
                    message: format!(
                        "frame at {} but previous coverage ended at {expected_offset}",
                        frame.term_offset
                    ),
                });
            }
            expected_offset += frame.aligned_length;
        }
        Ok(())
    }
}

/// All frames in one term carry that term's id.
pub struct TermIdConsistency;

impl Invariant for TermIdConsistency {
    fn kind(&self) -> InvariantKind {
        InvariantKind::TermIdConsistency
    }

    fn check(&self, snapshot: &TermSnapshot) -> InvariantResult {
        let Some(first) = snapshot.frames.first() else {
            return Ok(());
        };
        for frame in &snapshot.frames {
            if frame.term_id != first.term_id {
                return Err(Violation {
                    invariant: self.kind(),
                    message: format!(
                        "frame at {} has term id {}, first frame has {}",
                        frame.term_offset, frame.term_id, first.term_id
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Stream positions derived from `(term id, term offset)` never decrease
/// in scan order: each frame begins at or after the position where the
/// previous frame ended.
///
/// Positions are computed relative to term id zero; within one snapshot
/// the initial term id is a constant offset and cancels out of every
/// comparison, so it is not part of the snapshot.
pub struct PositionMonotonic;

impl Invariant for PositionMonotonic {
    fn kind(&self) -> InvariantKind {
        InvariantKind::PositionMonotonic
    }

    fn check(&self, snapshot: &TermSnapshot) -> InvariantResult {
        let bits_to_shift = position_bits_to_shift(snapshot.term_length);
        let mut previous_end: Option<i64> = None;

        for frame in &snapshot.frames {
            let start =
                compute_position(frame.term_id, frame.term_offset as i32, bits_to_shift, 0);
            if let Some(previous) = previous_end {
                if start < previous {
                    return Err(Violation {
                        invariant: self.kind(),
                        message: format!(
                            "frame at {} begins at position {start}, before the previous \
                             frame ended at {previous}",
                            frame.term_offset
                        ),
                    });
                }
            }
            previous_end = Some(start + frame.aligned_length as i64);
        }
        Ok(())
    }
}

/// Every frame carries the session and stream ids of the publication
/// that owns the log.
pub struct HeaderIdentity;

impl Invariant for HeaderIdentity {
    fn kind(&self) -> InvariantKind {
        InvariantKind::HeaderIdentity
    }

    fn check(&self, snapshot: &TermSnapshot) -> InvariantResult {
        for frame in &snapshot.frames {
            if frame.session_id != snapshot.session_id || frame.stream_id != snapshot.stream_id {
                return Err(Violation {
                    invariant: self.kind(),
                    message: format!(
                        "frame at {} stamped ({}, {}), publication is ({}, {})",
                        frame.term_offset,
                        frame.session_id,
                        frame.stream_id,
                        snapshot.session_id,
                        snapshot.stream_id
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use triptych_proto::{FrameFlags, FrameType, TERM_MIN_LENGTH};

    use super::*;
    use crate::scanner::ScannedFrame;

    fn frame_at(term_offset: usize, aligned_length: usize, term_id: i32) -> ScannedFrame {
        ScannedFrame {
            term_offset,
            frame_length: aligned_length,
            aligned_length,
            frame_type: Some(FrameType::Data),
            flags: FrameFlags::UNFRAGMENTED,
            term_id,
            session_id: 1,
            stream_id: 1,
            reserved_value: 0,
            payload: Bytes::new(),
        }
    }

    fn snapshot_of(frames: Vec<ScannedFrame>) -> TermSnapshot {
        TermSnapshot { term_length: TERM_MIN_LENGTH, session_id: 1, stream_id: 1, frames }
    }

    #[test]
    fn monotonic_positions_pass() {
        let snapshot = snapshot_of(vec![frame_at(0, 64, 5), frame_at(64, 96, 5)]);
        assert!(PositionMonotonic.check(&snapshot).is_ok());
    }

    #[test]
    fn overlapping_frames_violate_position_monotonicity() {
        // Second frame begins inside the first frame's range.
        let snapshot = snapshot_of(vec![frame_at(0, 64, 5), frame_at(32, 64, 5)]);
        let violation = PositionMonotonic.check(&snapshot).expect_err("overlap");
        assert_eq!(violation.invariant, InvariantKind::PositionMonotonic);
    }

    #[test]
    fn a_rewound_term_id_violates_position_monotonicity() {
        // Same offsets, but the second frame claims an older term.
        let snapshot = snapshot_of(vec![frame_at(0, 64, 5), frame_at(64, 64, 4)]);
        assert!(PositionMonotonic.check(&snapshot).is_err());
    }
}
