//! Boundary scenarios observed from the subscriber side.
//!
//! Each test drives a publication through one edge of the append
//! protocol and verifies what a consumer scanning the shared log
//! actually sees: pads where claims were aborted, fragment chains with
//! the right flags, reserved values stamped little-endian, and frames
//! readable at the positions `offer` reported.

use triptych_core::PublicationError;
use triptych_harness::invariants::{check_all, snapshot_term};
use triptych_harness::{DriverConfig, SimDriver, reassemble_messages, scan_term};
use triptych_proto::{FRAME_ALIGNMENT, FrameFlags, HEADER_LENGTH, align};

fn driver_with_term(term_length: usize) -> SimDriver {
    SimDriver::launch(DriverConfig { term_length, ..DriverConfig::default() })
        .expect("valid config")
}

#[test]
fn aborted_claim_is_a_skippable_pad() {
    let driver = driver_with_term(64 * 1024);
    let publication = driver.add_publication("aeron:ipc", 1).expect("valid log");

    let claim = publication.try_claim(200).expect("claim fits");
    claim.abort();
    publication.offer(b"after the abort").expect("within limit");

    let term = driver.buffers().term_buffer(0);
    let frames = scan_term(&term);
    assert_eq!(frames.len(), 2);

    // 200 + 32-byte header: the header records 232, the slot spans 256.
    assert!(frames[0].is_pad());
    assert_eq!(frames[0].frame_length, HEADER_LENGTH + 200);
    assert_eq!(frames[0].aligned_length, align(HEADER_LENGTH + 200, FRAME_ALIGNMENT));

    // The consumer moves past the pad to the next frame.
    assert_eq!(frames[1].term_offset, frames[0].aligned_length);
    assert_eq!(&frames[1].payload[..], b"after the abort");

    check_all(&snapshot_term(&term, 1, 1001)).expect("invariants hold");
}

#[test]
fn abandoned_claim_stalls_consumers_until_published() {
    let driver = driver_with_term(64 * 1024);
    let publication = driver.add_publication("aeron:ipc", 1).expect("valid log");

    let claim = publication.try_claim(10).expect("claim fits");
    publication.offer(b"queued behind the claim").expect("within limit");

    // Nothing is visible: the unpublished slot blocks the scan.
    let term = driver.buffers().term_buffer(0);
    assert!(scan_term(&term).is_empty());

    claim.commit();
    let frames = scan_term(&term);
    assert_eq!(frames.len(), 2);
    assert_eq!(&frames[1].payload[..], b"queued behind the claim");
}

#[test]
fn large_offer_fragments_into_begin_mid_end_chain() {
    let driver = driver_with_term(1024 * 1024);
    let publication = driver.add_publication("aeron:ipc", 1).expect("valid log");

    let message: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    publication.offer(&message).expect("within limit");

    let term = driver.buffers().term_buffer(0);
    let frames = scan_term(&term);
    assert_eq!(frames.len(), 3);

    let payload_lengths: Vec<usize> = frames.iter().map(|frame| frame.payload.len()).collect();
    assert_eq!(payload_lengths, vec![4064, 4064, 1872]);

    assert_eq!(frames[0].flags, FrameFlags::BEGIN);
    assert_eq!(frames[1].flags, FrameFlags::NONE);
    assert_eq!(frames[2].flags, FrameFlags::END);
    assert!(frames.iter().all(|frame| frame.term_id == frames[0].term_id));

    let messages = reassemble_messages(&frames);
    assert_eq!(messages.len(), 1);
    assert_eq!(&messages[0][..], &message[..]);

    check_all(&snapshot_term(&term, 1, 1001)).expect("invariants hold");
}

#[test]
fn offer_part_publishes_only_the_requested_range() {
    let driver = driver_with_term(64 * 1024);
    let publication = driver.add_publication("aeron:ipc", 1).expect("valid log");

    let source: Vec<u8> = (0..256u32).map(|i| i as u8).collect();
    publication.offer_part(&source, 100, 50).expect("within limit");

    let term = driver.buffers().term_buffer(0);
    let frames = scan_term(&term);
    assert_eq!(frames.len(), 1);
    assert_eq!(&frames[0].payload[..], &source[100..150]);
    assert_eq!(frames[0].flags, FrameFlags::UNFRAGMENTED);
}

#[test]
fn reserved_value_supplier_is_stamped_little_endian() {
    let driver = driver_with_term(64 * 1024);
    let publication = driver.add_publication("aeron:ipc", 1).expect("valid log");

    publication
        .offer_with(&[0u8; 100], |_buffer, _offset, _length| 0x0000_DEAD_BEEF_CAFE)
        .expect("within limit");

    let term = driver.buffers().term_buffer(0);
    let frames = scan_term(&term);
    assert_eq!(frames[0].reserved_value, 0x0000_DEAD_BEEF_CAFE);

    // Raw bytes on the wire are little-endian.
    let mut raw = [0u8; 8];
    term.get_bytes(24, &mut raw);
    assert_eq!(hex::encode(raw), "fecaefbeadde0000");
}

#[test]
fn offered_frame_reads_back_at_returned_position() {
    let driver = driver_with_term(64 * 1024);
    let publication = driver.add_publication("aeron:ipc", 1).expect("valid log");

    let message = b"round trip law";
    let aligned = align(HEADER_LENGTH + message.len(), FRAME_ALIGNMENT);

    publication.offer(&[9u8; 77]).expect("within limit");
    let position = publication.offer(message).expect("within limit");

    let term = driver.buffers().term_buffer(0);
    let frames = scan_term(&term);
    let frame = frames
        .iter()
        .find(|frame| frame.term_offset == (position as usize) - aligned)
        .expect("frame at returned position");

    assert_eq!(&frame.payload[..], message);
    assert_eq!(frame.flags, FrameFlags::UNFRAGMENTED);
    assert_eq!(frame.frame_length, HEADER_LENGTH + message.len());
    assert_eq!(frame.session_id, 1);
    assert_eq!(frame.stream_id, 1001);
}

#[test]
fn claim_commit_matches_offer_wire_image() {
    let driver = driver_with_term(64 * 1024);
    let publication = driver.add_publication("aeron:ipc", 1).expect("valid log");

    let mut claim = publication.try_claim(5).expect("claim fits");
    claim.put_bytes(0, b"claim");
    claim.set_reserved_value(42);
    claim.commit();

    publication.offer_with(b"claim", |_, _, _| 42).expect("within limit");

    let term = driver.buffers().term_buffer(0);
    let frames = scan_term(&term);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].payload, frames[1].payload);
    assert_eq!(frames[0].reserved_value, frames[1].reserved_value);
    assert_eq!(frames[0].flags, frames[1].flags);
    assert_eq!(frames[0].frame_length, frames[1].frame_length);
}

#[test]
fn mid_term_restart_is_not_possible_for_failed_writers() {
    // A writer that loses the end-of-term race must not dirty the term.
    let driver = driver_with_term(64 * 1024);
    let publication = driver.add_publication("aeron:ipc", 1).expect("valid log");

    let max_payload = publication.max_payload_length();
    loop {
        match publication.offer(&vec![1u8; max_payload]) {
            Ok(_) => {},
            Err(PublicationError::AdminAction) => break,
            Err(other) => panic!("unexpected state: {other}"),
        }
    }

    let term = driver.buffers().term_buffer(0);
    check_all(&snapshot_term(&term, 1, 1001)).expect("invariants hold");

    // Term 0 is fully covered: frames (plus any pad) reach the end.
    let frames = scan_term(&term);
    let covered: usize = frames.iter().map(|frame| frame.aligned_length).sum();
    assert_eq!(covered, 64 * 1024);
}
