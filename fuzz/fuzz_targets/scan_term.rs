//! Fuzz target for the log scanner.
//!
//! A subscriber may map a log another process is corrupting or has
//! half-written; scanning arbitrary bytes must never panic or read out
//! of bounds. All garbage terminates the scan with whatever valid
//! prefix was found.

#![no_main]

use libfuzzer_sys::fuzz_target;
use triptych_core::AtomicBuffer;
use triptych_harness::scan_term;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let buffer = AtomicBuffer::allocate(data.len());
    buffer.put_bytes(0, data);

    let frames = scan_term(&buffer);

    // Whatever was decoded must at least be structurally sane.
    for frame in &frames {
        assert!(frame.term_offset + frame.aligned_length <= buffer.capacity());
        assert!(frame.frame_length <= frame.aligned_length);
    }
});
