//! Fuzz target for position arithmetic round-trip laws.

#![no_main]

use libfuzzer_sys::fuzz_target;
use triptych_proto::{
    compute_position, compute_term_id_from_position, compute_term_offset_from_position,
};

fuzz_target!(|input: (i32, i32, u32, u16)| {
    let (initial_term_id, term_count, offset_seed, bits_seed) = input;

    // Valid geometries: term lengths from 64 KiB to 1 GiB.
    let bits_to_shift = 16 + u32::from(bits_seed) % 15;
    let term_id = initial_term_id.wrapping_add(term_count & i32::MAX);
    let term_offset = (offset_seed % (1 << bits_to_shift)) as i32;

    let position = compute_position(term_id, term_offset, bits_to_shift, initial_term_id);

    assert_eq!(compute_term_id_from_position(position, bits_to_shift, initial_term_id), term_id);
    assert_eq!(compute_term_offset_from_position(position, bits_to_shift), term_offset);
});
