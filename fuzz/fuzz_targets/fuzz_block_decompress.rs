#![no_main]

use libfuzzer_sys::fuzz_target;
use parallel_bgzf::{block_size, decompress_block, MAX_BLOCK_SIZE};

fuzz_target!(|data: &[u8]| {
    if data.len() > 2 * MAX_BLOCK_SIZE {
        return;
    }

    // Whatever the header claims, decoding must fail cleanly or yield a block
    // no larger than the format allows.
    if let Ok(size) = block_size(data) {
        assert!(size <= MAX_BLOCK_SIZE);
        if size <= data.len() {
            if let Ok(out) = decompress_block(&data[..size]) {
                assert!(out.len() <= MAX_BLOCK_SIZE);
            }
        }
    }
    let _ = decompress_block(data);
});
