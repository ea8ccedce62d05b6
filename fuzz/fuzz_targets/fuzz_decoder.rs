#![no_main]

use libfuzzer_sys::fuzz_target;
use parallel_bgzf::{BgzfConfig, BgzfDecoder};
use std::io::{Cursor, Read};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() || data.len() > 10_000_000 {
        return;
    }

    let config = BgzfConfig::default().with_threads(2).with_buffers(4);
    let mut decoder = match BgzfDecoder::new(Cursor::new(data.to_vec()), config) {
        Ok(decoder) => decoder,
        Err(_) => return,
    };

    // Blocks inflate to at most 64 KiB each, so output is bounded by the input.
    let mut buf = [0u8; 8192];
    let mut total = 0usize;
    loop {
        match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(_) => {
                // Errors are terminal.
                assert!(decoder.read(&mut buf).is_err());
                break;
            }
        }
    }
    assert!(total <= (data.len() / 26 + 1) * 65536);
});
