#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parallel_bgzf::{BgzfConfig, BgzfDecoder, BgzfEncoder, CompressionLevel, FlushMode};
use std::io::{Cursor, Read, Write};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    data: Vec<u8>,
    level: u8,
    threads: u8,
    buffers: u8,
    payload: u16,
    bounded: bool,
    chunk: u16,
}

fuzz_target!(|input: FuzzInput| {
    if input.data.len() > 1_000_000 {
        return;
    }

    let level = CompressionLevel::new(u32::from(input.level % 10)).unwrap();
    let payload = usize::from(input.payload).clamp(64, parallel_bgzf::MAX_BLOCK_PAYLOAD);
    let flush_mode = if input.bounded { FlushMode::Bounded } else { FlushMode::Full };
    let config = BgzfConfig::default()
        .with_threads(usize::from(input.threads % 4) + 1)
        .with_buffers(usize::from(input.buffers % 6) + 1)
        .with_level(level)
        .with_block_payload(payload)
        .with_flush_mode(flush_mode);

    let mut encoder = BgzfEncoder::new(Vec::new(), config.clone()).unwrap();
    for piece in input.data.chunks(usize::from(input.chunk).max(1)) {
        encoder.write_all(piece).unwrap();
    }
    let compressed = encoder.finish().unwrap();

    let mut decoder = BgzfDecoder::new(Cursor::new(compressed), config).unwrap();
    let mut output = Vec::new();
    decoder.read_to_end(&mut output).unwrap();
    assert_eq!(output, input.data);
});
