use parallel_bgzf::{
    block_size, decompress_block, BgzfConfig, BgzfDecoder, BgzfEncoder, CompressionLevel,
    FlushMode, BGZF_EOF, DEFAULT_BLOCK_PAYLOAD, MAX_BLOCK_PAYLOAD,
};
use rand::{Rng, SeedableRng};
use std::io::{Cursor, Read, Write};

fn config(threads: usize, buffers: usize) -> BgzfConfig {
    BgzfConfig::default()
        .with_threads(threads)
        .with_buffers(buffers)
}

fn compress(data: &[u8], config: BgzfConfig) -> Vec<u8> {
    let mut encoder = BgzfEncoder::new(Vec::new(), config).unwrap();
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn decompress(data: Vec<u8>, config: BgzfConfig) -> Vec<u8> {
    let mut decoder = BgzfDecoder::new(Cursor::new(data), config).unwrap();
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).unwrap();
    out
}

/// Splits a BGZF stream into its framed blocks.
fn frames(stream: &[u8]) -> Vec<&[u8]> {
    let mut frames = Vec::new();
    let mut pos = 0;
    while pos < stream.len() {
        let size = block_size(&stream[pos..]).unwrap();
        frames.push(&stream[pos..pos + size]);
        pos += size;
    }
    frames
}

fn sample_data(len: usize, seed: u64) -> Vec<u8> {
    // Mildly compressible: random words from a small alphabet.
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    (0..len).map(|_| b"ACGTN\n"[rng.gen_range(0..6)]).collect()
}

#[test]
fn test_empty_stream_is_just_the_eof_marker() {
    let compressed = compress(b"", config(2, 4));
    assert_eq!(compressed, BGZF_EOF);
    assert!(decompress(compressed, config(2, 4)).is_empty());
}

#[test]
fn test_block_boundaries() {
    let payload = DEFAULT_BLOCK_PAYLOAD;
    for len in [
        1,
        payload - 1,
        payload,
        payload + 1,
        2 * payload - 1,
        2 * payload,
        2 * payload + 1,
    ] {
        let data = sample_data(len, len as u64);
        let compressed = compress(&data, config(4, 8));
        let blocks = frames(&compressed);
        assert_eq!(blocks.len(), (len + payload - 1) / payload + 1, "len {}", len);
        assert_eq!(*blocks.last().unwrap(), &BGZF_EOF[..]);
        assert_eq!(decompress(compressed, config(4, 8)), data, "len {}", len);
    }
}

#[test]
fn test_three_hundred_thousand_bytes() {
    let data = vec![b'A'; 300_000];
    let compressed = compress(&data, config(4, 8));

    let blocks = frames(&compressed);
    assert_eq!(blocks.len(), 6);
    let sizes: Vec<usize> = blocks
        .iter()
        .map(|b| decompress_block(b).unwrap().len())
        .collect();
    assert_eq!(sizes, vec![65280, 65280, 65280, 65280, 38880, 0]);

    let mut decoder = BgzfDecoder::new(Cursor::new(compressed), config(4, 8)).unwrap();
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
    assert_eq!(decoder.blocks_read(), 6);

    let mut buf = [0u8; 1024];
    assert_eq!(decoder.read(&mut buf).unwrap(), 0);
    assert_eq!(decoder.read(&mut buf).unwrap(), 0);
}

#[test]
fn test_output_does_not_depend_on_thread_count() {
    let data = sample_data(1_000_000, 7);
    let single = compress(&data, config(1, 1));
    for threads in [2, 3, 8] {
        assert_eq!(compress(&data, config(threads, threads * 2)), single);
    }
    for threads in [1, 2, 8] {
        assert_eq!(decompress(single.clone(), config(threads, threads)), data);
    }
}

#[test]
fn test_single_buffer_pool_still_completes() {
    let data = sample_data(700_000, 11);
    let compressed = compress(&data, config(4, 1));
    assert_eq!(decompress(compressed, config(4, 1)), data);
}

#[test]
fn test_many_small_writes() {
    let data = sample_data(400_000, 3);
    let mut encoder = BgzfEncoder::new(Vec::new(), config(3, 6)).unwrap();
    for chunk in data.chunks(777) {
        encoder.write_all(chunk).unwrap();
    }
    assert_eq!(encoder.bytes_in(), data.len() as u64);
    let compressed = encoder.finish().unwrap();
    assert_eq!(decompress(compressed, config(3, 6)), data);
}

#[test]
fn test_small_reads() {
    let data = sample_data(200_000, 5);
    let compressed = compress(&data, config(2, 4));
    let mut decoder = BgzfDecoder::new(Cursor::new(compressed), config(2, 4)).unwrap();

    let mut out = Vec::new();
    let mut buf = [0u8; 13];
    loop {
        let n = decoder.read(&mut buf).unwrap();
        assert_eq!(decoder.last_read_len(), n);
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, data);
}

#[test]
fn test_bounded_writes_stop_at_block_end() {
    let data = sample_data(100_000, 9);
    let config = config(2, 4)
        .with_flush_mode(FlushMode::Bounded)
        .with_block_payload(10_000);
    let mut encoder = BgzfEncoder::new(Vec::new(), config.clone()).unwrap();

    assert_eq!(encoder.write(&data[..4_000]).unwrap(), 4_000);
    assert_eq!(encoder.write(&data[4_000..]).unwrap(), 6_000);
    encoder.write_all(&data[10_000..]).unwrap();
    let compressed = encoder.finish().unwrap();

    assert_eq!(frames(&compressed).len(), 11);
    assert_eq!(decompress(compressed, config), data);
}

#[test]
fn test_incompressible_data_at_every_level() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let data: Vec<u8> = (0..3 * MAX_BLOCK_PAYLOAD).map(|_| rng.gen()).collect();
    for level in [0, 1, 6, 9] {
        let config = config(4, 4)
            .with_level(CompressionLevel::new(level).unwrap())
            .with_block_payload(MAX_BLOCK_PAYLOAD);
        let compressed = compress(&data, config.clone());
        for frame in frames(&compressed) {
            assert!(frame.len() <= 65536);
        }
        assert_eq!(decompress(compressed, config), data, "level {}", level);
    }
}

#[test]
fn test_open_memory_maps_file() {
    let data = sample_data(150_000, 13);
    let compressed = compress(&data, config(2, 4));
    let path = std::env::temp_dir().join(format!("parallel_bgzf_open_{}.gz", std::process::id()));
    std::fs::write(&path, &compressed).unwrap();

    let mut decoder = BgzfDecoder::open(&path, config(2, 4)).unwrap();
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(out, data);
}
