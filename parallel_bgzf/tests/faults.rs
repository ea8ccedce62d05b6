use parallel_bgzf::{block_size, BgzfConfig, BgzfDecoder, BgzfEncoder, BgzfError};
use std::io::{self, Cursor, Read, Write};

const PAYLOAD: usize = 1000;

fn config() -> BgzfConfig {
    BgzfConfig::default()
        .with_threads(4)
        .with_buffers(4)
        .with_block_payload(PAYLOAD)
}

fn data() -> Vec<u8> {
    (0..40 * PAYLOAD).map(|i| (i / PAYLOAD) as u8).collect()
}

fn compressed() -> Vec<u8> {
    let mut encoder = BgzfEncoder::new(Vec::new(), config()).unwrap();
    encoder.write_all(&data()).unwrap();
    encoder.finish().unwrap()
}

fn block_offsets(stream: &[u8]) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut pos = 0;
    while pos < stream.len() {
        offsets.push(pos);
        pos += block_size(&stream[pos..]).unwrap();
    }
    offsets
}

/// Reads until an error, returning what was delivered before it.
fn read_until_error(decoder: &mut BgzfDecoder) -> (Vec<u8>, BgzfError) {
    let mut delivered = Vec::new();
    let mut buf = [0u8; 700];
    loop {
        match decoder.read_decompressed(&mut buf) {
            Ok(0) => panic!("stream ended without reporting the fault"),
            Ok(n) => delivered.extend_from_slice(&buf[..n]),
            Err(e) => return (delivered, e),
        }
    }
}

#[test]
fn test_bad_magic_stops_before_the_block() {
    let mut stream = compressed();
    let offsets = block_offsets(&stream);
    stream[offsets[17]] = 0x00;

    let mut decoder = BgzfDecoder::new(Cursor::new(stream), config()).unwrap();
    let (delivered, err) = read_until_error(&mut decoder);
    assert!(matches!(err, BgzfError::Format(_)), "{:?}", err);
    assert_eq!(delivered, &data()[..17 * PAYLOAD]);

    let mut buf = [0u8; 16];
    assert!(matches!(
        decoder.read_decompressed(&mut buf),
        Err(BgzfError::Format(_))
    ));
}

#[test]
fn test_crc_mismatch_delivers_only_the_prefix() {
    let mut stream = compressed();
    let offsets = block_offsets(&stream);
    // CRC32 is the first footer field of block 9.
    stream[offsets[10] - 8] ^= 0xff;

    let mut decoder = BgzfDecoder::new(Cursor::new(stream), config()).unwrap();
    let (delivered, err) = read_until_error(&mut decoder);
    assert!(matches!(err, BgzfError::Format(_)), "{:?}", err);
    assert_eq!(delivered, &data()[..9 * PAYLOAD]);
}

#[test]
fn test_truncation_is_reported() {
    let mut stream = compressed();
    let offsets = block_offsets(&stream);
    stream.truncate(offsets[25] + 10);

    let mut decoder = BgzfDecoder::new(Cursor::new(stream), config()).unwrap();
    let mut out = Vec::new();
    let err = decoder.read_to_end(&mut out).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    let inner = err.get_ref().and_then(|e| e.downcast_ref::<BgzfError>());
    assert!(matches!(inner, Some(BgzfError::Truncated(_))));
    assert_eq!(out, &data()[..25 * PAYLOAD]);
}

#[test]
fn test_source_error_is_reported() {
    struct FailingSource {
        inner: Cursor<Vec<u8>>,
        limit: u64,
    }

    impl Read for FailingSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.inner.position() >= self.limit {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "source went away"));
            }
            let room = (self.limit - self.inner.position()) as usize;
            let len = buf.len().min(room);
            self.inner.read(&mut buf[..len])
        }
    }

    let stream = compressed();
    let limit = block_offsets(&stream)[5] as u64 + 3;
    let source = FailingSource {
        inner: Cursor::new(stream),
        limit,
    };
    let mut decoder = BgzfDecoder::new(source, config()).unwrap();
    let (delivered, err) = read_until_error(&mut decoder);
    assert!(matches!(err, BgzfError::StreamIo(_)), "{:?}", err);
    assert_eq!(delivered, &data()[..5 * PAYLOAD]);
}

#[test]
fn test_sink_error_is_sticky() {
    struct LimitedSink {
        written: usize,
        limit: usize,
    }

    impl Write for LimitedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written + buf.len() > self.limit {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.written += buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let sink = LimitedSink {
        written: 0,
        limit: 500,
    };
    let mut encoder = BgzfEncoder::new(sink, config()).unwrap();
    let data = data();
    let mut failed = false;
    for chunk in data.chunks(3 * PAYLOAD) {
        if encoder.write_all(chunk).is_err() {
            failed = true;
            break;
        }
    }

    let err = encoder.flush_stream().unwrap_err();
    assert!(matches!(err, BgzfError::StreamIo(_)), "{:?}", err);
    assert!(matches!(encoder.flush_stream(), Err(BgzfError::StreamIo(_))));
    if failed {
        assert!(encoder.bytes_in() < data.len() as u64);
    }
    assert!(encoder.write(b"more").is_err());
    assert!(encoder.bytes_out() <= 500);
}

#[test]
fn test_plain_gzip_is_rejected() {
    let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    gz.write_all(b"not a bgzf stream").unwrap();
    let stream = gz.finish().unwrap();

    let mut decoder = BgzfDecoder::new(Cursor::new(stream), config()).unwrap();
    let mut out = Vec::new();
    let err = decoder.read_to_end(&mut out).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    assert!(out.is_empty());
}
