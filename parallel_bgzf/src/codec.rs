//! Single-block BGZF codec.
//!
//! A BGZF block is a complete gzip member carrying a `BC` extra subfield that
//! stores the total block size, so a reader can hop from block to block
//! without inflating anything:
//!
//! ```text
//! 1f 8b 08 04 | mtime=0 | xfl=0 os=ff | xlen=6 | 'B' 'C' 02 00 | bsize-1
//! raw deflate payload ...
//! crc32(uncompressed) | isize(uncompressed)
//! ```
//!
//! Every block is independently decompressible and never exceeds
//! [`MAX_BLOCK_SIZE`] bytes. A block whose payload inflates to nothing is the
//! end-of-stream marker, see [`BGZF_EOF`].

use crate::config::CompressionLevel;
use crate::error::{BgzfError, Result};
use flate2::{Compress, Decompress, FlushCompress, FlushDecompress, Status};
use std::cell::RefCell;
use std::io::{self, Read};

/// Fixed header length (gzip header plus the `BC` extra field).
pub const BLOCK_HEADER_LEN: usize = 18;

pub const BLOCK_FOOTER_LEN: usize = 8;

/// Largest framed block, header and footer included.
pub const MAX_BLOCK_SIZE: usize = 65536;

/// Largest uncompressed payload a block may be asked to hold.
pub const MAX_BLOCK_PAYLOAD: usize = MAX_BLOCK_SIZE - BLOCK_HEADER_LEN - BLOCK_FOOTER_LEN;

/// Default payload per block, the value samtools and htslib use.
pub const DEFAULT_BLOCK_PAYLOAD: usize = 0xff00;

/// The canonical empty block that terminates a BGZF stream.
pub const BGZF_EOF: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02,
    0x00, 0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Header template; the last two bytes are patched with `bsize - 1`.
const BLOCK_HEADER: [u8; BLOCK_HEADER_LEN] = [
    0x1f, 0x8b, // magic
    0x08, // CM = deflate
    0x04, // FLG = FEXTRA
    0x00, 0x00, 0x00, 0x00, // MTIME
    0x00, // XFL
    0xff, // OS = unknown
    0x06, 0x00, // XLEN
    b'B', b'C', // subfield id
    0x02, 0x00, // subfield length
    0x00, 0x00, // bsize - 1
];

/// Sizes of one physical framed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInfo {
    /// Bytes the block inflates to.
    pub uncompressed_size: usize,
    /// Total framed size, header and footer included.
    pub compressed_size: usize,
}

thread_local! {
    static COMPRESSOR: RefCell<Option<(CompressionLevel, Compress)>> = const { RefCell::new(None) };
    static DECOMPRESSOR: RefCell<Decompress> = RefCell::new(Decompress::new(false));
}

/// Returns true if `header` starts with the gzip magic.
pub fn is_bgzf_header(header: &[u8]) -> bool {
    header.len() >= 2 && header[0..2] == [0x1f, 0x8b]
}

/// Validates a block header and returns the total framed block size.
pub fn block_size(header: &[u8]) -> Result<usize> {
    if header.len() < BLOCK_HEADER_LEN {
        return Err(BgzfError::truncated(format!(
            "block header needs {} bytes, got {}",
            BLOCK_HEADER_LEN,
            header.len()
        )));
    }
    if !is_bgzf_header(header) {
        return Err(BgzfError::format(format!(
            "bad magic {:02x} {:02x}",
            header[0], header[1]
        )));
    }
    if header[2] != 8 {
        return Err(BgzfError::format(format!("unsupported compression method {}", header[2])));
    }
    if header[3] != 0x04 {
        return Err(BgzfError::format(format!(
            "header flags {:#04x}, expected FEXTRA only",
            header[3]
        )));
    }
    let xlen = u16::from_le_bytes([header[10], header[11]]);
    if xlen != 6 || &header[12..14] != b"BC" || u16::from_le_bytes([header[14], header[15]]) != 2 {
        return Err(BgzfError::format("missing BC block-size subfield"));
    }

    let size = u16::from_le_bytes([header[16], header[17]]) as usize + 1;
    if size < BLOCK_HEADER_LEN + BLOCK_FOOTER_LEN {
        return Err(BgzfError::format(format!("block size {} is too small", size)));
    }
    Ok(size)
}

pub fn compress_block(input: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(MAX_BLOCK_SIZE);
    let mut frames = Vec::with_capacity(2);
    compress_block_into(input, level, &mut out, &mut frames)?;
    Ok(out)
}

/// Compresses `input` into framed block(s) written to `out`.
///
/// One block is produced unless the deflate output would not fit in
/// [`MAX_BLOCK_SIZE`]; then the input is split in two halves that are framed
/// back to back. `frames` receives the sizes of every block written.
pub fn compress_block_into(
    input: &[u8],
    level: CompressionLevel,
    out: &mut Vec<u8>,
    frames: &mut Vec<FrameInfo>,
) -> Result<()> {
    out.clear();
    frames.clear();
    if input.len() > MAX_BLOCK_PAYLOAD {
        return Err(BgzfError::codec(format!(
            "{} bytes exceed the block payload limit of {}",
            input.len(),
            MAX_BLOCK_PAYLOAD
        )));
    }

    if let Some(frame) = encode_frame(input, level, out)? {
        frames.push(frame);
        return Ok(());
    }

    out.clear();
    let (head, tail) = input.split_at(input.len() / 2);
    for half in [head, tail] {
        match encode_frame(half, level, out)? {
            Some(frame) => frames.push(frame),
            None => {
                return Err(BgzfError::codec(format!(
                    "{} bytes do not fit in a block even after splitting",
                    half.len()
                )))
            }
        }
    }
    Ok(())
}

/// Appends one framed block to `out`, or returns `None` if it would not fit.
fn encode_frame(
    input: &[u8],
    level: CompressionLevel,
    out: &mut Vec<u8>,
) -> Result<Option<FrameInfo>> {
    let start = out.len();
    let payload_start = start + BLOCK_HEADER_LEN;
    out.resize(start + MAX_BLOCK_SIZE - BLOCK_FOOTER_LEN, 0);
    out[start..payload_start].copy_from_slice(&BLOCK_HEADER);

    let Some(payload_len) = deflate_into(input, level, &mut out[payload_start..])? else {
        out.truncate(start);
        return Ok(None);
    };
    out.truncate(payload_start + payload_len);

    out.extend_from_slice(&crc32fast::hash(input).to_le_bytes());
    out.extend_from_slice(&(input.len() as u32).to_le_bytes());

    let size = out.len() - start;
    out[start + 16..start + 18].copy_from_slice(&((size - 1) as u16).to_le_bytes());

    Ok(Some(FrameInfo {
        uncompressed_size: input.len(),
        compressed_size: size,
    }))
}

/// Raw-deflates `input` into `output` in one shot using this thread's compressor.
fn deflate_into(input: &[u8], level: CompressionLevel, output: &mut [u8]) -> Result<Option<usize>> {
    COMPRESSOR.with(|cell| {
        let mut cached = cell.borrow_mut();
        if cached.as_ref().map_or(true, |(cached_level, _)| *cached_level != level) {
            *cached = None;
        }
        let (_, compressor) =
            cached.get_or_insert_with(|| (level, Compress::new(level.into(), false)));
        compressor.reset();

        let status = compressor
            .compress(input, output, FlushCompress::Finish)
            .map_err(|e| BgzfError::codec(e.to_string()))?;

        if status == Status::StreamEnd && compressor.total_in() as usize == input.len() {
            Ok(Some(compressor.total_out() as usize))
        } else {
            Ok(None)
        }
    })
}

pub fn decompress_block(framed: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    decompress_block_into(framed, &mut out)?;
    Ok(out)
}

/// Decompresses one framed block into `out`, replacing its contents.
///
/// The header, the declared block size, the CRC32 and the uncompressed length
/// are all checked; any mismatch is a [`BgzfError::Format`].
pub fn decompress_block_into(framed: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let size = block_size(framed)?;
    if framed.len() != size {
        return Err(BgzfError::format(format!(
            "block declares {} bytes but {} were supplied",
            size,
            framed.len()
        )));
    }

    let footer = &framed[size - BLOCK_FOOTER_LEN..];
    let expected_crc = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let expected_len = u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]) as usize;
    if expected_len > MAX_BLOCK_SIZE {
        return Err(BgzfError::format(format!(
            "declared payload of {} bytes exceeds {}",
            expected_len, MAX_BLOCK_SIZE
        )));
    }

    let payload = &framed[BLOCK_HEADER_LEN..size - BLOCK_FOOTER_LEN];
    out.clear();
    // One spare byte so an overlong payload shows up as a length mismatch.
    out.reserve(expected_len + 1);

    DECOMPRESSOR.with(|cell| {
        let mut decompressor = cell.borrow_mut();
        decompressor.reset(false);
        let status = decompressor
            .decompress_vec(payload, out, FlushDecompress::Finish)
            .map_err(|e| BgzfError::format(format!("corrupt deflate payload: {}", e)))?;
        if status != Status::StreamEnd {
            return Err(BgzfError::format("deflate payload does not terminate"));
        }
        Ok(())
    })?;

    if out.len() != expected_len {
        return Err(BgzfError::format(format!(
            "payload inflated to {} bytes, footer declares {}",
            out.len(),
            expected_len
        )));
    }
    let crc = crc32fast::hash(out);
    if crc != expected_crc {
        return Err(BgzfError::format(format!(
            "CRC mismatch: computed {:08x}, footer declares {:08x}",
            crc, expected_crc
        )));
    }
    Ok(())
}

/// Reads exactly one framed block from `source` into `buf`.
///
/// Returns `Ok(None)` when the source is exhausted on a block boundary and
/// [`BgzfError::Truncated`] when it ends inside a block.
pub fn read_frame<R: Read + ?Sized>(
    source: &mut R,
    buf: &mut Vec<u8>,
) -> Result<Option<FrameInfo>> {
    buf.clear();
    buf.resize(BLOCK_HEADER_LEN, 0);
    let got = read_full(source, &mut buf[..])?;
    if got == 0 {
        buf.clear();
        return Ok(None);
    }
    if got < BLOCK_HEADER_LEN {
        return Err(BgzfError::truncated(format!(
            "source ended after {} of {} header bytes",
            got, BLOCK_HEADER_LEN
        )));
    }

    let size = block_size(buf)?;
    buf.resize(size, 0);
    let body = size - BLOCK_HEADER_LEN;
    let got = read_full(source, &mut buf[BLOCK_HEADER_LEN..])?;
    if got < body {
        return Err(BgzfError::truncated(format!(
            "source ended after {} of {} block bytes",
            BLOCK_HEADER_LEN + got,
            size
        )));
    }

    let isize = u32::from_le_bytes([buf[size - 4], buf[size - 3], buf[size - 2], buf[size - 1]]);
    Ok(Some(FrameInfo {
        uncompressed_size: isize as usize,
        compressed_size: size,
    }))
}

/// Fills `buf` from `source`, stopping early only at end of input.
fn read_full<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
