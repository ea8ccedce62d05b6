//! Block-size side channel for external random-access indexers.
//!
//! While writing, the encoder can emit one record per physical framed block,
//! in stream order: the uncompressed size followed by the compressed size.
//! Each value is a length-prefixed varint. The number of leading one bits in
//! its first byte says how many bytes follow (as in UTF-8), the remaining bits
//! of the first byte and the following bytes hold the value big-endian:
//!
//! ```text
//! 0xxxxxxx                      7 bits
//! 10xxxxxx xxxxxxxx             14 bits
//! 110xxxxx xxxxxxxx xxxxxxxx    21 bits
//! ...
//! 11111110 + 7 bytes            56 bits
//! 11111111 + 8 bytes            64 bits
//! ```
//!
//! Summing the records gives every block's position in both coordinate
//! spaces, which is all an indexer needs to build BGZF virtual offsets.

use crate::codec::FrameInfo;
use crate::error::{BgzfError, Result};
use std::io::{self, Read, Write};

/// Longest encoding of a `u64`: the prefix byte and eight value bytes.
const MAX_VARINT_LEN: usize = 9;

/// Value bits available to an encoding with `extra` bytes after the prefix.
fn value_bits(extra: usize) -> u32 {
    if extra == 8 {
        64
    } else {
        7 * (extra as u32 + 1)
    }
}

/// Writes `value` as a length-prefixed varint.
pub fn write_varint<W: Write + ?Sized>(writer: &mut W, value: u64) -> io::Result<()> {
    let extra = (0..8).find(|&k| value >> value_bits(k) == 0).unwrap_or(8);
    let len = extra + 1;
    let mut buf = [0u8; MAX_VARINT_LEN];
    if extra == 8 {
        buf[0] = 0xff;
        buf[1..].copy_from_slice(&value.to_be_bytes());
    } else {
        buf[..len].copy_from_slice(&value.to_be_bytes()[8 - len..]);
        buf[0] |= !(0xffu8 >> extra);
    }
    writer.write_all(&buf[..len])
}

/// Reads one length-prefixed varint.
///
/// Returns `Ok(None)` if the reader is exhausted before the first byte.
pub fn read_varint<R: Read + ?Sized>(reader: &mut R) -> Result<Option<u64>> {
    let mut first = [0u8; 1];
    loop {
        match reader.read(&mut first) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let extra = first[0].leading_ones() as usize;
    let mut rest = [0u8; 8];
    reader.read_exact(&mut rest[..extra]).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            BgzfError::truncated("index ended inside a varint")
        } else {
            e.into()
        }
    })?;

    let mut value = if extra == 8 {
        0
    } else {
        u64::from(first[0] & (0x7f >> extra))
    };
    for byte in &rest[..extra] {
        value = (value << 8) | u64::from(*byte);
    }
    if extra > 0 && value >> value_bits(extra - 1) == 0 {
        return Err(BgzfError::format(format!(
            "varint {} uses {} bytes, more than it needs",
            value,
            extra + 1
        )));
    }
    Ok(Some(value))
}

/// Writes the index record for one framed block.
pub fn write_entry<W: Write + ?Sized>(writer: &mut W, frame: &FrameInfo) -> io::Result<()> {
    write_varint(writer, frame.uncompressed_size as u64)?;
    write_varint(writer, frame.compressed_size as u64)
}

/// Decodes a complete index stream.
pub fn read_index<R: Read>(mut reader: R) -> Result<Vec<FrameInfo>> {
    let mut entries = Vec::new();
    while let Some(uncompressed) = read_varint(&mut reader)? {
        let compressed = read_varint(&mut reader)?
            .ok_or_else(|| BgzfError::truncated("index record is missing its compressed size"))?;
        entries.push(FrameInfo {
            uncompressed_size: uncompressed as usize,
            compressed_size: compressed as usize,
        });
    }
    Ok(entries)
}

/// A BGZF virtual offset: block start in the compressed file in the upper 48
/// bits, position inside the inflated block in the lower 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    pub fn new(compressed_offset: u64, within_block: u16) -> Self {
        VirtualOffset((compressed_offset << 16) | u64::from(within_block))
    }

    pub fn compressed_offset(self) -> u64 {
        self.0 >> 16
    }

    pub fn within_block(self) -> u16 {
        (self.0 & 0xffff) as u16
    }
}

impl From<VirtualOffset> for u64 {
    fn from(offset: VirtualOffset) -> Self {
        offset.0
    }
}

#[derive(Debug, Clone, Copy)]
struct IndexedBlock {
    compressed_offset: u64,
    uncompressed_offset: u64,
    uncompressed_size: u64,
}

/// Cumulative block positions rebuilt from index records.
#[derive(Debug, Default)]
pub struct BlockIndex {
    blocks: Vec<IndexedBlock>,
    compressed_total: u64,
    uncompressed_total: u64,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a FrameInfo>) -> Self {
        let mut index = Self::new();
        for entry in entries {
            index.add_block(entry);
        }
        index
    }

    /// Appends the next block of the stream.
    pub fn add_block(&mut self, frame: &FrameInfo) {
        self.blocks.push(IndexedBlock {
            compressed_offset: self.compressed_total,
            uncompressed_offset: self.uncompressed_total,
            uncompressed_size: frame.uncompressed_size as u64,
        });
        self.compressed_total += frame.compressed_size as u64;
        self.uncompressed_total += frame.uncompressed_size as u64;
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total size of the compressed stream.
    pub fn compressed_size(&self) -> u64 {
        self.compressed_total
    }

    /// Total size of the uncompressed stream.
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_total
    }

    /// Virtual offset of uncompressed byte `position`, if it exists.
    pub fn locate(&self, position: u64) -> Option<VirtualOffset> {
        let idx = self
            .blocks
            .partition_point(|b| b.uncompressed_offset + b.uncompressed_size <= position);
        let block = self.blocks.get(idx)?;
        let within = position.checked_sub(block.uncompressed_offset)?;
        Some(VirtualOffset::new(block.compressed_offset, u16::try_from(within).ok()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(uncompressed_size: usize, compressed_size: usize) -> FrameInfo {
        FrameInfo {
            uncompressed_size,
            compressed_size,
        }
    }

    #[test]
    fn test_varint_encoding() {
        let mut out = Vec::new();
        for value in [0, 127, 128, 300, 16384, 65280] {
            write_varint(&mut out, value).unwrap();
        }
        assert_eq!(
            out,
            vec![
                0x00, // 0
                0x7f, // 127
                0x80, 0x80, // 128
                0x81, 0x2c, // 300
                0xc0, 0x40, 0x00, // 16384
                0xc0, 0xff, 0x00, // 65280
            ]
        );

        let mut reader = &out[..];
        for value in [0, 127, 128, 300, 16384, 65280] {
            assert_eq!(read_varint(&mut reader).unwrap(), Some(value));
        }
        assert_eq!(read_varint(&mut reader).unwrap(), None);
    }

    #[test]
    fn test_varint_lengths() {
        for (value, len) in [
            ((1u64 << 56) - 1, 8),
            (1 << 56, 9),
            (u64::MAX, MAX_VARINT_LEN),
        ] {
            let mut out = Vec::new();
            write_varint(&mut out, value).unwrap();
            assert_eq!(out.len(), len, "value {:#x}", value);
            assert_eq!(read_varint(&mut &out[..]).unwrap(), Some(value));
        }
    }

    #[test]
    fn test_truncated_varint() {
        let data = [0xc0u8, 0x01];
        assert!(matches!(
            read_varint(&mut &data[..]),
            Err(BgzfError::Truncated(_))
        ));
    }

    #[test]
    fn test_padded_varint_is_rejected() {
        let data = [0x80u8, 0x05];
        assert!(matches!(read_varint(&mut &data[..]), Err(BgzfError::Format(_))));
    }

    #[test]
    fn test_index_records() {
        let mut out = Vec::new();
        write_entry(&mut out, &frame(65280, 20000)).unwrap();
        write_entry(&mut out, &frame(0, 28)).unwrap();
        let entries = read_index(&out[..]).unwrap();
        assert_eq!(entries, vec![frame(65280, 20000), frame(0, 28)]);

        out.pop();
        assert!(matches!(read_index(&out[..]), Err(BgzfError::Truncated(_))));
    }

    #[test]
    fn test_block_index_locate() {
        let entries = [frame(100, 40), frame(0, 28), frame(50, 30), frame(0, 28)];
        let index = BlockIndex::from_entries(&entries);

        assert_eq!(index.len(), 4);
        assert_eq!(index.compressed_size(), 126);
        assert_eq!(index.uncompressed_size(), 150);

        assert_eq!(index.locate(0), Some(VirtualOffset::new(0, 0)));
        assert_eq!(index.locate(99), Some(VirtualOffset::new(0, 99)));
        // The empty block at offset 40 is skipped.
        assert_eq!(index.locate(100), Some(VirtualOffset::new(68, 0)));
        assert_eq!(index.locate(149), Some(VirtualOffset::new(68, 49)));
        assert_eq!(index.locate(150), None);
    }

    #[test]
    fn test_locate_rejects_oversized_block() {
        let index = BlockIndex::from_entries(&[frame(70_000, 100)]);
        assert_eq!(index.locate(65_535), Some(VirtualOffset::new(0, 65_535)));
        assert_eq!(index.locate(65_536), None);
        assert_eq!(index.locate(69_999), None);
    }

    #[test]
    fn test_virtual_offset_parts() {
        let offset = VirtualOffset::new(123_456, 789);
        assert_eq!(offset.compressed_offset(), 123_456);
        assert_eq!(offset.within_block(), 789);
        assert_eq!(u64::from(offset), (123_456 << 16) | 789);
    }
}
