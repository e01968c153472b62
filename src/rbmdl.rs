//! RBMDL: render-block model file. Per-block-type decoding is out of
//! scope — the reference's own block walker is incomplete; this module
//! only exposes the checksum scanner the source falls back to, leaving
//! per-type decoding to callers.

use crate::cursor::Reader;
use crate::error::{Error, Result};

pub const END_OF_BLOCK_CHECKSUM: u32 = 0x89AB_CDEF;

/// Scans `buffer` for occurrences of the end-of-block checksum, yielding
/// `(type_hash, bytes_between_checksums)` pairs. `type_hash` is the `u32`
/// immediately preceding each checksum; the bytes are everything since the
/// previous checksum (or the start of the buffer).
///
/// Checksums are matched on 4-byte-aligned boundaries starting from the
/// buffer's own start, consistent with the rest of this crate's binary
/// formats; a block whose size isn't a multiple of 4 will shift later
/// checksums out of alignment and they won't be found.
pub fn scan_blocks(buffer: &[u8]) -> Result<Vec<(u32, Vec<u8>)>> {
    if buffer.is_empty() {
        return Err(Error::InvalidArgument);
    }

    let mut blocks = Vec::new();
    let mut block_start = 0usize;
    let mut r = Reader::new(buffer);

    while r.remaining() >= 4 {
        let mark = r.tell();
        let word = r.read_u32()?;
        if word == END_OF_BLOCK_CHECKSUM {
            let type_hash_offset = mark.checked_sub(4);
            let type_hash = type_hash_offset
                .and_then(|o| buffer.get(o..o + 4))
                .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
                .unwrap_or(0);
            let bytes_end = type_hash_offset.unwrap_or(mark);
            blocks.push((type_hash, buffer[block_start..bytes_end].to_vec()));
            block_start = mark + 4;
        }
    }

    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_two_blocks() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"abcd"); // payload for block 1
        buf.extend_from_slice(&0x1111_1111u32.to_le_bytes()); // type hash
        buf.extend_from_slice(&END_OF_BLOCK_CHECKSUM.to_le_bytes());
        buf.extend_from_slice(b"wxyz"); // payload for block 2
        buf.extend_from_slice(&0x2222_2222u32.to_le_bytes());
        buf.extend_from_slice(&END_OF_BLOCK_CHECKSUM.to_le_bytes());

        let blocks = scan_blocks(&buf).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].0, 0x1111_1111);
        assert_eq!(blocks[0].1, b"abcd");
        assert_eq!(blocks[1].0, 0x2222_2222);
        assert_eq!(blocks[1].1, b"wxyz");
    }

    #[test]
    fn empty_buffer_is_invalid_argument() {
        assert!(matches!(scan_blocks(&[]), Err(Error::InvalidArgument)));
    }

    #[test]
    fn no_checksum_yields_no_blocks() {
        let blocks = scan_blocks(b"no checksums here").unwrap();
        assert!(blocks.is_empty());
    }
}
