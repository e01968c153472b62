//! AAF: a chunked raw-DEFLATE wrapper around an arbitrary payload
//! (`"AAF"`/`"EWAM"` framing). A thin collaborator kept only because the
//! AAF-then-SARC scenario needs it; no chunk-type dispatch beyond the
//! header fields below.

use crate::compress::{deflate_raw, inflate_raw};
use crate::cursor::{Reader, Writer};
use crate::error::{Error, Result};
use crate::hash::align_distance;

pub const AAF_MAGIC: u32 = 0x0046_4141;
pub const CHUNK_MAGIC: u32 = 0x4D41_5745;
pub const HEADER_SIZE: usize = 0x30;
pub const CHUNK_HEADER_SIZE: usize = 0x10;
pub const CHUNK_ALIGNMENT: u64 = 16;
const PAD_BYTE: u8 = 0x30;
/// Byte length of the identifying string the header's reserved middle
/// field carries; not validated on read.
const HEADER_TAG_SIZE: usize = 28;

struct ChunkHeader {
    compressed_size: u32,
    uncompressed_size: u32,
    /// Byte span of this chunk from its own start, including the header
    /// and any trailing padding — what the reader seeks by to reach the
    /// next chunk.
    chunk_size: u32,
}

fn read_header(r: &mut Reader<'_>) -> Result<(u32, u32)> {
    let magic = r.read_u32()?;
    if magic != AAF_MAGIC {
        return Err(Error::AafInvalidMagic);
    }
    let _version = r.read_u32()?;
    r.seek_rel(HEADER_TAG_SIZE as i64)?;
    let total_uncompressed_size = r.read_u32()?;
    let _required_unpack_buffer_size = r.read_u32()?;
    let num_chunks = r.read_u32()?;
    Ok((total_uncompressed_size, num_chunks))
}

fn read_chunk_header(r: &mut Reader<'_>) -> Result<ChunkHeader> {
    let compressed_size = r.read_u32()?;
    let uncompressed_size = r.read_u32()?;
    let chunk_size = r.read_u32()?;
    let magic = r.read_u32()?;
    if magic != CHUNK_MAGIC {
        return Err(Error::AafInvalidChunkMagic);
    }
    Ok(ChunkHeader {
        compressed_size,
        uncompressed_size,
        chunk_size,
    })
}

/// Decompresses an AAF buffer, walking however many chunks the header's
/// `num_chunks` field describes and seeking by each chunk's own
/// `chunk_size` to reach the next one.
pub fn decompress(buffer: &[u8]) -> Result<Vec<u8>> {
    if buffer.is_empty() {
        return Err(Error::InvalidArgument);
    }
    let mut r = Reader::new(buffer);
    let (total_uncompressed_size, num_chunks) = read_header(&mut r)?;

    let mut out = Vec::with_capacity(total_uncompressed_size as usize);
    for _ in 0..num_chunks {
        let chunk_start = r.tell();
        let chunk = read_chunk_header(&mut r)?;
        let compressed = r.read_bytes(chunk.compressed_size as usize)?;
        let decoded = inflate_raw(compressed, chunk.uncompressed_size as usize)
            .map_err(|_| Error::AafDecompressChunkFailed)?;
        if decoded.len() != chunk.uncompressed_size as usize {
            return Err(Error::AafDecompressChunkFailed);
        }
        out.extend_from_slice(&decoded);
        r.seek_abs(chunk_start + chunk.chunk_size as usize)?;
    }

    if out.len() != total_uncompressed_size as usize {
        return Err(Error::AafDecompressChunkFailed);
    }
    Ok(out)
}

/// Compresses `buffer` into a single-chunk AAF stream.
///
/// The original framing supports splitting large inputs across multiple
/// chunks; this collaborator only ever needs to round-trip through
/// `decompress`, so the writer always emits exactly one chunk (the reader
/// still walks an arbitrary chunk count, so this stays compatible with AAF
/// buffers produced elsewhere).
pub fn compress(buffer: &[u8]) -> Result<Vec<u8>> {
    let compressed = deflate_raw(buffer).map_err(|_| Error::AafCompressChunkFailed)?;

    let mut w = Writer::new();
    w.write_u32(AAF_MAGIC);
    w.write_u32(1); // version
    w.write_repeated(0, HEADER_TAG_SIZE);
    w.write_u32(buffer.len() as u32); // total_uncompressed_size
    w.write_u32(buffer.len() as u32); // required_unpack_buffer_size (single chunk)
    w.write_u32(1); // num_chunks

    let chunk_start = w.tell();
    let padding = align_distance((CHUNK_HEADER_SIZE + compressed.len()) as u64, CHUNK_ALIGNMENT) as u32;
    let chunk_size = CHUNK_HEADER_SIZE as u32 + compressed.len() as u32 + padding;

    w.write_u32(compressed.len() as u32);
    w.write_u32(buffer.len() as u32);
    w.write_u32(chunk_size);
    w.write_u32(CHUNK_MAGIC);
    w.write_bytes(&compressed);
    w.write_repeated(PAD_BYTE, padding as usize);

    debug_assert_eq!(w.tell() - chunk_start, chunk_size as usize);
    Ok(w.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_single_chunk() {
        let data = b"grapplinghookwire payload bytes".repeat(4);
        let compressed = compress(&data).unwrap();
        let decoded = decompress(&compressed).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn empty_buffer_is_invalid_argument() {
        assert!(matches!(decompress(&[]), Err(Error::InvalidArgument)));
    }

    #[test]
    fn bad_magic_is_invalid_magic() {
        let bytes = vec![0u8; HEADER_SIZE];
        assert!(matches!(decompress(&bytes), Err(Error::AafInvalidMagic)));
    }
}
