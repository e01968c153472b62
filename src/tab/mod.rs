//! TAB/ARC: an index file (`TAB`) of content-addressed entries describing
//! spans of a flat data file (`ARC`), with optional per-entry block
//! compression.

pub mod legacy;

use crate::compress::{self, OodleCodec};
use crate::cursor::{Reader, Writer};
use crate::error::{Error, Result};
use crate::hash::hash_name;

pub const TAB_MAGIC: u32 = 0x0042_4154;
pub const HEADER_SIZE: usize = 0x18;
pub const ENTRY_SIZE: usize = 0x14;
pub const BLOCK_SIZE: usize = 0x8;

/// Compression library tag stored per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Library {
    None = 0,
    Zlib = 1,
    Oodle = 4,
}

impl Library {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Library::None),
            1 => Ok(Library::Zlib),
            4 => Ok(Library::Oodle),
            _ => Err(Error::InvalidArgument),
        }
    }
}

/// Per-entry decode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags(pub u8);

impl Flags {
    pub const DECODE_NONE: Flags = Flags(0);
    pub const DECODE_BUFFER: Flags = Flags(1 << 0);

    pub fn contains(&self, other: Flags) -> bool {
        other.0 == 0 || (self.0 & other.0) == other.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub version: u16,
    pub endian: u16,
    pub alignment: u32,
    pub reserved: [u32; 3],
}

impl Default for Header {
    fn default() -> Self {
        Header {
            version: 2,
            endian: 1,
            alignment: 0x1000,
            reserved: [0; 3],
        }
    }
}

/// One entry in the TAB index.
#[derive(Debug, Clone, Copy)]
pub struct TabEntry {
    pub name_hash: u32,
    pub offset: u32,
    pub size: u32,
    pub uncompressed_size: u32,
    pub first_block_index: u16,
    pub library: Library,
    pub flags: Flags,
}

/// A compressed-block record: `(compressed size, uncompressed size)`.
#[derive(Debug, Clone, Copy)]
pub struct Block {
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

fn read_header(r: &mut Reader<'_>) -> Result<Header> {
    let magic = r.read_u32()?;
    if magic != TAB_MAGIC {
        return Err(Error::TabInvalidMagic);
    }
    let version = r.read_u16()?;
    let endian = r.read_u16()?;
    let alignment = r.read_u32()?;
    let reserved = [r.read_u32()?, r.read_u32()?, r.read_u32()?];
    Ok(Header {
        version,
        endian,
        alignment,
        reserved,
    })
}

fn write_header(w: &mut Writer, header: &Header) {
    w.write_u32(TAB_MAGIC);
    w.write_u16(header.version);
    w.write_u16(header.endian);
    w.write_u32(header.alignment);
    for r in header.reserved {
        w.write_u32(r);
    }
}

fn read_entry(r: &mut Reader<'_>) -> Result<TabEntry> {
    let name_hash = r.read_u32()?;
    let offset = r.read_u32()?;
    let size = r.read_u32()?;
    let uncompressed_size = r.read_u32()?;
    let first_block_index = r.read_u16()?;
    let library = Library::from_u8(r.read_u8()?)?;
    let flags = Flags(r.read_u8()?);
    Ok(TabEntry {
        name_hash,
        offset,
        size,
        uncompressed_size,
        first_block_index,
        library,
        flags,
    })
}

fn encode_entry(w: &mut Writer, entry: &TabEntry) {
    w.write_u32(entry.name_hash);
    w.write_u32(entry.offset);
    w.write_u32(entry.size);
    w.write_u32(entry.uncompressed_size);
    w.write_u16(entry.first_block_index);
    w.write_u8(entry.library as u8);
    w.write_u8(entry.flags.0);
}

fn read_block(r: &mut Reader<'_>) -> Result<Block> {
    Ok(Block {
        compressed_size: r.read_u32()?,
        uncompressed_size: r.read_u32()?,
    })
}

/// Parses a TAB index buffer into its block table and entry table.
///
/// Trailing bytes shorter than one entry record are ignored rather than
/// treated as an error.
pub fn parse(index_bytes: &[u8]) -> Result<(Vec<TabEntry>, Vec<Block>)> {
    if index_bytes.is_empty() {
        return Err(Error::InvalidArgument);
    }
    let mut r = Reader::new(index_bytes);
    read_header(&mut r)?;

    let block_count = r.read_u32()? as usize;
    let mut blocks = Vec::with_capacity(block_count);
    for _ in 0..block_count {
        blocks.push(read_block(&mut r)?);
    }

    let mut entries = Vec::new();
    while r.remaining() >= ENTRY_SIZE {
        entries.push(read_entry(&mut r)?);
    }

    Ok((entries, blocks))
}

/// Finds the first entry whose name hash matches.
pub fn find(entries: &[TabEntry], name_hash: u32) -> Result<&TabEntry> {
    entries
        .iter()
        .find(|e| e.name_hash == name_hash)
        .ok_or(Error::TabUnknownEntry)
}

/// The span of data-file bytes `read_entry` needs loaded for a
/// block-compressed entry: `entry.size` plus the sum of the compressed
/// sizes of every block in its run (the other formulation — adding
/// `entry.size` itself to the block-size sum — double-counts it).
pub fn required_read_size(entry: &TabEntry, blocks: &[Block]) -> Result<usize> {
    if entry.first_block_index == 0 {
        return Ok(entry.size as usize);
    }
    let mut remaining = entry.size as i64;
    let mut total = 0usize;
    let mut idx = entry.first_block_index as usize;
    while remaining > 0 {
        let block = blocks.get(idx).ok_or(Error::TabDecompressBlockFailed)?;
        total += block.compressed_size as usize;
        remaining -= block.compressed_size as i64;
        idx += 1;
    }
    Ok(total)
}

/// Reads and, if necessary, decompresses one entry's payload out of the
/// data-file buffer.
pub fn read_entry_buffer(
    data_bytes: &[u8],
    entry: &TabEntry,
    blocks: &[Block],
    codec: Option<&OodleCodec>,
) -> Result<Vec<u8>> {
    if data_bytes.is_empty() {
        return Err(Error::InvalidArgument);
    }

    match entry.library {
        Library::None => {
            let start = entry.offset as usize;
            let end = start + entry.size as usize;
            data_bytes
                .get(start..end)
                .map(|b| b.to_vec())
                .ok_or(Error::TabDecompressBlockFailed)
        }
        Library::Zlib => Err(Error::NotImplemented),
        Library::Oodle => {
            if entry.first_block_index == 0 {
                let start = entry.offset as usize;
                let end = start + entry.size as usize;
                let src = data_bytes
                    .get(start..end)
                    .ok_or(Error::TabDecompressBlockFailed)?;
                compress::lz_decompress(codec, src, entry.uncompressed_size as usize)
                    .map_err(|_| Error::TabDecompressBlockFailed)
            } else {
                if blocks.is_empty() {
                    return Err(Error::TabRequiresCompressionBlocks);
                }
                let mut out = Vec::with_capacity(entry.uncompressed_size as usize);
                let mut remaining = entry.size as i64;
                let mut idx = entry.first_block_index as usize;
                let mut src_pos = entry.offset as usize;
                while remaining > 0 {
                    let block = blocks.get(idx).ok_or(Error::TabDecompressBlockFailed)?;
                    let end = src_pos + block.compressed_size as usize;
                    let src = data_bytes
                        .get(src_pos..end)
                        .ok_or(Error::TabDecompressBlockFailed)?;
                    let decoded =
                        compress::lz_decompress(codec, src, block.uncompressed_size as usize)
                            .map_err(|_| Error::TabDecompressBlockFailed)?;
                    out.extend_from_slice(&decoded);
                    src_pos = end;
                    remaining -= block.compressed_size as i64;
                    idx += 1;
                }
                if out.len() != entry.uncompressed_size as usize {
                    return Err(Error::TabDecompressBlockFailed);
                }
                Ok(out)
            }
        }
    }
}

/// Appends a new entry to the TAB/ARC pair. The TAB gets a header + empty
/// block table on first write. Block-compressed (multi-block) writes are
/// not supported — only uncompressed and single-block Oodle writes.
pub fn write_entry(
    tab: &mut Vec<u8>,
    arc: &mut Vec<u8>,
    filename: &str,
    payload: &[u8],
    library: Library,
    codec: Option<&OodleCodec>,
) -> Result<()> {
    if filename.is_empty() || payload.is_empty() {
        return Err(Error::InvalidArgument);
    }

    if tab.is_empty() {
        let mut w = Writer::new();
        write_header(&mut w, &Header::default());
        w.write_u32(0); // empty block table
        tab.extend_from_slice(w.as_slice());
    }

    let offset = arc.len() as u32;
    let (stored, uncompressed_size, flags) = match library {
        Library::None => {
            arc.extend_from_slice(payload);
            (payload.len() as u32, payload.len() as u32, Flags::DECODE_NONE)
        }
        Library::Oodle => {
            let compressed = compress::lz_compress(codec, payload)
                .map_err(|_| Error::TabCompressBlockFailed)?;
            arc.extend_from_slice(&compressed);
            (
                compressed.len() as u32,
                payload.len() as u32,
                Flags::DECODE_BUFFER,
            )
        }
        Library::Zlib => return Err(Error::NotImplemented),
    };

    let entry = TabEntry {
        name_hash: hash_name(filename),
        offset,
        size: stored,
        uncompressed_size,
        first_block_index: 0,
        library,
        flags,
    };

    let mut w = Writer::new();
    encode_entry(&mut w, &entry);
    tab.extend_from_slice(w.as_slice());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_uncompressed_entry() {
        let mut tab = Vec::new();
        let mut arc = Vec::new();
        let payload = b"hello, archive!".to_vec();

        write_entry(&mut tab, &mut arc, "hello.bin", &payload, Library::None, None).unwrap();

        let (entries, blocks) = parse(&tab).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name_hash, hash_name("hello.bin"));

        let out = read_entry_buffer(&arc, &entries[0], &blocks, None).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn empty_buffer_is_invalid_argument() {
        assert!(matches!(parse(&[]), Err(Error::InvalidArgument)));
    }

    #[test]
    fn bad_magic_is_invalid_magic() {
        let bytes = vec![0u8; HEADER_SIZE + 4];
        assert!(matches!(parse(&bytes), Err(Error::TabInvalidMagic)));
    }

    #[test]
    fn unknown_entry_lookup_fails() {
        let mut tab = Vec::new();
        let mut arc = Vec::new();
        write_entry(&mut tab, &mut arc, "a.bin", b"x", Library::None, None).unwrap();
        let (entries, _) = parse(&tab).unwrap();
        assert!(matches!(
            find(&entries, 0xdead_beef),
            Err(Error::TabUnknownEntry)
        ));
    }

    #[test]
    fn oodle_multi_block_entry_without_blocks_requires_compression_blocks() {
        let entry = TabEntry {
            name_hash: hash_name("a.bin"),
            offset: 0,
            size: 16,
            uncompressed_size: 32,
            first_block_index: 1,
            library: Library::Oodle,
            flags: Flags::DECODE_BUFFER,
        };
        assert!(matches!(
            read_entry_buffer(&[0u8; 16], &entry, &[], None),
            Err(Error::TabRequiresCompressionBlocks)
        ));
    }
}
