//! Resource bundle: a flat sequence of `{path_hash, extension_hash,
//! file_size}` records each immediately followed by `file_size` payload
//! bytes, repeated until EOF. Grounded in
//! `original_source/include/archives/resource_bundle.h`.

use crate::cursor::{Reader, Writer};
use crate::error::{Error, Result};
use crate::hash::hash_name;

pub const ENTRY_HEADER_SIZE: usize = 0xC;

#[derive(Debug, Clone, Copy)]
pub struct EntryHeader {
    pub path_hash: u32,
    pub extension_hash: u32,
    pub file_size: u32,
}

/// Scans the bundle for the entry whose `path_hash` matches, returning its
/// payload bytes.
pub fn read_entry(buffer: &[u8], path_hash: u32) -> Result<Vec<u8>> {
    if buffer.is_empty() {
        return Err(Error::InvalidArgument);
    }
    let mut r = Reader::new(buffer);
    while r.remaining() >= ENTRY_HEADER_SIZE {
        let header = EntryHeader {
            path_hash: r.read_u32()?,
            extension_hash: r.read_u32()?,
            file_size: r.read_u32()?,
        };
        let payload = r.read_bytes(header.file_size as usize)?;
        if header.path_hash == path_hash {
            return Ok(payload.to_vec());
        }
    }
    Err(Error::InvalidArgument)
}

/// Appends one `{path_hash, extension_hash, file_size}` record plus
/// `payload` to `buffer`. `filename` is hashed whole (as in every other
/// name-hashed entry in this crate); `extension_hash` hashes the
/// extension including its leading dot (matching
/// `std::filesystem::path::extension()`'s own convention), or the empty
/// string if `filename` has none.
pub fn write_entry(buffer: &mut Vec<u8>, filename: &str, payload: &[u8]) -> Result<()> {
    if filename.is_empty() {
        return Err(Error::InvalidArgument);
    }
    let extension = match filename.rfind('.') {
        Some(i) => &filename[i..],
        None => "",
    };

    let mut w = Writer::new();
    w.write_u32(hash_name(filename));
    w.write_u32(hash_name(extension));
    w.write_u32(payload.len() as u32);
    w.write_bytes(payload);
    buffer.extend_from_slice(w.as_slice());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_two_entries_and_read_by_hash() {
        let mut buf = Vec::new();
        write_entry(&mut buf, "hello.bin", b"H").unwrap();
        write_entry(&mut buf, "world.bin", b"W").unwrap();

        let out = read_entry(&buf, hash_name("world.bin")).unwrap();
        assert_eq!(out, b"W");
    }

    #[test]
    fn unknown_hash_is_invalid_argument() {
        let mut buf = Vec::new();
        write_entry(&mut buf, "hello.bin", b"H").unwrap();
        assert!(matches!(
            read_entry(&buf, 0xdead_beef),
            Err(Error::InvalidArgument)
        ));
    }

    #[test]
    fn empty_buffer_is_invalid_argument() {
        assert!(matches!(read_entry(&[], 0), Err(Error::InvalidArgument)));
    }
}
