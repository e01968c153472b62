//! Legacy TAB/ARC variant: a fixed-choice mode with a 12-byte header, no
//! block table, and always-uncompressed entries.
//!
//! Grounded in the source's `legacy::ArchiveTable` namespace: `Parse` reads
//! entries until the stream fails rather than bounding by a size field, so
//! this reader does the same (stop at the first short/partial record).

use crate::cursor::{Reader, Writer};
use crate::error::{Error, Result};
use crate::hash::hash_name;

pub const HEADER_SIZE: usize = 0xC;
pub const ENTRY_SIZE: usize = 0xC;

#[derive(Debug, Clone, Copy)]
pub struct TabEntry {
    pub name_hash: u32,
    pub offset: u32,
    pub size: u32,
}

fn read_header(r: &mut Reader<'_>) -> Result<()> {
    let magic = r.read_u32()?;
    if magic != super::TAB_MAGIC {
        return Err(Error::TabInvalidMagic);
    }
    let _version = r.read_u16()?;
    let _endian = r.read_u16()?;
    let _alignment = r.read_u32()?;
    Ok(())
}

/// Parses entries until the input is exhausted or too short for another
/// whole record; a short trailing record simply ends the scan rather than
/// erroring.
pub fn parse(buffer: &[u8]) -> Result<Vec<TabEntry>> {
    if buffer.is_empty() {
        return Err(Error::InvalidArgument);
    }

    let mut r = Reader::new(buffer);
    read_header(&mut r)?;

    let mut entries = Vec::new();
    while r.remaining() >= ENTRY_SIZE {
        let name_hash = r.read_u32()?;
        let offset = r.read_u32()?;
        let size = r.read_u32()?;
        entries.push(TabEntry {
            name_hash,
            offset,
            size,
        });
    }
    Ok(entries)
}

pub fn read_entry(buffer: &[u8], name_hash: u32) -> Result<TabEntry> {
    let entries = parse(buffer)?;
    entries
        .into_iter()
        .find(|e| e.name_hash == name_hash)
        .ok_or(Error::TabUnknownEntry)
}

pub fn read_entry_buffer(archive_buffer: &[u8], entry: &TabEntry) -> Result<Vec<u8>> {
    if archive_buffer.is_empty() {
        return Err(Error::InvalidArgument);
    }
    let start = entry.offset as usize;
    let end = start + entry.size as usize;
    archive_buffer
        .get(start..end)
        .map(|b| b.to_vec())
        .ok_or(Error::TabDecompressBlockFailed)
}

/// Appends a new uncompressed entry to the legacy TAB/ARC pair.
pub fn write_entry(
    tab: &mut Vec<u8>,
    arc: &mut Vec<u8>,
    filename: &str,
    payload: &[u8],
) -> Result<()> {
    if filename.is_empty() || payload.is_empty() {
        return Err(Error::InvalidArgument);
    }

    if tab.is_empty() {
        let mut w = Writer::new();
        w.write_u32(super::TAB_MAGIC);
        w.write_u16(2); // version
        w.write_u16(1); // endian
        w.write_u32(0x1000); // alignment
        tab.extend_from_slice(w.as_slice());
    }

    let entry = TabEntry {
        name_hash: hash_name(filename),
        offset: arc.len() as u32,
        size: payload.len() as u32,
    };

    let mut w = Writer::new();
    w.write_u32(entry.name_hash);
    w.write_u32(entry.offset);
    w.write_u32(entry.size);
    tab.extend_from_slice(w.as_slice());

    arc.extend_from_slice(payload);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_entry() {
        let mut tab = Vec::new();
        let mut arc = Vec::new();
        write_entry(&mut tab, &mut arc, "game67.dat", b"legacy payload").unwrap();

        let entries = parse(&tab).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name_hash, hash_name("game67.dat"));

        let found = read_entry(&tab, hash_name("game67.dat")).unwrap();
        let out = read_entry_buffer(&arc, &found).unwrap();
        assert_eq!(out, b"legacy payload");
    }

    #[test]
    fn empty_buffer_is_invalid_argument() {
        assert!(matches!(parse(&[]), Err(Error::InvalidArgument)));
    }
}
