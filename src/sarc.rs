//! SARC: a named-entry stream archive with two wire versions, plus its TOC
//! overlay format that patches a prior SARC's entry offsets without
//! touching the original data region.

use crate::cursor::{Reader, Writer};
use crate::error::{Error, Result};
use crate::hash::{align_up, hash_name};

pub const SARC_MAGIC: u32 = 0x4352_4153;
pub const HEADER_SIZE: usize = 0x10;

pub const OFFSET_PATCHED: u32 = 0;
pub const OFFSET_DELETED: u32 = 0xFFFF_FFFF;

/// One named entry, independent of which wire version it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

impl Entry {
    pub fn is_patched(&self) -> bool {
        self.offset == OFFSET_PATCHED
    }

    pub fn is_deleted(&self) -> bool {
        self.offset == OFFSET_DELETED
    }
}

fn read_header(r: &mut Reader<'_>) -> Result<(u32, u32)> {
    let magic_len = r.read_u32()?;
    if magic_len != 4 {
        return Err(Error::SarcInvalidMagic);
    }
    let magic = r.read_u32()?;
    if magic != SARC_MAGIC {
        return Err(Error::SarcInvalidMagic);
    }
    let version = r.read_u32()?;
    let directory_size = r.read_u32()?;
    Ok((version, directory_size))
}

fn write_header(w: &mut Writer, version: u32, directory_size: u32) {
    w.write_u32(4);
    w.write_u32(SARC_MAGIC);
    w.write_u32(version);
    w.write_u32(directory_size);
}

/// Parses either wire version, dispatching on the header's version field.
pub fn parse(buffer: &[u8]) -> Result<Vec<Entry>> {
    if buffer.is_empty() {
        return Err(Error::InvalidArgument);
    }
    let mut r = Reader::new(buffer);
    let (version, directory_size) = read_header(&mut r)?;
    match version {
        2 => parse_v2_body(&mut r, directory_size),
        3 => parse_v3_body(&mut r, directory_size),
        _ => Err(Error::SarcUnknownVersion),
    }
}

fn parse_v2_body(r: &mut Reader<'_>, directory_size: u32) -> Result<Vec<Entry>> {
    let dir_start = r.tell();
    let mut entries = Vec::new();
    loop {
        let consumed = r.tell() - dir_start;
        if directory_size as usize <= consumed || (directory_size as usize - consumed) <= 15 {
            break;
        }
        let name_len = r.read_u32()? as usize;
        let padded = align_up(name_len as u64, 4) as usize;
        let name_bytes = r.read_bytes(padded)?;
        let name = String::from_utf8_lossy(&name_bytes[..name_len]).into_owned();
        let offset = r.read_u32()?;
        let size = r.read_u32()?;
        entries.push(Entry { name, offset, size });
    }
    Ok(entries)
}

fn parse_v3_body(r: &mut Reader<'_>, directory_size: u32) -> Result<Vec<Entry>> {
    let strings_len = r.read_u32()? as usize;
    let strings = r.read_bytes(strings_len)?;

    // The strings blob is a dense run of NUL-terminated filenames; entries
    // resolve their name by hash against this map rather than by the
    // `nameOffset` field, which is present but unused on read.
    let mut by_hash = std::collections::HashMap::new();
    for chunk in strings.split(|&b| b == 0) {
        if chunk.is_empty() {
            continue;
        }
        let name = String::from_utf8_lossy(chunk).into_owned();
        by_hash.insert(hash_name(&name), name);
    }

    let mut entries = Vec::new();
    while r.tell() < directory_size as usize {
        let _name_offset = r.read_u32()?;
        let data_offset = r.read_u32()?;
        let uncompressed_size = r.read_u32()?;
        let name_hash = r.read_u32()?;
        let _extension_hash = r.read_u32()?;

        let name = by_hash.get(&name_hash).cloned().unwrap_or_default();
        entries.push(Entry {
            name,
            offset: data_offset,
            size: uncompressed_size,
        });
    }
    Ok(entries)
}

/// Copies `[offset, offset+size)` out of the SARC buffer; sentinel offsets
/// surface as `PatchedEntry`.
pub fn read_entry(buf: &[u8], entry: &Entry) -> Result<Vec<u8>> {
    if entry.is_patched() || entry.is_deleted() {
        return Err(Error::SarcPatchedEntry);
    }
    let start = entry.offset as usize;
    let end = start + entry.size as usize;
    buf.get(start..end)
        .map(|b| b.to_vec())
        .ok_or(Error::SarcPatchedEntry)
}

/// Resolves `filename` against a parsed entry list, then reads it.
pub fn read_entry_by_name(buf: &[u8], entries: &[Entry], filename: &str) -> Result<Vec<u8>> {
    let entry = entries
        .iter()
        .find(|e| e.name == filename)
        .ok_or(Error::SarcPatchedEntry)?;
    read_entry(buf, entry)
}

/// Appends or replaces a named file in a v2 SARC buffer: locate-or-create,
/// recompute the directory size, then rewrite the whole buffer preserving
/// every other entry's bytes.
pub fn write_v2(entries: &mut Vec<Entry>, original_buf: &[u8], name: &str, data: &[u8]) -> Vec<u8> {
    let existing = entries.iter().position(|e| e.name == name);
    match existing {
        Some(i) => entries[i].offset = 1,
        None => entries.push(Entry {
            name: name.to_string(),
            offset: 1,
            size: data.len() as u32,
        }),
    }
    if let Some(i) = existing {
        entries[i].size = data.len() as u32;
    }

    let directory_size = {
        let sum: u64 = entries
            .iter()
            .map(|e| 4 + align_up(e.name.len() as u64, 4) + 4 + 4)
            .sum();
        align_up(sum, 16) as u32
    };

    let mut payload_size: u64 = 0;
    for e in entries.iter() {
        payload_size += align_up(e.size as u64, 4);
    }

    let mut w = Writer::new();
    write_header(&mut w, 2, directory_size);
    let dir_pos = w.tell();
    for e in entries.iter() {
        w.write_u32(e.name.len() as u32);
        let padded = align_up(e.name.len() as u64, 4) as usize;
        let mut name_buf = vec![0u8; padded];
        name_buf[..e.name.len()].copy_from_slice(e.name.as_bytes());
        w.write_bytes(&name_buf);
        w.write_u32(e.offset);
        w.write_u32(e.size);
    }
    w.set_pos(dir_pos + directory_size as usize);

    let data_region_start = w.tell();
    let mut running_offset = data_region_start as u32;
    for e in entries.iter_mut() {
        if e.offset == OFFSET_PATCHED || e.offset == OFFSET_DELETED {
            continue;
        }
        let bytes: Vec<u8> = if e.name == name {
            data.to_vec()
        } else {
            let prev_start = e.offset as usize;
            let prev_end = prev_start + e.size as usize;
            original_buf
                .get(prev_start..prev_end)
                .map(|b| b.to_vec())
                .unwrap_or_default()
        };
        e.offset = running_offset;
        w.set_pos(running_offset as usize);
        w.write_bytes(&bytes);
        let padded = align_up(bytes.len() as u64, 4) as usize;
        running_offset += padded as u32;
    }

    // Re-emit the directory now that offsets are final.
    w.set_pos(dir_pos);
    for e in entries.iter() {
        w.write_u32(e.name.len() as u32);
        let padded = align_up(e.name.len() as u64, 4) as usize;
        let mut name_buf = vec![0u8; padded];
        name_buf[..e.name.len()].copy_from_slice(e.name.as_bytes());
        w.write_bytes(&name_buf);
        w.write_u32(e.offset);
        w.write_u32(e.size);
    }
    w.set_pos(running_offset as usize);

    w.into_inner()
}

/// A TOC overlay entry: `{name, offset, size}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

/// Parses a TOC buffer into a fresh list of overlay entries.
pub fn parse_toc(buffer: &[u8]) -> Result<Vec<TocEntry>> {
    if buffer.is_empty() {
        return Err(Error::InvalidArgument);
    }
    let mut r = Reader::new(buffer);
    let mut entries = Vec::new();
    while r.remaining() >= 4 {
        let name_len = r.read_u32()? as usize;
        if r.remaining() < name_len + 8 {
            break;
        }
        let name = String::from_utf8_lossy(r.read_bytes(name_len)?).into_owned();
        let offset = r.read_u32()?;
        let size = r.read_u32()?;
        entries.push(TocEntry { name, offset, size });
    }
    Ok(entries)
}

/// Merges a TOC overlay onto an existing SARC entry list by filename hash:
/// unknown entries are appended, known entries have offset/size
/// overwritten. Returns `(added, patched)` counts.
pub fn merge_toc(entries: &mut Vec<Entry>, toc: &[TocEntry]) -> (usize, usize) {
    let mut added = 0;
    let mut patched = 0;
    for overlay in toc {
        let overlay_hash = hash_name(&overlay.name);
        let existing = entries.iter_mut().find(|e| hash_name(&e.name) == overlay_hash);
        match existing {
            Some(e) => {
                if e.offset != overlay.offset || e.size != overlay.size {
                    e.offset = overlay.offset;
                    e.size = overlay.size;
                    patched += 1;
                }
            }
            None => {
                entries.push(Entry {
                    name: overlay.name.clone(),
                    offset: overlay.offset,
                    size: overlay.size,
                });
                added += 1;
            }
        }
    }
    (added, patched)
}

/// Emits each TOC entry as `{nameLen, name, offset, size}` with no
/// alignment padding.
pub fn write_toc(entries: &[TocEntry]) -> Vec<u8> {
    let mut w = Writer::new();
    for e in entries {
        w.write_u32(e.name.len() as u32);
        w.write_bytes(e.name.as_bytes());
        w.write_u32(e.offset);
        w.write_u32(e.size);
    }
    w.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_roundtrip_preserves_prior_entries() {
        let mut entries = Vec::new();
        let buf0 = write_v2(&mut entries, &[], "first.bin", b"one");
        let mut entries1 = parse(&buf0).unwrap();

        let buf1 = write_v2(&mut entries1, &buf0, "second.bin", b"two-two");
        let entries2 = parse(&buf1).unwrap();

        assert_eq!(entries2.last().unwrap().name, "second.bin");
        let first = entries2.iter().find(|e| e.name == "first.bin").unwrap();
        assert_eq!(read_entry(&buf1, first).unwrap(), b"one");
        let second = entries2.iter().find(|e| e.name == "second.bin").unwrap();
        assert_eq!(read_entry(&buf1, second).unwrap(), b"two-two");
    }

    #[test]
    fn v3_resolves_names_by_hash_not_name_offset() {
        let strings = b"a.bin\0b.bin\0";
        let header_and_strings_len = HEADER_SIZE + 4 + strings.len();
        let directory_size = (header_and_strings_len + 2 * 20) as u32;

        let mut w = Writer::new();
        write_header(&mut w, 3, directory_size);
        w.write_u32(strings.len() as u32);
        w.write_bytes(strings);
        // nameOffset left as a bogus value to prove it's ignored on read.
        w.write_u32(0xFFFF_FFFF);
        w.write_u32(100);
        w.write_u32(3);
        w.write_u32(hash_name("a.bin"));
        w.write_u32(0);
        w.write_u32(0xFFFF_FFFF);
        w.write_u32(200);
        w.write_u32(4);
        w.write_u32(hash_name("b.bin"));
        w.write_u32(0);

        let entries = parse(&w.into_inner()).unwrap();
        assert_eq!(entries.len(), 2);
        let a = entries.iter().find(|e| e.name == "a.bin").unwrap();
        assert_eq!((a.offset, a.size), (100, 3));
        let b = entries.iter().find(|e| e.name == "b.bin").unwrap();
        assert_eq!((b.offset, b.size), (200, 4));
    }

    #[test]
    fn empty_buffer_is_invalid_argument() {
        assert!(matches!(parse(&[]), Err(Error::InvalidArgument)));
        assert!(matches!(parse_toc(&[]), Err(Error::InvalidArgument)));
    }

    #[test]
    fn bad_magic_is_invalid_magic() {
        let bytes = vec![0u8; HEADER_SIZE];
        assert!(matches!(parse(&bytes), Err(Error::SarcInvalidMagic)));
    }

    #[test]
    fn patched_and_deleted_sentinels_fail_to_read() {
        let patched = Entry {
            name: "p".into(),
            offset: OFFSET_PATCHED,
            size: 4,
        };
        let deleted = Entry {
            name: "d".into(),
            offset: OFFSET_DELETED,
            size: 4,
        };
        assert!(matches!(
            read_entry(&[0; 16], &patched),
            Err(Error::SarcPatchedEntry)
        ));
        assert!(matches!(
            read_entry(&[0; 16], &deleted),
            Err(Error::SarcPatchedEntry)
        ));
    }

    #[test]
    fn toc_merge_appends_and_patches() {
        let mut entries = vec![Entry {
            name: "known.bin".into(),
            offset: 10,
            size: 4,
        }];
        let toc = vec![
            TocEntry {
                name: "known.bin".into(),
                offset: 99,
                size: 8,
            },
            TocEntry {
                name: "new.bin".into(),
                offset: 5,
                size: 2,
            },
        ];
        let (added, patched) = merge_toc(&mut entries, &toc);
        assert_eq!(added, 1);
        assert_eq!(patched, 1);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].offset, 99);
    }
}
