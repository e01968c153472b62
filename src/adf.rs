//! ADF: a reflection-driven typed-record format. A [`Adf`] registry
//! accumulates type definitions (merged across however many files call
//! [`Adf::add_types`]) and resolves named instances against them.
//!
//! Instance payloads are never patched in place with raw 64-bit pointers.
//! Instead [`Adf::read_instance`] returns the decoded payload bytes plus a
//! [`PatchEntry`] index of `(field_site_offset, target_offset)` pairs;
//! [`Instance`] exposes a typed view over that pair instead of aliased
//! interior pointers.

use std::collections::HashMap;

use crate::cursor::Reader;
use crate::error::{Error, Result};
use crate::hash::{align_distance, hashlittle};

pub const ADF_MAGIC: u32 = 0x4144_4620;
pub const HEADER_SIZE: usize = 0x48;
pub const INSTANCE_SIZE: usize = 0x18;
pub const MEMBER_SIZE: usize = 0x20;
pub const ENUM_SIZE: usize = 0xC;
pub const TYPE_HEADER_SIZE: usize = 0x28;

/// Fixed type hash for the built-in `Deferred` type.
pub const DEFERRED_TYPE_HASH: u32 = 0xDEFE_88ED;

const RELATIVE_OFFSETS_EXISTS: u32 = 1 << 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Scalar,
    Struct,
    Pointer,
    Array,
    InlineArray,
    String,
    Recursive,
    Bitfield,
    Enum,
    StringHash,
    Deferred,
    /// Any value outside the eleven documented kinds; preserved rather
    /// than rejected so an unrecognized-but-well-formed type doesn't
    /// abort loading the rest of the registry.
    Other(u32),
}

impl TypeKind {
    fn from_u32(v: u32) -> Self {
        match v {
            0 => TypeKind::Scalar,
            1 => TypeKind::Struct,
            2 => TypeKind::Pointer,
            3 => TypeKind::Array,
            4 => TypeKind::InlineArray,
            5 => TypeKind::String,
            6 => TypeKind::Recursive,
            7 => TypeKind::Bitfield,
            8 => TypeKind::Enum,
            9 => TypeKind::StringHash,
            10 => TypeKind::Deferred,
            other => TypeKind::Other(other),
        }
    }

    fn to_u32(self) -> u32 {
        match self {
            TypeKind::Scalar => 0,
            TypeKind::Struct => 1,
            TypeKind::Pointer => 2,
            TypeKind::Array => 3,
            TypeKind::InlineArray => 4,
            TypeKind::String => 5,
            TypeKind::Recursive => 6,
            TypeKind::Bitfield => 7,
            TypeKind::Enum => 8,
            TypeKind::StringHash => 9,
            TypeKind::Deferred => 10,
            TypeKind::Other(v) => v,
        }
    }

    fn needs_loading(self) -> bool {
        matches!(
            self,
            TypeKind::Struct
                | TypeKind::Pointer
                | TypeKind::Array
                | TypeKind::Deferred
                | TypeKind::String
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Signed,
    Unsigned,
    Float,
}

impl ScalarType {
    fn from_u16(v: u16) -> Self {
        match v {
            1 => ScalarType::Unsigned,
            2 => ScalarType::Float,
            _ => ScalarType::Signed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdfMember {
    /// Pool index (local at parse time, reindexed into the merged pool
    /// once registered).
    pub name: u64,
    pub type_hash: u32,
    pub align: u32,
    pub offset: u32,
    pub bit_offset: u8,
    pub flags: u32,
    pub default_value: u64,
}

#[derive(Debug, Clone)]
pub struct AdfEnumEntry {
    pub name: u64,
    pub value: i32,
}

#[derive(Debug, Clone)]
pub struct AdfType {
    pub kind: TypeKind,
    pub size: u32,
    pub align: u32,
    pub type_hash: u32,
    pub name: u64,
    pub flags: u16,
    pub scalar_type: ScalarType,
    pub subtype_hash: u32,
    pub array_size_or_bit_count: u32,
    pub member_count: u32,
    pub members: Vec<AdfMember>,
    pub enum_entries: Vec<AdfEnumEntry>,
}

#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub version: u32,
    pub instance_count: u32,
    pub first_instance_offset: u32,
    pub type_count: u32,
    pub first_type_offset: u32,
    pub string_hash_count: u32,
    pub first_string_hash_offset: u32,
    pub string_count: u32,
    pub first_string_data_offset: u32,
    pub file_size: u32,
    pub flags: u32,
    pub included_libraries: u32,
}

pub fn parse_header(buffer: &[u8]) -> Result<Header> {
    if buffer.len() < 24 {
        return Err(Error::AdfBufferTooSmall);
    }
    let mut r = Reader::new(buffer);
    let magic = r.read_u32()?;
    if magic != ADF_MAGIC {
        return Err(Error::AdfInvalidMagic);
    }
    let version = r.read_u32()?;
    let instance_count = r.read_u32()?;
    let first_instance_offset = r.read_u32()?;
    let type_count = r.read_u32()?;
    let first_type_offset = r.read_u32()?;
    let string_hash_count = r.read_u32()?;
    let first_string_hash_offset = r.read_u32()?;
    let string_count = r.read_u32()?;
    let first_string_data_offset = r.read_u32()?;
    let file_size = r.read_u32()?;
    let _unknown = r.read_u32()?;
    let flags = r.read_u32()?;
    let included_libraries = r.read_u32()?;
    Ok(Header {
        version,
        instance_count,
        first_instance_offset,
        type_count,
        first_type_offset,
        string_hash_count,
        first_string_hash_offset,
        string_count,
        first_string_data_offset,
        file_size,
        flags,
        included_libraries,
    })
}

fn file_string_at(buffer: &[u8], header: &Header, local_index: u64) -> Result<String> {
    let lengths_start = header.first_string_data_offset as usize;
    let lengths = buffer
        .get(lengths_start..lengths_start + header.string_count as usize)
        .ok_or(Error::AdfBufferTooSmall)?;
    let strings_start = lengths_start + header.string_count as usize;

    let mut offset = 0usize;
    for &len in lengths.iter().take(local_index as usize) {
        offset += len as usize + 1;
    }

    let mut r = Reader::new(buffer);
    r.seek_abs(strings_start + offset)?;
    Ok(String::from_utf8_lossy(r.read_cstring()?).into_owned())
}

fn read_type_record(r: &mut Reader<'_>) -> Result<AdfType> {
    let kind = TypeKind::from_u32(r.read_u32()?);
    let size = r.read_u32()?;
    let align = r.read_u32()?;
    let type_hash = r.read_u32()?;
    let name = r.read_u64()?;
    let flags = r.read_u16()?;
    let scalar_type = ScalarType::from_u16(r.read_u16()?);
    let subtype_hash = r.read_u32()?;
    let array_size_or_bit_count = r.read_u32()?;
    let member_count = r.read_u32()?;

    let mut members = Vec::new();
    let mut enum_entries = Vec::new();
    if kind == TypeKind::Enum {
        for _ in 0..member_count {
            enum_entries.push(AdfEnumEntry {
                name: r.read_u64()?,
                value: r.read_i32()?,
            });
        }
    } else {
        for _ in 0..member_count {
            let name = r.read_u64()?;
            let type_hash = r.read_u32()?;
            let malign = r.read_u32()?;
            let packed = r.read_u32()?;
            let mflags = r.read_u32()?;
            let default_value = r.read_u64()?;
            members.push(AdfMember {
                name,
                type_hash,
                align: malign,
                offset: packed & 0x00FF_FFFF,
                bit_offset: (packed >> 24) as u8,
                flags: mflags,
                default_value,
            });
        }
    }

    Ok(AdfType {
        kind,
        size,
        align,
        type_hash,
        name,
        flags,
        scalar_type,
        subtype_hash,
        array_size_or_bit_count,
        member_count,
        members,
        enum_entries,
    })
}

/// One resolved instance record's metadata.
#[derive(Debug, Clone)]
pub struct InstanceInfo {
    pub name_hash: u32,
    pub type_hash: u32,
    pub name: String,
    pub payload_offset: u32,
    pub payload_size: u32,
}

/// A `(field_site_offset, target_offset)` pair — the arena+index
/// replacement for an in-place absolute pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchEntry {
    pub field_site_offset: u32,
    pub target_offset: u32,
}

/// A decoded instance payload plus its resolved offset index. Never
/// stores raw pointers; [`Instance::resolve`] is the typed view over the
/// index.
#[derive(Debug, Clone)]
pub struct Instance {
    pub payload: Vec<u8>,
    pub patches: Vec<PatchEntry>,
}

impl Instance {
    /// Looks up the absolute target offset patched in for the pointer
    /// field at `field_site_offset`, if any.
    pub fn resolve(&self, field_site_offset: u32) -> Option<u32> {
        self.patches
            .iter()
            .find(|p| p.field_site_offset == field_site_offset)
            .map(|p| p.target_offset)
    }

    pub fn read_u32(&self, offset: u32) -> Option<u32> {
        self.payload
            .get(offset as usize..offset as usize + 4)
            .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_f32(&self, offset: u32) -> Option<f32> {
        self.read_u32(offset).map(f32::from_bits)
    }

    pub fn read_cstring(&self, offset: u32) -> Option<&[u8]> {
        let start = offset as usize;
        let end = self.payload[start..].iter().position(|&b| b == 0)? + start;
        Some(&self.payload[start..end])
    }
}

fn read_u32_at(bytes: &[u8], offset: i64) -> Option<u32> {
    if offset < 0 {
        return None;
    }
    let start = offset as usize;
    bytes
        .get(start..start + 4)
        .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
}

/// Tail-chain fix-up (flag set): walks a singly-linked chain of pointer-field
/// sites *inside the payload itself*. The walk's first link length is the one
/// `u32` stored immediately after the payload; every later read of a link's
/// length and its raw field value comes from the payload bytes at the site
/// the previous link's length pointed to, so the cursor re-enters the payload
/// on the very first step and never leaves it again. Each site stores its own
/// raw field value one `u32` before the next site's length, so a site's patch
/// target is read and recorded in the same step, not carried over from the
/// previous one.
fn build_patch_index_tail_chain(mem: &[u8], payload_size: usize) -> Vec<PatchEntry> {
    let mut patches = Vec::new();
    let mut current: i64 = 0;

    let mut size = match read_u32_at(mem, payload_size as i64) {
        Some(s) => s,
        None => return patches,
    };

    while size != 0 {
        current += size as i64;
        let next_size = match read_u32_at(mem, current) {
            Some(s) => s,
            None => break,
        };
        let mut v = match read_u32_at(mem, current - 4) {
            Some(v) => v,
            None => break,
        };
        if v == 1 {
            v = 0;
        }
        if current - 4 >= 0 {
            patches.push(PatchEntry {
                field_site_offset: (current - 4) as u32,
                target_offset: v,
            });
        }
        size = next_size;
    }

    patches
}

/// Recursive-walk fix-up (flag clear), implemented with an explicit stack
/// of `(type_hash, offset)` frames rather than recursion, building a patch
/// index instead of mutating the payload.
fn build_patch_index_recursive(adf: &Adf, root_type_hash: u32, payload: &[u8]) -> Vec<PatchEntry> {
    let mut patches = Vec::new();
    let mut stack: Vec<(u32, u32)> = vec![(root_type_hash, 0)];

    while let Some((type_hash, offset)) = stack.pop() {
        let ty = match adf.find_type(type_hash) {
            Some(t) => t,
            None => continue,
        };

        match ty.kind {
            TypeKind::Struct => {
                let mut member_offset = 0u32;
                for member in &ty.members {
                    let member_type = match adf.find_type(member.type_hash) {
                        Some(t) => t,
                        None => continue,
                    };
                    let payload_offset = offset + member_offset;
                    let pad = align_distance(payload_offset as u64, member_type.align.max(1) as u64) as u32;
                    if member_type.kind.needs_loading() {
                        stack.push((member.type_hash, payload_offset + pad));
                    }
                    member_offset += member_type.size + pad;
                }
            }
            TypeKind::Pointer | TypeKind::Deferred => {
                if let Some(real_offset) = read_u32_at(payload, offset as i64) {
                    if real_offset != 0 {
                        patches.push(PatchEntry {
                            field_site_offset: offset,
                            target_offset: real_offset,
                        });
                        let sub_hash = if ty.kind == TypeKind::Pointer {
                            ty.subtype_hash
                        } else {
                            read_u32_at(payload, offset as i64 + 8).unwrap_or(0)
                        };
                        if adf.find_type(sub_hash).is_some() {
                            stack.push((sub_hash, real_offset));
                        }
                    }
                }
            }
            TypeKind::Array => {
                if let Some(real_offset) = read_u32_at(payload, offset as i64) {
                    if real_offset != 0 {
                        patches.push(PatchEntry {
                            field_site_offset: offset,
                            target_offset: real_offset,
                        });
                        if let Some(subtype) = adf.find_type(ty.subtype_hash) {
                            if subtype.kind.needs_loading() {
                                if let Some(count) = read_u32_at(payload, offset as i64 + 8) {
                                    for i in 0..count {
                                        stack.push((ty.subtype_hash, real_offset + subtype.size * i));
                                    }
                                }
                            }
                        }
                    }
                }
            }
            TypeKind::String => {
                if let Some(real_offset) = read_u32_at(payload, offset as i64) {
                    if real_offset != 0 {
                        patches.push(PatchEntry {
                            field_site_offset: offset,
                            target_offset: real_offset,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    patches
}

/// A merged type registry plus string pools, accumulated across however
/// many ADF files call [`Adf::add_types`].
pub struct Adf {
    types: Vec<AdfType>,
    type_index: HashMap<u32, usize>,
    pub strings: Vec<String>,
    pub string_hashes: HashMap<u32, String>,
}

impl Default for Adf {
    fn default() -> Self {
        Self::new()
    }
}

impl Adf {
    pub fn new() -> Self {
        let mut adf = Adf {
            types: Vec::new(),
            type_index: HashMap::new(),
            strings: Vec::new(),
            string_hashes: HashMap::new(),
        };
        adf.add_builtin_types();
        adf
    }

    fn add_builtin_type(&mut self, kind: TypeKind, scalar_type: ScalarType, size: u32, name: &str, flags: u16) {
        let synthetic_name = format!("{}{}{}{}", name, kind.to_u32(), size, size);
        let mut type_hash = hashlittle(synthetic_name.as_bytes());
        let mut align = size;
        if kind == TypeKind::Deferred {
            type_hash = DEFERRED_TYPE_HASH;
            align = 8;
        }
        let name_index = self.get_or_insert_string(name) as u64;
        let idx = self.types.len();
        self.type_index.insert(type_hash, idx);
        self.types.push(AdfType {
            kind,
            size,
            align,
            type_hash,
            name: name_index,
            flags,
            scalar_type,
            subtype_hash: 0,
            array_size_or_bit_count: 0,
            member_count: 0,
            members: Vec::new(),
            enum_entries: Vec::new(),
        });
    }

    fn add_builtin_types(&mut self) {
        let scalars: [(&str, ScalarType, u32); 10] = [
            ("uint8", ScalarType::Unsigned, 1),
            ("int8", ScalarType::Signed, 1),
            ("uint16", ScalarType::Unsigned, 2),
            ("int16", ScalarType::Signed, 2),
            ("uint32", ScalarType::Unsigned, 4),
            ("int32", ScalarType::Signed, 4),
            ("uint64", ScalarType::Unsigned, 8),
            ("int64", ScalarType::Signed, 8),
            ("float", ScalarType::Float, 4),
            ("double", ScalarType::Float, 8),
        ];
        for (name, scalar_type, size) in scalars {
            self.add_builtin_type(TypeKind::Scalar, scalar_type, size, name, 3);
        }
        self.add_builtin_type(TypeKind::String, ScalarType::Signed, 8, "String", 0);
        self.add_builtin_type(TypeKind::Deferred, ScalarType::Signed, 16, "void", 0);
    }

    fn get_or_insert_string(&mut self, s: &str) -> usize {
        if let Some(idx) = self.strings.iter().position(|existing| existing == s) {
            return idx;
        }
        self.strings.push(s.to_string());
        self.strings.len() - 1
    }

    pub fn find_type(&self, type_hash: u32) -> Option<&AdfType> {
        self.type_index.get(&type_hash).map(|&i| &self.types[i])
    }

    pub fn types(&self) -> &[AdfType] {
        &self.types
    }

    pub fn hash_lookup(&self, hash: u32) -> &str {
        self.string_hashes.get(&hash).map(|s| s.as_str()).unwrap_or("")
    }

    /// Parses `buffer`'s string-hash table, string pool, and type table,
    /// merging types into this registry (first definition wins).
    pub fn add_types(&mut self, buffer: &[u8]) -> Result<()> {
        let header = parse_header(buffer)?;

        {
            let mut r = Reader::new(buffer);
            r.seek_abs(header.first_string_hash_offset as usize)?;
            for _ in 0..header.string_hash_count {
                let s = r.read_cstring()?.to_vec();
                let hash64 = r.read_u64()?;
                self.string_hashes
                    .insert(hash64 as u32, String::from_utf8_lossy(&s).into_owned());
            }
        }

        let mut r = Reader::new(buffer);
        r.seek_abs(header.first_type_offset as usize)?;
        for _ in 0..header.type_count {
            let mut ty = read_type_record(&mut r)?;
            if self.type_index.contains_key(&ty.type_hash) {
                continue;
            }

            let type_name = file_string_at(buffer, &header, ty.name)?;
            ty.name = self.get_or_insert_string(&type_name) as u64;

            if ty.kind == TypeKind::Enum {
                for entry in ty.enum_entries.iter_mut() {
                    let s = file_string_at(buffer, &header, entry.name)?;
                    entry.name = self.get_or_insert_string(&s) as u64;
                }
            } else {
                for member in ty.members.iter_mut() {
                    let s = file_string_at(buffer, &header, member.name)?;
                    member.name = self.get_or_insert_string(&s) as u64;
                }
            }

            let idx = self.types.len();
            self.type_index.insert(ty.type_hash, idx);
            self.types.push(ty);
        }

        Ok(())
    }

    fn read_instance_record(buffer: &[u8], header: &Header, index: u32) -> Result<(u32, u32, u32, u32, u64)> {
        let mut r = Reader::new(buffer);
        r.seek_abs(header.first_instance_offset as usize + index as usize * INSTANCE_SIZE)?;
        let name_hash = r.read_u32()?;
        let type_hash = r.read_u32()?;
        let payload_offset = r.read_u32()?;
        let payload_size = r.read_u32()?;
        let name = r.read_u64()?;
        Ok((name_hash, type_hash, payload_offset, payload_size, name))
    }

    /// Locates the `index`-th instance and resolves its metadata.
    pub fn get_instance(&self, buffer: &[u8], index: u32) -> Result<InstanceInfo> {
        let header = parse_header(buffer)?;
        let (name_hash, type_hash, payload_offset, payload_size, name_idx) =
            Self::read_instance_record(buffer, &header, index)?;
        let name = file_string_at(buffer, &header, name_idx)?;
        Ok(InstanceInfo {
            name_hash,
            type_hash,
            name,
            payload_offset,
            payload_size,
        })
    }

    /// Locates the instance matching `(name_hash, type_hash)`, copies its
    /// payload, and resolves its pointer fix-ups into a [`PatchEntry`]
    /// index using whichever algorithm the header's
    /// `RELATIVE_OFFSETS_EXISTS` flag selects.
    pub fn read_instance(&self, buffer: &[u8], name_hash: u32, type_hash: u32) -> Result<Instance> {
        let header = parse_header(buffer)?;

        let mut found = None;
        for i in 0..header.instance_count {
            let (nh, th, offset, size, _) = Self::read_instance_record(buffer, &header, i)?;
            if nh == name_hash && th == type_hash {
                found = Some((offset, size));
                break;
            }
        }
        let (payload_offset, payload_size) = found.ok_or(Error::InvalidArgument)?;

        let payload = buffer
            .get(payload_offset as usize..payload_offset as usize + payload_size as usize)
            .ok_or(Error::AdfBufferTooSmall)?
            .to_vec();

        let patches = if header.flags & RELATIVE_OFFSETS_EXISTS != 0 {
            let mem = &buffer[payload_offset as usize..];
            build_patch_index_tail_chain(mem, payload_size as usize)
        } else {
            build_patch_index_recursive(self, type_hash, &payload)
        };

        Ok(Instance { payload, patches })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_types_are_present_before_any_file_loads() {
        let adf = Adf::new();
        assert!(adf.find_type(DEFERRED_TYPE_HASH).is_some());
        assert_eq!(adf.types().len(), 12);
    }

    #[test]
    fn empty_buffer_is_too_small() {
        assert!(matches!(parse_header(&[]), Err(Error::AdfBufferTooSmall)));
    }

    #[test]
    fn bad_magic_is_invalid_magic() {
        let bytes = vec![0u8; HEADER_SIZE];
        assert!(matches!(parse_header(&bytes), Err(Error::AdfInvalidMagic)));
    }

    fn build_minimal_adf_with_float_instance(value: f32) -> Vec<u8> {
        // Layout: header, one instance record, payload (4 bytes float),
        // one string ("Sniper.InitialRandomAimDistance"), no types, no
        // string hashes. Exercises get_instance/read_instance without
        // needing a Struct type in the registry.
        let name = b"Sniper.InitialRandomAimDistance\0";
        let header_size = HEADER_SIZE;
        let instance_offset = header_size as u32;
        let payload_offset = instance_offset + INSTANCE_SIZE as u32;
        let payload_size = 4u32;
        let string_data_offset = payload_offset + payload_size;

        let mut buf = Vec::new();
        buf.extend_from_slice(&ADF_MAGIC.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes()); // version
        buf.extend_from_slice(&1u32.to_le_bytes()); // instance_count
        buf.extend_from_slice(&instance_offset.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // type_count
        buf.extend_from_slice(&0u32.to_le_bytes()); // first_type_offset
        buf.extend_from_slice(&0u32.to_le_bytes()); // string_hash_count
        buf.extend_from_slice(&0u32.to_le_bytes()); // first_string_hash_offset
        buf.extend_from_slice(&1u32.to_le_bytes()); // string_count
        buf.extend_from_slice(&string_data_offset.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // file_size
        buf.extend_from_slice(&0u32.to_le_bytes()); // unknown
        buf.extend_from_slice(&0u32.to_le_bytes()); // flags (recursive-walk mode)
        buf.extend_from_slice(&0u32.to_le_bytes()); // included_libraries
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes()); // description ptr
        assert_eq!(buf.len(), header_size);

        buf.extend_from_slice(&0xD906_6DF1u32.to_le_bytes()); // name_hash
        buf.extend_from_slice(&0x8DFB_5000u32.to_le_bytes()); // type_hash
        buf.extend_from_slice(&payload_offset.to_le_bytes());
        buf.extend_from_slice(&payload_size.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes()); // name pool index 0

        buf.extend_from_slice(&value.to_le_bytes());

        buf.push((name.len() - 1) as u8); // length table: one entry
        buf.extend_from_slice(name);

        buf
    }

    #[test]
    fn instance_lookup_and_payload_read() {
        let buf = build_minimal_adf_with_float_instance(1.5);
        let adf = Adf::new();

        let info = adf.get_instance(&buf, 0).unwrap();
        assert_eq!(info.name_hash, 0xD906_6DF1);
        assert_eq!(info.name, "Sniper.InitialRandomAimDistance");

        let instance = adf.read_instance(&buf, 0xD906_6DF1, 0x8DFB_5000).unwrap();
        assert_eq!(instance.read_f32(0), Some(1.5));
    }

    #[test]
    fn unknown_instance_is_invalid_argument() {
        let buf = build_minimal_adf_with_float_instance(1.5);
        let adf = Adf::new();
        assert!(matches!(
            adf.read_instance(&buf, 0, 0),
            Err(Error::InvalidArgument)
        ));
    }

    /// Two-link tail chain laid out entirely inside a 20-byte payload, with
    /// the bootstrap length sitting right after it. Covers both the normal
    /// case (raw field value passed through as-is) and the `v == 1` special
    /// case (translated to 0).
    #[test]
    fn tail_chain_patch_sites_land_inside_the_payload() {
        let payload_size = 20usize;
        let mut mem = vec![0u8; payload_size];
        mem[4..8].copy_from_slice(&0x1111_1111u32.to_le_bytes()); // site 1 value
        mem[8..12].copy_from_slice(&8u32.to_le_bytes()); // site 1 -> site 2 delta
        mem[12..16].copy_from_slice(&1u32.to_le_bytes()); // site 2 value (special-cased)
        mem[16..20].copy_from_slice(&0u32.to_le_bytes()); // chain terminator
        mem.extend_from_slice(&8u32.to_le_bytes()); // bootstrap delta, just past the payload

        let patches = build_patch_index_tail_chain(&mem, payload_size);

        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0].field_site_offset, 4);
        assert_eq!(patches[0].target_offset, 0x1111_1111);
        assert!((patches[0].field_site_offset as usize) < payload_size);
        assert_eq!(patches[1].field_site_offset, 12);
        assert_eq!(patches[1].target_offset, 0);
        assert!((patches[1].field_site_offset as usize) < payload_size);
    }

    fn build_adf_with_tail_chain_instance() -> Vec<u8> {
        // Same instance-record shape as `build_minimal_adf_with_float_instance`,
        // but with `RELATIVE_OFFSETS_EXISTS` set and a 20-byte payload carrying
        // the two-link chain from `tail_chain_patch_sites_land_inside_the_payload`.
        let name = b"Chain.Root\0";
        let header_size = HEADER_SIZE;
        let instance_offset = header_size as u32;
        let payload_offset = instance_offset + INSTANCE_SIZE as u32;
        let payload_size = 20u32;
        let bootstrap_offset = payload_offset + payload_size;
        let string_data_offset = bootstrap_offset + 4;

        let mut buf = Vec::new();
        buf.extend_from_slice(&ADF_MAGIC.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes()); // version
        buf.extend_from_slice(&1u32.to_le_bytes()); // instance_count
        buf.extend_from_slice(&instance_offset.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // type_count
        buf.extend_from_slice(&0u32.to_le_bytes()); // first_type_offset
        buf.extend_from_slice(&0u32.to_le_bytes()); // string_hash_count
        buf.extend_from_slice(&0u32.to_le_bytes()); // first_string_hash_offset
        buf.extend_from_slice(&1u32.to_le_bytes()); // string_count
        buf.extend_from_slice(&string_data_offset.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // file_size
        buf.extend_from_slice(&0u32.to_le_bytes()); // unknown
        buf.extend_from_slice(&RELATIVE_OFFSETS_EXISTS.to_le_bytes()); // flags
        buf.extend_from_slice(&0u32.to_le_bytes()); // included_libraries
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes()); // description ptr
        assert_eq!(buf.len(), header_size);

        buf.extend_from_slice(&0x1357_9BDFu32.to_le_bytes()); // name_hash
        buf.extend_from_slice(&0x2468_ACE0u32.to_le_bytes()); // type_hash
        buf.extend_from_slice(&payload_offset.to_le_bytes());
        buf.extend_from_slice(&payload_size.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes()); // name pool index 0

        buf.extend_from_slice(&[0u8; 4]); // payload[0..4], unused
        buf.extend_from_slice(&0x1111_1111u32.to_le_bytes()); // payload[4..8]
        buf.extend_from_slice(&8u32.to_le_bytes()); // payload[8..12]
        buf.extend_from_slice(&1u32.to_le_bytes()); // payload[12..16]
        buf.extend_from_slice(&0u32.to_le_bytes()); // payload[16..20]
        buf.extend_from_slice(&8u32.to_le_bytes()); // bootstrap delta, right after the payload

        buf.push((name.len() - 1) as u8); // length table: one entry
        buf.extend_from_slice(name);

        buf
    }

    #[test]
    fn read_instance_resolves_tail_chain_patches() {
        let buf = build_adf_with_tail_chain_instance();
        let adf = Adf::new();

        let instance = adf
            .read_instance(&buf, 0x1357_9BDF, 0x2468_ACE0)
            .unwrap();

        assert_eq!(instance.resolve(4), Some(0x1111_1111));
        assert_eq!(instance.resolve(12), Some(0));
        assert_eq!(instance.resolve(999), None);
    }
}
