//! RTPC: a tree of keyed property containers whose leaves are tagged
//! variants. The C++ source's own `RuntimePropertyContainer.cpp` is little
//! more than pointer-arithmetic sketches, so this reader/writer is built
//! directly from the documented wire layout rather than ported from that
//! stub.

use std::collections::HashMap;

use crate::cursor::{Reader, Writer};
use crate::error::{Error, Result};
use crate::hash::align_up;

pub const RTPC_MAGIC: u32 = 0x4350_5452;
const PADDING_BYTE: u8 = 0x50;

/// Sentinel key returned by the "invalid" lookup results.
pub const INVALID_KEY: u32 = 0xFFFF_FFFF;

/// A type that cannot be constructed outside this module — used to make
/// the two unused variant tags (7, 12) representable but never
/// constructible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unused(());

/// A 48-bit hash + 16-bit userdata identifier, packed into 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectId(pub u64);

impl ObjectId {
    pub fn new(hash48: u64, userdata16: u16) -> Self {
        ObjectId((hash48 & 0xFFFF_FFFF_FFFF) | ((userdata16 as u64) << 48))
    }

    pub fn hash(&self) -> u64 {
        self.0 & 0xFFFF_FFFF_FFFF
    }

    pub fn userdata(&self) -> u16 {
        (self.0 >> 48) as u16
    }
}

/// A single variant payload, tagged by wire value. Tags 7 and 12 are
/// unused on the wire and are represented here by variants that hold an
/// uninhabited-from-outside [`Unused`] field.
#[derive(Debug, Clone, PartialEq)]
pub enum VariantValue {
    Unassigned,
    Integer(i32),
    Float(f32),
    String(Vec<u8>),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Reserved7(Unused),
    Mat4x4([f32; 16]),
    IntList(Vec<i32>),
    FloatList(Vec<f32>),
    ByteList(Vec<u8>),
    Reserved12(Unused),
    ObjectIdValue(ObjectId),
    EventList(Vec<ObjectId>),
}

impl VariantValue {
    fn tag(&self) -> u8 {
        match self {
            VariantValue::Unassigned => 0,
            VariantValue::Integer(_) => 1,
            VariantValue::Float(_) => 2,
            VariantValue::String(_) => 3,
            VariantValue::Vec2(_) => 4,
            VariantValue::Vec3(_) => 5,
            VariantValue::Vec4(_) => 6,
            VariantValue::Reserved7(_) => 7,
            VariantValue::Mat4x4(_) => 8,
            VariantValue::IntList(_) => 9,
            VariantValue::FloatList(_) => 10,
            VariantValue::ByteList(_) => 11,
            VariantValue::Reserved12(_) => 12,
            VariantValue::ObjectIdValue(_) => 13,
            VariantValue::EventList(_) => 14,
        }
    }

    fn is_inline(&self) -> bool {
        matches!(self, VariantValue::Integer(_) | VariantValue::Float(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub key: u32,
    pub value: VariantValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub key: u32,
    pub variants: Vec<Variant>,
    pub children: Vec<Container>,
}

impl Container {
    pub fn new(key: u32) -> Self {
        Container {
            key,
            variants: Vec::new(),
            children: Vec::new(),
        }
    }

    fn invalid() -> Self {
        Container {
            key: INVALID_KEY,
            variants: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Finds a child container by key. Never fails; returns the
    /// "invalid" sentinel (`key == INVALID_KEY`) when missing.
    pub fn find_container(&self, key: u32, recursive: bool) -> Container {
        for child in &self.children {
            if child.key == key {
                return child.clone();
            }
        }
        if recursive {
            for child in &self.children {
                let found = child.find_container(key, true);
                if found.key != INVALID_KEY {
                    return found;
                }
            }
        }
        Container::invalid()
    }

    /// Finds a variant by key, optionally descending into children.
    /// Returns a sentinel variant (`key == INVALID_KEY`) when missing.
    pub fn find_variant(&self, key: u32, recursive: bool) -> Variant {
        for variant in &self.variants {
            if variant.key == key {
                return variant.clone();
            }
        }
        if recursive {
            for child in &self.children {
                let found = child.find_variant(key, true);
                if found.key != INVALID_KEY {
                    return found;
                }
            }
        }
        Variant {
            key: INVALID_KEY,
            value: VariantValue::Unassigned,
        }
    }
}

fn read_variant_payload(r: &mut Reader<'_>, tag: u8, inline: u32) -> Result<VariantValue> {
    Ok(match tag {
        0 => VariantValue::Unassigned,
        1 => VariantValue::Integer(inline as i32),
        2 => VariantValue::Float(f32::from_bits(inline)),
        3 => {
            r.seek_abs(inline as usize)?;
            VariantValue::String(r.read_cstring()?.to_vec())
        }
        4 => {
            r.seek_abs(inline as usize)?;
            VariantValue::Vec2([r.read_f32()?, r.read_f32()?])
        }
        5 => {
            r.seek_abs(inline as usize)?;
            VariantValue::Vec3([r.read_f32()?, r.read_f32()?, r.read_f32()?])
        }
        6 => {
            r.seek_abs(inline as usize)?;
            VariantValue::Vec4([r.read_f32()?, r.read_f32()?, r.read_f32()?, r.read_f32()?])
        }
        8 => {
            r.seek_abs(inline as usize)?;
            let mut m = [0f32; 16];
            for slot in &mut m {
                *slot = r.read_f32()?;
            }
            VariantValue::Mat4x4(m)
        }
        9 => {
            r.seek_abs(inline as usize)?;
            let count = r.read_u32()?;
            let mut v = Vec::with_capacity(count as usize);
            for _ in 0..count {
                v.push(r.read_i32()?);
            }
            VariantValue::IntList(v)
        }
        10 => {
            r.seek_abs(inline as usize)?;
            let count = r.read_u32()?;
            let mut v = Vec::with_capacity(count as usize);
            for _ in 0..count {
                v.push(r.read_f32()?);
            }
            VariantValue::FloatList(v)
        }
        11 => {
            r.seek_abs(inline as usize)?;
            let count = r.read_u32()?;
            VariantValue::ByteList(r.read_bytes(count as usize)?.to_vec())
        }
        13 => {
            r.seek_abs(inline as usize)?;
            VariantValue::ObjectIdValue(ObjectId(r.read_u64()?))
        }
        14 => {
            r.seek_abs(inline as usize)?;
            let count = r.read_u32()?;
            let mut v = Vec::with_capacity(count as usize);
            for _ in 0..count {
                v.push(ObjectId(r.read_u64()?));
            }
            VariantValue::EventList(v)
        }
        _ => return Err(Error::RtpcInvalidMagic),
    })
}

fn read_container(r: &mut Reader<'_>) -> Result<Container> {
    let key = r.read_u32()?;
    let data_offset = r.read_u32()?;
    let variant_count = r.read_u16()?;
    let child_count = r.read_u16()?;

    let mut variants = Vec::with_capacity(variant_count as usize);
    for i in 0..variant_count as u32 {
        r.seek_abs(data_offset as usize + i as usize * 9)?;
        let vkey = r.read_u32()?;
        let inline = r.read_u32()?;
        let tag = r.read_u8()?;
        let value = read_variant_payload(r, tag, inline)?;
        variants.push(Variant { key: vkey, value });
    }

    let children_start = align_up(data_offset as u64 + variant_count as u64 * 9, 4) as usize;
    let mut children = Vec::with_capacity(child_count as usize);
    for i in 0..child_count as usize {
        r.seek_abs(children_start + i * 12)?;
        children.push(read_container(r)?);
    }

    Ok(Container {
        key,
        variants,
        children,
    })
}

/// Parses an RTPC buffer into its root container tree.
pub fn parse(buffer: &[u8]) -> Result<Container> {
    if buffer.is_empty() {
        return Err(Error::InvalidArgument);
    }
    let mut r = Reader::new(buffer);
    let magic = r.read_u32()?;
    if magic != RTPC_MAGIC {
        return Err(Error::RtpcInvalidMagic);
    }
    let _version = r.read_u32()?;
    read_container(&mut r)
}

fn payload_alignment(value: &VariantValue) -> u64 {
    match value {
        VariantValue::Vec4(_) | VariantValue::Mat4x4(_) => 16,
        _ => 4,
    }
}

fn write_payload(w: &mut Writer, value: &VariantValue, cache: &mut HashMap<Vec<u8>, u32>) -> u32 {
    match value {
        VariantValue::Unassigned | VariantValue::Integer(_) | VariantValue::Float(_) => 0,
        VariantValue::String(bytes) => {
            if let Some(&offset) = cache.get(bytes) {
                return offset;
            }
            let offset = w.tell() as u32;
            w.write_cstring(bytes);
            cache.insert(bytes.clone(), offset);
            offset
        }
        VariantValue::Vec2(v) => {
            let offset = w.tell() as u32;
            for f in v {
                w.write_f32(*f);
            }
            offset
        }
        VariantValue::Vec3(v) => {
            let offset = w.tell() as u32;
            for f in v {
                w.write_f32(*f);
            }
            offset
        }
        VariantValue::Vec4(v) => {
            let offset = w.tell() as u32;
            for f in v {
                w.write_f32(*f);
            }
            offset
        }
        VariantValue::Mat4x4(m) => {
            let offset = w.tell() as u32;
            for f in m {
                w.write_f32(*f);
            }
            offset
        }
        VariantValue::IntList(v) => {
            let offset = w.tell() as u32;
            w.write_u32(v.len() as u32);
            for i in v {
                w.write_i32(*i);
            }
            offset
        }
        VariantValue::FloatList(v) => {
            let offset = w.tell() as u32;
            w.write_u32(v.len() as u32);
            for f in v {
                w.write_f32(*f);
            }
            offset
        }
        VariantValue::ByteList(v) => {
            let offset = w.tell() as u32;
            w.write_u32(v.len() as u32);
            w.write_bytes(v);
            offset
        }
        VariantValue::ObjectIdValue(id) => {
            let offset = w.tell() as u32;
            w.write_u64(id.0);
            offset
        }
        VariantValue::EventList(v) => {
            let offset = w.tell() as u32;
            w.write_u32(v.len() as u32);
            for id in v {
                w.write_u64(id.0);
            }
            offset
        }
        VariantValue::Reserved7(_) | VariantValue::Reserved12(_) => unreachable!(
            "Reserved7/Reserved12 are uninhabited outside this module and can't be written"
        ),
    }
}

/// Writes one container's region: its variant table, its children's
/// headers, then its own out-of-line payloads, then recurses into each
/// child's subtree. Returns the container's `dataOffset`.
fn write_container_body(w: &mut Writer, container: &Container, cache: &mut HashMap<Vec<u8>, u32>) -> u32 {
    let data_offset = w.tell() as u32;

    let mut inline_patch_positions = Vec::with_capacity(container.variants.len());
    for variant in &container.variants {
        let header_pos = w.tell();
        w.write_u32(variant.key);
        let inline_value = match &variant.value {
            VariantValue::Integer(i) => *i as u32,
            VariantValue::Float(f) => f.to_bits(),
            _ => 0,
        };
        w.write_u32(inline_value);
        w.write_u8(variant.value.tag());
        if !variant.value.is_inline() {
            inline_patch_positions.push(header_pos + 4);
        }
    }

    let pad = align_up(w.tell() as u64, 4) - w.tell() as u64;
    w.write_repeated(PADDING_BYTE, pad as usize);

    let child_header_positions: Vec<usize> = (0..container.children.len())
        .map(|_| {
            let pos = w.tell();
            w.write_u32(0); // key placeholder
            w.write_u32(0); // dataOffset placeholder
            w.write_u16(0);
            w.write_u16(0);
            pos
        })
        .collect();

    let mut payload_iter = inline_patch_positions.into_iter();
    for variant in &container.variants {
        if variant.value.is_inline() {
            continue;
        }
        let align = payload_alignment(&variant.value);
        let pad = align_up(w.tell() as u64, align) - w.tell() as u64;
        w.write_repeated(PADDING_BYTE, pad as usize);
        let offset = write_payload(w, &variant.value, cache);
        let patch_pos = payload_iter.next().expect("one patch position per non-inline variant");
        let end = w.tell();
        w.set_pos(patch_pos);
        w.write_u32(offset);
        w.set_pos(end);
    }

    for (child, header_pos) in container.children.iter().zip(child_header_positions) {
        let child_data_offset = write_container_body(w, child, cache);
        let end = w.tell();
        w.set_pos(header_pos);
        w.write_u32(child.key);
        w.write_u32(child_data_offset);
        w.write_u16(child.variants.len() as u16);
        w.write_u16(child.children.len() as u16);
        w.set_pos(end);
    }

    data_offset
}

/// Serializes a container tree as a complete RTPC buffer.
pub fn write(root: &Container) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_u32(RTPC_MAGIC);
    w.write_u32(1);

    let root_header_pos = w.tell();
    w.write_u32(root.key);
    w.write_u32(0);
    w.write_u16(root.variants.len() as u16);
    w.write_u16(root.children.len() as u16);

    let mut cache = HashMap::new();
    let data_offset = write_container_body(&mut w, root, &mut cache);
    let end = w.tell();
    w.set_pos(root_header_pos + 4);
    w.write_u32(data_offset);
    w.set_pos(end);

    w.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_nested_tree_with_mixed_variants() {
        let mut child = Container::new(2);
        child.variants.push(Variant {
            key: 20,
            value: VariantValue::Float(1.5),
        });
        child.variants.push(Variant {
            key: 21,
            value: VariantValue::String(b"hello".to_vec()),
        });

        let mut root = Container::new(1);
        root.variants.push(Variant {
            key: 10,
            value: VariantValue::Integer(-7),
        });
        root.variants.push(Variant {
            key: 11,
            value: VariantValue::Vec4([1.0, 2.0, 3.0, 4.0]),
        });
        root.variants.push(Variant {
            key: 12,
            value: VariantValue::IntList(vec![1, 2, 3]),
        });
        root.children.push(child);

        let bytes = write(&root);
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed, root);
    }

    #[test]
    fn find_helpers_return_invalid_sentinel_when_missing() {
        let root = Container::new(1);
        let found = root.find_container(999, true);
        assert_eq!(found.key, INVALID_KEY);
        let variant = root.find_variant(999, true);
        assert_eq!(variant.key, INVALID_KEY);
    }

    #[test]
    fn empty_buffer_is_invalid_argument() {
        assert!(matches!(parse(&[]), Err(Error::InvalidArgument)));
    }

    #[test]
    fn string_payloads_are_deduplicated() {
        let mut root = Container::new(1);
        root.variants.push(Variant {
            key: 1,
            value: VariantValue::String(b"shared".to_vec()),
        });
        root.variants.push(Variant {
            key: 2,
            value: VariantValue::String(b"shared".to_vec()),
        });
        let bytes = write(&root);
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.variants[0].value, parsed.variants[1].value);
    }
}
