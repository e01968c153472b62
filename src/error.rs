//! Shared closed error type for every subsystem in this crate.

use std::fmt;
use std::io;

/// Every failure mode surfaced by this crate.
///
/// Kept as one flat enum (rather than one per subsystem) because several
/// operations compose across subsystems (AAF feeds SARC feeds ADF/RTPC) and
/// a caller walking that chain wants a single `match`.
#[derive(Debug)]
pub enum Error {
    InvalidArgument,
    NotImplemented,

    CompressorUnavailable,
    CompressorLoadFailed(String),
    CompressorBadSignature,

    TabInvalidMagic,
    TabUnknownEntry,
    TabRequiresCompressionBlocks,
    TabCompressBlockFailed,
    TabDecompressBlockFailed,

    AafInvalidMagic,
    AafInvalidChunkMagic,
    AafCompressChunkFailed,
    AafDecompressChunkFailed,

    SarcInvalidMagic,
    SarcUnknownVersion,
    SarcPatchedEntry,

    RbmdlInvalidMagic,
    RbmdlUnknownVersion,
    RbmdlBadChecksum,

    AdfInvalidMagic,
    AdfBufferTooSmall,

    RtpcInvalidMagic,

    AvtxInvalidMagic,
    AvtxUnknownVersion,
    AvtxSourceBufferNeeded,

    Io(io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Stable, short diagnostic string for each error kind.
pub fn to_string(err: &Error) -> &'static str {
    use Error::*;
    match err {
        InvalidArgument => "invalid argument",
        NotImplemented => "not implemented",
        CompressorUnavailable => "no compressor plug-in loaded",
        CompressorLoadFailed(_) => "failed to load compressor plug-in",
        CompressorBadSignature => "compressor plug-in is missing an expected symbol",
        TabInvalidMagic => "TAB: invalid magic",
        TabUnknownEntry => "TAB: unknown entry",
        TabRequiresCompressionBlocks => "TAB: entry requires a compression-block table",
        TabCompressBlockFailed => "TAB: failed to compress block",
        TabDecompressBlockFailed => "TAB: failed to decompress block",
        AafInvalidMagic => "AAF: invalid magic",
        AafInvalidChunkMagic => "AAF: invalid chunk magic",
        AafCompressChunkFailed => "AAF: failed to compress chunk",
        AafDecompressChunkFailed => "AAF: failed to decompress chunk",
        SarcInvalidMagic => "SARC: invalid magic",
        SarcUnknownVersion => "SARC: unknown version",
        SarcPatchedEntry => "SARC: entry is patched or deleted",
        RbmdlInvalidMagic => "RBMDL: invalid magic",
        RbmdlUnknownVersion => "RBMDL: unknown version",
        RbmdlBadChecksum => "RBMDL: bad checksum",
        AdfInvalidMagic => "ADF: invalid magic",
        AdfBufferTooSmall => "ADF: buffer too small",
        RtpcInvalidMagic => "RTPC: invalid magic",
        AvtxInvalidMagic => "AVTX: invalid magic",
        AvtxUnknownVersion => "AVTX: unknown version",
        AvtxSourceBufferNeeded => "AVTX: source buffer needed",
        Io(_) => "I/O error",
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CompressorLoadFailed(detail) => {
                write!(f, "{}: {}", to_string(self), detail)
            }
            Error::Io(err) => write!(f, "{}: {}", to_string(self), err),
            other => f.write_str(to_string(other)),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
