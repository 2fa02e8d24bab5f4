//! Codec registry: maps a codec name to a decompressor.
//!
//! Recognized codecs: `none`, `deflate`, `bz2`, `lzma`. The codec name is a
//! property of the whole file (stored once in the header, §3/§6) and is
//! immutable once a reader is open — unlike a multi-codec-per-block format,
//! there is no per-block dispatch table to validate; an unknown name fails
//! at open time.

use crate::error::Corrupt;
use std::io::Read;

/// Raw on-disk width of the header's codec name field.
pub const CODEC_NAME_FIELD_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    None,
    Deflate,
    Bz2,
    Lzma,
}

impl CodecId {
    pub fn name(self) -> &'static str {
        match self {
            CodecId::None => "none",
            CodecId::Deflate => "deflate",
            CodecId::Bz2 => "bz2",
            CodecId::Lzma => "lzma",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "none" => Some(CodecId::None),
            "deflate" => Some(CodecId::Deflate),
            "bz2" => Some(CodecId::Bz2),
            "lzma" => Some(CodecId::Lzma),
            _ => None,
        }
    }

    /// Decode the codec name from its null-padded on-disk field.
    ///
    /// Returns `Corrupt("unrecognized compression")` for anything not in the
    /// closed set above, including a field that isn't valid ASCII.
    pub fn from_field(field: &[u8; CODEC_NAME_FIELD_LEN]) -> Result<Self, Corrupt> {
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        let name = std::str::from_utf8(&field[..end])
            .map_err(|_| Corrupt::new("unrecognized compression"))?;
        CodecId::from_name(name).ok_or_else(|| Corrupt::new("unrecognized compression"))
    }

    /// Encode the codec name into its null-padded on-disk field.
    pub fn to_field(self) -> [u8; CODEC_NAME_FIELD_LEN] {
        let mut field = [0u8; CODEC_NAME_FIELD_LEN];
        let name = self.name().as_bytes();
        field[..name.len()].copy_from_slice(name);
        field
    }

    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>, Corrupt> {
        match self {
            CodecId::None => Ok(data.to_vec()),
            CodecId::Deflate => {
                let mut out = Vec::new();
                flate2::read::DeflateDecoder::new(data)
                    .read_to_end(&mut out)
                    .map_err(|e| Corrupt::new(format!("deflate decompression failed: {e}")))?;
                Ok(out)
            }
            CodecId::Bz2 => {
                let mut out = Vec::new();
                bzip2::read::BzDecoder::new(data)
                    .read_to_end(&mut out)
                    .map_err(|e| Corrupt::new(format!("bz2 decompression failed: {e}")))?;
                Ok(out)
            }
            CodecId::Lzma => {
                let mut out = Vec::new();
                lzma_rs::lzma_decompress(&mut std::io::Cursor::new(data), &mut out)
                    .map_err(|e| Corrupt::new(format!("lzma decompression failed: {e}")))?;
                Ok(out)
            }
        }
    }
}
