//! Block framing: `varint(inner_len) || level(1) || payload[inner_len-1] || checksum(8)`.
//!
//! `level = 0` is a data (leaf) block, `1..=63` an index block at that
//! level, and `> 63` an extension block — reserved, skipped on read.

use crate::checksum::checksum64;
use crate::codec::CodecId;
use crate::error::{Corrupt, ZssError};
use crate::transport::Transport;
use crate::varint::read_varint_buf;

pub const EXTENSION_LEVEL_THRESHOLD: u8 = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLevel {
    Data,
    Index(u8),
    Extension(u8),
}

impl BlockLevel {
    pub fn from_byte(b: u8) -> Self {
        if b == 0 {
            BlockLevel::Data
        } else if b <= EXTENSION_LEVEL_THRESHOLD {
            BlockLevel::Index(b)
        } else {
            BlockLevel::Extension(b)
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            BlockLevel::Data => 0,
            BlockLevel::Index(l) => l,
            BlockLevel::Extension(l) => l,
        }
    }

    pub fn is_extension(self) -> bool {
        matches!(self, BlockLevel::Extension(_))
    }

    pub fn is_data(self) -> bool {
        matches!(self, BlockLevel::Data)
    }
}

/// A parsed, decompressed block and the number of on-disk bytes its envelope
/// occupied (so callers can advance past it when scanning sequentially).
pub struct DecodedBlock {
    pub level: BlockLevel,
    /// Decompressed payload. Empty (and meaningless) for extension blocks,
    /// which are never decompressed — callers only need `envelope_len` to
    /// skip past them.
    pub payload: Vec<u8>,
    pub envelope_len: u64,
}

/// Decode one block envelope out of an already-fetched buffer `raw`, which
/// must contain at least the full envelope starting at offset 0.
pub fn decode_envelope(raw: &[u8], codec: CodecId) -> Result<DecodedBlock, Corrupt> {
    let (inner_length, varint_len) = read_varint_buf(raw)?;
    if inner_length == 0 {
        return Err(Corrupt::new("empty block"));
    }
    let needed = varint_len as u64 + inner_length + 8;
    if (raw.len() as u64) < needed {
        return Err(Corrupt::new("past end of block"));
    }

    let level_byte = raw[varint_len];
    let payload_start = varint_len + 1;
    let payload_end = varint_len + inner_length as usize;
    let compressed_payload = &raw[payload_start..payload_end];

    let checksum_bytes: [u8; 8] = raw[payload_end..payload_end + 8]
        .try_into()
        .expect("slice length fixed above");
    let stored_checksum = u64::from_le_bytes(checksum_bytes);

    let mut hashed = Vec::with_capacity(1 + compressed_payload.len());
    hashed.push(level_byte);
    hashed.extend_from_slice(compressed_payload);
    if checksum64(&hashed) != stored_checksum {
        return Err(Corrupt::new("checksum mismatch"));
    }

    let level = BlockLevel::from_byte(level_byte);
    if level.is_extension() {
        return Ok(DecodedBlock { level, payload: Vec::new(), envelope_len: needed });
    }

    let payload = codec.decompress(compressed_payload)?;
    Ok(DecodedBlock { level, payload, envelope_len: needed })
}

/// Fetch and decode the block at `offset`, using `declared_length` as an
/// exact-size hint when known (from an index entry or the header's root
/// pointer). When no hint is available, speculatively read a small prefix
/// and extend it once the envelope's true length is known — the same
/// two-phase strategy the header parser uses.
pub fn read_block_at<T: Transport + ?Sized>(
    transport: &T,
    offset: u64,
    declared_length: Option<u64>,
    codec: CodecId,
) -> Result<DecodedBlock, ZssError> {
    let file_len = transport.length()?;
    if offset >= file_len {
        return Err(ZssError::corrupt("unexpectedly ran out of data"));
    }

    if let Some(len) = declared_length {
        let avail = file_len - offset;
        if avail < len {
            return Err(ZssError::corrupt("unexpectedly ran out of data"));
        }
        let raw = transport.read(offset, len)?;
        return decode_envelope(&raw, codec).map_err(ZssError::from);
    }

    // No hint: probe a small prefix, then extend once we know inner_length.
    let mut probe_len = 16u64.min(file_len - offset);
    loop {
        let raw = transport.read(offset, probe_len)?;
        match read_varint_buf(&raw) {
            Ok((inner_length, varint_len)) => {
                let needed = varint_len as u64 + inner_length + 8;
                if (raw.len() as u64) >= needed {
                    return decode_envelope(&raw[..needed as usize], codec).map_err(ZssError::from);
                }
                let avail = file_len - offset;
                if avail < needed {
                    return Err(ZssError::corrupt("unexpectedly ran out of data"));
                }
                probe_len = needed;
            }
            Err(_) => {
                let avail = file_len - offset;
                if probe_len >= avail {
                    return Err(ZssError::corrupt("unexpectedly ran out of data"));
                }
                probe_len = (probe_len * 2).min(avail);
            }
        }
    }
}

/// Encode a block envelope. Used by the test fixtures throughout this crate
/// to assemble in-memory `.zss` byte buffers.
#[cfg(test)]
pub fn encode_envelope(level: u8, compressed_payload: &[u8]) -> Vec<u8> {
    let inner_length = 1 + compressed_payload.len() as u64;
    let mut out = crate::varint::encode_varint(inner_length);
    out.push(level);
    out.extend_from_slice(compressed_payload);
    let mut hashed = Vec::with_capacity(1 + compressed_payload.len());
    hashed.push(level);
    hashed.extend_from_slice(compressed_payload);
    out.extend_from_slice(&checksum64(&hashed).to_le_bytes());
    out
}
