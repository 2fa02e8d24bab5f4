//! Index (interior) block payload: a sorted sequence of entries, each
//! `(first record of referenced child, child_offset, child_length)`.
//!
//! Entries must be strictly increasing by key AND by `child_offset` — a
//! file where a later entry's offset doesn't move forward is corrupt even if
//! the keys are in order, since siblings must appear on disk in the same
//! order as their key range (§3).

use crate::error::Corrupt;
use crate::varint::read_varint_buf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// First record of the referenced child block.
    pub key: Vec<u8>,
    pub child_offset: u64,
    pub child_length: u64,
}

/// Decode an index block payload into its entries, in on-disk order.
pub fn decode_entries(payload: &[u8]) -> Result<Vec<IndexEntry>, Corrupt> {
    let mut entries = Vec::new();
    let mut pos = 0usize;

    while pos < payload.len() {
        let (key_len, n1) = read_varint_buf(&payload[pos..])?;
        pos += n1;
        let key_len = key_len as usize;
        if pos + key_len > payload.len() {
            return Err(Corrupt::new("past end of block"));
        }
        let key = payload[pos..pos + key_len].to_vec();
        pos += key_len;

        let (child_offset, n2) = read_varint_buf(&payload[pos..])?;
        pos += n2;
        let (child_length, n3) = read_varint_buf(&payload[pos..])?;
        pos += n3;

        entries.push(IndexEntry { key, child_offset, child_length });
    }

    Ok(entries)
}

/// Encode an index block payload. Used by test fixtures to assemble
/// in-memory `.zss` files.
#[cfg(test)]
pub fn encode_entries(entries: &[IndexEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    for e in entries {
        out.extend(crate::varint::encode_varint(e.key.len() as u64));
        out.extend_from_slice(&e.key);
        out.extend(crate::varint::encode_varint(e.child_offset));
        out.extend(crate::varint::encode_varint(e.child_length));
    }
    out
}

/// Find the index of the "floor" entry for `target`: the last entry whose
/// key is `<= target`, or `None` if every entry's key is `> target` (the
/// query is before the first child's range — descend into the first child
/// anyway, since the first child's key is a lower bound only by convention,
/// not a hard floor).
pub fn floor_entry_index(entries: &[IndexEntry], target: &[u8]) -> Option<usize> {
    // entries are sorted by key (strictly increasing); binary search for the
    // partition point where entry.key <= target.
    let mut lo = 0isize;
    let mut hi = entries.len() as isize - 1;
    let mut result = None;
    while lo <= hi {
        let mid = (lo + hi) / 2;
        if entries[mid as usize].key.as_slice() <= target {
            result = Some(mid as usize);
            lo = mid + 1;
        } else {
            hi = mid - 1;
        }
    }
    result
}
