//! Full structural and referential integrity validator (§4.9).
//!
//! Walks the whole tree once from the root, then cross-checks the result
//! against a single linear scan of every block in the file. Like the
//! teacher's block scanner this raises on the first violation found rather
//! than accumulating a report — per §7, ZSS corruption is always fatal, so
//! there's no use case for "keep going and collect everything wrong."

use crate::block::read_block_at;
use crate::codec::CodecId;
use crate::error::ZssError;
use crate::header::Header;
use crate::index::decode_entries;
use crate::leaf::decode_records;
use crate::transport::Transport;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Validate `header`'s tree and block region against every invariant in §3.
pub fn validate<T: Transport + ?Sized>(transport: &T, header: &Header) -> Result<(), ZssError> {
    let root = read_block_at(transport, header.root_index_offset, Some(header.root_index_length), header.codec)?;
    if root.envelope_len != header.root_index_length {
        return Err(ZssError::corrupt(format!(
            "root index length {} != actual length {}",
            header.root_index_length, root.envelope_len
        )));
    }

    let mut referenced = HashSet::new();
    walk(
        transport,
        header.codec,
        header.root_index_offset,
        header.root_index_length,
        None,
        None,
        &mut referenced,
    )?;

    let file_len = transport.length()?;
    let mut offset = header.header_len;
    let mut hasher = Sha256::new();
    while offset < file_len {
        let block = read_block_at(transport, offset, None, header.codec)?;
        if !block.level.is_extension() && !referenced.contains(&offset) {
            return Err(ZssError::corrupt(format!("unreferenced block at offset {offset}")));
        }
        if block.level.is_data() {
            let raw = transport.read(offset, block.envelope_len)?;
            hasher.update(&raw);
        }
        offset += block.envelope_len;
    }

    let digest: [u8; 32] = hasher.finalize().into();
    if digest != header.data_sha256 {
        return Err(ZssError::corrupt("data hash mismatch"));
    }

    Ok(())
}

/// Recursively validate the subtree rooted at `(offset, length)`.
///
/// `expected_level` is `Some(parent.level - 1)` for every call except the
/// root (where the tree's own level sets the baseline). `parent_key` is the
/// key the parent index entry stored for this child, `None` for the root.
fn walk<T: Transport + ?Sized>(
    transport: &T,
    codec: CodecId,
    offset: u64,
    length: u64,
    expected_level: Option<u8>,
    parent_key: Option<&[u8]>,
    referenced: &mut HashSet<u64>,
) -> Result<(), ZssError> {
    if referenced.contains(&offset) {
        return Err(ZssError::corrupt("multiple ref"));
    }
    referenced.insert(offset);

    let block = read_block_at(transport, offset, Some(length), codec)?;
    if block.envelope_len != length {
        return Err(ZssError::corrupt(format!(
            "declared child length {} != actual length {}",
            length, block.envelope_len
        )));
    }

    let actual_level = block.level.as_u8();
    if let Some(expected) = expected_level {
        if !block.level.is_extension() && actual_level != expected {
            return Err(ZssError::corrupt(format!("level {expected} to level {actual_level}")));
        }
    }

    if block.level.is_extension() {
        return Ok(());
    }

    if block.level.is_data() {
        let records = decode_records(&block.payload)?;
        for w in records.windows(2) {
            if w[1] < w[0] {
                return Err(ZssError::corrupt("unsorted records"));
            }
        }
        if let (Some(parent_key), Some(first)) = (parent_key, records.first()) {
            check_key_match(parent_key, first)?;
        }
        return Ok(());
    }

    let entries = decode_entries(&block.payload)?;
    for w in entries.windows(2) {
        if w[1].key <= w[0].key {
            return Err(ZssError::corrupt("unsorted records"));
        }
        if w[1].child_offset <= w[0].child_offset {
            return Err(ZssError::corrupt("unsorted offsets"));
        }
    }
    if let (Some(parent_key), Some(first)) = (parent_key, entries.first()) {
        check_key_match(parent_key, &first.key)?;
    }

    let child_expected_level = actual_level.checked_sub(1);
    for entry in &entries {
        walk(
            transport,
            codec,
            entry.child_offset,
            entry.child_length,
            child_expected_level,
            Some(&entry.key),
            referenced,
        )?;
    }

    Ok(())
}

fn check_key_match(parent_key: &[u8], child_first: &[u8]) -> Result<(), ZssError> {
    if parent_key > child_first {
        Err(ZssError::corrupt("too large for block"))
    } else if parent_key < child_first {
        Err(ZssError::corrupt("too small for block"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::encode_envelope;
    use crate::codec::CodecId;
    use crate::header::encode_header;
    use crate::index::{encode_entries, IndexEntry};
    use crate::leaf::encode_records;
    use serde_json::json;

    struct MemTransport(Vec<u8>);
    impl Transport for MemTransport {
        fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>, ZssError> {
            let o = offset as usize;
            let l = length as usize;
            if o + l > self.0.len() {
                return Err(ZssError::corrupt("unexpected EOF"));
            }
            Ok(self.0[o..o + l].to_vec())
        }
        fn length(&self) -> Result<u64, ZssError> {
            Ok(self.0.len() as u64)
        }
    }

    /// Builds a two-leaf `letters`-style file: one index block at level 1
    /// pointing at two data blocks ("b","bb") and ("d","dd").
    fn build_valid_file() -> Vec<u8> {
        let leaf_a = encode_records(&[b"b".to_vec(), b"bb".to_vec()]);
        let leaf_b = encode_records(&[b"d".to_vec(), b"dd".to_vec()]);
        let env_a = encode_envelope(0, &leaf_a);
        let env_b = encode_envelope(0, &leaf_b);
        let mut body = Vec::new();

        // Header length doesn't depend on the offsets/lengths it stores (all
        // fixed-width or the same varint width for these fixtures), so a
        // throwaway header establishes `header_len` before real offsets are
        // known.
        let probe_header = encode_header(0, [0u8; 32], CodecId::None, &json!({}), 0, 1);
        let header_len = probe_header.len() as u64;

        let offset_a = header_len;
        let offset_b = offset_a + env_a.len() as u64;
        let index_payload = encode_entries(&[
            IndexEntry { key: b"b".to_vec(), child_offset: offset_a, child_length: env_a.len() as u64 },
            IndexEntry { key: b"d".to_vec(), child_offset: offset_b, child_length: env_b.len() as u64 },
        ]);
        let env_index = encode_envelope(1, &index_payload);
        let offset_index = offset_b + env_b.len() as u64;

        let mut hasher = Sha256::new();
        hasher.update(&env_a);
        hasher.update(&env_b);
        let data_sha256: [u8; 32] = hasher.finalize().into();

        let total_len = offset_index + env_index.len() as u64;
        let header = encode_header(
            total_len,
            data_sha256,
            CodecId::None,
            &json!({}),
            offset_index,
            env_index.len() as u64,
        );
        assert_eq!(header.len() as u64, header_len);

        body.extend(header);
        body.extend(env_a);
        body.extend(env_b);
        body.extend(env_index);
        body
    }

    fn parsed(buf: Vec<u8>) -> (MemTransport, Header) {
        let t = MemTransport(buf);
        let header = crate::header::parse(&t, crate::header::DEFAULT_HEADER_SIZE_GUESS).unwrap();
        (t, header)
    }

    #[test]
    fn valid_file_passes() {
        let (t, header) = parsed(build_valid_file());
        validate(&t, &header).unwrap();
    }

    #[test]
    fn tampered_data_hash_is_detected() {
        let (t, mut header) = parsed(build_valid_file());
        header.data_sha256[0] ^= 0xff;
        let err = validate(&t, &header).unwrap_err();
        assert!(err.is_corrupt_containing("data hash mismatch"));
    }

    #[test]
    fn unreferenced_block_is_detected() {
        let mut buf = build_valid_file();
        // Append a spurious, well-formed but unreferenced data block.
        let stray = encode_envelope(0, &encode_records(&[b"z".to_vec()]));
        let total_len = buf.len() as u64 + stray.len() as u64;
        buf.extend(stray);

        // Patch total_file_length in the header to keep the length check happy.
        // total_file_length sits at byte offset 8..16.
        buf[8..16].copy_from_slice(&total_len.to_le_bytes());
        // Header checksum now needs recomputation too; rebuild via parse
        // bypass — this test only exercises the validator, not the header
        // checksum, so we recompute it in place.
        let (t, header) = parsed(rebuild_header_checksum(buf));
        let err = validate(&t, &header).unwrap_err();
        assert!(err.is_corrupt_containing("unreferenced"));
    }

    /// Test-only helper: after mutating a buffer's fixed fields, recompute
    /// and rewrite the trailing header checksum so the header still parses.
    fn rebuild_header_checksum(mut buf: Vec<u8>) -> Vec<u8> {
        // Re-derive header_len the same way the header parser would, by
        // parsing just far enough to find the checksum's position: reuse
        // the real parser's prefix logic isn't exposed, so instead we
        // locate it by re-building an equivalent header from scratch.
        // Simpler: the checksum covers bytes [0, header_len-8); header_len
        // is the same as for `build_valid_file` since only body bytes
        // changed. We recover it by probing with the original header length
        // via a throwaway parse against the unmodified region.
        let header_len = {
            let t = MemTransport(buf.clone());
            // A direct parse will fail here only if total_file_length or
            // checksum mismatches, neither of which affects header_len
            // detection since that's derived purely from the metadata
            // varint + fixed offsets, computed before checksum comparison.
            crate::header::parse(&t, crate::header::DEFAULT_HEADER_SIZE_GUESS)
                .map(|h| h.header_len)
                .unwrap_or_else(|_| probe_header_len(&buf))
        };
        let checksum = crate::checksum::checksum64(&buf[..header_len as usize - 8]);
        buf[header_len as usize - 8..header_len as usize].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    fn probe_header_len(buf: &[u8]) -> u64 {
        // Fixed prefix (64) + metadata varint + metadata bytes + 8 (offset)
        // + root_len varint + 8 (checksum). Metadata is `{}` (2 bytes) with
        // a 1-byte varint length prefix in every test fixture here.
        let fixed = 8 + 8 + 32 + 16;
        let (metadata_len, vlen) = crate::varint::read_varint_buf(&buf[fixed..]).unwrap();
        let mut cursor = fixed + vlen + metadata_len as usize;
        cursor += 8; // root_index_offset
        let (_, vlen2) = crate::varint::read_varint_buf(&buf[cursor..]).unwrap();
        cursor += vlen2;
        cursor += 8; // checksum
        cursor as u64
    }

    #[test]
    fn too_large_parent_key_is_detected() {
        let leaf_a = encode_records(&[b"b".to_vec()]);
        let env_a = encode_envelope(0, &leaf_a);
        let probe_header = encode_header(0, [0u8; 32], CodecId::None, &json!({}), 0, 1);
        let header_len = probe_header.len() as u64;
        let offset_a = header_len;

        // Parent key "c" is strictly greater than the child's real first record "b".
        let index_payload = encode_entries(&[IndexEntry {
            key: b"c".to_vec(),
            child_offset: offset_a,
            child_length: env_a.len() as u64,
        }]);
        let env_index = encode_envelope(1, &index_payload);
        let offset_index = offset_a + env_a.len() as u64;

        let mut hasher = Sha256::new();
        hasher.update(&env_a);
        let data_sha256: [u8; 32] = hasher.finalize().into();
        let total_len = offset_index + env_index.len() as u64;
        let header = encode_header(
            total_len,
            data_sha256,
            CodecId::None,
            &json!({}),
            offset_index,
            env_index.len() as u64,
        );

        let mut buf = Vec::new();
        buf.extend(header);
        buf.extend(env_a);
        buf.extend(env_index);

        let (t, header) = parsed(buf);
        let err = validate(&t, &header).unwrap_err();
        assert!(err.is_corrupt_containing("too large for block"));
    }
}
