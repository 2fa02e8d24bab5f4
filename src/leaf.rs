//! Data (leaf) block payload: a sorted sequence of records stored with
//! shared-prefix compression.
//!
//! Each record is encoded as `<shared_prefix_len: varint><suffix_len:
//! varint><suffix_bytes>`, where `shared_prefix_len` is measured against the
//! immediately preceding record (zero for the first). Records must be
//! strictly nondecreasing; that invariant is enforced by the validator, not
//! by the decoder, since a reader must still be able to surface "unsorted
//! records" as a corruption rather than silently fix it up.

use crate::error::Corrupt;
use crate::varint::read_varint_buf;

/// Decode a data block payload into its constituent records, in on-disk
/// order (already sorted in a valid file).
pub fn decode_records(payload: &[u8]) -> Result<Vec<Vec<u8>>, Corrupt> {
    let mut records = Vec::new();
    let mut prev: Vec<u8> = Vec::new();
    let mut pos = 0usize;

    while pos < payload.len() {
        let (shared_len, n1) = read_varint_buf(&payload[pos..])?;
        pos += n1;
        let (suffix_len, n2) = read_varint_buf(&payload[pos..])?;
        pos += n2;

        let shared_len = shared_len as usize;
        let suffix_len = suffix_len as usize;
        if shared_len > prev.len() {
            return Err(Corrupt::new("unexpectedly ran out of data"));
        }
        if pos + suffix_len > payload.len() {
            return Err(Corrupt::new("past end of block"));
        }

        let mut record = Vec::with_capacity(shared_len + suffix_len);
        record.extend_from_slice(&prev[..shared_len]);
        record.extend_from_slice(&payload[pos..pos + suffix_len]);
        pos += suffix_len;

        prev = record.clone();
        records.push(record);
    }

    Ok(records)
}

/// Encode a sorted record list with shared-prefix compression. Used by test
/// fixtures across the crate to build in-memory data-block payloads.
#[cfg(test)]
pub fn encode_records(records: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut prev: &[u8] = &[];
    for record in records {
        let shared = prev.iter().zip(record.iter()).take_while(|(a, b)| a == b).count();
        let suffix = &record[shared..];
        out.extend(crate::varint::encode_varint(shared as u64));
        out.extend(crate::varint::encode_varint(suffix.len() as u64));
        out.extend_from_slice(suffix);
        prev = record;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_shared_prefix_records() {
        let records: Vec<Vec<u8>> = ["b", "bb", "d", "dd", "f"]
            .iter()
            .map(|s| s.as_bytes().to_vec())
            .collect();
        let payload = encode_records(&records);
        let decoded = decode_records(&payload).unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn empty_payload_decodes_to_no_records() {
        assert_eq!(decode_records(&[]).unwrap(), Vec::<Vec<u8>>::new());
    }

    #[test]
    fn shared_len_exceeding_previous_record_is_corrupt() {
        let mut payload = crate::varint::encode_varint(5); // shared_len too large
        payload.extend(crate::varint::encode_varint(1));
        payload.push(b'x');
        let err = decode_records(&payload).unwrap_err();
        assert!(err.to_string().contains("unexpectedly ran out of data"));
    }
}
