//! Fast 64-bit non-cryptographic checksum used for block envelopes and the
//! file header.
//!
//! This is a first-party format constant: ZSS has no legacy files to stay
//! bit-compatible with, so the only requirement is to apply one algorithm
//! uniformly. xxh3-64 is used throughout.

use xxhash_rust::xxh3::xxh3_64;

/// Checksum of `bytes`, stored on disk as 8 little-endian bytes.
#[inline]
pub fn checksum64(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}
