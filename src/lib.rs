//! # zss — sorted record container format reference implementation
//!
//! Format guarantees (§3):
//! - All numeric fields are little-endian
//! - The file is immutable once written; there is no append or in-place edit
//! - Every block is self-describing: an inner-length varint, a level byte,
//!   and a mandatory xxh3-64 checksum over `level || payload`
//! - The codec is a single closed-set name stored once in the header —
//!   `none`, `deflate`, `bz2`, or `lzma` — never negotiated per block
//! - The block region is a B+-tree-shaped index over sorted records; the
//!   full block list is reconstructible by scanning forward from the end of
//!   the header without the index, which the validator (§4.9) relies on
//! - Levels `1..=63` are index blocks, `0` is a data (leaf) block, and
//!   `>63` is a reserved extension block skipped on read

pub mod block;
pub mod checksum;
pub mod codec;
pub mod error;
pub mod header;
pub mod index;
pub mod leaf;
pub mod options;
pub mod pipeline;
pub mod reader;
pub mod search;
pub mod transport;
pub mod validate;
pub mod varint;

pub use codec::CodecId;
pub use error::{Corrupt, Result, ZssError};
pub use header::Header;
pub use options::{Parallelism, ReaderOptions};
pub use reader::Reader;
pub use transport::{FileTransport, HttpTransport, Transport};
