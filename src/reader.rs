//! Public reader facade.
//!
//! `Reader` owns a parsed [`Header`], the transport, and a cancellation
//! flag shared with every in-flight decode pipeline — the same "facade over
//! a DAG of owned pieces" shape as the teacher's `Archive`, minus the write
//! path (§5).

use crate::block::{read_block_at, BlockLevel};
use crate::codec::CodecId;
use crate::error::{Result, ZssError};
use crate::header::{self, Header};
use crate::leaf::decode_records;
use crate::options::ReaderOptions;
use crate::pipeline;
use crate::search::{self, Bounds, LeafRef};
use crate::transport::{FileTransport, HttpTransport, Transport};
use crate::validate;
use log::debug;
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct ReaderInner {
    transport: Arc<dyn Transport>,
    header: Header,
    root_level: BlockLevel,
    options: ReaderOptions,
    closed: Arc<AtomicBool>,
}

/// An open `.zss` file or HTTP resource.
///
/// Cheap to clone (an `Arc` around the shared state); every clone shares one
/// cancellation flag, so calling [`Reader::close`] on any clone closes all of
/// them — the same semantics as closing a shared file descriptor.
#[derive(Clone)]
pub struct Reader {
    inner: Arc<ReaderInner>,
}

impl Reader {
    /// Open a local file.
    pub fn open(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self> {
        let transport = FileTransport::open(path)?;
        Self::from_transport(Arc::new(transport), options)
    }

    /// Open an HTTP(S) resource, using ranged GETs for every read.
    pub fn open_url(url: impl Into<String>, options: ReaderOptions) -> Result<Self> {
        let transport = HttpTransport::open(url)?;
        Self::from_transport(Arc::new(transport), options)
    }

    fn from_transport(transport: Arc<dyn Transport>, options: ReaderOptions) -> Result<Self> {
        let size_guess = header::header_size_guess(options.header_size_guess);
        let header = header::parse(transport.as_ref(), size_guess)?;
        debug!(
            "opened zss file: codec={} root_index=({}, {}) total_len={}",
            header.codec.name(),
            header.root_index_offset,
            header.root_index_length,
            header.total_file_length
        );

        let root_block = read_block_at(
            transport.as_ref(),
            header.root_index_offset,
            Some(header.root_index_length),
            header.codec,
        )?;

        Ok(Self {
            inner: Arc::new(ReaderInner {
                transport,
                header,
                root_level: root_block.level,
                options,
                closed: Arc::new(AtomicBool::new(false)),
            }),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ZssError::Closed);
        }
        Ok(())
    }

    /// Stop accepting new work; in-flight iterators raise [`ZssError::Closed`]
    /// on their next `next()` call. Idempotent.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    pub fn metadata(&self) -> &Value {
        &self.inner.header.metadata
    }

    pub fn codec_name(&self) -> &'static str {
        self.inner.header.codec.name()
    }

    pub fn total_file_length(&self) -> u64 {
        self.inner.header.total_file_length
    }

    pub fn data_sha256(&self) -> [u8; 32] {
        self.inner.header.data_sha256
    }

    pub fn root_index_offset(&self) -> u64 {
        self.inner.header.root_index_offset
    }

    pub fn root_index_length(&self) -> u64 {
        self.inner.header.root_index_length
    }

    /// The root block's level — `0` if the entire file fits in a single data
    /// block, otherwise the height of the tree.
    pub fn root_index_level(&self) -> u8 {
        self.inner.root_level.as_u8()
    }

    /// Walk the full tree and cross-check it against `data_sha256`, per §4.9.
    pub fn validate(&self) -> Result<()> {
        self.check_open()?;
        validate::validate(self.inner.transport.as_ref(), &self.inner.header)
    }

    fn leaf_refs(&self, start: Option<&[u8]>, stop: Option<&[u8]>, prefix: Option<&[u8]>) -> Result<(Vec<LeafRef>, Bounds)> {
        let bounds = search::normalize_bounds(start, stop, prefix);
        let refs = search::collect_leaf_refs(
            self.inner.transport.as_ref(),
            self.inner.header.codec,
            self.inner.header.root_index_offset,
            self.inner.header.root_index_length,
            self.inner.root_level,
            &bounds,
        )?;
        Ok((refs, bounds))
    }

    fn workers(&self) -> usize {
        self.inner.options.parallelism.resolve()
    }

    /// Decoded records per candidate leaf block, in block order, with no
    /// exact filtering against `start`/`stop`/`prefix` — a block can contain
    /// records outside the query range at its edges (§4.8). Exact filtering
    /// happens in [`Reader::search`].
    pub fn sloppy_block_search(
        &self,
        start: Option<&[u8]>,
        stop: Option<&[u8]>,
        prefix: Option<&[u8]>,
    ) -> Result<Box<dyn Iterator<Item = Result<Vec<Vec<u8>>>> + Send>> {
        self.check_open()?;
        let (refs, _bounds) = self.leaf_refs(start, stop, prefix)?;
        Ok(pipeline::run(
            Arc::clone(&self.inner.transport),
            self.inner.header.codec,
            refs,
            self.workers(),
            Arc::clone(&self.inner.closed),
            |payload| decode_records(&payload).map_err(ZssError::from),
            |records| records,
        ))
    }

    /// Apply `f` to each candidate leaf block's decoded records (sloppy, not
    /// exact-filtered), in block order, across the configured number of
    /// decode worker threads.
    pub fn sloppy_block_map<R, F>(
        &self,
        start: Option<&[u8]>,
        stop: Option<&[u8]>,
        prefix: Option<&[u8]>,
        f: F,
    ) -> Result<Box<dyn Iterator<Item = Result<R>> + Send>>
    where
        F: Fn(Vec<Vec<u8>>) -> R + Send + Sync + 'static,
        R: Send + 'static,
    {
        self.check_open()?;
        let (refs, _bounds) = self.leaf_refs(start, stop, prefix)?;
        Ok(pipeline::run(
            Arc::clone(&self.inner.transport),
            self.inner.header.codec,
            refs,
            self.workers(),
            Arc::clone(&self.inner.closed),
            |payload| decode_records(&payload).map_err(ZssError::from),
            f,
        ))
    }

    /// Like [`Reader::sloppy_block_map`], but runs single-threaded and takes
    /// an `FnMut` rather than a `Fn + Send + Sync` — for callbacks that
    /// close over non-`Send` state (a `RefCell`, a non-thread-safe writer)
    /// and so can never be handed to a worker thread regardless of the
    /// reader's configured parallelism.
    pub fn sloppy_block_map_serial<R, F>(
        &self,
        start: Option<&[u8]>,
        stop: Option<&[u8]>,
        prefix: Option<&[u8]>,
        mut f: F,
    ) -> Result<Vec<R>>
    where
        F: FnMut(Vec<Vec<u8>>) -> R,
    {
        self.check_open()?;
        let (refs, _bounds) = self.leaf_refs(start, stop, prefix)?;
        let blocks = pipeline::run(
            Arc::clone(&self.inner.transport),
            self.inner.header.codec,
            refs,
            0,
            Arc::clone(&self.inner.closed),
            |payload| decode_records(&payload).map_err(ZssError::from),
            |records| records,
        );
        let mut out = Vec::new();
        for records in blocks {
            out.push(f(records?));
        }
        Ok(out)
    }

    /// Like [`Reader::sloppy_block_map`] but for side effects: drains the
    /// pipeline itself and discards `f`'s return value, stopping at the
    /// first error.
    pub fn sloppy_block_exec<F>(
        &self,
        start: Option<&[u8]>,
        stop: Option<&[u8]>,
        prefix: Option<&[u8]>,
        f: F,
    ) -> Result<()>
    where
        F: Fn(Vec<Vec<u8>>) + Send + Sync + 'static,
    {
        let iter = self.sloppy_block_map(start, stop, prefix, move |records| {
            f(records);
        })?;
        for item in iter {
            item?;
        }
        Ok(())
    }

    /// Exact-filtered record search over `[start, stop)` intersected with
    /// `prefix`, yielding records strictly in sorted order.
    pub fn search(
        &self,
        start: Option<&[u8]>,
        stop: Option<&[u8]>,
        prefix: Option<&[u8]>,
    ) -> Result<Box<dyn Iterator<Item = Result<Vec<u8>>> + Send>> {
        self.check_open()?;
        let (refs, bounds) = self.leaf_refs(start, stop, prefix)?;
        let blocks = pipeline::run(
            Arc::clone(&self.inner.transport),
            self.inner.header.codec,
            refs,
            self.workers(),
            Arc::clone(&self.inner.closed),
            |payload| decode_records(&payload).map_err(ZssError::from),
            |records| records,
        );
        Ok(Box::new(FilteredSearch { blocks, bounds, current: Vec::new().into_iter() }))
    }

    /// Write every record in `[start, stop)` ∩ `prefix` to `writer`, each
    /// followed by `terminator` — the CLI's `dump` subcommand.
    pub fn dump(
        &self,
        start: Option<&[u8]>,
        stop: Option<&[u8]>,
        prefix: Option<&[u8]>,
        terminator: u8,
        writer: &mut dyn Write,
    ) -> Result<()> {
        for record in self.search(start, stop, prefix)? {
            let record = record?;
            writer.write_all(&record)?;
            writer.write_all(&[terminator])?;
        }
        Ok(())
    }
}

struct FilteredSearch {
    blocks: Box<dyn Iterator<Item = Result<Vec<Vec<u8>>>> + Send>,
    bounds: Bounds,
    current: std::vec::IntoIter<Vec<u8>>,
}

impl Iterator for FilteredSearch {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.current.next() {
                if self.bounds.contains(&record) {
                    return Some(Ok(record));
                }
                continue;
            }
            match self.blocks.next()? {
                Ok(records) => self.current = records.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
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
    use sha2::{Digest, Sha256};
    use std::io::Write as _;

    fn letters_file() -> Vec<u8> {
        let mut groups = Vec::new();
        let letters = "bdfhjlnprtvxz";
        for c in letters.chars() {
            groups.push(vec![c.to_string().into_bytes(), format!("{c}{c}").into_bytes()]);
        }

        let probe_header = encode_header(0, [0u8; 32], CodecId::None, &json!({"fixture": "letters"}), 0, 1);
        let mut offset = probe_header.len() as u64;
        let mut body = Vec::new();
        let mut entries = Vec::new();
        let mut hasher = Sha256::new();

        for group in &groups {
            let payload = encode_records(group);
            let envelope = encode_envelope(0, &payload);
            hasher.update(&envelope);
            entries.push(IndexEntry {
                key: group[0].clone(),
                child_offset: offset,
                child_length: envelope.len() as u64,
            });
            offset += envelope.len() as u64;
            body.extend(envelope);
        }

        let index_payload = encode_entries(&entries);
        let index_envelope = encode_envelope(1, &index_payload);
        let index_offset = offset;
        body.extend(&index_envelope);
        let total_len = index_offset + index_envelope.len() as u64;

        let data_sha256: [u8; 32] = hasher.finalize().into();
        let header = encode_header(
            total_len,
            data_sha256,
            CodecId::None,
            &json!({"fixture": "letters"}),
            index_offset,
            index_envelope.len() as u64,
        );

        let mut file = Vec::new();
        file.extend(header);
        file.extend(body);
        file
    }

    fn open_letters() -> Reader {
        let path = write_temp(letters_file());
        Reader::open(path, ReaderOptions::default()).unwrap()
    }

    fn write_temp(buf: Vec<u8>) -> std::path::PathBuf {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&buf).unwrap();
        tmp.flush().unwrap();
        tmp.into_temp_path().keep().unwrap()
    }

    #[test]
    fn full_scan_returns_every_record_in_order() {
        let reader = open_letters();
        let records: Vec<Vec<u8>> = reader.search(None, None, None).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 26);
        assert!(records.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn start_bound_scan_skips_earlier_records() {
        let reader = open_letters();
        let records: Vec<Vec<u8>> =
            reader.search(Some(b"h"), None, None).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(records.first().unwrap(), b"h");
        assert!(records.iter().all(|r| r.as_slice() >= b"h".as_slice()));
    }

    #[test]
    fn prefix_scan_is_bounded_to_successor() {
        let reader = open_letters();
        let records: Vec<Vec<u8>> =
            reader.search(None, None, Some(b"d")).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(records, vec![b"d".to_vec(), b"dd".to_vec()]);
    }

    #[test]
    fn dump_writes_terminated_records() {
        let reader = open_letters();
        let mut out = Vec::new();
        reader.dump(Some(b"b"), Some(b"e"), None, 0, &mut out).unwrap();
        assert_eq!(out, b"b\0bb\0d\0dd\0".to_vec());
    }

    #[test]
    fn validate_accepts_a_well_formed_file() {
        let reader = open_letters();
        reader.validate().unwrap();
    }

    #[test]
    fn closed_reader_rejects_new_calls() {
        let reader = open_letters();
        reader.close();
        let err = reader.search(None, None, None).unwrap_err();
        assert!(matches!(err, ZssError::Closed));
    }

    #[test]
    fn sloppy_block_search_yields_whole_blocks_unfiltered() {
        let reader = open_letters();
        let blocks: Vec<Vec<Vec<u8>>> =
            reader.sloppy_block_search(Some(b"c"), Some(b"e"), None).unwrap().collect::<Result<_>>().unwrap();
        // "c" falls inside the ("b","bb") block's range, so that whole block
        // is a candidate even though neither of its records is >= "c".
        assert!(blocks.iter().any(|b| b.contains(&b"b".to_vec())));
    }
}
