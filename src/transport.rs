//! Byte-range transports: local files and HTTP range requests.
//!
//! Everything above this layer — the header parser, block reader, search
//! driver, decode pipeline — only ever asks a [`Transport`] for "give me
//! `length` bytes starting at `offset`" or "how long is this file". Local
//! files and HTTP servers answer that question differently but the rest of
//! the reader never needs to know which one it's talking to.

use crate::error::ZssError;
use std::fs::File;
use std::io::Read;
use std::sync::Mutex;

#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// A source of random-access, read-only bytes.
pub trait Transport: Send + Sync {
    /// Read exactly `length` bytes starting at `offset`.
    ///
    /// Short reads (the underlying source ran out of data before `length`
    /// bytes were produced) surface as `ZssError::corrupt("unexpected
    /// EOF")` rather than an `Io` error, since a `.zss` file is immutable
    /// and a short read means the declared lengths in the header or an
    /// index entry don't match what's actually on disk.
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>, ZssError>;

    /// Total length of the underlying data, in bytes.
    fn length(&self) -> Result<u64, ZssError>;
}

/// Local-file transport. Uses positioned reads (`pread`) on unix so that a
/// single open `File` can be shared across decode-pipeline worker threads
/// without a seek/read race; on other platforms falls back to a mutex
/// around seek+read, matching the serial path's behavior.
pub struct FileTransport {
    file: File,
    #[cfg(not(unix))]
    seek_lock: Mutex<()>,
    len: u64,
}

impl FileTransport {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, ZssError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            #[cfg(not(unix))]
            seek_lock: Mutex::new(()),
            len,
        })
    }

    pub fn from_file(file: File) -> Result<Self, ZssError> {
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            #[cfg(not(unix))]
            seek_lock: Mutex::new(()),
            len,
        })
    }
}

impl Transport for FileTransport {
    #[cfg(unix)]
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>, ZssError> {
        let mut buf = vec![0u8; length as usize];
        self.file
            .read_exact_at(&mut buf, offset)
            .map_err(|_| ZssError::corrupt("unexpected EOF"))?;
        Ok(buf)
    }

    #[cfg(not(unix))]
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>, ZssError> {
        use std::io::{Seek, SeekFrom};
        let _guard = self.seek_lock.lock().unwrap();
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf)
            .map_err(|_| ZssError::corrupt("unexpected EOF"))?;
        Ok(buf)
    }

    fn length(&self) -> Result<u64, ZssError> {
        Ok(self.len)
    }
}

/// HTTP byte-range transport, backed by a blocking `ureq` client.
///
/// Built once via [`HttpTransport::open`], which performs a single probe
/// request to learn the resource's total length and whether the server
/// honors `Range` requests at all (`Accept-Ranges: bytes`, or a `206`
/// response to an actual ranged GET — some servers omit the advertising
/// header but still honor the request). A server that does neither is
/// reported as a transport error up front rather than failing confusingly
/// on the first real read.
pub struct HttpTransport {
    agent: ureq::Agent,
    url: String,
    len: u64,
}

impl HttpTransport {
    pub fn open(url: impl Into<String>) -> Result<Self, ZssError> {
        let url = url.into();
        let agent = ureq::AgentBuilder::new().build();

        let head = agent
            .head(&url)
            .call()
            .map_err(|e| ZssError::Transport(format!("HEAD {url} failed: {e}")))?;

        let len: u64 = head
            .header("Content-Length")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| {
                ZssError::Transport(format!("{url}: server did not report Content-Length"))
            })?;

        let accepts_ranges = head
            .header("Accept-Ranges")
            .map(|v| v.eq_ignore_ascii_case("bytes"))
            .unwrap_or(false);

        if !accepts_ranges {
            // Some servers don't advertise Accept-Ranges but still honor
            // Range requests; probe with a tiny ranged GET before giving up.
            let probe_len = len.min(1);
            if probe_len == 0 {
                return Err(ZssError::Transport(format!(
                    "{url}: server does not advertise byte-range support and file is empty"
                )));
            }
            let resp = agent
                .get(&url)
                .set("Range", &format!("bytes=0-{}", probe_len - 1))
                .call()
                .map_err(|e| ZssError::Transport(format!("ranged GET probe on {url} failed: {e}")))?;
            if resp.status() != 206 {
                return Err(ZssError::Transport(format!(
                    "{url}: server does not support HTTP byte-range requests"
                )));
            }
        }

        Ok(Self { agent, url, len })
    }
}

impl Transport for HttpTransport {
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>, ZssError> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let last = offset + length - 1;
        let resp = self
            .agent
            .get(&self.url)
            .set("Range", &format!("bytes={offset}-{last}"))
            .call()
            .map_err(|e| ZssError::Transport(format!("ranged GET on {} failed: {e}", self.url)))?;

        if resp.status() != 206 && resp.status() != 200 {
            return Err(ZssError::Transport(format!(
                "{}: unexpected status {} for ranged GET",
                self.url,
                resp.status()
            )));
        }

        let mut buf = Vec::with_capacity(length as usize);
        resp.into_reader()
            .take(length)
            .read_to_end(&mut buf)
            .map_err(|e| ZssError::Transport(format!("reading ranged response body: {e}")))?;

        if buf.len() as u64 != length {
            return Err(ZssError::corrupt("unexpected EOF"));
        }
        Ok(buf)
    }

    fn length(&self) -> Result<u64, ZssError> {
        Ok(self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_transport_reads_exact_ranges() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        tmp.flush().unwrap();
        let transport = FileTransport::open(tmp.path()).unwrap();
        assert_eq!(transport.length().unwrap(), 10);
        assert_eq!(transport.read(2, 4).unwrap(), b"2345");
    }

    #[test]
    fn file_transport_short_read_is_corrupt() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"short").unwrap();
        tmp.flush().unwrap();
        let transport = FileTransport::open(tmp.path()).unwrap();
        let err = transport.read(0, 100).unwrap_err();
        assert!(err.is_corrupt_containing("unexpected EOF"));
    }
}
