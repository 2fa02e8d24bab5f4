//! Reader configuration, passed at open time. Shaped like the teacher's
//! `PackOptions`: a plain struct with a `Default` impl, not a builder.

use crate::error::ZssError;

/// How many worker threads the decode pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    /// Fully synchronous in the caller's thread — no worker threads, no
    /// channel. Useful when the caller's `sloppy_block_map` callback carries
    /// non-`Send` state.
    Serial,
    /// Fixed worker count.
    Fixed(usize),
    /// Platform default (`num_cpus::get()`).
    Auto,
}

impl Parallelism {
    /// Resolve to a worker-thread count; `0` means [`Parallelism::Serial`].
    pub fn resolve(self) -> usize {
        match self {
            Parallelism::Serial => 0,
            Parallelism::Fixed(n) => n,
            Parallelism::Auto => num_cpus::get(),
        }
    }

    /// Parse from the signed-integer shape the format's configuration
    /// surface describes (`0`, positive, or `"auto"`); negative values are a
    /// configuration error.
    pub fn from_i64(n: i64) -> Result<Self, ZssError> {
        if n < 0 {
            return Err(ZssError::InvalidArgument(format!(
                "parallelism must be >= 0 or \"auto\", got {n}"
            )));
        }
        if n == 0 {
            Ok(Parallelism::Serial)
        } else {
            Ok(Parallelism::Fixed(n as usize))
        }
    }
}

impl Default for Parallelism {
    fn default() -> Self {
        Parallelism::Auto
    }
}

/// Configuration for [`crate::reader::Reader::open`] and
/// [`crate::reader::Reader::open_url`].
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    pub parallelism: Parallelism,
    /// Overrides the header parser's initial speculative read size
    /// (§4.5). `None` uses [`crate::header::DEFAULT_HEADER_SIZE_GUESS`].
    /// Exposed for tests exercising the two-phase header-read retry path.
    pub header_size_guess: Option<usize>,
    /// When opening an HTTP URL, probe for `Accept-Ranges: bytes` support
    /// before trusting the transport. Disabling this is a test-only escape
    /// hatch for servers that honor ranges without advertising them and
    /// where a synthetic test harness doesn't bother sending the header.
    pub http_probe_accept_ranges: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            parallelism: Parallelism::Auto,
            header_size_guess: None,
            http_probe_accept_ranges: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_parallelism_is_invalid_argument() {
        let err = Parallelism::from_i64(-1).unwrap_err();
        assert!(matches!(err, ZssError::InvalidArgument(_)));
    }

    #[test]
    fn zero_is_serial() {
        assert_eq!(Parallelism::from_i64(0).unwrap(), Parallelism::Serial);
    }

    #[test]
    fn positive_is_fixed() {
        assert_eq!(Parallelism::from_i64(4).unwrap(), Parallelism::Fixed(4));
    }
}
