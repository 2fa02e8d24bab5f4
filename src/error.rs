//! Error types for the ZSS reader.
//!
//! Two families, per the format's error handling design: [`Corrupt`] for any
//! violation of the on-disk contract (always fatal, never retried) and the
//! remaining [`ZssError`] variants for operational failures (closed reader,
//! bad arguments, transport failures).

use std::fmt;
use thiserror::Error;

/// A corruption error. Carries a human-readable message containing a stable
/// fragment (documented in the format's testable-properties table) so
/// callers and tests can match on it with `.to_string().contains(fragment)`.
#[derive(Error, Debug, Clone)]
pub struct Corrupt {
    message: String,
}

impl Corrupt {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for Corrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Error, Debug)]
pub enum ZssError {
    #[error("corrupt ZSS file: {0}")]
    Corrupt(#[from] Corrupt),

    #[error("reader is closed")]
    Closed,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP transport error: {0}")]
    Transport(String),
}

impl ZssError {
    pub fn corrupt(message: impl Into<String>) -> Self {
        ZssError::Corrupt(Corrupt::new(message))
    }

    /// True if this error is a [`Corrupt`] whose message contains `fragment`.
    pub fn is_corrupt_containing(&self, fragment: &str) -> bool {
        matches!(self, ZssError::Corrupt(c) if c.message.contains(fragment))
    }
}

// Workers need to move a corruption error across threads and clone it into
// the reorder buffer's slot if it's ever inspected twice; ZssError itself
// isn't Clone (io::Error isn't), so the decode pipeline stores `Corrupt`
// directly where possible and only ever produces a terminal ZssError once
// per sequence slot.
pub type Result<T> = std::result::Result<T, ZssError>;
