//! Structured errors: every fallible operation in this crate returns
//! `Result<T, Error>`, where `Error` carries an operation name, the
//! offending path (when there is one), and a `kind` (see SPEC_FULL §4.8/§7).

use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// A single crate error: what operation failed, on what path, and why.
#[derive(Debug)]
pub struct Error {
    pub op: &'static str,
    pub path: Option<String>,
    pub kind: ErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(op: &'static str, kind: ErrorKind) -> Self {
        Error { op, path: None, kind, source: None }
    }

    pub fn with_path(op: &'static str, path: impl Into<String>, kind: ErrorKind) -> Self {
        Error { op, path: Some(path.into()), kind, source: None }
    }

    /// Wrap an I/O error with the operation/path context that caused it.
    /// Deliberately not a blanket `From<io::Error>` impl: every I/O failure
    /// site in this crate already knows its operation and path, and a
    /// blanket conversion would throw that context away (see DESIGN.md).
    pub fn io(op: &'static str, path: Option<impl Into<String>>, e: io::Error) -> Self {
        Error {
            op,
            path: path.map(Into::into),
            kind: ErrorKind::Io,
            source: Some(Box::new(e)),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {}: {}", self.op, path, self.kind),
            None => write!(f, "{}: {}", self.op, self.kind),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|b| b.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// The kind of failure, independent of which operation hit it.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("not a package (bad signature)")]
    BadSignature,
    #[error("package not closed (prebuild signature)")]
    NotClosed,
    #[error("unsupported {field} width: {got}")]
    UnsupportedWidth { field: &'static str, got: u8 },
    #[error("truncated tagset")]
    Truncated,
    #[error("malformed ftt terminator")]
    BadTerminator,
    #[error("tagset missing required tag {0}")]
    MissingTag(&'static str),
    #[error("duplicate path key")]
    DuplicateKey,
    #[error("data region offset/size out of bounds")]
    OutOfBounds,
    #[error("type-size mismatch with in-memory configuration")]
    SizeMismatch,
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("invalid path")]
    InvalidPath,
    #[error("tag {tid} exceeds max length {max}")]
    TagTooLarge { tid: u32, max: u64 },
    #[error("writer already synced")]
    WriterClosed,
    #[error("io error")]
    Io,
}
