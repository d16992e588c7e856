//! The `Tagger` capability: three backends (bulk/mmap/fsys) that all turn a
//! tagset's `(offset, size)` into a readable, seekable window over the data
//! region (§4.5).

pub mod bulk;
pub mod fsys;
pub mod mmap;

use std::io::{Read, Seek};

use crate::error::Result;
use crate::tagset::Tagset;

pub use bulk::BulkTagger;
pub use fsys::FsysTagger;
pub use mmap::MmapTagger;

/// Which backend a `Package` should use to read file bodies. Selected at
/// `Open` time; see `package::OpenOptions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Read the whole data region into memory once.
    Bulk,
    /// Map `[offset, offset+size)` windows on demand.
    #[default]
    Mmap,
    /// Seek-and-read over one shared file descriptor.
    Fsys,
}

/// A read-only, file-like view into one tagged region of the data (§4.5
/// GLOSSARY). Backends return this boxed so `Package` can stay generic over
/// which one it picked.
pub trait NestedFile: Read + Seek {
    /// The region's declared length, independent of the current seek
    /// position.
    fn size(&self) -> u64;

    /// Release whatever this file holds onto (an mmap, mostly). A no-op for
    /// backends with nothing per-file to release.
    fn close(&mut self) -> Result<()>;
}

/// The capability a `Package` holds exactly one of: open a tagset's data as
/// a `NestedFile`, and close whatever shared resource backs it (§4.5,
/// "Handle policy").
pub trait Tagger: Send + Sync {
    fn open_tagset(&self, ts: &Tagset) -> Result<Box<dyn NestedFile>>;

    /// Release the backend's shared OS handle, if it owns one. Called once
    /// by `Package::close` / `Drop`.
    fn close(&self) -> Result<()>;
}
