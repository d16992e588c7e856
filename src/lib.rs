//! WPK: a self-contained archive format and read-only virtual filesystem.
//!
//! A WPK package stitches many input files into one on-disk container (the
//! "file-tag table", or FTT, plus a data region) and exposes them back as a
//! flat, path-keyed virtual filesystem. See `SPEC_FULL.md` at the repo root
//! for the full design.

pub mod error;
pub mod primitive;
pub mod tagid;
pub mod tag;
pub mod tagset;
pub mod header;
pub mod ftt;
pub mod reader;
pub mod writer;
pub mod package;
pub mod union;

pub use error::{Error, ErrorKind, Result};
pub use header::{Header, TypeSize};
pub use tag::{Tag, TagValue, TagTime};
pub use tagset::{FileInfo, Tagset};
pub use ftt::Ftt;
pub use writer::{Writer, WriterOptions};
pub use package::{Entry, OpenOptions, Package};
pub use reader::{Backend, NestedFile, Tagger};
pub use union::Union;
