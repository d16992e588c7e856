//! The file-tag table: an insertion-ordered map from normalized path to
//! `Tagset`, plus its on-disk load/serialize format (§4.3).

use std::io::{Read, Seek, SeekFrom};

use crate::error::{Error, ErrorKind, Result};
use crate::header::TypeSize;
use crate::primitive::{self, read_uint, write_uint, OrderedMap};
use crate::tagset::Tagset;

/// The FTT key for the package-wide info tagset (§3 Invariants).
pub const INFO_KEY: &str = "";

/// An insertion-ordered path → tagset map. Thread-safe: backed by
/// `OrderedMap`, so readers may be shared across threads once a package is
/// open (§5).
pub struct Ftt {
    sizes: TypeSize,
    map: OrderedMap<String, Tagset>,
}

impl Ftt {
    pub fn new(sizes: TypeSize) -> Self {
        Ftt { sizes, map: OrderedMap::new() }
    }

    pub fn sizes(&self) -> TypeSize {
        self.sizes
    }

    pub fn has(&self, key: &str) -> bool {
        self.map.has(&key.to_string())
    }

    pub fn get(&self, key: &str) -> Option<Tagset> {
        self.map.get(&key.to_string())
    }

    pub fn info(&self) -> Option<Tagset> {
        self.get(INFO_KEY)
    }

    /// Insert or replace the tagset under `key`, without any existence
    /// checks — callers that need "fail if it already exists" semantics
    /// (`PackData`, `PutAlias`, ...) check `has` first (see `writer.rs`).
    pub fn put(&self, key: String, ts: Tagset) {
        self.map.set(key, ts);
    }

    pub fn remove(&self, key: &str) -> Option<Tagset> {
        self.map.delete(&key.to_string())
    }

    /// Move the tagset under `old` to `new`, preserving iteration position.
    /// Returns `false` if `old` is absent or `new` is already taken.
    pub fn rekey(&self, old: &str, new: String) -> bool {
        self.map.rekey(&old.to_string(), new)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Snapshot the current `(key, tagset)` pairs, in insertion order.
    pub fn snapshot(&self) -> Vec<(String, Tagset)> {
        self.map.snapshot()
    }

    pub fn range(&self, f: impl FnMut(&String, &Tagset)) {
        self.map.range(f);
    }

    /// All non-info keys whose normalized form starts with `prefix + '/'`,
    /// used by `Package::ReadDir` and `Union`'s synthesized directories.
    pub fn keys_under(&self, prefix: &str) -> Vec<String> {
        let needle = if prefix.is_empty() { String::new() } else { format!("{prefix}/") };
        self.snapshot()
            .into_iter()
            .filter(|(k, _)| !k.is_empty() && (needle.is_empty() || k.starts_with(&needle)))
            .map(|(k, _)| k)
            .collect()
    }

    /// Parse the FTT region of an already-open tags stream: a sequence of
    /// `(tssize-byte length)(length bytes of tagset)` records terminated by
    /// a zero-length sentinel, starting at `ftt_offset` and spanning exactly
    /// `ftt_size` bytes. Each tagset's `path` tag is normalized into its FTT
    /// key; every non-info tagset must carry `path`/`offset`/`size` with
    /// `offset`/`size` inside `[dat_offset, dat_offset + dat_size)`. A
    /// record whose declared length would run past `ftt_size`, or whose
    /// terminator lands short of it, is `ErrorKind::BadTerminator` rather
    /// than a plain truncated read.
    pub fn load<R: Read + Seek>(
        r: &mut R,
        sizes: TypeSize,
        ftt_offset: u64,
        ftt_size: u64,
        dat_offset: u64,
        dat_size: u64,
    ) -> Result<Self> {
        r.seek(SeekFrom::Start(ftt_offset)).map_err(|e| Error::io("ftt::load", None::<String>, e))?;

        let ftt = Ftt::new(sizes);
        let tssize = sizes.tssize;
        let tssize64 = tssize as u64;
        let mut consumed: u64 = 0;

        loop {
            if consumed + tssize64 > ftt_size {
                return Err(Error::new("ftt::load", ErrorKind::BadTerminator));
            }
            let mut len_buf = vec![0u8; tssize as usize];
            r.read_exact(&mut len_buf).map_err(|e| Error::io("ftt::load", None::<String>, e))?;
            let len = read_uint(tssize, &len_buf) as usize;
            consumed += tssize64;

            if len == 0 {
                if consumed != ftt_size {
                    return Err(Error::new("ftt::load", ErrorKind::BadTerminator));
                }
                break;
            }
            if consumed + len as u64 > ftt_size {
                return Err(Error::new("ftt::load", ErrorKind::BadTerminator));
            }

            let mut body = vec![0u8; len];
            r.read_exact(&mut body).map_err(|e| Error::io("ftt::load", None::<String>, e))?;
            consumed += len as u64;
            let tagset = Tagset::decode(sizes, &body)?;

            let key = match tagset.path() {
                Some(p) if !p.is_empty() => primitive::normalize(p),
                // empty or absent path: the info tagset, whose offset/size
                // describe the data region rather than a file body
                Some(_) | None => INFO_KEY.to_string(),
            };

            if key != INFO_KEY {
                if tagset.path().is_none() {
                    return Err(Error::new("ftt::load", ErrorKind::MissingTag("path")));
                }
                let offset = tagset.offset().ok_or_else(|| Error::new("ftt::load", ErrorKind::MissingTag("offset")))?;
                let size = tagset.size().ok_or_else(|| Error::new("ftt::load", ErrorKind::MissingTag("size")))?;
                if offset < dat_offset || offset + size > dat_offset + dat_size {
                    return Err(Error::with_path("ftt::load", key, ErrorKind::OutOfBounds));
                }
                if ftt.has(&key) {
                    return Err(Error::with_path("ftt::load", key, ErrorKind::DuplicateKey));
                }
            } else if ftt.has(&key) {
                return Err(Error::new("ftt::load", ErrorKind::DuplicateKey));
            }

            ftt.put(key, tagset);
        }

        Ok(ftt)
    }

    /// Serialize every tagset (in insertion order), each prefixed by its
    /// `tssize`-byte length, followed by a single zero-length sentinel.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for (_, ts) in self.snapshot() {
            let body = ts.encode()?;
            write_uint(self.sizes.tssize, body.len() as u64, &mut out);
            out.extend_from_slice(&body);
        }
        write_uint(self.sizes.tssize, 0, &mut out);
        Ok(out)
    }
}

/// Replace `p`'s extension with `.wpt` (the tags-file extension of a
/// splitted package).
pub fn make_tags_path(p: &str) -> String {
    primitive::with_extension(p, ".wpt")
}

/// Replace `p`'s extension with `.wpf` (the data-file extension of a
/// splitted package).
pub fn make_data_path(p: &str) -> String {
    primitive::with_extension(p, ".wpf")
}
