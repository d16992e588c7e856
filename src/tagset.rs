//! `Tagset`: the ordered metadata record for one logical file (or, under
//! the empty path, for the package itself). On disk it's the concatenation
//! of `(tid, len, bytes)` triples; in memory it's an ordered list so
//! `get`/`set`/`put`/`del` don't need to splice raw bytes by hand (§4.2).

use crate::error::{Error, ErrorKind, Result};
use crate::header::TypeSize;
use crate::primitive::{max_for_width, read_uint, write_uint};
use crate::tag::{Tag, TagTime};
use crate::tagid;

/// Walks a raw tagset body one `(tid, len, bytes)` triple at a time. On a
/// length that would run past the end of the buffer, sets `failed` and
/// stops — it never panics or reads out of bounds (§4.2).
struct TagsetIter<'a> {
    buf: &'a [u8],
    pos: usize,
    sizes: TypeSize,
    failed: bool,
}

impl<'a> Iterator for TagsetIter<'a> {
    type Item = (u32, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }
        let tidsz = self.sizes.tidsz as usize;
        let tagsz = self.sizes.tagsz as usize;
        if self.pos + tidsz + tagsz > self.buf.len() {
            self.failed = true;
            return None;
        }
        let tid = read_uint(self.sizes.tidsz, &self.buf[self.pos..]) as u32;
        self.pos += tidsz;
        let len = read_uint(self.sizes.tagsz, &self.buf[self.pos..]) as usize;
        self.pos += tagsz;
        if self.pos + len > self.buf.len() {
            self.failed = true;
            return None;
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Some((tid, bytes))
    }
}

/// One file's (or the package's) metadata: an ordered list of tags.
#[derive(Debug, Clone, PartialEq)]
pub struct Tagset {
    sizes: TypeSize,
    entries: Vec<(u32, Tag)>,
}

impl Tagset {
    pub fn new(sizes: TypeSize) -> Self {
        Tagset { entries: Vec::new(), sizes }
    }

    pub fn sizes(&self) -> TypeSize {
        self.sizes
    }

    /// Parse a tagset body (without its length prefix) according to
    /// `sizes`. Fails with `ErrorKind::Truncated` if the iterator runs off
    /// the end of `body`.
    pub fn decode(sizes: TypeSize, body: &[u8]) -> Result<Self> {
        let mut iter = TagsetIter { buf: body, pos: 0, sizes, failed: false };
        let mut entries = Vec::new();
        for (tid, bytes) in &mut iter {
            entries.push((tid, Tag::from_bytes(bytes.to_vec())));
        }
        if iter.failed {
            return Err(Error::new("tagset::decode", ErrorKind::Truncated));
        }
        Ok(Tagset { sizes, entries })
    }

    /// Serialize to the on-disk triple sequence (without the enclosing
    /// length prefix — that's the FTT's job, see `ftt.rs`).
    pub fn encode(&self) -> Result<Vec<u8>> {
        let max_tag = max_for_width(self.sizes.tagsz);
        let mut body = Vec::new();
        for (tid, tag) in &self.entries {
            let len = tag.len() as u64;
            if len > max_tag {
                return Err(Error::new(
                    "tagset::encode",
                    ErrorKind::TagTooLarge { tid: *tid, max: max_tag },
                ));
            }
            write_uint(self.sizes.tidsz, *tid as u64, &mut body);
            write_uint(self.sizes.tagsz, len, &mut body);
            body.extend_from_slice(tag.as_bytes());
        }
        Ok(body)
    }

    pub fn get(&self, tid: u32) -> Option<&Tag> {
        self.entries.iter().find(|(t, _)| *t == tid).map(|(_, v)| v)
    }

    /// Append `tag` under `tid`. A no-op for `tagid::NONE` (§4.2).
    pub fn put(&mut self, tid: u32, tag: Tag) {
        if tid == tagid::NONE {
            return;
        }
        self.entries.push((tid, tag));
    }

    /// Replace `tid`'s tag if present (in place when the new length
    /// matches the old one, otherwise by removing and re-appending),
    /// or append it as new. Returns `true` when this inserted a new tag,
    /// `false` when it replaced an existing one.
    pub fn set(&mut self, tid: u32, tag: Tag) -> bool {
        match self.entries.iter().position(|(t, _)| *t == tid) {
            Some(pos) => {
                if self.entries[pos].1.len() == tag.len() {
                    self.entries[pos].1 = tag;
                } else {
                    self.entries.remove(pos);
                    self.entries.push((tid, tag));
                }
                false
            }
            None => {
                self.entries.push((tid, tag));
                true
            }
        }
    }

    /// Remove `tid`'s tag. Returns whether one was actually present.
    pub fn del(&mut self, tid: u32) -> bool {
        match self.entries.iter().position(|(t, _)| *t == tid) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Tag)> {
        self.entries.iter().map(|(t, v)| (*t, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // --- required-tag accessors, used by the FTT loader and writer ---

    pub fn path(&self) -> Option<&str> {
        self.get(tagid::PATH).and_then(|t| t.as_str())
    }

    pub fn offset(&self) -> Option<u64> {
        self.get(tagid::OFFSET).and_then(|t| t.as_uint_var())
    }

    pub fn size(&self) -> Option<u64> {
        self.get(tagid::SIZE).and_then(|t| t.as_uint_var())
    }

    pub fn set_path(&mut self, path: &str) {
        self.set(tagid::PATH, Tag::from_str(path));
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.set(tagid::OFFSET, Tag::from_uint_var(offset));
    }

    pub fn set_size(&mut self, size: u64) {
        self.set(tagid::SIZE, Tag::from_uint_var(size));
    }

    /// The file-info view projected from this tagset (§4.2): basename,
    /// size, mtime, and whether it's a directory (absence of `size`).
    pub fn file_info(&self) -> FileInfo {
        let name = self
            .path()
            .map(|p| crate::primitive::split_dir_base(p).1.to_string())
            .unwrap_or_default();
        let size = self.size();
        let mtime = self.get(tagid::MTIME).and_then(|t| t.as_time());
        FileInfo { name, size, mtime, isdir: size.is_none() }
    }
}

/// The file-info view a `Tagset` projects (§4.2): name, size, timestamp,
/// and directory-ness.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub name: String,
    pub size: Option<u64>,
    pub mtime: Option<TagTime>,
    pub isdir: bool,
}

impl FileInfo {
    /// A file is read-only (there's no write path on an opened package)
    /// when it has a `size` tag; directories have none.
    pub fn is_readonly_file(&self) -> bool {
        self.size.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes() -> TypeSize {
        TypeSize::DEFAULT
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut ts = Tagset::new(sizes());
        ts.set_path("a/b.txt");
        ts.set_offset(64);
        ts.set_size(5);
        ts.put(tagid::MIME, Tag::from_str("text/plain"));

        let body = ts.encode().unwrap();
        let decoded = Tagset::decode(sizes(), &body).unwrap();
        assert_eq!(decoded.path(), Some("a/b.txt"));
        assert_eq!(decoded.offset(), Some(64));
        assert_eq!(decoded.size(), Some(5));
        assert_eq!(decoded.get(tagid::MIME).unwrap().as_str(), Some("text/plain"));
    }

    #[test]
    fn set_get_roundtrip_for_arbitrary_tag() {
        let mut ts = Tagset::new(sizes());
        let inserted = ts.set(tagid::LABEL, Tag::from_str("hello"));
        assert!(inserted);
        assert_eq!(ts.get(tagid::LABEL).unwrap().as_str(), Some("hello"));

        let replaced = ts.set(tagid::LABEL, Tag::from_str("world"));
        assert!(!replaced);
        assert_eq!(ts.get(tagid::LABEL).unwrap().as_str(), Some("world"));

        // different length forces a splice, not an in-place overwrite
        let replaced = ts.set(tagid::LABEL, Tag::from_str("a longer replacement"));
        assert!(!replaced);
        assert_eq!(ts.get(tagid::LABEL).unwrap().as_str(), Some("a longer replacement"));
        assert_eq!(ts.len(), 1);
    }

    #[test]
    fn put_none_id_is_silent_noop() {
        let mut ts = Tagset::new(sizes());
        ts.put(tagid::NONE, Tag::from_u8(1));
        assert!(ts.is_empty());
    }

    #[test]
    fn del_reports_whether_it_removed_anything() {
        let mut ts = Tagset::new(sizes());
        ts.set(tagid::COMMENT, Tag::from_str("x"));
        assert!(ts.del(tagid::COMMENT));
        assert!(!ts.del(tagid::COMMENT));
    }

    #[test]
    fn truncated_tagset_sets_failed_and_errors() {
        let mut ts = Tagset::new(sizes());
        ts.set_path("a");
        let mut body = ts.encode().unwrap();
        body.truncate(body.len() - 1); // chop the last tag's final byte
        let err = Tagset::decode(sizes(), &body).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Truncated));
    }

    #[test]
    fn file_info_projects_name_size_isdir() {
        let mut ts = Tagset::new(sizes());
        ts.set_path("dir/file.bin");
        ts.set_offset(0);
        ts.set_size(10);
        let info = ts.file_info();
        assert_eq!(info.name, "file.bin");
        assert_eq!(info.size, Some(10));
        assert!(!info.isdir);

        let mut dir_ts = Tagset::new(sizes());
        dir_ts.set_path("dir");
        let info = dir_ts.file_info();
        assert!(info.isdir);
        assert_eq!(info.size, None);
    }
}
