//! `Union`: an ordered overlay of packages. First occurrence wins across
//! every operation; directory entries are synthesized by aggregating every
//! member's keys under a prefix (§4.6).

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::error::{Error, ErrorKind, Result};
use crate::package::{Entry, Package};
use crate::reader::NestedFile;
use crate::tagset::FileInfo;

/// A union holds an ordered list of member packages and closes each once,
/// on drop (§3).
pub struct Union {
    members: Vec<Package>,
}

impl Union {
    pub fn new(members: Vec<Package>) -> Self {
        Union { members }
    }

    pub fn members(&self) -> &[Package] {
        &self.members
    }

    /// Every member's keys, concatenated, first occurrence wins. Walks
    /// each member's directory tree via `read_dir` rather than a glob, so
    /// it needs no pattern special-cased for "everything".
    pub fn all_keys(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for member in &self.members {
            for info in member.read_dir("").unwrap_or_default() {
                if info.isdir {
                    collect_dir(member, &info.name, &mut seen);
                } else if !seen.contains(&info.name) {
                    seen.push(info.name);
                }
            }
        }
        seen
    }

    /// The special `wpk/<N>` name: the raw bytes of member `N`'s backing
    /// file, for introspection.
    fn open_introspection(&self, name: &str) -> Option<Result<Entry>> {
        let idx_str = name.strip_prefix("wpk/")?;
        let idx: usize = idx_str.parse().ok()?;
        let member = self.members.get(idx)?;
        Some(std::fs::read(member.source_path()).map(|bytes| Entry::File(Box::new(MemoryFile { data: Arc::new(bytes), pos: 0 }) as Box<dyn NestedFile>)).map_err(|e| {
            Error::io("union::open", Some(member.source_path().display().to_string()), e)
        }))
    }

    /// Search members in order for an exact hit; failing that, for any key
    /// prefixed by `name + '/'`.
    pub fn open(&self, name: &str) -> Result<Entry> {
        if let Some(result) = self.open_introspection(name) {
            return result;
        }
        for member in &self.members {
            if member.has_tagset(name) {
                return member.open_entry(name);
            }
        }
        for member in &self.members {
            if member.read_dir(name).map(|v| !v.is_empty()).unwrap_or(false) || name.is_empty() {
                return Ok(Entry::Dir);
            }
        }
        Err(Error::with_path("union::open", name.to_string(), ErrorKind::NotFound))
    }

    pub fn stat(&self, name: &str) -> Result<FileInfo> {
        for member in &self.members {
            if let Ok(info) = member.stat(name) {
                return Ok(info);
            }
        }
        Err(Error::with_path("union::stat", name.to_string(), ErrorKind::NotFound))
    }

    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        for member in &self.members {
            if member.has_tagset(name) {
                return member.read_file(name);
            }
        }
        Err(Error::with_path("union::read_file", name.to_string(), ErrorKind::NotFound))
    }

    /// Immediate children under `name`, aggregated across every member and
    /// deduplicated by first occurrence.
    pub fn read_dir(&self, name: &str) -> Result<Vec<FileInfo>> {
        let mut seen = Vec::new();
        let mut out = Vec::new();
        let mut any = false;
        for member in &self.members {
            if let Ok(infos) = member.read_dir(name) {
                any = true;
                for info in infos {
                    if !seen.contains(&info.name) {
                        seen.push(info.name.clone());
                        out.push(info);
                    }
                }
            }
        }
        if !any {
            return Err(Error::with_path("union::read_dir", name.to_string(), ErrorKind::NotFound));
        }
        Ok(out)
    }

    /// `dir` appended to every member's workspace; members with nothing
    /// under it are dropped. Fails only if none have anything there.
    pub fn sub(&self, dir: &str) -> Result<Self> {
        let subs: Vec<Package> = self.members.iter().filter_map(|m| m.sub(dir).ok()).collect();
        if subs.is_empty() {
            return Err(Error::with_path("union::sub", dir.to_string(), ErrorKind::NotFound));
        }
        Ok(Union { members: subs })
    }

    /// Dispatch `pattern` per member, deduplicating by first occurrence.
    pub fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let mut seen = Vec::new();
        for member in &self.members {
            for key in member.glob(pattern)? {
                if !seen.contains(&key) {
                    seen.push(key);
                }
            }
        }
        Ok(seen)
    }

    /// Release every member's backend resources.
    pub fn close(&self) -> Result<()> {
        for member in &self.members {
            member.close()?;
        }
        Ok(())
    }
}

impl Drop for Union {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Recursively collect every file key under `base` (a known directory)
/// into `seen`, first occurrence wins.
fn collect_dir(member: &Package, base: &str, seen: &mut Vec<String>) {
    if let Ok(children) = member.read_dir(base) {
        for child in children {
            let full = format!("{base}/{}", child.name);
            if child.isdir {
                collect_dir(member, &full, seen);
            } else if !seen.contains(&full) {
                seen.push(full);
            }
        }
    }
}

/// A read-only cursor over an entire in-memory byte buffer, used for the
/// `wpk/<N>` introspection entry.
struct MemoryFile {
    data: Arc<Vec<u8>>,
    pos: u64,
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.data.len() as u64 - self.pos;
        let n = (buf.len() as u64).min(remaining) as usize;
        if n == 0 {
            return Ok(0);
        }
        let from = self.pos as usize;
        buf[..n].copy_from_slice(&self.data[from..from + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for MemoryFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.data.len() as i64;
        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(p) => len + p,
            SeekFrom::Current(p) => self.pos as i64 + p,
        };
        if new_pos < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before start"));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}

impl NestedFile for MemoryFile {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::OpenOptions;
    use crate::writer::{Writer, WriterOptions};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn pack(dir: &std::path::Path, name: &str, entries: &[(&str, &[u8])]) -> Package {
        let path = dir.join(name);
        let mut w = Writer::begin(&path, &path, WriterOptions::default()).unwrap();
        for (key, bytes) in entries {
            w.pack_data(key, &mut Cursor::new(bytes.to_vec())).unwrap();
        }
        w.sync().unwrap();
        Package::open(&path, OpenOptions::default()).unwrap()
    }

    #[test]
    fn first_occurrence_wins_and_directories_aggregate() {
        let dir = tempdir().unwrap();
        let p1 = pack(dir.path(), "p1.wpk", &[("a", b"p1-a"), ("b/c", b"p1-c")]);
        let p2 = pack(dir.path(), "p2.wpk", &[("a", b"p2-a"), ("d", b"p2-d")]);
        let union = Union::new(vec![p1, p2]);

        assert_eq!(union.read_file("a").unwrap(), b"p1-a");
        assert_eq!(union.read_file("d").unwrap(), b"p2-d");

        let mut names: Vec<_> = union.read_dir("").unwrap().into_iter().map(|i| i.name).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b", "d"]);

        let under_b: Vec<_> = union.read_dir("b").unwrap().into_iter().map(|i| i.name).collect();
        assert_eq!(under_b, vec!["c"]);
    }

    #[test]
    fn all_keys_concatenates_first_occurrence_wins() {
        let dir = tempdir().unwrap();
        let p1 = pack(dir.path(), "p1.wpk", &[("a", b"p1-a"), ("b/c", b"p1-c")]);
        let p2 = pack(dir.path(), "p2.wpk", &[("a", b"p2-a"), ("d", b"p2-d")]);
        let union = Union::new(vec![p1, p2]);

        let mut keys = union.all_keys();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b/c".to_string(), "d".to_string()]);
    }

    #[test]
    fn wpk_introspection_name_returns_raw_member_bytes() {
        let dir = tempdir().unwrap();
        let p1 = pack(dir.path(), "p1.wpk", &[("a", b"hello")]);
        let expected = std::fs::read(p1.source_path()).unwrap();
        let union = Union::new(vec![p1]);

        match union.open("wpk/0").unwrap() {
            Entry::File(mut f) => {
                let mut buf = Vec::new();
                f.read_to_end(&mut buf).unwrap();
                assert_eq!(buf, expected);
            }
            Entry::Dir => panic!("expected a file entry"),
        }
    }

    #[test]
    fn sub_drops_members_with_nothing_under_the_prefix() {
        let dir = tempdir().unwrap();
        let p1 = pack(dir.path(), "p1.wpk", &[("b/c", b"1")]);
        let p2 = pack(dir.path(), "p2.wpk", &[("a", b"2")]);
        let union = Union::new(vec![p1, p2]);

        let sub = union.sub("b").unwrap();
        assert_eq!(sub.members().len(), 1);
        assert_eq!(sub.read_file("c").unwrap(), b"1");
    }
}
