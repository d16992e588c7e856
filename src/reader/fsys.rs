//! The fsys backend: one shared file descriptor, seeked and read under a
//! mutex for each `NestedFile` access, so concurrent nested files never
//! race each other's cursor (§4.5).

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use log::trace;

use crate::error::{Error, ErrorKind, Result};
use crate::reader::{NestedFile, Tagger};
use crate::tagset::Tagset;

/// A `Read + Seek` handle shared by every open `NestedFile`. Each access
/// seeks to its own absolute position before reading, so the handle's
/// cursor carries no state between calls.
struct SharedReader<R> {
    inner: Mutex<R>,
}

impl<R: Read + Seek> SharedReader<R> {
    fn read_at(&self, abs_pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock().unwrap();
        guard.seek(SeekFrom::Start(abs_pos))?;
        guard.read(buf)
    }
}

pub struct FsysTagger {
    shared: Arc<SharedReader<File>>,
    dat_offset: u64,
}

impl FsysTagger {
    pub fn new(file: File, dat_offset: u64) -> Self {
        FsysTagger { shared: Arc::new(SharedReader { inner: Mutex::new(file) }), dat_offset }
    }
}

impl Tagger for FsysTagger {
    fn open_tagset(&self, ts: &Tagset) -> Result<Box<dyn NestedFile>> {
        let offset = ts.offset().ok_or_else(|| Error::new("fsys::open_tagset", ErrorKind::MissingTag("offset")))?;
        let size = ts.size().ok_or_else(|| Error::new("fsys::open_tagset", ErrorKind::MissingTag("size")))?;
        if offset < self.dat_offset {
            return Err(Error::new("fsys::open_tagset", ErrorKind::OutOfBounds));
        }
        trace!(target: "wpk::reader::fsys", "open offset={offset} size={size}");
        Ok(Box::new(FsysFile { shared: self.shared.clone(), base: offset, size, pos: 0 }))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A section view over `shared`: reads/seeks are translated to absolute
/// `base + pos` positions against the shared file on every call.
struct FsysFile {
    shared: Arc<SharedReader<File>>,
    base: u64,
    size: u64,
    pos: u64,
}

impl Read for FsysFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.size.saturating_sub(self.pos);
        let want = (buf.len() as u64).min(remaining) as usize;
        if want == 0 {
            return Ok(0);
        }
        let n = self.shared.read_at(self.base + self.pos, &mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for FsysFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(p) => self.size as i64 + p,
            SeekFrom::Current(p) => self.pos as i64 + p,
        };
        if new_pos < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before start"));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}

impl NestedFile for FsysFile {
    fn size(&self) -> u64 {
        self.size
    }

    /// The shared descriptor outlives any one nested file; it's released
    /// once by the owning `Package` (§4.5, "Handle policy").
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::TypeSize;
    use std::io::Write;

    fn file_with(bytes: &[u8]) -> File {
        let mut f = tempfile::tempfile().unwrap();
        f.write_all(bytes).unwrap();
        f
    }

    fn tagset_with(offset: u64, size: u64) -> Tagset {
        let mut ts = Tagset::new(TypeSize::DEFAULT);
        ts.set_path("f");
        ts.set_offset(offset);
        ts.set_size(size);
        ts
    }

    #[test]
    fn two_nested_files_read_independent_windows_concurrently() {
        let file = file_with(b"0123456789abcdef");
        let tagger = FsysTagger::new(file, 0);

        let mut a = tagger.open_tagset(&tagset_with(0, 4)).unwrap();
        let mut b = tagger.open_tagset(&tagset_with(10, 6)).unwrap();

        let mut buf_b = [0u8; 3];
        b.read_exact(&mut buf_b).unwrap();
        assert_eq!(&buf_b, b"abc");

        let mut buf_a = Vec::new();
        a.read_to_end(&mut buf_a).unwrap();
        assert_eq!(buf_a, b"0123");

        let mut rest_b = Vec::new();
        b.read_to_end(&mut rest_b).unwrap();
        assert_eq!(rest_b, b"def");
    }

    #[test]
    fn offset_below_data_region_is_rejected() {
        let file = file_with(b"0123456789");
        let tagger = FsysTagger::new(file, 4);
        let err = tagger.open_tagset(&tagset_with(0, 2)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::OutOfBounds));
    }
}
