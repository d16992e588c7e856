//! The mmap backend: every open maps a page-aligned window of the data
//! file and presents a `pageoff`-shifted view over it (§4.5).
//!
//! `memmap2::MmapOptions` already requires (and rounds to) the real OS page
//! size internally; this backend clamps the *requested* alignment to 64 KiB
//! regardless of that, so the same package behaves identically whether the
//! host's page size is 4 KiB or 16 KiB.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use log::trace;
use memmap2::{Mmap, MmapOptions};

use crate::error::{Error, ErrorKind, Result};
use crate::reader::{NestedFile, Tagger};
use crate::tagset::Tagset;

/// The portable alignment this backend maps at, regardless of the host's
/// real page size (§4.5).
const ALIGN: u64 = 64 * 1024;

pub struct MmapTagger {
    file: Arc<File>,
    dat_offset: u64,
}

impl MmapTagger {
    pub fn new(file: File, dat_offset: u64) -> Self {
        MmapTagger { file: Arc::new(file), dat_offset }
    }
}

impl Tagger for MmapTagger {
    fn open_tagset(&self, ts: &Tagset) -> Result<Box<dyn NestedFile>> {
        let offset = ts.offset().ok_or_else(|| Error::new("mmap::open_tagset", ErrorKind::MissingTag("offset")))?;
        let size = ts.size().ok_or_else(|| Error::new("mmap::open_tagset", ErrorKind::MissingTag("size")))?;
        let local = offset
            .checked_sub(self.dat_offset)
            .ok_or_else(|| Error::new("mmap::open_tagset", ErrorKind::OutOfBounds))?;

        let aligned_start = local - (local % ALIGN);
        let pageoff = local - aligned_start;
        let map_len = pageoff + size;

        trace!(
            target: "wpk::reader::mmap",
            "map offset={aligned_start} len={map_len} pageoff={pageoff}"
        );

        // Safety: the backing file is not truncated or written to while a
        // package is open for reading — writers hold their own exclusive
        // handle (§4.5, "Handle policy").
        let mmap = unsafe {
            MmapOptions::new()
                .offset(aligned_start)
                .len(map_len as usize)
                .map(self.file.as_ref())
        }
        .map_err(|e| Error::io("mmap::open_tagset", None::<String>, e))?;

        Ok(Box::new(MmapFile { mmap: Some(mmap), pageoff, size, pos: 0 }))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct MmapFile {
    mmap: Option<Mmap>,
    pageoff: u64,
    size: u64,
    pos: u64,
}

impl MmapFile {
    fn bytes(&self) -> io::Result<&[u8]> {
        self.mmap
            .as_deref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "nested file closed"))
    }
}

impl Read for MmapFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.size.saturating_sub(self.pos);
        let n = (buf.len() as u64).min(remaining) as usize;
        if n == 0 {
            return Ok(0);
        }
        let from = (self.pageoff + self.pos) as usize;
        buf[..n].copy_from_slice(&self.bytes()?[from..from + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for MmapFile {
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

impl NestedFile for MmapFile {
    fn size(&self) -> u64 {
        self.size
    }

    fn close(&mut self) -> Result<()> {
        self.mmap = None;
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
    fn reads_across_a_page_boundary() {
        let mut data = vec![0u8; 3 * ALIGN as usize];
        let region_start = ALIGN as usize - 3;
        data[region_start..region_start + 6].copy_from_slice(b"abcdef");
        let file = file_with(&data);
        let tagger = MmapTagger::new(file, 0);

        let ts = tagset_with(region_start as u64, 6);
        let mut f = tagger.open_tagset(&ts).unwrap();
        let mut buf = Vec::new();
        f.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"abcdef");
    }

    #[test]
    fn close_then_read_errors_instead_of_panicking() {
        let file = file_with(b"hello world");
        let tagger = MmapTagger::new(file, 0);
        let ts = tagset_with(0, 5);
        let mut f = tagger.open_tagset(&ts).unwrap();
        f.close().unwrap();
        let mut buf = [0u8; 1];
        assert!(f.read(&mut buf).is_err());
    }
}
