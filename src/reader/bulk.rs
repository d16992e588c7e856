//! The bulk backend: the entire data region read once into memory, and
//! every `NestedFile` is a cursor over a shared slice of it (§4.5).

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use log::trace;

use crate::error::{Error, ErrorKind, Result};
use crate::reader::{NestedFile, Tagger};
use crate::tagset::Tagset;

pub struct BulkTagger {
    data: Arc<Vec<u8>>,
    dat_offset: u64,
}

impl BulkTagger {
    pub fn new(data: Vec<u8>, dat_offset: u64) -> Self {
        trace!(target: "wpk::reader::bulk", "loaded {} bytes resident", data.len());
        BulkTagger { data: Arc::new(data), dat_offset }
    }
}

impl Tagger for BulkTagger {
    fn open_tagset(&self, ts: &Tagset) -> Result<Box<dyn NestedFile>> {
        let offset = ts.offset().ok_or_else(|| Error::new("bulk::open_tagset", ErrorKind::MissingTag("offset")))?;
        let size = ts.size().ok_or_else(|| Error::new("bulk::open_tagset", ErrorKind::MissingTag("size")))?;
        let local = offset
            .checked_sub(self.dat_offset)
            .ok_or_else(|| Error::new("bulk::open_tagset", ErrorKind::OutOfBounds))?;
        let end = local
            .checked_add(size)
            .ok_or_else(|| Error::new("bulk::open_tagset", ErrorKind::OutOfBounds))?;
        if end > self.data.len() as u64 {
            return Err(Error::new("bulk::open_tagset", ErrorKind::OutOfBounds));
        }
        trace!(target: "wpk::reader::bulk", "open [{local}, {end})");
        Ok(Box::new(BulkFile { data: self.data.clone(), start: local, size, pos: 0 }))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A cursor over `data[start..start+size]`.
struct BulkFile {
    data: Arc<Vec<u8>>,
    start: u64,
    size: u64,
    pos: u64,
}

impl Read for BulkFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.size.saturating_sub(self.pos);
        let n = (buf.len() as u64).min(remaining) as usize;
        if n == 0 {
            return Ok(0);
        }
        let from = (self.start + self.pos) as usize;
        buf[..n].copy_from_slice(&self.data[from..from + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for BulkFile {
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

impl NestedFile for BulkFile {
    fn size(&self) -> u64 {
        self.size
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::TypeSize;

    fn tagset_with(offset: u64, size: u64) -> Tagset {
        let mut ts = Tagset::new(TypeSize::DEFAULT);
        ts.set_path("f");
        ts.set_offset(offset);
        ts.set_size(size);
        ts
    }

    #[test]
    fn reads_the_declared_window() {
        let tagger = BulkTagger::new(b"0123456789".to_vec(), 0);
        let ts = tagset_with(3, 4);
        let mut f = tagger.open_tagset(&ts).unwrap();
        let mut buf = Vec::new();
        f.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"3456");
        assert_eq!(f.size(), 4);
    }

    #[test]
    fn seek_then_read() {
        let tagger = BulkTagger::new(b"0123456789".to_vec(), 0);
        let ts = tagset_with(0, 10);
        let mut f = tagger.open_tagset(&ts).unwrap();
        f.seek(SeekFrom::Start(5)).unwrap();
        let mut buf = [0u8; 3];
        f.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"567");
    }

    #[test]
    fn out_of_bounds_window_is_rejected() {
        let tagger = BulkTagger::new(b"01234".to_vec(), 0);
        let ts = tagset_with(3, 10);
        assert!(tagger.open_tagset(&ts).is_err());
    }

    #[test]
    fn dat_offset_is_subtracted() {
        let tagger = BulkTagger::new(b"XXXXhello".to_vec(), 4);
        let ts = tagset_with(4, 5);
        let mut f = tagger.open_tagset(&ts).unwrap();
        let mut buf = Vec::new();
        f.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
    }
}
