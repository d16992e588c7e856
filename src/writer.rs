//! The writer state machine: `Begin`/`Append` open a package for mutation,
//! `PackData`/`PackFile`/`PackDir`/`Rename`/`PutAlias`/`RenameDir`/
//! `DelTagset` mutate its in-memory FTT and data stream, `Sync` flushes
//! both back to disk (§4.4, §6).

use std::fs::{File, OpenOptions as FsOpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::SystemTime;

use log::{debug, trace};
use walkdir::WalkDir;

use crate::error::{Error, ErrorKind, Result};
use crate::ftt::{self, Ftt};
use crate::header::{Header, TypeSize, HEADER_SIZE};
use crate::primitive;
use crate::tag::Tag;
use crate::tagid;
use crate::tagset::Tagset;

/// Construction options for `Writer::begin`/`Writer::append`. Only the
/// field-width choice is exposed — the caller picks it once, at `Begin`,
/// and it's frozen in the header for the package's lifetime (§4.3).
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    pub sizes: TypeSize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions { sizes: TypeSize::DEFAULT }
    }
}

/// A package open for mutation. `Begin`/`Append` produce one; `Sync` flushes
/// it back to disk. Every mutating method after a `Sync` fails with
/// `ErrorKind::WriterClosed`.
pub struct Writer {
    sizes: TypeSize,
    ftt: Ftt,
    splitted: bool,
    tags_file: File,
    data_file: File,
    dat_offset: u64,
    dat_pos: u64,
    synced: bool,
}

impl Writer {
    /// Open a fresh package for writing. `tags_path == data_path` produces
    /// a single-file package (`datoffset = HeaderSize`); distinct paths
    /// produce a splitted one (`datoffset = 0`).
    pub fn begin(tags_path: impl AsRef<Path>, data_path: impl AsRef<Path>, options: WriterOptions) -> Result<Self> {
        let tags_path = tags_path.as_ref();
        let data_path = data_path.as_ref();
        let splitted = tags_path != data_path;

        let tags_file = FsOpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(tags_path)
            .map_err(|e| Error::io("writer::begin", Some(tags_path.display().to_string()), e))?;
        let data_file = if splitted {
            FsOpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(data_path)
                .map_err(|e| Error::io("writer::begin", Some(data_path.display().to_string()), e))?
        } else {
            FsOpenOptions::new()
                .read(true)
                .write(true)
                .open(tags_path)
                .map_err(|e| Error::io("writer::begin", Some(tags_path.display().to_string()), e))?
        };

        let dat_offset = if splitted { 0 } else { HEADER_SIZE };

        let mut writer = Writer {
            sizes: options.sizes,
            ftt: Ftt::new(options.sizes),
            splitted,
            tags_file,
            data_file,
            dat_offset,
            dat_pos: dat_offset,
            synced: false,
        };
        writer.write_prebuild_header()?;
        debug!(target: "wpk::writer", "begin splitted={splitted} dat_offset={dat_offset}");
        Ok(writer)
    }

    /// Reopen a previously synced package for appending. Rewrites the
    /// signature to "prebuild" and positions the data cursor at the end of
    /// the existing data region so new entries land after it. When
    /// `expected_sizes` is given, the reopened package's on-disk `TypeSize`
    /// must match it exactly or the call fails with `ErrorKind::SizeMismatch`.
    pub fn append(
        tags_path: impl AsRef<Path>,
        data_path: impl AsRef<Path>,
        expected_sizes: Option<TypeSize>,
    ) -> Result<Self> {
        let tags_path = tags_path.as_ref();
        let data_path = data_path.as_ref();
        let splitted = tags_path != data_path;

        let mut tags_file = FsOpenOptions::new()
            .read(true)
            .write(true)
            .open(tags_path)
            .map_err(|e| Error::io("writer::append", Some(tags_path.display().to_string()), e))?;
        let data_file = if splitted {
            FsOpenOptions::new()
                .read(true)
                .write(true)
                .open(data_path)
                .map_err(|e| Error::io("writer::append", Some(data_path.display().to_string()), e))?
        } else {
            tags_file
                .try_clone()
                .map_err(|e| Error::io("writer::append", Some(tags_path.display().to_string()), e))?
        };

        let mut header_buf = [0u8; HEADER_SIZE as usize];
        tags_file.seek(SeekFrom::Start(0)).map_err(|e| Error::io("writer::append", None::<String>, e))?;
        tags_file.read_exact(&mut header_buf).map_err(|e| Error::io("writer::append", None::<String>, e))?;
        let header = Header::decode(&header_buf)?;
        if !header.ready {
            return Err(Error::new("writer::append", ErrorKind::NotClosed));
        }
        if let Some(expected) = expected_sizes {
            if expected != header.sizes {
                return Err(Error::new("writer::append", ErrorKind::SizeMismatch));
            }
        }

        let ftt = {
            let mut tags_reader = tags_file
                .try_clone()
                .map_err(|e| Error::io("writer::append", None::<String>, e))?;
            Ftt::load(
                &mut tags_reader,
                header.sizes,
                header.fttoffset,
                header.fttsize,
                header.datoffset,
                header.datsize,
            )?
        };

        let mut writer = Writer {
            sizes: header.sizes,
            ftt,
            splitted: header.is_splitted(),
            tags_file,
            data_file,
            dat_offset: header.datoffset,
            dat_pos: header.datoffset + header.datsize,
            synced: false,
        };
        writer.write_prebuild_header()?;
        debug!(
            target: "wpk::writer",
            "append dat_offset={} dat_pos={}", writer.dat_offset, writer.dat_pos
        );
        Ok(writer)
    }

    fn write_prebuild_header(&mut self) -> Result<()> {
        let header = Header {
            ready: false,
            sizes: self.sizes,
            fttoffset: 0,
            fttsize: 0,
            datoffset: self.dat_offset,
            datsize: 0,
        };
        self.tags_file
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::io("writer::write_prebuild_header", None::<String>, e))?;
        self.tags_file
            .write_all(&header.encode())
            .map_err(|e| Error::io("writer::write_prebuild_header", None::<String>, e))?;
        self.tags_file.flush().map_err(|e| Error::io("writer::write_prebuild_header", None::<String>, e))
    }

    fn check_open(&self, op: &'static str) -> Result<()> {
        if self.synced {
            return Err(Error::new(op, ErrorKind::WriterClosed));
        }
        Ok(())
    }

    /// Copy `r`'s bytes into the data stream under `path`, returning the
    /// new entry's `(offset, size)`. Rejects `path` if it already exists.
    pub fn pack_data(&mut self, path: &str, r: &mut impl Read) -> Result<(u64, u64)> {
        self.check_open("writer::pack_data")?;
        let key = primitive::normalize(path);
        primitive::reject_traversal("writer::pack_data", &key)?;
        if self.ftt.has(&key) {
            return Err(Error::with_path("writer::pack_data", key, ErrorKind::AlreadyExists));
        }

        let offset = self.dat_pos;
        self.data_file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error::io("writer::pack_data", Some(path.to_string()), e))?;
        let size = io::copy(r, &mut self.data_file).map_err(|e| Error::io("writer::pack_data", Some(path.to_string()), e))?;
        self.dat_pos += size;

        let mut ts = Tagset::new(self.sizes);
        ts.set_path(path);
        ts.set_offset(offset);
        ts.set_size(size);
        self.ftt.put(key, ts);
        trace!(target: "wpk::writer", "pack_data {path} offset={offset} size={size}");
        Ok((offset, size))
    }

    /// `pack_data` plus file metadata (mtime/atime/ctime/btime, best
    /// effort) and a `link` tag recording the source path.
    pub fn pack_file(&mut self, src: impl AsRef<Path>, target_path: &str) -> Result<()> {
        self.check_open("writer::pack_file")?;
        let src = src.as_ref();
        let mut file = File::open(src).map_err(|e| Error::io("writer::pack_file", Some(src.display().to_string()), e))?;
        let metadata = file
            .metadata()
            .map_err(|e| Error::io("writer::pack_file", Some(src.display().to_string()), e))?;

        self.pack_data(target_path, &mut file)?;

        let key = primitive::normalize(target_path);
        let mut ts = self.ftt.get(&key).expect("just inserted by pack_data");
        if let Ok(mtime) = metadata.modified() {
            ts.put(tagid::MTIME, systime_tag(mtime));
        }
        if let Ok(atime) = metadata.accessed() {
            ts.put(tagid::ATIME, systime_tag(atime));
        }
        if let Ok(btime) = metadata.created() {
            ts.put(tagid::BTIME, systime_tag(btime));
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            ts.put(tagid::CTIME, Tag::from_time_secs_nanos(metadata.ctime(), metadata.ctime_nsec() as u32));
        }
        ts.put(tagid::LINK, Tag::from_str(&src.display().to_string()));
        self.ftt.put(key, ts);
        Ok(())
    }

    /// Recursively walk `src_dir` (depth-first, sorted by file name for
    /// determinism) and `pack_file` every regular file under
    /// `prefix + relative_path`. `logger`, if given, runs after each
    /// tagset is inserted and may mutate it further.
    pub fn pack_dir(
        &mut self,
        src_dir: impl AsRef<Path>,
        prefix: &str,
        mut logger: Option<&mut dyn FnMut(&str, &mut Tagset)>,
    ) -> Result<()> {
        self.check_open("writer::pack_dir")?;
        let src_dir = src_dir.as_ref();
        for entry in WalkDir::new(src_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let io_err = e.into_io_error().unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "directory walk failed"));
                Error::io("writer::pack_dir", Some(src_dir.display().to_string()), io_err)
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(src_dir)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            let target = primitive::join(prefix, &rel);
            self.pack_file(entry.path(), &target)?;

            if let Some(logger) = logger.as_deref_mut() {
                let key = primitive::normalize(&target);
                let mut ts = self.ftt.get(&key).expect("just inserted by pack_file");
                logger(&target, &mut ts);
                self.ftt.put(key, ts);
            }
        }
        Ok(())
    }

    /// Move `old`'s tagset to `new`. Fails if `old` is missing or `new`
    /// already exists. Data is not touched.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        self.check_open("writer::rename")?;
        let old_key = primitive::normalize(old);
        let new_key = primitive::normalize(new);
        primitive::reject_traversal("writer::rename", &old_key)?;
        primitive::reject_traversal("writer::rename", &new_key)?;
        if !self.ftt.has(&old_key) {
            return Err(Error::with_path("writer::rename", old_key, ErrorKind::NotFound));
        }
        if self.ftt.has(&new_key) {
            return Err(Error::with_path("writer::rename", new_key, ErrorKind::AlreadyExists));
        }
        let mut ts = self.ftt.remove(&old_key).unwrap();
        ts.set_path(new);
        self.ftt.put(new_key, ts);
        Ok(())
    }

    /// Clone `old`'s tagset (including `offset`/`size`) under `new`, so the
    /// same data block is now referenced by two keys.
    pub fn put_alias(&mut self, old: &str, new: &str) -> Result<()> {
        self.check_open("writer::put_alias")?;
        let old_key = primitive::normalize(old);
        let new_key = primitive::normalize(new);
        primitive::reject_traversal("writer::put_alias", &old_key)?;
        primitive::reject_traversal("writer::put_alias", &new_key)?;
        let mut ts = self
            .ftt
            .get(&old_key)
            .ok_or_else(|| Error::with_path("writer::put_alias", old_key, ErrorKind::NotFound))?;
        if self.ftt.has(&new_key) {
            return Err(Error::with_path("writer::put_alias", new_key, ErrorKind::AlreadyExists));
        }
        ts.set_path(new);
        self.ftt.put(new_key, ts);
        Ok(())
    }

    /// Remove `key`'s FTT entry only; the data it pointed to remains
    /// allocated (reachable through any remaining alias, or simply unused).
    pub fn del_tagset(&mut self, key: &str) -> Result<Tagset> {
        self.check_open("writer::del_tagset")?;
        let key = primitive::normalize(key);
        self.ftt
            .remove(&key)
            .ok_or_else(|| Error::with_path("writer::del_tagset", key, ErrorKind::NotFound))
    }

    /// Re-key every entry under `old_dir + '/'` to the same path under
    /// `new_dir`. Validates the whole rename plan before applying any of
    /// it, so a collision leaves the FTT untouched. When `skip_exist` is
    /// true, colliding destinations are left under their original key
    /// instead of aborting.
    pub fn rename_dir(&mut self, old_dir: &str, new_dir: &str, skip_exist: bool) -> Result<()> {
        self.check_open("writer::rename_dir")?;
        let old_dir_key = primitive::normalize(old_dir);
        let new_dir_key = primitive::normalize(new_dir);
        primitive::reject_traversal("writer::rename_dir", &old_dir_key)?;
        primitive::reject_traversal("writer::rename_dir", &new_dir_key)?;
        let old_prefix = format!("{old_dir_key}/");
        let new_prefix = format!("{new_dir_key}/");

        let mut plan = Vec::new();
        for (key, _) in self.ftt.snapshot() {
            if let Some(rest) = key.strip_prefix(&old_prefix) {
                let new_key = format!("{new_prefix}{rest}");
                if self.ftt.has(&new_key) {
                    if skip_exist {
                        continue;
                    }
                    return Err(Error::with_path("writer::rename_dir", new_key, ErrorKind::AlreadyExists));
                }
                plan.push((key, new_key));
            }
        }

        for (old_key, new_key) in plan {
            let mut ts = self.ftt.remove(&old_key).unwrap();
            if let Some(path) = ts.path() {
                let new_path = format!("{new_prefix}{}", &path[old_prefix.len()..]);
                ts.set_path(&new_path);
            }
            self.ftt.put(new_key, ts);
        }
        Ok(())
    }

    /// Set or replace the package-wide info tagset (offset/size are
    /// overwritten again at `Sync` to describe the final data region).
    pub fn set_info(&mut self, tid: u32, tag: Tag) -> Result<()> {
        self.check_open("writer::set_info")?;
        let mut info = self.ftt.get(ftt::INFO_KEY).unwrap_or_else(|| Tagset::new(self.sizes));
        info.set(tid, tag);
        self.ftt.put(ftt::INFO_KEY.to_string(), info);
        Ok(())
    }

    /// Flush the FTT and rewrite the header as "ready". Calling `sync`
    /// again with no intervening mutation reproduces the same bytes.
    pub fn sync(&mut self) -> Result<()> {
        let datsize = self.dat_pos - self.dat_offset;
        let fttoffset = if self.splitted { HEADER_SIZE } else { HEADER_SIZE + datsize };

        let mut info = self.ftt.get(ftt::INFO_KEY).unwrap_or_else(|| Tagset::new(self.sizes));
        info.set_offset(self.dat_offset);
        info.set_size(datsize);
        self.ftt.put(ftt::INFO_KEY.to_string(), info);

        let body = self.ftt.serialize()?;
        self.tags_file
            .seek(SeekFrom::Start(fttoffset))
            .map_err(|e| Error::io("writer::sync", None::<String>, e))?;
        self.tags_file.write_all(&body).map_err(|e| Error::io("writer::sync", None::<String>, e))?;

        let header = Header {
            ready: true,
            sizes: self.sizes,
            fttoffset,
            fttsize: body.len() as u64,
            datoffset: self.dat_offset,
            datsize,
        };
        self.tags_file
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::io("writer::sync", None::<String>, e))?;
        self.tags_file.write_all(&header.encode()).map_err(|e| Error::io("writer::sync", None::<String>, e))?;
        self.tags_file.flush().map_err(|e| Error::io("writer::sync", None::<String>, e))?;
        self.data_file.flush().map_err(|e| Error::io("writer::sync", None::<String>, e))?;

        self.synced = true;
        debug!(target: "wpk::writer", "sync fttoffset={fttoffset} fttsize={} datoffset={} datsize={datsize}", body.len(), self.dat_offset);
        Ok(())
    }
}

fn systime_tag(t: SystemTime) -> Tag {
    match t.duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => Tag::from_time_secs_nanos(d.as_secs() as i64, d.subsec_nanos()),
        Err(e) => Tag::from_time_secs_nanos(-(e.duration().as_secs() as i64), 0),
    }
}
