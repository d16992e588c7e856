//! `Package`: a read-only virtual filesystem view over one package file's
//! FTT and data region (§4.4/§4.5).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::ftt::{self, Ftt};
use crate::header::{Header, HEADER_SIZE};
use crate::primitive;
use crate::reader::{BulkTagger, FsysTagger, MmapTagger, NestedFile, Tagger};
use crate::tagset::FileInfo;

/// Which backend to open a package with (§4.5).
pub use crate::reader::Backend;

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    pub backend: Backend,
    /// When set, `Package::open` rejects a package whose on-disk `TypeSize`
    /// doesn't match exactly, with `ErrorKind::SizeMismatch`.
    pub expected_sizes: Option<crate::header::TypeSize>,
}

/// The result of resolving a name against a package: either a hit (a
/// readable nested file) or a directory (read it further with
/// `Package::read_dir`).
pub enum Entry {
    File(Box<dyn NestedFile>),
    Dir,
}

/// A package opened for reading: its FTT plus whichever `Tagger` backend
/// was requested, scoped to a `workspace` subpath. Cheap to clone — the FTT
/// and tagger are shared, only the workspace prefix differs (§4.4 `Sub`).
#[derive(Clone)]
pub struct Package {
    ftt: Arc<Ftt>,
    tagger: Arc<dyn Tagger>,
    workspace: String,
    path: PathBuf,
}

impl Package {
    /// Open the package rooted at `path`. For a splitted package, `path` is
    /// the `.wpt` file and the `.wpf` sibling is derived via
    /// `ftt::make_data_path`.
    pub fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let mut tags_file =
            File::open(path).map_err(|e| Error::io("package::open", Some(path.display().to_string()), e))?;

        let mut header_buf = [0u8; HEADER_SIZE as usize];
        tags_file
            .read_exact(&mut header_buf)
            .map_err(|e| Error::io("package::open", Some(path.display().to_string()), e))?;
        let header = Header::decode(&header_buf)?;
        if let Some(expected) = options.expected_sizes {
            if expected != header.sizes {
                return Err(Error::new("package::open", ErrorKind::SizeMismatch));
            }
        }

        let mut ftt_reader = tags_file
            .try_clone()
            .map_err(|e| Error::io("package::open", Some(path.display().to_string()), e))?;
        let ftt = Ftt::load(
            &mut ftt_reader,
            header.sizes,
            header.fttoffset,
            header.fttsize,
            header.datoffset,
            header.datsize,
        )?;

        let tagger: Arc<dyn Tagger> = if header.is_splitted() {
            let data_path = ftt::make_data_path(&path.display().to_string());
            Self::open_backend(options.backend, Path::new(&data_path), 0)?
        } else {
            Self::open_backend_with(options.backend, tags_file, path, header.datoffset)?
        };

        debug!(
            target: "wpk::package",
            "open backend={:?} splitted={}", options.backend, header.is_splitted()
        );
        Ok(Package { ftt: Arc::new(ftt), tagger, workspace: String::new(), path: path.to_path_buf() })
    }

    fn open_backend(backend: Backend, data_path: &Path, dat_offset: u64) -> Result<Arc<dyn Tagger>> {
        match backend {
            Backend::Bulk => {
                let data = std::fs::read(data_path)
                    .map_err(|e| Error::io("package::open", Some(data_path.display().to_string()), e))?;
                Ok(Arc::new(BulkTagger::new(data, dat_offset)))
            }
            Backend::Mmap => {
                let file = File::open(data_path)
                    .map_err(|e| Error::io("package::open", Some(data_path.display().to_string()), e))?;
                Ok(Arc::new(MmapTagger::new(file, dat_offset)))
            }
            Backend::Fsys => {
                let file = File::open(data_path)
                    .map_err(|e| Error::io("package::open", Some(data_path.display().to_string()), e))?;
                Ok(Arc::new(FsysTagger::new(file, dat_offset)))
            }
        }
    }

    /// Single-file variant: the data region shares `tags_file` rather than
    /// a separately opened file.
    fn open_backend_with(backend: Backend, mut tags_file: File, path: &Path, dat_offset: u64) -> Result<Arc<dyn Tagger>> {
        match backend {
            Backend::Bulk => {
                tags_file
                    .seek(SeekFrom::Start(dat_offset))
                    .map_err(|e| Error::io("package::open", Some(path.display().to_string()), e))?;
                let mut data = Vec::new();
                tags_file
                    .read_to_end(&mut data)
                    .map_err(|e| Error::io("package::open", Some(path.display().to_string()), e))?;
                Ok(Arc::new(BulkTagger::new(data, dat_offset)))
            }
            Backend::Mmap => Ok(Arc::new(MmapTagger::new(tags_file, dat_offset))),
            Backend::Fsys => Ok(Arc::new(FsysTagger::new(tags_file, dat_offset))),
        }
    }

    /// Resolve `name` against this package's workspace into an FTT key,
    /// rejecting any `..` or empty path segment (§7 Format errors).
    fn resolve_key(&self, name: &str) -> Result<String> {
        let key = primitive::normalize(&primitive::join(&self.workspace, name));
        primitive::reject_traversal("package::resolve_key", &key)?;
        Ok(key)
    }

    pub fn has_tagset(&self, name: &str) -> bool {
        self.resolve_key(name).map(|key| self.ftt.has(&key)).unwrap_or(false)
    }

    /// Every non-info FTT key under this workspace, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        let prefix = if self.workspace.is_empty() { String::new() } else { format!("{}/", self.workspace) };
        self.ftt
            .snapshot()
            .into_iter()
            .filter(|(k, _)| !k.is_empty())
            .filter_map(|(k, _)| if prefix.is_empty() { Some(k) } else { k.strip_prefix(prefix.as_str()).map(|r| r.to_string()) })
            .collect()
    }

    /// Resolve `name`: an exact FTT hit returns a readable nested file; a
    /// prefix match with no exact hit returns `Entry::Dir`.
    pub fn open_entry(&self, name: &str) -> Result<Entry> {
        let key = self.resolve_key(name)?;
        if let Some(ts) = self.ftt.get(&key) {
            return Ok(Entry::File(self.tagger.open_tagset(&ts)?));
        }
        if key.is_empty() || self.has_children(&key) {
            return Ok(Entry::Dir);
        }
        Err(Error::with_path("package::open_entry", key, ErrorKind::NotFound))
    }

    pub fn stat(&self, name: &str) -> Result<FileInfo> {
        let key = self.resolve_key(name)?;
        if let Some(ts) = self.ftt.get(&key) {
            return Ok(ts.file_info());
        }
        if key.is_empty() || self.has_children(&key) {
            let (_, base) = primitive::split_dir_base(&key);
            return Ok(FileInfo { name: base.to_string(), size: None, mtime: None, isdir: true });
        }
        Err(Error::with_path("package::stat", key, ErrorKind::NotFound))
    }

    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let key = self.resolve_key(name)?;
        let ts = self
            .ftt
            .get(&key)
            .ok_or_else(|| Error::with_path("package::read_file", key, ErrorKind::NotFound))?;
        let mut f = self.tagger.open_tagset(&ts)?;
        let mut buf = Vec::with_capacity(ts.size().unwrap_or(0) as usize);
        f.read_to_end(&mut buf).map_err(|e| Error::io("package::read_file", None::<String>, e))?;
        f.close()?;
        Ok(buf)
    }

    /// Immediate children of `name` (files and synthesized subdirectories),
    /// deduplicated and in first-seen order.
    pub fn read_dir(&self, name: &str) -> Result<Vec<FileInfo>> {
        let dir_key = self.resolve_key(name)?;
        let prefix = if dir_key.is_empty() { String::new() } else { format!("{dir_key}/") };

        let mut seen = Vec::new();
        let mut out = Vec::new();
        for (key, ts) in self.ftt.snapshot() {
            if key.is_empty() {
                continue;
            }
            let rest = match key.strip_prefix(prefix.as_str()) {
                Some(r) if !r.is_empty() => r,
                _ => continue,
            };
            let (child, is_leaf) = match rest.find('/') {
                Some(i) => (&rest[..i], false),
                None => (rest, true),
            };
            if seen.contains(&child.to_string()) {
                continue;
            }
            seen.push(child.to_string());
            out.push(if is_leaf {
                ts.file_info()
            } else {
                FileInfo { name: child.to_string(), size: None, mtime: None, isdir: true }
            });
        }

        if out.is_empty() && !dir_key.is_empty() {
            return Err(Error::with_path("package::read_dir", dir_key, ErrorKind::NotFound));
        }
        Ok(out)
    }

    /// A new `Package` sharing this one's FTT/tagger, scoped to `dir`
    /// beneath the current workspace. Fails if nothing exists under it.
    pub fn sub(&self, dir: &str) -> Result<Self> {
        let sub_key = self.resolve_key(dir)?;
        if !self.has_children(&sub_key) && !self.ftt.has(&sub_key) {
            return Err(Error::with_path("package::sub", sub_key, ErrorKind::NotFound));
        }
        Ok(Package { ftt: self.ftt.clone(), tagger: self.tagger.clone(), workspace: sub_key, path: self.path.clone() })
    }

    /// The on-disk path this package was opened from (the `.wpt`/`.wpk`
    /// file, not a derived `.wpf`). Used by `Union`'s `wpk/<N>` introspection
    /// entry.
    pub fn source_path(&self) -> &Path {
        &self.path
    }

    /// Match `pattern` (a `glob::Pattern`) against every key under this
    /// workspace, relative to it.
    pub fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let pat = glob::Pattern::new(pattern)
            .map_err(|_| Error::with_path("package::glob", pattern.to_string(), ErrorKind::InvalidPath))?;
        let prefix = if self.workspace.is_empty() { String::new() } else { format!("{}/", self.workspace) };
        Ok(self
            .ftt
            .snapshot()
            .into_iter()
            .filter(|(k, _)| !k.is_empty())
            .filter_map(|(k, _)| k.strip_prefix(prefix.as_str()).map(|r| r.to_string()))
            .filter(|rel| pat.matches(rel))
            .collect())
    }

    /// Release the backend's shared OS handle. Safe to call on any clone;
    /// idempotent.
    pub fn close(&self) -> Result<()> {
        self.tagger.close()
    }

    fn has_children(&self, dir_key: &str) -> bool {
        let prefix = format!("{dir_key}/");
        self.ftt.snapshot().into_iter().any(|(k, _)| k.starts_with(&prefix))
    }
}
