//! Tag-identifier registry: the fixed vocabulary of numeric tag IDs and
//! their symbolic names, exported for an embedding script host (§4.7).
//!
//! Low IDs are structurally required by the FTT loader (`PATH`, `OFFSET`,
//! `SIZE`); everything above them is optional metadata a writer collaborator
//! may attach.

/// Tag id `0` is a silent no-op for `Tagset::put` (§4.2).
pub const NONE: u32 = 0;

pub const PATH: u32 = 1;
pub const OFFSET: u32 = 2;
pub const SIZE: u32 = 3;
pub const FID: u32 = 4;

pub const MTIME: u32 = 5;
pub const ATIME: u32 = 6;
pub const CTIME: u32 = 7;
pub const BTIME: u32 = 8;

pub const LINK: u32 = 9;
pub const MIME: u32 = 10;

pub const CRC32C: u32 = 11;
pub const CRC64ISO: u32 = 12;
pub const MD5: u32 = 13;
pub const SHA1: u32 = 14;
pub const SHA224: u32 = 15;
pub const SHA256: u32 = 16;
pub const SHA384: u32 = 17;
pub const SHA512: u32 = 18;

pub const LABEL: u32 = 19;
pub const AUTHOR: u32 = 20;
pub const COMMENT: u32 = 21;
pub const VERSION: u32 = 22;
pub const KEYWORDS: u32 = 23;
pub const CATEGORY: u32 = 24;

/// `(symbolic name, numeric id)` pairs, in declaration order, for an
/// embedding script host that needs to resolve tag names to ids (§4.7).
pub const NAMES: &[(&str, u32)] = &[
    ("none", NONE),
    ("path", PATH),
    ("offset", OFFSET),
    ("size", SIZE),
    ("fid", FID),
    ("mtime", MTIME),
    ("atime", ATIME),
    ("ctime", CTIME),
    ("btime", BTIME),
    ("link", LINK),
    ("mime", MIME),
    ("crc32c", CRC32C),
    ("crc64iso", CRC64ISO),
    ("md5", MD5),
    ("sha1", SHA1),
    ("sha224", SHA224),
    ("sha256", SHA256),
    ("sha384", SHA384),
    ("sha512", SHA512),
    ("label", LABEL),
    ("author", AUTHOR),
    ("comment", COMMENT),
    ("version", VERSION),
    ("keywords", KEYWORDS),
    ("category", CATEGORY),
];

/// Resolve a symbolic tag name to its numeric id.
pub fn id_by_name(name: &str) -> Option<u32> {
    NAMES.iter().find(|(n, _)| *n == name).map(|(_, id)| *id)
}

/// Resolve a numeric tag id back to its symbolic name, if it's a
/// registered one (custom/unregistered ids return `None`).
pub fn name_by_id(id: u32) -> Option<&'static str> {
    NAMES.iter().find(|(_, i)| *i == id).map(|(n, _)| *n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip() {
        for &(name, id) in NAMES {
            assert_eq!(id_by_name(name), Some(id));
            assert_eq!(name_by_id(id), Some(name));
        }
        assert_eq!(id_by_name("nonexistent"), None);
        assert_eq!(name_by_id(9999), None);
    }
}
