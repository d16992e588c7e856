//! The 64-byte package header: signature, field widths, FTT and data
//! region bounds (§4.3).

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, ErrorKind, Result};
use crate::primitive::{validate_id_width, validate_tssize};

pub const HEADER_SIZE: u64 = 64;

/// Signature written while a writer holds the package open for mutation.
/// Readers refuse this signature with `ErrorKind::NotClosed`.
pub const SIG_PREBUILD: [u8; 24] = *b"Whirlwind 3.x Prebuild  ";

/// Signature written once a `Sync` completes successfully. This crate
/// accepts exactly this 24-byte string and rejects every other value,
/// including other `Whirlwind 3.x`-shaped strings a different writer
/// version might emit — there is no version negotiation (§9 Open Question).
pub const SIG_READY: [u8; 24] = *b"Whirlwind 3.x Package   ";

/// The field widths chosen at package construction and frozen for its
/// lifetime. `tidsz`/`tagsz` must be 1, 2, or 4; `tssize` must be 2 or 4.
/// Mismatched widths between an in-memory `TypeSize` and a package's header
/// are rejected at open (`ErrorKind::SizeMismatch`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSize {
    pub tidsz: u8,
    pub tagsz: u8,
    pub tssize: u8,
}

impl TypeSize {
    /// `tidsz=2, tagsz=2, tssize=4`: comfortably covers the registry's tag
    /// ids and multi-gigabyte tag/tagset bodies without wasting a header
    /// byte per tag the way an 8-byte width would.
    pub const DEFAULT: TypeSize = TypeSize { tidsz: 2, tagsz: 2, tssize: 4 };

    pub fn new(tidsz: u8, tagsz: u8, tssize: u8) -> Result<Self> {
        validate_id_width("tidsz", tidsz)?;
        validate_id_width("tagsz", tagsz)?;
        validate_tssize(tssize)?;
        Ok(TypeSize { tidsz, tagsz, tssize })
    }
}

impl Default for TypeSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The parsed 64-byte preamble of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub ready: bool,
    pub sizes: TypeSize,
    pub fttoffset: u64,
    pub fttsize: u64,
    pub datoffset: u64,
    pub datsize: u64,
}

impl Header {
    /// A package is splitted (tags/data in separate files) exactly when
    /// its data region starts at byte 0 of the `.wpf` file.
    pub fn is_splitted(&self) -> bool {
        self.datoffset == 0
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = Vec::with_capacity(HEADER_SIZE as usize);
        buf.extend_from_slice(if self.ready { &SIG_READY } else { &SIG_PREBUILD });
        buf.push(self.sizes.tidsz);
        buf.push(self.sizes.tagsz);
        buf.push(self.sizes.tssize);
        buf.extend_from_slice(&[0u8; 5]); // reserved
        buf.write_u64::<LittleEndian>(self.fttoffset).unwrap();
        buf.write_u64::<LittleEndian>(self.fttsize).unwrap();
        buf.write_u64::<LittleEndian>(self.datoffset).unwrap();
        buf.write_u64::<LittleEndian>(self.datsize).unwrap();
        debug_assert_eq!(buf.len(), HEADER_SIZE as usize);
        buf.try_into().unwrap()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE as usize {
            return Err(Error::new("header::decode", ErrorKind::Truncated));
        }

        let signature = &buf[0..24];
        let ready = if signature == SIG_READY {
            true
        } else if signature == SIG_PREBUILD {
            return Err(Error::new("header::decode", ErrorKind::NotClosed));
        } else {
            return Err(Error::new("header::decode", ErrorKind::BadSignature));
        };

        let sizes = TypeSize::new(buf[24], buf[25], buf[26])?;

        let mut rest = Cursor::new(&buf[32..64]);
        let fttoffset = rest.read_u64::<LittleEndian>().map_err(|e| Error::io("header::decode", None::<String>, e))?;
        let fttsize = rest.read_u64::<LittleEndian>().map_err(|e| Error::io("header::decode", None::<String>, e))?;
        let datoffset = rest.read_u64::<LittleEndian>().map_err(|e| Error::io("header::decode", None::<String>, e))?;
        let datsize = rest.read_u64::<LittleEndian>().map_err(|e| Error::io("header::decode", None::<String>, e))?;

        Ok(Header { ready, sizes, fttoffset, fttsize, datoffset, datsize })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_are_24_bytes() {
        assert_eq!(SIG_PREBUILD.len(), 24);
        assert_eq!(SIG_READY.len(), 24);
    }

    #[test]
    fn header_roundtrip() {
        let h = Header {
            ready: true,
            sizes: TypeSize::DEFAULT,
            fttoffset: 1000,
            fttsize: 200,
            datoffset: 64,
            datsize: 936,
        };
        let encoded = h.encode();
        assert_eq!(encoded.len(), HEADER_SIZE as usize);
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(decoded, h);
    }

    #[test]
    fn prebuild_signature_is_a_distinguished_error() {
        let h = Header {
            ready: false,
            sizes: TypeSize::DEFAULT,
            fttoffset: 0,
            fttsize: 0,
            datoffset: 64,
            datsize: 0,
        };
        let encoded = h.encode();
        let err = Header::decode(&encoded).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::NotClosed));
    }

    #[test]
    fn garbage_signature_is_rejected() {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[..24].copy_from_slice(b"not a wpk header at all!");
        let err = Header::decode(&buf).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::BadSignature));
    }

    #[test]
    fn other_whirlwind_looking_signature_is_also_rejected() {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[..24].copy_from_slice(b"Whirlwind 3.1 Package   ");
        let err = Header::decode(&buf).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::BadSignature));
    }

    #[test]
    fn is_splitted_reflects_datoffset() {
        let base = Header {
            ready: true,
            sizes: TypeSize::DEFAULT,
            fttoffset: 0,
            fttsize: 0,
            datoffset: 0,
            datsize: 0,
        };
        assert!(base.is_splitted());
        let single = Header { datoffset: HEADER_SIZE, ..base };
        assert!(!single.is_splitted());
    }

    #[test]
    fn unsupported_width_is_rejected() {
        assert!(TypeSize::new(3, 2, 4).is_err());
        assert!(TypeSize::new(2, 2, 8).is_err());
    }
}
