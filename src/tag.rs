//! `Tag`: a single opaque byte blob, with typed constructors/accessors.
//! Accessors validate length and return `None` on anything short or
//! malformed — they never panic on untrusted input (§4.2).

/// Unix time, either as milliseconds since the epoch (8-byte encoding) or
/// seconds + nanoseconds (12-byte encoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagTime {
    Millis(i64),
    SecsNanos(i64, u32),
}

impl TagTime {
    /// Normalize to milliseconds since the epoch, for comparison/display.
    pub fn as_millis(&self) -> i64 {
        match *self {
            TagTime::Millis(ms) => ms,
            TagTime::SecsNanos(secs, nanos) => secs * 1000 + (nanos / 1_000_000) as i64,
        }
    }
}

/// A typed view of a tag's contents, for callers (the script-host
/// collaborator, this crate's CLI demo) that need typed inspection. Never
/// the wire representation itself — that's always the flat `Tag` bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Bool(bool),
    Uint(u64),
    Number(f64),
    Time(TagTime),
    Str(String),
    Bytes(Vec<u8>),
}

/// An opaque, typed byte blob. Tags are created, never mutated in place —
/// replacing a tag's value constructs a new `Tag` and splices it into the
/// owning `Tagset`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tag(pub Vec<u8>);

impl Tag {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Tag(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // --- constructors ---

    pub fn from_bool(v: bool) -> Self {
        Tag(vec![v as u8])
    }

    pub fn from_u8(v: u8) -> Self {
        Tag(vec![v])
    }

    pub fn from_u16(v: u16) -> Self {
        Tag(v.to_le_bytes().to_vec())
    }

    pub fn from_u32(v: u32) -> Self {
        Tag(v.to_le_bytes().to_vec())
    }

    pub fn from_u64(v: u64) -> Self {
        Tag(v.to_le_bytes().to_vec())
    }

    /// Encode `v` in the minimal width from `{1, 2, 4, 8}` that fits it.
    pub fn from_uint_var(v: u64) -> Self {
        match crate::primitive::min_width(v) {
            1 => Self::from_u8(v as u8),
            2 => Self::from_u16(v as u16),
            4 => Self::from_u32(v as u32),
            _ => Self::from_u64(v),
        }
    }

    pub fn from_f64(v: f64) -> Self {
        Tag(v.to_le_bytes().to_vec())
    }

    pub fn from_time_millis(ms: i64) -> Self {
        Tag(ms.to_le_bytes().to_vec())
    }

    pub fn from_time_secs_nanos(secs: i64, nanos: u32) -> Self {
        let mut buf = Vec::with_capacity(12);
        buf.extend_from_slice(&secs.to_le_bytes());
        buf.extend_from_slice(&nanos.to_le_bytes());
        Tag(buf)
    }

    pub fn from_str(s: &str) -> Self {
        Tag(s.as_bytes().to_vec())
    }

    // --- accessors: all validate length, none panic ---

    pub fn as_bool(&self) -> Option<bool> {
        match self.0.as_slice() {
            [0] => Some(false),
            [1] => Some(true),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<u8> {
        self.0.first().copied().filter(|_| self.0.len() == 1)
    }

    pub fn as_u16(&self) -> Option<u16> {
        self.0.get(..2).map(|b| u16::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.0.get(..4).map(|b| u32::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.0.get(..8).map(|b| u64::from_le_bytes(b.try_into().unwrap()))
    }

    /// Decode whichever of the four widths matches this tag's actual
    /// length, widening to `u64`.
    pub fn as_uint_var(&self) -> Option<u64> {
        match self.0.len() {
            1 => self.as_u8().map(|v| v as u64),
            2 => self.as_u16().map(|v| v as u64),
            4 => self.as_u32().map(|v| v as u64),
            8 => self.as_u64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.0.get(..8).map(|b| f64::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn as_time(&self) -> Option<TagTime> {
        match self.0.len() {
            8 => Some(TagTime::Millis(i64::from_le_bytes(self.0[..8].try_into().unwrap()))),
            12 => {
                let secs = i64::from_le_bytes(self.0[..8].try_into().unwrap());
                let nanos = u32::from_le_bytes(self.0[8..12].try_into().unwrap());
                Some(TagTime::SecsNanos(secs, nanos))
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_roundtrip() {
        assert_eq!(Tag::from_bool(true).as_bool(), Some(true));
        assert_eq!(Tag::from_bool(false).as_bool(), Some(false));
        assert_eq!(Tag::from_bytes(vec![2]).as_bool(), None);
    }

    #[test]
    fn fixed_uint_roundtrip() {
        assert_eq!(Tag::from_u8(7).as_u8(), Some(7));
        assert_eq!(Tag::from_u16(700).as_u16(), Some(700));
        assert_eq!(Tag::from_u32(70000).as_u32(), Some(70000));
        assert_eq!(Tag::from_u64(u64::MAX).as_u64(), Some(u64::MAX));
    }

    #[test]
    fn variable_uint_picks_minimal_width_and_decodes_back() {
        for &(v, expected_len) in &[(0u64, 1), (255, 1), (256, 2), (65535, 2), (65536, 4), (u32::MAX as u64, 4), (u32::MAX as u64 + 1, 8)] {
            let t = Tag::from_uint_var(v);
            assert_eq!(t.len(), expected_len);
            assert_eq!(t.as_uint_var(), Some(v));
        }
    }

    #[test]
    fn number_roundtrip() {
        let t = Tag::from_f64(3.5);
        assert_eq!(t.as_f64(), Some(3.5));
    }

    #[test]
    fn time_both_encodings() {
        let t = Tag::from_time_millis(1_700_000_000_000);
        assert_eq!(t.as_time(), Some(TagTime::Millis(1_700_000_000_000)));

        let t = Tag::from_time_secs_nanos(1_700_000_000, 500);
        assert_eq!(t.as_time(), Some(TagTime::SecsNanos(1_700_000_000, 500)));
    }

    #[test]
    fn string_roundtrip() {
        let t = Tag::from_str("hello");
        assert_eq!(t.as_str(), Some("hello"));
    }

    #[test]
    fn short_input_never_panics() {
        let t = Tag::from_bytes(vec![1, 2]);
        assert_eq!(t.as_u32(), None);
        assert_eq!(t.as_u64(), None);
        assert_eq!(t.as_time(), None);
        assert_eq!(Tag::from_bytes(vec![]).as_bool(), None);
    }
}
