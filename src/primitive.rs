//! Typed primitives: little-endian uint codec of configurable width, path
//! normalization helpers, and a thread-safe insertion-ordered map.

use std::sync::RwLock;

use indexmap::IndexMap;
use std::hash::Hash;

use crate::error::{Error, ErrorKind, Result};

/// Read an unsigned integer of `width` bytes (1, 2, 4, or 8), little-endian,
/// from the front of `buf`. Any other width is a programming error: it
/// indicates a `TypeSize` was constructed outside `TypeSize::new`.
pub fn read_uint(width: u8, buf: &[u8]) -> u64 {
    match width {
        1 => buf[0] as u64,
        2 => u16::from_le_bytes(buf[..2].try_into().unwrap()) as u64,
        4 => u32::from_le_bytes(buf[..4].try_into().unwrap()) as u64,
        8 => u64::from_le_bytes(buf[..8].try_into().unwrap()),
        other => panic!("unsupported integer width {other}"),
    }
}

/// Write `value` as a `width`-byte little-endian unsigned integer, appending
/// to `out`. Same width contract as `read_uint`.
pub fn write_uint(width: u8, value: u64, out: &mut Vec<u8>) {
    match width {
        1 => out.push(value as u8),
        2 => out.extend_from_slice(&(value as u16).to_le_bytes()),
        4 => out.extend_from_slice(&(value as u32).to_le_bytes()),
        8 => out.extend_from_slice(&value.to_le_bytes()),
        other => panic!("unsupported integer width {other}"),
    }
}

/// The largest value representable in `width` bytes.
pub fn max_for_width(width: u8) -> u64 {
    match width {
        1 => u8::MAX as u64,
        2 => u16::MAX as u64,
        4 => u32::MAX as u64,
        8 => u64::MAX,
        other => panic!("unsupported integer width {other}"),
    }
}

/// The minimal width in `{1, 2, 4, 8}` that can represent `value`.
pub fn min_width(value: u64) -> u8 {
    if value <= u8::MAX as u64 {
        1
    } else if value <= u16::MAX as u64 {
        2
    } else if value <= u32::MAX as u64 {
        4
    } else {
        8
    }
}

/// Validate that `width` is one of the widths this crate's codecs support
/// for the header's `tidsz`/`tagsz` fields (1, 2, or 4 bytes).
pub fn validate_id_width(field: &'static str, width: u8) -> Result<()> {
    match width {
        1 | 2 | 4 => Ok(()),
        got => Err(Error::new("validate_width", ErrorKind::UnsupportedWidth { field, got })),
    }
}

/// Validate that `width` is one of the widths supported for the header's
/// `tssize` field (2 or 4 bytes).
pub fn validate_tssize(width: u8) -> Result<()> {
    match width {
        2 | 4 => Ok(()),
        got => Err(Error::new(
            "validate_width",
            ErrorKind::UnsupportedWidth { field: "tssize", got },
        )),
    }
}

/// Convert backslashes to forward slashes. Allocates only when a backslash
/// is actually present.
pub fn to_slash(p: &str) -> std::borrow::Cow<'_, str> {
    if p.contains('\\') {
        std::borrow::Cow::Owned(p.replace('\\', "/"))
    } else {
        std::borrow::Cow::Borrowed(p)
    }
}

/// ASCII-lowercase fast path: avoids allocating when `p` is already lower.
pub fn to_lower_ascii(p: &str) -> std::borrow::Cow<'_, str> {
    if p.bytes().any(|b| b.is_ascii_uppercase()) {
        std::borrow::Cow::Owned(p.to_ascii_lowercase())
    } else {
        std::borrow::Cow::Borrowed(p)
    }
}

/// The FTT key for a human-case, possibly backslash-delimited path:
/// lowercase ASCII, forward slashes.
pub fn normalize(p: &str) -> String {
    to_lower_ascii(&to_slash(p)).into_owned()
}

/// Join two path segments with exactly one slash between them. Handles
/// either side already carrying a slash, and an empty `base`.
pub fn join(base: &str, rest: &str) -> String {
    if base.is_empty() {
        return rest.to_string();
    }
    if rest.is_empty() {
        return base.to_string();
    }
    let base_has = base.ends_with('/');
    let rest_has = rest.starts_with('/');
    match (base_has, rest_has) {
        (true, true) => format!("{base}{}", &rest[1..]),
        (true, false) | (false, true) => format!("{base}{rest}"),
        (false, false) => format!("{base}/{rest}"),
    }
}

/// Reject a path that escapes its containing directory: any `..` segment,
/// or an empty segment from a doubled/leading/trailing slash. An entirely
/// empty `path` is exempt (it denotes the package or workspace root, not a
/// forbidden empty segment).
pub fn reject_traversal(op: &'static str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Ok(());
    }
    for segment in path.split('/') {
        if segment.is_empty() || segment == ".." {
            return Err(Error::with_path(op, path.to_string(), ErrorKind::InvalidPath));
        }
    }
    Ok(())
}

/// Split a slash-separated path into `(dir, base)`. `dir` is empty when
/// there is no slash.
pub fn split_dir_base(p: &str) -> (&str, &str) {
    match p.rfind('/') {
        Some(i) => (&p[..i], &p[i + 1..]),
        None => ("", p),
    }
}

/// The basename's extension, including the leading dot, or `""` if none.
pub fn extension(p: &str) -> &str {
    let (_, base) = split_dir_base(p);
    match base.rfind('.') {
        Some(0) => "", // dotfile, e.g. ".gitignore", has no extension
        Some(i) => &base[i..],
        None => "",
    }
}

/// Replace `p`'s extension with `new_ext` (which should include the dot).
pub fn with_extension(p: &str, new_ext: &str) -> String {
    let ext = extension(p);
    let stem = &p[..p.len() - ext.len()];
    format!("{stem}{new_ext}")
}

/// Expand `$VAR`, `${VAR}`, and `%VAR%` references in `s` using `lookup`.
/// Names that `lookup` doesn't resolve are left unchanged, reference and
/// all.
pub fn expand_env(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                if let Some(end) = s[i + 2..].find('}') {
                    let name = &s[i + 2..i + 2 + end];
                    match lookup(name) {
                        Some(v) => out.push_str(&v),
                        None => out.push_str(&s[i..i + 2 + end + 1]),
                    }
                    i += 2 + end + 1;
                    continue;
                }
                out.push(bytes[i] as char);
                i += 1;
            }
            b'$' => {
                let start = i + 1;
                let end = s[start..]
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .map(|n| start + n)
                    .unwrap_or(s.len());
                if end > start {
                    let name = &s[start..end];
                    match lookup(name) {
                        Some(v) => out.push_str(&v),
                        None => out.push_str(&s[i..end]),
                    }
                    i = end;
                    continue;
                }
                out.push('$');
                i += 1;
            }
            b'%' => {
                if let Some(end) = s[i + 1..].find('%') {
                    let name = &s[i + 1..i + 1 + end];
                    if !name.is_empty() {
                        match lookup(name) {
                            Some(v) => out.push_str(&v),
                            None => out.push_str(&s[i..i + 1 + end + 1]),
                        }
                        i += 1 + end + 1;
                        continue;
                    }
                }
                out.push('%');
                i += 1;
            }
            b => {
                // Safe: we only special-case single-byte ASCII markers above,
                // so falling through one byte at a time never splits a
                // multi-byte UTF-8 sequence incorrectly (those bytes are
                // always >= 0x80 and hit this arm whole, one at a time).
                out.push(b as char);
                i += 1;
            }
        }
    }
    out
}

/// A thread-safe, insertion-ordered map. Built over `indexmap::IndexMap`
/// behind an `RwLock`, which gives O(1) lookup and stable iteration order
/// for free; `range` snapshots entries under the read lock and invokes the
/// callback outside it, so callbacks may mutate the map (see SPEC_FULL
/// §4.1 / §5).
pub struct OrderedMap<K, V> {
    inner: RwLock<IndexMap<K, V>>,
}

impl<K, V> Default for OrderedMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        OrderedMap { inner: RwLock::new(IndexMap::new()) }
    }
}

impl<K, V> OrderedMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, k: &K) -> bool {
        self.inner.read().unwrap().contains_key(k)
    }

    pub fn get(&self, k: &K) -> Option<V> {
        self.inner.read().unwrap().get(k).cloned()
    }

    /// Insert, returning the previous value if `k` was already present.
    pub fn set(&self, k: K, v: V) -> Option<V> {
        self.inner.write().unwrap().insert(k, v)
    }

    /// Remove `k`, preserving the insertion order of what remains.
    pub fn delete(&self, k: &K) -> Option<V> {
        self.inner.write().unwrap().shift_remove(k)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the current entries (in insertion order) and invoke `f` on
    /// each, outside the lock.
    pub fn range(&self, mut f: impl FnMut(&K, &V)) {
        let snapshot: Vec<(K, V)> = {
            let guard = self.inner.read().unwrap();
            guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        for (k, v) in &snapshot {
            f(k, v);
        }
    }

    /// A plain snapshot of the current entries, in insertion order.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.inner.read().unwrap().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Rename key `old` to `new` in place, preserving its position and
    /// value. Returns `false` if `old` is absent or `new` already exists.
    pub fn rekey(&self, old: &K, new: K) -> bool {
        let mut guard = self.inner.write().unwrap();
        if !guard.contains_key(old) || guard.contains_key(&new) {
            return false;
        }
        if let Some(idx) = guard.get_index_of(old) {
            let (_, v) = guard.shift_remove_index(idx).unwrap();
            guard.shift_insert(idx, new, v);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint_roundtrip_all_widths() {
        for &width in &[1u8, 2, 4, 8] {
            let max = match width {
                1 => u8::MAX as u64,
                2 => u16::MAX as u64,
                4 => u32::MAX as u64,
                8 => u64::MAX,
                _ => unreachable!(),
            };
            for v in [0, 1, max / 2, max] {
                let mut buf = Vec::new();
                write_uint(width, v, &mut buf);
                assert_eq!(buf.len(), width as usize);
                assert_eq!(read_uint(width, &buf), v);
            }
        }
    }

    #[test]
    fn min_width_picks_smallest() {
        assert_eq!(min_width(0), 1);
        assert_eq!(min_width(255), 1);
        assert_eq!(min_width(256), 2);
        assert_eq!(min_width(65535), 2);
        assert_eq!(min_width(65536), 4);
        assert_eq!(min_width(u32::MAX as u64), 4);
        assert_eq!(min_width(u32::MAX as u64 + 1), 8);
    }

    #[test]
    fn slash_and_lower_are_allocation_free_when_already_normal() {
        assert!(matches!(to_slash("a/b/c"), std::borrow::Cow::Borrowed(_)));
        assert!(matches!(to_lower_ascii("a/b/c"), std::borrow::Cow::Borrowed(_)));
        assert_eq!(to_slash("a\\b\\c"), "a/b/c");
        assert_eq!(to_lower_ascii("A/B"), "a/b");
    }

    #[test]
    fn normalize_composes_slash_and_lower() {
        assert_eq!(normalize("Dir\\SubDir\\File.TXT"), "dir/subdir/file.txt");
    }

    #[test]
    fn join_handles_slash_overlap() {
        assert_eq!(join("a", "b"), "a/b");
        assert_eq!(join("a/", "b"), "a/b");
        assert_eq!(join("a", "/b"), "a/b");
        assert_eq!(join("a/", "/b"), "a/b");
        assert_eq!(join("", "b"), "b");
        assert_eq!(join("a", ""), "a");
    }

    #[test]
    fn reject_traversal_catches_dotdot_and_empty_segments() {
        assert!(reject_traversal("test", "a/b.txt").is_ok());
        assert!(reject_traversal("test", "").is_ok());
        assert!(reject_traversal("test", "..").is_err());
        assert!(reject_traversal("test", "a/../b").is_err());
        assert!(reject_traversal("test", "../../etc/passwd").is_err());
        assert!(reject_traversal("test", "a//b").is_err());
        assert!(reject_traversal("test", "/a").is_err());
        assert!(reject_traversal("test", "a/").is_err());
    }

    #[test]
    fn split_dir_base_and_extension() {
        assert_eq!(split_dir_base("a/b/c.txt"), ("a/b", "c.txt"));
        assert_eq!(split_dir_base("c.txt"), ("", "c.txt"));
        assert_eq!(extension("a/b/c.txt"), ".txt");
        assert_eq!(extension("a/b/c"), "");
        assert_eq!(extension(".gitignore"), "");
        assert_eq!(with_extension("a/b/c.wpk", ".wpt"), "a/b/c.wpt");
    }

    #[test]
    fn expand_env_all_three_syntaxes() {
        let lookup = |name: &str| match name {
            "HOME" => Some("/home/x".to_string()),
            "X" => Some("y".to_string()),
            _ => None,
        };
        assert_eq!(expand_env("$HOME/a", lookup), "/home/x/a");
        assert_eq!(expand_env("${HOME}/a", lookup), "/home/x/a");
        assert_eq!(expand_env("%HOME%/a", lookup), "/home/x/a");
        assert_eq!(expand_env("$X-$X", lookup), "y-y");
        assert_eq!(expand_env("$NOPE/a", lookup), "$NOPE/a");
        assert_eq!(expand_env("${NOPE}/a", lookup), "${NOPE}/a");
        assert_eq!(expand_env("%NOPE%/a", lookup), "%NOPE%/a");
    }

    #[test]
    fn ordered_map_insertion_order_and_mutating_callback() {
        let m: OrderedMap<String, i32> = OrderedMap::new();
        m.set("a".into(), 1);
        m.set("b".into(), 2);
        m.set("c".into(), 3);

        let mut seen = Vec::new();
        m.range(|k, v| {
            seen.push((k.clone(), *v));
            if k == "b" {
                // mutate while iterating a snapshot: must not deadlock
                m.set("d".into(), 4);
            }
        });
        assert_eq!(seen, vec![("a".into(), 1), ("b".into(), 2), ("c".into(), 3)]);
        assert_eq!(m.len(), 4);
    }

    #[test]
    fn ordered_map_rekey_preserves_position() {
        let m: OrderedMap<String, i32> = OrderedMap::new();
        m.set("a".into(), 1);
        m.set("b".into(), 2);
        m.set("c".into(), 3);
        assert!(m.rekey(&"b".to_string(), "bb".to_string()));
        let snap = m.snapshot();
        assert_eq!(
            snap,
            vec![("a".into(), 1), ("bb".into(), 2), ("c".into(), 3)]
        );
        assert!(!m.rekey(&"missing".to_string(), "x".to_string()));
        assert!(!m.rekey(&"a".to_string(), "c".to_string()));
    }
}
