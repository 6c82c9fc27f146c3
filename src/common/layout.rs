//! On-disk layout helpers
//!
//! Every object lives under `<root>/<volume>/<kind>/<d1>/<d2>/<basename>`
//! where `<d1>/<d2>` are two hash-derived hex levels and `<basename>` is the
//! percent-encoded object name. Tag writes in progress carry the `!partial.`
//! marker and are promoted to their final name by an atomic rename.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Marker prefix for tag writes in progress. Basenames starting with `!`
/// are never indexed.
pub const PARTIAL_PREFIX: &str = "!partial.";

/// Directories under the storage root with this prefix are volumes.
pub const VOLUME_PREFIX: &str = "vol";

/// Percent-encoding set for object basenames. Includes `!` so an encoded
/// name can never collide with the partial marker, and excludes `+` so the
/// timestamp delimiter survives encoding.
const NAME_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'%')
    .add(b'!')
    .add(b' ')
    .add(b'?')
    .add(b'#')
    .add(b'&');

/// Which per-volume subtree an object belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Blob,
    Tag,
}

impl ObjectKind {
    pub fn dir(self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tag => "tag",
        }
    }
}

/// Encode an object name for filesystem/URL usage
pub fn encode_name(name: &str) -> String {
    utf8_percent_encode(name, NAME_ENCODE_SET).to_string()
}

/// Decode a percent-encoded object basename
pub fn decode_name(encoded: &str) -> crate::Result<String> {
    percent_decode_str(encoded)
        .decode_utf8()
        .map(|s| s.to_string())
        .map_err(|_| crate::Error::BadObjectName(encoded.to_string()))
}

/// Object version stamp: dash-separated hex fields, compared field by field.
///
/// The raw form is preserved so the stamp round-trips into file names; it is
/// also the tie-break when two stamps decode to the same fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    raw: String,
    fields: Vec<u64>,
}

impl Timestamp {
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        let fields = raw
            .split('-')
            .map(|f| u64::from_str_radix(f, 16).ok())
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            raw: raw.to_string(),
            fields,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fields
            .cmp(&other.fields)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Decompose an object name into `(tag_name, timestamp)`.
///
/// The timestamp is everything after the last `+`, so tag names may
/// themselves contain `+`.
pub fn unpack_objname(objname: &str) -> crate::Result<(String, Timestamp)> {
    let (name, stamp) = objname
        .rsplit_once('+')
        .ok_or_else(|| crate::Error::BadObjectName(objname.to_string()))?;
    if name.is_empty() {
        return Err(crate::Error::BadObjectName(objname.to_string()));
    }
    let timestamp = Timestamp::parse(stamp)
        .ok_or_else(|| crate::Error::BadObjectName(objname.to_string()))?;
    Ok((name.to_string(), timestamp))
}

/// Two-level directory prefix for an object name.
///
/// First two bytes of BLAKE3(name), hex-encoded. Keeps any single directory
/// from accumulating an unbounded number of entries.
fn hash_prefix(name: &str) -> (String, String) {
    let hash = blake3::hash(name.as_bytes());
    let bytes = hash.as_bytes();
    (format!("{:02x}", bytes[0]), format!("{:02x}", bytes[1]))
}

/// Deterministic mapping from object identity to its local path and URL.
///
/// Pure function of its inputs; the external listeners rely on recomputing
/// the same mapping.
pub fn hashdir(
    name: &str,
    node_name: &str,
    kind: ObjectKind,
    root: &Path,
    volume: &str,
) -> (PathBuf, String) {
    let (d1, d2) = hash_prefix(name);
    let basename = encode_name(name);
    let local = root
        .join(volume)
        .join(kind.dir())
        .join(&d1)
        .join(&d2)
        .join(&basename);
    let url = format!(
        "dfs://{}/{}/{}/{}/{}/{}",
        node_name,
        volume,
        kind.dir(),
        d1,
        d2,
        basename
    );
    (local, url)
}

/// The shadow name a tag object is written under before commit
pub fn partial_path(local: &Path) -> PathBuf {
    let basename = local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    local.with_file_name(format!("{}{}", PARTIAL_PREFIX, basename))
}

/// Create all missing parent components of `path`
pub fn ensure_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

/// Atomic same-volume rename that refuses to overwrite an existing target
pub fn safe_rename(src: &Path, dst: &Path) -> io::Result<()> {
    if dst.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("rename target exists: {}", dst.display()),
        ));
    }
    fs::rename(src, dst)
}

/// Free and used bytes of the filesystem holding `path`
pub fn diskspace(path: &Path) -> io::Result<(u64, u64)> {
    let free = fs2::available_space(path)?;
    let total = fs2::total_space(path)?;
    Ok((free, total.saturating_sub(free)))
}

/// Fold `f` over every file basename under `dir`, recursively.
///
/// Unreadable directories contribute nothing; one bad subtree must not hide
/// the rest.
pub fn fold_files<T, F>(dir: &Path, acc: T, f: &mut F) -> T
where
    F: FnMut(&str, &Path, T) -> T,
{
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return acc,
    };

    let mut acc = acc;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            acc = fold_files(&path, acc, f);
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            let name = name.to_string();
            acc = f(&name, &path, acc);
        }
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_unpack_objname() {
        let (name, stamp) = unpack_objname("mytag+100").unwrap();
        assert_eq!(name, "mytag");
        assert_eq!(stamp.as_str(), "100");

        // tag names may contain '+'; the split is at the last one
        let (name, stamp) = unpack_objname("a+b+5f3-2c").unwrap();
        assert_eq!(name, "a+b");
        assert_eq!(stamp.as_str(), "5f3-2c");

        assert!(unpack_objname("notimestamp").is_err());
        assert!(unpack_objname("+100").is_err());
        assert!(unpack_objname("tag+").is_err());
        assert!(unpack_objname("tag+zz").is_err());
    }

    #[test]
    fn test_timestamp_ordering() {
        let t50 = Timestamp::parse("50").unwrap();
        let t70 = Timestamp::parse("70").unwrap();
        let t100 = Timestamp::parse("100").unwrap();
        assert!(t50 < t70);
        assert!(t70 < t100); // field-wise: 0x70 < 0x100

        // multi-field stamps compare structurally, leftmost field first
        let a = Timestamp::parse("5f3-2a-01").unwrap();
        let b = Timestamp::parse("5f3-2b-00").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_encode_decode_name() {
        let name = "my tag/with%odd!chars+100";
        let encoded = encode_name(name);
        assert!(!encoded.contains(' '));
        assert!(!encoded.contains('/'));
        assert!(!encoded.starts_with('!'));
        assert!(encoded.contains('+'));
        assert_eq!(decode_name(&encoded).unwrap(), name);
    }

    #[test]
    fn test_hashdir_deterministic() {
        let root = Path::new("/data");
        let (local1, url1) = hashdir("b1", "node1", ObjectKind::Blob, root, "vol0");
        let (local2, url2) = hashdir("b1", "node1", ObjectKind::Blob, root, "vol0");
        assert_eq!(local1, local2);
        assert_eq!(url1, url2);
        assert!(local1.starts_with("/data/vol0/blob"));
        assert!(url1.starts_with("dfs://node1/vol0/blob/"));

        // kinds map to disjoint subtrees
        let (tag_local, _) = hashdir("b1", "node1", ObjectKind::Tag, root, "vol0");
        assert!(tag_local.starts_with("/data/vol0/tag"));
        assert_ne!(local1, tag_local);
    }

    #[test]
    fn test_partial_path() {
        let local = PathBuf::from("/data/vol0/tag/aa/bb/mytag+100");
        let partial = partial_path(&local);
        assert_eq!(partial.file_name().unwrap(), "!partial.mytag+100");
        assert_eq!(partial.parent(), local.parent());
    }

    #[test]
    fn test_ensure_dir() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a/b/c/file");
        ensure_dir(&target).unwrap();
        assert!(target.parent().unwrap().is_dir());
        assert!(!target.exists());
    }

    #[test]
    fn test_safe_rename() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");

        fs::write(&src, b"data").unwrap();
        safe_rename(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"data");

        // never overwrites
        fs::write(&src, b"other").unwrap();
        let err = safe_rename(&src, &dst).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&dst).unwrap(), b"data");

        // missing source is an error
        let missing = dir.path().join("missing");
        assert!(safe_rename(&missing, &dir.path().join("elsewhere")).is_err());
    }

    #[test]
    fn test_fold_files_recurses() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("aa/bb")).unwrap();
        fs::write(dir.path().join("aa/bb/one"), b"").unwrap();
        fs::write(dir.path().join("aa/two"), b"").unwrap();
        fs::write(dir.path().join("three"), b"").unwrap();

        let mut seen = fold_files(dir.path(), Vec::new(), &mut |name, _, mut acc| {
            acc.push(name.to_string());
            acc
        });
        seen.sort();
        assert_eq!(seen, vec!["one", "three", "two"]);
    }

    #[test]
    fn test_fold_files_missing_dir() {
        let dir = tempdir().unwrap();
        let acc = fold_files(&dir.path().join("absent"), 0u32, &mut |_, _, acc| acc + 1);
        assert_eq!(acc, 0);
    }

    #[test]
    fn test_diskspace() {
        let dir = tempdir().unwrap();
        let (free, _used) = diskspace(dir.path()).unwrap();
        assert!(free > 0);
    }
}
