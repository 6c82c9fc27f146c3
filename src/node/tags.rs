//! Tag index
//!
//! Maps: tag name → (timestamp, volume) of the freshest version on any
//! local volume. The index is a pure in-memory cache; the disk is the
//! source of truth and the index is always reconstructable by scanning.
//! Memory use is bounded only by the number of distinct tag names observed
//! locally.

use crate::common::layout::{self, Timestamp};
use crate::node::volume::Volume;
use std::collections::HashMap;
use std::path::Path;

/// Freshest known version of one tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEntry {
    pub timestamp: Timestamp,
    pub volume: String,
}

/// In-memory tag index
#[derive(Debug, Default, Clone)]
pub struct TagIndex {
    entries: HashMap<String, TagEntry>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Rebuild the index by scanning every volume's tag tree.
    ///
    /// Basenames starting with `!` are writes in progress and never indexed.
    /// Names that fail to decode or decompose are logged and skipped.
    pub fn scan(root: &Path, volumes: &[Volume]) -> Self {
        let mut index = TagIndex::new();
        for vol in volumes {
            let dir = root.join(&vol.name).join(layout::ObjectKind::Tag.dir());
            index = layout::fold_files(&dir, index, &mut |basename, path, mut acc| {
                if basename.starts_with('!') {
                    return acc;
                }
                let objname = match layout::decode_name(basename) {
                    Ok(objname) => objname,
                    Err(_) => {
                        tracing::warn!("skipping undecodable tag file {}", path.display());
                        return acc;
                    }
                };
                match layout::unpack_objname(&objname) {
                    Ok((name, timestamp)) => {
                        acc.observe(
                            name,
                            TagEntry {
                                timestamp,
                                volume: vol.name.clone(),
                            },
                        );
                    }
                    Err(_) => {
                        tracing::warn!("skipping malformed tag file {}", path.display());
                    }
                }
                acc
            });
        }
        index
    }

    /// Insert, or replace only if the incoming timestamp is strictly newer
    pub fn observe(&mut self, name: String, entry: TagEntry) {
        match self.entries.get(&name) {
            Some(existing) if entry.timestamp <= existing.timestamp => {}
            _ => {
                self.entries.insert(name, entry);
            }
        }
    }

    /// Unconditional set. Used on commit, where the successful rename has
    /// already established this as the node's latest version.
    pub fn replace(&mut self, name: String, entry: TagEntry) {
        self.entries.insert(name, entry);
    }

    pub fn lookup(&self, name: &str) -> Option<&TagEntry> {
        self.entries.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::layout::{encode_name, hashdir, ObjectKind};
    use crate::node::volume;
    use std::fs;
    use tempfile::tempdir;

    fn entry(stamp: &str, vol: &str) -> TagEntry {
        TagEntry {
            timestamp: Timestamp::parse(stamp).unwrap(),
            volume: vol.to_string(),
        }
    }

    /// Write a tag object file where the scan expects it
    fn plant_tag(root: &Path, vol: &str, objname: &str) {
        let (local, _) = hashdir(objname, "node1", ObjectKind::Tag, root, vol);
        layout::ensure_dir(&local).unwrap();
        fs::write(local, b"tagdata").unwrap();
    }

    #[test]
    fn test_observe_keeps_newest() {
        let mut index = TagIndex::new();
        index.observe("t".into(), entry("50", "vol0"));
        index.observe("t".into(), entry("70", "vol1"));
        index.observe("t".into(), entry("60", "vol0"));

        let found = index.lookup("t").unwrap();
        assert_eq!(found.timestamp.as_str(), "70");
        assert_eq!(found.volume, "vol1");
    }

    #[test]
    fn test_observe_equal_timestamp_keeps_first() {
        let mut index = TagIndex::new();
        index.observe("t".into(), entry("50", "vol0"));
        index.observe("t".into(), entry("50", "vol1"));
        assert_eq!(index.lookup("t").unwrap().volume, "vol0");
    }

    #[test]
    fn test_replace_is_unconditional() {
        let mut index = TagIndex::new();
        index.observe("t".into(), entry("70", "vol1"));
        index.replace("t".into(), entry("50", "vol0"));
        assert_eq!(index.lookup("t").unwrap().timestamp.as_str(), "50");
    }

    #[test]
    fn test_scan_selects_max_per_tag() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("vol0")).unwrap();
        fs::create_dir_all(dir.path().join("vol1")).unwrap();
        let volumes = volume::discover(dir.path()).unwrap();

        plant_tag(dir.path(), "vol0", "mytag+50");
        plant_tag(dir.path(), "vol1", "mytag+70");
        plant_tag(dir.path(), "vol0", "other+10");

        let index = TagIndex::scan(dir.path(), &volumes);
        assert_eq!(index.len(), 2);

        let found = index.lookup("mytag").unwrap();
        assert_eq!(found.timestamp.as_str(), "70");
        assert_eq!(found.volume, "vol1");
        assert_eq!(index.lookup("other").unwrap().volume, "vol0");
    }

    #[test]
    fn test_scan_skips_partials_and_garbage() {
        let dir = tempdir().unwrap();
        let volumes = volume::discover(dir.path()).unwrap();

        let tag_dir = dir.path().join("vol0/tag/aa/bb");
        fs::create_dir_all(&tag_dir).unwrap();
        fs::write(tag_dir.join("!partial.mytag+100"), b"inflight").unwrap();
        fs::write(tag_dir.join(encode_name("no-delimiter")), b"junk").unwrap();
        fs::write(tag_dir.join("good+30"), b"ok").unwrap();

        let index = TagIndex::scan(dir.path(), &volumes);
        assert_eq!(index.names(), vec!["good".to_string()]);
    }

    #[test]
    fn test_scan_empty_volumes() {
        let dir = tempdir().unwrap();
        let volumes = volume::discover(dir.path()).unwrap();
        let index = TagIndex::scan(dir.path(), &volumes);
        assert!(index.is_empty());
    }
}
