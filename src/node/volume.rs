//! Volume registry
//!
//! Volumes are the `vol*` subdirectories of the storage root, each with a
//! `blob/` and a `tag/` subtree. The registry tracks free and used bytes per
//! volume; placement always picks the volume with the most free space.

use crate::common::layout::{self, ObjectKind, VOLUME_PREFIX};
use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// One local storage volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub free_bytes: u64,
    pub used_bytes: u64,
}

impl Volume {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            free_bytes: 0,
            used_bytes: 0,
        }
    }
}

/// Find the volumes under `root`, creating `vol0` when there are none.
///
/// Ensures every volume has its `blob/` and `tag/` subdirectories. Returns
/// the list sorted by name with zeroed counters; the disk-space monitor
/// fills them in. A root that cannot be enumerated is fatal.
pub fn discover(root: &Path) -> Result<Vec<Volume>> {
    let entries = fs::read_dir(root)
        .map_err(|e| Error::Root(format!("{}: {}", root.display(), e)))?;

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with(VOLUME_PREFIX))
        .collect();

    if names.is_empty() {
        tracing::info!("no volumes under {}, creating vol0", root.display());
        names.push("vol0".to_string());
    }
    names.sort();

    for name in &names {
        for kind in [ObjectKind::Blob, ObjectKind::Tag] {
            fs::create_dir_all(root.join(name).join(kind.dir()))?;
        }
    }

    Ok(names.into_iter().map(Volume::new).collect())
}

/// Re-measure free/used bytes for each volume.
///
/// Entries whose measurement failed are dropped for this cycle; order is
/// preserved. The caller reconciles with `merge` so a volume is never lost
/// to one failed measurement.
pub fn refresh(root: &Path, volumes: &[Volume]) -> Vec<Volume> {
    volumes
        .iter()
        .filter_map(|vol| match layout::diskspace(&root.join(&vol.name)) {
            Ok((free, used)) => Some(Volume {
                name: vol.name.clone(),
                free_bytes: free,
                used_bytes: used,
            }),
            Err(e) => {
                tracing::warn!("diskspace failed for {}: {}", vol.name, e);
                None
            }
        })
        .collect()
}

/// The volume with the most free bytes. None only for an empty registry,
/// which cannot happen after `discover`.
pub fn choose_best(volumes: &[Volume]) -> Option<&Volume> {
    volumes.iter().max_by_key(|vol| vol.free_bytes)
}

/// Union by volume name, preferring entries in `new`.
///
/// The monitor snapshot is authoritative for the volumes it lists; the old
/// registry is authoritative for volumes the monitor failed to measure this
/// cycle. Result is sorted by name.
pub fn merge(old: &[Volume], new: &[Volume]) -> Vec<Volume> {
    let mut merged: BTreeMap<String, Volume> = old
        .iter()
        .map(|vol| (vol.name.clone(), vol.clone()))
        .collect();
    for vol in new {
        merged.insert(vol.name.clone(), vol.clone());
    }
    merged.into_values().collect()
}

/// Summed free and used bytes across the registry
pub fn total_diskspace(volumes: &[Volume]) -> (u64, u64) {
    volumes.iter().fold((0, 0), |(free, used), vol| {
        (free + vol.free_bytes, used + vol.used_bytes)
    })
}
