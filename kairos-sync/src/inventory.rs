//! Inventory snapshot of one data directory
//!
//! The inventory builder is an external collaborator; the core only relies
//! on the [`InventoryProvider`] contract. [`DirInventory`] is the shipped
//! default: storage groups are the immediate subdirectories of a data
//! directory, and a data file is sealed (eligible for shipping) once its
//! sidecar exists next to it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use kairos_proto::RESOURCE_SUFFIX;

use crate::baseline::parse_baseline;
use crate::config::SyncPaths;
use crate::errors::Result;

/// What one data directory looks like relative to the last acknowledged
/// baseline. `last_local` starts as the baseline and is mutated as ships
/// succeed; at finalize it becomes the next baseline.
#[derive(Debug, Default)]
pub struct Inventory {
    pub groups: BTreeSet<String>,
    pub to_send: BTreeMap<String, BTreeSet<PathBuf>>,
    pub deleted: BTreeMap<String, BTreeSet<PathBuf>>,
    pub last_local: BTreeMap<String, BTreeSet<PathBuf>>,
}

impl Inventory {
    /// True when the cycle has nothing to ship for this directory.
    pub fn is_empty_delta(&self) -> bool {
        self.to_send.values().all(BTreeSet::is_empty)
            && self.deleted.values().all(BTreeSet::is_empty)
    }

    /// Every known group gets a `last_local` entry, even if the baseline
    /// never mentioned it.
    pub fn seed_groups(&mut self) {
        for group in &self.groups {
            self.last_local.entry(group.clone()).or_default();
        }
    }

    /// Union of all acknowledged paths, for baseline promotion.
    pub fn all_last_local(&self) -> BTreeSet<PathBuf> {
        self.last_local.values().flatten().cloned().collect()
    }
}

pub trait InventoryProvider: Send {
    fn scan(&self, data_dir: &Path, paths: &SyncPaths) -> Result<Inventory>;
}

/// Directory-walking default provider.
pub struct DirInventory;

impl DirInventory {
    fn group_of(path: &Path) -> Option<String> {
        path.parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    }

    /// A sealed data file: a regular file whose sidecar already exists.
    fn is_sealed(path: &Path) -> bool {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => return false,
        };
        if name.starts_with('.') || name.ends_with(RESOURCE_SUFFIX) {
            return false;
        }
        sidecar_path(path).is_file()
    }
}

/// The sidecar path of a data file: the file's path plus the fixed suffix.
pub fn sidecar_path(data_file: &Path) -> PathBuf {
    let mut os = data_file.as_os_str().to_os_string();
    os.push(RESOURCE_SUFFIX);
    PathBuf::from(os)
}

impl InventoryProvider for DirInventory {
    fn scan(&self, data_dir: &Path, paths: &SyncPaths) -> Result<Inventory> {
        std::fs::create_dir_all(paths.sync_dir())?;
        let baseline_file = paths.baseline_file();
        if !baseline_file.exists() {
            std::fs::write(&baseline_file, b"")?;
        }
        let baseline = parse_baseline(&std::fs::read_to_string(&baseline_file)?);

        let mut inventory = Inventory::default();

        // Acknowledged files that vanished from disk are this cycle's
        // deletions; the rest stay in the baseline.
        for path in &baseline {
            let group = match Self::group_of(path) {
                Some(group) => group,
                None => continue,
            };
            inventory.groups.insert(group.clone());
            inventory
                .last_local
                .entry(group.clone())
                .or_default()
                .insert(path.clone());
            if !path.exists() {
                inventory.deleted.entry(group).or_default().insert(path.clone());
            }
        }

        for entry in std::fs::read_dir(data_dir)? {
            let entry = entry?;
            let group_dir = entry.path();
            if !group_dir.is_dir() {
                continue;
            }
            let group = entry.file_name().to_string_lossy().into_owned();
            if group.starts_with('.') {
                continue;
            }
            inventory.groups.insert(group.clone());

            for file in std::fs::read_dir(&group_dir)? {
                let file = file?.path();
                if !file.is_file() || !Self::is_sealed(&file) {
                    continue;
                }
                if !baseline.contains(&file) {
                    inventory.to_send.entry(group.clone()).or_default().insert(file);
                }
            }
        }

        Ok(inventory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn seal(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"series data").unwrap();
        std::fs::write(sidecar_path(&path), b"index").unwrap();
        path
    }

    #[test]
    fn test_fresh_directory_has_empty_delta() {
        let dir = tempdir().unwrap();
        let paths = SyncPaths::new(dir.path());

        let inventory = DirInventory.scan(dir.path(), &paths).unwrap();
        assert!(inventory.is_empty_delta());
        // A first scan materialises an empty baseline.
        assert!(paths.baseline_file().exists());
    }

    #[test]
    fn test_sealed_files_are_new() {
        let dir = tempdir().unwrap();
        let paths = SyncPaths::new(dir.path());
        let group_dir = dir.path().join("root.sg1");
        std::fs::create_dir_all(&group_dir).unwrap();

        let sealed = seal(&group_dir, "a.ts");
        // Unsealed: no sidecar yet, still being written by the engine.
        std::fs::write(group_dir.join("b.ts"), b"partial").unwrap();

        let inventory = DirInventory.scan(dir.path(), &paths).unwrap();
        assert_eq!(inventory.groups, ["root.sg1".to_string()].into());
        assert_eq!(inventory.to_send["root.sg1"], [sealed].into());
        assert!(inventory.deleted.is_empty());
    }

    #[test]
    fn test_baseline_files_are_not_resent_and_missing_ones_are_deleted() {
        let dir = tempdir().unwrap();
        let paths = SyncPaths::new(dir.path());
        let group_dir = dir.path().join("root.sg1");
        std::fs::create_dir_all(&group_dir).unwrap();

        let kept = seal(&group_dir, "kept.ts");
        let gone = group_dir.join("gone.ts");

        let baseline: BTreeSet<PathBuf> = [kept.clone(), gone.clone()].into();
        std::fs::create_dir_all(paths.sync_dir()).unwrap();
        let listing: String = baseline
            .iter()
            .map(|path| format!("{}\n", path.display()))
            .collect();
        std::fs::write(paths.baseline_file(), listing).unwrap();

        let mut inventory = DirInventory.scan(dir.path(), &paths).unwrap();
        inventory.seed_groups();

        assert!(inventory.to_send.is_empty());
        assert_eq!(inventory.deleted["root.sg1"], [gone].into());
        assert_eq!(inventory.last_local["root.sg1"], baseline);
        assert!(!inventory.is_empty_delta());
    }

    #[test]
    fn test_sync_dir_is_not_a_group() {
        let dir = tempdir().unwrap();
        let paths = SyncPaths::new(dir.path());
        std::fs::create_dir_all(paths.snapshot_dir()).unwrap();

        let inventory = DirInventory.scan(dir.path(), &paths).unwrap();
        assert!(inventory.groups.is_empty());
    }
}
