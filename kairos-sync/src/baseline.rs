//! Baseline file handling
//!
//! The baseline lists every data-file path the receiver has acknowledged,
//! one absolute path per line. It is only ever replaced whole, through a
//! staging file and a rename, so an observer sees either the old or the
//! new version and never a partial one.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::config::SyncPaths;
use crate::errors::Result;

/// Parse baseline content into a set of paths.
pub fn parse_baseline(content: &str) -> BTreeSet<PathBuf> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Read the baseline into a set. A missing file is an empty baseline.
pub async fn read_baseline(path: &Path) -> Result<BTreeSet<PathBuf>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(parse_baseline(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeSet::new()),
        Err(e) => Err(e.into()),
    }
}

/// Write `entries` through the staging file, then swap it in as the new
/// baseline: delete the old file, rename the staged one.
pub async fn promote_baseline<'a, I>(paths: &SyncPaths, entries: I) -> Result<()>
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    let staging = paths.staging_file();
    let baseline = paths.baseline_file();
    if let Some(parent) = staging.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut content = String::new();
    for entry in entries {
        content.push_str(&format!("{}\n", entry.display()));
    }
    let mut file = tokio::fs::File::create(&staging).await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    if baseline.exists() {
        tokio::fs::remove_file(&baseline).await?;
    }
    tokio::fs::rename(&staging, &baseline).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_baseline_is_empty() {
        let dir = tempdir().unwrap();
        let set = read_baseline(&dir.path().join("absent.txt")).await.unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_promote_replaces_whole_file() {
        let dir = tempdir().unwrap();
        let paths = SyncPaths::new(dir.path());

        let first: BTreeSet<PathBuf> =
            [PathBuf::from("/d/g1/a.ts"), PathBuf::from("/d/g1/b.ts")].into();
        promote_baseline(&paths, &first).await.unwrap();
        assert_eq!(read_baseline(&paths.baseline_file()).await.unwrap(), first);
        assert!(!paths.staging_file().exists());

        let second: BTreeSet<PathBuf> = [PathBuf::from("/d/g2/c.ts")].into();
        promote_baseline(&paths, &second).await.unwrap();
        assert_eq!(read_baseline(&paths.baseline_file()).await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_promote_empty_set_creates_empty_file() {
        let dir = tempdir().unwrap();
        let paths = SyncPaths::new(dir.path());
        promote_baseline(&paths, &BTreeSet::new()).await.unwrap();
        assert!(paths.baseline_file().exists());
        assert!(read_baseline(&paths.baseline_file()).await.unwrap().is_empty());
    }
}
