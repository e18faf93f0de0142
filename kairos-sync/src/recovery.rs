//! Startup reconciliation of an interrupted cycle
//!
//! Every journaled `SENT` and `DELETED` was acknowledged by the receiver,
//! so reconciliation *finishes* the interrupted attempt: replay the journal
//! over the old baseline and promote the merged set. Runs per data
//! directory, before that directory's inventory scan, so the scan computes
//! its delta against the reconciled baseline.

use tracing::{info, warn};

use crate::baseline::{promote_baseline, read_baseline};
use crate::config::SyncPaths;
use crate::errors::Result;
use crate::journal::{read_journal, JournalRecord};

/// Reconcile a prior interrupted cycle, if any. Returns `true` when a
/// journal was found and replayed.
pub async fn recover(paths: &SyncPaths) -> Result<bool> {
    let journal_file = paths.journal_file();
    if !journal_file.exists() {
        return Ok(false);
    }

    let records = read_journal(&journal_file).await?;
    info!(
        records = records.len(),
        "found interrupted sync attempt, reconciling {}",
        journal_file.display()
    );

    let mut merged = read_baseline(&paths.baseline_file()).await?;
    for record in records {
        match record {
            JournalRecord::Sent(path) => {
                merged.insert(path);
            }
            JournalRecord::Deleted(path) => {
                merged.remove(&path);
            }
            JournalRecord::BeginDeletions | JournalRecord::BeginTsFiles => {}
        }
    }

    promote_baseline(paths, &merged).await?;

    let snapshot_dir = paths.snapshot_dir();
    if let Err(e) = tokio::fs::remove_dir_all(&snapshot_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("cannot clear snapshot directory {}: {}", snapshot_dir.display(), e);
        }
    }

    // Removing the journal commits the reconciliation.
    tokio::fs::remove_file(&journal_file).await?;
    info!("reconciliation finished, baseline promoted");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::SyncJournal;
    use std::collections::BTreeSet;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_no_journal_is_a_noop() {
        let dir = tempdir().unwrap();
        let paths = SyncPaths::new(dir.path());
        assert!(!recover(&paths).await.unwrap());
        assert!(!paths.baseline_file().exists());
    }

    #[tokio::test]
    async fn test_replay_merges_sent_and_deleted() {
        let dir = tempdir().unwrap();
        let paths = SyncPaths::new(dir.path());

        let old: BTreeSet<PathBuf> =
            [PathBuf::from("/d/g/kept.ts"), PathBuf::from("/d/g/gone.ts")].into();
        promote_baseline(&paths, &old).await.unwrap();

        let mut journal = SyncJournal::open(&paths.journal_file()).await.unwrap();
        journal.begin_deletions().await.unwrap();
        journal.deleted(Path::new("/d/g/gone.ts")).await.unwrap();
        journal.begin_ts_files().await.unwrap();
        journal.sent(Path::new("/d/g/fresh.ts")).await.unwrap();
        drop(journal);

        std::fs::create_dir_all(paths.snapshot_dir()).unwrap();
        std::fs::write(paths.snapshot_dir().join("fresh.ts"), b"x").unwrap();

        assert!(recover(&paths).await.unwrap());

        let merged = read_baseline(&paths.baseline_file()).await.unwrap();
        let expected: BTreeSet<PathBuf> =
            [PathBuf::from("/d/g/kept.ts"), PathBuf::from("/d/g/fresh.ts")].into();
        assert_eq!(merged, expected);
        assert!(!paths.journal_file().exists());
        assert!(!paths.snapshot_dir().exists());
    }

    #[tokio::test]
    async fn test_truncated_tail_is_tolerated() {
        let dir = tempdir().unwrap();
        let paths = SyncPaths::new(dir.path());

        std::fs::create_dir_all(paths.sync_dir()).unwrap();
        std::fs::write(
            paths.journal_file(),
            "BEGIN_TSFILES\nSENT /d/g/a.ts\nSEN",
        )
        .unwrap();

        assert!(recover(&paths).await.unwrap());
        let merged = read_baseline(&paths.baseline_file()).await.unwrap();
        assert_eq!(merged, [PathBuf::from("/d/g/a.ts")].into());
    }
}
