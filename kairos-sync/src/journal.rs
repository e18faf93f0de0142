//! Progress journal
//!
//! Append-only log of sync milestones for one data directory. A record is
//! durable before the corresponding action is treated as acknowledged, so
//! a crashed cycle can be reconciled from the journal alone. The journal's
//! existence at startup is the "prior run did not finish" signal.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::errors::Result;

pub const BEGIN_DELETIONS: &str = "BEGIN_DELETIONS";
pub const BEGIN_TSFILES: &str = "BEGIN_TSFILES";
const DELETED_PREFIX: &str = "DELETED ";
const SENT_PREFIX: &str = "SENT ";

/// One parsed journal record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    BeginDeletions,
    Deleted(PathBuf),
    BeginTsFiles,
    Sent(PathBuf),
}

/// Writer half. Opened for append before each group's transfer phase and
/// closed (dropped) when the group is done or the cycle aborts.
pub struct SyncJournal {
    file: File,
}

impl SyncJournal {
    pub async fn open(path: &Path) -> Result<SyncJournal> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path).await?;
        Ok(SyncJournal { file })
    }

    /// Every record is flushed and synced before the call returns; nothing
    /// is acknowledged on the strength of an unwritten record.
    async fn record(&mut self, line: &str) -> Result<()> {
        self.file.write_all(line.as_bytes()).await?;
        self.file.write_all(b"\n").await?;
        self.file.flush().await?;
        self.file.sync_data().await?;
        Ok(())
    }

    pub async fn begin_deletions(&mut self) -> Result<()> {
        self.record(BEGIN_DELETIONS).await
    }

    pub async fn deleted(&mut self, path: &Path) -> Result<()> {
        self.record(&format!("{}{}", DELETED_PREFIX, path.display())).await
    }

    pub async fn begin_ts_files(&mut self) -> Result<()> {
        self.record(BEGIN_TSFILES).await
    }

    pub async fn sent(&mut self, path: &Path) -> Result<()> {
        self.record(&format!("{}{}", SENT_PREFIX, path.display())).await
    }
}

/// Parse one journal line. `None` for blank or unrecognized lines; a crash
/// may truncate the final line, and replay tolerates it.
pub fn parse_line(line: &str) -> Option<JournalRecord> {
    let line = line.trim_end();
    if line.is_empty() {
        return None;
    }
    if line == BEGIN_DELETIONS {
        return Some(JournalRecord::BeginDeletions);
    }
    if line == BEGIN_TSFILES {
        return Some(JournalRecord::BeginTsFiles);
    }
    if let Some(path) = line.strip_prefix(DELETED_PREFIX) {
        return Some(JournalRecord::Deleted(PathBuf::from(path)));
    }
    if let Some(path) = line.strip_prefix(SENT_PREFIX) {
        return Some(JournalRecord::Sent(PathBuf::from(path)));
    }
    None
}

/// Read and parse an existing journal, skipping unparseable lines.
pub async fn read_journal(path: &Path) -> Result<Vec<JournalRecord>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(content.lines().filter_map(parse_line).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_records_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.journal");

        let mut journal = SyncJournal::open(&path).await.unwrap();
        journal.begin_deletions().await.unwrap();
        journal.deleted(Path::new("/data/g1/old.ts")).await.unwrap();
        journal.begin_ts_files().await.unwrap();
        journal.sent(Path::new("/data/g1/new.ts")).await.unwrap();
        drop(journal);

        let records = read_journal(&path).await.unwrap();
        assert_eq!(
            records,
            vec![
                JournalRecord::BeginDeletions,
                JournalRecord::Deleted(PathBuf::from("/data/g1/old.ts")),
                JournalRecord::BeginTsFiles,
                JournalRecord::Sent(PathBuf::from("/data/g1/new.ts")),
            ]
        );
    }

    #[tokio::test]
    async fn test_reopen_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.journal");

        let mut journal = SyncJournal::open(&path).await.unwrap();
        journal.sent(Path::new("/a.ts")).await.unwrap();
        drop(journal);

        let mut journal = SyncJournal::open(&path).await.unwrap();
        journal.sent(Path::new("/b.ts")).await.unwrap();
        drop(journal);

        let records = read_journal(&path).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_unrecognized_lines_are_skipped() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("GARBAGE"), None);
        assert_eq!(parse_line("SENT"), None);
        assert_eq!(
            parse_line("SENT /data/with space/f.ts"),
            Some(JournalRecord::Sent(PathBuf::from("/data/with space/f.ts")))
        );
    }
}
