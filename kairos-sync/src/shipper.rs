//! Data-file shipping
//!
//! Per group: deletion notices first, then additions. Each addition is
//! transferred from a hard-link snapshot so the engine's compactions
//! cannot move the bytes mid-stream; the sidecar goes first, then the data
//! file, each chunked, digest-verified and retry-bounded.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use kairos_proto::{SyncClient, DATA_CHUNK_SIZE, MAX_SYNC_FILE_TRY};

use crate::errors::{Result, SyncError};
use crate::inventory::sidecar_path;
use crate::journal::SyncJournal;

/// Hard-link snapshot of one data file and its sidecar. The links live only
/// for the duration of the file's transfer; both are removed on every exit
/// path.
#[derive(Debug)]
pub struct Snapshot {
    data: PathBuf,
    sidecar: PathBuf,
}

impl Snapshot {
    /// Link `original` and its sidecar into `snapshot_dir`. The snapshot
    /// directory must be on the same filesystem as the data file.
    pub fn create(original: &Path, snapshot_dir: &Path) -> Result<Snapshot> {
        let snap_err = |source: std::io::Error| SyncError::Snapshot {
            path: original.to_path_buf(),
            source,
        };

        std::fs::create_dir_all(snapshot_dir).map_err(snap_err)?;
        let file_name = original.file_name().ok_or_else(|| {
            snap_err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path has no file name",
            ))
        })?;

        let data = snapshot_dir.join(file_name);
        let sidecar = sidecar_path(&data);
        std::fs::hard_link(original, &data).map_err(snap_err)?;
        if let Err(e) = std::fs::hard_link(sidecar_path(original), &sidecar) {
            let _ = std::fs::remove_file(&data);
            return Err(snap_err(e));
        }
        Ok(Snapshot { data, sidecar })
    }

    pub fn data_path(&self) -> &Path {
        &self.data
    }

    pub fn sidecar_path(&self) -> &Path {
        &self.sidecar
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.sidecar);
        let _ = std::fs::remove_file(&self.data);
    }
}

enum Attempt {
    Delivered,
    Retry(String),
}

/// Ships one group's deletions and additions over an established
/// connection, journaling every acknowledgement.
pub struct FileShipper<'a> {
    client: &'a mut SyncClient,
    journal: &'a mut SyncJournal,
}

impl<'a> FileShipper<'a> {
    pub fn new(client: &'a mut SyncClient, journal: &'a mut SyncJournal) -> FileShipper<'a> {
        FileShipper { client, journal }
    }

    /// Notify the receiver of every vanished file. A refused or failed
    /// notice is skipped, not fatal; the file stays in the baseline and is
    /// re-noticed next cycle.
    pub async fn ship_deletions(
        &mut self,
        group: &str,
        deleted: BTreeSet<PathBuf>,
        last_local: &mut BTreeSet<PathBuf>,
    ) -> Result<()> {
        if deleted.is_empty() {
            info!(group, "no deleted files to sync");
            return Ok(());
        }
        info!(group, count = deleted.len(), "syncing names of deleted files");
        self.journal.begin_deletions().await?;

        for file in deleted {
            let name = match file.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => continue,
            };
            match self.client.sync_deleted_file_name(&name).await {
                Ok(status) if status.success => {
                    last_local.remove(&file);
                    self.journal.deleted(&file).await?;
                }
                Ok(status) => {
                    warn!(
                        "receiver did not accept deletion of {}: {}, skipping",
                        file.display(),
                        status.error_msg
                    );
                }
                Err(e) => {
                    warn!("cannot sync deleted file name {}: {}, skipping", file.display(), e);
                }
            }
        }
        info!(group, "finished syncing names of deleted files");
        Ok(())
    }

    /// Ship every new data file: snapshot, sidecar, data file, journal.
    /// A failed snapshot skips the file; a transfer that exhausts its
    /// retries aborts the cycle.
    pub async fn ship_data_files(
        &mut self,
        group: &str,
        to_send: BTreeSet<PathBuf>,
        last_local: &mut BTreeSet<PathBuf>,
        snapshot_dir: &Path,
    ) -> Result<()> {
        if to_send.is_empty() {
            info!(group, "no new data files to sync");
            return Ok(());
        }
        info!(group, count = to_send.len(), "starting to transfer data files");
        self.journal.begin_ts_files().await?;

        let total = to_send.len();
        let mut completed = 0;
        for file in to_send {
            let snapshot = match Snapshot::create(&file, snapshot_dir) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("cannot snapshot {}, skipping this file: {}", file.display(), e);
                    continue;
                }
            };

            self.sync_single_file(snapshot.sidecar_path()).await?;
            self.sync_single_file(snapshot.data_path()).await?;

            last_local.insert(file.clone());
            self.journal.sent(&file).await?;
            completed += 1;
            info!(group, completed, total, "shipped {}", file.display());
        }
        info!(group, "finished transferring data files");
        Ok(())
    }

    /// Stream one snapshot file. Any refused chunk or failed digest gate
    /// restarts the file from byte zero with a fresh digest, up to the
    /// per-file bound.
    async fn sync_single_file(&mut self, path: &Path) -> Result<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.client.init_sync_data(&name).await?;

        for attempt in 1..=MAX_SYNC_FILE_TRY {
            match self.stream_once(path).await? {
                Attempt::Delivered => {
                    info!("receiver verified {}", name);
                    return Ok(());
                }
                Attempt::Retry(reason) => {
                    warn!(attempt, "transfer of {} failed: {}, restarting", name, reason);
                }
            }
        }
        Err(SyncError::Connection(format!(
            "cannot sync file {} after {} attempts",
            path.display(),
            MAX_SYNC_FILE_TRY
        )))
    }

    async fn stream_once(&mut self, path: &Path) -> Result<Attempt> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut digest = Md5::new();
        let mut buf = vec![0u8; DATA_CHUNK_SIZE];

        loop {
            // Fill a whole chunk; short reads do not shrink the chunk size.
            let mut filled = 0;
            while filled < buf.len() {
                let n = file.read(&mut buf[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }
            digest.update(&buf[..filled]);
            let status = self.client.sync_data(&buf[..filled]).await?;
            if !status.success {
                return Ok(Attempt::Retry(format!(
                    "receiver refused chunk: {}",
                    status.error_msg
                )));
            }
            if filled < buf.len() {
                break;
            }
        }

        let sent = hex::encode(digest.finalize());
        let status = self.client.check_data_md5(&sent).await?;
        if status.success && status.msg == sent {
            Ok(Attempt::Delivered)
        } else {
            Ok(Attempt::Retry(format!(
                "digest mismatch, sent {} but receiver echoed {}",
                sent, status.msg
            )))
        }
    }
}
