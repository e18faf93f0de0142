//! Schema log shipping
//!
//! The schema log only ever grows, so each cycle ships the suffix past the
//! persisted cursor. The cursor counts lines already digest-verified by the
//! receiver and advances only after a passing `checkDataMD5`; an aborted
//! shipment leaves it untouched and the whole suffix is re-sent next time.
//!
//! Each shipped line is terminated with `\n`, in the batch buffer and the
//! running digest alike, so the byte stream both sides hash is exactly the
//! file suffix.

use std::path::Path;

use md5::{Digest, Md5};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use kairos_proto::{SyncClient, BATCH_LINE, MAX_SYNC_FILE_TRY, SCHEMA_LOG_NAME};

use crate::config::SenderConfig;
use crate::errors::{Result, SyncError};

/// Ship every schema-log line past the cursor, retry-bounded. On success
/// the cursor equals the number of lines the receiver has verified.
pub async fn sync_schema(client: &mut SyncClient, config: &SenderConfig) -> Result<()> {
    let log_file = config.schema_log_file();
    let cursor_file = config.schema_cursor_file();

    client.init_sync_data(SCHEMA_LOG_NAME).await?;
    for attempt in 1..=MAX_SYNC_FILE_TRY {
        match try_ship(client, &log_file, &cursor_file).await {
            Ok(new_cursor) => {
                if let Err(e) = write_cursor(&cursor_file, new_cursor).await {
                    // The next cycle re-ships the suffix; the receiver
                    // dedupes on its side.
                    warn!("cannot persist schema cursor {}: {}", new_cursor, e);
                }
                info!(lines = new_cursor, "schema log delivered");
                return Ok(());
            }
            Err(e) => {
                warn!(attempt, "schema shipment failed: {}, retrying", e);
            }
        }
    }
    Err(SyncError::Connection(format!(
        "cannot sync schema after {} attempts",
        MAX_SYNC_FILE_TRY
    )))
}

/// One attempt: re-read the cursor, skip exactly that many lines, stream
/// the rest in `BATCH_LINE`-line batches, then pass the digest gate.
async fn try_ship(client: &mut SyncClient, log_file: &Path, cursor_file: &Path) -> Result<u64> {
    let cursor = read_cursor(cursor_file).await;
    let mut digest = Md5::new();
    let mut batch: Vec<u8> = Vec::new();
    let mut batch_lines = 0usize;
    let mut shipped = 0u64;

    // A schema log that does not exist yet is an empty one.
    let file = match File::open(log_file).await {
        Ok(file) => Some(file),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    if let Some(file) = file {
        let mut lines = BufReader::new(file).lines();
        let mut line_no = 0u64;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line_no <= cursor {
                continue;
            }
            batch.extend_from_slice(line.as_bytes());
            batch.push(b'\n');
            digest.update(line.as_bytes());
            digest.update(b"\n");
            shipped += 1;
            batch_lines += 1;
            if batch_lines == BATCH_LINE {
                flush_batch(client, &mut batch).await?;
                batch_lines = 0;
            }
        }
        if !batch.is_empty() {
            flush_batch(client, &mut batch).await?;
        }
    }

    let sent = hex::encode(digest.finalize());
    let status = client.check_data_md5(&sent).await?;
    if status.success && status.msg == sent {
        Ok(cursor + shipped)
    } else {
        Err(SyncError::DigestMismatch {
            path: log_file.to_path_buf(),
            sent,
            echoed: status.msg,
        })
    }
}

async fn flush_batch(client: &mut SyncClient, batch: &mut Vec<u8>) -> Result<()> {
    let status = client.sync_data(batch).await?;
    batch.clear();
    if !status.success {
        return Err(SyncError::Connection(format!(
            "receiver failed to accept schema batch: {}",
            status.error_msg
        )));
    }
    Ok(())
}

/// Lines already committed. Absent or unreadable means nothing shipped yet.
pub async fn read_cursor(path: &Path) -> u64 {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => content.trim().parse().unwrap_or(0),
        Err(_) => 0,
    }
}

pub async fn write_cursor(path: &Path, cursor: u64) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, cursor.to_string()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_cursor_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schema.pos");

        assert_eq!(read_cursor(&path).await, 0);
        write_cursor(&path, 2500).await.unwrap();
        assert_eq!(read_cursor(&path).await, 2500);
    }

    #[tokio::test]
    async fn test_garbage_cursor_reads_as_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schema.pos");
        std::fs::write(&path, "not a number").unwrap();
        assert_eq!(read_cursor(&path).await, 0);
    }
}
