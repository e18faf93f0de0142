//! Sender configuration and on-disk layout

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SyncError};

/// Configuration for one sender process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Receiver host name or address.
    pub receiver_host: String,
    /// Receiver port.
    pub receiver_port: u16,
    /// Folder holding the lock file, identity file and schema cursor.
    pub sender_dir: PathBuf,
    /// Data directories scanned for sealed data files.
    pub data_dirs: Vec<PathBuf>,
    /// Directory containing the append-only schema log.
    pub schema_dir: PathBuf,
    /// Period between sync cycles, in seconds.
    pub sync_period_secs: u64,
    /// Period of the liveness heartbeat while a cycle runs, in seconds.
    pub monitor_period_secs: u64,
    /// Connect timeout towards the receiver, in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            receiver_host: "127.0.0.1".to_string(),
            receiver_port: 5555,
            sender_dir: PathBuf::from("kairos/sender"),
            data_dirs: vec![PathBuf::from("data")],
            schema_dir: PathBuf::from("schema"),
            sync_period_secs: 600,
            monitor_period_secs: 60,
            connect_timeout_secs: 10,
        }
    }
}

impl SenderConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<SenderConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: SenderConfig = toml::from_str(&content)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_dirs.is_empty() {
            return Err(SyncError::Config("no data directories configured".to_string()));
        }
        if self.sync_period_secs == 0 {
            return Err(SyncError::Config("sync_period_secs must be positive".to_string()));
        }
        if self.monitor_period_secs == 0 {
            return Err(SyncError::Config("monitor_period_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn receiver_addr(&self) -> String {
        format!("{}:{}", self.receiver_host, self.receiver_port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync_period_secs)
    }

    pub fn monitor_period(&self) -> Duration {
        Duration::from_secs(self.monitor_period_secs)
    }

    /// Lock file guarding single-instance execution.
    pub fn lock_file(&self) -> PathBuf {
        self.sender_dir.join("sender.lock")
    }

    /// File holding the stable 128-bit sender identity.
    pub fn identity_file(&self) -> PathBuf {
        self.sender_dir.join("identity")
    }

    /// File holding the count of schema-log lines already shipped.
    pub fn schema_cursor_file(&self) -> PathBuf {
        self.sender_dir.join("schema.pos")
    }

    /// The append-only schema log itself.
    pub fn schema_log_file(&self) -> PathBuf {
        self.schema_dir.join(kairos_proto::SCHEMA_LOG_NAME)
    }
}

/// Per-data-directory sync artifacts, all under `<data_dir>/.sync/`.
///
/// The snapshot directory has to live inside the data directory: snapshots
/// are hard links, and links only work within one filesystem.
#[derive(Debug, Clone)]
pub struct SyncPaths {
    sync_dir: PathBuf,
}

pub const SYNC_DIR_NAME: &str = ".sync";

impl SyncPaths {
    pub fn new(data_dir: &Path) -> SyncPaths {
        SyncPaths {
            sync_dir: data_dir.join(SYNC_DIR_NAME),
        }
    }

    pub fn sync_dir(&self) -> &Path {
        &self.sync_dir
    }

    /// The progress journal; its mere existence means a prior cycle did not
    /// finish.
    pub fn journal_file(&self) -> PathBuf {
        self.sync_dir.join("sync.journal")
    }

    /// The baseline: every path the receiver acknowledged as of the last
    /// successful cycle.
    pub fn baseline_file(&self) -> PathBuf {
        self.sync_dir.join("last_local_files.txt")
    }

    /// Staging file for the atomic baseline swap.
    pub fn staging_file(&self) -> PathBuf {
        self.sync_dir.join("current_local_files.txt")
    }

    /// Hard-link snapshot directory, cleared wholesale at finalize.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.sync_dir.join("snapshots")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        SenderConfig::default().validate().unwrap();
    }

    #[test]
    fn test_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kairos.toml");
        let mut config = SenderConfig::default();
        config.receiver_host = "receiver.example".to_string();
        config.data_dirs = vec![dir.path().join("d1"), dir.path().join("d2")];
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = SenderConfig::load(&path).unwrap();
        assert_eq!(loaded.receiver_host, "receiver.example");
        assert_eq!(loaded.data_dirs.len(), 2);
        assert_eq!(loaded.receiver_addr(), "receiver.example:5555");
    }

    #[test]
    fn test_empty_data_dirs_rejected() {
        let config = SenderConfig {
            data_dirs: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_periods_rejected() {
        let config = SenderConfig {
            sync_period_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SenderConfig {
            monitor_period_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sync_paths_layout() {
        let paths = SyncPaths::new(Path::new("/data/tsdb"));
        assert_eq!(paths.journal_file(), Path::new("/data/tsdb/.sync/sync.journal"));
        assert_eq!(
            paths.baseline_file(),
            Path::new("/data/tsdb/.sync/last_local_files.txt")
        );
        assert_eq!(paths.snapshot_dir(), Path::new("/data/tsdb/.sync/snapshots"));
    }
}
