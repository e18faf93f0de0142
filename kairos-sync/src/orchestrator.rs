//! Cycle orchestration
//!
//! [`TransferManager`] drives one sync cycle end to end: connect, identity
//! handshake, schema suffix, then per data directory recovery, inventory,
//! per-group deletions and additions, and baseline promotion. It also owns
//! the periodic scheduler and the liveness monitor. A connection error
//! anywhere before finalize aborts the cycle and stops the scheduler,
//! leaving baseline and cursor for the next boot to resume from.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use kairos_proto::SyncClient;

use crate::baseline;
use crate::config::{SenderConfig, SyncPaths};
use crate::errors::{Result, SyncError};
use crate::identity;
use crate::inventory::{Inventory, InventoryProvider};
use crate::journal::SyncJournal;
use crate::recovery;
use crate::schema;
use crate::shipper::FileShipper;

/// Requests the run loop to wind down after the current cycle step.
#[derive(Clone)]
pub struct StopHandle(Arc<Notify>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.notify_one();
    }
}

pub struct TransferManager<I> {
    config: SenderConfig,
    identity: String,
    inventory: I,
    in_progress: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl<I: InventoryProvider> TransferManager<I> {
    /// Prepare the sender folder and load (or mint) the sender identity.
    pub async fn new(config: SenderConfig, inventory: I) -> Result<TransferManager<I>> {
        config.validate()?;
        tokio::fs::create_dir_all(&config.sender_dir).await?;
        let identity = identity::get_or_create_identity(&config.identity_file()).await?;
        Ok(TransferManager {
            config,
            identity,
            inventory,
            in_progress: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::Relaxed)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.shutdown.clone())
    }

    /// Periodic scheduler plus liveness monitor. Runs until a stop request
    /// or a failed cycle; overlapping cycle ticks are dropped.
    pub async fn run(&mut self) -> Result<()> {
        let flag = self.in_progress.clone();
        let receiver = self.config.receiver_addr();
        let monitor_period = self.config.monitor_period();
        let monitor = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor_period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if flag.load(Ordering::Relaxed) {
                    info!("sync towards {} is in execution", receiver);
                }
            }
        });

        let period = self.config.sync_period();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shutdown = self.shutdown.clone();

        let result = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.in_progress.load(Ordering::Relaxed) {
                        debug!("previous cycle still running, dropping this tick");
                        continue;
                    }
                    if let Err(e) = self.sync_all().await {
                        error!("sync cycle failed: {}", e);
                        break Err(e);
                    }
                }
                _ = shutdown.notified() => {
                    info!("stop requested, shutting down scheduler");
                    break Ok(());
                }
            }
        };

        monitor.abort();
        result
    }

    /// One full cycle across all configured data directories.
    pub async fn sync_all(&mut self) -> Result<()> {
        self.in_progress.store(true, Ordering::SeqCst);
        let result = self.run_cycle().await;
        self.in_progress.store(false, Ordering::SeqCst);
        result
    }

    async fn run_cycle(&mut self) -> Result<()> {
        let addr = self.config.receiver_addr();
        info!("starting sync cycle towards {}", addr);
        let mut client = SyncClient::connect(&addr, self.config.connect_timeout()).await?;

        let host = whoami::devicename();
        let status = client.check(&host, &self.identity).await?;
        if !status.success {
            return Err(SyncError::Rejected(status.error_msg));
        }
        client.start_sync().await?;

        schema::sync_schema(&mut client, &self.config).await?;

        for data_dir in self.config.data_dirs.clone() {
            self.sync_data_dir(&mut client, &data_dir).await?;
        }

        // Everything shipped is already durable on the receiver; a failed
        // goodbye does not invalidate the cycle.
        if let Err(e) = client.end_sync().await {
            error!("cannot notify receiver that the cycle ended: {}", e);
        }
        info!("sync cycle finished");
        Ok(())
    }

    async fn sync_data_dir(&mut self, client: &mut SyncClient, data_dir: &Path) -> Result<()> {
        info!("starting to sync data dir {}", data_dir.display());
        let paths = SyncPaths::new(data_dir);
        tokio::fs::create_dir_all(paths.sync_dir()).await?;

        recovery::recover(&paths).await?;

        let mut inventory = self.inventory.scan(data_dir, &paths)?;
        inventory.seed_groups();
        if inventory.is_empty_delta() {
            info!("no data to sync in {}", data_dir.display());
            return Ok(());
        }

        for group in inventory.groups.clone() {
            let status = client.init(&group).await?;
            if !status.success {
                return Err(SyncError::Connection(format!(
                    "receiver cannot init storage group {}: {}",
                    group, status.error_msg
                )));
            }
            info!(%group, "starting to transfer storage group");

            let mut journal = SyncJournal::open(&paths.journal_file()).await?;
            let deleted = inventory.deleted.remove(&group).unwrap_or_default();
            let to_send = inventory.to_send.remove(&group).unwrap_or_default();
            let last_local = inventory.last_local.entry(group.clone()).or_default();

            let mut shipper = FileShipper::new(client, &mut journal);
            shipper.ship_deletions(&group, deleted, last_local).await?;
            shipper
                .ship_data_files(&group, to_send, last_local, &paths.snapshot_dir().join(&group))
                .await?;
        }

        self.finalize_dir(&paths, &inventory).await;
        info!("finished syncing data dir {}", data_dir.display());
        Ok(())
    }

    /// Promote the acknowledged set to the new baseline, clear snapshots,
    /// and delete the journal. Journal deletion is the commit point: if the
    /// promotion fails the journal stays behind and the next cycle's
    /// recovery finishes it.
    async fn finalize_dir(&self, paths: &SyncPaths, inventory: &Inventory) {
        let union = inventory.all_last_local();
        if let Err(e) = baseline::promote_baseline(paths, &union).await {
            error!(
                "cannot promote baseline in {}: {}",
                paths.sync_dir().display(),
                e
            );
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(paths.snapshot_dir()).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                error!("cannot clear snapshot directory: {}", e);
            }
        }
        if let Err(e) = tokio::fs::remove_file(paths.journal_file()).await {
            error!("cannot remove sync journal: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::DirInventory;
    use tempfile::tempdir;

    fn test_config(root: &Path) -> SenderConfig {
        SenderConfig {
            sender_dir: root.join("sender"),
            data_dirs: vec![root.join("data")],
            schema_dir: root.join("schema"),
            sync_period_secs: 3600,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_new_creates_identity() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let manager = TransferManager::new(config.clone(), DirInventory).await.unwrap();
        assert_eq!(manager.identity().len(), 32);
        assert!(config.identity_file().exists());
        assert!(!manager.is_syncing());
    }

    #[tokio::test]
    async fn test_stop_handle_ends_run_loop() {
        let dir = tempdir().unwrap();
        let mut manager = TransferManager::new(test_config(dir.path()), DirInventory)
            .await
            .unwrap();
        let stop = manager.stop_handle();

        let handle = tokio::spawn(async move { manager.run().await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        stop.stop();
        handle.await.unwrap().unwrap();
    }
}
