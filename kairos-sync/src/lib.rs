//! Sender core for one-way incremental time-series replication
//!
//! This crate provides the machinery behind the sender daemon:
//! - Single-instance guard and stable sender identity
//! - Progress journal and crash recovery
//! - Inventory of sealed data files against the acknowledged baseline
//! - Schema-log and data-file shipping with digest verification
//! - The cycle orchestrator, periodic scheduler and liveness monitor

pub mod baseline;
pub mod config;
pub mod errors;
pub mod identity;
pub mod inventory;
pub mod journal;
pub mod lock;
pub mod orchestrator;
pub mod recovery;
pub mod schema;
pub mod shipper;

pub use config::{SenderConfig, SyncPaths};
pub use errors::{Result, SyncError};
pub use identity::get_or_create_identity;
pub use inventory::{DirInventory, Inventory, InventoryProvider};
pub use journal::{JournalRecord, SyncJournal};
pub use lock::InstanceLock;
pub use orchestrator::{StopHandle, TransferManager};
pub use shipper::{FileShipper, Snapshot};
