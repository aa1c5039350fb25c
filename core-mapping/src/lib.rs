//! # Core Mapping Module
//!
//! Per-device cloud mapping state for Photo Sync Core:
//! - [`CloudMappingTable`]: media id → local/cloud paths + sync status
//! - [`TableStore`]: atomic local persistence of the table
//! - [`CloudNamespace`]: the shared remote path layout
//! - [`DeviceIdentity`]: the once-generated stable device id
//!
//! The table itself is pure data. Reconciliation and transfer policy live in
//! `core-sync`.

pub mod device;
pub mod error;
pub mod paths;
pub mod store;
pub mod table;

pub use device::DeviceIdentity;
pub use error::{MappingError, Result};
pub use paths::{CloudNamespace, DEFAULT_NAMESPACE, MAPPINGS_DIR, MAPPING_FILE};
pub use store::{TableStore, MAPPING_TABLE_FILE};
pub use table::{CloudMappingTable, MappingRecord, SyncStatus};
