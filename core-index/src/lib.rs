//! # Core Index Module
//!
//! Builds the content-addressed media index for Photo Sync Core:
//! - Classification of enumerated files as image/video by extension
//! - Content identity derivation (tiered SHA-256)
//! - Date-bucketed index construction (`YYYY/MM/DD`)
//!
//! ## Usage
//!
//! ```ignore
//! let scanner = LocalScanner::new(source, fs, ContentIdentity::default());
//! let (index, stats) = scanner.scan(&roots).await?;
//! ```

pub mod error;
pub mod identity;
pub mod models;
pub mod scanner;

pub use error::{IndexError, Result};
pub use identity::{ContentIdentity, IdentityConfig};
pub use models::{
    format_date_path, MediaId, MediaIndex, MediaIndexMap, MediaRecord,
    MediaType, Resolution,
};
pub use scanner::{date_from_path, LocalScanner, ScanStats};
