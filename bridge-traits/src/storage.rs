//! Local File System Abstraction
//!
//! Platform-agnostic trait for the local file I/O the sync engine needs:
//! reading media for hashing and upload, writing downloaded media into the
//! cloud-cache directory, and persisting the mapping table.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// Abstracts file I/O so the engine can run against the real filesystem on
/// desktop and an in-memory double in tests.
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Get the application's data directory (persistent state: mapping table,
    /// device identity).
    async fn get_data_directory(&self) -> Result<PathBuf>;

    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    ///
    /// For large files, consider using `open_read_stream` instead.
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating it if it doesn't exist
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Atomically replace `to` with `from`.
    ///
    /// Used for rename-on-write persistence of the mapping table so a crash
    /// never leaves a truncated file behind.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Open a file for streaming reads
    ///
    /// This is more efficient than `read_file` for large files.
    async fn open_read_stream(
        &self,
        path: &Path,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;
}
