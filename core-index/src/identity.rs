//! Content identity derivation.
//!
//! A media file's identifier is a lowercase hex SHA-256, derived in tiers by
//! file size:
//!
//! - at or below the inline threshold (default 50 MiB): hash of the full
//!   in-memory contents
//! - above that, up to the skip threshold (default 2 GiB): streamed hash in
//!   fixed-size chunks to bound memory
//! - above the skip threshold: a composite key hashed from path, size and
//!   mtime. This tier is NOT stable across moves or touches; callers must
//!   tolerate identifier churn for such files.

use bridge_traits::{FileSystemAccess, RawMediaFile};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::MediaId;

/// Identity derivation thresholds.
#[derive(Debug, Clone, Copy)]
pub struct IdentityConfig {
    /// Files at or below this size are hashed from a single read.
    pub inline_hash_limit: u64,
    /// Files above this size get the composite fallback key.
    pub skip_hash_limit: u64,
    /// Chunk size for streamed hashing.
    pub stream_chunk_bytes: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            inline_hash_limit: 50 * 1024 * 1024,       // 50 MiB
            skip_hash_limit: 2 * 1024 * 1024 * 1024,   // 2 GiB
            stream_chunk_bytes: 256 * 1024,            // 256 KiB
        }
    }
}

/// Computes [`MediaId`]s for enumerated files.
#[derive(Debug, Clone, Default)]
pub struct ContentIdentity {
    config: IdentityConfig,
}

impl ContentIdentity {
    pub fn new(config: IdentityConfig) -> Self {
        Self { config }
    }

    /// Derive the identifier for one enumerated file.
    pub async fn media_id(
        &self,
        fs: &dyn FileSystemAccess,
        file: &RawMediaFile,
    ) -> Result<MediaId> {
        if file.size > self.config.skip_hash_limit {
            warn!(
                path = ?file.path,
                size = file.size,
                "File above hash skip threshold; using composite identity"
            );
            return Ok(self.composite_id(file));
        }

        let digest = if file.size <= self.config.inline_hash_limit {
            let data = fs.read_file(&file.path).await?;
            let mut hasher = Sha256::new();
            hasher.update(&data);
            hasher.finalize()
        } else {
            let mut reader = fs.open_read_stream(&file.path).await?;
            let mut hasher = Sha256::new();
            let mut buf = vec![0u8; self.config.stream_chunk_bytes];
            loop {
                let n = reader
                    .read(&mut buf)
                    .await
                    .map_err(bridge_traits::BridgeError::Io)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            hasher.finalize()
        };

        let id = MediaId::new(hex::encode(digest));
        debug!(path = ?file.path, id = %id, "Derived content identity");
        Ok(id)
    }

    /// Composite fallback key: `sha256(path|size|mtime)`.
    fn composite_id(&self, file: &RawMediaFile) -> MediaId {
        let mut hasher = Sha256::new();
        hasher.update(file.path.to_string_lossy().as_bytes());
        hasher.update(b"|");
        hasher.update(file.size.to_le_bytes());
        hasher.update(b"|");
        hasher.update(file.modified_at.to_rfc3339().as_bytes());
        MediaId::new(hex::encode(hasher.finalize()))
    }
}
