//! Remote File Transport Abstraction
//!
//! Defines the WebDAV-like capability the sync engine drives. The concrete
//! client (WebDAV, SFTP, a test double) lives outside the core; the engine
//! only depends on this trait.
//!
//! Implementations MUST map "the path does not exist" responses (e.g. HTTP
//! 404) to [`BridgeError::NotFound`] so callers can distinguish absence from
//! genuine failure.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{BridgeError, Result};

/// One entry returned by a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Full remote path of the entry.
    pub path: String,
    /// Whether the entry is a collection/directory.
    pub is_directory: bool,
}

impl RemoteEntry {
    /// The last path component of the entry.
    pub fn name(&self) -> &str {
        self.path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
    }
}

/// Credentials for connecting to a remote endpoint.
#[derive(Clone)]
pub struct TransportCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for TransportCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose the password in logs.
        f.debug_struct("TransportCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Remote file transport capability consumed by the sync engine.
///
/// Every method is a suspension point. Operations are path-addressed with
/// `/`-separated absolute remote paths.
#[async_trait]
pub trait FileTransport: Send + Sync {
    /// Connect and authenticate against the endpoint.
    ///
    /// Returns `true` when the endpoint accepted the credentials.
    async fn connect(&self, endpoint: &str, credentials: &TransportCredentials) -> Result<bool>;

    /// Whether the transport currently reports a connected, authenticated
    /// state. The orchestrator refuses to start a sync pass otherwise.
    async fn is_connected(&self) -> bool;

    /// List the entries directly under `path`.
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>>;

    /// Create a single directory. The parent must already exist.
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Create a directory and any missing ancestors.
    ///
    /// The default implementation walks the path segments from the root,
    /// creating each missing ancestor in turn. An `mkdir` failure on a
    /// segment that turns out to exist (created concurrently) is tolerated.
    async fn mkdir_recursive(&self, path: &str) -> Result<()> {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            if self.exists(&current).await? {
                continue;
            }
            if let Err(e) = self.mkdir(&current).await {
                if !self.exists(&current).await.unwrap_or(false) {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Whether a file or directory exists at `path`.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Download the full contents of the file at `path`.
    ///
    /// Fails with [`BridgeError::NotFound`] when the path does not exist.
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Upload `data` to `path`, replacing any existing content.
    async fn put(&self, path: &str, data: Bytes) -> Result<()>;

    /// Delete the file at `path`.
    ///
    /// Fails with [`BridgeError::NotFound`] when the path does not exist.
    async fn delete(&self, path: &str) -> Result<()>;
}

/// Parent directory of a `/`-separated remote path, if any.
pub fn remote_parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    if idx == 0 {
        None
    } else {
        Some(&trimmed[..idx])
    }
}

#[allow(unused)]
fn _object_safe(t: &dyn FileTransport) -> &dyn FileTransport {
    t
}

#[allow(unused)]
fn _not_found_is_bridge_error(e: BridgeError) -> bool {
    e.is_not_found()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_entry_name() {
        let entry = RemoteEntry {
            path: "/photosync/.mappings/device-1/".to_string(),
            is_directory: true,
        };
        assert_eq!(entry.name(), "device-1");

        let file = RemoteEntry {
            path: "/photosync/2024/06/01/img.jpg".to_string(),
            is_directory: false,
        };
        assert_eq!(file.name(), "img.jpg");
    }

    #[test]
    fn test_remote_parent() {
        assert_eq!(remote_parent("/a/b/c.jpg"), Some("/a/b"));
        assert_eq!(remote_parent("/a"), None);
        assert_eq!(remote_parent("/a/b/"), Some("/a"));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = TransportCredentials {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }
}
