//! # Bridge Traits
//!
//! Capability interfaces between the sync engine and its platform
//! collaborators. The engine core never talks to a concrete WebDAV client,
//! filesystem, or media library directly — it consumes these traits, and the
//! host application wires in implementations (see `bridge-local` for the
//! desktop ones).
//!
//! ## Capabilities
//!
//! - [`transport::FileTransport`]: WebDAV-like remote file store
//! - [`storage::FileSystemAccess`]: local file I/O
//! - [`scanner::MediaSource`]: raw media file enumeration

pub mod error;
pub mod scanner;
pub mod storage;
pub mod transport;

pub use error::{BridgeError, Result};
pub use scanner::{MediaSource, RawMediaFile};
pub use storage::{FileMetadata, FileSystemAccess};
pub use transport::{remote_parent, FileTransport, RemoteEntry, TransportCredentials};
