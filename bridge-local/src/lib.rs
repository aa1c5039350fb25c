//! # Bridge Local
//!
//! Desktop implementations of the `bridge-traits` capabilities:
//!
//! - [`LocalFileSystem`]: `tokio::fs`-backed [`bridge_traits::FileSystemAccess`]
//! - [`WalkMediaSource`]: recursive directory walk implementing
//!   [`bridge_traits::MediaSource`]
//!
//! The WebDAV transport is intentionally not implemented here; hosts supply
//! their own [`bridge_traits::FileTransport`].

pub mod filesystem;
pub mod media_source;

pub use filesystem::LocalFileSystem;
pub use media_source::WalkMediaSource;
