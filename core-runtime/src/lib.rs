//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for Photo Sync Core:
//! - Logging and tracing infrastructure
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the other modules depend on. It
//! establishes the logging conventions and the event broadcasting mechanism
//! used by the sync engine to surface progress to UI collaborators.

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
