//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (e.g., `core-sync`, `core-index`, `core-mapping`). Host
//! applications can depend on `psc-workspace` and enable the documented
//! features without needing to wire each crate individually.
