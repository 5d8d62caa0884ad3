//! Module loading
//!
//! Reads module files and their digest sidecars from disk.

pub mod loader;

pub use loader::{ModuleLoader, ScriptSource, HASH_SIDECAR_EXTENSION};
