//! Module registry
//!
//! Content-addressed cache of validated modules and the hashing it keys on.

pub mod cache;
pub mod hash;

pub use cache::{CacheStats, LoadedModule, ModuleCache};
pub use hash::ContentHash;
