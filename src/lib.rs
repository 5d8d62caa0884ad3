//! Script Sandbox - security gate for user-authored script modules
//!
//! Loads precompiled script modules into an embedded sandbox engine only
//! after they pass a two-layer security check, and drives the resulting
//! instances through a fixed lifecycle event vocabulary.
//!
//! ## Pipeline
//!
//! 1. Module bytes arrive with an optional precomputed SHA-256 digest
//! 2. `ModuleCache` serves a resident module for that digest, re-checking it
//!    if the policy has grown since it was validated
//! 3. New bytes are inspected reflection-only and run through
//!    `DeclarationValidator` then `BytecodeValidator`
//! 4. Only then does the engine materialize a live module
//! 5. `LifecycleBridge` creates contract-satisfying instances and dispatches
//!    events into them, isolating callback failures
//!
//! ## Design Principles
//!
//! 1. **Fail closed**: anything that cannot be enumerated or decoded is rejected
//! 2. **Additive policy**: rules can be added at runtime, never removed
//! 3. **Engine agnostic**: the interpreter sits behind `SandboxEngine`

pub mod config;
pub mod module;
pub mod utils;

pub use config::{CacheConfig, ContractConfig, LoggingConfig, PolicyConfig, SandboxConfig};
pub use module::*;
