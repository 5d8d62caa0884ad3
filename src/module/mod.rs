//! Script module system
//!
//! Gatekeeping for user-authored, precompiled script modules run inside an
//! external sandbox engine.
//!
//! ## Architecture
//!
//! - **security**: shared, append-only policy of blocked namespaces and types
//! - **metadata**: reflection-only view of a module image and token resolution
//! - **validation**: declaration scan and instruction-stream scan
//! - **registry**: content-addressed cache; one engine load per distinct hash
//! - **loader**: module files and precomputed digest sidecars
//! - **api**: script contract, instances and lifecycle event dispatch
//!
//! No module code reaches the engine before both validation passes succeed.

pub mod api;
pub mod loader;
pub mod metadata;
pub mod registry;
pub mod security;
pub mod traits;
pub mod validation;

pub use api::{DispatchOutcome, LifecycleBridge, LifecycleEvent, ScriptContract, ScriptInstance, ScriptValue};
pub use loader::ModuleLoader;
pub use registry::{CacheStats, ContentHash, LoadedModule, ModuleCache};
pub use security::PolicySet;
pub use traits::{
    EngineError, MethodHandle, ModuleHandle, ObjectHandle, SandboxEngine, ScriptError,
};
pub use validation::{BytecodeValidator, DeclarationValidator, ValidationResult};
