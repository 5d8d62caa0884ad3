//! Module system traits and interfaces
//!
//! Defines the error taxonomy shared by the gate and the capability interface
//! through which the cache and lifecycle bridge drive the external sandbox
//! engine. Nothing outside this trait may depend on interpreter internals.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::module::api::events::ScriptValue;
use crate::module::metadata::{MetadataError, ModuleImage, ScriptImage, TypeShape};

/// Handle to a module materialized by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleHandle(pub u64);

/// Handle to an object instance living inside the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectHandle(pub u64);

/// Handle to a resolved invocable member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodHandle(pub u64);

impl fmt::Display for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// Sandbox engine capability interface
///
/// Implemented by an adapter around the embedded interpreter. Handles are
/// opaque to the rest of the crate.
pub trait SandboxEngine: Send + Sync {
    /// Reflection-only view of module bytes, used for validation before load
    ///
    /// The default understands the crate's own `ScriptImage` format.
    fn inspect(&self, bytes: &[u8]) -> Result<Arc<dyn ModuleImage>, MetadataError> {
        Ok(Arc::new(ScriptImage::decode(bytes)?))
    }

    /// Materialize a live module from validated bytes
    fn load_module(&self, bytes: &[u8]) -> Result<ModuleHandle, EngineError>;

    /// Look up a member by name; `Ok(None)` when the type does not define it
    fn find_method(
        &self,
        module: ModuleHandle,
        type_name: &str,
        member: &str,
    ) -> Result<Option<MethodHandle>, EngineError>;

    /// Inheritance shape of a type visible to a loaded module by full name
    ///
    /// Covers types the module image does not declare, such as host-provided
    /// base classes. `Ok(None)` when the engine does not know the type.
    fn resolve_type(
        &self,
        _module: ModuleHandle,
        _full_name: &str,
    ) -> Result<Option<TypeShape>, EngineError> {
        Ok(None)
    }

    /// Instantiate a type declared by a loaded module
    fn create_instance(
        &self,
        module: ModuleHandle,
        type_name: &str,
    ) -> Result<ObjectHandle, EngineError>;

    /// Invoke a member on an instance
    ///
    /// Exceptions raised by foreign code surface as `EngineError::Exception`.
    fn invoke(
        &self,
        object: ObjectHandle,
        method: MethodHandle,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, EngineError>;

    /// Release an instance
    fn dispose(&self, object: ObjectHandle);

    /// Release a module; called once per module at cache teardown
    fn unload_module(&self, module: ModuleHandle);
}

/// Errors reported by the sandbox engine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Module load failed: {0}")]
    LoadFailed(String),

    #[error("Type not found in module: {0}")]
    TypeNotFound(String),

    #[error("Member {member} not found on {type_name}")]
    MemberNotFound { type_name: String, member: String },

    #[error("{type_name} raised: {message}")]
    Exception { type_name: String, message: String },

    #[error("Invalid engine handle: {0}")]
    InvalidHandle(u64),
}

/// Script module system errors
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Malformed module: {0}")]
    MalformedModule(String),

    #[error("Script contract violation: {0}")]
    ContractViolation(String),

    #[error("Type not found: {0}")]
    TypeNotFound(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScriptError {
    /// Whether this error rejects the module's cache entry
    ///
    /// Contract violations and engine faults are per-call.
    pub fn poisons_cache(&self) -> bool {
        matches!(
            self,
            ScriptError::PolicyViolation(_) | ScriptError::MalformedModule(_)
        )
    }
}

impl From<MetadataError> for ScriptError {
    fn from(e: MetadataError) -> Self {
        ScriptError::MalformedModule(e.to_string())
    }
}

impl From<std::io::Error> for ScriptError {
    fn from(e: std::io::Error) -> Self {
        ScriptError::Io(e.to_string())
    }
}

impl From<toml::de::Error> for ScriptError {
    fn from(e: toml::de::Error) -> Self {
        ScriptError::Config(e.to_string())
    }
}
