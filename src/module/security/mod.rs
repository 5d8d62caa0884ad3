//! Security policy enforcement for script modules
//!
//! Provides the shared policy registry both validators and the module cache
//! consult to decide whether a type may be referenced by user code.

pub mod policy;

pub use policy::{
    BlockRule, BlockedType, PolicyEntry, PolicyEntryKind, PolicySet, DEFAULT_ALLOWED_TYPES,
    DEFAULT_BLOCKED_NAMESPACES, DEFAULT_BLOCKED_TYPES,
};
