//! Security policy for script modules
//!
//! Registry of blocked namespaces, blocked types and explicit allow overrides.
//! The policy is additive only: there is no removal API, so nothing can loosen
//! a rule once it has been registered. Every read and write goes through a
//! single lock, so a new rule is visible to the very next check.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::module::metadata::{TypeDescriptor, TypeName};

/// Namespaces blocked by the default rule set
pub const DEFAULT_BLOCKED_NAMESPACES: &[&str] = &[
    "System.IO",
    "System.Net",
    "System.Reflection",
    "System.Diagnostics",
    "System.Runtime.InteropServices",
    "System.Runtime.Loader",
    "System.Threading",
    "System.Security",
    "System.CodeDom",
    "Microsoft.Win32",
];

/// Types blocked by the default rule set
pub const DEFAULT_BLOCKED_TYPES: &[&str] = &[
    "System.Environment",
    "System.AppDomain",
    "System.Activator",
    "System.GC",
];

/// Types allowed by the default rule set despite a namespace block
pub const DEFAULT_ALLOWED_TYPES: &[&str] = &[
    "System.Diagnostics.Stopwatch",
    "System.Threading.Interlocked",
    "System.Threading.CancellationToken",
];

/// What a policy entry matches against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyEntryKind {
    /// Ordinal prefix of a type's namespace
    Namespace,
    /// Exact type full name
    TypeFullName,
}

/// A single policy rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub kind: PolicyEntryKind,
    pub value: String,
    pub allow: bool,
}

/// The rule that blocked a type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockRule {
    Namespace(String),
    Type(String),
}

/// A blocked type found inside a descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedType {
    /// Full name of the offending (unwrapped) type
    pub type_name: String,
    pub rule: BlockRule,
}

impl fmt::Display for BlockedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rule {
            BlockRule::Namespace(prefix) => {
                write!(f, "{} (blocked namespace '{}')", self.type_name, prefix)
            }
            BlockRule::Type(name) => write!(f, "{} (blocked type '{}')", self.type_name, name),
        }
    }
}

#[derive(Debug, Default)]
struct PolicyRules {
    blocked_namespaces: Vec<String>,
    blocked_types: HashSet<String>,
    allowed_types: HashSet<String>,
    revision: u64,
}

impl PolicyRules {
    fn check(&self, ty: &TypeDescriptor) -> Option<BlockedType> {
        match ty {
            TypeDescriptor::Array { element, .. }
            | TypeDescriptor::Pointer(element)
            | TypeDescriptor::ByRef(element) => self.check(element),
            TypeDescriptor::Generic {
                definition,
                arguments,
            } => arguments
                .iter()
                .find_map(|arg| self.check(arg))
                .or_else(|| self.check_name(definition)),
            TypeDescriptor::Named(name) => self.check_name(name),
            TypeDescriptor::GenericParam(_) => None,
        }
    }

    fn check_name(&self, name: &TypeName) -> Option<BlockedType> {
        let full_name = name.full_name();

        // Exact allow wins unconditionally for that exact name
        if self.allowed_types.contains(&full_name) {
            return None;
        }

        if self.blocked_types.contains(&full_name) {
            return Some(BlockedType {
                type_name: full_name.clone(),
                rule: BlockRule::Type(full_name),
            });
        }

        // Nested types inherit blocks on their enclosing types
        let mut enclosing = full_name.as_str();
        while let Some(pos) = enclosing.rfind('+') {
            enclosing = &enclosing[..pos];
            if self.blocked_types.contains(enclosing) {
                return Some(BlockedType {
                    type_name: full_name.clone(),
                    rule: BlockRule::Type(enclosing.to_string()),
                });
            }
        }

        // Namespace comes from the full name, the same string the exact lists
        // match, so a split between the namespace and name fields cannot hide it
        let namespace = TypeName::parse(&full_name).namespace;
        self.blocked_namespaces
            .iter()
            .find(|prefix| namespace.starts_with(prefix.as_str()))
            .map(|prefix| BlockedType {
                type_name: full_name,
                rule: BlockRule::Namespace(prefix.clone()),
            })
    }
}

/// Shared, append-only security policy
#[derive(Debug, Default)]
pub struct PolicySet {
    rules: RwLock<PolicyRules>,
}

impl PolicySet {
    /// Create an empty policy (nothing blocked)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a policy seeded with the default rule set
    pub fn with_defaults() -> Self {
        let policy = Self::new();
        for namespace in DEFAULT_BLOCKED_NAMESPACES {
            policy.add_blocked_namespace(namespace);
        }
        for type_name in DEFAULT_BLOCKED_TYPES {
            policy.add_blocked_type(type_name);
        }
        for type_name in DEFAULT_ALLOWED_TYPES {
            policy.add_allowed_type(type_name);
        }
        policy
    }

    fn read(&self) -> RwLockReadGuard<'_, PolicyRules> {
        self.rules.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PolicyRules> {
        self.rules.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn normalize(value: &str, what: &str) -> Option<String> {
        let value = value.trim();
        if value.is_empty() {
            warn!("Ignoring empty {} policy entry", what);
            return None;
        }
        Some(value.to_string())
    }

    /// Block every type whose namespace starts with `prefix`
    ///
    /// Returns `true` if the rule was not already present.
    pub fn add_blocked_namespace(&self, prefix: &str) -> bool {
        let Some(prefix) = Self::normalize(prefix, "namespace") else {
            return false;
        };
        let mut rules = self.write();
        if rules.blocked_namespaces.contains(&prefix) {
            return false;
        }
        info!("Policy: blocking namespace {}", prefix);
        rules.blocked_namespaces.push(prefix);
        rules.revision += 1;
        true
    }

    /// Block a type by exact full name
    pub fn add_blocked_type(&self, full_name: &str) -> bool {
        let Some(full_name) = Self::normalize(full_name, "type") else {
            return false;
        };
        let mut rules = self.write();
        if !rules.blocked_types.insert(full_name.clone()) {
            return false;
        }
        info!("Policy: blocking type {}", full_name);
        rules.revision += 1;
        true
    }

    /// Allow a type by exact full name, overriding namespace and type blocks
    pub fn add_allowed_type(&self, full_name: &str) -> bool {
        let Some(full_name) = Self::normalize(full_name, "allowed type") else {
            return false;
        };
        let mut rules = self.write();
        if !rules.allowed_types.insert(full_name.clone()) {
            return false;
        }
        info!("Policy: allowing type {}", full_name);
        rules.revision += 1;
        true
    }

    /// Apply a policy entry
    pub fn add_entry(&self, entry: &PolicyEntry) -> bool {
        match (entry.kind, entry.allow) {
            (PolicyEntryKind::Namespace, false) => self.add_blocked_namespace(&entry.value),
            (PolicyEntryKind::TypeFullName, false) => self.add_blocked_type(&entry.value),
            (PolicyEntryKind::TypeFullName, true) => self.add_allowed_type(&entry.value),
            (PolicyEntryKind::Namespace, true) => {
                // Only exact type names can be allowed
                warn!(
                    "Ignoring namespace allow entry {}: allow overrides must name a type",
                    entry.value
                );
                false
            }
        }
    }

    /// Check a type descriptor, returning the first blocked type it contains
    ///
    /// Arrays, pointers and by-references are unwrapped to their element type;
    /// a generic instantiation is blocked if any type argument is blocked.
    pub fn is_blocked(&self, ty: &TypeDescriptor) -> Option<BlockedType> {
        let blocked = self.read().check(ty);
        if let Some(ref b) = blocked {
            debug!("Policy: {} blocked by {}", ty, b);
        }
        blocked
    }

    /// Check a type by full name
    pub fn is_type_name_blocked(&self, full_name: &str) -> Option<BlockedType> {
        self.is_blocked(&TypeDescriptor::parse(full_name))
    }

    /// Counter incremented on every effective policy change
    pub fn revision(&self) -> u64 {
        self.read().revision
    }

    /// Snapshot of all registered rules
    pub fn entries(&self) -> Vec<PolicyEntry> {
        let rules = self.read();
        let mut entries: Vec<PolicyEntry> = rules
            .blocked_namespaces
            .iter()
            .map(|value| PolicyEntry {
                kind: PolicyEntryKind::Namespace,
                value: value.clone(),
                allow: false,
            })
            .collect();
        let mut blocked: Vec<_> = rules.blocked_types.iter().cloned().collect();
        blocked.sort();
        entries.extend(blocked.into_iter().map(|value| PolicyEntry {
            kind: PolicyEntryKind::TypeFullName,
            value,
            allow: false,
        }));
        let mut allowed: Vec<_> = rules.allowed_types.iter().cloned().collect();
        allowed.sort();
        entries.extend(allowed.into_iter().map(|value| PolicyEntry {
            kind: PolicyEntryKind::TypeFullName,
            value,
            allow: true,
        }));
        entries
    }
}
