//! Validation outcomes

use std::fmt;

/// Why a module was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialKind {
    /// A type, member or instruction site matched a blocked rule
    Policy,
    /// The module or a method body could not be decoded
    Malformed,
}

/// Result of a validation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Module is allowed
    Allowed,
    /// Module is denied; `reason` names the offending site
    Denied { kind: DenialKind, reason: String },
}

impl ValidationResult {
    pub fn policy(reason: impl Into<String>) -> Self {
        ValidationResult::Denied {
            kind: DenialKind::Policy,
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        ValidationResult::Denied {
            kind: DenialKind::Malformed,
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self, ValidationResult::Allowed)
    }

    /// Denial reason, `None` when allowed
    pub fn reason(&self) -> Option<&str> {
        match self {
            ValidationResult::Allowed => None,
            ValidationResult::Denied { reason, .. } => Some(reason),
        }
    }

    pub fn kind(&self) -> Option<DenialKind> {
        match self {
            ValidationResult::Allowed => None,
            ValidationResult::Denied { kind, .. } => Some(*kind),
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationResult::Allowed => write!(f, "allowed"),
            ValidationResult::Denied { kind, reason } => {
                let label = match kind {
                    DenialKind::Policy => "policy violation",
                    DenialKind::Malformed => "malformed module",
                };
                write!(f, "{}: {}", label, reason)
            }
        }
    }
}
