//! Resolved type references
//!
//! `TypeDescriptor` is the shape every validator hands to the security policy:
//! a named type, a constructed wrapper (array, pointer, by-reference) around an
//! element type, or a generic instantiation with its type arguments.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace-qualified type name
///
/// Nested types keep the namespace of their outermost enclosing type and use
/// `Outer+Inner` as their name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeName {
    /// Namespace (empty for the global namespace)
    pub namespace: String,
    /// Simple name, including generic arity suffix (e.g. "List`1")
    pub name: String,
}

impl TypeName {
    /// Create a new type name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse a full name, splitting at the last '.' outside of nested-type syntax
    pub fn parse(full_name: &str) -> Self {
        // The namespace ends at the last dot before any '+' nesting separator
        let outer = full_name.split('+').next().unwrap_or(full_name);
        match outer.rfind('.') {
            Some(pos) => Self::new(&full_name[..pos], &full_name[pos + 1..]),
            None => Self::new("", full_name),
        }
    }

    /// Full name, `Namespace.Name` or just `Name` in the global namespace
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.namespace, self.name)
        }
    }
}

/// A resolved type reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeDescriptor {
    /// Plain named type
    Named(TypeName),
    /// Array of an element type (rank 1 for vectors)
    Array {
        element: Box<TypeDescriptor>,
        rank: u8,
    },
    /// Unmanaged pointer to an element type
    Pointer(Box<TypeDescriptor>),
    /// Managed by-reference to an element type
    ByRef(Box<TypeDescriptor>),
    /// Generic instantiation, e.g. `List`1<Int32>`
    Generic {
        definition: TypeName,
        arguments: Vec<TypeDescriptor>,
    },
    /// Unbound generic parameter (`T`, `!!0`); never names a concrete type
    GenericParam(String),
}

impl TypeDescriptor {
    /// Named type from namespace and name
    pub fn named(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeDescriptor::Named(TypeName::new(namespace, name))
    }

    /// Named type from a full name
    pub fn parse(full_name: &str) -> Self {
        TypeDescriptor::Named(TypeName::parse(full_name))
    }

    /// `System.Void`
    pub fn void() -> Self {
        Self::named("System", "Void")
    }

    /// Single-dimensional array of this type
    pub fn array_of(self) -> Self {
        TypeDescriptor::Array {
            element: Box::new(self),
            rank: 1,
        }
    }

    /// Pointer to this type
    pub fn pointer_to(self) -> Self {
        TypeDescriptor::Pointer(Box::new(self))
    }

    /// By-reference to this type
    pub fn by_ref(self) -> Self {
        TypeDescriptor::ByRef(Box::new(self))
    }

    /// Generic instantiation of `definition` with `arguments`
    pub fn generic(definition: TypeName, arguments: Vec<TypeDescriptor>) -> Self {
        TypeDescriptor::Generic {
            definition,
            arguments,
        }
    }

    /// Element type for arrays, pointers and by-references
    pub fn element(&self) -> Option<&TypeDescriptor> {
        match self {
            TypeDescriptor::Array { element, .. }
            | TypeDescriptor::Pointer(element)
            | TypeDescriptor::ByRef(element) => Some(element),
            _ => None,
        }
    }

    /// Name of the underlying named type, if this is not a wrapper or parameter
    pub fn type_name(&self) -> Option<&TypeName> {
        match self {
            TypeDescriptor::Named(name) => Some(name),
            TypeDescriptor::Generic { definition, .. } => Some(definition),
            _ => None,
        }
    }

    /// Full name of the underlying named type
    pub fn full_name(&self) -> Option<String> {
        self.type_name().map(TypeName::full_name)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Named(name) => write!(f, "{}", name),
            TypeDescriptor::Array { element, rank } => {
                if *rank <= 1 {
                    write!(f, "{}[]", element)
                } else {
                    write!(f, "{}[{}]", element, ",".repeat(*rank as usize - 1))
                }
            }
            TypeDescriptor::Pointer(element) => write!(f, "{}*", element),
            TypeDescriptor::ByRef(element) => write!(f, "{}&", element),
            TypeDescriptor::Generic {
                definition,
                arguments,
            } => {
                write!(f, "{}<", definition)?;
                for (i, arg) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ">")
            }
            TypeDescriptor::GenericParam(name) => write!(f, "{}", name),
        }
    }
}

impl From<TypeName> for TypeDescriptor {
    fn from(name: TypeName) -> Self {
        TypeDescriptor::Named(name)
    }
}
