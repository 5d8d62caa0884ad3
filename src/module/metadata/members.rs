//! Reflection-only view of types and members declared by a module

use serde::{Deserialize, Serialize};

use super::types::{TypeDescriptor, TypeName};

/// Member accessibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Visibility {
    #[default]
    Private,
    Assembly,
    Family,
    Public,
}

/// Type kind flags relevant to instantiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TypeKind {
    #[default]
    Class,
    ValueType,
    Interface,
    Enum,
    Delegate,
}

/// A type declared by the module (TypeDef row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub name: TypeName,
    pub kind: TypeKind,
    pub is_abstract: bool,
    /// Base type, `None` for interfaces and the root object type
    pub base_type: Option<TypeDescriptor>,
    /// Directly implemented interfaces
    pub interfaces: Vec<TypeDescriptor>,
    pub fields: Vec<FieldInfo>,
    pub properties: Vec<PropertyInfo>,
    pub methods: Vec<MethodInfo>,
    pub constructors: Vec<MethodInfo>,
}

impl TypeInfo {
    /// New class deriving from `System.Object`
    pub fn class(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: TypeName::new(namespace, name),
            kind: TypeKind::Class,
            is_abstract: false,
            base_type: Some(TypeDescriptor::named("System", "Object")),
            interfaces: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
        }
    }

    /// New interface type
    pub fn interface(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Interface,
            is_abstract: true,
            base_type: None,
            ..Self::class(namespace, name)
        }
    }

    pub fn with_base(mut self, base: TypeDescriptor) -> Self {
        self.base_type = Some(base);
        self
    }

    pub fn with_interface(mut self, interface: TypeDescriptor) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn with_field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_property(mut self, property: PropertyInfo) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_method(mut self, method: MethodInfo) -> Self {
        self.methods.push(method);
        self
    }

    pub fn with_constructor(mut self, constructor: MethodInfo) -> Self {
        self.constructors.push(constructor);
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Full name of the declared type
    pub fn full_name(&self) -> String {
        self.name.full_name()
    }

    /// Descriptor naming this type
    pub fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::Named(self.name.clone())
    }

    /// Constructors followed by methods, the order of MethodDef rows
    pub fn all_methods(&self) -> impl Iterator<Item = &MethodInfo> {
        self.constructors.iter().chain(self.methods.iter())
    }

    /// Find a declared (non-constructor) method by name
    pub fn find_method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Inheritance shape of this type
    pub fn shape(&self) -> TypeShape {
        TypeShape {
            full_name: self.full_name(),
            base_type: self.base_type.as_ref().and_then(TypeDescriptor::full_name),
            interfaces: self
                .interfaces
                .iter()
                .filter_map(TypeDescriptor::full_name)
                .collect(),
        }
    }
}

/// Base type and interfaces of a type, by full name
///
/// Enough to walk an inheritance chain that leaves the module, e.g. into types
/// the host provides to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeShape {
    pub full_name: String,
    pub base_type: Option<String>,
    pub interfaces: Vec<String>,
}

impl TypeShape {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            ..Self::default()
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base_type = Some(base.into());
        self
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }
}

/// A declared field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub field_type: TypeDescriptor,
    pub visibility: Visibility,
    pub is_static: bool,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, field_type: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            field_type,
            visibility: Visibility::Private,
            is_static: false,
        }
    }
}

/// A declared property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyInfo {
    pub name: String,
    pub property_type: TypeDescriptor,
}

impl PropertyInfo {
    pub fn new(name: impl Into<String>, property_type: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            property_type,
        }
    }
}

/// A declared method or constructor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub name: String,
    pub return_type: TypeDescriptor,
    pub parameters: Vec<TypeDescriptor>,
    pub visibility: Visibility,
    pub is_static: bool,
    /// `None` for abstract and external methods
    pub body: Option<MethodBody>,
}

impl MethodInfo {
    /// New method returning `System.Void` with no parameters and no body
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            return_type: TypeDescriptor::void(),
            parameters: Vec::new(),
            visibility: Visibility::Public,
            is_static: false,
            body: None,
        }
    }

    /// New instance constructor (`.ctor`)
    pub fn constructor() -> Self {
        Self::new(".ctor")
    }

    pub fn returns(mut self, return_type: TypeDescriptor) -> Self {
        self.return_type = return_type;
        self
    }

    pub fn with_parameter(mut self, parameter: TypeDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }
}

/// Method body: raw instruction stream plus the body-level signatures
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MethodBody {
    /// Raw instruction bytes
    pub code: Vec<u8>,
    pub max_stack: u16,
    /// Local variable types from the body's local signature
    pub locals: Vec<TypeDescriptor>,
    /// Catch types of typed exception handler clauses
    pub catch_types: Vec<TypeDescriptor>,
}

impl MethodBody {
    pub fn new(code: Vec<u8>) -> Self {
        Self {
            code,
            max_stack: 8,
            locals: Vec::new(),
            catch_types: Vec::new(),
        }
    }

    pub fn with_local(mut self, local: TypeDescriptor) -> Self {
        self.locals.push(local);
        self
    }

    pub fn with_catch(mut self, catch_type: TypeDescriptor) -> Self {
        self.catch_types.push(catch_type);
        self
    }
}

/// A field resolved from a Field or MemberRef token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    pub declaring_type: TypeDescriptor,
    pub name: String,
    pub field_type: TypeDescriptor,
}

/// A method resolved from a MethodDef, MemberRef or MethodSpec token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodRef {
    pub declaring_type: TypeDescriptor,
    pub name: String,
    pub return_type: TypeDescriptor,
    pub parameters: Vec<TypeDescriptor>,
    /// Method-level generic arguments (MethodSpec instantiations only)
    #[serde(default)]
    pub generic_arguments: Vec<TypeDescriptor>,
}

impl MethodRef {
    pub fn new(
        declaring_type: TypeDescriptor,
        name: impl Into<String>,
        return_type: TypeDescriptor,
        parameters: Vec<TypeDescriptor>,
    ) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            return_type,
            parameters,
            generic_arguments: Vec::new(),
        }
    }
}
