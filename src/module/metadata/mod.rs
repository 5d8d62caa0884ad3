//! Module metadata model
//!
//! Reflection-only description of a compiled module: declared types and
//! members, resolved type references, metadata tokens, and the `ModuleImage`
//! trait through which validators resolve instruction operands.

pub mod builder;
pub mod image;
pub mod members;
pub mod token;
pub mod types;

pub use builder::{BodyBuilder, ScriptImageBuilder};
pub use image::{ImageTables, MemberRefRow, MetadataError, MethodSpecRow, ModuleImage, ScriptImage};
pub use members::{
    FieldInfo, FieldRef, MethodBody, MethodInfo, MethodRef, PropertyInfo, TypeInfo, TypeKind,
    TypeShape, Visibility,
};
pub use token::Token;
pub use types::{TypeDescriptor, TypeName};
