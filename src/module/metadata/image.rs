//! Module images
//!
//! `ModuleImage` is the reflection-only view the validators work against. The
//! sandbox engine produces one from raw module bytes without running any code.
//! `ScriptImage` is the portable image format shipped with this crate.

use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::members::{FieldRef, MethodInfo, MethodRef, TypeInfo};
use super::token::{
    Token, TABLE_FIELD, TABLE_MEMBER_REF, TABLE_METHOD_DEF, TABLE_METHOD_SPEC, TABLE_TYPE_DEF,
    TABLE_TYPE_REF, TABLE_TYPE_SPEC,
};
use super::types::{TypeDescriptor, TypeName};

/// Magic prefix of a serialized script image
pub const IMAGE_MAGIC: [u8; 4] = *b"SCIM";
/// Current image format version
pub const IMAGE_FORMAT_VERSION: u16 = 1;

/// Metadata access errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Malformed module image: {0}")]
    Malformed(String),

    #[error("Unresolved metadata token {0}")]
    UnresolvedToken(Token),

    #[error("Token {token} does not refer to a {expected}")]
    WrongTable { token: Token, expected: &'static str },
}

/// Reflection-only view of a module's metadata
pub trait ModuleImage: Send + Sync {
    /// Module name
    fn name(&self) -> &str;

    /// All types declared by the module
    ///
    /// Enumeration can fail (e.g. an unresolvable dependency); callers must
    /// treat that as a rejection, never as an empty module.
    fn types(&self) -> Result<&[TypeInfo], MetadataError>;

    /// Resolve a TypeRef, TypeDef or TypeSpec token
    fn resolve_type(&self, token: Token) -> Result<TypeDescriptor, MetadataError>;

    /// Resolve a Field or MemberRef token naming a field
    fn resolve_field(&self, token: Token) -> Result<FieldRef, MetadataError>;

    /// Resolve a MethodDef, MemberRef or MethodSpec token naming a method
    fn resolve_method(&self, token: Token) -> Result<MethodRef, MetadataError>;

    /// Find a declared type by full name
    fn find_type(&self, full_name: &str) -> Option<&TypeInfo> {
        self.types()
            .ok()?
            .iter()
            .find(|t| t.full_name() == full_name)
    }
}

/// MemberRef table row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberRefRow {
    Field(FieldRef),
    Method(MethodRef),
}

/// MethodSpec table row: a generic method plus its type arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSpecRow {
    /// MethodDef or MemberRef token of the generic method
    pub method: Token,
    pub arguments: Vec<TypeDescriptor>,
}

/// Serialized metadata tables of a script image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageTables {
    pub name: String,
    pub types: Vec<TypeInfo>,
    pub type_refs: Vec<TypeName>,
    pub type_specs: Vec<TypeDescriptor>,
    pub member_refs: Vec<MemberRefRow>,
    pub method_specs: Vec<MethodSpecRow>,
}

/// Portable module image with row indexes for token resolution
#[derive(Debug, Clone)]
pub struct ScriptImage {
    tables: ImageTables,
    /// Field row -> (type index, field index)
    field_rows: Vec<(usize, usize)>,
    /// MethodDef row -> (type index, index into constructors-then-methods)
    method_rows: Vec<(usize, usize)>,
}

impl ScriptImage {
    /// Build an image from its tables, indexing Field and MethodDef rows
    pub fn from_tables(tables: ImageTables) -> Self {
        let mut field_rows = Vec::new();
        let mut method_rows = Vec::new();
        for (type_idx, ty) in tables.types.iter().enumerate() {
            field_rows.extend((0..ty.fields.len()).map(|i| (type_idx, i)));
            method_rows.extend((0..ty.constructors.len() + ty.methods.len()).map(|i| (type_idx, i)));
        }
        Self {
            tables,
            field_rows,
            method_rows,
        }
    }

    /// Decode an image from raw module bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, MetadataError> {
        if bytes.len() < 6 || bytes[..4] != IMAGE_MAGIC {
            return Err(MetadataError::Malformed(
                "missing image header".to_string(),
            ));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != IMAGE_FORMAT_VERSION {
            return Err(MetadataError::Malformed(format!(
                "unsupported image format version {}",
                version
            )));
        }
        let payload = &bytes[6..];
        // Same encoding as `bincode::serialize`, bounded by the payload so a
        // forged length prefix cannot force a huge allocation
        let tables: ImageTables = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .with_limit(payload.len() as u64)
            .deserialize(payload)
            .map_err(|e| MetadataError::Malformed(format!("undecodable metadata tables: {}", e)))?;
        debug!(
            "Decoded image {} ({} types, {} member refs)",
            tables.name,
            tables.types.len(),
            tables.member_refs.len()
        );
        Ok(Self::from_tables(tables))
    }

    /// Serialize this image to module bytes
    pub fn encode(&self) -> Result<Vec<u8>, MetadataError> {
        let payload = bincode::serialize(&self.tables)
            .map_err(|e| MetadataError::Malformed(format!("unencodable metadata tables: {}", e)))?;
        let mut out = Vec::with_capacity(payload.len() + 6);
        out.extend_from_slice(&IMAGE_MAGIC);
        out.extend_from_slice(&IMAGE_FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Underlying tables
    pub fn tables(&self) -> &ImageTables {
        &self.tables
    }

    /// MethodDef token of the `n`-th constructor-or-method of a declared type
    pub fn method_token(&self, type_index: usize, method_index: usize) -> Option<Token> {
        self.method_rows
            .iter()
            .position(|&row| row == (type_index, method_index))
            .map(|pos| Token::new(TABLE_METHOD_DEF, pos as u32 + 1))
    }

    fn method_def(&self, token: Token) -> Result<(&TypeInfo, &MethodInfo), MetadataError> {
        let (type_idx, method_idx) = token
            .index()
            .and_then(|i| self.method_rows.get(i))
            .copied()
            .ok_or(MetadataError::UnresolvedToken(token))?;
        let ty = &self.tables.types[type_idx];
        let method = ty
            .all_methods()
            .nth(method_idx)
            .ok_or(MetadataError::UnresolvedToken(token))?;
        Ok((ty, method))
    }

    fn member_ref(&self, token: Token) -> Result<&MemberRefRow, MetadataError> {
        token
            .index()
            .and_then(|i| self.tables.member_refs.get(i))
            .ok_or(MetadataError::UnresolvedToken(token))
    }
}

fn row<T>(rows: &[T], token: Token) -> Result<&T, MetadataError> {
    token
        .index()
        .and_then(|i| rows.get(i))
        .ok_or(MetadataError::UnresolvedToken(token))
}

impl ModuleImage for ScriptImage {
    fn name(&self) -> &str {
        &self.tables.name
    }

    fn types(&self) -> Result<&[TypeInfo], MetadataError> {
        Ok(&self.tables.types)
    }

    fn resolve_type(&self, token: Token) -> Result<TypeDescriptor, MetadataError> {
        match token.table() {
            TABLE_TYPE_REF => Ok(TypeDescriptor::Named(
                row(&self.tables.type_refs, token)?.clone(),
            )),
            TABLE_TYPE_DEF => Ok(row(&self.tables.types, token)?.descriptor()),
            TABLE_TYPE_SPEC => Ok(row(&self.tables.type_specs, token)?.clone()),
            _ => Err(MetadataError::WrongTable {
                token,
                expected: "type",
            }),
        }
    }

    fn resolve_field(&self, token: Token) -> Result<FieldRef, MetadataError> {
        match token.table() {
            TABLE_FIELD => {
                let (type_idx, field_idx) = *row(&self.field_rows, token)?;
                let ty = &self.tables.types[type_idx];
                let field = &ty.fields[field_idx];
                Ok(FieldRef {
                    declaring_type: ty.descriptor(),
                    name: field.name.clone(),
                    field_type: field.field_type.clone(),
                })
            }
            TABLE_MEMBER_REF => match self.member_ref(token)? {
                MemberRefRow::Field(field) => Ok(field.clone()),
                MemberRefRow::Method(_) => Err(MetadataError::WrongTable {
                    token,
                    expected: "field",
                }),
            },
            _ => Err(MetadataError::WrongTable {
                token,
                expected: "field",
            }),
        }
    }

    fn resolve_method(&self, token: Token) -> Result<MethodRef, MetadataError> {
        match token.table() {
            TABLE_METHOD_DEF => {
                let (ty, method) = self.method_def(token)?;
                Ok(MethodRef::new(
                    ty.descriptor(),
                    method.name.clone(),
                    method.return_type.clone(),
                    method.parameters.clone(),
                ))
            }
            TABLE_MEMBER_REF => match self.member_ref(token)? {
                MemberRefRow::Method(method) => Ok(method.clone()),
                MemberRefRow::Field(_) => Err(MetadataError::WrongTable {
                    token,
                    expected: "method",
                }),
            },
            TABLE_METHOD_SPEC => {
                let spec = row(&self.tables.method_specs, token)?;
                // A MethodSpec may only instantiate a MethodDef or MemberRef
                if spec.method.table() == TABLE_METHOD_SPEC {
                    return Err(MetadataError::Malformed(format!(
                        "method spec {} instantiates another method spec",
                        token
                    )));
                }
                let mut method = self.resolve_method(spec.method)?;
                method.generic_arguments = spec.arguments.clone();
                Ok(method)
            }
            _ => Err(MetadataError::WrongTable {
                token,
                expected: "method",
            }),
        }
    }
}
