//! Image and method body assembly
//!
//! Host tooling and tests use these builders to produce script images without
//! an external compiler.

use super::image::{ImageTables, MemberRefRow, MethodSpecRow, ScriptImage};
use super::members::{FieldRef, MethodBody, MethodRef, TypeInfo};
use super::token::{
    Token, TABLE_MEMBER_REF, TABLE_METHOD_SPEC, TABLE_TYPE_DEF, TABLE_TYPE_REF, TABLE_TYPE_SPEC,
    TABLE_USER_STRING,
};
use super::types::{TypeDescriptor, TypeName};
use crate::module::validation::opcodes::{self, OpCode};

/// Incremental builder for `ScriptImage`
#[derive(Debug, Default)]
pub struct ScriptImageBuilder {
    tables: ImageTables,
}

impl ScriptImageBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            tables: ImageTables {
                name: name.into(),
                ..ImageTables::default()
            },
        }
    }

    /// Add a TypeRef row
    pub fn type_ref(&mut self, namespace: &str, name: &str) -> Token {
        self.tables.type_refs.push(TypeName::new(namespace, name));
        Token::new(TABLE_TYPE_REF, self.tables.type_refs.len() as u32)
    }

    /// Add a TypeSpec row for a constructed type
    pub fn type_spec(&mut self, descriptor: TypeDescriptor) -> Token {
        self.tables.type_specs.push(descriptor);
        Token::new(TABLE_TYPE_SPEC, self.tables.type_specs.len() as u32)
    }

    /// Add a MemberRef row naming a field of another module
    pub fn field_ref(
        &mut self,
        declaring_type: TypeDescriptor,
        name: &str,
        field_type: TypeDescriptor,
    ) -> Token {
        self.tables.member_refs.push(MemberRefRow::Field(FieldRef {
            declaring_type,
            name: name.to_string(),
            field_type,
        }));
        Token::new(TABLE_MEMBER_REF, self.tables.member_refs.len() as u32)
    }

    /// Add a MemberRef row naming a method of another module
    pub fn method_ref(
        &mut self,
        declaring_type: TypeDescriptor,
        name: &str,
        return_type: TypeDescriptor,
        parameters: Vec<TypeDescriptor>,
    ) -> Token {
        self.tables
            .member_refs
            .push(MemberRefRow::Method(MethodRef::new(
                declaring_type,
                name,
                return_type,
                parameters,
            )));
        Token::new(TABLE_MEMBER_REF, self.tables.member_refs.len() as u32)
    }

    /// Add a MethodSpec row instantiating a generic method
    pub fn method_spec(&mut self, method: Token, arguments: Vec<TypeDescriptor>) -> Token {
        self.tables
            .method_specs
            .push(MethodSpecRow { method, arguments });
        Token::new(TABLE_METHOD_SPEC, self.tables.method_specs.len() as u32)
    }

    /// Add a declared type, returning its TypeDef token
    pub fn add_type(&mut self, ty: TypeInfo) -> Token {
        self.tables.types.push(ty);
        Token::new(TABLE_TYPE_DEF, self.tables.types.len() as u32)
    }

    pub fn build(self) -> ScriptImage {
        ScriptImage::from_tables(self.tables)
    }
}

/// Assembler for raw method body instruction streams
#[derive(Debug, Default, Clone)]
pub struct BodyBuilder {
    code: Vec<u8>,
}

impl BodyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an opcode without operand
    pub fn op(mut self, opcode: OpCode) -> Self {
        opcode.encode(&mut self.code);
        self
    }

    /// Emit an opcode followed by a metadata token
    pub fn token(mut self, opcode: OpCode, token: Token) -> Self {
        opcode.encode(&mut self.code);
        self.code.extend_from_slice(&token.to_le_bytes());
        self
    }

    /// Emit `ldstr` with a user string token
    pub fn ldstr(self, index: u32) -> Self {
        self.token(opcodes::LDSTR, Token::new(TABLE_USER_STRING, index))
    }

    /// Emit an opcode followed by a 1-byte immediate
    pub fn op_u8(mut self, opcode: OpCode, value: u8) -> Self {
        opcode.encode(&mut self.code);
        self.code.push(value);
        self
    }

    /// Emit an opcode followed by a 4-byte immediate or branch offset
    pub fn op_i32(mut self, opcode: OpCode, value: i32) -> Self {
        opcode.encode(&mut self.code);
        self.code.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Emit an opcode followed by an 8-byte immediate
    pub fn op_i64(mut self, opcode: OpCode, value: i64) -> Self {
        opcode.encode(&mut self.code);
        self.code.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Emit a `switch` with relative branch offsets
    pub fn switch(mut self, offsets: &[i32]) -> Self {
        opcodes::SWITCH.encode(&mut self.code);
        self.code
            .extend_from_slice(&(offsets.len() as u32).to_le_bytes());
        for offset in offsets {
            self.code.extend_from_slice(&offset.to_le_bytes());
        }
        self
    }

    /// Append raw bytes
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.code.extend_from_slice(bytes);
        self
    }

    /// Current length, useful for computing branch offsets
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn into_code(self) -> Vec<u8> {
        self.code
    }

    /// Finish as a method body
    pub fn build(self) -> MethodBody {
        MethodBody::new(self.code)
    }
}
