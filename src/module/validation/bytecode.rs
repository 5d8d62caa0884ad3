//! Instruction-level validation
//!
//! Catches usages that never appear in a signature: a method whose parameters
//! are all permitted but whose body calls a blocked API, reads a blocked field,
//! or constructs a blocked type. Every method and constructor body is decoded
//! and every token-carrying operand is resolved and checked against the policy.

use std::sync::Arc;
use tracing::{debug, warn};

use super::decoder::{Instruction, InstructionReader};
use super::opcodes::OperandType;
use super::result::ValidationResult;
use crate::module::metadata::{
    FieldRef, MetadataError, MethodInfo, MethodRef, ModuleImage, Token, TypeDescriptor, TypeInfo,
};
use crate::module::security::PolicySet;

/// Outcome of checking a single token operand
enum OperandIssue {
    /// The resolved member references a blocked type
    Blocked(String),
    /// The token could not be resolved; the instruction is skipped
    Unresolved(MetadataError),
}

/// Validator for method body instruction streams
pub struct BytecodeValidator {
    policy: Arc<PolicySet>,
}

impl BytecodeValidator {
    pub fn new(policy: Arc<PolicySet>) -> Self {
        Self { policy }
    }

    /// Validate the method bodies of every type declared by the module
    pub fn validate_module(&self, image: &dyn ModuleImage) -> ValidationResult {
        let types = match image.types() {
            Ok(types) => types,
            Err(e) => {
                return ValidationResult::malformed(format!(
                    "failed to enumerate types of module {}: {}",
                    image.name(),
                    e
                ))
            }
        };

        for ty in types {
            let result = self.validate_type(ty, image);
            if !result.is_allowed() {
                warn!("Bytecode check rejected module {}: {}", image.name(), result);
                return result;
            }
        }

        debug!("Bytecode check passed for module {}", image.name());
        ValidationResult::Allowed
    }

    /// Validate every declared method and constructor body of a type
    ///
    /// The first violation in any method rejects the whole type.
    pub fn validate_type(&self, ty: &TypeInfo, image: &dyn ModuleImage) -> ValidationResult {
        let owner = ty.full_name();
        for method in ty.all_methods() {
            if let Err(result) = self.validate_method(&owner, method, image) {
                return result;
            }
        }
        ValidationResult::Allowed
    }

    fn validate_method(
        &self,
        owner: &str,
        method: &MethodInfo,
        image: &dyn ModuleImage,
    ) -> Result<(), ValidationResult> {
        // Abstract and external methods have nothing to scan
        let Some(body) = &method.body else {
            return Ok(());
        };
        let site = || format!("{}.{}", owner, method.name);

        for (index, local) in body.locals.iter().enumerate() {
            if let Some(blocked) = self.policy.is_blocked(local) {
                return Err(ValidationResult::policy(format!(
                    "{}: local {} references {}",
                    site(),
                    index,
                    blocked
                )));
            }
        }
        for catch_type in &body.catch_types {
            if let Some(blocked) = self.policy.is_blocked(catch_type) {
                return Err(ValidationResult::policy(format!(
                    "{}: exception handler catches {}",
                    site(),
                    blocked
                )));
            }
        }

        let mut unresolved = 0usize;
        for decoded in InstructionReader::new(&body.code) {
            let instr = decoded.map_err(|e| ValidationResult::malformed(format!("{}: {}", site(), e)))?;
            if !instr.opcode.operand.is_member_token() {
                continue;
            }
            let Some(token) = instr.token() else {
                continue;
            };

            match self.check_operand(&instr, token, image) {
                Ok(()) => {}
                Err(OperandIssue::Blocked(detail)) => {
                    return Err(ValidationResult::policy(format!(
                        "{}: IL_{:04X} {} {}",
                        site(),
                        instr.offset,
                        instr.opcode.name,
                        detail
                    )));
                }
                Err(OperandIssue::Unresolved(e)) => {
                    unresolved += 1;
                    debug!(
                        "{}: skipping IL_{:04X} {} ({})",
                        site(),
                        instr.offset,
                        instr.opcode.name,
                        e
                    );
                }
            }
        }

        if unresolved > 0 {
            debug!("{}: {} unresolved token operand(s) skipped", site(), unresolved);
        }
        Ok(())
    }

    fn check_operand(
        &self,
        instr: &Instruction,
        token: Token,
        image: &dyn ModuleImage,
    ) -> Result<(), OperandIssue> {
        match instr.opcode.operand {
            OperandType::InlineMethod => {
                let method = image.resolve_method(token).map_err(OperandIssue::Unresolved)?;
                self.check_method(&method).map_err(OperandIssue::Blocked)
            }
            OperandType::InlineField => {
                let field = image.resolve_field(token).map_err(OperandIssue::Unresolved)?;
                self.check_field(&field).map_err(OperandIssue::Blocked)
            }
            OperandType::InlineType => {
                let ty = image.resolve_type(token).map_err(OperandIssue::Unresolved)?;
                self.check_type(&ty).map_err(OperandIssue::Blocked)
            }
            OperandType::InlineTok => {
                // Ambiguous member: type, then field, then method
                if let Ok(ty) = image.resolve_type(token) {
                    return self.check_type(&ty).map_err(OperandIssue::Blocked);
                }
                if let Ok(field) = image.resolve_field(token) {
                    return self.check_field(&field).map_err(OperandIssue::Blocked);
                }
                let method = image.resolve_method(token).map_err(OperandIssue::Unresolved)?;
                self.check_method(&method).map_err(OperandIssue::Blocked)
            }
            _ => Ok(()),
        }
    }

    fn check_type(&self, ty: &TypeDescriptor) -> Result<(), String> {
        match self.policy.is_blocked(ty) {
            None => Ok(()),
            Some(blocked) => Err(format!("{}: type operand references {}", ty, blocked)),
        }
    }

    fn check_field(&self, field: &FieldRef) -> Result<(), String> {
        let target = || format!("{}::{}", field.declaring_type, field.name);
        if let Some(blocked) = self.policy.is_blocked(&field.declaring_type) {
            return Err(format!("{}: declaring type {}", target(), blocked));
        }
        if let Some(blocked) = self.policy.is_blocked(&field.field_type) {
            return Err(format!("{}: field type {}", target(), blocked));
        }
        Ok(())
    }

    fn check_method(&self, method: &MethodRef) -> Result<(), String> {
        let target = || format!("{}::{}", method.declaring_type, method.name);
        if let Some(blocked) = self.policy.is_blocked(&method.declaring_type) {
            return Err(format!("{}: declaring type {}", target(), blocked));
        }
        if let Some(blocked) = self.policy.is_blocked(&method.return_type) {
            return Err(format!("{}: return type {}", target(), blocked));
        }
        for (index, parameter) in method.parameters.iter().enumerate() {
            if let Some(blocked) = self.policy.is_blocked(parameter) {
                return Err(format!("{}: parameter {} {}", target(), index, blocked));
            }
        }
        for argument in &method.generic_arguments {
            if let Some(blocked) = self.policy.is_blocked(argument) {
                return Err(format!("{}: generic argument {}", target(), blocked));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::metadata::token::{TABLE_MEMBER_REF, TABLE_TYPE_REF};
    use crate::module::metadata::{BodyBuilder, MethodBody, ScriptImageBuilder, TypeName};
    use crate::module::validation::opcodes::*;
    use crate::module::validation::result::DenialKind;

    fn policy() -> Arc<PolicySet> {
        let policy = PolicySet::new();
        policy.add_blocked_namespace("System.IO");
        Arc::new(policy)
    }

    fn script_with_body(builder: &mut ScriptImageBuilder, body: MethodBody) {
        builder.add_type(
            TypeInfo::class("Game", "Player").with_method(MethodInfo::new("Update").with_body(body)),
        );
    }

    #[test]
    fn test_blocked_call_in_body() {
        let mut builder = ScriptImageBuilder::new("Calls");
        let read = builder.method_ref(
            TypeDescriptor::named("System.IO", "File"),
            "ReadAllText",
            TypeDescriptor::named("System", "String"),
            vec![TypeDescriptor::named("System", "String")],
        );
        let body = BodyBuilder::new().ldstr(1).token(CALL, read).op(POP).op(RET).build();
        script_with_body(&mut builder, body);
        let image = builder.build();

        let result = BytecodeValidator::new(policy()).validate_module(&image);
        assert_eq!(result.kind(), Some(DenialKind::Policy));
        let reason = result.reason().unwrap();
        assert!(reason.starts_with("Game.Player.Update: IL_0005 call System.IO.File::ReadAllText"));
    }

    #[test]
    fn test_blocked_field_value_type() {
        let mut builder = ScriptImageBuilder::new("Fields");
        let field = builder.field_ref(
            TypeDescriptor::named("Game", "Registry"),
            "writer",
            TypeDescriptor::named("System.IO", "StreamWriter"),
        );
        let body = BodyBuilder::new().token(LDSFLD, field).op(POP).op(RET).build();
        script_with_body(&mut builder, body);

        let result = BytecodeValidator::new(policy()).validate_module(&builder.build());
        assert!(result.reason().unwrap().contains("field type System.IO.StreamWriter"));
    }

    #[test]
    fn test_blocked_generic_type_operand() {
        let mut builder = ScriptImageBuilder::new("Generics");
        let spec = builder.type_spec(TypeDescriptor::generic(
            TypeName::new("System.Collections.Generic", "List`1"),
            vec![TypeDescriptor::named("System.IO", "FileInfo")],
        ));
        let body = BodyBuilder::new().token(NEWARR, spec).op(POP).op(RET).build();
        script_with_body(&mut builder, body);

        let result = BytecodeValidator::new(policy()).validate_module(&builder.build());
        assert!(!result.is_allowed());
    }

    #[test]
    fn test_ldtoken_resolves_type_then_field_then_method() {
        let mut builder = ScriptImageBuilder::new("Tokens");
        let method = builder.method_ref(
            TypeDescriptor::named("System.IO", "Directory"),
            "Delete",
            TypeDescriptor::void(),
            vec![],
        );
        let body = BodyBuilder::new().token(LDTOKEN, method).op(POP).op(RET).build();
        script_with_body(&mut builder, body);

        let result = BytecodeValidator::new(policy()).validate_module(&builder.build());
        assert!(result.reason().unwrap().contains("System.IO.Directory::Delete"));
    }

    #[test]
    fn test_unresolvable_tokens_are_skipped() {
        let mut builder = ScriptImageBuilder::new("Dangling");
        let body = BodyBuilder::new()
            .token(CALL, Token::new(TABLE_MEMBER_REF, 99))
            .token(BOX, Token::new(TABLE_TYPE_REF, 42))
            .op(RET)
            .build();
        script_with_body(&mut builder, body);

        let result = BytecodeValidator::new(policy()).validate_module(&builder.build());
        assert!(result.is_allowed());
    }

    #[test]
    fn test_violation_survives_later_unresolved_tokens() {
        let mut builder = ScriptImageBuilder::new("Order");
        let file = builder.type_ref("System.IO", "File");
        let body = BodyBuilder::new()
            .token(LDTOKEN, file)
            .op(POP)
            .token(CALL, Token::new(TABLE_MEMBER_REF, 77))
            .op(RET)
            .build();
        script_with_body(&mut builder, body);

        let result = BytecodeValidator::new(policy()).validate_module(&builder.build());
        assert!(!result.is_allowed());
    }

    #[test]
    fn test_malformed_body_is_rejected() {
        let mut builder = ScriptImageBuilder::new("Broken");
        script_with_body(&mut builder, MethodBody::new(vec![0x00, 0x24]));

        let result = BytecodeValidator::new(policy()).validate_module(&builder.build());
        assert_eq!(result.kind(), Some(DenialKind::Malformed));
        assert!(result.reason().unwrap().contains("Game.Player.Update"));
    }

    #[test]
    fn test_bodyless_methods_and_blocked_locals() {
        let mut builder = ScriptImageBuilder::new("Abstract");
        builder.add_type(
            TypeInfo::class("Game", "Base")
                .abstract_type()
                .with_method(MethodInfo::new("Tick")),
        );
        assert!(BytecodeValidator::new(policy())
            .validate_module(&builder.build())
            .is_allowed());

        let mut builder = ScriptImageBuilder::new("Locals");
        let body = BodyBuilder::new()
            .op(RET)
            .build()
            .with_local(TypeDescriptor::named("System.IO", "Stream"));
        script_with_body(&mut builder, body);
        let result = BytecodeValidator::new(policy()).validate_module(&builder.build());
        assert!(result.reason().unwrap().contains("local 0"));
    }
}
