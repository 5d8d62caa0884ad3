//! Module validation framework
//!
//! Two passes gate every module: declaration validation over type and member
//! signatures, then bytecode validation over method bodies. Both consult the
//! same shared policy.

pub mod bytecode;
pub mod declaration;
pub mod decoder;
pub mod opcodes;
pub mod result;

use std::sync::Arc;

use crate::module::metadata::ModuleImage;
use crate::module::security::PolicySet;

pub use bytecode::BytecodeValidator;
pub use declaration::DeclarationValidator;
pub use decoder::{decode_all, DecodeError, Instruction, InstructionReader, Operand};
pub use opcodes::{OpCode, OperandType};
pub use result::{DenialKind, ValidationResult};

/// Run both validation passes, declaration first
///
/// Bytecode is only decoded for modules whose declarations are clean.
pub fn validate_module(policy: &Arc<PolicySet>, image: &dyn ModuleImage) -> ValidationResult {
    let declarations = DeclarationValidator::new(Arc::clone(policy)).validate_module(image);
    if !declarations.is_allowed() {
        return declarations;
    }
    BytecodeValidator::new(Arc::clone(policy)).validate_module(image)
}
