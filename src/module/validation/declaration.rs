//! Declaration-level validation
//!
//! Rejects a module whose visible shape alone references a blocked type, before
//! any instruction stream is decoded. Only members declared by each type are
//! scanned; inherited members belong to an already-validated base.

use std::sync::Arc;
use tracing::{debug, warn};

use super::result::ValidationResult;
use crate::module::metadata::{ModuleImage, TypeDescriptor, TypeInfo};
use crate::module::security::PolicySet;

/// Validator for type and member signatures
pub struct DeclarationValidator {
    policy: Arc<PolicySet>,
}

impl DeclarationValidator {
    pub fn new(policy: Arc<PolicySet>) -> Self {
        Self { policy }
    }

    /// Validate every type declared by the module
    ///
    /// A failure to enumerate the module's types is a rejection.
    pub fn validate_module(&self, image: &dyn ModuleImage) -> ValidationResult {
        let types = match image.types() {
            Ok(types) => types,
            Err(e) => {
                warn!("Cannot enumerate types of module {}: {}", image.name(), e);
                return ValidationResult::malformed(format!(
                    "failed to enumerate types of module {}: {}",
                    image.name(),
                    e
                ));
            }
        };

        for ty in types {
            let result = self.validate_type(ty);
            if !result.is_allowed() {
                warn!("Declaration check rejected module {}: {}", image.name(), result);
                return result;
            }
        }

        debug!(
            "Declaration check passed for module {} ({} types)",
            image.name(),
            types.len()
        );
        ValidationResult::Allowed
    }

    /// Validate a single type's declared shape
    pub fn validate_type(&self, ty: &TypeInfo) -> ValidationResult {
        match self.scan_type(ty) {
            Ok(()) => ValidationResult::Allowed,
            Err(reason) => ValidationResult::policy(reason),
        }
    }

    fn check(&self, ty: &TypeDescriptor, site: impl FnOnce() -> String) -> Result<(), String> {
        match self.policy.is_blocked(ty) {
            None => Ok(()),
            Some(blocked) => Err(format!("{} references {}", site(), blocked)),
        }
    }

    fn scan_type(&self, ty: &TypeInfo) -> Result<(), String> {
        let owner = ty.full_name();

        self.check(&ty.descriptor(), || format!("type {}", owner))?;
        if let Some(base) = &ty.base_type {
            self.check(base, || format!("{}: base type", owner))?;
        }
        for interface in &ty.interfaces {
            self.check(interface, || format!("{}: implemented interface", owner))?;
        }

        for field in &ty.fields {
            self.check(&field.field_type, || {
                format!("{}.{}: field type", owner, field.name)
            })?;
        }

        for property in &ty.properties {
            self.check(&property.property_type, || {
                format!("{}.{}: property type", owner, property.name)
            })?;
        }

        for method in &ty.methods {
            self.check(&method.return_type, || {
                format!("{}.{}: return type", owner, method.name)
            })?;
            for (index, parameter) in method.parameters.iter().enumerate() {
                self.check(parameter, || {
                    format!("{}.{}: parameter {}", owner, method.name, index)
                })?;
            }
        }

        for constructor in &ty.constructors {
            for (index, parameter) in constructor.parameters.iter().enumerate() {
                self.check(parameter, || {
                    format!("{}.{}: parameter {}", owner, constructor.name, index)
                })?;
            }
        }

        Ok(())
    }
}
