//! Script contract
//!
//! A type can be driven by the lifecycle bridge only if it implements a known
//! marker interface or derives, directly or transitively, from a known base
//! type. Comparison is by full name so identical types loaded across the
//! engine boundary still match.

use std::collections::HashSet;

use crate::module::metadata::{ModuleImage, TypeInfo, TypeKind, TypeShape};
use crate::module::registry::LoadedModule;
use crate::module::traits::{EngineError, SandboxEngine, ScriptError};

/// Marker interface and base types a script type may satisfy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptContract {
    marker_interfaces: Vec<String>,
    base_types: Vec<String>,
}

impl ScriptContract {
    /// Contract nothing satisfies until markers or bases are added
    pub fn new() -> Self {
        Self::default()
    }

    /// The conventional `Sandbox.IScript` / `Sandbox.ScriptBehaviour` pair
    pub fn standard() -> Self {
        Self::new()
            .with_marker_interface("Sandbox.IScript")
            .with_base_type("Sandbox.ScriptBehaviour")
    }

    pub fn with_marker_interface(mut self, full_name: &str) -> Self {
        self.marker_interfaces.push(full_name.to_string());
        self
    }

    pub fn with_base_type(mut self, full_name: &str) -> Self {
        self.base_types.push(full_name.to_string());
        self
    }

    pub fn marker_interfaces(&self) -> &[String] {
        &self.marker_interfaces
    }

    pub fn base_types(&self) -> &[String] {
        &self.base_types
    }

    /// Resolve `type_name` in the module and check it satisfies the contract
    ///
    /// Only types declared by the module are followed; see
    /// [`check_loaded`](Self::check_loaded) to continue into engine-known types.
    pub fn check<'a>(
        &self,
        image: &'a dyn ModuleImage,
        type_name: &str,
    ) -> Result<&'a TypeInfo, ScriptError> {
        self.check_with(image, type_name, |_| Ok(None))
    }

    /// Check a type of a loaded module, following bases and interfaces the
    /// image does not declare through `SandboxEngine::resolve_type`
    pub fn check_loaded<'a>(
        &self,
        module: &'a LoadedModule,
        engine: &dyn SandboxEngine,
        type_name: &str,
    ) -> Result<&'a TypeInfo, ScriptError> {
        self.check_with(module.image(), type_name, |name| {
            engine.resolve_type(module.handle(), name)
        })
    }

    fn check_with<'a, F>(
        &self,
        image: &'a dyn ModuleImage,
        type_name: &str,
        external: F,
    ) -> Result<&'a TypeInfo, ScriptError>
    where
        F: FnMut(&str) -> Result<Option<TypeShape>, EngineError>,
    {
        let ty = image.find_type(type_name).ok_or_else(|| {
            ScriptError::TypeNotFound(format!("{} in module {}", type_name, image.name()))
        })?;

        if ty.kind == TypeKind::Interface || ty.is_abstract {
            return Err(ScriptError::ContractViolation(format!(
                "{} is abstract and cannot be instantiated",
                type_name
            )));
        }

        if self.is_satisfied_by(ty.shape(), image, external)? {
            Ok(ty)
        } else {
            Err(ScriptError::ContractViolation(format!(
                "{} neither implements {} nor derives from {}",
                type_name,
                describe(&self.marker_interfaces),
                describe(&self.base_types)
            )))
        }
    }

    /// Walk bases and interfaces from `start` looking for a known base type or
    /// marker interface
    ///
    /// Names are looked up in the image first, then through `external`; a
    /// name neither knows ends that branch. Cycles are cut by name.
    pub fn is_satisfied_by<F>(
        &self,
        start: TypeShape,
        image: &dyn ModuleImage,
        mut external: F,
    ) -> Result<bool, EngineError>
    where
        F: FnMut(&str) -> Result<Option<TypeShape>, EngineError>,
    {
        let mut visited = HashSet::new();
        visited.insert(start.full_name.clone());
        let mut pending = vec![start];

        while let Some(shape) = pending.pop() {
            if shape
                .interfaces
                .iter()
                .any(|iface| self.marker_interfaces.contains(iface))
            {
                return Ok(true);
            }
            if let Some(base) = &shape.base_type {
                if self.base_types.contains(base) {
                    return Ok(true);
                }
            }

            for name in shape.base_type.iter().chain(shape.interfaces.iter()) {
                if !visited.insert(name.clone()) {
                    continue;
                }
                let next = match image.find_type(name) {
                    Some(declared) => Some(declared.shape()),
                    None => external(name)?,
                };
                pending.extend(next);
            }
        }
        Ok(false)
    }
}

fn describe(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(" or ")
    }
}
