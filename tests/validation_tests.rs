//! Validator integration tests
//!
//! Exercise both passes over encoded images, the way the cache sees them.

mod common;

use std::sync::Arc;

use common::*;
use script_sandbox::module::metadata::{
    BodyBuilder, FieldInfo, MethodInfo, ScriptImage, ScriptImageBuilder, TypeDescriptor, TypeInfo,
    TypeName,
};
use script_sandbox::module::security::PolicySet;
use script_sandbox::module::validation::opcodes::*;
use script_sandbox::module::validation::{
    self, BytecodeValidator, DeclarationValidator, DenialKind,
};

fn defaults() -> Arc<PolicySet> {
    Arc::new(PolicySet::with_defaults())
}

fn decode(bytes: &[u8]) -> ScriptImage {
    ScriptImage::decode(bytes).unwrap()
}

#[test]
fn test_clean_module_passes_both_passes() {
    let image = decode(&clean_module());
    assert!(validation::validate_module(&defaults(), &image).is_allowed());
}

#[test]
fn test_body_only_usage_needs_bytecode_pass() {
    let image = decode(&blocked_call_module());
    let policy = defaults();

    assert!(DeclarationValidator::new(Arc::clone(&policy))
        .validate_module(&image)
        .is_allowed());

    let result = BytecodeValidator::new(Arc::clone(&policy)).validate_module(&image);
    assert_eq!(result.kind(), Some(DenialKind::Policy));
    let reason = result.reason().unwrap();
    assert!(reason.contains("Game.Sneaky.Update"), "{}", reason);
    assert!(reason.contains("System.IO.File::ReadAllText"), "{}", reason);
}

#[test]
fn test_declaration_failure_short_circuits() {
    let mut builder = ScriptImageBuilder::new("Both");
    let read = builder.method_ref(
        TypeDescriptor::named("System.IO", "File"),
        "Delete",
        TypeDescriptor::void(),
        vec![],
    );
    builder.add_type(
        TypeInfo::class("Game", "Leaky")
            .with_field(FieldInfo::new(
                "handle",
                TypeDescriptor::named("System.Runtime.InteropServices", "SafeHandle"),
            ))
            .with_method(
                MethodInfo::new("Update").with_body(BodyBuilder::new().token(CALL, read).op(RET).build()),
            ),
    );
    let image = builder.build();

    let result = validation::validate_module(&defaults(), &image);
    assert!(result.reason().unwrap().starts_with("Game.Leaky.handle: field type"));
}

#[test]
fn test_generic_method_instantiation_argument_is_checked() {
    let mut builder = ScriptImageBuilder::new("GenericCall");
    let create = builder.method_ref(
        TypeDescriptor::named("Sandbox", "Factory"),
        "Create",
        TypeDescriptor::GenericParam("T".to_string()),
        vec![],
    );
    let instantiated = builder.method_spec(
        create,
        vec![TypeDescriptor::named("System.Net.Sockets", "Socket")],
    );
    builder.add_type(
        TypeInfo::class("Game", "Spawner").with_method(
            MethodInfo::new("Start").with_body(
                BodyBuilder::new()
                    .token(CALL, instantiated)
                    .op(POP)
                    .op(RET)
                    .build(),
            ),
        ),
    );

    let result = validation::validate_module(&defaults(), &builder.build());
    let reason = result.reason().unwrap();
    assert!(reason.contains("generic argument System.Net.Sockets.Socket"), "{}", reason);
}

#[test]
fn test_constructed_blocked_generic_local_and_catch() {
    let list_of_files = TypeDescriptor::generic(
        TypeName::new("System.Collections.Generic", "List`1"),
        vec![TypeDescriptor::named("System.IO", "FileInfo").array_of()],
    );
    let mut builder = ScriptImageBuilder::new("Locals");
    builder.add_type(TypeInfo::class("Game", "Inventory").with_method(
        MethodInfo::new("Load").with_body(BodyBuilder::new().op(RET).build().with_local(list_of_files)),
    ));
    let result = validation::validate_module(&defaults(), &builder.build());
    assert!(result.reason().unwrap().contains("local 0"));

    let mut builder = ScriptImageBuilder::new("Catch");
    builder.add_type(TypeInfo::class("Game", "Saver").with_method(
        MethodInfo::new("Save").with_body(
            BodyBuilder::new()
                .op(RET)
                .build()
                .with_catch(TypeDescriptor::named("System.IO", "IOException")),
        ),
    ));
    let result = validation::validate_module(&defaults(), &builder.build());
    assert!(result.reason().unwrap().contains("exception handler"));
}

#[test]
fn test_constructor_bodies_are_scanned() {
    let mut builder = ScriptImageBuilder::new("Ctor");
    let env = builder.method_ref(
        TypeDescriptor::named("System", "Environment"),
        "Exit",
        TypeDescriptor::void(),
        vec![TypeDescriptor::named("System", "Int32")],
    );
    builder.add_type(TypeInfo::class("Game", "Quitter").with_constructor(
        MethodInfo::constructor().with_body(
            BodyBuilder::new()
                .op(LDC_I4_0)
                .token(CALL, env)
                .op(RET)
                .build(),
        ),
    ));
    let result = validation::validate_module(&defaults(), &builder.build());
    let reason = result.reason().unwrap();
    assert!(reason.starts_with("Game.Quitter..ctor: IL_0001 call"), "{}", reason);
}

#[test]
fn test_out_of_range_branch_is_malformed() {
    let mut builder = ScriptImageBuilder::new("Branches");
    builder.add_type(TypeInfo::class("Game", "Looper").with_method(
        MethodInfo::new("Update").with_body(
            BodyBuilder::new().op(NOP).op_i32(BR, 4096).op(RET).build(),
        ),
    ));
    let result = validation::validate_module(&defaults(), &builder.build());
    assert_eq!(result.kind(), Some(DenialKind::Malformed));

    let mut builder = ScriptImageBuilder::new("Switches");
    builder.add_type(TypeInfo::class("Game", "Router").with_method(
        MethodInfo::new("Route").with_body(
            BodyBuilder::new().op(LDARG_1).switch(&[0, -100]).op(RET).build(),
        ),
    ));
    let result = validation::validate_module(&defaults(), &builder.build());
    assert_eq!(result.kind(), Some(DenialKind::Malformed));
}

#[test]
fn test_in_range_switch_passes() {
    let mut builder = ScriptImageBuilder::new("Switches");
    builder.add_type(TypeInfo::class("Game", "Router").with_method(
        MethodInfo::new("Route").with_body(
            BodyBuilder::new()
                .op(LDARG_1)
                .switch(&[0, 1])
                .op(NOP)
                .op(RET)
                .build(),
        ),
    ));
    assert!(validation::validate_module(&defaults(), &builder.build()).is_allowed());
}

#[test]
fn test_policy_growth_changes_verdict() {
    let image = decode(&single_reference_module("Game.Internal", "Cheats"));
    let policy = Arc::new(PolicySet::new());
    assert!(validation::validate_module(&policy, &image).is_allowed());

    policy.add_blocked_namespace("Game.Internal");
    assert!(!validation::validate_module(&policy, &image).is_allowed());
}

#[test]
fn test_type_enumeration_failure_is_malformed() {
    let image = UnenumerableImage;
    let policy = Arc::new(PolicySet::new());

    let declarations = DeclarationValidator::new(Arc::clone(&policy)).validate_module(&image);
    assert_eq!(declarations.kind(), Some(DenialKind::Malformed));
    assert!(declarations.reason().unwrap().contains("Unenumerable"));

    let bodies = BytecodeValidator::new(Arc::clone(&policy)).validate_module(&image);
    assert_eq!(bodies.kind(), Some(DenialKind::Malformed));

    let combined = validation::validate_module(&policy, &image);
    assert!(!combined.is_allowed());
    assert_eq!(combined.kind(), Some(DenialKind::Malformed));
}

#[test]
fn test_split_field_owner_is_blocked_by_namespace() {
    let mut builder = ScriptImageBuilder::new("SplitField");
    let handle = builder.field_ref(
        TypeDescriptor::Named(TypeName::new("System", "IO.Stream")),
        "Null",
        TypeDescriptor::named("System", "Object"),
    );
    builder.add_type(
        TypeInfo::class("Game", "Reader").with_method(
            MethodInfo::new("Update").with_body(
                BodyBuilder::new()
                    .token(LDSFLD, handle)
                    .op(POP)
                    .op(RET)
                    .build(),
            ),
        ),
    );
    let image = builder.build();

    assert!(DeclarationValidator::new(defaults()).validate_module(&image).is_allowed());
    let result = BytecodeValidator::new(defaults()).validate_module(&image);
    assert_eq!(result.kind(), Some(DenialKind::Policy));
    assert!(result.reason().unwrap().contains("System.IO.Stream"));
}
