//! Shared test infrastructure
//!
//! A recording `MockEngine` standing in for the embedded interpreter, plus
//! script image fixtures.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use script_sandbox::module::metadata::{
    BodyBuilder, FieldRef, MethodBody, MethodInfo, MethodRef, MetadataError, ModuleImage,
    ScriptImage, ScriptImageBuilder, Token, TypeDescriptor, TypeInfo, TypeShape,
};
use script_sandbox::module::validation::opcodes::{CALL, LDARG_0, LDTOKEN, NOP, POP, RET};
use script_sandbox::{
    EngineError, MethodHandle, ModuleHandle, ObjectHandle, SandboxEngine, ScriptValue,
};

/// A recorded member invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub type_name: String,
    pub member: String,
    pub args: Vec<ScriptValue>,
}

#[derive(Default)]
struct EngineState {
    modules: HashMap<u64, ScriptImage>,
    objects: HashMap<u64, (u64, String)>,
    methods: HashMap<u64, (String, String)>,
    method_ids: HashMap<(u64, String, String), u64>,
    throwing: HashMap<(String, String), String>,
    invocations: Vec<Invocation>,
    disposed: Vec<u64>,
    unloaded: Vec<u64>,
    /// Types the host provides to every module, by full name
    host_types: HashMap<String, TypeShape>,
}

/// In-memory engine recording every call made through `SandboxEngine`
#[derive(Default)]
pub struct MockEngine {
    next_handle: AtomicU64,
    pub inspections: AtomicUsize,
    pub loads: AtomicUsize,
    pub lookups: AtomicUsize,
    state: Mutex<EngineState>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Make `type_name.member` raise when invoked
    pub fn throw_on(&self, type_name: &str, member: &str, message: &str) {
        self.state.lock().unwrap().throwing.insert(
            (type_name.to_string(), member.to_string()),
            message.to_string(),
        );
    }

    /// Make a host-provided type visible to `resolve_type`
    pub fn register_host_type(&self, shape: TypeShape) {
        self.state
            .lock()
            .unwrap()
            .host_types
            .insert(shape.full_name.clone(), shape);
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().unwrap().invocations.clone()
    }

    pub fn invocation_count(&self, member: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .invocations
            .iter()
            .filter(|i| i.member == member)
            .count()
    }

    pub fn disposed(&self) -> Vec<u64> {
        self.state.lock().unwrap().disposed.clone()
    }

    pub fn unloaded(&self) -> Vec<u64> {
        self.state.lock().unwrap().unloaded.clone()
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn inspection_count(&self) -> usize {
        self.inspections.load(Ordering::SeqCst)
    }
}

impl SandboxEngine for MockEngine {
    fn inspect(&self, bytes: &[u8]) -> Result<Arc<dyn ModuleImage>, MetadataError> {
        self.inspections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptImage::decode(bytes)?))
    }

    fn load_module(&self, bytes: &[u8]) -> Result<ModuleHandle, EngineError> {
        let image =
            ScriptImage::decode(bytes).map_err(|e| EngineError::LoadFailed(e.to_string()))?;
        self.loads.fetch_add(1, Ordering::SeqCst);
        let id = self.handle();
        self.state.lock().unwrap().modules.insert(id, image);
        Ok(ModuleHandle(id))
    }

    fn find_method(
        &self,
        module: ModuleHandle,
        type_name: &str,
        member: &str,
    ) -> Result<Option<MethodHandle>, EngineError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let image = state
            .modules
            .get(&module.0)
            .ok_or(EngineError::InvalidHandle(module.0))?;
        let ty = image
            .find_type(type_name)
            .ok_or_else(|| EngineError::TypeNotFound(type_name.to_string()))?;
        if ty.find_method(member).is_none() {
            return Ok(None);
        }

        let key = (module.0, type_name.to_string(), member.to_string());
        if let Some(id) = state.method_ids.get(&key) {
            return Ok(Some(MethodHandle(*id)));
        }
        let id = self.handle();
        state.method_ids.insert(key, id);
        state
            .methods
            .insert(id, (type_name.to_string(), member.to_string()));
        Ok(Some(MethodHandle(id)))
    }

    fn resolve_type(
        &self,
        module: ModuleHandle,
        full_name: &str,
    ) -> Result<Option<TypeShape>, EngineError> {
        let state = self.state.lock().unwrap();
        if !state.modules.contains_key(&module.0) {
            return Err(EngineError::InvalidHandle(module.0));
        }
        Ok(state.host_types.get(full_name).cloned())
    }

    fn create_instance(
        &self,
        module: ModuleHandle,
        type_name: &str,
    ) -> Result<ObjectHandle, EngineError> {
        let mut state = self.state.lock().unwrap();
        let image = state
            .modules
            .get(&module.0)
            .ok_or(EngineError::InvalidHandle(module.0))?;
        if image.find_type(type_name).is_none() {
            return Err(EngineError::TypeNotFound(type_name.to_string()));
        }
        let id = self.handle();
        state.objects.insert(id, (module.0, type_name.to_string()));
        Ok(ObjectHandle(id))
    }

    fn invoke(
        &self,
        object: ObjectHandle,
        method: MethodHandle,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, EngineError> {
        let mut state = self.state.lock().unwrap();
        if !state.objects.contains_key(&object.0) {
            return Err(EngineError::InvalidHandle(object.0));
        }
        let (type_name, member) = state
            .methods
            .get(&method.0)
            .cloned()
            .ok_or(EngineError::InvalidHandle(method.0))?;
        state.invocations.push(Invocation {
            type_name: type_name.clone(),
            member: member.clone(),
            args: args.to_vec(),
        });
        match state.throwing.get(&(type_name.clone(), member)) {
            Some(message) => Err(EngineError::Exception {
                type_name,
                message: message.clone(),
            }),
            None => Ok(ScriptValue::Unit),
        }
    }

    fn dispose(&self, object: ObjectHandle) {
        let mut state = self.state.lock().unwrap();
        state.objects.remove(&object.0);
        state.disposed.push(object.0);
    }

    fn unload_module(&self, module: ModuleHandle) {
        let mut state = self.state.lock().unwrap();
        state.modules.remove(&module.0);
        state.unloaded.push(module.0);
    }
}

pub fn script_base() -> TypeDescriptor {
    TypeDescriptor::named("Sandbox", "ScriptBehaviour")
}

fn trivial_body() -> MethodBody {
    BodyBuilder::new().op(NOP).op(RET).build()
}

/// Module using only permitted types: `Game.Player` with Awake, Update and
/// LateUpdate
pub fn clean_module() -> Vec<u8> {
    let mut builder = ScriptImageBuilder::new("CleanScripts");
    let log = builder.method_ref(
        TypeDescriptor::named("Sandbox", "Debug"),
        "Log",
        TypeDescriptor::void(),
        vec![TypeDescriptor::named("System", "String")],
    );
    let update = BodyBuilder::new()
        .ldstr(1)
        .token(CALL, log)
        .op(RET)
        .build()
        .with_local(TypeDescriptor::named("System", "Single"));

    builder.add_type(
        TypeInfo::class("Game", "Player")
            .with_base(script_base())
            .with_constructor(
                MethodInfo::constructor()
                    .with_body(BodyBuilder::new().op(LDARG_0).op(POP).op(RET).build()),
            )
            .with_method(MethodInfo::new("Awake").with_body(trivial_body()))
            .with_method(MethodInfo::new("Update").with_body(update))
            .with_method(MethodInfo::new("LateUpdate").with_body(trivial_body())),
    );
    builder.add_type(TypeInfo::class("Game", "Helper"));
    encode(builder)
}

/// Module whose `Game.Sneaky.Update` body calls `System.IO.File.ReadAllText`
/// while every signature stays clean
pub fn blocked_call_module() -> Vec<u8> {
    let mut builder = ScriptImageBuilder::new("SneakyScripts");
    let read = builder.method_ref(
        TypeDescriptor::named("System.IO", "File"),
        "ReadAllText",
        TypeDescriptor::named("System", "String"),
        vec![TypeDescriptor::named("System", "String")],
    );
    let body = BodyBuilder::new()
        .ldstr(1)
        .token(CALL, read)
        .op(POP)
        .op(RET)
        .build();
    builder.add_type(
        TypeInfo::class("Game", "Sneaky")
            .with_base(script_base())
            .with_method(MethodInfo::new("Update").with_body(body)),
    );
    encode(builder)
}

/// Module whose only external reference is `namespace.name`, used via ldtoken
pub fn single_reference_module(namespace: &str, name: &str) -> Vec<u8> {
    let mut builder = ScriptImageBuilder::new("SingleReference");
    let target = builder.type_ref(namespace, name);
    let body = BodyBuilder::new()
        .token(LDTOKEN, target)
        .op(POP)
        .op(RET)
        .build();
    builder.add_type(
        TypeInfo::class("Game", "Timer")
            .with_base(script_base())
            .with_method(MethodInfo::new("Start").with_body(body)),
    );
    encode(builder)
}

/// Module with a script type, a plain type and an abstract script type
pub fn contract_module() -> Vec<u8> {
    let mut builder = ScriptImageBuilder::new("ContractScripts");
    builder.add_type(
        TypeInfo::class("Game", "Script")
            .with_base(script_base())
            .with_method(MethodInfo::new("Update").with_body(trivial_body())),
    );
    builder.add_type(TypeInfo::class("Game", "NotAScript"));
    builder.add_type(
        TypeInfo::class("Game", "AbstractScript")
            .abstract_type()
            .with_base(script_base()),
    );
    encode(builder)
}

pub fn encode(builder: ScriptImageBuilder) -> Vec<u8> {
    builder.build().encode().expect("fixture image encodes")
}

/// Image whose type table cannot be enumerated
pub struct UnenumerableImage;

impl ModuleImage for UnenumerableImage {
    fn name(&self) -> &str {
        "Unenumerable"
    }

    fn types(&self) -> Result<&[TypeInfo], MetadataError> {
        Err(MetadataError::Malformed(
            "type table references a missing dependency".to_string(),
        ))
    }

    fn resolve_type(&self, token: Token) -> Result<TypeDescriptor, MetadataError> {
        Err(MetadataError::UnresolvedToken(token))
    }

    fn resolve_field(&self, token: Token) -> Result<FieldRef, MetadataError> {
        Err(MetadataError::UnresolvedToken(token))
    }

    fn resolve_method(&self, token: Token) -> Result<MethodRef, MetadataError> {
        Err(MetadataError::UnresolvedToken(token))
    }
}
