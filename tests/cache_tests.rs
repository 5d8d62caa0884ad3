//! Content-addressed module cache tests

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use common::*;
use script_sandbox::module::loader::ModuleLoader;
use script_sandbox::module::metadata::{
    BodyBuilder, MetadataError, MethodInfo, ModuleImage, ScriptImage, ScriptImageBuilder,
    TypeDescriptor, TypeInfo, TypeName,
};
use script_sandbox::module::validation::opcodes::{CALL, POP, RET};
use script_sandbox::{
    ContentHash, EngineError, MethodHandle, ModuleCache, ModuleHandle, ObjectHandle, PolicySet,
    SandboxEngine, ScriptError, ScriptValue,
};

fn cache_with(engine: &Arc<MockEngine>, policy: PolicySet) -> ModuleCache {
    ModuleCache::new(engine.clone(), Arc::new(policy))
}

#[test]
fn test_identical_bytes_share_one_module() {
    let engine = MockEngine::new();
    let cache = cache_with(&engine, PolicySet::with_defaults());
    let bytes = clean_module();

    let first = cache.try_load(&bytes, None).unwrap();
    let second = cache.try_load(&bytes.clone(), None).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    let stats = cache.stats();
    assert_eq!(stats.validations, 1);
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(engine.inspection_count(), 1);
    assert_eq!(engine.load_count(), 1);
    assert_eq!(first.hash(), ContentHash::of(&bytes));
}

#[test]
fn test_blocked_call_is_rejected_without_loading() {
    let engine = MockEngine::new();
    let cache = cache_with(&engine, PolicySet::with_defaults());
    let bytes = blocked_call_module();

    let err = cache.try_load(&bytes, None).unwrap_err();
    match &err {
        ScriptError::PolicyViolation(reason) => {
            assert!(reason.contains("Game.Sneaky.Update"), "{}", reason)
        }
        other => panic!("expected policy violation, got {:?}", other),
    }
    assert!(err.poisons_cache());
    assert_eq!(engine.load_count(), 0);
    assert!(cache.is_empty());

    // Resubmitting runs a fresh validation pass
    assert!(cache.try_load(&bytes, None).is_err());
    assert_eq!(cache.stats().validations, 2);
    assert_eq!(cache.stats().rejections, 2);
}

#[test]
fn test_garbage_bytes_are_malformed() {
    let engine = MockEngine::new();
    let cache = cache_with(&engine, PolicySet::with_defaults());

    let err = cache.try_load(b"MZ\x90\x00 not a script image", None).unwrap_err();
    assert!(matches!(err, ScriptError::MalformedModule(_)));
    assert!(cache.is_empty());
}

#[test]
fn test_allow_entry_admits_single_type() {
    let engine = MockEngine::new();
    let policy = Arc::new(PolicySet::with_defaults());
    let cache = ModuleCache::new(engine.clone(), Arc::clone(&policy));
    let bytes = single_reference_module("System.IO", "Path");

    assert!(matches!(
        cache.try_load(&bytes, None),
        Err(ScriptError::PolicyViolation(_))
    ));

    policy.add_allowed_type("System.IO.Path");
    let module = cache.try_load(&bytes, None).unwrap();
    assert_eq!(module.name(), "SingleReference");

    // Siblings in the namespace stay blocked
    let sibling = single_reference_module("System.IO", "File");
    assert!(cache.try_load(&sibling, None).is_err());
}

#[test]
fn test_policy_growth_evicts_resident_module() {
    let engine = MockEngine::new();
    let policy = Arc::new(PolicySet::new());
    let cache = ModuleCache::new(engine.clone(), Arc::clone(&policy));
    let bytes = single_reference_module("Game.Internal", "Cheats");

    let module = cache.try_load(&bytes, None).unwrap();
    let handle = module.handle();
    drop(module);

    policy.add_blocked_namespace("Game.Internal");
    let err = cache.try_load(&bytes, None).unwrap_err();
    assert!(matches!(err, ScriptError::PolicyViolation(_)));
    assert!(!cache.contains(&ContentHash::of(&bytes)));
    assert_eq!(cache.stats().evictions, 1);
    // Evicted modules stay loaded until teardown
    assert!(engine.unloaded().is_empty());

    assert!(cache.try_load(&bytes, None).is_err());
    assert_eq!(engine.load_count(), 1);

    cache.shutdown();
    assert_eq!(engine.unloaded(), vec![handle.0]);
}

#[test]
fn test_reallowed_module_is_restored_not_reloaded() {
    let engine = MockEngine::new();
    let policy = Arc::new(PolicySet::new());
    let cache = ModuleCache::new(engine.clone(), Arc::clone(&policy));
    let bytes = single_reference_module("Game.Internal", "Cheats");

    let first = cache.try_load(&bytes, None).unwrap();
    policy.add_blocked_namespace("Game.Internal");
    assert!(cache.try_load(&bytes, None).is_err());
    assert!(!cache.contains(&first.hash()));

    policy.add_allowed_type("Game.Internal.Cheats");
    let second = cache.try_load(&bytes, None).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(engine.load_count(), 1);
    assert!(cache.contains(&first.hash()));
    assert_eq!(cache.stats().evictions, 1);

    // Restored modules are unloaded once, not twice
    cache.shutdown();
    assert_eq!(engine.unloaded(), vec![first.handle().0]);
}

#[test]
fn test_split_type_name_cannot_escape_namespace_block() {
    for declaring in [TypeName::new("", "System.IO.File"), TypeName::new("System", "IO.File")] {
        let mut builder = ScriptImageBuilder::new("Split");
        let read = builder.method_ref(
            TypeDescriptor::Named(declaring.clone()),
            "ReadAllText",
            TypeDescriptor::named("System", "String"),
            vec![TypeDescriptor::named("System", "String")],
        );
        builder.add_type(
            TypeInfo::class("Game", "Splitter").with_method(
                MethodInfo::new("Update").with_body(
                    BodyBuilder::new()
                        .ldstr(1)
                        .token(CALL, read)
                        .op(POP)
                        .op(RET)
                        .build(),
                ),
            ),
        );

        let engine = MockEngine::new();
        let cache = cache_with(&engine, PolicySet::with_defaults());
        match cache.try_load(&encode(builder), None) {
            Err(ScriptError::PolicyViolation(reason)) => {
                assert!(reason.contains("System.IO"), "{}", reason)
            }
            other => panic!("{:?} loaded: {:?}", declaring, other),
        }
        assert_eq!(engine.load_count(), 0);
    }
}

#[test]
fn test_unrelated_policy_growth_keeps_module() {
    let engine = MockEngine::new();
    let policy = Arc::new(PolicySet::new());
    let cache = ModuleCache::new(engine.clone(), Arc::clone(&policy));
    let bytes = clean_module();

    let first = cache.try_load(&bytes, None).unwrap();
    policy.add_blocked_namespace("System.Net");
    let second = cache.try_load(&bytes, None).unwrap();
    let third = cache.try_load(&bytes, None).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&second, &third));
    // First sight plus one re-check after the policy moved
    assert_eq!(cache.stats().validations, 2);
    assert_eq!(engine.load_count(), 1);
}

#[test]
fn test_concurrent_loads_validate_once() {
    let engine = MockEngine::new();
    let cache = Arc::new(cache_with(&engine, PolicySet::with_defaults()));
    let bytes = Arc::new(clean_module());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let bytes = Arc::clone(&bytes);
            thread::spawn(move || cache.try_load(&bytes, None).unwrap())
        })
        .collect();
    let modules: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for module in &modules[1..] {
        assert!(Arc::ptr_eq(&modules[0], module));
    }
    assert_eq!(cache.stats().validations, 1);
    assert_eq!(cache.stats().hits, 15);
    assert_eq!(engine.inspection_count(), 1);
    assert_eq!(engine.load_count(), 1);
}

#[test]
fn test_precomputed_hash_is_trusted_for_lookup_only() {
    let engine = MockEngine::new();
    let cache = cache_with(&engine, PolicySet::with_defaults());
    let bytes = clean_module();
    let hex = ContentHash::of(&bytes).to_hex();

    let module = cache.try_load(&bytes, Some(hex.as_str())).unwrap();
    assert_eq!(module.hash().to_hex(), hex);
    assert!(Arc::ptr_eq(&module, &cache.try_load(&bytes, None).unwrap()));

    // Validation still runs for unseen digests
    let blocked = blocked_call_module();
    let blocked_hex = ContentHash::of(&blocked).to_hex();
    assert!(cache.try_load(&blocked, Some(blocked_hex.as_str())).is_err());

    assert!(matches!(
        cache.try_load(&bytes, Some("zz")),
        Err(ScriptError::MalformedModule(_))
    ));
}

#[test]
fn test_verified_precomputed_hash_mismatch() {
    let engine = MockEngine::new();
    let cache = cache_with(&engine, PolicySet::with_defaults()).verify_precomputed_hash(true);
    let bytes = clean_module();
    let wrong = ContentHash::of(b"something else").to_hex();

    assert!(matches!(
        cache.try_load(&bytes, Some(wrong.as_str())),
        Err(ScriptError::MalformedModule(_))
    ));
    assert_eq!(engine.inspection_count(), 0);
}

/// Engine whose load step always fails after inspection succeeds
///
/// With `unenumerable` set, inspection yields an image whose types cannot be
/// listed.
#[derive(Default)]
struct BrokenEngine {
    unenumerable: bool,
    loads: AtomicUsize,
}

impl SandboxEngine for BrokenEngine {
    fn inspect(&self, bytes: &[u8]) -> Result<Arc<dyn ModuleImage>, MetadataError> {
        if self.unenumerable {
            return Ok(Arc::new(UnenumerableImage));
        }
        Ok(Arc::new(ScriptImage::decode(bytes)?))
    }

    fn load_module(&self, _bytes: &[u8]) -> Result<ModuleHandle, EngineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Err(EngineError::LoadFailed("out of sandbox memory".to_string()))
    }

    fn find_method(
        &self,
        module: ModuleHandle,
        _type_name: &str,
        _member: &str,
    ) -> Result<Option<MethodHandle>, EngineError> {
        Err(EngineError::InvalidHandle(module.0))
    }

    fn create_instance(
        &self,
        module: ModuleHandle,
        _type_name: &str,
    ) -> Result<ObjectHandle, EngineError> {
        Err(EngineError::InvalidHandle(module.0))
    }

    fn invoke(
        &self,
        object: ObjectHandle,
        _method: MethodHandle,
        _args: &[ScriptValue],
    ) -> Result<ScriptValue, EngineError> {
        Err(EngineError::InvalidHandle(object.0))
    }

    fn dispose(&self, _object: ObjectHandle) {}

    fn unload_module(&self, _module: ModuleHandle) {}
}

#[test]
fn test_engine_load_failure_registers_nothing() {
    let cache = ModuleCache::new(
        Arc::new(BrokenEngine::default()),
        Arc::new(PolicySet::with_defaults()),
    );
    let err = cache.try_load(&clean_module(), None).unwrap_err();
    assert!(matches!(err, ScriptError::Engine(EngineError::LoadFailed(_))));
    assert!(!err.poisons_cache());
    assert!(cache.is_empty());

    let stats = cache.stats();
    assert_eq!(stats.validations, 1);
    assert_eq!(stats.load_failures, 1);
    assert_eq!(stats.loads, 0);
    assert_eq!(stats.rejections, 0);
}

#[test]
fn test_unenumerable_image_is_rejected_before_load() {
    let engine = Arc::new(BrokenEngine {
        unenumerable: true,
        ..BrokenEngine::default()
    });
    let cache = ModuleCache::new(engine.clone(), Arc::new(PolicySet::new()));

    let err = cache.try_load(&clean_module(), None).unwrap_err();
    match &err {
        ScriptError::MalformedModule(reason) => {
            assert!(reason.contains("Unenumerable"), "{}", reason)
        }
        other => panic!("expected malformed module, got {:?}", other),
    }
    assert!(err.poisons_cache());
    assert_eq!(engine.loads.load(Ordering::SeqCst), 0);
    assert_eq!(cache.stats().rejections, 1);
    assert!(cache.is_empty());
}

#[test]
fn test_drop_unloads_every_module_once() {
    let engine = MockEngine::new();
    {
        let cache = cache_with(&engine, PolicySet::with_defaults());
        cache.try_load(&clean_module(), None).unwrap();
        cache.try_load(&contract_module(), None).unwrap();
        cache.shutdown();
        assert_eq!(engine.unloaded().len(), 2);
    }
    assert_eq!(engine.unloaded().len(), 2);
}

#[test]
fn test_loader_uses_sidecar_digest() {
    let engine = MockEngine::new();
    let loader = ModuleLoader::new(Arc::new(cache_with(&engine, PolicySet::with_defaults())));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("player.scim");
    let bytes = clean_module();
    std::fs::write(&path, &bytes).unwrap();
    std::fs::write(
        ModuleLoader::sidecar_path(&path),
        format!("{}  player.scim\n", ContentHash::of(&bytes)),
    )
    .unwrap();

    let module = loader.load_file(&path).unwrap();
    assert_eq!(module.hash(), ContentHash::of(&bytes));
    assert_eq!(loader.cache().len(), 1);
}
