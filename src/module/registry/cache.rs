//! Content-addressed module cache
//!
//! Single entry point from raw bytes to a validated, reusable module. A module
//! is loaded into the engine at most once per distinct content hash; every
//! resident module is re-checked when the policy has changed since it was
//! last validated.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::hash::ContentHash;
use crate::module::metadata::ModuleImage;
use crate::module::security::PolicySet;
use crate::module::traits::{ModuleHandle, SandboxEngine, ScriptError};
use crate::module::validation::{self, DenialKind, ValidationResult};

/// A validated module resident in the engine
///
/// Shared read-only by every host object whose module bytes hash identically.
pub struct LoadedModule {
    hash: ContentHash,
    handle: ModuleHandle,
    image: Arc<dyn ModuleImage>,
}

impl LoadedModule {
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    pub fn handle(&self) -> ModuleHandle {
        self.handle
    }

    /// Reflection view the module was validated against
    pub fn image(&self) -> &dyn ModuleImage {
        self.image.as_ref()
    }

    pub fn name(&self) -> &str {
        self.image.name()
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("hash", &self.hash.short())
            .field("handle", &self.handle)
            .field("name", &self.image.name())
            .finish()
    }
}

/// Cache counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Validation passes run (first sight and policy re-checks)
    pub validations: u64,
    /// Requests served by a resident module
    pub hits: u64,
    /// Modules materialized by the engine
    pub loads: u64,
    /// Requests rejected by the gate
    pub rejections: u64,
    /// Resident modules evicted after a policy change
    pub evictions: u64,
    /// Validated modules the engine failed to materialize
    pub load_failures: u64,
}

#[derive(Default)]
struct Counters {
    validations: AtomicU64,
    hits: AtomicU64,
    loads: AtomicU64,
    rejections: AtomicU64,
    evictions: AtomicU64,
    load_failures: AtomicU64,
}

struct Entry {
    module: Arc<LoadedModule>,
    /// Policy revision the module last passed under
    validated_revision: u64,
}

#[derive(Default)]
struct CacheState {
    modules: HashMap<ContentHash, Entry>,
    /// Evicted modules by hash; unloaded at teardown since live instances
    /// may remain, and restored rather than reloaded if they pass again
    retired: HashMap<ContentHash, Arc<LoadedModule>>,
}

/// Cache of validated modules keyed by content hash
pub struct ModuleCache {
    engine: Arc<dyn SandboxEngine>,
    policy: Arc<PolicySet>,
    verify_precomputed_hash: bool,
    /// Serializes the whole check-then-load sequence
    state: Mutex<CacheState>,
    counters: Counters,
}

impl ModuleCache {
    pub fn new(engine: Arc<dyn SandboxEngine>, policy: Arc<PolicySet>) -> Self {
        Self {
            engine,
            policy,
            verify_precomputed_hash: false,
            state: Mutex::new(CacheState::default()),
            counters: Counters::default(),
        }
    }

    /// Recompute supplied digests and reject mismatches
    pub fn verify_precomputed_hash(mut self, verify: bool) -> Self {
        self.verify_precomputed_hash = verify;
        self
    }

    pub fn policy(&self) -> &Arc<PolicySet> {
        &self.policy
    }

    pub fn engine(&self) -> &Arc<dyn SandboxEngine> {
        &self.engine
    }

    /// Get a validated module for these bytes, loading it on first sight
    ///
    /// A precomputed hex digest skips hashing but never validation. Nothing is
    /// registered unless both validators and the engine load succeed.
    pub fn try_load(
        &self,
        bytes: &[u8],
        precomputed_hash: Option<&str>,
    ) -> Result<Arc<LoadedModule>, ScriptError> {
        let hash = self.content_hash(bytes, precomputed_hash)?;
        let mut state = self.lock_state();

        if let Some(module) = self.reuse_resident(&mut state, hash)? {
            return Ok(module);
        }
        if let Some(module) = self.restore_retired(&mut state, hash)? {
            return Ok(module);
        }

        // Revision is read before validating so a concurrent policy change
        // forces a re-check on the next request
        let revision = self.policy.revision();
        self.counters.validations.fetch_add(1, Ordering::Relaxed);
        let image = self.engine.inspect(bytes).map_err(|e| {
            self.counters.rejections.fetch_add(1, Ordering::Relaxed);
            warn!(hash = %hash.short(), "Rejected unparseable module: {}", e);
            ScriptError::from(e)
        })?;

        let result = validation::validate_module(&self.policy, image.as_ref());
        if let Some(err) = rejection(result) {
            self.counters.rejections.fetch_add(1, Ordering::Relaxed);
            warn!(hash = %hash.short(), module = image.name(), "Rejected module: {}", err);
            return Err(err);
        }

        let handle = self.engine.load_module(bytes).map_err(|e| {
            self.counters.load_failures.fetch_add(1, Ordering::Relaxed);
            warn!(hash = %hash.short(), module = image.name(), "Engine failed to load validated module: {}", e);
            ScriptError::from(e)
        })?;
        self.counters.loads.fetch_add(1, Ordering::Relaxed);

        let module = Arc::new(LoadedModule {
            hash,
            handle,
            image,
        });
        info!(hash = %hash.short(), module = module.name(), "Loaded script module");
        state.modules.insert(
            hash,
            Entry {
                module: Arc::clone(&module),
                validated_revision: revision,
            },
        );
        Ok(module)
    }

    /// Resident module for a hash, without loading or re-checking
    pub fn get(&self, hash: &ContentHash) -> Option<Arc<LoadedModule>> {
        self.lock_state()
            .modules
            .get(hash)
            .map(|entry| Arc::clone(&entry.module))
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.lock_state().modules.contains_key(hash)
    }

    /// Number of resident modules
    pub fn len(&self) -> usize {
        self.lock_state().modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            validations: self.counters.validations.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            rejections: self.counters.rejections.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            load_failures: self.counters.load_failures.load(Ordering::Relaxed),
        }
    }

    /// Unload every resident and retired module
    ///
    /// Idempotent; also run on drop.
    pub fn shutdown(&self) {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        let resident = state.modules.drain().map(|(_, entry)| entry.module);
        let retired = std::mem::take(&mut state.retired).into_values();
        let mut unloaded = 0usize;
        for module in resident.chain(retired) {
            self.engine.unload_module(module.handle);
            unloaded += 1;
        }
        if unloaded > 0 {
            info!("Module cache shut down, unloaded {} module(s)", unloaded);
        }
    }

    fn content_hash(
        &self,
        bytes: &[u8],
        precomputed_hash: Option<&str>,
    ) -> Result<ContentHash, ScriptError> {
        let Some(hex_digest) = precomputed_hash else {
            return Ok(ContentHash::of(bytes));
        };
        let supplied = ContentHash::from_hex(hex_digest)?;
        if self.verify_precomputed_hash {
            let actual = ContentHash::of(bytes);
            if actual != supplied {
                self.counters.rejections.fetch_add(1, Ordering::Relaxed);
                return Err(ScriptError::MalformedModule(format!(
                    "precomputed hash {} does not match content hash {}",
                    supplied, actual
                )));
            }
        }
        Ok(supplied)
    }

    /// Serve a resident module, re-checking it if the policy moved on
    fn reuse_resident(
        &self,
        state: &mut CacheState,
        hash: ContentHash,
    ) -> Result<Option<Arc<LoadedModule>>, ScriptError> {
        let Some(entry) = state.modules.get_mut(&hash) else {
            return Ok(None);
        };

        let revision = self.policy.revision();
        if entry.validated_revision != revision {
            self.counters.validations.fetch_add(1, Ordering::Relaxed);
            let result = validation::validate_module(&self.policy, entry.module.image());
            if let Some(err) = rejection(result) {
                if let Some(evicted) = state.modules.remove(&hash) {
                    warn!(hash = %hash.short(), module = evicted.module.name(), "Evicted module after policy change: {}", err);
                    state.retired.insert(hash, evicted.module);
                }
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                self.counters.rejections.fetch_add(1, Ordering::Relaxed);
                return Err(err);
            }
            entry.validated_revision = revision;
            debug!(hash = %hash.short(), "Resident module still valid at policy revision {}", revision);
        }

        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        debug!(hash = %hash.short(), "Module cache hit");
        Ok(Some(Arc::clone(&entry.module)))
    }

    /// Bring an evicted module back if it passes the current policy
    ///
    /// The engine already holds these bytes, so a module that became
    /// acceptable again is never loaded a second time.
    fn restore_retired(
        &self,
        state: &mut CacheState,
        hash: ContentHash,
    ) -> Result<Option<Arc<LoadedModule>>, ScriptError> {
        let Some(module) = state.retired.get(&hash) else {
            return Ok(None);
        };

        let revision = self.policy.revision();
        self.counters.validations.fetch_add(1, Ordering::Relaxed);
        let result = validation::validate_module(&self.policy, module.image());
        if let Some(err) = rejection(result) {
            self.counters.rejections.fetch_add(1, Ordering::Relaxed);
            debug!(hash = %hash.short(), "Evicted module still rejected: {}", err);
            return Err(err);
        }

        let Some(module) = state.retired.remove(&hash) else {
            return Ok(None);
        };
        info!(hash = %hash.short(), module = module.name(), "Restored evicted module at policy revision {}", revision);
        state.modules.insert(
            hash,
            Entry {
                module: Arc::clone(&module),
                validated_revision: revision,
            },
        );
        Ok(Some(module))
    }

    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ModuleCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn rejection(result: ValidationResult) -> Option<ScriptError> {
    match result {
        ValidationResult::Allowed => None,
        ValidationResult::Denied {
            kind: DenialKind::Policy,
            reason,
        } => Some(ScriptError::PolicyViolation(reason)),
        ValidationResult::Denied {
            kind: DenialKind::Malformed,
            reason,
        } => Some(ScriptError::MalformedModule(reason)),
    }
}
