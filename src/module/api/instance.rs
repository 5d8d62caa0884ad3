//! Script instances
//!
//! One instance per host object. Owned by that host object and touched only
//! from its own update cycle, so the entry-point cache needs no locking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use super::events::LifecycleEvent;
use crate::module::registry::LoadedModule;
use crate::module::traits::{MethodHandle, ObjectHandle, SandboxEngine};

/// Engine object created from a validated module
pub struct ScriptInstance {
    id: Uuid,
    type_name: String,
    object: ObjectHandle,
    module: Arc<LoadedModule>,
    engine: Arc<dyn SandboxEngine>,
    /// Memoized member lookups; `None` means the type does not define the event
    entry_points: HashMap<LifecycleEvent, Option<MethodHandle>>,
}

impl ScriptInstance {
    pub(crate) fn new(
        type_name: &str,
        object: ObjectHandle,
        module: Arc<LoadedModule>,
        engine: Arc<dyn SandboxEngine>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            type_name: type_name.to_string(),
            object,
            module,
            engine,
            entry_points: HashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn object(&self) -> ObjectHandle {
        self.object
    }

    pub fn module(&self) -> &Arc<LoadedModule> {
        &self.module
    }

    /// Entry point already resolved for `event` by this instance
    ///
    /// `Some(None)` means the type is known not to define the event.
    pub fn cached_entry_point(&self, event: LifecycleEvent) -> Option<Option<MethodHandle>> {
        self.entry_points.get(&event).copied()
    }

    pub(crate) fn remember_entry_point(&mut self, event: LifecycleEvent, method: Option<MethodHandle>) {
        self.entry_points.insert(event, method);
    }

    /// Number of events whose entry point has been resolved
    pub fn resolved_entry_points(&self) -> usize {
        self.entry_points.len()
    }

    pub(crate) fn engine(&self) -> &Arc<dyn SandboxEngine> {
        &self.engine
    }
}

impl fmt::Debug for ScriptInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptInstance")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("object", &self.object)
            .field("module", &self.module.hash().short())
            .finish()
    }
}

impl Drop for ScriptInstance {
    fn drop(&mut self) {
        debug!(instance = %self.id, "Disposing {} instance", self.type_name);
        self.engine.dispose(self.object);
    }
}
