//! Lifecycle bridge
//!
//! Creates script instances from validated modules and dispatches lifecycle
//! events into them. A failing callback is caught, logged and reported as an
//! outcome; it never propagates into the host's update loop.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::contract::ScriptContract;
use super::events::{LifecycleEvent, ScriptValue};
use super::instance::ScriptInstance;
use crate::module::registry::LoadedModule;
use crate::module::traits::{EngineError, MethodHandle, ModuleHandle, SandboxEngine, ScriptError};

/// An exception raised by foreign code during dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackFailure {
    pub instance_id: Uuid,
    pub declaring_type: String,
    pub event: LifecycleEvent,
    #[serde(serialize_with = "serialize_display")]
    pub error: EngineError,
}

fn serialize_display<S: serde::Serializer>(error: &EngineError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}

impl fmt::Display for CallbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed in {} (instance {}): {}",
            self.event, self.declaring_type, self.instance_id, self.error
        )
    }
}

/// Result of dispatching one event
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The member ran and returned a value
    Invoked(ScriptValue),
    /// The type does not define the event, or the name is unknown
    NotDefined,
    /// The callback raised; already logged
    Failed(CallbackFailure),
}

impl DispatchOutcome {
    pub fn is_invoked(&self) -> bool {
        matches!(self, DispatchOutcome::Invoked(_))
    }

    pub fn failure(&self) -> Option<&CallbackFailure> {
        match self {
            DispatchOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Member lookup key; handles are only meaningful within one module
type EntryKey = (ModuleHandle, String, LifecycleEvent);

/// Drives script instances through the lifecycle event vocabulary
pub struct LifecycleBridge {
    engine: Arc<dyn SandboxEngine>,
    contract: ScriptContract,
    /// Lookups shared by every instance of a type
    entry_points: Mutex<HashMap<EntryKey, Option<MethodHandle>>>,
}

impl LifecycleBridge {
    pub fn new(engine: Arc<dyn SandboxEngine>, contract: ScriptContract) -> Self {
        Self {
            engine,
            contract,
            entry_points: Mutex::new(HashMap::new()),
        }
    }

    pub fn contract(&self) -> &ScriptContract {
        &self.contract
    }

    /// Instantiate a type from a validated module
    ///
    /// The type must satisfy the script contract. Failures here are per-call
    /// and leave the module's cache entry untouched.
    pub fn create_instance(
        &self,
        module: &Arc<LoadedModule>,
        type_name: &str,
    ) -> Result<ScriptInstance, ScriptError> {
        self.contract
            .check_loaded(module, self.engine.as_ref(), type_name)?;
        let object = self.engine.create_instance(module.handle(), type_name)?;
        let instance = ScriptInstance::new(type_name, object, Arc::clone(module), Arc::clone(&self.engine));
        info!(
            instance = %instance.id(),
            hash = %module.hash().short(),
            "Created {} instance",
            type_name
        );
        Ok(instance)
    }

    /// Dispatch an event; undefined events are a no-op
    pub fn dispatch(
        &self,
        instance: &mut ScriptInstance,
        event: LifecycleEvent,
        args: &[ScriptValue],
    ) -> DispatchOutcome {
        let method = match self.entry_point(instance, event) {
            Ok(Some(method)) => method,
            Ok(None) => return DispatchOutcome::NotDefined,
            Err(error) => return self.failed(instance, event, error),
        };

        match instance.engine().invoke(instance.object(), method, args) {
            Ok(value) => DispatchOutcome::Invoked(value),
            Err(error) => self.failed(instance, event, error),
        }
    }

    /// Dispatch by event name; unknown names are a no-op
    pub fn dispatch_named(
        &self,
        instance: &mut ScriptInstance,
        event_name: &str,
        args: &[ScriptValue],
    ) -> DispatchOutcome {
        match LifecycleEvent::from_name(event_name) {
            Some(event) => self.dispatch(instance, event, args),
            None => {
                debug!(instance = %instance.id(), event = event_name, "Ignoring unknown lifecycle event");
                DispatchOutcome::NotDefined
            }
        }
    }

    /// Member handling `event`, looked up once per (module, type, event)
    ///
    /// Lookup errors are not memoized.
    fn entry_point(
        &self,
        instance: &mut ScriptInstance,
        event: LifecycleEvent,
    ) -> Result<Option<MethodHandle>, EngineError> {
        if let Some(cached) = instance.cached_entry_point(event) {
            return Ok(cached);
        }

        let key = (instance.module().handle(), instance.type_name().to_string(), event);
        let shared = self.lock_entry_points().get(&key).copied();
        let resolved = match shared {
            Some(resolved) => resolved,
            None => {
                let resolved = self.engine.find_method(key.0, &key.1, event.member_name())?;
                if resolved.is_none() {
                    debug!(
                        event = event.name(),
                        "{} does not define {}",
                        key.1,
                        event.member_name()
                    );
                }
                self.lock_entry_points().insert(key, resolved);
                resolved
            }
        };
        instance.remember_entry_point(event, resolved);
        Ok(resolved)
    }

    fn lock_entry_points(&self) -> MutexGuard<'_, HashMap<EntryKey, Option<MethodHandle>>> {
        self.entry_points.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn failed(&self, instance: &ScriptInstance, event: LifecycleEvent, error: EngineError) -> DispatchOutcome {
        let failure = CallbackFailure {
            instance_id: instance.id(),
            declaring_type: instance.type_name().to_string(),
            event,
            error,
        };
        warn!(
            instance = %failure.instance_id,
            event = event.name(),
            type_name = %failure.declaring_type,
            error = %failure.error,
            "Script callback failed"
        );
        DispatchOutcome::Failed(failure)
    }
}
