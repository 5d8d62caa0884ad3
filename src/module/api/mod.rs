//! Script lifecycle API
//!
//! Event vocabulary, script contract, instances and the bridge that drives
//! them from the host side.

pub mod bridge;
pub mod contract;
pub mod events;
pub mod instance;

pub use bridge::{CallbackFailure, DispatchOutcome, LifecycleBridge};
pub use contract::ScriptContract;
pub use events::{ContactInfo, ContactInfo2D, HostContext, LifecycleEvent, ScriptValue};
pub use instance::ScriptInstance;
