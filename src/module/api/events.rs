//! Lifecycle event vocabulary and the values passed across the engine boundary
//!
//! Every event is independently optional on a script type. The dispatch name
//! is what hosts send; the member name is what the script type declares.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

macro_rules! lifecycle_events {
    ($($variant:ident => $name:literal, $member:literal;)*) => {
        /// Fixed set of events a host can dispatch into a script instance
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub enum LifecycleEvent {
            $($variant,)*
        }

        impl LifecycleEvent {
            /// Every event, in declaration order
            pub const ALL: &'static [LifecycleEvent] = &[$(LifecycleEvent::$variant,)*];

            /// Name hosts dispatch by
            pub fn name(self) -> &'static str {
                match self {
                    $(LifecycleEvent::$variant => $name,)*
                }
            }

            /// Member the script type declares to receive the event
            pub fn member_name(self) -> &'static str {
                match self {
                    $(LifecycleEvent::$variant => $member,)*
                }
            }

            /// Parse a dispatch name
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(LifecycleEvent::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

lifecycle_events! {
    Initialize => "initialize", "Initialize";
    Awake => "awake", "Awake";
    Start => "start", "Start";
    Attach => "attach", "OnAttach";
    Detach => "detach", "OnDetach";
    Update => "update", "Update";
    FixedUpdate => "fixedUpdate", "FixedUpdate";
    LateUpdate => "lateUpdate", "LateUpdate";
    Enable => "enable", "OnEnable";
    Disable => "disable", "OnDisable";
    Destroy => "destroy", "OnDestroy";
    CollisionEnter => "collisionEnter", "OnCollisionEnter";
    CollisionStay => "collisionStay", "OnCollisionStay";
    CollisionExit => "collisionExit", "OnCollisionExit";
    TriggerEnter => "triggerEnter", "OnTriggerEnter";
    TriggerStay => "triggerStay", "OnTriggerStay";
    TriggerExit => "triggerExit", "OnTriggerExit";
    CollisionEnter2D => "collisionEnter2D", "OnCollisionEnter2D";
    CollisionStay2D => "collisionStay2D", "OnCollisionStay2D";
    CollisionExit2D => "collisionExit2D", "OnCollisionExit2D";
    TriggerEnter2D => "triggerEnter2D", "OnTriggerEnter2D";
    TriggerStay2D => "triggerStay2D", "OnTriggerStay2D";
    TriggerExit2D => "triggerExit2D", "OnTriggerExit2D";
}

impl LifecycleEvent {
    /// Contact events carry a `ContactInfo` or `ContactInfo2D` argument
    pub fn is_contact(self) -> bool {
        self.is_contact_2d()
            || matches!(
                self,
                LifecycleEvent::CollisionEnter
                    | LifecycleEvent::CollisionStay
                    | LifecycleEvent::CollisionExit
                    | LifecycleEvent::TriggerEnter
                    | LifecycleEvent::TriggerStay
                    | LifecycleEvent::TriggerExit
            )
    }

    pub fn is_contact_2d(self) -> bool {
        matches!(
            self,
            LifecycleEvent::CollisionEnter2D
                | LifecycleEvent::CollisionStay2D
                | LifecycleEvent::CollisionExit2D
                | LifecycleEvent::TriggerEnter2D
                | LifecycleEvent::TriggerStay2D
                | LifecycleEvent::TriggerExit2D
        )
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Context handed to a script on initialization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostContext {
    /// Host object the script is attached to
    pub host_object: u64,
    pub host_name: String,
    /// Free-form properties from the host object's configuration
    pub properties: HashMap<String, String>,
}

impl HostContext {
    pub fn new(host_object: u64, host_name: impl Into<String>) -> Self {
        Self {
            host_object,
            host_name: host_name.into(),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// 3D contact argument for collision and trigger events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    /// Host object on the other side of the contact
    pub other_object: u64,
    pub point: [f32; 3],
    pub normal: [f32; 3],
    pub relative_velocity: [f32; 3],
    pub impulse: f32,
}

/// 2D contact argument for collision and trigger events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo2D {
    pub other_object: u64,
    pub point: [f32; 2],
    pub normal: [f32; 2],
    pub relative_velocity: [f32; 2],
    pub impulse: f32,
}

/// Value passed to or returned from a script member
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ScriptValue {
    #[default]
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Opaque engine object handle
    Object(u64),
    Context(HostContext),
    Contact(ContactInfo),
    Contact2D(ContactInfo2D),
}
