//! Native/managed interop bridge for reflection-driven engine object systems.
//!
//! The bridge sits between a native object system (reached through
//! [`NativeEngine`]) and managed Rust code. It covers:
//!
//! - method binding resolution and caching ([`BindingCache`], [`MethodBind`])
//! - marshaling through the tagged [`Variant`] ([`ToVariant`], [`FromVariant`])
//! - virtual dispatch into managed overrides ([`ScriptClass`], [`Bridge::invoke_virtual`])
//! - signal-to-callback bridging ([`Callback`], [`Bridge::connect`])
//! - native object lifetime ([`Wrapper`], [`RefHandle`], [`ManualHandle`])
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use nativebind::{Bridge, Variant, sandbox::SandboxEngine};
//!
//! let bridge = Bridge::new(Arc::new(SandboxEngine::with_core_classes()));
//! let node = bridge.construct("Node").unwrap();
//! let set_name = nativebind::MethodSignature::new(vec![nativebind::VariantType::String], nativebind::VariantType::Nil);
//! node.call("set_name", set_name.fingerprint(), &[Variant::from("Player")]).unwrap();
//! ```

extern crate self as nativebind;

mod bridge;
pub mod config;
pub mod diagnostics;
mod dispatch;
pub mod engine;
mod instance;
pub mod lifetime;
pub mod logging;
mod method_bind;
pub mod sandbox;
pub mod signals;
mod stats;
mod wrapper;

pub use nativebind_core::{
    BridgeError, BridgeResult, Callable, Color, Dictionary, Fingerprint, FromVariant, MarshalError, MethodFlags,
    MethodHandle, MethodSignature, NativeCallError, ObjectId, Ownership, RawHandle, SignalInfo, ToVariant, Transform,
    Variant, VariantType, Vector2, Vector3, Vector4, box_value, unbox,
};
pub use nativebind_macros::{native_virtual, script_class};
pub use nativebind_registry::{
    BindingCache, ClassDescriptor, MethodTable, NativeMethodInfo, OverrideRegistry, OverrideTable,
    VirtualMethodInfo, VirtualSet, VirtualSlot,
};

pub use bridge::{Bridge, DiagnosticHandler, ShutdownReport};
pub use config::{BridgeConfig, BridgeProperty};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSource, Diagnostics};
pub use dispatch::VirtualProbe;
pub use engine::{ManagedCallbacks, NativeConnectionId, NativeEngine, Trampoline};
pub use instance::{InstanceEntry, InstanceTable, ScriptClass, ScriptInstance, ScriptObject, SharedInstance};
pub use lifetime::{LifetimeManager, ManualHandle, ObjectHandle, Origin, RefHandle, ReleaseOutcome};
pub use method_bind::{MethodBind, ToArgs};
pub use signals::{Callback, CallbackIdentity, ConnectFlags, ConnectionId, MethodHandler, SignalHandler};
pub use stats::BridgeStats;
pub use wrapper::{Wrapper, WrapperState};

/// Support items referenced by generated code.
#[doc(hidden)]
pub mod __private {
    pub use nativebind_core::{FromVariant, ToVariant, Variant, unbox};
}
