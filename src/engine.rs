//! The two sides of the boundary as traits.
//!
//! [`NativeEngine`] is everything the bridge needs from the native object
//! system. [`ManagedCallbacks`] is everything the engine may ask of the
//! managed side; the bridge implements it and hands the engine a weak
//! reference through [`NativeEngine::attach`].

use std::sync::{Arc, Weak};

use nativebind_core::{
    BridgeResult, MethodHandle, NativeCallError, ObjectId, RawHandle, SignalInfo, Variant,
};
use nativebind_registry::MethodTable;

/// Engine-side token for one signal connection.
pub type NativeConnectionId = u64;

/// Entry point the engine calls when a connected signal fires.
///
/// The result tells the engine whether delivery succeeded; failures have
/// already been recorded on the bridge's diagnostics channel.
pub type Trampoline = Arc<dyn Fn(&[Variant]) -> BridgeResult<()> + Send + Sync>;

/// The native object system.
///
/// Method handles, object ids and connection ids are opaque tokens issued by
/// the engine; the bridge only stores and returns them. All methods except
/// the [`MethodTable`] queries are called from the main thread.
pub trait NativeEngine: MethodTable {
    /// Invoke a resolved method.
    fn call(
        &self,
        method: MethodHandle,
        receiver: Option<RawHandle>,
        args: &[Variant],
    ) -> Result<Variant, NativeCallError>;

    /// Invoke a method by name, resolving it on the receiver's class.
    fn call_by_name(&self, target: ObjectId, method: &str, args: &[Variant]) -> Result<Variant, NativeCallError>;

    /// Allocate an object. A RefCounted object starts with one reference,
    /// owned by the caller.
    fn instantiate(&self, class: &str) -> Result<RawHandle, NativeCallError>;

    /// Class name of a live object.
    fn class_of(&self, id: ObjectId) -> Option<String>;

    /// Whether `class` is `base` or derives from it.
    fn inherits(&self, class: &str, base: &str) -> bool;

    /// Add a strong reference; returns the new count.
    fn reference(&self, id: ObjectId) -> Result<u32, NativeCallError>;

    /// Drop a strong reference; returns the remaining count. The object is
    /// freed when it reaches zero.
    fn unreference(&self, id: ObjectId) -> Result<u32, NativeCallError>;

    fn reference_count(&self, id: ObjectId) -> Option<u32>;

    /// Generation-checked liveness.
    fn is_alive(&self, id: ObjectId) -> bool;

    /// Free a Manual object.
    fn free(&self, id: ObjectId) -> Result<(), NativeCallError>;

    /// Declared shape of a signal on `class` or one of its ancestors.
    fn signal_info(&self, class: &str, signal: &str) -> Option<SignalInfo>;

    fn connect(
        &self,
        source: ObjectId,
        signal: &str,
        trampoline: Trampoline,
    ) -> Result<NativeConnectionId, NativeCallError>;

    /// Returns `false` if the connection was already gone.
    fn disconnect(&self, connection: NativeConnectionId) -> bool;

    /// Fire a signal on `source`.
    fn emit_signal(&self, source: ObjectId, signal: &str, args: &[Variant]) -> Result<(), NativeCallError>;

    /// Register the managed side for outbound calls.
    fn attach(&self, callbacks: Weak<dyn ManagedCallbacks>);
}

/// Calls the engine makes into managed code.
///
/// None of these return errors: failures are recorded on the bridge's
/// diagnostics channel and the engine receives a neutral value.
pub trait ManagedCallbacks: Send + Sync {
    /// Run the managed override of a virtual. `None` means the engine should
    /// run its native default.
    fn invoke_virtual(&self, object: RawHandle, method: &str, args: &[Variant]) -> Option<Variant>;

    /// Whether the object's managed type overrides the virtual.
    fn has_override(&self, object: RawHandle, method: &str) -> bool;

    /// The engine freed an object.
    fn object_freed(&self, id: ObjectId);

    /// Attach a registered managed script to a natively created object.
    fn attach_script(&self, object: RawHandle, script: &str) -> bool;
}
