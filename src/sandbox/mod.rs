//! In-process native engine.
//!
//! [`SandboxEngine`] implements [`NativeEngine`] over a generational object
//! heap and a small class database. It backs the tests and benches and lets
//! tools exercise the bridge without a real engine.
//!
//! No engine lock is held while managed code runs: signal trampolines,
//! virtual overrides and `object_freed` notifications are all invoked after
//! the state lock is released.

mod call_context;
mod class;
mod core_classes;
mod heap;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use nativebind_core::{
    BridgeResult, Fingerprint, MethodHandle, MethodSignature, NativeCallError, ObjectId, Ownership, RawHandle,
    SignalInfo, Variant,
};
use nativebind_registry::{MethodTable, NativeMethodInfo, VirtualMethodInfo};

use crate::engine::{ManagedCallbacks, NativeConnectionId, NativeEngine, Trampoline};

pub use call_context::CallContext;
pub use class::{ClassBuilder, MethodDef, NativeFn, SandboxClass, VirtualDef};
pub use heap::{NativeObject, ObjectHeap};

use call_context::PendingEmit;

struct SandboxConnection {
    source: ObjectId,
    signal: String,
    trampoline: Trampoline,
}

struct RegisteredMethod {
    class: String,
    def: MethodDef,
}

#[derive(Default)]
struct SandboxState {
    classes: FxHashMap<String, SandboxClass>,
    /// Indexed by method handle minus one.
    methods: Vec<RegisteredMethod>,
    /// `(class, method)` to handle, own methods only.
    method_index: FxHashMap<(String, String), MethodHandle>,
    heap: ObjectHeap,
    connections: FxHashMap<NativeConnectionId, SandboxConnection>,
    next_connection: NativeConnectionId,
}

impl SandboxState {
    /// `class` followed by its ancestors.
    fn ancestry<'s>(&'s self, class: &str) -> impl Iterator<Item = &'s SandboxClass> + use<'s> {
        std::iter::successors(self.classes.get(class), |c| {
            c.parent.as_deref().and_then(|p| self.classes.get(p))
        })
    }

    fn inherits(&self, class: &str, base: &str) -> bool {
        self.ancestry(class).any(|c| c.name == base)
    }

    fn find_method(&self, class: &str, method: &str) -> Option<MethodHandle> {
        self.ancestry(class)
            .find_map(|c| self.method_index.get(&(c.name.clone(), method.to_string())).copied())
    }

    fn method(&self, handle: MethodHandle) -> Option<&RegisteredMethod> {
        self.methods.get(handle.get() - 1)
    }

    fn find_virtual(&self, class: &str, name: &str) -> Option<&VirtualDef> {
        self.ancestry(class)
            .find_map(|c| c.virtuals.iter().find(|v| v.info.name == name))
    }

    fn object(&self, id: ObjectId) -> Result<&NativeObject, NativeCallError> {
        self.heap.get(id).ok_or(NativeCallError::DeadObject(id))
    }

    fn raw(&self, id: ObjectId) -> Result<RawHandle, NativeCallError> {
        let object = self.object(id)?;
        Ok(RawHandle::new(id, object.ownership))
    }

    fn drop_connections_of(&mut self, source: ObjectId) {
        self.connections.retain(|_, c| c.source != source);
    }

    fn trampolines(&self, source: ObjectId, signal: &str) -> Vec<Trampoline> {
        let mut matching: Vec<(NativeConnectionId, Trampoline)> = self
            .connections
            .iter()
            .filter(|(_, c)| c.source == source && c.signal == signal)
            .map(|(id, c)| (*id, Arc::clone(&c.trampoline)))
            .collect();
        matching.sort_by_key(|(id, _)| *id);
        matching.into_iter().map(|(_, t)| t).collect()
    }
}

/// An in-process [`NativeEngine`].
pub struct SandboxEngine {
    state: Mutex<SandboxState>,
    callbacks: RwLock<Option<Weak<dyn ManagedCallbacks>>>,
    lookups: AtomicU64,
}

impl Default for SandboxEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxEngine {
    /// An engine with no classes.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SandboxState {
                next_connection: 1,
                ..SandboxState::default()
            }),
            callbacks: RwLock::new(None),
            lookups: AtomicU64::new(0),
        }
    }

    /// An engine with the core class hierarchy: `Object`, `RefCounted`,
    /// `Node`, `Node2D` and `Resource`.
    pub fn with_core_classes() -> Self {
        let engine = Self::new();
        core_classes::register(&engine);
        engine
    }

    /// Register a class. Its parent, if any, must already be registered.
    pub fn register(&self, builder: ClassBuilder) {
        let (mut class, ownership_set) = builder.finish();
        let mut state = self.state.lock();
        if !ownership_set
            && let Some(parent) = class.parent.as_deref().and_then(|p| state.classes.get(p))
        {
            class.ownership = parent.ownership;
        }
        for def in &class.methods {
            state.methods.push(RegisteredMethod {
                class: class.name.clone(),
                def: def.clone(),
            });
            if let Some(handle) = MethodHandle::from_raw(state.methods.len()) {
                state.method_index.insert((class.name.clone(), def.name.clone()), handle);
            }
        }
        tracing::trace!(class = %class.name, methods = class.methods.len(), "registered sandbox class");
        state.classes.insert(class.name.clone(), class);
    }

    /// Change the signature a method is exposed with, as a newer engine build would.
    pub fn set_method_signature(&self, class: &str, method: &str, signature: MethodSignature) -> bool {
        let mut state = self.state.lock();
        let Some(handle) = state.method_index.get(&(class.to_string(), method.to_string())).copied() else {
            return false;
        };
        match state.methods.get_mut(handle.get() - 1) {
            Some(registered) => {
                registered.def.signature = signature;
                true
            }
            None => false,
        }
    }

    /// Keep accepting wrappers generated against `fingerprint`.
    pub fn add_compatible_fingerprint(&self, class: &str, method: &str, fingerprint: Fingerprint) -> bool {
        let mut state = self.state.lock();
        let Some(handle) = state.method_index.get(&(class.to_string(), method.to_string())).copied() else {
            return false;
        };
        match state.methods.get_mut(handle.get() - 1) {
            Some(registered) => {
                registered.def.compatible.push(fingerprint);
                true
            }
            None => false,
        }
    }

    /// Number of `lookup_method` queries answered.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn live_objects(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// Read a property of a live object.
    pub fn property(&self, id: ObjectId, name: &str) -> Option<Variant> {
        self.state.lock().heap.get(id)?.get(name).cloned()
    }

    /// Create an object the way the engine itself would, e.g. when loading a
    /// scene. RefCounted objects start with the engine's own reference.
    pub fn spawn(&self, class: &str) -> Result<RawHandle, NativeCallError> {
        self.instantiate(class)
    }

    fn callbacks(&self) -> Option<Arc<dyn ManagedCallbacks>> {
        self.callbacks.read().as_ref()?.upgrade()
    }

    /// Ask the managed side to attach a registered script to `object`.
    pub fn attach_script(&self, object: RawHandle, script: &str) -> bool {
        self.callbacks().is_some_and(|cb| cb.attach_script(object, script))
    }

    /// Whether the managed type bound to `id` overrides `method`.
    pub fn has_script_override(&self, id: ObjectId, method: &str) -> bool {
        let Ok(raw) = self.state.lock().raw(id) else {
            return false;
        };
        self.callbacks().is_some_and(|cb| cb.has_override(raw, method))
    }

    /// Run a virtual method: the managed override if there is one, otherwise
    /// the class's native default (or `Nil`).
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn run_virtual(&self, id: ObjectId, method: &str, args: &[Variant]) -> Result<Variant, NativeCallError> {
        let raw = self.state.lock().raw(id)?;
        if let Some(callbacks) = self.callbacks()
            && let Some(result) = callbacks.invoke_virtual(raw, method, args)
        {
            return Ok(result);
        }

        let (result, emits) = {
            let mut state = self.state.lock();
            let class = state.object(id)?.class.clone();
            let Some(default) = state.find_virtual(&class, method).and_then(|v| v.default.clone()) else {
                return Ok(Variant::Nil);
            };
            let mut ctx = CallContext::new(Some(raw), args, &mut state.heap);
            default(&mut ctx)?;
            ctx.finish()
        };
        self.fire(id, emits);
        Ok(result)
    }

    /// Fire `signal` without checking the argument list against its
    /// declaration, and return each handler's result in connection order.
    pub fn emit(&self, source: ObjectId, signal: &str, args: &[Variant]) -> Vec<BridgeResult<()>> {
        let trampolines = self.state.lock().trampolines(source, signal);
        trampolines.into_iter().map(|trampoline| trampoline(args)).collect()
    }

    fn fire(&self, source: ObjectId, emits: Vec<PendingEmit>) {
        for PendingEmit { signal, args } in emits {
            for result in self.emit(source, &signal, &args) {
                if let Err(error) = result {
                    tracing::debug!(%source, signal = %signal, %error, "signal handler failed");
                }
            }
        }
    }

    fn notify_freed(&self, id: ObjectId) {
        if let Some(callbacks) = self.callbacks() {
            callbacks.object_freed(id);
        }
    }
}

impl fmt::Debug for SandboxEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SandboxEngine")
            .field("classes", &state.classes.len())
            .field("methods", &state.methods.len())
            .field("heap", &state.heap)
            .field("connections", &state.connections.len())
            .finish()
    }
}

impl MethodTable for SandboxEngine {
    fn lookup_method(&self, class: &str, method: &str) -> Option<NativeMethodInfo> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let state = self.state.lock();
        let handle = state.find_method(class, method)?;
        let def = &state.method(handle)?.def;
        let mut info = NativeMethodInfo::new(handle, def.signature.fingerprint());
        info.compatible = def.compatible.clone();
        Some(info)
    }

    fn virtual_methods(&self, class: &str) -> Option<Vec<VirtualMethodInfo>> {
        let state = self.state.lock();
        if !state.classes.contains_key(class) {
            return None;
        }
        let mut chain: Vec<&SandboxClass> = state.ancestry(class).collect();
        chain.reverse();
        Some(
            chain
                .into_iter()
                .flat_map(|c| c.virtuals.iter().map(|v| v.info.clone()))
                .collect(),
        )
    }

    fn class_exists(&self, class: &str) -> bool {
        self.state.lock().classes.contains_key(class)
    }
}

impl NativeEngine for SandboxEngine {
    fn call(
        &self,
        method: MethodHandle,
        receiver: Option<RawHandle>,
        args: &[Variant],
    ) -> Result<Variant, NativeCallError> {
        let (result, emits) = {
            let mut state = self.state.lock();
            let registered = state
                .method(method)
                .ok_or(NativeCallError::InvalidHandle(method.get()))?;
            let signature = &registered.def.signature;
            let is_static = signature.flags.contains(nativebind_core::MethodFlags::STATIC);
            if !signature.is_vararg() && args.len() != signature.arity() {
                return Err(NativeCallError::ArgumentCount {
                    method: format!("{}::{}", registered.class, registered.def.name),
                    expected: signature.arity(),
                    got: args.len(),
                });
            }
            signature
                .check_args(args)
                .map_err(|(index, source)| NativeCallError::Argument { index, source })?;
            let func = Arc::clone(&registered.def.func);
            let owner = registered.class.clone();

            let receiver = if is_static {
                None
            } else {
                let receiver = receiver.ok_or_else(|| NativeCallError::InvalidReceiver {
                    reason: format!("{owner} method called without a receiver"),
                })?;
                let class = state.object(receiver.id)?.class.clone();
                if !state.inherits(&class, &owner) {
                    return Err(NativeCallError::InvalidReceiver {
                        reason: format!("{class} is not a {owner}"),
                    });
                }
                Some(receiver)
            };

            let mut ctx = CallContext::new(receiver, args, &mut state.heap);
            func(&mut ctx)?;
            ctx.finish()
        };
        if let Some(receiver) = receiver {
            self.fire(receiver.id, emits);
        }
        Ok(result)
    }

    fn call_by_name(&self, target: ObjectId, method: &str, args: &[Variant]) -> Result<Variant, NativeCallError> {
        let (handle, raw) = {
            let state = self.state.lock();
            let raw = state.raw(target)?;
            let class = &state.object(target)?.class;
            let handle = state.find_method(class, method).ok_or_else(|| NativeCallError::Raised {
                message: format!("{class} has no method '{method}'"),
            })?;
            (handle, raw)
        };
        self.call(handle, Some(raw), args)
    }

    fn instantiate(&self, class: &str) -> Result<RawHandle, NativeCallError> {
        let mut state = self.state.lock();
        let def = state
            .classes
            .get(class)
            .ok_or_else(|| NativeCallError::UnknownClass(class.to_string()))?;
        if !def.instantiable {
            return Err(NativeCallError::NotInstantiable(class.to_string()));
        }
        let ownership = def.ownership;
        let id = state.heap.allocate(NativeObject::new(class, ownership));
        tracing::trace!(%id, class, "instantiated");
        Ok(RawHandle::new(id, ownership))
    }

    fn class_of(&self, id: ObjectId) -> Option<String> {
        self.state.lock().heap.get(id).map(|object| object.class.clone())
    }

    fn inherits(&self, class: &str, base: &str) -> bool {
        self.state.lock().inherits(class, base)
    }

    fn reference(&self, id: ObjectId) -> Result<u32, NativeCallError> {
        let mut state = self.state.lock();
        if state.object(id)?.ownership != Ownership::RefCounted {
            return Err(NativeCallError::OwnershipViolation {
                id,
                operation: "reference",
            });
        }
        state.heap.add_ref(id).ok_or(NativeCallError::DeadObject(id))
    }

    fn unreference(&self, id: ObjectId) -> Result<u32, NativeCallError> {
        let remaining = {
            let mut state = self.state.lock();
            if state.object(id)?.ownership != Ownership::RefCounted {
                return Err(NativeCallError::OwnershipViolation {
                    id,
                    operation: "unreference",
                });
            }
            let remaining = state.heap.release(id).ok_or(NativeCallError::DeadObject(id))?;
            if remaining == 0 {
                state.drop_connections_of(id);
            }
            remaining
        };
        if remaining == 0 {
            self.notify_freed(id);
        }
        Ok(remaining)
    }

    fn reference_count(&self, id: ObjectId) -> Option<u32> {
        self.state.lock().heap.ref_count(id)
    }

    fn is_alive(&self, id: ObjectId) -> bool {
        self.state.lock().heap.is_alive(id)
    }

    fn free(&self, id: ObjectId) -> Result<(), NativeCallError> {
        {
            let mut state = self.state.lock();
            if state.object(id)?.ownership != Ownership::Manual {
                return Err(NativeCallError::OwnershipViolation { id, operation: "free" });
            }
            state.heap.free(id);
            state.drop_connections_of(id);
        }
        self.notify_freed(id);
        Ok(())
    }

    fn signal_info(&self, class: &str, signal: &str) -> Option<SignalInfo> {
        let state = self.state.lock();
        state
            .ancestry(class)
            .find_map(|c| c.signals.iter().find(|s| s.name == signal))
            .cloned()
    }

    fn connect(
        &self,
        source: ObjectId,
        signal: &str,
        trampoline: Trampoline,
    ) -> Result<NativeConnectionId, NativeCallError> {
        let mut state = self.state.lock();
        let class = state.object(source)?.class.clone();
        if !state.ancestry(&class).any(|c| c.signals.iter().any(|s| s.name == signal)) {
            return Err(NativeCallError::Raised {
                message: format!("{class} has no signal '{signal}'"),
            });
        }
        let id = state.next_connection;
        state.next_connection += 1;
        state.connections.insert(
            id,
            SandboxConnection {
                source,
                signal: signal.to_string(),
                trampoline,
            },
        );
        Ok(id)
    }

    fn disconnect(&self, connection: NativeConnectionId) -> bool {
        self.state.lock().connections.remove(&connection).is_some()
    }

    fn emit_signal(&self, source: ObjectId, signal: &str, args: &[Variant]) -> Result<(), NativeCallError> {
        {
            let state = self.state.lock();
            let class = &state.object(source)?.class;
            let info = state
                .ancestry(class)
                .find_map(|c| c.signals.iter().find(|s| s.name == signal))
                .ok_or_else(|| NativeCallError::Raised {
                    message: format!("{class} has no signal '{signal}'"),
                })?;
            if info.arity() != args.len() {
                return Err(NativeCallError::ArgumentCount {
                    method: format!("{class}.{signal}"),
                    expected: info.arity(),
                    got: args.len(),
                });
            }
        }
        for result in self.emit(source, signal, args) {
            if let Err(error) = result {
                tracing::debug!(%source, signal, %error, "signal handler failed");
            }
        }
        Ok(())
    }

    fn attach(&self, callbacks: Weak<dyn ManagedCallbacks>) {
        *self.callbacks.write() = Some(callbacks);
    }
}
