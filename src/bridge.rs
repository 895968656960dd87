//! The bridge between the managed side and one native engine.
//!
//! # Ownership
//!
//! [`Bridge`] is a cheap, clonable handle around shared state. The engine
//! only ever holds the bridge weakly (through [`ManagedCallbacks`]), so
//! dropping the last `Bridge` detaches it.
//!
//! # Threading
//!
//! Everything except the binding cache and override registry is
//! main-thread-only. The thread that creates the bridge is the main thread;
//! with `enforce_main_thread` on, other threads get `WrongThread`. Signal
//! deliveries the engine makes from another thread are dropped and reported,
//! unless the connection is DEFERRED.
//!
//! [`Bridge::is_valid`] is the one exception: it only reads the liveness
//! record and the engine's liveness table, so any thread may ask.

use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;

use nativebind_core::{
    BridgeError, BridgeResult, Callable, Fingerprint, MethodHandle, ObjectId, RawHandle, Variant,
};
use nativebind_registry::{BindingCache, OverrideRegistry, OverrideTable};

use crate::config::BridgeConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSource, Diagnostics};
use crate::engine::{ManagedCallbacks, NativeEngine};
use crate::instance::{InstanceEntry, InstanceTable, ScriptClass, ScriptObject, SharedInstance};
use crate::lifetime::{LifetimeManager, ReleaseOutcome};
use crate::signals::SignalHub;
use crate::stats::{BridgeStats, StatsCounters};
use crate::wrapper::Wrapper;

/// Receives every diagnostic as it is recorded.
pub type DiagnosticHandler = Arc<dyn Fn(&Diagnostic) + Send + Sync>;

/// A script the engine may attach by name.
struct ScriptFactory {
    base: &'static str,
    overrides: Arc<OverrideTable>,
    create: fn() -> SharedInstance,
}

fn create_script<S: ScriptClass + Default>() -> SharedInstance {
    Arc::new(Mutex::new(S::default()))
}

pub(crate) struct BridgeInner {
    pub(crate) id: u64,
    pub(crate) engine: Arc<dyn NativeEngine>,
    pub(crate) bindings: BindingCache,
    pub(crate) overrides: OverrideRegistry,
    pub(crate) instances: InstanceTable,
    pub(crate) signals: SignalHub,
    pub(crate) lifetime: Arc<LifetimeManager>,
    pub(crate) stats: StatsCounters,
    scripts: Mutex<FxHashMap<&'static str, ScriptFactory>>,
    diagnostics: Mutex<Diagnostics>,
    handler: Mutex<Option<DiagnosticHandler>>,
    pub(crate) config: BridgeConfig,
    main_thread: ThreadId,
    sink: Arc<CallbackSink>,
}

static NEXT_BRIDGE: AtomicU64 = AtomicU64::new(1);

/// Handle to a bridge.
#[derive(Clone)]
pub struct Bridge {
    pub(crate) inner: Arc<BridgeInner>,
}

/// What [`Bridge::shutdown`] found.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Manual objects constructed through the bridge and never freed.
    pub leaked: Vec<ObjectId>,
    /// Every diagnostic not yet taken, leak warnings included.
    pub diagnostics: Vec<Diagnostic>,
    /// Connections still open at shutdown.
    pub open_connections: usize,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.leaked.is_empty() && !self.diagnostics.iter().any(|d| d.kind == DiagnosticKind::Error)
    }
}

impl Bridge {
    /// Create a bridge over `engine` with the default configuration.
    pub fn new<E: NativeEngine + 'static>(engine: Arc<E>) -> Self {
        Self::with_config(engine, BridgeConfig::default())
    }

    pub fn with_config<E: NativeEngine + 'static>(engine: Arc<E>, config: BridgeConfig) -> Self {
        let engine: Arc<dyn NativeEngine> = engine;
        let main_thread = thread::current().id();
        let lifetime = Arc::new(LifetimeManager::new(
            Arc::clone(&engine),
            main_thread,
            config.validate_manual_handles,
        ));
        let inner = Arc::new_cyclic(|weak: &Weak<BridgeInner>| BridgeInner {
            id: NEXT_BRIDGE.fetch_add(1, Ordering::Relaxed),
            engine: Arc::clone(&engine),
            bindings: BindingCache::new(),
            overrides: OverrideRegistry::new(),
            instances: InstanceTable::new(),
            signals: SignalHub::default(),
            lifetime,
            stats: StatsCounters::default(),
            scripts: Mutex::new(FxHashMap::default()),
            diagnostics: Mutex::new(Diagnostics::with_capacity(config.max_diagnostics)),
            handler: Mutex::new(None),
            config,
            main_thread,
            sink: Arc::new(CallbackSink { bridge: weak.clone() }),
        });
        let sink: Arc<dyn ManagedCallbacks> = inner.sink.clone();
        engine.attach(Arc::downgrade(&sink));
        tracing::debug!(bridge = inner.id, "bridge created");
        Self { inner }
    }

    pub fn engine(&self) -> &dyn NativeEngine {
        &*self.inner.engine
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Identifies this bridge among all bridges in the process.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn bindings(&self) -> &BindingCache {
        &self.inner.bindings
    }

    pub fn lifetime(&self) -> &Arc<LifetimeManager> {
        &self.inner.lifetime
    }

    pub(crate) fn ensure_main_thread(&self, operation: &'static str) -> BridgeResult<()> {
        if self.inner.config.enforce_main_thread && thread::current().id() != self.inner.main_thread {
            return Err(BridgeError::WrongThread { operation });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Inbound calls
    // ------------------------------------------------------------------

    /// Call `class::method` for a wrapper generated against `fingerprint`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(
        &self,
        class: &str,
        method: &str,
        fingerprint: Fingerprint,
        receiver: Option<RawHandle>,
        args: &[Variant],
    ) -> BridgeResult<Variant> {
        self.ensure_main_thread("call")?;
        if let Some(receiver) = receiver {
            self.inner.lifetime.ensure_usable(receiver)?;
        }
        let handle = self
            .inner
            .bindings
            .resolve(&*self.inner.engine, class, method, fingerprint)?;
        self.call_resolved(handle, receiver, args)
    }

    /// Call an already resolved method.
    pub fn call_handle(
        &self,
        handle: MethodHandle,
        receiver: Option<RawHandle>,
        args: &[Variant],
    ) -> BridgeResult<Variant> {
        self.ensure_main_thread("call")?;
        if let Some(receiver) = receiver {
            self.inner.lifetime.ensure_usable(receiver)?;
        }
        self.call_resolved(handle, receiver, args)
    }

    pub(crate) fn call_resolved(
        &self,
        handle: MethodHandle,
        receiver: Option<RawHandle>,
        args: &[Variant],
    ) -> BridgeResult<Variant> {
        StatsCounters::bump(&self.inner.stats.native_calls);
        tracing::trace!(?handle, receiver = ?receiver.map(|r| r.id), args = args.len(), "native call");
        Ok(self.inner.engine.call(handle, receiver, args)?)
    }

    /// Invoke a [`Callable`]. A managed override of the method on the target
    /// runs first; otherwise the native method is called by name.
    pub fn call_callable(&self, callable: &Callable, args: &[Variant]) -> BridgeResult<Variant> {
        self.ensure_main_thread("call_callable")?;
        let target = callable.target;
        if !self.inner.engine.is_alive(target) {
            return Err(BridgeError::UseAfterRelease { id: target });
        }
        if let Some(entry) = self.inner.instances.get(target)
            && let Some(result) = self.dispatch_to_instance(&entry, &callable.method, args)?
        {
            return Ok(result);
        }
        StatsCounters::bump(&self.inner.stats.native_calls);
        Ok(self.inner.engine.call_by_name(target, &callable.method, args)?)
    }

    // ------------------------------------------------------------------
    // Construction and adoption
    // ------------------------------------------------------------------

    /// Allocate a native object of `class`. The managed side owns the
    /// allocation's initial reference.
    pub fn construct(&self, class: &str) -> BridgeResult<Wrapper> {
        let mut wrapper = Wrapper::new(self, class);
        wrapper.construct()?;
        Ok(wrapper)
    }

    /// Wrap an object the engine handed over. RefCounted adoption takes its
    /// own reference.
    pub fn adopt(&self, raw: RawHandle) -> BridgeResult<Wrapper> {
        self.ensure_main_thread("adopt")?;
        let class = self
            .inner
            .engine
            .class_of(raw.id)
            .ok_or(BridgeError::UseAfterRelease { id: raw.id })?;
        Wrapper::adopt(self, &class, raw)
    }

    /// Allocate a native object of `S::BASE` and bind `script` to it.
    pub fn construct_script<S: ScriptClass>(&self, script: S) -> BridgeResult<ScriptObject<S>> {
        let overrides = self.override_table::<S>()?;
        let wrapper = self.construct(S::BASE)?;
        let raw = wrapper.raw()?;
        let script = Arc::new(Mutex::new(script));
        script.lock().attached(raw);
        let shared: SharedInstance = script.clone();
        self.inner.instances.insert(InstanceEntry {
            script: shared,
            overrides,
            handle: raw,
        });
        tracing::debug!(object = %raw.id, script = S::NAME, "bound managed instance");
        Ok(ScriptObject::new(wrapper, script))
    }

    /// Let the engine attach `S` by name to objects it creates.
    pub fn register_script<S: ScriptClass + Default>(&self) -> BridgeResult<()> {
        let overrides = self.override_table::<S>()?;
        self.inner.scripts.lock().insert(
            S::NAME,
            ScriptFactory {
                base: S::BASE,
                overrides,
                create: create_script::<S>,
            },
        );
        tracing::debug!(script = S::NAME, base = S::BASE, "registered script");
        Ok(())
    }

    /// Attach a registered script to a natively created object.
    pub fn attach_script(&self, raw: RawHandle, script: &str) -> BridgeResult<()> {
        self.ensure_main_thread("attach_script")?;
        let (base, overrides, create) = {
            let scripts = self.inner.scripts.lock();
            let factory = scripts.get(script).ok_or_else(|| BridgeError::UnknownScript {
                name: script.to_string(),
            })?;
            (factory.base, Arc::clone(&factory.overrides), factory.create)
        };
        self.inner.lifetime.ensure_usable(raw)?;
        let class = self
            .inner
            .engine
            .class_of(raw.id)
            .ok_or(BridgeError::UseAfterRelease { id: raw.id })?;
        if !self.inner.engine.inherits(&class, base) {
            return Err(BridgeError::IncompatibleScript {
                base: base.to_string(),
                class,
            });
        }
        if class != base {
            let derived = self.inner.bindings.descriptor(&class).virtual_set(&*self.inner.engine)?;
            overrides.mark_in(&derived);
        }
        let instance = create();
        instance.lock().on_attached(raw);
        self.inner.instances.insert(InstanceEntry {
            script: instance,
            overrides,
            handle: raw,
        });
        tracing::debug!(object = %raw.id, script, "attached script");
        Ok(())
    }

    /// The managed instance bound to an object, if any.
    pub fn instance(&self, id: ObjectId) -> Option<SharedInstance> {
        self.inner.instances.get(id).map(|entry| entry.script)
    }

    pub(crate) fn override_table<S: ScriptClass>(&self) -> BridgeResult<Arc<OverrideTable>> {
        let virtuals = self
            .inner
            .bindings
            .descriptor(S::BASE)
            .virtual_set(&*self.inner.engine)?;
        self.inner
            .overrides
            .get_or_build(TypeId::of::<S>(), type_name::<S>(), &virtuals, S::OVERRIDES)
    }

    // ------------------------------------------------------------------
    // Lifetime
    // ------------------------------------------------------------------

    pub fn acquire(&self, raw: RawHandle) -> BridgeResult<()> {
        self.ensure_main_thread("acquire")?;
        self.inner.lifetime.acquire(raw)
    }

    pub fn release(&self, raw: RawHandle) -> BridgeResult<ReleaseOutcome> {
        self.ensure_main_thread("release")?;
        self.inner.lifetime.release(raw)
    }

    /// Whether `raw` may still be used. Callable from any thread.
    pub fn is_valid(&self, raw: RawHandle) -> bool {
        self.inner.lifetime.is_valid(raw)
    }

    /// Free a Manual object.
    pub fn free(&self, raw: RawHandle) -> BridgeResult<()> {
        self.ensure_main_thread("free")?;
        self.inner.lifetime.free(raw)
    }

    /// Apply releases queued by off-thread drops and deliver DEFERRED
    /// signals. Returns how many queued items were processed.
    pub fn flush_pending(&self) -> BridgeResult<usize> {
        self.ensure_main_thread("flush_pending")?;
        let releases = self.inner.lifetime.flush_pending();
        let signals = self.flush_deferred();
        Ok(releases + signals)
    }

    /// Dispose of everything the bridge still holds.
    ///
    /// Applies pending releases, disconnects every signal, unbinds every
    /// managed instance and, when configured, reports managed-constructed
    /// Manual objects that are still alive.
    pub fn shutdown(&self) -> BridgeResult<ShutdownReport> {
        self.ensure_main_thread("shutdown")?;
        self.inner.lifetime.flush_pending();
        self.flush_deferred();

        let natives = self.inner.signals.drain();
        let open_connections = natives.len();
        for native in natives {
            self.inner.engine.disconnect(native);
        }
        let instances = self.inner.instances.clear();

        let leaked = if self.inner.config.report_leaks_on_shutdown {
            self.inner.lifetime.live_constructed_manual()
        } else {
            Vec::new()
        };
        for id in &leaked {
            let class = self.inner.engine.class_of(*id).unwrap_or_default();
            self.report(Diagnostic::warning(
                DiagnosticSource::Shutdown,
                format!("manual object {id} ({class}) was constructed but never freed"),
            ));
        }

        tracing::info!(
            bridge = self.inner.id,
            leaked = leaked.len(),
            open_connections,
            instances,
            "bridge shut down"
        );
        Ok(ShutdownReport {
            leaked,
            diagnostics: self.take_diagnostics(),
            open_connections,
        })
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    pub fn stats(&self) -> BridgeStats {
        self.inner
            .stats
            .snapshot(self.inner.bindings.resolutions(), self.inner.lifetime.pending_len())
    }

    pub fn diagnostics(&self) -> MutexGuard<'_, Diagnostics> {
        self.inner.diagnostics.lock()
    }

    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        self.inner.diagnostics.lock().take()
    }

    /// Install a handler that sees every diagnostic as it is recorded.
    pub fn set_diagnostic_handler(&self, handler: impl Fn(&Diagnostic) + Send + Sync + 'static) {
        *self.inner.handler.lock() = Some(Arc::new(handler));
    }

    pub fn clear_diagnostic_handler(&self) {
        *self.inner.handler.lock() = None;
    }

    pub(crate) fn report(&self, diagnostic: Diagnostic) {
        match diagnostic.kind {
            DiagnosticKind::Error => tracing::error!(source = %diagnostic.source, "{}", diagnostic.message),
            DiagnosticKind::Warning => tracing::warn!(source = %diagnostic.source, "{}", diagnostic.message),
            DiagnosticKind::Info => tracing::info!(source = %diagnostic.source, "{}", diagnostic.message),
        }
        let handler = self.inner.handler.lock().clone();
        if let Some(handler) = handler {
            handler(&diagnostic);
        }
        self.inner.diagnostics.lock().add_diagnostic(diagnostic);
    }

    // ------------------------------------------------------------------
    // Engine notifications
    // ------------------------------------------------------------------

    fn object_freed(&self, id: ObjectId) {
        let unbound = self.inner.instances.remove(id).is_some();
        self.inner.lifetime.forget(id);
        let natives = self.inner.signals.remove_source(id);
        let dropped = natives.len();
        for native in natives {
            self.inner.engine.disconnect(native);
        }
        tracing::debug!(object = %id, unbound, connections = dropped, "native object freed");
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("id", &self.inner.id)
            .field("classes", &self.inner.bindings.class_count())
            .field("instances", &self.inner.instances.len())
            .field("connections", &self.inner.signals.len())
            .field("lifetime", &self.inner.lifetime)
            .finish_non_exhaustive()
    }
}

/// The bridge as the engine sees it.
struct CallbackSink {
    bridge: Weak<BridgeInner>,
}

impl CallbackSink {
    fn bridge(&self) -> Option<Bridge> {
        self.bridge.upgrade().map(|inner| Bridge { inner })
    }
}

impl ManagedCallbacks for CallbackSink {
    fn invoke_virtual(&self, object: RawHandle, method: &str, args: &[Variant]) -> Option<Variant> {
        self.bridge()?.invoke_virtual(object, method, args)
    }

    fn has_override(&self, object: RawHandle, method: &str) -> bool {
        let Some(bridge) = self.bridge() else {
            return false;
        };
        match bridge.has_override(object, method) {
            Ok(overridden) => overridden,
            Err(error) => {
                bridge.report(Diagnostic::error(
                    DiagnosticSource::Virtual {
                        object: object.id,
                        method: method.to_string(),
                    },
                    error,
                ));
                false
            }
        }
    }

    fn object_freed(&self, id: ObjectId) {
        if let Some(bridge) = self.bridge() {
            bridge.object_freed(id);
        }
    }

    fn attach_script(&self, object: RawHandle, script: &str) -> bool {
        let Some(bridge) = self.bridge() else {
            return false;
        };
        match bridge.attach_script(object, script) {
            Ok(()) => true,
            Err(error) => {
                bridge.report(Diagnostic::error(
                    DiagnosticSource::Script {
                        object: object.id,
                        script: script.to_string(),
                    },
                    error,
                ));
                false
            }
        }
    }
}
