//! Signal/event bridging.
//!
//! [`Bridge::connect`] installs a trampoline with the engine and returns a
//! [`ConnectionId`]. When the engine fires the signal the trampoline finds
//! the connection, checks the argument count, unmarshals the arguments and
//! runs the managed [`Callback`].
//!
//! Connections are addressed by token. Disconnecting by callback identity is
//! kept as a secondary path: two callbacks built separately for the same
//! target, method name and handler compare equal through their
//! [`CallbackIdentity`].

use std::any::TypeId;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bitflags::bitflags;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use nativebind_core::{BridgeError, BridgeResult, FromVariant, ObjectId, Variant, VariantType, unbox};

use crate::diagnostics::{Diagnostic, DiagnosticSource};
use crate::engine::{NativeConnectionId, Trampoline};
use crate::stats::StatsCounters;
use crate::Bridge;

bitflags! {
    /// Connection options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConnectFlags: u32 {
        /// Disconnect after the first delivery.
        const ONE_SHOT = 1 << 0;
        /// Queue deliveries until [`Bridge::flush_pending`].
        const DEFERRED = 1 << 1;
    }
}

/// Token returned by [`Bridge::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(NonZeroU64);

impl ConnectionId {
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection #{}", self.0)
    }
}

/// What a callback is, for disconnecting without a token.
///
/// A method identity is the target allocation, the method name and the
/// handler's type. The callback keeps a `Weak` to its target, so the address
/// is not reused while the connection exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallbackIdentity {
    /// A free closure; unique per [`Callback::new`].
    Closure(u64),
    /// A method bound to a target object.
    Method {
        target: usize,
        method: Cow<'static, str>,
        handler: TypeId,
    },
}

/// Outcome of running a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Invocation {
    Delivered,
    /// The bound target was dropped; the connection should go.
    TargetGone,
}

type ErasedHandler = dyn Fn(&[Variant]) -> BridgeResult<Invocation> + Send + Sync;

struct CallbackInner {
    identity: CallbackIdentity,
    param_types: Vec<VariantType>,
    handler: Box<ErasedHandler>,
}

/// A managed signal handler with a declared parameter list.
#[derive(Clone)]
pub struct Callback(Arc<CallbackInner>);

static NEXT_CLOSURE: AtomicU64 = AtomicU64::new(1);

impl Callback {
    /// Wrap a closure. Its parameter types are taken from its signature.
    pub fn new<Args: 'static, H: SignalHandler<Args>>(handler: H) -> Self {
        Self(Arc::new(CallbackInner {
            identity: CallbackIdentity::Closure(NEXT_CLOSURE.fetch_add(1, Ordering::Relaxed)),
            param_types: H::param_types(),
            handler: Box::new(move |args| handler.call(args).map(|()| Invocation::Delivered)),
        }))
    }

    /// Bind a handler to `target`. The callback holds the target weakly and
    /// disconnects itself once the target is dropped.
    pub fn method<T, Args, H>(target: &Arc<T>, method: impl Into<Cow<'static, str>>, handler: H) -> Self
    where
        T: Send + Sync + 'static,
        Args: 'static,
        H: MethodHandler<T, Args> + 'static,
    {
        let weak: Weak<T> = Arc::downgrade(target);
        Self(Arc::new(CallbackInner {
            identity: CallbackIdentity::Method {
                target: Arc::as_ptr(target) as *const () as usize,
                method: method.into(),
                handler: TypeId::of::<H>(),
            },
            param_types: H::param_types(),
            handler: Box::new(move |args| match weak.upgrade() {
                Some(target) => handler.call(&target, args).map(|()| Invocation::Delivered),
                None => Ok(Invocation::TargetGone),
            }),
        }))
    }

    pub fn identity(&self) -> &CallbackIdentity {
        &self.0.identity
    }

    pub fn param_types(&self) -> &[VariantType] {
        &self.0.param_types
    }

    pub fn arity(&self) -> usize {
        self.0.param_types.len()
    }

    pub(crate) fn invoke(&self, args: &[Variant]) -> BridgeResult<Invocation> {
        (self.0.handler)(args)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("identity", &self.0.identity)
            .field("param_types", &self.0.param_types)
            .finish()
    }
}

/// Closures usable as signal handlers, keyed by their argument tuple.
pub trait SignalHandler<Args>: Send + Sync + 'static {
    fn param_types() -> Vec<VariantType>;

    fn call(&self, args: &[Variant]) -> BridgeResult<()>;
}

/// Closures taking `&T` first, usable with [`Callback::method`].
pub trait MethodHandler<T, Args>: Send + Sync + 'static {
    fn param_types() -> Vec<VariantType>;

    fn call(&self, target: &T, args: &[Variant]) -> BridgeResult<()>;
}

fn check_count(args: &[Variant], expected: usize) -> BridgeResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(BridgeError::ArityMismatch {
            target: "signal handler".into(),
            expected,
            got: args.len(),
        })
    }
}

macro_rules! impl_handlers {
    ($count:literal $(, $arg:ident)*) => {
        impl<Func, $($arg,)*> SignalHandler<($($arg,)*)> for Func
        where
            Func: Fn($($arg),*) + Send + Sync + 'static,
            $($arg: FromVariant,)*
        {
            fn param_types() -> Vec<VariantType> {
                vec![$(<$arg as FromVariant>::variant_type()),*]
            }

            #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
            fn call(&self, args: &[Variant]) -> BridgeResult<()> {
                check_count(args, $count)?;
                let mut index = 0usize;
                $(
                    let $arg: $arg = unbox(&args[index]).map_err(|e| e.at_argument(index))?;
                    index += 1;
                )*
                (self)($($arg),*);
                Ok(())
            }
        }

        impl<T, Func, $($arg,)*> MethodHandler<T, ($($arg,)*)> for Func
        where
            Func: Fn(&T $(, $arg)*) + Send + Sync + 'static,
            $($arg: FromVariant,)*
        {
            fn param_types() -> Vec<VariantType> {
                vec![$(<$arg as FromVariant>::variant_type()),*]
            }

            #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
            fn call(&self, target: &T, args: &[Variant]) -> BridgeResult<()> {
                check_count(args, $count)?;
                let mut index = 0usize;
                $(
                    let $arg: $arg = unbox(&args[index]).map_err(|e| e.at_argument(index))?;
                    index += 1;
                )*
                (self)(target $(, $arg)*);
                Ok(())
            }
        }
    };
}

impl_handlers!(0);
impl_handlers!(1, A);
impl_handlers!(2, A, B);
impl_handlers!(3, A, B, C);
impl_handlers!(4, A, B, C, D);
impl_handlers!(5, A, B, C, D, E);
impl_handlers!(6, A, B, C, D, E, F);

#[derive(Debug, Clone)]
struct Connection {
    id: ConnectionId,
    source: ObjectId,
    signal: String,
    callback: Callback,
    flags: ConnectFlags,
    native: NativeConnectionId,
}

/// Connection table of one bridge.
#[derive(Debug)]
pub(crate) struct SignalHub {
    connections: Mutex<FxHashMap<ConnectionId, Connection>>,
    deferred: Mutex<VecDeque<(ConnectionId, Vec<Variant>)>>,
    next_id: AtomicU64,
}

impl Default for SignalHub {
    fn default() -> Self {
        Self {
            connections: Mutex::new(FxHashMap::default()),
            deferred: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl SignalHub {
    fn next_id(&self) -> ConnectionId {
        let raw = self.next_id.fetch_add(1, Ordering::Relaxed);
        ConnectionId(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    fn get(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.lock().get(&id).cloned()
    }

    fn remove(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.lock().remove(&id)
    }

    /// Remove every connection whose source is `source`.
    pub(crate) fn remove_source(&self, source: ObjectId) -> Vec<NativeConnectionId> {
        let mut connections = self.connections.lock();
        let doomed: Vec<ConnectionId> = connections
            .values()
            .filter(|c| c.source == source)
            .map(|c| c.id)
            .collect();
        doomed
            .into_iter()
            .filter_map(|id| connections.remove(&id))
            .map(|c| c.native)
            .collect()
    }

    pub(crate) fn drain(&self) -> Vec<NativeConnectionId> {
        self.deferred.lock().clear();
        self.connections.lock().drain().map(|(_, c)| c.native).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub(crate) fn deferred_len(&self) -> usize {
        self.deferred.lock().len()
    }
}

impl Bridge {
    /// Connect a managed callback to `signal` on `source`.
    ///
    /// The callback's parameter count must equal the signal's declared count.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn connect(
        &self,
        source: ObjectId,
        signal: &str,
        callback: Callback,
        flags: ConnectFlags,
    ) -> BridgeResult<ConnectionId> {
        self.ensure_main_thread("connect")?;
        let engine = self.engine();
        let class = engine
            .class_of(source)
            .ok_or(BridgeError::UseAfterRelease { id: source })?;
        let info = engine
            .signal_info(&class, signal)
            .ok_or_else(|| BridgeError::UnknownSignal {
                class: class.clone(),
                signal: signal.to_string(),
            })?;
        if info.arity() != callback.arity() {
            return Err(BridgeError::ArityMismatch {
                target: format!("{class}.{signal}"),
                expected: info.arity(),
                got: callback.arity(),
            });
        }

        let hub = &self.inner.signals;
        let id = hub.next_id();
        let weak = Arc::downgrade(&self.inner);
        let trampoline: Trampoline = Arc::new(move |args: &[Variant]| match weak.upgrade() {
            Some(inner) => Bridge { inner }.deliver_signal(id, args),
            None => Ok(()),
        });
        let native = engine.connect(source, signal, trampoline)?;
        hub.connections.lock().insert(
            id,
            Connection {
                id,
                source,
                signal: signal.to_string(),
                callback,
                flags,
                native,
            },
        );
        tracing::debug!(%source, signal, %id, ?flags, "connected signal");
        Ok(id)
    }

    /// Disconnect by token.
    pub fn disconnect(&self, id: ConnectionId) -> BridgeResult<()> {
        self.ensure_main_thread("disconnect")?;
        let connection = self
            .inner
            .signals
            .remove(id)
            .ok_or(BridgeError::ConnectionNotFound { id: id.get() })?;
        self.engine().disconnect(connection.native);
        tracing::debug!(%id, signal = %connection.signal, "disconnected signal");
        Ok(())
    }

    /// Disconnect every connection of `signal` on `source` whose callback has
    /// the same identity as `callback`. Returns how many were removed.
    ///
    /// Closures only match themselves (or clones). Method callbacks match when
    /// they share target, name and handler function.
    pub fn disconnect_callback(&self, source: ObjectId, signal: &str, callback: &Callback) -> BridgeResult<usize> {
        self.ensure_main_thread("disconnect")?;
        let removed: Vec<Connection> = {
            let mut connections = self.inner.signals.connections.lock();
            let matching: Vec<ConnectionId> = connections
                .values()
                .filter(|c| c.source == source && c.signal == signal && c.callback.identity() == callback.identity())
                .map(|c| c.id)
                .collect();
            matching.into_iter().filter_map(|id| connections.remove(&id)).collect()
        };
        for connection in &removed {
            self.engine().disconnect(connection.native);
        }
        tracing::debug!(%source, signal, removed = removed.len(), "disconnected by identity");
        Ok(removed.len())
    }

    /// Fire a signal from the managed side.
    pub fn emit_signal(&self, source: ObjectId, signal: &str, args: &[Variant]) -> BridgeResult<()> {
        self.ensure_main_thread("emit_signal")?;
        self.engine().emit_signal(source, signal, args)?;
        Ok(())
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.signals.len()
    }

    /// Entry point of every trampoline.
    fn deliver_signal(&self, id: ConnectionId, args: &[Variant]) -> BridgeResult<()> {
        // Disconnected while the engine was already emitting.
        let Some(connection) = self.inner.signals.get(id) else {
            return Ok(());
        };
        // Deferred emissions are queued from any thread and run on flush.
        if connection.flags.contains(ConnectFlags::DEFERRED) {
            return self.defer(&connection, args);
        }
        if let Err(error) = self.ensure_main_thread("deliver_signal") {
            return Err(self.drop_delivery(&connection, error));
        }
        self.deliver_now(&connection, args)
    }

    fn defer(&self, connection: &Connection, args: &[Variant]) -> BridgeResult<()> {
        let capacity = self.inner.config.max_deferred_signals;
        {
            let mut queue = self.inner.signals.deferred.lock();
            if queue.len() < capacity {
                queue.push_back((connection.id, args.to_vec()));
                return Ok(());
            }
        }
        tracing::warn!(id = %connection.id, signal = %connection.signal, capacity, "deferred signal queue full");
        Err(self.drop_delivery(connection, BridgeError::DeferredQueueFull { capacity }))
    }

    /// Count and report a delivery that never reached its handler.
    fn drop_delivery(&self, connection: &Connection, error: BridgeError) -> BridgeError {
        StatsCounters::bump(&self.inner.stats.dropped_outbound);
        self.report(Diagnostic::error(self.signal_source(connection), error.clone()));
        error
    }

    fn deliver_now(&self, connection: &Connection, args: &[Variant]) -> BridgeResult<()> {
        let stats = &self.inner.stats;
        if args.len() != connection.callback.arity() {
            let error = BridgeError::ArityMismatch {
                target: format!("handler of signal '{}'", connection.signal),
                expected: connection.callback.arity(),
                got: args.len(),
            };
            return Err(self.drop_delivery(connection, error));
        }

        if connection.flags.contains(ConnectFlags::ONE_SHOT) && self.inner.signals.remove(connection.id).is_some() {
            self.engine().disconnect(connection.native);
        }

        match connection.callback.invoke(args) {
            Ok(Invocation::Delivered) => {
                StatsCounters::bump(&stats.signal_deliveries);
                tracing::trace!(id = %connection.id, signal = %connection.signal, "delivered signal");
                Ok(())
            }
            Ok(Invocation::TargetGone) => {
                if self.inner.signals.remove(connection.id).is_some() {
                    self.engine().disconnect(connection.native);
                }
                tracing::debug!(id = %connection.id, signal = %connection.signal, "handler target dropped, disconnected");
                Ok(())
            }
            Err(error) => {
                if error.is_marshal() {
                    StatsCounters::bump(&stats.marshal_errors);
                }
                StatsCounters::bump(&stats.dropped_outbound);
                self.report(Diagnostic::error(self.signal_source(connection), error.clone()));
                Err(error)
            }
        }
    }

    fn signal_source(&self, connection: &Connection) -> DiagnosticSource {
        DiagnosticSource::Signal {
            connection: connection.id,
            signal: connection.signal.clone(),
        }
    }

    /// Deliver queued DEFERRED emissions. Returns how many were delivered.
    ///
    /// Only emissions queued before the call run; anything a handler emits
    /// while flushing waits for the next flush.
    pub(crate) fn flush_deferred(&self) -> usize {
        let queued = std::mem::take(&mut *self.inner.signals.deferred.lock());
        let mut delivered = 0;
        for (id, args) in queued {
            let Some(connection) = self.inner.signals.get(id) else {
                continue;
            };
            if self.deliver_now(&connection, &args).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub(crate) fn deferred_signals(&self) -> usize {
        self.inner.signals.deferred_len()
    }
}
