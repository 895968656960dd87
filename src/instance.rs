//! Managed instances bound to native objects.
//!
//! A managed type that extends a native class implements [`ScriptClass`],
//! usually through `#[script_class]`. When an instance is bound to a native
//! object, the bridge records it in the [`InstanceTable`] together with the
//! type's [`OverrideTable`], so virtual calls from the engine find both with
//! one lookup.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;

use nativebind_core::{BridgeError, BridgeResult, ObjectId, RawHandle, Variant};
use nativebind_registry::OverrideTable;

use crate::Wrapper;

/// A managed type extending a native class.
pub trait ScriptClass: Send + 'static {
    /// Name the engine uses to attach this script to objects it creates.
    const NAME: &'static str;
    /// Native class this type extends.
    const BASE: &'static str;
    /// Virtual methods of `BASE` this type redefines.
    const OVERRIDES: &'static [&'static str];

    /// Run the override for `method`. Only called for names in `OVERRIDES`.
    fn call_virtual(&mut self, method: &str, args: &[Variant]) -> BridgeResult<Variant>;

    /// Called once the instance is bound to its native object.
    fn attached(&mut self, _object: RawHandle) {}
}

/// Object-safe view of a [`ScriptClass`].
pub trait ScriptInstance: Send {
    fn dispatch_virtual(&mut self, method: &str, args: &[Variant]) -> BridgeResult<Variant>;

    fn script_name(&self) -> &'static str;

    fn on_attached(&mut self, object: RawHandle);
}

impl<S: ScriptClass> ScriptInstance for S {
    fn dispatch_virtual(&mut self, method: &str, args: &[Variant]) -> BridgeResult<Variant> {
        self.call_virtual(method, args)
    }

    fn script_name(&self) -> &'static str {
        S::NAME
    }

    fn on_attached(&mut self, object: RawHandle) {
        self.attached(object);
    }
}

/// A managed instance shared between its owner and the instance table.
pub type SharedInstance = Arc<Mutex<dyn ScriptInstance>>;

/// Everything needed to dispatch to one bound instance.
#[derive(Clone)]
pub struct InstanceEntry {
    pub script: SharedInstance,
    pub overrides: Arc<OverrideTable>,
    pub handle: RawHandle,
}

impl fmt::Debug for InstanceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceEntry")
            .field("type", &self.overrides.type_name())
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Object id to bound managed instance.
#[derive(Debug, Default)]
pub struct InstanceTable {
    entries: Mutex<FxHashMap<ObjectId, InstanceEntry>>,
}

impl InstanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an instance, replacing any previous binding for the object.
    pub fn insert(&self, entry: InstanceEntry) -> Option<InstanceEntry> {
        self.entries.lock().insert(entry.handle.id, entry)
    }

    /// Clone the entry out so no lock is held while the instance runs.
    pub fn get(&self, id: ObjectId) -> Option<InstanceEntry> {
        self.entries.lock().get(&id).cloned()
    }

    pub fn remove(&self, id: ObjectId) -> Option<InstanceEntry> {
        self.entries.lock().remove(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub(crate) fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }
}

/// A managed instance together with the wrapper of its native object.
pub struct ScriptObject<S: ScriptClass> {
    wrapper: Wrapper,
    script: Arc<Mutex<S>>,
}

impl<S: ScriptClass> ScriptObject<S> {
    pub(crate) fn new(wrapper: Wrapper, script: Arc<Mutex<S>>) -> Self {
        Self { wrapper, script }
    }

    pub fn wrapper(&self) -> &Wrapper {
        &self.wrapper
    }

    pub fn id(&self) -> BridgeResult<ObjectId> {
        self.wrapper.id()
    }

    /// Borrow the managed instance.
    ///
    /// Fails with `InstanceBusy` while the engine is running one of its
    /// overrides.
    pub fn bind(&self) -> BridgeResult<MutexGuard<'_, S>> {
        self.script.try_lock().ok_or_else(|| match self.wrapper.raw() {
            Ok(raw) => BridgeError::InstanceBusy { id: raw.id },
            Err(error) => error,
        })
    }

    /// Release the managed side's hold on the native object.
    pub fn into_wrapper(self) -> Wrapper {
        self.wrapper
    }
}

impl<S: ScriptClass> fmt::Debug for ScriptObject<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptObject")
            .field("script", &S::NAME)
            .field("wrapper", &self.wrapper)
            .finish()
    }
}
