//! Managed wrappers around native objects.
//!
//! A [`Wrapper`] moves through three states:
//!
//! ```text
//! Unconstructed --construct--> Bound(handle) --release/free--> Released
//! ```
//!
//! Operations on an unconstructed wrapper fail with `Unconstructed`; on a
//! released wrapper (or one whose object died underneath it) with
//! `UseAfterRelease`.

use std::fmt;
use std::sync::Arc;

use nativebind_core::{BridgeError, BridgeResult, Fingerprint, NativeCallError, ObjectId, Ownership, RawHandle, Variant};
use nativebind_registry::ClassDescriptor;

use crate::lifetime::{ManualHandle, ObjectHandle, RefHandle};
use crate::Bridge;

#[derive(Debug)]
enum Slot {
    Unconstructed,
    Bound(ObjectHandle),
    Released(ObjectId),
}

/// Observable state of a [`Wrapper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperState {
    Unconstructed,
    Bound,
    Released,
}

/// A managed wrapper for one native object of a known class.
pub struct Wrapper {
    bridge: Bridge,
    class: Arc<ClassDescriptor>,
    slot: Slot,
}

impl Wrapper {
    /// A wrapper with no native object yet.
    pub fn new(bridge: &Bridge, class: &str) -> Self {
        Self {
            class: bridge.bindings().descriptor(class),
            bridge: bridge.clone(),
            slot: Slot::Unconstructed,
        }
    }

    pub(crate) fn adopt(bridge: &Bridge, class: &str, raw: RawHandle) -> BridgeResult<Self> {
        let lifetime = bridge.lifetime();
        let handle = match raw.ownership {
            Ownership::RefCounted => ObjectHandle::RefCounted(RefHandle::acquire(raw.id, Arc::clone(lifetime))?),
            Ownership::Manual => {
                lifetime.ensure_usable(raw)?;
                lifetime.track_adopted_manual(raw);
                ObjectHandle::Manual(ManualHandle::new(raw.id, Arc::clone(lifetime)))
            }
        };
        tracing::debug!(object = %raw.id, class, ownership = ?raw.ownership, "adopted native object");
        Ok(Self {
            class: bridge.bindings().descriptor(class),
            bridge: bridge.clone(),
            slot: Slot::Bound(handle),
        })
    }

    /// Allocate the native object. Constructing a bound wrapper is a no-op.
    pub fn construct(&mut self) -> BridgeResult<()> {
        match self.slot {
            Slot::Bound(_) => return Ok(()),
            Slot::Released(id) => return Err(BridgeError::UseAfterRelease { id }),
            Slot::Unconstructed => {}
        }
        self.bridge.ensure_main_thread("construct")?;
        let raw = self.bridge.engine().instantiate(self.class.name())?;
        let lifetime = self.bridge.lifetime();
        lifetime.track_constructed(raw);
        let handle = match raw.ownership {
            Ownership::RefCounted => ObjectHandle::RefCounted(RefHandle::from_owned(raw.id, Arc::clone(lifetime))),
            Ownership::Manual => ObjectHandle::Manual(ManualHandle::new(raw.id, Arc::clone(lifetime))),
        };
        tracing::debug!(object = %raw.id, class = self.class.name(), "constructed native object");
        self.slot = Slot::Bound(handle);
        Ok(())
    }

    pub fn state(&self) -> WrapperState {
        match self.slot {
            Slot::Unconstructed => WrapperState::Unconstructed,
            Slot::Bound(_) => WrapperState::Bound,
            Slot::Released(_) => WrapperState::Released,
        }
    }

    /// The live handle.
    pub fn handle(&self) -> BridgeResult<&ObjectHandle> {
        match &self.slot {
            Slot::Unconstructed => Err(BridgeError::Unconstructed {
                class: self.class.name().to_string(),
            }),
            Slot::Released(id) => Err(BridgeError::UseAfterRelease { id: *id }),
            Slot::Bound(handle) if handle.is_valid() => Ok(handle),
            Slot::Bound(handle) => Err(BridgeError::UseAfterRelease { id: handle.id() }),
        }
    }

    pub fn raw(&self) -> BridgeResult<RawHandle> {
        self.handle().map(ObjectHandle::raw)
    }

    pub fn id(&self) -> BridgeResult<ObjectId> {
        self.handle().map(ObjectHandle::id)
    }

    pub fn is_valid(&self) -> bool {
        self.handle().is_ok()
    }

    pub fn class(&self) -> &str {
        self.class.name()
    }

    pub fn descriptor(&self) -> &Arc<ClassDescriptor> {
        &self.class
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Call a method of the wrapped object's class on it.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(&self, method: &str, fingerprint: Fingerprint, args: &[Variant]) -> BridgeResult<Variant> {
        let raw = self.raw()?;
        self.bridge.ensure_main_thread("call")?;
        let handle = self
            .bridge
            .bindings()
            .resolve_in(self.bridge.engine(), &self.class, method, fingerprint)?;
        self.bridge.call_resolved(handle, Some(raw), args)
    }

    /// Another wrapper for the same object. RefCounted clones take their own
    /// reference.
    pub fn try_clone(&self) -> BridgeResult<Self> {
        Ok(Self {
            bridge: self.bridge.clone(),
            class: Arc::clone(&self.class),
            slot: Slot::Bound(self.handle()?.try_clone()?),
        })
    }

    /// Drop the managed side's hold on the object. For RefCounted objects
    /// this gives back the wrapper's reference; Manual objects stay alive.
    pub fn release(&mut self) -> BridgeResult<()> {
        let id = self.handle()?.id();
        self.bridge.ensure_main_thread("release")?;
        if let Slot::Bound(ObjectHandle::RefCounted(handle)) = std::mem::replace(&mut self.slot, Slot::Released(id)) {
            handle.release()?;
        }
        Ok(())
    }

    /// Free a Manual object. Every other wrapper of it becomes invalid.
    pub fn free(&mut self) -> BridgeResult<()> {
        let handle = self.handle()?;
        let id = handle.id();
        let ObjectHandle::Manual(manual) = handle else {
            return Err(NativeCallError::OwnershipViolation { id, operation: "free" }.into());
        };
        manual.clone().free()?;
        self.slot = Slot::Released(id);
        Ok(())
    }
}

impl fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapper")
            .field("class", &self.class.name())
            .field("slot", &self.slot)
            .finish()
    }
}
