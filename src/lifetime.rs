//! Native object lifetime tracking.
//!
//! Two ownership models cross the boundary:
//!
//! - **RefCounted**: the engine frees the object when its count reaches zero.
//!   Every managed [`RefHandle`] owns exactly one native reference; dropping
//!   it gives the reference back.
//! - **Manual**: the object lives until something calls `free`. A
//!   [`ManualHandle`] is a bare alias and is re-validated before every use.
//!
//! Once the bridge observes an object die (a release reaching zero, a
//! `free`, or the engine's `object_freed` notification) the id is recorded
//! and every later operation on it fails with `UseAfterRelease`.
//!
//! Deaths are recorded per engine slot as the newest dead generation. A slot's
//! generations only grow, so every id at or below that generation is dead and
//! the record stays bounded by the number of slots the engine has used.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use nativebind_core::{BridgeError, BridgeResult, NativeCallError, ObjectId, Ownership, RawHandle};

use crate::NativeEngine;

/// How the managed side came to hold an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Allocated by the managed side through the bridge.
    Constructed,
    /// Wrapped after the engine handed it over.
    Adopted,
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    ownership: Ownership,
    origin: Origin,
    /// Native references owned by managed handles (RefCounted only).
    managed_refs: u32,
}

/// Result of releasing a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The object is still alive with this many references.
    Alive(u32),
    /// The count reached zero and the engine freed the object.
    Freed,
    /// Manual objects are not counted.
    Uncounted,
}

/// Tracks every object the managed side holds.
pub struct LifetimeManager {
    engine: Arc<dyn NativeEngine>,
    main_thread: ThreadId,
    validate_manual: bool,
    tracked: Mutex<FxHashMap<ObjectId, Tracked>>,
    /// Slot index to the newest generation observed dead.
    released: Mutex<FxHashMap<u32, NonZeroU32>>,
    pending: Mutex<Vec<ObjectId>>,
}

impl LifetimeManager {
    pub(crate) fn new(engine: Arc<dyn NativeEngine>, main_thread: ThreadId, validate_manual: bool) -> Self {
        Self {
            engine,
            main_thread,
            validate_manual,
            tracked: Mutex::new(FxHashMap::default()),
            released: Mutex::new(FxHashMap::default()),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Whether the handle may still be used.
    ///
    /// RefCounted handles are always checked against the engine. Manual
    /// handles are checked against the engine only when validation is on;
    /// otherwise only deaths the bridge observed are known.
    pub fn is_valid(&self, raw: RawHandle) -> bool {
        if self.is_released(raw.id) {
            return false;
        }
        match raw.ownership {
            Ownership::RefCounted => self.engine.is_alive(raw.id),
            Ownership::Manual => !self.validate_manual || self.engine.is_alive(raw.id),
        }
    }

    /// Fail with `UseAfterRelease` if the handle is no longer valid.
    pub fn ensure_usable(&self, raw: RawHandle) -> BridgeResult<()> {
        if self.is_valid(raw) {
            Ok(())
        } else {
            Err(BridgeError::UseAfterRelease { id: raw.id })
        }
    }

    /// Take one native reference on behalf of a managed handle.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn acquire(&self, raw: RawHandle) -> BridgeResult<()> {
        self.ensure_usable(raw)?;
        if raw.ownership == Ownership::Manual {
            return Ok(());
        }
        let count = self.engine.reference(raw.id)?;
        self.tracked
            .lock()
            .entry(raw.id)
            .or_insert(Tracked {
                ownership: Ownership::RefCounted,
                origin: Origin::Adopted,
                managed_refs: 0,
            })
            .managed_refs += 1;
        tracing::trace!(object = %raw.id, count, "acquired reference");
        Ok(())
    }

    /// Give back one native reference owned by a managed handle.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn release(&self, raw: RawHandle) -> BridgeResult<ReleaseOutcome> {
        self.ensure_usable(raw)?;
        if raw.ownership == Ownership::Manual {
            return Ok(ReleaseOutcome::Uncounted);
        }
        // Never hold `tracked` across the engine call: a release that frees the
        // object comes straight back through `forget`.
        let remaining = self.engine.unreference(raw.id)?;
        {
            let mut tracked = self.tracked.lock();
            if let Some(entry) = tracked.get_mut(&raw.id) {
                entry.managed_refs = entry.managed_refs.saturating_sub(1);
                if entry.managed_refs == 0 {
                    tracked.remove(&raw.id);
                }
            }
        }
        if remaining == 0 {
            self.mark_released(raw.id);
            tracing::debug!(object = %raw.id, "released last reference");
            Ok(ReleaseOutcome::Freed)
        } else {
            tracing::trace!(object = %raw.id, remaining, "released reference");
            Ok(ReleaseOutcome::Alive(remaining))
        }
    }

    /// Free a Manual object.
    pub fn free(&self, raw: RawHandle) -> BridgeResult<()> {
        self.ensure_usable(raw)?;
        if raw.ownership == Ownership::RefCounted {
            return Err(NativeCallError::OwnershipViolation {
                id: raw.id,
                operation: "free",
            }
            .into());
        }
        self.engine.free(raw.id)?;
        self.forget(raw.id);
        tracing::debug!(object = %raw.id, "freed manual object");
        Ok(())
    }

    /// Native reference count, if the object is alive.
    pub fn reference_count(&self, raw: RawHandle) -> Option<u32> {
        if !self.is_valid(raw) {
            return None;
        }
        self.engine.reference_count(raw.id)
    }

    /// Native references currently owned by managed handles.
    pub fn managed_refs(&self, id: ObjectId) -> u32 {
        self.tracked.lock().get(&id).map_or(0, |t| t.managed_refs)
    }

    pub fn origin(&self, id: ObjectId) -> Option<Origin> {
        self.tracked.lock().get(&id).map(|t| t.origin)
    }

    /// Record an object allocated through the bridge. For RefCounted objects
    /// the allocation's initial reference becomes the managed side's.
    pub(crate) fn track_constructed(&self, raw: RawHandle) {
        self.tracked.lock().insert(
            raw.id,
            Tracked {
                ownership: raw.ownership,
                origin: Origin::Constructed,
                managed_refs: u32::from(raw.is_ref_counted()),
            },
        );
    }

    /// Record an adopted Manual object (RefCounted adoption goes through `acquire`).
    pub(crate) fn track_adopted_manual(&self, raw: RawHandle) {
        self.tracked.lock().entry(raw.id).or_insert(Tracked {
            ownership: Ownership::Manual,
            origin: Origin::Adopted,
            managed_refs: 0,
        });
    }

    /// The object died natively.
    pub(crate) fn forget(&self, id: ObjectId) {
        self.tracked.lock().remove(&id);
        self.mark_released(id);
    }

    fn is_released(&self, id: ObjectId) -> bool {
        self.released
            .lock()
            .get(&id.index())
            .is_some_and(|dead| id.generation() <= *dead)
    }

    fn mark_released(&self, id: ObjectId) {
        let mut released = self.released.lock();
        let dead = released.entry(id.index()).or_insert(id.generation());
        *dead = (*dead).max(id.generation());
    }

    /// Engine slots with a recorded death.
    pub fn released_slots(&self) -> usize {
        self.released.lock().len()
    }

    /// Release now on the main thread, otherwise queue for [`flush_pending`](Self::flush_pending).
    pub(crate) fn release_or_defer(&self, id: ObjectId) {
        if thread::current().id() != self.main_thread {
            self.pending.lock().push(id);
            tracing::trace!(object = %id, "queued off-thread release");
            return;
        }
        if let Err(error) = self.release(RawHandle::ref_counted(id)) {
            tracing::warn!(object = %id, %error, "dropping handle failed");
        }
    }

    /// Apply releases queued from other threads. Main thread only.
    pub fn flush_pending(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock());
        let count = pending.len();
        for id in pending {
            if let Err(error) = self.release(RawHandle::ref_counted(id)) {
                tracing::warn!(object = %id, %error, "deferred release failed");
            }
        }
        count
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Managed-constructed Manual objects the engine still reports alive.
    pub fn live_constructed_manual(&self) -> Vec<ObjectId> {
        let candidates: Vec<ObjectId> = self
            .tracked
            .lock()
            .iter()
            .filter(|(_, t)| t.ownership == Ownership::Manual && t.origin == Origin::Constructed)
            .map(|(id, _)| *id)
            .collect();
        let mut live: Vec<ObjectId> = candidates.into_iter().filter(|id| self.engine.is_alive(*id)).collect();
        live.sort();
        live
    }
}

impl fmt::Debug for LifetimeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifetimeManager")
            .field("tracked", &self.tracked.lock().len())
            .field("released", &self.released.lock().len())
            .field("pending", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

/// A managed strong reference to a RefCounted object.
///
/// Owns exactly one native reference. [`try_clone`](Self::try_clone) takes
/// another; dropping gives it back (deferred when dropped off the main thread).
pub struct RefHandle {
    id: ObjectId,
    lifetime: Arc<LifetimeManager>,
    armed: bool,
}

impl RefHandle {
    /// Take over a reference the caller already owns.
    pub(crate) fn from_owned(id: ObjectId, lifetime: Arc<LifetimeManager>) -> Self {
        Self {
            id,
            lifetime,
            armed: true,
        }
    }

    /// Acquire a new reference.
    pub(crate) fn acquire(id: ObjectId, lifetime: Arc<LifetimeManager>) -> BridgeResult<Self> {
        lifetime.acquire(RawHandle::ref_counted(id))?;
        Ok(Self::from_owned(id, lifetime))
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn raw(&self) -> RawHandle {
        RawHandle::ref_counted(self.id)
    }

    pub fn is_valid(&self) -> bool {
        self.lifetime.is_valid(self.raw())
    }

    pub fn reference_count(&self) -> Option<u32> {
        self.lifetime.reference_count(self.raw())
    }

    /// Another handle to the same object, owning its own reference.
    pub fn try_clone(&self) -> BridgeResult<Self> {
        Self::acquire(self.id, Arc::clone(&self.lifetime))
    }

    /// Give the reference back now and report the outcome.
    pub fn release(mut self) -> BridgeResult<ReleaseOutcome> {
        self.armed = false;
        self.lifetime.release(self.raw())
    }
}

impl Drop for RefHandle {
    fn drop(&mut self) {
        if self.armed {
            self.lifetime.release_or_defer(self.id);
        }
    }
}

impl fmt::Debug for RefHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefHandle").field(&self.id).finish()
    }
}

/// An alias to a Manual object. Carries no ownership.
#[derive(Clone)]
pub struct ManualHandle {
    id: ObjectId,
    lifetime: Arc<LifetimeManager>,
}

impl ManualHandle {
    pub(crate) fn new(id: ObjectId, lifetime: Arc<LifetimeManager>) -> Self {
        Self { id, lifetime }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn raw(&self) -> RawHandle {
        RawHandle::manual(self.id)
    }

    pub fn is_valid(&self) -> bool {
        self.lifetime.is_valid(self.raw())
    }

    /// Free the native object. Every alias becomes invalid.
    pub fn free(self) -> BridgeResult<()> {
        self.lifetime.free(self.raw())
    }
}

impl fmt::Debug for ManualHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ManualHandle").field(&self.id).finish()
    }
}

/// A managed handle under either ownership model.
#[derive(Debug)]
pub enum ObjectHandle {
    RefCounted(RefHandle),
    Manual(ManualHandle),
}

impl ObjectHandle {
    pub fn id(&self) -> ObjectId {
        match self {
            ObjectHandle::RefCounted(h) => h.id(),
            ObjectHandle::Manual(h) => h.id(),
        }
    }

    pub fn raw(&self) -> RawHandle {
        match self {
            ObjectHandle::RefCounted(h) => h.raw(),
            ObjectHandle::Manual(h) => h.raw(),
        }
    }

    pub fn ownership(&self) -> Ownership {
        self.raw().ownership
    }

    pub fn is_valid(&self) -> bool {
        match self {
            ObjectHandle::RefCounted(h) => h.is_valid(),
            ObjectHandle::Manual(h) => h.is_valid(),
        }
    }

    /// Another handle to the same object; RefCounted clones take a reference.
    pub fn try_clone(&self) -> BridgeResult<Self> {
        Ok(match self {
            ObjectHandle::RefCounted(h) => ObjectHandle::RefCounted(h.try_clone()?),
            ObjectHandle::Manual(h) => {
                h.lifetime.ensure_usable(h.raw())?;
                ObjectHandle::Manual(h.clone())
            }
        })
    }
}
