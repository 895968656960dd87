//! Virtual method dispatch from the engine into managed overrides.
//!
//! The engine asks two questions about a virtual slot: does the object's
//! managed type override it ([`Bridge::has_override`]), and if so, run it
//! ([`Bridge::invoke_virtual`]). Both are answered from the bound instance's
//! [`OverrideTable`](nativebind_registry::OverrideTable) without calling
//! into managed code.

use std::sync::Arc;

use nativebind_core::{BridgeError, BridgeResult, ObjectId, RawHandle, Variant};
use nativebind_registry::{VirtualSet, VirtualSlot};

use crate::diagnostics::{Diagnostic, DiagnosticSource};
use crate::instance::InstanceEntry;
use crate::stats::StatsCounters;
use crate::Bridge;

/// A pre-resolved virtual slot for call sites that probe every frame.
#[derive(Debug, Clone)]
pub struct VirtualProbe {
    set: Arc<VirtualSet>,
    slot: VirtualSlot,
}

impl VirtualProbe {
    pub fn slot(&self) -> VirtualSlot {
        self.slot
    }

    pub fn class(&self) -> &str {
        self.set.class()
    }

    pub fn name(&self) -> &str {
        self.set.method(self.slot).map_or("", |m| m.name.as_str())
    }
}

impl Bridge {
    /// Run the managed override of `method` on `object`.
    ///
    /// Returns `Ok(None)` when the object has no managed instance or its
    /// type does not override the method; the engine then runs its native
    /// default.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn try_invoke_virtual(&self, object: RawHandle, method: &str, args: &[Variant]) -> BridgeResult<Option<Variant>> {
        self.ensure_main_thread("invoke_virtual")?;
        self.inner.lifetime.ensure_usable(object)?;

        let outcome = match self.inner.instances.get(object.id) {
            Some(entry) => {
                if entry.overrides.virtuals().slot(method).is_none() {
                    self.require_virtual(object.id, method)?;
                }
                self.dispatch_to_instance(&entry, method, args)?
            }
            None => {
                self.require_virtual(object.id, method)?;
                None
            }
        };

        let stats = &self.inner.stats;
        match outcome {
            Some(_) => StatsCounters::bump(&stats.virtual_dispatches),
            None => StatsCounters::bump(&stats.virtual_fallthroughs),
        }
        Ok(outcome)
    }

    /// Outbound form of [`try_invoke_virtual`](Self::try_invoke_virtual):
    /// failures go to the diagnostics channel and yield `None`.
    pub fn invoke_virtual(&self, object: RawHandle, method: &str, args: &[Variant]) -> Option<Variant> {
        match self.try_invoke_virtual(object, method, args) {
            Ok(result) => result,
            Err(error) => {
                let stats = &self.inner.stats;
                if error.is_marshal() {
                    StatsCounters::bump(&stats.marshal_errors);
                }
                StatsCounters::bump(&stats.dropped_outbound);
                self.report(Diagnostic::error(
                    DiagnosticSource::Virtual {
                        object: object.id,
                        method: method.to_string(),
                    },
                    error,
                ));
                None
            }
        }
    }

    /// Whether the managed type bound to `object` overrides `method`.
    ///
    /// Objects without a managed instance override nothing. A name that is
    /// not a virtual of the object's class fails with `UnknownVirtual`; a
    /// released or freed object fails with `UseAfterRelease`.
    pub fn has_override(&self, object: RawHandle, method: &str) -> BridgeResult<bool> {
        self.ensure_main_thread("has_override")?;
        self.inner.lifetime.ensure_usable(object)?;
        if let Some(entry) = self.inner.instances.get(object.id)
            && let Some(slot) = entry.overrides.virtuals().slot(method)
        {
            return Ok(entry.overrides.is_overridden(slot));
        }
        self.require_virtual(object.id, method)?;
        Ok(false)
    }

    /// Resolve `class::name` to a probe for [`has_override_slot`](Self::has_override_slot).
    pub fn virtual_slot(&self, class: &str, name: &str) -> BridgeResult<VirtualProbe> {
        let set = self.inner.bindings.descriptor(class).virtual_set(&*self.inner.engine)?;
        let slot = set.slot(name).ok_or_else(|| BridgeError::UnknownVirtual {
            class: class.to_string(),
            method: name.to_string(),
        })?;
        Ok(VirtualProbe { set, slot })
    }

    /// [`has_override`](Self::has_override) without hashing the method name.
    #[inline]
    pub fn has_override_slot(&self, object: RawHandle, probe: &VirtualProbe) -> BridgeResult<bool> {
        self.ensure_main_thread("has_override_slot")?;
        self.inner.lifetime.ensure_usable(object)?;
        if !probe.set.is_overridden_anywhere(probe.slot) {
            return Ok(false);
        }
        let Some(entry) = self.inner.instances.get(object.id) else {
            return Ok(false);
        };
        let table = &entry.overrides;
        if Arc::ptr_eq(table.virtuals(), &probe.set) {
            return Ok(table.is_overridden(probe.slot));
        }
        // probe resolved against a different class than the instance's base
        Ok(table
            .virtuals()
            .slot(probe.name())
            .is_some_and(|slot| table.is_overridden(slot)))
    }

    /// Run `method` on a bound instance if its type overrides it.
    pub(crate) fn dispatch_to_instance(
        &self,
        entry: &InstanceEntry,
        method: &str,
        args: &[Variant],
    ) -> BridgeResult<Option<Variant>> {
        let table = &entry.overrides;
        let Some(slot) = table.virtuals().slot(method) else {
            return Ok(None);
        };
        if !table.is_overridden(slot) {
            return Ok(None);
        }

        if let Some(info) = table.virtuals().method(slot) {
            let signature = &info.signature;
            if !signature.is_vararg() && args.len() != signature.arity() {
                return Err(BridgeError::ArityMismatch {
                    target: format!("{}::{}", table.virtuals().class(), method),
                    expected: signature.arity(),
                    got: args.len(),
                });
            }
            signature
                .check_args(args)
                .map_err(|(index, error)| error.at_argument(index))?;
        }

        let id = entry.handle.id;
        let mut script = entry
            .script
            .try_lock()
            .ok_or(BridgeError::InstanceBusy { id })?;
        let result = script.dispatch_virtual(method, args)?;
        tracing::trace!(object = %id, method, "dispatched virtual to managed override");
        Ok(Some(result))
    }

    /// Fail with `UnknownVirtual` unless `method` is a virtual of the object's class.
    fn require_virtual(&self, id: ObjectId, method: &str) -> BridgeResult<()> {
        let class = self
            .inner
            .engine
            .class_of(id)
            .ok_or(BridgeError::UseAfterRelease { id })?;
        let set = self.inner.bindings.descriptor(&class).virtual_set(&*self.inner.engine)?;
        if set.slot(method).is_some() {
            Ok(())
        } else {
            Err(BridgeError::UnknownVirtual {
                class,
                method: method.to_string(),
            })
        }
    }
}
