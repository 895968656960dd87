//! Lazily populated, thread-safe cache of resolved native methods.
//!
//! # Storage Model
//!
//! - **Classes**: one [`ClassDescriptor`] per native class name, created on first
//!   use and never removed.
//! - **Methods**: each descriptor maps a method name to the `(Fingerprint,
//!   MethodHandle)` pairs resolved under that name. One name can carry several
//!   fingerprints when wrappers generated against different engine versions
//!   share a process.
//! - **Virtuals**: each descriptor lazily holds the class's [`VirtualSet`].
//!
//! # Thread Safety
//!
//! Resolution queries the engine outside any lock, then inserts if absent. Two
//! threads racing on the same key both query the engine; the loser discards its
//! result and returns the handle the winner stored. Failures are never cached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

use nativebind_core::{BridgeError, Fingerprint, MethodHandle};

use crate::{MethodTable, VirtualSet};

/// Cached binding state for one native class.
#[derive(Debug)]
pub struct ClassDescriptor {
    name: String,
    methods: DashMap<Box<str>, Vec<(Fingerprint, MethodHandle)>, FxBuildHasher>,
    virtuals: OnceLock<Arc<VirtualSet>>,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: DashMap::with_hasher(FxBuildHasher),
            virtuals: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a previously resolved handle without querying the engine.
    pub fn cached(&self, method: &str, fingerprint: Fingerprint) -> Option<MethodHandle> {
        self.methods
            .get(method)?
            .iter()
            .find(|(fp, _)| *fp == fingerprint)
            .map(|(_, handle)| *handle)
    }

    /// Number of resolved `(method, fingerprint)` keys.
    pub fn resolved_count(&self) -> usize {
        self.methods.iter().map(|entry| entry.value().len()).sum()
    }

    /// Resolve a method, querying `table` only on a cache miss.
    ///
    /// Returns the handle and whether the engine was queried.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn resolve<T: MethodTable + ?Sized>(
        &self,
        table: &T,
        method: &str,
        fingerprint: Fingerprint,
    ) -> Result<(MethodHandle, bool), BridgeError> {
        if let Some(handle) = self.cached(method, fingerprint) {
            return Ok((handle, false));
        }

        let Some(info) = table.lookup_method(&self.name, method) else {
            return Err(if table.class_exists(&self.name) {
                BridgeError::UnknownMethod {
                    class: self.name.clone(),
                    method: method.to_string(),
                }
            } else {
                BridgeError::UnknownClass {
                    class: self.name.clone(),
                }
            });
        };

        if !info.accepts(fingerprint) {
            tracing::error!(
                class = %self.name,
                method,
                expected = %fingerprint,
                found = %info.fingerprint,
                "binding mismatch"
            );
            return Err(BridgeError::BindingMismatch {
                class: self.name.clone(),
                method: method.to_string(),
                expected: fingerprint,
                found: info.fingerprint,
            });
        }

        let mut entry = self.methods.entry(method.into()).or_default();
        if let Some((_, winner)) = entry.iter().find(|(fp, _)| *fp == fingerprint) {
            return Ok((*winner, true));
        }
        entry.push((fingerprint, info.handle));
        tracing::debug!(class = %self.name, method, handle = ?info.handle, "resolved native method");
        Ok((info.handle, true))
    }

    /// Get the class's virtual set, querying `table` on first use.
    pub fn virtual_set<T: MethodTable + ?Sized>(&self, table: &T) -> Result<Arc<VirtualSet>, BridgeError> {
        if let Some(set) = self.virtuals.get() {
            return Ok(Arc::clone(set));
        }
        let methods = table
            .virtual_methods(&self.name)
            .ok_or_else(|| BridgeError::UnknownClass {
                class: self.name.clone(),
            })?;
        let set = Arc::new(VirtualSet::new(self.name.clone(), methods));
        Ok(Arc::clone(self.virtuals.get_or_init(|| set)))
    }
}

/// Process-wide or per-bridge cache of class descriptors.
#[derive(Debug, Default)]
pub struct BindingCache {
    classes: DashMap<Box<str>, Arc<ClassDescriptor>, FxBuildHasher>,
    resolutions: AtomicU64,
}

impl BindingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    pub fn global() -> &'static BindingCache {
        static GLOBAL: OnceLock<BindingCache> = OnceLock::new();
        GLOBAL.get_or_init(BindingCache::new)
    }

    /// Get the descriptor for `class`, creating it on first use.
    pub fn descriptor(&self, class: &str) -> Arc<ClassDescriptor> {
        if let Some(existing) = self.classes.get(class) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.classes
                .entry(class.into())
                .or_insert_with(|| Arc::new(ClassDescriptor::new(class)))
                .value(),
        )
    }

    /// Resolve `class::method` for a wrapper generated against `fingerprint`.
    pub fn resolve<T: MethodTable + ?Sized>(
        &self,
        table: &T,
        class: &str,
        method: &str,
        fingerprint: Fingerprint,
    ) -> Result<MethodHandle, BridgeError> {
        self.resolve_in(table, &self.descriptor(class), method, fingerprint)
    }

    /// Resolve through a descriptor the caller already holds.
    pub fn resolve_in<T: MethodTable + ?Sized>(
        &self,
        table: &T,
        descriptor: &ClassDescriptor,
        method: &str,
        fingerprint: Fingerprint,
    ) -> Result<MethodHandle, BridgeError> {
        let (handle, queried) = descriptor.resolve(table, method, fingerprint)?;
        if queried {
            self.resolutions.fetch_add(1, Ordering::Relaxed);
        }
        Ok(handle)
    }

    /// Number of successful resolutions that queried the engine.
    pub fn resolutions(&self) -> u64 {
        self.resolutions.load(Ordering::Relaxed)
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}
