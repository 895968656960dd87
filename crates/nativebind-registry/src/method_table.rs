//! The engine's reflection surface as seen by the binding cache.

use nativebind_core::{Fingerprint, MethodHandle, MethodSignature};

/// What the engine reports for a method it exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeMethodInfo {
    /// Entry point token.
    pub handle: MethodHandle,
    /// Fingerprint of the signature the engine currently exposes.
    pub fingerprint: Fingerprint,
    /// Older fingerprints the engine still honours for this method.
    pub compatible: Vec<Fingerprint>,
}

impl NativeMethodInfo {
    pub fn new(handle: MethodHandle, fingerprint: Fingerprint) -> Self {
        Self {
            handle,
            fingerprint,
            compatible: Vec::new(),
        }
    }

    /// Whether a wrapper generated against `fingerprint` may bind to this method.
    pub fn accepts(&self, fingerprint: Fingerprint) -> bool {
        self.fingerprint == fingerprint || self.compatible.contains(&fingerprint)
    }
}

/// A virtual method a native class lets managed subclasses override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualMethodInfo {
    pub name: String,
    pub signature: MethodSignature,
}

impl VirtualMethodInfo {
    pub fn new(name: impl Into<String>, signature: MethodSignature) -> Self {
        Self {
            name: name.into(),
            signature,
        }
    }
}

/// Method reflection queries the engine answers.
///
/// Implementations may be slow (string lookups through the engine's class
/// database); the binding cache calls each query at most once per key.
pub trait MethodTable: Send + Sync {
    /// Look up a method on `class` or one of its ancestors.
    fn lookup_method(&self, class: &str, method: &str) -> Option<NativeMethodInfo>;

    /// All virtual methods of `class`, inherited ones included. `None` if the
    /// class does not exist.
    fn virtual_methods(&self, class: &str) -> Option<Vec<VirtualMethodInfo>>;

    fn class_exists(&self, class: &str) -> bool;
}
