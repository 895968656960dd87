//! Sandbox class definitions.
//!
//! ```ignore
//! engine.register(
//!     ClassBuilder::new("Node")
//!         .inherits("Object")
//!         .method("get_name", &[], VariantType::String, |ctx| {
//!             let name = ctx.this()?.get_or_nil("name");
//!             ctx.set_return_variant(name);
//!             Ok(())
//!         })
//!         .virtual_method("_ready", &[], VariantType::Nil)
//!         .signal("renamed", &[]),
//! );
//! ```

use std::fmt;
use std::sync::Arc;

use nativebind_core::{Fingerprint, MethodFlags, MethodSignature, NativeCallError, Ownership, SignalInfo, VariantType};
use nativebind_registry::VirtualMethodInfo;

use super::call_context::CallContext;

/// Type-erased native method body.
pub type NativeFn = Arc<dyn Fn(&mut CallContext<'_>) -> Result<(), NativeCallError> + Send + Sync>;

/// A method as declared by its class.
#[derive(Clone)]
pub struct MethodDef {
    pub name: String,
    pub signature: MethodSignature,
    /// Older fingerprints still accepted for this method.
    pub compatible: Vec<Fingerprint>,
    pub(crate) func: NativeFn,
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("compatible", &self.compatible)
            .finish_non_exhaustive()
    }
}

/// A virtual method with an optional native default.
#[derive(Clone)]
pub struct VirtualDef {
    pub info: VirtualMethodInfo,
    pub(crate) default: Option<NativeFn>,
}

impl fmt::Debug for VirtualDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualDef")
            .field("info", &self.info)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

/// A class as registered with the sandbox.
#[derive(Debug, Clone)]
pub struct SandboxClass {
    pub name: String,
    pub parent: Option<String>,
    pub ownership: Ownership,
    pub instantiable: bool,
    pub methods: Vec<MethodDef>,
    pub virtuals: Vec<VirtualDef>,
    pub signals: Vec<SignalInfo>,
}

/// Fluent builder for [`SandboxClass`].
#[derive(Debug)]
pub struct ClassBuilder {
    class: SandboxClass,
    ownership_set: bool,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            class: SandboxClass {
                name: name.into(),
                parent: None,
                ownership: Ownership::Manual,
                instantiable: true,
                methods: Vec::new(),
                virtuals: Vec::new(),
                signals: Vec::new(),
            },
            ownership_set: false,
        }
    }

    /// Derive from `parent`. Ownership is inherited unless set explicitly.
    pub fn inherits(mut self, parent: impl Into<String>) -> Self {
        self.class.parent = Some(parent.into());
        self
    }

    pub fn ownership(mut self, ownership: Ownership) -> Self {
        self.class.ownership = ownership;
        self.ownership_set = true;
        self
    }

    pub fn ref_counted(self) -> Self {
        self.ownership(Ownership::RefCounted)
    }

    /// The class cannot be instantiated directly.
    pub fn abstract_class(mut self) -> Self {
        self.class.instantiable = false;
        self
    }

    pub fn method<F>(self, name: &str, params: &[VariantType], ret: VariantType, func: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> Result<(), NativeCallError> + Send + Sync + 'static,
    {
        self.method_with_flags(name, MethodSignature::new(params, ret), func)
    }

    pub fn static_method<F>(self, name: &str, params: &[VariantType], ret: VariantType, func: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> Result<(), NativeCallError> + Send + Sync + 'static,
    {
        self.method_with_flags(
            name,
            MethodSignature::new(params, ret).with_flags(MethodFlags::STATIC),
            func,
        )
    }

    pub fn method_with_flags<F>(mut self, name: &str, signature: MethodSignature, func: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> Result<(), NativeCallError> + Send + Sync + 'static,
    {
        self.class.methods.push(MethodDef {
            name: name.to_string(),
            signature,
            compatible: Vec::new(),
            func: Arc::new(func),
        });
        self
    }

    /// Accept wrappers generated against an older signature of `method`.
    pub fn compatible(mut self, method: &str, fingerprint: Fingerprint) -> Self {
        if let Some(def) = self.class.methods.iter_mut().find(|m| m.name == method) {
            def.compatible.push(fingerprint);
        }
        self
    }

    pub fn virtual_method(mut self, name: &str, params: &[VariantType], ret: VariantType) -> Self {
        self.class.virtuals.push(VirtualDef {
            info: VirtualMethodInfo::new(name, MethodSignature::new(params, ret).with_flags(MethodFlags::VIRTUAL)),
            default: None,
        });
        self
    }

    /// Native behavior of a virtual when no managed override runs.
    pub fn virtual_default<F>(mut self, name: &str, func: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> Result<(), NativeCallError> + Send + Sync + 'static,
    {
        if let Some(def) = self.class.virtuals.iter_mut().find(|v| v.info.name == name) {
            def.default = Some(Arc::new(func));
        }
        self
    }

    pub fn signal(mut self, name: &str, params: &[VariantType]) -> Self {
        self.class.signals.push(SignalInfo::new(name, params));
        self
    }

    /// Finish the class. The second value says whether ownership was set
    /// explicitly or should come from the parent.
    pub(crate) fn finish(self) -> (SandboxClass, bool) {
        (self.class, self.ownership_set)
    }
}
