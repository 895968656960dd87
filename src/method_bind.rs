//! Per-call-site method bindings.
//!
//! Generated accessors declare one `static` [`MethodBind`] per native method.
//! The first call resolves the method through the bridge's binding cache and
//! keeps the handle; later calls on the same bridge skip the cache entirely.
//!
//! ```ignore
//! static SET_NAME: MethodBind =
//!     MethodBind::new("Node", "set_name", &[VariantType::String], VariantType::Nil);
//!
//! SET_NAME.call_as::<(), _>(&bridge, Some(&node), ("player",))?;
//! ```

use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;

use nativebind_core::{
    BridgeError, BridgeResult, Fingerprint, FromVariant, MarshalError, MethodFlags, MethodHandle, MethodSignature,
    ToVariant, Variant, VariantType, unbox,
};

use crate::{Bridge, Wrapper};

/// A statically declared native method.
pub struct MethodBind {
    class: &'static str,
    method: &'static str,
    params: &'static [VariantType],
    ret: VariantType,
    flags: MethodFlags,
    /// Values for the trailing parameters, in parameter order.
    defaults: &'static [fn() -> Variant],
    fingerprint: OnceLock<Fingerprint>,
    /// Bridge id and handle of the first resolution.
    resolved: OnceLock<(u64, MethodHandle)>,
}

impl MethodBind {
    pub const fn new(
        class: &'static str,
        method: &'static str,
        params: &'static [VariantType],
        ret: VariantType,
    ) -> Self {
        Self {
            class,
            method,
            params,
            ret,
            flags: MethodFlags::empty(),
            defaults: &[],
            fingerprint: OnceLock::new(),
            resolved: OnceLock::new(),
        }
    }

    pub const fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Supply defaults for the last `defaults.len()` parameters.
    pub const fn with_defaults(mut self, defaults: &'static [fn() -> Variant]) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn class(&self) -> &'static str {
        self.class
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn signature(&self) -> MethodSignature {
        MethodSignature::new(self.params, self.ret).with_flags(self.flags)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        *self
            .fingerprint
            .get_or_init(|| Fingerprint::from_shapes(self.params, self.ret, self.flags))
    }

    /// Resolve the method on `bridge`.
    pub fn handle(&self, bridge: &Bridge) -> BridgeResult<MethodHandle> {
        if let Some((owner, handle)) = self.resolved.get()
            && *owner == bridge.id()
        {
            return Ok(*handle);
        }
        let handle = bridge
            .bindings()
            .resolve(bridge.engine(), self.class, self.method, self.fingerprint())?;
        let _ = self.resolved.set((bridge.id(), handle));
        Ok(handle)
    }

    /// Call with boxed arguments, filling in trailing defaults.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(&self, bridge: &Bridge, receiver: Option<&Wrapper>, args: &[Variant]) -> BridgeResult<Variant> {
        bridge.ensure_main_thread("call")?;
        let raw = receiver.map(Wrapper::raw).transpose()?;
        let args = self.complete_args(args)?;
        for (index, (param, arg)) in self.params.iter().zip(args.iter()).enumerate() {
            if !param.accepts(arg.get_type()) {
                return Err(MarshalError::TypeMismatch {
                    expected: param.name(),
                    actual: arg.type_name(),
                }
                .at_argument(index)
                .into());
            }
        }
        let handle = self.handle(bridge)?;
        bridge.call_resolved(handle, raw, &args)
    }

    /// Call with a tuple of managed values and unbox the result.
    pub fn call_as<R: FromVariant, A: ToArgs>(
        &self,
        bridge: &Bridge,
        receiver: Option<&Wrapper>,
        args: A,
    ) -> BridgeResult<R> {
        let result = self.call(bridge, receiver, &args.to_args())?;
        Ok(unbox(&result)?)
    }

    fn complete_args<'a>(&self, args: &'a [Variant]) -> BridgeResult<Cow<'a, [Variant]>> {
        let arity = self.params.len();
        let vararg = self.flags.contains(MethodFlags::VARARG);
        if args.len() >= arity {
            if args.len() > arity && !vararg {
                return Err(self.arity_error(args.len()));
            }
            return Ok(Cow::Borrowed(args));
        }
        let missing = arity - args.len();
        if missing > self.defaults.len() {
            return Err(self.arity_error(args.len()));
        }
        let mut full = Vec::with_capacity(arity);
        full.extend_from_slice(args);
        full.extend(self.defaults[self.defaults.len() - missing..].iter().map(|default| default()));
        Ok(Cow::Owned(full))
    }

    fn arity_error(&self, got: usize) -> BridgeError {
        BridgeError::ArityMismatch {
            target: format!("{}::{}", self.class, self.method),
            expected: self.params.len(),
            got,
        }
    }
}

impl fmt::Debug for MethodBind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodBind")
            .field("class", &self.class)
            .field("method", &self.method)
            .field("params", &self.params)
            .field("ret", &self.ret)
            .field("defaults", &self.defaults.len())
            .field("resolved", &self.resolved.get().map(|(_, h)| *h))
            .finish()
    }
}

/// Argument tuples for [`MethodBind::call_as`].
pub trait ToArgs {
    fn to_args(&self) -> Vec<Variant>;
}

macro_rules! impl_to_args {
    ($($arg:ident),*) => {
        impl<$($arg: ToVariant,)*> ToArgs for ($($arg,)*) {
            #[allow(non_snake_case)]
            fn to_args(&self) -> Vec<Variant> {
                let ($($arg,)*) = self;
                vec![$($arg.to_variant()),*]
            }
        }
    };
}

impl_to_args!();
impl_to_args!(A);
impl_to_args!(A, B);
impl_to_args!(A, B, C);
impl_to_args!(A, B, C, D);
impl_to_args!(A, B, C, D, E);
impl_to_args!(A, B, C, D, E, F);

impl ToArgs for [Variant] {
    fn to_args(&self) -> Vec<Variant> {
        self.to_vec()
    }
}

impl<T: ToArgs + ?Sized> ToArgs for &T {
    fn to_args(&self) -> Vec<Variant> {
        (**self).to_args()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static ROTATE: MethodBind = MethodBind::new("Node2D", "rotate", &[VariantType::Float], VariantType::Nil);

    fn half_turn() -> Variant {
        Variant::Float(0.5)
    }

    static SET_PROCESS: MethodBind = MethodBind::new(
        "Node",
        "set_process",
        &[VariantType::Bool, VariantType::Float],
        VariantType::Nil,
    )
    .with_defaults(&[half_turn as fn() -> Variant]);

    #[test]
    fn fingerprint_matches_signature() {
        assert_eq!(ROTATE.fingerprint(), ROTATE.signature().fingerprint());
    }

    #[test]
    fn defaults_fill_trailing_params() {
        let args = [Variant::Bool(true)];
        let full = SET_PROCESS.complete_args(&args).unwrap();
        assert_eq!(&*full, &[Variant::Bool(true), Variant::Float(0.5)]);
    }

    #[test]
    fn too_few_without_defaults_is_arity_error() {
        let err = ROTATE.complete_args(&[]).unwrap_err();
        assert_eq!(
            err,
            BridgeError::ArityMismatch {
                target: "Node2D::rotate".into(),
                expected: 1,
                got: 0,
            }
        );
    }

    #[test]
    fn too_many_is_arity_error() {
        assert!(ROTATE.complete_args(&[Variant::Float(1.0), Variant::Nil]).is_err());
    }

    #[test]
    fn tuples_box_in_order() {
        let args = (1i32, "two", 3.0f64).to_args();
        assert_eq!(args, vec![Variant::Int(1), Variant::from("two"), Variant::Float(3.0)]);
        assert!(().to_args().is_empty());
    }
}
