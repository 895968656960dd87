//! Method and signal signatures.

use bitflags::bitflags;

use crate::{Fingerprint, MarshalError, Variant, VariantType};

bitflags! {
    /// Call flags that take part in a method's fingerprint.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u32 {
        /// Method does not mutate its receiver.
        const CONST = 1 << 0;
        /// Method is an overridable virtual.
        const VIRTUAL = 1 << 1;
        /// Method accepts extra trailing arguments.
        const VARARG = 1 << 2;
        /// Method has no receiver.
        const STATIC = 1 << 3;
    }
}

/// The argument and return shapes of a native method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Parameter shapes, in order.
    pub params: Vec<VariantType>,
    /// Return shape (`Nil` for no return value).
    pub ret: VariantType,
    /// Call flags.
    pub flags: MethodFlags,
}

impl MethodSignature {
    /// Create a signature with no flags.
    pub fn new(params: impl Into<Vec<VariantType>>, ret: VariantType) -> Self {
        Self {
            params: params.into(),
            ret,
            flags: MethodFlags::empty(),
        }
    }

    /// Create a signature taking no arguments and returning nothing.
    pub fn void() -> Self {
        Self::new(Vec::new(), VariantType::Nil)
    }

    /// Replace the flags.
    pub fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Number of declared parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Whether extra trailing arguments are accepted.
    pub fn is_vararg(&self) -> bool {
        self.flags.contains(MethodFlags::VARARG)
    }

    /// Compute the compatibility fingerprint for this signature.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_shapes(&self.params, self.ret, self.flags)
    }

    /// Check the shapes of an argument list against the declared parameters.
    ///
    /// The count is not checked here; callers report arity separately.
    pub fn check_args(&self, args: &[Variant]) -> Result<(), (usize, MarshalError)> {
        for (index, (param, arg)) in self.params.iter().zip(args).enumerate() {
            if !param.accepts(arg.get_type()) {
                return Err((
                    index,
                    MarshalError::TypeMismatch {
                        expected: param.name(),
                        actual: arg.type_name(),
                    },
                ));
            }
        }
        Ok(())
    }
}

/// Declared shape of a native signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalInfo {
    /// Signal name.
    pub name: String,
    /// Positional argument shapes.
    pub params: Vec<VariantType>,
}

impl SignalInfo {
    /// Create a signal declaration.
    pub fn new(name: impl Into<String>, params: impl Into<Vec<VariantType>>) -> Self {
        Self {
            name: name.into(),
            params: params.into(),
        }
    }

    /// Number of positional arguments.
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_follows_shape() {
        let a = MethodSignature::new(vec![VariantType::String], VariantType::Nil);
        let b = MethodSignature::new(vec![VariantType::String], VariantType::Nil);
        let c = MethodSignature::new(vec![VariantType::Int], VariantType::Nil);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn check_args_reports_first_bad_index() {
        let sig = MethodSignature::new(vec![VariantType::Int, VariantType::String], VariantType::Nil);
        assert!(sig.check_args(&[Variant::Int(1), Variant::from("a")]).is_ok());

        let (index, err) = sig
            .check_args(&[Variant::Int(1), Variant::Bool(false)])
            .unwrap_err();
        assert_eq!(index, 1);
        assert_eq!(
            err,
            MarshalError::TypeMismatch {
                expected: "String",
                actual: "bool"
            }
        );
    }

    #[test]
    fn any_parameter_accepts_everything() {
        let sig = MethodSignature::new(vec![VariantType::Any], VariantType::Nil);
        assert!(sig.check_args(&[Variant::Nil]).is_ok());
        assert!(sig.check_args(&[Variant::Float(1.0)]).is_ok());
    }

    #[test]
    fn vararg_flag() {
        let sig = MethodSignature::void().with_flags(MethodFlags::VARARG);
        assert!(sig.is_vararg());
        assert_eq!(sig.arity(), 0);
    }
}
