//! Deterministic signature fingerprints.
//!
//! A [`Fingerprint`] is a 64-bit compatibility hash computed over the shape of a
//! native method: its parameter types, its return type and its call flags. Wrappers
//! carry the fingerprint they were generated against; the running engine reports
//! the fingerprint of the method it actually exposes. Binding refuses to proceed
//! when the two disagree, so a wrapper can never invoke an entry point whose ABI
//! drifted underneath it.
//!
//! # Hash Computation
//!
//! Uses XXHash64 over the shape names with domain-specific mixing constants.
//! Parameter order matters: each position is mixed with its own marker and the
//! running hash is combined with a non-commutative multiply-add.
//!
//! ```
//! use nativebind_core::{Fingerprint, MethodFlags, VariantType};
//!
//! let a = Fingerprint::from_shapes(&[VariantType::Int, VariantType::Float], VariantType::Nil, MethodFlags::empty());
//! let b = Fingerprint::from_shapes(&[VariantType::Float, VariantType::Int], VariantType::Nil, MethodFlags::empty());
//! assert_ne!(a, b);
//! ```

use std::fmt;
use xxhash_rust::xxh64::xxh64;

use crate::{MethodFlags, VariantType};

/// Domain-specific mixing constants for fingerprint computation.
pub mod hash_constants {
    /// Separator constant used when folding components into the running hash.
    pub const SEP: u64 = 0x4bc94d6bd06053ad;

    /// Domain marker for method signatures.
    pub const SIGNATURE: u64 = 0x5ea77ffbcdf5f302;

    /// Domain marker for the return shape.
    pub const RETURN: u64 = 0x7d3c8b4a92e15f6d;

    /// Domain marker for call flags.
    pub const FLAGS: u64 = 0x3e9f5d2a8c7b1403;

    /// Parameter position mixing constants.
    pub const PARAM_MARKERS: [u64; 16] = [
        0x9e3779b97f4a7c15,
        0xbf58476d1ce4e5b9,
        0x94d049bb133111eb,
        0xd6e8feb86659fd93,
        0xe7037ed1a0b428db,
        0xc6a4a7935bd1e995,
        0x8648dbbc94d49b8d,
        0xa2b48b2c69e0d657,
        0x7c3e9f2a5b8d1403,
        0x5d8c7b4a3e9f2106,
        0x3f1e9d8c7b5a4203,
        0x1a2b3c4d5e6f7089,
        0x9f8e7d6c5b4a3210,
        0x2468ace013579bdf,
        0xfdb97531eca86420,
        0x123456789abcdef0,
    ];
}

/// A deterministic 64-bit compatibility hash over a method signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// Empty/invalid fingerprint.
    pub const EMPTY: Fingerprint = Fingerprint(0);

    /// Compute the fingerprint of a signature shape.
    ///
    /// The same shapes always produce the same fingerprint, independent of the
    /// class or method name the signature belongs to.
    pub fn from_shapes(params: &[VariantType], ret: VariantType, flags: MethodFlags) -> Self {
        let mut hash = hash_constants::SIGNATURE ^ (flags.bits() as u64).wrapping_mul(hash_constants::FLAGS);
        for (i, param) in params.iter().enumerate() {
            let marker = hash_constants::PARAM_MARKERS
                .get(i)
                .copied()
                .unwrap_or_else(|| hash_constants::PARAM_MARKERS[0].wrapping_add(i as u64));
            hash = hash.wrapping_mul(hash_constants::SEP).wrapping_add(marker ^ shape_hash(*param));
        }
        hash = hash
            .wrapping_mul(hash_constants::SEP)
            .wrapping_add(hash_constants::RETURN ^ shape_hash(ret));
        Fingerprint(hash)
    }

    /// Check if this is the empty fingerprint.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Get the underlying u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Shapes hash by name so renumbering the wire tags never changes a fingerprint.
#[inline]
fn shape_hash(ty: VariantType) -> u64 {
    xxh64(ty.name().as_bytes(), 0)
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:#018x})", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(params: &[VariantType], ret: VariantType) -> Fingerprint {
        Fingerprint::from_shapes(params, ret, MethodFlags::empty())
    }

    #[test]
    fn deterministic() {
        let a = fp(&[VariantType::String], VariantType::Nil);
        let b = fp(&[VariantType::String], VariantType::Nil);
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn parameter_order_matters() {
        let a = fp(&[VariantType::Int, VariantType::String], VariantType::Nil);
        let b = fp(&[VariantType::String, VariantType::Int], VariantType::Nil);
        assert_ne!(a, b);
    }

    #[test]
    fn return_shape_matters() {
        let a = fp(&[], VariantType::Int);
        let b = fp(&[], VariantType::Float);
        assert_ne!(a, b);
    }

    #[test]
    fn flags_matter() {
        let plain = Fingerprint::from_shapes(&[], VariantType::String, MethodFlags::empty());
        let konst = Fingerprint::from_shapes(&[], VariantType::String, MethodFlags::CONST);
        assert_ne!(plain, konst);
    }

    #[test]
    fn arity_matters() {
        let a = fp(&[VariantType::Int], VariantType::Nil);
        let b = fp(&[VariantType::Int, VariantType::Int], VariantType::Nil);
        assert_ne!(a, b);
    }

    #[test]
    fn long_parameter_lists_use_fallback_markers() {
        let params = vec![VariantType::Int; 20];
        let mut longer = params.clone();
        longer.push(VariantType::Int);
        assert_ne!(fp(&params, VariantType::Nil), fp(&longer, VariantType::Nil));
    }

    #[test]
    fn display_format() {
        let f = Fingerprint(0x1234);
        assert_eq!(format!("{}", f), "0x0000000000001234");
        assert_eq!(format!("{:?}", f), "Fingerprint(0x0000000000001234)");
    }
}
