//! Conversion traits between managed values and [`Variant`].
//!
//! - [`FromVariant`]: Extract a Rust value from a [`Variant`]
//! - [`ToVariant`]: Box a Rust value into a [`Variant`]
//!
//! ## Supported Types
//!
//! - Integers: `i8`, `i16`, `i32`, `i64`, `u8`, `u16`, `u32`, `u64` (range-checked)
//! - Floats: `f32`, `f64`
//! - `bool`, `String` (`&str` boxes only), `()`
//! - Math: `Vector2`, `Vector3`, `Vector4`, `Transform`, `Color`
//! - Containers: `Vec<T>`, `Dictionary`, `Option<T>` (`None` is `Nil`; a
//!   `Some` of a value that boxes to `Nil` unboxes as `None`)
//! - Objects: `RawHandle`, `ObjectId`, `Callable`
//!
//! Boxing takes `&self`, so large values such as `Transform` are copied straight
//! from the caller's storage.
//!
//! ## Example
//!
//! ```
//! use nativebind_core::{box_value, unbox, Variant};
//!
//! let v = box_value(&42i32);
//! assert_eq!(v, Variant::Int(42));
//! let back: i32 = unbox(&v).unwrap();
//! assert_eq!(back, 42);
//! ```

use crate::{
    Callable, Color, Dictionary, MarshalError, ObjectId, RawHandle, Transform, Variant, VariantType, Vector2,
    Vector3, Vector4,
};

/// Extract a value from a [`Variant`].
pub trait FromVariant: Sized {
    /// Extract a value from the given variant.
    ///
    /// Returns a `MarshalError` if the variant holds an incompatible type.
    fn from_variant(variant: &Variant) -> Result<Self, MarshalError>;

    /// The variant shape this type unboxes from (`Any` if several are accepted).
    fn variant_type() -> VariantType {
        VariantType::Any
    }
}

/// Box a value into a [`Variant`].
pub trait ToVariant {
    fn to_variant(&self) -> Variant;
}

/// Box a value for transport across the boundary.
#[inline]
pub fn box_value<T: ToVariant + ?Sized>(value: &T) -> Variant {
    value.to_variant()
}

/// Unbox a value received from the boundary.
#[inline]
pub fn unbox<T: FromVariant>(variant: &Variant) -> Result<T, MarshalError> {
    T::from_variant(variant)
}

#[inline]
fn mismatch(expected: VariantType, actual: &Variant) -> MarshalError {
    MarshalError::TypeMismatch {
        expected: expected.name(),
        actual: actual.type_name(),
    }
}

impl<T: ToVariant + ?Sized> ToVariant for &T {
    fn to_variant(&self) -> Variant {
        (**self).to_variant()
    }
}

// ============================================================================
// Integer implementations
// ============================================================================

macro_rules! impl_variant_int {
    ($($ty:ty),*) => {
        $(
            impl FromVariant for $ty {
                fn from_variant(variant: &Variant) -> Result<Self, MarshalError> {
                    match variant {
                        Variant::Int(v) => <$ty>::try_from(*v).map_err(|_| MarshalError::IntegerOverflow {
                            value: *v,
                            target_type: stringify!($ty),
                        }),
                        _ => Err(mismatch(VariantType::Int, variant)),
                    }
                }

                fn variant_type() -> VariantType {
                    VariantType::Int
                }
            }

            impl ToVariant for $ty {
                fn to_variant(&self) -> Variant {
                    Variant::Int(*self as i64)
                }
            }
        )*
    };
}

impl_variant_int!(i8, i16, i32, i64, u8, u16, u32);

// u64 reinterprets the bits so the full range survives a round trip
impl FromVariant for u64 {
    fn from_variant(variant: &Variant) -> Result<Self, MarshalError> {
        match variant {
            Variant::Int(v) => Ok(*v as u64),
            _ => Err(mismatch(VariantType::Int, variant)),
        }
    }

    fn variant_type() -> VariantType {
        VariantType::Int
    }
}

impl ToVariant for u64 {
    fn to_variant(&self) -> Variant {
        Variant::Int(*self as i64)
    }
}

// ============================================================================
// Float implementations
// ============================================================================

impl FromVariant for f32 {
    fn from_variant(variant: &Variant) -> Result<Self, MarshalError> {
        match variant {
            Variant::Float(v) => {
                if !v.is_finite() || (*v <= f32::MAX as f64 && *v >= f32::MIN as f64) {
                    // infinities and NaN carry over unchanged
                    Ok(*v as f32)
                } else {
                    Err(MarshalError::FloatConversion {
                        value: *v,
                        target_type: "f32",
                    })
                }
            }
            Variant::Int(v) => Ok(*v as f32),
            _ => Err(mismatch(VariantType::Float, variant)),
        }
    }

    fn variant_type() -> VariantType {
        VariantType::Float
    }
}

impl ToVariant for f32 {
    fn to_variant(&self) -> Variant {
        Variant::Float(*self as f64)
    }
}

impl FromVariant for f64 {
    fn from_variant(variant: &Variant) -> Result<Self, MarshalError> {
        match variant {
            Variant::Float(v) => Ok(*v),
            Variant::Int(v) => Ok(*v as f64),
            _ => Err(mismatch(VariantType::Float, variant)),
        }
    }

    fn variant_type() -> VariantType {
        VariantType::Float
    }
}

impl ToVariant for f64 {
    fn to_variant(&self) -> Variant {
        Variant::Float(*self)
    }
}

// ============================================================================
// Plain value types
// ============================================================================

macro_rules! impl_variant_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromVariant for $ty {
                fn from_variant(variant: &Variant) -> Result<Self, MarshalError> {
                    match variant {
                        Variant::$variant(v) => Ok(v.clone()),
                        _ => Err(mismatch(VariantType::$variant, variant)),
                    }
                }

                fn variant_type() -> VariantType {
                    VariantType::$variant
                }
            }

            impl ToVariant for $ty {
                fn to_variant(&self) -> Variant {
                    Variant::$variant(self.clone())
                }
            }
        )*
    };
}

impl_variant_value!(
    bool => Bool,
    String => String,
    Vector2 => Vector2,
    Vector3 => Vector3,
    Vector4 => Vector4,
    Color => Color,
    Dictionary => Dictionary,
    Callable => Callable,
);

impl ToVariant for str {
    fn to_variant(&self) -> Variant {
        Variant::String(self.to_owned())
    }
}

impl FromVariant for Transform {
    fn from_variant(variant: &Variant) -> Result<Self, MarshalError> {
        variant
            .as_transform()
            .copied()
            .ok_or_else(|| mismatch(VariantType::Transform, variant))
    }

    fn variant_type() -> VariantType {
        VariantType::Transform
    }
}

impl ToVariant for Transform {
    fn to_variant(&self) -> Variant {
        Variant::Transform(Box::new(*self))
    }
}

// ============================================================================
// Objects
// ============================================================================

impl FromVariant for RawHandle {
    fn from_variant(variant: &Variant) -> Result<Self, MarshalError> {
        match variant {
            Variant::Object(h) => Ok(*h),
            _ => Err(mismatch(VariantType::Object, variant)),
        }
    }

    fn variant_type() -> VariantType {
        VariantType::Object
    }
}

impl ToVariant for RawHandle {
    fn to_variant(&self) -> Variant {
        Variant::Object(*self)
    }
}

/// Object ids travel as their packed integer form.
impl FromVariant for ObjectId {
    fn from_variant(variant: &Variant) -> Result<Self, MarshalError> {
        match variant {
            Variant::Int(bits) => {
                ObjectId::from_bits(*bits as u64).ok_or(MarshalError::InvalidObjectId { bits: *bits as u64 })
            }
            Variant::Object(h) => Ok(h.id),
            _ => Err(mismatch(VariantType::Int, variant)),
        }
    }
}

impl ToVariant for ObjectId {
    fn to_variant(&self) -> Variant {
        Variant::Int(self.to_bits().get() as i64)
    }
}

// ============================================================================
// Containers
// ============================================================================

impl<T: FromVariant> FromVariant for Vec<T> {
    fn from_variant(variant: &Variant) -> Result<Self, MarshalError> {
        match variant {
            Variant::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| T::from_variant(item).map_err(|e| e.at_element(i)))
                .collect(),
            _ => Err(mismatch(VariantType::Array, variant)),
        }
    }

    fn variant_type() -> VariantType {
        VariantType::Array
    }
}

impl<T: ToVariant> ToVariant for Vec<T> {
    fn to_variant(&self) -> Variant {
        self.as_slice().to_variant()
    }
}

impl<T: ToVariant> ToVariant for [T] {
    fn to_variant(&self) -> Variant {
        Variant::Array(self.iter().map(ToVariant::to_variant).collect())
    }
}

/// `Nil` always unboxes as `None`.
///
/// `Option` adds no tag of its own, so a `Some` whose value boxes to `Nil`
/// (`Some(())`, `Some(Variant::Nil)`, `Some(None)`) comes back as `None`.
/// Use a `T` that never boxes to `Nil` when the difference matters.
impl<T: FromVariant> FromVariant for Option<T> {
    fn from_variant(variant: &Variant) -> Result<Self, MarshalError> {
        match variant {
            Variant::Nil => Ok(None),
            other => T::from_variant(other).map(Some),
        }
    }

    fn variant_type() -> VariantType {
        T::variant_type()
    }
}

impl<T: ToVariant> ToVariant for Option<T> {
    fn to_variant(&self) -> Variant {
        match self {
            Some(v) => v.to_variant(),
            None => Variant::Nil,
        }
    }
}

impl FromVariant for Variant {
    fn from_variant(variant: &Variant) -> Result<Self, MarshalError> {
        Ok(variant.clone())
    }
}

impl ToVariant for Variant {
    fn to_variant(&self) -> Variant {
        self.clone()
    }
}

impl FromVariant for () {
    fn from_variant(variant: &Variant) -> Result<Self, MarshalError> {
        match variant {
            Variant::Nil => Ok(()),
            _ => Err(mismatch(VariantType::Nil, variant)),
        }
    }

    fn variant_type() -> VariantType {
        VariantType::Nil
    }
}

impl ToVariant for () {
    fn to_variant(&self) -> Variant {
        Variant::Nil
    }
}

// ============================================================================
// From impls for ergonomic construction
// ============================================================================

macro_rules! impl_from_for_variant {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Variant {
                fn from(value: $ty) -> Self {
                    value.to_variant()
                }
            }
        )*
    };
}

impl_from_for_variant!(
    bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String, &str, Vector2, Vector3, Vector4, Transform,
    Color, Dictionary, RawHandle, Callable
);

impl From<Vec<Variant>> for Variant {
    fn from(items: Vec<Variant>) -> Self {
        Variant::Array(items)
    }
}
