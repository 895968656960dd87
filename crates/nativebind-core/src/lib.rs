//! Core types for the nativebind interop bridge.
//!
//! This crate provides the value model shared by every layer of the bridge:
//!
//! - [`Variant`] / [`VariantType`]: the tagged value that crosses the boundary
//! - [`ToVariant`] / [`FromVariant`]: marshaling between managed values and variants
//! - [`ObjectId`], [`RawHandle`], [`MethodHandle`]: opaque engine identifiers
//! - [`Fingerprint`] / [`MethodSignature`]: signature shapes and compatibility hashes
//! - [`BridgeError`] and its phase-specific errors

pub mod convert;
pub mod dictionary;
pub mod error;
pub mod fingerprint;
pub mod handle;
pub mod math;
pub mod signature;
pub mod variant;

pub use convert::{FromVariant, ToVariant, box_value, unbox};
pub use dictionary::Dictionary;
pub use error::{BridgeError, BridgeResult, MarshalError, NativeCallError};
pub use fingerprint::Fingerprint;
pub use handle::{MethodHandle, ObjectId, Ownership, RawHandle};
pub use math::{Color, Transform, Vector2, Vector3, Vector4};
pub use signature::{MethodFlags, MethodSignature, SignalInfo};
pub use variant::{Callable, Variant, VariantType};
