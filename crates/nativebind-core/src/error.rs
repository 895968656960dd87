//! Error types for the interop bridge.
//!
//! ## Error Hierarchy
//!
//! ```text
//! BridgeError (top-level wrapper)
//! ├── MarshalError     - Variant <-> managed value conversion failures
//! ├── NativeCallError  - Failures reported by the native engine during a call
//! └── binding, dispatch, signal and lifetime variants
//! ```
//!
//! Inbound operations (managed code calling into the engine) return these
//! errors. Outbound operations (the engine calling into managed code) never
//! propagate them across the boundary; they are reported on the diagnostics
//! channel instead.

use thiserror::Error;

use crate::{Fingerprint, ObjectId};

// ============================================================================
// Marshal Errors
// ============================================================================

/// Errors converting between a [`Variant`](crate::Variant) and a managed value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarshalError {
    /// The variant holds a different type than expected.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// An integer does not fit in the target width.
    #[error("integer overflow: {value} doesn't fit in {target_type}")]
    IntegerOverflow {
        value: i64,
        target_type: &'static str,
    },

    /// A float is outside the target type's range.
    #[error("float {value} out of range for {target_type}")]
    FloatConversion {
        value: f64,
        target_type: &'static str,
    },

    /// An array element failed to convert.
    #[error("array element {index}: {source}")]
    Element {
        index: usize,
        source: Box<MarshalError>,
    },

    /// A positional argument failed to convert.
    #[error("argument {index}: {source}")]
    Argument {
        index: usize,
        source: Box<MarshalError>,
    },

    /// A packed object id had a zero generation.
    #[error("invalid object id {bits:#x}")]
    InvalidObjectId { bits: u64 },
}

impl MarshalError {
    /// Wrap this error as the failure of element `index` of an array.
    pub fn at_element(self, index: usize) -> Self {
        MarshalError::Element {
            index,
            source: Box::new(self),
        }
    }

    /// Wrap this error as the failure of positional argument `index`.
    pub fn at_argument(self, index: usize) -> Self {
        MarshalError::Argument {
            index,
            source: Box::new(self),
        }
    }
}

// ============================================================================
// Native Call Errors
// ============================================================================

/// Errors raised by the native engine while executing a call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NativeCallError {
    /// The native method reported a failure.
    #[error("native method raised: {message}")]
    Raised { message: String },

    /// The call needs a receiver and none (or the wrong kind) was passed.
    #[error("invalid receiver: {reason}")]
    InvalidReceiver { reason: String },

    /// The receiver is no longer alive.
    #[error("object {0} is not alive")]
    DeadObject(ObjectId),

    /// Wrong number of arguments.
    #[error("{method} expects {expected} argument(s), got {got}")]
    ArgumentCount {
        method: String,
        expected: usize,
        got: usize,
    },

    /// An argument has the wrong shape.
    #[error("argument {index}: {source}")]
    Argument { index: usize, source: MarshalError },

    /// The method token does not name a known method.
    #[error("invalid method handle {0:#x}")]
    InvalidHandle(usize),

    /// No class with this name.
    #[error("unknown class '{0}'")]
    UnknownClass(String),

    /// The class cannot be instantiated directly.
    #[error("class '{0}' cannot be instantiated")]
    NotInstantiable(String),

    /// The operation requires the other ownership model.
    #[error("{operation} is not allowed on object {id}")]
    OwnershipViolation { id: ObjectId, operation: &'static str },
}

// ============================================================================
// Unified Bridge Error
// ============================================================================

/// Top-level error for bridge operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// The wrapper was generated against a signature the engine no longer exposes.
    #[error("binding mismatch for {class}::{method}: wrapper expects {expected}, engine exposes {found}")]
    BindingMismatch {
        class: String,
        method: String,
        expected: Fingerprint,
        found: Fingerprint,
    },

    /// A value failed to convert.
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// The name is not a virtual method of the native class.
    #[error("'{method}' is not a virtual method of {class}")]
    UnknownVirtual { class: String, method: String },

    /// Argument count disagrees with the declared parameter count.
    #[error("{target} expects {expected} argument(s), got {got}")]
    ArityMismatch {
        target: String,
        expected: usize,
        got: usize,
    },

    /// The object was released or freed; the handle must not be used again.
    #[error("use after release: object {id} is no longer alive")]
    UseAfterRelease { id: ObjectId },

    #[error("unknown native class '{class}'")]
    UnknownClass { class: String },

    #[error("unknown native method {class}::{method}")]
    UnknownMethod { class: String, method: String },

    #[error("unknown signal '{signal}' on {class}")]
    UnknownSignal { class: String, signal: String },

    /// The wrapper has no native object yet.
    #[error("wrapper for {class} has not been constructed")]
    Unconstructed { class: String },

    /// A main-thread-only entry point was called from another thread.
    #[error("{operation} must run on the main thread")]
    WrongThread { operation: &'static str },

    /// The managed instance is already borrowed by a running call.
    #[error("managed instance of object {id} is already in use")]
    InstanceBusy { id: ObjectId },

    #[error("connection {id} not found")]
    ConnectionNotFound { id: u64 },

    /// The DEFERRED signal queue is at capacity.
    #[error("deferred signal queue is full ({capacity} pending)")]
    DeferredQueueFull { capacity: usize },

    /// No managed script registered under this name.
    #[error("no script registered as '{name}'")]
    UnknownScript { name: String },

    /// The script's base class is not an ancestor of the object's class.
    #[error("script base {base} is not compatible with {class}")]
    IncompatibleScript { base: String, class: String },

    /// A failure inside the engine.
    #[error(transparent)]
    NativeCall(#[from] NativeCallError),
}

impl BridgeError {
    /// Check if this is a marshaling error.
    pub fn is_marshal(&self) -> bool {
        matches!(self, BridgeError::Marshal(_))
    }

    /// Check if this is a use-after-release error.
    pub fn is_use_after_release(&self) -> bool {
        matches!(self, BridgeError::UseAfterRelease { .. })
    }

    /// Check if this error was raised by the engine.
    pub fn is_native(&self) -> bool {
        matches!(self, BridgeError::NativeCall(_))
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marshal_converts_into_bridge_error() {
        let err: BridgeError = MarshalError::TypeMismatch {
            expected: "int",
            actual: "String",
        }
        .into();
        assert!(err.is_marshal());
        assert_eq!(err.to_string(), "type mismatch: expected int, got String");
    }

    #[test]
    fn element_error_names_index() {
        let err = MarshalError::TypeMismatch {
            expected: "int",
            actual: "bool",
        }
        .at_element(3);
        assert_eq!(err.to_string(), "array element 3: type mismatch: expected int, got bool");
    }

    #[test]
    fn binding_mismatch_display() {
        let err = BridgeError::BindingMismatch {
            class: "Node".into(),
            method: "set_name".into(),
            expected: Fingerprint(1),
            found: Fingerprint(2),
        };
        assert_eq!(
            err.to_string(),
            "binding mismatch for Node::set_name: wrapper expects 0x0000000000000001, engine exposes 0x0000000000000002"
        );
    }

    #[test]
    fn native_call_is_transparent() {
        let err: BridgeError = NativeCallError::UnknownClass("Foo".into()).into();
        assert!(err.is_native());
        assert_eq!(err.to_string(), "unknown class 'Foo'");
    }
}
