//! Call context handed to sandbox native methods.

use std::fmt;

use nativebind_core::{FromVariant, MarshalError, NativeCallError, RawHandle, ToVariant, Variant, unbox};

use super::heap::{NativeObject, ObjectHeap};

/// A signal emitted during a native call, fired once the call returns.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingEmit {
    pub signal: String,
    pub args: Vec<Variant>,
}

/// Context for one native method call.
///
/// Gives the method its receiver, arguments and the object heap, and
/// collects the return value and any signals to emit.
///
/// ```ignore
/// let name: String = ctx.arg(0)?;
/// ctx.this_mut()?.set("name", name);
/// ctx.emit("renamed", vec![]);
/// ```
pub struct CallContext<'a> {
    receiver: Option<RawHandle>,
    args: &'a [Variant],
    heap: &'a mut ObjectHeap,
    return_value: Variant,
    emits: Vec<PendingEmit>,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(receiver: Option<RawHandle>, args: &'a [Variant], heap: &'a mut ObjectHeap) -> Self {
        Self {
            receiver,
            args,
            heap,
            return_value: Variant::Nil,
            emits: Vec::new(),
        }
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    pub fn args(&self) -> &[Variant] {
        self.args
    }

    pub fn arg_slot(&self, index: usize) -> Result<&Variant, NativeCallError> {
        self.args.get(index).ok_or_else(|| NativeCallError::Raised {
            message: format!("argument {index} out of bounds ({} given)", self.args.len()),
        })
    }

    /// Get a typed argument value.
    pub fn arg<T: FromVariant>(&self, index: usize) -> Result<T, NativeCallError> {
        unbox(self.arg_slot(index)?).map_err(|source: MarshalError| NativeCallError::Argument { index, source })
    }

    pub fn set_return<T: ToVariant>(&mut self, value: T) {
        self.return_value = value.to_variant();
    }

    pub fn set_return_variant(&mut self, value: Variant) {
        self.return_value = value;
    }

    pub fn receiver(&self) -> Result<RawHandle, NativeCallError> {
        self.receiver.ok_or_else(|| NativeCallError::InvalidReceiver {
            reason: "method needs a receiver".into(),
        })
    }

    /// The receiver object.
    pub fn this(&self) -> Result<&NativeObject, NativeCallError> {
        let id = self.receiver()?.id;
        self.heap.get(id).ok_or(NativeCallError::DeadObject(id))
    }

    pub fn this_mut(&mut self) -> Result<&mut NativeObject, NativeCallError> {
        let id = self.receiver()?.id;
        self.heap.get_mut(id).ok_or(NativeCallError::DeadObject(id))
    }

    pub fn heap(&self) -> &ObjectHeap {
        self.heap
    }

    pub fn heap_mut(&mut self) -> &mut ObjectHeap {
        self.heap
    }

    /// Emit `signal` on the receiver after the call returns.
    pub fn emit(&mut self, signal: impl Into<String>, args: Vec<Variant>) {
        self.emits.push(PendingEmit {
            signal: signal.into(),
            args,
        });
    }

    pub(crate) fn finish(self) -> (Variant, Vec<PendingEmit>) {
        (self.return_value, self.emits)
    }
}

impl fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("receiver", &self.receiver)
            .field("arg_count", &self.arg_count())
            .field("pending_emits", &self.emits.len())
            .finish()
    }
}
