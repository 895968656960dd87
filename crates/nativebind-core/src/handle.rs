//! Opaque identifiers issued by the native engine.

use std::fmt;
use std::num::{NonZeroU32, NonZeroU64, NonZeroUsize};

/// Identifier of a native object.
///
/// An index into the engine's object table plus a generation counter. A slot
/// reused after its object died gets a new generation, so a stale id never
/// aliases a live object. The packed form is never zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    index: u32,
    generation: NonZeroU32,
}

impl ObjectId {
    pub const fn new(index: u32, generation: NonZeroU32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(self) -> NonZeroU32 {
        self.generation
    }

    /// Pack into a single non-zero `u64` (generation in the high half).
    pub const fn to_bits(self) -> NonZeroU64 {
        let bits = ((self.generation.get() as u64) << 32) | self.index as u64;
        match NonZeroU64::new(bits) {
            Some(bits) => bits,
            // generation is non-zero, so the high half is too
            None => unreachable!(),
        }
    }

    /// Unpack from [`to_bits`](Self::to_bits). Returns `None` for a zero generation.
    pub const fn from_bits(bits: u64) -> Option<Self> {
        match NonZeroU32::new((bits >> 32) as u32) {
            Some(generation) => Some(Self {
                index: bits as u32,
                generation,
            }),
            None => None,
        }
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// How the lifetime of a native object is governed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// Freed by the engine when its reference count reaches zero.
    RefCounted,
    /// Freed only by an explicit `free`.
    Manual,
}

/// Object id plus ownership model: the form an object takes inside a `Variant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle {
    pub id: ObjectId,
    pub ownership: Ownership,
}

impl RawHandle {
    pub const fn new(id: ObjectId, ownership: Ownership) -> Self {
        Self { id, ownership }
    }

    pub const fn ref_counted(id: ObjectId) -> Self {
        Self::new(id, Ownership::RefCounted)
    }

    pub const fn manual(id: ObjectId) -> Self {
        Self::new(id, Ownership::Manual)
    }

    pub const fn is_ref_counted(&self) -> bool {
        matches!(self.ownership, Ownership::RefCounted)
    }
}

/// Opaque token for a resolved native method entry point.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct MethodHandle(NonZeroUsize);

impl MethodHandle {
    pub const fn new(raw: NonZeroUsize) -> Self {
        Self(raw)
    }

    /// Build from a raw value, returning `None` for zero.
    pub const fn from_raw(raw: usize) -> Option<Self> {
        match NonZeroUsize::new(raw) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    #[inline]
    pub const fn get(self) -> usize {
        self.0.get()
    }
}

impl fmt::Debug for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodHandle({:#x})", self.0)
    }
}
