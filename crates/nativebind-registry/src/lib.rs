//! Binding registry for nativebind.
//!
//! This crate holds the two process-lifetime caches of the bridge:
//!
//! - [`BindingCache`]: `(class, method, fingerprint)` to [`MethodHandle`](nativebind_core::MethodHandle),
//!   resolved lazily through a [`MethodTable`]
//! - [`OverrideRegistry`]: managed type to [`OverrideTable`], a bitset over the
//!   native class's [`VirtualSet`]
//!
//! Both are append-only and safe for concurrent first use.

mod binding_cache;
mod method_table;
mod override_table;
mod virtuals;

pub use binding_cache::{BindingCache, ClassDescriptor};
pub use method_table::{MethodTable, NativeMethodInfo, VirtualMethodInfo};
pub use override_table::{OverrideRegistry, OverrideTable};
pub use virtuals::{VirtualSet, VirtualSlot};
