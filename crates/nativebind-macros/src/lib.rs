//! nativebind Proc Macros
//!
//! # Macros
//!
//! - `#[script_class(base = "...")]` - Implement `ScriptClass` for a managed type
//! - `#[native_virtual]` - Mark a method as an override of a native virtual
//!
//! # Example
//!
//! ```ignore
//! use nativebind::script_class;
//!
//! #[derive(Default)]
//! struct Player {
//!     speed: f64,
//! }
//!
//! #[script_class(base = "Node2D")]
//! impl Player {
//!     #[native_virtual]
//!     fn _ready(&mut self) {
//!         self.speed = 4.0;
//!     }
//!
//!     #[native_virtual(name = "_process")]
//!     fn tick(&mut self, delta: f64) {
//!         let _ = self.speed * delta;
//!     }
//! }
//! ```

use proc_macro::TokenStream;

mod attrs;
mod script_class;

/// Implement `nativebind::ScriptClass` from an inherent impl block.
///
/// # Attributes
///
/// - `base = "..."` - Native class the type extends (required)
/// - `name = "..."` - Name the engine attaches the script by (default: type name)
///
/// Methods marked `#[native_virtual]` become the type's overrides. Their
/// parameters must implement `FromVariant` and their return type
/// `ToVariant`; the virtual's name defaults to the method name and can be
/// set with `#[native_virtual(name = "...")]`.
#[proc_macro_attribute]
pub fn script_class(attr: TokenStream, item: TokenStream) -> TokenStream {
    script_class::script_class_impl(attr, item)
}

/// Mark a method as an override of a native virtual.
///
/// Only meaningful inside a `#[script_class]` impl block, which consumes the
/// marker; on its own it leaves the item unchanged.
#[proc_macro_attribute]
pub fn native_virtual(_attr: TokenStream, item: TokenStream) -> TokenStream {
    item
}
