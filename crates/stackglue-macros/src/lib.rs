//! Derive macros for `stackglue`.
//!
//! - `#[derive(Enum)]` - bind a fieldless enum
//! - `#[derive(Class)]` - return a bound class by value from methods
//!
//! Both only implement marshalling traits; the type still has to be
//! declared on a scope under the name scripts see.
//!
//! # Example
//!
//! ```ignore
//! use stackglue::{Class, Enum};
//!
//! #[derive(Clone, Copy, Enum)]
//! pub enum Color {
//!     Red,
//!     Green,
//! }
//!
//! #[derive(Class)]
//! pub struct Vec2 {
//!     x: f64,
//!     y: f64,
//! }
//! ```

use proc_macro::TokenStream;

mod derive_class;
mod derive_enum;

/// Implement `BoundEnum`, `FromStack` and `IntoStack` for a fieldless enum.
///
/// Variants map to their discriminants, so explicit discriminants are
/// preserved:
///
/// ```ignore
/// #[derive(Enum)]
/// enum Status {
///     Idle = 1,
///     Busy = 4,
/// }
/// ```
#[proc_macro_derive(Enum)]
pub fn derive_enum(input: TokenStream) -> TokenStream {
    derive_enum::derive_enum_impl(input)
}

/// Implement `IntoStack` for a bound class, moving the value into a new
/// instance owned by the script.
#[proc_macro_derive(Class)]
pub fn derive_class(input: TokenStream) -> TokenStream {
    derive_class::derive_class_impl(input)
}
