//! Typed bindings between native Rust types and an embedded scripting
//! runtime.
//!
//! `stackglue` exposes Rust classes, their constructors and methods, and
//! fieldless enums to scripts running on [`vm::Vm`]. Each bound method gets a
//! generated adapter that checks the number of arguments, verifies the
//! instance it is called on really is an instance of the class (or of a
//! class declared as extending it), and converts every argument and result.
//!
//! # Example
//!
//! ```
//! use stackglue::prelude::*;
//!
//! struct Counter {
//!     hits: i64,
//! }
//!
//! #[derive(Clone, Copy, Debug, PartialEq, Enum)]
//! enum Mode {
//!     Slow,
//!     Fast,
//! }
//!
//! let mut scope = ScopeRegistry::builder("demo");
//! scope
//!     .class::<Counter>("Counter")
//!     .constructor(|| Counter { hits: 0 })
//!     .method("hit", |this: &mut Counter, mode: Mode| {
//!         this.hits += if mode == Mode::Fast { 2 } else { 1 };
//!         this.hits
//!     })
//!     .build()?;
//! scope
//!     .enumeration::<Mode>("Mode")
//!     .value("SLOW", Mode::Slow)
//!     .value("FAST", Mode::Fast)
//!     .build()?;
//! let mut registry = scope.finish()?;
//!
//! let mut vm = Vm::new();
//! let demo = Value::Table(registry.export(&mut vm)?);
//! let class = vm.get_field(&demo, "Counter")?;
//! let modes = vm.get_field(&demo, "Mode")?;
//! let fast = vm.get_field(&modes, "FAST")?;
//!
//! let counter = vm.call(&class, vec![])?.remove(0);
//! let hits = vm.call_method(&counter, "hit", vec![fast])?;
//! assert_eq!(hits, vec![Value::Integer(2)]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Derive restrictions
//!
//! Bound enums are fieldless:
//!
//! ```compile_fail
//! #[derive(stackglue::Enum)]
//! enum Shape {
//!     Circle(f64),
//! }
//! ```
//!
//! and have at least one variant:
//!
//! ```compile_fail
//! #[derive(stackglue::Enum)]
//! enum Never {}
//! ```
//!
//! Classes cannot be unions:
//!
//! ```compile_fail
//! #[derive(stackglue::Class)]
//! union Bits {
//!     i: i64,
//!     f: f64,
//! }
//! ```

extern crate self as stackglue;

pub use stackglue_vm as vm;

pub use stackglue_core::*;
pub use stackglue_macros::{Class, Enum};
pub use stackglue_registry::*;

/// The types needed to declare, export and drive a scope.
pub mod prelude {
    pub use crate::vm::{Value, Vm, VmError};
    pub use crate::{
        BindError, BoundEnum, CallError, Class, ClassBuilder, ConversionError, Enum, EnumBuilder, Factory,
        HeapFactory, Ptr, ScopeBuilder, ScopeError, ScopeRegistry,
    };
}
