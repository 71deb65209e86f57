//! Scope building and export for `stackglue`.
//!
//! Types are declared on a [`ScopeBuilder`], which produces a
//! [`ScopeRegistry`]. Exporting the registry into a [`Vm`](stackglue_vm::Vm)
//! makes every class callable as a constructor and every enum available as a
//! table of values.
//!
//! ```
//! use stackglue_registry::ScopeRegistry;
//! use stackglue_vm::{Value, Vm};
//!
//! struct Greeter;
//!
//! let mut scope = ScopeRegistry::builder("demo");
//! scope
//!     .class::<Greeter>("Greeter")
//!     .constructor(|| Greeter)
//!     .method("answer", |_: &Greeter| 42)
//!     .build()
//!     .unwrap();
//! let mut registry = scope.finish().unwrap();
//!
//! let mut vm = Vm::new();
//! let demo = Value::Table(registry.export(&mut vm).unwrap());
//! let class = vm.get_field(&demo, "Greeter").unwrap();
//! let greeter = vm.call(&class, vec![]).unwrap().remove(0);
//! assert_eq!(vm.call_method(&greeter, "answer", vec![]).unwrap(), vec![Value::Integer(42)]);
//! ```

mod binding;
mod class;
mod enumeration;
mod error;
mod scope;

pub use binding::TypeBinding;
pub use class::ClassBuilder;
pub use enumeration::EnumBuilder;
pub use error::ScopeError;
pub use scope::{ScopeBuilder, ScopeRegistry};
