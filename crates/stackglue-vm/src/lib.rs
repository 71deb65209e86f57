//! A small embeddable scripting runtime.
//!
//! `stackglue-vm` provides the host side that native bindings talk to: a
//! dynamically-typed value model, tables with metatables, opaque userdata,
//! native closures with upvalues, a registry of persistent handles, and a
//! mark-and-sweep collector that runs `__gc` finalizers.
//!
//! There is no script front end; programs are driven through [`Vm::call`],
//! [`Vm::call_method`] and the table accessors.
//!
//! ```
//! use stackglue_vm::{Value, Vm};
//!
//! let mut vm = Vm::new();
//! let double = vm.create_function(
//!     "double",
//!     |vm: &mut Vm| {
//!         let Value::Integer(n) = vm.get(1) else { return Ok(0) };
//!         vm.push(n * 2);
//!         Ok(1)
//!     },
//!     vec![],
//! );
//! let results = vm.call(&Value::Function(double), vec![Value::Integer(21)]).unwrap();
//! assert_eq!(results, vec![Value::Integer(42)]);
//! ```

mod arena;
mod error;
mod gc;
mod object;
mod options;
mod value;
mod vm;

pub use arena::{Arena, Handle};
pub use error::VmError;
pub use gc::GcStats;
pub use object::{Closure, NativeFunction, Table, Userdata};
pub use options::VmOptions;
pub use value::{FunctionRef, Key, TableRef, UserdataRef, Value, integral};
pub use vm::{HeapStats, RegistryKey, Vm};
