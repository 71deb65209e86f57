//! Typed marshalling between native Rust values and `stackglue-vm`.
//!
//! This crate holds the per-call machinery of a binding layer:
//!
//! - [`TypeCatalog`]: the types bound in one scope, their dense indices and
//!   the set of classes each class parameter admits
//! - [`Envelope`]: the userdata payload every bound value travels in
//! - [`FromStack`] / [`IntoStack`]: conversion of parameters and results
//! - [`Method`] / [`Constructor`]: adapters turning plain closures into
//!   runtime functions that check arity, instance and argument types
//!
//! Scope building and export live in `stackglue-registry`.

mod adapter;
mod catalog;
mod class;
mod envelope;
mod enumeration;
mod error;
mod export;
mod ids;
mod instance;
mod marshal;

pub use adapter::{
    ClassSite, ConstructFn, Constructor, ConstructorExporter, Exclusive, Factory, Fallible, HeapFactory,
    Infallible, Method, MethodExporter, Params, Shared, Trampoline, constructor_trampoline, erase_destroy,
    export_constructor, export_method,
};
pub use catalog::{AdmissionSet, CatalogBuilder, TypeCatalog, TypeCategory, TypeEntry, TypeFlags};
pub use class::{ClassReturn, ClassTarget, Ptr};
pub use envelope::{Envelope, Payload, finalizer};
pub use enumeration::{BoundEnum, EnumTarget};
pub use error::{AccessError, BindError, CallError, Callable, ConversionError};
pub use export::{ExportContext, PublishedClass, PublishedMeta};
pub use ids::{MetatableSlot, ScopeId, TypeIdx};
pub use instance::{ClassRef, Destroy, Instance, Upcast, UpcastPath, upcast};
pub use marshal::{FromStack, IntoStack, ValueCategory};
