//! The two-pass export protocol shared by class and enum bindings.

use stackglue_core::{BindError, ExportContext, PublishedMeta, TypeCatalog, TypeCategory};
use stackglue_vm::{TableRef, Vm};

/// One bound type, exported into a namespace table in two passes.
///
/// Every binding of a scope runs [`publish_meta`](TypeBinding::publish_meta)
/// before any binding runs [`publish_other`](TypeBinding::publish_other), so
/// adapters built in the second pass can reference the metatable of any
/// class of the scope, whatever the declaration order.
pub trait TypeBinding {
    fn name(&self) -> &str;

    fn category(&self) -> TypeCategory;

    /// Pass 1: create and record runtime metadata.
    fn publish_meta(
        &self,
        vm: &mut Vm,
        namespace: TableRef,
        catalog: &TypeCatalog,
        published: &mut PublishedMeta,
    ) -> Result<(), BindError>;

    /// Pass 2: create everything that may refer to other types' metadata.
    fn publish_other(&self, vm: &mut Vm, namespace: TableRef, export: &ExportContext<'_>) -> Result<(), BindError>;
}
