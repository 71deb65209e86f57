//! Scopes: the unit of binding and export.
//!
//! A scope collects class and enum declarations in order, then exports them
//! into one namespace table of a runtime. Instances created through one scope
//! are never accepted by another, even when both bind the same Rust type
//! under the same name.
//!
//! # Export
//!
//! Export runs two passes over the bindings, in declaration order:
//!
//! 1. every class creates its class table, method table and instance
//!    metatable, and records the latter two in [`PublishedMeta`]
//! 2. every binding materialises what may refer to other types: method
//!    adapters (which need the metatable of any class they return) and enum
//!    value tables
//!
//! The metatables and method tables are pinned in the runtime registry until
//! [`ScopeRegistry::teardown`], or until the next export of the same scope.

use stackglue_core::{
    BindError, BoundEnum, CatalogBuilder, ConversionError, Envelope, ExportContext, FromStack, IntoStack,
    PublishedMeta, ScopeId, TypeCatalog,
};
use stackglue_vm::{TableRef, Value, Vm};
use tracing::debug;

use crate::binding::TypeBinding;
use crate::class::ClassBuilder;
use crate::enumeration::EnumBuilder;
use crate::error::ScopeError;

/// Collects the declarations of one scope.
pub struct ScopeBuilder {
    name: Option<String>,
    pub(crate) catalog: CatalogBuilder,
    pub(crate) bindings: Vec<Box<dyn TypeBinding>>,
}

impl ScopeBuilder {
    fn new(name: Option<String>) -> Self {
        Self {
            name,
            catalog: CatalogBuilder::new(ScopeId::next()),
            bindings: Vec::new(),
        }
    }

    pub fn scope_id(&self) -> ScopeId {
        self.catalog.scope()
    }

    /// Start declaring class `T` under `name`.
    pub fn class<T: 'static>(&mut self, name: &str) -> ClassBuilder<'_, T> {
        ClassBuilder::new(self, name)
    }

    /// Start declaring enum `T` under `name`.
    pub fn enumeration<T: BoundEnum>(&mut self, name: &str) -> EnumBuilder<'_, T> {
        EnumBuilder::new(self, name)
    }

    /// Resolve base classes and build the catalog.
    pub fn finish(self) -> Result<ScopeRegistry, BindError> {
        let catalog = self.catalog.build()?;
        Ok(ScopeRegistry {
            name: self.name,
            catalog,
            bindings: self.bindings,
            published: PublishedMeta::default(),
            namespace: None,
        })
    }
}

/// The bindings of one scope together with their catalog and, once
/// exported, the runtime metadata they published.
pub struct ScopeRegistry {
    name: Option<String>,
    catalog: TypeCatalog,
    bindings: Vec<Box<dyn TypeBinding>>,
    published: PublishedMeta,
    namespace: Option<TableRef>,
}

impl ScopeRegistry {
    /// A scope exported into a table stored in the global `name`.
    pub fn builder(name: &str) -> ScopeBuilder {
        ScopeBuilder::new(Some(name.to_string()))
    }

    /// A scope exported directly into the globals table.
    pub fn global() -> ScopeBuilder {
        ScopeBuilder::new(None)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn scope_id(&self) -> ScopeId {
        self.catalog.scope()
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    /// Names of the bound types, in declaration order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|binding| binding.name())
    }

    /// Namespace table of the current export.
    pub fn namespace(&self) -> Option<TableRef> {
        self.namespace
    }

    /// Registry handles held by the current export.
    pub fn handle_count(&self) -> usize {
        self.published.handle_count()
    }

    /// Export every binding into `vm` and return the namespace table.
    ///
    /// A previous export of this scope is torn down first. If a binding fails,
    /// whatever was already published is torn down before the error is
    /// returned.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn export(&mut self, vm: &mut Vm) -> Result<TableRef, BindError> {
        self.teardown(vm);

        let namespace = match &self.name {
            Some(name) => {
                let table = vm.create_table();
                vm.set_global(name, table)?;
                table
            }
            None => vm.globals(),
        };

        let mut published = PublishedMeta::with_slots(self.catalog.metatable_count());
        if let Err(error) = self.publish(vm, namespace, &mut published) {
            published.teardown(vm);
            return Err(error);
        }

        debug!(
            scope = %self.scope_id(),
            name = self.name.as_deref().unwrap_or("<global>"),
            types = self.bindings.len(),
            handles = published.handle_count(),
            "exported scope"
        );
        self.published = published;
        self.namespace = Some(namespace);
        Ok(namespace)
    }

    fn publish(&self, vm: &mut Vm, namespace: TableRef, published: &mut PublishedMeta) -> Result<(), BindError> {
        for binding in &self.bindings {
            binding.publish_meta(vm, namespace, &self.catalog, published)?;
        }
        let export = ExportContext::new(&self.catalog, published);
        for binding in &self.bindings {
            binding.publish_other(vm, namespace, &export)?;
        }
        Ok(())
    }

    /// Release every registry handle of the current export. Returns how many
    /// were released.
    ///
    /// Exported tables stay reachable from the namespace; instances already
    /// created keep working until they are collected.
    pub fn teardown(&mut self, vm: &mut Vm) -> usize {
        self.namespace = None;
        let released = std::mem::take(&mut self.published).teardown(vm);
        if released > 0 {
            debug!(scope = %self.scope_id(), released, "tore down scope");
        }
        released
    }

    /// Read a native value the same way a bound method reads its arguments.
    pub fn decode<T: FromStack>(&self, vm: &Vm, value: &Value) -> Result<T, ScopeError> {
        let cx = T::context(&self.catalog)?;
        Ok(T::extract(&cx, vm, value)?)
    }

    /// Convert a native value the same way a bound method returns it.
    ///
    /// Classes require a prior [`export`](ScopeRegistry::export). Values that
    /// push nothing encode to `nil`.
    pub fn encode<T: IntoStack>(&self, vm: &mut Vm, value: T) -> Result<Value, ScopeError> {
        let export = ExportContext::new(&self.catalog, &self.published);
        let cx = T::context(&export)?;
        let count = value.push(&cx, vm)?;
        Ok(vm.pop_many(count).into_iter().next().unwrap_or_default())
    }

    /// Destroy the instance owned by `value` now instead of at collection.
    ///
    /// Returns `false` if `value` is a non-owning view or was already
    /// released.
    pub fn release(&self, vm: &Vm, value: &Value) -> Result<bool, ScopeError> {
        let envelope = Envelope::from_value(vm, value).ok_or_else(|| ConversionError::NotAnEnvelope {
            expected: "instance".to_string(),
            actual: value.type_name(),
        })?;
        if envelope.scope() != self.scope_id() {
            return Err(ConversionError::ForeignScope {
                expected: "instance".to_string(),
            }
            .into());
        }
        Ok(envelope.release())
    }
}

impl std::fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeRegistry")
            .field("name", &self.name)
            .field("catalog", &self.catalog)
            .field("published", &self.published)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Foo;

    fn scope(name: Option<&str>) -> ScopeRegistry {
        let mut scope = match name {
            Some(name) => ScopeRegistry::builder(name),
            None => ScopeRegistry::global(),
        };
        scope.class::<Foo>("Foo").constructor(|| Foo).build().unwrap();
        scope.finish().unwrap()
    }

    #[test]
    fn named_scope_is_a_global_table() {
        let mut registry = scope(Some("game"));
        let mut vm = Vm::new();
        let namespace = registry.export(&mut vm).unwrap();
        assert_eq!(vm.get_global("game"), Value::Table(namespace));
        assert!(vm.get_field(&Value::Table(namespace), "Foo").unwrap().as_table().is_some());
        assert!(vm.get_global("Foo").is_nil());
    }

    #[test]
    fn global_scope_uses_globals() {
        let mut registry = scope(None);
        let mut vm = Vm::new();
        assert_eq!(registry.export(&mut vm), Ok(vm.globals()));
        assert!(vm.get_global("Foo").as_table().is_some());
    }

    #[test]
    fn reexport_does_not_leak_handles() {
        let mut registry = scope(Some("game"));
        let mut vm = Vm::new();
        registry.export(&mut vm).unwrap();
        assert_eq!(registry.handle_count(), 2);
        registry.export(&mut vm).unwrap();
        assert_eq!(vm.heap_stats().registry, 2);
        assert_eq!(registry.teardown(&mut vm), 2);
        assert_eq!(vm.heap_stats().registry, 0);
        assert_eq!(registry.namespace(), None);
    }

    #[test]
    fn type_names_in_declaration_order() {
        let mut scope = ScopeRegistry::global();
        scope.class::<Foo>("Foo").constructor(|| Foo).build().unwrap();
        scope.class::<String>("Text").constructor(String::new).build().unwrap();
        let registry = scope.finish().unwrap();
        assert_eq!(registry.type_names().collect::<Vec<_>>(), ["Foo", "Text"]);
        assert_ne!(registry.scope_id(), scope_id_of_another());
    }

    fn scope_id_of_another() -> ScopeId {
        ScopeRegistry::global().scope_id()
    }
}
