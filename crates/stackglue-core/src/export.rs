//! State shared between the two export passes.
//!
//! The first pass creates every class's instance metatable and method table
//! and records them in [`PublishedMeta`]. The second pass materialises
//! method adapters, which may need the metatable of any class in the scope
//! regardless of declaration order.

use stackglue_vm::{RegistryKey, TableRef, Value, Vm};

use crate::catalog::{TypeCatalog, TypeCategory};
use crate::class::ClassReturn;
use crate::error::BindError;
use crate::ids::MetatableSlot;

/// Runtime metadata of one exported class, pinned in the runtime registry.
#[derive(Debug)]
pub struct PublishedClass {
    metatable: TableRef,
    methods: TableRef,
    keys: [RegistryKey; 2],
}

impl PublishedClass {
    /// Pin `metatable` and `methods` so they outlive any script reference.
    pub fn pin(vm: &mut Vm, metatable: TableRef, methods: TableRef) -> Self {
        let keys = [
            vm.registry_ref(Value::Table(metatable)),
            vm.registry_ref(Value::Table(methods)),
        ];
        Self {
            metatable,
            methods,
            keys,
        }
    }

    pub fn metatable(&self) -> TableRef {
        self.metatable
    }

    pub fn methods(&self) -> TableRef {
        self.methods
    }
}

/// Metatable array of one export, indexed by [`MetatableSlot`].
#[derive(Debug, Default)]
pub struct PublishedMeta {
    slots: Vec<Option<PublishedClass>>,
}

impl PublishedMeta {
    pub fn with_slots(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| None).collect(),
        }
    }

    pub fn publish(&mut self, slot: MetatableSlot, class: PublishedClass) {
        if let Some(entry) = self.slots.get_mut(slot.index()) {
            *entry = Some(class);
        }
    }

    pub fn get(&self, slot: MetatableSlot) -> Option<&PublishedClass> {
        self.slots.get(slot.index())?.as_ref()
    }

    /// Number of registry handles currently held.
    pub fn handle_count(&self) -> usize {
        self.slots.iter().flatten().map(|class| class.keys.len()).sum()
    }

    /// Release every registry handle. Returns how many were released.
    pub fn teardown(&mut self, vm: &mut Vm) -> usize {
        self.slots
            .iter_mut()
            .filter_map(Option::take)
            .flat_map(|class| class.keys)
            .filter(|key| vm.registry_unref(*key))
            .count()
    }
}

/// Everything an adapter may resolve while being exported.
#[derive(Clone, Copy)]
pub struct ExportContext<'a> {
    catalog: &'a TypeCatalog,
    published: &'a PublishedMeta,
}

impl<'a> ExportContext<'a> {
    pub fn new(catalog: &'a TypeCatalog, published: &'a PublishedMeta) -> Self {
        Self { catalog, published }
    }

    pub fn catalog(&self) -> &'a TypeCatalog {
        self.catalog
    }

    pub fn published(&self) -> &'a PublishedMeta {
        self.published
    }

    /// Published metadata of the class at `slot`.
    pub fn class_meta(&self, type_name: &str, slot: MetatableSlot) -> Result<&'a PublishedClass, BindError> {
        self.published.get(slot).ok_or_else(|| BindError::NotPublished {
            type_name: type_name.to_string(),
        })
    }

    /// Push context for class `T`.
    pub fn class_return<T: 'static>(&self) -> Result<ClassReturn, BindError> {
        let entry = self.catalog.require::<T>()?;
        let (Some(slot), Some(destroy)) = (entry.metatable_slot(), entry.destroy()) else {
            return Err(BindError::CategoryMismatch {
                type_name: entry.name().to_string(),
                expected: TypeCategory::Class,
                actual: entry.category(),
            });
        };
        let published = self.class_meta(entry.name(), slot)?;
        Ok(ClassReturn::new(
            self.catalog.scope(),
            entry.idx(),
            published.metatable(),
            destroy.clone(),
        ))
    }
}
