//! Enum bindings.

use std::marker::PhantomData;

use stackglue_core::{BindError, BoundEnum, ExportContext, PublishedMeta, TypeCatalog, TypeCategory};
use stackglue_vm::{TableRef, Vm};
use tracing::trace;

use crate::binding::TypeBinding;
use crate::scope::ScopeBuilder;

/// Declares one enum of a scope and the values scripts can name.
#[must_use = "an enum is only declared once `build` is called"]
pub struct EnumBuilder<'s, T: BoundEnum> {
    scope: &'s mut ScopeBuilder,
    name: String,
    values: Vec<(String, i64)>,
    duplicate: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<'s, T: BoundEnum> EnumBuilder<'s, T> {
    pub(crate) fn new(scope: &'s mut ScopeBuilder, name: &str) -> Self {
        Self {
            scope,
            name: name.to_string(),
            values: Vec::new(),
            duplicate: None,
            _marker: PhantomData,
        }
    }

    pub fn value(mut self, name: &str, value: T) -> Self {
        if self.values.iter().any(|(existing, _)| existing == name) {
            self.duplicate.get_or_insert_with(|| name.to_string());
        }
        self.values.push((name.to_string(), value.to_integral()));
        self
    }

    pub fn build(self) -> Result<(), BindError> {
        if let Some(member) = self.duplicate {
            return Err(BindError::DuplicateMember {
                type_name: self.name,
                member,
            });
        }
        if self.values.iter().any(|(name, _)| name.is_empty()) {
            return Err(BindError::EmptyName);
        }
        let idx = self.scope.catalog.declare_enum::<T>(&self.name)?;
        trace!(enumeration = %self.name, %idx, values = self.values.len(), "declared enum");

        self.scope.bindings.push(Box::new(EnumBinding::<T> {
            name: self.name,
            values: self.values,
            _marker: PhantomData,
        }));
        Ok(())
    }
}

/// A flat `name -> value` table. Enums have no metatable, so there is
/// nothing to publish in the first pass.
struct EnumBinding<T> {
    name: String,
    values: Vec<(String, i64)>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: BoundEnum> TypeBinding for EnumBinding<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> TypeCategory {
        TypeCategory::Enum
    }

    fn publish_meta(&self, _: &mut Vm, _: TableRef, _: &TypeCatalog, _: &mut PublishedMeta) -> Result<(), BindError> {
        Ok(())
    }

    fn publish_other(&self, vm: &mut Vm, namespace: TableRef, export: &ExportContext<'_>) -> Result<(), BindError> {
        if self.values.is_empty() {
            return Ok(());
        }
        let target = export.catalog().enum_target::<T>()?;
        let table = vm.create_table();
        for (name, value) in &self.values {
            let envelope = target.envelope(vm, *value);
            vm.set_field(table, name, envelope)?;
        }
        vm.set_field(namespace, &self.name, table)?;
        Ok(())
    }
}
