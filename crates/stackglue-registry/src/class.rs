//! Class bindings.

use std::rc::Rc;

use stackglue_core::{
    BindError, CatalogBuilder, ClassSite, Constructor, ConstructorExporter, ExportContext, Factory, HeapFactory,
    Method, MethodExporter, PublishedClass, PublishedMeta, TypeCatalog, TypeCategory, TypeEntry, TypeIdx,
    constructor_trampoline, erase_destroy, export_constructor, export_method, finalizer, upcast,
};
use stackglue_vm::{TableRef, Value, Vm};
use tracing::trace;

use crate::binding::TypeBinding;
use crate::scope::ScopeBuilder;

type BaseLink = fn(&mut CatalogBuilder, TypeIdx);

struct MethodBinding {
    name: String,
    exporter: MethodExporter,
}

/// Declares one class of a scope.
///
/// ```
/// use stackglue_registry::ScopeRegistry;
///
/// struct Counter(i64);
///
/// let mut scope = ScopeRegistry::builder("demo");
/// scope
///     .class::<Counter>("Counter")
///     .constructor(|start: i64| Counter(start))
///     .method("bump", |this: &mut Counter| {
///         this.0 += 1;
///         this.0
///     })
///     .build()
///     .unwrap();
/// let registry = scope.finish().unwrap();
/// assert_eq!(registry.catalog().len(), 1);
/// ```
#[must_use = "a class is only declared once `build` is called"]
pub struct ClassBuilder<'s, T: 'static, F = HeapFactory> {
    scope: &'s mut ScopeBuilder,
    name: String,
    factory: F,
    constructor: Option<ConstructorExporter<T>>,
    methods: Vec<MethodBinding>,
    bases: Vec<BaseLink>,
    duplicate: Option<String>,
}

impl<'s, T: 'static> ClassBuilder<'s, T, HeapFactory> {
    pub(crate) fn new(scope: &'s mut ScopeBuilder, name: &str) -> Self {
        Self {
            scope,
            name: name.to_string(),
            factory: HeapFactory,
            constructor: None,
            methods: Vec::new(),
            bases: Vec::new(),
            duplicate: None,
        }
    }
}

impl<'s, T: 'static, F: Factory<T>> ClassBuilder<'s, T, F> {
    /// Use `factory` to allocate and destroy instances.
    pub fn factory<G: Factory<T>>(self, factory: G) -> ClassBuilder<'s, T, G> {
        ClassBuilder {
            scope: self.scope,
            name: self.name,
            factory,
            constructor: self.constructor,
            methods: self.methods,
            bases: self.bases,
            duplicate: self.duplicate,
        }
    }

    /// The function scripts call through the class table.
    pub fn constructor<M: 'static, C: Constructor<T, M>>(mut self, constructor: C) -> Self {
        if self.constructor.is_some() {
            self.duplicate.get_or_insert_with(|| "constructor".to_string());
        }
        self.constructor = Some(export_constructor::<T, M, C>(constructor));
        self
    }

    pub fn method<M: 'static, G: Method<T, M>>(mut self, name: &str, method: G) -> Self {
        if self.methods.iter().any(|existing| existing.name == name) {
            self.duplicate.get_or_insert_with(|| name.to_string());
        }
        self.methods.push(MethodBinding {
            name: name.to_string(),
            exporter: export_method::<T, M, G>(&self.name, name, method),
        });
        self
    }

    /// Accept instances of this class wherever a `B` is expected.
    ///
    /// `B` must be a class of the same scope; it may be declared later.
    pub fn extends<B: 'static>(mut self) -> Self
    where
        T: AsMut<B>,
    {
        self.bases
            .push(|catalog, derived| catalog.add_base::<B>(derived, upcast::<T, B>));
        self
    }

    /// Declare the class in its scope.
    pub fn build(self) -> Result<(), BindError> {
        if let Some(member) = self.duplicate {
            return Err(BindError::DuplicateMember {
                type_name: self.name,
                member,
            });
        }
        let Some(constructor) = self.constructor else {
            return Err(BindError::MissingConstructor { type_name: self.name });
        };

        let factory = Rc::new(self.factory);
        let idx = self
            .scope
            .catalog
            .declare_class::<T>(&self.name, erase_destroy::<T, F>(factory.clone()))?;
        for link in self.bases {
            link(&mut self.scope.catalog, idx);
        }
        trace!(class = %self.name, %idx, methods = self.methods.len(), "declared class");

        self.scope.bindings.push(Box::new(ClassBinding {
            name: self.name,
            factory,
            constructor,
            methods: self.methods,
        }));
        Ok(())
    }
}

/// Runtime shape of one class: a callable class table in the namespace, a
/// method table, and the metatable every instance envelope carries.
struct ClassBinding<T: 'static, F> {
    name: String,
    factory: Rc<F>,
    constructor: ConstructorExporter<T>,
    methods: Vec<MethodBinding>,
}

impl<T: 'static, F: Factory<T>> ClassBinding<T, F> {
    fn entry<'c>(&self, catalog: &'c TypeCatalog) -> Result<&'c TypeEntry, BindError> {
        let entry = catalog.require::<T>()?;
        if entry.category() != TypeCategory::Class {
            return Err(BindError::CategoryMismatch {
                type_name: self.name.clone(),
                expected: TypeCategory::Class,
                actual: entry.category(),
            });
        }
        Ok(entry)
    }
}

impl<T: 'static, F: Factory<T>> TypeBinding for ClassBinding<T, F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> TypeCategory {
        TypeCategory::Class
    }

    fn publish_meta(
        &self,
        vm: &mut Vm,
        namespace: TableRef,
        catalog: &TypeCatalog,
        published: &mut PublishedMeta,
    ) -> Result<(), BindError> {
        let entry = self.entry(catalog)?;
        let (Some(slot), Some(destroy)) = (entry.metatable_slot(), entry.destroy()) else {
            return Err(BindError::CategoryMismatch {
                type_name: self.name.clone(),
                expected: TypeCategory::Class,
                actual: entry.category(),
            });
        };

        let methods = vm.create_table();
        let metatable = vm.create_table();
        let gc = vm.create_function(&format!("{}:__gc", self.name), finalizer, Vec::new());
        vm.set_field(metatable, "__index", methods)?;
        vm.set_field(metatable, "__gc", gc)?;
        vm.set_field(metatable, "__name", self.name.as_str())?;

        let construct = (self.constructor)(catalog, &self.name)?;
        let site = ClassSite {
            scope: catalog.scope(),
            idx: entry.idx(),
            name: Rc::from(self.name.as_str()),
            metatable,
            destroy: destroy.clone(),
        };
        let constructor = constructor_trampoline(construct, self.factory.clone(), site).materialize(vm, &self.name);

        let class_table = vm.create_table();
        let class_meta = vm.create_table();
        vm.set_field(class_meta, "__call", constructor)?;
        vm.set_metatable(&Value::Table(class_table), Some(class_meta))?;
        vm.set_field(namespace, &self.name, class_table)?;

        published.publish(slot, PublishedClass::pin(vm, metatable, methods));
        Ok(())
    }

    fn publish_other(&self, vm: &mut Vm, _namespace: TableRef, export: &ExportContext<'_>) -> Result<(), BindError> {
        let entry = self.entry(export.catalog())?;
        let slot = entry.metatable_slot().ok_or_else(|| BindError::NotPublished {
            type_name: self.name.clone(),
        })?;
        let methods = export.class_meta(&self.name, slot)?.methods();
        let receiver = export.catalog().class_target::<T>()?;

        for method in &self.methods {
            let trampoline = (method.exporter)(export, &receiver)?;
            let function = trampoline.materialize(vm, &format!("{}:{}", self.name, method.name));
            vm.set_field(methods, &method.name, function)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use stackglue_core::Ptr;

    use super::*;
    use crate::ScopeRegistry;

    struct Foo;

    struct Bar {
        foo: Foo,
    }

    impl AsMut<Foo> for Bar {
        fn as_mut(&mut self) -> &mut Foo {
            &mut self.foo
        }
    }

    #[test]
    fn constructor_is_required() {
        let mut scope = ScopeRegistry::global();
        assert_eq!(
            scope.class::<Foo>("Foo").method("noop", |_: &Foo| ()).build(),
            Err(BindError::MissingConstructor {
                type_name: "Foo".into()
            })
        );
    }

    #[test]
    fn duplicate_methods_rejected() {
        let mut scope = ScopeRegistry::global();
        let result = scope
            .class::<Foo>("Foo")
            .constructor(|| Foo)
            .method("a", |_: &Foo| 1)
            .method("a", |_: &Foo| 2)
            .build();
        assert_eq!(
            result,
            Err(BindError::DuplicateMember {
                type_name: "Foo".into(),
                member: "a".into()
            })
        );
    }

    #[test]
    fn second_constructor_rejected() {
        let mut scope = ScopeRegistry::global();
        let result = scope.class::<Foo>("Foo").constructor(|| Foo).constructor(|| Foo).build();
        assert!(matches!(result, Err(BindError::DuplicateMember { member, .. }) if member == "constructor"));
    }

    #[test]
    fn base_may_be_declared_later() {
        let mut scope = ScopeRegistry::global();
        scope
            .class::<Bar>("Bar")
            .constructor(|| Bar { foo: Foo })
            .extends::<Foo>()
            .build()
            .unwrap();
        scope
            .class::<Foo>("Foo")
            .constructor(|| Foo)
            .method("accepts", |_: &Foo, _: Ptr<Foo>| true)
            .build()
            .unwrap();
        let registry = scope.finish().unwrap();
        let foo = registry.catalog().by_name("Foo").unwrap();
        let bar = registry.catalog().by_name("Bar").unwrap();
        assert!(foo.admits(bar.idx()));
        assert!(!bar.admits(foo.idx()));
    }

    #[test]
    fn unknown_base_fails_at_finish() {
        let mut scope = ScopeRegistry::global();
        scope
            .class::<Bar>("Bar")
            .constructor(|| Bar { foo: Foo })
            .extends::<Foo>()
            .build()
            .unwrap();
        assert!(matches!(scope.finish(), Err(BindError::UnboundType { .. })));
    }
}
