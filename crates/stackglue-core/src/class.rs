//! Marshalling of bound class references.

use std::any::Any;
use std::cell::RefMut;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use stackglue_vm::{TableRef, Value, Vm};

use crate::catalog::{AdmissionSet, TypeCatalog};
use crate::envelope::Envelope;
use crate::error::{AccessError, BindError, CallError, ConversionError};
use crate::export::ExportContext;
use crate::ids::{ScopeId, TypeIdx};
use crate::instance::{ClassRef, Destroy, Instance};
use crate::marshal::{FromStack, IntoStack, ValueCategory};

/// Typed reference to an instance of bound class `T`.
///
/// As a parameter, a `Ptr<T>` accepts instances of `T` and of every class
/// declared as extending `T`. As a return value it pushes a non-owning view:
/// the instance stays owned by the envelope it was constructed in.
pub struct Ptr<T: 'static> {
    inner: ClassRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Ptr<T> {
    pub fn from_class_ref(inner: ClassRef) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    pub fn class_ref(&self) -> &ClassRef {
        &self.inner
    }

    pub fn try_borrow_mut(&self) -> Result<RefMut<'_, T>, AccessError> {
        self.inner.borrow_mut::<T>()
    }

    /// Run `f` with exclusive access to the instance.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, AccessError> {
        let mut guard = self.try_borrow_mut()?;
        Ok(f(&mut guard))
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_released()
    }

    /// Both pointers name the same native object.
    pub fn ptr_eq(&self, other: &Ptr<T>) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

impl<T: 'static> Clone for Ptr<T> {
    fn clone(&self) -> Self {
        Self::from_class_ref(self.inner.clone())
    }
}

impl<T: 'static> PartialEq for Ptr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: 'static> fmt::Debug for Ptr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ptr")
            .field("type", &std::any::type_name::<T>())
            .field("released", &self.is_released())
            .finish()
    }
}

/// Extraction context for references to one class.
#[derive(Clone, Debug)]
pub struct ClassTarget {
    scope: ScopeId,
    idx: TypeIdx,
    admission: Rc<AdmissionSet>,
    names: Rc<[Rc<str>]>,
}

impl ClassTarget {
    pub(crate) fn new(
        scope: ScopeId,
        idx: TypeIdx,
        admission: Rc<AdmissionSet>,
        names: Rc<[Rc<str>]>,
    ) -> Self {
        Self {
            scope,
            idx,
            admission,
            names,
        }
    }

    pub fn idx(&self) -> TypeIdx {
        self.idx
    }

    pub fn name(&self) -> &str {
        self.names.get(self.idx.index()).map_or("?", |name| &**name)
    }

    /// Check `value` and return the reference it carries, adapted to this
    /// class. Checks run in order: envelope, scope, admission.
    pub fn resolve(&self, vm: &Vm, value: &Value) -> Result<ClassRef, ConversionError> {
        let envelope = Envelope::from_value(vm, value).ok_or_else(|| ConversionError::NotAnEnvelope {
            expected: self.name().to_string(),
            actual: value.type_name(),
        })?;
        if envelope.scope() != self.scope {
            return Err(ConversionError::ForeignScope {
                expected: self.name().to_string(),
            });
        }
        let wrong_type = || ConversionError::WrongType {
            expected: self.name().to_string(),
            actual: self
                .names
                .get(envelope.type_idx().index())
                .map_or_else(|| "?".to_string(), |name| name.to_string()),
        };
        let instance = envelope.class_ref().ok_or_else(wrong_type)?;
        let path = self.admission.get(&envelope.type_idx()).ok_or_else(wrong_type)?;
        Ok(instance.upcast(path))
    }
}

impl<T: 'static> FromStack for Ptr<T> {
    type Context = ClassTarget;
    const CATEGORY: ValueCategory = ValueCategory::Class;

    fn context(catalog: &TypeCatalog) -> Result<ClassTarget, BindError> {
        catalog.class_target::<T>()
    }

    fn extract(cx: &ClassTarget, vm: &Vm, value: &Value) -> Result<Self, ConversionError> {
        cx.resolve(vm, value).map(Ptr::from_class_ref)
    }
}

/// Push context for one class: where its instances come from and which
/// metatable they get.
#[derive(Clone)]
pub struct ClassReturn {
    scope: ScopeId,
    idx: TypeIdx,
    metatable: TableRef,
    destroy: Destroy,
}

impl ClassReturn {
    pub(crate) fn new(scope: ScopeId, idx: TypeIdx, metatable: TableRef, destroy: Destroy) -> Self {
        Self {
            scope,
            idx,
            metatable,
            destroy,
        }
    }

    pub fn metatable(&self) -> TableRef {
        self.metatable
    }

    /// Move `value` into a new owning envelope and push it.
    pub fn push_owned<T: 'static>(&self, vm: &mut Vm, value: T) -> usize {
        let instance = Instance::new(Box::new(value) as Box<dyn Any>, self.destroy.clone());
        let envelope = Envelope::owned(self.scope, self.idx, ClassRef::new(instance));
        self.push_envelope(vm, envelope)
    }

    /// Push a non-owning view of an existing instance.
    pub fn push_view(&self, vm: &mut Vm, instance: ClassRef) -> usize {
        self.push_envelope(vm, Envelope::view(self.scope, self.idx, instance))
    }

    fn push_envelope(&self, vm: &mut Vm, envelope: Envelope) -> usize {
        let userdata = vm.create_userdata(Box::new(envelope), Some(self.metatable));
        vm.push(userdata);
        1
    }
}

impl fmt::Debug for ClassReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassReturn")
            .field("scope", &self.scope)
            .field("idx", &self.idx)
            .field("metatable", &self.metatable)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> IntoStack for Ptr<T> {
    type Context = ClassReturn;
    const CATEGORY: ValueCategory = ValueCategory::Class;

    fn context(export: &ExportContext<'_>) -> Result<ClassReturn, BindError> {
        export.class_return::<T>()
    }

    fn push(self, cx: &ClassReturn, vm: &mut Vm) -> Result<usize, CallError> {
        Ok(cx.push_view(vm, self.inner))
    }

    fn anchor(cx: &ClassReturn) -> Option<Value> {
        Some(Value::Table(cx.metatable))
    }
}
