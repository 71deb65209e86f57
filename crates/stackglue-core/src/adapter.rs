//! Calling adapters for bound constructors and methods.
//!
//! A method adapter is generated per bound method signature. Each call runs
//! the same fixed sequence and stops at the first failure:
//!
//! 1. arity: the frame holds exactly one slot per parameter plus `self`
//! 2. instance: slot 1 is an envelope of this scope whose type is admitted by
//!    the declaring class
//! 3. arguments: slot `i + 2` is extracted as parameter `i`
//! 4. invocation, with the instance borrowed only for its duration
//! 5. result: pushed through [`IntoStack`]; `()` pushes nothing
//!
//! Constructors follow the same pattern with the class table in slot 1.

use std::any::Any;
use std::rc::Rc;

use stackglue_vm::{FunctionRef, NativeFunction, TableRef, Value, Vm, VmError};
use tracing::trace;

use crate::catalog::TypeCatalog;
use crate::class::ClassTarget;
use crate::envelope::Envelope;
use crate::error::{BindError, CallError, Callable, ConversionError};
use crate::export::ExportContext;
use crate::ids::{ScopeId, TypeIdx};
use crate::instance::{ClassRef, Destroy, Instance};
use crate::marshal::{FromStack, IntoStack};

// ============================================================================
// Parameter lists
// ============================================================================

/// A tuple of parameters extracted from consecutive stack slots.
pub trait Params: Sized {
    const COUNT: usize;

    type Contexts;

    fn contexts(catalog: &TypeCatalog) -> Result<Self::Contexts, BindError>;

    /// Extract every parameter, the first from slot `first`. Failures report
    /// the slot position.
    fn extract(cx: &Self::Contexts, vm: &Vm, first: usize) -> Result<Self, (usize, ConversionError)>;
}

macro_rules! impl_params {
    ($count:expr; $($ty:ident => $idx:tt),*) => {
        impl<$($ty: FromStack),*> Params for ($($ty,)*) {
            const COUNT: usize = $count;

            type Contexts = ($(<$ty as FromStack>::Context,)*);

            #[allow(unused_variables)]
            fn contexts(catalog: &TypeCatalog) -> Result<Self::Contexts, BindError> {
                Ok(($(<$ty as FromStack>::context(catalog)?,)*))
            }

            #[allow(unused_variables)]
            fn extract(cx: &Self::Contexts, vm: &Vm, first: usize) -> Result<Self, (usize, ConversionError)> {
                Ok(($({
                    let position = first + $idx;
                    let value = vm.get(position);
                    <$ty as FromStack>::extract(&cx.$idx, vm, &value).map_err(|error| (position, error))?
                },)*))
            }
        }
    };
}

impl_params!(0;);
impl_params!(1; A => 0);
impl_params!(2; A => 0, B => 1);
impl_params!(3; A => 0, B => 1, C => 2);
impl_params!(4; A => 0, B => 1, C => 2, D => 3);
impl_params!(5; A => 0, B => 1, C => 2, D => 3, E => 4);
impl_params!(6; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5);
impl_params!(7; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5, G => 6);
impl_params!(8; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5, G => 6, H => 7);

// ============================================================================
// Method and constructor signatures
// ============================================================================

/// Marker for methods taking `&mut self`.
pub struct Exclusive;
/// Marker for methods taking `&self`.
pub struct Shared;
/// Marker for constructors returning `T`.
pub struct Infallible;
/// Marker for constructors returning `Option<T>`.
pub struct Fallible;

/// A callable usable as a method of class `T`.
///
/// Implemented for every `Fn(&mut T, A..) -> R` and `Fn(&T, A..) -> R` with
/// up to eight parameters whose types implement [`FromStack`] and whose
/// result implements [`IntoStack`]. `Marker` only disambiguates the impls.
pub trait Method<T: 'static, Marker>: 'static {
    type Params: Params;
    type Output: IntoStack;

    fn invoke(&self, this: &mut T, params: Self::Params) -> Self::Output;
}

/// A callable usable as the constructor of class `T`.
pub trait Constructor<T: 'static, Marker>: 'static {
    type Params: Params;

    /// `None` means the value could not be created.
    fn construct(&self, params: Self::Params) -> Option<T>;
}

macro_rules! impl_signatures {
    ($($ty:ident),*) => {
        impl<T, F, R, $($ty),*> Method<T, (Exclusive, fn($($ty),*) -> R)> for F
        where
            T: 'static,
            F: Fn(&mut T, $($ty),*) -> R + 'static,
            R: IntoStack,
            $($ty: FromStack,)*
        {
            type Params = ($($ty,)*);
            type Output = R;

            #[allow(non_snake_case)]
            fn invoke(&self, this: &mut T, ($($ty,)*): Self::Params) -> R {
                (self)(this, $($ty),*)
            }
        }

        impl<T, F, R, $($ty),*> Method<T, (Shared, fn($($ty),*) -> R)> for F
        where
            T: 'static,
            F: Fn(&T, $($ty),*) -> R + 'static,
            R: IntoStack,
            $($ty: FromStack,)*
        {
            type Params = ($($ty,)*);
            type Output = R;

            #[allow(non_snake_case)]
            fn invoke(&self, this: &mut T, ($($ty,)*): Self::Params) -> R {
                (self)(&*this, $($ty),*)
            }
        }

        impl<T, F, $($ty),*> Constructor<T, (Infallible, fn($($ty),*))> for F
        where
            T: 'static,
            F: Fn($($ty),*) -> T + 'static,
            $($ty: FromStack,)*
        {
            type Params = ($($ty,)*);

            #[allow(non_snake_case)]
            fn construct(&self, ($($ty,)*): Self::Params) -> Option<T> {
                Some((self)($($ty),*))
            }
        }

        impl<T, F, $($ty),*> Constructor<T, (Fallible, fn($($ty),*))> for F
        where
            T: 'static,
            F: Fn($($ty),*) -> Option<T> + 'static,
            $($ty: FromStack,)*
        {
            type Params = ($($ty,)*);

            #[allow(non_snake_case)]
            fn construct(&self, ($($ty,)*): Self::Params) -> Option<T> {
                (self)($($ty),*)
            }
        }
    };
}

impl_signatures!();
impl_signatures!(A);
impl_signatures!(A, B);
impl_signatures!(A, B, C);
impl_signatures!(A, B, C, D);
impl_signatures!(A, B, C, D, E);
impl_signatures!(A, B, C, D, E, G);
impl_signatures!(A, B, C, D, E, G, H);
impl_signatures!(A, B, C, D, E, G, H, I);

// ============================================================================
// Trampolines
// ============================================================================

/// A native function body plus the upvalues it must keep alive.
pub struct Trampoline {
    function: NativeFunction,
    upvalues: Vec<Value>,
}

impl Trampoline {
    pub fn new(function: NativeFunction, upvalues: Vec<Value>) -> Self {
        Self { function, upvalues }
    }

    /// Create the runtime closure.
    pub fn materialize(self, vm: &mut Vm, name: &str) -> FunctionRef {
        vm.create_native(name, self.function, self.upvalues)
    }
}

/// Builds the trampoline of one bound method during export.
pub type MethodExporter = Box<dyn Fn(&ExportContext<'_>, &ClassTarget) -> Result<Trampoline, BindError>>;

/// Erase a method into an exporter for class `T`.
pub fn export_method<T, M, F>(class: &str, method: &str, function: F) -> MethodExporter
where
    T: 'static,
    M: 'static,
    F: Method<T, M>,
{
    let callable = Callable::method(class, method);
    let function = Rc::new(function);
    Box::new(move |export: &ExportContext<'_>, receiver: &ClassTarget| {
        method_trampoline::<T, M, F>(callable.clone(), function.clone(), receiver.clone(), export)
    })
}

fn method_trampoline<T, M, F>(
    callable: Callable,
    method: Rc<F>,
    receiver: ClassTarget,
    export: &ExportContext<'_>,
) -> Result<Trampoline, BindError>
where
    T: 'static,
    M: 'static,
    F: Method<T, M>,
{
    let params = <F::Params as Params>::contexts(export.catalog())?;
    let output = <F::Output as IntoStack>::context(export)?;
    let upvalues = <F::Output as IntoStack>::anchor(&output).into_iter().collect();

    let function: NativeFunction = Rc::new(move |vm: &mut Vm| {
        dispatch_method::<T, M, F>(&callable, &method, &receiver, &params, &output, vm).map_err(VmError::from)
    });
    Ok(Trampoline::new(function, upvalues))
}

#[cfg_attr(feature = "profiling", profiling::function)]
fn dispatch_method<T, M, F>(
    callable: &Callable,
    method: &F,
    receiver: &ClassTarget,
    params: &<F::Params as Params>::Contexts,
    output: &<F::Output as IntoStack>::Context,
    vm: &mut Vm,
) -> Result<usize, CallError>
where
    T: 'static,
    F: Method<T, M>,
{
    trace!(%callable, "dispatch");
    let expected = <F::Params as Params>::COUNT + 1;
    let actual = vm.top();
    if actual != expected {
        return Err(CallError::ArgumentCountMismatch {
            callable: callable.clone(),
            expected,
            actual,
        });
    }

    let this = receiver
        .resolve(vm, &vm.get(1))
        .map_err(|reason| CallError::InstanceTypeMismatch {
            callable: callable.clone(),
            reason,
        })?;

    let args = <F::Params as Params>::extract(params, vm, 2).map_err(|(position, reason)| {
        CallError::ArgumentTypeMismatch {
            callable: callable.clone(),
            position,
            reason,
        }
    })?;

    let result = {
        let mut guard = this
            .borrow_mut::<T>()
            .map_err(|error| CallError::access(callable, error))?;
        method.invoke(&mut guard, args)
    };
    result.push(output, vm)
}

/// Type-erased constructor body: checks arity, extracts the arguments and
/// builds the value. `Ok(None)` means the constructor declined.
pub type ConstructFn<T> = Rc<dyn Fn(&Vm) -> Result<Option<T>, CallError>>;

/// Builds the [`ConstructFn`] of a class during export.
pub type ConstructorExporter<T> = Box<dyn Fn(&TypeCatalog, &str) -> Result<ConstructFn<T>, BindError>>;

/// Erase a constructor into an exporter for class `T`.
pub fn export_constructor<T, M, C>(constructor: C) -> ConstructorExporter<T>
where
    T: 'static,
    M: 'static,
    C: Constructor<T, M>,
{
    let constructor = Rc::new(constructor);
    Box::new(move |catalog: &TypeCatalog, class: &str| {
        let params = <C::Params as Params>::contexts(catalog)?;
        let callable = Callable::constructor(class);
        let constructor = constructor.clone();
        let construct: ConstructFn<T> = Rc::new(move |vm: &Vm| {
            // Slot 1 holds the class table.
            let expected = <C::Params as Params>::COUNT;
            let actual = vm.top().saturating_sub(1);
            if vm.top() != expected + 1 {
                return Err(CallError::ArgumentCountMismatch {
                    callable: callable.clone(),
                    expected,
                    actual,
                });
            }
            let args = <C::Params as Params>::extract(&params, vm, 2).map_err(|(position, reason)| {
                CallError::ArgumentTypeMismatch {
                    callable: callable.clone(),
                    position,
                    reason,
                }
            })?;
            Ok(constructor.construct(args))
        });
        Ok(construct)
    })
}

/// Allocation and destruction hooks of a bound class.
///
/// `create` may decline by returning `None`, which scripts observe as an
/// allocation failure. `destroy` receives every instance exactly once.
pub trait Factory<T>: 'static {
    fn create(&self, value: T) -> Option<Box<T>>;

    fn destroy(&self, value: Box<T>) {
        drop(value);
    }
}

/// Plain heap allocation.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapFactory;

impl<T> Factory<T> for HeapFactory {
    fn create(&self, value: T) -> Option<Box<T>> {
        Some(Box::new(value))
    }
}

/// Type-erase the `destroy` hook of `factory`.
pub fn erase_destroy<T: 'static, F: Factory<T>>(factory: Rc<F>) -> Destroy {
    Rc::new(move |value: Box<dyn Any>| {
        if let Ok(value) = value.downcast::<T>() {
            factory.destroy(value);
        }
    })
}

/// Where constructed instances of one class go.
#[derive(Clone)]
pub struct ClassSite {
    pub scope: ScopeId,
    pub idx: TypeIdx,
    pub name: Rc<str>,
    pub metatable: TableRef,
    pub destroy: Destroy,
}

/// The `__call` trampoline of a class table.
pub fn constructor_trampoline<T, F>(construct: ConstructFn<T>, factory: Rc<F>, site: ClassSite) -> Trampoline
where
    T: 'static,
    F: Factory<T>,
{
    let upvalues = vec![Value::Table(site.metatable)];
    let function: NativeFunction = Rc::new(move |vm: &mut Vm| {
        construct_instance(&construct, &*factory, &site, vm).map_err(VmError::from)
    });
    Trampoline::new(function, upvalues)
}

#[cfg_attr(feature = "profiling", profiling::function)]
fn construct_instance<T: 'static, F: Factory<T>>(
    construct: &ConstructFn<T>,
    factory: &F,
    site: &ClassSite,
    vm: &mut Vm,
) -> Result<usize, CallError> {
    let allocation_failure = || CallError::AllocationFailure {
        type_name: site.name.to_string(),
        scope: site.scope,
        type_idx: site.idx,
    };
    let value = construct(&*vm)?.ok_or_else(allocation_failure)?;
    let boxed = factory.create(value).ok_or_else(allocation_failure)?;

    let instance = Instance::new(boxed as Box<dyn Any>, site.destroy.clone());
    let envelope = Envelope::owned(site.scope, site.idx, ClassRef::new(instance));
    let userdata = vm.create_userdata(Box::new(envelope), Some(site.metatable));
    vm.push(userdata);
    trace!(class = %site.name, "constructed instance");
    Ok(1)
}
