//! Native instances and the references scripts hold to them.
//!
//! An [`Instance`] owns one boxed native value together with the function
//! that destroys it. A [`ClassRef`] is a shared reference to an instance
//! plus the [`UpcastPath`] that projects the concrete value to the type the
//! reference is viewed as, so a `Derived` instance can be handed to code
//! expecting `Base`.

use std::any::Any;
use std::cell::{RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::error::AccessError;

/// Type-erased destroy function of a class factory.
pub type Destroy = Rc<dyn Fn(Box<dyn Any>)>;

/// One projection step from a derived value to an embedded base.
pub type Upcast = fn(&mut dyn Any) -> Option<&mut dyn Any>;

/// Projection from `D` to its base `B` through `AsMut`.
pub fn upcast<D, B>(value: &mut dyn Any) -> Option<&mut dyn Any>
where
    D: AsMut<B> + 'static,
    B: 'static,
{
    value
        .downcast_mut::<D>()
        .map(|derived| <D as AsMut<B>>::as_mut(derived) as &mut dyn Any)
}

/// Ordered projection steps, applied first to last.
#[derive(Clone)]
pub struct UpcastPath(Rc<[Upcast]>);

impl UpcastPath {
    pub fn identity() -> Self {
        Self(Rc::from(Vec::new()))
    }

    pub fn single(step: Upcast) -> Self {
        Self(Rc::from(vec![step]))
    }

    /// `self` followed by `next`.
    pub fn then(&self, next: &UpcastPath) -> Self {
        if next.0.is_empty() {
            return self.clone();
        }
        if self.0.is_empty() {
            return next.clone();
        }
        Self(self.0.iter().chain(next.0.iter()).copied().collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn apply<'a>(&self, value: &'a mut dyn Any) -> Option<&'a mut dyn Any> {
        let mut current = value;
        for step in self.0.iter() {
            current = step(current)?;
        }
        Some(current)
    }
}

impl Default for UpcastPath {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for UpcastPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UpcastPath").field(&self.0.len()).finish()
    }
}

/// A native value owned on behalf of the runtime.
///
/// The value is destroyed exactly once: by [`Instance::finalize`], or when
/// the last reference is dropped if it was never finalized.
pub struct Instance {
    value: RefCell<Option<Box<dyn Any>>>,
    destroy: Destroy,
}

impl Instance {
    pub fn new(value: Box<dyn Any>, destroy: Destroy) -> Rc<Self> {
        Rc::new(Self {
            value: RefCell::new(Some(value)),
            destroy,
        })
    }

    /// Destroy the value now. Returns `false` if it was already destroyed or
    /// is currently borrowed; a borrowed value is destroyed on drop instead.
    pub fn finalize(&self) -> bool {
        let taken = match self.value.try_borrow_mut() {
            Ok(mut slot) => slot.take(),
            Err(_) => return false,
        };
        match taken {
            Some(value) => {
                (self.destroy)(value);
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        matches!(self.value.try_borrow(), Ok(slot) if slot.is_none())
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if let Some(value) = self.value.get_mut().take() {
            (self.destroy)(value);
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

/// A possibly upcast reference to an [`Instance`].
#[derive(Clone, Debug)]
pub struct ClassRef {
    instance: Rc<Instance>,
    path: UpcastPath,
}

impl ClassRef {
    pub fn new(instance: Rc<Instance>) -> Self {
        Self {
            instance,
            path: UpcastPath::identity(),
        }
    }

    /// The same instance viewed through `path` as well.
    pub fn upcast(&self, path: &UpcastPath) -> Self {
        Self {
            instance: self.instance.clone(),
            path: self.path.then(path),
        }
    }

    pub fn instance(&self) -> &Rc<Instance> {
        &self.instance
    }

    /// Two references name the same native object.
    pub fn ptr_eq(&self, other: &ClassRef) -> bool {
        Rc::ptr_eq(&self.instance, &other.instance)
    }

    pub fn is_released(&self) -> bool {
        self.instance.is_released()
    }

    /// Exclusive access to the value, viewed as `T`.
    pub fn borrow_mut<T: 'static>(&self) -> Result<RefMut<'_, T>, AccessError> {
        let slot = self
            .instance
            .value
            .try_borrow_mut()
            .map_err(|_| AccessError::Borrowed)?;
        if slot.is_none() {
            return Err(AccessError::Released);
        }
        RefMut::filter_map(slot, |slot| {
            let value = slot.as_mut()?;
            self.path.apply(&mut **value)?.downcast_mut::<T>()
        })
        .map_err(|_| AccessError::Incompatible {
            expected: std::any::type_name::<T>(),
        })
    }
}
