//! Tagged userdata payloads.

use stackglue_vm::{Value, Vm, VmError};
use tracing::trace;

use crate::ids::{ScopeId, TypeIdx};
use crate::instance::ClassRef;

/// What an envelope carries.
#[derive(Clone, Debug)]
pub enum Payload {
    Instance(ClassRef),
    Integral(i64),
}

/// Payload of every userdata block minted by a scope.
///
/// Scripts can move envelopes around freely but never see inside them; every
/// extraction checks `scope` and `type_idx` before trusting the payload.
#[derive(Clone, Debug)]
pub struct Envelope {
    scope: ScopeId,
    type_idx: TypeIdx,
    payload: Payload,
    owner: bool,
}

impl Envelope {
    /// An envelope that destroys its instance when finalized.
    pub fn owned(scope: ScopeId, type_idx: TypeIdx, instance: ClassRef) -> Self {
        Self {
            scope,
            type_idx,
            payload: Payload::Instance(instance),
            owner: true,
        }
    }

    /// A non-owning alias of an instance owned elsewhere.
    pub fn view(scope: ScopeId, type_idx: TypeIdx, instance: ClassRef) -> Self {
        Self {
            scope,
            type_idx,
            payload: Payload::Instance(instance),
            owner: false,
        }
    }

    pub fn integral(scope: ScopeId, type_idx: TypeIdx, value: i64) -> Self {
        Self {
            scope,
            type_idx,
            payload: Payload::Integral(value),
            owner: false,
        }
    }

    /// The envelope inside `value`, if it is one.
    pub fn from_value<'vm>(vm: &'vm Vm, value: &Value) -> Option<&'vm Envelope> {
        vm.userdata(value.as_userdata()?)?.downcast_ref::<Envelope>()
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn type_idx(&self) -> TypeIdx {
        self.type_idx
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn is_owner(&self) -> bool {
        self.owner
    }

    pub fn class_ref(&self) -> Option<&ClassRef> {
        match &self.payload {
            Payload::Instance(instance) => Some(instance),
            Payload::Integral(_) => None,
        }
    }

    pub fn integral_value(&self) -> Option<i64> {
        match self.payload {
            Payload::Integral(value) => Some(value),
            Payload::Instance(_) => None,
        }
    }

    /// Destroy the instance if this envelope owns it. Returns `true` if the
    /// instance was destroyed by this call.
    pub fn release(&self) -> bool {
        match (&self.payload, self.owner) {
            (Payload::Instance(instance), true) => instance.instance().finalize(),
            _ => false,
        }
    }
}

/// `__gc` of every class instance metatable.
pub fn finalizer(vm: &mut Vm) -> Result<usize, VmError> {
    let value = vm.get(1);
    if let Some(envelope) = Envelope::from_value(vm, &value)
        && envelope.release()
    {
        trace!(
            scope = %envelope.scope(),
            type_idx = %envelope.type_idx(),
            "finalized instance"
        );
    }
    Ok(0)
}
