//! Marshalling of bound enumerations.
//!
//! Enum values travel as envelopes carrying only their integral value. They
//! have no metatable and match only their exact declared type.

use std::rc::Rc;

use stackglue_vm::{Value, Vm};

use crate::envelope::Envelope;
use crate::error::ConversionError;
use crate::ids::{ScopeId, TypeIdx};

/// A fieldless enum with a fixed integral representation.
///
/// Usually derived with `#[derive(Enum)]`, which also implements the
/// marshalling traits through [`EnumTarget`].
pub trait BoundEnum: Sized + 'static {
    fn to_integral(&self) -> i64;

    fn from_integral(value: i64) -> Option<Self>;
}

/// Extraction and push context for one enum.
#[derive(Clone, Debug)]
pub struct EnumTarget {
    scope: ScopeId,
    idx: TypeIdx,
    names: Rc<[Rc<str>]>,
}

impl EnumTarget {
    pub(crate) fn new(scope: ScopeId, idx: TypeIdx, names: Rc<[Rc<str>]>) -> Self {
        Self { scope, idx, names }
    }

    pub fn idx(&self) -> TypeIdx {
        self.idx
    }

    fn name_of(&self, idx: TypeIdx) -> String {
        self.names
            .get(idx.index())
            .map_or_else(|| "?".to_string(), |name| name.to_string())
    }

    pub fn decode<E: BoundEnum>(&self, vm: &Vm, value: &Value) -> Result<E, ConversionError> {
        let envelope = Envelope::from_value(vm, value).ok_or_else(|| ConversionError::NotAnEnvelope {
            expected: self.name_of(self.idx),
            actual: value.type_name(),
        })?;
        if envelope.scope() != self.scope {
            return Err(ConversionError::ForeignScope {
                expected: self.name_of(self.idx),
            });
        }
        let raw = envelope
            .integral_value()
            .filter(|_| envelope.type_idx() == self.idx)
            .ok_or_else(|| ConversionError::WrongType {
                expected: self.name_of(self.idx),
                actual: self.name_of(envelope.type_idx()),
            })?;
        E::from_integral(raw).ok_or_else(|| ConversionError::InvalidEnumValue {
            type_name: self.name_of(self.idx),
            value: raw,
        })
    }

    /// Wrap `value` in a fresh envelope and push it.
    pub fn encode<E: BoundEnum>(&self, vm: &mut Vm, value: &E) -> usize {
        let envelope = self.envelope(vm, value.to_integral());
        vm.push(envelope);
        1
    }

    /// A new envelope userdata for the raw integral `value`.
    pub fn envelope(&self, vm: &mut Vm, value: i64) -> Value {
        let envelope = Envelope::integral(self.scope, self.idx, value);
        Value::Userdata(vm.create_userdata(Box::new(envelope), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TypeCatalog;

    #[derive(Debug, PartialEq)]
    enum Color {
        Red,
        Green,
    }

    impl BoundEnum for Color {
        fn to_integral(&self) -> i64 {
            match self {
                Color::Red => 0,
                Color::Green => 1,
            }
        }

        fn from_integral(value: i64) -> Option<Self> {
            match value {
                0 => Some(Color::Red),
                1 => Some(Color::Green),
                _ => None,
            }
        }
    }

    struct Shape;

    fn targets() -> (EnumTarget, EnumTarget) {
        let mut builder = TypeCatalog::builder(ScopeId::next());
        builder.declare_enum::<Color>("Color").unwrap();
        builder.declare_enum::<Shape>("Shape").unwrap();
        let catalog = builder.build().unwrap();
        (
            catalog.enum_target::<Color>().unwrap(),
            catalog.enum_target::<Shape>().unwrap(),
        )
    }

    #[test]
    fn encode_then_decode() {
        let (color, _) = targets();
        let mut vm = Vm::new();
        assert_eq!(color.encode(&mut vm, &Color::Green), 1);
        let value = vm.pop();
        assert_eq!(color.decode::<Color>(&vm, &value), Ok(Color::Green));
        assert!(vm.metatable(&value).is_none());
    }

    #[test]
    fn exact_type_required() {
        let (color, shape) = targets();
        let mut vm = Vm::new();
        let value = shape.envelope(&mut vm, 1);
        assert_eq!(
            color.decode::<Color>(&vm, &value),
            Err(ConversionError::WrongType {
                expected: "Color".into(),
                actual: "Shape".into()
            })
        );
    }

    #[test]
    fn unknown_integral_rejected() {
        let (color, _) = targets();
        let mut vm = Vm::new();
        let value = color.envelope(&mut vm, 7);
        assert_eq!(
            color.decode::<Color>(&vm, &value),
            Err(ConversionError::InvalidEnumValue {
                type_name: "Color".into(),
                value: 7
            })
        );
    }

    #[test]
    fn other_scope_rejected() {
        let (color, _) = targets();
        let (other, _) = targets();
        let mut vm = Vm::new();
        let value = other.envelope(&mut vm, 0);
        assert!(matches!(
            color.decode::<Color>(&vm, &value),
            Err(ConversionError::ForeignScope { .. })
        ));
        assert!(matches!(
            color.decode::<Color>(&vm, &Value::Integer(0)),
            Err(ConversionError::NotAnEnvelope { .. })
        ));
    }
}
