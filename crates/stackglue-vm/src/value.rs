//! The dynamically-typed value model.

use std::rc::Rc;

use ordered_float::OrderedFloat;

use crate::arena::Handle;
use crate::error::VmError;

/// Reference to a table living in the runtime heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TableRef(pub(crate) Handle);

/// Reference to a native closure living in the runtime heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FunctionRef(pub(crate) Handle);

/// Reference to a userdata block living in the runtime heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserdataRef(pub(crate) Handle);

/// A value as seen by scripts.
///
/// Heap objects are referenced by handle; cloning a `Value` never copies a
/// table or userdata.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(Rc<str>),
    Table(TableRef),
    Function(FunctionRef),
    Userdata(UserdataRef),
}

impl Value {
    /// Name of the value's type, as scripts would report it.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Userdata(_) => "userdata",
        }
    }

    /// Everything except `nil` and `false` is true.
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_table(&self) -> Option<TableRef> {
        match self {
            Value::Table(table) => Some(*table),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<FunctionRef> {
        match self {
            Value::Function(function) => Some(*function),
            _ => None,
        }
    }

    pub fn as_userdata(&self) -> Option<UserdataRef> {
        match self {
            Value::Userdata(userdata) => Some(*userdata),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(Rc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Rc::from(value))
    }
}

impl From<TableRef> for Value {
    fn from(value: TableRef) -> Self {
        Value::Table(value)
    }
}

impl From<FunctionRef> for Value {
    fn from(value: FunctionRef) -> Self {
        Value::Function(value)
    }
}

impl From<UserdataRef> for Value {
    fn from(value: UserdataRef) -> Self {
        Value::Userdata(value)
    }
}

/// A hashable table key.
///
/// Floats with an integral value are normalised to `Integer` so `t[1]` and
/// `t[1.0]` name the same slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Boolean(bool),
    Integer(i64),
    Number(OrderedFloat<f64>),
    String(Rc<str>),
    Table(TableRef),
    Function(FunctionRef),
    Userdata(UserdataRef),
}

impl Key {
    pub fn from_value(value: &Value) -> Result<Key, VmError> {
        Ok(match value {
            Value::Nil => return Err(VmError::InvalidKey("nil")),
            Value::Boolean(b) => Key::Boolean(*b),
            Value::Integer(i) => Key::Integer(*i),
            Value::Number(n) if n.is_nan() => return Err(VmError::InvalidKey("NaN")),
            Value::Number(n) => match integral(*n) {
                Some(i) => Key::Integer(i),
                None => Key::Number(OrderedFloat(*n)),
            },
            Value::String(s) => Key::String(s.clone()),
            Value::Table(t) => Key::Table(*t),
            Value::Function(f) => Key::Function(*f),
            Value::Userdata(u) => Key::Userdata(*u),
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Boolean(b) => Value::Boolean(*b),
            Key::Integer(i) => Value::Integer(*i),
            Key::Number(n) => Value::Number(n.into_inner()),
            Key::String(s) => Value::String(s.clone()),
            Key::Table(t) => Value::Table(*t),
            Key::Function(f) => Value::Function(*f),
            Key::Userdata(u) => Value::Userdata(*u),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::String(Rc::from(value))
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Integer(value)
    }
}

/// Exact integer value of a float, if it has one within `i64` range.
pub fn integral(value: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    if value.is_finite() && value.fract() == 0.0 && (-LIMIT..LIMIT).contains(&value) {
        Some(value as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.truthy());
        assert!(!Value::Boolean(false).truthy());
        assert!(Value::Boolean(true).truthy());
        assert!(Value::Integer(0).truthy());
        assert!(Value::from("").truthy());
    }

    #[test]
    fn integral_floats_normalise() {
        assert_eq!(Key::from_value(&Value::Number(3.0)), Ok(Key::Integer(3)));
        assert_eq!(
            Key::from_value(&Value::Number(3.5)),
            Ok(Key::Number(OrderedFloat(3.5)))
        );
    }

    #[test]
    fn nil_and_nan_keys_rejected() {
        assert_eq!(
            Key::from_value(&Value::Nil),
            Err(VmError::InvalidKey("nil"))
        );
        assert_eq!(
            Key::from_value(&Value::Number(f64::NAN)),
            Err(VmError::InvalidKey("NaN"))
        );
    }

    #[test]
    fn integral_bounds() {
        assert_eq!(integral(-9_223_372_036_854_775_808.0), Some(i64::MIN));
        assert_eq!(integral(9_223_372_036_854_775_808.0), None);
        assert_eq!(integral(f64::INFINITY), None);
        assert_eq!(integral(0.25), None);
    }
}
