//! Conversion between native values and runtime stack slots.
//!
//! This module provides the two marshalling traits:
//! - [`FromStack`]: extract a native value from a runtime [`Value`]
//! - [`IntoStack`]: push a native value onto the runtime stack
//!
//! Each implementing type belongs to one [`ValueCategory`] and declares a
//! `Context` resolved once, when the adapter using it is exported. Per call
//! only the value itself is inspected.
//!
//! ## Supported Types
//!
//! - Integers: `i8`, `i16`, `i32`, `i64`, `u8`, `u16`, `u32` (range checked),
//!   `u64` (bit reinterpretation of the 64-bit integer cell)
//! - Floats: `f32`, `f64`
//! - Boolean: `bool` (script truthiness)
//! - Strings: `String`
//! - Unit: `()` (no result)
//! - `Option<T>` (`nil` is `None`) and `Result<T, E>` (errors are raised)
//! - Class references [`Ptr<T>`](crate::Ptr) and `#[derive(Enum)]` enums

use std::fmt::Display;

use stackglue_vm::{Value, Vm, integral};

use crate::catalog::TypeCatalog;
use crate::error::{BindError, CallError, ConversionError};
use crate::export::ExportContext;

/// Marshalling category of a native type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueCategory {
    Nil,
    Boolean,
    Integer,
    Number,
    String,
    Class,
    Enum,
}

/// Read a native value from a runtime value.
///
/// Types without an implementation cannot appear as parameters of bound
/// methods:
///
/// ```compile_fail
/// use stackglue_core::Params;
///
/// struct Unbound;
/// fn needs_params<P: Params>() {}
/// needs_params::<(Unbound,)>();
/// ```
pub trait FromStack: Sized {
    /// Per-adapter state, such as the catalog entry of a class.
    type Context;

    const CATEGORY: ValueCategory;

    fn context(catalog: &TypeCatalog) -> Result<Self::Context, BindError>;

    fn extract(cx: &Self::Context, vm: &Vm, value: &Value) -> Result<Self, ConversionError>;
}

/// Push a native value onto the runtime stack.
pub trait IntoStack {
    type Context;

    const CATEGORY: ValueCategory;

    /// Number of slots every push writes.
    const RESULTS: usize = 1;

    fn context(export: &ExportContext<'_>) -> Result<Self::Context, BindError>;

    /// Push the value, returning the number of slots written.
    fn push(self, cx: &Self::Context, vm: &mut Vm) -> Result<usize, CallError>;

    /// Value the adapter keeps alive as an upvalue, if any.
    fn anchor(_cx: &Self::Context) -> Option<Value> {
        None
    }
}

// ============================================================================
// Integer implementations
// ============================================================================

fn integer(value: &Value) -> Result<i64, ConversionError> {
    match value {
        Value::Integer(v) => Ok(*v),
        Value::Number(n) => integral(*n).ok_or(ConversionError::NotIntegral { value: *n }),
        other => Err(ConversionError::TypeMismatch {
            expected: "integer",
            actual: other.type_name(),
        }),
    }
}

macro_rules! impl_stack_int {
    ($($ty:ty),*) => {
        $(
            impl FromStack for $ty {
                type Context = ();
                const CATEGORY: ValueCategory = ValueCategory::Integer;

                fn context(_: &TypeCatalog) -> Result<(), BindError> {
                    Ok(())
                }

                fn extract(_: &(), _: &Vm, value: &Value) -> Result<Self, ConversionError> {
                    let v = integer(value)?;
                    <$ty>::try_from(v).map_err(|_| ConversionError::IntegerOverflow {
                        value: v,
                        target_type: stringify!($ty),
                    })
                }
            }

            impl IntoStack for $ty {
                type Context = ();
                const CATEGORY: ValueCategory = ValueCategory::Integer;

                fn context(_: &ExportContext<'_>) -> Result<(), BindError> {
                    Ok(())
                }

                fn push(self, _: &(), vm: &mut Vm) -> Result<usize, CallError> {
                    vm.push(Value::Integer(i64::from(self)));
                    Ok(1)
                }
            }
        )*
    };
}

impl_stack_int!(i8, i16, i32, i64, u8, u16, u32);

// u64 shares the 64-bit cell with i64; values above i64::MAX wrap.
impl FromStack for u64 {
    type Context = ();
    const CATEGORY: ValueCategory = ValueCategory::Integer;

    fn context(_: &TypeCatalog) -> Result<(), BindError> {
        Ok(())
    }

    fn extract(_: &(), _: &Vm, value: &Value) -> Result<Self, ConversionError> {
        Ok(integer(value)? as u64)
    }
}

impl IntoStack for u64 {
    type Context = ();
    const CATEGORY: ValueCategory = ValueCategory::Integer;

    fn context(_: &ExportContext<'_>) -> Result<(), BindError> {
        Ok(())
    }

    fn push(self, _: &(), vm: &mut Vm) -> Result<usize, CallError> {
        vm.push(Value::Integer(self as i64));
        Ok(1)
    }
}

// ============================================================================
// Float implementations
// ============================================================================

macro_rules! impl_stack_float {
    ($($ty:ty),*) => {
        $(
            impl FromStack for $ty {
                type Context = ();
                const CATEGORY: ValueCategory = ValueCategory::Number;

                fn context(_: &TypeCatalog) -> Result<(), BindError> {
                    Ok(())
                }

                fn extract(_: &(), _: &Vm, value: &Value) -> Result<Self, ConversionError> {
                    match value {
                        Value::Number(n) => Ok(*n as $ty),
                        Value::Integer(i) => Ok(*i as $ty),
                        other => Err(ConversionError::TypeMismatch {
                            expected: "number",
                            actual: other.type_name(),
                        }),
                    }
                }
            }

            impl IntoStack for $ty {
                type Context = ();
                const CATEGORY: ValueCategory = ValueCategory::Number;

                fn context(_: &ExportContext<'_>) -> Result<(), BindError> {
                    Ok(())
                }

                fn push(self, _: &(), vm: &mut Vm) -> Result<usize, CallError> {
                    vm.push(Value::Number(f64::from(self)));
                    Ok(1)
                }
            }
        )*
    };
}

impl_stack_float!(f32, f64);

// ============================================================================
// Boolean, string and unit
// ============================================================================

impl FromStack for bool {
    type Context = ();
    const CATEGORY: ValueCategory = ValueCategory::Boolean;

    fn context(_: &TypeCatalog) -> Result<(), BindError> {
        Ok(())
    }

    fn extract(_: &(), _: &Vm, value: &Value) -> Result<Self, ConversionError> {
        Ok(value.truthy())
    }
}

impl IntoStack for bool {
    type Context = ();
    const CATEGORY: ValueCategory = ValueCategory::Boolean;

    fn context(_: &ExportContext<'_>) -> Result<(), BindError> {
        Ok(())
    }

    fn push(self, _: &(), vm: &mut Vm) -> Result<usize, CallError> {
        vm.push(Value::Boolean(self));
        Ok(1)
    }
}

impl FromStack for String {
    type Context = ();
    const CATEGORY: ValueCategory = ValueCategory::String;

    fn context(_: &TypeCatalog) -> Result<(), BindError> {
        Ok(())
    }

    fn extract(_: &(), _: &Vm, value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::String(s) => Ok(s.to_string()),
            other => Err(ConversionError::TypeMismatch {
                expected: "string",
                actual: other.type_name(),
            }),
        }
    }
}

impl IntoStack for String {
    type Context = ();
    const CATEGORY: ValueCategory = ValueCategory::String;

    fn context(_: &ExportContext<'_>) -> Result<(), BindError> {
        Ok(())
    }

    fn push(self, _: &(), vm: &mut Vm) -> Result<usize, CallError> {
        vm.push(self);
        Ok(1)
    }
}

impl IntoStack for &'static str {
    type Context = ();
    const CATEGORY: ValueCategory = ValueCategory::String;

    fn context(_: &ExportContext<'_>) -> Result<(), BindError> {
        Ok(())
    }

    fn push(self, _: &(), vm: &mut Vm) -> Result<usize, CallError> {
        vm.push(self);
        Ok(1)
    }
}

impl IntoStack for () {
    type Context = ();
    const CATEGORY: ValueCategory = ValueCategory::Nil;
    const RESULTS: usize = 0;

    fn context(_: &ExportContext<'_>) -> Result<(), BindError> {
        Ok(())
    }

    fn push(self, _: &(), _: &mut Vm) -> Result<usize, CallError> {
        Ok(0)
    }
}

// ============================================================================
// Wrappers
// ============================================================================

impl<T: FromStack> FromStack for Option<T> {
    type Context = T::Context;
    const CATEGORY: ValueCategory = T::CATEGORY;

    fn context(catalog: &TypeCatalog) -> Result<Self::Context, BindError> {
        T::context(catalog)
    }

    fn extract(cx: &Self::Context, vm: &Vm, value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Nil => Ok(None),
            value => T::extract(cx, vm, value).map(Some),
        }
    }
}

/// `None` pushes one `nil` per slot `T` would have written.
impl<T: IntoStack> IntoStack for Option<T> {
    type Context = T::Context;
    const CATEGORY: ValueCategory = T::CATEGORY;
    const RESULTS: usize = T::RESULTS;

    fn context(export: &ExportContext<'_>) -> Result<Self::Context, BindError> {
        T::context(export)
    }

    fn push(self, cx: &Self::Context, vm: &mut Vm) -> Result<usize, CallError> {
        match self {
            Some(value) => value.push(cx, vm),
            None => {
                for _ in 0..T::RESULTS {
                    vm.push(Value::Nil);
                }
                Ok(T::RESULTS)
            }
        }
    }

    fn anchor(cx: &Self::Context) -> Option<Value> {
        T::anchor(cx)
    }
}

/// `Err` is raised as a runtime error carrying its message.
impl<T: IntoStack, E: Display> IntoStack for Result<T, E> {
    type Context = T::Context;
    const CATEGORY: ValueCategory = T::CATEGORY;
    const RESULTS: usize = T::RESULTS;

    fn context(export: &ExportContext<'_>) -> Result<Self::Context, BindError> {
        T::context(export)
    }

    fn push(self, cx: &Self::Context, vm: &mut Vm) -> Result<usize, CallError> {
        match self {
            Ok(value) => value.push(cx, vm),
            Err(error) => Err(CallError::Native(error.to_string())),
        }
    }

    fn anchor(cx: &Self::Context) -> Option<Value> {
        T::anchor(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract<T: FromStack<Context = ()>>(value: Value) -> Result<T, ConversionError> {
        let vm = Vm::new();
        T::extract(&(), &vm, &value)
    }

    fn push<T: IntoStack<Context = ()>>(value: T) -> Vec<Value> {
        let mut vm = Vm::new();
        let count = value.push(&(), &mut vm).unwrap();
        vm.pop_many(count)
    }

    // ========================================================================
    // Integers
    // ========================================================================

    #[test]
    fn integer_round_trip() {
        for v in [i32::MIN, -1, 0, 1, i32::MAX] {
            let pushed = push(v);
            assert_eq!(pushed, vec![Value::Integer(v as i64)]);
            assert_eq!(extract::<i32>(pushed[0].clone()), Ok(v));
        }
        assert_eq!(extract::<i64>(Value::Integer(i64::MIN)), Ok(i64::MIN));
    }

    #[test]
    fn narrowing_is_range_checked() {
        assert_eq!(extract::<i8>(Value::Integer(127)), Ok(127));
        assert_eq!(
            extract::<i8>(Value::Integer(128)),
            Err(ConversionError::IntegerOverflow {
                value: 128,
                target_type: "i8"
            })
        );
        assert!(extract::<u32>(Value::Integer(-1)).is_err());
        assert_eq!(extract::<u16>(Value::Integer(65535)), Ok(65535));
    }

    #[test]
    fn u64_reinterprets_bits() {
        let pushed = push(u64::MAX);
        assert_eq!(pushed, vec![Value::Integer(-1)]);
        assert_eq!(extract::<u64>(Value::Integer(-1)), Ok(u64::MAX));
    }

    #[test]
    fn integral_floats_accepted() {
        assert_eq!(extract::<i32>(Value::Number(4.0)), Ok(4));
        assert_eq!(
            extract::<i32>(Value::Number(4.5)),
            Err(ConversionError::NotIntegral { value: 4.5 })
        );
    }

    #[test]
    fn integer_type_mismatch() {
        assert_eq!(
            extract::<i32>(Value::from("12")),
            Err(ConversionError::TypeMismatch {
                expected: "integer",
                actual: "string"
            })
        );
    }

    // ========================================================================
    // Floats, booleans, strings
    // ========================================================================

    #[test]
    fn float_round_trip() {
        let pushed = push(2.5f64);
        assert_eq!(extract::<f64>(pushed[0].clone()), Ok(2.5));
        assert_eq!(extract::<f32>(Value::Number(0.5)), Ok(0.5));
        assert_eq!(extract::<f64>(Value::Integer(3)), Ok(3.0));
    }

    #[test]
    fn bool_uses_truthiness() {
        assert_eq!(extract::<bool>(Value::Nil), Ok(false));
        assert_eq!(extract::<bool>(Value::Boolean(false)), Ok(false));
        assert_eq!(extract::<bool>(Value::Integer(0)), Ok(true));
        assert_eq!(push(true), vec![Value::Boolean(true)]);
    }

    #[test]
    fn string_round_trip() {
        let pushed = push(String::from("hello"));
        assert_eq!(extract::<String>(pushed[0].clone()), Ok("hello".to_string()));
        assert!(extract::<String>(Value::Integer(1)).is_err());
    }

    #[test]
    fn unit_pushes_nothing() {
        assert!(push(()).is_empty());
    }

    #[test]
    fn option_maps_nil() {
        assert_eq!(extract::<Option<i32>>(Value::Nil), Ok(None));
        assert_eq!(extract::<Option<i32>>(Value::Integer(2)), Ok(Some(2)));
        assert_eq!(push(None::<i32>), vec![Value::Nil]);
    }

    #[test]
    fn option_result_count_matches_both_branches() {
        assert!(push(Some(())).is_empty());
        assert!(push(None::<()>).is_empty());
        assert_eq!(push(Some(Some(3))), vec![Value::Integer(3)]);
        assert_eq!(push(None::<Option<i32>>), vec![Value::Nil]);
    }

    #[test]
    fn result_error_is_raised() {
        let mut vm = Vm::new();
        let result: Result<i32, String> = Err("nope".into());
        assert_eq!(
            result.push(&(), &mut vm),
            Err(CallError::Native("nope".into()))
        );
        assert_eq!(vm.top(), 0);
    }
}
