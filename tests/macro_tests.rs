//! Tests for `#[derive(Enum)]` and `#[derive(Class)]`.

mod common;

use common::{construct, field, runtime_message};
use stackglue::prelude::*;
use stackglue::{Envelope, FromStack, IntoStack, ValueCategory};

#[derive(Clone, Copy, Debug, PartialEq, Enum)]
enum Status {
    Idle = 1,
    Busy = 4,
    Failed = -2,
}

#[derive(Clone, Copy, Debug, PartialEq, Enum)]
enum Single {
    Only,
}

#[derive(Class)]
struct Wrapper<T> {
    value: T,
}

struct Machine {
    status: Status,
}

fn scope() -> ScopeRegistry {
    let mut scope = ScopeRegistry::builder("m");
    scope
        .enumeration::<Status>("Status")
        .value("IDLE", Status::Idle)
        .value("BUSY", Status::Busy)
        .value("FAILED", Status::Failed)
        .build()
        .unwrap();
    scope
        .class::<Machine>("Machine")
        .constructor(|| Machine { status: Status::Idle })
        .method("status", |this: &Machine| this.status)
        .method("set", |this: &mut Machine, status: Status| this.status = status)
        .method("wrapped", |this: &Machine| Wrapper {
            value: this.status.to_integral(),
        })
        .method("maybe", |this: &Machine| {
            (this.status == Status::Busy).then_some(Wrapper { value: 1_i64 })
        })
        .build()
        .unwrap();
    scope
        .class::<Wrapper<i64>>("Wrapper")
        .constructor(|value: i64| Wrapper { value })
        .method("get", |this: &Wrapper<i64>| this.value)
        .build()
        .unwrap();
    scope.finish().unwrap()
}

// =============================================================================
// Enum
// =============================================================================

#[test]
fn enum_derive_keeps_discriminants() {
    assert_eq!(Status::Idle.to_integral(), 1);
    assert_eq!(Status::Busy.to_integral(), 4);
    assert_eq!(Status::Failed.to_integral(), -2);
    assert_eq!(Single::Only.to_integral(), 0);

    assert_eq!(Status::from_integral(4), Some(Status::Busy));
    assert_eq!(Status::from_integral(-2), Some(Status::Failed));
    assert_eq!(Status::from_integral(0), None);
    assert_eq!(Status::from_integral(2), None);
}

#[test]
fn enum_derive_marshals_as_enum() {
    assert_eq!(<Status as FromStack>::CATEGORY, ValueCategory::Enum);
    assert_eq!(<Status as IntoStack>::CATEGORY, ValueCategory::Enum);
}

#[test]
fn derived_enum_values_published_with_discriminants() {
    let mut registry = scope();
    let mut vm = Vm::new();
    let ns = Value::Table(registry.export(&mut vm).unwrap());
    let statuses = field(&mut vm, &ns, "Status");

    for (name, integral) in [("IDLE", 1), ("BUSY", 4), ("FAILED", -2)] {
        let value = field(&mut vm, &statuses, name);
        let envelope = Envelope::from_value(&vm, &value).unwrap();
        assert_eq!(envelope.integral_value(), Some(integral), "{name}");
    }
}

#[test]
fn derived_enums_pass_through_methods() {
    let mut registry = scope();
    let mut vm = Vm::new();
    let ns = Value::Table(registry.export(&mut vm).unwrap());
    let statuses = field(&mut vm, &ns, "Status");
    let failed = field(&mut vm, &statuses, "FAILED");
    let class = field(&mut vm, &ns, "Machine");
    let machine = construct(&mut vm, &class, vec![]).unwrap();

    vm.call_method(&machine, "set", vec![failed]).unwrap();
    let status = vm.call_method(&machine, "status", vec![]).unwrap().remove(0);
    assert_eq!(registry.decode::<Status>(&vm, &status), Ok(Status::Failed));

    assert_eq!(
        runtime_message(vm.call_method(&machine, "set", vec![Value::Integer(4)])),
        "in function 'Machine:set': bad argument #2: 'Status' expected, got number"
    );
}

// =============================================================================
// Class
// =============================================================================

#[test]
fn class_derive_supports_generic_types() {
    let mut registry = scope();
    let mut vm = Vm::new();
    let ns = Value::Table(registry.export(&mut vm).unwrap());
    let statuses = field(&mut vm, &ns, "Status");
    let busy = field(&mut vm, &statuses, "BUSY");
    let class = field(&mut vm, &ns, "Machine");
    let machine = construct(&mut vm, &class, vec![]).unwrap();

    vm.call_method(&machine, "set", vec![busy]).unwrap();
    let wrapped = vm.call_method(&machine, "wrapped", vec![]).unwrap().remove(0);
    assert_eq!(vm.call_method(&wrapped, "get", vec![]), Ok(vec![Value::Integer(4)]));

    let ptr: Ptr<Wrapper<i64>> = registry.decode(&vm, &wrapped).unwrap();
    assert_eq!(ptr.with(|wrapper| wrapper.value), Ok(4));
}

#[test]
fn optional_class_results() {
    let mut registry = scope();
    let mut vm = Vm::new();
    let ns = Value::Table(registry.export(&mut vm).unwrap());
    let class = field(&mut vm, &ns, "Machine");
    let machine = construct(&mut vm, &class, vec![]).unwrap();

    assert_eq!(vm.call_method(&machine, "maybe", vec![]), Ok(vec![Value::Nil]));

    let statuses = field(&mut vm, &ns, "Status");
    let busy = field(&mut vm, &statuses, "BUSY");
    vm.call_method(&machine, "set", vec![busy]).unwrap();
    let some = vm.call_method(&machine, "maybe", vec![]).unwrap().remove(0);
    assert_eq!(vm.call_method(&some, "get", vec![]), Ok(vec![Value::Integer(1)]));
}

#[test]
fn derived_results_are_collected() {
    let mut registry = scope();
    let mut vm = Vm::new();
    let ns = Value::Table(registry.export(&mut vm).unwrap());
    let class = field(&mut vm, &ns, "Machine");
    let machine = construct(&mut vm, &class, vec![]).unwrap();
    vm.set_global("machine", machine.clone()).unwrap();
    let before = vm.heap_stats().userdata;

    for _ in 0..3 {
        vm.call_method(&machine, "wrapped", vec![]).unwrap();
    }
    assert_eq!(vm.collect_garbage().finalized, 3);
    assert_eq!(vm.heap_stats().userdata, before);
}
