//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Once;

use stackglue::Factory;
use stackglue::vm::{Value, Vm, VmError};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route `tracing` output to the test harness. Enable with `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Heap factory that counts destroyed instances.
#[derive(Clone, Default)]
pub struct CountingFactory {
    pub destroyed: Rc<Cell<usize>>,
}

impl<T> Factory<T> for CountingFactory {
    fn create(&self, value: T) -> Option<Box<T>> {
        Some(Box::new(value))
    }

    fn destroy(&self, value: Box<T>) {
        self.destroyed.set(self.destroyed.get() + 1);
        drop(value);
    }
}

/// Factory that never allocates.
pub struct RefusingFactory;

impl<T> Factory<T> for RefusingFactory {
    fn create(&self, _: T) -> Option<Box<T>> {
        None
    }
}

/// `ClassName(args...)`
pub fn construct(vm: &mut Vm, class: &Value, args: Vec<Value>) -> Result<Value, VmError> {
    let mut results = vm.call(class, args)?;
    assert_eq!(results.len(), 1, "constructors return exactly one value");
    Ok(results.remove(0))
}

/// `namespace.name`
pub fn field(vm: &mut Vm, namespace: &Value, name: &str) -> Value {
    vm.get_field(namespace, name).unwrap()
}

/// The message of a runtime error.
pub fn runtime_message(result: Result<Vec<Value>, VmError>) -> String {
    match result {
        Err(VmError::Runtime(message)) => message,
        other => panic!("expected a runtime error, got {other:?}"),
    }
}
