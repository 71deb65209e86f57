//! Heap object kinds: tables, userdata and native closures.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::VmError;
use crate::value::{Key, TableRef, Value};
use crate::vm::Vm;

/// Associative array with an optional metatable.
#[derive(Debug, Default)]
pub struct Table {
    entries: FxHashMap<Key, Value>,
    pub(crate) metatable: Option<TableRef>,
}

impl Table {
    pub fn get(&self, key: &Key) -> Value {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    /// Assigning `nil` removes the entry.
    pub fn set(&mut self, key: Key, value: Value) {
        if value.is_nil() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.keys()
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable
    }

    /// Heap objects reachable from this table.
    pub(crate) fn references(&self) -> Vec<Value> {
        let mut refs: Vec<Value> = self
            .entries
            .iter()
            .flat_map(|(key, value)| [key.to_value(), value.clone()])
            .filter(is_heap)
            .collect();
        refs.extend(self.metatable.map(Value::Table));
        refs
    }
}

/// Opaque host payload with an optional metatable.
pub struct Userdata {
    pub(crate) payload: Box<dyn Any>,
    pub(crate) metatable: Option<TableRef>,
}

impl fmt::Debug for Userdata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Userdata")
            .field("metatable", &self.metatable)
            .finish_non_exhaustive()
    }
}

/// Body of a native function.
///
/// Arguments are read from the current frame with [`Vm::get`]; the function
/// pushes its results and returns how many it pushed.
pub type NativeFunction = Rc<dyn Fn(&mut Vm) -> Result<usize, VmError>>;

/// A native function plus the values it closes over.
#[derive(Clone)]
pub struct Closure {
    pub(crate) name: Rc<str>,
    pub(crate) function: NativeFunction,
    pub(crate) upvalues: Vec<Value>,
}

impl Closure {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn upvalues(&self) -> &[Value] {
        &self.upvalues
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("name", &self.name)
            .field("upvalues", &self.upvalues.len())
            .finish()
    }
}

fn is_heap(value: &Value) -> bool {
    matches!(
        value,
        Value::Table(_) | Value::Function(_) | Value::Userdata(_)
    )
}
