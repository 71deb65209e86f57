//! The runtime state: heap, globals, registry and the value stack.

use std::any::Any;
use std::rc::Rc;

use crate::arena::{Arena, Handle};
use crate::error::VmError;
use crate::object::{Closure, NativeFunction, Table, Userdata};
use crate::options::VmOptions;
use crate::value::{FunctionRef, Key, TableRef, UserdataRef, Value};

/// Persistent handle pinning a value in the runtime registry.
///
/// Values held by the registry are collector roots until the key is released
/// with [`Vm::registry_unref`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegistryKey(Handle);

/// One active native call.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Frame {
    pub(crate) base: usize,
    pub(crate) function: FunctionRef,
}

/// Live object counts, mostly useful to tests and diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub tables: usize,
    pub functions: usize,
    pub userdata: usize,
    pub registry: usize,
}

/// A single-threaded scripting runtime.
///
/// The runtime exchanges values with native code through a stack: a native
/// function reads its arguments at 1-based positions of its frame, pushes
/// results, and reports how many it pushed. Every call is protected, errors
/// come back as `Err` from [`Vm::call`].
///
/// Garbage is only reclaimed by an explicit [`Vm::collect_garbage`].
pub struct Vm {
    pub(crate) options: VmOptions,
    pub(crate) tables: Arena<Table>,
    pub(crate) functions: Arena<Closure>,
    pub(crate) userdata: Arena<Userdata>,
    pub(crate) registry: Arena<Value>,
    pub(crate) globals: TableRef,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_options(VmOptions::default())
    }

    pub fn with_options(options: VmOptions) -> Self {
        let mut tables = Arena::new();
        let globals = TableRef(tables.insert(Table::default()));
        Self {
            options,
            tables,
            functions: Arena::new(),
            userdata: Arena::new(),
            registry: Arena::new(),
            globals,
            stack: Vec::new(),
            frames: Vec::new(),
        }
    }

    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    pub fn heap_stats(&self) -> HeapStats {
        HeapStats {
            tables: self.tables.len(),
            functions: self.functions.len(),
            userdata: self.userdata.len(),
            registry: self.registry.len(),
        }
    }

    // ========================================================================
    // Object creation
    // ========================================================================

    pub fn create_table(&mut self) -> TableRef {
        TableRef(self.tables.insert(Table::default()))
    }

    pub fn create_userdata(
        &mut self,
        payload: Box<dyn Any>,
        metatable: Option<TableRef>,
    ) -> UserdataRef {
        UserdataRef(self.userdata.insert(Userdata { payload, metatable }))
    }

    pub fn create_function<F>(&mut self, name: &str, function: F, upvalues: Vec<Value>) -> FunctionRef
    where
        F: Fn(&mut Vm) -> Result<usize, VmError> + 'static,
    {
        self.create_native(name, Rc::new(function), upvalues)
    }

    pub fn create_native(
        &mut self,
        name: &str,
        function: NativeFunction,
        upvalues: Vec<Value>,
    ) -> FunctionRef {
        FunctionRef(self.functions.insert(Closure {
            name: Rc::from(name),
            function,
            upvalues,
        }))
    }

    // ========================================================================
    // Object access
    // ========================================================================

    pub fn table(&self, table: TableRef) -> Result<&Table, VmError> {
        self.tables
            .get(table.0)
            .ok_or(VmError::StaleReference { kind: "table" })
    }

    fn table_mut(&mut self, table: TableRef) -> Result<&mut Table, VmError> {
        self.tables
            .get_mut(table.0)
            .ok_or(VmError::StaleReference { kind: "table" })
    }

    /// Payload of a live userdata block.
    pub fn userdata(&self, userdata: UserdataRef) -> Option<&dyn Any> {
        self.userdata.get(userdata.0).map(|block| block.payload.as_ref())
    }

    pub fn closure(&self, function: FunctionRef) -> Result<&Closure, VmError> {
        self.functions
            .get(function.0)
            .ok_or(VmError::StaleReference { kind: "function" })
    }

    pub fn metatable(&self, value: &Value) -> Option<TableRef> {
        match value {
            Value::Table(table) => self.tables.get(table.0)?.metatable,
            Value::Userdata(userdata) => self.userdata.get(userdata.0)?.metatable,
            _ => None,
        }
    }

    pub fn set_metatable(&mut self, value: &Value, metatable: Option<TableRef>) -> Result<(), VmError> {
        match value {
            Value::Table(table) => self.table_mut(*table)?.metatable = metatable,
            Value::Userdata(userdata) => {
                self.userdata
                    .get_mut(userdata.0)
                    .ok_or(VmError::StaleReference { kind: "userdata" })?
                    .metatable = metatable
            }
            other => {
                return Err(VmError::runtime(format!(
                    "cannot set the metatable of a {} value",
                    other.type_name()
                )));
            }
        }
        Ok(())
    }

    /// Raw field of `value`'s metatable, `nil` when absent.
    pub fn metamethod(&self, value: &Value, event: &str) -> Value {
        self.metatable(value)
            .and_then(|mt| self.tables.get(mt.0))
            .map(|mt| mt.get(&Key::from(event)))
            .unwrap_or_default()
    }

    pub fn raw_get(&self, table: TableRef, key: &Key) -> Result<Value, VmError> {
        Ok(self.table(table)?.get(key))
    }

    pub fn raw_set(&mut self, table: TableRef, key: Key, value: Value) -> Result<(), VmError> {
        self.table_mut(table)?.set(key, value);
        Ok(())
    }

    pub fn set_field(&mut self, table: TableRef, name: &str, value: impl Into<Value>) -> Result<(), VmError> {
        self.raw_set(table, Key::from(name), value.into())
    }

    /// `obj[key]`, following `__index` metamethods.
    pub fn index(&mut self, object: &Value, key: &Value) -> Result<Value, VmError> {
        let mut current = object.clone();
        for _ in 0..self.options.max_index_chain {
            if let Value::Table(table) = current {
                let raw = self.raw_get(table, &Key::from_value(key)?)?;
                if !raw.is_nil() {
                    return Ok(raw);
                }
            }
            let handler = self.metamethod(&current, "__index");
            match &handler {
                Value::Nil => {
                    return match current {
                        Value::Table(_) => Ok(Value::Nil),
                        other => Err(VmError::NotIndexable {
                            type_name: other.type_name(),
                        }),
                    };
                }
                Value::Function(_) => {
                    let results = self.call(&handler, vec![current, key.clone()])?;
                    return Ok(results.into_iter().next().unwrap_or_default());
                }
                _ => current = handler,
            }
        }
        Err(VmError::IndexChainTooLong {
            limit: self.options.max_index_chain,
        })
    }

    pub fn get_field(&mut self, object: &Value, name: &str) -> Result<Value, VmError> {
        self.index(object, &Value::from(name))
    }

    // ========================================================================
    // Globals and registry
    // ========================================================================

    pub fn globals(&self) -> TableRef {
        self.globals
    }

    pub fn get_global(&self, name: &str) -> Value {
        self.raw_get(self.globals, &Key::from(name))
            .unwrap_or_default()
    }

    pub fn set_global(&mut self, name: &str, value: impl Into<Value>) -> Result<(), VmError> {
        self.set_field(self.globals, name, value)
    }

    pub fn registry_ref(&mut self, value: Value) -> RegistryKey {
        RegistryKey(self.registry.insert(value))
    }

    pub fn registry_get(&self, key: RegistryKey) -> Option<&Value> {
        self.registry.get(key.0)
    }

    /// Release a registry handle. Returns `false` if it was already released.
    pub fn registry_unref(&mut self, key: RegistryKey) -> bool {
        self.registry.remove(key.0).is_some()
    }

    // ========================================================================
    // Stack
    // ========================================================================

    fn base(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.base)
    }

    /// Number of values in the current frame.
    pub fn top(&self) -> usize {
        self.stack.len() - self.base()
    }

    /// Value at 1-based position `index` of the current frame, `nil` past
    /// the top.
    pub fn get(&self, index: usize) -> Value {
        if index == 0 {
            return Value::Nil;
        }
        self.stack
            .get(self.base() + index - 1)
            .filter(|_| index <= self.top())
            .cloned()
            .unwrap_or_default()
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.stack.push(value.into());
    }

    /// Pop the topmost value of the current frame.
    pub fn pop(&mut self) -> Value {
        if self.top() == 0 {
            return Value::Nil;
        }
        self.stack.pop().unwrap_or_default()
    }

    /// Pop the topmost `count` values, in push order.
    pub fn pop_many(&mut self, count: usize) -> Vec<Value> {
        let count = count.min(self.top());
        self.stack.split_off(self.stack.len() - count)
    }

    /// 1-based upvalue of the running closure.
    pub fn upvalue(&self, index: usize) -> Value {
        self.frames
            .last()
            .and_then(|frame| self.functions.get(frame.function.0))
            .and_then(|closure| closure.upvalues.get(index.checked_sub(1)?))
            .cloned()
            .unwrap_or_default()
    }

    /// Name of the running closure.
    pub fn current_function(&self) -> Option<&str> {
        let frame = self.frames.last()?;
        Some(self.functions.get(frame.function.0)?.name())
    }

    pub fn call_depth(&self) -> usize {
        self.frames.len()
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Call `callee` with `args`.
    ///
    /// Non-function values are called through their `__call` metamethod,
    /// which receives the callee itself as its first argument.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(&mut self, callee: &Value, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
        match callee {
            Value::Function(function) => self.call_function(*function, args),
            other => match self.metamethod(other, "__call") {
                Value::Function(handler) => {
                    let mut full = Vec::with_capacity(args.len() + 1);
                    full.push(other.clone());
                    full.extend(args);
                    self.call_function(handler, full)
                }
                _ => Err(VmError::NotCallable {
                    type_name: other.type_name(),
                }),
            },
        }
    }

    /// `receiver:name(args...)`: look the method up through `__index` and
    /// call it with the receiver as the first argument.
    pub fn call_method(&mut self, receiver: &Value, name: &str, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
        let method = self.get_field(receiver, name)?;
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(receiver.clone());
        full.extend(args);
        self.call(&method, full)
    }

    fn call_function(&mut self, function: FunctionRef, args: Vec<Value>) -> Result<Vec<Value>, VmError> {
        if self.frames.len() >= self.options.max_call_depth {
            return Err(VmError::StackOverflow {
                limit: self.options.max_call_depth,
            });
        }
        let body = self.closure(function)?.function.clone();

        let base = self.stack.len();
        self.stack.extend(args);
        self.frames.push(Frame { base, function });
        let outcome = body(self);
        self.frames.pop();

        let result = outcome.and_then(|returned| {
            let available = self.stack.len().saturating_sub(base);
            if returned > available {
                Err(VmError::ResultCount {
                    function: self.closure(function)?.name().to_string(),
                    returned,
                    available,
                })
            } else {
                Ok(self.stack.split_off(self.stack.len() - returned))
            }
        });
        self.stack.truncate(base);
        result
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("tables", &self.tables)
            .field("functions", &self.functions)
            .field("userdata", &self.userdata)
            .field("registry", &self.registry)
            .field("stack", &self.stack.len())
            .field("depth", &self.frames.len())
            .finish()
    }
}
