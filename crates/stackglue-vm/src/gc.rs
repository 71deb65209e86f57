//! Mark-and-sweep collection with `__gc` finalizers.

use tracing::{debug, trace, warn};

use crate::arena::Handle;
use crate::value::{UserdataRef, Value};
use crate::vm::Vm;

/// Outcome of one collection cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcStats {
    pub tables_freed: usize,
    pub functions_freed: usize,
    pub userdata_freed: usize,
    /// Userdata whose `__gc` ran during this cycle.
    pub finalized: usize,
}

impl Vm {
    /// Run a full collection.
    ///
    /// Roots are the globals table, the registry, the value stack and the
    /// closures of active frames. Unreachable userdata whose metatable has a
    /// `__gc` field are kept alive long enough for the finalizer to run with
    /// the userdata as its only argument, then removed. A failing finalizer is
    /// logged and does not stop the cycle.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn collect_garbage(&mut self) -> GcStats {
        self.tables.clear_marks();
        self.functions.clear_marks();
        self.userdata.clear_marks();

        let mut work = vec![Value::Table(self.globals)];
        work.extend(
            self.registry
                .handles()
                .into_iter()
                .filter_map(|key| self.registry.get(key).cloned()),
        );
        work.extend(self.stack.iter().cloned());
        work.extend(self.frames.iter().map(|frame| Value::Function(frame.function)));
        self.propagate(work);

        let pending: Vec<(Handle, Value)> = self
            .userdata
            .unmarked()
            .into_iter()
            .filter_map(|handle| {
                let finalizer = self.metamethod(&Value::Userdata(UserdataRef(handle)), "__gc");
                (!finalizer.is_nil()).then_some((handle, finalizer))
            })
            .collect();

        // Finalizable userdata and everything they reach survive this sweep.
        self.propagate(
            pending
                .iter()
                .flat_map(|(handle, finalizer)| [Value::Userdata(UserdataRef(*handle)), finalizer.clone()])
                .collect(),
        );

        let tables = self.tables.sweep();
        let functions = self.functions.sweep();
        let userdata = self.userdata.sweep();
        let mut stats = GcStats {
            tables_freed: tables.len(),
            functions_freed: functions.len(),
            userdata_freed: userdata.len(),
            finalized: 0,
        };
        drop((tables, functions, userdata));

        for (handle, finalizer) in pending {
            let target = Value::Userdata(UserdataRef(handle));
            if let Err(error) = self.call(&finalizer, vec![target]) {
                warn!(%error, "finalizer failed");
            }
            if self.userdata.remove(handle).is_some() {
                stats.userdata_freed += 1;
            }
            stats.finalized += 1;
            trace!(index = handle.index, "finalized userdata");
        }

        debug!(
            tables = stats.tables_freed,
            functions = stats.functions_freed,
            userdata = stats.userdata_freed,
            finalized = stats.finalized,
            "collection finished"
        );
        stats
    }

    fn propagate(&mut self, mut work: Vec<Value>) {
        while let Some(value) = work.pop() {
            match value {
                Value::Table(table) => {
                    if self.tables.mark(table.0)
                        && let Some(table) = self.tables.get(table.0)
                    {
                        work.extend(table.references());
                    }
                }
                Value::Function(function) => {
                    if self.functions.mark(function.0)
                        && let Some(closure) = self.functions.get(function.0)
                    {
                        work.extend(closure.upvalues.iter().cloned());
                    }
                }
                Value::Userdata(userdata) => {
                    if self.userdata.mark(userdata.0)
                        && let Some(block) = self.userdata.get(userdata.0)
                    {
                        work.extend(block.metatable.map(Value::Table));
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::error::VmError;

    #[test]
    fn unreachable_tables_are_freed() {
        let mut vm = Vm::new();
        let kept = vm.create_table();
        vm.set_global("kept", kept).unwrap();
        vm.create_table();
        vm.create_table();

        let stats = vm.collect_garbage();
        assert_eq!(stats.tables_freed, 2);
        assert!(vm.table(kept).is_ok());
    }

    #[test]
    fn registry_pins_values() {
        let mut vm = Vm::new();
        let pinned = vm.create_table();
        let key = vm.registry_ref(Value::Table(pinned));
        vm.collect_garbage();
        assert!(vm.table(pinned).is_ok());

        vm.registry_unref(key);
        vm.collect_garbage();
        assert!(vm.table(pinned).is_err());
    }

    #[test]
    fn finalizer_runs_once_per_userdata() {
        let mut vm = Vm::new();
        let count = Rc::new(Cell::new(0));
        let seen = count.clone();
        let gc = vm.create_function(
            "__gc",
            move |vm: &mut Vm| {
                assert!(vm.get(1).as_userdata().is_some());
                seen.set(seen.get() + 1);
                Ok(0)
            },
            vec![],
        );
        let meta = vm.create_table();
        vm.set_field(meta, "__gc", gc).unwrap();
        for _ in 0..3 {
            vm.create_userdata(Box::new(()), Some(meta));
        }
        let kept = vm.create_userdata(Box::new(()), Some(meta));
        vm.set_global("kept", kept).unwrap();

        let stats = vm.collect_garbage();
        assert_eq!(stats.finalized, 3);
        assert_eq!(count.get(), 3);
        assert!(!vm.metamethod(&Value::Userdata(kept), "__gc").is_nil());

        let stats = vm.collect_garbage();
        assert_eq!(stats.finalized, 0);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn failing_finalizer_does_not_abort_cycle() {
        let mut vm = Vm::new();
        let gc = vm.create_function("__gc", |_: &mut Vm| Err(VmError::runtime("boom")), vec![]);
        let meta = vm.create_table();
        vm.set_field(meta, "__gc", gc).unwrap();
        vm.create_userdata(Box::new(()), Some(meta));
        vm.create_userdata(Box::new(()), Some(meta));

        let stats = vm.collect_garbage();
        assert_eq!(stats.finalized, 2);
        assert_eq!(vm.heap_stats().userdata, 0);
    }

    #[test]
    fn stack_values_are_roots() {
        let mut vm = Vm::new();
        let table = vm.create_table();
        vm.push(table);
        vm.collect_garbage();
        assert!(vm.table(table).is_ok());
        vm.pop();
        vm.collect_garbage();
        assert!(vm.table(table).is_err());
    }
}
