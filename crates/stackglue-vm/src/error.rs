//! Runtime errors.
//!
//! Every failure raised inside the runtime, including errors produced by
//! native functions, travels as a [`VmError`] through the `Result` returned
//! by [`Vm::call`](crate::Vm::call).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    /// A string-valued error raised by a native function.
    #[error("{0}")]
    Runtime(String),

    #[error("attempt to call a {type_name} value")]
    NotCallable { type_name: &'static str },

    #[error("attempt to index a {type_name} value")]
    NotIndexable { type_name: &'static str },

    /// Table keys may not be nil or NaN.
    #[error("table index is {0}")]
    InvalidKey(&'static str),

    /// A handle outlived the object it referred to.
    #[error("stale {kind} reference")]
    StaleReference { kind: &'static str },

    #[error("stack overflow (call depth limit {limit})")]
    StackOverflow { limit: usize },

    #[error("'__index' chain too long (limit {limit})")]
    IndexChainTooLong { limit: usize },

    /// A native function reported more results than it pushed.
    #[error("function '{function}' returned {returned} results but pushed {available}")]
    ResultCount {
        function: String,
        returned: usize,
        available: usize,
    },
}

impl VmError {
    /// Build a runtime error from any message.
    pub fn runtime(message: impl Into<String>) -> Self {
        VmError::Runtime(message.into())
    }
}
