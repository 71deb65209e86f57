//! Error types for binding, conversion and dispatch.
//!
//! ## Error Hierarchy
//!
//! ```text
//! BindError        - declaring or exporting a scope
//! CallError        - a script call into a bound constructor or method
//! └── ConversionError - one value failed to convert (carried as the reason)
//! AccessError      - borrowing the native instance behind a reference
//! ```
//!
//! `CallError` becomes a string-valued [`VmError::Runtime`] when it crosses
//! back into the runtime.

use std::fmt;

use stackglue_vm::VmError;
use thiserror::Error;

use crate::catalog::TypeCategory;
use crate::ids::{ScopeId, TypeIdx};

// ============================================================================
// Callables
// ============================================================================

/// Names the bound entry point an error was raised in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callable {
    Method { class: String, method: String },
    Constructor { class: String },
}

impl Callable {
    pub fn method(class: &str, method: &str) -> Self {
        Callable::Method {
            class: class.to_string(),
            method: method.to_string(),
        }
    }

    pub fn constructor(class: &str) -> Self {
        Callable::Constructor {
            class: class.to_string(),
        }
    }

    fn self_note(&self) -> &'static str {
        match self {
            Callable::Method { .. } => " (including self)",
            Callable::Constructor { .. } => "",
        }
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Method { class, method } => write!(f, "function '{class}:{method}'"),
            Callable::Constructor { class } => write!(f, "constructor for type '{class}'"),
        }
    }
}

// ============================================================================
// Conversion Errors
// ============================================================================

/// Why a single runtime value could not become the requested native value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("{expected} expected, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("integer {value} out of range for {target_type}")]
    IntegerOverflow {
        value: i64,
        target_type: &'static str,
    },

    #[error("number {value} has no integer representation")]
    NotIntegral { value: f64 },

    /// The value is not an envelope at all.
    #[error("'{expected}' expected, got {actual}")]
    NotAnEnvelope {
        expected: String,
        actual: &'static str,
    },

    /// The envelope was minted by a different scope.
    #[error("'{expected}' expected, got a value from another scope")]
    ForeignScope { expected: String },

    #[error("'{expected}' expected, got '{actual}'")]
    WrongType { expected: String, actual: String },

    #[error("{value} is not a valid '{type_name}' value")]
    InvalidEnumValue { type_name: String, value: i64 },
}

// ============================================================================
// Access Errors
// ============================================================================

/// Failure to borrow the native value behind a class reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("instance has been released")]
    Released,

    #[error("instance is already borrowed")]
    Borrowed,

    #[error("instance cannot be viewed as '{expected}'")]
    Incompatible { expected: &'static str },
}

// ============================================================================
// Call Errors
// ============================================================================

/// Failures raised while a script calls a bound constructor or method.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error(
        "in {}: expected {} arguments{}, got {}",
        .callable, .expected, .callable.self_note(), .actual
    )]
    ArgumentCountMismatch {
        callable: Callable,
        expected: usize,
        actual: usize,
    },

    #[error("in {callable}: invalid instance: {reason}")]
    InstanceTypeMismatch {
        callable: Callable,
        reason: ConversionError,
    },

    #[error("in {callable}: bad argument #{position}: {reason}")]
    ArgumentTypeMismatch {
        callable: Callable,
        position: usize,
        reason: ConversionError,
    },

    #[error("failed to allocate object (scope {scope}, type {type_idx} '{type_name}')")]
    AllocationFailure {
        type_name: String,
        scope: ScopeId,
        type_idx: TypeIdx,
    },

    #[error("in {callable}: instance has been released")]
    InstanceReleased { callable: Callable },

    #[error("in {callable}: instance is already borrowed")]
    InstanceBorrowed { callable: Callable },

    /// An error returned by the bound native function itself.
    #[error("{0}")]
    Native(String),
}

impl CallError {
    pub(crate) fn access(callable: &Callable, error: AccessError) -> Self {
        let callable = callable.clone();
        match error {
            AccessError::Released => CallError::InstanceReleased { callable },
            AccessError::Borrowed => CallError::InstanceBorrowed { callable },
            AccessError::Incompatible { expected } => CallError::InstanceTypeMismatch {
                callable,
                reason: ConversionError::WrongType {
                    expected: expected.to_string(),
                    actual: "incompatible view".to_string(),
                },
            },
        }
    }
}

impl From<CallError> for VmError {
    fn from(error: CallError) -> Self {
        VmError::Runtime(error.to_string())
    }
}

// ============================================================================
// Bind Errors
// ============================================================================

/// Failures while declaring types or exporting a scope.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    /// A signature mentions a type that was never declared in the scope.
    #[error("type '{type_name}' is not bound in this scope")]
    UnboundType { type_name: &'static str },

    #[error("type '{name}' is already bound")]
    DuplicateType { name: String },

    #[error("'{type_name}' already has a member named '{member}'")]
    DuplicateMember { type_name: String, member: String },

    #[error("class '{type_name}' has no constructor")]
    MissingConstructor { type_name: String },

    #[error("bound names must not be empty")]
    EmptyName,

    /// An index that no declaration in this catalog produced.
    #[error("type index {idx} was not issued by this scope")]
    UnknownType { idx: TypeIdx },

    #[error("scope cannot hold more than {limit} types")]
    TooManyTypes { limit: usize },

    #[error("'{type_name}' is bound as {actual}, expected {expected}")]
    CategoryMismatch {
        type_name: String,
        expected: TypeCategory,
        actual: TypeCategory,
    },

    #[error("class hierarchy through '{type_name}' is cyclic")]
    CyclicHierarchy { type_name: String },

    #[error("metatable for '{type_name}' has not been published")]
    NotPublished { type_name: String },

    #[error(transparent)]
    Runtime(#[from] VmError),
}
