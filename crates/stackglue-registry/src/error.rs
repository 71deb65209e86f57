//! Errors of host-side scope operations.

use stackglue_core::{BindError, CallError, ConversionError};
use thiserror::Error;

/// Failures of host-side operations on an exported scope.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScopeError {
    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Call(#[from] CallError),
}
