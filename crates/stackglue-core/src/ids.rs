//! Identifiers tagging every value that crosses the native boundary.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_SCOPE: AtomicU32 = AtomicU32::new(1);

/// Identity of one independently built scope.
///
/// Allocated from a process-wide counter, so two scopes never share an id
/// even when they bind identically named types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

impl ScopeId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_SCOPE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dense index of a bound type within its scope: its declaration position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIdx(u32);

impl TypeIdx {
    /// Largest declaration position an index can hold.
    pub const MAX: usize = u32::MAX as usize;

    pub fn new(index: usize) -> Self {
        debug_assert!(index <= Self::MAX, "type index {index} out of range");
        Self(index as u32)
    }

    /// `None` when `index` does not fit.
    pub fn try_new(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(Self)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a class in the published metatable array. Enums have none.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetatableSlot(u32);

impl MetatableSlot {
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}
