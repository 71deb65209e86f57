/// Tunables for a [`Vm`](crate::Vm).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmOptions {
    /// Maximum nesting of native calls before `StackOverflow` is raised.
    pub max_call_depth: usize,
    /// Maximum number of `__index` hops followed by a single lookup.
    pub max_index_chain: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            max_call_depth: 200,
            max_index_chain: 100,
        }
    }
}
