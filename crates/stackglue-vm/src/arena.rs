//! Generational arena backing every collectable runtime object.

use std::fmt;

/// Index into an [`Arena`] slot plus the generation it was issued for.
///
/// A handle outlives the object it names; once the slot is reused the
/// generation no longer matches and lookups return `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    /// Slot index
    pub index: u32,
    /// Generation for stale handle detection
    pub generation: u32,
}

/// Slot storage with generation tracking and a per-slot mark bit used by the
/// collector.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    live: usize,
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
    marked: bool,
}

impl<T> Arena<T> {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Store a value, reusing a freed slot when one is available.
    pub fn insert(&mut self, value: T) -> Handle {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            slot.marked = false;
            Handle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
                marked: false,
            });
            Handle {
                index,
                generation: 0,
            }
        }
    }

    fn slot(&self, handle: Handle) -> Option<&Slot<T>> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.value.is_some())
    }

    fn slot_mut(&mut self, handle: Handle) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.value.is_some())
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slot(handle)?.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slot_mut(handle)?.value.as_mut()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.slot(handle).is_some()
    }

    /// Remove a value and retire its handle.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slot_mut(handle)?;
        let value = slot.value.take();
        slot.generation = slot.generation.wrapping_add(1);
        slot.marked = false;
        self.free_list.push(handle.index);
        self.live -= 1;
        value
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Handles of every live value, in slot order.
    pub fn handles(&self) -> Vec<Handle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(index, slot)| Handle {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    // ========================================================================
    // Collector support
    // ========================================================================

    pub(crate) fn clear_marks(&mut self) {
        for slot in &mut self.slots {
            slot.marked = false;
        }
    }

    /// Set the mark bit. Returns `true` only the first time a live value is
    /// marked, so callers trace each object once.
    pub(crate) fn mark(&mut self, handle: Handle) -> bool {
        match self.slot_mut(handle) {
            Some(slot) if !slot.marked => {
                slot.marked = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn unmarked(&self) -> Vec<Handle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.is_some() && !slot.marked)
            .map(|(index, slot)| Handle {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    /// Remove every unmarked value, handing them back so the caller decides
    /// when they are dropped.
    pub(crate) fn sweep(&mut self) -> Vec<T> {
        let doomed = self.unmarked();
        doomed
            .into_iter()
            .filter_map(|handle| self.remove(handle))
            .collect()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("slot_count", &self.slots.len())
            .field("live", &self.live)
            .field("free_count", &self.free_list.len())
            .finish()
    }
}
