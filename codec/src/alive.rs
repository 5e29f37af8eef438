//! Alive-set bookkeeping used to synthesize implicit removals.

use crate::bitset::EntityBitSet;
use crate::types::EntityIndex;

/// Double-buffered alive set.
///
/// During a message, objects that are entered, updated or preserved are
/// marked in `current`. [`reconcile`](Self::reconcile) then reports every
/// object alive last message but not this one, and rolls the buffers.
#[derive(Debug, Clone)]
pub struct AliveTracker {
    current: EntityBitSet,
    previous: EntityBitSet,
}

impl AliveTracker {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            current: EntityBitSet::new(capacity),
            previous: EntityBitSet::new(capacity),
        }
    }

    pub fn mark_alive(&mut self, index: EntityIndex) {
        self.current.set(index.slot());
    }

    /// Marked during the message being applied.
    #[must_use]
    pub fn is_alive(&self, index: EntityIndex) -> bool {
        self.current.contains(index.slot())
    }

    /// Alive after the last reconciliation.
    #[must_use]
    pub fn was_alive(&self, index: EntityIndex) -> bool {
        self.previous.contains(index.slot())
    }

    /// Removes an explicitly deleted object from both buffers.
    pub fn forget(&mut self, index: EntityIndex) {
        self.current.clear(index.slot());
        self.previous.clear(index.slot());
    }

    /// Returns `previous AND NOT current`, then `previous := current` and
    /// `current := empty`.
    pub fn reconcile(&mut self) -> Vec<EntityIndex> {
        let removed = self
            .previous
            .and_not(&self.current)
            .iter()
            .map(|slot| EntityIndex::new(slot as u32))
            .collect();
        self.previous.copy_from(&self.current);
        self.current.clear_all();
        removed
    }

    pub fn clear(&mut self) {
        self.current.clear_all();
        self.previous.clear_all();
    }
}
