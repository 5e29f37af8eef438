//! Per-slot cache of live objects.

use schema::ClassId;

use crate::types::{EntityIndex, SerialNumber};

/// What the decoder remembers about a live object.
///
/// The handle is owned by the object system; the cache only keeps it to
/// address later calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<H> {
    pub handle: H,
    pub serial: SerialNumber,
    pub class: ClassId,
    /// Left visibility but not deleted.
    pub dormant: bool,
}

impl<H> CacheEntry<H> {
    /// Returns `true` if an enter with this identity refers to the same object.
    #[must_use]
    pub fn matches(&self, serial: SerialNumber, class: ClassId) -> bool {
        self.serial == serial && self.class == class
    }
}

/// Live objects indexed by slot, scoped to one connection.
#[derive(Debug)]
pub struct ObjectCache<H> {
    slots: Vec<Option<CacheEntry<H>>>,
}

impl<H> ObjectCache<H> {
    /// Creates a cache with `capacity` empty slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    /// Returns the entry at `index`.
    #[must_use]
    pub fn get(&self, index: EntityIndex) -> Option<&CacheEntry<H>> {
        self.slots.get(index.slot())?.as_ref()
    }

    /// Returns the entry at `index` for in-place updates.
    pub fn get_mut(&mut self, index: EntityIndex) -> Option<&mut CacheEntry<H>> {
        self.slots.get_mut(index.slot())?.as_mut()
    }

    /// Stores an entry, returning the one it replaced.
    pub fn insert(&mut self, index: EntityIndex, entry: CacheEntry<H>) -> Option<CacheEntry<H>> {
        self.slots.get_mut(index.slot())?.replace(entry)
    }

    /// Takes the entry out of its slot.
    pub fn remove(&mut self, index: EntityIndex) -> Option<CacheEntry<H>> {
        self.slots.get_mut(index.slot())?.take()
    }

    /// Live entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityIndex, &CacheEntry<H>)> {
        self.slots.iter().enumerate().filter_map(|(slot, entry)| {
            entry
                .as_ref()
                .map(|entry| (EntityIndex::new(slot as u32), entry))
        })
    }

    /// Number of cached objects, dormant ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry, returning them in index order.
    pub fn drain(&mut self) -> Vec<(EntityIndex, CacheEntry<H>)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(slot, entry)| entry.take().map(|e| (EntityIndex::new(slot as u32), e)))
            .collect()
    }
}
