//! Fixed-size set of object slots backed by a roaring bitmap.

use roaring::RoaringBitmap;

/// A fixed-capacity set of object slots.
///
/// Slots outside `[0, capacity)` are never stored; writes there are ignored
/// and reads return `false`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityBitSet {
    bits: RoaringBitmap,
    capacity: usize,
}

impl EntityBitSet {
    /// Creates an empty set able to hold `capacity` slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            bits: RoaringBitmap::new(),
            capacity,
        }
    }

    /// Returns the number of addressable slots.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sets a bit; returns `false` if `slot` is out of range.
    pub fn set(&mut self, slot: usize) -> bool {
        match self.key(slot) {
            Some(key) => {
                self.bits.insert(key);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self, slot: usize) {
        if let Some(key) = self.key(slot) {
            self.bits.remove(key);
        }
    }

    #[must_use]
    pub fn contains(&self, slot: usize) -> bool {
        self.key(slot).is_some_and(|key| self.bits.contains(key))
    }

    /// Returns the first set bit at or after `from`.
    #[must_use]
    pub fn next_set_bit(&self, from: usize) -> Option<usize> {
        let from = self.key(from)?;
        let found = match from.checked_sub(1) {
            None => self.bits.min(),
            Some(before) => {
                let rank = u32::try_from(self.bits.rank(before)).ok()?;
                self.bits.select(rank)
            }
        };
        found.map(|key| key as usize)
    }

    /// Iterates set bits in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().map(|key| key as usize)
    }

    /// Bits set in `self` but not in `other`.
    #[must_use]
    pub fn and_not(&self, other: &Self) -> Self {
        Self {
            bits: &self.bits - &other.bits,
            capacity: self.capacity,
        }
    }

    /// Overwrites this set with the contents of `other`.
    pub fn copy_from(&mut self, other: &Self) {
        self.bits.clone_from(&other.bits);
        if other.capacity > self.capacity {
            if let Ok(limit) = u32::try_from(self.capacity) {
                self.bits.remove_range(limit..);
            }
        }
    }

    pub fn clear_all(&mut self) {
        self.bits.clear();
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.len() as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    fn key(&self, slot: usize) -> Option<u32> {
        if slot < self.capacity {
            u32::try_from(slot).ok()
        } else {
            None
        }
    }
}
