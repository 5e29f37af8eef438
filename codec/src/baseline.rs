//! Double-buffered per-slot baselines.

use std::collections::BTreeMap;

use schema::ClassId;
use wire::BaselineSide;

use crate::error::{CodecResult, MalformedStream};
use crate::types::EntityIndex;

/// Encoded properties an entering object is decoded against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    pub class: ClassId,
    pub bytes: Vec<u8>,
}

/// Two sides of baselines, one slot per object index, plus per-class defaults.
///
/// The server names the side to decode from in every message. When it asks
/// for promotion the client fills the other side and acknowledges it, so a
/// lost acknowledgement leaves the named side intact.
#[derive(Debug)]
pub struct BaselineStore {
    sides: [Vec<Option<Baseline>>; 2],
    defaults: BTreeMap<ClassId, Vec<u8>>,
    active: BaselineSide,
}

impl BaselineStore {
    /// Creates an empty store with `capacity` slots per side.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            sides: [vec![None; capacity], vec![None; capacity]],
            defaults: BTreeMap::new(),
            active: BaselineSide::Zero,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.sides[0].len()
    }

    /// Registers the schema-wide fallback baseline for a class.
    pub fn set_default(&mut self, class: ClassId, bytes: Vec<u8>) {
        self.defaults.insert(class, bytes);
    }

    #[must_use]
    pub fn default_for(&self, class: ClassId) -> Option<&[u8]> {
        self.defaults.get(&class).map(Vec::as_slice)
    }

    #[must_use]
    pub fn get(&self, side: BaselineSide, index: EntityIndex) -> Option<&Baseline> {
        self.sides[side.index()].get(index.slot())?.as_ref()
    }

    /// Baseline bytes to decode `class` at `index` against.
    ///
    /// Uses the slot on `side` when its class matches, otherwise the class default.
    pub fn resolve(
        &self,
        side: BaselineSide,
        index: EntityIndex,
        class: ClassId,
    ) -> CodecResult<&[u8]> {
        match self.get(side, index) {
            Some(baseline) if baseline.class == class => Ok(baseline.bytes.as_slice()),
            _ => self
                .default_for(class)
                .ok_or_else(|| MalformedStream::MissingDefaultBaseline { class }.into()),
        }
    }

    /// Stores a baseline; out-of-range indices are ignored.
    pub fn set(&mut self, side: BaselineSide, index: EntityIndex, baseline: Baseline) {
        if let Some(slot) = self.sides[side.index()].get_mut(index.slot()) {
            *slot = Some(baseline);
        }
    }

    /// Replaces every slot of `to` with a copy of `from`.
    pub fn copy_side(&mut self, from: BaselineSide, to: BaselineSide) {
        if from == to {
            return;
        }
        let [zero, one] = &mut self.sides;
        let (src, dst) = match from {
            BaselineSide::Zero => (&*zero, one),
            BaselineSide::One => (&*one, zero),
        };
        dst.clone_from(src);
    }

    /// The side most recently filled and acknowledged.
    #[must_use]
    pub const fn active_side(&self) -> BaselineSide {
        self.active
    }

    pub fn set_active(&mut self, side: BaselineSide) {
        self.active = side;
    }

    /// Drops every per-slot baseline on both sides; class defaults stay.
    pub fn clear(&mut self) {
        for side in &mut self.sides {
            side.fill(None);
        }
        self.active = BaselineSide::Zero;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProtocolError;

    const A: ClassId = ClassId::new(1);
    const B: ClassId = ClassId::new(2);

    fn baseline(class: ClassId, byte: u8) -> Baseline {
        Baseline {
            class,
            bytes: vec![byte],
        }
    }

    #[test]
    fn resolve_prefers_matching_slot() {
        let mut store = BaselineStore::new(8);
        store.set_default(A, vec![0xAA]);
        store.set(BaselineSide::Zero, EntityIndex::new(3), baseline(A, 0x01));

        let bytes = store
            .resolve(BaselineSide::Zero, EntityIndex::new(3), A)
            .unwrap();
        assert_eq!(bytes, &[0x01]);
    }

    #[test]
    fn resolve_falls_back_on_class_mismatch() {
        let mut store = BaselineStore::new(8);
        store.set_default(B, vec![0xBB]);
        store.set(BaselineSide::Zero, EntityIndex::new(3), baseline(A, 0x01));

        let bytes = store
            .resolve(BaselineSide::Zero, EntityIndex::new(3), B)
            .unwrap();
        assert_eq!(bytes, &[0xBB]);
    }

    #[test]
    fn resolve_reads_only_named_side() {
        let mut store = BaselineStore::new(8);
        store.set_default(A, vec![0xAA]);
        store.set(BaselineSide::One, EntityIndex::new(2), baseline(A, 0x11));

        let bytes = store
            .resolve(BaselineSide::Zero, EntityIndex::new(2), A)
            .unwrap();
        assert_eq!(bytes, &[0xAA]);
    }

    #[test]
    fn resolve_without_default_is_malformed() {
        let store = BaselineStore::new(8);
        let err = store
            .resolve(BaselineSide::Zero, EntityIndex::new(0), A)
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Malformed(MalformedStream::MissingDefaultBaseline { class: A })
        );
    }

    #[test]
    fn copy_side_overwrites_target() {
        let mut store = BaselineStore::new(4);
        store.set(BaselineSide::Zero, EntityIndex::new(1), baseline(A, 1));
        store.set(BaselineSide::One, EntityIndex::new(2), baseline(B, 2));

        store.copy_side(BaselineSide::Zero, BaselineSide::One);
        assert_eq!(
            store.get(BaselineSide::One, EntityIndex::new(1)),
            Some(&baseline(A, 1))
        );
        assert_eq!(store.get(BaselineSide::One, EntityIndex::new(2)), None);
        assert_eq!(
            store.get(BaselineSide::Zero, EntityIndex::new(1)),
            Some(&baseline(A, 1))
        );
    }

    #[test]
    fn clear_keeps_defaults() {
        let mut store = BaselineStore::new(4);
        store.set_default(A, vec![7]);
        store.set(BaselineSide::One, EntityIndex::new(0), baseline(A, 1));
        store.set_active(BaselineSide::One);

        store.clear();
        assert_eq!(store.get(BaselineSide::One, EntityIndex::new(0)), None);
        assert_eq!(store.default_for(A), Some(&[7u8][..]));
        assert_eq!(store.active_side(), BaselineSide::Zero);
    }

    #[test]
    fn set_out_of_range_is_ignored() {
        let mut store = BaselineStore::new(2);
        store.set(BaselineSide::Zero, EntityIndex::new(5), baseline(A, 1));
        assert_eq!(store.get(BaselineSide::Zero, EntityIndex::new(5)), None);
        assert_eq!(store.capacity(), 2);
    }
}
