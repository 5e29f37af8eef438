//! Decoded frames and the bounded frame history.

use std::num::NonZeroUsize;

use schema::ClassId;

use crate::bitset::EntityBitSet;
use crate::error::{CodecResult, MalformedStream, SequenceViolation};
use crate::types::{EntityIndex, SerialNumber, SnapshotTick};

/// Identity of an object transmitted in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameEntity {
    pub index: EntityIndex,
    pub class: ClassId,
    pub serial: SerialNumber,
}

/// The set of objects the server considered transmitted at a tick.
///
/// Immutable once committed. Bits of `transmitted` are only set at or below
/// `highest`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    tick: SnapshotTick,
    transmitted: EntityBitSet,
    highest: Option<EntityIndex>,
    entities: Vec<FrameEntity>,
}

impl Frame {
    #[must_use]
    pub const fn tick(&self) -> SnapshotTick {
        self.tick
    }

    #[must_use]
    pub const fn transmitted(&self) -> &EntityBitSet {
        &self.transmitted
    }

    /// Highest index transmitted while decoding this frame.
    ///
    /// An explicit delete clears the transmitted bit but leaves this value.
    #[must_use]
    pub const fn highest(&self) -> Option<EntityIndex> {
        self.highest
    }

    /// Transmitted objects in increasing index order.
    #[must_use]
    pub fn entities(&self) -> &[FrameEntity] {
        &self.entities
    }

    #[must_use]
    pub fn entity(&self, index: EntityIndex) -> Option<&FrameEntity> {
        self.entities
            .binary_search_by_key(&index, |entity| entity.index)
            .ok()
            .map(|pos| &self.entities[pos])
    }

    #[must_use]
    pub fn is_transmitted(&self, index: EntityIndex) -> bool {
        self.transmitted.contains(index.slot())
    }
}

/// Accumulates a frame during one decode pass.
#[derive(Debug)]
pub(crate) struct FrameBuilder {
    frame: Frame,
}

impl FrameBuilder {
    pub(crate) fn new(tick: SnapshotTick, capacity: usize) -> Self {
        Self {
            frame: Frame {
                tick,
                transmitted: EntityBitSet::new(capacity),
                highest: None,
                entities: Vec::new(),
            },
        }
    }

    /// Records a transmitted object; indices must strictly increase.
    pub(crate) fn push(&mut self, entity: FrameEntity) -> CodecResult<()> {
        if let Some(highest) = self.frame.highest {
            if entity.index <= highest {
                return Err(SequenceViolation::NonMonotonicIndex {
                    index: entity.index,
                    highest,
                }
                .into());
            }
        }
        if !self.frame.transmitted.set(entity.index.slot()) {
            return Err(MalformedStream::IndexOutOfRange {
                index: u64::from(entity.index.raw()),
                limit: self.frame.transmitted.capacity(),
            }
            .into());
        }
        self.frame.highest = Some(entity.index);
        self.frame.entities.push(entity);
        Ok(())
    }

    /// Drops an explicitly deleted object from the frame.
    pub(crate) fn remove(&mut self, index: EntityIndex) {
        self.frame.transmitted.clear(index.slot());
        if let Ok(pos) = self
            .frame
            .entities
            .binary_search_by_key(&index, |entity| entity.index)
        {
            self.frame.entities.remove(pos);
        }
    }

    pub(crate) fn finish(self) -> Frame {
        self.frame
    }
}

/// Errors that can occur when inserting into the frame history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    /// Ticks must be strictly increasing.
    OutOfOrder {
        last_tick: SnapshotTick,
        new_tick: SnapshotTick,
    },
}

impl From<HistoryError> for SequenceViolation {
    fn from(err: HistoryError) -> Self {
        match err {
            HistoryError::OutOfOrder {
                last_tick,
                new_tick,
            } => Self::StaleTick {
                tick: new_tick,
                last: last_tick,
            },
        }
    }
}

/// A fixed-capacity ring buffer of frames keyed by tick.
#[derive(Debug)]
pub struct FrameHistory {
    entries: Vec<Option<Frame>>,
    head: usize,
    len: usize,
    last_tick: Option<SnapshotTick>,
}

impl FrameHistory {
    /// Creates an empty history holding at most `capacity` frames.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        let cap = capacity.get();
        let mut entries = Vec::with_capacity(cap);
        entries.resize_with(cap, || None);
        Self {
            entries,
            head: 0,
            len: 0,
            last_tick: None,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Tick of the newest committed frame.
    #[must_use]
    pub const fn last_tick(&self) -> Option<SnapshotTick> {
        self.last_tick
    }

    /// Inserts a frame; its tick must be newer than every stored tick.
    ///
    /// When full, the oldest frame is evicted.
    pub fn insert(&mut self, frame: Frame) -> Result<(), HistoryError> {
        let tick = frame.tick();
        if let Some(last) = self.last_tick {
            if tick <= last {
                return Err(HistoryError::OutOfOrder {
                    last_tick: last,
                    new_tick: tick,
                });
            }
        }

        let cap = self.entries.len();
        if self.len < cap {
            let idx = (self.head + self.len) % cap;
            self.entries[idx] = Some(frame);
            self.len += 1;
        } else {
            self.entries[self.head] = Some(frame);
            self.head = (self.head + 1) % cap;
        }

        self.last_tick = Some(tick);
        Ok(())
    }

    /// Returns the frame for an exact tick, if present.
    #[must_use]
    pub fn get(&self, tick: SnapshotTick) -> Option<&Frame> {
        self.iter().find(|frame| frame.tick() == tick)
    }

    /// Returns the newest frame.
    #[must_use]
    pub fn latest(&self) -> Option<&Frame> {
        self.iter().next_back()
    }

    /// Drops every frame older than `tick`.
    pub fn prune_before(&mut self, tick: SnapshotTick) {
        let cap = self.entries.len();
        while self.len > 0 {
            let oldest = self.entries[self.head].as_ref().map(Frame::tick);
            match oldest {
                Some(oldest) if oldest < tick => {
                    self.entries[self.head] = None;
                    self.head = (self.head + 1) % cap;
                    self.len -= 1;
                }
                _ => break,
            }
        }
    }

    /// Forgets every frame, including the last committed tick.
    pub fn clear(&mut self) {
        self.entries.fill_with(|| None);
        self.head = 0;
        self.len = 0;
        self.last_tick = None;
    }

    /// Returns an iterator from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Frame> {
        let cap = self.entries.len();
        (0..self.len).filter_map(move |i| self.entries[(self.head + i) % cap].as_ref())
    }
}
