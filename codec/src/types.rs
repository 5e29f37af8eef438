//! Core types for the codec.

/// A server tick number identifying a frame.
///
/// Ticks increase monotonically over a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SnapshotTick(u32);

impl SnapshotTick {
    /// Creates a new snapshot tick.
    #[must_use]
    pub const fn new(tick: u32) -> Self {
        Self(tick)
    }

    /// Returns the raw tick value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for SnapshotTick {
    fn from(tick: u32) -> Self {
        Self(tick)
    }
}

impl From<SnapshotTick> for u32 {
    fn from(tick: SnapshotTick) -> Self {
        tick.0
    }
}

impl std::fmt::Display for SnapshotTick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Slot of a networked object, in `[0, max_objects)`.
///
/// An index alone does not identify an object across time; pair it with a
/// [`SerialNumber`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityIndex(u32);

impl EntityIndex {
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The index as a slot offset.
    #[must_use]
    pub const fn slot(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for EntityIndex {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

impl std::fmt::Display for EntityIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-slot generation counter; wraps at the configured serial width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SerialNumber(u32);

impl SerialNumber {
    #[must_use]
    pub const fn new(serial: u32) -> Self {
        Self(serial)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for SerialNumber {
    fn from(serial: u32) -> Self {
        Self(serial)
    }
}
