//! Decoder configuration.

use std::num::NonZeroUsize;

use wire::Limits;

const DEFAULT_HISTORY: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(value) => value,
    None => unreachable!(),
};

const TESTING_HISTORY: NonZeroUsize = match NonZeroUsize::new(8) {
    Some(value) => value,
    None => unreachable!(),
};

/// Configuration for an [`EntityDecoder`](crate::EntityDecoder).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DecoderConfig {
    /// Bit widths and bounds of the message format.
    pub wire: Limits,
    /// Number of decoded frames kept for delta references.
    pub history_capacity: NonZeroUsize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            wire: Limits::default(),
            history_capacity: DEFAULT_HISTORY,
        }
    }
}

impl DecoderConfig {
    /// Creates a configuration suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            wire: Limits::for_testing(),
            history_capacity: TESTING_HISTORY,
        }
    }

    /// Number of object slots addressable by the configured index width.
    #[must_use]
    pub const fn max_objects(&self) -> usize {
        self.wire.max_objects()
    }
}
