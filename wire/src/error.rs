//! Error types for wire format operations.

use bitstream::BitError;

/// Result type for wire format operations.
pub type WireResult<T> = Result<T, DecodeError>;

/// Decode errors for message framing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The header ran out of bits.
    #[error("truncated message: {0}")]
    Bitstream(#[from] BitError),

    /// A configured field width is unusable.
    #[error("invalid width {bits} for {field}")]
    InvalidBitWidth { field: &'static str, bits: u8 },

    /// More headers announced than the message allows.
    #[error("updated entries {updated} exceeds max entries {max_entries}")]
    UpdatedEntriesOutOfRange { updated: u32, max_entries: u32 },

    /// A delta must reference an older tick.
    #[error("delta from tick {delta_from} is not older than tick {tick}")]
    InvalidDeltaTick { tick: u32, delta_from: u32 },

    /// Body length exceeds the configured limit.
    #[error("body of {body_bits} bits exceeds limit {limit}")]
    BodyTooLarge { body_bits: usize, limit: usize },

    /// Body length exceeds what is left in the buffer.
    #[error("body of {body_bits} bits but only {available} bits available")]
    BodyTruncated { body_bits: usize, available: usize },
}

/// Errors that can occur during encoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// A header field does not fit its configured width.
    #[error("{field} value {value} does not fit in {bits} bits")]
    FieldTooWide {
        field: &'static str,
        value: u64,
        bits: u8,
    },

    /// Limits are not usable for encoding.
    #[error("invalid limits: {0}")]
    InvalidLimits(DecodeError),
}
