//! Field widths and bounds for message decoding.

use crate::error::DecodeError;

/// Wire-level widths and limits for packet-entities messages.
///
/// The bit widths must match the sender exactly; the byte/bit bounds are
/// enforced during decoding to prevent resource exhaustion.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Limits {
    /// Width of an object index (and of `max_entries`/`updated_entries`).
    pub index_bits: u8,

    /// Width of a class (schema handle) id in an enter-visibility payload.
    pub class_bits: u8,

    /// Width of an object serial number.
    pub serial_bits: u8,

    /// Width of the body length field.
    pub body_length_bits: u8,

    /// Maximum body length in bits.
    pub max_body_bits: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            // 2048 networked objects
            index_bits: 11,
            class_bits: 9,
            serial_bits: 10,
            body_length_bits: 20,
            max_body_bits: 96 * 1024 * 8,
        }
    }
}

impl Limits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            index_bits: 6,
            class_bits: 4,
            serial_bits: 6,
            body_length_bits: 16,
            max_body_bits: 4096 * 8,
        }
    }

    /// Default widths with no body length restriction beyond the length field.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            index_bits: 11,
            class_bits: 9,
            serial_bits: 10,
            body_length_bits: 32,
            max_body_bits: usize::MAX,
        }
    }

    /// Number of addressable object slots.
    #[must_use]
    pub const fn max_objects(&self) -> usize {
        1usize << self.index_bits
    }

    /// Checks that every width is usable.
    pub fn validate(&self) -> Result<(), DecodeError> {
        check_width("index_bits", self.index_bits, 16)?;
        check_width("class_bits", self.class_bits, 16)?;
        check_width("serial_bits", self.serial_bits, 32)?;
        check_width("body_length_bits", self.body_length_bits, 32)?;
        Ok(())
    }
}

fn check_width(field: &'static str, bits: u8, max: u8) -> Result<(), DecodeError> {
    if bits == 0 || bits > max {
        return Err(DecodeError::InvalidBitWidth { field, bits });
    }
    Ok(())
}
