//! Bit-level writer for encoding packed binary data.

use crate::error::{BitError, BitResult};
use crate::reader::BitReader;

/// A growable bit-level writer.
///
/// Writes are accumulated in an internal buffer, least significant bit first.
/// Call [`finish`](Self::finish) to get the final byte buffer.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    /// Creates a new empty `BitWriter`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `BitWriter` with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            bit_len: 0,
        }
    }

    /// Returns the number of bits written so far.
    #[must_use]
    pub const fn bits_written(&self) -> usize {
        self.bit_len
    }

    /// Writes a single bit.
    pub fn write_bit(&mut self, value: bool) {
        let offset = self.bit_len % 8;
        if offset == 0 {
            self.bytes.push(0);
        }
        if value {
            if let Some(last) = self.bytes.last_mut() {
                *last |= 1 << offset;
            }
        }
        self.bit_len += 1;
    }

    /// Writes up to 64 bits from an unsigned integer, least significant bit first.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::InvalidBitCount`] if `bits > 64`.
    /// Returns [`BitError::ValueOutOfRange`] if `value` doesn't fit in `bits`.
    pub fn write_bits(&mut self, value: u64, bits: u8) -> BitResult<()> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        if bits < 64 && value >= (1u64 << bits) {
            return Err(BitError::ValueOutOfRange { value, bits });
        }
        for shift in 0..bits {
            self.write_bit((value >> shift) & 1 == 1);
        }
        Ok(())
    }

    /// Writes a variable-length unsigned integer (`ubitvar`).
    ///
    /// See [`BitReader::read_ubitvar`] for the layout.
    pub fn write_ubitvar(&mut self, value: u32) {
        let low = u64::from(value & 0xF);
        let high = u64::from(value >> 4);
        let (selector, high_bits) = if value < (1 << 4) {
            (0x00, 0)
        } else if value < (1 << 8) {
            (0x10, 4)
        } else if value < (1 << 12) {
            (0x20, 8)
        } else {
            (0x30, 28)
        };
        self.write_low_bits(low | selector, 6);
        self.write_low_bits(high, high_bits);
    }

    /// Writes a 7-bit group varint `u32` (not byte aligned).
    pub fn write_varu32(&mut self, mut value: u32) {
        loop {
            let mut byte = value & 0x7F;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.write_low_bits(u64::from(byte), 8);
            if value == 0 {
                break;
            }
        }
    }

    /// Writes a zigzag varint `i32`.
    pub fn write_vars32(&mut self, value: i32) {
        let zigzag = ((value << 1) ^ (value >> 31)) as u32;
        self.write_varu32(zigzag);
    }

    /// Appends the first `bit_len` bits of `src`, as produced by another writer.
    pub fn append_bits(&mut self, src: &[u8], bit_len: usize) -> BitResult<()> {
        let mut reader = BitReader::new(src);
        if bit_len > reader.bits_remaining() {
            return Err(BitError::UnexpectedEof {
                requested: bit_len,
                available: reader.bits_remaining(),
            });
        }
        for _ in 0..bit_len {
            self.write_bit(reader.read_bit()?);
        }
        Ok(())
    }

    /// Finishes writing and returns the byte buffer.
    ///
    /// Unused high bits of the last byte are zero.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }

    fn write_low_bits(&mut self, value: u64, bits: u8) {
        for shift in 0..bits {
            self.write_bit((value >> shift) & 1 == 1);
        }
    }
}
