//! Bit-level reader with bounded operations.

use crate::error::{BitError, BitResult};

/// A bit-level reader for decoding packed binary data.
///
/// All read operations are bounds-checked and return errors on failure.
/// The reader never panics on malformed input.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
    bit_end: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a new `BitReader` from a byte slice.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_pos: 0,
            bit_end: data.len().saturating_mul(8),
        }
    }

    /// Returns the bit offset at which this reader stops.
    #[must_use]
    pub const fn bit_len(&self) -> usize {
        self.bit_end
    }

    /// Returns the number of bits remaining to read.
    #[must_use]
    pub const fn bits_remaining(&self) -> usize {
        self.bit_len().saturating_sub(self.bit_pos)
    }

    /// Returns `true` if there are no more bits to read.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits_remaining() == 0
    }

    /// Returns the current bit position.
    #[must_use]
    pub const fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Reads a single bit as a boolean.
    pub fn read_bit(&mut self) -> BitResult<bool> {
        self.ensure_bits(1)?;
        let byte = self.data[self.bit_pos / 8];
        let bit = (byte >> (self.bit_pos % 8)) & 1;
        self.bit_pos += 1;
        Ok(bit == 1)
    }

    /// Reads up to 64 bits as an unsigned integer, least significant bit first.
    pub fn read_bits(&mut self, bits: u8) -> BitResult<u64> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        if bits == 0 {
            return Ok(0);
        }
        self.ensure_bits(bits as usize)?;

        let mut value = 0u64;
        for shift in 0..bits {
            value |= u64::from(self.read_bit()?) << shift;
        }
        Ok(value)
    }

    /// Reads a variable-length unsigned integer (`ubitvar`).
    ///
    /// Six bits are read first: the low nibble holds the low four bits of the
    /// value and bits 4-5 select how many high bits follow (0, 4, 8 or 28).
    pub fn read_ubitvar(&mut self) -> BitResult<u32> {
        let prefix = self.read_bits(6)? as u32;
        let low = prefix & 0xF;
        let high = match prefix & 0x30 {
            0x10 => self.read_bits(4)?,
            0x20 => self.read_bits(8)?,
            0x30 => self.read_bits(28)?,
            _ => 0,
        };
        Ok(low | ((high as u32) << 4))
    }

    /// Reads a 7-bit group varint `u32` (not byte aligned).
    pub fn read_varu32(&mut self) -> BitResult<u32> {
        let mut result = 0u32;
        for shift in (0..35).step_by(7) {
            let byte = self.read_bits(8)? as u32;
            result |= (byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(BitError::InvalidVarint)
    }

    /// Reads a zigzag varint `i32`.
    pub fn read_vars32(&mut self) -> BitResult<i32> {
        let value = self.read_varu32()?;
        Ok(((value >> 1) as i32) ^ (-((value & 1) as i32)))
    }

    /// Splits off a reader over the next `bits` bits and advances past them.
    ///
    /// The returned reader cannot read beyond its window; positions it reports
    /// are relative to the start of the underlying buffer.
    pub fn take_bits(&mut self, bits: usize) -> BitResult<BitReader<'a>> {
        self.ensure_bits(bits)?;
        let window = BitReader {
            data: self.data,
            bit_pos: self.bit_pos,
            bit_end: self.bit_pos + bits,
        };
        self.bit_pos += bits;
        Ok(window)
    }

    /// Skips `bits` bits without decoding them.
    pub fn skip_bits(&mut self, bits: usize) -> BitResult<()> {
        self.ensure_bits(bits)?;
        self.bit_pos += bits;
        Ok(())
    }

    fn ensure_bits(&self, bits: usize) -> BitResult<()> {
        let available = self.bits_remaining();
        if bits > available {
            return Err(BitError::UnexpectedEof {
                requested: bits,
                available,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reader() {
        let reader = BitReader::new(&[]);
        assert!(reader.is_empty());
        assert_eq!(reader.bits_remaining(), 0);
        assert_eq!(reader.bit_position(), 0);
    }

    #[test]
    fn read_from_empty_fails() {
        let mut reader = BitReader::new(&[]);
        let result = reader.read_bit();
        assert!(matches!(result, Err(BitError::UnexpectedEof { .. })));
    }

    #[test]
    fn bits_are_lsb_first() {
        let mut reader = BitReader::new(&[0b0000_0101]);
        assert!(reader.read_bit().unwrap());
        assert!(!reader.read_bit().unwrap());
        assert!(reader.read_bit().unwrap());
    }

    #[test]
    fn read_bits_across_bytes() {
        let mut reader = BitReader::new(&[0b1111_0000, 0b0000_1111]);
        assert_eq!(reader.read_bits(4).unwrap(), 0);
        assert_eq!(reader.read_bits(8).unwrap(), 0xFF);
        assert_eq!(reader.bits_remaining(), 4);
    }

    #[test]
    fn read_bits_rejects_oversized_count() {
        let mut reader = BitReader::new(&[0; 16]);
        let err = reader.read_bits(65).unwrap_err();
        assert!(matches!(err, BitError::InvalidBitCount { bits: 65, .. }));
    }

    #[test]
    fn read_bits_past_end_does_not_advance() {
        let mut reader = BitReader::new(&[0xFF]);
        reader.read_bits(5).unwrap();
        let err = reader.read_bits(4).unwrap_err();
        assert_eq!(
            err,
            BitError::UnexpectedEof {
                requested: 4,
                available: 3
            }
        );
        assert_eq!(reader.bit_position(), 5);
    }

    #[test]
    fn read_ubitvar_small() {
        // prefix 0b00_0111: selector 0, value 7
        let mut reader = BitReader::new(&[0b0000_0111]);
        assert_eq!(reader.read_ubitvar().unwrap(), 7);
        assert_eq!(reader.bit_position(), 6);
    }

    #[test]
    fn read_ubitvar_four_extra_bits() {
        // prefix 0b01_0010 (selector 1, low nibble 2), then high nibble 0b0011 => 0x32
        let mut reader = BitReader::new(&[0b1101_0010, 0b0000_0000]);
        assert_eq!(reader.read_ubitvar().unwrap(), 0x32);
        assert_eq!(reader.bit_position(), 10);
    }

    #[test]
    fn read_varu32() {
        let mut reader = BitReader::new(&[0xAC, 0x02]);
        assert_eq!(reader.read_varu32().unwrap(), 300);
    }

    #[test]
    fn read_vars32() {
        let mut reader = BitReader::new(&[0x01]);
        assert_eq!(reader.read_vars32().unwrap(), -1);
    }

    #[test]
    fn read_varu32_invalid() {
        let mut reader = BitReader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
        let err = reader.read_varu32().unwrap_err();
        assert!(matches!(err, BitError::InvalidVarint));
    }

    #[test]
    fn take_bits_bounds_the_window() {
        let mut reader = BitReader::new(&[0b1010_1010, 0xFF]);
        reader.read_bits(3).unwrap();
        let mut window = reader.take_bits(4).unwrap();
        assert_eq!(reader.bit_position(), 7);
        assert_eq!(window.bits_remaining(), 4);
        assert_eq!(window.read_bits(4).unwrap(), 0b0101);
        assert!(window.is_empty());
        assert!(matches!(
            window.read_bit(),
            Err(BitError::UnexpectedEof { available: 0, .. })
        ));
        assert!(reader.take_bits(10).is_err());
    }

    #[test]
    fn skip_bits_bounds() {
        let mut reader = BitReader::new(&[0xFF]);
        reader.skip_bits(6).unwrap();
        assert!(reader.skip_bits(3).is_err());
        assert_eq!(reader.bits_remaining(), 2);
    }
}
