//! Packet-entities message header.

use bitstream::{BitReader, BitWriter};

use crate::error::{DecodeError, EncodeError, WireResult};
use crate::limits::Limits;

/// Width of tick fields.
pub const TICK_BITS: u8 = 32;

/// One of the two baseline buffers kept per object slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BaselineSide {
    #[default]
    Zero,
    One,
}

impl BaselineSide {
    /// Decodes the side from its single wire bit.
    #[must_use]
    pub const fn from_bit(bit: bool) -> Self {
        if bit {
            Self::One
        } else {
            Self::Zero
        }
    }

    /// Returns the wire bit for this side.
    #[must_use]
    pub const fn bit(self) -> bool {
        matches!(self, Self::One)
    }

    /// Returns the opposite side.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Zero => Self::One,
            Self::One => Self::Zero,
        }
    }

    /// Array index for per-side storage.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Zero => 0,
            Self::One => 1,
        }
    }
}

/// Decoded header of a packet-entities message.
///
/// Field order on the wire: tick, `max_entries`, `is_delta`, `delta_from`
/// (only when delta), baseline side, `updated_entries`, `body_bits`,
/// `update_baseline`. The body follows immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PacketEntitiesHeader {
    /// Tick of the frame this message produces.
    pub tick: u32,
    /// Upper bound on object slots described by the sender.
    pub max_entries: u32,
    /// Tick of the frame this delta is computed against; `None` for a full update.
    pub delta_from: Option<u32>,
    /// Baseline side to decode entering objects against.
    pub baseline_side: BaselineSide,
    /// Number of per-object headers in the body.
    pub updated_entries: u32,
    /// Exact body length in bits.
    pub body_bits: u32,
    /// Sender asks the client to promote this frame's entering objects to a new baseline.
    pub update_baseline: bool,
}

impl PacketEntitiesHeader {
    /// Returns `true` if the message is a delta against a prior frame.
    #[must_use]
    pub const fn is_delta(&self) -> bool {
        self.delta_from.is_some()
    }
}

/// Reads and validates a header, leaving the reader at the first body bit.
pub fn decode_packet_entities_header(
    reader: &mut BitReader<'_>,
    limits: &Limits,
) -> WireResult<PacketEntitiesHeader> {
    limits.validate()?;

    let tick = reader.read_bits(TICK_BITS)? as u32;
    let max_entries = reader.read_bits(limits.index_bits)? as u32;

    let delta_from = if reader.read_bit()? {
        let from = reader.read_bits(TICK_BITS)? as u32;
        if from >= tick {
            return Err(DecodeError::InvalidDeltaTick {
                tick,
                delta_from: from,
            });
        }
        Some(from)
    } else {
        None
    };

    let baseline_side = BaselineSide::from_bit(reader.read_bit()?);
    let updated_entries = reader.read_bits(limits.index_bits)? as u32;
    if updated_entries > max_entries {
        return Err(DecodeError::UpdatedEntriesOutOfRange {
            updated: updated_entries,
            max_entries,
        });
    }

    let body_bits = reader.read_bits(limits.body_length_bits)? as u32;
    let update_baseline = reader.read_bit()?;

    let body_len = body_bits as usize;
    if body_len > limits.max_body_bits {
        return Err(DecodeError::BodyTooLarge {
            body_bits: body_len,
            limit: limits.max_body_bits,
        });
    }
    if body_len > reader.bits_remaining() {
        return Err(DecodeError::BodyTruncated {
            body_bits: body_len,
            available: reader.bits_remaining(),
        });
    }

    Ok(PacketEntitiesHeader {
        tick,
        max_entries,
        delta_from,
        baseline_side,
        updated_entries,
        body_bits,
        update_baseline,
    })
}

/// Writes a header in wire order.
pub fn encode_packet_entities_header(
    header: &PacketEntitiesHeader,
    limits: &Limits,
    writer: &mut BitWriter,
) -> Result<(), EncodeError> {
    limits.validate().map_err(EncodeError::InvalidLimits)?;

    write_field(writer, "tick", u64::from(header.tick), TICK_BITS)?;
    write_field(
        writer,
        "max_entries",
        u64::from(header.max_entries),
        limits.index_bits,
    )?;
    writer.write_bit(header.delta_from.is_some());
    if let Some(from) = header.delta_from {
        write_field(writer, "delta_from", u64::from(from), TICK_BITS)?;
    }
    writer.write_bit(header.baseline_side.bit());
    write_field(
        writer,
        "updated_entries",
        u64::from(header.updated_entries),
        limits.index_bits,
    )?;
    write_field(
        writer,
        "body_bits",
        u64::from(header.body_bits),
        limits.body_length_bits,
    )?;
    writer.write_bit(header.update_baseline);
    Ok(())
}

fn write_field(
    writer: &mut BitWriter,
    field: &'static str,
    value: u64,
    bits: u8,
) -> Result<(), EncodeError> {
    writer
        .write_bits(value, bits)
        .map_err(|_| EncodeError::FieldTooWide { field, value, bits })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_header() -> PacketEntitiesHeader {
        PacketEntitiesHeader {
            tick: 100,
            max_entries: 8,
            delta_from: None,
            baseline_side: BaselineSide::Zero,
            updated_entries: 2,
            body_bits: 0,
            update_baseline: false,
        }
    }

    fn roundtrip(header: &PacketEntitiesHeader, limits: &Limits) -> WireResult<PacketEntitiesHeader> {
        let mut writer = BitWriter::new();
        encode_packet_entities_header(header, limits, &mut writer).unwrap();
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        decode_packet_entities_header(&mut reader, limits)
    }

    #[test]
    fn baseline_side_helpers() {
        assert_eq!(BaselineSide::Zero.other(), BaselineSide::One);
        assert_eq!(BaselineSide::One.other(), BaselineSide::Zero);
        assert_eq!(BaselineSide::from_bit(true), BaselineSide::One);
        assert!(!BaselineSide::Zero.bit());
        assert_eq!(BaselineSide::One.index(), 1);
    }

    #[test]
    fn full_header_roundtrip() {
        let header = full_header();
        let decoded = roundtrip(&header, &Limits::for_testing()).unwrap();
        assert_eq!(decoded, header);
        assert!(!decoded.is_delta());
    }

    #[test]
    fn delta_header_roundtrip() {
        let header = PacketEntitiesHeader {
            delta_from: Some(97),
            baseline_side: BaselineSide::One,
            update_baseline: true,
            ..full_header()
        };
        let decoded = roundtrip(&header, &Limits::default()).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.is_delta());
    }

    #[test]
    fn header_bit_layout() {
        let limits = Limits::for_testing();
        let mut writer = BitWriter::new();
        encode_packet_entities_header(&full_header(), &limits, &mut writer).unwrap();
        // tick + max_entries + is_delta + side + updated + body_bits + update_baseline
        let expected = 32 + 6 + 1 + 1 + 6 + 16 + 1;
        assert_eq!(writer.bits_written(), expected);
    }

    #[test]
    fn rejects_updated_entries_above_max() {
        let header = PacketEntitiesHeader {
            max_entries: 2,
            updated_entries: 3,
            ..full_header()
        };
        let err = roundtrip(&header, &Limits::for_testing()).unwrap_err();
        assert!(matches!(err, DecodeError::UpdatedEntriesOutOfRange { .. }));
    }

    #[test]
    fn widest_max_entries_is_accepted() {
        let header = PacketEntitiesHeader {
            max_entries: 63,
            updated_entries: 63,
            ..full_header()
        };
        let decoded = roundtrip(&header, &Limits::for_testing()).unwrap();
        assert_eq!(decoded.max_entries, 63);
    }

    #[test]
    fn rejects_delta_from_future_tick() {
        let header = PacketEntitiesHeader {
            delta_from: Some(100),
            ..full_header()
        };
        let err = roundtrip(&header, &Limits::for_testing()).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidDeltaTick {
                tick: 100,
                delta_from: 100
            }
        ));
    }

    #[test]
    fn rejects_body_longer_than_buffer() {
        let header = PacketEntitiesHeader {
            body_bits: 64,
            ..full_header()
        };
        let err = roundtrip(&header, &Limits::for_testing()).unwrap_err();
        assert!(matches!(err, DecodeError::BodyTruncated { body_bits: 64, .. }));
    }

    #[test]
    fn rejects_body_above_limit() {
        let limits = Limits {
            max_body_bits: 8,
            ..Limits::for_testing()
        };
        let header = PacketEntitiesHeader {
            body_bits: 9,
            ..full_header()
        };
        let err = roundtrip(&header, &limits).unwrap_err();
        assert!(matches!(err, DecodeError::BodyTooLarge { .. }));
    }

    #[test]
    fn truncated_header_is_bitstream_error() {
        let mut reader = BitReader::new(&[0u8; 3]);
        let err = decode_packet_entities_header(&mut reader, &Limits::default()).unwrap_err();
        assert!(matches!(err, DecodeError::Bitstream(_)));
    }

    #[test]
    fn encode_rejects_field_wider_than_index_bits() {
        let header = PacketEntitiesHeader {
            max_entries: 64,
            updated_entries: 64,
            ..full_header()
        };
        let mut writer = BitWriter::new();
        let err =
            encode_packet_entities_header(&header, &Limits::for_testing(), &mut writer).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::FieldTooWide {
                field: "max_entries",
                ..
            }
        ));
    }
}
