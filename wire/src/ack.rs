//! Reliable baseline acknowledgement sent from client to server.

use bitstream::{BitReader, BitWriter};

use crate::error::{EncodeError, WireResult};
use crate::header::{BaselineSide, TICK_BITS};

/// Encoded size of a [`BaselineAck`] in bits.
pub const BASELINE_ACK_BITS: usize = TICK_BITS as usize + 1;

/// Tells the server which tick's objects now live in which baseline side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BaselineAck {
    pub tick: u32,
    pub side: BaselineSide,
}

/// Encodes an ack as tick (32 bits) followed by the side bit.
pub fn encode_baseline_ack(ack: &BaselineAck) -> Result<Vec<u8>, EncodeError> {
    let mut writer = BitWriter::with_capacity(BASELINE_ACK_BITS.div_ceil(8));
    let tick = u64::from(ack.tick);
    writer
        .write_bits(tick, TICK_BITS)
        .map_err(|_| EncodeError::FieldTooWide {
            field: "tick",
            value: tick,
            bits: TICK_BITS,
        })?;
    writer.write_bit(ack.side.bit());
    Ok(writer.finish())
}

/// Decodes an ack produced by [`encode_baseline_ack`].
pub fn decode_baseline_ack(bytes: &[u8]) -> WireResult<BaselineAck> {
    let mut reader = BitReader::new(bytes);
    let tick = reader.read_bits(TICK_BITS)? as u32;
    let side = BaselineSide::from_bit(reader.read_bit()?);
    Ok(BaselineAck { tick, side })
}
