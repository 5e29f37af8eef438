//! Server-side message construction.
//!
//! The decoder never needs this, but replay tooling, benches and tests do.

use bitstream::{BitError, BitWriter};
use schema::ClassId;
use wire::{encode_packet_entities_header, BaselineSide, EncodeError, Limits, PacketEntitiesHeader};

use crate::property::PropertyDelta;
use crate::types::{EntityIndex, SerialNumber, SnapshotTick};

/// Why a message could not be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("object {index} written after {last}")]
    OutOfOrder { index: EntityIndex, last: EntityIndex },

    #[error("object index {index} outside {limit} slots")]
    IndexOutOfRange { index: EntityIndex, limit: usize },

    #[error("{updated} updated objects exceed max_entries {max_entries}")]
    TooManyEntries { updated: u32, max_entries: u32 },

    #[error("body of {bits} bits exceeds the {limit} bit limit")]
    BodyTooLong { bits: usize, limit: usize },

    #[error(transparent)]
    Bit(#[from] BitError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Builds one packet-entities message.
///
/// Object headers must be added in strictly increasing index order;
/// explicit deletions may be added at any point and are written after them.
#[derive(Debug)]
pub struct MessageBuilder {
    limits: Limits,
    tick: SnapshotTick,
    delta_from: Option<SnapshotTick>,
    baseline_side: BaselineSide,
    update_baseline: bool,
    max_entries: Option<u32>,
    body: BitWriter,
    next_start: u32,
    last: Option<EntityIndex>,
    updated: u32,
    deletions: Vec<EntityIndex>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new(limits: Limits, tick: SnapshotTick) -> Self {
        Self {
            limits,
            tick,
            delta_from: None,
            baseline_side: BaselineSide::Zero,
            update_baseline: false,
            max_entries: None,
            body: BitWriter::new(),
            next_start: 0,
            last: None,
            updated: 0,
            deletions: Vec::new(),
        }
    }

    /// Makes this a delta against `from`.
    #[must_use]
    pub fn delta_from(mut self, from: SnapshotTick) -> Self {
        self.delta_from = Some(from);
        self
    }

    #[must_use]
    pub fn baseline_side(mut self, side: BaselineSide) -> Self {
        self.baseline_side = side;
        self
    }

    /// Asks the client to promote this message's entered objects to baselines.
    #[must_use]
    pub fn update_baseline(mut self, update: bool) -> Self {
        self.update_baseline = update;
        self
    }

    /// Overrides the derived `max_entries` field.
    #[must_use]
    pub fn max_entries(mut self, max_entries: u32) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Number of object headers written so far.
    #[must_use]
    pub const fn updated_entries(&self) -> u32 {
        self.updated
    }

    pub fn enter(
        &mut self,
        index: EntityIndex,
        class: ClassId,
        serial: SerialNumber,
        delta: &PropertyDelta,
    ) -> Result<(), BuildError> {
        self.write_index(index)?;
        self.body.write_bit(false);
        self.body.write_bit(true);
        self.body
            .write_bits(u64::from(class.get()), self.limits.class_bits)?;
        self.body
            .write_bits(u64::from(serial.raw()), self.limits.serial_bits)?;
        self.body.append_bits(delta.bytes(), delta.bit_len())?;
        Ok(())
    }

    pub fn delta(&mut self, index: EntityIndex, delta: &PropertyDelta) -> Result<(), BuildError> {
        self.write_index(index)?;
        self.body.write_bit(false);
        self.body.write_bit(false);
        self.body.append_bits(delta.bytes(), delta.bit_len())?;
        Ok(())
    }

    pub fn leave(&mut self, index: EntityIndex, force_delete: bool) -> Result<(), BuildError> {
        self.write_index(index)?;
        self.body.write_bit(true);
        self.body.write_bit(force_delete);
        Ok(())
    }

    /// Queues an explicit deletion for the trailing deletion run.
    pub fn delete(&mut self, index: EntityIndex) -> Result<(), BuildError> {
        self.check_range(index)?;
        self.deletions.push(index);
        Ok(())
    }

    /// Writes the header and body.
    pub fn finish(mut self) -> Result<Vec<u8>, BuildError> {
        for index in std::mem::take(&mut self.deletions) {
            self.body.write_bit(true);
            self.body
                .write_bits(u64::from(index.raw()), self.limits.index_bits)?;
        }
        self.body.write_bit(false);

        let body_bits = self.body.bits_written();
        let body_limit = self.limits.max_body_bits.min(max_for_bits(self.limits.body_length_bits));
        if body_bits > body_limit {
            return Err(BuildError::BodyTooLong {
                bits: body_bits,
                limit: body_limit,
            });
        }

        let max_entries = self.max_entries.unwrap_or_else(|| self.derived_max_entries());
        if self.updated > max_entries {
            return Err(BuildError::TooManyEntries {
                updated: self.updated,
                max_entries,
            });
        }

        let header = PacketEntitiesHeader {
            tick: self.tick.raw(),
            max_entries,
            delta_from: self.delta_from.map(SnapshotTick::raw),
            baseline_side: self.baseline_side,
            updated_entries: self.updated,
            body_bits: body_bits as u32,
            update_baseline: self.update_baseline,
        };

        let mut writer = BitWriter::with_capacity(body_bits / 8 + 16);
        encode_packet_entities_header(&header, &self.limits, &mut writer)?;
        let body = self.body.finish();
        writer.append_bits(&body, body_bits)?;
        Ok(writer.finish())
    }

    /// One past the highest written index, capped to the field width and
    /// never below the header count.
    fn derived_max_entries(&self) -> u32 {
        let cap = max_for_bits(self.limits.index_bits) as u32;
        let highest = self.last.map_or(0, |last| last.raw() + 1);
        highest.min(cap).max(self.updated)
    }

    fn check_range(&self, index: EntityIndex) -> Result<(), BuildError> {
        let limit = self.limits.max_objects();
        if index.slot() >= limit {
            return Err(BuildError::IndexOutOfRange { index, limit });
        }
        Ok(())
    }

    fn write_index(&mut self, index: EntityIndex) -> Result<(), BuildError> {
        self.check_range(index)?;
        if let Some(last) = self.last {
            if index <= last {
                return Err(BuildError::OutOfOrder { index, last });
            }
        }
        self.body.write_ubitvar(index.raw() - self.next_start);
        self.next_start = index.raw() + 1;
        self.last = Some(index);
        self.updated += 1;
        Ok(())
    }
}

fn max_for_bits(bits: u8) -> usize {
    if bits >= 64 {
        usize::MAX
    } else {
        ((1u64 << bits) - 1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitstream::BitReader;
    use wire::decode_packet_entities_header;

    fn idx(raw: u32) -> EntityIndex {
        EntityIndex::new(raw)
    }

    #[test]
    fn header_reflects_builder_options() {
        let mut builder = MessageBuilder::new(Limits::for_testing(), SnapshotTick::new(9))
            .delta_from(SnapshotTick::new(7))
            .baseline_side(BaselineSide::One)
            .update_baseline(true);
        builder.leave(idx(3), false).unwrap();
        builder.leave(idx(5), true).unwrap();
        let bytes = builder.finish().unwrap();

        let mut reader = BitReader::new(&bytes);
        let header = decode_packet_entities_header(&mut reader, &Limits::for_testing()).unwrap();
        assert_eq!(header.tick, 9);
        assert_eq!(header.delta_from, Some(7));
        assert_eq!(header.baseline_side, BaselineSide::One);
        assert!(header.update_baseline);
        assert_eq!(header.updated_entries, 2);
        assert_eq!(header.max_entries, 6);
        // Two leaves: ubitvar(3) + 2 flag bits, ubitvar(1) + 2 flag bits, terminator.
        assert_eq!(header.body_bits, 6 + 2 + 6 + 2 + 1);
    }

    #[test]
    fn rejects_out_of_order_indices() {
        let mut builder = MessageBuilder::new(Limits::for_testing(), SnapshotTick::new(1));
        builder.delta(idx(4), &PropertyDelta::empty()).unwrap();
        let err = builder.delta(idx(4), &PropertyDelta::empty()).unwrap_err();
        assert_eq!(
            err,
            BuildError::OutOfOrder {
                index: idx(4),
                last: idx(4)
            }
        );
    }

    #[test]
    fn rejects_index_outside_slots() {
        let mut builder = MessageBuilder::new(Limits::for_testing(), SnapshotTick::new(1));
        let err = builder.delete(idx(64)).unwrap_err();
        assert!(matches!(err, BuildError::IndexOutOfRange { limit: 64, .. }));
    }

    #[test]
    fn explicit_max_entries_must_cover_updates() {
        let mut builder =
            MessageBuilder::new(Limits::for_testing(), SnapshotTick::new(1)).max_entries(1);
        builder.delta(idx(0), &PropertyDelta::empty()).unwrap();
        builder.delta(idx(1), &PropertyDelta::empty()).unwrap();
        assert!(matches!(
            builder.finish(),
            Err(BuildError::TooManyEntries { updated: 2, max_entries: 1 })
        ));
    }

    #[test]
    fn empty_message_is_one_terminator_bit() {
        let bytes = MessageBuilder::new(Limits::for_testing(), SnapshotTick::new(1))
            .finish()
            .unwrap();
        let mut reader = BitReader::new(&bytes);
        let header = decode_packet_entities_header(&mut reader, &Limits::for_testing()).unwrap();
        assert_eq!(header.updated_entries, 0);
        assert_eq!(header.max_entries, 0);
        assert_eq!(header.body_bits, 1);
        assert!(!reader.read_bit().unwrap());
    }
}
