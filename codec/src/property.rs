//! Property states and the schema-driven property codec.
//!
//! A property delta is a run of `(1, ubitvar(index - last - 1), value)`
//! entries terminated by a single `0` bit. Baselines are stored in the same
//! format with every field present.

use bitstream::{BitReader, BitWriter};
use schema::{schema_hash, ClassDef, ClassId, FieldCodec, FieldDef, Schema};

use crate::error::{CodecResult, MalformedStream, ValueReason};

/// A field value in decoded form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldValue {
    Bool(bool),
    UInt(u64),
    SInt(i64),
    VarUInt(u64),
    VarSInt(i64),
    FixedPoint(i64),
}

impl FieldValue {
    /// The zero value for a codec, clamped into range for fixed-point fields.
    #[must_use]
    pub const fn zero(codec: FieldCodec) -> Self {
        match codec {
            FieldCodec::Bool => Self::Bool(false),
            FieldCodec::UInt { .. } => Self::UInt(0),
            FieldCodec::SInt { .. } => Self::SInt(0),
            FieldCodec::VarUInt => Self::VarUInt(0),
            FieldCodec::VarSInt => Self::VarSInt(0),
            FieldCodec::FixedPoint(fp) => Self::FixedPoint(fp.zero_q()),
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::UInt(_) => "uint",
            Self::SInt(_) => "sint",
            Self::VarUInt(_) => "varuint",
            Self::VarSInt(_) => "varsint",
            Self::FixedPoint(_) => "fixed-point",
        }
    }
}

/// Decoded properties of one object, in class field order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PropertyState {
    values: Vec<FieldValue>,
}

impl PropertyState {
    #[must_use]
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<FieldValue> {
        self.values.get(index).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Property indices present in a decoded delta, in stream order.
pub type ChangedFields = Vec<usize>;

/// Where a delta's unchanged fields come from.
#[derive(Debug, Clone, Copy)]
pub enum PropertySource<'a> {
    /// Encoded baseline bytes.
    Baseline(&'a [u8]),
    /// The live object's current values.
    Live(&'a PropertyState),
}

/// An encoded property delta ready to be embedded in a message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDelta {
    bytes: Vec<u8>,
    bits: usize,
}

impl PropertyDelta {
    /// A delta that changes nothing (a lone terminator bit).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            bytes: vec![0],
            bits: 1,
        }
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub const fn bit_len(&self) -> usize {
        self.bits
    }
}

/// Decodes and re-encodes per-class property sets.
pub trait PropertyCodec {
    /// Returns `true` if `class` can be decoded.
    fn knows_class(&self, class: ClassId) -> bool;

    /// Merges `from` with the delta read from `delta` into `out`.
    ///
    /// Returns the property indices the delta carried.
    fn decode_delta(
        &self,
        class: ClassId,
        from: PropertySource<'_>,
        delta: &mut BitReader<'_>,
        out: &mut PropertyState,
    ) -> CodecResult<ChangedFields>;

    /// Serializes a full property state for storage as a baseline.
    fn encode(&self, class: ClassId, state: &PropertyState) -> CodecResult<Vec<u8>>;
}

/// [`PropertyCodec`] driven by a [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaPropertyCodec {
    schema: Schema,
}

impl SchemaPropertyCodec {
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        tracing::debug!(
            schema_hash = schema_hash(&schema),
            classes = schema.classes.len(),
            "property codec ready"
        );
        Self { schema }
    }

    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    /// All fields of `class` at their zero value.
    pub fn zero_state(&self, class: ClassId) -> CodecResult<PropertyState> {
        let def = self.class_def(class)?;
        Ok(zero_state(def))
    }

    /// Encoded zero state of every class, for registering default baselines.
    pub fn zero_baselines(&self) -> CodecResult<Vec<(ClassId, Vec<u8>)>> {
        self.schema
            .classes
            .iter()
            .map(|def| Ok((def.id, encode_state(def, &zero_state(def))?)))
            .collect()
    }

    /// Encodes a delta carrying `changes`, which must be in increasing index order.
    pub fn encode_delta(
        &self,
        class: ClassId,
        changes: &[(usize, FieldValue)],
    ) -> CodecResult<PropertyDelta> {
        let def = self.class_def(class)?;
        let mut writer = BitWriter::new();
        let mut next = 0usize;
        for &(index, value) in changes {
            let field = field_at(def, index)?;
            if index < next {
                return Err(MalformedStream::InvalidFieldIndex {
                    class,
                    index,
                    field_count: def.fields.len(),
                }
                .into());
            }
            writer.write_bit(true);
            writer.write_ubitvar((index - next) as u32);
            write_field_value(class, field, value, &mut writer)?;
            next = index + 1;
        }
        writer.write_bit(false);
        let bits = writer.bits_written();
        Ok(PropertyDelta {
            bytes: writer.finish(),
            bits,
        })
    }

    fn class_def(&self, class: ClassId) -> CodecResult<&ClassDef> {
        self.schema
            .class(class)
            .ok_or_else(|| MalformedStream::UnknownClass { class }.into())
    }
}

impl PropertyCodec for SchemaPropertyCodec {
    fn knows_class(&self, class: ClassId) -> bool {
        self.schema.class(class).is_some()
    }

    fn decode_delta(
        &self,
        class: ClassId,
        from: PropertySource<'_>,
        delta: &mut BitReader<'_>,
        out: &mut PropertyState,
    ) -> CodecResult<ChangedFields> {
        let def = self.class_def(class)?;
        let mut state = match from {
            PropertySource::Baseline(bytes) => {
                let mut state = zero_state(def);
                apply_delta(def, &mut BitReader::new(bytes), &mut state)?;
                state
            }
            PropertySource::Live(live) => {
                if live.len() != def.fields.len() {
                    return Err(MalformedStream::StateShapeMismatch {
                        class,
                        expected: def.fields.len(),
                        actual: live.len(),
                    }
                    .into());
                }
                live.clone()
            }
        };
        let changed = apply_delta(def, delta, &mut state)?;
        *out = state;
        Ok(changed)
    }

    fn encode(&self, class: ClassId, state: &PropertyState) -> CodecResult<Vec<u8>> {
        let def = self.class_def(class)?;
        encode_state(def, state)
    }
}

fn zero_state(def: &ClassDef) -> PropertyState {
    PropertyState::new(
        def.fields
            .iter()
            .map(|field| FieldValue::zero(field.codec))
            .collect(),
    )
}

fn encode_state(def: &ClassDef, state: &PropertyState) -> CodecResult<Vec<u8>> {
    if state.len() != def.fields.len() {
        return Err(MalformedStream::StateShapeMismatch {
            class: def.id,
            expected: def.fields.len(),
            actual: state.len(),
        }
        .into());
    }
    let mut writer = BitWriter::new();
    for (field, value) in def.fields.iter().zip(state.values()) {
        writer.write_bit(true);
        writer.write_ubitvar(0);
        write_field_value(def.id, field, *value, &mut writer)?;
    }
    writer.write_bit(false);
    Ok(writer.finish())
}

fn apply_delta(
    def: &ClassDef,
    reader: &mut BitReader<'_>,
    state: &mut PropertyState,
) -> CodecResult<ChangedFields> {
    let mut changed = ChangedFields::new();
    let mut next = 0u64;
    while reader.read_bit()? {
        let index = next + u64::from(reader.read_ubitvar()?);
        let slot = usize::try_from(index).unwrap_or(usize::MAX);
        let field = field_at(def, slot)?;
        state.values[slot] = read_field_value(def.id, field, reader)?;
        changed.push(slot);
        next = index + 1;
    }
    Ok(changed)
}

fn field_at(def: &ClassDef, index: usize) -> CodecResult<&FieldDef> {
    def.field_at(index).ok_or_else(|| {
        MalformedStream::InvalidFieldIndex {
            class: def.id,
            index,
            field_count: def.fields.len(),
        }
        .into()
    })
}

fn write_field_value(
    class: ClassId,
    field: &FieldDef,
    value: FieldValue,
    writer: &mut BitWriter,
) -> CodecResult<()> {
    let invalid = |reason| MalformedStream::InvalidValue {
        class,
        field: field.id,
        reason,
    };
    match (field.codec, value) {
        (FieldCodec::Bool, FieldValue::Bool(v)) => writer.write_bit(v),
        (FieldCodec::UInt { bits }, FieldValue::UInt(v)) => {
            writer
                .write_bits(v, bits)
                .map_err(|_| invalid(ValueReason::UnsignedOutOfRange { bits, value: v }))?;
        }
        (FieldCodec::SInt { bits }, FieldValue::SInt(v)) => {
            let encoded =
                encode_sint(bits, v).ok_or(invalid(ValueReason::SignedOutOfRange { bits, value: v }))?;
            writer.write_bits(encoded, bits)?;
        }
        (FieldCodec::VarUInt, FieldValue::VarUInt(v)) => {
            let v32 = u32::try_from(v).map_err(|_| invalid(ValueReason::VarUIntOutOfRange { value: v }))?;
            writer.write_varu32(v32);
        }
        (FieldCodec::VarSInt, FieldValue::VarSInt(v)) => {
            let v32 = i32::try_from(v).map_err(|_| invalid(ValueReason::VarSIntOutOfRange { value: v }))?;
            writer.write_vars32(v32);
        }
        (FieldCodec::FixedPoint(fp), FieldValue::FixedPoint(v)) => {
            if v < fp.min_q || v > fp.max_q {
                return Err(invalid(ValueReason::FixedPointOutOfRange {
                    min_q: fp.min_q,
                    max_q: fp.max_q,
                    value: v,
                })
                .into());
            }
            let bits = fp.offset_bits();
            if bits > 0 {
                writer.write_bits(v.abs_diff(fp.min_q), bits)?;
            }
        }
        (codec, value) => {
            return Err(invalid(ValueReason::TypeMismatch {
                expected: codec.name(),
                found: value.name(),
            })
            .into());
        }
    }
    Ok(())
}

fn read_field_value(
    class: ClassId,
    field: &FieldDef,
    reader: &mut BitReader<'_>,
) -> CodecResult<FieldValue> {
    match field.codec {
        FieldCodec::Bool => Ok(FieldValue::Bool(reader.read_bit()?)),
        FieldCodec::UInt { bits } => Ok(FieldValue::UInt(reader.read_bits(bits)?)),
        FieldCodec::SInt { bits } => {
            let raw = reader.read_bits(bits)?;
            Ok(FieldValue::SInt(decode_sint(bits, raw)))
        }
        FieldCodec::VarUInt => Ok(FieldValue::VarUInt(u64::from(reader.read_varu32()?))),
        FieldCodec::VarSInt => Ok(FieldValue::VarSInt(i64::from(reader.read_vars32()?))),
        FieldCodec::FixedPoint(fp) => {
            let bits = fp.offset_bits();
            let offset = reader.read_bits(bits)?;
            let value = i128::from(fp.min_q) + i128::from(offset);
            if value > i128::from(fp.max_q) {
                return Err(MalformedStream::InvalidValue {
                    class,
                    field: field.id,
                    reason: ValueReason::FixedPointOutOfRange {
                        min_q: fp.min_q,
                        max_q: fp.max_q,
                        value: i64::try_from(value).unwrap_or(i64::MAX),
                    },
                }
                .into());
            }
            Ok(FieldValue::FixedPoint(value as i64))
        }
    }
}

fn encode_sint(bits: u8, value: i64) -> Option<u64> {
    if bits == 64 {
        return Some(value as u64);
    }
    let min = -(1i128 << (bits - 1));
    let max = (1i128 << (bits - 1)) - 1;
    let wide = i128::from(value);
    if wide < min || wide > max {
        return None;
    }
    Some((value as u64) & ((1u64 << bits) - 1))
}

fn decode_sint(bits: u8, raw: u64) -> i64 {
    if bits == 64 {
        return raw as i64;
    }
    if bits == 0 {
        return 0;
    }
    let sign_bit = 1u64 << (bits - 1);
    if raw & sign_bit == 0 {
        raw as i64
    } else {
        (raw as i64) - (1i64 << bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::FieldId;

    fn codec() -> SchemaPropertyCodec {
        let class = ClassDef::new(ClassId::new(1), "Player")
            .field(FieldDef::new(FieldId::new(1), FieldCodec::bool()))
            .field(FieldDef::new(FieldId::new(2), FieldCodec::uint(10)))
            .field(FieldDef::new(FieldId::new(3), FieldCodec::sint(8)))
            .field(FieldDef::new(FieldId::new(4), FieldCodec::var_uint()))
            .field(FieldDef::new(FieldId::new(5), FieldCodec::var_sint()))
            .field(FieldDef::new(
                FieldId::new(6),
                FieldCodec::fixed_point(-500, 500, 100),
            ));
        SchemaPropertyCodec::new(Schema::new(vec![class]).unwrap())
    }

    const PLAYER: ClassId = ClassId::new(1);

    fn decode(
        codec: &SchemaPropertyCodec,
        from: PropertySource<'_>,
        delta: &PropertyDelta,
    ) -> CodecResult<(PropertyState, ChangedFields)> {
        let mut reader = BitReader::new(delta.bytes());
        let mut out = PropertyState::default();
        let changed = codec.decode_delta(PLAYER, from, &mut reader, &mut out)?;
        assert_eq!(reader.bit_position(), delta.bit_len());
        Ok((out, changed))
    }

    #[test]
    fn zero_state_matches_schema() {
        let state = codec().zero_state(PLAYER).unwrap();
        assert_eq!(
            state.values(),
            &[
                FieldValue::Bool(false),
                FieldValue::UInt(0),
                FieldValue::SInt(0),
                FieldValue::VarUInt(0),
                FieldValue::VarSInt(0),
                FieldValue::FixedPoint(0),
            ]
        );
    }

    #[test]
    fn delta_against_zero_baseline() {
        let codec = codec();
        let baselines = codec.zero_baselines().unwrap();
        let (_, baseline) = &baselines[0];

        let delta = codec
            .encode_delta(
                PLAYER,
                &[
                    (1, FieldValue::UInt(513)),
                    (2, FieldValue::SInt(-3)),
                    (5, FieldValue::FixedPoint(-250)),
                ],
            )
            .unwrap();
        let (state, changed) = decode(&codec, PropertySource::Baseline(baseline), &delta).unwrap();
        assert_eq!(changed, vec![1, 2, 5]);
        assert_eq!(state.get(1), Some(FieldValue::UInt(513)));
        assert_eq!(state.get(2), Some(FieldValue::SInt(-3)));
        assert_eq!(state.get(5), Some(FieldValue::FixedPoint(-250)));
        assert_eq!(state.get(0), Some(FieldValue::Bool(false)));
    }

    #[test]
    fn baseline_roundtrip_with_empty_delta() {
        let codec = codec();
        let state = PropertyState::new(vec![
            FieldValue::Bool(true),
            FieldValue::UInt(1023),
            FieldValue::SInt(-128),
            FieldValue::VarUInt(300),
            FieldValue::VarSInt(-70_000),
            FieldValue::FixedPoint(500),
        ]);
        let bytes = codec.encode(PLAYER, &state).unwrap();
        let (decoded, changed) = decode(
            &codec,
            PropertySource::Baseline(&bytes),
            &PropertyDelta::empty(),
        )
        .unwrap();
        assert!(changed.is_empty());
        assert_eq!(decoded, state);
    }

    #[test]
    fn delta_against_live_state_keeps_unchanged_fields() {
        let codec = codec();
        let mut live = codec.zero_state(PLAYER).unwrap();
        live.values[0] = FieldValue::Bool(true);
        let delta = codec
            .encode_delta(PLAYER, &[(3, FieldValue::VarUInt(9))])
            .unwrap();
        let (state, changed) = decode(&codec, PropertySource::Live(&live), &delta).unwrap();
        assert_eq!(changed, vec![3]);
        assert_eq!(state.get(0), Some(FieldValue::Bool(true)));
        assert_eq!(state.get(3), Some(FieldValue::VarUInt(9)));
    }

    #[test]
    fn rejects_field_index_past_class() {
        let codec = codec();
        let mut writer = BitWriter::new();
        writer.write_bit(true);
        writer.write_ubitvar(6);
        writer.write_bit(false);
        let bytes = writer.finish();
        let mut out = PropertyState::default();
        let live = codec.zero_state(PLAYER).unwrap();
        let err = codec
            .decode_delta(
                PLAYER,
                PropertySource::Live(&live),
                &mut BitReader::new(&bytes),
                &mut out,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            crate::ProtocolError::Malformed(MalformedStream::InvalidFieldIndex { index: 6, .. })
        ));
    }

    #[test]
    fn rejects_unknown_class() {
        let codec = codec();
        assert!(!codec.knows_class(ClassId::new(9)));
        let err = codec.zero_state(ClassId::new(9)).unwrap_err();
        assert!(matches!(
            err,
            crate::ProtocolError::Malformed(MalformedStream::UnknownClass { .. })
        ));
    }

    #[test]
    fn rejects_live_state_of_wrong_shape() {
        let codec = codec();
        let live = PropertyState::new(vec![FieldValue::Bool(true)]);
        let err = decode(&codec, PropertySource::Live(&live), &PropertyDelta::empty()).unwrap_err();
        assert!(matches!(
            err,
            crate::ProtocolError::Malformed(MalformedStream::StateShapeMismatch { .. })
        ));
    }

    #[test]
    fn encode_delta_rejects_bad_values() {
        let codec = codec();
        let err = codec
            .encode_delta(PLAYER, &[(1, FieldValue::UInt(1024))])
            .unwrap_err();
        assert!(err.to_string().contains("unsigned"));

        let err = codec
            .encode_delta(PLAYER, &[(0, FieldValue::UInt(1))])
            .unwrap_err();
        assert!(err.to_string().contains("expected bool"));

        let err = codec
            .encode_delta(PLAYER, &[(2, FieldValue::SInt(1)), (1, FieldValue::UInt(1))])
            .unwrap_err();
        assert!(matches!(
            err,
            crate::ProtocolError::Malformed(MalformedStream::InvalidFieldIndex { index: 1, .. })
        ));
    }

    #[test]
    fn fixed_point_out_of_range_on_wire() {
        let class = ClassDef::new(ClassId::new(2), "Door").field(FieldDef::new(
            FieldId::new(1),
            FieldCodec::fixed_point(0, 4, 1),
        ));
        let codec = SchemaPropertyCodec::new(Schema::new(vec![class]).unwrap());
        let mut writer = BitWriter::new();
        writer.write_bit(true);
        writer.write_ubitvar(0);
        writer.write_bits(7, 3).unwrap();
        writer.write_bit(false);
        let bytes = writer.finish();
        let live = codec.zero_state(ClassId::new(2)).unwrap();
        let mut out = PropertyState::default();
        let err = codec
            .decode_delta(
                ClassId::new(2),
                PropertySource::Live(&live),
                &mut BitReader::new(&bytes),
                &mut out,
            )
            .unwrap_err();
        assert!(err.to_string().contains("fixed-point"));
    }

    #[test]
    fn sint_helpers() {
        assert_eq!(encode_sint(4, -1), Some(0b1111));
        assert_eq!(decode_sint(4, 0b1111), -1);
        assert_eq!(encode_sint(4, 8), None);
        assert_eq!(decode_sint(64, u64::MAX), -1);
    }
}
